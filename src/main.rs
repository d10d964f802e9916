//! Resumable Uploadr - chunked upload client
//!
//! Uploads local files to a resumable upload server and queries upload status.

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use resumable_uploadr::config::Config;
use resumable_uploadr::session::{
    LocalHost, PendingFile, UploadSessionManager, META_DESTINATION_PATH, META_PROJECT_ID,
};
use resumable_uploadr::{metrics, telemetry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Resumable Uploadr - chunked, resumable file uploads
#[derive(Parser, Debug)]
#[command(name = "resumable-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one or more files
    Upload {
        /// Target project
        #[arg(long)]
        project_id: String,

        /// Directory inside the project the files land in
        #[arg(long, default_value = "/")]
        destination: String,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the server-side status of an upload
    Status {
        /// Server-assigned file id
        #[arg(long)]
        file_id: String,
    },
}

fn destination_for(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("loading configuration from {:?}", args.config))?
    } else {
        Config::default()
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    telemetry::init_subscriber(&config.logging)?;
    metrics::set_enabled(config.metrics.enabled);

    info!("Starting Resumable Uploadr v{}", env!("CARGO_PKG_VERSION"));

    let host = Arc::new(LocalHost::new());
    let manager = Arc::new(UploadSessionManager::from_config(&config.client, host.clone())?);
    manager.install(host.as_ref());

    let result = match args.command {
        Command::Upload {
            project_id,
            destination,
            files,
        } => {
            let mut ids = Vec::with_capacity(files.len());
            for (n, path) in files.iter().enumerate() {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {:?}", path))?;
                let name = path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("file-{}", n));

                let file = PendingFile::new(format!("local-{}", n), name.clone(), Bytes::from(data))
                    .with_meta(META_PROJECT_ID, project_id.clone())
                    .with_meta(META_DESTINATION_PATH, destination_for(&destination, &name));
                ids.push(host.add_file(file));
            }

            let outcome = manager.upload(ids).await;
            for (file_id, result) in &outcome.results {
                let line = match result {
                    Ok(finalized) => serde_json::json!({ "file": file_id, "result": finalized }),
                    Err(e) => serde_json::json!({
                        "file": file_id,
                        "error": e.to_string(),
                        "status": e.status_code(),
                    }),
                };
                println!("{}", line);
            }

            if outcome.has_failures() {
                Err(anyhow::anyhow!(
                    "{} of {} uploads failed",
                    outcome.failed().count(),
                    outcome.len()
                ))
            } else {
                Ok(())
            }
        }
        Command::Status { file_id } => {
            let status = manager.check_upload_status(&file_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    };

    manager.uninstall(host.as_ref());

    if args.print_metrics && config.metrics.enabled {
        print!("{}", metrics::gather_text());
    }

    result
}
