//! Resumable Uploadr Library
//!
//! Client for a chunked, resumable upload HTTP API.
//!
//! # Features
//!
//! - **Chunked**: Files are split into fixed-size chunks (1 MiB by default)
//! - **Concurrent**: All chunks of a file, and all files of a session, upload at once
//! - **Finalize**: The server assembles the chunks once every one has landed
//! - **Isolated Failures**: One file's error never aborts its siblings
//! - **Host Agnostic**: Files and notifications go through the [`session::UploadHost`] trait
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::{config::Config, session::{LocalHost, UploadSessionManager}};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let host = Arc::new(LocalHost::new());
//!     let manager = UploadSessionManager::from_config(&config.client, host.clone())?;
//!     let outcome = manager.upload(vec![]).await;
//!     assert!(outcome.is_empty());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod metrics;
pub mod session;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use session::UploadSessionManager;
pub use upload::{UploadCoordinator, UploadError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
