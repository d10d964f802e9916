//! Chunk splitting
//!
//! Turns a file size into contiguous, non-overlapping byte ranges.

use super::UploadError;

/// Position of one chunk within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub total_chunks: u32,
    pub start: u64,
    pub end: u64,
}

impl ChunkDescriptor {
    /// Number of bytes in the chunk
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits files into fixed-size chunks
#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    chunk_size: u64,
}

impl ChunkSplitter {
    /// Create a splitter, rejecting a zero chunk size
    pub fn new(chunk_size: u64) -> Result<Self, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::Configuration(
                "chunk size must be greater than zero".into(),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks for a file; an empty file still gets one chunk
    ///
    /// Fails when the count does not fit the protocol's 32-bit chunk index.
    pub fn total_chunks(&self, total_size: u64) -> Result<u32, UploadError> {
        if total_size == 0 {
            return Ok(1);
        }

        let count = total_size.div_ceil(self.chunk_size);
        u32::try_from(count).map_err(|_| {
            UploadError::Configuration(format!(
                "{} bytes in chunks of {} needs {} chunks, more than the {} allowed",
                total_size,
                self.chunk_size,
                count,
                u32::MAX
            ))
        })
    }

    /// Lazily yield the chunk descriptors covering `[0, total_size)`
    pub fn split(
        &self,
        total_size: u64,
    ) -> Result<impl Iterator<Item = ChunkDescriptor>, UploadError> {
        let chunk_size = self.chunk_size;
        let total_chunks = self.total_chunks(total_size)?;

        Ok((0..total_chunks).map(move |index| {
            let start = index as u64 * chunk_size;
            ChunkDescriptor {
                index,
                total_chunks,
                start,
                end: total_size.min(start + chunk_size),
            }
        }))
    }
}

/// Split `total_size` bytes into `chunk_size` ranges
pub fn split(
    total_size: u64,
    chunk_size: u64,
) -> Result<impl Iterator<Item = ChunkDescriptor>, UploadError> {
    ChunkSplitter::new(chunk_size)?.split(total_size)
}
