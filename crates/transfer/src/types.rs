use std::path::PathBuf;

use crate::CHUNK_SIZE;

/// A byte range of the local file, uploaded as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Size of this chunk in bytes.
    pub length: usize,
}

impl Chunk {
    /// First byte past the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

/// Splits `[resume_offset, total_size)` into consecutive chunks.
///
/// Every chunk but the last is `chunk_size` long; the last holds the
/// remainder. Returns nothing when `resume_offset >= total_size`.
/// A `chunk_size` of 0 means [`CHUNK_SIZE`].
pub fn plan_chunks(resume_offset: u64, total_size: u64, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = if chunk_size == 0 {
        CHUNK_SIZE
    } else {
        chunk_size
    };

    let mut chunks = Vec::new();
    let mut offset = resume_offset;
    while offset < total_size {
        let length = (total_size - offset).min(chunk_size as u64) as usize;
        chunks.push(Chunk { offset, length });
        offset += length as u64;
    }
    chunks
}

/// One single-file upload, fixed once the resume offset is known.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub chunk_size: usize,
    pub workers: usize,
    pub total_size: u64,
    /// Bytes already present remotely. Never exceeds `total_size`.
    pub resume_offset: u64,
}

impl TransferJob {
    pub fn new(
        local_path: PathBuf,
        remote_path: String,
        chunk_size: usize,
        workers: usize,
        total_size: u64,
        remote_size: u64,
    ) -> Self {
        Self {
            local_path,
            remote_path,
            chunk_size,
            workers,
            total_size,
            resume_offset: remote_size.min(total_size),
        }
    }

    /// True when the remote file already holds every byte.
    pub fn is_complete(&self) -> bool {
        self.resume_offset >= self.total_size
    }

    /// Bytes left to upload.
    pub fn remaining(&self) -> u64 {
        self.total_size - self.resume_offset
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        plan_chunks(self.resume_offset, self.total_size, self.chunk_size)
    }
}
