//! Download & verify
//!
//! Streams the release archive to disk in fixed-size chunks, hashing each
//! chunk as it arrives, and compares the final SHA-256 against the manifest.
//! The checksum is a data-integrity gate only; it authenticates nothing.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, error, info};

use crate::coop::{percent, Cooperative};
use crate::error::{DownloadError, TransportError};
use crate::fsutil::{free_space, remove_path};
use crate::transport::Transport;

pub const DEFAULT_CHUNK_SIZE: usize = 2048;
pub const DEFAULT_MIN_FREE_SPACE: u64 = 200_000;

pub type FreeSpaceProbe = fn(&Path) -> io::Result<u64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub bytes: u64,
    pub sha256: String,
}

pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    coop: &'a dyn Cooperative,
    headers: Vec<(String, String)>,
    chunk_size: usize,
    min_free_space: u64,
    free_space_probe: FreeSpaceProbe,
}

impl<'a> Downloader<'a> {
    pub fn new(transport: &'a dyn Transport, coop: &'a dyn Cooperative) -> Self {
        Self {
            transport,
            coop,
            headers: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_free_space: DEFAULT_MIN_FREE_SPACE,
            free_space_probe: free_space,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_min_free_space(mut self, bytes: u64) -> Self {
        self.min_free_space = bytes;
        self
    }

    pub fn with_free_space_probe(mut self, probe: FreeSpaceProbe) -> Self {
        self.free_space_probe = probe;
        self
    }

    /// Download `url` to `dest` and verify it hashes to `expected_sha256`.
    ///
    /// On any failure after the file was created, the partial file is removed.
    pub fn download(
        &self,
        url: &str,
        expected_sha256: &str,
        dest: &Path,
    ) -> Result<DownloadSummary, DownloadError> {
        let expected = expected_sha256.trim().to_ascii_lowercase();
        if expected.is_empty() {
            return Err(DownloadError::MissingChecksum);
        }

        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let response = self.transport.get(url, &self.headers)?;

        let required = self
            .min_free_space
            .saturating_add(response.content_length.unwrap_or(0));
        let available = (self.free_space_probe)(dir)?;
        debug!("Free space {} bytes, need {}", available, required);
        if available < required {
            error!("Insufficient storage for update: {} < {}", available, required);
            return Err(DownloadError::InsufficientStorage {
                required,
                available,
            });
        }

        info!("Downloading {}", url);
        let result = self.stream_to_file(response.body, response.content_length, dest);
        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                remove_path(dest);
                return Err(e);
            }
        };

        if summary.sha256 != expected {
            error!(
                "Checksum mismatch for {}: expected {}, got {}",
                url, expected, summary.sha256
            );
            remove_path(dest);
            return Err(DownloadError::ChecksumMismatch {
                expected,
                actual: summary.sha256,
            });
        }

        info!("Download verified ({} bytes)", summary.bytes);
        Ok(summary)
    }

    fn stream_to_file(
        &self,
        mut body: Box<dyn Read + Send>,
        content_length: Option<u64>,
        dest: &Path,
    ) -> Result<DownloadSummary, DownloadError> {
        let mut file = File::create(dest)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes: u64 = 0;

        loop {
            let n = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Network(e.to_string()).into()),
            };
            file.write_all(&buffer[..n])?;
            hasher.update(&buffer[..n]);
            bytes += n as u64;

            self.coop.progress("downloading", percent(bytes, content_length));
            self.coop.yield_now();
        }

        file.sync_all()?;
        self.coop.progress("downloading", Some(100));

        Ok(DownloadSummary {
            bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}
