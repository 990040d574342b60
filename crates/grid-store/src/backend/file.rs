//! Local file backend using positioned reads.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::instrument;

use super::{check_range, resource_key, Backend};
use crate::error::{Result, StoreError};

/// Backend over a local file.
///
/// Reads run on the blocking pool and never move a shared cursor, so any
/// number of reads may run concurrently.
#[derive(Debug, Clone)]
pub struct FileBackend {
    file: Arc<File>,
    len: u64,
    key: u64,
    location: String,
}

impl FileBackend {
    /// Open a file by path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();
        let file = tokio::task::spawn_blocking(move || File::open(&path))
            .await
            .map_err(|e| StoreError::backend(format!("open task failed: {}", e)))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::NotFound(location.clone()),
                _ => StoreError::backend(format!("failed to open {}: {}", location, e)),
            })?;
        let key = resource_key(&location);
        Self::from_file(file, key, location)
    }

    /// Wrap an already open file, such as an unlinked temporary file.
    pub fn from_file(file: File, key: u64, location: impl Into<String>) -> Result<Self> {
        let len = file
            .metadata()
            .map_err(|e| StoreError::backend(format!("failed to stat file: {}", e)))?
            .len();
        Ok(Self {
            file: Arc::new(file),
            len,
            key,
            location: location.into(),
        })
    }

    /// Path or label this backend was opened from.
    pub fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(unix)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut done = 0;
    while done < buf.len() {
        let n = file.seek_read(&mut buf[done..], offset + done as u64)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        done += n;
    }
    Ok(())
}

#[async_trait]
impl Backend for FileBackend {
    #[instrument(skip(self), fields(location = %self.location))]
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.len)?;
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; length as usize];
            read_at(&file, offset, &mut buf)
                .map(|_| Bytes::from(buf))
                .map_err(|e| StoreError::backend(format!("read of {}+{} failed: {}", offset, length, e)))
        })
        .await
        .map_err(|e| StoreError::backend(format!("read task failed: {}", e)))?
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn cache_key(&self) -> u64 {
        self.key
    }
}
