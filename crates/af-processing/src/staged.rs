//! Staged temporary files
//!
//! Uploads and derived styles live in temporary files until they are flushed
//! to storage. A [`StagedFile`] owns its file: dropping it (or calling
//! [`StagedFile::close`]) releases the descriptor and removes the file.

use std::io::{self, Write};
use std::path::Path;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};

#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
    original_filename: String,
    content_type: String,
}

impl StagedFile {
    /// Create an empty staged file. The temp file keeps the extension of
    /// `original_filename` so format detection by path still works.
    pub fn create(original_filename: impl Into<String>, content_type: impl Into<String>) -> io::Result<Self> {
        let original_filename = original_filename.into();
        let suffix = Path::new(&original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let file = tempfile::Builder::new()
            .prefix("affix-")
            .suffix(&suffix)
            .tempfile()?;

        Ok(Self {
            file,
            original_filename,
            content_type: content_type.into(),
        })
    }

    pub fn from_bytes(
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        data: &[u8],
    ) -> io::Result<Self> {
        let mut staged = Self::create(original_filename, content_type)?;
        staged.file.write_all(data)?;
        staged.file.flush()?;
        Ok(staged)
    }

    /// Stage everything a reader yields
    pub async fn from_reader<R>(
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        reader: &mut R,
    ) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let staged = Self::create(original_filename, content_type)?;
        let mut target = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(staged.path())
            .await?;
        tokio::io::copy(reader, &mut target).await?;
        target.flush().await?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    pub async fn read_bytes(&self) -> io::Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(self.path()).await?))
    }

    pub fn read_bytes_blocking(&self) -> io::Result<Vec<u8>> {
        std::fs::read(self.path())
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Copy into a new, independently owned staged file
    pub fn duplicate(&self) -> io::Result<Self> {
        let data = self.read_bytes_blocking()?;
        Self::from_bytes(self.original_filename.clone(), self.content_type.clone(), &data)
    }

    /// Release the file now, reporting removal errors
    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}
