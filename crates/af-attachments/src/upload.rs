//! Uploaded files
//!
//! An upload carries its bytes plus the filename and content type the client
//! sent. Either may be missing, in which case assignment ignores the upload.

use std::path::{Path, PathBuf};

use af_processing::StagedFile;
use bytes::Bytes;

#[derive(Debug)]
enum UploadSource {
    Bytes(Bytes),
    Path(PathBuf),
    Staged(StagedFile),
}

#[derive(Debug)]
pub struct UploadedFile {
    original_filename: Option<String>,
    content_type: Option<String>,
    source: UploadSource,
}

impl UploadedFile {
    /// An upload held in memory
    pub fn new(
        original_filename: Option<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            original_filename,
            content_type,
            source: UploadSource::Bytes(data.into()),
        }
    }

    pub fn from_bytes(
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self::new(
            Some(original_filename.into()),
            Some(content_type.into()),
            data,
        )
    }

    /// An upload read from a local file; the content type is guessed from the name
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let original_filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

        Self {
            original_filename,
            content_type: Some(content_type),
            source: UploadSource::Path(path.to_path_buf()),
        }
    }

    /// An already staged file; filename and content type are taken from it
    pub fn from_staged(file: StagedFile) -> Self {
        Self {
            original_filename: Some(file.original_filename().to_string()),
            content_type: Some(file.content_type().to_string()),
            source: UploadSource::Staged(file),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn original_filename(&self) -> Option<&str> {
        self.original_filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Copy the upload into a temporary file owned by the caller
    pub(crate) async fn stage(self, filename: &str, content_type: &str) -> std::io::Result<StagedFile> {
        match self.source {
            UploadSource::Bytes(data) => StagedFile::from_bytes(filename, content_type, &data),
            UploadSource::Path(path) => {
                let mut file = tokio::fs::File::open(&path).await?;
                StagedFile::from_reader(filename, content_type, &mut file).await
            }
            UploadSource::Staged(file) => {
                let data = file.read_bytes().await?;
                let staged = StagedFile::from_bytes(filename, content_type, &data)?;
                file.close()?;
                Ok(staged)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_guesses_content_type() {
        let upload = UploadedFile::from_path("/tmp/photos/5k.png");
        assert_eq!(upload.original_filename(), Some("5k.png"));
        assert_eq!(upload.content_type(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_stage_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let staged = UploadedFile::from_path(&path)
            .stage("notes.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(staged.size().unwrap(), 5);
        assert_eq!(staged.content_type(), "text/plain");
    }

    #[tokio::test]
    async fn test_stage_from_staged_releases_source() {
        let source = StagedFile::from_bytes("a.bin", "application/octet-stream", b"xyz").unwrap();
        let source_path = source.path().to_path_buf();

        let staged = UploadedFile::from_staged(source)
            .stage("b.bin", "application/octet-stream")
            .await
            .unwrap();
        assert!(!source_path.exists());
        assert_eq!(staged.original_filename(), "b.bin");
        assert_eq!(staged.read_bytes().await.unwrap(), Bytes::from_static(b"xyz"));
    }
}
