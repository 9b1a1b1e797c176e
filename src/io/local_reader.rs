use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::byte_reader::ByteReader;
use crate::error::{LoadError, Result};

/// ByteReader implementation for local files
#[derive(Clone)]
pub struct LocalFileByteReader {
    file_path: PathBuf,
}

impl LocalFileByteReader {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    async fn open(&self) -> Result<File> {
        File::open(&self.file_path).await.map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> LoadError {
        if source.kind() == ErrorKind::NotFound {
            LoadError::NotFound {
                path: self.file_path.clone(),
            }
        } else {
            LoadError::Io {
                path: self.file_path.clone(),
                source,
            }
        }
    }
}

#[async_trait]
impl ByteReader for LocalFileByteReader {
    fn location(&self) -> &Path {
        &self.file_path
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        let mut file = self.open().await?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(buffer)
    }
}
