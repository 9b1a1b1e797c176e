use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Abstraction for byte-level access to a source file.
///
/// Format readers are generic over this trait so they can be exercised
/// against in-memory data in tests.
#[async_trait]
pub trait ByteReader: Send + Sync {
    /// Where the bytes come from, used in error messages
    fn location(&self) -> &Path;

    /// Read the whole source
    async fn read_all(&self) -> Result<Vec<u8>>;
}
