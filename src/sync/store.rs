use async_trait::async_trait;

use crate::error::Result;

/// An object read from the remote together with its revision token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub content: Vec<u8>,
    pub revision: String,
}

/// Path-addressed remote content store with optimistic concurrency.
///
/// Updating or deleting an existing object must carry the revision last
/// observed for it; a stale revision fails with `ProcessorError::SyncConflict`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when nothing exists at `path`
    async fn get_object(&self, path: &str) -> Result<Option<RemoteObject>>;

    /// Create or replace the object; returns its new revision
    async fn put_object(
        &self,
        path: &str,
        content: Vec<u8>,
        message: &str,
        revision: Option<&str>,
    ) -> Result<String>;

    async fn delete_object(&self, path: &str, revision: &str, message: &str) -> Result<()>;
}
