use std::path::Path;

use async_trait::async_trait;
use drivesync_core::upload::{CreateFolderRequest, UploadTarget};
use drivesync_core::{DriveClient, DriveError, DriveItem};

/// The reconciler's view of the remote store. Listing operations return
/// fully depaginated results; the implementation owns page tokens,
/// retries and the resumable-upload mechanics.
#[async_trait]
pub trait RemoteStore {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveItem>, DriveError>;
    async fn list_modified_since(&self, timestamp: &str) -> Result<Vec<DriveItem>, DriveError>;
    async fn list_owned(&self) -> Result<Vec<DriveItem>, DriveError>;
    async fn get_metadata(&self, id: &str) -> Result<DriveItem, DriveError>;
    async fn generate_ids(&self, count: usize) -> Result<Vec<String>, DriveError>;
    async fn create_folder(&self, request: &CreateFolderRequest) -> Result<(), DriveError>;
    async fn upload_small(&self, target: &UploadTarget, content: &[u8]) -> Result<(), DriveError>;
    async fn upload_resumable(
        &self,
        target: &UploadTarget,
        source: &Path,
        size: u64,
    ) -> Result<(), DriveError>;
    async fn download_file(&self, id: &str, target: &Path) -> Result<(), DriveError>;
    async fn delete_item(&self, id: &str) -> Result<(), DriveError>;

    /// Requests issued so far, for end-of-cycle logging.
    fn api_calls(&self) -> u64 {
        0
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveItem>, DriveError> {
        DriveClient::list_children(self, folder_id).await
    }

    async fn list_modified_since(&self, timestamp: &str) -> Result<Vec<DriveItem>, DriveError> {
        DriveClient::list_modified_since(self, timestamp).await
    }

    async fn list_owned(&self) -> Result<Vec<DriveItem>, DriveError> {
        DriveClient::list_owned(self).await
    }

    async fn get_metadata(&self, id: &str) -> Result<DriveItem, DriveError> {
        DriveClient::get_metadata(self, id).await
    }

    async fn generate_ids(&self, count: usize) -> Result<Vec<String>, DriveError> {
        DriveClient::generate_ids(self, count).await
    }

    async fn create_folder(&self, request: &CreateFolderRequest) -> Result<(), DriveError> {
        DriveClient::create_folder(self, request).await
    }

    async fn upload_small(&self, target: &UploadTarget, content: &[u8]) -> Result<(), DriveError> {
        DriveClient::upload_small(self, target, content).await
    }

    async fn upload_resumable(
        &self,
        target: &UploadTarget,
        source: &Path,
        size: u64,
    ) -> Result<(), DriveError> {
        DriveClient::upload_resumable(self, target, source, size).await
    }

    async fn download_file(&self, id: &str, target: &Path) -> Result<(), DriveError> {
        DriveClient::download_file(self, id, target).await
    }

    async fn delete_item(&self, id: &str) -> Result<(), DriveError> {
        DriveClient::delete_item(self, id).await
    }

    fn api_calls(&self) -> u64 {
        DriveClient::api_calls(self)
    }
}
