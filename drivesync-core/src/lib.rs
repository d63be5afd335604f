pub mod auth;
pub mod client;
pub mod upload;

pub use auth::{AuthError, ServiceAccountKey, TokenProvider};
pub use client::{DriveClient, DriveError, DriveItem, FOLDER_MIME_TYPE};
pub use upload::{CreateFolderRequest, UploadTarget};
