use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::auth::{AuthError, ServiceAccountKey, TokenProvider};
use crate::upload::{
    CreateFolderRequest, MULTIPART_BOUNDARY, UploadTarget, acknowledged_range_end,
    multipart_related_body,
};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,modifiedTime,md5Checksum,parents)";
const FILE_FIELDS: &str = "id,name,mimeType,modifiedTime,md5Checksum,parents";
const PAGE_SIZE: u32 = 1000;
const RESUMABLE_ATTEMPTS: u32 = 5;
const RESUMABLE_RETRY_DELAY: Duration = Duration::from_secs(60);

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("auth failed: {0}")]
    Auth(#[from] AuthError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("resumable initiation returned no session uri")]
    MissingSessionUri,
}

/// Metadata snapshot of one remote item. Snapshots are never mutated in
/// place; callers re-fetch when they need fresh values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DriveItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(rename = "modifiedTime", default)]
    pub modified_time: String,
    #[serde(rename = "md5Checksum", default)]
    pub md5: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl DriveItem {
    /// A mimeType containing "folder" is the sole folder discriminator.
    pub fn is_folder(&self) -> bool {
        self.mime_type.contains("folder")
    }

    /// Id-only placeholder used for configured base folders, whose metadata
    /// is never fetched.
    pub fn stub(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct ListFilesPage {
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveItem>,
}

#[derive(Debug, Deserialize)]
struct GeneratedIds {
    #[serde(default)]
    ids: Vec<String>,
}

enum TokenSource {
    ServiceAccount(TokenProvider),
    Fixed(String),
}

enum SessionStatus {
    Complete,
    Acknowledged(u64),
}

pub struct DriveClient {
    http: Client,
    base_url: Url,
    api_key: String,
    auth: TokenSource,
    retry_delay: Duration,
    calls: AtomicU64,
}

impl DriveClient {
    pub fn new(key: ServiceAccountKey, api_key: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            api_key: api_key.into(),
            auth: TokenSource::ServiceAccount(TokenProvider::new(key)),
            retry_delay: RESUMABLE_RETRY_DELAY,
            calls: AtomicU64::new(0),
        })
    }

    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            api_key: api_key.into(),
            auth: TokenSource::Fixed(token.into()),
            retry_delay: RESUMABLE_RETRY_DELAY,
            calls: AtomicU64::new(0),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Requests issued so far. Exposed for logging; the client does not
    /// throttle.
    pub fn api_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveItem>, DriveError> {
        self.list_all(Some(&format!("'{folder_id}' in parents")))
            .await
    }

    /// Items with `modifiedTime` strictly greater than the given RFC3339
    /// timestamp (second precision, UTC).
    pub async fn list_modified_since(&self, timestamp: &str) -> Result<Vec<DriveItem>, DriveError> {
        self.list_all(Some(&format!("modifiedTime > '{timestamp}'")))
            .await
    }

    /// Everything visible to the daemon's own identity, i.e. the items it
    /// created plus the shared base folders' contents.
    pub async fn list_owned(&self) -> Result<Vec<DriveItem>, DriveError> {
        self.list_all(None).await
    }

    async fn list_all(&self, query: Option<&str>) -> Result<Vec<DriveItem>, DriveError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.endpoint("/drive/v3/files")?;
            {
                let mut pairs = url.query_pairs_mut();
                if let Some(query) = query {
                    pairs.append_pair("q", query);
                }
                pairs.append_pair("fields", LIST_FIELDS);
                pairs.append_pair("pageSize", &PAGE_SIZE.to_string());
                if let Some(token) = &page_token {
                    pairs.append_pair("pageToken", token);
                }
            }
            let response = self.authed(Method::GET, url).await?.send().await?;
            let page: ListFilesPage = Self::handle_response(response).await?;
            items.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }

    pub async fn get_metadata(&self, id: &str) -> Result<DriveItem, DriveError> {
        let mut url = self.endpoint(&format!("/drive/v3/files/{id}"))?;
        url.query_pairs_mut().append_pair("fields", FILE_FIELDS);
        let response = self.authed(Method::GET, url).await?.send().await?;
        Self::handle_response(response).await
    }

    /// Fresh opaque ids the caller may pre-assign to yet-to-be-created
    /// items.
    pub async fn generate_ids(&self, count: usize) -> Result<Vec<String>, DriveError> {
        let mut url = self.endpoint("/drive/v3/files/generateIds")?;
        url.query_pairs_mut()
            .append_pair("count", &count.to_string());
        let response = self.authed(Method::GET, url).await?.send().await?;
        let payload: GeneratedIds = Self::handle_response(response).await?;
        Ok(payload.ids)
    }

    pub async fn create_folder(&self, request: &CreateFolderRequest) -> Result<(), DriveError> {
        let url = self.endpoint("/drive/v3/files")?;
        let response = self
            .authed(Method::POST, url)
            .await?
            .json(request)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Single-round multipart upload for small files: metadata part plus
    /// content part in one request.
    pub async fn upload_small(
        &self,
        target: &UploadTarget,
        content: &[u8],
    ) -> Result<(), DriveError> {
        let mut url = self.upload_endpoint(target)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart");
        let body = multipart_related_body(&target.metadata_json(), content);
        let response = self
            .authed(self.upload_method(target), url)
            .await?
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Two-phase resumable upload: initiate for a session URI, then stream
    /// the bytes with byte-range recovery across up to five attempts.
    pub async fn upload_resumable(
        &self,
        target: &UploadTarget,
        source: &Path,
        size: u64,
    ) -> Result<(), DriveError> {
        let session = self.initiate_session(target).await?;
        self.drive_session(&session, source, size).await
    }

    async fn initiate_session(&self, target: &UploadTarget) -> Result<Url, DriveError> {
        let mut url = self.upload_endpoint(target)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "resumable");
        let response = self
            .authed(self.upload_method(target), url)
            .await?
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(target.metadata_json())
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }
        let session = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(DriveError::MissingSessionUri)?;
        Ok(Url::parse(session)?)
    }

    async fn drive_session(
        &self,
        session: &Url,
        source: &Path,
        size: u64,
    ) -> Result<(), DriveError> {
        let mut offset = 0u64;
        for attempt in 1..=RESUMABLE_ATTEMPTS {
            match self.send_session_bytes(session, source, offset, size).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt == RESUMABLE_ATTEMPTS => return Err(err),
                Err(_) => {
                    tokio::time::sleep(self.retry_delay).await;
                    match self.probe_session(session, size).await? {
                        SessionStatus::Complete => return Ok(()),
                        SessionStatus::Acknowledged(bytes) => offset = bytes,
                    }
                }
            }
        }
        unreachable!("resumable attempt loop returns on the last attempt")
    }

    async fn send_session_bytes(
        &self,
        session: &Url,
        source: &Path,
        offset: u64,
        size: u64,
    ) -> Result<(), DriveError> {
        let mut file = tokio::fs::File::open(source).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let mut request = self
            .authed(Method::PUT, session.clone())
            .await?
            .header(CONTENT_LENGTH, size - offset)
            .body(body);
        if offset > 0 {
            request = request.header(
                CONTENT_RANGE,
                format!("bytes {offset}-{}/{size}", size - 1),
            );
        }
        let response = request.send().await?;
        Self::check_status(response).await
    }

    /// Asks the session how many bytes it has durably received.
    async fn probe_session(&self, session: &Url, size: u64) -> Result<SessionStatus, DriveError> {
        let response = self
            .authed(Method::PUT, session.clone())
            .await?
            .header(CONTENT_RANGE, format!("bytes */{size}"))
            .header(CONTENT_LENGTH, 0u64)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(SessionStatus::Complete),
            StatusCode::PERMANENT_REDIRECT => {
                let acknowledged = response
                    .headers()
                    .get(RANGE)
                    .and_then(|value| value.to_str().ok())
                    .and_then(acknowledged_range_end)
                    .map(|end| end + 1)
                    .unwrap_or(0);
                Ok(SessionStatus::Acknowledged(acknowledged))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DriveError::Api { status, body })
            }
        }
    }

    /// Streams the item's content to `target`. On any mid-stream failure
    /// the partially written file is removed before the error is returned,
    /// so a failed download never looks like a fresh local file.
    pub async fn download_file(&self, id: &str, target: &Path) -> Result<(), DriveError> {
        let mut url = self.endpoint(&format!("/drive/v3/files/{id}"))?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self.authed(Method::GET, url).await?.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }

        let mut file = tokio::fs::File::create(target).await?;
        let result = Self::stream_body(&mut file, response).await;
        drop(file);
        if let Err(err) = result {
            let _ = tokio::fs::remove_file(target).await;
            return Err(err);
        }
        Ok(())
    }

    async fn stream_body(
        file: &mut tokio::fs::File,
        response: reqwest::Response,
    ) -> Result<(), DriveError> {
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), DriveError> {
        let url = self.endpoint(&format!("/drive/v3/files/{id}"))?;
        let response = self.authed(Method::DELETE, url).await?.send().await?;
        Self::check_status(response).await
    }

    fn upload_method(&self, target: &UploadTarget) -> Method {
        if target.is_create() {
            Method::POST
        } else {
            Method::PATCH
        }
    }

    fn upload_endpoint(&self, target: &UploadTarget) -> Result<Url, DriveError> {
        if target.is_create() {
            self.endpoint("/upload/drive/v3/files")
        } else {
            self.endpoint(&format!("/upload/drive/v3/files/{}", target.id()))
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn authed(
        &self,
        method: Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, DriveError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let token = match &self.auth {
            TokenSource::ServiceAccount(provider) => provider.token().await?,
            TokenSource::Fixed(token) => token.clone(),
        };
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }

    /// Success is a sub-400 status with a readable body.
    async fn check_status(response: reqwest::Response) -> Result<(), DriveError> {
        if response.status().is_success() {
            response.text().await?;
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}
