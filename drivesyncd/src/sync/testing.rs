//! In-memory remote store fake and a fixed clock, shared by the engine
//! tests. The fake honors the same semantic contracts as the HTTP client:
//! strict modified-since comparison, first-parent listing, md5 bookkeeping
//! on every upload.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use drivesync_core::upload::{CreateFolderRequest, UploadTarget};
use drivesync_core::{DriveError, DriveItem};
use time::OffsetDateTime;

use super::clock::Clock;
use super::remote::RemoteStore;
use super::timestamps::parse_rfc3339;

pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

#[derive(Default)]
struct FakeState {
    items: HashMap<String, DriveItem>,
    content: HashMap<String, Vec<u8>>,
    owned: Vec<String>,
    deleted: Vec<String>,
    next_id: u64,
    calls: u64,
    fail_next_uploads: u32,
    download_calls: u32,
    small_uploads: u32,
    resumable_uploads: u32,
}

pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn seed_folder(&self, id: &str, name: &str, parent: &str, modified: &str, owned: bool) {
        self.seed(
            DriveItem {
                id: id.into(),
                name: name.into(),
                mime_type: "application/vnd.google-apps.folder".into(),
                modified_time: modified.into(),
                md5: String::new(),
                parents: parent_vec(parent),
            },
            None,
            owned,
        );
    }

    pub fn seed_file(
        &self,
        id: &str,
        name: &str,
        parent: &str,
        modified: &str,
        content: &[u8],
        owned: bool,
    ) {
        self.seed(
            DriveItem {
                id: id.into(),
                name: name.into(),
                mime_type: "application/octet-stream".into(),
                modified_time: modified.into(),
                md5: md5_hex(content),
                parents: parent_vec(parent),
            },
            Some(content.to_vec()),
            owned,
        );
    }

    fn seed(&self, item: DriveItem, content: Option<Vec<u8>>, owned: bool) {
        let mut state = self.lock();
        if owned {
            state.owned.push(item.id.clone());
        }
        if let Some(content) = content {
            state.content.insert(item.id.clone(), content);
        }
        state.items.insert(item.id.clone(), item);
    }

    pub fn item(&self, id: &str) -> Option<DriveItem> {
        self.lock().items.get(id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<DriveItem> {
        self.lock().items.values().find(|item| item.name == name).cloned()
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.lock().content.get(id).cloned()
    }

    pub fn fail_next_uploads(&self, count: u32) {
        self.lock().fail_next_uploads = count;
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn download_calls(&self) -> u32 {
        self.lock().download_calls
    }

    pub fn small_uploads(&self) -> u32 {
        self.lock().small_uploads
    }

    pub fn resumable_uploads(&self) -> u32 {
        self.lock().resumable_uploads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake remote mutex poisoned")
    }

    fn apply_upload(
        state: &mut FakeState,
        target: &UploadTarget,
        content: Vec<u8>,
    ) -> Result<(), DriveError> {
        if state.fail_next_uploads > 0 {
            state.fail_next_uploads -= 1;
            return Err(injected("injected upload failure"));
        }
        match target {
            UploadTarget::Create {
                id,
                name,
                parents,
                modified_time,
            } => {
                state.owned.push(id.clone());
                state.content.insert(id.clone(), content.clone());
                state.items.insert(
                    id.clone(),
                    DriveItem {
                        id: id.clone(),
                        name: name.clone(),
                        mime_type: "application/octet-stream".into(),
                        modified_time: modified_time.clone(),
                        md5: md5_hex(&content),
                        parents: parents.clone(),
                    },
                );
            }
            UploadTarget::Update { id, modified_time } => {
                let item = state
                    .items
                    .get_mut(id)
                    .ok_or_else(|| injected("update of unknown item"))?;
                item.modified_time = modified_time.clone();
                item.md5 = md5_hex(&content);
                state.content.insert(id.clone(), content);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveItem>, DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        Ok(state
            .items
            .values()
            .filter(|item| item.first_parent() == Some(folder_id))
            .cloned()
            .collect())
    }

    async fn list_modified_since(&self, timestamp: &str) -> Result<Vec<DriveItem>, DriveError> {
        let since = parse_rfc3339(timestamp).map_err(|_| injected("bad modified-since stamp"))?;
        let mut state = self.lock();
        state.calls += 1;
        Ok(state
            .items
            .values()
            .filter(|item| {
                parse_rfc3339(&item.modified_time)
                    .map(|modified| modified > since)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_owned(&self) -> Result<Vec<DriveItem>, DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        let owned = state.owned.clone();
        Ok(owned
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect())
    }

    async fn get_metadata(&self, id: &str) -> Result<DriveItem, DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| injected("metadata for unknown id"))
    }

    async fn generate_ids(&self, count: usize) -> Result<Vec<String>, DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        Ok((0..count)
            .map(|_| {
                state.next_id += 1;
                format!("gen-{}", state.next_id)
            })
            .collect())
    }

    async fn create_folder(&self, request: &CreateFolderRequest) -> Result<(), DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        state.owned.push(request.id.clone());
        state.items.insert(
            request.id.clone(),
            DriveItem {
                id: request.id.clone(),
                name: request.name.clone(),
                mime_type: request.mime_type.clone(),
                modified_time: request.modified_time.clone(),
                md5: String::new(),
                parents: request.parents.clone(),
            },
        );
        Ok(())
    }

    async fn upload_small(&self, target: &UploadTarget, content: &[u8]) -> Result<(), DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        state.small_uploads += 1;
        Self::apply_upload(&mut state, target, content.to_vec())
    }

    async fn upload_resumable(
        &self,
        target: &UploadTarget,
        source: &Path,
        _size: u64,
    ) -> Result<(), DriveError> {
        let content = std::fs::read(source)?;
        let mut state = self.lock();
        state.calls += 1;
        state.resumable_uploads += 1;
        Self::apply_upload(&mut state, target, content)
    }

    async fn download_file(&self, id: &str, target: &Path) -> Result<(), DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        state.download_calls += 1;
        let content = state
            .content
            .get(id)
            .cloned()
            .ok_or_else(|| injected("download of unknown id"))?;
        std::fs::write(target, content)?;
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<(), DriveError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.items.remove(id).is_none() {
            return Err(injected("delete of unknown id"));
        }
        state.content.remove(id);
        state.owned.retain(|owned| owned != id);
        state.deleted.push(id.to_string());
        Ok(())
    }

    fn api_calls(&self) -> u64 {
        self.lock().calls
    }
}

fn parent_vec(parent: &str) -> Vec<String> {
    if parent.is_empty() {
        Vec::new()
    } else {
        vec![parent.to_string()]
    }
}

fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

fn injected(message: &str) -> DriveError {
    DriveError::Io(std::io::Error::other(message.to_string()))
}
