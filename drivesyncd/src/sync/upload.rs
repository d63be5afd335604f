use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use drivesync_core::upload::{CreateFolderRequest, UploadTarget};
use drivesync_core::{DriveItem, FOLDER_MIME_TYPE};

use crate::fs::{LocalEntry, LocalFs};

use super::SyncError;
use super::index::RemoteIndex;
use super::remote::RemoteStore;
use super::timestamps::{MTIME_SLACK, format_nanos, parse_rfc3339};

/// Content at or below this size goes through the single-round multipart
/// path; anything larger uses the resumable protocol.
pub const LARGE_FILE_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;

/// Pushes pending local paths to the remote store: folders first, shortest
/// path first, then files. Vanished paths are quietly dropped. Returns
/// whether anything was actually written remotely; remote failures abort
/// the batch so the cycle never half-finishes an upload pass.
pub async fn run_upload_batch<R: RemoteStore>(
    remote: &R,
    fs: &LocalFs,
    index: &mut RemoteIndex,
    pending: &mut BTreeSet<PathBuf>,
    known: &mut HashSet<PathBuf>,
) -> Result<bool, SyncError> {
    let mut wrote = false;

    let mut stats: Vec<(PathBuf, LocalEntry)> = Vec::new();
    for path in pending.clone() {
        match fs.stat(&path).await {
            Ok(entry) => stats.push((path, entry)),
            Err(_) => {
                // Removed between detection and upload.
                crate::debug_log!("{} disappeared before upload", path.display());
                pending.remove(&path);
                known.remove(&path);
            }
        }
    }

    // Lexicographic order puts every parent before its children, so a
    // folder created here is already in the index when its contents come up.
    for (path, entry) in stats.iter().filter(|(_, entry)| entry.is_dir) {
        if index.contains_key(path) {
            continue;
        }
        crate::debug_log!("{} does not exist on server", path.display());
        if let Some(folder) = create_remote_folder(remote, path, entry, index).await? {
            index.insert(path.clone(), folder);
            wrote = true;
        }
    }

    for (path, entry) in stats.iter().filter(|(_, entry)| !entry.is_dir) {
        match index.get(path) {
            None => {
                crate::debug_log!("{} does not exist on server", path.display());
                wrote |= create_remote_file(remote, fs, path, entry, index).await?;
            }
            Some(existing) => {
                wrote |= update_remote_file(remote, fs, path, entry, existing).await?;
            }
        }
    }
    Ok(wrote)
}

async fn create_remote_folder<R: RemoteStore>(
    remote: &R,
    path: &Path,
    entry: &LocalEntry,
    index: &RemoteIndex,
) -> Result<Option<DriveItem>, SyncError> {
    let Some(parent_id) = parent_in_index(path, index) else {
        // Parent folder is not remote yet; the next cycle picks this up.
        crate::debug_log!("parent of {} is not indexed yet", path.display());
        return Ok(None);
    };
    let id = allocate_id(remote).await?;
    remote
        .create_folder(&CreateFolderRequest {
            id: id.clone(),
            name: entry.name.clone(),
            mime_type: FOLDER_MIME_TYPE.to_string(),
            parents: vec![parent_id],
            modified_time: format_nanos(entry.modified)?,
        })
        .await?;
    Ok(Some(DriveItem {
        id,
        name: entry.name.clone(),
        mime_type: FOLDER_MIME_TYPE.to_string(),
        ..DriveItem::default()
    }))
}

async fn create_remote_file<R: RemoteStore>(
    remote: &R,
    fs: &LocalFs,
    path: &Path,
    entry: &LocalEntry,
    index: &RemoteIndex,
) -> Result<bool, SyncError> {
    let Some(parent_id) = parent_in_index(path, index) else {
        crate::debug_log!("parent of {} is not indexed yet", path.display());
        return Ok(false);
    };
    let id = allocate_id(remote).await?;
    let target = UploadTarget::Create {
        id,
        name: entry.name.clone(),
        parents: vec![parent_id],
        modified_time: format_nanos(entry.modified)?,
    };
    send_file(remote, fs, &target, path, entry.size).await
}

async fn update_remote_file<R: RemoteStore>(
    remote: &R,
    fs: &LocalFs,
    path: &Path,
    entry: &LocalEntry,
    existing: &DriveItem,
) -> Result<bool, SyncError> {
    let remote_modified = parse_rfc3339(&existing.modified_time)?;
    if entry.modified - remote_modified <= MTIME_SLACK {
        return Ok(false);
    }
    let local_md5 = match fs.md5_of_file(path).await {
        Ok(digest) => digest,
        Err(err) => {
            crate::debug_log!("could not hash {}: {err}", path.display());
            return Ok(false);
        }
    };
    if local_md5 == existing.md5 {
        return Ok(false);
    }
    crate::debug_log!(
        "{} is newer locally and md5s differ ({local_md5} vs {})",
        path.display(),
        existing.md5
    );
    let target = UploadTarget::Update {
        id: existing.id.clone(),
        modified_time: format_nanos(entry.modified)?,
    };
    send_file(remote, fs, &target, path, entry.size).await
}

/// Dispatches to the small multipart or the resumable path. This is the
/// only place aware that two upload paths exist.
async fn send_file<R: RemoteStore>(
    remote: &R,
    fs: &LocalFs,
    target: &UploadTarget,
    path: &Path,
    size: u64,
) -> Result<bool, SyncError> {
    if size > LARGE_FILE_THRESHOLD_BYTES {
        remote.upload_resumable(target, path, size).await?;
        return Ok(true);
    }
    match fs.read(path).await {
        Ok(content) => {
            remote.upload_small(target, &content).await?;
            Ok(true)
        }
        Err(err) => {
            crate::debug_log!("could not read {} for upload: {err}", path.display());
            Ok(false)
        }
    }
}

fn parent_in_index(path: &Path, index: &RemoteIndex) -> Option<String> {
    let parent = path.parent()?;
    index.get(parent).map(|item| item.id.clone())
}

async fn allocate_id<R: RemoteStore>(remote: &R) -> Result<String, SyncError> {
    remote
        .generate_ids(1)
        .await?
        .into_iter()
        .next()
        .ok_or(SyncError::NoGeneratedIds)
}
