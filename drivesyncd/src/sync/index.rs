use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use drivesync_core::DriveItem;

use super::SyncError;
use super::remote::RemoteStore;

/// Local-path → remote-metadata snapshot. Three of these live through a
/// cycle: the scoped upload index, the resolver-built download index and
/// the cleanup-time general index.
pub type RemoteIndex = HashMap<PathBuf, DriveItem>;

/// Configured sync roots: local folder → remote folder id. Read once at
/// startup, immutable afterwards.
pub type BaseFolderMap = BTreeMap<PathBuf, String>;

/// Walks the shared folders from the configured roots downward, one
/// list-children call per folder, and records every discovered child under
/// its reconstructed local path. Base folders are seeded as id-only stubs.
///
/// With `scope` given, subtrees containing no pending path are skipped
/// entirely. Any remote error propagates: an upload planned against a
/// partial index would re-create existing items under new identities.
pub async fn build_remote_index<R: RemoteStore>(
    remote: &R,
    bases: &BaseFolderMap,
    scope: Option<&BTreeSet<PathBuf>>,
) -> Result<RemoteIndex, SyncError> {
    let mut index = RemoteIndex::new();
    let mut work: Vec<(PathBuf, String)> = Vec::new();
    for (local, id) in bases {
        if subtree_is_needed(local, scope) {
            index.insert(local.clone(), DriveItem::stub(id.clone()));
            work.push((local.clone(), id.clone()));
        }
    }

    while let Some((folder_path, folder_id)) = work.pop() {
        crate::debug_log!("getting items in shared folder {}", folder_path.display());
        for child in remote.list_children(&folder_id).await? {
            let child_path = folder_path.join(&child.name);
            if child.is_folder() && subtree_is_needed(&child_path, scope) {
                work.push((child_path.clone(), child.id.clone()));
            }
            index.insert(child_path, child);
        }
    }
    Ok(index)
}

fn subtree_is_needed(folder: &Path, scope: Option<&BTreeSet<PathBuf>>) -> bool {
    match scope {
        None => true,
        Some(pending) => pending.iter().any(|path| path.starts_with(folder)),
    }
}
