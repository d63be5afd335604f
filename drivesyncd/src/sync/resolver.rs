use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use drivesync_core::DriveItem;

use super::SyncError;
use super::index::{BaseFolderMap, RemoteIndex};
use super::remote::RemoteStore;

// Remote trees are shallow in practice; the bound only exists so a
// malformed parent cycle cannot spin the climb forever.
const MAX_ANCESTOR_DEPTH: usize = 256;

/// Rebuilds local-equivalent paths for a flat list of modified remote
/// items. The store has no path API, so each item's chain of first parents
/// is fetched until it reaches a configured base folder; entries whose
/// chain cannot be tied off are dropped. Remote errors propagate: a wrong
/// reconstruction would download into the wrong place.
pub async fn build_download_index<R: RemoteStore>(
    remote: &R,
    bases: &BaseFolderMap,
    modified: &[DriveItem],
    extra_folder_search: bool,
) -> Result<RemoteIndex, SyncError> {
    let base_ids: HashSet<&str> = bases.values().map(String::as_str).collect();
    let mut by_id: HashMap<String, DriveItem> = HashMap::new();
    let mut index = RemoteIndex::new();
    for (local, id) in bases {
        by_id.insert(id.clone(), DriveItem::stub(id.clone()));
        index.insert(local.clone(), DriveItem::stub(id.clone()));
    }

    for item in modified {
        // Base folders are already seeded as anchors; replacing one with
        // its real metadata would send the climb past the sync root.
        if base_ids.contains(item.id.as_str()) {
            continue;
        }
        by_id.insert(item.id.clone(), item.clone());

        // On the first pass after a barrier reset, a freshly appeared
        // folder can hold children whose own timestamps predate the
        // modified-since window; pull them in explicitly.
        if extra_folder_search && item.is_folder() {
            for child in remote.list_children(&item.id).await? {
                by_id.insert(child.id.clone(), child);
            }
        }

        fetch_missing_ancestors(remote, item, &mut by_id).await?;
    }

    for (id, item) in &by_id {
        if let Some(path) = tie_off_path(id, &by_id, bases) {
            index.insert(path, item.clone());
        }
    }
    Ok(index)
}

async fn fetch_missing_ancestors<R: RemoteStore>(
    remote: &R,
    item: &DriveItem,
    by_id: &mut HashMap<String, DriveItem>,
) -> Result<(), SyncError> {
    // Base folders are pre-seeded, so the climb stops at the sync root.
    let mut next = item.first_parent().map(str::to_string);
    while let Some(parent_id) = next {
        if parent_id.is_empty() || by_id.contains_key(&parent_id) {
            break;
        }
        let parent = remote.get_metadata(&parent_id).await?;
        next = parent.first_parent().map(str::to_string);
        by_id.insert(parent_id, parent);
    }
    Ok(())
}

fn tie_off_path(
    id: &str,
    by_id: &HashMap<String, DriveItem>,
    bases: &BaseFolderMap,
) -> Option<PathBuf> {
    let mut names: Vec<&str> = Vec::new();
    let mut current = by_id.get(id)?;
    for _ in 0..MAX_ANCESTOR_DEPTH {
        match current.first_parent() {
            Some(parent_id) => {
                names.push(current.name.as_str());
                current = by_id.get(parent_id)?;
            }
            None => {
                let mut path = bases
                    .iter()
                    .find(|(_, base_id)| base_id.as_str() == current.id)
                    .map(|(local, _)| local.clone())?;
                for name in names.iter().rev() {
                    path.push(name);
                }
                return Some(path);
            }
        }
    }
    None
}
