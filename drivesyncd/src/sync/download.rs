use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use drivesync_core::DriveItem;

use crate::fs::LocalFs;

use super::index::{BaseFolderMap, RemoteIndex};
use super::remote::RemoteStore;
use super::timestamps::{MTIME_SLACK, parse_rfc3339};

/// Decides which indexed remote entries actually need fetching: anything
/// absent locally, or any file the remote side has clearly newer with
/// different content. Entries that turn out current are unpended.
pub async fn plan_downloads(
    fs: &LocalFs,
    bases: &BaseFolderMap,
    index: &RemoteIndex,
    pending: &mut BTreeMap<PathBuf, DriveItem>,
) {
    for (path, item) in index {
        if bases.contains_key(path) {
            continue;
        }
        let Ok(entry) = fs.stat(path).await else {
            pending.insert(path.clone(), item.clone());
            continue;
        };
        if entry.is_dir {
            pending.remove(path);
            continue;
        }
        let remote_is_newer = parse_rfc3339(&item.modified_time)
            .map(|remote_modified| remote_modified - entry.modified > MTIME_SLACK)
            .unwrap_or(false);
        if !remote_is_newer {
            pending.remove(path);
            continue;
        }
        let local_md5 = fs.md5_of_file(path).await.unwrap_or_default();
        if local_md5 == item.md5 {
            pending.remove(path);
        } else {
            pending.insert(path.clone(), item.clone());
        }
    }
}

/// Creates pending folders first (shortest path first falls out of the
/// lexicographic order), then streams each file and stamps its mtime from
/// the remote snapshot. Individual failures are logged and retried next
/// cycle; the partial-file guarantee lives in the store client.
pub async fn run_download_batch<R: RemoteStore>(
    remote: &R,
    fs: &LocalFs,
    pending: &BTreeMap<PathBuf, DriveItem>,
    known: &mut HashSet<PathBuf>,
) -> bool {
    let mut wrote = false;

    for (path, _) in pending.iter().filter(|(_, item)| item.is_folder()) {
        match fs.create_dir(path).await {
            Ok(()) => {
                // Remember it now so the next scan is not surprised by a
                // folder it created itself.
                known.insert(path.clone());
                wrote = true;
                crate::debug_log!("created local folder {}", path.display());
            }
            Err(err) => println!("{err}"),
        }
    }

    for (path, item) in pending.iter().filter(|(_, item)| !item.is_folder()) {
        match remote.download_file(&item.id, path).await {
            Ok(()) => {
                known.insert(path.clone());
                wrote = true;
                match parse_rfc3339(&item.modified_time) {
                    Ok(modified) => {
                        if let Err(err) = fs.set_mtime(path, modified) {
                            println!("{err}");
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            Err(err) => println!("{err}"),
        }
    }

    wrote
}
