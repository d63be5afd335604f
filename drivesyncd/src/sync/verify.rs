use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use drivesync_core::DriveItem;

use crate::fs::LocalFs;

use super::index::RemoteIndex;

/// A path leaves the upload set iff the freshly rebuilt index confirms it:
/// folders by presence, files by MD5 agreement. Paths missing from the
/// index stay pending for the next cycle; paths gone locally were deleted
/// concurrently and are dropped.
pub async fn verify_uploads(
    fs: &LocalFs,
    index: &RemoteIndex,
    pending: &mut BTreeSet<PathBuf>,
) {
    for path in pending.clone() {
        let entry = match fs.stat(&path).await {
            Ok(entry) => entry,
            Err(err) => {
                println!("error from stat: {err}");
                pending.remove(&path);
                continue;
            }
        };
        let Some(remote_item) = index.get(&path) else {
            crate::debug_log!("{} not on server yet", path.display());
            continue;
        };
        if entry.is_dir {
            pending.remove(&path);
            continue;
        }
        match fs.md5_of_file(&path).await {
            Ok(local_md5) if local_md5 == remote_item.md5 => {
                pending.remove(&path);
            }
            _ => crate::debug_log!("md5 did not match for {}", path.display()),
        }
    }
}

/// A path leaves the download set iff the remote folder exists as a local
/// directory, or the local content hashes to the remote MD5.
pub async fn verify_downloads(
    fs: &LocalFs,
    index: &RemoteIndex,
    pending: &mut BTreeMap<PathBuf, DriveItem>,
) {
    for (path, _) in pending.clone() {
        let Some(remote_item) = index.get(&path) else {
            continue;
        };
        if remote_item.is_folder() {
            if let Ok(entry) = fs.stat(&path).await
                && entry.is_dir
            {
                pending.remove(&path);
            }
        } else {
            let local_md5 = fs.md5_of_file(&path).await.unwrap_or_default();
            if local_md5 == remote_item.md5 {
                pending.remove(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_item(id: &str, md5: &str) -> DriveItem {
        DriveItem {
            id: id.into(),
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            modified_time: "2024-01-01T00:00:00Z".into(),
            md5: md5.into(),
            parents: vec!["R0".into()],
        }
    }

    #[tokio::test]
    async fn upload_is_confirmed_only_on_md5_agreement() {
        let dir = tempdir().unwrap();
        let matching = dir.path().join("match.txt");
        let differing = dir.path().join("differ.txt");
        std::fs::write(&matching, b"hello").unwrap();
        std::fs::write(&differing, b"other").unwrap();

        let index = RemoteIndex::from([
            (
                matching.clone(),
                file_item("F1", "5d41402abc4b2a76b9719d911017c592"),
            ),
            (
                differing.clone(),
                file_item("F2", "5d41402abc4b2a76b9719d911017c592"),
            ),
        ]);
        let mut pending = BTreeSet::from([matching.clone(), differing.clone()]);

        verify_uploads(&LocalFs, &index, &mut pending).await;

        assert!(!pending.contains(&matching));
        assert!(pending.contains(&differing));
    }

    #[tokio::test]
    async fn unindexed_upload_stays_pending_for_retry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("late.txt");
        std::fs::write(&path, b"hello").unwrap();

        let index = RemoteIndex::new();
        let mut pending = BTreeSet::from([path.clone()]);
        verify_uploads(&LocalFs, &index, &mut pending).await;

        assert!(pending.contains(&path));
    }

    #[tokio::test]
    async fn locally_deleted_upload_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");

        let index = RemoteIndex::from([(path.clone(), file_item("F1", "irrelevant"))]);
        let mut pending = BTreeSet::from([path.clone()]);
        verify_uploads(&LocalFs, &index, &mut pending).await;

        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn folder_upload_is_confirmed_by_presence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub");
        std::fs::create_dir(&path).unwrap();

        let folder = DriveItem {
            id: "D1".into(),
            name: "sub".into(),
            mime_type: "application/vnd.google-apps.folder".into(),
            ..DriveItem::default()
        };
        let index = RemoteIndex::from([(path.clone(), folder)]);
        let mut pending = BTreeSet::from([path.clone()]);
        verify_uploads(&LocalFs, &index, &mut pending).await;

        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn download_is_confirmed_by_md5_or_directory_presence() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        let dir_path = dir.path().join("sub");
        std::fs::write(&file_path, b"hello").unwrap();
        std::fs::create_dir(&dir_path).unwrap();

        let folder = DriveItem {
            id: "D1".into(),
            name: "sub".into(),
            mime_type: "application/vnd.google-apps.folder".into(),
            ..DriveItem::default()
        };
        let index = RemoteIndex::from([
            (
                file_path.clone(),
                file_item("F1", "5d41402abc4b2a76b9719d911017c592"),
            ),
            (dir_path.clone(), folder.clone()),
        ]);
        let mut pending = BTreeMap::from([
            (file_path.clone(), file_item("F1", "5d41402abc4b2a76b9719d911017c592")),
            (dir_path.clone(), folder),
        ]);

        verify_downloads(&LocalFs, &index, &mut pending).await;

        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn download_missing_from_fresh_index_stays_pending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let index = RemoteIndex::new();
        let mut pending =
            BTreeMap::from([(path.clone(), file_item("F1", "5d41402abc4b2a76b9719d911017c592"))]);
        verify_downloads(&LocalFs, &index, &mut pending).await;

        assert!(pending.contains_key(&path));
    }
}
