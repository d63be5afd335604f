use std::io::BufRead;

use drivesync_core::DriveItem;

use super::SyncError;
use super::index::{BaseFolderMap, RemoteIndex, build_remote_index};
use super::remote::RemoteStore;

/// Deletes items owned by the daemon's identity that are no longer linked
/// under any shared folder. The general index is rebuilt first and any
/// failure aborts the pass: deletions must never run against a partial
/// picture of the shared tree. Returns how many items were removed.
pub async fn run_cleanup<R: RemoteStore>(
    remote: &R,
    bases: &BaseFolderMap,
) -> Result<usize, SyncError> {
    let general_index = build_remote_index(remote, bases, None).await?;
    let owned = remote.list_owned().await?;

    let mut deleted = 0usize;
    for item in owned {
        if is_reachable(&item, &general_index) {
            continue;
        }
        crate::debug_log!("deleting {} ({})", item.name, item.id);
        match remote.delete_item(&item.id).await {
            Ok(()) => deleted += 1,
            Err(err) => println!("{err}"),
        }
    }
    Ok(deleted)
}

fn is_reachable(item: &DriveItem, index: &RemoteIndex) -> bool {
    match item.first_parent() {
        // An item with no parents at all is kept rather than risk a wrong
        // delete on a half-reported listing.
        None => true,
        Some(parent_id) => index.values().any(|indexed| indexed.id == parent_id),
    }
}

/// CLI `delete`: asks for confirmation on stdin, then cleans.
pub async fn run_interactive_cleanup<R: RemoteStore>(
    remote: &R,
    bases: &BaseFolderMap,
) -> Result<(), SyncError> {
    println!();
    println!("Are you sure you want to delete files belonging to the service account?");
    println!("This only deletes files that are no longer in the user's shared folders.");
    println!("Type Y then hit Enter to proceed.");

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    if line.trim_end() != "Y" {
        println!("Aborting");
        return Ok(());
    }

    crate::debug_log!("proceeding to delete files");
    let deleted = run_cleanup(remote, bases).await?;
    println!("removed {deleted} orphaned item(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeRemote;
    use std::path::PathBuf;

    fn bases() -> BaseFolderMap {
        BaseFolderMap::from([(PathBuf::from("root"), "R0".to_string())])
    }

    #[tokio::test]
    async fn orphans_outside_the_shared_tree_are_deleted() {
        let remote = FakeRemote::new();
        // X hangs off the shared base folder; Y hangs off a foreign parent.
        remote.seed_file("X", "kept.txt", "R0", "2024-01-01T00:00:00Z", b"keep", true);
        remote.seed_file("Y", "orphan.txt", "Rq", "2024-01-01T00:00:00Z", b"drop", true);

        let deleted = run_cleanup(&remote, &bases()).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(remote.deleted_ids(), vec!["Y".to_string()]);
        assert!(remote.item("X").is_some());
    }

    #[tokio::test]
    async fn parentless_items_are_never_deleted() {
        let remote = FakeRemote::new();
        remote.seed_file("Z", "floating.txt", "", "2024-01-01T00:00:00Z", b"?", true);

        let deleted = run_cleanup(&remote, &bases()).await.unwrap();

        assert_eq!(deleted, 0);
        assert!(remote.item("Z").is_some());
    }

    #[tokio::test]
    async fn items_nested_under_an_indexed_folder_are_kept() {
        let remote = FakeRemote::new();
        remote.seed_folder("D1", "docs", "R0", "2024-01-01T00:00:00Z", true);
        remote.seed_file("F1", "a.txt", "D1", "2024-01-01T00:00:00Z", b"hello", true);

        let deleted = run_cleanup(&remote, &bases()).await.unwrap();

        assert_eq!(deleted, 0);
        assert!(remote.item("F1").is_some());
    }

    #[tokio::test]
    async fn user_owned_items_are_untouched() {
        let remote = FakeRemote::new();
        // Not owned by the daemon identity, even though it is orphaned.
        remote.seed_file("U1", "users.txt", "Rq", "2024-01-01T00:00:00Z", b"user", false);

        let deleted = run_cleanup(&remote, &bases()).await.unwrap();

        assert_eq!(deleted, 0);
        assert!(remote.item("U1").is_some());
    }
}
