use std::io;
use std::path::{Path, PathBuf};

use md5::Context;
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;

const MD5_CHUNK_BYTES: usize = 64 * 1024;

/// One observed filesystem entry. Directory walks and stats both produce
/// these so callers never touch `std::fs::Metadata` directly.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: OffsetDateTime,
}

/// Thin adapter over the local filesystem: walk, stat, read, mkdir, set
/// mtime, delete. The reconciler goes through this everywhere so tests can
/// point it at temp trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub async fn stat(&self, path: &Path) -> io::Result<LocalEntry> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(LocalEntry {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified: OffsetDateTime::from(meta.modified()?),
        })
    }

    /// Recursive walk with an explicit work list, bounded by tree depth.
    /// The root itself is included, matching the scan semantics of a sync
    /// root that can itself be touched.
    pub async fn walk(&self, root: &Path) -> io::Result<Vec<LocalEntry>> {
        let mut entries = vec![self.stat(root).await?];
        let mut pending_dirs = vec![root.to_path_buf()];
        while let Some(dir) = pending_dirs.pop() {
            let mut listing = tokio::fs::read_dir(&dir).await?;
            while let Some(child) = listing.next_entry().await? {
                let entry = self.stat(&child.path()).await?;
                if entry.is_dir {
                    pending_dirs.push(entry.path.clone());
                }
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Creates a single directory level; parents are expected to exist
    /// because callers create folders shortest-path-first.
    pub async fn create_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    pub async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    pub fn set_mtime(&self, path: &Path, modified: OffsetDateTime) -> io::Result<()> {
        // Opened read-only so directories can be stamped too.
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        file.set_times(std::fs::FileTimes::new().set_modified(modified.into()))
    }

    /// Streaming MD5 of a file's content, hex encoded.
    pub async fn md5_of_file(&self, path: &Path) -> io::Result<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut context = Context::new();
        let mut buffer = vec![0u8; MD5_CHUNK_BYTES];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
        }
        Ok(format!("{:x}", context.compute()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[tokio::test]
    async fn walk_includes_root_and_nested_entries() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let entries = LocalFs.walk(dir.path()).await.unwrap();
        let paths: Vec<_> = entries.iter().map(|entry| entry.path.clone()).collect();

        assert!(paths.contains(&dir.path().to_path_buf()));
        assert!(paths.contains(&dir.path().join("a.txt")));
        assert!(paths.contains(&dir.path().join("sub")));
        assert!(paths.contains(&dir.path().join("sub/b.txt")));
        assert_eq!(entries.len(), 4);
    }

    #[tokio::test]
    async fn md5_matches_known_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            LocalFs.md5_of_file(&path).await.unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[tokio::test]
    async fn set_mtime_round_trips_through_stat() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamped.txt");
        std::fs::write(&path, b"x").unwrap();

        let stamp = datetime!(2024-01-02 12:00:00 UTC);
        LocalFs.set_mtime(&path, stamp).unwrap();

        let entry = LocalFs.stat(&path).await.unwrap();
        assert_eq!(entry.modified, stamp);
    }
}
