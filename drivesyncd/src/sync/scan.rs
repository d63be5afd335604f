use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::fs::LocalFs;

use super::index::BaseFolderMap;

const IGNORED_NAMES: &[&str] = &["desktop.ini"];

/// Walks every base folder and pends entries that are new to the daemon or
/// modified strictly after the verified barrier. Returns the newest mtime
/// among the pended entries. Unwalkable bases are skipped; a sync root may
/// legitimately not exist locally until the first download creates it.
pub async fn scan_local(
    fs: &LocalFs,
    bases: &BaseFolderMap,
    verified_at: OffsetDateTime,
    known: &mut HashSet<PathBuf>,
    pending_uploads: &mut BTreeSet<PathBuf>,
) -> Option<OffsetDateTime> {
    let mut newest: Option<OffsetDateTime> = None;
    for base in bases.keys() {
        let entries = match fs.walk(base).await {
            Ok(entries) => entries,
            Err(err) => {
                crate::debug_log!("cannot walk {}: {err}", base.display());
                continue;
            }
        };
        for entry in entries {
            if IGNORED_NAMES.contains(&entry.name.as_str()) {
                continue;
            }
            if !known.contains(&entry.path) {
                crate::debug_log!("{} suddenly appeared", entry.path.display());
                known.insert(entry.path.clone());
                pending_uploads.insert(entry.path.clone());
                fold_newest(&mut newest, entry.modified);
            } else if entry.modified > verified_at {
                crate::debug_log!("{} has changed", entry.path.display());
                pending_uploads.insert(entry.path);
                fold_newest(&mut newest, entry.modified);
            }
        }
    }
    newest
}

fn fold_newest(newest: &mut Option<OffsetDateTime>, candidate: OffsetDateTime) {
    if newest.is_none_or(|current| candidate > current) {
        *newest = Some(candidate);
    }
}
