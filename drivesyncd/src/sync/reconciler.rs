use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use drivesync_core::DriveItem;
use time::OffsetDateTime;

use crate::fs::LocalFs;

use super::SyncError;
use super::cleanup::run_cleanup;
use super::clock::Clock;
use super::download::{plan_downloads, run_download_batch};
use super::index::{BaseFolderMap, RemoteIndex, build_remote_index};
use super::remote::RemoteStore;
use super::resolver::build_download_index;
use super::scan::scan_local;
use super::timestamps::{SENTINEL, format_seconds_utc, parse_rfc3339};
use super::upload::run_upload_batch;
use super::verify::{verify_downloads, verify_uploads};

const CLEANUP_HOUR_UTC: u8 = 2;
const CLEANUP_MIN_INTERVAL: time::Duration = time::Duration::hours(14);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    NotVerified,
    Verified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Writes happened; verification is deferred to the next pass.
    Wrote,
    /// Every pending entry verified and the barrier advanced.
    Verified,
    /// Some pending work could not be confirmed yet.
    Unverified,
}

/// The whole reconciliation state in one owned aggregate: pending sets,
/// indices, the known-path high-water mark and the verified barrier. One
/// cycle runs to completion before the next begins; nothing here is
/// shared across threads.
pub struct Reconciler<R, C> {
    remote: R,
    fs: LocalFs,
    clock: C,
    bases: BaseFolderMap,
    cadence: Duration,
    known: HashSet<PathBuf>,
    pending_uploads: BTreeSet<PathBuf>,
    pending_downloads: BTreeMap<PathBuf, DriveItem>,
    upload_index: RemoteIndex,
    download_index: RemoteIndex,
    state: SyncState,
    verified_at: OffsetDateTime,
    verified_at_plus_one: OffsetDateTime,
    most_recent_seen: OffsetDateTime,
    cleaned_at: OffsetDateTime,
}

impl<R: RemoteStore, C: Clock> Reconciler<R, C> {
    pub fn new(remote: R, fs: LocalFs, clock: C, bases: BaseFolderMap, cadence: Duration) -> Self {
        Self {
            remote,
            fs,
            clock,
            bases,
            cadence,
            known: HashSet::new(),
            pending_uploads: BTreeSet::new(),
            pending_downloads: BTreeMap::new(),
            upload_index: RemoteIndex::new(),
            download_index: RemoteIndex::new(),
            state: SyncState::NotVerified,
            verified_at: SENTINEL,
            verified_at_plus_one: SENTINEL,
            most_recent_seen: SENTINEL,
            cleaned_at: SENTINEL,
        }
    }

    /// Records every path currently present locally, so later scans can
    /// tell a fresh arrival from a file that was always there.
    pub async fn prime_known_paths(&mut self) {
        for base in self.bases.keys().cloned().collect::<Vec<_>>() {
            match self.fs.walk(&base).await {
                Ok(entries) => {
                    for entry in entries {
                        self.known.insert(entry.path);
                    }
                }
                Err(err) => crate::debug_log!("cannot walk {}: {err}", base.display()),
            }
        }
    }

    pub async fn run_forever(&mut self) {
        self.prime_known_paths().await;
        loop {
            match self.run_cycle().await {
                Ok(outcome) => crate::debug_log!("cycle finished: {outcome:?}"),
                Err(err) => println!("sync cycle failed: {err}"),
            }
            tokio::time::sleep(self.cadence).await;
        }
    }

    /// One pass of the state machine: scan → upload → scan → download →
    /// verify → maybe-cleanup. Index-build and upload failures abort the
    /// pass; the next cycle redoes everything from the reset barrier.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, SyncError> {
        if self.state == SyncState::NotVerified {
            self.reset_barrier();
        }

        crate::debug_log!("checking for new or modified local files");
        if let Some(newest) = scan_local(
            &self.fs,
            &self.bases,
            self.verified_at,
            &mut self.known,
            &mut self.pending_uploads,
        )
        .await
        {
            self.observe(newest);
        }

        let mut wrote = false;
        if !self.pending_uploads.is_empty() {
            crate::debug_log!("preparing to upload {} entries", self.pending_uploads.len());
            self.upload_index =
                build_remote_index(&self.remote, &self.bases, Some(&self.pending_uploads)).await?;
            wrote |= run_upload_batch(
                &self.remote,
                &self.fs,
                &mut self.upload_index,
                &mut self.pending_uploads,
                &mut self.known,
            )
            .await?;
        }

        let since = format_seconds_utc(self.verified_at_plus_one)?;
        crate::debug_log!("querying items modified after {since}");
        let modified = self.remote.list_modified_since(&since).await?;
        for item in &modified {
            if let Ok(stamp) = parse_rfc3339(&item.modified_time) {
                self.observe(stamp);
            }
        }
        if !modified.is_empty() {
            crate::debug_log!("{} remote items were modified", modified.len());
            let extra_folder_search = self.verified_at == SENTINEL;
            self.download_index =
                build_download_index(&self.remote, &self.bases, &modified, extra_folder_search)
                    .await?;
            plan_downloads(
                &self.fs,
                &self.bases,
                &self.download_index,
                &mut self.pending_downloads,
            )
            .await;
        }

        if !self.pending_downloads.is_empty() {
            crate::debug_log!(
                "preparing to download {} entries",
                self.pending_downloads.len()
            );
            wrote |=
                run_download_batch(&self.remote, &self.fs, &self.pending_downloads, &mut self.known)
                    .await;
        }

        if wrote {
            // Items written moments ago can still sit inside the remote
            // modified-since window; force one more full scan pass before
            // trusting a verification.
            self.state = SyncState::NotVerified;
            return Ok(CycleOutcome::Wrote);
        }

        if !self.pending_uploads.is_empty() {
            crate::debug_log!("verifying uploads against fresh metadata");
            self.upload_index =
                build_remote_index(&self.remote, &self.bases, Some(&self.pending_uploads)).await?;
            verify_uploads(&self.fs, &self.upload_index, &mut self.pending_uploads).await;
        }
        if !self.pending_downloads.is_empty() {
            crate::debug_log!("verifying downloads against fresh metadata");
            self.download_index = build_remote_index(&self.remote, &self.bases, None).await?;
            verify_downloads(&self.fs, &self.download_index, &mut self.pending_downloads).await;
        }

        let outcome = if self.pending_uploads.is_empty() && self.pending_downloads.is_empty() {
            self.advance_barrier();
            self.upload_index.clear();
            self.download_index.clear();
            self.state = SyncState::Verified;
            CycleOutcome::Verified
        } else {
            crate::debug_log!("not verified, will try again next time");
            self.state = SyncState::NotVerified;
            CycleOutcome::Unverified
        };

        self.maybe_run_cleanup().await;
        crate::debug_log!("api calls so far: {}", self.remote.api_calls());
        Ok(outcome)
    }

    async fn maybe_run_cleanup(&mut self) {
        let now = self.clock.now();
        if now.hour() != CLEANUP_HOUR_UTC {
            return;
        }
        if now - self.cleaned_at < CLEANUP_MIN_INTERVAL {
            return;
        }
        match run_cleanup(&self.remote, &self.bases).await {
            Ok(deleted) => {
                crate::debug_log!("cleanup removed {deleted} orphaned item(s)");
                self.cleaned_at = now;
                // The shared tree may have shrunk; re-verify from scratch.
                self.reset_barrier();
                self.state = SyncState::NotVerified;
            }
            Err(err) => println!("cleanup failed: {err}"),
        }
    }

    fn observe(&mut self, stamp: OffsetDateTime) {
        if stamp > self.most_recent_seen {
            self.most_recent_seen = stamp;
        }
    }

    fn reset_barrier(&mut self) {
        self.verified_at = SENTINEL;
        self.verified_at_plus_one = SENTINEL;
    }

    fn advance_barrier(&mut self) {
        self.verified_at = self.most_recent_seen;
        self.verified_at_plus_one = self.verified_at + time::Duration::seconds(1);
        crate::debug_log!("verified, new barrier is {}", self.verified_at);
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
