//! Upload listing cache (§4.5, L5): a per-session map of remote
//! directories to a coherent snapshot, kept up to date by both freshly
//! parsed `LIST`/`MLSD` text and by speculative change reports from
//! workers performing uploads/renames/deletes while a listing may still
//! be in flight.

use crate::ftp::listing::{built_in_server_types, detect, parse_mlsd, RuleSet};
use crate::ftp::path::{compare_names, paths_equal};
use crate::ftp::types::{FtpEntry, FtpEntryKind, PathType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Snapshot lifecycle state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Ready,
    InProgress,
    InProgressButObsolete,
    InProgressButMayBeOutdated,
    NotAccessible,
}

/// One item in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    pub name: String,
    pub kind: FtpEntryKind,
    /// `None` encodes the source's "unknown"/"needs-update" size.
    pub size: Option<u64>,
}

/// A speculative mutation recorded against a snapshot (§3, §4.5).
#[derive(Debug)]
pub enum ChangeRecord {
    CreateDir { name: String },
    Delete { name: String },
    StoreFile { name: String, size: Option<u64> },
    FileUploaded { name: String, size: u64 },
    Rename { from: String, to: String },
    UnknownChange,
}

struct Snapshot {
    path: String,
    path_type: PathType,
    state: SnapshotState,
    items: Vec<CacheItem>,
    pending: Vec<ChangeRecord>,
    listing_start_time: DateTime<Utc>,
    latest_change_time: DateTime<Utc>,
    waiters: Vec<(String, u64)>,
    from_panel: bool,
}

impl Snapshot {
    fn sort_items(&mut self) {
        let pt = self.path_type;
        self.items.sort_by(|a, b| compare_names(pt, &a.name, &b.name));
    }

    fn apply_change(&mut self, change: ChangeRecord) {
        match change {
            ChangeRecord::CreateDir { name } => {
                self.upsert(name, FtpEntryKind::Directory, None);
            }
            ChangeRecord::Delete { name } => {
                self.items.retain(|i| !paths_equal(self.path_type, &i.name, &name));
            }
            ChangeRecord::StoreFile { name, size } => {
                self.upsert(name, FtpEntryKind::File, size);
            }
            ChangeRecord::FileUploaded { name, size } => {
                self.upsert(name, FtpEntryKind::File, Some(size));
            }
            ChangeRecord::Rename { .. } => {
                // Target semantics vary too much across path types to
                // merge safely; the whole directory is treated as
                // obsolete instead (handled by the caller via
                // `report_rename`, which forces a full invalidation).
            }
            ChangeRecord::UnknownChange => {}
        }
        self.sort_items();
    }

    fn upsert(&mut self, name: String, kind: FtpEntryKind, size: Option<u64>) {
        if let Some(existing) = self.items.iter_mut().find(|i| paths_equal(self.path_type, &i.name, &name)) {
            existing.kind = kind;
            existing.size = size;
        } else {
            self.items.push(CacheItem { name, kind, size });
        }
    }
}

/// Outcome of a `get_listing` lookup (§4.5).
pub enum LookupResult {
    /// The snapshot was `ready`; here is the named item, if it exists.
    Hit { item: Option<CacheItem> },
    /// A listing is already in flight; caller has been queued as a waiter.
    InProgress,
    NotAccessible,
    /// No entry existed; caller must now fetch and call `listing_finished`.
    MustFetch,
}

pub struct ListingCache {
    inner: Mutex<HashMap<String, Snapshot>>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn key(path_type: PathType, path: &str) -> String {
        crate::ftp::path::normalize(path_type, path)
    }

    /// Parse `text` and install it as the snapshot for `path`, unless the
    /// current entry is newer. If the existing entry is `in-progress`,
    /// the freshly parsed listing becomes a preview: the pending change
    /// log is replayed onto it and it's marked
    /// `in-progress-but-obsolete`.
    pub fn add_or_update_listing(
        &self,
        path: &str,
        path_type: PathType,
        text: &str,
        date: DateTime<Utc>,
        listing_start_time: DateTime<Utc>,
        welcome: &str,
        syst: &str,
    ) {
        let entries = parse_listing_text(text, welcome, syst, date);
        let items: Vec<CacheItem> = entries
            .into_iter()
            .map(|e| CacheItem {
                name: e.name,
                kind: e.kind,
                size: Some(e.size),
            })
            .collect();

        let mut g = self.inner.lock().unwrap();
        let key = Self::key(path_type, path);

        let was_in_progress = g.get(&key).map(|s| s.state == SnapshotState::InProgress).unwrap_or(false);
        let pending = g.get(&key).map(|s| s.pending.clone()).unwrap_or_default();

        let mut snapshot = Snapshot {
            path: path.to_string(),
            path_type,
            state: if was_in_progress { SnapshotState::InProgressButObsolete } else { SnapshotState::Ready },
            items,
            pending: Vec::new(),
            listing_start_time,
            latest_change_time: date,
            waiters: g.get(&key).map(|s| s.waiters.clone()).unwrap_or_default(),
            from_panel: false,
        };
        snapshot.sort_items();
        for change in pending {
            snapshot.apply_change(change);
        }
        g.insert(key, snapshot);
    }

    /// Cache-hit semantics (§4.5): ready → synchronous answer;
    /// in-progress* → register as waiter; not-accessible → flagged;
    /// miss → install an in-progress placeholder and tell the caller to
    /// fetch.
    pub fn get_listing(
        &self,
        path: &str,
        path_type: PathType,
        name: &str,
        waiter: Option<(String, u64)>,
        listing_start_time: DateTime<Utc>,
    ) -> LookupResult {
        let mut g = self.inner.lock().unwrap();
        let key = Self::key(path_type, path);

        match g.get_mut(&key) {
            Some(snap) if snap.state == SnapshotState::Ready => {
                let item = snap.items.iter().find(|i| paths_equal(path_type, &i.name, name)).cloned();
                LookupResult::Hit { item }
            }
            Some(snap)
                if matches!(
                    snap.state,
                    SnapshotState::InProgress | SnapshotState::InProgressButObsolete | SnapshotState::InProgressButMayBeOutdated
                ) =>
            {
                if let Some(w) = waiter {
                    snap.waiters.push(w);
                }
                LookupResult::InProgress
            }
            Some(snap) if snap.state == SnapshotState::NotAccessible => LookupResult::NotAccessible,
            _ => {
                g.insert(
                    key,
                    Snapshot {
                        path: path.to_string(),
                        path_type,
                        state: SnapshotState::InProgress,
                        items: Vec::new(),
                        pending: Vec::new(),
                        listing_start_time,
                        latest_change_time: listing_start_time,
                        waiters: waiter.into_iter().collect(),
                        from_panel: false,
                    },
                );
                LookupResult::MustFetch
            }
        }
    }

    /// A listing attempt failed. Returns the waiter list to notify
    /// (drained exactly once, per §4.5's invariant).
    pub fn listing_failed(&self, path: &str, path_type: PathType, not_accessible: bool) -> Vec<(String, u64)> {
        let mut g = self.inner.lock().unwrap();
        let key = Self::key(path_type, path);
        match g.get_mut(&key) {
            Some(snap) if snap.state == SnapshotState::InProgressButObsolete => {
                // Benign: we already have a usable (if stale) listing.
                snap.state = SnapshotState::Ready;
                std::mem::take(&mut snap.waiters)
            }
            Some(snap) => {
                let waiters = std::mem::take(&mut snap.waiters);
                if not_accessible {
                    snap.state = SnapshotState::NotAccessible;
                } else {
                    g.remove(&key);
                }
                waiters
            }
            None => Vec::new(),
        }
    }

    /// A listing attempt completed successfully; parse, commit pending
    /// changes, and return the waiter list to notify.
    pub fn listing_finished(
        &self,
        path: &str,
        path_type: PathType,
        text: &str,
        date: DateTime<Utc>,
        welcome: &str,
        syst: &str,
    ) -> Vec<(String, u64)> {
        let entries = parse_listing_text(text, welcome, syst, date);
        let items: Vec<CacheItem> = entries
            .into_iter()
            .map(|e| CacheItem {
                name: e.name,
                kind: e.kind,
                size: Some(e.size),
            })
            .collect();

        let mut g = self.inner.lock().unwrap();
        let key = Self::key(path_type, path);
        let (pending, waiters, listing_start_time) = match g.get(&key) {
            Some(s) => (s.pending.clone(), s.waiters.clone(), s.listing_start_time),
            None => (Vec::new(), Vec::new(), date),
        };

        let mut snapshot = Snapshot {
            path: path.to_string(),
            path_type,
            state: SnapshotState::Ready,
            items,
            pending: Vec::new(),
            listing_start_time,
            latest_change_time: date,
            waiters: Vec::new(),
            from_panel: false,
        };
        snapshot.sort_items();
        for change in pending {
            snapshot.apply_change(change);
        }
        g.insert(key, snapshot);
        waiters
    }

    /// Record a speculative change. Applied in place on `ready`/
    /// `in-progress-but-obsolete`; queued on `in-progress`; dropped on
    /// `in-progress-but-may-be-outdated`/`not-accessible` (§4.5).
    pub fn report_change(&self, path: &str, path_type: PathType, change: ChangeRecord, at: DateTime<Utc>) {
        let mut g = self.inner.lock().unwrap();
        let key = Self::key(path_type, path);
        if let Some(snap) = g.get_mut(&key) {
            match snap.state {
                SnapshotState::Ready | SnapshotState::InProgressButObsolete => {
                    snap.apply_change(change);
                    snap.latest_change_time = at;
                }
                SnapshotState::InProgress => {
                    snap.pending.push(change);
                    snap.latest_change_time = at;
                }
                SnapshotState::InProgressButMayBeOutdated | SnapshotState::NotAccessible => {}
            }
        }
    }

    /// Renames invalidate the whole directory rather than attempting a
    /// merge (§4.5, deliberate).
    pub fn report_rename(&self, path: &str, path_type: PathType) {
        let mut g = self.inner.lock().unwrap();
        let key = Self::key(path_type, path);
        g.remove(&key);
    }

    pub fn invalidate(&self, path: &str, path_type: PathType) {
        let mut g = self.inner.lock().unwrap();
        g.remove(&Self::key(path_type, path));
    }

    pub fn state_of(&self, path: &str, path_type: PathType) -> Option<SnapshotState> {
        let g = self.inner.lock().unwrap();
        g.get(&Self::key(path_type, path)).map(|s| s.state)
    }
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ChangeRecord {
    fn clone(&self) -> Self {
        match self {
            ChangeRecord::CreateDir { name } => ChangeRecord::CreateDir { name: name.clone() },
            ChangeRecord::Delete { name } => ChangeRecord::Delete { name: name.clone() },
            ChangeRecord::StoreFile { name, size } => ChangeRecord::StoreFile { name: name.clone(), size: *size },
            ChangeRecord::FileUploaded { name, size } => ChangeRecord::FileUploaded { name: name.clone(), size: *size },
            ChangeRecord::Rename { from, to } => ChangeRecord::Rename { from: from.clone(), to: to.clone() },
            ChangeRecord::UnknownChange => ChangeRecord::UnknownChange,
        }
    }
}

/// Parse listing text via MLSD facts when it looks like MLSD, otherwise
/// autodetect a server type and apply its rule set.
fn parse_listing_text(text: &str, welcome: &str, syst: &str, date: DateTime<Utc>) -> Vec<FtpEntry> {
    if text.lines().next().is_some_and(|l| l.contains("type=") && l.contains(';')) {
        return parse_mlsd(text);
    }
    let types = built_in_server_types();
    let sample: String = text.lines().take(5).collect::<Vec<_>>().join("\n");
    match detect(&types, welcome, syst, &sample) {
        Some(server_type) => server_type.rules.parse_listing(text, date),
        None => RuleSet::default().parse_listing(text, date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap()
    }

    #[test]
    fn miss_installs_in_progress_placeholder() {
        let cache = ListingCache::new();
        let result = cache.get_listing("/home", PathType::Unix, "a.txt", Some(("w1".into(), 1)), now());
        assert!(matches!(result, LookupResult::MustFetch));
        assert_eq!(cache.state_of("/home", PathType::Unix), Some(SnapshotState::InProgress));
    }

    #[test]
    fn finish_then_hit_ready() {
        let cache = ListingCache::new();
        cache.get_listing("/home", PathType::Unix, "a.txt", None, now());
        let waiters = cache.listing_finished(
            "/home",
            PathType::Unix,
            "-rw-r--r-- 1 u g 10 Jan 02 12:34 a.txt",
            now(),
            "220 vsftpd",
            "215 UNIX Type: L8",
        );
        assert!(waiters.is_empty());
        match cache.get_listing("/home", PathType::Unix, "a.txt", None, now()) {
            LookupResult::Hit { item } => assert_eq!(item.unwrap().name, "a.txt"),
            _ => panic!("expected hit"),
        }
    }

    #[test]
    fn in_progress_change_is_queued_then_replayed() {
        let cache = ListingCache::new();
        cache.get_listing("/home", PathType::Unix, "a.txt", None, now());
        cache.report_change(
            "/home",
            PathType::Unix,
            ChangeRecord::StoreFile { name: "b.txt".into(), size: Some(5) },
            now(),
        );
        cache.listing_finished("/home", PathType::Unix, "", now(), "", "");
        match cache.get_listing("/home", PathType::Unix, "b.txt", None, now()) {
            LookupResult::Hit { item } => assert_eq!(item.unwrap().size, Some(5)),
            _ => panic!("expected hit"),
        }
    }

    #[test]
    fn obsolete_failure_is_benign() {
        let cache = ListingCache::new();
        cache.get_listing("/home", PathType::Unix, "a.txt", None, now());
        cache.add_or_update_listing("/home", PathType::Unix, "", now(), now(), "", "");
        let waiters = cache.listing_failed("/home", PathType::Unix, false);
        assert!(waiters.is_empty());
        assert_eq!(cache.state_of("/home", PathType::Unix), Some(SnapshotState::Ready));
    }

    #[test]
    fn rename_invalidates_whole_directory() {
        let cache = ListingCache::new();
        cache.listing_finished("/home", PathType::Unix, "-rw-r--r-- 1 u g 1 Jan 02 12:34 a.txt", now(), "", "");
        cache.report_rename("/home", PathType::Unix);
        assert_eq!(cache.state_of("/home", PathType::Unix), None);
    }
}
