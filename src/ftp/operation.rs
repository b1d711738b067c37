//! Operation boundary (§4.7, L7): the fleet-level grouping a worker
//! reports progress and ASCII/resume policy decisions to. A queue holds
//! items; an operation holds the workers processing one batch job
//! (a multi-file copy/move/delete/chattr) against that queue.

use crate::ftp::speed_meter::SpeedMeter;
use crate::ftp::types::AsciiForBinaryPolicy;
use glob::{MatchOptions, Pattern};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Tally reported once an operation's item count is known
/// (`set-child-items`, §4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildItemCounts {
    pub total: u64,
    pub skipped: u64,
    pub failed: u64,
    pub ui_needed: u64,
}

/// A batch operation: the set of workers, the queue they drain, and the
/// policy knobs a worker consults mid-transfer (ASCII-file detection,
/// resume support) without reaching back into session configuration.
pub struct Operation {
    id: String,
    worker_ids: Mutex<Vec<String>>,
    queue_id: Mutex<Option<String>>,
    child_items: Mutex<ChildItemCounts>,
    blocks_written: AtomicU64,
    bytes_written: AtomicU64,
    ascii_masks: Vec<String>,
    ascii_for_binary: AsciiForBinaryPolicy,
    resume_not_supported: AtomicBool,
    speed_meter: Arc<SpeedMeter>,
    last_activity: Mutex<Instant>,
}

impl Operation {
    pub fn new(id: impl Into<String>, ascii_masks: Vec<String>, ascii_for_binary: AsciiForBinaryPolicy) -> Self {
        Self {
            id: id.into(),
            worker_ids: Mutex::new(Vec::new()),
            queue_id: Mutex::new(None),
            child_items: Mutex::new(ChildItemCounts::default()),
            blocks_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            ascii_masks,
            ascii_for_binary,
            resume_not_supported: AtomicBool::new(false),
            speed_meter: Arc::new(SpeedMeter::new()),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `alloc-new-worker`: reserve a worker slot and return its id.
    pub fn alloc_new_worker(&self) -> String {
        let worker_id = format!("{}-w{}", self.id, self.worker_ids.lock().unwrap().len());
        self.add_worker(&worker_id);
        worker_id
    }

    /// `add-worker`.
    pub fn add_worker(&self, worker_id: &str) {
        self.worker_ids.lock().unwrap().push(worker_id.to_string());
    }

    /// `set-queue`: bind the operation to the queue it drains.
    pub fn set_queue(&self, queue_id: impl Into<String>) {
        *self.queue_id.lock().unwrap() = Some(queue_id.into());
    }

    pub fn queue_id(&self) -> Option<String> {
        self.queue_id.lock().unwrap().clone()
    }

    /// `set-child-items(n, skipped, failed, ui-needed)`.
    pub fn set_child_items(&self, total: u64, skipped: u64, failed: u64, ui_needed: u64) {
        *self.child_items.lock().unwrap() = ChildItemCounts { total, skipped, failed, ui_needed };
    }

    pub fn child_items(&self) -> ChildItemCounts {
        *self.child_items.lock().unwrap()
    }

    /// `add-blk-size-info(bytes, blocks)`: accumulate progress, also
    /// feeding the operation-wide speed meter and last-activity clock.
    pub fn add_blk_size_info(&self, bytes: u64, blocks: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.blocks_written.fetch_add(blocks, Ordering::Relaxed);
        self.speed_meter.on_write(bytes);
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// `is-ascii-file(name, ext)`: matches the configured ASCII-file
    /// mask list (shell-style globs, e.g. `*.txt`).
    pub fn is_ascii_file(&self, name: &str) -> bool {
        let opts = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        self.ascii_masks
            .iter()
            .filter_map(|mask| Pattern::new(mask).ok())
            .any(|pattern| pattern.matches_with(name, opts))
    }

    /// `get-ascii-tr-mode-but-bin-file`: the policy to apply when ASCII
    /// mode was selected but binary content is detected mid-transfer.
    pub fn get_ascii_tr_mode_but_bin_file(&self) -> AsciiForBinaryPolicy {
        self.ascii_for_binary
    }

    /// `set-resume-is-not-supported(bool)`.
    pub fn set_resume_is_not_supported(&self, not_supported: bool) {
        self.resume_not_supported.store(not_supported, Ordering::Relaxed);
    }

    pub fn resume_is_not_supported(&self) -> bool {
        self.resume_not_supported.load(Ordering::Relaxed)
    }

    /// `get-global-transfer-speed-meter`.
    pub fn get_global_transfer_speed_meter(&self) -> Arc<SpeedMeter> {
        self.speed_meter.clone()
    }

    /// `get-global-last-activity-time`.
    pub fn get_global_last_activity_time(&self) -> Instant {
        *self.last_activity.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_file_matches_mask() {
        let op = Operation::new("op1", vec!["*.txt".into(), "*.htm".into()], AsciiForBinaryPolicy::RetryInBinary);
        assert!(op.is_ascii_file("readme.TXT"));
        assert!(!op.is_ascii_file("image.png"));
    }

    #[test]
    fn alloc_new_worker_registers_id() {
        let op = Operation::new("op1", vec![], AsciiForBinaryPolicy::Ignore);
        let w = op.alloc_new_worker();
        assert!(op.worker_ids.lock().unwrap().contains(&w));
    }

    #[test]
    fn add_blk_size_info_accumulates() {
        let op = Operation::new("op1", vec![], AsciiForBinaryPolicy::Ignore);
        op.add_blk_size_info(1024, 1);
        op.add_blk_size_info(2048, 1);
        assert_eq!(op.bytes_written(), 3072);
    }

    #[test]
    fn child_items_round_trip() {
        let op = Operation::new("op1", vec![], AsciiForBinaryPolicy::Ignore);
        op.set_child_items(10, 1, 2, 0);
        let c = op.child_items();
        assert_eq!(c.total, 10);
        assert_eq!(c.failed, 2);
    }
}
