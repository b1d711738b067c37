//! Transfer queue (§4.7, L7 boundary "queue" half): holds queue items,
//! concurrency limits, retry bookkeeping and live progress. Adapted from
//! a simpler upload/download queue into the richer queue-item model
//! (`QueueItemType`/`QueueItemState`, forced actions, target-file
//! state) the worker state machine needs.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::*;
use crate::ftp::TRANSFER_PROGRESS;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

pub struct TransferQueue {
    pub items: HashMap<String, TransferItem>,
    pub order: VecDeque<String>,
    pub config: TransferQueueConfig,
    semaphore: Arc<Semaphore>,
}

impl TransferQueue {
    pub fn new(config: TransferQueueConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            items: HashMap::new(),
            order: VecDeque::new(),
            config,
            semaphore,
        }
    }

    /// `add-item` (§4.7): enqueue a new transfer and return its id.
    pub fn add_item(
        &mut self,
        session_id: &str,
        direction: TransferDirection,
        local_path: &str,
        remote_path: &str,
        transfer_type: TransferType,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let item = TransferItem {
            id: id.clone(),
            session_id: session_id.to_string(),
            direction,
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            state: TransferState::Queued,
            total_bytes: None,
            transferred_bytes: 0,
            speed_bps: 0,
            eta_seconds: None,
            error: None,
            retry_count: 0,
            max_retries: self.config.default_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            transfer_type,
            resume_offset: 0,
            last_problem: None,
            last_os_error: None,
            forced_action: ForcedAction::None,
            target_file_state: TargetFileState::Unknown,
            ascii_transfer: transfer_type == TransferType::Ascii,
        };
        self.items.insert(id.clone(), item);
        self.order.push_back(id.clone());
        id
    }

    /// `update-item-state` (§4.7).
    pub fn update_item_state(
        &mut self,
        id: &str,
        state: TransferState,
        problem: Option<FtpError>,
    ) -> FtpResult<()> {
        let item = self.items.get_mut(id).ok_or_else(|| FtpError::not_found(format!("queue item {} not found", id)))?;
        item.state = state.clone();
        if let Some(err) = problem {
            item.last_problem = Some(format!("{:?}", err.kind));
            item.last_os_error = err.os_error;
            item.error = Some(err.message);
        }
        match state {
            TransferState::InProgress if item.started_at.is_none() => item.started_at = Some(Utc::now()),
            TransferState::Completed | TransferState::Failed | TransferState::Cancelled => {
                item.completed_at = Some(Utc::now())
            }
            _ => {}
        }
        Ok(())
    }

    /// `update-force-action` (§4.7).
    pub fn update_force_action(&mut self, id: &str, action: ForcedAction) {
        if let Some(item) = self.items.get_mut(id) {
            item.forced_action = action;
        }
    }

    /// `update-tgt-file-state` (§4.7).
    pub fn update_target_file_state(&mut self, id: &str, state: TargetFileState) {
        if let Some(item) = self.items.get_mut(id) {
            item.target_file_state = state;
        }
    }

    /// `update-file-size` (§4.7).
    pub fn update_file_size(&mut self, id: &str, size: u64) {
        if let Some(item) = self.items.get_mut(id) {
            item.total_bytes = Some(size);
        }
    }

    /// `update-ascii-transfer-mode` (§4.7).
    pub fn update_ascii_transfer_mode(&mut self, id: &str, ascii: bool) {
        if let Some(item) = self.items.get_mut(id) {
            item.ascii_transfer = ascii;
        }
    }

    /// `get-count` (§4.7).
    pub fn get_count(&self) -> usize {
        self.items.len()
    }

    /// `cancel-work` (§4.7): mark every queued/in-progress item
    /// cancelled; returns whether anything was actually in flight.
    pub fn cancel_work(&mut self) -> bool {
        let mut any_in_progress = false;
        for item in self.items.values_mut() {
            match item.state {
                TransferState::Queued => item.state = TransferState::Cancelled,
                TransferState::InProgress | TransferState::Retrying => {
                    item.state = TransferState::Cancelled;
                    any_in_progress = true;
                }
                _ => {}
            }
        }
        any_in_progress
    }

    pub fn cancel(&mut self, transfer_id: &str) -> FtpResult<()> {
        let item = self
            .items
            .get_mut(transfer_id)
            .ok_or_else(|| FtpError::not_found(format!("Transfer {} not found", transfer_id)))?;
        match item.state {
            TransferState::Queued | TransferState::InProgress | TransferState::Retrying => {
                item.state = TransferState::Cancelled;
                item.completed_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(FtpError::invalid_config(format!("Cannot cancel transfer in state {:?}", item.state))),
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_work();
    }

    /// Re-enqueue a failed item (§4.1 "move item back to waiting").
    pub fn retry(&mut self, transfer_id: &str) -> FtpResult<()> {
        let item = self
            .items
            .get_mut(transfer_id)
            .ok_or_else(|| FtpError::not_found(format!("Transfer {} not found", transfer_id)))?;
        if !matches!(item.state, TransferState::Failed | TransferState::Retrying) {
            return Err(FtpError::invalid_config("Can only retry failed or retrying transfers"));
        }
        item.state = TransferState::Queued;
        item.retry_count += 1;
        item.started_at = None;
        item.completed_at = None;
        self.order.push_back(transfer_id.to_string());
        Ok(())
    }

    pub fn prune(&mut self, max_age_secs: i64) {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let to_remove: Vec<String> = self
            .items
            .iter()
            .filter(|(_, item)| {
                matches!(
                    item.state,
                    TransferState::Completed | TransferState::Cancelled | TransferState::Failed
                ) && item.completed_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &to_remove {
            self.items.remove(id);
            self.order.retain(|x| x != id);
        }
    }

    pub fn next_pending(&mut self) -> Option<String> {
        while let Some(id) = self.order.pop_front() {
            if let Some(item) = self.items.get(&id) {
                if item.state == TransferState::Queued {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Requeue an item without consuming a retry slot (used for
    /// "auto-retry immediate", §4.1).
    pub fn requeue_immediate(&mut self, transfer_id: &str) {
        if let Some(item) = self.items.get_mut(transfer_id) {
            item.state = TransferState::Queued;
        }
        self.order.push_back(transfer_id.to_string());
    }

    pub fn list(&self) -> Vec<&TransferItem> {
        self.items.values().collect()
    }

    pub fn get_progress(&self, transfer_id: &str) -> Option<TransferProgress> {
        TRANSFER_PROGRESS.lock().ok().and_then(|map| map.get(transfer_id).cloned())
    }

    pub fn all_progress(&self) -> Vec<TransferProgress> {
        TRANSFER_PROGRESS.lock().map(|map| map.values().cloned().collect()).unwrap_or_default()
    }

    pub fn mark_started(&mut self, id: &str) {
        if let Some(item) = self.items.get_mut(id) {
            item.state = TransferState::InProgress;
            item.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self, id: &str, transferred: u64) {
        if let Some(item) = self.items.get_mut(id) {
            item.state = TransferState::Completed;
            item.transferred_bytes = transferred;
            item.completed_at = Some(Utc::now());
            item.target_file_state = TargetFileState::Transferred;
        }
    }

    pub fn mark_failed(&mut self, id: &str, error: &str) {
        if let Some(item) = self.items.get_mut(id) {
            item.state = TransferState::Failed;
            item.error = Some(error.to_string());
            item.completed_at = Some(Utc::now());
        }
    }

    pub fn semaphore(&self) -> Arc<Semaphore> {
        self.semaphore.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TransferQueueConfig {
        TransferQueueConfig::default()
    }

    #[test]
    fn add_then_next_pending() {
        let mut q = TransferQueue::new(cfg());
        let id = q.add_item("s1", TransferDirection::Download, "/tmp/a", "/a", TransferType::Binary);
        assert_eq!(q.next_pending(), Some(id));
        assert_eq!(q.next_pending(), None);
    }

    #[test]
    fn cancel_work_marks_queued_and_in_progress() {
        let mut q = TransferQueue::new(cfg());
        let a = q.add_item("s1", TransferDirection::Download, "/tmp/a", "/a", TransferType::Binary);
        let b = q.add_item("s1", TransferDirection::Download, "/tmp/b", "/b", TransferType::Binary);
        q.mark_started(&b);
        assert!(q.cancel_work());
        assert_eq!(q.items[&a].state, TransferState::Cancelled);
        assert_eq!(q.items[&b].state, TransferState::Cancelled);
    }

    #[test]
    fn retry_only_from_failed() {
        let mut q = TransferQueue::new(cfg());
        let id = q.add_item("s1", TransferDirection::Upload, "/tmp/a", "/a", TransferType::Binary);
        assert!(q.retry(&id).is_err());
        q.mark_failed(&id, "boom");
        assert!(q.retry(&id).is_ok());
        assert_eq!(q.items[&id].state, TransferState::Queued);
        assert_eq!(q.items[&id].retry_count, 1);
    }

    #[test]
    fn update_item_state_records_problem() {
        let mut q = TransferQueue::new(cfg());
        let id = q.add_item("s1", TransferDirection::Upload, "/tmp/a", "/a", TransferType::Binary);
        let err = FtpError::transfer_failed("disk full");
        q.update_item_state(&id, TransferState::Failed, Some(err)).unwrap();
        assert_eq!(q.items[&id].last_problem.as_deref(), Some("TransferFailed"));
    }
}
