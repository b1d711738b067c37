//! High-level orchestrator — owns sessions, pool, queue, operations,
//! bookmarks. This is the boundary a host UI (or the demo CLI) talks to;
//! it has no knowledge of any particular host's plugin framework.

use crate::ftp::client::FtpClient;
use crate::ftp::error::FtpResult;
use crate::ftp::listing_cache::ListingCache;
use crate::ftp::opened_files::OpenedFilesRegistry;
use crate::ftp::operation::Operation;
use crate::ftp::pool::FtpPool;
use crate::ftp::queue::TransferQueue;
use crate::ftp::types::*;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Thread-safe state a host application hands to its command dispatch.
pub type FtpServiceState = Arc<Mutex<FtpService>>;

pub struct FtpService {
    pub pool: FtpPool,
    pub queue: TransferQueue,
    pub operations: HashMap<String, Arc<Operation>>,
    pub bookmarks: Vec<FtpBookmark>,
    /// Cross-session lock table backing `ftp::file_ops`'s worker-driven
    /// transfers; shared so two sessions can't clobber the same remote
    /// file at once.
    pub opened_files: OpenedFilesRegistry,
    /// Upload listing cache (§4.5) updated as worker-driven uploads finish.
    pub listing_cache: ListingCache,
    /// Engine-wide transfer policy (resume, ASCII masks, watchdog, retry
    /// budget) passed into every direct and queued transfer.
    pub engine: EngineConfig,
}

impl Default for FtpService {
    fn default() -> Self {
        Self {
            pool: FtpPool::new(),
            queue: TransferQueue::new(TransferQueueConfig::default()),
            operations: HashMap::new(),
            bookmarks: Vec::new(),
            opened_files: OpenedFilesRegistry::new(),
            listing_cache: ListingCache::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl FtpService {
    /// Create a new service wrapped in `Arc<Mutex<_>>` for host state.
    pub fn new() -> FtpServiceState {
        Arc::new(Mutex::new(FtpService::default()))
    }

    // ─── Connection lifecycle ────────────────────────────────────

    /// Connect a new FTP session and add it to the pool.
    pub async fn connect(&mut self, config: FtpConnectionConfig) -> Result<FtpSessionInfo, String> {
        info!("FTP connecting to {}:{}", config.host, config.port);
        let client = FtpClient::connect(config).await.map_err(|e| e.to_string())?;
        let info = client.info.clone();
        self.pool.insert(client).map_err(|e| e.to_string())?;
        Ok(info)
    }

    /// Disconnect a session.
    pub async fn disconnect(&mut self, session_id: &str) -> Result<(), String> {
        if let Some(mut client) = self.pool.remove(session_id) {
            client.quit().await.map_err(|e| e.to_string())?;
            info!("FTP session {} disconnected", session_id);
            Ok(())
        } else {
            Err(format!("Session {} not found", session_id))
        }
    }

    /// Disconnect all sessions.
    pub async fn disconnect_all(&mut self) -> Result<(), String> {
        self.pool.disconnect_all().await;
        Ok(())
    }

    /// Get session info.
    pub async fn get_session_info(&self, session_id: &str) -> Result<FtpSessionInfo, String> {
        let client = self.pool.get(session_id).map_err(|e| e.to_string())?;
        Ok(client.info.clone())
    }

    /// List all sessions.
    pub async fn list_sessions(&self) -> Vec<FtpSessionInfo> {
        self.pool.list_sessions()
    }

    /// Send NOOP to keep alive.
    pub async fn ping(&mut self, session_id: &str) -> Result<bool, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        match client.noop().await {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    // ─── Directory operations ────────────────────────────────────

    /// List directory contents.
    pub async fn list_directory(&mut self, session_id: &str, path: Option<&str>, options: Option<ListOptions>) -> Result<Vec<FtpEntry>, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        let opts = options.unwrap_or_default();
        let mut entries = client.list(path, opts.prefer_mlsd).await.map_err(|e| e.to_string())?;

        if let Some(ref filter) = opts.filter {
            let pattern = glob::Pattern::new(filter).map_err(|e| e.to_string())?;
            entries.retain(|e| pattern.matches(&e.name));
        }

        if !opts.show_hidden {
            entries.retain(|e| !e.name.starts_with('.'));
        }

        if let Some(ref sort_by) = opts.sort_by {
            match sort_by {
                FtpSortField::Name => entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
                FtpSortField::Size => entries.sort_by(|a, b| a.size.cmp(&b.size)),
                FtpSortField::Modified => entries.sort_by(|a, b| a.modified.cmp(&b.modified)),
                FtpSortField::Kind => entries.sort_by(|a, b| format!("{:?}", a.kind).cmp(&format!("{:?}", b.kind))),
            }
        }

        if opts.sort_order == Some(FtpSortOrder::Desc) {
            entries.reverse();
        }

        Ok(entries)
    }

    /// Change working directory.
    pub async fn set_directory(&mut self, session_id: &str, path: &str) -> Result<String, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.cwd(path).await.map_err(|e| e.to_string())
    }

    /// Get current directory.
    pub async fn get_current_directory(&mut self, session_id: &str) -> Result<String, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        Ok(client.info.current_directory.clone())
    }

    /// Create a directory.
    pub async fn mkdir(&mut self, session_id: &str, path: &str) -> Result<String, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.mkdir(path).await.map_err(|e| e.to_string())
    }

    /// Create directories recursively.
    pub async fn mkdir_all(&mut self, session_id: &str, path: &str) -> Result<(), String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.mkdir_all(path).await.map_err(|e| e.to_string())
    }

    /// Remove an empty directory.
    pub async fn rmdir(&mut self, session_id: &str, path: &str) -> Result<(), String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.rmdir(path).await.map_err(|e| e.to_string())
    }

    /// Remove a directory recursively.
    pub async fn rmdir_recursive(&mut self, session_id: &str, path: &str) -> Result<(), String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.rmdir_recursive(path).await.map_err(|e| e.to_string())
    }

    /// Rename a file or directory.
    pub async fn rename(&mut self, session_id: &str, from: &str, to: &str) -> Result<(), String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.rename(from, to).await.map_err(|e| e.to_string())
    }

    /// Delete a remote file.
    pub async fn delete_file(&mut self, session_id: &str, path: &str) -> Result<(), String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.delete(path).await.map_err(|e| e.to_string())
    }

    /// Set file permissions (SITE CHMOD).
    pub async fn chmod(&mut self, session_id: &str, path: &str, mode: &str) -> Result<(), String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.chmod(path, mode).await.map_err(|e| e.to_string())
    }

    // ─── File info ───────────────────────────────────────────────

    /// Get file size (SIZE).
    pub async fn get_file_size(&mut self, session_id: &str, path: &str) -> Result<u64, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.size(path).await.map_err(|e| e.to_string())
    }

    /// Get file modification time (MDTM).
    pub async fn get_modified_time(&mut self, session_id: &str, path: &str) -> Result<String, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.mdtm(path).await.map_err(|e| e.to_string())
    }

    /// Get MLST entry info.
    pub async fn stat_entry(&mut self, session_id: &str, path: &str) -> Result<FtpEntry, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.stat_entry(path).await.map_err(|e| e.to_string())
    }

    // ─── Direct transfers (single-file, no queue) ────────────────

    pub async fn upload(&mut self, session_id: &str, local_path: &str, remote_path: &str) -> Result<u64, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client
            .upload(local_path, remote_path, None, &self.opened_files, &self.listing_cache, &self.engine)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn download(&mut self, session_id: &str, remote_path: &str, local_path: &str) -> Result<u64, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client
            .download(remote_path, local_path, None, &self.opened_files, &self.engine)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn append(&mut self, session_id: &str, local_path: &str, remote_path: &str) -> Result<u64, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.append(local_path, remote_path, None, &self.opened_files).await.map_err(|e| e.to_string())
    }

    pub async fn resume_upload(&mut self, session_id: &str, local_path: &str, remote_path: &str) -> Result<u64, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client
            .resume_upload(local_path, remote_path, None, &self.opened_files, &self.listing_cache, &self.engine)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn resume_download(&mut self, session_id: &str, remote_path: &str, local_path: &str) -> Result<u64, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client
            .resume_download(remote_path, local_path, None, &self.opened_files, &self.engine)
            .await
            .map_err(|e| e.to_string())
    }

    // ─── Transfer queue ──────────────────────────────────────────

    /// Enqueue a transfer, to be picked up by `process_next_transfer`.
    pub fn enqueue_transfer(&mut self, session_id: &str, direction: TransferDirection, local_path: &str, remote_path: &str, transfer_type: TransferType) -> String {
        self.queue.add_item(session_id, direction, local_path, remote_path, transfer_type)
    }

    /// Pop the next queued transfer and drive it to completion against
    /// its session's client, recording the outcome on the queue item.
    /// Returns `None` once the queue is empty.
    pub async fn process_next_transfer(&mut self) -> Option<Result<u64, String>> {
        let id = self.queue.next_pending()?;
        let item = self.queue.items.get(&id)?.clone();
        self.queue.mark_started(&id);

        let client = match self.pool.get_mut(&item.session_id) {
            Ok(c) => c,
            Err(e) => {
                let msg = e.to_string();
                self.queue.mark_failed(&id, &msg);
                return Some(Err(msg));
            }
        };

        let result = match item.direction {
            TransferDirection::Download => {
                client
                    .download(&item.remote_path, &item.local_path, Some(&id), &self.opened_files, &self.engine)
                    .await
            }
            TransferDirection::Upload => {
                client
                    .upload(&item.local_path, &item.remote_path, Some(&id), &self.opened_files, &self.listing_cache, &self.engine)
                    .await
            }
        };

        match result {
            Ok(bytes) => {
                self.queue.mark_completed(&id, bytes);
                Some(Ok(bytes))
            }
            Err(e) => {
                let msg = e.to_string();
                self.queue.mark_failed(&id, &msg);
                Some(Err(msg))
            }
        }
    }

    /// Cancel a queued transfer.
    pub fn cancel_transfer(&mut self, transfer_id: &str) -> Result<(), String> {
        self.queue.cancel(transfer_id).map_err(|e| e.to_string())
    }

    /// Retry a failed transfer.
    pub fn retry_transfer(&mut self, transfer_id: &str) -> Result<(), String> {
        self.queue.retry(transfer_id).map_err(|e| e.to_string())
    }

    /// List all transfers.
    pub fn list_transfers(&self) -> Vec<TransferItem> {
        self.queue.list().into_iter().cloned().collect()
    }

    /// Get transfer progress.
    pub fn get_transfer_progress(&self, transfer_id: &str) -> Option<TransferProgress> {
        self.queue.get_progress(transfer_id)
    }

    /// Get all active progress.
    pub fn get_all_progress(&self) -> Vec<TransferProgress> {
        self.queue.all_progress()
    }

    // ─── Batch operations (§4.7) ─────────────────────────────────

    /// Start a new batch operation (e.g. a multi-file copy/move/delete)
    /// bound to this service's queue.
    pub fn start_operation(&mut self, ascii_masks: Vec<String>, ascii_for_binary: AsciiForBinaryPolicy) -> Arc<Operation> {
        let id = uuid::Uuid::new_v4().to_string();
        let op = Arc::new(Operation::new(id.clone(), ascii_masks, ascii_for_binary));
        self.operations.insert(id, op.clone());
        op
    }

    pub fn get_operation(&self, id: &str) -> Option<Arc<Operation>> {
        self.operations.get(id).cloned()
    }

    pub fn finish_operation(&mut self, id: &str) -> Option<Arc<Operation>> {
        self.operations.remove(id)
    }

    // ─── Diagnostics ─────────────────────────────────────────────

    /// Get diagnostics for a session.
    pub fn get_diagnostics(&self, session_id: &str) -> Result<FtpDiagnostics, String> {
        let client = self.pool.get(session_id).map_err(|e| e.to_string())?;
        Ok(client.diagnostics())
    }

    /// Pool statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // ─── Bookmarks ───────────────────────────────────────────────

    /// List all bookmarks.
    pub fn list_bookmarks(&self) -> Vec<FtpBookmark> {
        self.bookmarks.clone()
    }

    /// Add a bookmark.
    pub fn add_bookmark(&mut self, bookmark: FtpBookmark) -> String {
        let id = bookmark.id.clone();
        self.bookmarks.push(bookmark);
        id
    }

    /// Remove a bookmark.
    pub fn remove_bookmark(&mut self, bookmark_id: &str) -> Result<(), String> {
        let len_before = self.bookmarks.len();
        self.bookmarks.retain(|b| b.id != bookmark_id);
        if self.bookmarks.len() == len_before {
            Err(format!("Bookmark {} not found", bookmark_id))
        } else {
            Ok(())
        }
    }

    /// Update a bookmark.
    pub fn update_bookmark(&mut self, bookmark: FtpBookmark) -> Result<(), String> {
        if let Some(b) = self.bookmarks.iter_mut().find(|b| b.id == bookmark.id) {
            *b = bookmark;
            Ok(())
        } else {
            Err(format!("Bookmark {} not found", bookmark.id))
        }
    }

    // ─── SITE command ────────────────────────────────────────────

    /// Execute a raw SITE command.
    pub async fn site_command(&mut self, session_id: &str, args: &str) -> Result<String, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        let resp = client.site(args).await.map_err(|e| e.to_string())?;
        Ok(resp.text())
    }

    // ─── Raw command ─────────────────────────────────────────────

    /// Execute a raw FTP command (advanced/debugging use).
    pub async fn raw_command(&mut self, session_id: &str, command: &str) -> Result<FtpResponse, String> {
        let client = self.pool.get_mut(session_id).map_err(|e| e.to_string())?;
        client.codec.execute(command).await.map_err(|e| e.to_string())
    }
}

pub async fn connect_standalone(config: FtpConnectionConfig) -> FtpResult<FtpClient> {
    FtpClient::connect(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_round_trip() {
        let mut svc = FtpService::default();
        let bm = FtpBookmark {
            id: "b1".into(),
            label: "Test".into(),
            config: FtpConnectionConfig::default(),
            created_at: chrono::Utc::now(),
            last_used: None,
            tags: vec![],
        };
        svc.add_bookmark(bm);
        assert_eq!(svc.list_bookmarks().len(), 1);
        assert!(svc.remove_bookmark("b1").is_ok());
        assert!(svc.remove_bookmark("b1").is_err());
    }

    #[test]
    fn enqueue_and_cancel_transfer() {
        let mut svc = FtpService::default();
        let id = svc.enqueue_transfer("s1", TransferDirection::Download, "/tmp/a", "/a", TransferType::Binary);
        assert_eq!(svc.list_transfers().len(), 1);
        assert!(svc.cancel_transfer(&id).is_ok());
    }

    #[test]
    fn operation_lifecycle() {
        let mut svc = FtpService::default();
        let op = svc.start_operation(vec!["*.txt".into()], AsciiForBinaryPolicy::Ignore);
        assert!(svc.get_operation(op.id()).is_some());
        assert!(svc.finish_operation(op.id()).is_some());
        assert!(svc.get_operation(op.id()).is_none());
    }
}
