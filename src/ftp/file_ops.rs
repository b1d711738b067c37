//! File-level operations — upload, download, append, resume, delete, etc.
//! All transfer operations update `TRANSFER_PROGRESS`.
//!
//! Download and upload are driven by `ftp::worker`'s reducer: this module
//! owns the socket, the local file and the `DataConnection`/
//! `OpenedFilesRegistry`/`ListingCache` instances for one transfer, and
//! carries out whatever `Effect`s the reducer asks for, feeding replies
//! back in as `WorkerEvent`s. `append` has no REST/ASCII-guard decisions
//! to make (APPE has no resume leg) and the reducer has no vocabulary for
//! it, so it keeps the flatter direct path, still behind a real
//! `OpenedFilesRegistry` lock and a real `DataConnection`.

use crate::ftp::client::FtpClient;
use crate::ftp::data_connection::DataConnection;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::listing_cache::{ChangeRecord, ListingCache};
use crate::ftp::opened_files::{AccessType, OpenedFilesRegistry};
use crate::ftp::path;
use crate::ftp::types::*;
use crate::ftp::worker::{Effect, WorkItem, Worker, WorkerEvent, WorkerState};
use crate::ftp::TRANSFER_PROGRESS;
use chrono::Utc;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Default chunk size for the direct (non-worker) `append` path.
const DEFAULT_CHUNK: usize = 65_536;

/// Releases an `ftp::opened_files` registration when the transfer that
/// acquired it returns, including on an early `?`.
struct FileLockGuard<'a> {
    registry: &'a OpenedFilesRegistry,
    uid: u64,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.close(self.uid);
    }
}

/// ASCII-for-binary guard (§4.1): a NUL byte, or more than 30% of a
/// sample outside printable ASCII/CR/LF/TAB, marks the chunk binary.
fn looks_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let non_text = sample
        .iter()
        .filter(|&&b| b != b'\n' && b != b'\r' && b != b'\t' && !(0x20..=0x7e).contains(&b))
        .count();
    non_text as f64 / sample.len() as f64 > 0.3
}

/// Whether `remote_path`'s file name matches one of the engine's
/// ASCII-transfer masks (shell-style globs, e.g. `*.txt`).
fn is_ascii_match(masks: &[String], remote_path: &str) -> bool {
    let name = remote_path.rsplit(['/', '\\']).next().unwrap_or(remote_path);
    let opts = glob::MatchOptions { case_sensitive: false, require_literal_separator: false, require_literal_leading_dot: false };
    masks.iter().filter_map(|m| glob::Pattern::new(m).ok()).any(|p| p.matches_with(name, opts))
}

impl FtpClient {
    /// Best-effort guess at the remote path type from the SYST banner
    /// probed at connect time. No table maps SYST text to `PathType`
    /// elsewhere in the engine, so this stays local to the transfer path
    /// that needs it for `ftp::opened_files`/`ftp::listing_cache` keys.
    fn path_type(&self) -> PathType {
        let syst = self.info.system_type.as_deref().unwrap_or("").to_lowercase();
        if syst.contains("windows") {
            PathType::Windows
        } else if syst.contains("netware") {
            PathType::Netware
        } else if syst.contains("vms") {
            PathType::Openvms
        } else if syst.contains("mvs") {
            PathType::Mvs
        } else if syst.contains("l8") || syst.contains("unix") {
            PathType::Unix
        } else {
            PathType::Unix
        }
    }

    /// Execute a plain control command and translate the outcome into
    /// the `WorkerEvent` the reducer expects: a reply code on success, or
    /// `cmd-con-closed` on an actual I/O/protocol-level failure. Negative
    /// FTP reply codes (4xx/5xx) never surface as `Err` here — only a
    /// broken connection does — so this mapping is exhaustive.
    async fn issue(&mut self, cmd: &str) -> WorkerEvent {
        match self.codec.execute(cmd).await {
            Ok(resp) => WorkerEvent::CmdReplyReceived { code: resp.code, text: resp.text() },
            Err(e) => WorkerEvent::CmdConClosed { os_error: e.os_error },
        }
    }

    // ─── DOWNLOAD (RETR) ─────────────────────────────────────────

    /// Download a remote file to a local path.
    pub async fn download(
        &mut self,
        remote_path: &str,
        local_path: &str,
        transfer_id: Option<&str>,
        registry: &OpenedFilesRegistry,
        engine: &EngineConfig,
    ) -> FtpResult<u64> {
        self.transfer_download(remote_path, local_path, transfer_id, ForcedAction::None, registry, engine).await
    }

    /// Resume a download, falling back to overwrite if REST is rejected.
    pub async fn resume_download(
        &mut self,
        remote_path: &str,
        local_path: &str,
        transfer_id: Option<&str>,
        registry: &OpenedFilesRegistry,
        engine: &EngineConfig,
    ) -> FtpResult<u64> {
        self.transfer_download(remote_path, local_path, transfer_id, ForcedAction::ResumeOrOverwrite, registry, engine).await
    }

    async fn transfer_download(
        &mut self,
        remote_path: &str,
        local_path: &str,
        transfer_id: Option<&str>,
        forced_action: ForcedAction,
        registry: &OpenedFilesRegistry,
        engine: &EngineConfig,
    ) -> FtpResult<u64> {
        let path_type = self.path_type();
        let (dir, name) = path::split_parent(path_type, remote_path).unwrap_or_else(|| (String::new(), remote_path.to_string()));
        let lock_uid = registry
            .open(&self.id, &dir, path_type, &name, AccessType::Read)
            .map_err(|_| FtpError::local_file_locked(format!("{} is busy", remote_path)))?;
        let _guard = FileLockGuard { registry, uid: lock_uid };

        let local_size_known = if matches!(forced_action, ForcedAction::Resume | ForcedAction::ResumeOrOverwrite) && Path::new(local_path).exists() {
            fs::metadata(local_path).await?.len()
        } else {
            0
        };
        let remote_size = if self.features.size { self.size(remote_path).await.ok() } else { None };
        let ascii_mode = is_ascii_match(&engine.ascii_file_masks, remote_path);

        let item = WorkItem {
            direction: TransferDirection::Download,
            remote_path: remote_path.to_string(),
            local_size_known,
            remote_size,
            forced_action,
            target_file_state: TargetFileState::Unknown,
            ascii_mode,
            ascii_for_binary: engine.ascii_for_binary_file,
            resume_overlap: engine.resume_overlap,
            resume_min_file_size: engine.resume_min_file_size,
            bytes_flushed_since_rest: 0,
            all_data_transferred: false,
            ascii_binary_detected: false,
        };
        let mut worker = Worker::new(item, Duration::from_millis(engine.auto_retry_delay_ms));
        let watchdog = Duration::from_secs(engine.no_data_transfer_timeout_sec.max(1));

        let tid = transfer_id.unwrap_or("").to_string();
        let started = Instant::now();
        let mut transferred = 0u64;
        let mut file: Option<fs::File> = None;
        let mut dc: Option<DataConnection> = None;
        let mut retry_budget = engine.max_connect_attempts.max(1);

        let mut pending: VecDeque<Effect> = VecDeque::new();
        pending.extend(worker.handle_event(WorkerEvent::Activate));

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::SendCommand(cmd) => {
                    let event = if cmd == "PASV" {
                        // PASV/PORT negotiation (plus any TLS wrap) is
                        // fully encapsulated by `open_data_channel`; it
                        // already honours the session's configured
                        // channel mode, so this doesn't re-send PASV on
                        // the wire itself.
                        match self.open_data_channel().await {
                            Ok(stream) => {
                                let mut conn = DataConnection::new(engine.no_data_transfer_timeout_sec.max(1), false);
                                conn.attach(stream);
                                dc = Some(conn);
                                WorkerEvent::CmdReplyReceived { code: 227, text: "Entering Passive Mode".into() }
                            }
                            Err(e) => WorkerEvent::CmdReplyReceived { code: 425, text: e.to_string() },
                        }
                    } else if let Some(rest) = cmd.strip_prefix("REST ") {
                        let offset: u64 = rest.trim().parse().unwrap_or(0);
                        match self.rest(offset).await {
                            Ok(true) => WorkerEvent::CmdReplyReceived { code: 350, text: format!("Restarting at {}", offset) },
                            Ok(false) => WorkerEvent::CmdReplyReceived { code: 502, text: "REST not honoured".into() },
                            Err(e) => WorkerEvent::CmdConClosed { os_error: e.os_error },
                        }
                    } else if cmd.starts_with("PORT ") {
                        // `OpenDataConnectionActive` already established the
                        // connection; this effect only exists for the
                        // happy-path driver to acknowledge, not to put a
                        // second, bogus PORT command on the wire.
                        WorkerEvent::CmdReplyReceived { code: 200, text: "PORT command successful".into() }
                    } else if cmd.starts_with("RETR ") {
                        match self.codec.execute(&cmd).await {
                            Ok(resp) => {
                                pending.extend(worker.handle_event(WorkerEvent::DataConConnected));
                                WorkerEvent::CmdReplyReceived { code: resp.code, text: resp.text() }
                            }
                            Err(e) => WorkerEvent::CmdConClosed { os_error: e.os_error },
                        }
                    } else {
                        self.issue(&cmd).await
                    };
                    pending.extend(worker.handle_event(event));
                }
                Effect::OpenDataConnectionActive => {
                    // Same caveat as above: there is no independent
                    // active-mode retry distinct from the session's
                    // configured channel mode, so this re-attempts the
                    // same negotiation rather than forcing PORT.
                    match self.open_data_channel().await {
                        Ok(stream) => {
                            let mut conn = DataConnection::new(engine.no_data_transfer_timeout_sec.max(1), false);
                            conn.attach(stream);
                            dc = Some(conn);
                            pending.extend(worker.handle_event(WorkerEvent::DataConListeningForCon { ip: String::new(), port: 0, proxy_error: None }));
                        }
                        Err(e) => {
                            pending.extend(worker.handle_event(WorkerEvent::DataConListeningForCon { ip: String::new(), port: 0, proxy_error: Some(e.to_string()) }));
                        }
                    }
                }
                Effect::OpenDataConnectionPassive => {}
                Effect::ArmNoDataTransferWatchdog => {
                    if file.is_none() {
                        if matches!(worker.item.target_file_state, TargetFileState::Resumed) {
                            let mut f = fs::OpenOptions::new().write(true).open(local_path).await?;
                            let off = worker.item.local_size_known.saturating_sub(worker.item.resume_overlap.min(worker.item.local_size_known));
                            f.seek(std::io::SeekFrom::Start(off)).await?;
                            transferred = off;
                            file = Some(f);
                        } else {
                            if let Some(parent) = Path::new(local_path).parent() {
                                if !parent.as_os_str().is_empty() {
                                    fs::create_dir_all(parent).await?;
                                }
                            }
                            file = Some(fs::File::create(local_path).await?);
                            transferred = 0;
                        }
                    }
                    loop {
                        let conn = dc.as_mut().ok_or_else(|| FtpError::data_channel("data connection missing"))?;
                        match tokio::time::timeout(watchdog, conn.read_flush_chunk()).await {
                            Ok(Ok(Some(bytes))) => {
                                if worker.item.ascii_mode {
                                    worker.item.ascii_binary_detected = looks_binary(&bytes);
                                }
                                file.as_mut().unwrap().write_all(&bytes).await?;
                                transferred += bytes.len() as u64;
                                worker.item.local_size_known = transferred;
                                self.update_progress(&tid, remote_path, local_path, TransferDirection::Download, worker.item.remote_size, transferred, &started);
                                pending.extend(worker.handle_event(WorkerEvent::DataConFlushData));
                                while matches!(pending.front(), Some(Effect::HandOffToDisk { .. })) {
                                    pending.pop_front();
                                    file.as_mut().unwrap().flush().await?;
                                    pending.extend(worker.handle_event(WorkerEvent::DiskWorkWriteFinished { ok: true }));
                                }
                                if !matches!(worker.state, WorkerState::WaitForDataConFinish | WorkerState::WaitForRetrRes) {
                                    break;
                                }
                            }
                            Ok(Ok(None)) => {
                                let _ = self.codec.read_response().await;
                                pending.extend(worker.handle_event(WorkerEvent::DataConClosed));
                                break;
                            }
                            Ok(Err(e)) => return Err(FtpError::from(e)),
                            Err(_) => {
                                pending.extend(worker.handle_event(WorkerEvent::NoDataTransferTimeout));
                                break;
                            }
                        }
                    }
                }
                Effect::CloseDataConnection { delete_target_file } => {
                    if let Some(mut conn) = dc.take() {
                        conn.close();
                    }
                    if delete_target_file {
                        file.take();
                        let _ = fs::remove_file(local_path).await;
                    }
                }
                Effect::HandOffToDisk { .. } => {
                    if let Some(f) = file.as_mut() {
                        let _ = f.flush().await;
                    }
                    pending.extend(worker.handle_event(WorkerEvent::DiskWorkWriteFinished { ok: true }));
                }
                Effect::RollbackTargetFile { to_size } => {
                    if let Some(f) = file.as_mut() {
                        let _ = f.set_len(to_size).await;
                    }
                    transferred = to_size;
                }
                Effect::ScheduleDelayedRetry(delay) => {
                    if retry_budget == 0 {
                        return Err(FtpError::transfer_failed("retry budget exhausted"));
                    }
                    retry_budget -= 1;
                    tokio::time::sleep(delay).await;
                    pending.extend(worker.handle_event(WorkerEvent::DelayedAutoRetry));
                }
                Effect::Log(msg) => log::debug!("download {}: {}", remote_path, msg),
                Effect::UpdateItemState { done, problem, .. } => {
                    if done {
                        if let Some(msg) = problem {
                            return Err(FtpError::transfer_failed(msg));
                        }
                    }
                }
                Effect::RequeueWaiting => {
                    if worker.state == WorkerState::StartWork {
                        if retry_budget == 0 {
                            return Err(FtpError::transfer_failed("retry budget exhausted"));
                        }
                        retry_budget -= 1;
                        pending.extend(worker.handle_event(WorkerEvent::Activate));
                    }
                }
                Effect::SendQuit => {
                    let _ = self.codec.execute("QUIT").await;
                }
                Effect::Finished => {
                    if let Some(mut f) = file.take() {
                        f.flush().await?;
                    }
                    self.info.bytes_downloaded += transferred;
                    self.complete_progress(&tid);
                    self.touch();
                    return Ok(transferred);
                }
            }
        }
        Err(FtpError::transfer_failed("worker exited without reporting completion"))
    }

    // ─── UPLOAD (STOR) ───────────────────────────────────────────

    /// Upload a local file to a remote path.
    pub async fn upload(
        &mut self,
        local_path: &str,
        remote_path: &str,
        transfer_id: Option<&str>,
        registry: &OpenedFilesRegistry,
        listing_cache: &ListingCache,
        engine: &EngineConfig,
    ) -> FtpResult<u64> {
        self.transfer_upload(local_path, remote_path, transfer_id, ForcedAction::None, registry, listing_cache, engine).await
    }

    /// Resume an upload from the remote file's current size, falling
    /// back to overwrite if REST is rejected.
    pub async fn resume_upload(
        &mut self,
        local_path: &str,
        remote_path: &str,
        transfer_id: Option<&str>,
        registry: &OpenedFilesRegistry,
        listing_cache: &ListingCache,
        engine: &EngineConfig,
    ) -> FtpResult<u64> {
        self.transfer_upload(local_path, remote_path, transfer_id, ForcedAction::ResumeOrOverwrite, registry, listing_cache, engine).await
    }

    /// Append data to a remote file (APPE). APPE has no REST leg, so this
    /// stays off the worker reducer (which only knows RETR/STOR); it
    /// still locks the target in `ftp::opened_files` and streams through
    /// a real `ftp::data_connection::DataConnection`.
    pub async fn append(&mut self, local_path: &str, remote_path: &str, transfer_id: Option<&str>, registry: &OpenedFilesRegistry) -> FtpResult<u64> {
        let path_type = self.path_type();
        let (dir, name) = path::split_parent(path_type, remote_path).unwrap_or_else(|| (String::new(), remote_path.to_string()));
        let lock_uid = registry
            .open(&self.id, &dir, path_type, &name, AccessType::Write)
            .map_err(|_| FtpError::local_file_locked(format!("{} is busy", remote_path)))?;
        let _guard = FileLockGuard { registry, uid: lock_uid };

        self.set_type(TransferType::Binary).await?;
        let meta = fs::metadata(local_path).await?;
        let total_bytes = meta.len();

        let mut conn = DataConnection::new(30, false);
        let stream = self.open_data_channel().await?;
        conn.attach(stream);

        let resp = self.codec.execute(&format!("APPE {}", remote_path)).await?;
        if !resp.is_preliminary() && !resp.is_success() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }

        let mut file = fs::File::open(local_path).await?;
        let tid = transfer_id.unwrap_or("").to_string();
        let started = Instant::now();
        let mut transferred = 0u64;
        let mut buf = vec![0u8; DEFAULT_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            conn.write_chunk(&buf[..n]).await?;
            transferred += n as u64;
            self.update_progress(&tid, remote_path, local_path, TransferDirection::Upload, Some(total_bytes), transferred, &started);
        }
        conn.shutdown().await?;
        conn.close();

        let done = self.codec.read_response().await?;
        if !done.is_success() {
            return Err(FtpError::from_reply(done.code, &done.text()));
        }

        self.info.bytes_uploaded += transferred;
        self.complete_progress(&tid);
        self.touch();
        Ok(transferred)
    }

    async fn transfer_upload(
        &mut self,
        local_path: &str,
        remote_path: &str,
        transfer_id: Option<&str>,
        forced_action: ForcedAction,
        registry: &OpenedFilesRegistry,
        listing_cache: &ListingCache,
        engine: &EngineConfig,
    ) -> FtpResult<u64> {
        let path_type = self.path_type();
        let (dir, name) = path::split_parent(path_type, remote_path).unwrap_or_else(|| (String::new(), remote_path.to_string()));
        let lock_uid = registry
            .open(&self.id, &dir, path_type, &name, AccessType::Write)
            .map_err(|_| FtpError::local_file_locked(format!("{} is busy", remote_path)))?;
        let _guard = FileLockGuard { registry, uid: lock_uid };

        let total_local_size = fs::metadata(local_path).await?.len();
        let local_size_known = if matches!(forced_action, ForcedAction::Resume | ForcedAction::ResumeOrOverwrite) && self.features.size {
            self.size(remote_path).await.unwrap_or(0)
        } else {
            0
        };
        let ascii_mode = is_ascii_match(&engine.ascii_file_masks, remote_path);

        let item = WorkItem {
            direction: TransferDirection::Upload,
            remote_path: remote_path.to_string(),
            local_size_known,
            remote_size: None,
            forced_action,
            target_file_state: TargetFileState::Unknown,
            ascii_mode,
            ascii_for_binary: engine.ascii_for_binary_file,
            resume_overlap: engine.resume_overlap,
            resume_min_file_size: engine.resume_min_file_size,
            bytes_flushed_since_rest: 0,
            all_data_transferred: false,
            ascii_binary_detected: false,
        };
        let mut worker = Worker::new(item, Duration::from_millis(engine.auto_retry_delay_ms));
        let watchdog = Duration::from_secs(engine.no_data_transfer_timeout_sec.max(1));

        let tid = transfer_id.unwrap_or("").to_string();
        let started = Instant::now();
        let mut transferred = 0u64;
        let mut file: Option<fs::File> = None;
        let mut dc: Option<DataConnection> = None;
        let mut retry_budget = engine.max_connect_attempts.max(1);

        let mut pending: VecDeque<Effect> = VecDeque::new();
        pending.extend(worker.handle_event(WorkerEvent::Activate));

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::SendCommand(cmd) => {
                    let event = if cmd == "PASV" {
                        match self.open_data_channel().await {
                            Ok(stream) => {
                                let mut conn = DataConnection::new(engine.no_data_transfer_timeout_sec.max(1), false);
                                conn.attach(stream);
                                dc = Some(conn);
                                WorkerEvent::CmdReplyReceived { code: 227, text: "Entering Passive Mode".into() }
                            }
                            Err(e) => WorkerEvent::CmdReplyReceived { code: 425, text: e.to_string() },
                        }
                    } else if let Some(rest) = cmd.strip_prefix("REST ") {
                        let offset: u64 = rest.trim().parse().unwrap_or(0);
                        match self.rest(offset).await {
                            Ok(true) => WorkerEvent::CmdReplyReceived { code: 350, text: format!("Restarting at {}", offset) },
                            Ok(false) => WorkerEvent::CmdReplyReceived { code: 502, text: "REST not honoured".into() },
                            Err(e) => WorkerEvent::CmdConClosed { os_error: e.os_error },
                        }
                    } else if cmd.starts_with("PORT ") {
                        WorkerEvent::CmdReplyReceived { code: 200, text: "PORT command successful".into() }
                    } else if cmd.starts_with("STOR ") {
                        match self.codec.execute(&cmd).await {
                            Ok(resp) => {
                                pending.extend(worker.handle_event(WorkerEvent::DataConConnected));
                                WorkerEvent::CmdReplyReceived { code: resp.code, text: resp.text() }
                            }
                            Err(e) => WorkerEvent::CmdConClosed { os_error: e.os_error },
                        }
                    } else {
                        self.issue(&cmd).await
                    };
                    pending.extend(worker.handle_event(event));
                }
                Effect::OpenDataConnectionActive => {
                    match self.open_data_channel().await {
                        Ok(stream) => {
                            let mut conn = DataConnection::new(engine.no_data_transfer_timeout_sec.max(1), false);
                            conn.attach(stream);
                            dc = Some(conn);
                            pending.extend(worker.handle_event(WorkerEvent::DataConListeningForCon { ip: String::new(), port: 0, proxy_error: None }));
                        }
                        Err(e) => {
                            pending.extend(worker.handle_event(WorkerEvent::DataConListeningForCon { ip: String::new(), port: 0, proxy_error: Some(e.to_string()) }));
                        }
                    }
                }
                Effect::OpenDataConnectionPassive => {}
                Effect::ArmNoDataTransferWatchdog => {
                    if file.is_none() {
                        let mut f = fs::File::open(local_path).await?;
                        if matches!(worker.item.target_file_state, TargetFileState::Resumed) {
                            let off = worker.item.local_size_known;
                            f.seek(std::io::SeekFrom::Start(off)).await?;
                            transferred = off;
                        }
                        file = Some(f);
                    }
                    let mut buf = vec![0u8; DEFAULT_CHUNK];
                    loop {
                        match tokio::time::timeout(watchdog, file.as_mut().unwrap().read(&mut buf)).await {
                            Ok(Ok(0)) => {
                                if let Some(conn) = dc.as_mut() {
                                    let _ = conn.shutdown().await;
                                }
                                let _ = self.codec.read_response().await;
                                pending.extend(worker.handle_event(WorkerEvent::DataConClosed));
                                break;
                            }
                            Ok(Ok(n)) => {
                                if worker.item.ascii_mode {
                                    worker.item.ascii_binary_detected = looks_binary(&buf[..n]);
                                }
                                {
                                    let conn = dc.as_mut().ok_or_else(|| FtpError::data_channel("data connection missing"))?;
                                    conn.write_chunk(&buf[..n]).await?;
                                }
                                transferred += n as u64;
                                worker.item.local_size_known = transferred;
                                self.update_progress(&tid, remote_path, local_path, TransferDirection::Upload, Some(total_local_size), transferred, &started);
                                pending.extend(worker.handle_event(WorkerEvent::DataConFlushData));
                                while matches!(pending.front(), Some(Effect::HandOffToDisk { .. })) {
                                    pending.pop_front();
                                    pending.extend(worker.handle_event(WorkerEvent::DiskWorkWriteFinished { ok: true }));
                                }
                                if !matches!(worker.state, WorkerState::WaitForDataConFinish | WorkerState::WaitForRetrRes) {
                                    break;
                                }
                            }
                            Ok(Err(e)) => return Err(FtpError::from(e)),
                            Err(_) => {
                                pending.extend(worker.handle_event(WorkerEvent::NoDataTransferTimeout));
                                break;
                            }
                        }
                    }
                }
                Effect::CloseDataConnection { delete_target_file } => {
                    if let Some(mut conn) = dc.take() {
                        conn.close();
                    }
                    let _ = delete_target_file; // nothing local to roll back for an upload source
                }
                Effect::HandOffToDisk { .. } => {
                    pending.extend(worker.handle_event(WorkerEvent::DiskWorkWriteFinished { ok: true }));
                }
                Effect::RollbackTargetFile { .. } => {}
                Effect::ScheduleDelayedRetry(delay) => {
                    if retry_budget == 0 {
                        return Err(FtpError::transfer_failed("retry budget exhausted"));
                    }
                    retry_budget -= 1;
                    tokio::time::sleep(delay).await;
                    pending.extend(worker.handle_event(WorkerEvent::DelayedAutoRetry));
                }
                Effect::Log(msg) => log::debug!("upload {}: {}", remote_path, msg),
                Effect::UpdateItemState { done, problem, .. } => {
                    if done {
                        if let Some(msg) = problem {
                            return Err(FtpError::transfer_failed(msg));
                        }
                    }
                }
                Effect::RequeueWaiting => {
                    if worker.state == WorkerState::StartWork {
                        if retry_budget == 0 {
                            return Err(FtpError::transfer_failed("retry budget exhausted"));
                        }
                        retry_budget -= 1;
                        pending.extend(worker.handle_event(WorkerEvent::Activate));
                    }
                }
                Effect::SendQuit => {
                    let _ = self.codec.execute("QUIT").await;
                }
                Effect::Finished => {
                    self.info.bytes_uploaded += transferred;
                    self.complete_progress(&tid);
                    self.touch();
                    listing_cache.report_change(&dir, path_type, ChangeRecord::FileUploaded { name: name.clone(), size: transferred }, Utc::now());
                    return Ok(transferred);
                }
            }
        }
        Err(FtpError::transfer_failed("worker exited without reporting completion"))
    }

    // ─── Progress helpers ────────────────────────────────────────

    fn update_progress(
        &self,
        transfer_id: &str,
        remote_path: &str,
        local_path: &str,
        direction: TransferDirection,
        total_bytes: Option<u64>,
        transferred: u64,
        started: &Instant,
    ) {
        if transfer_id.is_empty() {
            return;
        }
        let elapsed = started.elapsed().as_secs_f64().max(0.001);
        let speed = (transferred as f64 / elapsed) as u64;
        let eta = if speed > 0 {
            total_bytes.and_then(|t| if t > transferred { Some(((t - transferred) / speed) as u32) } else { Some(0) })
        } else {
            None
        };
        let percent = total_bytes.map(|t| if t > 0 { (transferred as f64 / t as f64 * 100.0) as f32 } else { 100.0 }).unwrap_or(0.0);

        let progress = TransferProgress {
            transfer_id: transfer_id.to_string(),
            session_id: self.id.clone(),
            direction,
            local_path: local_path.to_string(),
            remote_path: remote_path.to_string(),
            total_bytes,
            transferred_bytes: transferred,
            speed_bps: speed,
            eta_seconds: eta,
            percent,
            state: TransferState::InProgress,
        };

        if let Ok(mut map) = TRANSFER_PROGRESS.lock() {
            map.insert(transfer_id.to_string(), progress);
        }
    }

    fn complete_progress(&self, transfer_id: &str) {
        if transfer_id.is_empty() {
            return;
        }
        if let Ok(mut map) = TRANSFER_PROGRESS.lock() {
            if let Some(p) = map.get_mut(transfer_id) {
                p.state = TransferState::Completed;
                p.percent = 100.0;
            }
        }
    }
}
