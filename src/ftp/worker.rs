//! Worker state machine (§4.1, L6): the per-item actor that sequences
//! PASV/PORT, TYPE, REST, RETR/STOR, data-connection life-cycle and
//! retry handling for one queue item.
//!
//! Modelled as a pure reducer, `(state, event) -> (state, effects)`, so
//! it can be driven by the sockets thread described in §5 without the
//! worker itself touching a socket: [`Worker::handle_event`] consumes
//! one [`WorkerEvent`] and returns the [`Effect`]s the caller must carry
//! out (send a command, open/close the data connection, hand bytes to
//! disk, update the queue item, ...).

use crate::ftp::types::{AsciiForBinaryPolicy, ForcedAction, TargetFileState, TransferDirection};
use std::time::Duration;

/// Inputs delivered by the sockets thread (§4.1 "Events").
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Activate,
    ShouldStop,
    CmdReplyReceived { code: u16, text: String },
    CmdInfoReceived { code: u16, text: String },
    CmdConClosed { os_error: Option<i32> },
    DataConConnected,
    DataConClosed,
    DataConFlushData,
    DataConListeningForCon { ip: String, port: u16, proxy_error: Option<String> },
    DiskWorkWriteFinished { ok: bool },
    DelayedAutoRetry,
    DataConStartTimeout,
    NoDataTransferTimeout,
    TargetPathListingFinished,
}

/// Sub-states (§4.1 "Sub-states"), collapsed to the subset a file
/// copy/move drives; chattr/explore items short-circuit through
/// `SendCommand`/`WaitForCmdRes` instead of the data-connection leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    StartWork,
    WaitForPasvRes,
    OpenActDataCon,
    WaitForListen,
    WaitForPortRes,
    SetType,
    WaitForTypeRes,
    ResumeFile,
    WaitForResumeRes,
    ResumeError,
    SendRetr,
    ActivateDataCon,
    WaitForRetrRes,
    WaitForDataConFinish,
    FinishFlushData,
    ProcessRetrRes,
    TransferFinished,
    MoveWaitForDeleRes,
    DelayedAutoRetry,
    DrainThenQuit,
    Done,
}

/// Why the item is being retried or abandoned, for `UpdateItemState`
/// (§4.1 retry classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    ConnectionDrop,
    Permanent,
    AutoRetryWithDelay,
    AutoRetryImmediate,
}

/// Side effects the sockets-thread driver must carry out in response to
/// a transition. The worker never performs I/O itself.
#[derive(Debug, Clone)]
pub enum Effect {
    SendCommand(String),
    OpenDataConnectionPassive,
    OpenDataConnectionActive,
    CloseDataConnection { delete_target_file: bool },
    HandOffToDisk { data: Vec<u8> },
    RollbackTargetFile { to_size: u64 },
    ScheduleDelayedRetry(Duration),
    ArmNoDataTransferWatchdog,
    Log(String),
    UpdateItemState { retry: Option<RetryClass>, done: bool, problem: Option<String> },
    RequeueWaiting,
    SendQuit,
    Finished,
}

/// Per-item context the reducer needs: direction, resume policy inputs,
/// ASCII detection inputs. Populated once at `StartWork` and mutated as
/// negotiation proceeds.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub direction: TransferDirection,
    pub remote_path: String,
    pub local_size_known: u64,
    pub remote_size: Option<u64>,
    pub forced_action: ForcedAction,
    pub target_file_state: TargetFileState,
    pub ascii_mode: bool,
    pub ascii_for_binary: AsciiForBinaryPolicy,
    pub resume_overlap: u64,
    pub resume_min_file_size: u64,
    pub bytes_flushed_since_rest: u64,
    pub all_data_transferred: bool,
    /// Result of scanning the most recent flush buffer for non-text
    /// bytes, set by the caller before `DataConFlushData`'s
    /// `DiskWorkWriteFinished` lands on the reducer.
    pub ascii_binary_detected: bool,
}

pub struct Worker {
    pub state: WorkerState,
    pub item: WorkItem,
    should_stop: bool,
    auto_retry_delay: Duration,
}

impl Worker {
    pub fn new(item: WorkItem, auto_retry_delay: Duration) -> Self {
        Self {
            state: WorkerState::Idle,
            item,
            should_stop: false,
            auto_retry_delay,
        }
    }

    /// Core reducer: `(state, event) -> (state, effects)`.
    pub fn handle_event(&mut self, event: WorkerEvent) -> Vec<Effect> {
        match event {
            WorkerEvent::ShouldStop => return self.on_should_stop(),
            WorkerEvent::CmdConClosed { os_error } => return self.on_cmd_con_closed(os_error),
            WorkerEvent::NoDataTransferTimeout => return self.on_no_data_transfer_timeout(),
            WorkerEvent::DelayedAutoRetry if self.state == WorkerState::DelayedAutoRetry => {
                self.state = WorkerState::StartWork;
                return vec![Effect::RequeueWaiting];
            }
            _ => {}
        }

        match self.state {
            WorkerState::Idle | WorkerState::StartWork => self.on_start_work(event),
            WorkerState::WaitForPasvRes => self.on_wait_for_pasv_res(event),
            WorkerState::OpenActDataCon | WorkerState::WaitForListen => self.on_active_listen(event),
            WorkerState::WaitForPortRes => self.on_wait_for_port_res(event),
            WorkerState::SetType => self.on_set_type(),
            WorkerState::WaitForTypeRes => self.on_wait_for_type_res(event),
            WorkerState::ResumeFile => self.on_resume_file(),
            WorkerState::WaitForResumeRes => self.on_wait_for_resume_res(event),
            WorkerState::ResumeError => self.on_resume_error(),
            WorkerState::SendRetr => self.on_send_retr(),
            WorkerState::ActivateDataCon => self.on_activate_data_con(event),
            WorkerState::WaitForRetrRes => self.on_wait_for_retr_res(event),
            WorkerState::WaitForDataConFinish => self.on_wait_for_data_con_finish(event),
            WorkerState::FinishFlushData => self.on_finish_flush_data(event),
            WorkerState::ProcessRetrRes => self.on_process_retr_res(),
            WorkerState::TransferFinished => self.on_transfer_finished(),
            WorkerState::MoveWaitForDeleRes => self.on_move_wait_for_dele_res(event),
            WorkerState::DelayedAutoRetry => vec![],
            WorkerState::DrainThenQuit => self.on_drain_then_quit(event),
            WorkerState::Done => vec![],
        }
    }

    fn on_should_stop(&mut self) -> Vec<Effect> {
        self.should_stop = true;
        if matches!(self.state, WorkerState::FinishFlushData | WorkerState::WaitForDataConFinish) {
            // §4.1 "quit on stop": finish the disk job before leaving.
            self.state = WorkerState::DrainThenQuit;
            return vec![Effect::SendQuit, Effect::Log("stop requested; draining in-flight disk job".into())];
        }
        self.state = WorkerState::Done;
        vec![
            Effect::CloseDataConnection { delete_target_file: false },
            Effect::UpdateItemState { retry: None, done: false, problem: None },
            Effect::RequeueWaiting,
            Effect::Finished,
        ]
    }

    fn on_drain_then_quit(&mut self, event: WorkerEvent) -> Vec<Effect> {
        if matches!(event, WorkerEvent::DiskWorkWriteFinished { .. }) {
            self.state = WorkerState::Done;
            return vec![Effect::Finished];
        }
        vec![]
    }

    fn on_cmd_con_closed(&mut self, os_error: Option<i32>) -> Vec<Effect> {
        if self.state == WorkerState::Done {
            return vec![];
        }
        // §4.1 "Early success with stuck control connection": all bytes
        // were seen but the reply never arrived — resume, don't redownload.
        if self.item.all_data_transferred {
            self.item.forced_action = ForcedAction::Resume;
            self.state = WorkerState::StartWork;
            return vec![
                Effect::Log("control connection dropped after all bytes transferred; forcing resume".into()),
                Effect::UpdateItemState { retry: Some(RetryClass::ConnectionDrop), done: false, problem: None },
                Effect::RequeueWaiting,
            ];
        }
        self.state = WorkerState::StartWork;
        vec![
            Effect::CloseDataConnection { delete_target_file: true },
            Effect::UpdateItemState {
                retry: Some(RetryClass::ConnectionDrop),
                done: false,
                problem: os_error.map(|e| format!("os_error={}", e)),
            },
            Effect::RequeueWaiting,
        ]
    }

    fn on_no_data_transfer_timeout(&mut self) -> Vec<Effect> {
        if !matches!(
            self.state,
            WorkerState::WaitForDataConFinish | WorkerState::ActivateDataCon | WorkerState::WaitForRetrRes
        ) {
            return vec![];
        }
        self.state = WorkerState::DelayedAutoRetry;
        vec![
            Effect::Log("no-data-transfer watchdog fired; synthesising connection reset".into()),
            Effect::CloseDataConnection { delete_target_file: true },
            Effect::UpdateItemState {
                retry: Some(RetryClass::AutoRetryWithDelay),
                done: false,
                problem: Some("no_data_transfer_timeout".into()),
            },
            Effect::ScheduleDelayedRetry(self.auto_retry_delay),
        ]
    }

    fn on_start_work(&mut self, event: WorkerEvent) -> Vec<Effect> {
        if !matches!(event, WorkerEvent::Activate) {
            return vec![];
        }
        self.state = WorkerState::WaitForPasvRes;
        vec![Effect::SendCommand("PASV".into())]
    }

    fn on_wait_for_pasv_res(&mut self, event: WorkerEvent) -> Vec<Effect> {
        let WorkerEvent::CmdReplyReceived { code, text } = event else { return vec![] };
        if (200..300).contains(&code) {
            self.state = WorkerState::SetType;
            self.on_set_type()
        } else {
            // PASV refused: fall back to active mode via PORT.
            self.state = WorkerState::OpenActDataCon;
            vec![Effect::Log(format!("PASV rejected ({}): {}; falling back to PORT", code, text)), Effect::OpenDataConnectionActive]
        }
    }

    fn on_active_listen(&mut self, event: WorkerEvent) -> Vec<Effect> {
        if let WorkerEvent::DataConListeningForCon { ip, port, proxy_error } = event {
            if let Some(err) = proxy_error {
                return self.fail_permanent(format!("proxy handshake failed: {}", err));
            }
            self.state = WorkerState::WaitForPortRes;
            return vec![Effect::SendCommand(format!("PORT {}", encode_port(&ip, port)))];
        }
        vec![]
    }

    fn on_wait_for_port_res(&mut self, event: WorkerEvent) -> Vec<Effect> {
        let WorkerEvent::CmdReplyReceived { code, text } = event else { return vec![] };
        if (200..300).contains(&code) {
            self.state = WorkerState::SetType;
            self.on_set_type()
        } else {
            self.fail_permanent(format!("PORT rejected: {} {}", code, text))
        }
    }

    fn on_set_type(&mut self) -> Vec<Effect> {
        self.state = WorkerState::WaitForTypeRes;
        let type_char = if self.item.ascii_mode { "A" } else { "I" };
        vec![Effect::SendCommand(format!("TYPE {}", type_char))]
    }

    fn on_wait_for_type_res(&mut self, event: WorkerEvent) -> Vec<Effect> {
        let WorkerEvent::CmdReplyReceived { code, text } = event else { return vec![] };
        if !(200..300).contains(&code) {
            return self.fail_permanent(format!("TYPE rejected: {} {}", code, text));
        }
        self.state = WorkerState::ResumeFile;
        self.on_resume_file()
    }

    /// REST negotiation (§4.1 "REST negotiation").
    fn on_resume_file(&mut self) -> Vec<Effect> {
        let wants_resume = matches!(self.item.forced_action, ForcedAction::Resume | ForcedAction::ResumeOrOverwrite);
        if !wants_resume {
            self.state = WorkerState::SendRetr;
            return self.on_send_retr();
        }
        if self.item.local_size_known < self.item.resume_min_file_size {
            self.state = WorkerState::SendRetr;
            return self.on_send_retr();
        }
        let offset = if self.item.resume_overlap >= self.item.local_size_known {
            0
        } else {
            self.item.local_size_known - self.item.resume_overlap
        };
        self.state = WorkerState::WaitForResumeRes;
        vec![Effect::SendCommand(format!("REST {}", offset))]
    }

    fn on_wait_for_resume_res(&mut self, event: WorkerEvent) -> Vec<Effect> {
        let WorkerEvent::CmdReplyReceived { code, text } = event else { return vec![] };
        if (300..400).contains(&code) {
            self.item.target_file_state = TargetFileState::Resumed;
            self.state = WorkerState::SendRetr;
            self.on_send_retr()
        } else {
            self.state = WorkerState::ResumeError;
            let _ = text;
            self.on_resume_error()
        }
    }

    fn on_resume_error(&mut self) -> Vec<Effect> {
        match self.item.forced_action {
            ForcedAction::Resume => self.fail_permanent("server rejected REST; resume-only item cannot proceed"),
            ForcedAction::ResumeOrOverwrite => {
                self.item.forced_action = ForcedAction::Overwrite;
                self.item.target_file_state = TargetFileState::Unknown;
                self.state = WorkerState::SendRetr;
                let mut effects = vec![Effect::Log("REST rejected; falling back to overwrite".into())];
                effects.extend(self.on_send_retr());
                effects
            }
            _ => self.fail_permanent("unexpected REST rejection"),
        }
    }

    fn on_send_retr(&mut self) -> Vec<Effect> {
        self.state = WorkerState::ActivateDataCon;
        let cmd = match self.item.direction {
            TransferDirection::Download => format!("RETR {}", self.item.remote_path),
            TransferDirection::Upload => format!("STOR {}", self.item.remote_path),
        };
        vec![Effect::SendCommand(cmd)]
    }

    fn on_activate_data_con(&mut self, event: WorkerEvent) -> Vec<Effect> {
        if matches!(event, WorkerEvent::DataConConnected) {
            self.state = WorkerState::WaitForRetrRes;
            return vec![Effect::ArmNoDataTransferWatchdog];
        }
        vec![]
    }

    fn on_wait_for_retr_res(&mut self, event: WorkerEvent) -> Vec<Effect> {
        match event {
            WorkerEvent::CmdInfoReceived { .. } => vec![],
            WorkerEvent::CmdReplyReceived { code, text } => {
                if (100..200).contains(&code) {
                    // preliminary reply; keep waiting for the final one
                    vec![]
                } else if (200..300).contains(&code) {
                    self.state = WorkerState::WaitForDataConFinish;
                    vec![]
                } else if code == 426 || code == 450 {
                    self.retry_with_delay(format!("transient RETR/STOR failure: {} {}", code, text))
                } else {
                    self.fail_permanent(format!("RETR/STOR rejected: {} {}", code, text))
                }
            }
            WorkerEvent::DataConFlushData => self.on_flush_data(),
            _ => vec![],
        }
    }

    fn on_wait_for_data_con_finish(&mut self, event: WorkerEvent) -> Vec<Effect> {
        match event {
            WorkerEvent::DataConFlushData => self.on_flush_data(),
            WorkerEvent::DataConClosed => {
                self.item.all_data_transferred = true;
                self.state = WorkerState::ProcessRetrRes;
                self.on_process_retr_res()
            }
            _ => vec![],
        }
    }

    fn on_flush_data(&mut self) -> Vec<Effect> {
        self.state = WorkerState::FinishFlushData;
        vec![Effect::HandOffToDisk { data: Vec::new() }]
    }

    fn on_finish_flush_data(&mut self, event: WorkerEvent) -> Vec<Effect> {
        let WorkerEvent::DiskWorkWriteFinished { ok } = event else { return vec![] };
        if !ok {
            return self.fail_permanent("disk write failed");
        }
        // ASCII-binary guard (§4.1): detection itself happens where the
        // flush buffer is inspected before hand-off; here we only react
        // to a policy that requests a retry in binary mode.
        if self.item.ascii_mode && matches!(self.item.ascii_for_binary, AsciiForBinaryPolicy::RetryInBinary)
            && self.binary_content_detected()
        {
            self.item.ascii_mode = false;
            self.state = WorkerState::StartWork;
            return vec![
                Effect::CloseDataConnection { delete_target_file: true },
                Effect::RollbackTargetFile { to_size: 0 },
                Effect::Log("binary content detected under ASCII mode; retrying in binary".into()),
                Effect::RequeueWaiting,
            ];
        }
        if self.should_stop {
            self.state = WorkerState::DrainThenQuit;
            return vec![Effect::SendQuit];
        }
        // stay in place until `data-con-closed` promotes us further
        self.state = WorkerState::WaitForDataConFinish;
        vec![]
    }

    /// ASCII-for-binary guard: the flush buffer itself is owned by the
    /// caller, which scans it and records the verdict on the item before
    /// `DataConFlushData`/`DiskWorkWriteFinished` reach the reducer.
    fn binary_content_detected(&self) -> bool {
        self.item.ascii_binary_detected
    }

    fn on_process_retr_res(&mut self) -> Vec<Effect> {
        self.state = WorkerState::TransferFinished;
        self.on_transfer_finished()
    }

    fn on_transfer_finished(&mut self) -> Vec<Effect> {
        self.item.target_file_state = TargetFileState::Transferred;
        match self.item.direction {
            TransferDirection::Upload if matches!(self.item.forced_action, ForcedAction::None) => {
                self.state = WorkerState::Done;
                vec![Effect::UpdateItemState { retry: None, done: true, problem: None }, Effect::Finished]
            }
            _ => {
                self.state = WorkerState::Done;
                vec![Effect::UpdateItemState { retry: None, done: true, problem: None }, Effect::Finished]
            }
        }
    }

    fn on_move_wait_for_dele_res(&mut self, event: WorkerEvent) -> Vec<Effect> {
        let WorkerEvent::CmdReplyReceived { code, text } = event else { return vec![] };
        if (200..300).contains(&code) {
            self.state = WorkerState::Done;
            vec![Effect::UpdateItemState { retry: None, done: true, problem: None }, Effect::Finished]
        } else {
            self.fail_permanent(format!("DELE (move source cleanup) rejected: {} {}", code, text))
        }
    }

    fn fail_permanent(&mut self, msg: impl Into<String>) -> Vec<Effect> {
        self.state = WorkerState::Done;
        vec![
            Effect::CloseDataConnection { delete_target_file: false },
            Effect::UpdateItemState { retry: Some(RetryClass::Permanent), done: true, problem: Some(msg.into()) },
            Effect::Finished,
        ]
    }

    fn retry_with_delay(&mut self, msg: impl Into<String>) -> Vec<Effect> {
        self.state = WorkerState::DelayedAutoRetry;
        vec![
            Effect::CloseDataConnection { delete_target_file: true },
            Effect::UpdateItemState { retry: Some(RetryClass::AutoRetryWithDelay), done: false, problem: Some(msg.into()) },
            Effect::ScheduleDelayedRetry(self.auto_retry_delay),
        ]
    }
}

fn encode_port(ip: &str, port: u16) -> String {
    let octets: Vec<&str> = ip.split('.').collect();
    format!("{},{},{},{},{},{}", octets.first().unwrap_or(&"0"), octets.get(1).unwrap_or(&"0"), octets.get(2).unwrap_or(&"0"), octets.get(3).unwrap_or(&"0"), port / 256, port % 256)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_work_item(direction: TransferDirection) -> WorkItem {
        WorkItem {
            direction,
            remote_path: "/tmp/file".into(),
            local_size_known: 0,
            remote_size: None,
            forced_action: ForcedAction::None,
            target_file_state: TargetFileState::Unknown,
            ascii_mode: false,
            ascii_for_binary: AsciiForBinaryPolicy::RetryInBinary,
            resume_overlap: 32_768,
            resume_min_file_size: 65_536,
            bytes_flushed_since_rest: 0,
            all_data_transferred: false,
            ascii_binary_detected: false,
        }
    }

    fn new_worker(direction: TransferDirection) -> Worker {
        Worker::new(default_work_item(direction), Duration::from_millis(500))
    }

    #[test]
    fn happy_path_download_reaches_done() {
        let mut w = new_worker(TransferDirection::Download);
        w.handle_event(WorkerEvent::Activate);
        assert_eq!(w.state, WorkerState::WaitForPasvRes);

        w.handle_event(WorkerEvent::CmdReplyReceived { code: 227, text: "Entering Passive Mode".into() });
        assert_eq!(w.state, WorkerState::WaitForTypeRes);

        w.handle_event(WorkerEvent::CmdReplyReceived { code: 200, text: "Type set".into() });
        assert_eq!(w.state, WorkerState::ActivateDataCon);

        w.handle_event(WorkerEvent::CmdReplyReceived { code: 150, text: "Opening".into() });
        w.handle_event(WorkerEvent::DataConConnected);
        assert_eq!(w.state, WorkerState::WaitForRetrRes);

        w.handle_event(WorkerEvent::CmdReplyReceived { code: 150, text: "Opening data connection".into() });
        assert_eq!(w.state, WorkerState::WaitForRetrRes);

        w.handle_event(WorkerEvent::DataConFlushData);
        assert_eq!(w.state, WorkerState::FinishFlushData);

        let effects = w.handle_event(WorkerEvent::DiskWorkWriteFinished { ok: true });
        assert_eq!(w.state, WorkerState::WaitForDataConFinish);
        assert!(effects.is_empty());

        w.handle_event(WorkerEvent::CmdReplyReceived { code: 226, text: "Transfer complete".into() });
        w.handle_event(WorkerEvent::DataConClosed);
        assert_eq!(w.state, WorkerState::Done);
    }

    #[test]
    fn cmd_con_closed_mid_transfer_schedules_retry() {
        let mut w = new_worker(TransferDirection::Download);
        w.handle_event(WorkerEvent::Activate);
        w.handle_event(WorkerEvent::CmdReplyReceived { code: 227, text: String::new() });
        let effects = w.handle_event(WorkerEvent::CmdConClosed { os_error: Some(104) });
        assert_eq!(w.state, WorkerState::StartWork);
        assert!(matches!(effects[1], Effect::UpdateItemState { retry: Some(RetryClass::ConnectionDrop), .. }));
    }

    #[test]
    fn cmd_con_closed_after_all_bytes_forces_resume() {
        let mut w = new_worker(TransferDirection::Upload);
        w.item.all_data_transferred = true;
        let effects = w.handle_event(WorkerEvent::CmdConClosed { os_error: None });
        assert_eq!(w.item.forced_action, ForcedAction::Resume);
        assert_eq!(w.state, WorkerState::StartWork);
        assert!(matches!(effects[0], Effect::Log(_)));
    }

    #[test]
    fn should_stop_during_flush_drains_then_quits() {
        let mut w = new_worker(TransferDirection::Download);
        w.state = WorkerState::FinishFlushData;
        let effects = w.handle_event(WorkerEvent::ShouldStop);
        assert_eq!(w.state, WorkerState::DrainThenQuit);
        assert!(matches!(effects[0], Effect::SendQuit));

        let effects2 = w.handle_event(WorkerEvent::DiskWorkWriteFinished { ok: true });
        assert_eq!(w.state, WorkerState::Done);
        assert!(matches!(effects2[0], Effect::Finished));
    }

    #[test]
    fn resume_skipped_below_min_file_size() {
        let mut w = new_worker(TransferDirection::Download);
        w.item.forced_action = ForcedAction::Resume;
        w.item.local_size_known = 10;
        w.state = WorkerState::ResumeFile;
        let effects = w.on_resume_file();
        assert_eq!(w.state, WorkerState::ActivateDataCon);
        assert!(matches!(effects[0], Effect::SendCommand(ref c) if c.starts_with("RETR") || c.starts_with("STOR")));
    }

    #[test]
    fn resume_overlap_past_file_size_restarts_from_zero() {
        let mut w = new_worker(TransferDirection::Download);
        w.item.forced_action = ForcedAction::Resume;
        w.item.local_size_known = 100_000;
        w.item.resume_overlap = 200_000;
        w.state = WorkerState::ResumeFile;
        let effects = w.on_resume_file();
        assert!(matches!(&effects[0], Effect::SendCommand(c) if c == "REST 0"));
    }

    #[test]
    fn resume_rejection_falls_back_to_overwrite() {
        let mut w = new_worker(TransferDirection::Download);
        w.item.forced_action = ForcedAction::ResumeOrOverwrite;
        w.item.local_size_known = 100_000;
        w.state = WorkerState::WaitForResumeRes;
        w.handle_event(WorkerEvent::CmdReplyReceived { code: 502, text: "not supported".into() });
        assert_eq!(w.item.forced_action, ForcedAction::Overwrite);
        assert_eq!(w.state, WorkerState::ActivateDataCon);
    }

    #[test]
    fn resume_rejection_fatal_when_resume_only() {
        let mut w = new_worker(TransferDirection::Download);
        w.item.forced_action = ForcedAction::Resume;
        w.item.local_size_known = 100_000;
        w.state = WorkerState::WaitForResumeRes;
        let effects = w.handle_event(WorkerEvent::CmdReplyReceived { code: 502, text: "not supported".into() });
        assert_eq!(w.state, WorkerState::Done);
        assert!(matches!(effects[1], Effect::UpdateItemState { retry: Some(RetryClass::Permanent), done: true, .. }));
    }

    #[test]
    fn transient_426_schedules_auto_retry_with_delay() {
        let mut w = new_worker(TransferDirection::Download);
        w.state = WorkerState::WaitForRetrRes;
        let effects = w.handle_event(WorkerEvent::CmdReplyReceived { code: 426, text: "Connection closed; transfer aborted".into() });
        assert_eq!(w.state, WorkerState::DelayedAutoRetry);
        assert!(matches!(effects[1], Effect::UpdateItemState { retry: Some(RetryClass::AutoRetryWithDelay), .. }));
    }

    #[test]
    fn delayed_auto_retry_requeues() {
        let mut w = new_worker(TransferDirection::Download);
        w.state = WorkerState::DelayedAutoRetry;
        let effects = w.handle_event(WorkerEvent::DelayedAutoRetry);
        assert_eq!(w.state, WorkerState::StartWork);
        assert!(matches!(effects[0], Effect::RequeueWaiting));
    }

    #[test]
    fn port_encoding_matches_rfc959_layout() {
        assert_eq!(encode_port("192.168.1.5", 4660), "192,168,1,5,18,52");
    }
}
