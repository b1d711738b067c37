//! Shared types for the FTP engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Connection / Session ────────────────────────────────────────────

/// Security mode for the control channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum FtpSecurityMode {
    /// Plain-text FTP (port 21).
    None,
    /// Explicit FTPS — starts plain then upgrades via AUTH TLS (port 21).
    Explicit,
    /// Implicit FTPS — TLS from the first byte (port 990).
    Implicit,
}

impl Default for FtpSecurityMode {
    fn default() -> Self {
        Self::None
    }
}

/// Transfer type (RFC 959 TYPE command).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TransferType {
    Ascii,
    Binary,
    /// Resolved per file by matching name/extension against a mask group.
    Autodetect,
}

impl Default for TransferType {
    fn default() -> Self {
        Self::Binary
    }
}

/// Transfer mode selected for the data channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum DataChannelMode {
    Passive,
    ExtendedPassive,
    Active,
    ExtendedActive,
}

impl Default for DataChannelMode {
    fn default() -> Self {
        Self::Passive
    }
}

/// Policy applied when the ASCII guard detects binary content in an
/// ascii-mode transfer (§4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum AsciiForBinaryPolicy {
    Ignore,
    AskUser,
    RetryInBinary,
    Skip,
}

impl Default for AsciiForBinaryPolicy {
    fn default() -> Self {
        Self::RetryInBinary
    }
}

/// Remote path-type tag (§3). Determines separator, case rule, root
/// syntax and prefix/append semantics for a server's paths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    Unix,
    Windows,
    Netware,
    Os2,
    Openvms,
    Mvs,
    IbmZVm,
    As400,
    Tandem,
    Unknown,
    Empty,
}

impl Default for PathType {
    fn default() -> Self {
        Self::Unix
    }
}

/// Configuration for a single FTP connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub security: FtpSecurityMode,
    #[serde(default)]
    pub transfer_type: TransferType,
    #[serde(default)]
    pub data_channel_mode: DataChannelMode,
    /// Initial remote directory to CWD into after login.
    #[serde(default)]
    pub initial_directory: Option<String>,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_sec: u64,
    /// Data-channel timeout in seconds.
    #[serde(default = "default_data_timeout")]
    pub data_timeout_sec: u64,
    /// Number of keepalive NOOPs per minute (0 = disabled).
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_sec: u64,
    /// Accept self-signed / untrusted certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// UTF-8 encoding (OPTS UTF8 ON).
    #[serde(default = "default_true")]
    pub utf8: bool,
    /// Local address to bind for active-mode data connections.
    #[serde(default)]
    pub active_bind_address: Option<String>,
    /// Friendly label shown in the UI.
    #[serde(default)]
    pub label: Option<String>,
    /// Path-type tag used for this server's remote paths.
    #[serde(default)]
    pub path_type: PathType,
    /// Enable DEFLATE compression on the data channel (MODE Z-like).
    #[serde(default)]
    pub compress_data: bool,
}

fn default_connect_timeout() -> u64 {
    15
}
fn default_data_timeout() -> u64 {
    30
}
fn default_keepalive() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for FtpConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            username: "anonymous".into(),
            password: "anonymous@".into(),
            security: FtpSecurityMode::None,
            transfer_type: TransferType::Binary,
            data_channel_mode: DataChannelMode::Passive,
            initial_directory: None,
            connect_timeout_sec: default_connect_timeout(),
            data_timeout_sec: default_data_timeout(),
            keepalive_interval_sec: default_keepalive(),
            accept_invalid_certs: false,
            utf8: true,
            active_bind_address: None,
            label: None,
            path_type: PathType::Unix,
            compress_data: false,
        }
    }
}

/// Engine-wide policy consumed by the worker state machine, the queue and
/// the data connection — one per session-manager instance (§6 "Session
/// parameters").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub use_listings_cache: bool,
    #[serde(default = "default_no_data_timeout")]
    pub no_data_transfer_timeout_sec: u64,
    #[serde(default = "default_resume_overlap")]
    pub resume_overlap: u64,
    #[serde(default = "default_resume_min_size")]
    pub resume_min_file_size: u64,
    #[serde(default)]
    pub ascii_file_masks: Vec<String>,
    #[serde(default)]
    pub ascii_for_binary_file: AsciiForBinaryPolicy,
    #[serde(default = "default_auto_retry_delay")]
    pub auto_retry_delay_ms: u64,
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_sec: u64,
    #[serde(default)]
    pub always_disconnect: bool,
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
}

fn default_no_data_timeout() -> u64 {
    30
}
fn default_resume_overlap() -> u64 {
    32_768
}
fn default_resume_min_size() -> u64 {
    0
}
fn default_auto_retry_delay() -> u64 {
    500
}
fn default_watchdog_interval() -> u64 {
    10
}
fn default_max_connect_attempts() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_listings_cache: true,
            no_data_transfer_timeout_sec: default_no_data_timeout(),
            resume_overlap: default_resume_overlap(),
            resume_min_file_size: default_resume_min_size(),
            ascii_file_masks: vec![
                "*.txt".into(),
                "*.htm".into(),
                "*.html".into(),
                "*.log".into(),
            ],
            ascii_for_binary_file: AsciiForBinaryPolicy::RetryInBinary,
            auto_retry_delay_ms: default_auto_retry_delay(),
            watchdog_interval_sec: default_watchdog_interval(),
            always_disconnect: false,
            max_connect_attempts: default_max_connect_attempts(),
        }
    }
}

/// Information about an active FTP session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSessionInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub security: FtpSecurityMode,
    pub connected: bool,
    pub current_directory: String,
    pub server_banner: Option<String>,
    pub system_type: Option<String>,
    pub features: Vec<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub transfer_type: TransferType,
    pub label: Option<String>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    /// Server type recognised by the listing autodetection engine, once
    /// known; subsequent listings on this session parse directly against
    /// this type's rules.
    pub detected_server_type: Option<String>,
}

// ─── Directory Listing ───────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum FtpEntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One entry from a directory listing (parsed from LIST or MLSD output).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpEntry {
    pub name: String,
    pub kind: FtpEntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub link_target: Option<String>,
    /// Raw line from the server (for debugging).
    pub raw: Option<String>,
    /// MLSD fact map (e.g. "type" → "file", "size" → "1234").
    #[serde(default)]
    pub facts: HashMap<String, String>,
    /// Set when `year_or_time`/`month_3` assumed the current year and the
    /// caller must apply year-correction (§4.6) at fill-time.
    #[serde(default)]
    pub year_assumed: bool,
}

/// Sorting field for directory listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum FtpSortField {
    Name,
    Size,
    Modified,
    Kind,
}

/// Sort order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum FtpSortOrder {
    Asc,
    Desc,
}

/// Options for listing a directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Filter by glob pattern (e.g. "*.txt").
    pub filter: Option<String>,
    pub sort_by: Option<FtpSortField>,
    pub sort_order: Option<FtpSortOrder>,
    /// Show hidden ("dot") files.
    #[serde(default = "default_true")]
    pub show_hidden: bool,
    /// Prefer MLSD over LIST when the server supports it.
    #[serde(default = "default_true")]
    pub prefer_mlsd: bool,
}

// ─── Transfer ────────────────────────────────────────────────────────

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Current state of a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TransferState {
    Queued,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

/// A queued transfer item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub id: String,
    pub session_id: String,
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
    pub state: TransferState,
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub speed_bps: u64,
    pub eta_seconds: Option<u32>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub transfer_type: TransferType,
    /// Resume from byte offset (REST).
    pub resume_offset: u64,
    /// Last problem code surfaced by the worker (§7 taxonomy, serialised
    /// as its discriminant name).
    pub last_problem: Option<String>,
    /// OS-level error number accompanying `last_problem`, if any.
    pub last_os_error: Option<i32>,
    pub forced_action: ForcedAction,
    pub target_file_state: TargetFileState,
    pub ascii_transfer: bool,
}

/// Queue-item kind (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QueueItemType {
    ExploreDir,
    CopyFile,
    MoveFile,
    UploadCopyFile,
    UploadMoveFile,
    UploadCopyExplore,
    UploadMoveExplore,
    Chattr,
}

/// Queue-item lifecycle state (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QueueItemState {
    Waiting,
    Processing,
    Done,
    Skipped,
    Failed,
    UserInputNeeded,
}

/// What to do when the worker hits a conflict it can't resolve alone
/// (file exists, resume vs overwrite, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ForcedAction {
    None,
    Overwrite,
    Resume,
    Skip,
    ResumeOrOverwrite,
}

impl Default for ForcedAction {
    fn default() -> Self {
        Self::None
    }
}

/// Outcome recorded against the local target file once a transfer settles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TargetFileState {
    Unknown,
    Transferred,
    Resumed,
    RolledBack,
}

impl Default for TargetFileState {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Live progress snapshot for a single transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub transfer_id: String,
    pub session_id: String,
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
    pub speed_bps: u64,
    pub eta_seconds: Option<u32>,
    pub percent: f32,
    pub state: TransferState,
}

/// Configuration for the transfer queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferQueueConfig {
    /// Maximum concurrent transfers across all sessions.
    #[serde(default = "default_concurrent")]
    pub max_concurrent: usize,
    /// Default number of retries on failure.
    #[serde(default = "default_retries")]
    pub default_retries: u32,
    /// Retry back-off base in seconds.
    #[serde(default = "default_backoff")]
    pub retry_backoff_sec: u64,
    /// Chunk size for progress-tracked reads/writes (bytes).
    #[serde(default = "default_chunk")]
    pub chunk_size: usize,
}

fn default_concurrent() -> usize {
    3
}
fn default_retries() -> u32 {
    3
}
fn default_backoff() -> u64 {
    5
}
fn default_chunk() -> usize {
    65_536
}

impl Default for TransferQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_concurrent(),
            default_retries: default_retries(),
            retry_backoff_sec: default_backoff(),
            chunk_size: default_chunk(),
        }
    }
}

// ─── FTP Response ────────────────────────────────────────────────────

/// A single FTP response (may be multi-line).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// Full response text (all lines joined).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Whether the response code indicates success (1xx–3xx).
    pub fn is_success(&self) -> bool {
        self.code < 400
    }

    /// Whether this is a positive-preliminary reply (1xx).
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Whether this is a positive-completion reply (2xx).
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Whether this is a positive-intermediate reply (3xx).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Whether this is a transient negative reply (4xx).
    pub fn is_transient_negative(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// Whether this is a permanent negative reply (5xx).
    pub fn is_permanent_negative(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

// ─── Connection Pool ─────────────────────────────────────────────────

/// Statistics about the connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_sessions: u32,
    pub active_sessions: u32,
    pub idle_sessions: u32,
    pub max_sessions: u32,
}

// ─── Server Capabilities ─────────────────────────────────────────────

/// Parsed FEAT response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub mlst: bool,
    pub size: bool,
    pub mdtm: bool,
    pub rest_stream: bool,
    pub utf8: bool,
    pub epsv: bool,
    pub eprt: bool,
    pub auth_tls: bool,
    pub pbsz: bool,
    pub prot: bool,
    pub tvfs: bool,
    pub clnt: bool,
    pub mfmt: bool,
    pub raw_features: Vec<String>,
}

/// Diagnostics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpDiagnostics {
    pub session_id: String,
    pub host: String,
    pub security: FtpSecurityMode,
    pub features: ServerFeatures,
    pub current_directory: String,
    pub system_type: Option<String>,
    pub latency_ms: Option<u64>,
    pub last_response_code: Option<u16>,
}

// ─── Bookmark ────────────────────────────────────────────────────────

/// A saved FTP bookmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpBookmark {
    pub id: String,
    pub label: String,
    pub config: FtpConnectionConfig,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}
