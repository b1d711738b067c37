//! FTP-specific error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Categorised FTP error (§7 taxonomy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP response code that triggered the error, if any.
    pub code: Option<u16>,
    pub session_id: Option<String>,
    /// Raw OS error number, when the failure originated below the
    /// protocol layer (connect/send/recv/bind).
    pub os_error: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FtpErrorKind {
    // Network / OS
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    DnsFailure,
    BindFailed,
    SendFailed,
    RecvFailed,
    /// TCP / DNS resolution failure, not otherwise classified.
    ConnectionFailed,

    // Protocol
    BadReply,
    UnexpectedCode,
    RestNotSupported,
    SizeNotSupported,
    ProtocolError,

    // TLS
    HandshakeFailed,
    UnverifiedCert,
    CertMismatch,
    EncryptFailed,
    TlsCanRetry,
    TlsDoNotRetry,
    TlsFailed,

    // Data integrity
    AsciiForBinaryFile,
    ResumeTestFailed,
    IncompleteDownload,
    DecompressError,

    // Local
    LowMemory,
    DiskWriteError,
    LocalFileLocked,
    SrcFileInUse,
    IoError,

    // User
    Cancelled,
    SkippedByPolicy,
    UserInputNeeded,

    // Logic
    InvalidPath,
    HomeDirNotDefined,
    InvalidPort,
    HostMissing,
    InvalidConfig,

    // Session bookkeeping (not in §7, but needed at the client boundary)
    AuthFailed,
    CommandRejected,
    DataChannelFailed,
    TransferFailed,
    SessionNotFound,
    Disconnected,
    PermissionDenied,
    NotFound,
    QuotaExceeded,
    Unknown,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
            session_id: None,
            os_error: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_os_error(mut self, errno: i32) -> Self {
        self.os_error = Some(errno);
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFailed, msg)
    }

    pub fn connection_reset(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionReset, msg)
    }

    pub fn tls_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TlsFailed, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::AuthFailed, msg)
    }

    pub fn command_rejected(code: u16, msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::CommandRejected, msg).with_code(code)
    }

    pub fn data_channel(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::DataChannelFailed, msg)
    }

    pub fn transfer_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TransferFailed, msg)
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ProtocolError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::IoError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(
            FtpErrorKind::SessionNotFound,
            format!("FTP session '{}' not found", id),
        )
        .with_session(id)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::NotFound, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    pub fn pool_exhausted(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    pub fn resume_test_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ResumeTestFailed, msg)
    }

    pub fn ascii_for_binary(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::AsciiForBinaryFile, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Cancelled, msg)
    }

    pub fn local_file_locked(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::LocalFileLocked, msg)
    }

    /// Classify an FTP reply code into the most appropriate error kind.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpErrorKind::Disconnected,
            425 | 426 => FtpErrorKind::DataChannelFailed,
            430 | 530 => FtpErrorKind::AuthFailed,
            450 | 550 => {
                let lower = text.to_lowercase();
                if lower.contains("permission") || lower.contains("denied") {
                    FtpErrorKind::PermissionDenied
                } else if lower.contains("not found") || lower.contains("no such") {
                    FtpErrorKind::NotFound
                } else if lower.contains("quota") {
                    FtpErrorKind::QuotaExceeded
                } else {
                    FtpErrorKind::CommandRejected
                }
            }
            451 | 452 | 552 => FtpErrorKind::TransferFailed,
            500..=504 => FtpErrorKind::CommandRejected,
            _ if code >= 400 => FtpErrorKind::CommandRejected,
            _ => FtpErrorKind::Unknown,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
            session_id: None,
            os_error: None,
        }
    }

    /// Auto-retry classification used by the worker state machine (§4.1):
    /// 4xx 426/450, SSL can-retry and no-data-transfer timeouts retry after
    /// a fixed delay; everything else is either permanent or immediate.
    pub fn is_auto_retry_with_delay(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::TlsCanRetry | FtpErrorKind::Timeout
        ) || matches!(self.code, Some(426) | Some(450))
    }

    /// Permanent failures the worker must not retry (§4.1 "permanent").
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::HostMissing
                | FtpErrorKind::InvalidPort
                | FtpErrorKind::RestNotSupported
                | FtpErrorKind::TlsDoNotRetry
        ) || matches!(self.code, Some(c) if (500..600).contains(&c))
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        let os_error = e.raw_os_error();
        let mut err = if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else if e.kind() == std::io::ErrorKind::ConnectionReset {
            Self::connection_reset(e.to_string())
        } else {
            Self::io_error(e.to_string())
        };
        if let Some(errno) = os_error {
            err = err.with_os_error(errno);
        }
        err
    }
}

impl From<FtpError> for String {
    fn from(e: FtpError) -> String {
        e.message
    }
}

impl From<rustls::Error> for FtpError {
    fn from(e: rustls::Error) -> Self {
        Self::tls_failed(e.to_string())
    }
}

/// Failures compiling a listing rule grammar or `.str` server-type file.
/// Kept distinct from [`FtpError`] since these are diagnosable at
/// server-type load time, not at a live session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("unexpected end of rule at function '{0}'")]
    UnexpectedEof(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("bad argument to '{func}': {detail}")]
    BadArgument { func: String, detail: String },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unbalanced parentheses in autodetect expression")]
    UnbalancedParens,
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("`.str` file header magic mismatch")]
    BadMagic,
    #[error("`.str` file version {0} is newer than supported")]
    UnsupportedVersion(u8),
    #[error("rule starting with '*' has no closing ';'")]
    UnterminatedRule,
    #[error("malformed function call: '{0}'")]
    MalformedCall(String),
    #[error("missing argument at position {0}")]
    MissingArgument(usize),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<RuleError> for FtpError {
    fn from(e: RuleError) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, e.to_string())
    }
}
