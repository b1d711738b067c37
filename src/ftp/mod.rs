//! FTP/FTPS client engine.
//!
//! Layered roughly bottom-up: wire types and errors, then the control
//! and data channel primitives, then the listing parser, then the
//! worker state machine and queue that drive transfers, then the
//! session pool and public service facade.

pub mod client;
pub mod connection;
pub mod data_connection;
pub mod directory;
pub mod error;
pub mod file_ops;
pub mod listing;
pub mod listing_cache;
pub mod opened_files;
pub mod operation;
pub mod path;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod service;
pub mod speed_meter;
pub mod tls;
pub mod transfer;
pub mod types;
pub mod worker;

pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use types::*;

use crate::ftp::types::TransferProgress;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

lazy_static! {
    /// Process-wide live progress table, keyed by transfer id. Populated
    /// by the worker state machine as bytes move; read by the service
    /// facade for progress queries without round-tripping through a
    /// session actor.
    pub static ref TRANSFER_PROGRESS: Mutex<HashMap<String, TransferProgress>> = Mutex::new(HashMap::new());
}
