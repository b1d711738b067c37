//! # ftpcore — interactive FTP/FTPS client engine
//!
//! Full implementation of the FTP protocol (RFC 959) with extensions:
//! - **RFC 2228 / 4217** — AUTH TLS / FTPS (Explicit & Implicit)
//! - **RFC 3659** — Extensions: MLSD/MLST, SIZE, MDTM, REST STREAM
//! - **RFC 2389** — FEAT negotiation
//! - **RFC 2428** — EPSV / EPRT (IPv6-ready)
//!
//! Layered roughly bottom-up (see `ftp` module docs): wire types and
//! errors, control/data channel primitives, the rule-driven listing
//! parser, the worker state machine and queue driving transfers, and
//! the session pool / service facade a host application talks to.

pub mod ftp;

pub use ftp::*;
