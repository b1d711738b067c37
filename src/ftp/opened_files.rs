//! Opened-files registry (§4.4, L2): a process-wide table serialising
//! concurrent operations targeting the same remote file across workers.
//!
//! The rule is deliberately coarse (no per-byte range locking): all
//! writers and all "structural" operations (delete, rename) are mutually
//! exclusive, while reads are allowed to overlap since they're idempotent.

use crate::ftp::path::paths_equal;
use crate::ftp::types::PathType;
use std::collections::HashMap;
use std::sync::Mutex;

/// Access type requested for a registration (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
    Delete,
    Rename,
}

impl AccessType {
    /// Two registrations conflict iff they target the same
    /// (session,path,name) *and* any of: the access types differ, or both
    /// are `write`.
    fn conflicts_with(self, other: AccessType) -> bool {
        if self != other {
            return true;
        }
        self == AccessType::Write
    }
}

struct Registration {
    session: String,
    path: String,
    path_type: PathType,
    name: String,
    access: AccessType,
}

/// Returned when `open` can't be granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict;

pub struct OpenedFilesRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    records: HashMap<u64, Registration>,
    next_uid: u64,
    freelist: Vec<u64>,
}

impl OpenedFilesRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                next_uid: 1,
                freelist: Vec::new(),
            }),
        }
    }

    /// Attempt to register mutually-exclusive access to a remote file.
    pub fn open(
        &self,
        session: &str,
        path: &str,
        path_type: PathType,
        name: &str,
        access: AccessType,
    ) -> Result<u64, Conflict> {
        let mut g = self.inner.lock().unwrap();

        let clash = g.records.values().any(|r| {
            r.session == session
                && paths_equal(path_type, &r.path, path)
                && r.name == name
                && r.access.conflicts_with(access)
        });
        if clash {
            return Err(Conflict);
        }

        let uid = g.freelist.pop().unwrap_or_else(|| {
            let id = g.next_uid;
            g.next_uid += 1;
            id
        });

        g.records.insert(
            uid,
            Registration {
                session: session.to_string(),
                path: path.to_string(),
                path_type,
                name: name.to_string(),
                access,
            },
        );
        Ok(uid)
    }

    /// Release a registration by uid, recycling it into the freelist.
    pub fn close(&self, uid: u64) {
        let mut g = self.inner.lock().unwrap();
        if g.records.remove(&uid).is_some() {
            g.freelist.push(uid);
        }
    }

    /// Number of live registrations (used by tests and diagnostics).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OpenedFilesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_reads_allowed() {
        let reg = OpenedFilesRegistry::new();
        let a = reg
            .open("s1", "/home", PathType::Unix, "f.txt", AccessType::Read)
            .unwrap();
        let b = reg
            .open("s1", "/home", PathType::Unix, "f.txt", AccessType::Read)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn write_excludes_write() {
        let reg = OpenedFilesRegistry::new();
        reg.open("s1", "/home", PathType::Unix, "f.txt", AccessType::Write)
            .unwrap();
        let second = reg.open("s1", "/home", PathType::Unix, "f.txt", AccessType::Write);
        assert_eq!(second, Err(Conflict));
    }

    #[test]
    fn write_excludes_read() {
        let reg = OpenedFilesRegistry::new();
        reg.open("s1", "/home", PathType::Unix, "f.txt", AccessType::Write)
            .unwrap();
        let second = reg.open("s1", "/home", PathType::Unix, "f.txt", AccessType::Read);
        assert_eq!(second, Err(Conflict));
    }

    #[test]
    fn close_releases_and_recycles() {
        let reg = OpenedFilesRegistry::new();
        let uid = reg
            .open("s1", "/home", PathType::Unix, "f.txt", AccessType::Write)
            .unwrap();
        reg.close(uid);
        assert!(reg.is_empty());
        let uid2 = reg
            .open("s1", "/home", PathType::Unix, "f.txt", AccessType::Write)
            .unwrap();
        assert_eq!(uid, uid2);
    }

    #[test]
    fn different_sessions_do_not_conflict() {
        let reg = OpenedFilesRegistry::new();
        reg.open("s1", "/home", PathType::Unix, "f.txt", AccessType::Write)
            .unwrap();
        let other = reg.open("s2", "/home", PathType::Unix, "f.txt", AccessType::Write);
        assert!(other.is_ok());
    }
}
