//! Append-only session ledger.
//!
//! The file is JSON-lines: the header object on the first line, one entry
//! object per following line. Every append is flushed and fsynced before the
//! call returns, so a resource the engine reports as created is always
//! recoverable from disk. All writes go through one mutex; append order is
//! the observation order for the reporter and for rollback.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use skysweep_core::{LedgerEntry, LedgerHeader, SessionId};

use crate::error::EngineError;

pub struct SessionLedger {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    entries: Vec<LedgerEntry>,
}

impl SessionLedger {
    /// Create the ledger file and persist the header.
    pub fn create(dir: &Path, header: &LedgerHeader) -> Result<Self, EngineError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(header.session_id.ledger_file_name());
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::Ledger(format!("create {}: {e}", path.display())))?;

        let mut line = serde_json::to_string(header)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        tracing::info!(path = %path.display(), session = %header.session_id, "session ledger created");
        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                entries: Vec::new(),
            }),
        })
    }

    /// Reopen an existing ledger for appending (rollback path).
    pub fn open(path: &Path) -> Result<(Self, LedgerHeader, Vec<LedgerEntry>), EngineError> {
        let (header, entries) = Self::read(path)?;
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| EngineError::Ledger(format!("open {}: {e}", path.display())))?;
        let ledger = Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                file,
                entries: entries.clone(),
            }),
        };
        Ok((ledger, header, entries))
    }

    /// Append one entry, durable before return.
    pub fn append(&self, entry: LedgerEntry) -> Result<(), EngineError> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EngineError::Ledger("ledger lock poisoned".into()))?;
        inner.file.write_all(line.as_bytes())?;
        inner.file.sync_data()?;
        tracing::debug!(
            event = ?entry.event,
            resource = %entry.resource.resource_id,
            "ledger entry appended"
        );
        inner.entries.push(entry);
        Ok(())
    }

    /// Snapshot of all entries appended so far, in order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner
            .lock()
            .map(|inner| inner.entries.clone())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a ledger file into header + entries.
    pub fn read(path: &Path) -> Result<(LedgerHeader, Vec<LedgerEntry>), EngineError> {
        let file = File::open(path)
            .map_err(|e| EngineError::Ledger(format!("read {}: {e}", path.display())))?;
        let mut lines = BufReader::new(file).lines();

        let header_line = lines
            .next()
            .ok_or_else(|| EngineError::Ledger(format!("{}: empty ledger", path.display())))??;
        let header: LedgerHeader = serde_json::from_str(&header_line)?;

        let mut entries = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok((header, entries))
    }

    /// Locate the ledger file for a session id in `dir`.
    pub fn find(dir: &Path, session_id: &SessionId) -> PathBuf {
        dir.join(session_id.ledger_file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysweep_core::{LedgerEvent, ResourceRef, ResourceType};

    fn header(id: &str) -> LedgerHeader {
        LedgerHeader {
            session_id: SessionId(id.to_string()),
            started_at: jiff::Timestamp::now(),
            user: "ops".into(),
            dry_run: false,
            invocation: serde_json::json!({"command": "provision"}),
        }
    }

    fn resource(id: &str, rt: ResourceType, session: &str) -> ResourceRef {
        ResourceRef {
            resource_id: id.to_string(),
            resource_type: rt,
            account_name: "account01".into(),
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            created_at: jiff::Timestamp::now(),
            session_id: SessionId(session.to_string()),
            metadata: Default::default(),
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SessionLedger::create(dir.path(), &header("20250801_120000_ab12")).unwrap();

        ledger
            .append(LedgerEntry::created(resource(
                "i-0abc",
                ResourceType::Instance,
                "20250801_120000_ab12",
            )))
            .unwrap();
        ledger
            .append(LedgerEntry::retired_already_absent(resource(
                "sg-gone",
                ResourceType::SecurityGroup,
                "20250801_120000_ab12",
            )))
            .unwrap();

        let (read_header, entries) = SessionLedger::read(ledger.path()).unwrap();
        assert_eq!(read_header.user, "ops");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, LedgerEvent::Created);
        assert_eq!(entries[0].resource.resource_id, "i-0abc");
        assert!(entries[1].already_absent);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let h = header("20250801_120000_dup0");
        SessionLedger::create(dir.path(), &h).unwrap();
        assert!(SessionLedger::create(dir.path(), &h).is_err());
    }

    #[test]
    fn reopen_appends_after_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let h = header("20250801_120000_cd34");
        {
            let ledger = SessionLedger::create(dir.path(), &h).unwrap();
            ledger
                .append(LedgerEntry::created(resource(
                    "lt-1",
                    ResourceType::LaunchTemplate,
                    "20250801_120000_cd34",
                )))
                .unwrap();
        }

        let path = SessionLedger::find(dir.path(), &h.session_id);
        let (ledger, _, existing) = SessionLedger::open(&path).unwrap();
        assert_eq!(existing.len(), 1);
        ledger
            .append(LedgerEntry::retired(resource(
                "lt-1",
                ResourceType::LaunchTemplate,
                "20250801_120000_cd34",
            )))
            .unwrap();

        let (_, entries) = SessionLedger::read(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event, LedgerEvent::Retired);
    }
}
