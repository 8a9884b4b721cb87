//! Durable session records and the on-disk session layout.
//!
//! Each session owns a directory `{data_root}/meetings/{id}/` holding the
//! audio file, transcript, optional summary, and the session record itself
//! (`session.json`). Record writes are synchronous and atomic (tmp file +
//! rename) so a crash immediately after a reported success still leaves a
//! recoverable row.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{SessionError, StorageError};
use crate::session::{MeetingSession, SessionStatus};

const RECORD_FILE: &str = "session.json";

/// CRUD over persisted [`MeetingSession`] records.
///
/// This is the only component that touches record durability; the state
/// machine owns which transitions get written, the store owns that they
/// survive a process restart.
pub struct SessionStore {
    meetings_dir: PathBuf,
}

impl SessionStore {
    /// Opens (creating if needed) the meetings directory under `data_root`.
    pub fn open(data_root: &Path) -> Result<Self, StorageError> {
        let meetings_dir = data_root.join("meetings");
        fs::create_dir_all(&meetings_dir)?;

        debug!("Session store opened at {:?}", meetings_dir);

        Ok(Self { meetings_dir })
    }

    pub fn meetings_dir(&self) -> &Path {
        &self.meetings_dir
    }

    /// Directory owned by one session.
    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.meetings_dir.join(id)
    }

    /// Resolves a record-relative path (e.g. "{id}/audio.wav") to a full
    /// filesystem path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.meetings_dir.join(relative)
    }

    /// Creates the session directory and writes the initial record.
    pub fn create(&self, session: &MeetingSession) -> Result<(), StorageError> {
        let dir = self.session_dir(&session.id);
        fs::create_dir_all(&dir)?;

        self.save(session)?;

        info!("Created session record: {} - {}", session.id, session.title);
        Ok(())
    }

    /// Writes the record atomically. Completes before the caller is told
    /// the surrounding operation succeeded.
    pub fn save(&self, session: &MeetingSession) -> Result<(), StorageError> {
        let dir = self.session_dir(&session.id);
        let path = dir.join(RECORD_FILE);
        let tmp = dir.join(format!("{}.tmp", RECORD_FILE));

        let payload =
            serde_json::to_vec_pretty(session).map_err(StorageError::Encode)?;

        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;

        debug!(
            "Saved session {} (status: {})",
            session.id,
            session.status.as_str()
        );
        Ok(())
    }

    /// Loads one session record. Unknown ids return `None`; unparseable
    /// records are a hard error, not a silent skip.
    pub fn get(&self, id: &str) -> Result<Option<MeetingSession>, StorageError> {
        let path = self.session_dir(id).join(RECORD_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read(&path)?;
        let session =
            serde_json::from_slice(&raw).map_err(|source| StorageError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;

        Ok(Some(session))
    }

    /// Returns all persisted sessions. Order is not significant.
    pub fn list(&self) -> Result<Vec<MeetingSession>, StorageError> {
        let mut sessions = Vec::new();

        for entry in fs::read_dir(&self.meetings_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let id = entry.file_name().to_string_lossy().to_string();
            match self.get(&id)? {
                Some(session) => sessions.push(session),
                None => {
                    // Directory without a record: a crash between mkdir and
                    // the first save. Nothing to recover.
                    warn!("Session directory without record, skipping: {}", id);
                }
            }
        }

        debug!("Listed {} session records", sessions.len());
        Ok(sessions)
    }

    /// Deletes the record and the session's whole directory tree.
    pub fn delete(&self, id: &str) -> Result<(), SessionError> {
        let dir = self.session_dir(id);
        if !dir.join(RECORD_FILE).exists() {
            return Err(SessionError::SessionNotFound { id: id.to_string() });
        }

        fs::remove_dir_all(&dir).map_err(StorageError::Io)?;

        info!("Deleted session {} and its directory", id);
        Ok(())
    }

    /// Startup recovery: any row still marked Recording was cut off by an
    /// unclean shutdown. Transition those to Interrupted and return every
    /// interrupted session for possible retry.
    pub fn recover_interrupted(&self) -> Result<Vec<MeetingSession>, StorageError> {
        let mut interrupted = Vec::new();

        for mut session in self.list()? {
            if session.status == SessionStatus::Recording {
                session.status = SessionStatus::Interrupted;
                session.error_message =
                    Some("Session interrupted by unclean shutdown (recovered on launch)".to_string());
                self.save(&session)?;

                info!(
                    "Recovered session {} from Recording to Interrupted",
                    session.id
                );
            }

            if session.status == SessionStatus::Interrupted {
                interrupted.push(session);
            }
        }

        if !interrupted.is_empty() {
            info!(
                "Found {} interrupted session(s) that may need retry",
                interrupted.len()
            );
        }

        Ok(interrupted)
    }
}
