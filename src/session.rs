//! Append-only JSONL session logs
//!
//! One file per session under `<state dir>/sessions/<encoded cwd>/`. The
//! first record is a header carrying the session id and configuration; each
//! later record wraps one `Event`. Records are written and flushed one at a
//! time, in emission order.

use crate::config::AgentConfig;
use crate::event::{Event, EventSink, SinkError};
use crate::llm::Usage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use thiserror::Error;

const SESSION_EXTENSION: &str = "jsonl";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Session file {} has no session header", .0.display())]
    MissingHeader(PathBuf),
    #[error("No saved session for {}", .0.display())]
    NoSession(PathBuf),
}

/// One line of a session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionRecord {
    Session {
        timestamp: DateTime<Utc>,
        id: String,
        config: AgentConfig,
    },
    Event {
        timestamp: DateTime<Utc>,
        event: Event,
    },
}

/// A session file read back into memory
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: String,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
    pub config: AgentConfig,
    pub events: Vec<Event>,
}

impl SessionData {
    /// Sum of every `token_usage` event
    pub fn total_usage(&self) -> Usage {
        self.events.iter().fold(Usage::default(), |mut total, event| {
            if let Event::TokenUsage {
                input,
                output,
                total: sum,
                cache_read,
                cache_write,
            } = event
            {
                total.input_tokens += input;
                total.output_tokens += output;
                total.total_tokens += sum;
                total.cache_read_tokens += cache_read;
                total.cache_write_tokens += cache_write;
            }
            total
        })
    }
}

/// Summary entry returned by `SessionStore::list_sessions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Directory layout and lookup for session files
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join("sessions"),
        }
    }

    /// Directory holding the sessions started in `cwd`
    pub fn dir_for(&self, cwd: &Path) -> PathBuf {
        self.root.join(encode_cwd(cwd))
    }

    /// New session for `cwd`. Nothing touches disk until the first event.
    pub fn start_session(&self, config: &AgentConfig, cwd: &Path) -> SessionLog {
        let id = uuid::Uuid::new_v4().to_string();
        let created = Utc::now();
        let file_name = format!(
            "{}_{}.{SESSION_EXTENSION}",
            created.format("%Y%m%dT%H%M%S"),
            id
        );
        let path = self.dir_for(cwd).join(file_name);
        tracing::debug!(session_id = %id, path = %path.display(), "Session started");

        SessionLog {
            id: id.clone(),
            path,
            state: Mutex::new(LogState {
                writer: None,
                header: Some(SessionRecord::Session {
                    timestamp: created,
                    id,
                    config: config.clone(),
                }),
                torn: false,
            }),
        }
    }

    /// Sessions for `cwd`, most recently modified first
    pub fn list_sessions(&self, cwd: &Path) -> Result<Vec<SessionInfo>, SessionError> {
        let dir = self.dir_for(cwd);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            sessions.push(SessionInfo { path, modified });
        }
        sessions.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(sessions)
    }

    pub fn most_recent_session(&self, cwd: &Path) -> Result<Option<PathBuf>, SessionError> {
        Ok(self.list_sessions(cwd)?.into_iter().next().map(|s| s.path))
    }

    /// Read a session file. Lines that fail to parse are skipped.
    pub fn load(path: &Path) -> Result<SessionData, SessionError> {
        let contents = std::fs::read_to_string(path)?;
        let mut header = None;
        let mut events = Vec::new();

        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionRecord>(line) {
                Ok(SessionRecord::Session {
                    timestamp,
                    id,
                    config,
                }) => {
                    if header.is_none() {
                        header = Some((timestamp, id, config));
                    }
                }
                Ok(SessionRecord::Event { event, .. }) => events.push(event),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed session record"
                    );
                }
            }
        }

        let (created, id, config) =
            header.ok_or_else(|| SessionError::MissingHeader(path.to_path_buf()))?;
        Ok(SessionData {
            id,
            path: path.to_path_buf(),
            created,
            config,
            events,
        })
    }

    /// Load an existing session and reopen it for appending
    pub fn resume(path: &Path) -> Result<(SessionData, SessionLog), SessionError> {
        let data = Self::load(path)?;
        let log = SessionLog {
            id: data.id.clone(),
            path: path.to_path_buf(),
            state: Mutex::new(LogState {
                writer: None,
                header: None,
                torn: false,
            }),
        };
        tracing::info!(
            session_id = %data.id,
            events = data.events.len(),
            "Session resumed"
        );
        Ok((data, log))
    }

    /// Resume the most recent session for `cwd`
    pub fn resume_latest(&self, cwd: &Path) -> Result<(SessionData, SessionLog), SessionError> {
        let path = self
            .most_recent_session(cwd)?
            .ok_or_else(|| SessionError::NoSession(cwd.to_path_buf()))?;
        Self::resume(&path)
    }
}

/// `/home/me/proj` -> `--home-me-proj--`
pub fn encode_cwd(cwd: &Path) -> String {
    let path = cwd.to_string_lossy();
    let trimmed = path.trim_start_matches(['/', '\\']);
    format!("--{}--", trimmed.replace(['/', '\\', ':'], "-"))
}

struct LogState {
    writer: Option<BufWriter<File>>,
    /// Written just before the first event
    header: Option<SessionRecord>,
    /// The last write failed partway
    torn: bool,
}

/// Writer half of a session; also an `EventSink`
pub struct SessionLog {
    id: String,
    path: PathBuf,
    state: Mutex<LogState>,
}

impl SessionLog {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event record and flush it.
    ///
    /// A failed write drops the writer along with any unflushed bytes; the
    /// next append reopens the file and starts on a fresh line.
    pub fn append(&self, event: &Event) -> Result<(), SessionError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        let result = self.write_event(state, event);
        if result.is_err() {
            if let Some(writer) = state.writer.take() {
                let (_file, _unflushed) = writer.into_parts();
            }
            state.torn = true;
        }
        result
    }

    fn write_event(&self, state: &mut LogState, event: &Event) -> Result<(), SessionError> {
        if state.writer.is_none() {
            if let Some(dir) = self.path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            state.writer = Some(BufWriter::new(file));
        }
        let Some(writer) = state.writer.as_mut() else {
            return Err(std::io::Error::other("session writer missing").into());
        };

        if state.torn {
            // Terminate whatever half line the failed write left behind
            writer.write_all(b"\n")?;
            state.torn = false;
        }

        if let Some(header) = state.header.take() {
            if let Err(e) = write_record(writer, &header) {
                // Retry the header with the next event
                state.header = Some(header);
                return Err(e);
            }
        }

        let record = SessionRecord::Event {
            timestamp: Utc::now(),
            event: event.clone(),
        };
        write_record(writer, &record)
    }
}

fn write_record(writer: &mut BufWriter<File>, record: &SessionRecord) -> Result<(), SessionError> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl EventSink for SessionLog {
    async fn on(&self, event: &Event) -> Result<(), SinkError> {
        self.append(event).map_err(|e| match e {
            SessionError::Io(e) => SinkError::Io(e),
            SessionError::Json(e) => SinkError::Json(e),
            other => SinkError::Other(other.to_string()),
        })
    }
}
