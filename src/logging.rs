//! Request log: a bounded in-memory ring mirrored to a JSONL file.
//!
//! Console output goes through `tracing`; this log keeps the per-request
//! rewrite trail that the dashboard reads back through `/proxy/logs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const MAX_LOG_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
            request_id: None,
            context: None,
        }
    }

    pub fn for_request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

pub struct RequestLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    file_path: PathBuf,
    writer: BufWriter<File>,
    /// Lines currently in the file; compaction starts once this reaches twice the capacity.
    file_lines: usize,
}

impl RequestLog {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::with_capacity(file_path, MAX_LOG_ENTRIES)
    }

    /// Open (or create) the JSONL file and replay its tail into memory. A file
    /// already past the compaction threshold is rewritten on the spot.
    pub fn with_capacity(file_path: impl AsRef<Path>, capacity: usize) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let capacity = capacity.max(1);

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut entries = VecDeque::with_capacity(capacity);
        let mut file_lines = 0;

        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                file_lines += 1;
                if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
                    push_bounded(&mut entries, entry, capacity);
                }
            }
        }

        let writer = append_writer(&file_path)?;
        let mut log = Self {
            entries,
            capacity,
            file_path,
            writer,
            file_lines,
        };
        if log.file_lines >= log.compaction_threshold() {
            log.compact()?;
        }
        Ok(log)
    }

    pub fn append(&mut self, entry: LogEntry) {
        if let Ok(json) = serde_json::to_string(&entry) {
            if writeln!(self.writer, "{}", json).is_ok() {
                self.file_lines += 1;
            }
            let _ = self.writer.flush();
        }
        push_bounded(&mut self.entries, entry, self.capacity);

        if self.file_lines >= self.compaction_threshold() {
            if let Err(e) = self.compact() {
                tracing::warn!(path = %self.file_path.display(), error = %e, "Failed to compact request log");
            }
        }
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Rewrite the file so it holds only the in-memory entries.
    pub fn compact(&mut self) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.file_path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(writer, "{}", json)?;
            }
        }
        writer.flush()?;

        self.writer = append_writer(&self.file_path)?;
        self.file_lines = self.entries.len();
        Ok(())
    }

    fn compaction_threshold(&self) -> usize {
        self.capacity * 2
    }
}

fn append_writer(file_path: &Path) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;
    Ok(BufWriter::new(file))
}

fn push_bounded(entries: &mut VecDeque<LogEntry>, entry: LogEntry, capacity: usize) {
    if entries.len() >= capacity {
        entries.pop_front();
    }
    entries.push_back(entry);
}

#[derive(Clone)]
pub struct SharedLogger(Arc<Mutex<RequestLog>>);

impl SharedLogger {
    pub fn new(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(RequestLog::open(file_path)?))))
    }

    pub fn log(&self, entry: LogEntry) {
        if let Ok(mut log) = self.0.lock() {
            log.append(entry);
        }
    }

    pub fn info(&self, component: impl Into<String>, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, component, message));
    }

    /// Log an entry tied to one proxied request.
    pub fn request(
        &self,
        request_id: Uuid,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
        context: Option<serde_json::Value>,
    ) {
        let mut entry = LogEntry::new(level, component, message).for_request(request_id);
        entry.context = context;
        self.log(entry);
    }

    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }
}
