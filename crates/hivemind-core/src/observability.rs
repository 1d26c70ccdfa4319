//! Observability - cluster lifecycle events as append-only JSONL.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hivemind_proto::{NodeId, RoleName};

/// One cluster lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub timestamp: DateTime<Utc>,
    pub session: Uuid,
    pub event_type: String,
    pub role: Option<RoleName>,
    pub node: Option<NodeId>,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Append-only event log for one cluster session.
pub struct EventLog {
    path: PathBuf,
    session: Uuid,
}

impl EventLog {
    pub fn new(path: PathBuf, session: Uuid) -> Self {
        Self { path, session }
    }

    /// Emit an event.
    pub fn emit(
        &self,
        event_type: &str,
        role: Option<&RoleName>,
        node: Option<NodeId>,
        message: &str,
    ) -> Result<()> {
        let event = ClusterEvent {
            timestamp: Utc::now(),
            session: self.session,
            event_type: event_type.to_string(),
            role: role.cloned(),
            node,
            message: message.to_string(),
            metadata: serde_json::Value::Null,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(&event)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }

    /// Read recent events.
    pub fn read_recent(&self, limit: usize) -> Vec<ClusterEvent> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let reader = BufReader::new(file);
        let mut events: Vec<ClusterEvent> = reader
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        if events.len() > limit {
            events.drain(0..events.len() - limit);
        }

        events
    }
}
