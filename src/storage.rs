//! Durable storage interface
//!
//! The coaching engine only appends. A store opens and closes session
//! records and accepts typed rows for the per-frame tables, guard flags and
//! the voice cue log. Every row carries a stable `record_id`; the four rows
//! written for one frame share it, so a store can upsert by
//! `(table, record_id)` and a repeated flush does not duplicate data.

use crate::config::PerformanceMode;
use crate::error::CoachError;
use crate::guard::GuardFlag;
use crate::landmarks::Landmark;
use crate::types::{
    BiomechanicsMetrics, Cue, CuePriority, CueType, DepthMetrics, JointAngles, KinematicsMetrics,
    LoadEstimate, RiskAssessment, Severity, TechniqueDeviation,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Descriptive fields recorded when a session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub template: String,
    pub performance_mode: PerformanceMode,
    pub engine_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl SessionMetadata {
    pub fn new(template: impl Into<String>, performance_mode: PerformanceMode) -> Self {
        Self {
            template: template.into(),
            performance_mode,
            engine_version: crate::ENGINE_VERSION.to_string(),
            device: None,
        }
    }
}

/// A session as the store sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub owner_id: String,
    pub metadata: SessionMetadata,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Identity and placement shared by every frame-level row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowKey {
    pub record_id: Uuid,
    pub session_id: Uuid,
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointsRow {
    #[serde(flatten)]
    pub key: RowKey,
    pub landmarks: Vec<Landmark>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnglesRow {
    #[serde(flatten)]
    pub key: RowKey,
    pub angles_2d: JointAngles,
    pub angles_3d: JointAngles,
    pub deviations: Vec<TechniqueDeviation>,
    pub raw_severity: Severity,
    pub stable_severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomechanicsRow {
    #[serde(flatten)]
    pub key: RowKey,
    pub metrics: BiomechanicsMetrics,
    pub risk: RiskAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicsRow {
    #[serde(flatten)]
    pub key: RowKey,
    pub depth: DepthMetrics,
    pub kinematics: KinematicsMetrics,
    pub load: LoadEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardFlagsRow {
    #[serde(flatten)]
    pub key: RowKey,
    pub safe: bool,
    pub flags: Vec<GuardFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCueRow {
    pub record_id: Uuid,
    pub session_id: Uuid,
    pub cue_type: CueType,
    pub priority: CuePriority,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_pan: Option<f64>,
    /// Frame-clock time the cue was accepted
    pub timestamp_ms: f64,
    pub recorded_at: DateTime<Utc>,
}

impl VoiceCueRow {
    pub fn new(cue: &Cue, timestamp_ms: f64) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            session_id: cue.session_id,
            cue_type: cue.cue_type,
            priority: cue.priority,
            message: cue.message.clone(),
            spatial_pan: cue.spatial_pan,
            timestamp_ms,
            recorded_at: Utc::now(),
        }
    }
}

/// One append to a named table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum StoreRow {
    Joints(JointsRow),
    Angles(AnglesRow),
    Biomechanics(BiomechanicsRow),
    Kinematics(KinematicsRow),
    GuardFlags(GuardFlagsRow),
    #[serde(rename = "voice_cues")]
    VoiceCue(VoiceCueRow),
}

impl StoreRow {
    pub fn table(&self) -> &'static str {
        match self {
            StoreRow::Joints(_) => "joints",
            StoreRow::Angles(_) => "angles",
            StoreRow::Biomechanics(_) => "biomechanics",
            StoreRow::Kinematics(_) => "kinematics",
            StoreRow::GuardFlags(_) => "guard_flags",
            StoreRow::VoiceCue(_) => "voice_cues",
        }
    }

    pub fn record_id(&self) -> Uuid {
        match self {
            StoreRow::Joints(r) => r.key.record_id,
            StoreRow::Angles(r) => r.key.record_id,
            StoreRow::Biomechanics(r) => r.key.record_id,
            StoreRow::Kinematics(r) => r.key.record_id,
            StoreRow::GuardFlags(r) => r.key.record_id,
            StoreRow::VoiceCue(r) => r.record_id,
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            StoreRow::Joints(r) => r.key.session_id,
            StoreRow::Angles(r) => r.key.session_id,
            StoreRow::Biomechanics(r) => r.key.session_id,
            StoreRow::Kinematics(r) => r.key.session_id,
            StoreRow::GuardFlags(r) => r.key.session_id,
            StoreRow::VoiceCue(r) => r.session_id,
        }
    }
}

/// Append-only store reachable from any thread
pub trait CoachStore: Send + Sync {
    /// Open a session record and return its id
    fn start_session(&self, owner_id: &str, metadata: &SessionMetadata)
        -> Result<Uuid, CoachError>;

    /// Stamp the end time of an open session
    fn close_session(&self, session_id: Uuid) -> Result<(), CoachError>;

    fn insert(&self, row: StoreRow) -> Result<(), CoachError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<Uuid, SessionRecord>,
    rows: Vec<StoreRow>,
}

/// Process-local store with an offline switch for exercising failure paths
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with a storage error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<StoreRow> {
        self.state
            .lock()
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    /// Hand every stored row to the caller and forget them
    pub fn drain_rows(&self) -> Vec<StoreRow> {
        self.state
            .lock()
            .map(|mut s| std::mem::take(&mut s.rows))
            .unwrap_or_default()
    }

    pub fn rows_in(&self, table: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.rows.iter().filter(|r| r.table() == table).count())
            .unwrap_or(0)
    }

    pub fn session(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.sessions.get(&session_id).cloned())
    }

    fn check_online(&self) -> Result<(), CoachError> {
        if self.is_offline() {
            Err(CoachError::StorageError("store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, CoachError> {
        self.state
            .lock()
            .map_err(|_| CoachError::StorageError("store lock poisoned".to_string()))
    }
}

impl CoachStore for InMemoryStore {
    fn start_session(
        &self,
        owner_id: &str,
        metadata: &SessionMetadata,
    ) -> Result<Uuid, CoachError> {
        self.check_online()?;
        let session_id = Uuid::new_v4();
        self.lock()?.sessions.insert(
            session_id,
            SessionRecord {
                session_id,
                owner_id: owner_id.to_string(),
                metadata: metadata.clone(),
                started_at: Utc::now(),
                ended_at: None,
            },
        );
        Ok(session_id)
    }

    fn close_session(&self, session_id: Uuid) -> Result<(), CoachError> {
        self.check_online()?;
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session_id) {
            Some(record) if record.ended_at.is_none() => {
                record.ended_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(CoachError::NoActiveSession(session_id.to_string())),
        }
    }

    /// Upserts by `(table, record_id)`
    fn insert(&self, row: StoreRow) -> Result<(), CoachError> {
        self.check_online()?;
        let mut state = self.lock()?;
        let existing = state
            .rows
            .iter()
            .position(|r| r.table() == row.table() && r.record_id() == row.record_id());
        match existing {
            Some(index) => state.rows[index] = row,
            None => state.rows.push(row),
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "table", rename = "sessions")]
struct SessionLine<'a> {
    event: &'static str,
    session_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a SessionMetadata>,
    at: DateTime<Utc>,
}

/// Writes every session event and row as one JSON object per line
pub struct JsonLinesStore<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesStore<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, CoachError> {
        self.writer
            .into_inner()
            .map_err(|_| CoachError::StorageError("writer lock poisoned".to_string()))
    }

    fn write_line<T: Serialize>(&self, value: &T) -> Result<(), CoachError> {
        let line = serde_json::to_string(value)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| CoachError::StorageError("writer lock poisoned".to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| CoachError::StorageError(e.to_string()))
    }
}

impl<W: Write + Send> CoachStore for JsonLinesStore<W> {
    fn start_session(
        &self,
        owner_id: &str,
        metadata: &SessionMetadata,
    ) -> Result<Uuid, CoachError> {
        let session_id = Uuid::new_v4();
        self.write_line(&SessionLine {
            event: "start",
            session_id,
            owner_id: Some(owner_id),
            metadata: Some(metadata),
            at: Utc::now(),
        })?;
        Ok(session_id)
    }

    fn close_session(&self, session_id: Uuid) -> Result<(), CoachError> {
        self.write_line(&SessionLine {
            event: "close",
            session_id,
            owner_id: None,
            metadata: None,
            at: Utc::now(),
        })
    }

    fn insert(&self, row: StoreRow) -> Result<(), CoachError> {
        self.write_line(&row)
    }
}
