//! Edge buffer
//!
//! Computed frame records accumulate in memory and are flushed to the store
//! off the real-time path. A flush writes four rows per record and clears the
//! batch only once every write went through. Records that have not been
//! flushed are lost if the process dies, and during a long outage the oldest
//! records are dropped once the buffer is full.

use crate::error::CoachError;
use crate::landmarks::{Landmark, PoseFrame};
use crate::pipeline::PipelineOutput;
use crate::storage::{
    AnglesRow, BiomechanicsRow, CoachStore, JointsRow, KinematicsRow, RowKey, StoreRow,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

/// Records held while the store is unreachable; about ten minutes of
/// processed frames in balanced mode
pub const MAX_BUFFERED_RECORDS: usize = 3_000;

/// Everything persisted for one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub record_id: Uuid,
    pub session_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub landmarks: Vec<Landmark>,
    pub output: PipelineOutput,
}

impl FrameRecord {
    pub fn new(session_id: Uuid, frame: &PoseFrame, output: &PipelineOutput) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            session_id,
            recorded_at: Utc::now(),
            landmarks: frame.landmarks.clone(),
            output: output.clone(),
        }
    }

    fn key(&self) -> RowKey {
        RowKey {
            record_id: self.record_id,
            session_id: self.session_id,
            frame_index: self.output.frame_index,
            timestamp_ms: self.output.timestamp_ms,
            recorded_at: self.recorded_at,
        }
    }

    /// Joints, angles, biomechanics with risk, kinematics with load
    pub fn rows(&self) -> [StoreRow; 4] {
        let out = &self.output;
        [
            StoreRow::Joints(JointsRow {
                key: self.key(),
                landmarks: self.landmarks.clone(),
                confidence: out.confidence,
            }),
            StoreRow::Angles(AnglesRow {
                key: self.key(),
                angles_2d: out.angles_2d,
                angles_3d: out.angles_3d,
                deviations: out.deviations.clone(),
                raw_severity: out.raw_severity,
                stable_severity: out.stable_severity,
            }),
            StoreRow::Biomechanics(BiomechanicsRow {
                key: self.key(),
                metrics: out.biomechanics,
                risk: out.risk.clone(),
            }),
            StoreRow::Kinematics(KinematicsRow {
                key: self.key(),
                depth: out.depth,
                kinematics: out.kinematics,
                load: out.load.clone(),
            }),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct EdgeBuffer {
    records: VecDeque<FrameRecord>,
    capacity: usize,
    dropped: u64,
}

impl Default for EdgeBuffer {
    fn default() -> Self {
        Self::with_capacity(MAX_BUFFERED_RECORDS)
    }
}

impl EdgeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append a record, evicting the oldest when the buffer is full
    pub fn push(&mut self, record: FrameRecord) {
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                self.dropped += 1;
                warn!(
                    record_id = %evicted.record_id,
                    frame_index = evicted.output.frame_index,
                    dropped = self.dropped,
                    "Edge buffer full, dropping oldest record"
                );
            }
        }
        self.records.push_back(record);
    }

    /// Records evicted because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write every buffered record in order and return how many were flushed.
    ///
    /// On the first failed write the whole batch stays buffered; rows that
    /// already landed are rewritten on the next flush under the same ids.
    pub fn flush(&mut self, store: &dyn CoachStore) -> Result<usize, CoachError> {
        if self.records.is_empty() {
            return Ok(0);
        }

        for record in &self.records {
            for row in record.rows() {
                store.insert(row)?;
            }
        }

        let flushed = self.records.len();
        self.records.clear();
        debug!(flushed, "Edge buffer flushed");
        Ok(flushed)
    }
}
