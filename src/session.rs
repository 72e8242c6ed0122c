//! Coaching session runtime
//!
//! [`CoachSession`] ties one live exercise attempt together: the frame
//! pipeline and its rolling state, the cue stabilizer, the voice scheduler,
//! the edge buffer and the latency tracker. It honours pause and frame
//! decimation, turns guard and stabilizer output into cues, persists guard
//! flags and flushes buffered records on the frame clock.
//!
//! [`SharedCoachSession`] puts a session behind a mutex for hosts that feed
//! frames from a camera thread: a frame that arrives while the previous one
//! is still being handled is dropped, not queued. [`CoachEngine`] keeps the
//! live sessions of a process and checks ownership on every call.

use crate::buffer::{EdgeBuffer, FrameRecord};
use crate::config::{CoachConfig, PerformanceMode};
use crate::error::CoachError;
use crate::feedback::{cue_for_event, CoachingEvent, CoachingEventKind, FeedbackInput, FeedbackStabilizer};
use crate::guard::GuardCode;
use crate::landmarks::PoseFrame;
use crate::pipeline::{EdgePipeline, PipelineOutput, SessionState};
use crate::storage::{CoachStore, GuardFlagsRow, RowKey, SessionMetadata, StoreRow};
use crate::telemetry::{LatencyStats, LatencyTracker};
use crate::template::ExerciseTemplate;
use crate::types::{Cue, CuePriority, CueType, RiskLevel, Severity};
use crate::voice::{SpeechCapability, VoiceCueScheduler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Descent speed, in depth units per second, that earns a tempo cue
pub const FAST_ECCENTRIC_VELOCITY: f64 = 0.5;

/// What happened to an offered frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Processed(Box<FrameReport>),
    /// Session is paused
    Paused,
    /// Skipped by performance-mode decimation
    Decimated,
    /// Previous frame still in flight
    Busy,
}

impl FrameOutcome {
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            FrameOutcome::Processed(report) => Some(&**report),
            _ => None,
        }
    }
}

/// Result of one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub output: PipelineOutput,
    pub event: CoachingEvent,
    /// Cues the scheduler accepted for this frame
    pub cues: Vec<Cue>,
}

/// Read-only view for the host UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub template: String,
    pub performance_mode: PerformanceMode,
    pub paused: bool,
    pub stable_severity: Severity,
    pub risk_level: RiskLevel,
    pub fatigue_index: f64,
    pub rep_count: u32,
    pub latency: LatencyStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cue_text: Option<String>,
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub buffered_records: usize,
}

/// Returned when a session ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub owner_id: String,
    pub template: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub rep_count: u32,
    pub cues_spoken: u64,
    /// Buffered records the final flush could not deliver
    pub unflushed_records: usize,
    pub latency: LatencyStats,
}

pub struct CoachSession {
    id: Uuid,
    owner_id: String,
    config: CoachConfig,
    pipeline: EdgePipeline,
    state: SessionState,
    feedback: FeedbackStabilizer,
    scheduler: VoiceCueScheduler,
    buffer: EdgeBuffer,
    latency: LatencyTracker,
    store: Arc<dyn CoachStore>,
    started_at: DateTime<Utc>,
    paused: bool,
    ended: bool,
    frames_seen: u64,
    frames_processed: u64,
    last_flush_ms: Option<f64>,
    last_output: Option<PipelineOutput>,
}

impl CoachSession {
    /// Open a session record in `store` and build the runtime around it.
    ///
    /// A store that cannot open the session fails the call.
    pub fn start(
        owner_id: &str,
        template_key: &str,
        config: CoachConfig,
        store: Arc<dyn CoachStore>,
        speech: Box<dyn SpeechCapability>,
    ) -> Result<Self, CoachError> {
        config.validate()?;
        let template = ExerciseTemplate::select(template_key)?;

        let metadata = SessionMetadata::new(template_key, config.performance_mode);
        let id = store.start_session(owner_id, &metadata)?;
        info!(session_id = %id, owner_id, template = template_key, "Coaching session started");

        let scheduler =
            VoiceCueScheduler::new(config.speech.clone(), speech).with_store(store.clone());

        Ok(Self {
            id,
            owner_id: owner_id.to_string(),
            pipeline: EdgePipeline::new(template, config.guard_limits),
            state: SessionState::new(config.display_smoothing),
            feedback: FeedbackStabilizer::new(config.cue_smoothing),
            scheduler,
            buffer: EdgeBuffer::new(),
            latency: LatencyTracker::new(config.latency_window),
            store,
            started_at: Utc::now(),
            paused: false,
            ended: false,
            frames_seen: 0,
            frames_processed: 0,
            last_flush_ms: None,
            last_output: None,
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn last_output(&self) -> Option<&PipelineOutput> {
        self.last_output.as_ref()
    }

    pub fn scheduler(&self) -> &VoiceCueScheduler {
        &self.scheduler
    }

    pub fn select_template(&mut self, key: &str) -> Result<(), CoachError> {
        self.ensure_active()?;
        let template = ExerciseTemplate::select(key)?;
        info!(session_id = %self.id, template = key, "Exercise template changed");
        self.pipeline.set_template(template);
        Ok(())
    }

    pub fn set_performance_mode(&mut self, mode: PerformanceMode) {
        debug!(session_id = %self.id, mode = mode.as_str(), "Performance mode changed");
        self.config.performance_mode = mode;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// The speech engine finished the current utterance
    pub fn on_utterance_complete(&mut self) {
        self.scheduler.on_utterance_complete();
    }

    /// Handle one detector frame.
    ///
    /// Only malformed frames and calls on an ended session are errors.
    /// Storage failures along the way are logged and swallowed.
    pub fn on_frame(&mut self, frame: &PoseFrame) -> Result<FrameOutcome, CoachError> {
        self.ensure_active()?;
        frame.validate()?;

        if self.paused {
            return Ok(FrameOutcome::Paused);
        }

        let seen = self.frames_seen;
        self.frames_seen += 1;
        if seen % self.config.performance_mode.decimation() != 0 {
            return Ok(FrameOutcome::Decimated);
        }

        let started = Instant::now();
        let timestamp_ms = frame.timestamp_ms;
        let output = self.pipeline.process(&mut self.state, frame);
        self.frames_processed += 1;

        if !output.guard.flags.is_empty() {
            self.persist_guard_flags(&output);
        }

        let trust_score = if output.guard.has(GuardCode::LowConfidence) {
            self.config.trust_score.min(output.confidence * 100.0)
        } else {
            self.config.trust_score
        };

        let event = self.feedback.evaluate(FeedbackInput {
            raw_severity: output.raw_severity,
            timestamp_ms,
            risk: &output.risk,
            fatigue_index: output.load.fatigue_index,
            trust_score,
            allow_realtime: self.config.allow_realtime,
        });

        let cues = self.dispatch_cues(&output, &event, timestamp_ms);

        self.buffer.push(FrameRecord::new(self.id, frame, &output));
        self.maybe_flush(timestamp_ms);

        self.latency
            .record(started.elapsed().as_secs_f64() * 1000.0);
        self.last_output = Some(output.clone());

        Ok(FrameOutcome::Processed(Box::new(FrameReport {
            output,
            event,
            cues,
        })))
    }

    /// Flush buffered records now, surfacing any storage error
    pub fn flush(&mut self) -> Result<usize, CoachError> {
        self.buffer.flush(self.store.as_ref())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let output = self.last_output.as_ref();
        SessionSnapshot {
            session_id: self.id,
            template: self.pipeline.template().key.clone(),
            performance_mode: self.config.performance_mode,
            paused: self.paused,
            stable_severity: output.map(|o| o.stable_severity).unwrap_or_default(),
            risk_level: output.map(|o| o.risk.risk_level).unwrap_or_default(),
            fatigue_index: output.map(|o| o.load.fatigue_index).unwrap_or(0.0),
            rep_count: self.state.kinematics.rep_count(),
            latency: self.latency.stats(),
            last_cue_text: self.scheduler.last_spoken().map(str::to_string),
            frames_seen: self.frames_seen,
            frames_processed: self.frames_processed,
            buffered_records: self.buffer.len(),
        }
    }

    /// Flush what is buffered, close the session record and stop accepting
    /// frames. Pending cues are dropped; the utterance in flight finishes.
    pub fn end(&mut self) -> Result<SessionSummary, CoachError> {
        self.ensure_active()?;
        self.ended = true;
        self.scheduler.clear_pending();

        if let Err(e) = self.flush() {
            warn!(session_id = %self.id, error = %e, lost = self.buffer.len(), "Final flush failed");
        }

        match self.store.close_session(self.id) {
            Ok(()) => {}
            Err(CoachError::StorageError(e)) => {
                warn!(session_id = %self.id, error = %e, "Failed to close session record");
            }
            Err(e) => return Err(e),
        }

        let summary = SessionSummary {
            session_id: self.id,
            owner_id: self.owner_id.clone(),
            template: self.pipeline.template().key.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            frames_seen: self.frames_seen,
            frames_processed: self.frames_processed,
            rep_count: self.state.kinematics.rep_count(),
            cues_spoken: self.scheduler.spoken_count(),
            unflushed_records: self.buffer.len(),
            latency: self.latency.stats(),
        };
        info!(
            session_id = %self.id,
            frames = summary.frames_processed,
            reps = summary.rep_count,
            "Coaching session ended"
        );
        Ok(summary)
    }

    fn ensure_active(&self) -> Result<(), CoachError> {
        if self.ended {
            Err(CoachError::NoActiveSession(self.id.to_string()))
        } else {
            Ok(())
        }
    }

    fn persist_guard_flags(&self, output: &PipelineOutput) {
        let row = StoreRow::GuardFlags(GuardFlagsRow {
            key: RowKey {
                record_id: Uuid::new_v4(),
                session_id: self.id,
                frame_index: output.frame_index,
                timestamp_ms: output.timestamp_ms,
                recorded_at: Utc::now(),
            },
            safe: output.guard.safe,
            flags: output.guard.flags.clone(),
        });
        if let Err(e) = self.store.insert(row) {
            warn!(session_id = %self.id, error = %e, "Failed to persist guard flags");
        }
    }

    /// Build this frame's cues and hand them to the scheduler. Safety alerts
    /// preempt; everything else waits its turn and its cooldown.
    fn dispatch_cues(
        &mut self,
        output: &PipelineOutput,
        event: &CoachingEvent,
        timestamp_ms: f64,
    ) -> Vec<Cue> {
        let mut candidates = Vec::new();

        if let Some(flag) = output.guard.physical_danger() {
            candidates.push(Cue::new(
                self.id,
                CueType::SafetyAlert,
                CuePriority::High,
                flag.message.clone(),
            ));
        } else if let Some(cue) = cue_for_event(self.id, event, output) {
            candidates.push(cue);
        }

        if self.config.allow_realtime && event.event != CoachingEventKind::OverloadStop {
            if output.kinematics.velocity > FAST_ECCENTRIC_VELOCITY {
                candidates.push(Cue::new(
                    self.id,
                    CueType::TempoCue,
                    CuePriority::Low,
                    "Control the descent",
                ));
            }
            if output.kinematics.rep_completed && event.is_none() {
                candidates.push(Cue::new(
                    self.id,
                    CueType::Motivation,
                    CuePriority::Low,
                    format!("Good rep. That's {}.", output.kinematics.rep_count),
                ));
            }
        }

        candidates
            .into_iter()
            .filter(|cue| {
                if cue.cue_type == CueType::SafetyAlert {
                    self.scheduler.enqueue_preempt(cue.clone(), timestamp_ms)
                } else {
                    self.scheduler.enqueue(cue.clone(), timestamp_ms)
                }
            })
            .collect()
    }

    /// Flush on the frame clock every `flush_interval_ms`
    fn maybe_flush(&mut self, timestamp_ms: f64) {
        let last = *self.last_flush_ms.get_or_insert(timestamp_ms);
        if timestamp_ms - last < self.config.flush_interval_ms {
            return;
        }
        self.last_flush_ms = Some(timestamp_ms);
        if let Err(e) = self.flush() {
            warn!(
                session_id = %self.id,
                error = %e,
                buffered = self.buffer.len(),
                "Opportunistic flush failed"
            );
        }
    }
}

/// A session that can be fed from several threads
#[derive(Clone)]
pub struct SharedCoachSession {
    owner_id: Arc<str>,
    inner: Arc<Mutex<CoachSession>>,
}

impl SharedCoachSession {
    pub fn new(session: CoachSession) -> Self {
        Self {
            owner_id: Arc::from(session.owner_id()),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Owner of the session, readable without taking the lock
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Process `frame` unless another frame holds the session
    pub fn offer_frame(&self, frame: &PoseFrame) -> Result<FrameOutcome, CoachError> {
        let mut session = match self.inner.try_lock() {
            Ok(session) => session,
            Err(TryLockError::WouldBlock) => {
                debug!(timestamp_ms = frame.timestamp_ms, "Frame dropped, session busy");
                return Ok(FrameOutcome::Busy);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        session.on_frame(frame)
    }

    /// Wait for the session and borrow it
    pub fn lock(&self) -> MutexGuard<'_, CoachSession> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds a speech engine for each new session
pub type SpeechFactory = Box<dyn Fn() -> Box<dyn SpeechCapability> + Send + Sync>;

/// Registry of live sessions in one process
pub struct CoachEngine {
    config: CoachConfig,
    store: Arc<dyn CoachStore>,
    speech_factory: SpeechFactory,
    sessions: HashMap<Uuid, SharedCoachSession>,
}

impl CoachEngine {
    pub fn new(
        config: CoachConfig,
        store: Arc<dyn CoachStore>,
        speech_factory: SpeechFactory,
    ) -> Result<Self, CoachError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            speech_factory,
            sessions: HashMap::new(),
        })
    }

    pub fn start_session(&mut self, owner_id: &str, template_key: &str) -> Result<Uuid, CoachError> {
        let session = CoachSession::start(
            owner_id,
            template_key,
            self.config.clone(),
            self.store.clone(),
            (self.speech_factory)(),
        )?;
        let id = session.id();
        self.sessions.insert(id, SharedCoachSession::new(session));
        Ok(id)
    }

    /// Live session `session_id`, if `owner_id` owns it
    pub fn session(&self, session_id: Uuid, owner_id: &str) -> Result<SharedCoachSession, CoachError> {
        let shared = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| CoachError::NoActiveSession(session_id.to_string()))?;
        if shared.owner_id() != owner_id {
            return Err(CoachError::OwnerMismatch {
                session_id: session_id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        Ok(shared.clone())
    }

    pub fn offer_frame(
        &self,
        session_id: Uuid,
        owner_id: &str,
        frame: &PoseFrame,
    ) -> Result<FrameOutcome, CoachError> {
        self.session(session_id, owner_id)?.offer_frame(frame)
    }

    pub fn end_session(&mut self, session_id: Uuid, owner_id: &str) -> Result<SessionSummary, CoachError> {
        let shared = self.session(session_id, owner_id)?;
        self.sessions.remove(&session_id);
        let summary = shared.lock().end()?;
        Ok(summary)
    }

    pub fn active_sessions(&self) -> Vec<Uuid> {
        self.sessions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::standing_frame;
    use crate::landmarks::PoseLandmark;
    use crate::storage::InMemoryStore;
    use crate::voice::testing::RecordingSpeech;
    use crate::voice::SilentSpeech;
    use pretty_assertions::assert_eq;

    /// Offer `frame` until decimation lets it through
    fn process(session: &mut CoachSession, frame: &PoseFrame) -> FrameReport {
        loop {
            if let FrameOutcome::Processed(report) = session.on_frame(frame).unwrap() {
                return *report;
            }
        }
    }

    fn start(config: CoachConfig) -> (CoachSession, Arc<InMemoryStore>, RecordingSpeech) {
        let store = Arc::new(InMemoryStore::new());
        let speech = RecordingSpeech::default();
        let session = CoachSession::start(
            "athlete-1",
            "squat",
            config,
            store.clone(),
            Box::new(speech.clone()),
        )
        .unwrap();
        (session, store, speech)
    }

    /// Both knees caving in by 0.1
    fn valgus_frame(timestamp_ms: f64) -> PoseFrame {
        let mut frame = standing_frame(timestamp_ms);
        frame.landmarks[PoseLandmark::LeftKnee.index()].x = 0.3;
        frame.landmarks[PoseLandmark::LeftAnkle.index()].x = 0.4;
        frame.landmarks[PoseLandmark::RightKnee.index()].x = 0.7;
        frame.landmarks[PoseLandmark::RightAnkle.index()].x = 0.6;
        frame
    }

    #[test]
    fn test_start_fails_when_store_is_offline() {
        let store = Arc::new(InMemoryStore::new());
        store.set_offline(true);
        let result = CoachSession::start(
            "athlete-1",
            "squat",
            CoachConfig::default(),
            store,
            Box::new(SilentSpeech),
        );
        assert!(matches!(result, Err(CoachError::StorageError(_))));
    }

    #[test]
    fn test_decimation_processes_every_nth_frame() {
        let (mut session, _, _) = start(CoachConfig::default());
        let mut processed = 0;
        for i in 0..12 {
            let outcome = session.on_frame(&standing_frame(i as f64 * 33.0)).unwrap();
            if outcome.report().is_some() {
                processed += 1;
            } else {
                assert_eq!(outcome, FrameOutcome::Decimated);
            }
        }

        // Balanced mode keeps frames 0 and 6
        assert_eq!(processed, 2);
        assert_eq!(session.snapshot().frames_seen, 12);

        session.set_performance_mode(PerformanceMode::PowerSaver);
        assert_eq!(session.snapshot().performance_mode, PerformanceMode::PowerSaver);
    }

    #[test]
    fn test_pause_skips_frames() {
        let (mut session, _, _) = start(CoachConfig::default());
        session.pause();
        assert_eq!(
            session.on_frame(&standing_frame(0.0)).unwrap(),
            FrameOutcome::Paused
        );
        session.resume();
        assert!(session.on_frame(&standing_frame(33.0)).unwrap().report().is_some());
        assert_eq!(session.snapshot().frames_seen, 1);
    }

    #[test]
    fn test_guard_danger_preempts_with_safety_alert() {
        let (mut session, store, speech) = start(CoachConfig::default());
        let report = process(&mut session, &valgus_frame(0.0));

        assert_eq!(report.event.event, CoachingEventKind::OverloadStop);
        assert_eq!(report.cues.len(), 1);
        assert_eq!(report.cues[0].cue_type, CueType::SafetyAlert);
        assert_eq!(report.cues[0].priority, CuePriority::High);
        assert_eq!(speech.spoken_texts(), vec!["Knees caving inward"]);
        assert_eq!(store.rows_in("guard_flags"), 1);
        assert_eq!(store.rows_in("voice_cues"), 1);

        // Alerts are not rate limited
        process(&mut session, &valgus_frame(4.0));
        assert_eq!(speech.spoken_texts().len(), 2);
    }

    #[test]
    fn test_low_confidence_degrades_trust() {
        let (mut session, _, speech) = start(CoachConfig::default());
        let mut frame = standing_frame(0.0);
        frame.landmarks[PoseLandmark::Nose.index()].x = 0.75;
        frame.landmarks[PoseLandmark::Nose.index()].y = 0.20;
        frame.confidence = Some(0.3);

        let report = process(&mut session, &frame);

        // Red technique, but trust drops to 30 so no form cue is spoken
        assert_eq!(report.output.raw_severity, Severity::Red);
        assert_eq!(report.event.event, CoachingEventKind::None);
        // The hyperextension itself is still a safety alert
        assert_eq!(speech.spoken_texts(), vec!["Lower back is overextended"]);
    }

    #[test]
    fn test_storage_outage_does_not_interrupt_frames() {
        let (mut session, store, _) = start(CoachConfig {
            flush_interval_ms: 100.0,
            ..CoachConfig::default()
        });
        store.set_offline(true);

        for i in 0..10 {
            process(&mut session, &valgus_frame(i as f64 * 50.0));
        }
        assert_eq!(session.snapshot().buffered_records, 10);

        store.set_offline(false);
        process(&mut session, &standing_frame(600.0));
        assert_eq!(session.snapshot().buffered_records, 0);
        assert_eq!(store.rows_in("joints"), 11);
    }

    #[test]
    fn test_end_flushes_and_closes() {
        let (mut session, store, _) = start(CoachConfig::default());
        for i in 0..3 {
            process(&mut session, &standing_frame(i as f64 * 33.0));
        }
        let id = session.id();
        let summary = session.end().unwrap();

        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.unflushed_records, 0);
        assert_eq!(store.rows_in("kinematics"), 3);
        assert!(store.session(id).unwrap().ended_at.is_some());

        assert!(matches!(
            session.on_frame(&standing_frame(200.0)),
            Err(CoachError::NoActiveSession(_))
        ));
    }

    #[test]
    fn test_rep_completion_earns_motivation_cue() {
        let (mut session, _, speech) = start(CoachConfig::default());
        let depths = [0.0, 0.1, 0.2, 0.2, 0.1, 0.0];
        let mut frame_time = 0.0;
        for depth in depths {
            let mut frame = standing_frame(frame_time);
            frame.landmarks[PoseLandmark::LeftHip.index()].z = depth;
            frame.landmarks[PoseLandmark::RightHip.index()].z = depth;
            process(&mut session, &frame);
            // Slow enough that the tempo cue never fires
            frame_time += 1_000.0;
        }

        assert_eq!(session.snapshot().rep_count, 1);
        assert!(speech
            .spoken_texts()
            .iter()
            .any(|text| text.starts_with("Good rep")));
    }

    #[test]
    fn test_snapshot_reports_last_cue_and_latency() {
        let (mut session, _, _) = start(CoachConfig::default());
        process(&mut session, &valgus_frame(0.0));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.last_cue_text.as_deref(), Some("Knees caving inward"));
        assert_eq!(snapshot.latency.samples, 1);
        assert_eq!(snapshot.template, "squat");
    }

    #[test]
    fn test_select_template() {
        let (mut session, _, _) = start(CoachConfig::default());
        session.select_template("deadlift").unwrap();
        assert_eq!(session.snapshot().template, "deadlift");
        assert!(matches!(
            session.select_template("curl"),
            Err(CoachError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_shared_session_drops_frames_while_busy() {
        let (session, _, _) = start(CoachConfig::default());
        let shared = SharedCoachSession::new(session);

        let guard = shared.lock();
        assert_eq!(
            shared.offer_frame(&standing_frame(0.0)).unwrap(),
            FrameOutcome::Busy
        );
        drop(guard);

        assert!(shared
            .offer_frame(&standing_frame(33.0))
            .unwrap()
            .report()
            .is_some());
    }

    #[test]
    fn test_engine_drops_frames_while_session_is_busy() {
        let store = Arc::new(InMemoryStore::new());
        let mut engine = CoachEngine::new(
            CoachConfig::default(),
            store,
            Box::new(|| Box::new(SilentSpeech) as Box<dyn SpeechCapability>),
        )
        .unwrap();
        let id = engine.start_session("athlete-1", "squat").unwrap();

        let shared = engine.session(id, "athlete-1").unwrap();
        let guard = shared.lock();
        assert_eq!(
            engine.offer_frame(id, "athlete-1", &standing_frame(0.0)).unwrap(),
            FrameOutcome::Busy
        );
        assert!(matches!(
            engine.offer_frame(id, "athlete-2", &standing_frame(0.0)),
            Err(CoachError::OwnerMismatch { .. })
        ));
        drop(guard);

        assert!(engine
            .offer_frame(id, "athlete-1", &standing_frame(33.0))
            .unwrap()
            .report()
            .is_some());
    }

    #[test]
    fn test_engine_checks_owner() {
        let store = Arc::new(InMemoryStore::new());
        let mut engine = CoachEngine::new(
            CoachConfig::default(),
            store,
            Box::new(|| Box::new(SilentSpeech) as Box<dyn SpeechCapability>),
        )
        .unwrap();

        let id = engine.start_session("athlete-1", "squat").unwrap();
        assert!(engine.offer_frame(id, "athlete-1", &standing_frame(0.0)).is_ok());
        assert!(matches!(
            engine.offer_frame(id, "athlete-2", &standing_frame(33.0)),
            Err(CoachError::OwnerMismatch { .. })
        ));

        let summary = engine.end_session(id, "athlete-1").unwrap();
        assert_eq!(summary.frames_processed, 1);
        assert!(engine.active_sessions().is_empty());
        assert!(matches!(
            engine.end_session(id, "athlete-1"),
            Err(CoachError::NoActiveSession(_))
        ));
    }
}
