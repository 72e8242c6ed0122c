//! Voice cue scheduling
//!
//! The scheduler is the only thing allowed to speak. It keeps a priority
//! queue of pending cues, enforces per-type cooldowns for each session and
//! plays one utterance at a time. Safety alerts preempt everything else.
//!
//! The speech engine itself sits behind [`SpeechCapability`]. `speak` starts
//! an utterance; the host reports completion through
//! [`VoiceCueScheduler::on_utterance_complete`], which plays the next cue.

use crate::error::CoachError;
use crate::storage::{CoachStore, StoreRow, VoiceCueRow};
use crate::types::{Cue, CueType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Loudness drop at full pan when the output cannot place sound
const PAN_VOLUME_DROP: f64 = 0.25;

/// Voice parameters passed to every utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// BCP 47 language hint
    pub language: String,
    pub rate: f64,
    pub pitch: f64,
    /// Output volume in [0, 1]
    pub volume: f64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl SpeechSettings {
    pub fn validate(&self) -> Result<(), CoachError> {
        if self.language.trim().is_empty() {
            return Err(CoachError::ConfigError(
                "speech.language must not be empty".to_string(),
            ));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(CoachError::ConfigError(format!(
                "speech.rate must be positive, got {}",
                self.rate
            )));
        }
        if !(self.pitch.is_finite() && self.pitch > 0.0) {
            return Err(CoachError::ConfigError(format!(
                "speech.pitch must be positive, got {}",
                self.pitch
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(CoachError::ConfigError(format!(
                "speech.volume must be within 0-1, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

/// One request to the speech engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub language: String,
    pub rate: f64,
    pub pitch: f64,
    pub volume: f64,
    /// Stereo placement, only set when the output supports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<f64>,
}

impl Utterance {
    /// Build an utterance for `cue`. Without spatial audio the pan is
    /// folded into a quieter volume instead.
    pub fn for_cue(cue: &Cue, settings: &SpeechSettings, spatial: bool) -> Self {
        let (volume, pan) = match (cue.spatial_pan, spatial) {
            (Some(pan), true) => (settings.volume, Some(pan)),
            (Some(pan), false) => (
                settings.volume * (1.0 - PAN_VOLUME_DROP * pan.abs().min(1.0)),
                None,
            ),
            (None, _) => (settings.volume, None),
        };

        Self {
            text: cue.message.clone(),
            language: settings.language.clone(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume,
            pan,
        }
    }
}

/// A speech engine the scheduler can drive
pub trait SpeechCapability: Send {
    /// Start speaking. Completion is reported back separately.
    fn speak(&mut self, utterance: &Utterance) -> Result<(), CoachError>;

    /// Stop the utterance in flight, if any
    fn cancel(&mut self);

    fn supports_spatial_audio(&self) -> bool {
        false
    }
}

/// Speech engine that says nothing; cues are still scheduled and logged
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSpeech;

impl SpeechCapability for SilentSpeech {
    fn speak(&mut self, _utterance: &Utterance) -> Result<(), CoachError> {
        Ok(())
    }

    fn cancel(&mut self) {}
}

#[derive(Debug, Clone)]
struct QueuedCue {
    cue: Cue,
    enqueued_ms: f64,
}

pub struct VoiceCueScheduler {
    settings: SpeechSettings,
    speech: Box<dyn SpeechCapability>,
    store: Option<Arc<dyn CoachStore>>,
    queue: VecDeque<QueuedCue>,
    last_issued_ms: HashMap<(Uuid, CueType), f64>,
    in_flight: Option<Cue>,
    last_spoken: Option<String>,
    spoken_count: u64,
}

impl VoiceCueScheduler {
    pub fn new(settings: SpeechSettings, speech: Box<dyn SpeechCapability>) -> Self {
        Self {
            settings,
            speech,
            store: None,
            queue: VecDeque::new(),
            last_issued_ms: HashMap::new(),
            in_flight: None,
            last_spoken: None,
            spoken_count: 0,
        }
    }

    /// Log every played cue to `store`
    pub fn with_store(mut self, store: Arc<dyn CoachStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&Cue> {
        self.in_flight.as_ref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Cue> {
        self.queue.iter().map(|q| &q.cue)
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Text of the most recently started utterance
    pub fn last_spoken(&self) -> Option<&str> {
        self.last_spoken.as_deref()
    }

    pub fn spoken_count(&self) -> u64 {
        self.spoken_count
    }

    /// Queue a cue unless its type is still cooling down for this session.
    ///
    /// A clock that jumps backwards counts as an expired cooldown, and types
    /// without a cooldown are never rejected. Returns whether the cue was
    /// accepted.
    pub fn enqueue(&mut self, cue: Cue, now_ms: f64) -> bool {
        let key = (cue.session_id, cue.cue_type);
        if self.cooling_down(&key, now_ms) {
            debug!(cue_type = cue.cue_type.as_str(), "Cue rejected by cooldown");
            return false;
        }
        self.last_issued_ms.insert(key, now_ms);

        // Stable: a cue goes behind every queued cue of equal or higher priority
        let position = self
            .queue
            .iter()
            .position(|q| q.cue.priority.value() < cue.priority.value())
            .unwrap_or(self.queue.len());
        self.queue.insert(
            position,
            QueuedCue {
                cue,
                enqueued_ms: now_ms,
            },
        );

        if self.in_flight.is_none() {
            self.play_next();
        }
        true
    }

    /// Drop every pending cue, cut off the current utterance and queue `cue`.
    ///
    /// Reserved for safety alerts.
    pub fn enqueue_preempt(&mut self, cue: Cue, now_ms: f64) -> bool {
        let dropped = self.queue.len();
        self.queue.clear();
        if self.in_flight.take().is_some() {
            self.speech.cancel();
        }
        debug!(dropped, cue_type = cue.cue_type.as_str(), "Preempting cue queue");
        self.enqueue(cue, now_ms)
    }

    /// The host finished the current utterance; start the next one
    pub fn on_utterance_complete(&mut self) {
        self.in_flight = None;
        self.play_next();
    }

    /// Forget pending cues without touching the utterance in flight
    pub fn clear_pending(&mut self) {
        self.queue.clear();
    }

    fn cooling_down(&self, key: &(Uuid, CueType), now_ms: f64) -> bool {
        let cooldown = key.1.cooldown_ms();
        if cooldown <= 0.0 {
            return false;
        }
        match self.last_issued_ms.get(key) {
            Some(last) => {
                let elapsed = now_ms - last;
                elapsed >= 0.0 && elapsed < cooldown
            }
            None => false,
        }
    }

    fn play_next(&mut self) {
        while let Some(QueuedCue { cue, enqueued_ms }) = self.queue.pop_front() {
            if let Some(store) = &self.store {
                let row = StoreRow::VoiceCue(VoiceCueRow::new(&cue, enqueued_ms));
                if let Err(e) = store.insert(row) {
                    warn!(error = %e, "Failed to log voice cue");
                }
            }

            let utterance =
                Utterance::for_cue(&cue, &self.settings, self.speech.supports_spatial_audio());
            match self.speech.speak(&utterance) {
                Ok(()) => {
                    debug!(cue_type = cue.cue_type.as_str(), text = %cue.message, "Speaking cue");
                    self.last_spoken = Some(cue.message.clone());
                    self.spoken_count += 1;
                    self.in_flight = Some(cue);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, cue_type = cue.cue_type.as_str(), "Speech failed, skipping cue");
                }
            }
        }
    }
}

/// Recording speech double shared with other modules' tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SpeechEvent {
        Spoke(Utterance),
        Cancelled,
    }

    /// Records every call; clones share one log
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSpeech {
        pub log: Arc<Mutex<Vec<SpeechEvent>>>,
        pub spatial: bool,
        pub fail: bool,
    }

    impl RecordingSpeech {
        pub fn events(&self) -> Vec<SpeechEvent> {
            self.log.lock().unwrap().clone()
        }

        pub fn spoken_texts(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SpeechEvent::Spoke(u) => Some(u.text),
                    SpeechEvent::Cancelled => None,
                })
                .collect()
        }
    }

    impl SpeechCapability for RecordingSpeech {
        fn speak(&mut self, utterance: &Utterance) -> Result<(), CoachError> {
            if self.fail {
                return Err(CoachError::SpeechError("engine unavailable".to_string()));
            }
            self.log
                .lock()
                .unwrap()
                .push(SpeechEvent::Spoke(utterance.clone()));
            Ok(())
        }

        fn cancel(&mut self) {
            self.log.lock().unwrap().push(SpeechEvent::Cancelled);
        }

        fn supports_spatial_audio(&self) -> bool {
            self.spatial
        }
    }
}
