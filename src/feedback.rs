//! Realtime feedback stabilizer
//!
//! Decides whether anything should be said for a frame. It owns its own
//! severity window, separate from the display smoothing in the pipeline, and
//! combines the smoothed severity with risk, fatigue and trust.

use crate::pipeline::PipelineOutput;
use crate::smoothing::{SeverityWindow, SmoothingConfig};
use crate::types::{Cue, CuePriority, CueType, RiskAssessment, RiskFlag, RiskLevel, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fatigue index above which a fatigue warning is raised
pub const FATIGUE_WARNING_THRESHOLD: f64 = 0.35;
/// Trust score below which non-critical feedback is suppressed
pub const MIN_TRUST_SCORE: f64 = 40.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingEventKind {
    #[default]
    None,
    OverloadStop,
    FatigueWarning,
    TechniqueError,
}

impl CoachingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachingEventKind::None => "none",
            CoachingEventKind::OverloadStop => "overload_stop",
            CoachingEventKind::FatigueWarning => "fatigue_warning",
            CoachingEventKind::TechniqueError => "technique_error",
        }
    }
}

/// Stabilized severity plus the classified event for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingEvent {
    pub severity: Severity,
    pub event: CoachingEventKind,
    pub priority: Option<CuePriority>,
}

impl CoachingEvent {
    fn none(severity: Severity) -> Self {
        Self {
            severity,
            event: CoachingEventKind::None,
            priority: None,
        }
    }

    fn new(severity: Severity, event: CoachingEventKind, priority: CuePriority) -> Self {
        Self {
            severity,
            event,
            priority: Some(priority),
        }
    }

    pub fn is_none(&self) -> bool {
        self.event == CoachingEventKind::None
    }
}

/// Per-frame inputs to the stabilizer
#[derive(Debug, Clone, Copy)]
pub struct FeedbackInput<'a> {
    pub raw_severity: Severity,
    pub timestamp_ms: f64,
    pub risk: &'a RiskAssessment,
    pub fatigue_index: f64,
    pub trust_score: f64,
    pub allow_realtime: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackStabilizer {
    window: SeverityWindow,
}

impl FeedbackStabilizer {
    pub fn new(cue_smoothing: SmoothingConfig) -> Self {
        Self {
            window: SeverityWindow::new(cue_smoothing),
        }
    }

    pub fn stable(&self) -> Severity {
        self.window.stable()
    }

    pub fn reset(&mut self) {
        self.window.reset();
    }

    /// Classify one frame. The first matching rule wins:
    /// realtime disabled, danger, fatigue, low trust, technique, nothing.
    pub fn evaluate(&mut self, input: FeedbackInput<'_>) -> CoachingEvent {
        if !input.allow_realtime {
            return CoachingEvent::none(Severity::Green);
        }

        let stable = self.window.push(input.raw_severity, input.timestamp_ms).stable;

        if input.risk.risk_level == RiskLevel::Danger {
            return CoachingEvent::new(stable, CoachingEventKind::OverloadStop, CuePriority::High);
        }

        if input.risk.reason_contains(RiskFlag::VelocityDropRisk)
            || input.fatigue_index > FATIGUE_WARNING_THRESHOLD
        {
            return CoachingEvent::new(
                stable,
                CoachingEventKind::FatigueWarning,
                CuePriority::Medium,
            );
        }

        if input.trust_score < MIN_TRUST_SCORE {
            return CoachingEvent::none(stable);
        }

        match stable {
            Severity::Red => {
                CoachingEvent::new(stable, CoachingEventKind::TechniqueError, CuePriority::High)
            }
            Severity::Yellow => {
                CoachingEvent::new(stable, CoachingEventKind::TechniqueError, CuePriority::Medium)
            }
            Severity::Green => CoachingEvent::none(stable),
        }
    }
}

/// Turn a coaching event into a spoken cue, if it calls for one.
///
/// Technique errors name the worst joint and pan toward the side that
/// deviates more.
pub fn cue_for_event(
    session_id: Uuid,
    event: &CoachingEvent,
    output: &PipelineOutput,
) -> Option<Cue> {
    let priority = event.priority?;
    let cue = match event.event {
        CoachingEventKind::None => return None,
        CoachingEventKind::OverloadStop => Cue::new(
            session_id,
            CueType::SafetyAlert,
            priority,
            overload_message(&output.risk),
        ),
        CoachingEventKind::FatigueWarning => Cue::new(
            session_id,
            CueType::FatigueWarning,
            priority,
            "Bar speed is dropping. Consider racking after this rep.",
        ),
        CoachingEventKind::TechniqueError => {
            let message = match output.technique().worst() {
                Some(worst) if worst.observed_angle < worst.expected_min => {
                    format!("Open up your {} angle", worst.joint.as_str())
                }
                Some(worst) => format!("Bring your {} angle in", worst.joint.as_str()),
                None => "Check your form".to_string(),
            };
            Cue::new(session_id, CueType::FormCorrection, priority, message)
                .with_pan(side_pan(output))
        }
    };
    Some(cue)
}

fn overload_message(risk: &RiskAssessment) -> &'static str {
    if risk.has_flag(RiskFlag::KneeValgusRisk) {
        "Stop. Knees are caving in."
    } else if risk.has_flag(RiskFlag::LumbarShearRisk) {
        "Stop. Protect your lower back."
    } else {
        "Stop the set."
    }
}

/// Negative pans left, positive right, scaled by the knee and hip difference
fn side_pan(output: &PipelineOutput) -> f64 {
    let angles = &output.angles_2d;
    let diff = (angles.left_knee - angles.right_knee) + (angles.left_hip - angles.right_hip);
    (diff / 90.0).clamp(-1.0, 1.0)
}
