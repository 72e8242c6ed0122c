//! Core types for the RepSense frame pipeline
//!
//! This module defines the data structures that flow between stages:
//! joint angles, technique deviations, biomechanics and risk, depth,
//! kinematics and load, and the spoken cues produced at the end.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Three-tier technique quality signal.
///
/// Variants are declared in ascending order so `Ord` gives worst-wins
/// aggregation via `max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Green,
    Yellow,
    Red,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Green => "green",
            Severity::Yellow => "yellow",
            Severity::Red => "red",
        }
    }

    /// Numeric weight used by the smoothing windows
    pub fn score(&self) -> f64 {
        match self {
            Severity::Green => 0.0,
            Severity::Yellow => 0.5,
            Severity::Red => 1.0,
        }
    }

    /// Map an averaged score back to a tier
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            Severity::Red
        } else if score > 0.35 {
            Severity::Yellow
        } else {
            Severity::Green
        }
    }
}

/// Three-tier safety classification, independent of severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Caution,
    Danger,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Caution => "caution",
            RiskLevel::Danger => "danger",
        }
    }
}

/// Named conditions raised by the biomechanics scorer and the load estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    KneeValgusRisk,
    LumbarShearRisk,
    HipHingeDeviation,
    AsymmetryOverload,
    DepthInsufficient,
    VelocityDropRisk,
    AsymmetryFatigue,
    ShearUnderLoad,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::KneeValgusRisk => "knee_valgus_risk",
            RiskFlag::LumbarShearRisk => "lumbar_shear_risk",
            RiskFlag::HipHingeDeviation => "hip_hinge_deviation",
            RiskFlag::AsymmetryOverload => "asymmetry_overload",
            RiskFlag::DepthInsufficient => "depth_insufficient",
            RiskFlag::VelocityDropRisk => "velocity_drop_risk",
            RiskFlag::AsymmetryFatigue => "asymmetry_fatigue",
            RiskFlag::ShearUnderLoad => "shear_under_load",
        }
    }
}

/// Risk level plus the flags that produced it, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub guard_flags: Vec<RiskFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_reason: Option<String>,
}

impl RiskAssessment {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.guard_flags.contains(&flag)
    }

    /// True when the comma-joined reason mentions `flag`
    pub fn reason_contains(&self, flag: RiskFlag) -> bool {
        self.guard_reason
            .as_deref()
            .map(|reason| reason.split(',').any(|part| part == flag.as_str()))
            .unwrap_or(false)
    }

    /// Rebuild `guard_reason` from the current flag list
    pub fn refresh_reason(&mut self) {
        self.guard_reason = if self.guard_flags.is_empty() {
            None
        } else {
            Some(
                self.guard_flags
                    .iter()
                    .map(|flag| flag.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };
    }
}

/// The four joints an exercise template constrains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateJoint {
    Knee,
    Hip,
    Spine,
    Shoulder,
}

impl TemplateJoint {
    pub const ALL: [TemplateJoint; 4] = [
        TemplateJoint::Knee,
        TemplateJoint::Hip,
        TemplateJoint::Spine,
        TemplateJoint::Shoulder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateJoint::Knee => "knee",
            TemplateJoint::Hip => "hip",
            TemplateJoint::Spine => "spine",
            TemplateJoint::Shoulder => "shoulder",
        }
    }
}

/// Per-joint deviation from a template's expected range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueDeviation {
    pub joint: TemplateJoint,
    pub observed_angle: f64,
    pub expected_min: f64,
    pub expected_max: f64,
    pub severity: Severity,
}

/// Joint angles in degrees for one frame, per side where paired
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointAngles {
    pub left_knee: f64,
    pub right_knee: f64,
    pub left_hip: f64,
    pub right_hip: f64,
    pub left_shoulder: f64,
    pub right_shoulder: f64,
    pub left_elbow: f64,
    pub right_elbow: f64,
    pub spine: f64,
}

impl JointAngles {
    /// Left/right averaged view consumed by the technique evaluator
    pub fn averaged(&self) -> TemplateAngles {
        TemplateAngles {
            knee: (self.left_knee + self.right_knee) / 2.0,
            hip: (self.left_hip + self.right_hip) / 2.0,
            spine: self.spine,
            shoulder: (self.left_shoulder + self.right_shoulder) / 2.0,
        }
    }

    pub fn elbow(&self) -> f64 {
        (self.left_elbow + self.right_elbow) / 2.0
    }
}

/// Averaged angles keyed by template joint
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateAngles {
    pub knee: f64,
    pub hip: f64,
    pub spine: f64,
    pub shoulder: f64,
}

impl TemplateAngles {
    pub fn get(&self, joint: TemplateJoint) -> f64 {
        match joint {
            TemplateJoint::Knee => self.knee,
            TemplateJoint::Hip => self.hip,
            TemplateJoint::Spine => self.spine,
            TemplateJoint::Shoulder => self.shoulder,
        }
    }
}

/// Normalized biomechanics snapshot derived from 3D joints and angles
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BiomechanicsMetrics {
    /// Largest per-side knee/ankle lateral offset (not clamped)
    pub knee_valgus: f64,
    pub hip_hinge_deviation: f64,
    pub lumbar_shear_proxy: f64,
    pub trunk_forward_lean: f64,
    pub asymmetry_index: f64,
    /// None when the shoulders have no horizontal span
    pub bar_path_deviation: Option<f64>,
}

/// Depth and range-of-motion progress against the session baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthMetrics {
    pub hip_depth: f64,
    pub knee_depth: f64,
    pub shoulder_depth: f64,
    pub rom_percent: f64,
    pub bottom_detected: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicsMetrics {
    /// Smoothed hip depth the velocity was derived from
    pub smoothed_depth: f64,
    /// Depth units per second; positive while descending
    pub velocity: f64,
    pub acceleration: f64,
    pub tempo_ratio: f64,
    pub pause_detected: bool,
    pub rep_completed: bool,
    pub rep_count: u32,
}

/// Fatigue and load proxies with the load guard flags that fired
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadEstimate {
    pub relative_load_proxy: f64,
    pub fatigue_index: f64,
    pub rpe_proxy: f64,
    pub volume_stress_score: f64,
    pub velocity_loss: f64,
    pub guard_flags: Vec<RiskFlag>,
}

/// Kind of spoken cue; each kind has its own cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueType {
    SafetyAlert,
    FormCorrection,
    TempoCue,
    FatigueWarning,
    Motivation,
}

impl CueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CueType::SafetyAlert => "safety_alert",
            CueType::FormCorrection => "form_correction",
            CueType::TempoCue => "tempo_cue",
            CueType::FatigueWarning => "fatigue_warning",
            CueType::Motivation => "motivation",
        }
    }

    /// Minimum milliseconds between two cues of this type in one session
    pub fn cooldown_ms(&self) -> f64 {
        match self {
            CueType::SafetyAlert => 0.0,
            CueType::FormCorrection => 5_000.0,
            CueType::TempoCue => 10_000.0,
            CueType::FatigueWarning => 6_000.0,
            CueType::Motivation => 45_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CuePriority {
    Low,
    Medium,
    High,
}

impl CuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CuePriority::Low => "low",
            CuePriority::Medium => "medium",
            CuePriority::High => "high",
        }
    }

    /// Queue ordering weight
    pub fn value(&self) -> u8 {
        match self {
            CuePriority::Low => 1,
            CuePriority::Medium => 2,
            CuePriority::High => 3,
        }
    }
}

/// A coaching cue waiting to be spoken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub session_id: Uuid,
    pub cue_type: CueType,
    pub priority: CuePriority,
    pub message: String,
    /// Stereo balance hint in [-1, 1]; negative is left
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_pan: Option<f64>,
}

impl Cue {
    pub fn new(
        session_id: Uuid,
        cue_type: CueType,
        priority: CuePriority,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            cue_type,
            priority,
            message: message.into(),
            spatial_pan: None,
        }
    }

    pub fn with_pan(mut self, pan: f64) -> Self {
        self.spatial_pan = Some(pan.clamp(-1.0, 1.0));
        self
    }
}
