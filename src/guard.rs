//! Safety guard
//!
//! A stateless rule evaluator that gives a second opinion next to the
//! biomechanics scorer. It works from averaged angles, asymmetry, detector
//! confidence and raw landmark geometry, with its own limits and thresholds.
//! A frame is safe when no high-severity flag fired.

use crate::error::CoachError;
use crate::landmarks::{Landmark, PoseLandmark};
use crate::template::AngleRange;
use serde::{Deserialize, Serialize};

const MIN_CONFIDENCE: f64 = 0.6;
/// Degrees beyond a limit after which a violation is high severity
const JOINT_LIMIT_HIGH_MARGIN_DEG: f64 = 10.0;
const ASYMMETRY_MEDIUM: f64 = 0.25;
const ASYMMETRY_HIGH: f64 = 0.4;
/// Medial knee drift relative to the ankle, in normalized image x
const KNEE_VALGUS_MARGIN: f64 = 0.04;
const MIN_SPINE_DEG: f64 = 140.0;

/// Per-joint angle limits, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardLimits {
    pub knee: AngleRange,
    pub hip: AngleRange,
    pub shoulder: AngleRange,
    pub elbow: AngleRange,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            knee: AngleRange::new(30.0, 170.0),
            hip: AngleRange::new(30.0, 170.0),
            shoulder: AngleRange::new(10.0, 170.0),
            elbow: AngleRange::new(20.0, 170.0),
        }
    }
}

impl GuardLimits {
    pub fn validate(&self) -> Result<(), CoachError> {
        for (joint, range) in self.entries() {
            if !(range.min.is_finite() && range.max.is_finite()) || range.min >= range.max {
                return Err(CoachError::ConfigError(format!(
                    "guard limit for {} must have min < max, got [{}, {}]",
                    joint.as_str(),
                    range.min,
                    range.max
                )));
            }
        }
        Ok(())
    }

    fn entries(&self) -> [(LimitJoint, AngleRange); 4] {
        [
            (LimitJoint::Knee, self.knee),
            (LimitJoint::Hip, self.hip),
            (LimitJoint::Shoulder, self.shoulder),
            (LimitJoint::Elbow, self.elbow),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitJoint {
    Knee,
    Hip,
    Shoulder,
    Elbow,
}

impl LimitJoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitJoint::Knee => "knee",
            LimitJoint::Hip => "hip",
            LimitJoint::Shoulder => "shoulder",
            LimitJoint::Elbow => "elbow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardCode {
    LowConfidence,
    JointLimit,
    Asymmetry,
    KneeValgus,
    LowerBackHyperextension,
}

impl GuardCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardCode::LowConfidence => "low_confidence",
            GuardCode::JointLimit => "joint_limit",
            GuardCode::Asymmetry => "asymmetry",
            GuardCode::KneeValgus => "knee_valgus",
            GuardCode::LowerBackHyperextension => "lower_back_hyperextension",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardFlag {
    pub code: GuardCode,
    pub severity: FlagSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joint: Option<LimitJoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl GuardFlag {
    fn new(code: GuardCode, severity: FlagSeverity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            joint: None,
            value: None,
        }
    }

    fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardVerdict {
    pub safe: bool,
    pub flags: Vec<GuardFlag>,
}

impl GuardVerdict {
    pub fn has(&self, code: GuardCode) -> bool {
        self.flags.iter().any(|f| f.code == code)
    }

    /// First high-severity flag describing the body rather than the detector
    pub fn physical_danger(&self) -> Option<&GuardFlag> {
        self.flags
            .iter()
            .find(|f| f.severity == FlagSeverity::High && f.code != GuardCode::LowConfidence)
    }
}

/// Averaged angles the guard checks; absent angles are skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardAngles {
    pub knee: Option<f64>,
    pub hip: Option<f64>,
    pub shoulder: Option<f64>,
    pub elbow: Option<f64>,
    pub spine: Option<f64>,
}

impl GuardAngles {
    fn get(&self, joint: LimitJoint) -> Option<f64> {
        match joint {
            LimitJoint::Knee => self.knee,
            LimitJoint::Hip => self.hip,
            LimitJoint::Shoulder => self.shoulder,
            LimitJoint::Elbow => self.elbow,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GuardInput<'a> {
    pub angles: GuardAngles,
    pub asymmetry: Option<f64>,
    pub confidence: Option<f64>,
    pub landmarks: Option<&'a [Landmark]>,
}

#[derive(Debug, Clone, Default)]
pub struct SafetyGuard {
    limits: GuardLimits,
}

impl SafetyGuard {
    pub fn new(limits: GuardLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &GuardLimits {
        &self.limits
    }

    pub fn evaluate(&self, input: &GuardInput<'_>) -> GuardVerdict {
        let mut flags = Vec::new();

        if let Some(confidence) = input.confidence {
            if confidence < MIN_CONFIDENCE {
                flags.push(
                    GuardFlag::new(
                        GuardCode::LowConfidence,
                        FlagSeverity::High,
                        "Pose confidence too low to judge form",
                    )
                    .with_value(confidence),
                );
            }
        }

        for (joint, range) in self.limits.entries() {
            let Some(angle) = input.angles.get(joint) else {
                continue;
            };
            let beyond = if angle < range.min {
                range.min - angle
            } else if angle > range.max {
                angle - range.max
            } else {
                continue;
            };
            let severity = if beyond > JOINT_LIMIT_HIGH_MARGIN_DEG {
                FlagSeverity::High
            } else {
                FlagSeverity::Medium
            };
            let mut flag = GuardFlag::new(
                GuardCode::JointLimit,
                severity,
                format!(
                    "{} angle {:.0} outside safe range {:.0}-{:.0}",
                    joint.as_str(),
                    angle,
                    range.min,
                    range.max
                ),
            )
            .with_value(angle);
            flag.joint = Some(joint);
            flags.push(flag);
        }

        if let Some(asymmetry) = input.asymmetry {
            if asymmetry > ASYMMETRY_MEDIUM {
                let severity = if asymmetry > ASYMMETRY_HIGH {
                    FlagSeverity::High
                } else {
                    FlagSeverity::Medium
                };
                flags.push(
                    GuardFlag::new(GuardCode::Asymmetry, severity, "Left and right sides are uneven")
                        .with_value(asymmetry),
                );
            }
        }

        if let Some(landmarks) = input.landmarks {
            if let Some(offset) = knee_valgus_offset(landmarks) {
                flags.push(
                    GuardFlag::new(GuardCode::KneeValgus, FlagSeverity::High, "Knees caving inward")
                        .with_value(offset),
                );
            }
        }

        if let Some(spine) = input.angles.spine {
            if spine < MIN_SPINE_DEG {
                flags.push(
                    GuardFlag::new(
                        GuardCode::LowerBackHyperextension,
                        FlagSeverity::High,
                        "Lower back is overextended",
                    )
                    .with_value(spine),
                );
            }
        }

        let safe = !flags.iter().any(|f| f.severity == FlagSeverity::High);
        GuardVerdict { safe, flags }
    }
}

/// Inward knee drift beyond the margin on either side, if any
fn knee_valgus_offset(landmarks: &[Landmark]) -> Option<f64> {
    let x = |which: PoseLandmark| landmarks.get(which.index()).map(|l| l.x);

    let left = match (x(PoseLandmark::LeftKnee), x(PoseLandmark::LeftAnkle)) {
        (Some(knee), Some(ankle)) if knee < ankle - KNEE_VALGUS_MARGIN => Some(ankle - knee),
        _ => None,
    };
    let right = match (x(PoseLandmark::RightKnee), x(PoseLandmark::RightAnkle)) {
        (Some(knee), Some(ankle)) if knee > ankle + KNEE_VALGUS_MARGIN => Some(knee - ankle),
        _ => None,
    };

    match (left, right) {
        (Some(l), Some(r)) => Some(l.max(r)),
        (l, r) => l.or(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::standing_landmarks;

    fn neutral_angles() -> GuardAngles {
        GuardAngles {
            knee: Some(120.0),
            hip: Some(120.0),
            shoulder: Some(45.0),
            elbow: Some(90.0),
            spine: Some(165.0),
        }
    }

    #[test]
    fn test_clean_input_is_safe() {
        let landmarks = standing_landmarks();
        let verdict = SafetyGuard::default().evaluate(&GuardInput {
            angles: neutral_angles(),
            asymmetry: Some(0.1),
            confidence: Some(0.95),
            landmarks: Some(&landmarks),
        });

        assert!(verdict.safe);
        assert!(verdict.flags.is_empty());
    }

    #[test]
    fn test_knee_valgus_scenario() {
        let mut landmarks = standing_landmarks();
        landmarks[PoseLandmark::LeftKnee.index()].x = 0.3;
        landmarks[PoseLandmark::LeftAnkle.index()].x = 0.4;

        let verdict = SafetyGuard::default().evaluate(&GuardInput {
            angles: neutral_angles(),
            landmarks: Some(&landmarks),
            ..GuardInput::default()
        });

        assert!(!verdict.safe);
        let flag = verdict
            .flags
            .iter()
            .find(|f| f.code == GuardCode::KneeValgus)
            .unwrap();
        assert_eq!(flag.severity, FlagSeverity::High);
        assert!((flag.value.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_right_knee_valgus_is_mirrored() {
        let mut landmarks = standing_landmarks();
        landmarks[PoseLandmark::RightKnee.index()].x = 0.62;
        landmarks[PoseLandmark::RightAnkle.index()].x = 0.56;

        let verdict = SafetyGuard::default().evaluate(&GuardInput {
            landmarks: Some(&landmarks),
            ..GuardInput::default()
        });
        assert!(verdict.has(GuardCode::KneeValgus));
    }

    #[test]
    fn test_spine_below_threshold_flags_hyperextension() {
        let verdict = SafetyGuard::default().evaluate(&GuardInput {
            angles: GuardAngles {
                spine: Some(130.0),
                ..neutral_angles()
            },
            ..GuardInput::default()
        });

        assert!(verdict.has(GuardCode::LowerBackHyperextension));
        assert!(!verdict.safe);
    }

    #[test]
    fn test_joint_limit_severity_by_margin() {
        let guard = SafetyGuard::default();

        let slight = guard.evaluate(&GuardInput {
            angles: GuardAngles {
                knee: Some(175.0),
                ..neutral_angles()
            },
            ..GuardInput::default()
        });
        assert_eq!(slight.flags.len(), 1);
        assert_eq!(slight.flags[0].severity, FlagSeverity::Medium);
        assert_eq!(slight.flags[0].joint, Some(LimitJoint::Knee));
        assert!(slight.safe);

        let severe = guard.evaluate(&GuardInput {
            angles: GuardAngles {
                elbow: Some(5.0),
                ..neutral_angles()
            },
            ..GuardInput::default()
        });
        assert_eq!(severe.flags[0].severity, FlagSeverity::High);
        assert!(!severe.safe);
    }

    #[test]
    fn test_asymmetry_severity() {
        let guard = SafetyGuard::default();
        let eval = |asymmetry| {
            guard.evaluate(&GuardInput {
                asymmetry: Some(asymmetry),
                ..GuardInput::default()
            })
        };

        assert!(eval(0.2).flags.is_empty());
        assert_eq!(eval(0.3).flags[0].severity, FlagSeverity::Medium);
        assert!(eval(0.3).safe);
        assert_eq!(eval(0.5).flags[0].severity, FlagSeverity::High);
    }

    #[test]
    fn test_low_confidence_is_not_physical_danger() {
        let verdict = SafetyGuard::default().evaluate(&GuardInput {
            confidence: Some(0.3),
            ..GuardInput::default()
        });

        assert!(!verdict.safe);
        assert!(verdict.has(GuardCode::LowConfidence));
        assert!(verdict.physical_danger().is_none());
    }

    #[test]
    fn test_custom_limits() {
        let limits = GuardLimits {
            knee: AngleRange::new(90.0, 100.0),
            ..GuardLimits::default()
        };
        assert!(limits.validate().is_ok());

        let verdict = SafetyGuard::new(limits).evaluate(&GuardInput {
            angles: neutral_angles(),
            ..GuardInput::default()
        });
        assert!(verdict.has(GuardCode::JointLimit));

        let broken = GuardLimits {
            hip: AngleRange::new(170.0, 30.0),
            ..GuardLimits::default()
        };
        assert!(matches!(broken.validate(), Err(CoachError::ConfigError(_))));
    }
}
