//! Technique evaluation
//!
//! Compares the averaged joint angles of a frame against the selected
//! exercise template:
//! - outside the range: red
//! - inside but within the warning buffer of a bound: yellow
//! - otherwise: green
//!
//! The frame severity is the worst per-joint severity.

use crate::template::ExerciseTemplate;
use crate::types::{Severity, TechniqueDeviation, TemplateAngles, TemplateJoint};
use serde::{Deserialize, Serialize};

/// Degrees inside a bound that still count as a warning
pub const WARNING_BUFFER_DEG: f64 = 10.0;

/// Per-joint deviations and their aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueReport {
    pub deviations: Vec<TechniqueDeviation>,
    pub severity: Severity,
}

impl TechniqueReport {
    /// Deviation of the worst joint; ties keep template joint order
    pub fn worst(&self) -> Option<&TechniqueDeviation> {
        self.deviations
            .iter()
            .filter(|d| d.severity != Severity::Green)
            .fold(None, |worst: Option<&TechniqueDeviation>, d| match worst {
                Some(w) if w.severity >= d.severity => Some(w),
                _ => Some(d),
            })
    }
}

pub struct TechniqueEvaluator;

impl TechniqueEvaluator {
    pub fn evaluate(angles: &TemplateAngles, template: &ExerciseTemplate) -> TechniqueReport {
        let deviations: Vec<TechniqueDeviation> = TemplateJoint::ALL
            .iter()
            .map(|&joint| {
                let range = template.ranges.get(joint);
                let observed = angles.get(joint);
                TechniqueDeviation {
                    joint,
                    observed_angle: observed,
                    expected_min: range.min,
                    expected_max: range.max,
                    severity: classify(observed, range.min, range.max),
                }
            })
            .collect();

        let severity = deviations
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or_default();

        TechniqueReport {
            deviations,
            severity,
        }
    }
}

/// Bounds are inclusive: an angle exactly on `min` or `max` is never red
fn classify(observed: f64, min: f64, max: f64) -> Severity {
    if observed < min || observed > max {
        Severity::Red
    } else if observed - min < WARNING_BUFFER_DEG || max - observed < WARNING_BUFFER_DEG {
        Severity::Yellow
    } else {
        Severity::Green
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TEMPLATE_KEYS;

    fn squat() -> ExerciseTemplate {
        ExerciseTemplate::select("squat").unwrap()
    }

    fn centered(template: &ExerciseTemplate) -> TemplateAngles {
        let mid = |joint| {
            let r = template.ranges.get(joint);
            (r.min + r.max) / 2.0
        };
        TemplateAngles {
            knee: mid(TemplateJoint::Knee),
            hip: mid(TemplateJoint::Hip),
            spine: mid(TemplateJoint::Spine),
            shoulder: mid(TemplateJoint::Shoulder),
        }
    }

    #[test]
    fn test_all_green_when_centered() {
        let template = squat();
        let report = TechniqueEvaluator::evaluate(&centered(&template), &template);

        assert_eq!(report.severity, Severity::Green);
        assert_eq!(report.deviations.len(), 4);
        assert!(report.worst().is_none());
    }

    #[test]
    fn test_bounds_are_never_red() {
        for key in TEMPLATE_KEYS {
            let template = ExerciseTemplate::select(key).unwrap();
            for joint in TemplateJoint::ALL {
                let range = template.ranges.get(joint);
                for bound in [range.min, range.max] {
                    let mut angles = centered(&template);
                    match joint {
                        TemplateJoint::Knee => angles.knee = bound,
                        TemplateJoint::Hip => angles.hip = bound,
                        TemplateJoint::Spine => angles.spine = bound,
                        TemplateJoint::Shoulder => angles.shoulder = bound,
                    }
                    let report = TechniqueEvaluator::evaluate(&angles, &template);
                    assert_eq!(report.severity, Severity::Yellow, "{} {}", key, joint.as_str());
                }
            }
        }
    }

    #[test]
    fn test_red_wins_over_yellow() {
        let template = squat();
        let mut angles = centered(&template);
        angles.knee = template.ranges.knee.min + 5.0; // yellow
        angles.spine = template.ranges.spine.min - 1.0; // red

        let report = TechniqueEvaluator::evaluate(&angles, &template);
        assert_eq!(report.severity, Severity::Red);
        assert_eq!(report.worst().unwrap().joint, TemplateJoint::Spine);
    }

    #[test]
    fn test_aggregate_is_yellow_without_red() {
        let template = squat();
        let mut angles = centered(&template);
        angles.hip = template.ranges.hip.max - 2.0;

        let report = TechniqueEvaluator::evaluate(&angles, &template);
        assert_eq!(report.severity, Severity::Yellow);
        assert!(report
            .deviations
            .iter()
            .all(|d| d.severity != Severity::Red));
    }
}
