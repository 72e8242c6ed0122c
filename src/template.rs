//! Exercise template catalog
//!
//! Each template lists the acceptable angle range, in degrees, for the four
//! joints the technique evaluator checks. Templates are immutable and picked
//! by key before a session starts.

use crate::error::CoachError;
use crate::types::TemplateJoint;
use serde::{Deserialize, Serialize};

/// Inclusive angle range in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    pub min: f64,
    pub max: f64,
}

impl AngleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateRanges {
    pub knee: AngleRange,
    pub hip: AngleRange,
    pub spine: AngleRange,
    pub shoulder: AngleRange,
}

impl TemplateRanges {
    pub fn get(&self, joint: TemplateJoint) -> AngleRange {
        match joint {
            TemplateJoint::Knee => self.knee,
            TemplateJoint::Hip => self.hip,
            TemplateJoint::Spine => self.spine,
            TemplateJoint::Shoulder => self.shoulder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTemplate {
    pub key: String,
    pub name: String,
    pub ranges: TemplateRanges,
}

/// Catalog keys accepted by [`ExerciseTemplate::select`]
pub const TEMPLATE_KEYS: [&str; 4] = ["squat", "deadlift", "bench_press", "overhead_press"];

impl ExerciseTemplate {
    /// Look up a catalog template by key
    pub fn select(key: &str) -> Result<Self, CoachError> {
        let (name, ranges) = match key {
            "squat" => (
                "Back Squat",
                TemplateRanges {
                    knee: AngleRange::new(70.0, 190.0),
                    hip: AngleRange::new(60.0, 190.0),
                    spine: AngleRange::new(140.0, 190.0),
                    shoulder: AngleRange::new(0.0, 100.0),
                },
            ),
            "deadlift" => (
                "Conventional Deadlift",
                TemplateRanges {
                    knee: AngleRange::new(110.0, 190.0),
                    hip: AngleRange::new(55.0, 190.0),
                    spine: AngleRange::new(150.0, 190.0),
                    shoulder: AngleRange::new(0.0, 45.0),
                },
            ),
            "bench_press" => (
                "Bench Press",
                TemplateRanges {
                    knee: AngleRange::new(70.0, 120.0),
                    hip: AngleRange::new(140.0, 190.0),
                    spine: AngleRange::new(150.0, 190.0),
                    shoulder: AngleRange::new(30.0, 90.0),
                },
            ),
            "overhead_press" => (
                "Overhead Press",
                TemplateRanges {
                    knee: AngleRange::new(160.0, 190.0),
                    hip: AngleRange::new(160.0, 190.0),
                    spine: AngleRange::new(155.0, 190.0),
                    shoulder: AngleRange::new(60.0, 185.0),
                },
            ),
            other => return Err(CoachError::UnknownTemplate(other.to_string())),
        };

        Ok(Self {
            key: key.to_string(),
            name: name.to_string(),
            ranges,
        })
    }

    /// Every template in the catalog
    pub fn catalog() -> Vec<Self> {
        TEMPLATE_KEYS
            .iter()
            .filter_map(|key| Self::select(key).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_known_templates() {
        for key in TEMPLATE_KEYS {
            let template = ExerciseTemplate::select(key).unwrap();
            assert_eq!(template.key, key);
            for joint in TemplateJoint::ALL {
                let range = template.ranges.get(joint);
                assert!(range.min < range.max, "{} {}", key, joint.as_str());
            }
        }
        assert_eq!(ExerciseTemplate::catalog().len(), TEMPLATE_KEYS.len());
    }

    #[test]
    fn test_unknown_template() {
        let result = ExerciseTemplate::select("kettlebell_swing");
        assert!(matches!(result, Err(CoachError::UnknownTemplate(key)) if key == "kettlebell_swing"));
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = AngleRange::new(70.0, 170.0);
        assert!(range.contains(70.0));
        assert!(range.contains(170.0));
        assert!(!range.contains(69.999));
    }
}
