//! Biomechanics scoring
//!
//! Derives normalized load-bearing metrics from 3D joints and 3D angles and
//! turns them into a risk assessment with fixed thresholds.

use crate::landmarks::{PoseFrame, PoseLandmark};
use crate::types::{BiomechanicsMetrics, JointAngles, RiskAssessment, RiskFlag, RiskLevel};

/// Spine angle treated as neutral
pub const NEUTRAL_SPINE_DEG: f64 = 150.0;

const KNEE_VALGUS_THRESHOLD: f64 = 0.05;
const LUMBAR_SHEAR_THRESHOLD: f64 = 0.7;
const HIP_HINGE_THRESHOLD: f64 = 0.6;
const ASYMMETRY_THRESHOLD: f64 = 0.4;

pub struct BiomechanicsScorer;

impl BiomechanicsScorer {
    /// Score one frame from its 3D landmarks and 3D angles
    pub fn score(frame: &PoseFrame, angles: &JointAngles) -> BiomechanicsMetrics {
        use PoseLandmark::*;

        let left_knee = frame.point(LeftKnee);
        let right_knee = frame.point(RightKnee);
        let left_ankle = frame.point(LeftAnkle);
        let right_ankle = frame.point(RightAnkle);
        let left_shoulder = frame.point(LeftShoulder);
        let right_shoulder = frame.point(RightShoulder);
        let left_hip = frame.point(LeftHip);
        let right_hip = frame.point(RightHip);

        // Signed lateral offsets; positive means the knee sits medial of the ankle
        let left_offset = left_knee.x - left_ankle.x;
        let right_offset = right_ankle.x - right_knee.x;
        let knee_valgus = left_offset.abs().max(right_offset.abs());

        let shoulder_depth = (left_shoulder.z + right_shoulder.z) / 2.0;
        let hip_depth = (left_hip.z + right_hip.z) / 2.0;
        let trunk_forward_lean = (shoulder_depth - hip_depth).abs().clamp(0.0, 1.0);

        let spine_offset = (angles.spine - NEUTRAL_SPINE_DEG).abs();
        let hip_hinge_deviation = (spine_offset / 50.0).clamp(0.0, 1.0);
        let lumbar_shear_proxy = (2.0 * trunk_forward_lean + spine_offset / 90.0).clamp(0.0, 1.0);

        let asymmetry_index = (((angles.left_knee - angles.right_knee).abs()
            + (angles.left_hip - angles.right_hip).abs())
            / 180.0)
            .clamp(0.0, 1.0);

        let shoulder_span = (left_shoulder.x - right_shoulder.x).abs();
        let bar_path_deviation = if shoulder_span > f64::EPSILON {
            Some(((left_shoulder.z - right_shoulder.z).abs() / shoulder_span).clamp(0.0, 1.0))
        } else {
            None
        };

        BiomechanicsMetrics {
            knee_valgus,
            hip_hinge_deviation,
            lumbar_shear_proxy,
            trunk_forward_lean,
            asymmetry_index,
            bar_path_deviation,
        }
    }

    /// Threshold the metrics into flags and a risk level.
    ///
    /// Knee valgus and lumbar shear are dangerous on their own; any other flag
    /// is a caution.
    pub fn assess_risk(metrics: &BiomechanicsMetrics) -> RiskAssessment {
        let mut guard_flags = Vec::new();
        if metrics.knee_valgus > KNEE_VALGUS_THRESHOLD {
            guard_flags.push(RiskFlag::KneeValgusRisk);
        }
        if metrics.lumbar_shear_proxy > LUMBAR_SHEAR_THRESHOLD {
            guard_flags.push(RiskFlag::LumbarShearRisk);
        }
        if metrics.hip_hinge_deviation > HIP_HINGE_THRESHOLD {
            guard_flags.push(RiskFlag::HipHingeDeviation);
        }
        if metrics.asymmetry_index > ASYMMETRY_THRESHOLD {
            guard_flags.push(RiskFlag::AsymmetryOverload);
        }

        let risk_level = if guard_flags
            .iter()
            .any(|f| matches!(f, RiskFlag::KneeValgusRisk | RiskFlag::LumbarShearRisk))
        {
            RiskLevel::Danger
        } else if !guard_flags.is_empty() {
            RiskLevel::Caution
        } else {
            RiskLevel::Safe
        };

        let mut assessment = RiskAssessment {
            risk_level,
            guard_flags,
            guard_reason: None,
        };
        assessment.refresh_reason();
        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::standing_frame;
    use pretty_assertions::assert_eq;

    fn metrics(knee_valgus: f64, lumbar: f64, hinge: f64, asymmetry: f64) -> BiomechanicsMetrics {
        BiomechanicsMetrics {
            knee_valgus,
            hip_hinge_deviation: hinge,
            lumbar_shear_proxy: lumbar,
            trunk_forward_lean: 0.0,
            asymmetry_index: asymmetry,
            bar_path_deviation: None,
        }
    }

    #[test]
    fn test_standing_frame_scores() {
        let frame = standing_frame(0.0);
        let angles = frame.angles_3d();
        let scored = BiomechanicsScorer::score(&frame, &angles);

        // Soft knees sit 0.01 inside the ankles
        assert!((scored.knee_valgus - 0.01).abs() < 1e-9);
        assert_eq!(scored.trunk_forward_lean, 0.0);
        assert!(scored.asymmetry_index < 1e-9);
        assert_eq!(scored.bar_path_deviation, Some(0.0));
        let spine_offset = angles.spine - NEUTRAL_SPINE_DEG;
        assert!((scored.hip_hinge_deviation - spine_offset / 50.0).abs() < 1e-9);
        assert!((scored.lumbar_shear_proxy - spine_offset / 90.0).abs() < 1e-9);
        assert_eq!(BiomechanicsScorer::assess_risk(&scored).risk_level, RiskLevel::Safe);
    }

    #[test]
    fn test_knee_valgus_magnitude_either_side() {
        let mut frame = standing_frame(0.0);
        frame.landmarks[PoseLandmark::LeftKnee.index()].x = 0.3;
        frame.landmarks[PoseLandmark::LeftAnkle.index()].x = 0.4;
        let angles = frame.angles_3d();

        let scored = BiomechanicsScorer::score(&frame, &angles);
        assert!((scored.knee_valgus - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_trunk_lean_and_shear() {
        let mut frame = standing_frame(0.0);
        frame.landmarks[PoseLandmark::LeftShoulder.index()].z = -0.4;
        frame.landmarks[PoseLandmark::RightShoulder.index()].z = -0.4;
        let angles = JointAngles {
            spine: 150.0,
            ..frame.angles_3d()
        };

        let scored = BiomechanicsScorer::score(&frame, &angles);
        assert!((scored.trunk_forward_lean - 0.4).abs() < 1e-9);
        assert!((scored.lumbar_shear_proxy - 0.8).abs() < 1e-9);
        assert_eq!(scored.hip_hinge_deviation, 0.0);
    }

    #[test]
    fn test_bar_path_none_without_shoulder_span() {
        let mut frame = standing_frame(0.0);
        frame.landmarks[PoseLandmark::RightShoulder.index()].x = 0.40;
        let scored = BiomechanicsScorer::score(&frame, &frame.angles_3d());
        assert_eq!(scored.bar_path_deviation, None);
    }

    #[test]
    fn test_risk_safe_without_flags() {
        let risk = BiomechanicsScorer::assess_risk(&metrics(0.01, 0.2, 0.1, 0.1));
        assert_eq!(risk, RiskAssessment::default());
    }

    #[test]
    fn test_risk_danger_from_valgus_keeps_flag_order() {
        let risk = BiomechanicsScorer::assess_risk(&metrics(0.08, 0.2, 0.7, 0.5));

        assert_eq!(risk.risk_level, RiskLevel::Danger);
        assert_eq!(
            risk.guard_reason.as_deref(),
            Some("knee_valgus_risk,hip_hinge_deviation,asymmetry_overload")
        );
    }

    #[test]
    fn test_risk_caution_from_hinge_only() {
        let risk = BiomechanicsScorer::assess_risk(&metrics(0.0, 0.3, 0.61, 0.0));
        assert_eq!(risk.risk_level, RiskLevel::Caution);
        assert_eq!(risk.guard_flags, vec![RiskFlag::HipHingeDeviation]);
    }

    #[test]
    fn test_risk_danger_from_lumbar_shear() {
        let risk = BiomechanicsScorer::assess_risk(&metrics(0.0, 0.71, 0.0, 0.0));
        assert_eq!(risk.risk_level, RiskLevel::Danger);
        assert_eq!(risk.guard_reason.as_deref(), Some("lumbar_shear_risk"));
    }
}
