//! Edge pipeline orchestration
//!
//! Runs one detector frame through every stage and returns the full
//! per-frame snapshot. All rolling numbers live in an explicit
//! [`SessionState`] owned by the caller, so a scripted frame sequence replays
//! deterministically.
//!
//! Pipeline stages:
//! 1. Angles - 2D and 3D joint angles
//! 2. TechniqueEvaluator - per-joint deviations and raw severity
//! 3. SeverityWindow - display smoothing with hysteresis
//! 4. BiomechanicsScorer - metrics and risk
//! 5. KinematicsState / LoadEstimator - depth, motion, fatigue and load
//! 6. SafetyGuard - independent rule check

use crate::biomechanics::BiomechanicsScorer;
use crate::config::CoachConfig;
use crate::error::CoachError;
use crate::guard::{GuardAngles, GuardInput, GuardLimits, GuardVerdict, SafetyGuard};
use crate::kinematics::{KinematicsState, LoadEstimator};
use crate::landmarks::PoseFrame;
use crate::smoothing::{SeverityWindow, SmoothingConfig};
use crate::technique::{TechniqueEvaluator, TechniqueReport};
use crate::template::ExerciseTemplate;
use crate::types::{
    BiomechanicsMetrics, DepthMetrics, JointAngles, KinematicsMetrics, LoadEstimate,
    RiskAssessment, RiskFlag, RiskLevel, Severity, TechniqueDeviation,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rolling state for exactly one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub severity: SeverityWindow,
    pub kinematics: KinematicsState,
    /// Frames processed so far
    pub frame_index: u64,
}

impl SessionState {
    pub fn new(display_smoothing: SmoothingConfig) -> Self {
        Self {
            severity: SeverityWindow::new(display_smoothing),
            kinematics: KinematicsState::new(),
            frame_index: 0,
        }
    }
}

/// Everything computed for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub template: String,
    pub confidence: f64,
    pub angles_2d: JointAngles,
    pub angles_3d: JointAngles,
    pub deviations: Vec<TechniqueDeviation>,
    pub raw_severity: Severity,
    pub interim_severity: Severity,
    pub stable_severity: Severity,
    pub biomechanics: BiomechanicsMetrics,
    pub risk: RiskAssessment,
    pub guard: GuardVerdict,
    pub depth: DepthMetrics,
    pub kinematics: KinematicsMetrics,
    pub load: LoadEstimate,
}

impl PipelineOutput {
    pub fn technique(&self) -> TechniqueReport {
        TechniqueReport {
            deviations: self.deviations.clone(),
            severity: self.raw_severity,
        }
    }
}

/// Stateless frame processor bound to one exercise template
#[derive(Debug, Clone)]
pub struct EdgePipeline {
    template: ExerciseTemplate,
    guard: SafetyGuard,
}

impl EdgePipeline {
    pub fn new(template: ExerciseTemplate, guard_limits: GuardLimits) -> Self {
        Self {
            template,
            guard: SafetyGuard::new(guard_limits),
        }
    }

    /// Pipeline for a catalog template with default guard limits
    pub fn for_template(key: &str) -> Result<Self, CoachError> {
        Ok(Self::new(ExerciseTemplate::select(key)?, GuardLimits::default()))
    }

    pub fn template(&self) -> &ExerciseTemplate {
        &self.template
    }

    pub fn set_template(&mut self, template: ExerciseTemplate) {
        self.template = template;
    }

    /// Process one frame, advancing `state`
    pub fn process(&self, state: &mut SessionState, frame: &PoseFrame) -> PipelineOutput {
        let timestamp_ms = frame.timestamp_ms;
        let confidence = frame.confidence();

        // Stage 1: angles
        let angles_2d = frame.angles_2d();
        let angles_3d = frame.angles_3d();
        let averaged = angles_2d.averaged();

        // Stage 2: technique
        let technique = TechniqueEvaluator::evaluate(&averaged, &self.template);

        // Stage 3: display smoothing
        let smoothed = state.severity.push(technique.severity, timestamp_ms);

        // Stage 4: biomechanics and risk
        let biomechanics = BiomechanicsScorer::score(frame, &angles_3d);
        let mut risk = BiomechanicsScorer::assess_risk(&biomechanics);

        // Stage 5: depth, kinematics and load
        let depth = state.kinematics.measure_depth(frame);
        let kinematics = state.kinematics.advance(&depth, timestamp_ms);
        let load = LoadEstimator::estimate(
            &depth,
            &kinematics,
            state.kinematics.velocity_loss(),
            &biomechanics,
        );
        merge_load_flags(&mut risk, &load.guard_flags);

        // Stage 6: independent guard
        let guard = self.guard.evaluate(&GuardInput {
            angles: GuardAngles {
                knee: Some(averaged.knee),
                hip: Some(averaged.hip),
                shoulder: Some(averaged.shoulder),
                elbow: Some(angles_2d.elbow()),
                spine: Some(averaged.spine),
            },
            asymmetry: Some(biomechanics.asymmetry_index),
            confidence: Some(confidence),
            landmarks: Some(&frame.landmarks),
        });

        let frame_index = state.frame_index;
        state.frame_index += 1;

        debug!(
            frame_index,
            raw = technique.severity.as_str(),
            stable = smoothed.stable.as_str(),
            risk = risk.risk_level.as_str(),
            rom = depth.rom_percent,
            velocity = kinematics.velocity,
            guard_safe = guard.safe,
            "Frame processed"
        );

        PipelineOutput {
            frame_index,
            timestamp_ms,
            template: self.template.key.clone(),
            confidence,
            angles_2d,
            angles_3d,
            deviations: technique.deviations,
            raw_severity: technique.severity,
            interim_severity: smoothed.interim,
            stable_severity: smoothed.stable,
            biomechanics,
            risk,
            guard,
            depth,
            kinematics,
            load,
        }
    }
}

/// Fold the velocity-drop and depth load flags into a risk assessment.
///
/// Either flag raises `safe` to `caution`; an existing `caution` or `danger`
/// is left as is.
pub fn merge_load_flags(risk: &mut RiskAssessment, load_flags: &[RiskFlag]) {
    let mut merged = false;
    for flag in load_flags {
        if matches!(flag, RiskFlag::VelocityDropRisk | RiskFlag::DepthInsufficient) {
            if !risk.guard_flags.contains(flag) {
                risk.guard_flags.push(*flag);
            }
            merged = true;
        }
    }

    if merged {
        risk.risk_level = risk.risk_level.max(RiskLevel::Caution);
        risk.refresh_reason();
    }
}

/// Run a whole frame sequence through a fresh session (stateless, one-shot).
///
/// # Example
/// ```ignore
/// let outputs = analyze_frames("squat", &frames, &CoachConfig::default())?;
/// ```
pub fn analyze_frames(
    template_key: &str,
    frames: &[PoseFrame],
    config: &CoachConfig,
) -> Result<Vec<PipelineOutput>, CoachError> {
    config.validate()?;
    let pipeline = EdgePipeline::new(ExerciseTemplate::select(template_key)?, config.guard_limits);
    let mut state = SessionState::new(config.display_smoothing);

    let mut outputs = Vec::with_capacity(frames.len());
    for frame in frames {
        frame.validate()?;
        outputs.push(pipeline.process(&mut state, frame));
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::GuardCode;
    use crate::landmarks::fixtures::standing_frame;
    use crate::landmarks::PoseLandmark;
    use pretty_assertions::assert_eq;

    fn squat_pipeline() -> EdgePipeline {
        EdgePipeline::for_template("squat").unwrap()
    }

    /// Standing skeleton with the hips pushed back to `hip_depth`
    fn frame_at(timestamp_ms: f64, hip_depth: f64) -> PoseFrame {
        let mut frame = standing_frame(timestamp_ms);
        frame.landmarks[PoseLandmark::LeftHip.index()].z = hip_depth;
        frame.landmarks[PoseLandmark::RightHip.index()].z = hip_depth;
        frame
    }

    /// Standing skeleton with the spine folded well past the squat range
    fn folded_frame(timestamp_ms: f64) -> PoseFrame {
        let mut frame = standing_frame(timestamp_ms);
        frame.landmarks[PoseLandmark::Nose.index()].x = 0.75;
        frame.landmarks[PoseLandmark::Nose.index()].y = 0.20;
        frame
    }

    #[test]
    fn test_standing_frame_snapshot() {
        let pipeline = squat_pipeline();
        let mut state = SessionState::default();
        let out = pipeline.process(&mut state, &standing_frame(0.0));

        assert_eq!(out.frame_index, 0);
        assert_eq!(out.template, "squat");
        assert_eq!(out.raw_severity, Severity::Green);
        assert_eq!(out.stable_severity, Severity::Green);
        assert_eq!(out.deviations.len(), 4);
        assert!(out.guard.safe);
        // First frame: zero-width baseline, so depth is insufficient
        assert_eq!(out.risk.risk_level, RiskLevel::Caution);
        assert!(out.risk.has_flag(RiskFlag::DepthInsufficient));
        assert_eq!(state.frame_index, 1);
    }

    #[test]
    fn test_folded_spine_is_red_and_guarded() {
        let pipeline = squat_pipeline();
        let mut state = SessionState::default();
        let out = pipeline.process(&mut state, &folded_frame(0.0));

        assert!(out.angles_2d.spine < 140.0);
        assert_eq!(out.raw_severity, Severity::Red);
        assert_eq!(out.stable_severity, Severity::Red);
        assert!(out.guard.has(GuardCode::LowerBackHyperextension));
        assert!(!out.guard.safe);
    }

    #[test]
    fn test_display_hysteresis_over_scripted_sequence() {
        let pipeline = squat_pipeline();
        let mut state = SessionState::default();

        let first = pipeline.process(&mut state, &folded_frame(0.0));
        assert_eq!(first.stable_severity, Severity::Red);

        // Good frames inside the lockout keep the red color but show green interim
        let second = pipeline.process(&mut state, &standing_frame(100.0));
        assert_eq!(second.stable_severity, Severity::Red);
        assert_eq!(second.interim_severity, Severity::Green);

        for t in [200.0, 300.0] {
            pipeline.process(&mut state, &standing_frame(t));
        }
        let later = pipeline.process(&mut state, &standing_frame(450.0));
        assert_eq!(later.stable_severity, Severity::Green);
    }

    #[test]
    fn test_depth_baseline_and_bottom_detection() {
        let pipeline = squat_pipeline();
        let mut state = SessionState::default();

        pipeline.process(&mut state, &frame_at(0.0, 0.1));
        let bottom = pipeline.process(&mut state, &frame_at(100.0, 0.3));

        assert!((bottom.depth.rom_percent - 1.0).abs() < 1e-9);
        assert!(bottom.depth.bottom_detected);
        assert!(!bottom.risk.has_flag(RiskFlag::DepthInsufficient));

        let range = state.kinematics.depth_range().unwrap();
        assert_eq!((range.min, range.max), (0.1, 0.3));
    }

    #[test]
    fn test_velocity_drop_merges_into_reason() {
        let pipeline = squat_pipeline();
        let mut state = SessionState::default();

        pipeline.process(&mut state, &frame_at(0.0, 0.0));
        // Smoothed depth moves 0.25 in 0.5 s -> 0.5 units/s
        let out = pipeline.process(&mut state, &frame_at(500.0, 0.5));

        assert!(out.load.velocity_loss > 0.35);
        assert!(out.risk.reason_contains(RiskFlag::VelocityDropRisk));
        assert!(out.risk.risk_level >= RiskLevel::Caution);
    }

    #[test]
    fn test_merge_never_downgrades_danger() {
        let mut risk = RiskAssessment {
            risk_level: RiskLevel::Danger,
            guard_flags: vec![RiskFlag::KneeValgusRisk],
            guard_reason: Some("knee_valgus_risk".to_string()),
        };
        merge_load_flags(
            &mut risk,
            &[RiskFlag::VelocityDropRisk, RiskFlag::DepthInsufficient],
        );

        assert_eq!(risk.risk_level, RiskLevel::Danger);
        assert_eq!(
            risk.guard_reason.as_deref(),
            Some("knee_valgus_risk,velocity_drop_risk,depth_insufficient")
        );
    }

    #[test]
    fn test_merge_upgrades_safe_and_ignores_other_load_flags() {
        let mut risk = RiskAssessment::default();
        merge_load_flags(&mut risk, &[RiskFlag::AsymmetryFatigue]);
        assert_eq!(risk, RiskAssessment::default());

        merge_load_flags(&mut risk, &[RiskFlag::DepthInsufficient]);
        assert_eq!(risk.risk_level, RiskLevel::Caution);
        assert_eq!(risk.guard_reason.as_deref(), Some("depth_insufficient"));
    }

    #[test]
    fn test_sessions_do_not_share_state() {
        let pipeline = squat_pipeline();
        let mut a = SessionState::default();
        let mut b = SessionState::default();

        pipeline.process(&mut a, &frame_at(0.0, 0.1));
        pipeline.process(&mut a, &frame_at(100.0, 0.4));
        pipeline.process(&mut b, &frame_at(0.0, 0.2));

        assert_eq!(a.frame_index, 2);
        assert_eq!(b.frame_index, 1);
        assert_eq!(b.kinematics.depth_range().unwrap().max, 0.2);
    }

    #[test]
    fn test_missing_landmarks_degrade_without_error() {
        let pipeline = squat_pipeline();
        let mut state = SessionState::default();
        let mut frame = standing_frame(0.0);
        frame.landmarks.truncate(11);

        let out = pipeline.process(&mut state, &frame);
        assert!(out.confidence < 0.6);
        assert!(out.guard.has(GuardCode::LowConfidence));
    }

    #[test]
    fn test_analyze_frames() {
        let frames = vec![frame_at(0.0, 0.1), frame_at(33.0, 0.2), frame_at(66.0, 0.3)];
        let outputs = analyze_frames("squat", &frames, &CoachConfig::default()).unwrap();

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[2].frame_index, 2);
        assert!(matches!(
            analyze_frames("plank", &frames, &CoachConfig::default()),
            Err(CoachError::UnknownTemplate(_))
        ));
    }
}
