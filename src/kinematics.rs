//! Depth, kinematics and load estimation
//!
//! This module tracks the per-session depth baseline and the motion history
//! needed to turn per-frame hip depth into:
//! - range-of-motion progress against a monotonically widening baseline
//! - smoothed velocity, acceleration and tempo
//! - fatigue, RPE and volume-stress proxies with load guard flags
//! - completed repetitions

use crate::landmarks::{PoseFrame, PoseLandmark};
use crate::types::{BiomechanicsMetrics, DepthMetrics, KinematicsMetrics, LoadEstimate, RiskFlag};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Trailing samples averaged before velocity is derived
pub const DEPTH_SMOOTHING_WINDOW: usize = 5;

/// Floor for the baseline width so a fresh baseline never divides by zero
const MIN_RANGE_WIDTH: f64 = 1e-4;
/// Floor for eccentric and concentric magnitudes in the tempo ratio
const MIN_PHASE_MAGNITUDE: f64 = 0.001;
const MAX_TEMPO_RATIO: f64 = 3.0;
const BOTTOM_ROM: f64 = 0.9;
/// Range-of-motion below which a rep that reached the bottom is complete
const LOCKOUT_ROM: f64 = 0.1;
const PAUSE_VELOCITY: f64 = 0.01;

const DEPTH_INSUFFICIENT_ROM: f64 = 0.3;
const VELOCITY_DROP_THRESHOLD: f64 = 0.35;
const ASYMMETRY_FATIGUE_THRESHOLD: f64 = 0.45;
const SHEAR_UNDER_LOAD_THRESHOLD: f64 = 0.7;
const SHEAR_UNDER_LOAD_VELOCITY: f64 = 0.04;

/// Observed hip depth extremes for the session; only ever widens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min: f64,
    pub max: f64,
}

impl DepthRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn widen(&mut self, depth: f64) {
        self.min = self.min.min(depth);
        self.max = self.max.max(depth);
    }

    /// Position of `depth` within the range, clamped to [0, 1]
    pub fn rom_percent(&self, depth: f64) -> f64 {
        let low = self.min.min(self.max);
        let width = (self.max - self.min).abs().max(MIN_RANGE_WIDTH);
        ((depth - low) / width).clamp(0.0, 1.0)
    }
}

/// Rolling motion state owned by one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KinematicsState {
    depth_range: Option<DepthRange>,
    depth_window: VecDeque<f64>,
    last_depth: Option<f64>,
    last_velocity: f64,
    last_timestamp_ms: Option<f64>,
    /// Running maximum of |velocity| this session
    velocity_loss: f64,
    bottom_reached: bool,
    rep_count: u32,
}

impl KinematicsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known baseline, e.g. one restored from a previous set
    pub fn with_depth_range(range: DepthRange) -> Self {
        Self {
            depth_range: Some(range),
            ..Self::default()
        }
    }

    pub fn depth_range(&self) -> Option<DepthRange> {
        self.depth_range
    }

    pub fn velocity_loss(&self) -> f64 {
        self.velocity_loss
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    /// Average z-depths of the frame and progress against the baseline.
    ///
    /// The baseline is widened with the current hip depth before the range
    /// of motion is computed.
    pub fn measure_depth(&mut self, frame: &PoseFrame) -> DepthMetrics {
        use PoseLandmark::*;

        let avg_z = |a: PoseLandmark, b: PoseLandmark| (frame.point(a).z + frame.point(b).z) / 2.0;
        let hip_depth = avg_z(LeftHip, RightHip);
        let knee_depth = avg_z(LeftKnee, RightKnee);
        let shoulder_depth = avg_z(LeftShoulder, RightShoulder);

        let range = self
            .depth_range
            .get_or_insert_with(|| DepthRange::new(hip_depth, hip_depth));
        range.widen(hip_depth);
        let rom_percent = range.rom_percent(hip_depth);

        DepthMetrics {
            hip_depth,
            knee_depth,
            shoulder_depth,
            rom_percent,
            bottom_detected: rom_percent > BOTTOM_ROM,
        }
    }

    /// Advance the motion history with this frame's depth.
    pub fn advance(&mut self, depth: &DepthMetrics, timestamp_ms: f64) -> KinematicsMetrics {
        self.depth_window.push_back(depth.hip_depth);
        while self.depth_window.len() > DEPTH_SMOOTHING_WINDOW {
            self.depth_window.pop_front();
        }
        let smoothed_depth =
            self.depth_window.iter().sum::<f64>() / self.depth_window.len() as f64;

        let dt_sec = match self.last_timestamp_ms {
            Some(last) => (timestamp_ms - last) / 1000.0,
            None => 0.0,
        };

        let velocity = match self.last_depth {
            Some(last) if dt_sec > 0.0 => (smoothed_depth - last) / dt_sec,
            _ => 0.0,
        };
        let acceleration = if dt_sec > 0.0 {
            (velocity - self.last_velocity) / dt_sec
        } else {
            0.0
        };

        let eccentric = velocity.max(0.0).max(MIN_PHASE_MAGNITUDE);
        let concentric = (-velocity).max(0.0).max(MIN_PHASE_MAGNITUDE);
        let tempo_ratio = (eccentric / concentric).clamp(0.0, MAX_TEMPO_RATIO);

        self.velocity_loss = self.velocity_loss.max(velocity.abs());
        self.last_depth = Some(smoothed_depth);
        self.last_velocity = velocity;
        self.last_timestamp_ms = Some(timestamp_ms);

        let mut rep_completed = false;
        if depth.bottom_detected {
            self.bottom_reached = true;
        } else if self.bottom_reached && depth.rom_percent < LOCKOUT_ROM {
            self.bottom_reached = false;
            self.rep_count += 1;
            rep_completed = true;
        }

        KinematicsMetrics {
            smoothed_depth,
            velocity,
            acceleration,
            tempo_ratio,
            pause_detected: velocity.abs() < PAUSE_VELOCITY,
            rep_completed,
            rep_count: self.rep_count,
        }
    }
}

pub struct LoadEstimator;

impl LoadEstimator {
    pub fn estimate(
        depth: &DepthMetrics,
        kinematics: &KinematicsMetrics,
        velocity_loss: f64,
        biomechanics: &BiomechanicsMetrics,
    ) -> LoadEstimate {
        let speed = kinematics.velocity.abs();
        let rom = depth.rom_percent;

        let mut guard_flags = Vec::new();
        if rom < DEPTH_INSUFFICIENT_ROM {
            guard_flags.push(RiskFlag::DepthInsufficient);
        }
        if velocity_loss > VELOCITY_DROP_THRESHOLD {
            guard_flags.push(RiskFlag::VelocityDropRisk);
        }
        if biomechanics.asymmetry_index > ASYMMETRY_FATIGUE_THRESHOLD {
            guard_flags.push(RiskFlag::AsymmetryFatigue);
        }
        if biomechanics.lumbar_shear_proxy > SHEAR_UNDER_LOAD_THRESHOLD
            && speed > SHEAR_UNDER_LOAD_VELOCITY
        {
            guard_flags.push(RiskFlag::ShearUnderLoad);
        }

        LoadEstimate {
            relative_load_proxy: ((1.0 - speed) * rom).clamp(0.0, 1.0),
            fatigue_index: velocity_loss.clamp(0.0, 1.0),
            rpe_proxy: (0.6 * velocity_loss + 0.4 * biomechanics.asymmetry_index).clamp(0.0, 1.0),
            volume_stress_score: (rom * (1.0 - speed)).clamp(0.0, 1.0),
            velocity_loss,
            guard_flags,
        }
    }
}
