//! Detector input: the 33-point pose skeleton
//!
//! Frames arrive from an external landmark detector as normalized image-space
//! points with optional visibility. This module owns the fixed index layout,
//! frame parsing and the per-frame joint angle extraction.

use crate::error::CoachError;
use crate::geometry::{angle_2d, angle_3d, Point3};
use crate::types::JointAngles;
use serde::{Deserialize, Serialize};

/// Number of points in the detector skeleton
pub const LANDMARK_COUNT: usize = 33;

/// Semantic indices of the 33-point skeleton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Landmarks whose visibility drives the frame confidence estimate
const CONFIDENCE_LANDMARKS: [PoseLandmark; 8] = [
    PoseLandmark::LeftShoulder,
    PoseLandmark::RightShoulder,
    PoseLandmark::LeftHip,
    PoseLandmark::RightHip,
    PoseLandmark::LeftKnee,
    PoseLandmark::RightKnee,
    PoseLandmark::LeftAnkle,
    PoseLandmark::RightAnkle,
];

/// A single tracked point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    #[serde(default)]
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    /// Detection confidence in [0, 1], if the detector reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            name: String::new(),
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f64) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn point(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }

    fn missing() -> Self {
        Self {
            visibility: Some(0.0),
            ..Self::default()
        }
    }
}

/// One detector frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Capture time in milliseconds on a monotonic session clock
    pub timestamp_ms: f64,
    pub landmarks: Vec<Landmark>,
    /// Detector-level confidence, when the detector provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl PoseFrame {
    pub fn new(timestamp_ms: f64, landmarks: Vec<Landmark>) -> Self {
        Self {
            timestamp_ms,
            landmarks,
            confidence: None,
        }
    }

    /// Parse and validate a single JSON frame
    pub fn from_json(json: &str) -> Result<Self, CoachError> {
        let frame: PoseFrame = serde_json::from_str(json)?;
        frame.validate()?;
        Ok(frame)
    }

    /// Parse newline-delimited JSON frames, skipping blank lines
    pub fn parse_ndjson(input: &str) -> Result<Vec<Self>, CoachError> {
        input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::from_json)
            .collect()
    }

    /// Reject frames that cannot be placed on the session clock or contain
    /// non-finite coordinates. Short landmark arrays are accepted.
    pub fn validate(&self) -> Result<(), CoachError> {
        if !self.timestamp_ms.is_finite() || self.timestamp_ms < 0.0 {
            return Err(CoachError::InvalidFrame(format!(
                "timestamp_ms must be a non-negative number, got {}",
                self.timestamp_ms
            )));
        }
        if self.landmarks.len() > LANDMARK_COUNT {
            return Err(CoachError::InvalidFrame(format!(
                "expected at most {} landmarks, got {}",
                LANDMARK_COUNT,
                self.landmarks.len()
            )));
        }
        for (index, landmark) in self.landmarks.iter().enumerate() {
            if !(landmark.x.is_finite() && landmark.y.is_finite() && landmark.z.is_finite()) {
                return Err(CoachError::InvalidFrame(format!(
                    "landmark {} has non-finite coordinates",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Landmark at `which`, or a zero-visibility placeholder when absent
    pub fn landmark(&self, which: PoseLandmark) -> Landmark {
        self.landmarks
            .get(which.index())
            .cloned()
            .unwrap_or_else(Landmark::missing)
    }

    pub fn point(&self, which: PoseLandmark) -> Point3 {
        self.landmark(which).point()
    }

    /// Detector confidence, or the mean visibility of the lower-body and
    /// shoulder landmarks. Unreported visibility counts as fully visible.
    pub fn confidence(&self) -> f64 {
        if let Some(confidence) = self.confidence {
            return confidence.clamp(0.0, 1.0);
        }

        let total: f64 = CONFIDENCE_LANDMARKS
            .iter()
            .map(|which| match self.landmarks.get(which.index()) {
                Some(landmark) => landmark.visibility.unwrap_or(1.0).clamp(0.0, 1.0),
                None => 0.0,
            })
            .sum();
        total / CONFIDENCE_LANDMARKS.len() as f64
    }

    /// Joint angles using x and y only
    pub fn angles_2d(&self) -> JointAngles {
        self.joint_angles(angle_2d)
    }

    /// Joint angles using x, y and z
    pub fn angles_3d(&self) -> JointAngles {
        self.joint_angles(angle_3d)
    }

    fn joint_angles(&self, angle: fn(Point3, Point3, Point3) -> f64) -> JointAngles {
        use PoseLandmark::*;

        let p = |which| self.point(which);
        let mid_shoulder = p(LeftShoulder).midpoint(p(RightShoulder));
        let mid_hip = p(LeftHip).midpoint(p(RightHip));

        JointAngles {
            left_knee: angle(p(LeftHip), p(LeftKnee), p(LeftAnkle)),
            right_knee: angle(p(RightHip), p(RightKnee), p(RightAnkle)),
            left_hip: angle(p(LeftShoulder), p(LeftHip), p(LeftKnee)),
            right_hip: angle(p(RightShoulder), p(RightHip), p(RightKnee)),
            left_shoulder: angle(p(LeftElbow), p(LeftShoulder), p(LeftHip)),
            right_shoulder: angle(p(RightElbow), p(RightShoulder), p(RightHip)),
            left_elbow: angle(p(LeftShoulder), p(LeftElbow), p(LeftWrist)),
            right_elbow: angle(p(RightShoulder), p(RightElbow), p(RightWrist)),
            spine: angle(p(Nose), mid_shoulder, mid_hip),
        }
    }
}
