//! Generate a synthetic three-rep squat as NDJSON pose frames
//!
//! cargo run --example gen_squat | repsense coach --input - --speak

use repsense::landmarks::{Landmark, PoseFrame, PoseLandmark, LANDMARK_COUNT};
use std::f64::consts::PI;

const FPS: f64 = 30.0;
const REP_MS: f64 = 2_400.0;
const REPS: usize = 3;

fn frame_at(timestamp_ms: f64) -> PoseFrame {
    // 0 standing, 1 bottom of the squat
    let depth = 0.5 - 0.5 * (2.0 * PI * timestamp_ms / REP_MS).cos();
    let drop = 0.17 * depth;
    let lean = 0.06 * depth;
    // Hips travel back from the camera plane, knees forward
    let hip_z = 0.25 * depth;
    let knee_z = -0.05 * depth;

    let mut points = vec![Landmark::new(0.5, 0.5, 0.0).with_visibility(0.95); LANDMARK_COUNT];
    let mut set = |which: PoseLandmark, x: f64, y: f64, z: f64| {
        points[which.index()] = Landmark::new(x, y, z).with_visibility(0.95);
    };

    set(PoseLandmark::Nose, 0.53 + lean, 0.10 + drop, 0.0);
    set(PoseLandmark::LeftShoulder, 0.40 + lean, 0.25 + drop, 0.0);
    set(PoseLandmark::RightShoulder, 0.60 + lean, 0.25 + drop, 0.0);
    set(PoseLandmark::LeftElbow, 0.38 + lean, 0.40 + drop, 0.0);
    set(PoseLandmark::RightElbow, 0.62 + lean, 0.40 + drop, 0.0);
    set(PoseLandmark::LeftWrist, 0.38 + lean, 0.55 + drop, 0.0);
    set(PoseLandmark::RightWrist, 0.62 + lean, 0.55 + drop, 0.0);
    set(PoseLandmark::LeftHip, 0.44 - lean, 0.55 + drop, hip_z);
    set(PoseLandmark::RightHip, 0.56 - lean, 0.55 + drop, hip_z);
    set(PoseLandmark::LeftKnee, 0.45 - 0.02 * depth, 0.75, knee_z);
    set(PoseLandmark::RightKnee, 0.55 + 0.02 * depth, 0.75, knee_z);
    set(PoseLandmark::LeftAnkle, 0.44, 0.95, 0.0);
    set(PoseLandmark::RightAnkle, 0.56, 0.95, 0.0);

    PoseFrame::new(timestamp_ms, points)
}

fn main() {
    let frames = (REP_MS * REPS as f64 / 1_000.0 * FPS) as usize;
    for i in 0..frames {
        let frame = frame_at(i as f64 * 1_000.0 / FPS);
        match serde_json::to_string(&frame) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Error: {e:?}"),
        }
    }
}
