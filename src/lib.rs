//! RepSense - On-device real-time exercise form coaching
//!
//! RepSense turns a per-frame stream of pose landmarks into a stabilized
//! technique signal, a biomechanical risk assessment, a load and fatigue
//! estimate and a rate-limited stream of spoken cues, all within one video
//! frame: angles → technique → smoothing → biomechanics → kinematics/load →
//! safety guard → feedback → voice.
//!
//! ## Modules
//!
//! - **Frame pipeline**: [`pipeline::EdgePipeline`] with explicit per-session state
//! - **Coaching runtime**: [`session::CoachSession`], cue scheduling and buffered persistence

pub mod biomechanics;
pub mod buffer;
pub mod config;
pub mod error;
pub mod feedback;
pub mod geometry;
pub mod guard;
pub mod kinematics;
pub mod landmarks;
pub mod pipeline;
pub mod session;
pub mod smoothing;
pub mod storage;
pub mod technique;
pub mod telemetry;
pub mod template;
pub mod types;
pub mod voice;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{CoachConfig, PerformanceMode};
pub use error::CoachError;
pub use landmarks::{Landmark, PoseFrame, PoseLandmark};
pub use pipeline::{analyze_frames, EdgePipeline, PipelineOutput, SessionState};
pub use session::{CoachEngine, CoachSession, FrameOutcome, SharedCoachSession};
pub use storage::{CoachStore, InMemoryStore, JsonLinesStore, StoreRow};
pub use template::ExerciseTemplate;
pub use voice::{SpeechCapability, VoiceCueScheduler};

/// Engine version recorded with every session
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for stored session metadata and CLI output
pub const PRODUCER_NAME: &str = "repsense";
