//! Session configuration
//!
//! Everything tunable about a coaching session lives in [`CoachConfig`]. The
//! defaults reproduce the reference behavior; a host can ship overrides as
//! JSON and only needs to list the fields it changes.

use crate::error::CoachError;
use crate::guard::GuardLimits;
use crate::smoothing::SmoothingConfig;
use crate::voice::SpeechSettings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_FLUSH_INTERVAL_MS: f64 = 5_000.0;
pub const DEFAULT_LATENCY_WINDOW: usize = 200;
pub const DEFAULT_TRUST_SCORE: f64 = 100.0;

/// Power/performance trade-off; selects how many detector frames are skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    Quality,
    #[default]
    Balanced,
    PowerSaver,
}

impl PerformanceMode {
    /// Process every Nth detector frame
    pub fn decimation(&self) -> u64 {
        match self {
            PerformanceMode::Quality => 4,
            PerformanceMode::Balanced => 6,
            PerformanceMode::PowerSaver => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceMode::Quality => "quality",
            PerformanceMode::Balanced => "balanced",
            PerformanceMode::PowerSaver => "power_saver",
        }
    }
}

impl FromStr for PerformanceMode {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quality" => Ok(PerformanceMode::Quality),
            "balanced" => Ok(PerformanceMode::Balanced),
            "power_saver" => Ok(PerformanceMode::PowerSaver),
            other => Err(CoachError::ConfigError(format!(
                "unknown performance mode '{}', expected quality, balanced or power_saver",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// Severity smoothing for the on-screen color
    pub display_smoothing: SmoothingConfig,
    /// Severity smoothing for deciding whether to speak
    pub cue_smoothing: SmoothingConfig,
    pub guard_limits: GuardLimits,
    pub performance_mode: PerformanceMode,
    /// Opportunistic buffer flush period on the frame clock
    pub flush_interval_ms: f64,
    /// Processed frames kept for latency percentiles
    pub latency_window: usize,
    pub speech: SpeechSettings,
    /// Master switch for realtime coaching cues
    pub allow_realtime: bool,
    /// Externally supplied trust in the session signal, 0-100
    pub trust_score: f64,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            display_smoothing: SmoothingConfig::default(),
            cue_smoothing: SmoothingConfig::default(),
            guard_limits: GuardLimits::default(),
            performance_mode: PerformanceMode::default(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            latency_window: DEFAULT_LATENCY_WINDOW,
            speech: SpeechSettings::default(),
            allow_realtime: true,
            trust_score: DEFAULT_TRUST_SCORE,
        }
    }
}

impl CoachConfig {
    pub fn validate(&self) -> Result<(), CoachError> {
        self.display_smoothing.validate("display_smoothing")?;
        self.cue_smoothing.validate("cue_smoothing")?;
        self.guard_limits.validate()?;
        self.speech.validate()?;

        if !(self.flush_interval_ms.is_finite() && self.flush_interval_ms > 0.0) {
            return Err(CoachError::ConfigError(
                "flush_interval_ms must be positive".to_string(),
            ));
        }
        if self.latency_window == 0 {
            return Err(CoachError::ConfigError(
                "latency_window must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.trust_score) {
            return Err(CoachError::ConfigError(format!(
                "trust_score must be within 0-100, got {}",
                self.trust_score
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, CoachError> {
        let config: CoachConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, CoachError> {
        serde_json::to_string_pretty(self).map_err(CoachError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = CoachConfig::default();

        assert_eq!(config.display_smoothing.window_ms, 450.0);
        assert_eq!(config.cue_smoothing.min_switch_interval_ms, 400.0);
        assert_eq!(config.performance_mode.decimation(), 6);
        assert_eq!(config.guard_limits.shoulder.min, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CoachConfig::from_json(
            r#"{"performance_mode": "power_saver", "cue_smoothing": {"window_ms": 600}}"#,
        )
        .unwrap();

        assert_eq!(config.performance_mode, PerformanceMode::PowerSaver);
        assert_eq!(config.cue_smoothing.window_ms, 600.0);
        assert_eq!(config.cue_smoothing.min_switch_interval_ms, 400.0);
        assert_eq!(config.display_smoothing, SmoothingConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let config = CoachConfig {
            trust_score: 55.0,
            ..CoachConfig::default()
        };
        let loaded = CoachConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CoachConfig::from_json(r#"{"trust_score": 140}"#),
            Err(CoachError::ConfigError(_))
        ));
        assert!(matches!(
            CoachConfig::from_json(r#"{"latency_window": 0}"#),
            Err(CoachError::ConfigError(_))
        ));
        assert!(matches!(
            CoachConfig::from_json(r#"{"performance_mode": "turbo"}"#),
            Err(CoachError::JsonError(_))
        ));
    }

    #[test]
    fn test_decimation_factors() {
        assert_eq!(PerformanceMode::Quality.decimation(), 4);
        assert_eq!(PerformanceMode::PowerSaver.decimation(), 8);
    }
}
