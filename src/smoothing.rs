//! Severity smoothing with hysteresis
//!
//! Raw per-frame severities are averaged over a trailing time window and the
//! average is mapped back to a tier. A change of the stable tier is accepted
//! only after a minimum interval since the previous accepted change; inside
//! that lockout the stable tier holds and the newest sample's own tier is
//! reported as the interim value.
//!
//! The display path and the cue-gating path each own a separate window.

use crate::error::CoachError;
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_WINDOW_MS: f64 = 450.0;
pub const DEFAULT_MIN_SWITCH_INTERVAL_MS: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Samples older than this, relative to the newest, are pruned
    pub window_ms: f64,
    /// Minimum time between two accepted stable-tier changes
    pub min_switch_interval_ms: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            min_switch_interval_ms: DEFAULT_MIN_SWITCH_INTERVAL_MS,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self, name: &str) -> Result<(), CoachError> {
        if !(self.window_ms.is_finite() && self.window_ms > 0.0) {
            return Err(CoachError::ConfigError(format!(
                "{}.window_ms must be positive",
                name
            )));
        }
        if !(self.min_switch_interval_ms.is_finite() && self.min_switch_interval_ms >= 0.0) {
            return Err(CoachError::ConfigError(format!(
                "{}.min_switch_interval_ms must be non-negative",
                name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct SeveritySample {
    timestamp_ms: f64,
    value: f64,
}

/// Result of pushing one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmoothedSeverity {
    /// Tier after hysteresis
    pub stable: Severity,
    /// Stable tier, or the newest sample's tier while a change is locked out
    pub interim: Severity,
    /// True when this sample caused an accepted change
    pub switched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityWindow {
    config: SmoothingConfig,
    samples: VecDeque<SeveritySample>,
    stable: Severity,
    last_switch_ms: Option<f64>,
}

impl Default for SeverityWindow {
    fn default() -> Self {
        Self::new(SmoothingConfig::default())
    }
}

impl SeverityWindow {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
            stable: Severity::Green,
            last_switch_ms: None,
        }
    }

    pub fn stable(&self) -> Severity {
        self.stable
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, severity: Severity, timestamp_ms: f64) -> SmoothedSeverity {
        self.samples.push_back(SeveritySample {
            timestamp_ms,
            value: severity.score(),
        });
        let cutoff = timestamp_ms - self.config.window_ms;
        while self
            .samples
            .front()
            .is_some_and(|sample| sample.timestamp_ms < cutoff)
        {
            self.samples.pop_front();
        }

        let average =
            self.samples.iter().map(|s| s.value).sum::<f64>() / self.samples.len() as f64;
        let candidate = Severity::from_score(average);

        if candidate == self.stable {
            return SmoothedSeverity {
                stable: self.stable,
                interim: self.stable,
                switched: false,
            };
        }

        let unlocked = match self.last_switch_ms {
            Some(last) => timestamp_ms - last >= self.config.min_switch_interval_ms,
            None => true,
        };

        if unlocked {
            self.stable = candidate;
            self.last_switch_ms = Some(timestamp_ms);
            SmoothedSeverity {
                stable: candidate,
                interim: candidate,
                switched: true,
            }
        } else {
            SmoothedSeverity {
                stable: self.stable,
                interim: severity,
                switched: false,
            }
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.stable = Severity::Green;
        self.last_switch_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_red_switches_immediately() {
        let mut window = SeverityWindow::default();
        let out = window.push(Severity::Red, 0.0);

        assert_eq!(out.stable, Severity::Red);
        assert!(out.switched);
    }

    #[test]
    fn test_samples_outside_window_are_pruned() {
        let mut window = SeverityWindow::default();
        window.push(Severity::Red, 0.0);
        window.push(Severity::Red, 100.0);
        window.push(Severity::Green, 600.0);

        assert_eq!(window.len(), 1);
        assert_eq!(window.stable(), Severity::Green);
    }

    #[test]
    fn test_change_inside_lockout_holds_stable_and_reports_interim() {
        let mut window = SeverityWindow::default();
        window.push(Severity::Red, 0.0);
        window.push(Severity::Green, 100.0);
        window.push(Severity::Green, 200.0);
        // Average now 0.25 -> green candidate, but only 300 ms since the switch
        let out = window.push(Severity::Green, 300.0);

        assert_eq!(out.stable, Severity::Red);
        assert_eq!(out.interim, Severity::Green);
        assert!(!out.switched);

        let out = window.push(Severity::Green, 400.0);
        assert_eq!(out.stable, Severity::Green);
        assert!(out.switched);
    }

    #[test]
    fn test_oscillation_changes_at_most_once_per_interval() {
        let mut window = SeverityWindow::default();
        let mut last_stable = window.stable();
        let mut last_change: Option<f64> = None;

        for i in 0..120 {
            let t = i as f64 * 33.0;
            let raw = if i % 2 == 0 { Severity::Red } else { Severity::Green };
            let out = window.push(raw, t);
            if out.stable != last_stable {
                if let Some(previous) = last_change {
                    assert!(t - previous >= 400.0, "changed at {} after {}", t, previous);
                }
                last_change = Some(t);
                last_stable = out.stable;
            }
        }
    }

    #[test]
    fn test_zero_interval_follows_average() {
        let mut window = SeverityWindow::new(SmoothingConfig {
            window_ms: 450.0,
            min_switch_interval_ms: 0.0,
        });
        window.push(Severity::Red, 0.0);
        let out = window.push(Severity::Green, 10.0);
        // Average 0.5 -> yellow, accepted straight away
        assert_eq!(out.stable, Severity::Yellow);
    }

    #[test]
    fn test_reset() {
        let mut window = SeverityWindow::default();
        window.push(Severity::Red, 0.0);
        window.reset();
        assert!(window.is_empty());
        assert_eq!(window.stable(), Severity::Green);
    }

    #[test]
    fn test_invalid_config() {
        let config = SmoothingConfig {
            window_ms: 0.0,
            ..SmoothingConfig::default()
        };
        assert!(config.validate("display_smoothing").is_err());
    }
}
