//! Engine configuration.

use crate::effect::EffectKind;
use crate::error::RouteError;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// What capture does once its route reaches `max_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityPolicy {
    /// Keep scanning, skip appends, report once
    #[default]
    Skip,

    /// Stop capturing; the route stays selected
    Stop,
}

/// Configuration for a route engine.
///
/// Field names in TOML are kebab-case; the legacy plugin keys
/// (`linefollow-point-distance`, `line-particle-spacing`,
/// `default-particle`) are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Minimum movement before capture appends a point (default: 2.0)
    #[serde(alias = "linefollow-point-distance")]
    pub line_follow_distance: f64,

    /// Distance between trail particles (default: 0.5)
    #[serde(alias = "line-particle-spacing")]
    pub particle_spacing: f64,

    /// Most trail particles drawn between two points in one tick; longer
    /// legs are drawn sparser (default: 256)
    pub max_leg_particles: usize,

    /// Seconds between session ticks (default: 1)
    pub tick_interval_seconds: u32,

    /// Base scheduler clock in Hz (default: 20)
    pub base_tick_hz: u32,

    /// Per-route point limit (default: 1000)
    pub max_points: usize,

    /// Effect given to new routes (default: FLAME)
    #[serde(alias = "default-particle")]
    pub default_effect: String,

    /// Behaviour when capture hits `max_points` (default: skip)
    pub capacity_policy: CapacityPolicy,

    /// Playback progress notice every N points, 0 disables (default: 50)
    pub progress_interval: usize,

    /// Particles in a capture feedback pulse (default: 5)
    pub capture_feedback_count: u32,

    /// Particles at each playback target (default: 5)
    pub playback_effect_count: u32,

    /// Draw the dense trail toward the next point during playback (default: true)
    pub playback_trail: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            line_follow_distance: 2.0,
            particle_spacing: 0.5,
            max_leg_particles: 256,
            tick_interval_seconds: 1,
            base_tick_hz: 20,
            max_points: 1000,
            default_effect: EffectKind::Flame.name().to_string(),
            capacity_policy: CapacityPolicy::Skip,
            progress_interval: 50,
            capture_feedback_count: 5,
            playback_effect_count: 5,
            playback_trail: true,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, RouteError> {
        let config: Self = toml::from_str(source)
            .map_err(|e| RouteError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks numeric ranges.
    ///
    /// An unknown `default_effect` is not an error here; see
    /// [`EngineConfig::default_effect_kind`].
    pub fn validate(&self) -> Result<(), RouteError> {
        if !(self.line_follow_distance.is_finite() && self.line_follow_distance >= 0.0) {
            return Err(RouteError::config(format!(
                "line-follow-distance must be a non-negative number, got {}",
                self.line_follow_distance
            )));
        }
        if !(self.particle_spacing.is_finite() && self.particle_spacing > 0.0) {
            return Err(RouteError::config(format!(
                "particle-spacing must be positive, got {}",
                self.particle_spacing
            )));
        }
        if self.max_leg_particles == 0 {
            return Err(RouteError::config("max-leg-particles must be at least 1"));
        }
        if self.tick_interval_seconds == 0 {
            return Err(RouteError::config("tick-interval-seconds must be at least 1"));
        }
        if self.base_tick_hz == 0 {
            return Err(RouteError::config("base-tick-hz must be at least 1"));
        }
        if self.max_points == 0 {
            return Err(RouteError::config("max-points must be at least 1"));
        }
        Ok(())
    }

    /// Resolves `default_effect`, logging and falling back to FLAME when it
    /// is unknown.
    pub fn default_effect_kind(&self) -> EffectKind {
        let resolved = EffectKind::resolve(&self.default_effect, EffectKind::Flame);
        if let Some(err) = resolved.rejected {
            warn!("default-effect: {}, using {}", err, resolved.kind);
        }
        resolved.kind
    }

    /// Base ticks between two session ticks.
    pub fn session_period_ticks(&self) -> u64 {
        (self.tick_interval_seconds as u64 * self.base_tick_hz as u64).max(1)
    }

    /// Wall time of one base tick.
    pub fn base_tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.base_tick_hz.max(1) as f64)
    }

    pub fn with_line_follow_distance(mut self, distance: f64) -> Self {
        self.line_follow_distance = distance;
        self
    }

    pub fn with_particle_spacing(mut self, spacing: f64) -> Self {
        self.particle_spacing = spacing;
        self
    }

    pub fn with_max_leg_particles(mut self, limit: usize) -> Self {
        self.max_leg_particles = limit;
        self
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    pub fn with_capacity_policy(mut self, policy: CapacityPolicy) -> Self {
        self.capacity_policy = policy;
        self
    }

    pub fn with_tick_interval(mut self, seconds: u32, base_tick_hz: u32) -> Self {
        self.tick_interval_seconds = seconds;
        self.base_tick_hz = base_tick_hz;
        self
    }

    pub fn with_default_effect(mut self, effect: impl Into<String>) -> Self {
        self.default_effect = effect.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.line_follow_distance, 2.0);
        assert_eq!(config.particle_spacing, 0.5);
        assert_eq!(config.tick_interval_seconds, 1);
        assert_eq!(config.max_points, 1000);
        assert_eq!(config.max_leg_particles, 256);
        assert_eq!(config.session_period_ticks(), 20);
        assert_eq!(config.base_tick_duration(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml_str(
            r#"
            line-follow-distance = 3.5
            max-points = 12
            capacity-policy = "stop"
            "#,
        )
        .unwrap();

        assert_eq!(config.line_follow_distance, 3.5);
        assert_eq!(config.max_points, 12);
        assert_eq!(config.capacity_policy, CapacityPolicy::Stop);
        assert_eq!(config.particle_spacing, 0.5);
    }

    #[test]
    fn test_legacy_keys() {
        let config = EngineConfig::from_toml_str(
            r#"
            linefollow-point-distance = 4.0
            line-particle-spacing = 0.25
            default-particle = "heart"
            "#,
        )
        .unwrap();

        assert_eq!(config.line_follow_distance, 4.0);
        assert_eq!(config.particle_spacing, 0.25);
        assert_eq!(config.default_effect_kind(), EffectKind::Heart);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml_str("particle-spacing = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("max-points = 0").is_err());
        assert!(EngineConfig::from_toml_str("max-leg-particles = 0").is_err());
        assert!(EngineConfig::from_toml_str("tick-interval-seconds = 0").is_err());
        assert!(EngineConfig::from_toml_str("line-follow-distance = -1.0").is_err());
        assert!(EngineConfig::from_toml_str("line-follow-distance = \"far\"").is_err());
    }

    #[test]
    fn test_unknown_default_effect_falls_back() {
        let config = EngineConfig::default().with_default_effect("SPARKLES");
        assert!(config.validate().is_ok());
        assert_eq!(config.default_effect_kind(), EffectKind::Flame);
    }
}
