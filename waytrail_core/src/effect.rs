//! Visualization effect kinds a route can be drawn with.

use crate::error::RouteError;
use std::str::FromStr;

/// Particle effect used to draw a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EffectKind {
    #[default]
    Flame,
    SoulFireFlame,
    EndRod,
    Heart,
    Crit,
    Smoke,
    Cloud,
    Note,
    Portal,
    HappyVillager,
    ElectricSpark,
}

/// Outcome of validating a configured or stored effect name.
#[derive(Debug)]
pub struct ResolvedEffect {
    /// The effect to use
    pub kind: EffectKind,

    /// Set when the requested name was rejected and `kind` is the fallback
    pub rejected: Option<RouteError>,
}

impl EffectKind {
    /// Every known effect, in display order.
    pub const ALL: [EffectKind; 11] = [
        EffectKind::Flame,
        EffectKind::SoulFireFlame,
        EffectKind::EndRod,
        EffectKind::Heart,
        EffectKind::Crit,
        EffectKind::Smoke,
        EffectKind::Cloud,
        EffectKind::Note,
        EffectKind::Portal,
        EffectKind::HappyVillager,
        EffectKind::ElectricSpark,
    ];

    /// Returns the canonical effect name.
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Flame => "FLAME",
            EffectKind::SoulFireFlame => "SOUL_FIRE_FLAME",
            EffectKind::EndRod => "END_ROD",
            EffectKind::Heart => "HEART",
            EffectKind::Crit => "CRIT",
            EffectKind::Smoke => "SMOKE",
            EffectKind::Cloud => "CLOUD",
            EffectKind::Note => "NOTE",
            EffectKind::Portal => "PORTAL",
            EffectKind::HappyVillager => "HAPPY_VILLAGER",
            EffectKind::ElectricSpark => "ELECTRIC_SPARK",
        }
    }

    /// Validates `name`, falling back to `fallback` if it is unknown.
    ///
    /// The caller decides how to surface `rejected`; it is never swallowed
    /// here.
    pub fn resolve(name: &str, fallback: EffectKind) -> ResolvedEffect {
        match name.parse() {
            Ok(kind) => ResolvedEffect { kind, rejected: None },
            Err(err) => ResolvedEffect {
                kind: fallback,
                rejected: Some(err),
            },
        }
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EffectKind {
    type Err = RouteError;

    /// Case-insensitive; `-` and spaces are read as `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace(['-', ' '], "_");
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| RouteError::config(format!("unknown effect {:?}", s)))
    }
}
