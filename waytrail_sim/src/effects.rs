//! Recording sinks for effects and rewards.
//!
//! Nothing is drawn in simulation; every call is appended to a log the
//! scenarios assert against and the exporter writes out.

use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use waytrail_env::{EffectEmitter, Location, OperatorId, RewardSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// One effect emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub effect: String,
    pub location: Location,
    pub count: u32,
}

/// Effect emitter that records instead of drawing.
#[derive(Debug, Default)]
pub struct RecordingEffects {
    emissions: Mutex<Vec<Emission>>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of emit calls so far.
    pub fn len(&self) -> usize {
        lock(&self.emissions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all particle counts.
    pub fn total_count(&self) -> u64 {
        lock(&self.emissions).iter().map(|e| e.count as u64).sum()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Emission> {
        std::mem::take(&mut *lock(&self.emissions))
    }

    /// Everything recorded from index `start` on.
    pub fn since(&self, start: usize) -> Vec<Emission> {
        let emissions = lock(&self.emissions);
        emissions[start.min(emissions.len())..].to_vec()
    }
}

impl EffectEmitter for RecordingEffects {
    fn emit(&self, effect: &str, position: &Location, count: u32) {
        lock(&self.emissions).push(Emission {
            effect: effect.to_string(),
            location: position.clone(),
            count,
        });
    }
}

/// Firework shapes a reward can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireworkShape {
    Ball,
    BallLarge,
    Star,
    Burst,
    Creeper,
}

impl FireworkShape {
    pub const ALL: [FireworkShape; 5] = [
        FireworkShape::Ball,
        FireworkShape::BallLarge,
        FireworkShape::Star,
        FireworkShape::Burst,
        FireworkShape::Creeper,
    ];
}

/// Randomized look of one completion firework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireworkStyle {
    pub shape: FireworkShape,

    /// Burst color (RGB)
    pub color: [u8; 3],

    /// Fade color (RGB)
    pub fade: [u8; 3],

    pub flicker: bool,
    pub trail: bool,

    /// Flight power, always 1
    pub power: u8,
}

impl FireworkStyle {
    /// Draws a style from `rng`.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let shape = FireworkShape::ALL[rng.gen_range(0..FireworkShape::ALL.len())];
        let mut rgb = || [rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()];
        let color = rgb();
        let fade = rgb();

        Self {
            shape,
            color,
            fade,
            flicker: rng.gen_bool(0.5),
            trail: rng.gen_bool(0.5),
            power: 1,
        }
    }
}

/// A reward that was fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Reward {
    pub operator: OperatorId,
    pub location: Location,
    pub style: FireworkStyle,
}

impl Reward {
    pub fn position(&self) -> Vector3<f64> {
        self.location.position
    }
}

/// Reward sink that records a randomly styled firework per completion.
pub struct RecordingRewards {
    rng: Mutex<ChaCha8Rng>,
    rewards: Mutex<Vec<Reward>>,
}

impl RecordingRewards {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            rng: Mutex::new(rng),
            rewards: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.rewards).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewards fired for one operator.
    pub fn for_operator(&self, operator: OperatorId) -> Vec<Reward> {
        lock(&self.rewards)
            .iter()
            .filter(|r| r.operator == operator)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Reward> {
        lock(&self.rewards).clone()
    }
}

impl RewardSink for RecordingRewards {
    fn celebrate(&self, operator: OperatorId, position: &Location) {
        let style = FireworkStyle::random(&mut *lock(&self.rng));
        tracing::debug!(
            "Firework {:?} for {} at {}",
            style.shape,
            operator,
            position
        );
        lock(&self.rewards).push(Reward {
            operator,
            location: position.clone(),
            style,
        });
    }
}
