//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::effects::{RecordingEffects, RecordingRewards};
use crate::walker::Walkers;

use nalgebra::Vector3;
use std::sync::Arc;
use std::time::Duration;
use waytrail_core::{EngineConfig, EngineEvent, RouteCatalog, RouteEngine, RouteError};
use waytrail_env::OperatorId;

/// Engine type the simulation drives.
pub type SimEngine = RouteEngine<Walkers, RecordingEffects, RecordingRewards>;

/// Stream ids for [`SimContext::derive_rng`].
const WALKER_STREAM: u64 = 1;
const REWARD_STREAM: u64 = 2;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of operators to spawn
    pub num_operators: usize,

    /// Walking speed in units per second
    pub walk_speed: f64,

    /// Sideways wobble standard deviation per base tick
    pub jitter_std: f64,

    /// Engine settings under test
    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_operators: 4,
            walk_speed: 4.0,
            jitter_std: 0.05,
            engine: EngineConfig::default(),
        }
    }
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Ground truth operator movement
    pub walkers: Arc<Walkers>,

    /// Every effect the engine emitted
    pub effects: Arc<RecordingEffects>,

    /// Every completion reward
    pub rewards: Arc<RecordingRewards>,

    /// The engine under test
    pub engine: SimEngine,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, RouteError> {
        let context = SimContext::shared(config.seed);
        let walkers = Arc::new(Walkers::new(
            context.derive_rng(WALKER_STREAM),
            config.jitter_std,
        ));
        let effects = Arc::new(RecordingEffects::new());
        let rewards = Arc::new(RecordingRewards::new(context.derive_rng(REWARD_STREAM)));

        let engine = RouteEngine::new(
            config.engine.clone(),
            RouteCatalog::new(),
            walkers.clone(),
            effects.clone(),
            rewards.clone(),
        )?;

        Ok(Self {
            config,
            context,
            walkers,
            effects,
            rewards,
            engine,
            tick_count: 0,
        })
    }

    /// Spawns the configured operators, each on its own lap.
    pub fn spawn_operators(&self) -> Vec<OperatorId> {
        (0..self.config.num_operators)
            .map(|i| self.spawn_operator(i))
            .collect()
    }

    /// Spawns operator `index` on a 20-unit square lap with its corner at
    /// `x = 40·index`. The operator starts walking on the next tick.
    pub fn spawn_operator(&self, index: usize) -> OperatorId {
        let operator = OperatorId::from_seed(index as u64 + 1);
        let origin = Vector3::new(40.0 * index as f64, 64.0, 0.0);
        self.walkers.spawn(
            operator,
            "world",
            origin,
            square(origin, 20.0),
            self.config.walk_speed,
        );
        operator
    }

    /// Seconds of virtual time per base tick.
    pub fn dt(&self) -> f64 {
        self.engine.config().base_tick_duration().as_secs_f64()
    }

    /// Ticks per session tick.
    pub fn session_period(&self) -> u64 {
        self.engine.config().session_period_ticks()
    }

    /// Runs one base tick: walkers move, the clock moves, the engine runs.
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let dt = self.dt();
        self.walkers.step(dt);
        self.context.advance_time(Duration::from_secs_f64(dt));
        self.tick_count += 1;
        self.engine.advance()
    }

    /// Runs `n` base ticks and returns every event in order.
    pub fn run_ticks(&mut self, n: u64) -> Vec<EngineEvent> {
        (0..n).flat_map(|_| self.tick()).collect()
    }

    /// Runs `n` full session periods.
    pub fn run_sessions(&mut self, n: u64) -> Vec<EngineEvent> {
        let ticks = n * self.session_period();
        self.run_ticks(ticks)
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Virtual time in seconds.
    pub fn time_secs(&self) -> f64 {
        self.context.time_ns() as f64 / 1e9
    }
}

/// Corners of a square lap starting and ending at `origin`.
pub fn square(origin: Vector3<f64>, side: f64) -> Vec<Vector3<f64>> {
    vec![
        origin + Vector3::new(side, 0.0, 0.0),
        origin + Vector3::new(side, 0.0, side),
        origin + Vector3::new(0.0, 0.0, side),
        origin,
    ]
}
