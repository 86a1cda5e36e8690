//! Scenario runner - executes route engine scenarios against a SimWorld.

use crate::exporter::TrailExport;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use waytrail_core::geometry::location_distance;
use waytrail_core::{lock_route, CapacityPolicy, CaptureState, EngineConfig, EngineEvent, PlaybackState};
use waytrail_env::{OperatorId, PositionProvider};
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total base ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Routes left in the catalog at the end
    pub final_route_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioMetrics {
    /// Points appended by line follow
    pub points_captured: u64,

    /// Route-full notices
    pub capacity_notices: u64,

    /// Emit calls made by the engine
    pub effects_emitted: usize,

    /// Sum of particle counts over all emit calls
    pub particles: u64,

    /// Playbacks that reached the end
    pub completions: u64,

    /// Sessions ended by a deleted route
    pub vanished: u64,

    /// Rewards fired
    pub rewards: usize,
}

/// Runs route engine scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Operators in crowd scenarios
    num_operators: usize,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Engine settings for every run
    engine: EngineConfig,

    /// Base ticks between exported frames
    export_interval: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_operators: usize) -> Self {
        Self {
            seed,
            num_operators: num_operators.max(2),
            max_duration_secs: 120.0,
            engine: EngineConfig::default(),
            export_interval: 10,
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the engine configuration under test.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
    }

    /// Runs a scenario and records frames for export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, TrailExport) {
        let mut export = TrailExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some(&mut export));
        (result, export)
    }

    fn execute(&self, scenario: ScenarioId, export: Option<&mut TrailExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut engine = self.engine.clone();
        if scenario == ScenarioId::CapacityLimit {
            engine = engine.with_max_points(3);
        }
        let config = SimConfig {
            seed: self.seed,
            num_operators: self.num_operators,
            engine,
            ..Default::default()
        };

        let world = match SimWorld::new(config) {
            Ok(world) => world,
            Err(err) => {
                warn!("Scenario {} could not start: {}", scenario.name(), err);
                return ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    total_ticks: 0,
                    final_time_secs: 0.0,
                    final_route_count: 0,
                    failure_reason: Some(err.to_string()),
                    metrics: ScenarioMetrics::default(),
                };
            }
        };

        let max_ticks = (self.max_duration_secs * world.config.engine.base_tick_hz as f64) as u64;
        let mut run = Run {
            world,
            export,
            events: Vec::new(),
            failures: Vec::new(),
            export_interval: self.export_interval.max(1),
            emitted_seen: 0,
            pending_events: Vec::new(),
            max_ticks,
        };

        match scenario {
            ScenarioId::WalkAndRecord => self.run_walk_and_record(&mut run),
            ScenarioId::Replay => self.run_replay(&mut run),
            ScenarioId::RouteVanished => self.run_route_vanished(&mut run),
            ScenarioId::CapacityLimit => self.run_capacity_limit(&mut run),
            ScenarioId::PauseResume => self.run_pause_resume(&mut run),
            ScenarioId::Crowd => self.run_crowd(&mut run),
            ScenarioId::Disconnect => self.run_disconnect(&mut run),
        }

        run.finish(scenario, self.seed)
    }

    /// SCN-001: WalkAndRecord - line follow over one lap.
    fn run_walk_and_record(&self, run: &mut Run<'_>) {
        let op = run.world.spawn_operator(0);
        run.record(op, "lap");
        run.walk_out();

        let threshold = run.world.engine.config().line_follow_distance;
        let points = run.points("lap");
        run.check(points.len() >= 2, format!("only {} points captured", points.len()));

        let too_close = points
            .windows(2)
            .filter_map(|pair| location_distance(&pair[0], &pair[1]))
            .filter(|d| *d < threshold)
            .count();
        run.check(too_close == 0, format!("{} consecutive points closer than {}", too_close, threshold));

        // Standing still captures nothing
        run.sessions(1);
        let settled = run.route_size("lap");
        run.sessions(5);
        let after = run.route_size("lap");
        run.check(settled == after, format!("idle operator grew route {} -> {}", settled, after));

        run.command(op, "/route edit linefollowpause");
        run.check(
            run.world.engine.capture_state(op) == CaptureState::Paused,
            "capture not paused",
        );
        run.command(op, "/route edit deselect");
        run.check(run.world.engine.registered_tasks() == 0, "registrations left after deselect");

        info!("  Captured {} points over {:.1}s", after, run.world.time_secs());
    }

    /// SCN-002: Replay - follow a recorded lap to the reward.
    fn run_replay(&self, run: &mut Run<'_>) {
        let op = run.world.spawn_operator(0);
        run.record(op, "lap");
        run.walk_out();
        run.command(op, "/route edit deselect");

        let n = run.route_size("lap") as u64;
        let period = run.world.session_period();
        run.command(op, "/route follow start lap");

        // Session tick k fires at base tick start + 1 + (k - 1) * period
        let before_last = run.ticks(n.saturating_sub(1) * period);
        run.check(
            !before_last.iter().any(|e| matches!(e, EngineEvent::PlaybackCompleted { .. })),
            "playback completed early",
        );
        run.check(
            run.world.engine.playback_cursor(op) == Some(n.saturating_sub(1) as usize),
            format!("cursor {:?} before the last point of {}", run.world.engine.playback_cursor(op), n),
        );

        let last = run.ticks(1);
        run.check(
            last.iter().any(|e| matches!(e, EngineEvent::PlaybackCompleted { operator, .. } if *operator == op)),
            format!("playback of {} points did not complete on session tick {}", n, n),
        );

        let extra = run.sessions(1);
        run.check(extra.is_empty(), "events after completion");
        run.check(run.world.rewards.len() == 1, format!("{} rewards fired", run.world.rewards.len()));

        if let (Some(reward), Ok(here)) = (
            run.world.rewards.for_operator(op).first(),
            run.world.walkers.current_position(op),
        ) {
            run.check(reward.location == here, "reward not at the operator");
        }
    }

    /// SCN-003: RouteVanished - deleting a followed route ends only that session.
    fn run_route_vanished(&self, run: &mut Run<'_>) {
        let a = run.world.spawn_operator(0);
        let b = run.world.spawn_operator(1);
        run.record(a, "lap_a");
        run.record(b, "lap_b");
        run.walk_out();
        run.command(a, "/route edit deselect");
        run.command(b, "/route edit deselect");

        run.command(a, "/route follow start lap_a");
        run.command(b, "/route follow start lap_b");
        run.sessions(2);

        run.command(b, "/route delete lap_a");
        let events = run.sessions(1);

        run.check(
            events.iter().any(|e| matches!(e, EngineEvent::PlaybackVanished { operator, .. } if *operator == a)),
            "deleted route did not end its playback",
        );
        run.check(
            !events.iter().any(|e| e.operator() == b && !matches!(e, EngineEvent::PlaybackProgress { .. })),
            "other follower was affected",
        );
        run.check(run.world.engine.playback_cursor(a).is_none(), "vanished session still present");
        run.check(run.world.engine.playback_cursor(b).is_some(), "other follower stopped early");

        let done = run.until(|world| world.engine.playback_cursor(b).is_none());
        run.check(done, "second playback never finished");
        run.check(run.world.rewards.for_operator(a).is_empty(), "reward for a vanished route");
        run.check(run.world.rewards.for_operator(b).len() == 1, "missing reward for the finished route");
    }

    /// SCN-004: CapacityLimit - the route never exceeds its limit.
    fn run_capacity_limit(&self, run: &mut Run<'_>) {
        let op = run.world.spawn_operator(0);
        run.record(op, "lap");
        run.walk_out();

        let size = run.route_size("lap");
        run.check(size == 3, format!("route holds {} points, limit is 3", size));

        let notices = run
            .events
            .iter()
            .filter(|e| matches!(e, EngineEvent::CaptureFull { .. }))
            .count();
        run.check(notices == 1, format!("{} capacity notices", notices));

        let expected = match run.world.engine.config().capacity_policy {
            CapacityPolicy::Skip => CaptureState::Capturing,
            CapacityPolicy::Stop => CaptureState::Selected,
        };
        let state = run.world.engine.capture_state(op);
        run.check(state == expected, format!("capture ended {:?}, expected {:?}", state, expected));

        // Manual add is refused too
        let refused = run.world.engine.execute_line(op, "/route edit point add").is_err();
        run.check(refused, "manual add exceeded the limit");
    }

    /// SCN-005: PauseResume - a paused playback does not move.
    fn run_pause_resume(&self, run: &mut Run<'_>) {
        let op = run.world.spawn_operator(0);
        run.record(op, "lap");
        run.walk_out();
        run.command(op, "/route edit deselect");

        run.command(op, "/route follow start lap");
        run.sessions(2);
        let cursor = run.world.engine.playback_cursor(op);
        run.command(op, "/route follow pause");

        let emitted = run.world.effects.len();
        run.sessions(3);
        run.check(run.world.engine.playback_cursor(op) == cursor, "cursor moved while paused");
        run.check(run.world.effects.len() == emitted, "effects emitted while paused");
        run.check(
            run.world.engine.playback_state(op) == Some(PlaybackState::Paused),
            "playback not paused",
        );

        run.command(op, "/route follow unpause");
        let done = run.until(|world| world.engine.playback_cursor(op).is_none());
        run.check(done, "playback never finished after resume");
        run.check(run.world.rewards.len() == 1, "expected exactly one reward");
    }

    /// SCN-006: Crowd - every operator records and replays concurrently.
    fn run_crowd(&self, run: &mut Run<'_>) {
        let operators = run.world.spawn_operators();
        let names: Vec<String> = (0..operators.len()).map(|i| format!("lap_{}", i)).collect();

        for (op, name) in operators.iter().zip(&names) {
            run.record(*op, name);
        }
        run.walk_out();

        for (op, name) in operators.iter().zip(&names) {
            run.command(*op, "/route edit deselect");
            run.command(*op, &format!("/route follow start {}", name));
        }

        let done = run.until(|world| operators.iter().all(|op| world.engine.playback_cursor(*op).is_none()));
        run.check(done, "not every playback finished");

        let max_points = run.world.engine.config().max_points;
        for (op, name) in operators.iter().zip(&names) {
            let size = run.route_size(name);
            run.check(size >= 2 && size <= max_points, format!("{} has {} points", name, size));
            let rewards = run.world.rewards.for_operator(*op).len();
            run.check(rewards == 1, format!("operator {} got {} rewards", op, rewards));
        }
        run.check(run.world.engine.registered_tasks() == 0, "registrations left over");

        info!("  {} operators finished their laps", operators.len());
    }

    /// SCN-007: Disconnect - leaving drops both sessions without a reward.
    fn run_disconnect(&self, run: &mut Run<'_>) {
        let a = run.world.spawn_operator(0);
        let b = run.world.spawn_operator(1);
        run.record(a, "lap_a");
        run.record(b, "lap_b");
        run.walk_out();

        // a keeps line follow running while following
        run.command(a, "/route follow start lap_a");
        run.command(b, "/route edit deselect");
        run.command(b, "/route follow start lap_b");
        run.sessions(2);

        run.world.walkers.set_online(a, false);
        run.check(run.world.walkers.current_position(a).is_err(), "offline operator still has a position");
        let dropped = run.world.engine.disconnect(a);
        run.check(dropped, "nothing to drop for the leaving operator");

        run.check(
            run.world.engine.capture_state(a) == CaptureState::Inactive,
            "capture survived disconnect",
        );
        run.check(run.world.engine.playback_cursor(a).is_none(), "playback survived disconnect");

        let done = run.until(|world| world.engine.playback_cursor(b).is_none());
        run.check(done, "remaining follower never finished");
        run.check(run.world.rewards.for_operator(a).is_empty(), "reward for a disconnected operator");
        run.check(run.world.rewards.for_operator(b).len() == 1, "missing reward for the staying operator");
        run.check(run.world.engine.registered_tasks() == 0, "registrations left over");
    }
}

/// State of one scenario execution.
struct Run<'a> {
    world: SimWorld,
    export: Option<&'a mut TrailExport>,
    events: Vec<EngineEvent>,
    failures: Vec<String>,
    export_interval: u64,
    emitted_seen: usize,
    pending_events: Vec<EngineEvent>,
    max_ticks: u64,
}

impl Run<'_> {
    fn tick(&mut self) -> Vec<EngineEvent> {
        let events = self.world.tick();
        self.events.extend(events.iter().cloned());

        if let Some(export) = self.export.as_deref_mut() {
            self.pending_events.extend(events.iter().cloned());
            if self.world.tick_count() % self.export_interval == 0 {
                let fresh = self.world.effects.since(self.emitted_seen);
                self.emitted_seen += fresh.len();
                export.add_frame(TrailExport::frame(
                    self.world.time_secs(),
                    self.world.tick_count(),
                    &self.world.walkers.positions(),
                    &fresh,
                    &self.pending_events,
                ));
                self.pending_events.clear();
            }
        }

        events
    }

    fn ticks(&mut self, n: u64) -> Vec<EngineEvent> {
        (0..n).flat_map(|_| self.tick()).collect()
    }

    fn sessions(&mut self, n: u64) -> Vec<EngineEvent> {
        let ticks = n * self.world.session_period();
        self.ticks(ticks)
    }

    /// Ticks until `done` holds or the time budget runs out.
    fn until(&mut self, mut done: impl FnMut(&SimWorld) -> bool) -> bool {
        while self.world.tick_count() < self.max_ticks {
            if done(&self.world) {
                return true;
            }
            self.tick();
        }
        let finished = done(&self.world);
        if !finished {
            warn!("Gave up after {} ticks", self.world.tick_count());
        }
        finished
    }

    /// Ticks until every walker has finished its path.
    fn walk_out(&mut self) {
        let walked = self.until(|world| world.walkers.all_idle());
        self.check(walked, "walkers did not finish their laps in time");
    }

    /// Creates `route` and starts line follow on it.
    fn record(&mut self, op: OperatorId, route: &str) {
        self.command(op, &format!("/route create {}", route));
        self.command(op, &format!("/route edit select {}", route));
        self.command(op, "/route edit linefollowstart");
    }

    fn command(&mut self, op: OperatorId, line: &str) {
        match self.world.engine.execute_line(op, line) {
            Ok(reply) => debug!("{} {} -> {}", op, line, reply),
            Err(err) => self.failures.push(format!("{} failed: {}", line, err)),
        }
    }

    fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            let message = message.into();
            warn!("Check failed: {}", message);
            self.failures.push(message);
        }
    }

    fn route_size(&self, name: &str) -> usize {
        self.world
            .engine
            .catalog()
            .get(name)
            .map(|route| lock_route(&route).size())
            .unwrap_or(0)
    }

    fn points(&self, name: &str) -> Vec<waytrail_env::Location> {
        self.world
            .engine
            .catalog()
            .get(name)
            .map(|route| lock_route(&route).points().to_vec())
            .unwrap_or_default()
    }

    fn finish(self, scenario: ScenarioId, seed: u64) -> ScenarioResult {
        let count = |f: fn(&EngineEvent) -> bool| self.events.iter().filter(|e| f(e)).count() as u64;
        let metrics = ScenarioMetrics {
            points_captured: count(|e| matches!(e, EngineEvent::PointCaptured { .. })),
            capacity_notices: count(|e| matches!(e, EngineEvent::CaptureFull { .. })),
            effects_emitted: self.world.effects.len(),
            particles: self.world.effects.total_count(),
            completions: count(|e| matches!(e, EngineEvent::PlaybackCompleted { .. })),
            vanished: count(|e| {
                matches!(
                    e,
                    EngineEvent::PlaybackVanished { .. } | EngineEvent::CaptureVanished { .. }
                )
            }),
            rewards: self.world.rewards.len(),
        };

        let passed = self.failures.is_empty();
        if let Some(export) = self.export {
            export.finalize(passed, self.world.engine.catalog(), &self.world.rewards.snapshot());
        }

        ScenarioResult {
            scenario,
            seed,
            passed,
            total_ticks: self.world.tick_count(),
            final_time_secs: self.world.time_secs(),
            final_route_count: self.world.engine.catalog().len(),
            failure_reason: (!passed).then(|| self.failures.join("; ")),
            metrics,
        }
    }
}
