//! Route Engine - orchestrates sessions, the scheduler and collaborators.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RouteEngine                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │           TickScheduler (base clock, 20 Hz)          │   │
//! │  │  • (operator, Capture)  every N ticks                │   │
//! │  │  • (operator, Playback) every N ticks                │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                              │
//! │  ┌──────────────┐ ┌───────────────┐ ┌────────────────────┐  │
//! │  │   CAPTURE    │ │   PLAYBACK    │ │   ROUTE CATALOG    │  │
//! │  │  sessions    │ │   sessions    │ │  (shared, locked)  │  │
//! │  └──────────────┘ └───────────────┘ └────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!      ▲ positions          │ effects / rewards        ▲ store
//! ```
//!
//! Commands (select, start, pause, end, ...) mutate session state and the
//! scheduler table directly, so a canceled session is gone before the next
//! call to [`RouteEngine::advance`].

use crate::capture::{CaptureSession, CaptureState, CaptureStep, CapturedPoint};
use crate::catalog::{lock_route, RouteCatalog};
use crate::command::{self, EditCommand, FollowCommand, RouteCommand};
use crate::config::{CapacityPolicy, EngineConfig};
use crate::effect::EffectKind;
use crate::error::RouteError;
use crate::playback::{PlaybackFrame, PlaybackSession, PlaybackState, PlaybackStep};
use crate::scheduler::{TaskKey, TaskKind, TickScheduler};
use crate::segment;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use waytrail_env::{
    EffectEmitter, Location, OperatorId, PositionProvider, RewardSink, RouteStore, TrailContext,
};

/// Something that happened during a tick, reported back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Capture appended a point
    PointCaptured {
        operator: OperatorId,
        route: String,
        size: usize,
        position: Location,
    },

    /// Capture hit the route's point limit (reported once per streak)
    CaptureFull {
        operator: OperatorId,
        route: String,
        max_points: usize,
    },

    /// Capture stopped because the route is full; the route stays selected
    CaptureStopped { operator: OperatorId, route: String },

    /// Capture ended because its route was deleted
    CaptureVanished { operator: OperatorId, route: String },

    /// Playback passed a progress milestone
    PlaybackProgress {
        operator: OperatorId,
        route: String,
        points: usize,
    },

    /// Playback reached the end of its route
    PlaybackCompleted { operator: OperatorId, route: String },

    /// Playback ended because its route was deleted
    PlaybackVanished { operator: OperatorId, route: String },
}

impl EngineEvent {
    pub fn operator(&self) -> OperatorId {
        match self {
            EngineEvent::PointCaptured { operator, .. }
            | EngineEvent::CaptureFull { operator, .. }
            | EngineEvent::CaptureStopped { operator, .. }
            | EngineEvent::CaptureVanished { operator, .. }
            | EngineEvent::PlaybackProgress { operator, .. }
            | EngineEvent::PlaybackCompleted { operator, .. }
            | EngineEvent::PlaybackVanished { operator, .. } => *operator,
        }
    }
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::PointCaptured { route, size, .. } => {
                write!(f, "Point added to {} (line follow, {} points)", route, size)
            }
            EngineEvent::CaptureFull { route, max_points, .. } => {
                write!(f, "Route {} is full ({} points), no more points are added", route, max_points)
            }
            EngineEvent::CaptureStopped { route, .. } => {
                write!(f, "Line follow on {} stopped", route)
            }
            EngineEvent::CaptureVanished { route, .. } => {
                write!(f, "Route {} was deleted, editing stopped", route)
            }
            EngineEvent::PlaybackProgress { points, .. } => {
                write!(f, "Progress: {} points followed", points)
            }
            EngineEvent::PlaybackCompleted { route, .. } => write!(f, "Route {} finished", route),
            EngineEvent::PlaybackVanished { route, .. } => {
                write!(f, "Route {} was deleted, following stopped", route)
            }
        }
    }
}

/// The route capture and playback engine.
///
/// Generic over its collaborators so the same engine runs against a live
/// world or the simulation harness.
pub struct RouteEngine<P, E, R>
where
    P: PositionProvider,
    E: EffectEmitter,
    R: RewardSink,
{
    config: EngineConfig,

    /// `config.default_effect`, validated once
    default_effect: EffectKind,

    catalog: RouteCatalog,
    positions: Arc<P>,
    effects: Arc<E>,
    rewards: Arc<R>,

    scheduler: TickScheduler,
    captures: HashMap<OperatorId, CaptureSession>,
    playbacks: HashMap<OperatorId, PlaybackSession>,
}

impl<P, E, R> RouteEngine<P, E, R>
where
    P: PositionProvider,
    E: EffectEmitter,
    R: RewardSink,
{
    /// Creates an engine over `catalog`.
    ///
    /// # Returns
    /// * `Err(RouteError::InvalidConfiguration)` - `config` failed validation
    pub fn new(
        config: EngineConfig,
        catalog: RouteCatalog,
        positions: Arc<P>,
        effects: Arc<E>,
        rewards: Arc<R>,
    ) -> Result<Self, RouteError> {
        config.validate()?;
        let default_effect = config.default_effect_kind();

        Ok(Self {
            config,
            default_effect,
            catalog,
            positions,
            effects,
            rewards,
            scheduler: TickScheduler::new(),
            captures: HashMap::new(),
            playbacks: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RouteCatalog {
        &self.catalog
    }

    pub fn default_effect(&self) -> EffectKind {
        self.default_effect
    }

    /// Base ticks elapsed since the engine was created.
    pub fn current_tick(&self) -> u64 {
        self.scheduler.current_tick()
    }

    /// Number of live scheduler registrations.
    pub fn registered_tasks(&self) -> usize {
        self.scheduler.len()
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Creates a route with the given effect, or the configured default.
    pub fn create_route(&self, name: &str, effect: Option<&str>) -> Result<EffectKind, RouteError> {
        let effect = match effect {
            Some(name) => name.parse()?,
            None => self.default_effect,
        };
        self.catalog.create(name, effect, self.config.max_points)?;
        info!("Route {} created with effect {}", name, effect);
        Ok(effect)
    }

    /// Deletes a route. Sessions using it end on their next tick.
    pub fn delete_route(&self, name: &str) -> Result<(), RouteError> {
        self.catalog.delete(name)?;
        info!("Route {} deleted", name);
        Ok(())
    }

    /// Changes the effect of an existing route.
    pub fn set_route_effect(&self, name: &str, effect: &str) -> Result<EffectKind, RouteError> {
        let route = self.catalog.get(name).ok_or_else(|| RouteError::not_found(name))?;
        let effect: EffectKind = effect.parse()?;
        lock_route(&route).set_effect(effect);
        Ok(effect)
    }

    /// Adds every stored route to the catalog.
    ///
    /// Storage failures are logged and leave the catalog untouched.
    pub fn load_routes<S>(&self, store: &S) -> usize
    where
        S: RouteStore + ?Sized,
    {
        match store.load_all() {
            Ok(stored) => self
                .catalog
                .restore(stored, self.default_effect, self.config.max_points),
            Err(err) => {
                warn!("Failed to load routes: {}", err);
                0
            }
        }
    }

    /// Hands the whole catalog to `store`. Failures are logged.
    pub fn save_routes<S>(&self, store: &S) -> bool
    where
        S: RouteStore + ?Sized,
    {
        match store.save_all(&self.catalog.snapshot()) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to save routes: {}", err);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Selects a route for editing. Re-selecting stops any running capture.
    pub fn select_route(&mut self, operator: OperatorId, name: &str) -> Result<(), RouteError> {
        let route = self.catalog.get(name).ok_or_else(|| RouteError::not_found(name))?;
        let route = lock_route(&route);

        self.scheduler.cancel(&TaskKey::capture(operator));
        match self.captures.get_mut(&operator) {
            Some(session) => session.retarget(&route),
            None => {
                self.captures.insert(operator, CaptureSession::new(operator, &route));
            }
        }
        debug!("Operator {} editing {}", operator, name);
        Ok(())
    }

    /// Drops the operator's capture session. Returns true if one existed.
    pub fn deselect(&mut self, operator: OperatorId) -> bool {
        self.scheduler.cancel(&TaskKey::capture(operator));
        self.captures.remove(&operator).is_some()
    }

    /// Starts line-follow capture on the selected route.
    pub fn start_capture(&mut self, operator: OperatorId) -> Result<(), RouteError> {
        let session = self
            .captures
            .get_mut(&operator)
            .ok_or(RouteError::NoRouteSelected)?;

        if self.catalog.get_bound(session.route(), session.generation()).is_none() {
            let route = session.route().to_string();
            self.deselect(operator);
            return Err(RouteError::RouteVanished(route));
        }

        if session.start() {
            let period = self.config.session_period_ticks();
            self.scheduler.register(TaskKey::capture(operator), period);
        }
        Ok(())
    }

    /// Pauses capture. Returns false if it was not capturing.
    pub fn pause_capture(&mut self, operator: OperatorId) -> Result<bool, RouteError> {
        let session = self
            .captures
            .get_mut(&operator)
            .ok_or(RouteError::NoRouteSelected)?;

        let paused = session.pause();
        if paused {
            self.scheduler.cancel(&TaskKey::capture(operator));
        }
        Ok(paused)
    }

    /// Resumes a paused capture. Without a paused session this is a no-op.
    pub fn resume_capture(&mut self, operator: OperatorId) -> bool {
        let resumed = self
            .captures
            .get_mut(&operator)
            .map(|session| session.resume())
            .unwrap_or(false);

        if resumed {
            let period = self.config.session_period_ticks();
            self.scheduler.register(TaskKey::capture(operator), period);
        }
        resumed
    }

    /// Captures the operator's position once, ignoring the distance threshold.
    pub fn add_point_once(&mut self, operator: OperatorId) -> Result<usize, RouteError> {
        let session = self
            .captures
            .get_mut(&operator)
            .ok_or(RouteError::NoRouteSelected)?;

        match session.add_point_once(&self.catalog, self.positions.as_ref()) {
            Ok(captured) => {
                self.emit_capture_feedback(&captured);
                Ok(captured.size)
            }
            Err(RouteError::RouteVanished(route)) => {
                self.deselect(operator);
                Err(RouteError::RouteVanished(route))
            }
            Err(err) => Err(err),
        }
    }

    /// Current capture state; `Inactive` when no route is selected.
    pub fn capture_state(&self, operator: OperatorId) -> CaptureState {
        self.captures
            .get(&operator)
            .map(|session| session.state())
            .unwrap_or(CaptureState::Inactive)
    }

    pub fn capture_session(&self, operator: OperatorId) -> Option<&CaptureSession> {
        self.captures.get(&operator)
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Starts following a route from its first point.
    ///
    /// # Returns
    /// * `Err(RouteError::AlreadyPlaying)` - operator is already following a route
    /// * `Err(RouteError::RouteNotFound)` - no such route
    pub fn start_playback(&mut self, operator: OperatorId, name: &str) -> Result<(), RouteError> {
        if let Some(existing) = self.playbacks.get(&operator) {
            return Err(RouteError::AlreadyPlaying(existing.route().to_string()));
        }
        let route = self.catalog.get(name).ok_or_else(|| RouteError::not_found(name))?;
        let session = PlaybackSession::new(operator, &lock_route(&route));

        self.playbacks.insert(operator, session);
        let period = self.config.session_period_ticks();
        self.scheduler.register(TaskKey::playback(operator), period);
        debug!("Operator {} following {}", operator, name);
        Ok(())
    }

    /// Pauses playback. Returns false if it was already paused.
    pub fn pause_playback(&mut self, operator: OperatorId) -> Result<bool, RouteError> {
        self.playbacks
            .get_mut(&operator)
            .map(|session| session.pause())
            .ok_or(RouteError::NotPlaying)
    }

    /// Resumes playback. Returns false if it was not paused.
    pub fn resume_playback(&mut self, operator: OperatorId) -> Result<bool, RouteError> {
        self.playbacks
            .get_mut(&operator)
            .map(|session| session.resume())
            .ok_or(RouteError::NotPlaying)
    }

    /// Ends playback without a reward.
    pub fn end_playback(&mut self, operator: OperatorId) -> Result<(), RouteError> {
        self.scheduler.cancel(&TaskKey::playback(operator));
        self.playbacks
            .remove(&operator)
            .map(|_| ())
            .ok_or(RouteError::NotPlaying)
    }

    pub fn playback_cursor(&self, operator: OperatorId) -> Option<usize> {
        self.playbacks.get(&operator).map(|session| session.cursor())
    }

    pub fn playback_state(&self, operator: OperatorId) -> Option<PlaybackState> {
        self.playbacks.get(&operator).map(|session| session.state())
    }

    /// Drops every session of an operator that left. No reward is fired.
    pub fn disconnect(&mut self, operator: OperatorId) -> bool {
        let had_capture = self.deselect(operator);
        let had_playback = self.end_playback(operator).is_ok();
        if had_capture || had_playback {
            debug!("Operator {} disconnected, sessions dropped", operator);
        }
        had_capture || had_playback
    }

    // ------------------------------------------------------------------
    // Ticking
    // ------------------------------------------------------------------

    /// Advances the base clock by one tick and runs every due session.
    pub fn advance(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        for key in self.scheduler.advance() {
            if !self.scheduler.is_registered(&key) {
                continue;
            }
            match key.kind {
                TaskKind::Capture => self.tick_capture(key.operator, &mut events),
                TaskKind::Playback => self.tick_playback(key.operator, &mut events),
            }
        }

        events
    }

    fn tick_capture(&mut self, operator: OperatorId, events: &mut Vec<EngineEvent>) {
        let key = TaskKey::capture(operator);
        let threshold = self.config.line_follow_distance;

        let (route, step) = match self.captures.get_mut(&operator) {
            Some(session) => (
                session.route().to_string(),
                session.step(&self.catalog, self.positions.as_ref(), threshold),
            ),
            None => {
                self.scheduler.cancel(&key);
                return;
            }
        };

        match step {
            CaptureStep::Idle => {
                self.scheduler.cancel(&key);
            }
            CaptureStep::Held { .. } => {}
            CaptureStep::Captured(captured) => {
                self.emit_capture_feedback(&captured);
                events.push(EngineEvent::PointCaptured {
                    operator,
                    route,
                    size: captured.size,
                    position: captured.point,
                });
            }
            CaptureStep::CapacityReached {
                first_notice,
                max_points,
            } => {
                if first_notice {
                    warn!("Route {} is full, capture by {} no longer appends", route, operator);
                    events.push(EngineEvent::CaptureFull {
                        operator,
                        route: route.clone(),
                        max_points,
                    });
                }
                if self.config.capacity_policy == CapacityPolicy::Stop {
                    if let Some(session) = self.captures.get_mut(&operator) {
                        session.stop();
                    }
                    self.scheduler.cancel(&key);
                    events.push(EngineEvent::CaptureStopped { operator, route });
                }
            }
            CaptureStep::RouteVanished => {
                warn!("Route {} vanished under capture by {}", route, operator);
                self.deselect(operator);
                events.push(EngineEvent::CaptureVanished { operator, route });
            }
            CaptureStep::OperatorOffline => {
                debug!("Operator {} offline, capture tick skipped", operator);
            }
        }
    }

    fn tick_playback(&mut self, operator: OperatorId, events: &mut Vec<EngineEvent>) {
        let key = TaskKey::playback(operator);
        let interval = self.config.progress_interval;

        let (route, step) = match self.playbacks.get_mut(&operator) {
            Some(session) => (session.route().to_string(), session.step(&self.catalog, interval)),
            None => {
                self.scheduler.cancel(&key);
                return;
            }
        };

        match step {
            PlaybackStep::Paused => {}
            PlaybackStep::Advanced(frame) => {
                self.render_frame(&frame);
                if frame.progress {
                    events.push(EngineEvent::PlaybackProgress {
                        operator,
                        route,
                        points: frame.index,
                    });
                }
            }
            PlaybackStep::Finished(frame) => {
                if let Some(frame) = &frame {
                    self.render_frame(frame);
                    if frame.progress {
                        events.push(EngineEvent::PlaybackProgress {
                            operator,
                            route: route.clone(),
                            points: frame.index,
                        });
                    }
                }
                self.playbacks.remove(&operator);
                self.scheduler.cancel(&key);
                self.celebrate(operator, &route, frame.map(|f| f.target));
                info!("Operator {} finished route {}", operator, route);
                events.push(EngineEvent::PlaybackCompleted { operator, route });
            }
            PlaybackStep::RouteVanished => {
                warn!("Route {} vanished under playback by {}", route, operator);
                self.playbacks.remove(&operator);
                self.scheduler.cancel(&key);
                events.push(EngineEvent::PlaybackVanished { operator, route });
            }
        }
    }

    /// Pulse at the new point plus the trail from the previous one.
    fn emit_capture_feedback(&self, captured: &CapturedPoint) {
        let effect = captured.effect.name();
        self.effects
            .emit(effect, &captured.point, self.config.capture_feedback_count);

        if let Some(previous) = &captured.previous {
            let leg = [previous.clone(), captured.point.clone()];
            let trail = segment::trail(&leg, self.config.particle_spacing)
                .max_per_leg(self.config.max_leg_particles);
            for position in trail {
                self.effects.emit(effect, &position, 1);
            }
        }
    }

    fn render_frame(&self, frame: &PlaybackFrame) {
        let effect = frame.effect.name();
        self.effects
            .emit(effect, &frame.target, self.config.playback_effect_count);

        if self.config.playback_trail {
            if let Some(next) = &frame.next {
                let leg = [frame.target.clone(), next.clone()];
                let trail = segment::trail(&leg, self.config.particle_spacing)
                    .max_per_leg(self.config.max_leg_particles);
                for position in trail {
                    self.effects.emit(effect, &position, 1);
                }
            }
        }
    }

    /// Rewards at the operator's position, falling back to where the
    /// route ended.
    fn celebrate(&self, operator: OperatorId, route: &str, final_point: Option<Location>) {
        let position = self
            .positions
            .current_position(operator)
            .ok()
            .or(final_point)
            .or_else(|| {
                self.catalog
                    .get(route)
                    .and_then(|r| lock_route(&r).last_point().cloned())
            });

        match position {
            Some(position) => self.rewards.celebrate(operator, &position),
            None => warn!("No position to celebrate {} finishing {}", operator, route),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Runs a parsed command and returns the message for the operator.
    pub fn execute(&mut self, operator: OperatorId, command: &RouteCommand) -> Result<String, RouteError> {
        match command {
            RouteCommand::Help => Ok(command::USAGE.to_string()),
            RouteCommand::Create { name, effect } => {
                let effect = self.create_route(name, effect.as_deref())?;
                Ok(format!("Route {} created with effect {}", name, effect))
            }
            RouteCommand::Delete { name } => {
                self.delete_route(name)?;
                Ok(format!("Route {} deleted", name))
            }
            RouteCommand::List => {
                let names = self.catalog.list_names();
                if names.is_empty() {
                    Ok("No routes".to_string())
                } else {
                    Ok(format!("Routes: {}", names.join(", ")))
                }
            }
            RouteCommand::SetEffect { route, effect } => {
                let effect = self.set_route_effect(route, effect)?;
                Ok(format!("Effect for route {} set to {}", route, effect))
            }
            RouteCommand::Follow(follow) => self.execute_follow(operator, follow),
            RouteCommand::Edit(edit) => self.execute_edit(operator, edit),
        }
    }

    /// Parses and runs one command line.
    pub fn execute_line(&mut self, operator: OperatorId, line: &str) -> Result<String, RouteError> {
        let command: RouteCommand = line.parse()?;
        self.execute(operator, &command)
    }

    /// Completion candidates for a partially typed command.
    pub fn complete(&self, args: &[&str]) -> Vec<String> {
        command::complete(args, &self.catalog.list_names())
    }

    fn execute_follow(&mut self, operator: OperatorId, follow: &FollowCommand) -> Result<String, RouteError> {
        match follow {
            FollowCommand::Start { route } => {
                self.start_playback(operator, route)?;
                Ok(format!("Following route {}", route))
            }
            FollowCommand::Pause => match self.pause_playback(operator)? {
                true => Ok("Following paused".to_string()),
                false => Ok("Following is already paused".to_string()),
            },
            FollowCommand::Unpause => match self.resume_playback(operator)? {
                true => Ok("Following resumed".to_string()),
                false => Ok("Following is not paused".to_string()),
            },
            FollowCommand::End => {
                self.end_playback(operator)?;
                Ok("Following ended".to_string())
            }
        }
    }

    fn execute_edit(&mut self, operator: OperatorId, edit: &EditCommand) -> Result<String, RouteError> {
        match edit {
            EditCommand::Select { route } => {
                self.select_route(operator, route)?;
                Ok(format!("Editing route {}", route))
            }
            EditCommand::Deselect => {
                self.deselect(operator);
                Ok("Editing stopped".to_string())
            }
            EditCommand::AddPoint => {
                let size = self.add_point_once(operator)?;
                Ok(format!("Point added ({} points)", size))
            }
            EditCommand::Clear => {
                let (name, generation) = self
                    .captures
                    .get(&operator)
                    .map(|session| (session.route().to_string(), session.generation()))
                    .ok_or(RouteError::NoRouteSelected)?;
                let Some(route) = self.catalog.get_bound(&name, generation) else {
                    self.deselect(operator);
                    return Err(RouteError::RouteVanished(name));
                };
                let removed = lock_route(&route).clear();
                Ok(format!("Route {} cleared ({} points removed)", name, removed))
            }
            EditCommand::LineFollowStart => {
                self.start_capture(operator)?;
                Ok("Line follow started".to_string())
            }
            EditCommand::LineFollowPause => match self.pause_capture(operator)? {
                true => Ok("Line follow paused".to_string()),
                false => Ok("Line follow is not running".to_string()),
            },
            EditCommand::LineFollowUnpause => match self.resume_capture(operator) {
                true => Ok("Line follow resumed".to_string()),
                false => Ok("Nothing to resume".to_string()),
            },
        }
    }
}

impl<P, E, R> RouteEngine<P, E, R>
where
    P: PositionProvider + 'static,
    E: EffectEmitter + 'static,
    R: RewardSink + 'static,
{
    /// Drives the engine at the configured base tick rate until `shutdown`
    /// flips to true (or its sender is dropped). Returns the ticks run.
    ///
    /// Tick `k` is due at `start + k·period` on the context's clock; a tick
    /// that runs late is followed by the next one as soon as it is due.
    pub async fn run<Ctx: TrailContext>(
        engine: Arc<Mutex<Self>>,
        ctx: Arc<Ctx>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        let period = engine.lock().await.config.base_tick_duration();
        let mut deadline = ctx.now() + period;
        let mut ticks = 0;

        loop {
            tokio::select! {
                _ = ctx.sleep_until(deadline) => {
                    let events = engine.lock().await.advance();
                    for event in &events {
                        info!(operator = %event.operator(), "{}", event);
                    }
                    ticks += 1;
                    deadline += period;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Engine loop stopped after {} ticks", ticks);
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use waytrail_env::{EnvError, StoredRoute, TokioContext};

    #[derive(Default)]
    struct World {
        at: StdMutex<HashMap<OperatorId, Location>>,
        emitted: StdMutex<Vec<(String, Location, u32)>>,
        rewards: StdMutex<Vec<(OperatorId, Location)>>,
    }

    impl World {
        fn place(&self, operator: OperatorId, x: f64, z: f64) {
            self.at
                .lock()
                .unwrap()
                .insert(operator, Location::new("world", x, 64.0, z));
        }

        fn leave(&self, operator: OperatorId) {
            self.at.lock().unwrap().remove(&operator);
        }

        fn emitted(&self) -> usize {
            self.emitted.lock().unwrap().len()
        }

        fn rewards(&self) -> usize {
            self.rewards.lock().unwrap().len()
        }
    }

    impl PositionProvider for World {
        fn current_position(&self, operator: OperatorId) -> Result<Location, EnvError> {
            self.at
                .lock()
                .unwrap()
                .get(&operator)
                .cloned()
                .ok_or_else(|| EnvError::offline(operator))
        }
    }

    impl EffectEmitter for World {
        fn emit(&self, effect: &str, position: &Location, count: u32) {
            self.emitted
                .lock()
                .unwrap()
                .push((effect.to_string(), position.clone(), count));
        }
    }

    impl RewardSink for World {
        fn celebrate(&self, operator: OperatorId, position: &Location) {
            self.rewards.lock().unwrap().push((operator, position.clone()));
        }
    }

    struct FailingStore;

    impl RouteStore for FailingStore {
        fn load_all(&self) -> Result<Vec<StoredRoute>, EnvError> {
            Err(EnvError::storage("disk on fire"))
        }

        fn save_all(&self, _routes: &[StoredRoute]) -> Result<(), EnvError> {
            Err(EnvError::storage("disk on fire"))
        }
    }

    type TestEngine = RouteEngine<World, World, World>;

    /// Engine ticking every base tick, so one `advance` is one session tick.
    fn engine(config: EngineConfig) -> (TestEngine, Arc<World>) {
        let world = Arc::new(World::default());
        let engine = RouteEngine::new(
            config.with_tick_interval(1, 1),
            RouteCatalog::new(),
            world.clone(),
            world.clone(),
            world.clone(),
        )
        .unwrap();
        (engine, world)
    }

    fn fill(engine: &TestEngine, name: &str, n: usize) {
        let route = engine.catalog().get(name).unwrap();
        let mut guard = lock_route(&route);
        for i in 0..n {
            guard.append(Location::new("world", i as f64 * 3.0, 64.0, 0.0)).unwrap();
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let world = Arc::new(World::default());
        let result = RouteEngine::new(
            EngineConfig::default().with_particle_spacing(0.0),
            RouteCatalog::new(),
            world.clone(),
            world.clone(),
            world,
        );
        assert!(matches!(result, Err(RouteError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_create_uses_default_effect() {
        let (engine, _) = engine(EngineConfig::default().with_default_effect("heart"));
        assert_eq!(engine.create_route("A", None).unwrap(), EffectKind::Heart);
        assert_eq!(engine.create_route("B", Some("crit")).unwrap(), EffectKind::Crit);
        assert!(matches!(
            engine.create_route("C", Some("glitter")),
            Err(RouteError::InvalidConfiguration(_))
        ));
        assert!(!engine.catalog().contains("C"));
        assert!(matches!(engine.create_route("A", None), Err(RouteError::DuplicateName(_))));
    }

    #[test]
    fn test_capture_flow() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();

        assert!(matches!(engine.start_capture(op), Err(RouteError::NoRouteSelected)));
        assert!(matches!(engine.select_route(op, "nope"), Err(RouteError::RouteNotFound(_))));
        engine.select_route(op, "A").unwrap();
        assert_eq!(engine.capture_state(op), CaptureState::Selected);

        engine.start_capture(op).unwrap();
        assert_eq!(engine.capture_state(op), CaptureState::Capturing);

        let events = engine.advance();
        assert!(matches!(&events[..], [EngineEvent::PointCaptured { size: 1, .. }]));

        // Standing still
        assert!(engine.advance().is_empty());

        world.place(op, 2.0, 0.0);
        let events = engine.advance();
        assert!(matches!(&events[..], [EngineEvent::PointCaptured { size: 2, .. }]));

        // Pulse of 5 at each point, trail of 4 at spacing 0.5 over 2 units
        assert_eq!(world.emitted(), 1 + 1 + 4);
    }

    #[test]
    fn test_pause_cancels_registration() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        engine.select_route(op, "A").unwrap();
        engine.start_capture(op).unwrap();
        engine.advance();

        assert!(engine.pause_capture(op).unwrap());
        assert_eq!(engine.registered_tasks(), 0);

        world.place(op, 50.0, 0.0);
        assert!(engine.advance().is_empty());
        assert_eq!(lock_route(&engine.catalog().get("A").unwrap()).size(), 1);

        assert!(engine.resume_capture(op));
        assert_eq!(engine.advance().len(), 1);
    }

    #[test]
    fn test_resume_without_selection_is_noop() {
        let (mut engine, _) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        assert!(!engine.resume_capture(op));
        assert_eq!(engine.capture_state(op), CaptureState::Inactive);
        assert_eq!(engine.registered_tasks(), 0);
    }

    #[test]
    fn test_deselect_stops_capture_same_tick() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        engine.select_route(op, "A").unwrap();
        engine.start_capture(op).unwrap();

        assert!(engine.deselect(op));
        assert!(engine.advance().is_empty());
        assert_eq!(lock_route(&engine.catalog().get("A").unwrap()).size(), 0);
        assert_eq!(engine.capture_state(op), CaptureState::Inactive);
    }

    #[test]
    fn test_capacity_skip_policy_keeps_scanning() {
        let (mut engine, world) = engine(EngineConfig::default().with_max_points(2));
        let op = OperatorId::from_seed(1);
        engine.create_route("A", None).unwrap();
        engine.select_route(op, "A").unwrap();
        engine.start_capture(op).unwrap();

        let mut full_notices = 0;
        for i in 0..6 {
            world.place(op, i as f64 * 10.0, 0.0);
            for event in engine.advance() {
                if matches!(event, EngineEvent::CaptureFull { .. }) {
                    full_notices += 1;
                }
            }
        }
        assert_eq!(full_notices, 1);
        assert_eq!(engine.capture_state(op), CaptureState::Capturing);
        assert_eq!(lock_route(&engine.catalog().get("A").unwrap()).size(), 2);
    }

    #[test]
    fn test_capacity_stop_policy() {
        let config = EngineConfig::default()
            .with_max_points(1)
            .with_capacity_policy(CapacityPolicy::Stop);
        let (mut engine, world) = engine(config);
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        engine.select_route(op, "A").unwrap();
        engine.start_capture(op).unwrap();
        engine.advance();

        world.place(op, 10.0, 0.0);
        let events = engine.advance();
        assert!(events.iter().any(|e| matches!(e, EngineEvent::CaptureStopped { .. })));
        assert_eq!(engine.capture_state(op), CaptureState::Selected);
        assert_eq!(engine.registered_tasks(), 0);
    }

    #[test]
    fn test_capture_route_deleted() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        engine.select_route(op, "A").unwrap();
        engine.start_capture(op).unwrap();
        engine.delete_route("A").unwrap();

        let events = engine.advance();
        assert!(matches!(&events[..], [EngineEvent::CaptureVanished { .. }]));
        assert_eq!(engine.capture_state(op), CaptureState::Inactive);
        assert_eq!(engine.registered_tasks(), 0);
    }

    #[test]
    fn test_playback_three_points() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 100.0, 100.0);
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 3);

        engine.start_playback(op, "A").unwrap();
        assert!(engine.advance().is_empty());
        assert_eq!(engine.playback_cursor(op), Some(1));
        assert!(engine.advance().is_empty());

        let events = engine.advance();
        assert!(matches!(&events[..], [EngineEvent::PlaybackCompleted { .. }]));
        assert_eq!(world.rewards(), 1);
        assert_eq!(engine.playback_cursor(op), None);

        assert!(engine.advance().is_empty());
        assert_eq!(world.rewards(), 1);
        assert_eq!(engine.registered_tasks(), 0);

        // Reward goes where the operator stands
        assert_eq!(world.rewards.lock().unwrap()[0].1.x(), 100.0);
    }

    #[test]
    fn test_playback_start_errors() {
        let (mut engine, _) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        engine.create_route("A", None).unwrap();

        assert!(matches!(engine.start_playback(op, "B"), Err(RouteError::RouteNotFound(_))));
        engine.start_playback(op, "A").unwrap();
        assert!(matches!(engine.start_playback(op, "A"), Err(RouteError::AlreadyPlaying(_))));
        assert!(matches!(engine.pause_playback(OperatorId::from_seed(2)), Err(RouteError::NotPlaying)));
    }

    #[test]
    fn test_playback_pause_and_end() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 5);

        engine.start_playback(op, "A").unwrap();
        engine.advance();
        assert!(engine.pause_playback(op).unwrap());
        engine.advance();
        engine.advance();
        assert_eq!(engine.playback_cursor(op), Some(1));
        assert_eq!(engine.playback_state(op), Some(PlaybackState::Paused));

        assert!(engine.resume_playback(op).unwrap());
        engine.advance();
        assert_eq!(engine.playback_cursor(op), Some(2));

        engine.end_playback(op).unwrap();
        assert!(engine.advance().is_empty());
        assert_eq!(world.rewards(), 0);
        assert!(matches!(engine.end_playback(op), Err(RouteError::NotPlaying)));
    }

    #[test]
    fn test_playback_route_vanished_isolated() {
        let (mut engine, _) = engine(EngineConfig::default());
        let a = OperatorId::from_seed(1);
        let b = OperatorId::from_seed(2);
        engine.create_route("A", None).unwrap();
        engine.create_route("B", None).unwrap();
        fill(&engine, "A", 5);
        fill(&engine, "B", 5);

        engine.start_playback(a, "A").unwrap();
        engine.start_playback(b, "B").unwrap();
        engine.advance();
        engine.delete_route("A").unwrap();

        let events = engine.advance();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EngineEvent::PlaybackVanished { operator, .. } if *operator == a));
        assert_eq!(engine.playback_cursor(a), None);
        assert_eq!(engine.playback_cursor(b), Some(2));
    }

    #[test]
    fn test_recreated_route_ends_sessions() {
        let (mut engine, world) = engine(EngineConfig::default());
        let player = OperatorId::from_seed(1);
        let editor = OperatorId::from_seed(2);
        world.place(editor, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 5);

        engine.start_playback(player, "A").unwrap();
        engine.select_route(editor, "A").unwrap();
        engine.start_capture(editor).unwrap();
        engine.advance();
        assert_eq!(engine.playback_cursor(player), Some(1));

        engine.delete_route("A").unwrap();
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 10);

        let events = engine.advance();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::PlaybackVanished { operator, .. } if *operator == player)));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::CaptureVanished { operator, .. } if *operator == editor)));
        assert_eq!(engine.playback_cursor(player), None);
        assert_eq!(engine.capture_state(editor), CaptureState::Inactive);
        assert_eq!(engine.registered_tasks(), 0);
        assert_eq!(lock_route(&engine.catalog().get("A").unwrap()).size(), 10);
        assert_eq!(world.rewards(), 0);
    }

    #[test]
    fn test_recreated_route_rejects_selected_commands() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        engine.select_route(op, "A").unwrap();

        engine.delete_route("A").unwrap();
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 2);

        assert!(matches!(
            engine.execute_line(op, "/route edit clear"),
            Err(RouteError::RouteVanished(_))
        ));
        assert_eq!(engine.capture_state(op), CaptureState::Inactive);

        engine.select_route(op, "A").unwrap();
        engine.delete_route("A").unwrap();
        engine.create_route("A", None).unwrap();
        assert!(matches!(engine.start_capture(op), Err(RouteError::RouteVanished(_))));
        assert!(matches!(engine.add_point_once(op), Err(RouteError::NoRouteSelected)));
        assert_eq!(lock_route(&engine.catalog().get("A").unwrap()).size(), 0);
    }

    #[test]
    fn test_offline_completion_rewards_at_route_end() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 2);

        engine.start_playback(op, "A").unwrap();
        engine.advance();
        engine.advance();

        let rewards = world.rewards.lock().unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].1.x(), 3.0);
    }

    #[test]
    fn test_playback_renders_trail_toward_next_point() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        engine.create_route("A", Some("heart")).unwrap();
        fill(&engine, "A", 2);

        engine.start_playback(op, "A").unwrap();
        engine.advance();

        // 1 target + 6 trail positions over 3 units at spacing 0.5
        let emitted = world.emitted.lock().unwrap();
        assert_eq!(emitted.len(), 7);
        assert_eq!(emitted[0].0, "HEART");
        assert_eq!(emitted[0].2, 5);
    }

    #[test]
    fn test_long_jump_renders_bounded_trail() {
        let (mut engine, world) = engine(EngineConfig::default().with_max_leg_particles(64));
        let op = OperatorId::from_seed(1);
        let route = engine.catalog().create("A", EffectKind::Flame, 10).unwrap();
        lock_route(&route).append(Location::new("world", 0.0, 64.0, 0.0)).unwrap();
        lock_route(&route).append(Location::new("world", 100_000.0, 64.0, 0.0)).unwrap();

        engine.start_playback(op, "A").unwrap();
        engine.advance();
        assert_eq!(world.emitted(), 1 + 64);

        // Same bound on capture feedback after a teleport
        world.place(op, 0.0, 0.0);
        engine.create_route("B", None).unwrap();
        engine.select_route(op, "B").unwrap();
        engine.add_point_once(op).unwrap();
        world.place(op, 50_000.0, 0.0);
        let before = world.emitted();
        engine.add_point_once(op).unwrap();
        assert_eq!(world.emitted() - before, 1 + 64);
    }

    #[test]
    fn test_disconnect_drops_everything() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);
        engine.create_route("A", None).unwrap();
        fill(&engine, "A", 1);
        engine.select_route(op, "A").unwrap();
        engine.start_capture(op).unwrap();
        engine.start_playback(op, "A").unwrap();
        assert_eq!(engine.registered_tasks(), 2);

        world.leave(op);
        assert!(engine.disconnect(op));
        assert!(engine.advance().is_empty());
        assert_eq!(engine.registered_tasks(), 0);
        assert_eq!(world.rewards(), 0);
    }

    #[test]
    fn test_storage_failures_are_swallowed() {
        let (engine, _) = engine(EngineConfig::default());
        engine.create_route("A", None).unwrap();
        assert_eq!(engine.load_routes(&FailingStore), 0);
        assert!(!engine.save_routes(&FailingStore));
        assert!(engine.catalog().contains("A"));
    }

    #[test]
    fn test_execute_commands() {
        let (mut engine, world) = engine(EngineConfig::default());
        let op = OperatorId::from_seed(1);
        world.place(op, 0.0, 0.0);

        assert_eq!(engine.execute_line(op, "/route list").unwrap(), "No routes");
        engine.execute_line(op, "/route create A").unwrap();
        assert!(matches!(engine.execute_line(op, "/route create A"), Err(RouteError::DuplicateName(_))));
        assert!(matches!(
            engine.execute_line(op, "/route edit point add"),
            Err(RouteError::NoRouteSelected)
        ));

        engine.execute_line(op, "/route edit select A").unwrap();
        assert_eq!(engine.execute_line(op, "/route edit point add").unwrap(), "Point added (1 points)");
        assert_eq!(engine.execute_line(op, "/route edit linefollowunpause").unwrap(), "Nothing to resume");
        assert_eq!(
            engine.execute_line(op, "/route seteffect A portal").unwrap(),
            "Effect for route A set to PORTAL"
        );
        assert!(matches!(
            engine.execute_line(op, "/route seteffect A nonsense"),
            Err(RouteError::InvalidConfiguration(_))
        ));
        assert_eq!(
            engine.execute_line(op, "/route edit clear").unwrap(),
            "Route A cleared (1 points removed)"
        );
        assert!(matches!(engine.execute_line(op, "/route fly"), Err(RouteError::Usage(_))));
        assert_eq!(engine.complete(&["follow", "start", ""]), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_shutdown() {
        let world = Arc::new(World::default());
        let engine = RouteEngine::new(
            EngineConfig::default().with_tick_interval(1, 100),
            RouteCatalog::new(),
            world.clone(),
            world.clone(),
            world.clone(),
        )
        .unwrap();
        let engine = Arc::new(Mutex::new(engine));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(RouteEngine::run(engine.clone(), Arc::new(TokioContext::new()), rx));
        // 100 Hz for just over a second of tokio's paused clock
        tokio::time::sleep(std::time::Duration::from_millis(1005)).await;
        tx.send(true).unwrap();

        let ticks = handle.await.unwrap();
        assert_eq!(ticks, 100);
        assert_eq!(engine.lock().await.current_tick(), ticks);
    }
}
