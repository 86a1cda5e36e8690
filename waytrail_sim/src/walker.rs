//! Ground truth for simulated operators.
//!
//! Walkers move each operator along a list of waypoints at constant speed,
//! with Gaussian wobble while moving:
//! - True positions of all operators
//! - Kinematics (waypoint following)
//! - Online / offline status
//!
//! `Walkers` is the simulation's [`PositionProvider`].

use nalgebra::Vector3;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use waytrail_env::{EnvError, Location, OperatorId, PositionProvider};

/// One simulated operator.
#[derive(Debug, Clone)]
pub struct Walker {
    /// World the walker is in
    pub world: String,

    /// Current position
    pub position: Vector3<f64>,

    /// Heading in degrees (0 = +z, 90 = -x)
    pub yaw: f32,

    /// Remaining waypoints, nearest first
    pub waypoints: Vec<Vector3<f64>>,

    /// Walking speed (units per second)
    pub speed: f64,

    /// Offline walkers have no position
    pub online: bool,
}

impl Walker {
    fn location(&self) -> Location {
        Location::at(&self.world, self.position).with_orientation(self.yaw, 0.0)
    }

    fn is_moving(&self) -> bool {
        !self.waypoints.is_empty()
    }
}

struct WalkersInner {
    rng: ChaCha8Rng,
    walkers: BTreeMap<OperatorId, Walker>,
    time: f64,
}

/// All simulated operators, behind one lock.
pub struct Walkers {
    inner: Mutex<WalkersInner>,

    /// Wobble standard deviation (units per step)
    jitter_std: f64,
}

impl Walkers {
    /// Creates an empty set driven by `rng`.
    pub fn new(rng: ChaCha8Rng, jitter_std: f64) -> Self {
        Self {
            inner: Mutex::new(WalkersInner {
                rng,
                walkers: BTreeMap::new(),
                time: 0.0,
            }),
            jitter_std: jitter_std.max(0.0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WalkersInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Places an operator at `start`, heading through `waypoints` in order.
    pub fn spawn(
        &self,
        operator: OperatorId,
        world: &str,
        start: Vector3<f64>,
        waypoints: Vec<Vector3<f64>>,
        speed: f64,
    ) {
        let walker = Walker {
            world: world.to_string(),
            position: start,
            yaw: 0.0,
            waypoints,
            speed,
            online: true,
        };
        self.lock().walkers.insert(operator, walker);
    }

    /// Appends waypoints to an operator's path.
    pub fn walk_to(&self, operator: OperatorId, waypoints: &[Vector3<f64>]) {
        if let Some(walker) = self.lock().walkers.get_mut(&operator) {
            walker.waypoints.extend_from_slice(waypoints);
        }
    }

    /// Moves an operator instantly, dropping its remaining path.
    pub fn teleport(&self, operator: OperatorId, world: &str, position: Vector3<f64>) {
        if let Some(walker) = self.lock().walkers.get_mut(&operator) {
            walker.world = world.to_string();
            walker.position = position;
            walker.waypoints.clear();
        }
    }

    pub fn set_online(&self, operator: OperatorId, online: bool) {
        if let Some(walker) = self.lock().walkers.get_mut(&operator) {
            walker.online = online;
        }
    }

    /// Removes an operator from the world.
    pub fn remove(&self, operator: OperatorId) -> bool {
        self.lock().walkers.remove(&operator).is_some()
    }

    /// Advances every walker by `dt` seconds.
    pub fn step(&self, dt: f64) {
        let mut inner = self.lock();
        inner.time += dt;

        let normal = Normal::new(0.0, self.jitter_std).ok();
        let WalkersInner { rng, walkers, .. } = &mut *inner;

        for walker in walkers.values_mut() {
            if !walker.is_moving() {
                continue;
            }

            let mut budget = walker.speed * dt;
            while budget > 0.0 {
                let Some(target) = walker.waypoints.first().copied() else {
                    break;
                };
                let to_target = target - walker.position;
                let remaining = to_target.norm();

                if remaining > 1e-9 {
                    walker.yaw = (-to_target.x).atan2(to_target.z).to_degrees() as f32;
                }
                if remaining <= budget {
                    walker.position = target;
                    walker.waypoints.remove(0);
                    budget -= remaining;
                } else {
                    walker.position += to_target * (budget / remaining);
                    budget = 0.0;
                }
            }

            // Wobble sideways only while still walking
            if let (true, Some(normal)) = (walker.is_moving(), normal.as_ref()) {
                let wobble = Vector3::new(normal.sample(rng), 0.0, normal.sample(rng));
                walker.position += wobble;
            }
        }
    }

    /// Returns the simulated time in seconds.
    pub fn time(&self) -> f64 {
        self.lock().time
    }

    /// Snapshot of one walker.
    pub fn walker(&self, operator: OperatorId) -> Option<Walker> {
        self.lock().walkers.get(&operator).cloned()
    }

    /// True once every walker has run out of waypoints.
    pub fn all_idle(&self) -> bool {
        self.lock().walkers.values().all(|w| !w.is_moving())
    }

    /// Positions of all online walkers, by operator.
    pub fn positions(&self) -> Vec<(OperatorId, Location)> {
        self.lock()
            .walkers
            .iter()
            .filter(|(_, w)| w.online)
            .map(|(id, w)| (*id, w.location()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().walkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PositionProvider for Walkers {
    fn current_position(&self, operator: OperatorId) -> Result<Location, EnvError> {
        match self.lock().walkers.get(&operator) {
            Some(walker) if walker.online => Ok(walker.location()),
            _ => Err(EnvError::offline(operator)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn walkers(jitter: f64) -> Walkers {
        Walkers::new(ChaCha8Rng::seed_from_u64(42), jitter)
    }

    #[test]
    fn test_walks_to_waypoint_and_stops() {
        let w = walkers(0.0);
        let op = OperatorId::from_seed(1);
        w.spawn(op, "world", Vector3::zeros(), vec![Vector3::new(0.0, 0.0, 10.0)], 4.0);

        w.step(1.0);
        assert_relative_eq!(w.walker(op).unwrap().position.z, 4.0);

        w.step(2.0);
        let walker = w.walker(op).unwrap();
        assert_relative_eq!(walker.position.z, 10.0);
        assert!(w.all_idle());

        // Idle walkers do not drift
        w.step(5.0);
        assert_relative_eq!(w.walker(op).unwrap().position.z, 10.0);
    }

    #[test]
    fn test_speed_carries_over_corners() {
        let w = walkers(0.0);
        let op = OperatorId::from_seed(1);
        w.spawn(
            op,
            "world",
            Vector3::zeros(),
            vec![Vector3::new(2.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 5.0)],
            5.0,
        );

        w.step(1.0);
        let walker = w.walker(op).unwrap();
        assert_relative_eq!(walker.position.x, 2.0);
        assert_relative_eq!(walker.position.z, 3.0);
    }

    #[test]
    fn test_offline_operator_has_no_position() {
        let w = walkers(0.0);
        let op = OperatorId::from_seed(1);
        w.spawn(op, "world", Vector3::zeros(), vec![], 1.0);

        assert!(w.current_position(op).is_ok());
        w.set_online(op, false);
        assert!(matches!(w.current_position(op), Err(EnvError::OperatorOffline(_))));
        assert!(w.current_position(OperatorId::from_seed(9)).is_err());
    }

    #[test]
    fn test_jitter_is_deterministic() {
        let run = || {
            let w = walkers(0.3);
            let op = OperatorId::from_seed(1);
            w.spawn(op, "world", Vector3::zeros(), vec![Vector3::new(0.0, 0.0, 100.0)], 1.0);
            for _ in 0..10 {
                w.step(0.05);
            }
            w.walker(op).unwrap().position
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_teleport_changes_world() {
        let w = walkers(0.0);
        let op = OperatorId::from_seed(1);
        w.spawn(op, "world", Vector3::zeros(), vec![Vector3::new(0.0, 0.0, 100.0)], 1.0);
        w.teleport(op, "nether", Vector3::new(1.0, 2.0, 3.0));

        let here = w.current_position(op).unwrap();
        assert_eq!(here.world, "nether");
        assert!(w.all_idle());
    }
}
