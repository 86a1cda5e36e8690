//! Route Catalog - process-wide name → route mapping.
//!
//! The catalog is cheap to clone and shared by every session. Each route
//! sits behind its own mutex so appends from different operators into the
//! same route are serialized, while unrelated routes never contend.

use crate::effect::EffectKind;
use crate::error::RouteError;
use crate::route::Route;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};
use waytrail_env::StoredRoute;

/// A route shared between the catalog and whoever is touching it this tick.
pub type SharedRoute = Arc<Mutex<Route>>;

/// Locks a shared route for exclusive access.
///
/// A panic while holding a route lock cannot leave the point list in a
/// torn state (every mutation is a single `Vec` call), so poisoning is
/// ignored.
pub fn lock_route(route: &SharedRoute) -> MutexGuard<'_, Route> {
    route.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct CatalogInner {
    routes: HashMap<String, SharedRoute>,

    /// Creation order, for enumeration
    order: Vec<String>,

    /// Last generation handed out
    generation: u64,
}

/// Name → route mapping. Names are case-sensitive.
#[derive(Clone, Default)]
pub struct RouteCatalog {
    inner: Arc<RwLock<CatalogInner>>,
}

impl RouteCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a new empty route.
    ///
    /// # Returns
    /// * `Err(RouteError::DuplicateName)` - a route with this exact name exists
    /// * `Err(RouteError::InvalidName)` - name is empty or whitespace
    pub fn create(
        &self,
        name: &str,
        effect: EffectKind,
        max_points: usize,
    ) -> Result<SharedRoute, RouteError> {
        if name.trim().is_empty() {
            return Err(RouteError::InvalidName(name.to_string()));
        }

        let mut inner = self.write();
        if inner.routes.contains_key(name) {
            return Err(RouteError::DuplicateName(name.to_string()));
        }

        inner.generation += 1;
        let route = Route::new(name, effect, max_points).with_generation(inner.generation);
        let route = Arc::new(Mutex::new(route));
        inner.routes.insert(name.to_string(), Arc::clone(&route));
        inner.order.push(name.to_string());
        debug!("Created route {} ({})", name, effect);
        Ok(route)
    }

    /// Looks up a route by exact name.
    pub fn get(&self, name: &str) -> Option<SharedRoute> {
        self.read().routes.get(name).cloned()
    }

    /// Looks up `name` only if it is still the route of `generation`.
    ///
    /// Sessions use this on every tick; a route deleted and created again
    /// under the same name has a new generation and is not returned.
    pub fn get_bound(&self, name: &str, generation: u64) -> Option<SharedRoute> {
        self.get(name)
            .filter(|route| lock_route(route).generation() == generation)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().routes.contains_key(name)
    }

    /// Removes a route.
    ///
    /// Sessions bound to it find out on their next tick, even if a route
    /// with the same name is created in between.
    pub fn delete(&self, name: &str) -> Result<SharedRoute, RouteError> {
        let mut inner = self.write();
        let route = inner
            .routes
            .remove(name)
            .ok_or_else(|| RouteError::not_found(name))?;
        inner.order.retain(|n| n != name);
        debug!("Deleted route {}", name);
        Ok(route)
    }

    /// Returns route names in creation order.
    pub fn list_names(&self) -> Vec<String> {
        self.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().order.is_empty()
    }

    /// Copies every route into its persistence form, in creation order.
    pub fn snapshot(&self) -> Vec<StoredRoute> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.routes.get(name))
            .map(|route| lock_route(route).to_stored())
            .collect()
    }

    /// Adds stored routes to the catalog and returns how many were added.
    ///
    /// Unknown effect names fall back to `default_effect`, duplicate names
    /// keep the first occurrence, and points past `max_points` are dropped.
    /// Each of these is logged once per route.
    pub fn restore(
        &self,
        stored: Vec<StoredRoute>,
        default_effect: EffectKind,
        max_points: usize,
    ) -> usize {
        let mut added = 0;

        for entry in stored {
            let resolved = EffectKind::resolve(&entry.effect, default_effect);
            if let Some(err) = resolved.rejected {
                warn!("Route {}: {}, using {}", entry.name, err, resolved.kind);
            }

            let route = match self.create(&entry.name, resolved.kind, max_points) {
                Ok(route) => route,
                Err(err) => {
                    warn!("Skipping stored route {:?}: {}", entry.name, err);
                    continue;
                }
            };

            let total = entry.points.len();
            let mut guard = lock_route(&route);
            for point in entry.points {
                if guard.append(point).is_err() {
                    warn!(
                        "Route {} truncated to {} of {} stored points",
                        entry.name, max_points, total
                    );
                    break;
                }
            }
            added += 1;
        }

        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waytrail_env::Location;

    fn stored(name: &str, effect: &str, n: usize) -> StoredRoute {
        StoredRoute {
            name: name.to_string(),
            effect: effect.to_string(),
            points: (0..n).map(|i| Location::new("world", i as f64, 0.0, 0.0)).collect(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let catalog = RouteCatalog::new();
        catalog.create("A", EffectKind::Flame, 10).unwrap();

        assert!(catalog.contains("A"));
        assert!(catalog.get("A").is_some());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let catalog = RouteCatalog::new();
        catalog.create("A", EffectKind::Flame, 10).unwrap();

        let err = catalog.create("A", EffectKind::Heart, 10).err().unwrap();
        assert!(matches!(err, RouteError::DuplicateName(name) if name == "A"));
        assert_eq!(lock_route(&catalog.get("A").unwrap()).effect(), EffectKind::Flame);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let catalog = RouteCatalog::new();
        catalog.create("Route", EffectKind::Flame, 10).unwrap();
        catalog.create("route", EffectKind::Flame, 10).unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("ROUTE").is_none());
    }

    #[test]
    fn test_blank_name_rejected() {
        let catalog = RouteCatalog::new();
        assert!(matches!(
            catalog.create("  ", EffectKind::Flame, 10),
            Err(RouteError::InvalidName(_))
        ));
    }

    #[test]
    fn test_list_names_keeps_creation_order() {
        let catalog = RouteCatalog::new();
        for name in ["zeta", "alpha", "mid"] {
            catalog.create(name, EffectKind::Flame, 10).unwrap();
        }
        catalog.delete("alpha").unwrap();
        catalog.create("alpha", EffectKind::Flame, 10).unwrap();

        assert_eq!(catalog.list_names(), vec!["zeta", "mid", "alpha"]);
    }

    #[test]
    fn test_recreated_route_is_a_new_generation() {
        let catalog = RouteCatalog::new();
        let first = lock_route(&catalog.create("A", EffectKind::Flame, 10).unwrap()).generation();
        assert!(catalog.get_bound("A", first).is_some());

        catalog.delete("A").unwrap();
        let second = lock_route(&catalog.create("A", EffectKind::Flame, 10).unwrap()).generation();

        assert_ne!(first, second);
        assert!(catalog.get_bound("A", first).is_none());
        assert!(catalog.get_bound("A", second).is_some());
        assert!(catalog.get_bound("B", second).is_none());
    }

    #[test]
    fn test_delete_missing() {
        let catalog = RouteCatalog::new();
        assert!(matches!(catalog.delete("ghost"), Err(RouteError::RouteNotFound(_))));
    }

    #[test]
    fn test_clones_share_state() {
        let catalog = RouteCatalog::new();
        let other = catalog.clone();
        catalog.create("A", EffectKind::Flame, 10).unwrap();
        other.delete("A").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_restore_applies_fallbacks() {
        let catalog = RouteCatalog::new();
        let added = catalog.restore(
            vec![
                stored("A", "heart", 2),
                stored("B", "not_an_effect", 1),
                stored("A", "crit", 5),
                stored("C", "flame", 8),
            ],
            EffectKind::Portal,
            4,
        );

        assert_eq!(added, 3);
        assert_eq!(catalog.list_names(), vec!["A", "B", "C"]);
        assert_eq!(lock_route(&catalog.get("A").unwrap()).effect(), EffectKind::Heart);
        assert_eq!(lock_route(&catalog.get("A").unwrap()).size(), 2);
        assert_eq!(lock_route(&catalog.get("B").unwrap()).effect(), EffectKind::Portal);
        assert_eq!(lock_route(&catalog.get("C").unwrap()).size(), 4);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let catalog = RouteCatalog::new();
        catalog.restore(vec![stored("A", "END_ROD", 3), stored("B", "FLAME", 0)], EffectKind::Flame, 10);

        let snapshot = catalog.snapshot();
        assert_eq!(snapshot, vec![stored("A", "END_ROD", 3), stored("B", "FLAME", 0)]);
    }
}
