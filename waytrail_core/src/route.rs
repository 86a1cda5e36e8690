//! The Route entity - an ordered, capacity-bounded point sequence.

use crate::effect::EffectKind;
use crate::error::RouteError;
use waytrail_env::{Location, StoredRoute};

/// A named, ordered sequence of captured points.
///
/// Points are only ever appended or cleared in bulk; their order is the
/// traversal order used by playback.
///
/// The catalog stamps every route it creates with a fresh generation, so a
/// route recreated under an old name is distinguishable from the original.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    effect: EffectKind,
    points: Vec<Location>,
    max_points: usize,
    generation: u64,
}

impl Route {
    /// Creates an empty route.
    pub fn new(name: impl Into<String>, effect: EffectKind, max_points: usize) -> Self {
        Self {
            name: name.into(),
            effect,
            points: Vec::new(),
            max_points,
            generation: 0,
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog-assigned identity; 0 for routes built outside a catalog.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn effect(&self) -> EffectKind {
        self.effect
    }

    pub fn set_effect(&mut self, effect: EffectKind) {
        self.effect = effect;
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Appends a point and returns the new size.
    ///
    /// # Returns
    /// * `Err(RouteError::CapacityExceeded)` - route already holds `max_points`;
    ///   the route is left unchanged
    pub fn append(&mut self, point: Location) -> Result<usize, RouteError> {
        if self.points.len() >= self.max_points {
            return Err(RouteError::CapacityExceeded {
                route: self.name.clone(),
                max_points: self.max_points,
            });
        }
        self.points.push(point);
        Ok(self.points.len())
    }

    /// Removes every point, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.points.len();
        self.points.clear();
        removed
    }

    /// Returns the point at `index`.
    pub fn point_at(&self, index: usize) -> Result<&Location, RouteError> {
        self.points.get(index).ok_or(RouteError::IndexOutOfRange {
            index,
            len: self.points.len(),
        })
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.max_points
    }

    pub fn last_point(&self) -> Option<&Location> {
        self.points.last()
    }

    pub fn points(&self) -> &[Location] {
        &self.points
    }

    /// Converts to the persistence representation.
    pub fn to_stored(&self) -> StoredRoute {
        StoredRoute {
            name: self.name.clone(),
            effect: self.effect.name().to_string(),
            points: self.points.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64) -> Location {
        Location::new("world", x, 64.0, 0.0)
    }

    #[test]
    fn test_append_until_capacity() {
        let mut route = Route::new("A", EffectKind::Flame, 3);
        assert_eq!(route.append(point(0.0)).unwrap(), 1);
        assert_eq!(route.append(point(1.0)).unwrap(), 2);
        assert_eq!(route.append(point(2.0)).unwrap(), 3);
        assert!(route.is_full());

        let err = route.append(point(3.0)).unwrap_err();
        assert!(matches!(err, RouteError::CapacityExceeded { max_points: 3, .. }));
        assert_eq!(route.size(), 3);
        assert_eq!(route.last_point(), Some(&point(2.0)));
    }

    #[test]
    fn test_point_at_bounds() {
        let mut route = Route::new("A", EffectKind::Flame, 10);
        route.append(point(5.0)).unwrap();

        assert_eq!(route.point_at(0).unwrap(), &point(5.0));
        assert!(matches!(
            route.point_at(1),
            Err(RouteError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_clear_keeps_identity() {
        let mut route = Route::new("A", EffectKind::Heart, 10);
        route.append(point(0.0)).unwrap();
        route.append(point(1.0)).unwrap();

        assert_eq!(route.clear(), 2);
        assert!(route.is_empty());
        assert_eq!(route.name(), "A");
        assert_eq!(route.effect(), EffectKind::Heart);
        assert_eq!(route.append(point(9.0)).unwrap(), 1);
    }

    #[test]
    fn test_to_stored() {
        let mut route = Route::new("walk", EffectKind::EndRod, 10);
        route.append(point(1.0)).unwrap();

        let stored = route.to_stored();
        assert_eq!(stored.name, "walk");
        assert_eq!(stored.effect, "END_ROD");
        assert_eq!(stored.points, vec![point(1.0)]);
    }
}
