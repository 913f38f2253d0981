//! Ordered z lookup of detector elements between two positions.
//!
//! Elements live in a `BTreeMap` keyed by z, so a query is a range scan:
//! logarithmic in the number of elements plus the size of the answer.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Anything with a well-defined position along the beam axis.
pub trait ZOrdered {
    fn z_position(&self) -> f64;
}

/// z position with a total order (`f64::total_cmp`). −0.0 is stored as 0.0.
#[derive(Clone, Copy, Debug)]
struct ZKey(f64);

impl ZKey {
    fn new(z: f64) -> Self {
        Self(z + 0.0)
    }
}

impl PartialEq for ZKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ZKey {}

impl PartialOrd for ZKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ZKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Ordered set of detector elements, at most one per z.
#[derive(Clone, Debug)]
pub struct GeometryNavigator<T> {
    elements: BTreeMap<ZKey, T>,
}

impl<T> Default for GeometryNavigator<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
        }
    }
}

impl<T: ZOrdered> GeometryNavigator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element. Returns `false` (and keeps the existing element)
    /// when one is already registered at the same z.
    pub fn insert(&mut self, element: T) -> bool {
        let key = ZKey::new(element.z_position());
        if self.elements.contains_key(&key) {
            return false;
        }
        self.elements.insert(key, element);
        true
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in ascending z.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.values()
    }

    /// Elements crossed when moving from `current_z` to `target_z`, in
    /// propagation order.
    ///
    /// Downstream: z in (current_z, target_z], ascending.
    /// Upstream: z in [target_z, current_z), descending.
    pub fn find_intersections(&self, current_z: f64, target_z: f64) -> Vec<&T> {
        let (from, to) = (ZKey::new(current_z), ZKey::new(target_z));
        match to.cmp(&from) {
            Ordering::Equal => Vec::new(),
            Ordering::Greater => self
                .elements
                .range((Bound::Excluded(from), Bound::Included(to)))
                .map(|(_, e)| e)
                .collect(),
            Ordering::Less => self
                .elements
                .range((Bound::Included(to), Bound::Excluded(from)))
                .rev()
                .map(|(_, e)| e)
                .collect(),
        }
    }
}

impl<T: ZOrdered> FromIterator<T> for GeometryNavigator<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut nav = Self::new();
        for element in iter {
            nav.insert(element);
        }
        nav
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MaterialSlab;

    fn navigator() -> GeometryNavigator<MaterialSlab> {
        [300.0, 100.0, 200.0, 400.0]
            .into_iter()
            .map(|z| MaterialSlab::silicon(format!("L{z}"), z, 0.3))
            .collect()
    }

    fn zs(found: Vec<&MaterialSlab>) -> Vec<f64> {
        found.into_iter().map(|s| s.z).collect()
    }

    #[test]
    fn downstream_excludes_start_includes_target() {
        let nav = navigator();
        assert_eq!(zs(nav.find_intersections(100.0, 300.0)), vec![200.0, 300.0]);
        assert_eq!(zs(nav.find_intersections(0.0, 1000.0)), vec![100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn upstream_is_descending() {
        let nav = navigator();
        assert_eq!(zs(nav.find_intersections(400.0, 200.0)), vec![300.0, 200.0]);
        assert_eq!(zs(nav.find_intersections(350.0, 0.0)), vec![300.0, 200.0, 100.0]);
    }

    #[test]
    fn empty_interval_finds_nothing() {
        let nav = navigator();
        assert!(nav.find_intersections(200.0, 200.0).is_empty());
        assert!(nav.find_intersections(110.0, 150.0).is_empty());
    }

    #[test]
    fn signed_zeros_are_the_same_position() {
        let mut nav = navigator();
        assert!(nav.insert(MaterialSlab::silicon("origin", -0.0, 0.3)));
        assert!(!nav.insert(MaterialSlab::silicon("origin again", 0.0, 0.3)));
        assert!(nav.find_intersections(0.0, -0.0).is_empty());
        assert!(nav.find_intersections(-0.0, 0.0).is_empty());
        assert_eq!(zs(nav.find_intersections(-50.0, 0.0)), vec![0.0]);
        assert_eq!(zs(nav.find_intersections(150.0, -0.0)), vec![100.0, 0.0]);
    }

    #[test]
    fn duplicate_z_is_rejected() {
        let mut nav = navigator();
        assert!(!nav.insert(MaterialSlab::silicon("dup", 200.0, 1.0)));
        assert_eq!(nav.len(), 4);
        let kept = nav.find_intersections(150.0, 250.0);
        assert_eq!(kept[0].name, "L200");
    }
}
