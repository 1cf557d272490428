//!
//! # Transform Engine
//!
//! [CifPlacement] is the canonical instance-placement value: mirror,
//! direction-vector rotation, rational magnification, and translation,
//! exactly the terms an instance record can carry. Placements compose
//! through the matrix [Transform] form on a bounded-depth
//! [TransformStack], and are interned by value in a [TicketTable] so
//! repeated placements share one representation.
//!

// Std-Lib
use std::collections::HashMap;

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::error::{CifError, CifResult};
use crate::geom::{BoundBox, CifBox, CifShape, Point, Polygon, Transform};
use crate::Int;

/// Interned placement identifier, an index into a [TicketTable]
pub type TicketId = u32;

/// # Placement Record
///
/// The canonical value of one instance placement. All fields are integers
/// (magnification is a rational pair), which keeps placements hashable and
/// by-value internable.
///
/// Application order: mirror, then rotation, then magnification, then
/// translation - matching the order the record grammar lists them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CifPlacement {
    /// Mirror about the x-axis (negate y) before rotating
    pub mirror_y: bool,
    /// Rotation direction vector: the positive x-axis maps onto this direction
    pub axis: Point,
    /// Rational uniform magnification (numerator, denominator)
    pub mag: (Int, Int),
    /// Translation
    pub origin: Point,
}
impl Default for CifPlacement {
    fn default() -> Self {
        Self {
            mirror_y: false,
            axis: Point::new(1, 0),
            mag: (1, 1),
            origin: Point::default(),
        }
    }
}
impl CifPlacement {
    /// Create the identity placement translated to `origin`
    pub fn at(origin: Point) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }
    /// Boolean indication of the identity placement
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
    /// Our magnification as a float
    pub fn magnification(&self) -> f64 {
        self.mag.0 as f64 / self.mag.1 as f64
    }
    /// Boolean indication of a Manhattan (axis-aligned or axis-swapping) rotation
    pub fn is_manhattan(&self) -> bool {
        self.axis.x == 0 || self.axis.y == 0
    }
    /// Build the matrix [Transform] equivalent of this placement
    pub fn to_transform(&self) -> Transform {
        let mut t = if self.mirror_y {
            Transform::mirror_y()
        } else {
            Transform::identity()
        };
        t = Transform::cascade(&Transform::rotate_to(&self.axis), &t);
        let mag = self.magnification();
        if mag != 1.0 {
            t = Transform::cascade(&Transform::magnify(mag), &t);
        }
        Transform::cascade(
            &Transform::translate(self.origin.x as f64, self.origin.y as f64),
            &t,
        )
    }
}

/// # Bounded Transform Stack
///
/// Composes placements in instantiation order, outermost first, mirroring
/// the nesting order in which instance records are traversed. The depth
/// bound doubles as the hierarchy cycle guard: the format places no
/// explicit limit on recursion, so exceeding the bound is a structural
/// error rather than a stack overflow.
#[derive(Debug, Clone)]
pub struct TransformStack {
    /// Composed transform at each level. Entry zero is the identity root.
    stack: Vec<Transform>,
    /// Maximum depth, exclusive of the identity root
    limit: usize,
}
impl Default for TransformStack {
    fn default() -> Self {
        Self::new(crate::MAX_HIERARCHY_DEPTH)
    }
}
impl TransformStack {
    /// Create a new stack bounded at `limit` levels
    pub fn new(limit: usize) -> Self {
        Self {
            stack: vec![Transform::identity()],
            limit,
        }
    }
    /// Current depth, zero outside any instance
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }
    /// Push `placement`, composing it under the current net transform.
    /// Fails with a structural hierarchy-too-deep error past the bound.
    pub fn push(&mut self, placement: &CifPlacement) -> CifResult<()> {
        if self.depth() >= self.limit {
            return Err(CifError::Structural {
                msg: format!(
                    "hierarchy deeper than {} levels; cyclic instance chain suspected",
                    self.limit
                ),
            });
        }
        let net = Transform::cascade(self.top(), &placement.to_transform());
        self.stack.push(net);
        Ok(())
    }
    /// Pop the innermost placement. Popping the root is a structural error.
    pub fn pop(&mut self) -> CifResult<()> {
        if self.stack.len() <= 1 {
            return Err(CifError::Structural {
                msg: "transform stack underflow".to_string(),
            });
        }
        self.stack.pop();
        Ok(())
    }
    /// The current net transform
    pub fn top(&self) -> &Transform {
        self.stack.last().unwrap_or_else(|| unreachable!())
    }
    /// Net translation of the current composition
    pub fn net_translation(&self) -> Point {
        self.top().net_translation()
    }
    /// Net magnification of the current composition
    pub fn net_magnification(&self) -> f64 {
        self.top().net_magnification()
    }
    /// Transform a single point through the current composition
    pub fn transform_point(&self, p: &Point) -> Point {
        p.transform(self.top())
    }
    /// Transform a path of points through the current composition
    pub fn transform_path(&self, points: &[Point]) -> Vec<Point> {
        let t = self.top();
        points.iter().map(|p| p.transform(t)).collect()
    }
    /// Transform a bounding box. Returns a box shape under Manhattan
    /// compositions and a four-cornered polygon otherwise.
    pub fn transform_bbox(&self, bbox: &BoundBox) -> CifShape {
        let t = self.top();
        if t.is_manhattan() {
            CifShape::CifBox(CifBox::new(bbox.p0.transform(t), bbox.p1.transform(t)))
        } else {
            CifShape::Polygon(Polygon::new(
                CifBox::new(bbox.p0, bbox.p1)
                    .to_polygon()
                    .points
                    .iter()
                    .map(|p| p.transform(t))
                    .collect(),
            ))
        }
    }
}

/// # Ticket Table
///
/// Interns [CifPlacement]s by value and hands out stable [TicketId]s.
/// Repeated placements - arrays of the same via, standard-cell rows -
/// share one table entry.
#[derive(Debug, Clone, Default)]
pub struct TicketTable {
    tickets: Vec<CifPlacement>,
    index: HashMap<CifPlacement, TicketId>,
}
impl TicketTable {
    /// Create a new table holding only the identity placement at ticket zero
    pub fn new() -> Self {
        let mut table = Self::default();
        table.intern(&CifPlacement::default());
        table
    }
    /// Intern `placement`, returning the ticket of an existing equal value if present
    pub fn intern(&mut self, placement: &CifPlacement) -> TicketId {
        if let Some(id) = self.index.get(placement) {
            return *id;
        }
        let id = self.tickets.len() as TicketId;
        self.tickets.push(placement.clone());
        self.index.insert(placement.clone(), id);
        id
    }
    /// Retrieve the placement for ticket `id`
    pub fn get(&self, id: TicketId) -> Option<&CifPlacement> {
        self.tickets.get(id as usize)
    }
    /// Number of distinct placements interned
    pub fn len(&self) -> usize {
        self.tickets.len()
    }
    /// Boolean indication of an empty table
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_composition() {
        let mut stack = TransformStack::new(8);
        stack
            .push(&CifPlacement {
                origin: Point::new(100, 0),
                ..Default::default()
            })
            .unwrap();
        stack
            .push(&CifPlacement {
                axis: Point::new(0, 1),
                ..Default::default()
            })
            .unwrap();
        // Outer translation applies after the inner rotation
        assert_eq!(stack.transform_point(&Point::new(10, 0)), Point::new(100, 10));
        stack.pop().unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_err());
    }
    #[test]
    fn depth_bound_trips() {
        let mut stack = TransformStack::new(4);
        let p = CifPlacement::at(Point::new(1, 1));
        for _ in 0..4 {
            stack.push(&p).unwrap();
        }
        match stack.push(&p) {
            Err(CifError::Structural { .. }) => (),
            other => panic!("expected structural depth error, got {:?}", other),
        }
    }
    #[test]
    fn mirror_flips_rotation_sense() {
        // MY then R(0,1): mirror first, then rotate
        let placement = CifPlacement {
            mirror_y: true,
            axis: Point::new(0, 1),
            ..Default::default()
        };
        let t = placement.to_transform();
        // (1, 0) -> mirror -> (1, 0) -> rotate90 -> (0, 1)
        assert_eq!(Point::new(1, 0).transform(&t), Point::new(0, 1));
        // (0, 1) -> mirror -> (0, -1) -> rotate90 -> (1, 0)
        assert_eq!(Point::new(0, 1).transform(&t), Point::new(1, 0));
    }
    #[test]
    fn tickets_deduplicate() {
        let mut table = TicketTable::new();
        let a = CifPlacement::at(Point::new(5, 5));
        let b = CifPlacement::at(Point::new(5, 5));
        let c = CifPlacement::at(Point::new(6, 5));
        let ta = table.intern(&a);
        let tb = table.intern(&b);
        let tc = table.intern(&c);
        assert_eq!(ta, tb);
        assert_ne!(ta, tc);
        assert_eq!(table.get(ta), Some(&a));
    }
    #[test]
    fn magnification_composes_multiplicatively() {
        let mut stack = TransformStack::default();
        let double = CifPlacement {
            mag: (2, 1),
            ..Default::default()
        };
        stack.push(&double).unwrap();
        stack.push(&double).unwrap();
        assert_eq!(stack.net_magnification(), 4.0);
        assert_eq!(stack.transform_point(&Point::new(3, 3)), Point::new(12, 12));
    }
}
