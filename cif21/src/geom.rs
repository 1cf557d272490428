//!
//! # Geometry Module
//!
//! Defines the core geometric types - [Point], [BoundBox], and the
//! [CifShape] union of boxes, polygons, wires, and labels - along with
//! the value-operations the codec applies to them: bounding boxes,
//! window clipping, wire-outline expansion, and matrix transforms.
//!
//! All coordinate fields are post-scale integers; no shape stores
//! pre-scale file units.
//!

// Crates.io
use derive_more::{Add, AddAssign, Sub, SubAssign};
use enum_dispatch::enum_dispatch;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

// Local imports
use crate::error::CifWarning;
use crate::Int;

/// # Point in two-dimensional layout-space
#[derive(
    Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Add,
    AddAssign, Sub, SubAssign,
)]
pub struct Point {
    pub x: Int,
    pub y: Int,
}
impl Point {
    /// Create a new [Point] from (x,y) coordinates
    pub fn new(x: Int, y: Int) -> Self {
        Self { x, y }
    }
    /// Create a new point shifted by `p.x` in x and `p.y` in y
    pub fn shift(&self, p: &Point) -> Point {
        Point {
            x: p.x + self.x,
            y: p.y + self.y,
        }
    }
    /// Create a new [Point], transformed from our original location by `trans`.
    /// Coordinate transforms are applied in floating-point format,
    /// largely for non-Manhattan rotations, and then rounded to the nearest integer.
    pub fn transform(&self, trans: &Transform) -> Point {
        let xf = self.x as f64;
        let yf = self.y as f64;
        let x = trans.a[0][0] * xf + trans.a[0][1] * yf + trans.b[0];
        let y = trans.a[1][0] * xf + trans.a[1][1] * yf + trans.b[1];
        Self {
            x: x.round() as Int,
            y: y.round() as Int,
        }
    }
}

/// # Rectangular Bounding Box
///
/// Points `p0` and `p1` represent opposite corners,
/// `p0` closest to negative-infinity in both axes and `p1` closest to positive-infinity.
///
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct BoundBox {
    pub p0: Point,
    pub p1: Point,
}
impl BoundBox {
    /// Create a new [BoundBox] from two points, sorting their coordinates
    pub fn from_points(p0: Point, p1: Point) -> Self {
        Self {
            p0: Point::new(p0.x.min(p1.x), p0.y.min(p1.y)),
            p1: Point::new(p0.x.max(p1.x), p0.y.max(p1.y)),
        }
    }
    /// Create a zero-area [BoundBox] comprising solely `pt`
    pub fn from_point(pt: Point) -> Self {
        Self { p0: pt, p1: pt }
    }
    /// Create an empty, otherwise invalid [BoundBox]
    pub fn empty() -> Self {
        Self {
            p0: Point::new(Int::MAX, Int::MAX),
            p1: Point::new(Int::MIN, Int::MIN),
        }
    }
    /// Boolean indication of whether a box is empty
    pub fn is_empty(&self) -> bool {
        self.p0.x > self.p1.x || self.p0.y > self.p1.y
    }
    /// Boolean indication of whether [Point] `pt` lies inside our box, inclusive of edges.
    pub fn contains(&self, pt: &Point) -> bool {
        self.p0.x <= pt.x && self.p1.x >= pt.x && self.p0.y <= pt.y && self.p1.y >= pt.y
    }
    /// Boolean indication of whether we share any area with `other`, edges included.
    pub fn intersects(&self, other: &BoundBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.p0.x <= other.p1.x
            && self.p1.x >= other.p0.x
            && self.p0.y <= other.p1.y
            && self.p1.y >= other.p0.y
    }
    /// Compute the intersection with `other`. Returns the empty box when disjoint.
    pub fn intersection(&self, other: &BoundBox) -> BoundBox {
        let pmin = Point::new(self.p0.x.max(other.p0.x), self.p0.y.max(other.p0.y));
        let pmax = Point::new(self.p1.x.min(other.p1.x), self.p1.y.min(other.p1.y));
        if pmin.x > pmax.x || pmin.y > pmax.y {
            return BoundBox::empty();
        }
        BoundBox { p0: pmin, p1: pmax }
    }
    /// Compute the union with `other`
    pub fn union(&self, other: &BoundBox) -> BoundBox {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        BoundBox {
            p0: Point::new(self.p0.x.min(other.p0.x), self.p0.y.min(other.p0.y)),
            p1: Point::new(self.p1.x.max(other.p1.x), self.p1.y.max(other.p1.y)),
        }
    }
    /// Expand in all directions by `delta`
    pub fn expand(&mut self, delta: Int) {
        self.p0.x -= delta;
        self.p0.y -= delta;
        self.p1.x += delta;
        self.p1.y += delta;
    }
    /// Get the box's size as an (x,y) tuple
    pub fn size(&self) -> (Int, Int) {
        (self.p1.x - self.p0.x, self.p1.y - self.p0.y)
    }
}

/// # Matrix-Vector Transformation
///
/// 2x2 rotation/magnification matrix and two-entry translation vector,
/// used for relative movement of [Point]s and [CifShape]s.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation / Magnification Matrix, row-major
    pub a: [[f64; 2]; 2],
    /// X-Y Translation
    pub b: [f64; 2],
}
impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
impl Transform {
    /// The identity transform, leaving any transformed object unmodified
    pub fn identity() -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [0., 0.],
        }
    }
    /// Translation by (x,y)
    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [x, y],
        }
    }
    /// A transform rotating the positive x-axis onto direction vector `axis`.
    /// A zero axis is treated as no rotation.
    pub fn rotate_to(axis: &Point) -> Self {
        let (dx, dy) = (axis.x as f64, axis.y as f64);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return Self::identity();
        }
        let (cos, sin) = (dx / len, dy / len);
        Self {
            a: [[cos, -sin], [sin, cos]],
            b: [0., 0.],
        }
    }
    /// A transform to reflect about the x-axis (mirror in y)
    pub fn mirror_y() -> Self {
        Self {
            a: [[1., 0.], [0., -1.]],
            b: [0., 0.],
        }
    }
    /// Uniform magnification by `mag`
    pub fn magnify(mag: f64) -> Self {
        Self {
            a: [[mag, 0.], [0., mag]],
            b: [0., 0.],
        }
    }
    /// Create a new [Transform] that is the cascade of `parent` and `child`.
    ///
    /// "Parents" and "children" refer to typical layout-instance hierarchies:
    /// each level of instance carries a placement relative to its parent,
    /// and cascades compose in instantiation order, outermost first.
    /// Note this operation *is not* commutative.
    pub fn cascade(parent: &Transform, child: &Transform) -> Transform {
        // The result's origin is the parent's origin plus the parent-transformed child origin
        let mut b = matvec(&parent.a, &child.b);
        b[0] += parent.b[0];
        b[1] += parent.b[1];
        let a = matmul(&parent.a, &child.a);
        Self { a, b }
    }
    /// Compute our inverse transform.
    /// Returns `None` for singular (zero-determinant) matrices.
    pub fn inverse(&self) -> Option<Transform> {
        let det = self.a[0][0] * self.a[1][1] - self.a[0][1] * self.a[1][0];
        if det == 0.0 {
            return None;
        }
        let a = [
            [self.a[1][1] / det, -self.a[0][1] / det],
            [-self.a[1][0] / det, self.a[0][0] / det],
        ];
        let bt = matvec(&a, &self.b);
        Some(Transform {
            a,
            b: [-bt[0], -bt[1]],
        })
    }
    /// Net translation component
    pub fn net_translation(&self) -> Point {
        Point::new(self.b[0].round() as Int, self.b[1].round() as Int)
    }
    /// Net uniform magnification, the square root of the matrix determinant's magnitude
    pub fn net_magnification(&self) -> f64 {
        (self.a[0][0] * self.a[1][1] - self.a[0][1] * self.a[1][0])
            .abs()
            .sqrt()
    }
    /// Boolean indication of whether we map Manhattan geometry onto Manhattan geometry,
    /// i.e. whether the matrix is axis-aligned or axis-swapping.
    pub fn is_manhattan(&self) -> bool {
        (self.a[0][0] == 0.0 && self.a[1][1] == 0.0)
            || (self.a[0][1] == 0.0 && self.a[1][0] == 0.0)
    }
}
/// Multiply 2x2 matrices, returning a new 2x2 matrix
fn matmul(a: &[[f64; 2]; 2], b: &[[f64; 2]; 2]) -> [[f64; 2]; 2] {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}
/// Multiply a 2x2 matrix by a 2-entry vector, returning a new 2-entry vector
fn matvec(a: &[[f64; 2]; 2], b: &[f64; 2]) -> [f64; 2] {
    [
        a[0][0] * b[0] + a[0][1] * b[1],
        a[1][0] * b[0] + a[1][1] * b[1],
    ]
}

/// # Wire End-Style
///
/// How a wire's two endpoints terminate relative to its final vertices.
/// Encoded on-disk as the optional digit following the `W` record key.
#[derive(
    FromPrimitive, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum EndStyle {
    /// Cut off at the endpoint, no extension
    Flush = 0,
    /// Rounded ends. Expanded as square extensions when converted to outline form.
    Round = 1,
    /// Extended past the endpoint by half the wire width
    Extend = 2,
}
impl Default for EndStyle {
    /// Historical default: round ends
    fn default() -> Self {
        EndStyle::Round
    }
}

/// # Rectangular Box Primitive
///
/// Axis-aligned, stored as its two sorted corners.
/// Non-Manhattan rotated boxes are converted to [Polygon]s at parse time
/// via [CifBox::to_rotated_polygon].
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CifBox {
    pub p0: Point,
    pub p1: Point,
}
impl CifBox {
    /// Create from sorted or unsorted corner points
    pub fn new(p0: Point, p1: Point) -> Self {
        let bb = BoundBox::from_points(p0, p1);
        Self { p0: bb.p0, p1: bb.p1 }
    }
    /// Create from the on-disk form: width, height, and center point.
    /// Extents are preserved exactly, odd sizes included.
    pub fn from_center(width: Int, height: Int, center: Point) -> Self {
        let p0 = Point::new(center.x - width / 2, center.y - height / 2);
        Self::new(p0, Point::new(p0.x + width, p0.y + height))
    }
    /// Our center point
    pub fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2, (self.p0.y + self.p1.y) / 2)
    }
    /// Our width and height
    pub fn size(&self) -> (Int, Int) {
        (self.p1.x - self.p0.x, self.p1.y - self.p0.y)
    }
    /// Expand to a four-cornered closed [Polygon]
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            self.p0,
            Point::new(self.p1.x, self.p0.y),
            self.p1,
            Point::new(self.p0.x, self.p1.y),
        ])
    }
    /// Rotate about our center so the box's width-axis lands on direction `axis`,
    /// producing a closed five-point polygon ring.
    /// Manhattan axes reduce to an axis-aligned box; callers check
    /// [Point]-axis Manhattan-ness before electing this conversion.
    pub fn to_rotated_polygon(&self, axis: &Point) -> Polygon {
        let center = self.center();
        let rot = Transform::cascade(
            &Transform::translate(center.x as f64, center.y as f64),
            &Transform::cascade(
                &Transform::rotate_to(axis),
                &Transform::translate(-(center.x as f64), -(center.y as f64)),
            ),
        );
        Polygon::new(
            self.to_polygon()
                .points
                .iter()
                .map(|p| p.transform(&rot))
                .collect(),
        )
    }
}

/// # Polygon Primitive
///
/// Closed n-sided ring of ordered [Point]s.
/// The closure invariant `points[0] == points[last]` is maintained by
/// [Polygon::new]; on-disk records omitting the repeated first point are
/// closed by the reader.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Polygon {
    pub points: Vec<Point>,
}
impl Polygon {
    /// Create a new [Polygon], closing the ring if `points` does not
    pub fn new(mut points: Vec<Point>) -> Self {
        if let (Some(first), Some(last)) = (points.first().copied(), points.last().copied()) {
            if first != last {
                points.push(first);
            }
        }
        Self { points }
    }
    /// Number of distinct vertices, the closing point excluded
    pub fn num_vertices(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
    /// Compute our rectangular bounding box
    pub fn bbox(&self) -> BoundBox {
        let mut bb = BoundBox::empty();
        for pt in self.points.iter() {
            bb = bb.union(&BoundBox::from_point(*pt));
        }
        bb
    }
    /// Twice our signed area, by the shoelace formula.
    /// Positive for counter-clockwise rings.
    pub fn area2(&self) -> Int {
        let mut sum = 0;
        for w in self.points.windows(2) {
            sum += w[0].x * w[1].y - w[1].x * w[0].y;
        }
        sum
    }
    /// Boolean indication of a degenerate ring: fewer than three distinct
    /// vertices, or zero enclosed area.
    pub fn is_degenerate(&self) -> bool {
        self.num_vertices() < 3 || self.area2() == 0
    }
    /// Boolean indication of whether we form an axis-aligned rectangle
    pub fn is_rectangle(&self) -> bool {
        if self.num_vertices() != 4 {
            return false;
        }
        // Each edge must be horizontal or vertical, alternating
        let mut horiz = Vec::with_capacity(4);
        for w in self.points.windows(2) {
            if w[0].x == w[1].x && w[0].y != w[1].y {
                horiz.push(false);
            } else if w[0].y == w[1].y && w[0].x != w[1].x {
                horiz.push(true);
            } else {
                return false;
            }
        }
        horiz[0] != horiz[1] && horiz[1] != horiz[2] && horiz[2] != horiz[3]
    }
    /// Boolean indication of whether any pair of non-adjacent edges crosses.
    /// Quadratic in edge count; rings in this format are short.
    pub fn is_self_intersecting(&self) -> bool {
        let n = self.points.len().saturating_sub(1);
        if n < 4 {
            return false;
        }
        for i in 0..n {
            for j in (i + 2)..n {
                // Skip the wrap-around adjacency between the last and first edges
                if i == 0 && j == n - 1 {
                    continue;
                }
                if segments_cross(
                    &self.points[i],
                    &self.points[i + 1],
                    &self.points[j],
                    &self.points[j + 1],
                ) {
                    return true;
                }
            }
        }
        false
    }
    /// Boolean indication of whether we share any area with window `bbox`
    pub fn intersects(&self, bbox: &BoundBox) -> bool {
        if !self.bbox().intersects(bbox) {
            return false;
        }
        // Any vertex inside the window settles it
        if self.points.iter().any(|p| bbox.contains(p)) {
            return true;
        }
        // Any window corner inside the ring settles it
        let corners = [
            bbox.p0,
            Point::new(bbox.p1.x, bbox.p0.y),
            bbox.p1,
            Point::new(bbox.p0.x, bbox.p1.y),
        ];
        if corners.iter().any(|c| self.contains(c)) {
            return true;
        }
        // Otherwise an edge of ours must cross an edge of the window
        for w in self.points.windows(2) {
            for k in 0..4 {
                if segments_cross(&w[0], &w[1], &corners[k], &corners[(k + 1) % 4]) {
                    return true;
                }
            }
        }
        false
    }
    /// Boolean indication of whether the ring contains [Point] `pt`,
    /// inclusive of boundary points, by the winding-number method.
    pub fn contains(&self, pt: &Point) -> bool {
        if !self.bbox().contains(pt) {
            return false;
        }
        let mut winding: isize = 0;
        for w in self.points.windows(2) {
            let (past, next) = (&w[0], &w[1]);
            if past.y.min(next.y) <= pt.y && past.y.max(next.y) >= pt.y {
                if next.y == past.y {
                    // Horizontal segment on the point's y-level
                    if past.x.min(next.x) <= pt.x && past.x.max(next.x) >= pt.x {
                        return true;
                    }
                } else {
                    let xsolve =
                        (next.x - past.x) * (pt.y - past.y) / (next.y - past.y) + past.x;
                    if xsolve == pt.x {
                        return true;
                    } else if xsolve > pt.x && pt.y != past.y.max(next.y) {
                        if next.y > past.y {
                            winding += 1;
                        } else {
                            winding -= 1;
                        }
                    }
                }
            }
        }
        winding != 0
    }
    /// Clip against rectangular window `bbox` by Sutherland-Hodgman.
    /// Returns zero polygons when fully outside, and otherwise one;
    /// the result may be degenerate for degenerate inputs, which callers
    /// treat as a clip failure.
    pub fn clip(&self, bbox: &BoundBox) -> Vec<Polygon> {
        let mut pts: Vec<(f64, f64)> = self
            .points
            .iter()
            .take(self.points.len().saturating_sub(1))
            .map(|p| (p.x as f64, p.y as f64))
            .collect();
        // Clip successively against each window edge.
        // `inside` tests and `cross` interpolants per edge.
        let edges: [(bool, bool, f64); 4] = [
            (true, false, bbox.p0.x as f64),  // left:   x >= x0
            (true, true, bbox.p1.x as f64),   // right:  x <= x1
            (false, false, bbox.p0.y as f64), // bottom: y >= y0
            (false, true, bbox.p1.y as f64),  // top:    y <= y1
        ];
        for &(is_x, is_max, bound) in edges.iter() {
            if pts.is_empty() {
                break;
            }
            let inside = |p: &(f64, f64)| -> bool {
                let v = if is_x { p.0 } else { p.1 };
                if is_max {
                    v <= bound
                } else {
                    v >= bound
                }
            };
            let cross = |p: &(f64, f64), q: &(f64, f64)| -> (f64, f64) {
                if is_x {
                    let t = (bound - p.0) / (q.0 - p.0);
                    (bound, p.1 + t * (q.1 - p.1))
                } else {
                    let t = (bound - p.1) / (q.1 - p.1);
                    (p.0 + t * (q.0 - p.0), bound)
                }
            };
            let mut out = Vec::with_capacity(pts.len() + 2);
            for i in 0..pts.len() {
                let cur = pts[i];
                let prev = pts[(i + pts.len() - 1) % pts.len()];
                match (inside(&prev), inside(&cur)) {
                    (true, true) => out.push(cur),
                    (true, false) => out.push(cross(&prev, &cur)),
                    (false, true) => {
                        out.push(cross(&prev, &cur));
                        out.push(cur);
                    }
                    (false, false) => (),
                }
            }
            pts = out;
        }
        if pts.len() < 3 {
            return Vec::new();
        }
        let ring: Vec<Point> = pts
            .into_iter()
            .map(|(x, y)| Point::new(x.round() as Int, y.round() as Int))
            .collect();
        vec![Polygon::new(ring)]
    }
}
/// Boolean indication of whether segments (a,b) and (c,d) properly cross.
/// Shared endpoints and collinear touches do not count as crossings.
fn segments_cross(a: &Point, b: &Point, c: &Point, d: &Point) -> bool {
    let orient = |p: &Point, q: &Point, r: &Point| -> Int {
        ((q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)).signum()
    };
    let (o1, o2) = (orient(a, b, c), orient(a, b, d));
    let (o3, o4) = (orient(c, d, a), orient(c, d, b));
    o1 != o2 && o3 != o4 && o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0
}

/// # Wire Primitive
///
/// Open-ended path of non-zero width with an [EndStyle] governing its endpoints.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wire {
    pub width: Int,
    pub style: EndStyle,
    pub points: Vec<Point>,
}
impl Wire {
    /// Create a new [Wire]
    pub fn new(width: Int, style: EndStyle, points: Vec<Point>) -> Self {
        Self {
            width,
            style,
            points,
        }
    }
    /// Compute our rectangular bounding box: the path's, expanded by half our width
    pub fn bbox(&self) -> BoundBox {
        let mut bb = BoundBox::empty();
        for pt in self.points.iter() {
            bb = bb.union(&BoundBox::from_point(*pt));
        }
        if !bb.is_empty() {
            bb.expand(self.width / 2);
        }
        bb
    }
    /// Expand into a closed outline [Polygon], honoring width and end style.
    ///
    /// Flush ends retract each endpoint by half the width. When the first or
    /// last segment is shorter than that retraction, the wire degenerates:
    /// the returned polygon is the endpoint bounding box expanded by
    /// half-width, and a [CifWarning::Geometry] accompanies it.
    pub fn to_polygon(&self) -> (Polygon, Option<CifWarning>) {
        let half = self.width / 2;
        let mut pts = self.points.clone();
        // Degenerate forms fall back to an expanded bounding box
        let degenerate = |msg: &str| -> (Polygon, Option<CifWarning>) {
            let mut bb = BoundBox::empty();
            for pt in self.points.iter() {
                bb = bb.union(&BoundBox::from_point(*pt));
            }
            bb.expand(half);
            (
                CifBox::new(bb.p0, bb.p1).to_polygon(),
                Some(CifWarning::Geometry {
                    msg: msg.to_string(),
                    line: 0,
                }),
            )
        };
        if pts.len() < 2 || self.width <= 0 {
            return degenerate("wire with fewer than two points or non-positive width");
        }
        // Apply the end style by adjusting the terminal vertices along their segments
        let adjust = match self.style {
            EndStyle::Flush => -half,
            // Round ends render as square extensions in outline form
            EndStyle::Round | EndStyle::Extend => half,
        };
        if adjust != 0 {
            let first_len = seg_length(&pts[0], &pts[1]);
            let n = pts.len();
            let last_len = seg_length(&pts[n - 2], &pts[n - 1]);
            if adjust < 0 && (first_len < half || last_len < half) {
                return degenerate("flush wire segment shorter than the end retraction");
            }
            pts[0] = slide(&pts[1], &pts[0], adjust);
            pts[n - 1] = slide(&pts[n - 2], &pts[n - 1], adjust);
        }
        // Offset the adjusted centerline by half-width on each side, miter-joined
        let mut left = Vec::with_capacity(pts.len());
        let mut right = Vec::with_capacity(pts.len());
        for (k, pt) in pts.iter().enumerate() {
            let dir = if k == 0 {
                unit(&pts[0], &pts[1])
            } else if k == pts.len() - 1 {
                unit(&pts[k - 1], &pts[k])
            } else {
                let d0 = unit(&pts[k - 1], &pts[k]);
                let d1 = unit(&pts[k], &pts[k + 1]);
                let sum = (d0.0 + d1.0, d0.1 + d1.1);
                let len = (sum.0 * sum.0 + sum.1 * sum.1).sqrt();
                if len == 0.0 {
                    d0
                } else {
                    (sum.0 / len, sum.1 / len)
                }
            };
            let normal = (-dir.1, dir.0);
            let h = half as f64;
            left.push(Point::new(
                (pt.x as f64 + normal.0 * h).round() as Int,
                (pt.y as f64 + normal.1 * h).round() as Int,
            ));
            right.push(Point::new(
                (pt.x as f64 - normal.0 * h).round() as Int,
                (pt.y as f64 - normal.1 * h).round() as Int,
            ));
        }
        right.reverse();
        left.extend(right);
        let poly = Polygon::new(left);
        if poly.is_degenerate() {
            return degenerate("wire outline collapsed to zero area");
        }
        (poly, None)
    }
}
/// Length of the segment from `a` to `b`, rounded down
fn seg_length(a: &Point, b: &Point) -> Int {
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    (dx * dx + dy * dy).sqrt() as Int
}
/// Unit direction from `a` to `b`
fn unit(a: &Point, b: &Point) -> (f64, f64) {
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        (1.0, 0.0)
    } else {
        (dx / len, dy / len)
    }
}
/// Move point `p` along the direction from `anchor` to `p` by `amount`
fn slide(anchor: &Point, p: &Point, amount: Int) -> Point {
    let dir = unit(anchor, p);
    Point::new(
        (p.x as f64 + dir.0 * amount as f64).round() as Int,
        (p.y as f64 + dir.1 * amount as f64).round() as Int,
    )
}

/// # Text Label Primitive
///
/// Anchored text with an orientation code and optional explicit extents.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    /// Text Value
    pub text: String,
    /// Anchor Location
    pub loc: Point,
    /// Orientation code: quarter-turns in the low two bits, mirror in bit two
    pub orient: u8,
    /// Optional explicit width
    pub width: Option<Int>,
    /// Optional explicit height
    pub height: Option<Int>,
}
impl Label {
    /// Create a new un-rotated [Label] at `loc`
    pub fn new(text: impl Into<String>, loc: Point) -> Self {
        Self {
            text: text.into(),
            loc,
            ..Default::default()
        }
    }
    /// Compute our bounding box: the anchor point, expanded by any explicit extents
    pub fn bbox(&self) -> BoundBox {
        let w = self.width.unwrap_or(0);
        let h = self.height.unwrap_or(0);
        BoundBox::from_points(self.loc, Point::new(self.loc.x + w, self.loc.y + h))
    }
}

///
/// # Shape Union
///
/// The tagged union of geometric primitives comprising a cell's content.
/// In materialization mode shapes are owned by their cell; in streaming
/// mode they are transient - created, transformed, emitted, and discarded.
///
#[enum_dispatch]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CifShape {
    CifBox(CifBox),
    Polygon(Polygon),
    Wire(Wire),
    Label(Label),
}

/// # ShapeTrait
///
/// Common shape operations, dispatched from the [CifShape] enum to its
/// variants by [enum_dispatch].
#[enum_dispatch(CifShape)]
pub trait ShapeTrait {
    /// Compute a rectangular bounding box
    fn shape_bbox(&self) -> BoundBox;
    /// Shift coordinates by the (x,y) values in `pt`
    fn shape_shift(&mut self, pt: &Point);
}
impl ShapeTrait for CifBox {
    fn shape_bbox(&self) -> BoundBox {
        BoundBox::from_points(self.p0, self.p1)
    }
    fn shape_shift(&mut self, pt: &Point) {
        self.p0 = self.p0.shift(pt);
        self.p1 = self.p1.shift(pt);
    }
}
impl ShapeTrait for Polygon {
    fn shape_bbox(&self) -> BoundBox {
        self.bbox()
    }
    fn shape_shift(&mut self, pt: &Point) {
        for p in self.points.iter_mut() {
            *p = p.shift(pt);
        }
    }
}
impl ShapeTrait for Wire {
    fn shape_bbox(&self) -> BoundBox {
        self.bbox()
    }
    fn shape_shift(&mut self, pt: &Point) {
        for p in self.points.iter_mut() {
            *p = p.shift(pt);
        }
    }
}
impl ShapeTrait for Label {
    fn shape_bbox(&self) -> BoundBox {
        self.bbox()
    }
    fn shape_shift(&mut self, pt: &Point) {
        self.loc = self.loc.shift(pt);
    }
}
impl CifShape {
    /// Create a new shape at a location equal to the transformation of our own.
    ///
    /// A box under a non-Manhattan transform becomes a [Polygon]; wires have
    /// their width scaled by the transform's net magnification; label
    /// orientation codes compose with Manhattan rotations and pass through
    /// anything else unchanged.
    pub fn transformed(&self, trans: &Transform) -> CifShape {
        match self {
            CifShape::CifBox(b) => {
                if trans.is_manhattan() {
                    CifShape::CifBox(CifBox::new(
                        b.p0.transform(trans),
                        b.p1.transform(trans),
                    ))
                } else {
                    CifShape::Polygon(Polygon::new(
                        b.to_polygon()
                            .points
                            .iter()
                            .map(|p| p.transform(trans))
                            .collect(),
                    ))
                }
            }
            CifShape::Polygon(p) => CifShape::Polygon(Polygon {
                points: p.points.iter().map(|pt| pt.transform(trans)).collect(),
            }),
            CifShape::Wire(w) => CifShape::Wire(Wire {
                width: ((w.width as f64) * trans.net_magnification()).round() as Int,
                style: w.style,
                points: w.points.iter().map(|pt| pt.transform(trans)).collect(),
            }),
            CifShape::Label(l) => {
                let mut out = l.clone();
                out.loc = l.loc.transform(trans);
                if trans.is_manhattan() {
                    out.orient = compose_orient(l.orient, trans);
                }
                CifShape::Label(out)
            }
        }
    }
}
/// Compose a label orientation code with the Manhattan rotation/mirror of `trans`
fn compose_orient(orient: u8, trans: &Transform) -> u8 {
    // Recover quarter-turns and mirror from the matrix by probing the unit vectors
    let px = Point::new(1, 0).transform(&Transform {
        a: trans.a,
        b: [0., 0.],
    });
    let quarter = match (px.x.signum(), px.y.signum()) {
        (1, 0) => 0u8,
        (0, 1) => 1,
        (-1, 0) => 2,
        (0, -1) => 3,
        _ => 0,
    };
    let py = Point::new(0, 1).transform(&Transform {
        a: trans.a,
        b: [0., 0.],
    });
    // Mirrored when the transformed frame is left-handed
    let mirrored = (px.x * py.y - px.y * py.x) < 0;
    let rot = (orient & 0x3).wrapping_add(quarter) & 0x3;
    let mir = ((orient >> 2) & 1) ^ (mirrored as u8);
    (mir << 2) | rot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_closure() {
        let p = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ]);
        assert_eq!(p.points.first(), p.points.last());
        assert_eq!(p.num_vertices(), 4);
        assert!(p.is_rectangle());
        assert!(!p.is_degenerate());
    }
    #[test]
    fn polygon_clip_partial() {
        let p = CifBox::new(Point::new(0, 0), Point::new(10, 10)).to_polygon();
        let window = BoundBox::from_points(Point::new(5, 5), Point::new(20, 20));
        let clipped = p.clip(&window);
        assert_eq!(clipped.len(), 1);
        assert_eq!(
            clipped[0].bbox(),
            BoundBox::from_points(Point::new(5, 5), Point::new(10, 10))
        );
    }
    #[test]
    fn polygon_clip_disjoint() {
        let p = CifBox::new(Point::new(0, 0), Point::new(10, 10)).to_polygon();
        let window = BoundBox::from_points(Point::new(100, 100), Point::new(120, 120));
        assert!(p.clip(&window).is_empty());
        assert!(!p.intersects(&window));
    }
    #[test]
    fn self_intersection() {
        // A bowtie
        let p = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(10, 10),
            Point::new(10, 0),
            Point::new(0, 10),
        ]);
        assert!(p.is_self_intersecting());
        let q = CifBox::new(Point::new(0, 0), Point::new(4, 4)).to_polygon();
        assert!(!q.is_self_intersecting());
    }
    #[test]
    fn wire_flush_degenerates() {
        // Two-point wire of width 10, flush ends, segment length 4:
        // shorter than the retraction amount, so it degenerates with a warning.
        let w = Wire::new(
            10,
            EndStyle::Flush,
            vec![Point::new(0, 0), Point::new(4, 0)],
        );
        let (poly, warning) = w.to_polygon();
        assert!(warning.is_some());
        assert!(!poly.points.is_empty());
        assert_eq!(
            poly.bbox(),
            BoundBox::from_points(Point::new(-5, -5), Point::new(9, 5))
        );
    }
    #[test]
    fn wire_extend_outline() {
        let w = Wire::new(
            10,
            EndStyle::Extend,
            vec![Point::new(0, 0), Point::new(100, 0)],
        );
        let (poly, warning) = w.to_polygon();
        assert!(warning.is_none());
        assert_eq!(
            poly.bbox(),
            BoundBox::from_points(Point::new(-5, -5), Point::new(105, 5))
        );
    }
    #[test]
    fn box_rotation() {
        let b = CifBox::new(Point::new(-10, -5), Point::new(10, 5));
        // A Manhattan quarter-turn keeps the corners on-grid
        let p = b.to_rotated_polygon(&Point::new(0, 1));
        assert_eq!(
            p.bbox(),
            BoundBox::from_points(Point::new(-5, -10), Point::new(5, 10))
        );
        // A diagonal axis produces a genuinely non-Manhattan ring
        let p45 = b.to_rotated_polygon(&Point::new(1, 1));
        assert_eq!(p45.num_vertices(), 4);
        assert!(!p45.is_rectangle());
    }
    #[test]
    fn transform_cascade_order() {
        let t1 = Transform::mirror_y();
        let t2 = Transform::translate(1., 1.);
        let p = Point::new(1, 1);
        assert_eq!(p.transform(&Transform::cascade(&t1, &t2)), Point::new(2, -2));
        assert_eq!(p.transform(&Transform::cascade(&t2, &t1)), Point::new(2, 0));
    }
    #[test]
    fn transform_inverse() {
        let t = Transform::cascade(
            &Transform::translate(10., -3.),
            &Transform::rotate_to(&Point::new(0, 1)),
        );
        let inv = t.inverse().unwrap();
        let p = Point::new(17, 42);
        assert_eq!(p.transform(&t).transform(&inv), p);
    }
}
