//!
//! # Geometry Module
//!
//! Defines the core geometric types including [Point], [Shape], and [Transform],
//! and their core operations.
//!

// Crates.io
use derive_more::{Add, AddAssign, Sub, SubAssign};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

// Local imports
use crate::error::{LayoutError, LayoutResult};
use crate::Int;

/// # Point in two-dimensional layout-space
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Add,
    AddAssign,
    Sub,
    SubAssign,
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
    /// Create a new point shifted by `x` in the x-dimension and by `y` in the y-dimension
    pub fn shift(&self, p: &Point) -> Point {
        Point {
            x: p.x + self.x,
            y: p.y + self.y,
        }
    }
    /// Create a new [Point], transformed from our original location by `trans`.
    /// Coordinate transforms are applied in floating-point format,
    /// largely for rotations, and then rounded to the nearest integer.
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

/// # Rectangle
///
/// Axis-aligned rectangle, specified by two opposite corners.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}
impl Rect {
    /// Create a new [Rect] from two corner points
    pub fn new(p0: Point, p1: Point) -> Self {
        Self { p0, p1 }
    }
}

/// # Polygon
///
/// Closed n-sided polygon with arbitrary number of vertices.
/// Primarily consists of a series of ordered [Point]s.
///
/// Closure from the last point back to the first is implied;
/// the initial point need not be repeated at the end.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Polygon {
    pub points: Vec<Point>,
}
impl Polygon {
    /// Create a new [Polygon] from an ordered point-vector
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }
    /// Area of the polygon, via the shoelace sum.
    /// Always non-negative, independent of vertex orientation.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let p = &self.points[i];
            let q = &self.points[(i + 1) % n];
            sum += (p.x as f64) * (q.y as f64) - (q.x as f64) * (p.y as f64);
        }
        (sum / 2.0).abs()
    }
}

/// # Path
///
/// Open-ended geometric path with non-zero width.
/// Primarily consists of a series of ordered [Point]s.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Path {
    pub points: Vec<Point>,
    pub width: usize,
}
impl Path {
    /// Create a new [Path]
    pub fn new(points: Vec<Point>, width: usize) -> Self {
        Self { points, width }
    }
    /// Expand to a boundary [Polygon].
    /// Only "Manhattan paths", i.e. those with segments solely running
    /// vertically or horizontally, are supported; returns `None` otherwise.
    /// Ends are flat (no extension past the end points).
    pub fn to_poly(&self) -> Option<Polygon> {
        let pts = &self.points;
        if pts.len() < 2 {
            return None;
        }
        let half = (self.width / 2) as Int;
        // Unit direction of each segment; all must be axis-aligned
        let mut dirs: Vec<(Int, Int)> = Vec::with_capacity(pts.len() - 1);
        for k in 0..pts.len() - 1 {
            let dx = pts[k + 1].x - pts[k].x;
            let dy = pts[k + 1].y - pts[k].y;
            if dx != 0 && dy != 0 || (dx == 0 && dy == 0) {
                return None;
            }
            dirs.push((dx.signum(), dy.signum()));
        }
        // Normal of each direction: rotate left by 90 degrees
        let norm = |d: (Int, Int)| (-d.1, d.0);
        // One side of the expanded outline, walked start-to-end
        let side = |sign: Int| -> Vec<Point> {
            let mut out = Vec::new();
            let n0 = norm(dirs[0]);
            out.push(Point::new(pts[0].x + sign * half * n0.0, pts[0].y + sign * half * n0.1));
            for k in 1..pts.len() - 1 {
                let (na, nb) = (norm(dirs[k - 1]), norm(dirs[k]));
                if na == nb {
                    continue;
                }
                out.push(Point::new(
                    pts[k].x + sign * half * (na.0 + nb.0),
                    pts[k].y + sign * half * (na.1 + nb.1),
                ));
            }
            let nl = norm(dirs[dirs.len() - 1]);
            let last = pts[pts.len() - 1];
            out.push(Point::new(last.x + sign * half * nl.0, last.y + sign * half * nl.1));
            out
        };
        let mut points = side(1);
        let mut right = side(-1);
        right.reverse();
        points.extend(right);
        Some(Polygon { points })
    }
}

/// # Text
///
/// A layer-resident text annotation; carries no area.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Text {
    pub string: String,
    pub loc: Point,
}

/// # Edge
///
/// A directed line segment between two points; carries no area.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
    pub p0: Point,
    pub p1: Point,
}

/// # Edge Pair
///
/// Two related [Edge]s, as produced by edge-relation checks.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EdgePair {
    pub first: Edge,
    pub second: Edge,
}

/// # Shape
///
/// The primary geometric primitive comprising raw layout.
/// Area-carrying variants are [Rect], [Polygon], and [Path];
/// [Text], [Edge], and [EdgePair] carry no area and pass through
/// area-directed operations unchanged.
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[enum_dispatch(ShapeTrait)]
pub enum Shape {
    Rect(Rect),
    Polygon(Polygon),
    Path(Path),
    Text(Text),
    Edge(Edge),
    EdgePair(EdgePair),
}

impl Default for Shape {
    fn default() -> Self {
        Self::Rect(Rect::default())
    }
}

impl Shape {
    pub fn is_box(&self) -> bool {
        matches!(self, Shape::Rect(_))
    }
    pub fn is_polygon(&self) -> bool {
        matches!(self, Shape::Polygon(_))
    }
    pub fn is_path(&self) -> bool {
        matches!(self, Shape::Path(_))
    }
    pub fn is_text(&self) -> bool {
        matches!(self, Shape::Text(_))
    }
    pub fn is_edge(&self) -> bool {
        matches!(self, Shape::Edge(_))
    }
    pub fn is_edge_pair(&self) -> bool {
        matches!(self, Shape::EdgePair(_))
    }
    /// Normalize to a [Polygon], for the area-carrying variants.
    /// Returns `None` for [Text], [Edge], [EdgePair], and for [Path]s
    /// which cannot be expanded (non-Manhattan).
    pub fn as_polygon(&self) -> Option<Polygon> {
        match self {
            Shape::Rect(r) => Some(Polygon {
                points: vec![
                    r.p0,
                    Point::new(r.p1.x, r.p0.y),
                    r.p1,
                    Point::new(r.p0.x, r.p1.y),
                ],
            }),
            Shape::Polygon(p) => Some(p.clone()),
            Shape::Path(p) => p.to_poly(),
            Shape::Text(_) | Shape::Edge(_) | Shape::EdgePair(_) => None,
        }
    }
}

/// # ShapeTrait
///
/// Common shape operations, dispatched from the [Shape] enum to its variants by [enum_dispatch].
///
#[enum_dispatch]
pub trait ShapeTrait {
    /// Shift coordinates by the (x,y) values specified in `pt`
    fn shift(&mut self, pt: &Point);
    /// Total number of vertices
    fn vertex_count(&self) -> usize;
}

impl ShapeTrait for Rect {
    fn shift(&mut self, pt: &Point) {
        self.p0 += *pt;
        self.p1 += *pt;
    }
    fn vertex_count(&self) -> usize {
        4
    }
}
impl ShapeTrait for Polygon {
    fn shift(&mut self, pt: &Point) {
        for p in self.points.iter_mut() {
            *p += *pt;
        }
    }
    fn vertex_count(&self) -> usize {
        self.points.len()
    }
}
impl ShapeTrait for Path {
    fn shift(&mut self, pt: &Point) {
        for p in self.points.iter_mut() {
            *p += *pt;
        }
    }
    fn vertex_count(&self) -> usize {
        self.points.len()
    }
}
impl ShapeTrait for Text {
    fn shift(&mut self, pt: &Point) {
        self.loc += *pt;
    }
    fn vertex_count(&self) -> usize {
        1
    }
}
impl ShapeTrait for Edge {
    fn shift(&mut self, pt: &Point) {
        self.p0 += *pt;
        self.p1 += *pt;
    }
    fn vertex_count(&self) -> usize {
        2
    }
}
impl ShapeTrait for EdgePair {
    fn shift(&mut self, pt: &Point) {
        self.first.shift(pt);
        self.second.shift(pt);
    }
    fn vertex_count(&self) -> usize {
        4
    }
}

/// # Matrix-Vector Transformation
///
/// 2x2 rotation-matrix and two-entry translation vector,
/// used for relative movement of [Point]s and [Shape]s.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation / Transformation Matrix
    /// Represented in row-major order
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
    pub fn translate(x: Int, y: Int) -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [x as f64, y as f64],
        }
    }
    /// A transform to rotate by `angle` degrees
    pub fn rotate(angle: f64) -> Self {
        let sin = angle.to_radians().sin();
        let cos = angle.to_radians().cos();
        Self {
            a: [[cos, -sin], [sin, cos]],
            b: [0., 0.],
        }
    }
    /// A transform to reflect about the x-axis
    pub fn reflect_vert() -> Self {
        Self {
            a: [[1., 0.], [0., -1.]],
            b: [0., 0.],
        }
    }
    /// Create a transform from placement fields: location, rotation, and reflection
    pub fn from_placement(loc: &Point, reflect_vert: bool, angle: Option<f64>) -> Self {
        let b = [loc.x as f64, loc.y as f64];
        let (mut sin, mut cos) = (0., 1.);
        if let Some(angle) = angle {
            sin = angle.to_radians().sin();
            cos = angle.to_radians().cos();
        }
        let cos_refl = if reflect_vert { -cos } else { cos };
        let a = [[cos, -sin], [sin, cos_refl]];
        Self { a, b }
    }
    /// Create a new [Transform] that is the cascade of `parent` and `child`.
    ///
    /// "Parents" and "children" refer to typical layout-instance hierarchies,
    /// in which each level of instance has a nested set of transformations
    /// relative to its top-level parent. Note this operation *is not* commutative.
    pub fn cascade(parent: &Transform, child: &Transform) -> Transform {
        // The result-transform's origin is the parent's origin,
        // plus the parent-transformed child's origin
        let mut b = matvec(&parent.a, &child.b);
        b[0] += parent.b[0];
        b[1] += parent.b[1];
        // And the cascade-matrix is the product of the parent's and child's
        let a = matmul(&parent.a, &child.a);
        Self { a, b }
    }
    /// Compute the inverse transform, such that
    /// `p.transform(&t).transform(&t.invert()?) == p` (up to rounding).
    /// Fails for singular matrices.
    pub fn invert(&self) -> LayoutResult<Transform> {
        let det = self.a[0][0] * self.a[1][1] - self.a[0][1] * self.a[1][0];
        if det.abs() < 1e-12 {
            return LayoutError::fail("Cannot invert singular Transform");
        }
        let a = [
            [self.a[1][1] / det, -self.a[0][1] / det],
            [-self.a[1][0] / det, self.a[0][0] / det],
        ];
        let b = matvec(&a, &self.b);
        Ok(Self {
            a,
            b: [-b[0], -b[1]],
        })
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

pub trait TransformTrait {
    /// Apply matrix-vector [Transform] `trans`.
    /// Creates a new shape at a location equal to the transformation of our own.
    fn transform(&self, trans: &Transform) -> Self;
}
impl TransformTrait for Shape {
    fn transform(&self, trans: &Transform) -> Self {
        match self {
            Shape::Rect(r) => Shape::Rect(r.transform(trans)),
            Shape::Polygon(p) => Shape::Polygon(p.transform(trans)),
            Shape::Path(p) => Shape::Path(p.transform(trans)),
            Shape::Text(t) => Shape::Text(Text {
                string: t.string.clone(),
                loc: t.loc.transform(trans),
            }),
            Shape::Edge(e) => Shape::Edge(e.transform(trans)),
            Shape::EdgePair(ep) => Shape::EdgePair(EdgePair {
                first: ep.first.transform(trans),
                second: ep.second.transform(trans),
            }),
        }
    }
}
impl TransformTrait for Rect {
    fn transform(&self, trans: &Transform) -> Self {
        Rect {
            p0: self.p0.transform(trans),
            p1: self.p1.transform(trans),
        }
    }
}
impl TransformTrait for Polygon {
    fn transform(&self, trans: &Transform) -> Self {
        Polygon {
            points: self.points.iter().map(|p| p.transform(trans)).collect(),
        }
    }
}
impl TransformTrait for Path {
    fn transform(&self, trans: &Transform) -> Self {
        Path {
            points: self.points.iter().map(|p| p.transform(trans)).collect(),
            width: self.width,
        }
    }
}
impl TransformTrait for Edge {
    fn transform(&self, trans: &Transform) -> Self {
        Edge {
            p0: self.p0.transform(trans),
            p1: self.p1.transform(trans),
        }
    }
}
