//!
//! # Rectangular Bounding Boxes and Associated Trait
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::geom::{Point, Shape};
use crate::Int;

/// # Rectangular Bounding Box
///
/// Points `p0` and `p1` represent opposite corners of a bounding rectangle.
/// `p0` is always closest to negative-infinity, in both x and y,
/// and `p1` is always closest to positive-infinity.
///
/// Two sentinel values exist: the *empty* box, which unions as a neutral
/// element and intersects to nothing, and the *world* box, which spans the
/// entire coordinate space and serves as the "no clipping" marker for
/// traversal regions. Neither sentinel may be transformed.
///
#[derive(
    Debug, Clone, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct BoundBox {
    pub p0: Point,
    pub p1: Point,
}
impl BoundBox {
    /// Create a new [BoundBox] from two [Point]s.
    /// Callers are responsible for ensuring that p0.x <= p1.x, and p0.y <= p1.y.
    fn new(p0: Point, p1: Point) -> Self {
        Self { p0, p1 }
    }
    /// Create a new [BoundBox] from a single [Point].
    /// The resultant [BoundBox] comprises solely the point, having zero area.
    pub fn from_point(pt: Point) -> Self {
        Self { p0: pt, p1: pt }
    }
    /// Create a new [BoundBox] from two points in arbitrary corner order
    pub fn from_points(p0: Point, p1: Point) -> Self {
        Self {
            p0: Point::new(p0.x.min(p1.x), p0.y.min(p1.y)),
            p1: Point::new(p0.x.max(p1.x), p0.y.max(p1.y)),
        }
    }
    /// Create a new [BoundBox] from (x0, y0, x1, y1) coordinates
    pub fn from_coords(x0: Int, y0: Int, x1: Int, y1: Int) -> Self {
        Self::from_points(Point::new(x0, y0), Point::new(x1, y1))
    }
    /// Create an empty, otherwise invalid [BoundBox]
    pub fn empty() -> Self {
        Self {
            p0: Point::new(Int::MAX, Int::MAX),
            p1: Point::new(Int::MIN, Int::MIN),
        }
    }
    /// Create the world [BoundBox], spanning the entire coordinate space.
    /// Serves as the "no clipping" sentinel for traversal regions.
    pub fn world() -> Self {
        Self {
            p0: Point::new(Int::MIN, Int::MIN),
            p1: Point::new(Int::MAX, Int::MAX),
        }
    }
    /// Boolean indication of whether a box is empty
    pub fn is_empty(&self) -> bool {
        self.p0.x > self.p1.x || self.p0.y > self.p1.y
    }
    /// Boolean indication of whether this is the world box
    pub fn is_world(&self) -> bool {
        *self == Self::world()
    }
    /// Boolean indication of whether [Point] `pt` lies inside our box.
    pub fn contains(&self, pt: &Point) -> bool {
        self.p0.x <= pt.x && self.p1.x >= pt.x && self.p0.y <= pt.y && self.p1.y >= pt.y
    }
    /// Boolean indication of whether `other` and our box share inner area.
    /// Mere edge or corner contact does not count as overlap.
    pub fn overlaps(&self, other: &BoundBox) -> bool {
        self.p0.x < other.p1.x
            && other.p0.x < self.p1.x
            && self.p0.y < other.p1.y
            && other.p0.y < self.p1.y
    }
    /// Boolean indication of whether `other` and our box share at least a
    /// boundary point. Edge and corner contact counts.
    pub fn touches(&self, other: &BoundBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.p0.x <= other.p1.x
            && other.p0.x <= self.p1.x
            && self.p0.y <= other.p1.y
            && other.p0.y <= self.p1.y
    }
    /// Boolean indication of whether our box lies fully inside `other`.
    pub fn inside(&self, other: &BoundBox) -> bool {
        !self.is_empty()
            && other.p0.x <= self.p0.x
            && self.p1.x <= other.p1.x
            && other.p0.y <= self.p0.y
            && self.p1.y <= other.p1.y
    }
    /// Expand in all directions by `delta`
    pub fn expand(&mut self, delta: Int) {
        if !self.is_empty() {
            self.p0.x -= delta;
            self.p0.y -= delta;
            self.p1.x += delta;
            self.p1.y += delta;
        }
    }
    /// Box area, in floating-point to stay clear of fixed-width overflow
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (self.p1.x as f64 - self.p0.x as f64) * (self.p1.y as f64 - self.p0.y as f64)
    }
    /// Get the box's size as an (x,y) tuple
    pub fn size(&self) -> (Int, Int) {
        (self.p1.x - self.p0.x, self.p1.y - self.p0.y)
    }
    /// Create the bounding box of our corners after applying `trans`.
    /// The empty and world sentinels map onto themselves.
    pub fn transform(&self, trans: &crate::geom::Transform) -> BoundBox {
        if self.is_empty() {
            return Self::empty();
        }
        if self.is_world() {
            return Self::world();
        }
        let corners = [
            self.p0,
            Point::new(self.p1.x, self.p0.y),
            self.p1,
            Point::new(self.p0.x, self.p1.y),
        ];
        let mut bbox = BoundBox::empty();
        for c in &corners {
            bbox = c.transform(trans).union(&bbox);
        }
        bbox
    }
}

///
/// # Bounding Box Trait
///
/// Methods for interacting with [BoundBox]s.
/// Implementations for [Point]s, [Shape]s, and [BoundBox]s
/// enable geometric combination such as union and intersection.
///
pub trait BoundBoxTrait {
    /// Compute the intersection with rectangular bounding box `bbox`.
    /// Creates and returns a new [BoundBox].
    fn intersection(&self, bbox: &BoundBox) -> BoundBox;
    /// Compute the union with rectangular bounding box `bbox`.
    /// Creates and returns a new [BoundBox].
    fn union(&self, bbox: &BoundBox) -> BoundBox;
    /// Compute a rectangular bounding box around the implementing type.
    fn bbox(&self) -> BoundBox;
}

impl BoundBoxTrait for BoundBox {
    fn intersection(&self, bbox: &BoundBox) -> BoundBox {
        let pmin = Point::new(self.p0.x.max(bbox.p0.x), self.p0.y.max(bbox.p0.y));
        let pmax = Point::new(self.p1.x.min(bbox.p1.x), self.p1.y.min(bbox.p1.y));
        if pmin.x > pmax.x || pmin.y > pmax.y {
            return BoundBox::empty();
        }
        BoundBox::new(pmin, pmax)
    }
    fn union(&self, bbox: &BoundBox) -> BoundBox {
        BoundBox::new(
            Point::new(self.p0.x.min(bbox.p0.x), self.p0.y.min(bbox.p0.y)),
            Point::new(self.p1.x.max(bbox.p1.x), self.p1.y.max(bbox.p1.y)),
        )
    }
    fn bbox(&self) -> BoundBox {
        self.clone()
    }
}

impl BoundBoxTrait for Point {
    fn intersection(&self, bbox: &BoundBox) -> BoundBox {
        if !bbox.contains(self) {
            return BoundBox::empty();
        }
        BoundBox::from_point(*self)
    }
    fn union(&self, bbox: &BoundBox) -> BoundBox {
        BoundBox::new(
            Point::new(self.x.min(bbox.p0.x), self.y.min(bbox.p0.y)),
            Point::new(self.x.max(bbox.p1.x), self.y.max(bbox.p1.y)),
        )
    }
    fn bbox(&self) -> BoundBox {
        BoundBox::from_point(*self)
    }
}

impl BoundBoxTrait for crate::geom::Polygon {
    fn intersection(&self, bbox: &BoundBox) -> BoundBox {
        self.bbox().intersection(bbox)
    }
    fn union(&self, bbox: &BoundBox) -> BoundBox {
        self.bbox().union(bbox)
    }
    fn bbox(&self) -> BoundBox {
        let mut bbox = BoundBox::empty();
        for pt in &self.points {
            bbox = pt.union(&bbox);
        }
        bbox
    }
}

impl BoundBoxTrait for Shape {
    fn intersection(&self, bbox: &BoundBox) -> BoundBox {
        self.bbox().intersection(bbox)
    }
    fn union(&self, bbox: &BoundBox) -> BoundBox {
        self.bbox().union(bbox)
    }
    fn bbox(&self) -> BoundBox {
        match self {
            Shape::Rect(r) => BoundBox::from_points(r.p0, r.p1),
            Shape::Polygon(p) => p.bbox(),
            Shape::Path(p) => {
                let mut bbox = BoundBox::empty();
                for pt in &p.points {
                    bbox = pt.union(&bbox);
                }
                bbox.expand((p.width / 2) as Int);
                bbox
            }
            Shape::Text(t) => BoundBox::from_point(t.loc),
            Shape::Edge(e) => BoundBox::from_points(e.p0, e.p1),
            Shape::EdgePair(ep) => {
                let first = BoundBox::from_points(ep.first.p0, ep.first.p1);
                BoundBox::from_points(ep.second.p0, ep.second.p1).union(&first)
            }
        }
    }
}
