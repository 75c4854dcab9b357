//!
//! # Shape Receiver Pipeline
//!
//! Composable transformation stages between a hierarchy traversal and a
//! target cell's shape container. Each stage owns its downstream receiver;
//! chains are terminated by the insert-as-is [ShapeInserter] unless a stage
//! such as [PolygonRefShapeReceiver] is itself terminal.
//!
//! Stages must not mutate the shapes or regions they are handed, and must
//! treat the world region as "no further clipping required".
//!

// Local imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::data::{PolygonRef, PushTarget};
use crate::geom::{Polygon, Rect, Shape, ShapeTrait};
use crate::hier::ComplexRegion;
use crate::poly::{box_polygon, clip_poly, split_polygon};

/// # Hierarchy Shape Receiver
///
/// Polymorphic over the three delivery variants: a generic shape, an
/// axis-aligned box, and a polygon. Implementations write any subset of
/// output shapes into `target`.
pub trait HierarchyShapeReceiver {
    fn push_shape(
        &mut self,
        shape: &Shape,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    );
    fn push_box(
        &mut self,
        bx: &BoundBox,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    );
    fn push_polygon(
        &mut self,
        poly: &Polygon,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    );
}

/// The default downstream stage: an explicitly-constructed [ShapeInserter]
pub fn default_pipe(
    pipe: Option<Box<dyn HierarchyShapeReceiver>>,
) -> Box<dyn HierarchyShapeReceiver> {
    pipe.unwrap_or_else(|| Box::new(ShapeInserter))
}

/// # Shape Inserter
///
/// Terminal stage inserting its inputs as-is. Boxes stay boxes.
#[derive(Debug, Default)]
pub struct ShapeInserter;
impl HierarchyShapeReceiver for ShapeInserter {
    fn push_shape(
        &mut self,
        shape: &Shape,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        target.shapes.insert(shape.clone());
    }
    fn push_box(
        &mut self,
        bx: &BoundBox,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        target.shapes.insert(Shape::Rect(Rect::new(bx.p0, bx.p1)));
    }
    fn push_polygon(
        &mut self,
        poly: &Polygon,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        target.shapes.insert(Shape::Polygon(poly.clone()));
    }
}

/// # Clipping Receiver
///
/// Cuts area shapes down to the search region (and, when present, the
/// complex-region rectangles). Shapes entirely inside pass through
/// unchanged with the world region, so downstream stages see no further
/// clipping demand; shapes entirely outside are dropped. Non-area shapes
/// pass through unclipped.
pub struct ClippingShapeReceiver {
    pipe: Box<dyn HierarchyShapeReceiver>,
}
impl ClippingShapeReceiver {
    pub fn new(pipe: Option<Box<dyn HierarchyShapeReceiver>>) -> Self {
        Self {
            pipe: default_pipe(pipe),
        }
    }

    /// Conservative inside-test. With a complex region the clipped bbox
    /// must lie inside a *single* rectangle; shapes covered only by several
    /// rectangles together fall through to the clipping path instead.
    fn is_inside(bb: &BoundBox, region: &BoundBox, complex: Option<&ComplexRegion>) -> bool {
        if region.is_world() {
            return true;
        }
        if bb.inside(region) {
            match complex {
                None => return true,
                Some(c) => {
                    let rect = region.intersection(bb);
                    for cr in c.overlapping(&rect) {
                        if rect.inside(cr) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn is_outside(bb: &BoundBox, region: &BoundBox, complex: Option<&ComplexRegion>) -> bool {
        if region.is_world() {
            return false;
        }
        if bb.overlaps(region) {
            let rect = region.intersection(bb);
            match complex {
                Some(c) => {
                    for cr in c.overlapping(&rect) {
                        if rect.overlaps(cr) {
                            return false;
                        }
                    }
                }
                None => return false,
            }
        }
        true
    }

    fn insert_clipped_box(
        &mut self,
        bx: &BoundBox,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let bb = bx.intersection(region);
        if bb.is_empty() {
            return;
        }
        let world = BoundBox::world();
        match complex {
            Some(c) => {
                for cr in c.overlapping(&bb) {
                    let r = cr.intersection(&bb);
                    if !r.is_empty() {
                        self.pipe.push_box(&r, &world, None, target);
                    }
                }
            }
            None => self.pipe.push_box(&bb, &world, None, target),
        }
    }

    fn insert_clipped_poly(
        &mut self,
        poly: &Polygon,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let mut clipped = Vec::new();
        match complex {
            Some(c) => {
                for cr in c.overlapping(region) {
                    clip_poly(poly, &cr.intersection(region), &mut clipped);
                }
            }
            None => clip_poly(poly, region, &mut clipped),
        }
        let world = BoundBox::world();
        for p in &clipped {
            self.pipe.push_polygon(p, &world, None, target);
        }
    }
}
impl HierarchyShapeReceiver for ClippingShapeReceiver {
    fn push_shape(
        &mut self,
        shape: &Shape,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let world = BoundBox::world();
        let bb = shape.bbox();
        if region.is_world() || Self::is_inside(&bb, region, complex) {
            self.pipe.push_shape(shape, &world, None, target);
        } else if !Self::is_outside(&bb, region, complex) {
            // clip the shape if required
            if shape.is_text() || shape.is_edge() || shape.is_edge_pair() {
                self.pipe.push_shape(shape, &world, None, target);
            } else if let Shape::Rect(r) = shape {
                self.insert_clipped_box(
                    &BoundBox::from_points(r.p0, r.p1),
                    region,
                    complex,
                    target,
                );
            } else if let Some(poly) = shape.as_polygon() {
                self.insert_clipped_poly(&poly, region, complex, target);
            } else {
                // non-normalizable paths pass through unclipped
                self.pipe.push_shape(shape, &world, None, target);
            }
        }
    }
    fn push_box(
        &mut self,
        bx: &BoundBox,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let world = BoundBox::world();
        if region.is_world() {
            self.pipe.push_box(bx, &world, None, target);
            return;
        }
        match complex {
            None => {
                let r = bx.intersection(region);
                if !r.is_empty() {
                    self.pipe.push_box(&r, &world, None, target);
                }
            }
            Some(_) => self.insert_clipped_box(bx, region, complex, target),
        }
    }
    fn push_polygon(
        &mut self,
        poly: &Polygon,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let world = BoundBox::world();
        if region.is_world() || (poly.bbox().inside(region) && complex.is_none()) {
            self.pipe.push_polygon(poly, &world, None, target);
        } else {
            self.insert_clipped_poly(poly, region, complex, target);
        }
    }
}

/// # Reducing Receiver
///
/// Recursively splits polygons which exceed `max_vertex_count` vertices or
/// whose bbox-to-area ratio exceeds `area_ratio` (sparse or spiky shapes).
/// Everything else passes through with its region untouched.
pub struct ReducingShapeReceiver {
    pipe: Box<dyn HierarchyShapeReceiver>,
    area_ratio: f64,
    max_vertex_count: usize,
}
impl ReducingShapeReceiver {
    pub fn new(
        pipe: Option<Box<dyn HierarchyShapeReceiver>>,
        area_ratio: f64,
        max_vertex_count: usize,
    ) -> Self {
        Self {
            pipe: default_pipe(pipe),
            area_ratio,
            max_vertex_count,
        }
    }

    fn reduce(
        &mut self,
        poly: &Polygon,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let area = poly.area();
        let sparse = area > 0.0 && poly.bbox().area() / area > self.area_ratio;
        if poly.vertex_count() > self.max_vertex_count || sparse {
            let mut pieces = Vec::new();
            split_polygon(poly, &mut pieces);
            if pieces.len() < 2 {
                // irreducible; emit rather than loop
                self.pipe.push_polygon(poly, region, complex, target);
            } else {
                for sp in &pieces {
                    self.reduce(sp, region, complex, target);
                }
            }
        } else {
            self.pipe.push_polygon(poly, region, complex, target);
        }
    }
}
impl HierarchyShapeReceiver for ReducingShapeReceiver {
    fn push_shape(
        &mut self,
        shape: &Shape,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        if shape.is_text() || shape.is_edge() || shape.is_edge_pair() {
            self.pipe.push_shape(shape, region, complex, target);
        } else if shape.is_box() {
            self.pipe.push_box(&shape.bbox(), region, complex, target);
        } else if let Some(poly) = shape.as_polygon() {
            self.reduce(&poly, region, complex, target);
        } else {
            self.pipe.push_shape(shape, region, complex, target);
        }
    }
    fn push_box(
        &mut self,
        bx: &BoundBox,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        self.pipe.push_box(bx, region, complex, target);
    }
    fn push_polygon(
        &mut self,
        poly: &Polygon,
        region: &BoundBox,
        complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        self.reduce(poly, region, complex, target);
    }
}

/// # Polygon-Reference Interning Receiver
///
/// Terminal stage: converts area shapes into [PolygonRef]s canonicalized in
/// the target layout's shape repository, and inserts them. Non-area shapes
/// are dropped.
#[derive(Debug, Default)]
pub struct PolygonRefShapeReceiver;
impl HierarchyShapeReceiver for PolygonRefShapeReceiver {
    fn push_shape(
        &mut self,
        shape: &Shape,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        if let Some(poly) = shape.as_polygon() {
            let pr = PolygonRef::new(&poly, target.repo);
            target.shapes.insert_ref(pr);
        }
    }
    fn push_box(
        &mut self,
        bx: &BoundBox,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let pr = PolygonRef::new(&box_polygon(bx), target.repo);
        target.shapes.insert_ref(pr);
    }
    fn push_polygon(
        &mut self,
        poly: &Polygon,
        _region: &BoundBox,
        _complex: Option<&ComplexRegion>,
        target: &mut PushTarget,
    ) {
        let pr = PolygonRef::new(poly, target.repo);
        target.shapes.insert_ref(pr);
    }
}
