//!
//! # Polygon Clip & Split Primitives
//!
//! Rectangle-boundary clipping and bbox-midline splitting, as consumed by
//! the shape-receiver pipeline stages. Polygons are hole-free point rings.
//!

// Local imports
use crate::bbox::{BoundBox, BoundBoxTrait};
use crate::geom::{Point, Polygon};
use crate::Int;

/// One axis-aligned clip boundary
#[derive(Debug, Clone, Copy)]
enum Bound {
    XMin(Int),
    XMax(Int),
    YMin(Int),
    YMax(Int),
}
impl Bound {
    fn keeps(&self, p: &Point) -> bool {
        match *self {
            Bound::XMin(v) => p.x >= v,
            Bound::XMax(v) => p.x <= v,
            Bound::YMin(v) => p.y >= v,
            Bound::YMax(v) => p.y <= v,
        }
    }
    /// Crossing point of segment `p`-`q` with the boundary line.
    /// Only called for segments with one endpoint on either side,
    /// so the divisor is non-zero.
    fn crossing(&self, p: &Point, q: &Point) -> Point {
        let (px, py) = (p.x as f64, p.y as f64);
        let (qx, qy) = (q.x as f64, q.y as f64);
        match *self {
            Bound::XMin(v) | Bound::XMax(v) => {
                let y = py + (qy - py) * (v as f64 - px) / (qx - px);
                Point::new(v, y.round() as Int)
            }
            Bound::YMin(v) | Bound::YMax(v) => {
                let x = px + (qx - px) * (v as f64 - py) / (qy - py);
                Point::new(x.round() as Int, v)
            }
        }
    }
}

/// Clip `points` against a single boundary, Sutherland-Hodgman style
fn clip_bound(points: &[Point], bound: Bound) -> Vec<Point> {
    let mut out = Vec::with_capacity(points.len() + 2);
    for i in 0..points.len() {
        let p = &points[i];
        let q = &points[(i + 1) % points.len()];
        let (pk, qk) = (bound.keeps(p), bound.keeps(q));
        if pk {
            out.push(*p);
        }
        if pk != qk {
            out.push(bound.crossing(p, q));
        }
    }
    out
}

/// Drop consecutive duplicate points, including wrap-around duplicates
fn dedup_ring(mut points: Vec<Point>) -> Vec<Point> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// # Polygon Clipping
///
/// Clip `poly` at the rectangle `clip`, appending the result (zero or one
/// polygon) to `out`. The world rectangle leaves the polygon untouched.
/// Clipping a concave polygon against a rectangle can pinch the result into
/// coincident boundary runs; these are retained rather than re-split.
pub fn clip_poly(poly: &Polygon, clip: &BoundBox, out: &mut Vec<Polygon>) {
    if clip.is_world() || poly.bbox().inside(clip) {
        out.push(poly.clone());
        return;
    }
    if clip.is_empty() {
        return;
    }
    let mut points = poly.points.clone();
    for bound in [
        Bound::XMin(clip.p0.x),
        Bound::XMax(clip.p1.x),
        Bound::YMin(clip.p0.y),
        Bound::YMax(clip.p1.y),
    ] {
        points = clip_bound(&points, bound);
        if points.is_empty() {
            return;
        }
    }
    let points = dedup_ring(points);
    if points.len() >= 3 {
        let p = Polygon { points };
        if p.area() > 0.0 {
            out.push(p);
        }
    }
}

/// # Polygon Splitting
///
/// Split `poly` at the midline of its bounding box, across the box's longer
/// axis, appending the pieces to `out`. Degenerate polygons which cannot be
/// halved come back as a single piece, unchanged; callers use the piece
/// count to detect that case.
pub fn split_polygon(poly: &Polygon, out: &mut Vec<Polygon>) {
    let bb = poly.bbox();
    let (w, h) = bb.size();
    let before = out.len();
    if w >= h && w >= 2 {
        let xm = bb.p0.x + w / 2;
        clip_poly(poly, &BoundBox::from_coords(bb.p0.x, bb.p0.y, xm, bb.p1.y), out);
        clip_poly(poly, &BoundBox::from_coords(xm, bb.p0.y, bb.p1.x, bb.p1.y), out);
    } else if h >= 2 {
        let ym = bb.p0.y + h / 2;
        clip_poly(poly, &BoundBox::from_coords(bb.p0.x, bb.p0.y, bb.p1.x, ym), out);
        clip_poly(poly, &BoundBox::from_coords(bb.p0.x, ym, bb.p1.x, bb.p1.y), out);
    }
    if out.len() == before {
        out.push(poly.clone());
    }
}

/// Convenience: the rectangle polygon of a [BoundBox]
pub fn box_polygon(b: &BoundBox) -> Polygon {
    Polygon {
        points: vec![
            b.p0,
            Point::new(b.p1.x, b.p0.y),
            b.p1,
            Point::new(b.p0.x, b.p1.y),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: Int, y0: Int, x1: Int, y1: Int) -> Polygon {
        box_polygon(&BoundBox::from_coords(x0, y0, x1, y1))
    }

    #[test]
    fn clip_box_like() {
        let poly = square(0, 0, 100, 100);
        let mut out = Vec::new();
        clip_poly(&poly, &BoundBox::from_coords(0, 0, 50, 200), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox(), BoundBox::from_coords(0, 0, 50, 100));
        assert_eq!(out[0].area(), 50.0 * 100.0);
    }
    #[test]
    fn clip_outside() {
        let poly = square(0, 0, 10, 10);
        let mut out = Vec::new();
        clip_poly(&poly, &BoundBox::from_coords(20, 20, 30, 30), &mut out);
        assert!(out.is_empty());
    }
    #[test]
    fn clip_world_is_identity() {
        let poly = square(0, 0, 10, 10);
        let mut out = Vec::new();
        clip_poly(&poly, &BoundBox::world(), &mut out);
        assert_eq!(out, vec![poly]);
    }
    #[test]
    fn clip_triangle() {
        let tri = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(0, 100),
        ]);
        let mut out = Vec::new();
        clip_poly(&tri, &BoundBox::from_coords(0, 0, 50, 50), &mut out);
        assert_eq!(out.len(), 1);
        // The hypotenuse passes exactly through (50, 50): the whole
        // clip square survives
        assert_eq!(out[0].points.len(), 4);
        assert_eq!(out[0].area(), 2500.0);
        assert_eq!(out[0].bbox(), BoundBox::from_coords(0, 0, 50, 50));

        // A tighter clip cuts the hypotenuse into a pentagon
        let mut out = Vec::new();
        clip_poly(&tri, &BoundBox::from_coords(0, 0, 80, 80), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].points.len(), 5);
    }
    #[test]
    fn split_halves() {
        let poly = square(0, 0, 100, 40);
        let mut out = Vec::new();
        split_polygon(&poly, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].bbox(), BoundBox::from_coords(0, 0, 50, 40));
        assert_eq!(out[1].bbox(), BoundBox::from_coords(50, 0, 100, 40));
    }
    #[test]
    fn split_degenerate() {
        let sliver = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(1, 1),
            Point::new(0, 1),
        ]);
        let mut out = Vec::new();
        split_polygon(&sliver, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], sliver);
    }
}
