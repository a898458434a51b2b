//! Conversions between the light point-sequence polygons used by the editor
//! (`Vec<egui::Pos2>`, closing vertex implicit) and `geo` polygons used for
//! boolean operations, plus the small amount of planar math the editor needs.

use egui::{pos2, Pos2, Rect};
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};

use crate::error::EditError;

/// Areas below this are treated as zero.
pub const AREA_EPSILON: f64 = 1e-9;

/// Close the ring and build a `geo` polygon.
///
/// Fails when fewer than 3 distinct vertices remain.
pub fn to_planar_polygon(points: &[Pos2]) -> Result<Polygon<f64>, EditError> {
    let distinct = distinct_vertex_count(points);
    if distinct < 3 {
        return Err(EditError::DegenerateGeometry { vertices: distinct });
    }

    let mut coords: Vec<Coord<f64>> = points.iter().map(|p| to_coord(*p)).collect();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords.push(coords[0]);
    Ok(Polygon::new(LineString::new(coords), vec![]))
}

/// Exterior ring of a `geo` polygon without the duplicated closing vertex.
/// Interior rings are not part of the artifact model and are dropped.
pub fn from_planar_polygon(polygon: &Polygon<f64>) -> Vec<Pos2> {
    let mut points: Vec<Pos2> = polygon
        .exterior()
        .coords()
        .map(|c| pos2(c.x as f32, c.y as f32))
        .collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

pub fn to_multi_polygon(points: &[Pos2]) -> Result<MultiPolygon<f64>, EditError> {
    Ok(MultiPolygon::new(vec![to_planar_polygon(points)?]))
}

fn to_coord(p: Pos2) -> Coord<f64> {
    Coord {
        x: f64::from(p.x),
        y: f64::from(p.y),
    }
}

pub fn distinct_vertex_count(points: &[Pos2]) -> usize {
    let mut keys: Vec<(u32, u32)> = points.iter().map(|p| (p.x.to_bits(), p.y.to_bits())).collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Shoelace area, positive for counter-clockwise rings in a y-up frame.
pub fn signed_area(points: &[Pos2]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        twice += f64::from(p.x) * f64::from(q.y) - f64::from(q.x) * f64::from(p.y);
    }
    twice * 0.5
}

pub fn polygon_area(points: &[Pos2]) -> f64 {
    signed_area(points).abs()
}

pub fn bounding_rect(points: &[Pos2]) -> Rect {
    Rect::from_points(points)
}

/// Area-weighted centroid. Near-zero-area rings fall back to the
/// bounding-box center.
pub fn centroid(points: &[Pos2]) -> Pos2 {
    let n = points.len();
    if n == 0 {
        return Pos2::ZERO;
    }

    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let (px, py) = (f64::from(points[i].x), f64::from(points[i].y));
        let q = points[(i + 1) % n];
        let (qx, qy) = (f64::from(q.x), f64::from(q.y));
        let cross = px * qy - qx * py;
        twice_area += cross;
        cx += (px + qx) * cross;
        cy += (py + qy) * cross;
    }

    let area = twice_area * 0.5;
    if area.abs() < AREA_EPSILON {
        return bounding_rect(points).center();
    }
    pos2((cx / (6.0 * area)) as f32, (cy / (6.0 * area)) as f32)
}

/// Even-odd point containment.
pub fn point_in_polygon(points: &[Pos2], point: Pos2) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = points[i];
        let vj = points[j];
        if (vi.y > point.y) != (vj.y > point.y)
            && point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub fn distance_point_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let len_sq = ab.dot(ab);
    if len_sq < 1e-10 {
        return ap.length();
    }
    let t = (ap.dot(ab) / len_sq).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (p - closest).length()
}

/// Convert a tolerance in screen pixels to world units at the given zoom,
/// so hit areas keep the same on-screen size at every zoom level.
pub fn world_tolerance(pixels: f32, zoom: f32) -> f32 {
    if zoom > 0.0 {
        pixels / zoom
    } else {
        pixels
    }
}

fn orientation(a: Pos2, b: Pos2, c: Pos2) -> f64 {
    let abx = f64::from(b.x) - f64::from(a.x);
    let aby = f64::from(b.y) - f64::from(a.y);
    let acx = f64::from(c.x) - f64::from(a.x);
    let acy = f64::from(c.y) - f64::from(a.y);
    abx * acy - aby * acx
}

fn on_segment(a: Pos2, b: Pos2, p: Pos2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Closed-segment intersection test, touching and collinear overlap included.
pub fn segments_intersect(a1: Pos2, a2: Pos2, b1: Pos2, b2: Pos2) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// Does any segment of the open polyline cross an edge of the closed ring?
pub fn polyline_crosses_ring(polyline: &[Pos2], ring: &[Pos2]) -> bool {
    let n = ring.len();
    if n < 2 {
        return false;
    }
    polyline.windows(2).any(|seg| {
        (0..n).any(|i| segments_intersect(seg[0], seg[1], ring[i], ring[(i + 1) % n]))
    })
}

/// A ring is simple when it has at least 3 distinct vertices, non-zero area,
/// and no two non-adjacent edges touch.
pub fn is_simple(points: &[Pos2]) -> bool {
    let n = points.len();
    if n < 3 || distinct_vertex_count(points) != n || polygon_area(points) < AREA_EPSILON {
        return false;
    }

    for i in 0..n {
        let a1 = points[i];
        let a2 = points[(i + 1) % n];
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            if segments_intersect(a1, a2, points[j], points[(j + 1) % n]) {
                return false;
            }
        }
    }
    true
}

/// Remove consecutive duplicates, including a duplicated closing vertex.
pub fn dedup_consecutive(points: &[Pos2]) -> Vec<Pos2> {
    let mut out: Vec<Pos2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Best-effort repair applied when a shape is committed.
///
/// Simple rings pass through. Self-intersecting rings are resolved with a
/// boolean self-union and the largest resulting piece is kept. Returns
/// `None` when nothing with 3 or more vertices survives.
pub fn repair_polygon(points: &[Pos2]) -> Option<Vec<Pos2>> {
    let cleaned = dedup_consecutive(points);
    if is_simple(&cleaned) {
        return Some(cleaned);
    }

    let shape = to_multi_polygon(&cleaned).ok()?;
    let resolved = shape.union(&shape);
    let largest = largest_polygon(&resolved)?;
    let repaired = dedup_consecutive(&from_planar_polygon(largest));
    if distinct_vertex_count(&repaired) < 3 || polygon_area(&repaired) < AREA_EPSILON {
        log::debug!("repair left a degenerate ring ({} vertices)", repaired.len());
        return None;
    }
    Some(repaired)
}

pub fn largest_polygon(shape: &MultiPolygon<f64>) -> Option<&Polygon<f64>> {
    shape
        .0
        .iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}
