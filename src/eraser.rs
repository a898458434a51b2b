//! Eraser engine: turns a brush stroke into a planar region and subtracts it
//! from artifact polygons.

use std::f64::consts::PI;

use egui::Pos2;
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};

use crate::config::EditorConfig;
use crate::error::EditError;
use crate::geometry;

/// What one eraser stroke did to one polygon.
#[derive(Clone, Debug, PartialEq)]
pub enum EraseOutcome {
    /// The stroke removed nothing.
    Unchanged,
    /// Nothing large enough survived.
    Deleted,
    /// One piece survived (or only one counts as significant).
    Replaced(Vec<Pos2>),
    /// Two or more significant pieces, largest first.
    Split(Vec<Vec<Pos2>>),
}

/// Area covered by a stroke of the given brush width: the polyline buffered
/// with round caps and joins.
pub fn eraser_region(
    points: &[Pos2],
    brush_width: f32,
    config: &EditorConfig,
) -> Result<MultiPolygon<f64>, EditError> {
    if points.len() < 2 {
        return Err(EditError::InvalidStroke(format!(
            "eraser stroke needs at least 2 points, got {}",
            points.len()
        )));
    }

    let radius = (f64::from(brush_width) / 2.0).max(config.min_eraser_radius);
    let arc = config.eraser_arc_segments.max(2);

    let mut region = MultiPolygon::new(vec![]);
    for seg in points.windows(2) {
        let capsule = MultiPolygon::new(vec![capsule(seg[0], seg[1], radius, arc)]);
        region = if region.0.is_empty() {
            capsule
        } else {
            region.union(&capsule)
        };
    }

    if region.unsigned_area() < geometry::AREA_EPSILON {
        return Err(EditError::InvalidStroke("eraser region is empty".into()));
    }
    Ok(region)
}

/// Segment `a..b` thickened by `radius`, with half circles of `arc`
/// segments at both ends. Degenerates to a circle when `a == b`.
fn capsule(a: Pos2, b: Pos2, radius: f64, arc: usize) -> Polygon<f64> {
    let (ax, ay) = (f64::from(a.x), f64::from(a.y));
    let (bx, by) = (f64::from(b.x), f64::from(b.y));
    let (dx, dy) = (bx - ax, by - ay);
    let heading = if dx.abs() < f64::EPSILON && dy.abs() < f64::EPSILON {
        0.0
    } else {
        dy.atan2(dx)
    };

    let step = PI / arc as f64;
    let mut coords = Vec::with_capacity(2 * arc + 3);
    for k in 0..=arc {
        let t = heading - PI / 2.0 + step * k as f64;
        coords.push(Coord {
            x: bx + radius * t.cos(),
            y: by + radius * t.sin(),
        });
    }
    for k in 0..=arc {
        let t = heading + PI / 2.0 + step * k as f64;
        coords.push(Coord {
            x: ax + radius * t.cos(),
            y: ay + radius * t.sin(),
        });
    }
    coords.push(coords[0]);
    Polygon::new(LineString::new(coords), vec![])
}

/// Cheap pre-filter: could this stroke touch the polygon at all?
///
/// Bounding boxes must overlap, and then either a stroke sample lies inside
/// the polygon or a stroke segment crosses its boundary.
pub fn is_candidate(polygon: &[Pos2], stroke_points: &[Pos2], radius: f32) -> bool {
    if polygon.len() < 3 || stroke_points.is_empty() {
        return false;
    }
    let stroke_box = geometry::bounding_rect(stroke_points).expand(radius.max(0.0));
    if !geometry::bounding_rect(polygon).intersects(stroke_box) {
        return false;
    }
    stroke_points
        .iter()
        .any(|p| geometry::point_in_polygon(polygon, *p))
        || geometry::polyline_crosses_ring(stroke_points, polygon)
}

/// Subtract `region` from `polygon` and classify what is left.
pub fn erase_polygon(
    polygon: &[Pos2],
    region: &MultiPolygon<f64>,
    config: &EditorConfig,
) -> Result<EraseOutcome, EditError> {
    let target = geometry::to_multi_polygon(polygon)?;
    let original_area = target.unsigned_area();
    let remaining = target.difference(region);

    if let Some(piece) = remaining.0.iter().find(|piece| has_hole(piece)) {
        log::debug!(
            "erase would cut {} hole(s) into the polygon, leaving it as is",
            piece.interiors().len()
        );
        return Ok(EraseOutcome::Unchanged);
    }

    let outcome = classify_pieces(&remaining, config);
    if let EraseOutcome::Replaced(ring) = &outcome {
        if remaining.0.len() == 1 && same_shape(polygon, original_area, ring) {
            return Ok(EraseOutcome::Unchanged);
        }
    }
    Ok(outcome)
}

/// Rings with no area (touching boundaries) are not holes.
fn has_hole(piece: &Polygon<f64>) -> bool {
    piece
        .interiors()
        .iter()
        .any(|ring| Polygon::new(ring.clone(), vec![]).unsigned_area() >= geometry::AREA_EPSILON)
}

fn same_shape(original: &[Pos2], original_area: f64, ring: &[Pos2]) -> bool {
    geometry::distinct_vertex_count(original) == geometry::distinct_vertex_count(ring)
        && (geometry::polygon_area(ring) - original_area).abs() <= original_area * 1e-6
}

/// Decide the fate of the pieces left after a difference.
///
/// Pieces smaller than `min_fragment_area` are discarded. A piece is
/// significant when its area is at least `significance_ratio` of the total
/// area of all pieces. Each piece becomes its exterior ring and is measured
/// by it.
pub fn classify_pieces(remaining: &MultiPolygon<f64>, config: &EditorConfig) -> EraseOutcome {
    let mut pieces: Vec<(f64, Vec<Pos2>)> = remaining
        .0
        .iter()
        .map(|piece| {
            let ring = geometry::from_planar_polygon(piece);
            (geometry::polygon_area(&ring), ring)
        })
        .collect();
    let total: f64 = pieces.iter().map(|(area, _)| area).sum();

    pieces.retain(|(area, ring)| {
        *area >= config.min_fragment_area && geometry::distinct_vertex_count(ring) >= 3
    });
    if pieces.is_empty() {
        return EraseOutcome::Deleted;
    }
    pieces.sort_by(|a, b| b.0.total_cmp(&a.0));

    let threshold = config.significance_ratio * total;
    let significant = pieces.iter().filter(|(area, _)| *area >= threshold).count();
    log::debug!(
        "erase left {} piece(s), {significant} significant, total area {total:.1}",
        pieces.len()
    );

    if significant >= 2 {
        EraseOutcome::Split(
            pieces
                .into_iter()
                .filter(|(area, _)| *area >= threshold)
                .map(|(_, ring)| ring)
                .collect(),
        )
    } else {
        let (_, largest) = pieces.swap_remove(0);
        EraseOutcome::Replaced(largest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            vec![],
        )
    }

    fn square(min: f32, max: f32) -> Vec<Pos2> {
        vec![pos2(min, min), pos2(max, min), pos2(max, max), pos2(min, max)]
    }

    #[test]
    fn region_of_straight_stroke_is_a_capsule() {
        let config = EditorConfig::default();
        let region = eraser_region(&[pos2(0.0, 50.0), pos2(100.0, 50.0)], 10.0, &config).unwrap();
        let area = region.unsigned_area();
        // 100 x 10 body plus two polygonal half discs of radius 5
        assert!(area > 1070.0 && area < 1080.0, "area {area}");
    }

    #[test]
    fn thin_brush_uses_minimum_radius() {
        let config = EditorConfig::default();
        let region = eraser_region(&[pos2(0.0, 0.0), pos2(10.0, 0.0)], 0.0, &config).unwrap();
        let area = region.unsigned_area();
        assert!(area > 10.0 && area < 11.0, "area {area}");
    }

    #[test]
    fn region_needs_two_points() {
        let config = EditorConfig::default();
        assert!(matches!(
            eraser_region(&[pos2(0.0, 0.0)], 10.0, &config),
            Err(EditError::InvalidStroke(_))
        ));
    }

    #[test]
    fn candidate_requires_contact() {
        let sq = square(100.0, 200.0);
        assert!(is_candidate(&sq, &[pos2(150.0, 150.0), pos2(160.0, 150.0)], 5.0));
        assert!(is_candidate(&sq, &[pos2(50.0, 150.0), pos2(250.0, 150.0)], 5.0));
        assert!(!is_candidate(&sq, &[pos2(300.0, 300.0), pos2(350.0, 300.0)], 5.0));
        // boxes overlap but the stroke only runs alongside
        assert!(!is_candidate(&sq, &[pos2(90.0, 120.0), pos2(90.0, 180.0)], 15.0));
    }

    #[test]
    fn stroke_outside_leaves_polygon_unchanged() {
        let config = EditorConfig::default();
        let region = eraser_region(&[pos2(300.0, 300.0), pos2(350.0, 300.0)], 10.0, &config).unwrap();
        assert_eq!(
            erase_polygon(&square(100.0, 200.0), &region, &config).unwrap(),
            EraseOutcome::Unchanged
        );
    }

    #[test]
    fn stroke_through_the_middle_splits() {
        let config = EditorConfig::default();
        let region = eraser_region(&[pos2(150.0, 50.0), pos2(150.0, 250.0)], 10.0, &config).unwrap();
        match erase_polygon(&square(100.0, 200.0), &region, &config).unwrap() {
            EraseOutcome::Split(pieces) => {
                assert_eq!(pieces.len(), 2);
                for piece in &pieces {
                    let area = geometry::polygon_area(piece);
                    assert!((area - 4500.0).abs() < 1.0, "area {area}");
                }
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    fn ring(center: Pos2, radius: f32, samples: usize) -> Vec<Pos2> {
        (0..=samples)
            .map(|i| {
                let t = i as f32 / samples as f32 * std::f32::consts::TAU;
                pos2(center.x + radius * t.cos(), center.y + radius * t.sin())
            })
            .collect()
    }

    #[test]
    fn closed_loop_inside_leaves_polygon_unchanged() {
        let config = EditorConfig::default();
        let region = eraser_region(&ring(pos2(200.0, 200.0), 50.0, 72), 10.0, &config).unwrap();
        assert_eq!(
            erase_polygon(&square(100.0, 300.0), &region, &config).unwrap(),
            EraseOutcome::Unchanged
        );
    }

    #[test]
    fn hole_is_detected_only_with_area() {
        let outer = rect(0.0, 0.0, 100.0, 100.0);
        let holed = Polygon::new(
            outer.exterior().clone(),
            vec![rect(40.0, 40.0, 60.0, 60.0).exterior().clone()],
        );
        assert!(has_hole(&holed));
        assert!(!has_hole(&outer));
    }

    #[test]
    fn classification_drops_tiny_pieces() {
        let config = EditorConfig::default();
        let remaining = MultiPolygon::new(vec![rect(0.0, 0.0, 5.0, 5.0)]);
        assert_eq!(classify_pieces(&remaining, &config), EraseOutcome::Deleted);
    }

    #[test]
    fn classification_keeps_largest_when_only_one_is_significant() {
        let config = EditorConfig::default();
        let remaining = MultiPolygon::new(vec![
            rect(0.0, 0.0, 30.0, 30.0),
            rect(200.0, 0.0, 300.0, 100.0),
            rect(400.0, 0.0, 405.0, 5.0),
        ]);
        match classify_pieces(&remaining, &config) {
            EraseOutcome::Replaced(ring) => {
                assert!((geometry::polygon_area(&ring) - 10000.0).abs() < 1e-6);
            }
            other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn classification_splits_on_two_significant_pieces() {
        let config = EditorConfig::default();
        let remaining = MultiPolygon::new(vec![
            rect(0.0, 0.0, 40.0, 40.0),
            rect(200.0, 0.0, 300.0, 100.0),
        ]);
        match classify_pieces(&remaining, &config) {
            EraseOutcome::Split(pieces) => {
                assert_eq!(pieces.len(), 2);
                assert!(geometry::polygon_area(&pieces[0]) > geometry::polygon_area(&pieces[1]));
            }
            other => panic!("expected split, got {other:?}"),
        }
    }
}
