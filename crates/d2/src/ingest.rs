//! Outline ingestion: raw closed point paths in, cleaned [`Part`]s out.
//!
//! Each raw path is self-unioned to resolve self-intersections, the paths
//! of one drawing are sorted into a containment forest (even containment
//! depth = solid outline, odd = hole), vertices are deduplicated and
//! simplified, winding is normalized, and the configured spacing is
//! realized by inflating every outline by half the gap.

use foamnest_core::{Error, Result};
use log::warn;

use crate::boolean::{self, ring_area, CLEAN_TOLERANCE};
use crate::geometry::{dedupe_points, Part, Point, Polygon, Sheet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Douglas-Peucker epsilon as a multiple of the curve tolerance.
const SIMPLIFY_FACTOR: f64 = 4.0;

/// Segments longer than this multiple of the curve tolerance keep both
/// endpoints through simplification. Only dense vertex runs produced by
/// curve flattening are eligible for removal.
const PIN_SEGMENT_FACTOR: f64 = 40.0;

/// How many vertices of a path are sampled for containment voting.
const CONTAINMENT_SAMPLES: usize = 9;

/// One drawing as delivered by the caller: closed outlines as raw point
/// lists, a copy count, and the rotation lock group.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawPart {
    /// Caller-facing name, also the default rotation group.
    pub name: String,
    /// Closed outlines; containment decides which are holes.
    pub paths: Vec<Vec<(f64, f64)>>,
    /// Copies to place.
    pub quantity: u32,
    /// Rotation lock group; `None` falls back to the name.
    pub group_key: Option<String>,
}

impl RawPart {
    /// Wraps raw outlines with quantity 1.
    pub fn new(name: impl Into<String>, paths: Vec<Vec<(f64, f64)>>) -> Self {
        Self {
            name: name.into(),
            paths,
            quantity: 1,
            group_key: None,
        }
    }

    /// Sets the number of copies (at least 1).
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }

    /// Sets the rotation lock group.
    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }
}

/// Converts raw drawings into nestable parts.
///
/// `curve_tolerance` > 0 enables simplification; `spacing` is the full
/// required gap between adjacent parts, applied as a half-width offset
/// to every outline. Outline ids are assigned sequentially from 1, holes
/// included; id 0 stays reserved for the sheet.
pub fn ingest(raw_parts: &[RawPart], curve_tolerance: f64, spacing: f64) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut next_id: u64 = 1;

    for raw in raw_parts {
        let ingested = ingest_one(raw, curve_tolerance, spacing, &mut next_id)?;
        parts.extend(ingested);
    }

    if parts.is_empty() {
        return Err(Error::InvalidGeometry("no usable outlines in input".into()));
    }
    Ok(parts)
}

/// Builds a sheet from a custom boundary outline.
///
/// The boundary is shrunk inward by `margin` to form the usable region;
/// the nominal width and height are taken from the unshrunk bounds.
pub fn sheet_from_polygon(boundary: &[(f64, f64)], margin: f64) -> Result<Sheet> {
    let points: Vec<Point> = boundary.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let points = dedupe_points(&points, CLEAN_TOLERANCE);
    if points.len() < 3 {
        return Err(Error::InvalidSheet(
            "sheet boundary needs at least 3 distinct vertices".into(),
        ));
    }

    let mut outline = Polygon::new(points);
    if !outline.is_ccw() {
        outline.reverse();
    }
    let bounds = outline.bounds();

    if margin > 0.0 {
        let shrunk = largest_offset(&outline.points, -margin).ok_or_else(|| {
            Error::InvalidSheet(format!("margin {} consumes the whole sheet", margin))
        })?;
        outline = Polygon::new(shrunk);
    }

    let sheet = Sheet::new(outline, bounds.width, bounds.height);
    sheet.validate()?;
    Ok(sheet)
}

fn ingest_one(
    raw: &RawPart,
    curve_tolerance: f64,
    spacing: f64,
    next_id: &mut u64,
) -> Result<Vec<Part>> {
    let mut cleaned: Vec<Polygon> = Vec::new();
    for path in &raw.paths {
        match clean_path(path) {
            Some(poly) => cleaned.push(poly),
            None => warn!("part '{}': dropping degenerate outline", raw.name),
        }
    }
    if cleaned.is_empty() {
        return Err(Error::InvalidGeometry(format!(
            "part '{}' has no usable outline",
            raw.name
        )));
    }

    // Containment forest: a path contained by an even number of others
    // is a solid outline, an odd number makes it a hole of its innermost
    // container. Solids nested inside holes become parts of their own.
    let n = cleaned.len();
    let mut contained_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in 0..n {
            if i != j && contains_majority(&cleaned[j], &cleaned[i]) {
                contained_by[i].push(j);
            }
        }
    }

    let mut solids: Vec<Polygon> = Vec::new();
    let mut solid_slot: Vec<Option<usize>> = vec![None; n];
    for i in 0..n {
        if contained_by[i].len() % 2 == 0 {
            solid_slot[i] = Some(solids.len());
            let mut outline = cleaned[i].clone();
            if !outline.is_ccw() {
                outline.reverse();
            }
            solids.push(outline);
        }
    }

    for i in 0..n {
        let depth = contained_by[i].len();
        if depth % 2 == 0 {
            continue;
        }
        // Direct parent: the containing solid one level up, innermost
        // (smallest area) when ambiguous.
        let parent = contained_by[i]
            .iter()
            .copied()
            .filter(|&j| contained_by[j].len() == depth - 1)
            .min_by(|&a, &b| {
                cleaned[a]
                    .area()
                    .partial_cmp(&cleaned[b].area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match parent.and_then(|j| solid_slot[j]) {
            Some(slot) => {
                let mut hole = cleaned[i].clone();
                if hole.is_ccw() {
                    hole.reverse();
                }
                solids[slot].holes.push(hole);
            }
            None => warn!("part '{}': hole without a parent outline, dropped", raw.name),
        }
    }

    let group_key = raw
        .group_key
        .clone()
        .unwrap_or_else(|| raw.name.clone());

    let mut parts = Vec::new();
    for mut outline in solids {
        if curve_tolerance > 0.0 {
            simplify_outline(&mut outline, curve_tolerance);
        }
        if spacing > 0.0 && !apply_spacing(&mut outline, spacing / 2.0) {
            warn!("part '{}': outline vanished under spacing offset", raw.name);
            continue;
        }

        outline.id = *next_id;
        *next_id += 1;
        for hole in &mut outline.holes {
            hole.id = *next_id;
            *next_id += 1;
        }

        let mut part = Part::new(raw.name.clone(), outline);
        part.quantity = raw.quantity.max(1);
        part.group_key = group_key.clone();
        parts.push(part);
    }

    if parts.is_empty() {
        return Err(Error::InvalidGeometry(format!(
            "part '{}' has no usable outline",
            raw.name
        )));
    }
    Ok(parts)
}

/// Cleans one raw path: dedup, self-union, keep the largest region.
///
/// Returns `None` for paths that do not survive as a real polygon.
/// Vertices that coincide with an input vertex are marked exact.
fn clean_path(path: &[(f64, f64)]) -> Option<Polygon> {
    let raw: Vec<Point> = path.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let deduped = dedupe_points(&raw, CLEAN_TOLERANCE);
    if deduped.len() < 3 {
        return None;
    }

    let resolved = boolean::union(&[boolean::ring_from_points(&deduped)]);
    let largest = resolved.into_iter().max_by(|a, b| {
        ring_area(a)
            .partial_cmp(&ring_area(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;

    let points: Vec<Point> = boolean::points_from_ring(&largest)
        .into_iter()
        .map(|mut p| {
            p.exact = raw.iter().any(|r| r.distance_to(&p) < CLEAN_TOLERANCE);
            p
        })
        .collect();

    (points.len() >= 3).then(|| Polygon::new(points))
}

/// Votes sampled vertices of `inner` against `outer`'s exterior.
///
/// Vertices sitting exactly on shared edges cast unreliable single
/// votes; the majority over a spread of vertices is stable.
fn contains_majority(outer: &Polygon, inner: &Polygon) -> bool {
    let n = inner.points.len();
    if n == 0 {
        return false;
    }

    let step = (n / CONTAINMENT_SAMPLES).max(1);
    let mut inside = 0usize;
    let mut total = 0usize;
    let mut i = 0;
    while i < n {
        if outer.contains_point(inner.points[i].x, inner.points[i].y) {
            inside += 1;
        }
        total += 1;
        i += step;
    }
    inside * 2 > total
}

fn simplify_outline(outline: &mut Polygon, curve_tolerance: f64) {
    let epsilon = SIMPLIFY_FACTOR * curve_tolerance;
    let pin_length = PIN_SEGMENT_FACTOR * curve_tolerance;

    let simplified = rdp_simplify(&outline.points, epsilon, pin_length);
    if simplified.len() >= 3 {
        outline.points = simplified;
    }
    for hole in &mut outline.holes {
        let simplified = rdp_simplify(&hole.points, epsilon, pin_length);
        if simplified.len() >= 3 {
            hole.points = simplified;
        }
    }
}

/// Inflates the exterior and shrinks every hole by `half` units.
///
/// Returns false when the exterior collapses. Holes that close up are
/// removed; a hole split in two keeps both pieces.
fn apply_spacing(outline: &mut Polygon, half: f64) -> bool {
    let Some(grown) = largest_offset(&outline.points, half) else {
        return false;
    };

    let mut new_holes = Vec::with_capacity(outline.holes.len());
    for hole in &outline.holes {
        let as_solid = hole.reversed();
        for shrunk in boolean::offset_solid(&as_solid.points, -half) {
            let mut piece = Polygon::new(shrunk);
            piece.reverse();
            new_holes.push(piece);
        }
    }

    outline.points = grown;
    outline.holes = new_holes;
    true
}

/// Offsets a counter-clockwise ring and keeps the largest result.
fn largest_offset(points: &[Point], delta: f64) -> Option<Vec<Point>> {
    boolean::offset_solid(points, delta)
        .into_iter()
        .max_by(|a, b| {
            let pa = Polygon::new(a.clone()).area();
            let pb = Polygon::new(b.clone()).area();
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Ramer-Douglas-Peucker simplification of a closed ring.
///
/// Endpoints of segments longer than `pin_length` always survive, so
/// only dense vertex runs from curve flattening get thinned. Vertex 0
/// and the vertex farthest from it anchor the ring against collapse.
pub fn rdp_simplify(points: &[Point], epsilon: f64, pin_length: f64) -> Vec<Point> {
    let n = points.len();
    if n <= 4 || epsilon <= 0.0 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    let pin_sq = pin_length * pin_length;
    for i in 0..n {
        let j = (i + 1) % n;
        let dx = points[j].x - points[i].x;
        let dy = points[j].y - points[i].y;
        if dx * dx + dy * dy > pin_sq {
            keep[i] = true;
            keep[j] = true;
        }
    }

    keep[0] = true;
    let far = (1..n)
        .max_by(|&a, &b| {
            let da = points[0].distance_to(&points[a]);
            let db = points[0].distance_to(&points[b]);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(n / 2);
    keep[far] = true;

    let anchors: Vec<usize> = (0..n).filter(|&i| keep[i]).collect();
    for w in 0..anchors.len() {
        let start = anchors[w];
        let end = anchors[(w + 1) % anchors.len()];

        // Cyclic index span from one anchor to the next, inclusive.
        let mut span = Vec::new();
        let mut i = start;
        loop {
            span.push(i);
            if span.len() > 1 && i == end {
                break;
            }
            i = (i + 1) % n;
            if i == start {
                break;
            }
        }
        if span.len() > 2 {
            rdp_mark_span(points, &span, epsilon, &mut keep);
        }
    }

    (0..n).filter(|&i| keep[i]).map(|i| points[i]).collect()
}

fn rdp_mark_span(points: &[Point], span: &[usize], epsilon: f64, keep: &mut [bool]) {
    if span.len() < 3 {
        return;
    }

    let a = points[span[0]];
    let b = points[span[span.len() - 1]];
    let mut max_dist = 0.0;
    let mut max_k = 0;
    for (k, &idx) in span.iter().enumerate().take(span.len() - 1).skip(1) {
        let d = perpendicular_distance(&points[idx], &a, &b);
        if d > max_dist {
            max_dist = d;
            max_k = k;
        }
    }

    if max_dist > epsilon {
        keep[span[max_k]] = true;
        rdp_mark_span(points, &span[..=max_k], epsilon, keep);
        rdp_mark_span(points, &span[max_k..], epsilon, keep);
    }
}

fn perpendicular_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < f64::EPSILON {
        return p.distance_to(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_path(x: f64, y: f64, size: f64) -> Vec<(f64, f64)> {
        vec![(x, y), (x + size, y), (x + size, y + size), (x, y + size)]
    }

    #[test]
    fn test_ingest_single_square() {
        let raw = RawPart::new("sq", vec![square_path(0.0, 0.0, 10.0)]);
        let parts = ingest(&[raw], 0.0, 0.0).unwrap();

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id, 1);
        assert_eq!(parts[0].group_key, "sq");
        assert!(parts[0].outline.is_ccw());
        // Already clean: the four corners survive untouched.
        assert_eq!(parts[0].outline.points.len(), 4);
        assert_relative_eq!(parts[0].area(), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ingest_detects_hole() {
        let raw = RawPart::new(
            "frame",
            vec![square_path(0.0, 0.0, 20.0), square_path(5.0, 5.0, 10.0)],
        );
        let parts = ingest(&[raw], 0.0, 0.0).unwrap();

        assert_eq!(parts.len(), 1);
        let outline = &parts[0].outline;
        assert_eq!(outline.holes.len(), 1);
        assert!(!outline.holes[0].is_ccw());
        assert_eq!(outline.id, 1);
        assert_eq!(outline.holes[0].id, 2);
        assert_relative_eq!(parts[0].area(), 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ingest_island_becomes_part() {
        let raw = RawPart::new(
            "nested",
            vec![
                square_path(0.0, 0.0, 30.0),
                square_path(5.0, 5.0, 20.0),
                square_path(10.0, 10.0, 5.0),
            ],
        )
        .with_quantity(2);
        let parts = ingest(&[raw], 0.0, 0.0).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].outline.holes.len(), 1);
        assert!(parts[1].outline.holes.is_empty());
        assert_relative_eq!(parts[1].area(), 25.0, epsilon = 1e-6);
        assert!(parts.iter().all(|p| p.quantity == 2));
        assert_eq!(parts[0].group_key, parts[1].group_key);
    }

    #[test]
    fn test_ingest_drops_degenerate_path() {
        let raw = RawPart::new(
            "mixed",
            vec![vec![(0.0, 0.0), (1.0, 1.0)], square_path(0.0, 0.0, 10.0)],
        );
        let parts = ingest(&[raw], 0.0, 0.0).unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_ingest_rejects_empty_part() {
        let raw = RawPart::new("bad", vec![vec![(0.0, 0.0), (1.0, 0.0)]]);
        assert!(ingest(&[raw], 0.0, 0.0).is_err());
    }

    #[test]
    fn test_ingest_spacing_inflates_outline() {
        let raw = RawPart::new("sq", vec![square_path(0.0, 0.0, 10.0)]);
        let parts = ingest(&[raw], 0.0, 2.0).unwrap();

        let bounds = parts[0].bounds();
        assert_relative_eq!(bounds.width, 12.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.height, 12.0, epsilon = 1e-6);
        assert!(parts[0].outline.points.iter().all(|p| !p.exact));
    }

    #[test]
    fn test_ingest_spacing_shrinks_hole() {
        let raw = RawPart::new(
            "frame",
            vec![square_path(0.0, 0.0, 20.0), square_path(5.0, 5.0, 10.0)],
        );
        let parts = ingest(&[raw], 0.0, 2.0).unwrap();

        let hole = &parts[0].outline.holes[0];
        let bounds = hole.bounds();
        assert_relative_eq!(bounds.width, 8.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.height, 8.0, epsilon = 1e-6);
    }

    #[test]
    fn test_ingest_spacing_closes_tight_hole() {
        let raw = RawPart::new(
            "frame",
            vec![square_path(0.0, 0.0, 20.0), square_path(9.0, 9.0, 1.5)],
        );
        let parts = ingest(&[raw], 0.0, 2.0).unwrap();
        assert!(parts[0].outline.holes.is_empty());
    }

    #[test]
    fn test_ingest_marks_input_vertices_exact() {
        let raw = RawPart::new("sq", vec![square_path(0.0, 0.0, 10.0)]);
        let parts = ingest(&[raw], 0.0, 0.0).unwrap();
        assert!(parts[0].outline.points.iter().all(|p| p.exact));
    }

    #[test]
    fn test_rdp_thins_dense_run_keeps_corners() {
        let mut path: Vec<Point> = (0..20)
            .map(|i| Point::new(i as f64, 0.02 * ((i % 2) as f64)))
            .collect();
        path.push(Point::new(19.0, 10.0));
        path.push(Point::new(0.0, 10.0));

        let simplified = rdp_simplify(&path, 0.5, 12.0);
        assert!(simplified.len() <= 6);
        assert!(simplified
            .iter()
            .any(|p| p.coincides_with(&Point::new(19.0, 10.0))));
        assert!(simplified
            .iter()
            .any(|p| p.coincides_with(&Point::new(0.0, 10.0))));
    }

    #[test]
    fn test_rdp_pins_long_segment_endpoints() {
        // Dense arc between two vertices of a wide triangle.
        let mut path = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        for i in 1..10 {
            let t = i as f64 / 10.0;
            path.push(Point::new(100.0 - t * 50.0, 50.0 + 0.1 * (i % 2) as f64));
        }
        path.push(Point::new(50.0, 50.0));

        let simplified = rdp_simplify(&path, 0.5, 12.0);
        assert!(simplified
            .iter()
            .any(|p| p.coincides_with(&Point::new(100.0, 0.0))));
        assert!(simplified.len() < path.len());
    }

    #[test]
    fn test_sheet_from_polygon_applies_margin() {
        let sheet = sheet_from_polygon(&square_path(0.0, 0.0, 100.0), 5.0).unwrap();

        assert_relative_eq!(sheet.width, 100.0, epsilon = 1e-6);
        let bounds = sheet.bounds();
        assert_relative_eq!(bounds.x, 5.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.width, 90.0, epsilon = 1e-6);
        assert_eq!(sheet.outline.id, 0);
    }

    #[test]
    fn test_sheet_from_polygon_rejects_devouring_margin() {
        assert!(sheet_from_polygon(&square_path(0.0, 0.0, 10.0), 6.0).is_err());
    }
}
