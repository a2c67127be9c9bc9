//! Boolean polygon operations on bare contours, backed by `i_overlay`.
//!
//! Coordinates are quantized to a fixed grid before and after every
//! operation so the same inputs always produce bit-identical outputs,
//! which the NFP cache depends on. All rings here are open: the closing
//! edge is implied.

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;

use crate::geometry::Point;

/// A bare contour, closing edge implied.
pub type Ring = Vec<[f64; 2]>;

/// Quantization grid: coordinates snap to multiples of 1e-7.
pub const QUANT_SCALE: f64 = 10_000_000.0;

/// Rings with less absolute area than this are noise and get dropped.
pub const MIN_RING_AREA: f64 = 0.1;

/// Vertex cleanup tolerance applied after boolean operations.
pub const CLEAN_TOLERANCE: f64 = 1e-4;

/// Miter join cutoff for [`offset_solid`], as a multiple of the delta.
const MITER_LIMIT: f64 = 2.0;

/// Snaps a scalar to the quantization grid.
pub fn quantize(v: f64) -> f64 {
    (v * QUANT_SCALE).round() / QUANT_SCALE
}

/// Converts outline vertices to a quantized ring.
pub fn ring_from_points(points: &[Point]) -> Ring {
    points
        .iter()
        .map(|p| [quantize(p.x), quantize(p.y)])
        .collect()
}

/// Converts a ring back to outline vertices, all marked derived.
pub fn points_from_ring(ring: &[[f64; 2]]) -> Vec<Point> {
    ring.iter().map(|&[x, y]| Point::inexact(x, y)).collect()
}

/// Shoelace area of a ring: positive for counter-clockwise.
pub fn ring_signed_area(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += ring[i][0] * ring[j][1];
        area -= ring[j][0] * ring[i][1];
    }
    area / 2.0
}

/// Absolute shoelace area of a ring.
pub fn ring_area(ring: &[[f64; 2]]) -> f64 {
    ring_signed_area(ring).abs()
}

/// Reverses a ring in place.
pub fn reverse_ring(ring: &mut Ring) {
    ring.reverse();
}

/// Translates a ring by `(dx, dy)`, re-quantizing.
pub fn translate_ring(ring: &[[f64; 2]], dx: f64, dy: f64) -> Ring {
    ring.iter()
        .map(|&[x, y]| [quantize(x + dx), quantize(y + dy)])
        .collect()
}

/// Removes near-duplicate and near-collinear vertices.
///
/// Returns an empty ring when fewer than 3 vertices survive.
pub fn clean_ring(ring: &[[f64; 2]], tolerance: f64) -> Ring {
    let mut out: Vec<[f64; 2]> = Vec::with_capacity(ring.len());
    for &p in ring {
        match out.last() {
            Some(&last) if point_distance(last, p) < tolerance => {}
            _ => out.push(p),
        }
    }
    while out.len() > 1 && point_distance(out[0], out[out.len() - 1]) < tolerance {
        out.pop();
    }

    let mut i = 0;
    while out.len() >= 3 && i < out.len() {
        let prev = out[(i + out.len() - 1) % out.len()];
        let next = out[(i + 1) % out.len()];
        if point_line_distance(out[i], prev, next) < tolerance {
            out.remove(i);
        } else {
            i += 1;
        }
    }

    if out.len() < 3 {
        out.clear();
    }
    out
}

fn point_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// Perpendicular distance from `p` to the line through `a` and `b`.
fn point_line_distance(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let len = (dx * dx + dy * dy).sqrt();
    if len < f64::EPSILON {
        return point_distance(p, a);
    }
    ((p[0] - a[0]) * dy - (p[1] - a[1]) * dx).abs() / len
}

fn quantize_rings(rings: &[Ring]) -> Vec<Ring> {
    rings
        .iter()
        .map(|r| r.iter().map(|&[x, y]| [quantize(x), quantize(y)]).collect())
        .collect()
}

/// Flattens overlay shapes, cleaning each contour and dropping noise.
fn flatten_shapes(shapes: Vec<Vec<Ring>>) -> Vec<Ring> {
    let mut out = Vec::new();
    for shape in shapes {
        for contour in shape {
            let cleaned = clean_ring(&contour, CLEAN_TOLERANCE);
            if cleaned.len() >= 3 && ring_area(&cleaned) >= MIN_RING_AREA {
                out.push(cleaned);
            }
        }
    }
    out
}

/// Unions rings under the non-zero rule, keeping shape structure.
///
/// Each returned shape is an outer contour (counter-clockwise) followed
/// by its holes (clockwise).
pub fn union_shapes(rings: &[Ring]) -> Vec<Vec<Ring>> {
    if rings.is_empty() {
        return Vec::new();
    }

    let subject = quantize_rings(rings);
    let shapes = subject.overlay(
        &Vec::<Ring>::new(),
        OverlayRule::Subject,
        FillRule::NonZero,
    );

    let mut out = Vec::new();
    for shape in shapes {
        let mut iter = shape.into_iter();
        let outer = match iter.next() {
            Some(contour) => clean_ring(&contour, CLEAN_TOLERANCE),
            None => continue,
        };
        // A dead outer takes its holes with it.
        if outer.len() < 3 || ring_area(&outer) < MIN_RING_AREA {
            continue;
        }

        let mut contours = vec![outer];
        for contour in iter {
            let cleaned = clean_ring(&contour, CLEAN_TOLERANCE);
            if cleaned.len() >= 3 && ring_area(&cleaned) >= MIN_RING_AREA {
                contours.push(cleaned);
            }
        }
        out.push(contours);
    }
    out
}

/// Unions rings under the non-zero rule, flattened.
pub fn union(rings: &[Ring]) -> Vec<Ring> {
    union_shapes(rings).into_iter().flatten().collect()
}

/// Subtracts `clip` from `subject`, flattened.
///
/// The fill rule applies to both operands: pass `EvenOdd` when the
/// subject is a flattened list of mixed-orientation contours, `NonZero`
/// when both sides are resolved solids.
pub fn difference(subject: &[Ring], clip: &[Ring], fill_rule: FillRule) -> Vec<Ring> {
    if subject.is_empty() {
        return Vec::new();
    }
    if clip.is_empty() {
        return flatten_shapes(vec![quantize_rings(subject)]);
    }

    let subject = quantize_rings(subject);
    let clip = quantize_rings(clip);
    flatten_shapes(subject.overlay(&clip, OverlayRule::Difference, fill_rule))
}

/// Intersects two resolved solids, flattened.
pub fn intersection(subject: &[Ring], clip: &[Ring]) -> Vec<Ring> {
    if subject.is_empty() || clip.is_empty() {
        return Vec::new();
    }

    let subject = quantize_rings(subject);
    let clip = quantize_rings(clip);
    flatten_shapes(subject.overlay(&clip, OverlayRule::Intersect, FillRule::NonZero))
}

/// Net overlap area of two resolved solids.
///
/// Holes of the intersection count negative, so an outline touching
/// another only along edges reports an area near zero.
pub fn intersection_area(subject: &[Ring], clip: &[Ring]) -> f64 {
    if subject.is_empty() || clip.is_empty() {
        return 0.0;
    }

    let subject = quantize_rings(subject);
    let clip = quantize_rings(clip);
    let shapes = subject.overlay(&clip, OverlayRule::Intersect, FillRule::NonZero);

    shapes
        .iter()
        .flat_map(|shape| shape.iter())
        .map(|contour| ring_signed_area(contour))
        .sum()
}

/// Resolves self-intersections of a single ring into simple contours.
pub fn simplify(rings: &[Ring]) -> Vec<Ring> {
    union(rings)
}

/// Offsets a counter-clockwise solid outward (positive delta) or inward
/// (negative delta) with mitered joins, then resolves the raw result.
///
/// Returns the outer contours of the offset region; empty means the
/// ring collapsed. Join spikes beyond [`MITER_LIMIT`] times the delta
/// are beveled, matching conventional offsetting behavior.
pub fn offset_solid(points: &[Point], delta: f64) -> Vec<Vec<Point>> {
    let ring = ring_from_points(points);
    if ring.len() < 3 {
        return Vec::new();
    }
    if delta.abs() < f64::EPSILON {
        return vec![points.to_vec()];
    }

    let raw = raw_offset(&ring, delta);
    // A shrink past the medial axis inverts the whole loop.
    if raw.len() < 3 || ring_signed_area(&raw) <= 0.0 {
        return Vec::new();
    }

    let shapes = vec![raw.clone()].overlay(
        &Vec::<Ring>::new(),
        OverlayRule::Subject,
        FillRule::NonZero,
    );

    let mut out = Vec::new();
    for shape in shapes {
        // Contour 0 is the outer boundary; holes of an offset solid are
        // artifacts of sealed-off slots and stay filled.
        if let Some(contour) = shape.into_iter().next() {
            if contour.len() < 3 {
                continue;
            }
            // Partial collapse leaves inverted loops next to the real
            // ones; only regions the raw loop winds positively around
            // belong to the offset solid.
            let probe = interior_probe(&contour);
            if winding_number(&raw, probe) <= 0 {
                continue;
            }

            let cleaned = clean_ring(&contour, CLEAN_TOLERANCE);
            if cleaned.len() >= 3 && ring_area(&cleaned) >= MIN_RING_AREA {
                out.push(points_from_ring(&cleaned));
            }
        }
    }
    out
}

/// Winding number of `point` around a closed ring.
fn winding_number(ring: &[[f64; 2]], point: [f64; 2]) -> i32 {
    let n = ring.len();
    let mut wn = 0i32;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let side = (b[0] - a[0]) * (point[1] - a[1]) - (point[0] - a[0]) * (b[1] - a[1]);
        if a[1] <= point[1] {
            if b[1] > point[1] && side > 0.0 {
                wn += 1;
            }
        } else if b[1] <= point[1] && side < 0.0 {
            wn -= 1;
        }
    }
    wn
}

/// A point just inside a simple contour.
///
/// The lowest-leftmost vertex is always convex, so nudging it toward
/// the midpoint of its neighbors lands inside the contour.
fn interior_probe(ring: &[[f64; 2]]) -> [f64; 2] {
    let n = ring.len();
    let mut v = 0;
    for i in 1..n {
        if ring[i][1] < ring[v][1] || (ring[i][1] == ring[v][1] && ring[i][0] < ring[v][0]) {
            v = i;
        }
    }

    let corner = ring[v];
    let prev = ring[(v + n - 1) % n];
    let next = ring[(v + 1) % n];
    let mid = [(prev[0] + next[0]) / 2.0, (prev[1] + next[1]) / 2.0];

    if point_distance(mid, corner) < 1e-9 {
        let (sx, sy) = ring
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        return [sx / n as f64, sy / n as f64];
    }
    [
        corner[0] + (mid[0] - corner[0]) * 1e-3,
        corner[1] + (mid[1] - corner[1]) * 1e-3,
    ]
}

/// Builds the raw mitered offset ring, self-intersections unresolved.
fn raw_offset(ring: &[[f64; 2]], delta: f64) -> Ring {
    let n = ring.len();
    let edge_normal = |i: usize| -> Option<[f64; 2]> {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let dx = b[0] - a[0];
        let dy = b[1] - a[1];
        let len = (dx * dx + dy * dy).sqrt();
        if len < f64::EPSILON {
            return None;
        }
        // Right-hand normal: outward for counter-clockwise rings.
        Some([dy / len, -dx / len])
    };

    // Miter distance ratio is sqrt(2 / (1 + dot)); the join is beveled
    // once that exceeds MITER_LIMIT.
    let dot_cutoff = 2.0 / (MITER_LIMIT * MITER_LIMIT) - 1.0;

    let mut out: Ring = Vec::with_capacity(n * 2);
    for i in 0..n {
        let prev = (i + n - 1) % n;
        let (n_in, n_out) = match (edge_normal(prev), edge_normal(i)) {
            (Some(a), Some(b)) => (a, b),
            (Some(a), None) | (None, Some(a)) => (a, a),
            (None, None) => continue,
        };

        let p = ring[i];
        let dot = n_in[0] * n_out[0] + n_in[1] * n_out[1];

        if dot > dot_cutoff {
            let scale = delta / (1.0 + dot);
            out.push([
                quantize(p[0] + (n_in[0] + n_out[0]) * scale),
                quantize(p[1] + (n_in[1] + n_out[1]) * scale),
            ]);
        } else {
            out.push([quantize(p[0] + n_in[0] * delta), quantize(p[1] + n_in[1] * delta)]);
            out.push([quantize(p[0] + n_out[0] * delta), quantize(p[1] + n_out[1] * delta)]);
        }
    }
    out
}
