//! No-fit polygon derivation and the run-scoped NFP cache.
//!
//! The outer NFP of a pair (A, B) is the boundary of the Minkowski sum
//! of A with point-reflected B: placing B's first vertex on the boundary
//! slides B around A in contact, inside it they overlap. The inner NFP
//! inverts the problem: the region where B's first vertex may land so B
//! stays fully inside a container.
//!
//! - **Convex pairs**: linear-time edge-vector merge.
//! - **Everything else**: ear-clip triangulation, pairwise convex sums,
//!   union via `i_overlay`.
//!
//! All results live in the stationary shape's coordinate frame and are
//! keyed by shape id + orientation, so one cache serves every sheet and
//! every GA evaluation of a run.

use std::collections::HashMap;
use std::sync::RwLock;

use i_overlay::core::fill_rule::FillRule;
use log::warn;

use foamnest_core::{Error, Result};

use crate::boolean::{self, ring_area, ring_signed_area, translate_ring, Ring};
use crate::geometry::{Polygon, TOL};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clearance between a container and its bounding frame, beyond the
/// moving part's own extent.
const FRAME_MARGIN: f64 = 1.0;

/// Angular tolerance when merging convex edge sequences.
const ANGLE_TOLERANCE: f64 = 1e-10;

/// One no-fit polygon: a set of contours in the stationary shape's
/// frame, tracing the locus of the moving shape's first vertex.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Nfp {
    /// Contours; for inner NFPs these may mix solids and holes.
    pub rings: Vec<Ring>,
}

impl Nfp {
    /// An empty NFP: no feasible contact or containment positions.
    pub fn new() -> Self {
        Self { rings: Vec::new() }
    }

    /// Wraps precomputed contours.
    pub fn from_rings(rings: Vec<Ring>) -> Self {
        Self { rings }
    }

    /// True when no positions exist.
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Shifts every contour, used to move a cached NFP from a placed
    /// part's local frame to its sheet position.
    pub fn translated(&self, dx: f64, dy: f64) -> Nfp {
        Nfp {
            rings: self
                .rings
                .iter()
                .map(|r| translate_ring(r, dx, dy))
                .collect(),
        }
    }

    /// Total vertex count across contours.
    pub fn vertex_count(&self) -> usize {
        self.rings.iter().map(|r| r.len()).sum()
    }
}

/// Cache key: shape identities, orientations in millidegrees, and the
/// inside/outside mode. The same pair can hold both an inner and an
/// outer entry at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NfpKey {
    /// Stationary shape id.
    pub a_id: u64,
    /// Moving shape id.
    pub b_id: u64,
    /// True for containment (inner) NFPs.
    pub inside: bool,
    /// Stationary shape rotation, millidegrees in [0, 360000).
    pub a_rotation: i64,
    /// Moving shape rotation, millidegrees in [0, 360000).
    pub b_rotation: i64,
}

impl NfpKey {
    /// Builds the key for a shape pair in their current orientations.
    pub fn new(a: &Polygon, b: &Polygon, inside: bool) -> Self {
        Self {
            a_id: a.id,
            b_id: b.id,
            inside,
            a_rotation: millidegrees(a.rotation),
            b_rotation: millidegrees(b.rotation),
        }
    }
}

fn millidegrees(degrees: f64) -> i64 {
    ((degrees.rem_euclid(360.0) * 1000.0).round() as i64).rem_euclid(360_000)
}

/// Run-scoped NFP memo, shared by parallel fitness workers.
///
/// Both lookup and insert copy the value, so callers may freely
/// translate what they get back without corrupting the cache. Entries
/// are never evicted; the cache lives exactly as long as one run.
#[derive(Debug, Default)]
pub struct NfpCache {
    entries: RwLock<HashMap<NfpKey, Nfp>>,
}

impl NfpCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the cached NFP, if present.
    pub fn find(&self, key: &NfpKey) -> Result<Option<Nfp>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Internal(format!("failed to acquire cache read lock: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    /// Stores a copy of the NFP. Re-inserting a key overwrites with an
    /// identical value, so racing workers are harmless.
    pub fn insert(&self, key: NfpKey, nfp: &Nfp) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Internal(format!("failed to acquire cache write lock: {}", e)))?;
        entries.insert(key, nfp.clone());
        Ok(())
    }

    /// Number of cached entries.
    pub fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Internal(format!("failed to acquire cache read lock: {}", e)))?;
        Ok(entries.len())
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops all entries, used between independent runs.
    pub fn reset(&self) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Internal(format!("failed to acquire cache write lock: {}", e)))?;
        entries.clear();
        Ok(())
    }
}

fn nfp_failure(a: &Polygon, b: &Polygon, reason: impl Into<String>) -> Error {
    Error::NfpFailure {
        a_id: a.id,
        b_id: b.id,
        a_rotation: a.rotation,
        b_rotation: b.rotation,
        reason: reason.into(),
    }
}

/// Outer NFP of (a, b): contact locus of b's first vertex sliding b
/// around a's exterior. Holes of either shape play no role here.
pub fn outer_nfp(a: &Polygon, b: &Polygon, cache: &NfpCache) -> Result<Nfp> {
    if a.points.len() < 3 || b.points.len() < 3 {
        return Err(nfp_failure(a, b, "degenerate input polygon"));
    }

    let key = NfpKey::new(a, b, false);
    if let Some(hit) = cache.find(&key)? {
        return Ok(hit);
    }

    let a_ring = boolean::ring_from_points(&a.points);
    let reflected = reflect_ring(&boolean::ring_from_points(&b.points));

    let rings = if a.is_convex() && b.is_convex() {
        minkowski_sum_convex(&a_ring, &reflected)
            .map(|r| vec![r])
            .unwrap_or_default()
    } else {
        let a_triangles = triangulate(&a_ring);
        let b_triangles = triangulate(&reflected);
        let mut pieces = Vec::with_capacity(a_triangles.len() * b_triangles.len());
        for ta in &a_triangles {
            for tb in &b_triangles {
                if let Some(ring) = minkowski_sum_convex(ta, tb) {
                    pieces.push(ring);
                }
            }
        }
        boolean::union(&pieces)
    };

    // The sum's outer boundary is the contact locus; interior loops are
    // pocket placements, which hole-fitting covers separately.
    let largest = rings
        .into_iter()
        .max_by(|x, y| {
            ring_area(x)
                .partial_cmp(&ring_area(y))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or_else(|| nfp_failure(a, b, "minkowski sum produced no contour"))?;

    let b0 = b.points[0];
    let nfp = Nfp::from_rings(vec![translate_ring(&largest, b0.x, b0.y)]);
    cache.insert(key, &nfp)?;
    Ok(nfp)
}

/// Inner NFP: the region where b's first vertex may land so b lies
/// fully inside `container`, away from any of its holes.
///
/// An empty result means b does not fit anywhere and is not an error.
pub fn inner_nfp(container: &Polygon, b: &Polygon, cache: &NfpCache) -> Result<Nfp> {
    if container.points.len() < 3 || b.points.len() < 3 {
        return Err(nfp_failure(container, b, "degenerate input polygon"));
    }

    let key = NfpKey::new(container, b, true);
    if let Some(hit) = cache.find(&key)? {
        return Ok(hit);
    }

    let mut feasible = if is_axis_aligned_rect(container) {
        rect_inner(container, b)
    } else {
        annulus_inner(container, b)
    };

    if !container.holes.is_empty() && !feasible.is_empty() {
        let mut blocked: Vec<Ring> = Vec::new();
        for hole in &container.holes {
            let hole_solid = hole.reversed();
            let hole_nfp = outer_nfp(&hole_solid, b, cache)?;
            blocked.extend(hole_nfp.rings);
        }
        feasible = boolean::difference(&feasible, &boolean::union(&blocked), FillRule::EvenOdd);
    }

    let nfp = Nfp::from_rings(feasible);
    cache.insert(key, &nfp)?;
    Ok(nfp)
}

/// Containment region of an axis-aligned rectangular container, from
/// bounds arithmetic alone.
fn rect_inner(container: &Polygon, b: &Polygon) -> Vec<Ring> {
    let a = container.bounds();
    let bb = b.bounds();
    let b0 = b.points[0];

    let min_x = a.x + (b0.x - bb.x);
    let max_x = a.max_x() - (bb.max_x() - b0.x);
    let min_y = a.y + (b0.y - bb.y);
    let max_y = a.max_y() - (bb.max_y() - b0.y);

    if max_x < min_x - TOL || max_y < min_y - TOL {
        return Vec::new();
    }
    // An exact fit degenerates to a segment or point; keep it, the
    // vertices still serve as candidate positions.
    let max_x = max_x.max(min_x);
    let max_y = max_y.max(min_y);

    vec![vec![
        [min_x, min_y],
        [max_x, min_y],
        [max_x, max_y],
        [min_x, max_y],
    ]]
}

/// General containment region: Minkowski-inflate the annulus between
/// the container and a bounding frame, then read off its holes.
///
/// Positions where b overlaps the annulus are blocked; the bounded
/// pockets of the blocked set are exactly the placements with b fully
/// inside the container.
fn annulus_inner(container: &Polygon, b: &Polygon) -> Vec<Ring> {
    let a_bounds = container.bounds();
    let b_bounds = b.bounds();
    let margin_x = b_bounds.width + FRAME_MARGIN;
    let margin_y = b_bounds.height + FRAME_MARGIN;

    let frame: Ring = vec![
        [a_bounds.x - margin_x, a_bounds.y - margin_y],
        [a_bounds.max_x() + margin_x, a_bounds.y - margin_y],
        [a_bounds.max_x() + margin_x, a_bounds.max_y() + margin_y],
        [a_bounds.x - margin_x, a_bounds.max_y() + margin_y],
    ];

    let mut container_ring = boolean::ring_from_points(&container.points);
    if ring_signed_area(&container_ring) > 0.0 {
        container_ring.reverse();
    }

    let annulus_triangles = triangulate_with_holes(&frame, &[container_ring]);
    let reflected = reflect_ring(&boolean::ring_from_points(&b.points));
    let b_triangles = triangulate(&reflected);

    let mut pieces = Vec::with_capacity(annulus_triangles.len() * b_triangles.len());
    for ta in &annulus_triangles {
        for tb in &b_triangles {
            if let Some(ring) = minkowski_sum_convex(ta, tb) {
                pieces.push(ring);
            }
        }
    }

    let b0 = b.points[0];
    let mut feasible = Vec::new();
    for shape in boolean::union_shapes(&pieces) {
        for hole in shape.into_iter().skip(1) {
            let mut ring = hole;
            ring.reverse();
            feasible.push(translate_ring(&ring, b0.x, b0.y));
        }
    }
    feasible
}

/// Point reflection through the origin. Reverses winding as a side
/// effect; consumers re-normalize.
fn reflect_ring(ring: &[[f64; 2]]) -> Ring {
    ring.iter().map(|&[x, y]| [-x, -y]).collect()
}

fn is_axis_aligned_rect(poly: &Polygon) -> bool {
    let ring = &poly.points;
    if ring.len() != 4 {
        return false;
    }
    for i in 0..4 {
        let a = &ring[i];
        let b = &ring[(i + 1) % 4];
        if (a.x - b.x).abs() > TOL && (a.y - b.y).abs() > TOL {
            return false;
        }
    }
    poly.area() > TOL
}

// ============================================================================
// Minkowski sum
// ============================================================================

/// Minkowski sum of two convex rings via the edge-vector merge.
///
/// Returns `None` for degenerate inputs. Collinear edges from angle
/// ties survive as extra vertices; downstream cleanup removes them.
pub fn minkowski_sum_convex(a: &[[f64; 2]], b: &[[f64; 2]]) -> Option<Ring> {
    let a = ensure_ccw(a);
    let b = ensure_ccw(b);
    if a.len() < 3 || b.len() < 3 {
        return None;
    }

    let sa = bottom_left_index(&a);
    let sb = bottom_left_index(&b);

    let edges_a = edge_vectors(&a, sa);
    let edges_b = edge_vectors(&b, sb);

    // Both edge sequences are sorted by polar angle when traversal
    // starts at the bottom-left vertex; merge them.
    let mut merged = Vec::with_capacity(edges_a.len() + edges_b.len());
    let mut i = 0;
    let mut j = 0;
    while i < edges_a.len() && j < edges_b.len() {
        let angle_a = edge_angle(edges_a[i]);
        let angle_b = edge_angle(edges_b[j]);
        if (angle_a - angle_b).abs() < ANGLE_TOLERANCE {
            merged.push(edges_a[i]);
            merged.push(edges_b[j]);
            i += 1;
            j += 1;
        } else if angle_a < angle_b {
            merged.push(edges_a[i]);
            i += 1;
        } else {
            merged.push(edges_b[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&edges_a[i..]);
    merged.extend_from_slice(&edges_b[j..]);

    let mut out: Ring = Vec::with_capacity(merged.len());
    let mut current = [a[sa][0] + b[sb][0], a[sa][1] + b[sb][1]];
    out.push(current);
    for edge in &merged {
        current = [current[0] + edge[0], current[1] + edge[1]];
        out.push(current);
    }
    // The walk closes on the start vertex.
    out.pop();

    (ring_area(&out) > 1e-9).then_some(out)
}

fn ensure_ccw(ring: &[[f64; 2]]) -> Ring {
    let mut out = ring.to_vec();
    if ring_signed_area(&out) < 0.0 {
        out.reverse();
    }
    out
}

fn bottom_left_index(ring: &[[f64; 2]]) -> usize {
    let mut best = 0;
    for i in 1..ring.len() {
        if ring[i][1] < ring[best][1] - TOL
            || ((ring[i][1] - ring[best][1]).abs() <= TOL && ring[i][0] < ring[best][0])
        {
            best = i;
        }
    }
    best
}

fn edge_vectors(ring: &[[f64; 2]], start: usize) -> Vec<[f64; 2]> {
    let n = ring.len();
    (0..n)
        .map(|k| {
            let from = ring[(start + k) % n];
            let to = ring[(start + k + 1) % n];
            [to[0] - from[0], to[1] - from[1]]
        })
        .collect()
}

/// Polar angle of an edge vector, normalized to [0, 2π).
fn edge_angle(edge: [f64; 2]) -> f64 {
    let angle = edge[1].atan2(edge[0]);
    if angle < 0.0 {
        angle + 2.0 * std::f64::consts::PI
    } else {
        angle
    }
}

// ============================================================================
// Triangulation
// ============================================================================

/// Ear-clip triangulation of a simple ring, winding tolerated.
pub fn triangulate(ring: &[[f64; 2]]) -> Vec<[[f64; 2]; 3]> {
    let points = ensure_ccw(ring);
    let mut indices: Vec<usize> = (0..points.len()).collect();
    let mut triangles = Vec::with_capacity(points.len().saturating_sub(2));

    while indices.len() > 3 {
        let n = indices.len();
        let mut clipped = false;
        for k in 0..n {
            let i0 = indices[(k + n - 1) % n];
            let i1 = indices[k];
            let i2 = indices[(k + 1) % n];
            if is_ear(&points, &indices, i0, i1, i2) {
                triangles.push([points[i0], points[i1], points[i2]]);
                indices.remove(k);
                clipped = true;
                break;
            }
        }
        if !clipped {
            // Numerically stuck ring; a fan keeps the result usable.
            warn!("ear clipping stalled on {} vertices, fan fallback", indices.len());
            for k in 1..indices.len() - 1 {
                triangles.push([
                    points[indices[0]],
                    points[indices[k]],
                    points[indices[k + 1]],
                ]);
            }
            return triangles;
        }
    }

    if indices.len() == 3 {
        let t = [points[indices[0]], points[indices[1]], points[indices[2]]];
        if triangle_area(&t) > 1e-12 {
            triangles.push(t);
        }
    }
    triangles
}

/// Triangulates `outer` minus `holes` by splicing each hole into the
/// outer ring along a bridge edge, then ear clipping.
///
/// `outer` is treated counter-clockwise, holes clockwise. Holes are
/// spliced rightmost-first, the usual order that keeps bridges from
/// crossing each other.
pub fn triangulate_with_holes(outer: &[[f64; 2]], holes: &[Ring]) -> Vec<[[f64; 2]; 3]> {
    let mut ring = ensure_ccw(outer);

    let mut ordered: Vec<Ring> = holes
        .iter()
        .filter(|h| h.len() >= 3)
        .map(|h| {
            let mut hole = h.clone();
            if ring_signed_area(&hole) > 0.0 {
                hole.reverse();
            }
            hole
        })
        .collect();
    ordered.sort_by(|a, b| {
        let ax = max_x_vertex(a).0;
        let bx = max_x_vertex(b).0;
        bx.partial_cmp(&ax).unwrap_or(std::cmp::Ordering::Equal)
    });

    for hole in &ordered {
        ring = splice_hole(&ring, hole);
    }
    triangulate(&ring)
}

fn max_x_vertex(ring: &[[f64; 2]]) -> (f64, usize) {
    let mut best = 0;
    for i in 1..ring.len() {
        if ring[i][0] > ring[best][0] {
            best = i;
        }
    }
    (ring[best][0], best)
}

/// Joins a hole into the outer ring with a two-way bridge at the
/// hole's rightmost vertex, preferring the nearest unobstructed outer
/// vertex.
fn splice_hole(outer: &[[f64; 2]], hole: &[[f64; 2]]) -> Ring {
    let (_, mi) = max_x_vertex(hole);
    let m = hole[mi];

    let mut best: Option<(usize, f64)> = None;
    let mut fallback: Option<(usize, f64)> = None;
    for (vi, v) in outer.iter().enumerate() {
        let dx = v[0] - m[0];
        let dy = v[1] - m[1];
        let dist = dx * dx + dy * dy;

        if fallback.map_or(true, |(_, d)| dist < d) {
            fallback = Some((vi, dist));
        }
        let obstructed = crosses_any(m, *v, outer) || crosses_any(m, *v, hole);
        if !obstructed && best.map_or(true, |(_, d)| dist < d) {
            best = Some((vi, dist));
        }
    }

    let vi = match (best, fallback) {
        (Some((vi, _)), _) => vi,
        (None, Some((vi, _))) => {
            warn!("no unobstructed bridge for hole, using nearest vertex");
            vi
        }
        (None, None) => return outer.to_vec(),
    };

    // outer[..=vi], hole cycle from m, duplicate m, duplicate outer[vi],
    // rest of outer: two zero-width bridge edges.
    let h = hole.len();
    let mut out = Vec::with_capacity(outer.len() + h + 2);
    out.extend_from_slice(&outer[..=vi]);
    for k in 0..h {
        out.push(hole[(mi + k) % h]);
    }
    out.push(m);
    out.push(outer[vi]);
    out.extend_from_slice(&outer[vi + 1..]);
    out
}

/// True when segment (p1, p2) properly crosses any edge of `ring`.
/// Edges sharing an endpoint with the segment are ignored.
fn crosses_any(p1: [f64; 2], p2: [f64; 2], ring: &[[f64; 2]]) -> bool {
    let n = ring.len();
    for i in 0..n {
        let q1 = ring[i];
        let q2 = ring[(i + 1) % n];
        if coincident(q1, p1) || coincident(q1, p2) || coincident(q2, p1) || coincident(q2, p2) {
            continue;
        }
        if segments_cross(p1, p2, q1, q2) {
            return true;
        }
    }
    false
}

fn coincident(a: [f64; 2], b: [f64; 2]) -> bool {
    (a[0] - b[0]).abs() < TOL && (a[1] - b[1]).abs() < TOL
}

fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn segments_cross(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}

fn is_ear(points: &[[f64; 2]], indices: &[usize], i0: usize, i1: usize, i2: usize) -> bool {
    let a = points[i0];
    let b = points[i1];
    let c = points[i2];

    // Reflex and collinear corners are never ears.
    if orient(a, b, c) < 1e-12 {
        return false;
    }

    for &j in indices {
        if j == i0 || j == i1 || j == i2 {
            continue;
        }
        let p = points[j];
        // Spliced rings carry duplicate bridge vertices; a vertex lying
        // on a corner of the ear does not block it.
        if coincident(p, a) || coincident(p, b) || coincident(p, c) {
            continue;
        }
        if point_in_triangle(p, a, b, c) {
            return false;
        }
    }
    true
}

fn triangle_area(t: &[[f64; 2]; 3]) -> f64 {
    orient(t[0], t[1], t[2]).abs() / 2.0
}

/// Strict barycentric containment: boundary points do not count.
fn point_in_triangle(p: [f64; 2], a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> bool {
    let v0 = [c[0] - a[0], c[1] - a[1]];
    let v1 = [b[0] - a[0], b[1] - a[1]];
    let v2 = [p[0] - a[0], p[1] - a[1]];

    let dot00 = v0[0] * v0[0] + v0[1] * v0[1];
    let dot01 = v0[0] * v1[0] + v0[1] * v1[1];
    let dot02 = v0[0] * v2[0] + v0[1] * v2[1];
    let dot11 = v1[0] * v1[0] + v1[1] * v1[1];
    let dot12 = v1[0] * v2[0] + v1[1] * v2[1];

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < 1e-18 {
        return false;
    }
    let inv_denom = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    u > 1e-10 && v > 1e-10 && (u + v) < 1.0 - 1e-10
}
