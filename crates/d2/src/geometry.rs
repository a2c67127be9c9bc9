//! Planar geometry primitives: points, polygons, parts and sheets.
//!
//! Every outline is an open ring: the closing edge from the last vertex
//! back to the first is implied. Solid outlines wind counter-clockwise
//! (positive signed area), holes wind clockwise. Ingestion enforces this
//! convention once; everything downstream relies on it.

use foamnest_core::{Error, Result, SheetTemplate};
use geo::{ConvexHull, Coord, LineString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coordinate comparison tolerance shared across the engine.
pub const TOL: f64 = 1e-9;

/// True when two scalars agree within [`TOL`].
pub fn almost_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < TOL
}

/// A vertex of an outline.
///
/// `exact` is true while the coordinates coincide with the ingested input
/// geometry. Vertices produced by offsetting or boolean operations are
/// approximations and carry `exact = false`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// True when the vertex comes straight from the input outline.
    pub exact: bool,
}

impl Point {
    /// Creates an exact vertex.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, exact: true }
    }

    /// Creates a derived (approximated) vertex.
    pub fn inexact(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            exact: false,
        }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// True when both coordinates agree within [`TOL`].
    pub fn coincides_with(&self, other: &Point) -> bool {
        almost_equal(self.x, other.x) && almost_equal(self.y, other.y)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    /// Left edge.
    pub x: f64,
    /// Bottom edge.
    pub y: f64,
    /// Extent along x.
    pub width: f64,
    /// Extent along y.
    pub height: f64,
}

impl Bounds {
    /// Bounds of a vertex list, `None` when the list is empty.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        Self::from_coords(points.iter().map(|p| [p.x, p.y]))
    }

    /// Bounds of raw coordinates, `None` when the iterator is empty.
    pub fn from_coords(coords: impl IntoIterator<Item = [f64; 2]>) -> Option<Self> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut any = false;

        for [x, y] in coords {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            any = true;
        }

        any.then(|| Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }

    /// Right edge.
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Top edge.
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Box area.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Smallest box covering both.
    pub fn merged(&self, other: &Bounds) -> Bounds {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Bounds {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// Gap between the x projections; negative when they overlap.
    pub fn gap_x(&self, other: &Bounds) -> f64 {
        self.x.max(other.x) - self.max_x().min(other.max_x())
    }

    /// Gap between the y projections; negative when they overlap.
    pub fn gap_y(&self, other: &Bounds) -> f64 {
        self.y.max(other.y) - self.max_y().min(other.max_y())
    }
}

/// A polygon outline with optional holes.
///
/// `id` identifies the outline in the NFP cache; ingestion assigns a
/// unique id to every outline, holes included. `rotation` records the
/// accumulated rotation away from the ingested orientation, in degrees.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polygon {
    /// Vertices of the outline, closing edge implied.
    pub points: Vec<Point>,
    /// Holes, wound clockwise. Hole nesting deeper than one level is
    /// resolved into separate parts at ingestion.
    pub holes: Vec<Polygon>,
    /// Outline id used in NFP cache keys.
    pub id: u64,
    /// Rotation away from the ingested orientation, degrees CCW.
    pub rotation: f64,
}

impl Polygon {
    /// Creates a polygon without holes.
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            holes: Vec::new(),
            id: 0,
            rotation: 0.0,
        }
    }

    /// Creates a polygon from raw coordinate pairs.
    pub fn from_coords(coords: &[(f64, f64)]) -> Self {
        Self::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    /// Shoelace area: positive for counter-clockwise outlines.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Absolute outline area, holes not subtracted.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Outline area minus the area of all holes.
    pub fn net_area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| h.area()).sum();
        (self.area() - holes).max(0.0)
    }

    /// Bounding box of the exterior.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(&self.points).unwrap_or(Bounds {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        })
    }

    /// True for counter-clockwise winding.
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverses the vertex order in place.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Returns a reversed copy, holes untouched.
    pub fn reversed(&self) -> Polygon {
        let mut out = self.clone();
        out.reverse();
        out
    }

    /// Forces the exterior counter-clockwise and every hole clockwise.
    pub fn normalize_winding(&mut self) {
        if !self.is_ccw() {
            self.reverse();
        }
        for hole in &mut self.holes {
            if hole.is_ccw() {
                hole.reverse();
            }
        }
    }

    /// Rotates the polygon and its holes around the origin.
    ///
    /// The returned polygon keeps its id and accumulates the rotation so
    /// NFP cache keys stay faithful to the actual orientation.
    pub fn rotated(&self, degrees: f64) -> Polygon {
        if degrees.rem_euclid(360.0).abs() < TOL {
            let mut out = self.clone();
            out.rotation = self.rotation + degrees;
            return out;
        }

        let (sin, cos) = degrees.to_radians().sin_cos();
        let rotate = |p: &Point| Point {
            x: p.x * cos - p.y * sin,
            y: p.x * sin + p.y * cos,
            exact: p.exact,
        };

        Polygon {
            points: self.points.iter().map(rotate).collect(),
            holes: self.holes.iter().map(|h| h.rotated(degrees)).collect(),
            id: self.id,
            rotation: self.rotation + degrees,
        }
    }

    /// Translates the polygon and its holes.
    pub fn translated(&self, dx: f64, dy: f64) -> Polygon {
        let shift = |p: &Point| Point {
            x: p.x + dx,
            y: p.y + dy,
            exact: p.exact,
        };
        Polygon {
            points: self.points.iter().map(shift).collect(),
            holes: self.holes.iter().map(|h| h.translated(dx, dy)).collect(),
            id: self.id,
            rotation: self.rotation,
        }
    }

    /// Ray-cast point-in-polygon test against the exterior only.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let pi = &self.points[i];
            let pj = &self.points[j];
            if ((pi.y > y) != (pj.y > y))
                && (x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// True when every turn of the exterior has the same sign.
    pub fn is_convex(&self) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }

        let mut sign = 0i32;
        for i in 0..n {
            let p0 = &self.points[i];
            let p1 = &self.points[(i + 1) % n];
            let p2 = &self.points[(i + 2) % n];

            let cross = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x);
            if cross.abs() > TOL {
                let current = if cross > 0.0 { 1 } else { -1 };
                if sign == 0 {
                    sign = current;
                } else if sign != current {
                    return false;
                }
            }
        }
        true
    }

    /// Convex hull of the exterior vertices.
    pub fn convex_hull_points(&self) -> Vec<Point> {
        convex_hull_of(&self.points)
    }
}

/// Convex hull of a vertex set, without the duplicate closing point.
pub fn convex_hull_of(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    let hull = LineString::from(coords).convex_hull();
    let count = hull.exterior().coords().count().saturating_sub(1);

    hull.exterior()
        .coords()
        .take(count)
        .map(|c| Point::inexact(c.x, c.y))
        .collect()
}

/// Removes consecutive vertices closer than `tolerance`, including the
/// implied closing pair. An exact vertex survives a merge with an
/// inexact one.
pub fn dedupe_points(points: &[Point], tolerance: f64) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if last.distance_to(p) < tolerance => {
                if p.exact && !last.exact {
                    *last = *p;
                }
            }
            _ => out.push(*p),
        }
    }

    while out.len() > 1 {
        let first = out[0];
        let last = out[out.len() - 1];
        if first.distance_to(&last) < tolerance {
            if last.exact && !first.exact {
                out[0] = last;
            }
            out.pop();
        } else {
            break;
        }
    }
    out
}

/// A part to nest: one outline with a quantity and a rotation group.
///
/// Instances that share a `group_key` must all receive the same rotation,
/// which keeps foam grain and print direction consistent across copies.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Part {
    /// Outline id, assigned by the engine.
    pub id: u64,
    /// Caller-facing name.
    pub name: String,
    /// Cleaned outline with holes.
    pub outline: Polygon,
    /// Copies to place.
    pub quantity: u32,
    /// Rotation lock group; defaults to the part name.
    pub group_key: String,
}

impl Part {
    /// Wraps an outline into a part with quantity 1.
    pub fn new(name: impl Into<String>, outline: Polygon) -> Self {
        let name = name.into();
        Self {
            id: outline.id,
            group_key: name.clone(),
            name,
            outline,
            quantity: 1,
        }
    }

    /// Axis-aligned rectangle at the origin, handy in tests and demos.
    pub fn rectangle(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self::new(
            name,
            Polygon::from_coords(&[(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)]),
        )
    }

    /// Sets the number of copies (at least 1).
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }

    /// Sets the rotation lock group.
    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = group_key.into();
        self
    }

    /// Net area of the outline.
    pub fn area(&self) -> f64 {
        self.outline.net_area()
    }

    /// Bounding box of the outline.
    pub fn bounds(&self) -> Bounds {
        self.outline.bounds()
    }
}

/// The usable region of one stock sheet.
///
/// The outline is already inset by the template padding and sits at
/// `(padding, padding)` in sheet coordinates. Outline id 0 is reserved
/// for the sheet.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sheet {
    /// Usable region, counter-clockwise.
    pub outline: Polygon,
    /// Nominal sheet width, before padding.
    pub width: f64,
    /// Nominal sheet height, before padding.
    pub height: f64,
}

impl Sheet {
    /// Wraps an arbitrary usable region.
    pub fn new(mut outline: Polygon, width: f64, height: f64) -> Self {
        outline.id = 0;
        outline.normalize_winding();
        Self {
            outline,
            width,
            height,
        }
    }

    /// Builds the usable region from a sheet template.
    pub fn from_template(template: &SheetTemplate) -> Result<Self> {
        template.validate()?;

        let p = template.padding;
        let outline = Polygon::from_coords(&[
            (p, p),
            (template.width - p, p),
            (template.width - p, template.height - p),
            (p, template.height - p),
        ]);
        Ok(Self::new(outline, template.width, template.height))
    }

    /// Area of the usable region.
    pub fn area(&self) -> f64 {
        self.outline.area()
    }

    /// Bounding box of the usable region.
    pub fn bounds(&self) -> Bounds {
        self.outline.bounds()
    }

    /// Checks the usable region is a real polygon.
    pub fn validate(&self) -> Result<()> {
        if self.outline.points.len() < 3 {
            return Err(Error::InvalidSheet(
                "sheet outline needs at least 3 vertices".into(),
            ));
        }
        if self.outline.area() < TOL {
            return Err(Error::InvalidSheet("sheet outline has no area".into()));
        }
        Ok(())
    }
}
