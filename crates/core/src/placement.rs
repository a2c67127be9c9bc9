//! Placement of a single part instance.

/// Final position of one part instance on a sheet.
///
/// `x` and `y` translate the ingested outline; the rotation is applied
/// around the outline's local origin before translating.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Placement {
    /// Outline id assigned at ingestion.
    pub part_id: u64,
    /// Which copy of the part this is, starting at 0.
    pub instance: u32,
    /// Sheet the instance landed on, starting at 0.
    pub sheet_index: u32,
    /// Translation along x.
    pub x: f64,
    /// Translation along y.
    pub y: f64,
    /// Rotation in degrees, counter-clockwise.
    pub rotation: f64,
    /// True when the instance sits inside the hole of another placement.
    pub in_hole: bool,
    /// Index of the hosting placement when `in_hole` is set.
    pub parent_index: Option<usize>,
    /// Which hole of the host the instance occupies.
    pub hole_index: Option<usize>,
}

impl Placement {
    /// Creates a regular on-sheet placement.
    pub fn new(part_id: u64, instance: u32, sheet_index: u32, x: f64, y: f64, rotation: f64) -> Self {
        Self {
            part_id,
            instance,
            sheet_index,
            x,
            y,
            rotation,
            in_hole: false,
            parent_index: None,
            hole_index: None,
        }
    }

    /// Marks the placement as sitting inside a host's hole.
    pub fn into_hole(mut self, parent_index: usize, hole_index: usize) -> Self {
        self.in_hole = true;
        self.parent_index = Some(parent_index);
        self.hole_index = Some(hole_index);
        self
    }

    /// True when the instance was rotated away from its ingested
    /// orientation.
    pub fn is_rotated(&self) -> bool {
        self.rotation.rem_euclid(360.0).abs() > 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_placement_is_on_sheet() {
        let p = Placement::new(4, 0, 1, 12.5, 30.0, 90.0);
        assert!(!p.in_hole);
        assert_eq!(p.parent_index, None);
        assert!(p.is_rotated());
    }

    #[test]
    fn test_into_hole() {
        let p = Placement::new(4, 1, 0, 0.0, 0.0, 0.0).into_hole(2, 0);
        assert!(p.in_hole);
        assert_eq!(p.parent_index, Some(2));
        assert_eq!(p.hole_index, Some(0));
        assert!(!p.is_rotated());
    }

    #[test]
    fn test_full_turn_counts_as_unrotated() {
        let p = Placement::new(1, 0, 0, 0.0, 0.0, 360.0);
        assert!(!p.is_rotated());
    }
}
