use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::extent::{Axis, Bounds, Extent, HasExtent};
use crate::overlap::Overlap;




/**
 * A plane through `origin` with the given `normal`. The normal does not need
 * to be of unit length.
 */
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: [f64; 3],
    pub normal: [f64; 3],
}




// ============================================================================
impl Plane {

    pub fn new(origin: [f64; 3], normal: [f64; 3]) -> Self {
        Self { origin, normal }
    }

    /// A plane normal to the given axis, at `offset` along it.
    pub fn axis_aligned(axis: Axis, offset: f64) -> Self {
        let mut origin = [0.0; 3];
        let mut normal = [0.0; 3];
        origin[axis.index()] = offset;
        normal[axis.index()] = 1.0;
        Self { origin, normal }
    }

    /// Return `n . (x - o)`: positive on the side the normal points to.
    pub fn signed_distance(&self, x: [f64; 3]) -> f64 {
        (0..3).map(|n| self.normal[n] * (x[n] - self.origin[n])).sum()
    }
}




/**
 * Determine whether a plane passes through a bounding box: some corner lies
 * on the plane, or two corners lie on opposite sides of it.
 */
pub fn plane_intersects_bounds(plane: &Plane, bounds: &Bounds) -> bool {
    let mut below = false;
    let mut above = false;

    for corner in 0..8 {
        let x = if corner & 1 != 0 { bounds[1] } else { bounds[0] };
        let y = if corner & 2 != 0 { bounds[3] } else { bounds[2] };
        let z = if corner & 4 != 0 { bounds[5] } else { bounds[4] };
        let v = plane.signed_distance([x, y, z]);

        if v == 0.0 {
            return true;
        }
        if v < 0.0 {
            below = true;
        } else {
            above = true;
        }
        if below && above {
            return true;
        }
    }
    false
}




/**
 * Placement metadata for one block of an AMR hierarchy. The extent is a point
 * extent in the index space of the block's level, measured from the
 * hierarchy origin, so a point index maps to `origin + index * spacing` where
 * `spacing` is the level spacing.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmrBox {
    level: usize,
    block_id: usize,
    extent: Extent,
    origin: [f64; 3],
    spacing: [f64; 3],
}




// ============================================================================
impl AmrBox {

    pub fn new(level: usize, block_id: usize, extent: Extent, origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self { level, block_id, extent, origin, spacing }
    }


    /**
     * Derive the metadata of a grid placed at the given level. The grid's
     * first point must sit on the level lattice anchored at `origin`, and
     * its spacing must match the level spacing, both to within `tolerance`
     * (relative to the spacing).
     */
    pub fn from_grid<G: HasExtent>(
        level: usize,
        block_id: usize,
        grid: &G,
        origin: [f64; 3],
        spacing: [f64; 3],
        tolerance: f64) -> Result<Self>
    {
        let inconsistent = |reason: String| Error::InconsistentMetadata { level, block: block_id, reason };
        let extent = grid.extent();
        let mut shift = [0; 3];

        for a in Axis::ALL {
            let n = a.index();
            let h = spacing[n];

            if !(h > 0.0) {
                return Err(inconsistent(format!("level spacing {} on axis {:?}", h, a)));
            }
            if (grid.spacing()[n] - h).abs() > tolerance * h {
                return Err(inconsistent(format!("grid spacing {} differs from level spacing {}", grid.spacing()[n], h)));
            }
            let start = (grid.origin()[n] + extent.lo(a) as f64 * h - origin[n]) / h;
            let index = start.round();

            if (start - index).abs() > tolerance {
                return Err(inconsistent(format!("grid corner is off the level lattice on axis {:?}", a)));
            }
            shift[n] = index as i64 - extent.lo(a);
        }
        Ok(Self::new(level, block_id, extent.shift(shift), origin, spacing))
    }


    pub fn level(&self) -> usize {
        self.level
    }


    pub fn block_id(&self) -> usize {
        self.block_id
    }


    /**
     * Return the axes along which this box carries no cells.
     */
    pub fn degenerate_axes(&self) -> [bool; 3] {
        [
            self.extent.is_degenerate(Axis::I),
            self.extent.is_degenerate(Axis::J),
            self.extent.is_degenerate(Axis::K),
        ]
    }


    /**
     * Return the cells of this box, in its level's cell index space.
     */
    pub fn cell_extent(&self) -> Extent {
        self.extent.cell_extent()
    }


    /**
     * Determine whether the world-space bounds of two boxes overlap on all
     * three axes. The intervals are closed, so boxes that only touch at a
     * face, edge or corner intersect.
     */
    pub fn intersects(&self, other: &AmrBox) -> bool {
        self.intersects_bounds(&other.bounds())
    }


    /**
     * Determine whether this box's world-space bounds overlap a region,
     * touching included.
     */
    pub fn intersects_bounds(&self, region: &Bounds) -> bool {
        let a = self.bounds();
        (0..3).all(|n| (a[2 * n]..=a[2 * n + 1]).overlaps(&(region[2 * n]..=region[2 * n + 1])))
    }


    /**
     * Return the cells shared by two boxes on the same level. Boxes sharing
     * only a boundary plane of points have no cells in common.
     */
    pub fn overlapping_cells(&self, other: &AmrBox) -> Option<Extent> {
        if self.level != other.level {
            return None;
        }
        self.cell_extent().intersection(&other.cell_extent())
    }


    /**
     * Return the cells of this box which lie entirely inside a box from a
     * finer level. Degenerate axes are carried over unchanged.
     */
    pub fn covered_cells(&self, finer: &AmrBox, refinement_ratio: i64) -> Option<Extent> {
        if finer.level <= self.level {
            return None;
        }
        let factor = refinement_ratio.pow((finer.level - self.level) as u32);
        let cells = self.cell_extent();
        let mut lo = [0; 3];
        let mut hi = [0; 3];

        for a in Axis::ALL {
            let n = a.index();
            if self.extent.is_degenerate(a) {
                lo[n] = cells.lo(a);
                hi[n] = cells.hi(a);
            } else {
                lo[n] = ceil_div(finer.extent.lo(a), factor);
                hi[n] = finer.extent.hi(a).div_euclid(factor) - 1;
            }
        }
        Extent::from_corners(lo, hi).ok()?.intersection(&cells)
    }


    /**
     * Return a copy of this box restricted to the given point extent.
     */
    pub fn with_extent(&self, extent: Extent) -> Self {
        Self { extent, ..self.clone() }
    }


    /**
     * Determine whether a plane crosses this box.
     */
    pub fn intersects_plane(&self, plane: &Plane) -> bool {
        plane_intersects_bounds(plane, &self.bounds())
    }
}




// ============================================================================
impl HasExtent for AmrBox {
    fn extent(&self) -> Extent {
        self.extent
    }

    fn origin(&self) -> [f64; 3] {
        self.origin
    }

    fn spacing(&self) -> [f64; 3] {
        self.spacing
    }
}




fn ceil_div(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}




// ============================================================================
#[cfg(test)]
mod test {

    use proptest::prelude::*;
    use crate::extent::{Axis, Extent, HasExtent};
    use super::{plane_intersects_bounds, AmrBox, Plane};

    fn amr_box(level: usize, ext: [i64; 6]) -> AmrBox {
        let h = 1.0 / (1 << level) as f64;
        AmrBox::new(level, 0, Extent::new(ext).unwrap(), [0.0; 3], [h, h, h])
    }

    #[test]
    fn bounds_follow_origin_and_spacing() {
        let b = AmrBox::new(1, 3, Extent::new([2, 6, 0, 4, 0, 0]).unwrap(), [1.0, -1.0, 0.0], [0.5, 0.25, 1.0]);
        assert_eq!(b.bounds(), [2.0, 4.0, -1.0, 0.0, 0.0, 0.0]);
        assert_eq!(b.level(), 1);
        assert_eq!(b.block_id(), 3);
        assert_eq!(b.degenerate_axes(), [false, false, true]);
    }

    #[test]
    fn boxes_touching_at_a_face_intersect() {
        let a = amr_box(0, [0, 4, 0, 4, 0, 0]);
        let b = amr_box(0, [4, 8, 0, 4, 0, 0]);
        let c = amr_box(0, [5, 8, 0, 4, 0, 0]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.overlapping_cells(&b).is_none());
    }

    #[test]
    fn boxes_on_different_levels_intersect_in_world_space() {
        let coarse = amr_box(0, [0, 9, 0, 9, 0, 0]);
        let fine = amr_box(1, [6, 12, 6, 12, 0, 0]);
        let far = amr_box(1, [20, 24, 0, 4, 0, 0]);
        assert!(coarse.intersects(&fine));
        assert!(!coarse.intersects(&far));
        assert!(fine.intersects_bounds(&[6.0, 7.0, 3.0, 3.0, -1.0, 1.0]));
        assert!(!fine.intersects_bounds(&[6.5, 7.0, 0.0, 9.0, 0.0, 0.0]));
    }

    #[test]
    fn covered_cells_only_counts_fully_covered_coarse_cells() {
        let coarse = amr_box(0, [0, 9, 0, 9, 0, 0]);
        let aligned = amr_box(1, [6, 12, 6, 12, 0, 0]);
        let ragged = amr_box(1, [5, 12, 6, 13, 0, 0]);
        assert_eq!(coarse.covered_cells(&aligned, 2).unwrap().as_array(), [3, 5, 3, 5, 0, 0]);
        assert_eq!(coarse.covered_cells(&ragged, 2).unwrap().as_array(), [3, 5, 3, 5, 0, 0]);
        assert!(coarse.covered_cells(&amr_box(1, [6, 7, 6, 12, 0, 0]), 2).is_none());
        assert!(coarse.covered_cells(&coarse, 2).is_none());
    }

    #[test]
    fn covered_cells_spans_multiple_levels() {
        let coarse = amr_box(0, [0, 9, 0, 9, 0, 9]);
        let finest = amr_box(2, [0, 8, 4, 16, 8, 12]);
        assert_eq!(coarse.covered_cells(&finest, 2).unwrap().as_array(), [0, 1, 1, 3, 2, 2]);
    }

    #[test]
    fn box_metadata_is_derived_from_an_aligned_grid() {
        let grid = amr_box(1, [0, 4, 0, 4, 0, 0]);
        let shifted = AmrBox::new(1, 0, grid.extent(), [1.0, 0.5, 0.0], [0.5, 0.5, 0.5]);
        let derived = AmrBox::from_grid(1, 7, &shifted, [0.0; 3], [0.5, 0.5, 0.5], 1e-9).unwrap();
        assert_eq!(derived.extent().as_array(), [2, 6, 1, 5, 0, 0]);
        assert_eq!(derived.block_id(), 7);

        let off_lattice = AmrBox::new(1, 0, grid.extent(), [0.25, 0.0, 0.0], [0.5, 0.5, 0.5]);
        assert!(AmrBox::from_grid(1, 0, &off_lattice, [0.0; 3], [0.5, 0.5, 0.5], 1e-9).is_err());
        assert!(AmrBox::from_grid(1, 0, &shifted, [0.0; 3], [0.25, 0.5, 0.5], 1e-9).is_err());
    }

    #[test]
    fn plane_through_box_is_detected() {
        let bounds = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        assert!(plane_intersects_bounds(&Plane::axis_aligned(Axis::I, 0.5), &bounds));
        assert!(plane_intersects_bounds(&Plane::axis_aligned(Axis::K, 1.0), &bounds));
        assert!(!plane_intersects_bounds(&Plane::axis_aligned(Axis::J, 1.5), &bounds));
        assert!(plane_intersects_bounds(&Plane::new([0.5, 0.5, 0.5], [1.0, 1.0, 1.0]), &bounds));
        assert!(!plane_intersects_bounds(&Plane::new([2.0, 2.0, 2.0], [1.0, 1.0, 1.0]), &bounds));
    }

    #[test]
    fn plane_test_visits_every_corner() {
        // Cuts off only the corner (0, 0, 1).
        let bounds = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let plane = Plane::new([0.0, 0.0, 0.9], [-1.0, -1.0, 1.0]);
        assert!(plane_intersects_bounds(&plane, &bounds));
    }

    fn arb_box() -> impl Strategy<Value = AmrBox> {
        (0usize..3, -8i64..8, 0i64..8, -8i64..8, 0i64..8, -2i64..2, 0i64..3)
            .prop_map(|(level, i, ni, j, nj, k, nk)| amr_box(level, [i, i + ni, j, j + nj, k, k + nk]))
    }

    proptest! {
        #[test]
        fn intersection_is_symmetric(a in arb_box(), b in arb_box()) {
            prop_assert_eq!(a.intersects(&b), b.intersects(&a));
            prop_assert_eq!(a.overlapping_cells(&b), b.overlapping_cells(&a));
        }
    }
}
