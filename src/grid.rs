use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::extent::{Axis, Extent, HasExtent};




/**
 * Per-cell ghost classification bits. A cell with no bits set is real: its
 * values are authoritative. `DUPLICATE` marks a cell whose data is owned by
 * another block (possibly on another process), `REFINED` a cell covered by
 * a finer level, and `HIDDEN` a cell that should be skipped when rendering
 * or aggregating. Blanking sets `HIDDEN` without removing storage.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GhostFlags(u8);




// ============================================================================
impl GhostFlags {
    pub const NONE: GhostFlags = GhostFlags(0);
    pub const DUPLICATE: GhostFlags = GhostFlags(1);
    pub const REFINED: GhostFlags = GhostFlags(8);
    pub const HIDDEN: GhostFlags = GhostFlags(32);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: GhostFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: GhostFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for GhostFlags {
    type Output = GhostFlags;

    fn bitor(self, rhs: GhostFlags) -> GhostFlags {
        GhostFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for GhostFlags {
    fn bitor_assign(&mut self, rhs: GhostFlags) {
        self.0 |= rhs.0
    }
}




/**
 * A named array of values attached to the points or cells of a grid, with
 * `num_components` consecutive values per tuple.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldArray {
    pub name: String,
    pub num_components: usize,
    pub values: Vec<f64>,
}




// ============================================================================
impl FieldArray {

    pub fn new(name: &str, num_components: usize, values: Vec<f64>) -> Self {
        Self { name: name.to_string(), num_components, values }
    }

    pub fn num_tuples(&self) -> usize {
        self.values.len() / self.num_components.max(1)
    }

    pub fn tuple(&self, n: usize) -> &[f64] {
        &self.values[n * self.num_components .. (n + 1) * self.num_components]
    }
}




/**
 * A uniform grid: a point extent placed in world space by an origin and a
 * spacing, with named point and cell arrays and optional per-cell ghost
 * flags. Arrays are laid out with the i index increasing fastest.
 *
 * This is the block payload of an AMR hierarchy. The AMR code reads the
 * placement and the arrays, and writes new grids only when trimming ghost
 * layers or blanking cells.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformGrid {
    extent: Extent,
    origin: [f64; 3],
    spacing: [f64; 3],
    point_data: Vec<FieldArray>,
    cell_data: Vec<FieldArray>,
    cell_ghosts: Option<Vec<GhostFlags>>,
}




// ============================================================================
impl UniformGrid {


    pub fn new(extent: Extent, origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self {
            extent,
            origin,
            spacing,
            point_data: Vec::new(),
            cell_data: Vec::new(),
            cell_ghosts: None,
        }
    }


    /**
     * Attach a scalar point array with values defined from a closure of the
     * point position.
     */
    pub fn with_point_field<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn([f64; 3]) -> f64
    {
        let values = self.extent.iter().map(|index| f(self.point_position(index))).collect();
        self.point_data.push(FieldArray::new(name, 1, values));
        self
    }


    /**
     * Attach a scalar cell array with values defined from a closure of the
     * cell center.
     */
    pub fn with_cell_field<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn([f64; 3]) -> f64
    {
        let values = self.cell_extent().iter().map(|index| f(self.cell_center(index))).collect();
        self.cell_data.push(FieldArray::new(name, 1, values));
        self
    }


    pub fn add_point_field(&mut self, field: FieldArray) -> Result<()> {
        check_size(&field, self.num_points())?;
        self.point_data.push(field);
        Ok(())
    }


    pub fn add_cell_field(&mut self, field: FieldArray) -> Result<()> {
        check_size(&field, self.num_cells())?;
        self.cell_data.push(field);
        Ok(())
    }


    pub fn point_data(&self) -> &[FieldArray] {
        &self.point_data
    }


    pub fn cell_data(&self) -> &[FieldArray] {
        &self.cell_data
    }


    pub fn point_field(&self, name: &str) -> Option<&FieldArray> {
        self.point_data.iter().find(|f| f.name == name)
    }


    pub fn cell_field(&self, name: &str) -> Option<&FieldArray> {
        self.cell_data.iter().find(|f| f.name == name)
    }


    pub fn num_points(&self) -> usize {
        self.extent.num_nodes() as usize
    }


    pub fn num_cells(&self) -> usize {
        self.extent.num_cells() as usize
    }


    /**
     * Return the extent of the grid's cells, in the grid's own index space.
     */
    pub fn cell_extent(&self) -> Extent {
        self.extent.cell_extent()
    }


    pub fn point_position(&self, index: [i64; 3]) -> [f64; 3] {
        let mut x = [0.0; 3];
        for n in 0..3 {
            x[n] = self.origin[n] + index[n] as f64 * self.spacing[n];
        }
        x
    }


    /**
     * Return the center of the cell with the given index. On a degenerate
     * axis the center lies on the grid's plane.
     */
    pub fn cell_center(&self, index: [i64; 3]) -> [f64; 3] {
        let mut x = self.point_position(index);
        for a in Axis::ALL {
            if !self.extent.is_degenerate(a) {
                x[a.index()] += 0.5 * self.spacing[a.index()];
            }
        }
        x
    }


    pub fn cell_ghosts(&self) -> Option<&[GhostFlags]> {
        self.cell_ghosts.as_deref()
    }


    pub fn set_cell_ghosts(&mut self, ghosts: Option<Vec<GhostFlags>>) -> Result<()> {
        if let Some(g) = &ghosts {
            if g.len() != self.num_cells() {
                return Err(Error::FieldSizeMismatch {
                    name: "ghost flags".to_string(),
                    len: g.len(),
                    expected: self.num_cells(),
                });
            }
        }
        self.cell_ghosts = ghosts;
        Ok(())
    }


    /**
     * Return the ghost flags of the cell with the given index, or `None` if
     * the grid has no such cell.
     */
    pub fn cell_ghost(&self, index: [i64; 3]) -> Option<GhostFlags> {
        let cells = self.cell_extent();

        if !cells.contains(index) {
            return None;
        }
        match &self.cell_ghosts {
            Some(ghosts) => ghosts.get(cells.linear_offset(index)).copied(),
            None => Some(GhostFlags::NONE),
        }
    }


    /**
     * Add the given flags to every cell in `cells`, which is clipped to the
     * grid. Return the number of cells whose flags changed.
     */
    pub fn mark_cells(&mut self, cells: &Extent, flags: GhostFlags) -> usize {
        let own = self.cell_extent();
        let cells = match own.intersection(cells) {
            Some(cells) => cells,
            None => return 0,
        };
        let num_cells = self.num_cells();
        let ghosts = self.cell_ghosts.get_or_insert_with(|| vec![GhostFlags::NONE; num_cells]);
        let region = cells.memory_region_in(&own);
        let mut changed = 0;

        for g in region.iter_slice_mut(ghosts, 1) {
            if !g[0].contains(flags) {
                g[0] |= flags;
                changed += 1;
            }
        }
        changed
    }


    /**
     * Return the number of cells in `cells` (clipped to the grid) that do not
     * yet carry all of the given flags.
     */
    pub fn count_unmarked(&self, cells: &Extent, flags: GhostFlags) -> usize {
        match self.cell_extent().intersection(cells) {
            Some(cells) => cells
                .iter()
                .filter(|&index| !self.cell_ghost(index).unwrap_or_default().contains(flags))
                .count(),
            None => 0,
        }
    }


    /// A cell is real if no other block owns its data. `None` for an index
    /// outside the grid.
    pub fn is_cell_real(&self, index: [i64; 3]) -> Option<bool> {
        self.cell_ghost(index).map(|g| !g.intersects(GhostFlags::DUPLICATE | GhostFlags::REFINED))
    }


    pub fn is_cell_visible(&self, index: [i64; 3]) -> Option<bool> {
        self.cell_ghost(index).map(|g| !g.contains(GhostFlags::HIDDEN))
    }


    pub fn num_real_cells(&self) -> usize {
        self.count_cells(|g| !g.intersects(GhostFlags::DUPLICATE | GhostFlags::REFINED))
    }


    pub fn num_visible_cells(&self) -> usize {
        self.count_cells(|g| !g.contains(GhostFlags::HIDDEN))
    }


    fn count_cells<P: Fn(GhostFlags) -> bool>(&self, predicate: P) -> usize {
        match &self.cell_ghosts {
            Some(ghosts) => ghosts.iter().filter(|&&g| predicate(g)).count(),
            None => self.num_cells(),
        }
    }


    /**
     * Return a new grid holding the part of this one inside `sub`, a point
     * extent in this grid's index space. Point arrays are copied over the
     * points of `sub`, cell arrays and ghost flags over its cells. Where
     * `sub` is flat on an axis along which this grid has cells, it selects
     * the layer of cells above that plane, so the plane cannot be the
     * grid's last one.
     */
    pub fn extract(&self, sub: &Extent) -> Result<UniformGrid> {
        let sub_cells = sub.cell_extent();

        if !self.extent.contains_extent(sub) || !self.cell_extent().contains_extent(&sub_cells) {
            return Err(Error::InvalidExtent(sub.as_array()));
        }
        for field in &self.point_data {
            check_size(field, self.num_points())?;
        }
        for field in &self.cell_data {
            check_size(field, self.num_cells())?;
        }
        if let Some(ghosts) = &self.cell_ghosts {
            if ghosts.len() != self.num_cells() {
                return Err(Error::FieldSizeMismatch {
                    name: "ghost flags".to_string(),
                    len: ghosts.len(),
                    expected: self.num_cells(),
                });
            }
        }
        let point_region = sub.memory_region_in(&self.extent);
        let cell_region = sub_cells.memory_region_in(&self.cell_extent());

        let mut grid = UniformGrid::new(*sub, self.origin, self.spacing);

        for field in &self.point_data {
            let values = copy_region(point_region.iter_slice(&field.values, field.num_components), point_region.len() * field.num_components)?;
            grid.point_data.push(FieldArray::new(&field.name, field.num_components, values));
        }
        for field in &self.cell_data {
            let values = copy_region(cell_region.iter_slice(&field.values, field.num_components), cell_region.len() * field.num_components)?;
            grid.cell_data.push(FieldArray::new(&field.name, field.num_components, values));
        }
        if let Some(ghosts) = &self.cell_ghosts {
            grid.cell_ghosts = Some(copy_region(cell_region.iter_slice(ghosts, 1), cell_region.len())?);
        }
        Ok(grid)
    }
}




// ============================================================================
impl HasExtent for UniformGrid {
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




fn check_size(field: &FieldArray, num_tuples: usize) -> Result<()> {
    if field.num_components == 0 {
        return Err(Error::ZeroComponents(field.name.clone()));
    }
    let expected = num_tuples * field.num_components;
    if field.values.len() != expected {
        return Err(Error::FieldSizeMismatch {
            name: field.name.clone(),
            len: field.values.len(),
            expected,
        });
    }
    Ok(())
}

fn copy_region<'a, T: 'a + Copy, I>(chunks: I, len: usize) -> Result<Vec<T>>
where
    I: Iterator<Item = &'a [T]>
{
    let mut values = Vec::new();
    values.try_reserve_exact(len).map_err(|_| Error::Allocation(len))?;
    chunks.for_each(|chunk| values.extend_from_slice(chunk));
    Ok(values)
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::error::Error;
    use crate::extent::{Extent, HasExtent};
    use super::{FieldArray, GhostFlags, UniformGrid};

    fn grid() -> UniformGrid {
        UniformGrid::new(Extent::new([0, 4, 0, 3, 0, 0]).unwrap(), [0.0; 3], [1.0; 3])
            .with_point_field("x", |x| x[0])
            .with_cell_field("xy", |x| x[0] + 10.0 * x[1])
    }

    #[test]
    fn fields_are_sized_to_points_and_cells() {
        let g = grid();
        assert_eq!(g.num_points(), 20);
        assert_eq!(g.num_cells(), 12);
        assert_eq!(g.point_field("x").unwrap().num_tuples(), 20);
        assert_eq!(g.cell_field("xy").unwrap().num_tuples(), 12);
        assert_eq!(g.cell_center([1, 2, 0]), [1.5, 2.5, 0.0]);
        assert_eq!(g.bounds(), [0.0, 4.0, 0.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn mismatched_field_is_rejected() {
        let mut g = grid();
        assert!(g.add_cell_field(FieldArray::new("bad", 1, vec![0.0; 20])).is_err());
        assert!(g.add_point_field(FieldArray::new("v", 3, vec![0.0; 60])).is_ok());
        assert!(g.set_cell_ghosts(Some(vec![GhostFlags::NONE; 3])).is_err());
        assert!(matches!(g.add_cell_field(FieldArray::new("empty", 0, vec![])), Err(Error::ZeroComponents(_))));
        assert!(g.add_point_field(FieldArray::new("empty", 0, vec![])).is_err());
    }

    #[test]
    fn extract_copies_the_sub_extent() {
        let g = grid();
        let sub = g.extract(&Extent::new([2, 4, 1, 3, 0, 0]).unwrap()).unwrap();
        assert_eq!(sub.num_points(), 9);
        assert_eq!(sub.num_cells(), 4);
        assert_eq!(sub.point_field("x").unwrap().values, vec![2.0, 3.0, 4.0, 2.0, 3.0, 4.0, 2.0, 3.0, 4.0]);
        assert_eq!(sub.cell_field("xy").unwrap().values, vec![17.5, 18.5, 27.5, 28.5]);
        assert!(g.extract(&Extent::new([2, 5, 1, 3, 0, 0]).unwrap()).is_err());
    }

    #[test]
    fn flat_extract_selects_a_layer_of_cells() {
        let g = grid();
        let layer = g.extract(&Extent::new([2, 2, 0, 3, 0, 0]).unwrap()).unwrap();
        assert_eq!(layer.num_cells(), 3);
        assert_eq!(layer.cell_field("xy").unwrap().values, vec![7.5, 17.5, 27.5]);
        assert_eq!(layer.point_field("x").unwrap().values, vec![2.0; 4]);

        let beyond_the_last_cell = Extent::new([4, 4, 0, 3, 0, 0]).unwrap();
        assert!(matches!(g.extract(&beyond_the_last_cell), Err(Error::InvalidExtent(_))));
    }

    #[test]
    fn marking_cells_classifies_them() {
        let mut g = grid();
        assert_eq!(g.num_real_cells(), 12);

        let marked = g.mark_cells(&Extent::new([0, 1, 0, 0, 0, 0]).unwrap(), GhostFlags::DUPLICATE);
        assert_eq!(marked, 2);
        assert_eq!(g.mark_cells(&Extent::new([0, 9, 0, 0, 0, 0]).unwrap(), GhostFlags::DUPLICATE), 2);
        assert_eq!(g.mark_cells(&Extent::new([3, 3, 2, 2, 0, 0]).unwrap(), GhostFlags::REFINED | GhostFlags::HIDDEN), 1);

        assert_eq!(g.is_cell_real([0, 0, 0]), Some(false));
        assert_eq!(g.is_cell_visible([0, 0, 0]), Some(true));
        assert_eq!(g.is_cell_visible([3, 2, 0]), Some(false));
        assert_eq!(g.num_real_cells(), 7);
        assert_eq!(g.num_visible_cells(), 11);

        let sub = g.extract(&Extent::new([0, 2, 0, 1, 0, 0]).unwrap()).unwrap();
        assert_eq!(sub.cell_ghosts().unwrap(), &[GhostFlags::DUPLICATE, GhostFlags::DUPLICATE]);
    }

    #[test]
    fn cells_outside_the_grid_have_no_flags() {
        let mut g = grid();
        assert_eq!(g.cell_ghost([3, 2, 0]), Some(GhostFlags::NONE));
        g.mark_cells(&Extent::new([0, 0, 1, 1, 0, 0]).unwrap(), GhostFlags::DUPLICATE);

        assert_eq!(g.is_cell_real([0, 1, 0]), Some(false));
        assert_eq!(g.is_cell_real([4, 0, 0]), None);
        assert_eq!(g.is_cell_visible([0, 3, 0]), None);
        assert_eq!(g.cell_ghost([-1, 0, 0]), None);
        assert_eq!(g.cell_ghost([0, 0, 1]), None);
    }
}
