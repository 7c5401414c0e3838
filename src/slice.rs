//! Axis-aligned slices of AMR hierarchies.
//!
//! A slice is itself an overlapping AMR hierarchy, flat along the slicing
//! axis. Every block whose bounds the cut plane crosses contributes one
//! block on the same level, holding the layer of cells the plane passes
//! through. Blocks that hold only metadata contribute metadata only, so
//! processes slicing their share of a distributed hierarchy agree on the
//! numbering of the output.

use std::sync::Arc;
use log::{debug, info, warn};
use crate::amr_box::{AmrBox, Plane};
use crate::error::{Error, Result};
use crate::extent::{Axis, HasExtent};
use crate::ghost::grid_offset;
use crate::grid::UniformGrid;
use crate::hierarchy::OverlappingAmr;




/**
 * Cut `amr` with the plane normal to `axis` at `offset` past the lower
 * bound of the hierarchy along that axis. The output places the plane at
 * index 0 of the slicing axis on every level, and keeps the block order of
 * the input within each level. Cell arrays and ghost flags are copied from
 * the cells the plane passes through; a plane on the face between two
 * cells takes the cell above it, except on a block's last face. Point
 * arrays are not carried over.
 *
 * `tolerance` bounds the disagreement allowed between a payload and its box
 * metadata; a payload that does not match its box is left out with a
 * warning.
 */
pub fn slice_along_axis(amr: &OverlappingAmr, axis: Axis, offset: f64, tolerance: f64) -> Result<OverlappingAmr> {
    if let Some(flat) = amr.degenerate_axes() {
        if flat[axis.index()] {
            return Err(Error::DegenerateAxis(axis));
        }
    }
    let n = axis.index();
    let position = amr.bounds().map_or(amr.origin()[n], |b| b[2 * n]) + offset;
    let plane = Plane::axis_aligned(axis, position);

    let mut origin = amr.origin();
    origin[n] = position;

    let selected: Vec<(usize, &AmrBox)> = amr
        .blocks_intersecting_plane(&plane, amr.num_levels())
        .into_iter()
        .filter_map(|composite| amr.amr_box_at(composite).map(|b| (composite, b)))
        .filter(|(_, b)| {
            let flat = b.extent().is_degenerate(axis);
            if flat {
                warn!("block ({}, {}) has no cells along {:?}, leaving it out of the slice", b.level(), b.block_id(), axis);
            }
            !flat
        })
        .collect();

    let mut counts = vec![0; amr.num_levels()];

    for (_, b) in &selected {
        counts[b.level()] += 1;
    }
    let mut output = OverlappingAmr::with_levels(origin, amr.spacing(0), amr.refinement_ratio(), &counts)?;
    let mut next = vec![0; amr.num_levels()];

    for (composite, b) in selected {
        let level = b.level();
        let index = next[level];
        next[level] += 1;

        let h = amr.spacing(level);
        let layer = ((position - amr.origin()[n]) / h[n]).floor() as i64;
        let layer = layer.clamp(b.extent().lo(axis), b.extent().hi(axis) - 1);
        let extent = b.extent().with_axis(axis, 0, 0)?;

        output.set_amr_box(AmrBox::new(level, index, extent, origin, h))?;

        let grid = match amr.data_set(composite)? {
            Some(grid) => grid,
            None => continue,
        };
        match slice_grid(amr, b, grid, axis, layer, tolerance) {
            Ok(cells) => {
                let mut sliced = UniformGrid::new(extent, origin, h);

                for field in cells.cell_data() {
                    sliced.add_cell_field(field.clone())?;
                }
                sliced.set_cell_ghosts(cells.cell_ghosts().map(<[_]>::to_vec))?;
                debug!("block ({}, {}) sliced at layer {} as block {}", level, b.block_id(), layer, index);
                output.set_data_set(level, index, Arc::new(sliced))?;
            }
            Err(error) => {
                warn!("block ({}, {}) could not be sliced: {}", level, b.block_id(), error);
            }
        }
    }

    info!("sliced {:?} at {}: {} blocks", axis, position, output.total_blocks());
    Ok(output)
}




/**
 * Return the layer of cells `layer` (in the box's index space) along `axis`
 * of a block's payload, after checking that the payload sits where its box
 * says.
 */
fn slice_grid(
    amr: &OverlappingAmr,
    amr_box: &AmrBox,
    grid: &UniformGrid,
    axis: Axis,
    layer: i64,
    tolerance: f64) -> Result<UniformGrid>
{
    let placed = AmrBox::from_grid(amr_box.level(), amr_box.block_id(), grid, amr.origin(), amr.spacing(amr_box.level()), tolerance)?;

    if placed.extent() != amr_box.extent() {
        return Err(Error::InconsistentMetadata {
            level: amr_box.level(),
            block: amr_box.block_id(),
            reason: format!("grid is placed at {}, box says {}", placed.extent(), amr_box.extent()),
        });
    }
    let points = amr_box.extent().with_axis(axis, layer, layer)?;
    grid.extract(&points.shift(grid_offset(grid, amr_box)))
}
