//! Synthetic AMR data sets.

use serde::{Deserialize, Serialize};
use crate::amr_box::AmrBox;
use crate::error::Result;
use crate::extent::Extent;
use crate::grid::UniformGrid;
use crate::hierarchy::OverlappingAmr;
use crate::partition::ExtentPartitioner;

/// Tolerance used when placing generated grids, relative to the spacing.
const PLACEMENT_TOLERANCE: f64 = 1e-9;




#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    Two,
    Three,
}




/**
 * A two-level AMR data set sampling a Gaussian pulse. Level 0 is one block
 * spanning `[-2, 2]` on each axis (the k axis is flat in 2D). Level 1 holds
 * two adjacent blocks over the middle of it, so the blocks come out in the
 * order (0, 0), (1, 0), (1, 1).
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianPulse {
    pub center: [f64; 3],
    pub width: [f64; 3],
    pub amplitude: f64,
    pub dimension: Dimension,
    pub refinement_ratio: i64,
}

impl Default for GaussianPulse {
    fn default() -> Self {
        Self {
            center: [0.0; 3],
            width: [0.5; 3],
            amplitude: 1.0,
            dimension: Dimension::Two,
            refinement_ratio: 2,
        }
    }
}




// ============================================================================
impl GaussianPulse {

    pub fn value(&self, x: [f64; 3]) -> f64 {
        let axes = match self.dimension {
            Dimension::Two => 2,
            Dimension::Three => 3,
        };
        let r2: f64 = (0..axes).map(|n| ((x[n] - self.center[n]) / self.width[n]).powi(2)).sum();
        self.amplitude * (-r2).exp()
    }

    pub fn generate(&self) -> Result<OverlappingAmr> {
        let r = self.refinement_ratio;
        let three_d = self.dimension == Dimension::Three;
        let origin = [-2.0, -2.0, if three_d { -2.0 } else { 0.0 }];
        let mut amr = OverlappingAmr::with_levels(origin, [0.5; 3], r, &[1, 2])?;

        // Level-0 cell ranges covered by each block, scaled to point extents.
        let blocks = [
            (0, 0, [0, 8, 0, 8, 0, 8]),
            (1, 0, [2, 4, 2, 6, 2, 6]),
            (1, 1, [4, 6, 2, 6, 2, 6]),
        ];
        for (level, index, cells) in blocks {
            let scale = r.pow(level as u32);
            let mut ext = cells.map(|c| c * scale);

            if !three_d {
                ext[4] = 0;
                ext[5] = 0;
            }
            let grid = UniformGrid::new(Extent::new(ext)?, origin, amr.spacing(level))
                .with_cell_field("Gaussian-Pulse", |x| self.value(x));
            amr.add_block(level, index, grid, PLACEMENT_TOLERANCE)?;
        }
        Ok(amr)
    }
}




/**
 * A single-level data set made by partitioning a global point extent with
 * the `ExtentPartitioner`, and growing each partition by `ghost_layers`
 * (clamped to the global extent) so that neighbors share that many layers
 * of cells. Blocks are dealt to ranks in contiguous runs.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionedUniform {
    pub global_extent: Extent,
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    pub partitions: usize,
    pub ghost_layers: usize,
}




// ============================================================================
impl PartitionedUniform {

    /**
     * Return the ghosted extent of every block. There may be more blocks
     * than requested partitions, since the partitioner rounds up to a power
     * of two.
     */
    pub fn extents(&self) -> Result<Vec<Extent>> {
        let mut partitioner = ExtentPartitioner::new(self.global_extent, self.partitions);
        Ok(partitioner
            .partition()?
            .iter()
            .map(|e| e.grow(self.ghost_layers, Some(&self.global_extent)))
            .collect())
    }

    /// Return the rank a block is dealt to.
    pub fn owner(block: usize, num_blocks: usize, num_ranks: usize) -> usize {
        block * num_ranks.max(1) / num_blocks.max(1)
    }

    /**
     * Generate the view of the data set held by one rank: metadata for every
     * block, payloads for its own.
     */
    pub fn generate(&self, rank: usize, num_ranks: usize) -> Result<OverlappingAmr> {
        let extents = self.extents()?;
        let mut amr = OverlappingAmr::with_levels(self.origin, self.spacing, 2, &[extents.len()])?;

        for (block, extent) in extents.iter().enumerate() {
            if Self::owner(block, extents.len(), num_ranks) == rank {
                let grid = UniformGrid::new(*extent, self.origin, self.spacing)
                    .with_cell_field("rank", |_| rank as f64)
                    .with_cell_field("block", |_| block as f64);
                amr.add_block(0, block, grid, PLACEMENT_TOLERANCE)?;
            } else {
                amr.set_amr_box(AmrBox::new(0, block, *extent, self.origin, self.spacing))?;
            }
        }
        Ok(amr)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use crate::extent::{Extent, HasExtent};
    use crate::ghost::{strip_ghost_layers, GhostOptions};
    use super::{Dimension, GaussianPulse, PartitionedUniform};

    fn uniform(partitions: usize, ghost_layers: usize) -> PartitionedUniform {
        PartitionedUniform {
            global_extent: Extent::new([0, 16, 0, 16, 0, 0]).unwrap(),
            origin: [0.0; 3],
            spacing: [1.0 / 16.0; 3],
            partitions,
            ghost_layers,
        }
    }

    #[test]
    fn pulse_blocks_come_out_in_level_order() {
        let amr = GaussianPulse::default().generate().unwrap();
        let visited: Vec<_> = amr.iter().map(|b| (b.level, b.amr_box.unwrap().block_id())).collect();
        assert_eq!(visited, vec![(0, 0), (1, 0), (1, 1)]);
        assert_eq!(amr.bounds().unwrap(), [-2.0, 2.0, -2.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn pulse_peaks_at_its_center() {
        let pulse = GaussianPulse::default();
        assert_eq!(pulse.value([0.0; 3]), 1.0);
        assert!(pulse.value([1.0, 0.0, 0.0]) < pulse.value([0.5, 0.0, 0.0]));

        let amr = pulse.generate().unwrap();
        let fine = amr.data_set_at(1, 0).unwrap().unwrap();
        assert_eq!(fine.num_cells(), 4 * 8);
        assert_eq!(fine.spacing(), [0.25; 3]);
    }

    #[test]
    fn volume_pulse_has_cells_on_every_axis() {
        let pulse = GaussianPulse { dimension: Dimension::Three, ..GaussianPulse::default() };
        let amr = pulse.generate().unwrap();
        assert_eq!(amr.data_set(0).unwrap().unwrap().num_cells(), 8 * 8 * 8);
        assert_eq!(amr.bounds().unwrap(), [-2.0, 2.0, -2.0, 2.0, -2.0, 2.0]);
    }

    #[test]
    fn refined_center_of_the_pulse_is_ghosted() {
        let amr = GaussianPulse::default().generate().unwrap();
        let (stripped, report) = strip_ghost_layers(&amr, &GhostOptions::default(), None).unwrap();
        assert_eq!(report.decisions[0].duplicated_cells, 16);
        assert_eq!(stripped.data_set(0).unwrap().unwrap().num_real_cells(), 64 - 16);
    }

    #[test]
    fn partitions_overlap_by_the_ghost_layers() {
        let extents = uniform(4, 1).extents().unwrap();
        assert_eq!(extents.len(), 4);
        assert_eq!(extents[0].as_array(), [0, 9, 0, 9, 0, 0]);
        assert_eq!(extents[3].as_array(), [7, 16, 7, 16, 0, 0]);
    }

    #[test]
    fn stripped_partitions_tile_the_global_extent() {
        let amr = uniform(4, 2).generate(0, 1).unwrap();
        let (stripped, report) = strip_ghost_layers(&amr, &GhostOptions::default(), None).unwrap();
        let real: usize = stripped.iter().map(|b| b.grid.num_real_cells()).sum();
        assert_eq!(real, 16 * 16);
        assert_eq!(report.trimmed, 3);
    }

    #[test]
    fn blocks_are_dealt_in_contiguous_runs() {
        let owners: Vec<_> = (0..4).map(|b| PartitionedUniform::owner(b, 4, 2)).collect();
        assert_eq!(owners, vec![0, 0, 1, 1]);

        let amr = uniform(4, 1).generate(1, 2).unwrap();
        assert_eq!(amr.num_blocks(), 2);
        assert_eq!(amr.boxes().count(), 4);
        assert!(amr.data_set(0).unwrap().is_none());
    }
}
