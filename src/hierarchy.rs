//! The container for an overlapping AMR data set: a sequence of levels, each
//! with a fixed number of block slots, box metadata per slot, and sparse
//! storage for the slots that hold a grid.
//!
//! Every slot is addressable by a _composite index_, numbering the slots of
//! level 0 first, then level 1, and so on, in block order within a level.
//! `OverlappingAmr::composite_index` and `OverlappingAmr::level_and_index`
//! are exact inverses, and traversal utilities rely on that.

use std::sync::Arc;
use log::debug;
use crate::amr_box::{AmrBox, Plane};
use crate::block_store::BlockStore;
use crate::error::{Error, Result};
use crate::extent::{Bounds, HasExtent};
use crate::grid::UniformGrid;




/**
 * A non-empty block visited by `OverlappingAmr::iter`.
 */
#[derive(Clone, Copy, Debug)]
pub struct BlockRef<'a> {
    pub composite: usize,
    pub level: usize,
    pub index: usize,
    pub amr_box: Option<&'a AmrBox>,
    pub grid: &'a Arc<UniformGrid>,
}




/**
 * An AMR hierarchy whose levels overlap: finer blocks cover parts of coarser
 * ones. Level `l` has spacing `spacing / refinement_ratio^l`, and all levels
 * share the hierarchy origin.
 *
 * Cloning is a shallow copy: the clone has its own level, metadata and index
 * bookkeeping, and shares the grid payloads with the original.
 */
#[derive(Clone, Debug)]
pub struct OverlappingAmr {
    origin: [f64; 3],
    spacing: [f64; 3],
    refinement_ratio: i64,
    blocks_per_level: Vec<usize>,
    offsets: Vec<usize>,
    boxes: Vec<Option<AmrBox>>,
    store: BlockStore<UniformGrid>,
}




// ============================================================================
impl OverlappingAmr {


    /**
     * Create an empty hierarchy with no levels. `spacing` is the level-0
     * spacing.
     */
    pub fn new(origin: [f64; 3], spacing: [f64; 3], refinement_ratio: i64) -> Result<Self> {
        if refinement_ratio < 2 {
            return Err(Error::InvalidRefinementRatio(refinement_ratio));
        }
        Ok(Self {
            origin,
            spacing,
            refinement_ratio,
            blocks_per_level: Vec::new(),
            offsets: vec![0],
            boxes: Vec::new(),
            store: BlockStore::new(),
        })
    }


    /**
     * Create a hierarchy and initialize its levels.
     */
    pub fn with_levels(origin: [f64; 3], spacing: [f64; 3], refinement_ratio: i64, blocks_per_level: &[usize]) -> Result<Self> {
        let mut amr = Self::new(origin, spacing, refinement_ratio)?;
        amr.initialize(blocks_per_level.len(), blocks_per_level)?;
        Ok(amr)
    }


    /**
     * Reset the level structure. All metadata and payloads are dropped, and
     * the composite index space becomes the sum of the block counts.
     */
    pub fn initialize(&mut self, num_levels: usize, blocks_per_level: &[usize]) -> Result<()> {
        if blocks_per_level.len() != num_levels {
            return Err(Error::LevelCountMismatch { num_levels, given: blocks_per_level.len() });
        }
        self.blocks_per_level = blocks_per_level.to_vec();
        self.offsets = std::iter::once(0)
            .chain(blocks_per_level.iter().scan(0, |total, &n| {
                *total += n;
                Some(*total)
            }))
            .collect();
        self.boxes = vec![None; self.total_blocks()];
        self.store.clear();
        debug!("initialized {} levels with {} block slots", num_levels, self.total_blocks());
        Ok(())
    }


    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }


    pub fn refinement_ratio(&self) -> i64 {
        self.refinement_ratio
    }


    /**
     * Return the spacing of the given level.
     */
    pub fn spacing(&self, level: usize) -> [f64; 3] {
        let factor = (self.refinement_ratio as f64).powi(level as i32);
        [self.spacing[0] / factor, self.spacing[1] / factor, self.spacing[2] / factor]
    }


    pub fn num_levels(&self) -> usize {
        self.blocks_per_level.len()
    }


    /**
     * Return the number of block slots on a level, empty ones included.
     */
    pub fn num_data_sets(&self, level: usize) -> Result<usize> {
        self.check_level(level)?;
        Ok(self.blocks_per_level[level])
    }


    /**
     * Return the size of the composite index space.
     */
    pub fn total_blocks(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }


    /**
     * Return the number of blocks holding a payload.
     */
    pub fn num_blocks(&self) -> usize {
        self.store.len()
    }


    pub fn is_empty(&self) -> bool {
        self.num_blocks() == 0
    }


    pub fn composite_index(&self, level: usize, index: usize) -> Result<usize> {
        self.check_level(level)?;
        let count = self.blocks_per_level[level];
        if index >= count {
            return Err(Error::BlockOutOfRange { level, index, count });
        }
        Ok(self.offsets[level] + index)
    }


    pub fn level_and_index(&self, composite: usize) -> Result<(usize, usize)> {
        self.check_composite(composite)?;
        let level = self.offsets.partition_point(|&offset| offset <= composite) - 1;
        Ok((level, composite - self.offsets[level]))
    }


    /**
     * Store the metadata of a block, at the slot named by the box's level and
     * block id.
     */
    pub fn set_amr_box(&mut self, amr_box: AmrBox) -> Result<()> {
        let composite = self.composite_index(amr_box.level(), amr_box.block_id())?;
        self.boxes[composite] = Some(amr_box);
        Ok(())
    }


    pub fn amr_box(&self, level: usize, index: usize) -> Result<Option<&AmrBox>> {
        let composite = self.composite_index(level, index)?;
        Ok(self.boxes[composite].as_ref())
    }


    /**
     * Return the metadata at a composite index, `None` if it was never set or
     * the index is out of range.
     */
    pub fn amr_box_at(&self, composite: usize) -> Option<&AmrBox> {
        self.boxes.get(composite).and_then(Option::as_ref)
    }


    /**
     * Iterate over the metadata of every slot that has it, in composite
     * order.
     */
    pub fn boxes(&self) -> impl Iterator<Item = (usize, &AmrBox)> + '_ {
        self.boxes
            .iter()
            .enumerate()
            .filter_map(|(composite, b)| b.as_ref().map(|b| (composite, b)))
    }


    /**
     * Store a payload at a composite index.
     */
    pub fn insert(&mut self, composite: usize, grid: Arc<UniformGrid>) -> Result<()> {
        self.check_composite(composite)?;
        self.store.insert(composite, grid);
        Ok(())
    }


    pub fn set_data_set(&mut self, level: usize, index: usize, grid: Arc<UniformGrid>) -> Result<()> {
        let composite = self.composite_index(level, index)?;
        self.store.insert(composite, grid);
        Ok(())
    }


    /**
     * Store a grid and the metadata derived from its placement on the level
     * lattice.
     */
    pub fn add_block(&mut self, level: usize, index: usize, grid: UniformGrid, tolerance: f64) -> Result<()> {
        let amr_box = AmrBox::from_grid(level, index, &grid, self.origin, self.spacing(level), tolerance)?;
        self.set_amr_box(amr_box)?;
        self.set_data_set(level, index, Arc::new(grid))
    }


    /**
     * Return the payload at a composite index, or `None` if that block is
     * empty. An index outside the composite index space is an error.
     */
    pub fn data_set(&self, composite: usize) -> Result<Option<&Arc<UniformGrid>>> {
        self.check_composite(composite)?;
        Ok(self.store.get(composite))
    }


    pub fn data_set_at(&self, level: usize, index: usize) -> Result<Option<&Arc<UniformGrid>>> {
        let composite = self.composite_index(level, index)?;
        Ok(self.store.get(composite))
    }


    /**
     * Return the payload handle at a composite index, for producers that
     * modify a block in place. Payloads shared with a shallow copy should be
     * written through `Arc::make_mut`, so the copy keeps its data.
     */
    pub fn data_set_mut(&mut self, composite: usize) -> Result<Option<&mut Arc<UniformGrid>>> {
        self.check_composite(composite)?;
        Ok(self.store.get_mut(composite))
    }


    /**
     * Iterate over the non-empty blocks in (level, block) order.
     */
    pub fn iter(&self) -> impl Iterator<Item = BlockRef<'_>> + '_ {
        let mut blocks: Vec<_> = self.store.iter().collect();
        blocks.sort_by_key(|b| b.index);

        blocks.into_iter().filter_map(move |block| {
            let (level, index) = self.level_and_index(block.index).ok()?;
            Some(BlockRef {
                composite: block.index,
                level,
                index,
                amr_box: self.amr_box_at(block.index),
                grid: &block.grid,
            })
        })
    }


    /**
     * Return a copy of this hierarchy (levels, spacing and metadata) with no
     * payloads.
     */
    pub fn structure(&self) -> Self {
        Self { store: BlockStore::new(), ..self.clone() }
    }


    /**
     * Return the world-space bounds of all the boxes, or `None` if no box
     * metadata is set.
     */
    pub fn bounds(&self) -> Option<Bounds> {
        self.boxes().map(|(_, b)| b.bounds()).reduce(|a, b| {
            let mut u = a;
            for n in 0..3 {
                u[2 * n] = a[2 * n].min(b[2 * n]);
                u[2 * n + 1] = a[2 * n + 1].max(b[2 * n + 1]);
            }
            u
        })
    }


    /**
     * Return, in increasing order, the composite indexes of the blocks up to
     * and including `max_level` whose bounds the plane crosses. These are
     * the blocks a slice through the hierarchy needs to load.
     */
    pub fn blocks_intersecting_plane(&self, plane: &Plane, max_level: usize) -> Vec<usize> {
        self.boxes()
            .filter(|(_, b)| b.level() <= max_level && b.intersects_plane(plane))
            .map(|(composite, _)| composite)
            .collect()
    }


    /**
     * Return, in increasing order, the composite indexes of the blocks up to
     * and including `max_level` whose bounds overlap a world-space region.
     * Blocks that only touch the region are included.
     */
    pub fn blocks_within_bounds(&self, region: &Bounds, max_level: usize) -> Vec<usize> {
        self.boxes()
            .filter(|(_, b)| b.level() <= max_level && b.intersects_bounds(region))
            .map(|(composite, _)| composite)
            .collect()
    }


    /**
     * Return the axes along which the hierarchy has no cells, as given by
     * the first box in composite order, or `None` if no box metadata is
     * set. Every other box is expected to agree.
     */
    pub fn degenerate_axes(&self) -> Option<[bool; 3]> {
        self.boxes().next().map(|(_, b)| b.degenerate_axes())
    }


    fn check_level(&self, level: usize) -> Result<()> {
        if level >= self.num_levels() {
            return Err(Error::LevelOutOfRange { level, num_levels: self.num_levels() });
        }
        Ok(())
    }


    fn check_composite(&self, composite: usize) -> Result<()> {
        if composite >= self.total_blocks() {
            return Err(Error::CompositeIndexOutOfRange { index: composite, count: self.total_blocks() });
        }
        Ok(())
    }
}
