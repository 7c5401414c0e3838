//! Ghost classification for overlapping AMR hierarchies.
//!
//! A cell of a block is a ghost when some other block holds the same region
//! and is considered its owner: any block on a finer level, or a block on
//! the same level that wins the configured `OwnershipRule`. Those other
//! blocks are the _coverers_ of the block. Only coverers that hold data take
//! part, so a region is never given up to a block that has nothing to show
//! for it.
//!
//! Stripping removes ghost layers from a block where that can be done with a
//! rectangular cut: a coverer that spans the block on the two other axes and
//! reaches one of its faces trims that face. Cuts repeat until nothing more
//! can be removed. Ghost cells that remain inside the trimmed block (a finer
//! block sitting in the middle of a coarse one, say) are flagged
//! `GhostFlags::DUPLICATE` instead. Blanking never removes cells; it only
//! sets flags.
//!
//! Every decision depends only on box metadata, the ownership rule and (for
//! distributed runs) the global owner map, so processes holding the same
//! metadata reach the same decisions.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::amr_box::AmrBox;
use crate::error::{Error, Result};
use crate::extent::{Axis, Extent, HasExtent};
use crate::grid::{GhostFlags, UniformGrid};
use crate::hierarchy::{BlockRef, OverlappingAmr};




/**
 * Policy deciding which of two same-level blocks owns the cells they share.
 * `LowestRank` prefers the block held by the lower process rank, falling
 * back to the lower block id; without an owner map every block is taken to
 * be on rank 0.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnershipRule {
    LowestBlockId,
    HighestBlockId,
    LowestRank,
}

impl Default for OwnershipRule {
    fn default() -> Self {
        OwnershipRule::LowestBlockId
    }
}

impl FromStr for OwnershipRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lowest-block-id" => Ok(OwnershipRule::LowestBlockId),
            "highest-block-id" => Ok(OwnershipRule::HighestBlockId),
            "lowest-rank" => Ok(OwnershipRule::LowestRank),
            _ => Err(format!("unknown ownership rule '{}' (lowest-block-id, highest-block-id, lowest-rank)", s)),
        }
    }
}

impl OwnershipRule {

    /**
     * Determine whether block `a` owns the cells it shares with block `b`.
     * Blocks are given as (rank, block id) pairs.
     */
    pub fn prefers(self, a: (usize, usize), b: (usize, usize)) -> bool {
        match self {
            OwnershipRule::LowestBlockId => a.1 < b.1,
            OwnershipRule::HighestBlockId => a.1 > b.1,
            OwnershipRule::LowestRank => a < b,
        }
    }
}




/**
 * Options for stripping and blanking. `tolerance` bounds the disagreement,
 * relative to the level spacing, allowed between a block's metadata, its
 * grid, and the hierarchy.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostOptions {
    pub rule: OwnershipRule,
    pub tolerance: f64,
}

impl Default for GhostOptions {
    fn default() -> Self {
        Self {
            rule: OwnershipRule::default(),
            tolerance: 1e-6,
        }
    }
}




/**
 * The process rank holding each block of a hierarchy, by composite index.
 * `None` marks a block that no process holds.
 */
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerMap {
    owners: Vec<Option<usize>>,
}




// ============================================================================
impl OwnerMap {

    pub fn new(total_blocks: usize) -> Self {
        Self { owners: vec![None; total_blocks] }
    }

    pub fn from_owners(owners: Vec<Option<usize>>) -> Self {
        Self { owners }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Return the rank holding a block, `None` if the block is held nowhere
    /// or the index is out of range.
    pub fn owner(&self, composite: usize) -> Option<usize> {
        self.owners.get(composite).copied().flatten()
    }

    pub fn set_owner(&mut self, composite: usize, rank: usize) -> Result<()> {
        let count = self.owners.len();
        let slot = self
            .owners
            .get_mut(composite)
            .ok_or(Error::CompositeIndexOutOfRange { index: composite, count })?;
        *slot = Some(rank);
        Ok(())
    }

    /// Return the composite indexes of the blocks held by a rank.
    pub fn blocks_owned_by(&self, rank: usize) -> Vec<usize> {
        (0..self.owners.len()).filter(|&c| self.owner(c) == Some(rank)).collect()
    }

    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.owners
    }
}




/**
 * A block passed over because its metadata is missing or does not agree
 * with its grid or the hierarchy. Its payload is carried through unchanged
 * and it does not act as a coverer.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedBlock {
    pub composite: usize,
    pub level: usize,
    pub block: usize,
    pub reason: String,
}

/**
 * A block whose trimmed grid could not be produced. Its payload is carried
 * through unchanged.
 */
#[derive(Debug)]
pub struct BlockFailure {
    pub composite: usize,
    pub error: Error,
}

/**
 * The outcome for one block. `full` and `valid` are cell extents in the
 * block's level index space; `valid` is `None` when the block was entirely
 * covered.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct BlockDecision {
    pub composite: usize,
    pub level: usize,
    pub block: usize,
    pub full: Extent,
    pub valid: Option<Extent>,
    pub duplicated_cells: usize,
}

#[derive(Debug, Default)]
pub struct StripReport {
    pub decisions: Vec<BlockDecision>,
    pub skipped: Vec<SkippedBlock>,
    pub failed: Vec<BlockFailure>,
    pub shallow_copies: usize,
    pub trimmed: usize,
    pub flagged: usize,
    pub emptied: usize,
}

/**
 * Summary of a blanking pass. The cell counts only include cells whose
 * flags changed.
 */
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlankReport {
    pub refined_cells: usize,
    pub duplicate_cells: usize,
    pub blocks_modified: usize,
    pub skipped: Vec<SkippedBlock>,
}




/**
 * Reduce a cell extent by cutting away the faces that are covered by one of
 * `covers`. A cover cuts a face when it spans the current extent on the two
 * other axes and touches that face. Cuts are applied in the order of
 * `covers`, repeating until none applies. Return `None` if nothing is left.
 */
pub fn trim_cells(cells: Extent, degenerate: [bool; 3], covers: &[Extent]) -> Option<Extent> {
    let mut valid = cells;

    loop {
        let mut changed = false;

        for cover in covers {
            let x = match valid.intersection(cover) {
                Some(x) => x,
                None => continue,
            };
            if x == valid {
                return None;
            }
            for a in Axis::ALL {
                if degenerate[a.index()] {
                    continue;
                }
                let spans = a.others().iter().all(|&o| x.lo(o) == valid.lo(o) && x.hi(o) == valid.hi(o));

                if !spans {
                    continue;
                }
                let cut = if x.lo(a) == valid.lo(a) {
                    valid.with_axis(a, x.hi(a) + 1, valid.hi(a))
                } else if x.hi(a) == valid.hi(a) {
                    valid.with_axis(a, valid.lo(a), x.lo(a) - 1)
                } else {
                    continue;
                };
                if let Ok(cut) = cut {
                    valid = cut;
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            return Some(valid);
        }
    }
}




/**
 * Produce a copy of `input` with ghost layers removed. Blocks that need no
 * change are shallow copies; trimmed blocks get a new grid holding only
 * their valid cells, and new box metadata to match. Blocks left with no
 * valid cells are dropped (their metadata is kept).
 *
 * With an owner map, a block takes part as a coverer when the map says some
 * process holds it, and `OwnershipRule::LowestRank` uses the mapped ranks.
 * Without one, only local payloads count.
 */
pub fn strip_ghost_layers(
    input: &OverlappingAmr,
    options: &GhostOptions,
    owners: Option<&OwnerMap>) -> Result<(OverlappingAmr, StripReport)>
{
    let survey = Survey::new(input, options, owners)?;
    let mut output = input.structure();
    let mut report = StripReport::default();

    for (block, skipped) in &survey.skipped {
        output.insert(block.composite, Arc::clone(block.grid))?;
        report.skipped.push(skipped.clone());
    }

    for &(block, amr_box) in &survey.blocks {
        let covers = survey.covers(block.composite, amr_box);
        let degenerate = amr_box.degenerate_axes();
        let full = amr_box.cell_extent();
        let mut decision = BlockDecision {
            composite: block.composite,
            level: block.level,
            block: block.index,
            full,
            valid: None,
            duplicated_cells: 0,
        };

        let valid = match trim_cells(full, degenerate, &covers) {
            Some(valid) => valid,
            None => {
                debug!("block ({}, {}) is entirely covered, dropping it", block.level, block.index);
                report.emptied += 1;
                report.decisions.push(decision);
                continue;
            }
        };
        let offset = grid_offset(block.grid, amr_box);
        let duplicates: Vec<Extent> = covers
            .iter()
            .filter_map(|cover| cover.intersection(&valid))
            .map(|cells| cells.shift(offset))
            .collect();
        let unmarked = duplicates
            .iter()
            .any(|cells| block.grid.count_unmarked(cells, GhostFlags::DUPLICATE) > 0);

        decision.valid = Some(valid);
        decision.duplicated_cells = count_union(&valid.shift(offset), &duplicates);

        if valid == full && !unmarked {
            output.insert(block.composite, Arc::clone(block.grid))?;
            report.shallow_copies += 1;
            report.decisions.push(decision);
            continue;
        }

        let points = Extent::point_extent_of_cells(&valid, degenerate);

        match block.grid.extract(&points.shift(offset)) {
            Ok(mut grid) => {
                for cells in &duplicates {
                    grid.mark_cells(cells, GhostFlags::DUPLICATE);
                }
                output.insert(block.composite, Arc::new(grid))?;

                if valid != full {
                    debug!("block ({}, {}) trimmed from {} to {}", block.level, block.index, amr_box.extent(), points);
                    output.set_amr_box(amr_box.with_extent(points))?;
                    report.trimmed += 1;
                } else {
                    report.flagged += 1;
                }
            }
            Err(error) => {
                warn!("block ({}, {}) could not be trimmed: {}", block.level, block.index, error);
                output.insert(block.composite, Arc::clone(block.grid))?;
                report.failed.push(BlockFailure { composite: block.composite, error });
            }
        }
        report.decisions.push(decision);
    }

    info!(
        "stripped ghost layers: {} unchanged, {} trimmed, {} flagged, {} emptied, {} skipped, {} failed",
        report.shallow_copies,
        report.trimmed,
        report.flagged,
        report.emptied,
        report.skipped.len(),
        report.failed.len());

    Ok((output, report))
}




/**
 * Flag, without removing, the cells of each block that another block owns:
 * `REFINED | HIDDEN` where a finer block covers them, and `DUPLICATE |
 * HIDDEN` where a same-level block wins them. Payloads shared with other
 * hierarchies are copied before they are written.
 */
pub fn blank_cells(amr: &mut OverlappingAmr, options: &GhostOptions, owners: Option<&OwnerMap>) -> Result<BlankReport> {
    let mut report = BlankReport::default();

    let plan = {
        let survey = Survey::new(amr, options, owners)?;
        report.skipped = survey.skipped.iter().map(|(_, s)| s.clone()).collect();

        survey
            .blocks
            .iter()
            .map(|&(block, amr_box)| {
                let offset = grid_offset(block.grid, amr_box);
                let marks: Vec<(Extent, GhostFlags)> = survey
                    .classified_covers(block.composite, amr_box)
                    .into_iter()
                    .map(|(cells, flags)| (cells.shift(offset), flags | GhostFlags::HIDDEN))
                    .filter(|(cells, flags)| block.grid.count_unmarked(cells, *flags) > 0)
                    .collect();
                (block.composite, marks)
            })
            .filter(|(_, marks)| !marks.is_empty())
            .collect::<Vec<_>>()
    };

    for (composite, marks) in plan {
        if let Some(grid) = amr.data_set_mut(composite)? {
            let grid = Arc::make_mut(grid);

            for (cells, flags) in marks {
                let changed = grid.mark_cells(&cells, flags);

                if flags.contains(GhostFlags::REFINED) {
                    report.refined_cells += changed;
                } else {
                    report.duplicate_cells += changed;
                }
            }
            report.blocks_modified += 1;
        }
    }

    info!(
        "blanked {} refined and {} duplicate cells in {} blocks ({} skipped)",
        report.refined_cells,
        report.duplicate_cells,
        report.blocks_modified,
        report.skipped.len());

    Ok(report)
}




// ============================================================================
struct Coverer<'a> {
    composite: usize,
    rank: usize,
    amr_box: &'a AmrBox,
}

/**
 * The metadata view shared by stripping and blanking: the local blocks that
 * can be classified, those that were skipped, and every box that holds data
 * somewhere.
 */
struct Survey<'a> {
    ratio: i64,
    rule: OwnershipRule,
    owners: Option<&'a OwnerMap>,
    blocks: Vec<(BlockRef<'a>, &'a AmrBox)>,
    skipped: Vec<(BlockRef<'a>, SkippedBlock)>,
    coverers: Vec<Coverer<'a>>,
}

impl<'a> Survey<'a> {

    fn new(amr: &'a OverlappingAmr, options: &GhostOptions, owners: Option<&'a OwnerMap>) -> Result<Self> {
        if let Some(map) = owners {
            if map.len() != amr.total_blocks() {
                return Err(Error::OwnerMapMismatch { len: map.len(), expected: amr.total_blocks() });
            }
        }
        let flat = amr.degenerate_axes();
        let mut blocks = Vec::new();
        let mut skipped = Vec::new();

        for block in amr.iter() {
            match check_block(amr, &block, flat, options.tolerance) {
                Ok(amr_box) => blocks.push((block, amr_box)),
                Err(reason) => {
                    warn!("skipping block ({}, {}): {}", block.level, block.index, reason);
                    skipped.push((block, SkippedBlock {
                        composite: block.composite,
                        level: block.level,
                        block: block.index,
                        reason,
                    }));
                }
            }
        }
        let excluded: HashSet<usize> = skipped.iter().map(|(block, _)| block.composite).collect();

        let coverers = amr
            .boxes()
            .filter(|(composite, _)| !excluded.contains(composite))
            .filter(|&(composite, _)| match owners {
                Some(map) => map.owner(composite).is_some(),
                None => matches!(amr.data_set(composite), Ok(Some(_))),
            })
            .filter(|&(composite, amr_box)| match check_box(amr, composite, amr_box, flat, options.tolerance) {
                Ok(()) => true,
                Err(reason) => {
                    warn!("ignoring box ({}, {}) as a coverer: {}", amr_box.level(), amr_box.block_id(), reason);
                    false
                }
            })
            .map(|(composite, amr_box)| Coverer {
                composite,
                rank: owners.and_then(|map| map.owner(composite)).unwrap_or(0),
                amr_box,
            })
            .collect();

        Ok(Self {
            ratio: amr.refinement_ratio(),
            rule: options.rule,
            owners,
            blocks,
            skipped,
            coverers,
        })
    }

    /**
     * Return the cells of a block owned by its coverers, in the block's
     * index space and in composite order, with the flag naming why.
     */
    fn classified_covers(&self, composite: usize, amr_box: &AmrBox) -> Vec<(Extent, GhostFlags)> {
        let rank = self.owners.and_then(|map| map.owner(composite)).unwrap_or(0);

        self.coverers
            .iter()
            .filter(|c| c.composite != composite && c.amr_box.intersects(amr_box))
            .filter_map(|c| {
                if c.amr_box.level() > amr_box.level() {
                    amr_box
                        .covered_cells(c.amr_box, self.ratio)
                        .map(|cells| (cells, GhostFlags::REFINED))
                } else if c.amr_box.level() == amr_box.level()
                    && self.rule.prefers((c.rank, c.amr_box.block_id()), (rank, amr_box.block_id()))
                {
                    amr_box
                        .overlapping_cells(c.amr_box)
                        .map(|cells| (cells, GhostFlags::DUPLICATE))
                } else {
                    None
                }
            })
            .collect()
    }

    fn covers(&self, composite: usize, amr_box: &AmrBox) -> Vec<Extent> {
        self.classified_covers(composite, amr_box)
            .into_iter()
            .map(|(cells, _)| cells)
            .collect()
    }
}




/**
 * Check that a box is labelled with the slot it is stored in, is placed on
 * the hierarchy's lattice for its level, and carries cells along the same
 * axes as the hierarchy.
 */
fn check_box(
    amr: &OverlappingAmr,
    composite: usize,
    amr_box: &AmrBox,
    flat: Option<[bool; 3]>,
    tolerance: f64) -> Result<(), String>
{
    let (level, index) = amr.level_and_index(composite).map_err(|e| e.to_string())?;

    if amr_box.level() != level || amr_box.block_id() != index {
        return Err(format!("box is labelled ({}, {})", amr_box.level(), amr_box.block_id()));
    }
    if let Some(flat) = flat {
        if amr_box.degenerate_axes() != flat {
            return Err(format!(
                "box {} is flat on axes {:?}, the hierarchy on {:?}",
                amr_box.extent(),
                amr_box.degenerate_axes(),
                flat));
        }
    }
    let h = amr.spacing(level);
    let o = amr.origin();

    for n in 0..3 {
        if (amr_box.origin()[n] - o[n]).abs() > tolerance * h[n] {
            return Err(format!("box origin {:?} differs from the hierarchy origin {:?}", amr_box.origin(), o));
        }
        if (amr_box.spacing()[n] - h[n]).abs() > tolerance * h[n] {
            return Err(format!("box spacing {:?} differs from the level spacing {:?}", amr_box.spacing(), h));
        }
    }
    Ok(())
}

fn check_block<'a>(
    amr: &'a OverlappingAmr,
    block: &BlockRef<'a>,
    flat: Option<[bool; 3]>,
    tolerance: f64) -> Result<&'a AmrBox, String>
{
    let amr_box = block.amr_box.ok_or_else(|| "no box metadata".to_string())?;
    check_box(amr, block.composite, amr_box, flat, tolerance)?;

    let placed = AmrBox::from_grid(
        block.level,
        block.index,
        block.grid.as_ref(),
        amr.origin(),
        amr.spacing(block.level),
        tolerance).map_err(|e| e.to_string())?;

    if placed.extent() != amr_box.extent() {
        return Err(format!("grid is placed at {}, box says {}", placed.extent(), amr_box.extent()));
    }
    Ok(amr_box)
}

/// The shift from a box's index space to its grid's.
pub(crate) fn grid_offset(grid: &UniformGrid, amr_box: &AmrBox) -> [i64; 3] {
    let (g, b) = (grid.extent().lower(), amr_box.extent().lower());
    [g[0] - b[0], g[1] - b[1], g[2] - b[2]]
}

fn count_union(within: &Extent, parts: &[Extent]) -> usize {
    within.iter().filter(|&index| parts.iter().any(|p| p.contains(index))).count()
}
