//! Recursive coordinate bisection (RCB) of a global structured extent.
//!
//! The partitioner halves the longest axis of every extent, round after
//! round, until there are `2^ceil(log2(N))` leaves. When `N` is not a power
//! of two this yields more partitions than were requested; callers receive
//! all of them.

use log::debug;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::extent::{Axis, Extent};
use crate::message::util::ceil_log2;




/**
 * Whether the indexes of the extent being partitioned count points or cells.
 * Sibling point extents share the index plane they were split on, so node
 * data on the cut is present in both halves. Sibling cell extents are
 * disjoint.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentKind {
    Point,
    Cell,
}

impl Default for ExtentKind {
    fn default() -> Self {
        ExtentKind::Point
    }
}




/**
 * Splits a global extent into near-equal sub-extents. Setting the global
 * extent or the partition count discards any previous result.
 */
#[derive(Clone, Debug, Default)]
pub struct ExtentPartitioner {
    global_extent: Option<Extent>,
    num_partitions: usize,
    kind: ExtentKind,
    extents: Option<Vec<Extent>>,
}




// ============================================================================
impl ExtentPartitioner {

    pub fn new(global_extent: Extent, num_partitions: usize) -> Self {
        Self {
            global_extent: Some(global_extent),
            num_partitions,
            kind: ExtentKind::Point,
            extents: None,
        }
    }

    pub fn with_kind(mut self, kind: ExtentKind) -> Self {
        self.set_kind(kind);
        self
    }

    pub fn set_global_extent(&mut self, extent: Extent) {
        self.extents = None;
        self.global_extent = Some(extent);
    }

    pub fn set_number_of_partitions(&mut self, num_partitions: usize) {
        self.extents = None;
        self.num_partitions = num_partitions;
    }

    pub fn set_kind(&mut self, kind: ExtentKind) {
        self.extents = None;
        self.kind = kind;
    }

    pub fn global_extent(&self) -> Option<&Extent> {
        self.global_extent.as_ref()
    }

    pub fn number_of_partitions(&self) -> usize {
        self.num_partitions
    }

    /// The number of leaves `partition` produces: the smallest power of two
    /// that is at least the requested count (and at least one).
    pub fn number_of_total_extents(&self) -> usize {
        1 << ceil_log2(self.num_partitions.max(1))
    }

    /// Return the number of partitioned extents, zero if `partition` has not
    /// been run since the last change.
    pub fn number_of_extents(&self) -> usize {
        self.extents.as_ref().map_or(0, Vec::len)
    }

    /**
     * Bisect the global extent breadth-first. In each round every current
     * extent is split in two: the first half takes the parent's place and
     * the second half is appended, so partition indexes are stable from one
     * round to the next.
     */
    pub fn partition(&mut self) -> Result<&[Extent]> {
        let global = self.global_extent.ok_or(Error::NoGlobalExtent)?;
        let total = self.number_of_total_extents();
        let mut extents = Vec::with_capacity(total);
        extents.push(global);

        while extents.len() < total {
            for n in 0..extents.len() {
                let (s1, s2) = split_extent(&extents[n], self.kind).ok_or(Error::ExtentTooSmall {
                    extent: global.as_array(),
                    requested: self.num_partitions,
                })?;
                extents[n] = s1;
                extents.push(s2);
            }
        }
        debug!("partitioned {} into {} extents", global, extents.len());
        let extents = self.extents.insert(extents);
        Ok(extents.as_slice())
    }

    /**
     * Return the extent of the partition with the given index.
     */
    pub fn partition_extent(&self, index: usize) -> Result<Extent> {
        let extents = self.extents.as_ref().ok_or(Error::NotPartitioned)?;
        extents.get(index).copied().ok_or(Error::PartitionOutOfRange {
            index,
            count: extents.len(),
        })
    }

    pub fn partition_extents(&self) -> Result<&[Extent]> {
        self.extents.as_deref().ok_or(Error::NotPartitioned)
    }
}




/**
 * Return the number of cells along an axis that a split may distribute.
 */
fn splittable_length(extent: &Extent, axis: Axis, kind: ExtentKind) -> i64 {
    match kind {
        ExtentKind::Point => extent.hi(axis) - extent.lo(axis),
        ExtentKind::Cell => extent.hi(axis) - extent.lo(axis) + 1,
    }
}




/**
 * Return the longest axis of an extent. Ties go to the earlier axis in i, j, k
 * order.
 */
pub fn longest_axis(extent: &Extent, kind: ExtentKind) -> Axis {
    let mut best = Axis::I;
    for axis in [Axis::J, Axis::K] {
        if splittable_length(extent, axis, kind) > splittable_length(extent, best, kind) {
            best = axis;
        }
    }
    best
}




/**
 * Split an extent at the midpoint of its longest axis, or return `None` if
 * the axis holds fewer than two cells.
 */
pub fn split_extent(extent: &Extent, kind: ExtentKind) -> Option<(Extent, Extent)> {
    let axis = longest_axis(extent, kind);
    let (lo, hi) = (extent.lo(axis), extent.hi(axis));

    if splittable_length(extent, axis, kind) < 2 {
        return None;
    }
    let (first, second) = match kind {
        ExtentKind::Point => {
            let mid = lo + (hi - lo) / 2;
            ((lo, mid), (mid, hi))
        }
        ExtentKind::Cell => {
            let mid = lo + (hi - lo + 1) / 2 - 1;
            ((lo, mid), (mid + 1, hi))
        }
    };
    let s1 = extent.with_axis(axis, first.0, first.1).ok()?;
    let s2 = extent.with_axis(axis, second.0, second.1).ok()?;
    Some((s1, s2))
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::collections::HashSet;
    use proptest::prelude::*;
    use crate::error::Error;
    use crate::extent::{Axis, Extent};
    use super::{longest_axis, ExtentKind, ExtentPartitioner};

    fn extent(ext: [i64; 6]) -> Extent {
        Extent::new(ext).unwrap()
    }

    #[test]
    fn four_by_four_grid_into_three_yields_four_quadrants() {
        let mut partitioner = ExtentPartitioner::new(extent([0, 3, 0, 3, 0, 0]), 3);
        let extents = partitioner.partition().unwrap().to_vec();

        assert_eq!(extents.len(), 4);
        assert_eq!(partitioner.number_of_extents(), 4);
        assert_eq!(extents[0].as_array(), [0, 1, 0, 1, 0, 0]);
        assert_eq!(extents[1].as_array(), [1, 3, 0, 1, 0, 0]);
        assert_eq!(extents[2].as_array(), [0, 1, 1, 3, 0, 0]);
        assert_eq!(extents[3].as_array(), [1, 3, 1, 3, 0, 0]);
    }

    #[test]
    fn ties_are_broken_in_axis_order() {
        assert_eq!(longest_axis(&extent([0, 4, 0, 4, 0, 4]), ExtentKind::Point), Axis::I);
        assert_eq!(longest_axis(&extent([0, 2, 0, 4, 0, 4]), ExtentKind::Point), Axis::J);
        assert_eq!(longest_axis(&extent([0, 2, 0, 2, 0, 4]), ExtentKind::Point), Axis::K);
    }

    #[test]
    fn cell_extents_do_not_share_a_plane() {
        let mut partitioner = ExtentPartitioner::new(extent([0, 7, 0, 3, 0, 0]), 2)
            .with_kind(ExtentKind::Cell);
        let extents = partitioner.partition().unwrap();
        assert_eq!(extents[0].as_array(), [0, 3, 0, 3, 0, 0]);
        assert_eq!(extents[1].as_array(), [4, 7, 0, 3, 0, 0]);
    }

    #[test]
    fn changing_inputs_discards_the_partition() {
        let mut partitioner = ExtentPartitioner::new(extent([0, 15, 0, 15, 0, 15]), 4);
        partitioner.partition().unwrap();
        assert!(partitioner.partition_extent(3).is_ok());

        partitioner.set_number_of_partitions(8);
        assert_eq!(partitioner.number_of_extents(), 0);
        assert!(partitioner.partition_extent(0).is_err());

        partitioner.partition().unwrap();
        partitioner.set_global_extent(extent([0, 3, 0, 3, 0, 3]));
        assert!(partitioner.partition_extents().is_err());
    }

    #[test]
    fn out_of_range_partition_index_is_an_error() {
        let mut partitioner = ExtentPartitioner::new(extent([0, 9, 0, 9, 0, 9]), 2);
        partitioner.partition().unwrap();
        assert!(partitioner.partition_extent(1).is_ok());
        assert!(partitioner.partition_extent(2).is_err());
    }

    #[test]
    fn zero_partitions_yields_the_global_extent() {
        let mut partitioner = ExtentPartitioner::new(extent([0, 9, 0, 9, 0, 0]), 0);
        assert_eq!(partitioner.partition().unwrap(), &[extent([0, 9, 0, 9, 0, 0])]);
    }

    #[test]
    fn too_many_partitions_for_the_extent_is_an_error() {
        let mut partitioner = ExtentPartitioner::new(extent([0, 2, 0, 0, 0, 0]), 4);
        assert!(partitioner.partition().is_err());
        assert_eq!(partitioner.number_of_extents(), 0);
    }

    #[test]
    fn partitioner_without_global_extent_cannot_partition() {
        let mut partitioner = ExtentPartitioner::default();
        partitioner.set_number_of_partitions(2);
        assert!(matches!(partitioner.partition(), Err(Error::NoGlobalExtent)));
        assert!(matches!(partitioner.partition_extent(0), Err(Error::NotPartitioned)));
    }

    fn arb_extent() -> impl Strategy<Value = Extent> {
        (-20i64..20, 8i64..40, -20i64..20, 8i64..40, -5i64..5, 0i64..12)
            .prop_map(|(i0, ni, j0, nj, k0, nk)| extent([i0, i0 + ni, j0, j0 + nj, k0, k0 + nk]))
    }

    proptest! {
        #[test]
        fn partition_count_is_next_power_of_two(global in arb_extent(), n in 1usize..17) {
            let mut partitioner = ExtentPartitioner::new(global, n);
            let count = partitioner.partition().unwrap().len();
            prop_assert_eq!(count, n.next_power_of_two());
        }

        #[test]
        fn point_partitions_cover_every_node_and_no_cell_twice(global in arb_extent(), n in 1usize..17) {
            let mut partitioner = ExtentPartitioner::new(global, n);
            let extents = partitioner.partition().unwrap().to_vec();

            let nodes: HashSet<[i64; 3]> = extents.iter().flat_map(|e| e.iter().collect::<Vec<_>>()).collect();
            prop_assert_eq!(nodes.len() as u64, global.num_nodes());
            prop_assert!(extents.iter().all(|e| global.contains_extent(e)));

            let cells: u64 = extents.iter().map(|e| e.num_cells()).sum();
            prop_assert_eq!(cells, global.num_cells());
        }

        #[test]
        fn cell_partitions_tile_the_extent(global in arb_extent(), n in 1usize..17) {
            let mut partitioner = ExtentPartitioner::new(global, n).with_kind(ExtentKind::Cell);
            let extents = partitioner.partition().unwrap().to_vec();
            let total: u64 = extents.iter().map(|e| e.num_nodes()).sum();
            prop_assert_eq!(total, global.num_nodes());
            for (a, e) in extents.iter().enumerate() {
                for f in &extents[a + 1..] {
                    prop_assert!(!e.intersects(f));
                }
            }
        }
    }
}
