use core::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::overlap::Overlap;




/**
 * Identifier for a Cartesian axis
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    I,
    J,
    K,
}




// ============================================================================
impl Axis {

    /// The axes in their tie-breaking priority order.
    pub const ALL: [Axis; 3] = [Axis::I, Axis::J, Axis::K];

    pub fn index(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
            Axis::K => 2,
        }
    }

    /// The two axes orthogonal to this one.
    pub fn others(self) -> [Axis; 2] {
        match self {
            Axis::I => [Axis::J, Axis::K],
            Axis::J => [Axis::I, Axis::K],
            Axis::K => [Axis::I, Axis::J],
        }
    }
}




/**
 * An axis-aligned, inclusive range in a 3D structured index space, packed as
 * `[imin, imax, jmin, jmax, kmin, kmax]`. A zero-length axis (`min == max`) is
 * allowed and is how 2D and 1D data are represented.
 *
 * Whether the indexes count points or cells is up to the user of the extent.
 * AMR boxes and grids use point extents, and `Extent::cell_extent` converts.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i64; 6]", into = "[i64; 6]")]
pub struct Extent {
    ext: [i64; 6],
}




// ============================================================================
impl Extent {


    /**
     * Create an extent from its packed form. Fails if any minimum exceeds its
     * maximum.
     */
    pub fn new(ext: [i64; 6]) -> Result<Self> {
        if ext[0] > ext[1] || ext[2] > ext[3] || ext[4] > ext[5] {
            return Err(Error::InvalidExtent(ext));
        }
        Ok(Self { ext })
    }


    /**
     * Create an extent from its lower and upper corners.
     */
    pub fn from_corners(lo: [i64; 3], hi: [i64; 3]) -> Result<Self> {
        Self::new([lo[0], hi[0], lo[1], hi[1], lo[2], hi[2]])
    }


    /**
     * Return the packed `[imin, imax, jmin, jmax, kmin, kmax]` array.
     */
    pub fn as_array(&self) -> [i64; 6] {
        self.ext
    }


    pub fn lo(&self, axis: Axis) -> i64 {
        self.ext[2 * axis.index()]
    }


    pub fn hi(&self, axis: Axis) -> i64 {
        self.ext[2 * axis.index() + 1]
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn lower(&self) -> [i64; 3] {
        [self.ext[0], self.ext[2], self.ext[4]]
    }


    /**
     * Return the maximum index (inclusive).
     */
    pub fn upper(&self) -> [i64; 3] {
        [self.ext[1], self.ext[3], self.ext[5]]
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dims(&self) -> [usize; 3] {
        let d = |a: Axis| (self.hi(a) - self.lo(a) + 1) as usize;
        [d(Axis::I), d(Axis::J), d(Axis::K)]
    }


    pub fn is_degenerate(&self, axis: Axis) -> bool {
        self.lo(axis) == self.hi(axis)
    }


    /**
     * Return the number of non-degenerate axes.
     */
    pub fn dimension(&self) -> usize {
        Axis::ALL.iter().filter(|&&a| !self.is_degenerate(a)).count()
    }


    /**
     * Return the number of structured points in this extent, reading it as a
     * point extent.
     */
    pub fn num_nodes(&self) -> u64 {
        Axis::ALL
            .iter()
            .map(|&a| (self.hi(a) - self.lo(a) + 1) as u64)
            .product()
    }


    /**
     * Return the number of cells in this extent, reading it as a point
     * extent. A degenerate axis contributes a factor of one.
     */
    pub fn num_cells(&self) -> u64 {
        Axis::ALL
            .iter()
            .map(|&a| (self.hi(a) - self.lo(a)).max(1) as u64)
            .product()
    }


    /**
     * Return the extent of the cells spanned by this point extent: `[lo,
     * hi - 1]` on each non-degenerate axis and `[lo, lo]` on degenerate ones.
     */
    pub fn cell_extent(&self) -> Extent {
        let mut ext = self.ext;
        for a in Axis::ALL {
            if !self.is_degenerate(a) {
                ext[2 * a.index() + 1] -= 1;
            }
        }
        Extent { ext }
    }


    /**
     * The inverse of `cell_extent`: return the point extent spanned by a cell
     * extent, where `degenerate` flags the axes that carry no cells.
     */
    pub fn point_extent_of_cells(cells: &Extent, degenerate: [bool; 3]) -> Extent {
        let mut ext = cells.ext;
        for a in Axis::ALL {
            if !degenerate[a.index()] {
                ext[2 * a.index() + 1] += 1;
            }
        }
        Extent { ext }
    }


    /**
     * Return a copy of this extent with one axis replaced.
     */
    pub fn with_axis(&self, axis: Axis, lo: i64, hi: i64) -> Result<Self> {
        let mut ext = self.ext;
        ext[2 * axis.index()] = lo;
        ext[2 * axis.index() + 1] = hi;
        Self::new(ext)
    }


    /**
     * Determine whether this extent contains the given index.
     */
    pub fn contains(&self, index: [i64; 3]) -> bool {
        Axis::ALL.iter().all(|&a| (self.lo(a)..=self.hi(a)).contains(&index[a.index()]))
    }


    /**
     * Determine whether another extent is a subset of this one.
     */
    pub fn contains_extent(&self, other: &Self) -> bool {
        Axis::ALL
            .iter()
            .all(|&a| other.lo(a) >= self.lo(a) && other.hi(a) <= self.hi(a))
    }


    /**
     * Determine whether two extents share at least one index. Extents that
     * meet on a common index plane do intersect.
     */
    pub fn intersects(&self, other: &Self) -> bool {
        Axis::ALL
            .iter()
            .all(|&a| (self.lo(a)..=self.hi(a)).overlaps(&(other.lo(a)..=other.hi(a))))
    }


    /**
     * Return the indexes common to both extents, if there are any.
     */
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        let mut ext = [0; 6];
        for a in Axis::ALL {
            ext[2 * a.index()] = self.lo(a).max(other.lo(a));
            ext[2 * a.index() + 1] = self.hi(a).min(other.hi(a));
        }
        Some(Extent { ext })
    }


    /**
     * Translate this extent by the given offset on each axis.
     */
    pub fn shift(&self, delta: [i64; 3]) -> Self {
        let mut ext = self.ext;
        for a in Axis::ALL {
            ext[2 * a.index()] += delta[a.index()];
            ext[2 * a.index() + 1] += delta[a.index()];
        }
        Extent { ext }
    }


    /**
     * Expand this extent by the given number of indexes on both sides of
     * each non-degenerate axis, optionally clamped to a bounding extent.
     */
    pub fn grow(&self, delta: usize, clamp: Option<&Extent>) -> Self {
        let delta = delta as i64;
        let mut ext = self.ext;
        for a in Axis::ALL {
            if self.is_degenerate(a) {
                continue;
            }
            let (mut lo, mut hi) = (self.lo(a) - delta, self.hi(a) + delta);
            if let Some(bound) = clamp {
                lo = lo.max(bound.lo(a));
                hi = hi.min(bound.hi(a));
            }
            ext[2 * a.index()] = lo;
            ext[2 * a.index() + 1] = hi;
        }
        Extent { ext }
    }


    /**
     * Return the linear offset for the given index, in a memory buffer
     * aligned with the start of this extent. The i index increases fastest
     * and k slowest.
     */
    pub fn linear_offset(&self, index: [i64; 3]) -> usize {
        let [ni, nj, _] = self.dims();
        let i = (index[0] - self.ext[0]) as usize;
        let j = (index[1] - self.ext[2]) as usize;
        let k = (index[2] - self.ext[4]) as usize;
        (k * nj + j) * ni + i
    }


    /**
     * Return a memory region object corresponding to the selection of this
     * extent in the buffer allocated for another one.
     */
    pub fn memory_region_in(&self, parent: &Self) -> MemoryRegion {
        let start = (
            (self.ext[4] - parent.ext[4]) as usize,
            (self.ext[2] - parent.ext[2]) as usize,
            (self.ext[0] - parent.ext[0]) as usize);
        let [ci, cj, ck] = self.dims();
        let [si, sj, sk] = parent.dims();
        MemoryRegion { start, count: (ck, cj, ci), shape: (sk, sj, si) }
    }


    /**
     * Return an iterator which traverses the extent in memory order (the i
     * index increases fastest).
     */
    pub fn iter(&self) -> impl Iterator<Item = [i64; 3]> + '_ {
        (self.ext[4]..=self.ext[5]).flat_map(move |k| {
            (self.ext[2]..=self.ext[3])
                .flat_map(move |j| (self.ext[0]..=self.ext[1]).map(move |i| [i, j, k]))
        })
    }
}




// ============================================================================
impl TryFrom<[i64; 6]> for Extent {
    type Error = Error;

    fn try_from(ext: [i64; 6]) -> Result<Self> {
        Self::new(ext)
    }
}

impl From<Extent> for [i64; 6] {
    fn from(extent: Extent) -> Self {
        extent.ext
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.ext;
        write!(f, "[{},{},{},{},{},{}]", e[0], e[1], e[2], e[3], e[4], e[5])
    }
}





/// World-space bounds packed as `[xmin, xmax, ymin, ymax, zmin, zmax]`.
pub type Bounds = [f64; 6];




/**
 * Capability of anything placed on a uniform lattice: an index extent, and
 * the origin and spacing that map indexes to world coordinates as `origin +
 * index * spacing`.
 */
pub trait HasExtent {
    fn extent(&self) -> Extent;

    fn origin(&self) -> [f64; 3];

    fn spacing(&self) -> [f64; 3];

    /// Return the world-space bounding box of the extent's points.
    fn bounds(&self) -> Bounds {
        let (e, o, h) = (self.extent(), self.origin(), self.spacing());
        let mut bounds = [0.0; 6];
        for a in Axis::ALL {
            let n = a.index();
            bounds[2 * n] = o[n] + e.lo(a) as f64 * h[n];
            bounds[2 * n + 1] = o[n] + e.hi(a) as f64 * h[n];
        }
        bounds
    }
}



/**
 * A 3D memory region within a contiguous buffer. Tuples are ordered (k, j,
 * i), slowest axis first.
 */
#[derive(Clone, Debug)]
pub struct MemoryRegion {
    start: (usize, usize, usize),
    count: (usize, usize, usize),
    shape: (usize, usize, usize),
}




// ============================================================================
impl MemoryRegion {

    /// Return the number of elements selected by the region.
    pub fn len(&self) -> usize {
        self.count.0 * self.count.1 * self.count.2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the `chunk`-sized tuples of the selection, in memory
    /// order. The slice must hold exactly `chunk` values per element of the
    /// parent shape.
    pub fn iter_slice<'a, T>(&'a self, slice: &'a [T], chunk: usize) -> impl Iterator<Item = &'a [T]> {
        let start = &self.start;
        let count = &self.count;
        let s = chunk;
        let r = self.shape.2 * s;
        let q = self.shape.1 * r;

        assert!(slice.len() == self.shape.0 * q);

        slice[start.0 * q .. (start.0 + count.0) * q]
        .chunks_exact(q).flat_map(move |k| k[start.1 * r .. (start.1 + count.1) * r]
        .chunks_exact(r).flat_map(move |j| j[start.2 * s .. (start.2 + count.2) * s]
        .chunks_exact(s)))
    }

    pub fn iter_slice_mut<'a, T>(&'a self, slice: &'a mut [T], chunk: usize) -> impl Iterator<Item = &'a mut [T]> {
        let start = &self.start;
        let count = &self.count;
        let s = chunk;
        let r = self.shape.2 * s;
        let q = self.shape.1 * r;

        assert!(slice.len() == self.shape.0 * q);

        slice[start.0 * q .. (start.0 + count.0) * q]
        .chunks_exact_mut(q).flat_map(move |k| k[start.1 * r .. (start.1 + count.1) * r]
        .chunks_exact_mut(r).flat_map(move |j| j[start.2 * s .. (start.2 + count.2) * s]
        .chunks_exact_mut(s)))
    }
}
