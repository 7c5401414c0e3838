use core::ops::Bound;
use core::ops::RangeBounds;




/**
 * Extension trait to determine whether two range bounds objects share at
 * least one value. Closed ranges that touch at an endpoint do overlap: `0..=2`
 * and `2..=4` share the value 2. Ranges whose touching endpoint is excluded
 * on either side do not: `0..2` and `2..4` are disjoint.
 *
 * The values only need to be partially ordered, so the same test serves
 * integer index ranges and floating point world-space intervals.
 */
pub trait Overlap<T>: RangeBounds<T> {
    fn overlaps<S: Overlap<T>>(&self, s: &S) -> bool;
}




// ============================================================================
impl<R, T> Overlap<T> for R
where
    R: RangeBounds<T>,
    T: PartialOrd
{
    fn overlaps<S: Overlap<T>>(&self, s: &S) -> bool {
        use Bound::*;

        let lower = match (self.start_bound(), s.start_bound()) {
            (Unbounded, b) | (b, Unbounded) => b,
            (Included(l0), Included(l1)) => Included(max(l0, l1)),
            (Included(l0), Excluded(l1)) |
            (Excluded(l1), Included(l0)) => if l1 >= l0 { Excluded(l1) } else { Included(l0) },
            (Excluded(l0), Excluded(l1)) => Excluded(max(l0, l1)),
        };

        let upper = match (self.end_bound(), s.end_bound()) {
            (Unbounded, b) | (b, Unbounded) => b,
            (Included(r0), Included(r1)) => Included(min(r0, r1)),
            (Included(r0), Excluded(r1)) |
            (Excluded(r1), Included(r0)) => if r1 <= r0 { Excluded(r1) } else { Included(r0) },
            (Excluded(r0), Excluded(r1)) => Excluded(min(r0, r1)),
        };

        match (lower, upper) {
            (Unbounded, _) => true,
            (_, Unbounded) => true,
            (Included(l), Included(r)) => l <= r,
            (Included(l), Excluded(r)) => l < r,
            (Excluded(l), Included(r)) => l < r,
            (Excluded(l), Excluded(r)) => l < r,
        }
    }
}

fn max<'a, T: PartialOrd>(a: &'a T, b: &'a T) -> &'a T {
    if b > a { b } else { a }
}

fn min<'a, T: PartialOrd>(a: &'a T, b: &'a T) -> &'a T {
    if b < a { b } else { a }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Overlap;

    #[test]
    fn overlapping_ranges_works() {
        assert!((0..2).overlaps(&(1..3)));
        assert!((..).overlaps(&(..2)));
        assert!(!(0..2).overlaps(&(2..3)));
        assert!(!(..=2).overlaps(&(3..)));
        assert!(!(4..).overlaps(&(..2)));
    }

    #[test]
    fn closed_ranges_touching_at_an_endpoint_overlap() {
        assert!((0..=2).overlaps(&(2..=4)));
        assert!((..=2).overlaps(&(2..)));
        assert!((0.0..=1.0).overlaps(&(1.0..=2.0)));
        assert!(!(0.0..=1.0).overlaps(&(1.5..=2.0)));
        assert!(!(0..=2).overlaps(&(2..2)));
    }

    #[test]
    fn half_open_against_closed_respects_the_excluded_end() {
        assert!(!(0..2).overlaps(&(2..=3)));
        assert!((0..3).overlaps(&(2..=3)));
        assert!(!(2..=3).overlaps(&(0..2)));
    }
}
