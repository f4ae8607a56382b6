use crate::mpoly::MPoly;
use crate::Result;

/// `ratio` reported for disjoint shapes. It reads the same as a perfect size match.
pub const NO_OVERLAP_RATIO: f64 = 1.0;

/// Pixel overlap between a "new" shape and an "old" one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    /// Pixels shared by both shapes.
    pub overlap: u64,
    /// `|new| / |old|` when the shapes overlap, otherwise `NO_OVERLAP_RATIO`.
    pub ratio: f64,
    /// Intersection over union, 0 when disjoint.
    pub jaccard: f64,
}

impl Overlap {
    pub fn is_disjoint(&self) -> bool {
        self.overlap == 0
    }

    /// Both shapes cover exactly the same pixels.
    pub fn is_duplicate(&self) -> bool {
        self.jaccard == 1.0
    }
}

/// Compare `new` against `old`. Zero-area inputs are rejected.
pub fn overlap(new: &MPoly, old: &MPoly) -> Result<Overlap> {
    let n_size = new.ensure_area("new shape")?;
    let o_size = old.ensure_area("old shape")?;
    let overlap = new.intersect(old)?.pixel_area();

    if overlap == 0 {
        return Ok(Overlap {
            overlap: 0,
            ratio: NO_OVERLAP_RATIO,
            jaccard: 0.0,
        });
    }

    let (n, o, i) = (n_size as f64, o_size as f64, overlap as f64);
    Ok(Overlap {
        overlap,
        ratio: n / o,
        jaccard: i / (n + o - i),
    })
}

/// Index of the candidate sharing the most pixels with `selection`.
///
/// Ties keep the first candidate. With `skip_duplicates`, candidates identical
/// to the selection (jaccard 1) are passed over, so a stored copy of the
/// selection never wins against itself.
pub fn best_by_overlap<'a, I>(
    selection: &MPoly,
    candidates: I,
    skip_duplicates: bool,
) -> Result<Option<(usize, Overlap)>>
where
    I: IntoIterator<Item = &'a MPoly>,
{
    let mut best: Option<(usize, Overlap)> = None;
    for (i, cand) in candidates.into_iter().enumerate() {
        let ov = overlap(selection, cand)?;
        if skip_duplicates && ov.is_duplicate() {
            continue;
        }
        let max = best.map(|(_, b)| b.overlap).unwrap_or(0);
        if ov.overlap > max {
            best = Some((i, ov));
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_shapes_use_sentinels() {
        let a = MPoly::rect(0, 0, 5, 5);
        let b = MPoly::rect(10, 10, 20, 20);
        let ov = overlap(&a, &b).unwrap();
        assert_eq!(ov.overlap, 0);
        assert_eq!(ov.jaccard, 0.0);
        assert_eq!(ov.ratio, NO_OVERLAP_RATIO);
        assert!(ov.is_disjoint());
    }

    #[test]
    fn identical_shapes_are_perfect() {
        let a = MPoly::rect(0, 0, 10, 10);
        let ov = overlap(&a, &a.clone()).unwrap();
        assert_eq!(ov.overlap, 100);
        assert_eq!(ov.jaccard, 1.0);
        assert_eq!(ov.ratio, 1.0);
        assert!(ov.is_duplicate());
    }

    #[test]
    fn partial_overlap_metrics() {
        // |new| = 40, |old| = 100, all of new inside old.
        let old = MPoly::rect(0, 0, 10, 10);
        let new = MPoly::rect(0, 0, 4, 10);
        let ov = overlap(&new, &old).unwrap();
        assert_eq!(ov.overlap, 40);
        assert!((ov.ratio - 0.4).abs() < 1e-12);
        assert!((ov.jaccard - 0.4).abs() < 1e-12);
    }

    #[test]
    fn degenerate_input_is_rejected() {
        let a = MPoly::rect(0, 0, 10, 10);
        assert!(overlap(&MPoly::empty(), &a).is_err());
        assert!(overlap(&a, &MPoly::rect(3, 3, 3, 9)).is_err());
    }

    #[test]
    fn best_by_overlap_prefers_largest_then_first() {
        let sel = MPoly::rect(4, 0, 8, 2);
        let cands = [
            MPoly::rect(0, 0, 5, 2),   // 2 px
            MPoly::rect(5, 0, 20, 2),  // 6 px
            MPoly::rect(5, 0, 8, 2),   // 6 px, later
            MPoly::rect(50, 0, 60, 2), // disjoint
        ];
        let (i, ov) = best_by_overlap(&sel, &cands, false).unwrap().unwrap();
        assert_eq!(i, 1);
        assert_eq!(ov.overlap, 6);

        let far = MPoly::rect(100, 100, 101, 101);
        assert!(best_by_overlap(&far, &cands, false).unwrap().is_none());
    }

    #[test]
    fn best_by_overlap_can_skip_exact_copies() {
        let sel = MPoly::rect(0, 0, 4, 4);
        let cands = [sel.clone(), MPoly::rect(2, 2, 10, 10)];
        let (i, _) = best_by_overlap(&sel, &cands, true).unwrap().unwrap();
        assert_eq!(i, 1);
        let (i, _) = best_by_overlap(&sel, &cands, false).unwrap().unwrap();
        assert_eq!(i, 0);
    }
}
