//! Frame-to-frame region tracking.
//!
//! Matching is greedy: previous-frame regions are visited in stored order and
//! each claims the still-unclaimed current region with the highest jaccard
//! overlap (first one wins ties). This is not a globally optimal assignment;
//! early-indexed previous regions get first pick.

use crate::desc::TrackConfig;
use crate::im::LabelIm;
use crate::name::LineageName;
use crate::overlap::{overlap, Overlap};
use crate::region::{regions_from_label_im, FrameRegions, Region, RootPool};
use crate::store::{RegionPersistence, RegionStore};
use crate::Result;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchReport {
    pub frame: u32,
    /// `(previous name, assigned name)` per accepted match.
    pub matched: Vec<(LineageName, LineageName)>,
    /// Previous regions that overlapped nothing; candidates for manual relinking.
    pub unmatched_previous: Vec<LineageName>,
    pub new_roots: Vec<LineageName>,
}

/// Name the regions of the first frame `<index:02>t<frame:03>`, keeping their tags.
pub fn seed_first_frame(regions: Vec<Region>, frame: u32) -> Vec<Region> {
    regions
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let mut name = LineageName::numbered(i, frame);
            name.flagged = r.name.flagged;
            name.double_layer = r.name.double_layer;
            Region::new(name, r.shape)
        })
        .collect()
}

/// Assign lineage names to `cur` (regions of `frame`) from `prev` (the frame before).
///
/// Matched regions take the previous lineage root and its flag; the double-layer
/// marker stays with the current region. Unclaimed current regions start new
/// lineages numbered by their input position, or by the next free number when
/// that root is already in `roots`. Every root seen here is added to `roots`,
/// so passing one pool through a whole sequence keeps ended lineages' roots
/// retired.
pub fn match_previous(
    prev: &[Region],
    cur: Vec<Region>,
    frame: u32,
    roots: &mut RootPool,
    cfg: &TrackConfig,
) -> Result<(Vec<Region>, MatchReport)> {
    let mut report = MatchReport {
        frame,
        ..Default::default()
    };
    let mut claimed = vec![false; cur.len()];
    let mut out: Vec<Region> = Vec::with_capacity(cur.len());

    for p in prev {
        let mut best: Option<(usize, Overlap)> = None;
        let mut max_jaccard = 0.0;
        for (j, n) in cur.iter().enumerate() {
            if claimed[j] {
                continue;
            }
            let ov = overlap(&n.shape, &p.shape)?;
            if ov.jaccard > max_jaccard {
                max_jaccard = ov.jaccard;
                best = Some((j, ov));
            }
        }

        let Some((j, ov)) = best else {
            debug!(frame, name = %p.name, "no overlapping region in this frame");
            report.unmatched_previous.push(p.name.clone());
            continue;
        };
        claimed[j] = true;

        let mut name = p.name.at_frame(frame);
        name.double_layer = cur[j].name.double_layer;

        // With the default threshold of 0 this branch never fires: `ratio` is
        // non-negative, and the disjoint sentinel never reaches here.
        let shape = if ov.ratio < cfg.keep_previous_below_ratio {
            p.shape.clone()
        } else {
            cur[j].shape.clone()
        };

        report.matched.push((p.name.clone(), name.clone()));
        out.push(Region::new(name, shape));
    }

    for r in prev.iter().chain(out.iter()) {
        roots.reserve(&r.name);
    }

    for (j, n) in cur.into_iter().enumerate() {
        if claimed[j] {
            continue;
        }
        let mut name = roots.claim(j, frame);
        name.double_layer = n.name.double_layer;
        report.new_roots.push(name.clone());
        out.push(Region::new(name, n.shape));
    }

    debug!(
        frame,
        matched = report.matched.len(),
        new_roots = report.new_roots.len(),
        lost = report.unmatched_previous.len(),
        "matched frame"
    );
    Ok((out, report))
}

/// Track a whole stack of segmentation masks, frame `first_frame + i` for mask `i`.
pub fn track_label_stack(
    masks: &[LabelIm],
    first_frame: u32,
    cfg: &TrackConfig,
) -> Result<(Vec<FrameRegions>, Vec<MatchReport>)> {
    let mut frames: Vec<FrameRegions> = Vec::with_capacity(masks.len());
    let mut reports = Vec::new();
    let mut roots = RootPool::default();

    for (i, mask) in masks.iter().enumerate() {
        let frame = first_frame + i as u32;
        let regions = regions_from_label_im(mask, frame, cfg.min_region_px)?;
        let named = match frames.last() {
            None => seed_first_frame(regions, frame),
            Some(prev) => {
                let (named, report) = match_previous(&prev.regions, regions, frame, &mut roots, cfg)?;
                reports.push(report);
                named
            }
        };
        frames.push(FrameRegions::new(frame, named));
    }

    info!(frames = frames.len(), "tracked label stack");
    Ok((frames, reports))
}

/// Re-track every persisted frame in place: seed the first, match the rest.
pub fn track_store<P: RegionPersistence>(
    store: &mut RegionStore<P>,
    cfg: &TrackConfig,
) -> Result<Vec<MatchReport>> {
    if store.is_dirty() {
        store.save()?;
    }
    let frames = store.frames()?;
    let Some((&first, rest)) = frames.split_first() else {
        return Ok(Vec::new());
    };

    let mut prev = seed_first_frame(store.read_frame(first)?, first);
    store.write_frame(first, prev.clone())?;

    let mut roots = RootPool::default();
    let mut reports = Vec::with_capacity(rest.len());
    for &frame in rest {
        let cur = store.read_frame(frame)?;
        let (named, report) = match_previous(&prev, cur, frame, &mut roots, cfg)?;
        store.write_frame(frame, named.clone())?;
        reports.push(report);
        prev = named;
    }

    info!(frames = frames.len(), "tracked stored frames");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpoly::MPoly;
    use crate::store::MemPersistence;
    use crate::test_helpers::{label_im_from_ascii, name, names_of, rect_region};

    fn cfg() -> TrackConfig {
        TrackConfig::default()
    }

    #[test]
    fn child_takes_parent_lineage_and_stranger_gets_new_root() {
        // Frame 1: R, 100 px. Frame 2: R1 (40 px inside R), R2 (60 px elsewhere).
        let prev = vec![rect_region("00t001", 0, 0, 10, 10)];
        let cur = vec![
            rect_region("00t002", 0, 0, 4, 10),
            rect_region("01t002", 20, 0, 26, 10),
        ];
        let (named, report) = match_previous(&prev, cur, 2, &mut RootPool::default(), &cfg()).unwrap();

        assert_eq!(names_of(&named), vec!["00t002", "01t002"]);
        assert_eq!(named[0].shape.pixel_area(), 40);
        assert_eq!(report.matched, vec![(name("00t001"), name("00t002"))]);
        assert_eq!(report.new_roots, vec![name("01t002")]);
    }

    #[test]
    fn new_root_skips_roots_already_in_use() {
        // The stranger sits at input position 0, but lineage 00 is taken.
        let prev = vec![
            rect_region("00t001", 0, 0, 10, 10),
            rect_region("05t001", 40, 0, 50, 10),
        ];
        let cur = vec![
            rect_region("00t002", 100, 0, 110, 10),
            rect_region("01t002", 0, 0, 10, 10),
        ];
        let (named, report) = match_previous(&prev, cur, 2, &mut RootPool::default(), &cfg()).unwrap();
        assert_eq!(names_of(&named), vec!["00t002", "06t002"]);
        assert_eq!(report.unmatched_previous, vec![name("05t001")]);
    }

    #[test]
    fn greedy_first_come_first_served() {
        // Both previous regions like the same current region best; the first wins
        // it and the second falls back to its next best.
        let prev = vec![
            rect_region("00t001", 0, 0, 10, 10),
            rect_region("01t001", 0, 0, 12, 10),
        ];
        let cur = vec![
            rect_region("x0t002", 0, 0, 11, 10),
            rect_region("x1t002", 10, 0, 14, 10),
        ];
        let (named, _) = match_previous(&prev, cur, 2, &mut RootPool::default(), &cfg()).unwrap();
        assert_eq!(names_of(&named), vec!["00t002", "01t002"]);
        assert_eq!(named[0].shape.bounds().r, 11);
        assert_eq!(named[1].shape.bounds().l, 10);
    }

    #[test]
    fn flags_follow_lineage_and_double_layer_stays_per_frame() {
        let prev = vec![rect_region("p03t004", 0, 0, 10, 10)];
        let cur = vec![rect_region("00t005d", 1, 1, 10, 10)];
        let (named, _) = match_previous(&prev, cur, 5, &mut RootPool::default(), &cfg()).unwrap();
        assert_eq!(names_of(&named), vec!["p03t005d"]);
    }

    #[test]
    fn rerunning_on_consistent_names_is_idempotent() {
        let prev = vec![
            rect_region("p00t001", 0, 0, 10, 10),
            rect_region("01t001", 20, 0, 30, 10),
        ];
        let cur = vec![
            rect_region("p00t002", 1, 0, 11, 10),
            rect_region("01t002d", 21, 0, 31, 10),
        ];
        let (named, _) = match_previous(&prev, cur.clone(), 2, &mut RootPool::default(), &cfg()).unwrap();
        assert_eq!(names_of(&named), names_of(&cur));
        let (again, _) = match_previous(&prev, named.clone(), 2, &mut RootPool::default(), &cfg()).unwrap();
        assert_eq!(names_of(&again), names_of(&named));
    }

    #[test]
    fn keep_previous_branch_only_fires_with_positive_threshold() {
        let prev = vec![rect_region("00t001", 0, 0, 10, 10)];
        let cur = vec![rect_region("00t002", 0, 0, 5, 10)];

        let (named, _) = match_previous(&prev, cur.clone(), 2, &mut RootPool::default(), &cfg()).unwrap();
        assert_eq!(named[0].shape.pixel_area(), 50);

        let strict = TrackConfig {
            keep_previous_below_ratio: 0.8,
            ..cfg()
        };
        let (named, _) = match_previous(&prev, cur, 2, &mut RootPool::default(), &strict).unwrap();
        assert_eq!(named[0].shape.pixel_area(), 100);
        assert_eq!(names_of(&named), vec!["00t002"]);
    }

    #[test]
    fn lineage_roots_persist_over_label_stack() {
        let masks = vec![
            label_im_from_ascii(
                r#"
                    1100000
                    1100022
                    0000022
                "#,
            ),
            label_im_from_ascii(
                r#"
                    0110000
                    0110220
                    0000220
                "#,
            ),
            label_im_from_ascii(
                r#"
                    0110000
                    0110000
                    0000022
                "#,
            ),
        ];
        let cfg = TrackConfig {
            min_region_px: 1,
            ..cfg()
        };
        let (frames, reports) = track_label_stack(&masks, 1, &cfg).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(names_of(&frames[0].regions), vec!["00t001", "01t001"]);
        assert_eq!(names_of(&frames[1].regions), vec!["00t002", "01t002"]);
        assert_eq!(names_of(&frames[2].regions), vec!["00t003", "01t003"]);
        for f in &frames {
            for r in &f.regions {
                assert_eq!(r.name.frame, f.frame);
            }
        }
    }

    #[test]
    fn ended_lineage_root_is_not_reused() {
        let masks = vec![
            label_im_from_ascii(
                r#"
                    1100000
                    1100022
                    0000022
                "#,
            ),
            label_im_from_ascii(
                r#"
                    1100000
                    1100000
                    0000000
                "#,
            ),
            label_im_from_ascii(
                r#"
                    1100000
                    1100000
                    0000033
                "#,
            ),
        ];
        let cfg = TrackConfig {
            min_region_px: 1,
            ..cfg()
        };
        let (frames, reports) = track_label_stack(&masks, 1, &cfg).unwrap();
        assert_eq!(names_of(&frames[1].regions), vec!["00t002"]);
        assert_eq!(names_of(&frames[2].regions), vec!["00t003", "02t003"]);
        assert_eq!(reports[1].new_roots, vec![name("02t003")]);
    }

    #[test]
    fn track_store_keeps_tags() {
        let mut mem = MemPersistence::new();
        mem.write_frame(1, &[rect_region("p07t001", 0, 0, 4, 4)]).unwrap();
        mem.write_frame(2, &[rect_region("p07t002", 0, 0, 4, 4)]).unwrap();
        let mut store = RegionStore::new(mem);

        track_store(&mut store, &cfg()).unwrap();
        assert_eq!(names_of(&store.read_frame(1).unwrap()), vec!["p00t001"]);
        assert_eq!(names_of(&store.read_frame(2).unwrap()), vec!["p00t002"]);
    }

    #[test]
    fn track_store_rewrites_every_frame() {
        let mut mem = MemPersistence::new();
        mem.write_frame(1, &[rect_region("07t001", 0, 0, 4, 4)]).unwrap();
        mem.write_frame(
            2,
            &[
                Region::new(name("00t002"), MPoly::rect(30, 30, 34, 34)),
                Region::new(name("01t002"), MPoly::rect(1, 1, 5, 5)),
            ],
        )
        .unwrap();
        let mut store = RegionStore::new(mem);

        let reports = track_store(&mut store, &cfg()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(names_of(&store.read_frame(1).unwrap()), vec!["00t001"]);
        // 01 matches lineage 00; the stranger at position 0 collides and moves on.
        assert_eq!(names_of(&store.read_frame(2).unwrap()), vec!["00t002", "01t002"]);
    }
}
