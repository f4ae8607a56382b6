//! Region edits on the loaded frame.
//!
//! A drawn selection is matched to a stored region by the largest pixel
//! overlap, not jaccard: a selection is usually much smaller than its target.
//! Edits that find nothing to act on return `Outcome::NoMatch` and log a
//! warning; they never fail the session.

use crate::mpoly::MPoly;
use crate::name::LineageName;
use crate::overlap::{best_by_overlap, overlap};
use crate::region::{next_free_root, position_of, position_of_root, Region};
use crate::store::{RegionPersistence, RegionStore};
use crate::{Error, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Regions of `frame` changed and were persisted. `names` are the regions
    /// created or modified.
    Edited { frame: u32, names: Vec<LineageName> },
    /// Names were rewritten in each of `frames`.
    Renamed { frames: Vec<u32> },
    /// Nothing to act on; the store is untouched.
    NoMatch(String),
}

impl Outcome {
    pub fn is_no_match(&self) -> bool {
        matches!(self, Outcome::NoMatch(_))
    }
}

fn no_match(frame: u32, reason: &str) -> Outcome {
    warn!(frame, "{}", reason);
    Outcome::NoMatch(reason.to_string())
}

fn loaded_frame<P: RegionPersistence>(store: &RegionStore<P>) -> Result<u32> {
    store.frame().ok_or(Error::NoFrameLoaded)
}

fn commit<P: RegionPersistence>(
    store: &mut RegionStore<P>,
    frame: u32,
    regions: Vec<Region>,
    names: Vec<LineageName>,
) -> Result<Outcome> {
    store.replace(regions)?;
    store.save()?;
    Ok(Outcome::Edited { frame, names })
}

/// Every stored frame plus the loaded one, ascending.
fn known_frames<P: RegionPersistence>(store: &RegionStore<P>) -> Result<Vec<u32>> {
    let mut frames = store.frames()?;
    if let Some(f) = store.frame() {
        if let Err(i) = frames.binary_search(&f) {
            frames.insert(i, f);
        }
    }
    Ok(frames)
}

/// Numeric root not used by any lineage in any frame.
fn fresh_root<P: RegionPersistence>(store: &RegionStore<P>) -> Result<usize> {
    let mut names = Vec::new();
    for frame in known_frames(store)? {
        names.extend(store.read_frame(frame)?.into_iter().map(|r| r.name));
    }
    Ok(next_free_root(&names))
}

// Geometry edits
// -----------------------------------------------------------------------------

/// Cut the region under `divider` along it.
///
/// The divider's pixels are removed from the target and what remains is broken
/// into connected pieces. The top-left piece keeps the target's name, the others
/// start new lineages. A divider covering the whole target removes it.
pub fn split<P: RegionPersistence>(store: &mut RegionStore<P>, divider: &MPoly) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    let divider = &divider.normalized()?;
    let mut regions = store.regions().to_vec();
    let Some((i, _)) = best_by_overlap(divider, regions.iter().map(|r| &r.shape), false)? else {
        return Ok(no_match(frame, "divider has no overlap with any region"));
    };

    let target = regions.remove(i);
    // Target xor (divider within target): the target minus the cut line.
    let inside = divider.intersect(&target.shape)?;
    let pieces = target.shape.xor(&inside)?.components()?;
    let mut next_root = fresh_root(store)?;

    let mut names = Vec::with_capacity(pieces.len());
    let mut new_regions = Vec::with_capacity(pieces.len());
    for (k, piece) in pieces.into_iter().enumerate() {
        let name = if k == 0 {
            target.name.clone()
        } else {
            let name = LineageName::numbered(next_root, frame);
            next_root += 1;
            name
        };
        names.push(name.clone());
        new_regions.push(Region::new(name, piece));
    }
    debug!(frame, target = %target.name, pieces = new_regions.len(), "split");

    regions.splice(i..i, new_regions);
    commit(store, frame, regions, names)
}

/// Grow the region under `addition` by the addition's pixels.
pub fn extend<P: RegionPersistence>(store: &mut RegionStore<P>, addition: &MPoly) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    let addition = &addition.normalized()?;
    let mut regions = store.regions().to_vec();
    let Some((i, _)) = best_by_overlap(addition, regions.iter().map(|r| &r.shape), false)? else {
        return Ok(no_match(frame, "selection has no overlap with any region"));
    };

    regions[i].shape = regions[i].shape.union(addition)?;
    let names = vec![regions[i].name.clone()];
    commit(store, frame, regions, names)
}

/// Remove `cutter`'s pixels from `target`, both stored regions.
///
/// Without an explicit target the region overlapping the cutter most is used.
/// Either way the target must touch the cutter and must not be an exact copy
/// of it. A fully covered target is removed.
pub fn subtract<P: RegionPersistence>(
    store: &mut RegionStore<P>,
    target: Option<&LineageName>,
    cutter: &LineageName,
) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    let mut regions = store.regions().to_vec();
    let Some(ci) = position_of(&regions, cutter) else {
        return Ok(no_match(frame, "cutter region not found"));
    };
    let cut = regions[ci].shape.clone();

    let ti = match target {
        Some(name) => match position_of(&regions, name) {
            Some(ti) if ti != ci => {
                let ov = overlap(&cut, &regions[ti].shape)?;
                if ov.is_disjoint() || ov.is_duplicate() {
                    return Ok(no_match(frame, "no valid target region"));
                }
                ti
            }
            _ => return Ok(no_match(frame, "no valid target region")),
        },
        None => match best_by_overlap(&cut, regions.iter().map(|r| &r.shape), true)? {
            Some((ti, _)) => ti,
            None => return Ok(no_match(frame, "cutter has no overlap with any other region")),
        },
    };

    let shape = regions[ti].shape.difference(&cut)?;
    if shape.pixel_area() == 0 {
        let removed = regions.remove(ti);
        info!(frame, name = %removed.name, "subtract removed the whole region");
        return commit(store, frame, regions, Vec::new());
    }
    regions[ti].shape = shape;
    let names = vec![regions[ti].name.clone()];
    commit(store, frame, regions, names)
}

/// Union the named regions into one, named after the first and placed where it was.
pub fn merge<P: RegionPersistence>(store: &mut RegionStore<P>, names: &[LineageName]) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    if names.len() < 2 {
        return Ok(no_match(frame, "select at least 2 regions to merge"));
    }
    let regions = store.regions();
    let mut picked = Vec::with_capacity(names.len());
    for name in names {
        match position_of(regions, name) {
            Some(i) if !picked.contains(&i) => picked.push(i),
            Some(_) => {}
            None => return Ok(no_match(frame, "merge selection names a missing region")),
        }
    }
    if picked.len() < 2 {
        return Ok(no_match(frame, "select at least 2 regions to merge"));
    }

    let mut merged = regions[picked[0]].shape.clone();
    for &i in &picked[1..] {
        merged = merged.union(&regions[i].shape)?;
    }
    let keep = regions[picked[0]].name.clone();

    let mut out = Vec::with_capacity(regions.len() - picked.len() + 1);
    for (i, r) in regions.iter().enumerate() {
        if i == picked[0] {
            out.push(Region::new(keep.clone(), merged.clone()));
        } else if !picked.contains(&i) {
            out.push(r.clone());
        }
    }
    commit(store, frame, out, vec![keep])
}

/// Copy a region unchanged into the next frame under the same lineage.
///
/// Refused when the next frame already holds that lineage.
pub fn clone_forward<P: RegionPersistence>(store: &mut RegionStore<P>, name: &LineageName) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    let Some(i) = position_of(store.regions(), name) else {
        return Ok(no_match(frame, "nothing selected to clone"));
    };
    let src = store.regions()[i].clone();
    let next = frame + 1;

    let mut next_regions = store.read_frame(next)?;
    if position_of_root(&next_regions, &src.name.root).is_some() {
        return Ok(no_match(frame, "next frame already has this lineage"));
    }
    let name = src.name.at_frame(next);
    next_regions.push(Region::new(name.clone(), src.shape));
    store.write_frame(next, next_regions)?;
    Ok(Outcome::Edited {
        frame: next,
        names: vec![name],
    })
}

// Lineage-wide renames
// -----------------------------------------------------------------------------

/// Apply `rename` to every region of lineage `root` in each of `frames`.
///
/// Frames are rewritten one by one. A failure reports which frames were
/// already rewritten; nothing is rolled back.
fn rename_lineage<P, F>(store: &mut RegionStore<P>, frames: &[u32], root: &str, rename: F) -> Result<Vec<u32>>
where
    P: RegionPersistence,
    F: Fn(&mut LineageName),
{
    let mut updated = Vec::new();
    for &frame in frames {
        match rename_in_frame(store, frame, root, &rename) {
            Ok(true) => updated.push(frame),
            Ok(false) => {}
            Err(e) => {
                return Err(Error::PartialUpdate {
                    updated,
                    failed: frame,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(updated)
}

fn rename_in_frame<P, F>(store: &mut RegionStore<P>, frame: u32, root: &str, rename: &F) -> Result<bool>
where
    P: RegionPersistence,
    F: Fn(&mut LineageName),
{
    let mut regions = store.read_frame(frame)?;
    let mut touched = false;
    for r in regions.iter_mut().filter(|r| r.name.root == root) {
        rename(&mut r.name);
        touched = true;
    }
    if touched {
        store.write_frame(frame, regions)?;
    }
    Ok(touched)
}

/// Flip the flag of a lineage in every frame, following the selected region's state.
pub fn tag<P: RegionPersistence>(store: &mut RegionStore<P>, name: &LineageName) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    let Some(i) = position_of(store.regions(), name) else {
        return Ok(no_match(frame, "no region selected to tag"));
    };
    let sel = store.regions()[i].name.clone();
    let flagged = !sel.flagged;

    let frames = known_frames(store)?;
    let frames = rename_lineage(store, &frames, &sel.root, |n| n.flagged = flagged)?;
    info!(root = %sel.root, flagged, n_frames = frames.len(), "tagged lineage");
    Ok(Outcome::Renamed { frames })
}

/// Toggle the double-layer marker of a lineage from the loaded frame on.
///
/// Each region flips on its own, so a lineage already marked in later frames
/// gets unmarked there.
pub fn toggle_double_layer<P: RegionPersistence>(store: &mut RegionStore<P>, name: &LineageName) -> Result<Outcome> {
    let frame = loaded_frame(store)?;
    let Some(i) = position_of(store.regions(), name) else {
        return Ok(no_match(frame, "no region selected to mark"));
    };
    let root = store.regions()[i].name.root.clone();

    let frames: Vec<u32> = known_frames(store)?.into_iter().filter(|&f| f >= frame).collect();
    let frames = rename_lineage(store, &frames, &root, |n| n.double_layer = !n.double_layer)?;
    info!(%root, from = frame, n_frames = frames.len(), "toggled double layer");
    Ok(Outcome::Renamed { frames })
}

// Measurement
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub frame: u32,
    pub name: LineageName,
    pub root: String,
    pub flagged: bool,
    pub double_layer: bool,
    pub area_px: u64,
    pub x: f64,
    pub y: f64,
    pub bx: i64,
    pub by: i64,
    pub width: i64,
    pub height: i64,
}

impl Measurement {
    pub fn of(frame: u32, region: &Region) -> Result<Self> {
        let what = region.name.to_string();
        let area_px = region.shape.ensure_area(&what)?;
        let (x, y) = region
            .shape
            .centroid()
            .ok_or(Error::DegenerateShape(what))?;
        let b = region.shape.bounds();
        Ok(Self {
            frame,
            name: region.name.clone(),
            root: region.name.root.clone(),
            flagged: region.name.flagged,
            double_layer: region.name.double_layer,
            area_px,
            x,
            y,
            bx: b.l,
            by: b.t,
            width: b.w(),
            height: b.h(),
        })
    }
}

/// Measure every region of every frame. A frame without regions aborts.
pub fn measure<P: RegionPersistence>(store: &RegionStore<P>) -> Result<Vec<Measurement>> {
    let mut rows = Vec::new();
    for frame in known_frames(store)? {
        let regions = store.read_frame(frame)?;
        if regions.is_empty() {
            return Err(Error::EmptyFrame(frame));
        }
        for r in &regions {
            rows.push(Measurement::of(frame, r)?);
        }
    }
    Ok(rows)
}
