use crate::im::{label_im, LabelIm};
use crate::mpoly::MPoly;
use crate::name::LineageName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One tracked object in one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: LineageName,
    pub shape: MPoly,
}

impl Region {
    pub fn new(name: LineageName, shape: MPoly) -> Self {
        Self { name, shape }
    }

    pub fn frame(&self) -> u32 {
        self.name.frame
    }
}

/// The ordered regions visible at one frame. This is the unit of persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRegions {
    pub frame: u32,
    pub regions: Vec<Region>,
}

impl FrameRegions {
    pub fn new(frame: u32, regions: Vec<Region>) -> Self {
        Self { frame, regions }
    }

    /// Names must be unique within a frame.
    pub fn check_unique(&self) -> Result<()> {
        check_unique_names(self.frame, &self.regions)
    }
}

pub fn check_unique_names(frame: u32, regions: &[Region]) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::with_capacity(regions.len());
    for r in regions {
        let name = r.name.to_string();
        if !seen.insert(name.clone()) {
            return Err(Error::DuplicateName { name, frame });
        }
    }
    Ok(())
}

pub fn position_of(regions: &[Region], name: &LineageName) -> Option<usize> {
    regions.iter().position(|r| r.name == *name)
}

pub fn position_of_root(regions: &[Region], root: &str) -> Option<usize> {
    regions.iter().position(|r| r.name.root == root)
}

/// Smallest numeric root above every numeric root in `names`.
pub fn next_free_root<'a, I>(names: I) -> usize
where
    I: IntoIterator<Item = &'a LineageName>,
{
    names
        .into_iter()
        .filter_map(|n| n.root_number())
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0)
}

/// Lineage roots handed out so far over a sequence of frames.
///
/// A root stays reserved after its lineage ends, so a later lineage never
/// inherits it.
#[derive(Debug, Clone, Default)]
pub struct RootPool {
    taken: HashSet<String>,
    next: usize,
}

impl RootPool {
    pub fn from_names<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a LineageName>,
    {
        let mut pool = Self::default();
        for name in names {
            pool.reserve(name);
        }
        pool
    }

    pub fn reserve(&mut self, name: &LineageName) {
        if let Some(n) = name.root_number() {
            self.next = self.next.max(n as usize + 1);
        }
        self.taken.insert(name.root.clone());
    }

    pub fn contains(&self, root: &str) -> bool {
        self.taken.contains(root)
    }

    /// Name a new lineage at `frame`, numbered `preferred` unless that root is
    /// taken, in which case the next number above every reserved one.
    pub fn claim(&mut self, preferred: usize, frame: u32) -> LineageName {
        let mut name = LineageName::numbered(preferred, frame);
        if self.contains(&name.root) {
            name = LineageName::numbered(self.next, frame);
        }
        self.reserve(&name);
        name
    }
}

/// Turn a segmentation mask into provisionally named regions.
///
/// Every 4-connected component of equal non-zero value becomes one region, so
/// both binary masks and per-object label images work. Components smaller than
/// `min_px` are dropped. Names are `<index:02>t<frame:03>` in scan order.
pub fn regions_from_label_im(im: &LabelIm, frame: u32, min_px: usize) -> Result<Vec<Region>> {
    let (_, infos) = label_im(im);

    let mut regions = Vec::new();
    for info in infos.iter().skip(1) {
        if info.size < min_px {
            debug!(frame, size = info.size, min_px, "dropping small component");
            continue;
        }
        let shape = MPoly::from_pixels(info.pixels(im.w).map(|(x, y)| (x as i64, y as i64)))?;
        let name = LineageName::numbered(regions.len(), frame);
        regions.push(Region::new(name, shape));
    }
    Ok(regions)
}
