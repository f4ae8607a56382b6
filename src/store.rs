//! Per-frame region persistence and the working copy of the displayed frame.

use crate::region::{check_unique_names, position_of, FrameRegions, Region};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where frame region sets live between loads. Keyed by frame index.
pub trait RegionPersistence {
    /// Regions stored for `frame`; a frame never written reads as empty.
    fn read_frame(&self, frame: u32) -> Result<Vec<Region>>;

    fn write_frame(&mut self, frame: u32, regions: &[Region]) -> Result<()>;

    /// Every stored frame index, ascending.
    fn frames(&self) -> Result<Vec<u32>>;
}

// In-memory
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemPersistence {
    frames: BTreeMap<u32, Vec<Region>>,
}

impl MemPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegionPersistence for MemPersistence {
    fn read_frame(&self, frame: u32) -> Result<Vec<Region>> {
        Ok(self.frames.get(&frame).cloned().unwrap_or_default())
    }

    fn write_frame(&mut self, frame: u32, regions: &[Region]) -> Result<()> {
        self.frames.insert(frame, regions.to_vec());
        Ok(())
    }

    fn frames(&self) -> Result<Vec<u32>> {
        Ok(self.frames.keys().copied().collect())
    }
}

// JSON directory: one `ROI_T=<frame:03>.json` file per frame
// -----------------------------------------------------------------------------

const FILE_PREFIX: &str = "ROI_T=";
const FILE_EXT: &str = ".json";

#[derive(Debug, Clone)]
pub struct JsonDirPersistence {
    dir: PathBuf,
}

impl JsonDirPersistence {
    /// Use `dir`, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, frame: u32) -> PathBuf {
        self.dir.join(format!("{}{:03}{}", FILE_PREFIX, frame, FILE_EXT))
    }
}

fn frame_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_EXT)?
        .parse()
        .ok()
}

impl RegionPersistence for JsonDirPersistence {
    fn read_frame(&self, frame: u32) -> Result<Vec<Region>> {
        let path = self.frame_path(frame);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path)?;
        let stored: FrameRegions = serde_json::from_str(&text)?;
        Ok(stored.regions)
    }

    fn write_frame(&mut self, frame: u32, regions: &[Region]) -> Result<()> {
        let stored = FrameRegions::new(frame, regions.to_vec());
        let text = serde_json::to_string_pretty(&stored)?;

        // Write then rename so a reader never sees a half-written frame.
        let path = self.frame_path(frame);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn frames(&self) -> Result<Vec<u32>> {
        let mut frames: Vec<u32> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| frame_from_file_name(&e.file_name().to_string_lossy()))
            .collect();
        frames.sort_unstable();
        Ok(frames)
    }
}

// Store
// -----------------------------------------------------------------------------

/// Working copy of one frame's regions on top of a persistence backend.
///
/// All writes to the backend go through here. Loading another frame while the
/// current one has unsaved edits fails with `Error::UnsavedEdits`; call `save`
/// or `discard` first.
#[derive(Debug)]
pub struct RegionStore<P: RegionPersistence> {
    persistence: P,
    frame: Option<u32>,
    regions: Vec<Region>,
    dirty: bool,
}

impl<P: RegionPersistence> RegionStore<P> {
    pub fn new(persistence: P) -> Self {
        Self {
            persistence,
            frame: None,
            regions: Vec::new(),
            dirty: false,
        }
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn frame(&self) -> Option<u32> {
        self.frame
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn frames(&self) -> Result<Vec<u32>> {
        self.persistence.frames()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn loaded_frame(&self) -> Result<u32> {
        self.frame.ok_or(Error::NoFrameLoaded)
    }

    pub fn load(&mut self, frame: u32) -> Result<()> {
        if let Some(cur) = self.frame {
            if self.dirty && cur != frame {
                return Err(Error::UnsavedEdits {
                    frame: cur,
                    requested: frame,
                });
            }
        }
        let regions = self.persistence.read_frame(frame)?;
        check_unique_names(frame, &regions)?;
        debug!(frame, n = regions.len(), "loaded frame");
        self.frame = Some(frame);
        self.regions = regions;
        self.dirty = false;
        Ok(())
    }

    pub fn save(&mut self) -> Result<()> {
        let frame = self.loaded_frame()?;
        self.persistence.write_frame(frame, &self.regions)?;
        self.dirty = false;
        debug!(frame, n = self.regions.len(), "saved frame");
        Ok(())
    }

    /// Drop unsaved edits and reload the current frame from the backend.
    pub fn discard(&mut self) -> Result<()> {
        let frame = self.loaded_frame()?;
        self.dirty = false;
        self.load(frame)
    }

    /// Replace the whole working set. Names are moved to the loaded frame.
    pub fn replace(&mut self, regions: Vec<Region>) -> Result<()> {
        let frame = self.loaded_frame()?;
        let regions = normalize(frame, regions)?;
        self.regions = regions;
        self.dirty = true;
        Ok(())
    }

    pub fn add(&mut self, region: Region) -> Result<()> {
        let mut regions = self.regions.clone();
        regions.push(region);
        self.replace(regions)
    }

    pub fn remove(&mut self, name: &crate::name::LineageName) -> Option<Region> {
        let i = position_of(&self.regions, name)?;
        self.dirty = true;
        Some(self.regions.remove(i))
    }

    /// Regions of any frame, honoring unsaved edits of the loaded one.
    pub fn read_frame(&self, frame: u32) -> Result<Vec<Region>> {
        if self.frame == Some(frame) {
            return Ok(self.regions.clone());
        }
        self.persistence.read_frame(frame)
    }

    /// Persist `regions` for any frame. The loaded frame's working copy follows.
    pub fn write_frame(&mut self, frame: u32, regions: Vec<Region>) -> Result<()> {
        let regions = normalize(frame, regions)?;
        self.persistence.write_frame(frame, &regions)?;
        if self.frame == Some(frame) {
            self.regions = regions;
            self.dirty = false;
        }
        Ok(())
    }

    /// Copy every stored frame into `dst`, saving the working copy first.
    pub fn snapshot_into<Q: RegionPersistence>(&mut self, dst: &mut Q) -> Result<Vec<u32>> {
        if self.dirty {
            self.save()?;
        }
        let frames = self.persistence.frames()?;
        for &frame in &frames {
            dst.write_frame(frame, &self.persistence.read_frame(frame)?)?;
        }
        Ok(frames)
    }
}

fn normalize(frame: u32, regions: Vec<Region>) -> Result<Vec<Region>> {
    let regions: Vec<Region> = regions
        .into_iter()
        .map(|mut r| {
            r.name.frame = frame;
            r
        })
        .collect();
    for r in &regions {
        r.shape.ensure_area(&r.name.to_string())?;
    }
    check_unique_names(frame, &regions)?;
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{name, names_of, rect_region};

    fn store_with_two_frames() -> RegionStore<MemPersistence> {
        let mut mem = MemPersistence::new();
        mem.write_frame(1, &[rect_region("00t001", 0, 0, 4, 4)]).unwrap();
        mem.write_frame(2, &[rect_region("00t002", 0, 0, 5, 5)]).unwrap();
        RegionStore::new(mem)
    }

    #[test]
    fn load_refuses_to_drop_unsaved_edits() {
        let mut store = store_with_two_frames();
        store.load(1).unwrap();
        store.add(rect_region("01t001", 10, 10, 12, 12)).unwrap();

        let err = store.load(2).unwrap_err();
        assert!(matches!(err, Error::UnsavedEdits { frame: 1, requested: 2 }));

        store.save().unwrap();
        store.load(2).unwrap();
        store.load(1).unwrap();
        assert_eq!(names_of(store.regions()), vec!["00t001", "01t001"]);
    }

    #[test]
    fn discard_restores_saved_state() {
        let mut store = store_with_two_frames();
        store.load(1).unwrap();
        store.remove(&name("00t001")).unwrap();
        assert!(store.regions().is_empty());
        store.discard().unwrap();
        assert_eq!(names_of(store.regions()), vec!["00t001"]);
        assert!(!store.is_dirty());
    }

    #[test]
    fn replace_enforces_invariants() {
        let mut store = store_with_two_frames();
        assert!(matches!(
            store.replace(Vec::new()),
            Err(Error::NoFrameLoaded)
        ));
        store.load(2).unwrap();

        let dup = vec![rect_region("03t002", 0, 0, 2, 2), rect_region("03t002", 4, 4, 6, 6)];
        assert!(matches!(store.replace(dup), Err(Error::DuplicateName { .. })));

        let flat = vec![rect_region("03t002", 0, 0, 0, 2)];
        assert!(matches!(store.replace(flat), Err(Error::DegenerateShape(_))));

        // Names follow the loaded frame.
        store.replace(vec![rect_region("03t009", 0, 0, 2, 2)]).unwrap();
        assert_eq!(names_of(store.regions()), vec!["03t002"]);
    }

    #[test]
    fn write_frame_updates_loaded_copy() {
        let mut store = store_with_two_frames();
        store.load(2).unwrap();
        store
            .write_frame(2, vec![rect_region("p00t002", 0, 0, 5, 5)])
            .unwrap();
        assert_eq!(names_of(store.regions()), vec!["p00t002"]);
        assert_eq!(names_of(&store.read_frame(1).unwrap()), vec!["00t001"]);
    }

    #[test]
    fn json_dir_round_trips_and_lists_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut json = JsonDirPersistence::open(dir.path().join("rois")).unwrap();
        json.write_frame(12, &[rect_region("p04t012d", 1, 2, 3, 4)]).unwrap();
        json.write_frame(3, &[]).unwrap();

        assert_eq!(json.frames().unwrap(), vec![3, 12]);
        assert!(json.frame_path(12).ends_with("ROI_T=012.json"));

        let back = json.read_frame(12).unwrap();
        assert_eq!(names_of(&back), vec!["p04t012d"]);
        assert_eq!(back[0].shape.pixel_area(), 4);
        assert!(json.read_frame(99).unwrap().is_empty());
    }

    #[test]
    fn snapshot_copies_every_frame() {
        let mut store = store_with_two_frames();
        store.load(1).unwrap();
        store.add(rect_region("01t001", 10, 10, 12, 12)).unwrap();

        let mut snap = MemPersistence::new();
        assert_eq!(store.snapshot_into(&mut snap).unwrap(), vec![1, 2]);
        assert_eq!(names_of(&snap.read_frame(1).unwrap()), vec!["00t001", "01t001"]);
        assert!(!store.is_dirty());
    }
}
