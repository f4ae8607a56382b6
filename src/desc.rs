use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Knobs for turning masks into regions and matching them across frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Mask components smaller than this many pixels are not regions.
    pub min_region_px: usize,

    /// A matched pair whose `ratio` falls below this keeps the previous frame's
    /// geometry. `ratio` is never negative, so the default of 0 never triggers.
    pub keep_previous_below_ratio: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            min_region_px: 10,
            keep_previous_below_ratio: 0.0,
        }
    }
}

/// Job file for `roitrack track`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackDesc {
    #[serde(default = "default_first_frame")]
    pub first_frame: u32,
    #[serde(default)]
    pub tracking: TrackConfig,
}

impl Default for TrackDesc {
    fn default() -> Self {
        Self {
            first_frame: default_first_frame(),
            tracking: TrackConfig::default(),
        }
    }
}

fn default_first_frame() -> u32 {
    1
}

/// Job file for `roitrack validate`. Relative paths are relative to the job file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidateDesc {
    /// JSON array of cell records.
    pub cells: PathBuf,
    /// Segmentation label images, cell `id` is drawn as `id + 1`.
    pub seg_dir: PathBuf,
    /// Manually tracked label images.
    pub trk_dir: PathBuf,
    /// Ground-truth `divisions.csv`.
    pub divisions: PathBuf,
    pub out_dir: PathBuf,
}

impl ValidateDesc {
    pub fn resolved_against(mut self, base: &Path) -> Self {
        for p in [
            &mut self.cells,
            &mut self.seg_dir,
            &mut self.trk_dir,
            &mut self.divisions,
            &mut self.out_dir,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        self
    }
}

pub fn parse_track_json(json_text: &str) -> Result<TrackDesc, serde_json::Error> {
    serde_json::from_str(json_text)
}

pub fn parse_validate_json(json_text: &str) -> Result<ValidateDesc, serde_json::Error> {
    serde_json::from_str(json_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_desc_fills_defaults() {
        let desc = parse_track_json("{}").expect("empty object should deserialize");
        assert_eq!(desc, TrackDesc::default());
        assert_eq!(desc.tracking.min_region_px, 10);
        assert_eq!(desc.first_frame, 1);

        let desc = parse_track_json(r#"{ "tracking": { "min_region_px": 3 } }"#).unwrap();
        assert_eq!(desc.tracking.min_region_px, 3);
        assert_eq!(desc.tracking.keep_previous_below_ratio, 0.0);
    }

    #[test]
    fn track_desc_rejects_bad_types() {
        assert!(parse_track_json(r#"{ "first_frame": "one" }"#).is_err());
    }

    #[test]
    fn validate_desc_resolves_relative_paths() {
        let sample = r#"
        {
            "cells": "cells.json",
            "seg_dir": "seg",
            "trk_dir": "/data/trk",
            "divisions": "divisions.csv",
            "out_dir": "out"
        }
        "#;
        let desc = parse_validate_json(sample)
            .expect("sample json should deserialize")
            .resolved_against(Path::new("/jobs/a"));
        assert_eq!(desc.cells, PathBuf::from("/jobs/a/cells.json"));
        assert_eq!(desc.seg_dir, PathBuf::from("/jobs/a/seg"));
        assert_eq!(desc.trk_dir, PathBuf::from("/data/trk"));
        assert_eq!(desc.out_dir, PathBuf::from("/jobs/a/out"));
    }

    #[test]
    fn validate_desc_requires_every_path() {
        assert!(parse_validate_json(r#"{ "cells": "c.json" }"#).is_err());
    }
}
