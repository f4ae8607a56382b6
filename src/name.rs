//! Lineage names.
//!
//! A region's name identifies its lineage and frame. In memory it is a
//! structured record; on disk it keeps the legacy string form
//! `[p]<root>t<frame:03>[d]`, e.g. `p03t012d`:
//!
//! * `root` is the persistent lineage token, numeric roots are zero-padded to two digits,
//! * `p` prefix marks a flagged (problematic) lineage,
//! * `d` suffix marks a double-layer colony from that frame on.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ROOT_DIGITS: usize = 2;
pub const FRAME_DIGITS: usize = 3;

const FLAG_TAG: char = 'p';
const DOUBLE_LAYER_TAG: char = 'd';
const FRAME_SEP: char = 't';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineageName {
    pub root: String,
    pub frame: u32,
    pub flagged: bool,
    pub double_layer: bool,
}

impl LineageName {
    pub fn new(root: impl Into<String>, frame: u32) -> Self {
        Self {
            root: root.into(),
            frame,
            flagged: false,
            double_layer: false,
        }
    }

    /// Numeric root, zero-padded: `numbered(3, 12)` is `03t012`.
    pub fn numbered(index: usize, frame: u32) -> Self {
        Self::new(format!("{index:0width$}", width = ROOT_DIGITS), frame)
    }

    /// Same lineage and tags, moved to another frame.
    pub fn at_frame(&self, frame: u32) -> Self {
        Self {
            frame,
            ..self.clone()
        }
    }

    pub fn root_number(&self) -> Option<u64> {
        self.root.parse().ok()
    }
}

impl fmt::Display for LineageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flagged {
            write!(f, "{}", FLAG_TAG)?;
        }
        write!(
            f,
            "{}{}{:0width$}",
            self.root,
            FRAME_SEP,
            self.frame,
            width = FRAME_DIGITS
        )?;
        if self.double_layer {
            write!(f, "{}", DOUBLE_LAYER_TAG)?;
        }
        Ok(())
    }
}

impl FromStr for LineageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || Error::InvalidName(s.to_string());

        let mut rest = s;
        let mut flagged = false;
        let mut double_layer = false;

        // Leading tags in either order.
        loop {
            if let Some(r) = rest.strip_prefix(FLAG_TAG) {
                flagged = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix(DOUBLE_LAYER_TAG) {
                double_layer = true;
                rest = r;
            } else {
                break;
            }
        }

        if let Some(r) = rest.strip_suffix(DOUBLE_LAYER_TAG) {
            double_layer = true;
            rest = r;
        }

        let (root, frame) = rest.split_once(FRAME_SEP).ok_or_else(bad)?;
        if root.is_empty() || !root.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(bad());
        }
        if frame.is_empty() || !frame.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        let frame: u32 = frame.parse().map_err(|_| bad())?;

        Ok(Self {
            root: root.to_string(),
            frame,
            flagged,
            double_layer,
        })
    }
}

impl TryFrom<String> for LineageName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LineageName> for String {
    fn from(name: LineageName) -> Self {
        name.to_string()
    }
}
