//! Interactive correction session.
//!
//! A `Session` owns the region store and the frame cursor. Every user action is
//! a `Command`; `dispatch` applies it and hands the session back, so a UI layer
//! only needs to translate its events into commands. Changing frames always
//! persists the frame being left before the new one is loaded.

use crate::desc::TrackConfig;
use crate::edit::{self, Measurement, Outcome};
use crate::mpoly::MPoly;
use crate::name::LineageName;
use crate::store::{JsonDirPersistence, RegionPersistence, RegionStore};
use crate::tracker::{track_store, MatchReport};
use crate::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum Command {
    GoTo(u32),
    /// Cut along a drawn divider, or along the divider kept from the last split.
    Split(Option<MPoly>),
    Extend(MPoly),
    Subtract {
        target: Option<LineageName>,
        cutter: Option<LineageName>,
    },
    Merge(Vec<LineageName>),
    Clone(Option<LineageName>),
    Tag(Option<LineageName>),
    DoubleLayer(Option<LineageName>),
    /// Re-track every frame from the first.
    Track,
    Save,
    /// Save, then copy every frame into a JSON directory.
    Snapshot(PathBuf),
    Measure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Edit(Outcome),
    MovedTo(u32),
    Tracked(Vec<MatchReport>),
    Saved(u32),
    Snapshot { dir: PathBuf, frames: Vec<u32> },
    Measured(Vec<Measurement>),
}

#[derive(Debug)]
pub struct Session<P: RegionPersistence> {
    store: RegionStore<P>,
    current_frame: u32,
    last_frame: u32,
    selection: Option<MPoly>,
    config: TrackConfig,
}

impl<P: RegionPersistence> Session<P> {
    /// Open at frame 1. Frames run `1..=last_frame`.
    pub fn open(mut store: RegionStore<P>, last_frame: u32, config: TrackConfig) -> Result<Self> {
        if last_frame == 0 {
            return Err(Error::FrameOutOfRange(0));
        }
        store.load(1)?;
        Ok(Self {
            store,
            current_frame: 1,
            last_frame,
            selection: None,
            config,
        })
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn last_frame(&self) -> u32 {
        self.last_frame
    }

    /// Divider kept from the last split, carried into the following frame.
    pub fn selection(&self) -> Option<&MPoly> {
        self.selection.as_ref()
    }

    pub fn store(&self) -> &RegionStore<P> {
        &self.store
    }

    pub fn into_store(self) -> RegionStore<P> {
        self.store
    }

    /// Save the current frame, then load `frame`.
    pub fn go_to(&mut self, frame: u32) -> Result<()> {
        if frame == 0 || frame > self.last_frame {
            return Err(Error::FrameOutOfRange(frame));
        }
        if frame == self.current_frame {
            return Ok(());
        }
        if self.store.is_dirty() {
            self.store.save()?;
        }
        self.store.load(frame)?;
        debug!(from = self.current_frame, to = frame, "changed frame");
        self.current_frame = frame;
        Ok(())
    }

    /// Move one frame on when there is one.
    fn advance(&mut self) -> Result<bool> {
        if self.current_frame >= self.last_frame {
            return Ok(false);
        }
        self.go_to(self.current_frame + 1)?;
        Ok(true)
    }

    pub fn apply(&mut self, cmd: Command) -> Result<Reply> {
        let frame = self.current_frame;
        let nothing = |what: &str| Ok(Reply::Edit(Outcome::NoMatch(format!("nothing selected to {what}"))));

        match cmd {
            Command::GoTo(f) => {
                self.go_to(f)?;
                Ok(Reply::MovedTo(f))
            }
            Command::Split(divider) => {
                // A freshly drawn divider replaces the retained one.
                let retained = self.selection.take();
                let Some(divider) = divider.or(retained) else {
                    return nothing("split");
                };
                let out = edit::split(&mut self.store, &divider)?;
                if !out.is_no_match() && self.advance()? {
                    self.selection = Some(divider);
                }
                Ok(Reply::Edit(out))
            }
            Command::Extend(addition) => {
                self.selection = None;
                Ok(Reply::Edit(edit::extend(&mut self.store, &addition)?))
            }
            Command::Subtract { target, cutter } => {
                let Some(cutter) = cutter else {
                    return nothing("subtract");
                };
                Ok(Reply::Edit(edit::subtract(&mut self.store, target.as_ref(), &cutter)?))
            }
            Command::Merge(names) => Ok(Reply::Edit(edit::merge(&mut self.store, &names)?)),
            Command::Clone(name) => {
                let Some(name) = name else {
                    return nothing("clone");
                };
                if frame >= self.last_frame {
                    return Err(Error::FrameOutOfRange(frame + 1));
                }
                let out = edit::clone_forward(&mut self.store, &name)?;
                if !out.is_no_match() {
                    self.advance()?;
                }
                Ok(Reply::Edit(out))
            }
            Command::Tag(name) => {
                let Some(name) = name else {
                    return nothing("tag");
                };
                Ok(Reply::Edit(edit::tag(&mut self.store, &name)?))
            }
            Command::DoubleLayer(name) => {
                let Some(name) = name else {
                    return nothing("mark");
                };
                Ok(Reply::Edit(edit::toggle_double_layer(&mut self.store, &name)?))
            }
            Command::Track => {
                let reports = track_store(&mut self.store, &self.config)?;
                self.store.load(frame)?;
                Ok(Reply::Tracked(reports))
            }
            Command::Save => {
                self.store.save()?;
                Ok(Reply::Saved(frame))
            }
            Command::Snapshot(dir) => {
                let mut dst = JsonDirPersistence::open(&dir)?;
                let frames = self.store.snapshot_into(&mut dst)?;
                info!(dir = %dir.display(), n_frames = frames.len(), "wrote snapshot");
                Ok(Reply::Snapshot { dir, frames })
            }
            Command::Measure => Ok(Reply::Measured(edit::measure(&self.store)?)),
        }
    }
}

/// Apply `cmd` to `session` and hand the session back with the result.
pub fn dispatch<P: RegionPersistence>(mut session: Session<P>, cmd: Command) -> (Session<P>, Result<Reply>) {
    let reply = session.apply(cmd);
    (session, reply)
}
