use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("degenerate shape: {0} has zero area")]
    DegenerateShape(String),

    #[error("invalid region name {0:?}")]
    InvalidName(String),

    #[error("duplicate region name {name} in frame {frame}")]
    DuplicateName { name: String, frame: u32 },

    #[error("frame {frame} has unsaved edits; save or discard before loading frame {requested}")]
    UnsavedEdits { frame: u32, requested: u32 },

    #[error("no frame is loaded")]
    NoFrameLoaded,

    #[error("frame {0} is out of range")]
    FrameOutOfRange(u32),

    #[error("frame {0} has no regions")]
    EmptyFrame(u32),

    #[error("missing {kind} image for frame {frame}")]
    MissingImage { kind: &'static str, frame: u32 },

    #[error("image size mismatch at frame {frame}: {a:?} vs {b:?}")]
    ImageSizeMismatch {
        frame: u32,
        a: (usize, usize),
        b: (usize, usize),
    },

    /// A cross-frame rewrite stopped part way. `updated` lists the frames
    /// already persisted with the new names.
    #[error("updated frames {updated:?} before failing at frame {failed}: {source}")]
    PartialUpdate {
        updated: Vec<u32>,
        failed: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("cell {id}: {msg}")]
    InvalidRecord { id: u32, msg: String },

    #[error(transparent)]
    Clipper(#[from] clipper2::ClipperError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[cfg(feature = "im-io")]
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
