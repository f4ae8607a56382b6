pub mod core;
#[allow(unused_imports)]
pub use core::{Im, LabelIm};

pub mod roi;
#[allow(unused_imports)]
pub use roi::ROI;

pub mod label;
#[allow(unused_imports)]
pub use label::{label_im, LabelInfo};

// Optional extras
// -----------------------------------------------------------------------------

#[cfg(feature = "im-io")]
pub mod io;
