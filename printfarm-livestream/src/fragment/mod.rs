//! Fragmented MP4 splitting and the per-device fragment ring

mod mp4;
mod store;

pub use mp4::{Mp4Fragmenter, Mp4Output};
pub use store::{Fragment, FragmentStore};
