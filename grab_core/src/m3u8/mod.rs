pub mod parse;
pub mod playlist;

pub use parse::parse;
pub use playlist::{select_best_variant, select_by_resolution, Playlist, Segment, Variant};
