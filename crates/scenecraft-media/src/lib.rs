// crates/scenecraft-media/src/lib.rs

pub mod audio;
pub mod colorspace;
pub mod effects;
pub mod image;
pub mod probe;
pub mod render;
pub mod subtitle;
pub mod video;
mod helpers; // internal — not pub, not re-exported
mod worker; // internal — not pub, not re-exported

pub use probe::FfmpegProbe;
pub use render::{
    render_from_json_file, render_from_json_file_with_options, render_from_json_string,
    render_from_json_string_with_options, RenderOptions,
};
