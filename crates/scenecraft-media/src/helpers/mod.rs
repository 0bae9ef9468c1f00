// crates/scenecraft-media/src/helpers/mod.rs
//
// Internal helper modules for scenecraft-media. Not re-exported from lib.rs —
// these are decode/render implementation details, not part of the public API.

pub mod seek;
pub mod yuv;
