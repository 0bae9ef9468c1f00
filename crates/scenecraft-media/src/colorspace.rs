// crates/scenecraft-media/src/colorspace.rs
//
// Applies scenecraft_core::colorspace's decision to a real decoded/scaled
// VideoFrame. Every frame this engine produces — decoded, Ken-Burns panned,
// transition-blended, or subtitle-burned — passes through `stamp`.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::util::color::{Primaries, Range, Space, TransferCharacteristic};
use ffmpeg::util::frame::video::Video as VideoFrame;

use scenecraft_core::colorspace::{profile_for_height, ColorProfile};

/// Stamp `frame` with limited range, 1:1 SAR, and the primaries/matrix/transfer
/// appropriate for an output of `height` pixels tall.
pub fn stamp(frame: &mut VideoFrame, height: u32) {
    let (primaries, trc, space) = match profile_for_height(height) {
        ColorProfile::Bt709 => (Primaries::BT709, TransferCharacteristic::BT709, Space::BT709),
        ColorProfile::Smpte170m => (
            Primaries::SMPTE170M,
            TransferCharacteristic::SMPTE170M,
            Space::SMPTE170M,
        ),
    };

    unsafe {
        let ptr = frame.as_mut_ptr();
        (*ptr).color_range = Range::MPEG.into();
        (*ptr).color_primaries = primaries.into();
        (*ptr).color_trc = trc.into();
        (*ptr).colorspace = space.into();
        (*ptr).sample_aspect_ratio = ffmpeg::ffi::AVRational { num: 1, den: 1 };
    }
}
