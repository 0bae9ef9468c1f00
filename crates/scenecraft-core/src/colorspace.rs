//! Color-space stamping policy: every produced frame — decoded, scaled,
//! Ken-Burns-filtered, transition-blended, or subtitle-burned — is stamped
//! with limited range, 1:1 SAR, and either BT.709 or BT.601/SMPTE170M
//! depending on output height. This module only decides *which* colorspace;
//! applying the decision to a real frame is `scenecraft_media`'s job (it
//! owns the FFmpeg dependency).

/// The two colorspace profiles this engine ever stamps onto output frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorProfile {
    /// Rec. 709 primaries/matrix/transfer — used for HD and above.
    Bt709,
    /// SMPTE 170M (Rec. 601) primaries/matrix/transfer — used below HD.
    Smpte170m,
}

/// HD threshold: outputs at or above this height are stamped BT.709, below
/// it SMPTE170M/BT.601.
pub const HD_HEIGHT_THRESHOLD: u32 = 720;

/// Decide the color profile for an output of the given height.
pub fn profile_for_height(height: u32) -> ColorProfile {
    if height >= HD_HEIGHT_THRESHOLD {
        ColorProfile::Bt709
    } else {
        ColorProfile::Smpte170m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hd_and_above_is_bt709() {
        assert_eq!(profile_for_height(720), ColorProfile::Bt709);
        assert_eq!(profile_for_height(1080), ColorProfile::Bt709);
    }

    #[test]
    fn below_hd_is_smpte170m() {
        assert_eq!(profile_for_height(480), ColorProfile::Smpte170m);
        assert_eq!(profile_for_height(719), ColorProfile::Smpte170m);
    }
}
