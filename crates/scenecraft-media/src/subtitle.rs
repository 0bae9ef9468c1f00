// crates/scenecraft-media/src/subtitle.rs
//
// Subtitle burner: rasterize a scene's caption text directly onto its
// YUV420P planes as a translucent box plus glyph coverage.
//
// Rather than building a `drawtext=text='...':fontfile=...:box=1:
// boxcolor=...` libavfilter string per frame, this manipulates YUV planes
// by hand, the same way Ken-Burns and transitions do (see effects.rs), so
// subtitles follow the same direct-pixel-math approach instead of
// constructing and running a filtergraph just for text.
//
// `escape_for_filter` is kept only for diagnostic/API parity with
// filtergraph-string escaping rules; it is never applied to the text
// actually rasterized here, since there is no filtergraph string for it
// to protect.

use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};

use ffmpeg_the_third::util::frame::video::Video as VideoFrame;

use scenecraft_core::colorspace::{profile_for_height, ColorProfile};
use scenecraft_core::project::Subtitle;

/// BT.601/BT.709 full-to-limited-range RGB -> YUV conversion, selected by the
/// same height threshold `scenecraft_media::colorspace::stamp` uses, so a
/// subtitle box always matches the coefficients its own frame was stamped
/// with.
fn rgb_to_yuv(r: u8, g: u8, b: u8, profile: ColorProfile) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let (kr, kb) = match profile {
        ColorProfile::Bt709 => (0.2126, 0.0722),
        ColorProfile::Smpte170m => (0.299, 0.114),
    };
    let kg = 1.0 - kr - kb;

    let y = kr * r + kg * g + kb * b;
    let cb = (b - y) / (2.0 * (1.0 - kb));
    let cr = (r - y) / (2.0 * (1.0 - kr));

    let y_limited = 16.0 + y * (235.0 - 16.0) / 255.0;
    let u_limited = 128.0 + cb * (240.0 - 128.0) / 128.0;
    let v_limited = 128.0 + cr * (240.0 - 128.0) / 128.0;

    (
        y_limited.round().clamp(16.0, 235.0) as u8,
        u_limited.round().clamp(16.0, 240.0) as u8,
        v_limited.round().clamp(16.0, 240.0) as u8,
    )
}

/// Parse a color spec: a small set of named colors, `#RRGGBB`, or either with
/// an `@alpha` suffix in `[0.0, 1.0]`. Unrecognized input falls back to
/// opaque black rather than failing the whole render over a typo'd color.
pub fn parse_color(spec: &str) -> (u8, u8, u8, f32) {
    let (name_part, alpha) = match spec.split_once('@') {
        Some((n, a)) => (n, a.parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0)),
        None => (spec, 1.0),
    };

    if let Some(hex) = name_part.strip_prefix('#') {
        if hex.len() == 6 {
            if let (Ok(r), Ok(g), Ok(b)) = (
                u8::from_str_radix(&hex[0..2], 16),
                u8::from_str_radix(&hex[2..4], 16),
                u8::from_str_radix(&hex[4..6], 16),
            ) {
                return (r, g, b, alpha);
            }
        }
        return (0, 0, 0, alpha);
    }

    let rgb = match name_part.to_ascii_lowercase().as_str() {
        "white" => (255, 255, 255),
        "black" => (0, 0, 0),
        "red" => (255, 0, 0),
        "green" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" => (0, 255, 255),
        "magenta" => (255, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        _ => (0, 0, 0),
    };
    (rgb.0, rgb.1, rgb.2, alpha)
}

/// Escape `:`, `\`, and `'` the way a `drawtext` filter string would need
/// them escaped. Kept for API/diagnostic parity (see module doc) — not
/// applied to the text this module actually rasterizes.
pub fn escape_for_filter(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '\\' || ch == ':' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Burns caption text onto scene frames. Holds one loaded font for the whole
/// render; if no font is configured (or the configured file fails to load),
/// every `burn` call is a pass-through — a missing caption font should not
/// fail an otherwise-valid render.
pub struct SubtitleBurner {
    font: Option<Font>,
    font_path: Option<PathBuf>,
}

impl SubtitleBurner {
    pub fn open(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|p| match std::fs::read(p) {
            Ok(bytes) => match Font::from_bytes(bytes, FontSettings::default()) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "subtitle font failed to parse, captions disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "subtitle font file unreadable, captions disabled");
                None
            }
        });
        SubtitleBurner {
            font,
            font_path: font_path.map(PathBuf::from),
        }
    }

    pub fn is_active(&self) -> bool {
        self.font.is_some()
    }

    pub fn font_path(&self) -> Option<&Path> {
        self.font_path.as_deref()
    }

    /// Draw `subtitle`'s text, box, and margin onto `frame` in place. No-op
    /// if no font is loaded or the text is empty.
    pub fn burn(&self, frame: &mut VideoFrame, subtitle: &Subtitle, width: u32, height: u32) {
        let Some(font) = &self.font else { return };
        if subtitle.text.trim().is_empty() {
            return;
        }

        let profile = profile_for_height(height);
        let (fg_r, fg_g, fg_b, _fg_a) = parse_color(&subtitle.font_color);
        let (bg_r, bg_g, bg_b, bg_a) = parse_color(&subtitle.bg_color);
        let (fg_y, fg_u, fg_v) = rgb_to_yuv(fg_r, fg_g, fg_b, profile);
        let (bg_y, bg_u, bg_v) = rgb_to_yuv(bg_r, bg_g, bg_b, profile);

        let px = subtitle.font_size.max(1) as f32;

        // Lay out glyphs on a single line, centered horizontally.
        let mut glyphs: Vec<(fontdue::Metrics, Vec<u8>, f32)> = Vec::with_capacity(subtitle.text.chars().count());
        let mut total_advance = 0.0f32;
        for ch in subtitle.text.chars() {
            let (metrics, coverage) = font.rasterize(ch, px);
            total_advance += metrics.advance_width;
            glyphs.push((metrics, coverage, total_advance - metrics.advance_width));
        }

        let baseline_y = height.saturating_sub(subtitle.margin_bottom) as i32;
        let start_x = ((width as f32 - total_advance) / 2.0).max(0.0) as i32;

        let pad = (px * 0.25).max(4.0) as i32;
        let box_left = (start_x - pad).max(0);
        let box_right = ((start_x as f32 + total_advance) as i32 + pad).min(width as i32 - 1);
        let box_top = (baseline_y - px as i32 - pad).max(0);
        let box_bottom = (baseline_y + pad).min(height as i32 - 1);

        if bg_a > 0.0 {
            paint_box(frame, width, height, box_left, box_top, box_right, box_bottom, bg_y, bg_u, bg_v, bg_a);
        }

        for (metrics, coverage, x_offset) in &glyphs {
            let gx0 = start_x + x_offset.round() as i32 + metrics.xmin;
            let gy0 = baseline_y - metrics.height as i32 - metrics.ymin;
            paint_glyph(frame, width, height, gx0, gy0, metrics.width, metrics.height, coverage, fg_y, fg_u, fg_v);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn paint_box(
    frame: &mut VideoFrame,
    width: u32,
    height: u32,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    y: u8,
    u: u8,
    v: u8,
    alpha: f32,
) {
    blend_rect(frame, 0, width as i32, height as i32, left, top, right, bottom, y, alpha);
    let (uw, uh) = ((width as i32 + 1) / 2, (height as i32 + 1) / 2);
    blend_rect(frame, 1, uw, uh, left / 2, top / 2, right / 2, bottom / 2, u, alpha);
    blend_rect(frame, 2, uw, uh, left / 2, top / 2, right / 2, bottom / 2, v, alpha);
}

#[allow(clippy::too_many_arguments)]
fn blend_rect(
    frame: &mut VideoFrame,
    plane: usize,
    plane_w: i32,
    plane_h: i32,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    value: u8,
    alpha: f32,
) {
    let stride = frame.stride(plane);
    let data = frame.data_mut(plane);
    for row in top.max(0)..=bottom.min(plane_h - 1) {
        for col in left.max(0)..=right.min(plane_w - 1) {
            let idx = row as usize * stride + col as usize;
            let existing = data[idx] as f32;
            data[idx] = (existing * (1.0 - alpha) + value as f32 * alpha).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn paint_glyph(
    frame: &mut VideoFrame,
    width: u32,
    height: u32,
    gx0: i32,
    gy0: i32,
    gw: usize,
    gh: usize,
    coverage: &[u8],
    y: u8,
    u: u8,
    v: u8,
) {
    let y_stride = frame.stride(0);
    let y_data = frame.data_mut(0);
    for row in 0..gh {
        let py = gy0 + row as i32;
        if py < 0 || py >= height as i32 {
            continue;
        }
        for col in 0..gw {
            let px = gx0 + col as i32;
            if px < 0 || px >= width as i32 {
                continue;
            }
            let cov = coverage[row * gw + col] as f32 / 255.0;
            if cov <= 0.0 {
                continue;
            }
            let idx = py as usize * y_stride + px as usize;
            let existing = y_data[idx] as f32;
            y_data[idx] = (existing * (1.0 - cov) + y as f32 * cov).round().clamp(0.0, 255.0) as u8;
        }
    }

    let (uw, uh) = ((width as i32 + 1) / 2, (height as i32 + 1) / 2);
    let u_stride = frame.stride(1);
    let v_stride = frame.stride(2);
    for row in 0..gh {
        let py = (gy0 + row as i32) / 2;
        if py < 0 || py >= uh {
            continue;
        }
        for col in 0..gw {
            let px = (gx0 + col as i32) / 2;
            if px < 0 || px >= uw {
                continue;
            }
            let cov = coverage[row * gw + col] as f32 / 255.0;
            if cov <= 0.0 {
                continue;
            }
            let u_idx = py as usize * u_stride + px as usize;
            let v_idx = py as usize * v_stride + px as usize;
            let u_data = frame.data_mut(1);
            let existing_u = u_data[u_idx] as f32;
            u_data[u_idx] = (existing_u * (1.0 - cov) + u as f32 * cov).round().clamp(0.0, 255.0) as u8;
            let v_data = frame.data_mut(2);
            let existing_v = v_data[v_idx] as f32;
            v_data[v_idx] = (existing_v * (1.0 - cov) + v as f32 * cov).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_font_is_inactive() {
        let burner = SubtitleBurner::open(None);
        assert!(!burner.is_active());
    }

    #[test]
    fn missing_font_file_is_inactive() {
        let burner = SubtitleBurner::open(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!burner.is_active());
    }

    #[test]
    fn parse_named_color() {
        assert_eq!(parse_color("white"), (255, 255, 255, 1.0));
        assert_eq!(parse_color("black@0.5"), (0, 0, 0, 0.5));
    }

    #[test]
    fn parse_hex_color() {
        assert_eq!(parse_color("#ff0000"), (255, 0, 0, 1.0));
    }

    #[test]
    fn escape_matches_original_drawtext_rules() {
        assert_eq!(escape_for_filter("a:b"), "a\\:b");
        assert_eq!(escape_for_filter("it's"), "it\\'s");
        assert_eq!(escape_for_filter("a\\b"), "a\\\\b");
    }
}
