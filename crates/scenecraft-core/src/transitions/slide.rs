// Horizontal slide: `from` slides off to the left, `to` slides in from the
// right, at linear progress `t` (no easing).
//
// Screen column `x` samples `from[x + round(W·t)]` if that index is still in
// bounds, else `to[x - (W - round(W·t))]` if *that* is in bounds, else black
// (0 for Y, 128 for U/V — the fill only fires on the rounding-induced single
// boundary column, if any; both branches are in-bounds for every other
// column by construction).

use crate::transitions::helpers::split_planes;
use crate::transitions::{TransitionKind, VideoTransition};

pub struct Slide;

const BLACK_Y: u8 = 0;
const NEUTRAL_UV: u8 = 128;

impl VideoTransition for Slide {
    fn kind(&self) -> TransitionKind {
        TransitionKind::Slide
    }

    fn label(&self) -> &'static str {
        "Slide"
    }

    fn apply(&self, frame_a: &[u8], frame_b: &[u8], width: u32, height: u32, t: f32) -> Vec<u8> {
        debug_assert_eq!(
            frame_a.len(),
            frame_b.len(),
            "Slide::apply — frame size mismatch: {} vs {}",
            frame_a.len(),
            frame_b.len(),
        );

        let t = t.clamp(0.0, 1.0);
        let (ay, au, av) = split_planes(frame_a, width, height);
        let (by, bu, bv) = split_planes(frame_b, width, height);

        let mut out = Vec::with_capacity(frame_a.len());
        slide_plane(ay, by, width, height, t, BLACK_Y, &mut out);

        let uw = width / 2;
        let uh = height / 2;
        slide_plane(au, bu, uw, uh, t, NEUTRAL_UV, &mut out);
        slide_plane(av, bv, uw, uh, t, NEUTRAL_UV, &mut out);

        out
    }
}

fn slide_plane(from: &[u8], to: &[u8], w: u32, h: u32, t: f32, fill: u8, out: &mut Vec<u8>) {
    let shift = (w as f32 * t).round() as i64;
    for py in 0..h {
        for px in 0..w {
            let px = px as i64;
            let w = w as i64;
            let val = if px + shift < w {
                from[(py as i64 * w + px + shift) as usize]
            } else {
                let to_x = px - (w - shift);
                if to_x >= 0 && to_x < w {
                    to[(py as i64 * w + to_x) as usize]
                } else {
                    fill
                }
            };
            out.push(val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transitions::helpers::{uv_len, y_len};

    fn gradient_frame(w: u32, h: u32, offset: u8) -> Vec<u8> {
        let yl = y_len(w, h);
        let cl = uv_len(w, h);
        let mut buf = Vec::with_capacity(yl + cl * 2);
        for _py in 0..h {
            for px in 0..w {
                buf.push(px as u8 + offset);
            }
        }
        buf.extend(vec![128u8; cl * 2]);
        buf
    }

    #[test]
    fn t_zero_returns_frame_a() {
        let s = Slide;
        let (w, h) = (8_u32, 4_u32);
        let a = gradient_frame(w, h, 0);
        let b = gradient_frame(w, h, 100);
        let out = s.apply(&a, &b, w, h, 0.0);
        assert_eq!(&out[..y_len(w, h)], &a[..y_len(w, h)]);
    }

    #[test]
    fn t_one_returns_frame_b() {
        let s = Slide;
        let (w, h) = (8_u32, 4_u32);
        let a = gradient_frame(w, h, 0);
        let b = gradient_frame(w, h, 100);
        let out = s.apply(&a, &b, w, h, 1.0);
        assert_eq!(&out[..y_len(w, h)], &b[..y_len(w, h)]);
    }

    #[test]
    fn midpoint_sources_correct_columns() {
        let s = Slide;
        let (w, h) = (8_u32, 2_u32);
        let a = gradient_frame(w, h, 0); // col x -> x
        let b = gradient_frame(w, h, 100); // col x -> x+100
        let out = s.apply(&a, &b, w, h, 0.5);
        // shift = round(8*0.5) = 4
        // col 0..3: from[x+4] -> 4,5,6,7
        assert_eq!(out[0], 4);
        assert_eq!(out[3], 7);
        // col 4..7: to[x-4] -> 100,101,102,103
        assert_eq!(out[4], 100);
        assert_eq!(out[7], 103);
    }

    #[test]
    fn output_length_matches_input() {
        let s = Slide;
        let (w, h) = (8_u32, 4_u32);
        let a = gradient_frame(w, h, 0);
        let b = gradient_frame(w, h, 50);
        for t in [0.0_f32, 0.25, 0.5, 0.75, 1.0] {
            let out = s.apply(&a, &b, w, h, t);
            assert_eq!(out.len(), a.len(), "length mismatch at t={t}");
        }
    }
}
