// Left-to-right horizontal wipe, hard edge (no feather, no easing).
//
// At progress `t`, columns `[0, round(W·t))` come from `to` (frame_b);
// columns `[round(W·t), W)` come from `from` (frame_a). Chroma planes use
// the same rule at half the column count.

use crate::transitions::helpers::split_planes;
use crate::transitions::{TransitionKind, VideoTransition};

pub struct Wipe;

impl VideoTransition for Wipe {
    fn kind(&self) -> TransitionKind {
        TransitionKind::Wipe
    }

    fn label(&self) -> &'static str {
        "Wipe"
    }

    fn apply(&self, frame_a: &[u8], frame_b: &[u8], width: u32, height: u32, t: f32) -> Vec<u8> {
        debug_assert_eq!(
            frame_a.len(),
            frame_b.len(),
            "Wipe::apply — frame size mismatch: {} vs {}",
            frame_a.len(),
            frame_b.len(),
        );

        let t = t.clamp(0.0, 1.0);
        let (ay, au, av) = split_planes(frame_a, width, height);
        let (by, bu, bv) = split_planes(frame_b, width, height);

        let mut out = Vec::with_capacity(frame_a.len());
        wipe_plane(ay, by, width, height, t, &mut out);

        let uw = width / 2;
        let uh = height / 2;
        wipe_plane(au, bu, uw, uh, t, &mut out);
        wipe_plane(av, bv, uw, uh, t, &mut out);

        out
    }
}

/// Copy one plane's wipe result into `out`: `to` left of the boundary column,
/// `from` at and right of it.
fn wipe_plane(from: &[u8], to: &[u8], w: u32, h: u32, t: f32, out: &mut Vec<u8>) {
    let boundary = (w as f32 * t).round() as u32;
    for py in 0..h {
        for px in 0..w {
            let idx = (py * w + px) as usize;
            out.push(if px < boundary { to[idx] } else { from[idx] });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transitions::helpers::{uv_len, y_len};

    fn yuv_frame(y_val: u8, uv_val: u8, w: u32, h: u32) -> Vec<u8> {
        let mut buf = vec![y_val; y_len(w, h)];
        buf.extend(vec![uv_val; uv_len(w, h) * 2]);
        buf
    }

    #[test]
    fn t_zero_is_all_frame_a() {
        let t = Wipe;
        let (w, h) = (8_u32, 4_u32);
        let a = yuv_frame(200, 100, w, h);
        let b = yuv_frame(50, 128, w, h);
        let out = t.apply(&a, &b, w, h, 0.0);
        assert!(out[..y_len(w, h)].iter().all(|&v| v == 200));
    }

    #[test]
    fn t_one_is_all_frame_b() {
        let t = Wipe;
        let (w, h) = (8_u32, 4_u32);
        let a = yuv_frame(200, 100, w, h);
        let b = yuv_frame(50, 128, w, h);
        let out = t.apply(&a, &b, w, h, 1.0);
        assert!(out[..y_len(w, h)].iter().all(|&v| v == 50));
    }

    #[test]
    fn midpoint_has_single_boundary_column() {
        let t = Wipe;
        let (w, h) = (8_u32, 4_u32);
        let a = yuv_frame(200, 100, w, h); // from (black-ish)
        let b = yuv_frame(50, 128, w, h); // to (white-ish)
        let out = t.apply(&a, &b, w, h, 0.5);
        let boundary = (w as f32 * 0.5).round() as usize;
        for px in 0..w as usize {
            let expected = if px < boundary { 50 } else { 200 };
            assert_eq!(out[px], expected, "column {px} mismatch at t=0.5");
        }
    }

    #[test]
    fn output_length_matches_input() {
        let t = Wipe;
        let (w, h) = (8_u32, 4_u32);
        let a = yuv_frame(100, 128, w, h);
        let b = yuv_frame(200, 128, w, h);
        for tt in [0.0_f32, 0.25, 0.5, 0.75, 1.0] {
            let out = t.apply(&a, &b, w, h, tt);
            assert_eq!(out.len(), a.len(), "length mismatch at t={tt}");
        }
    }
}
