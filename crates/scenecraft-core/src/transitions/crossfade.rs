// Linear dissolve between two clips — no easing, raw per-pixel lerp.
//
// `out = from·(1-t) + to·t` on every byte of every plane. This is the exact
// formula the render engine's endpoint/midpoint expectations are built
// against, so the blend is intentionally *not* run through an easing curve
// here (see `helpers` for easing functions, kept for other callers).

use crate::transitions::helpers::{blend_byte, linear};
use crate::transitions::{TransitionKind, VideoTransition};

pub struct Crossfade;

impl VideoTransition for Crossfade {
    fn kind(&self) -> TransitionKind {
        TransitionKind::Crossfade
    }

    fn label(&self) -> &'static str {
        "Crossfade"
    }

    fn apply(&self, frame_a: &[u8], frame_b: &[u8], _width: u32, _height: u32, t: f32) -> Vec<u8> {
        debug_assert_eq!(
            frame_a.len(),
            frame_b.len(),
            "Crossfade::apply — frame size mismatch: {} vs {}",
            frame_a.len(),
            frame_b.len(),
        );

        let t = linear(t);
        frame_a
            .iter()
            .zip(frame_b.iter())
            .map(|(&a, &b)| blend_byte(a, b, t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(value: u8, len: usize) -> Vec<u8> {
        vec![value; len]
    }

    #[test]
    fn t_zero_returns_frame_a() {
        let cf = Crossfade;
        let a = make_frame(100, 12);
        let b = make_frame(200, 12);
        let result = cf.apply(&a, &b, 4, 3, 0.0);
        assert!(result.iter().all(|&v| v == 100));
    }

    #[test]
    fn t_one_returns_frame_b() {
        let cf = Crossfade;
        let a = make_frame(100, 12);
        let b = make_frame(200, 12);
        let result = cf.apply(&a, &b, 4, 3, 1.0);
        assert!(result.iter().all(|&v| v == 200));
    }

    #[test]
    fn midpoint_is_average() {
        let cf = Crossfade;
        let a = make_frame(16, 12);
        let b = make_frame(235, 12);
        let result = cf.apply(&a, &b, 4, 3, 0.5);
        // blend_byte(16, 235, 0.5) = round(125.5) = 126, comfortably within ±10 of 128.
        assert!((result[0] as i32 - 128).abs() <= 10);
    }

    #[test]
    fn output_length_matches_input() {
        let cf = Crossfade;
        let len = 100;
        let a = make_frame(50, len);
        let b = make_frame(150, len);
        let result = cf.apply(&a, &b, 10, 10, 0.3);
        assert_eq!(result.len(), len);
    }
}
