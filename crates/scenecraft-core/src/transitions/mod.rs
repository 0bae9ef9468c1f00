// Transition system.
//
// Three layers live here:
//
//   1. `TransitionKind` — the discriminant used as a registry key, carried in
//      the project JSON as a lowercase string (crossfade|wipe|slide).
//
//   2. `VideoTransition` trait — the algorithm contract. Each transition is a
//      zero-size struct implementing this trait. `apply()` receives packed
//      YUV420P buffers and a progress value `t` in [0.0, 1.0] and returns a
//      blended packed buffer. No FFmpeg types cross this boundary — the
//      media crate handles `extract_yuv` / `write_yuv` on both sides.
//
//   3. Registry — a `HashMap<TransitionKind, Box<dyn VideoTransition>>` built
//      once via `registry()`. The render engine looks transitions up here
//      rather than matching on `TransitionKind` directly.
//
// `t` convention: `t = 0.0` → 100% `frame_a` (the outgoing / "from" scene),
// `t = 1.0` → 100% `frame_b` (the incoming / "to" scene). The render engine
// computes `t = i / D` for frame `i` of `D` total transition frames.

pub mod helpers;
mod crossfade;
mod wipe;
mod slide;

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Discriminant-only enum used as the registry key and the wire value of
/// `scene.transition_type` in the project JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Crossfade,
    Wipe,
    Slide,
}

impl Default for TransitionKind {
    fn default() -> Self {
        TransitionKind::Crossfade
    }
}

/// Algorithm contract for all video transitions.
///
/// Implementors are zero-size structs — they hold no per-clip state. Runtime
/// parameters (duration) come from the scene config; the trait only receives
/// what it needs to blend one pair of frames.
///
/// # Buffer contract
/// Both `frame_a` and `frame_b` are packed YUV420P byte slices with layout:
///   `[Y plane: w×h] ++ [U plane: (w/2)×(h/2)] ++ [V plane: (w/2)×(h/2)]`
/// No stride padding — see `scenecraft_media::helpers::yuv::extract_yuv`.
pub trait VideoTransition: Send + Sync {
    /// Discriminant identifying this transition in the registry.
    fn kind(&self) -> TransitionKind;

    /// Human-readable label, used only in logs.
    fn label(&self) -> &'static str;

    /// Blend `frame_a` (outgoing) and `frame_b` (incoming) at progress `t`.
    ///
    /// `width` and `height` are the luma dimensions. UV dims are
    /// `(width/2, height/2)`.
    fn apply(&self, frame_a: &[u8], frame_b: &[u8], width: u32, height: u32, t: f32) -> Vec<u8>;
}

/// Return a map of all registered transitions keyed by `TransitionKind`.
///
/// Cheap to construct — every impl is a zero-size struct — called once per
/// transition scene by the render engine.
pub fn registry() -> HashMap<TransitionKind, Box<dyn VideoTransition>> {
    let entries: Vec<Box<dyn VideoTransition>> = vec![
        Box::new(crossfade::Crossfade),
        Box::new(wipe::Wipe),
        Box::new(slide::Slide),
    ];
    entries.into_iter().map(|t| (t.kind(), t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_three_kinds() {
        let r = registry();
        assert!(r.contains_key(&TransitionKind::Crossfade));
        assert!(r.contains_key(&TransitionKind::Wipe));
        assert!(r.contains_key(&TransitionKind::Slide));
        assert_eq!(r.len(), 3);
    }
}
