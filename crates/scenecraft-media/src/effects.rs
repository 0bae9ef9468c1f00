// crates/scenecraft-media/src/effects.rs
//
// Effect processor: Ken-Burns pan/zoom over a still image, and transition
// blending between two content scenes.
//
// Rather than building a `zoompan`/`xfade` libavfilter graph string per
// scene, this computes the same crop/zoom and blend math directly against
// decoded YUV420P planes, using `helpers::yuv::resample_plane` for the
// crop+scale step and `scenecraft_core::transitions::registry()` for blends.

use ffmpeg_the_third::format::Pixel;
use ffmpeg_the_third::util::frame::video::Video as VideoFrame;

use scenecraft_core::error::{EngineError, Result};
use scenecraft_core::project::{KenBurnsParams, KenBurnsPreset};
use scenecraft_core::transitions::{self, TransitionKind};

use crate::colorspace;
use crate::helpers::yuv::{extract_yuv, resample_plane, write_yuv};

/// Crop-window state at one instant of a Ken-Burns move: `zoom` is the
/// magnification factor (`1.0` = full frame), `(x, y)` is the crop window's
/// center offset from the frame center, in source pixels.
#[derive(Clone, Copy, Debug)]
struct KenBurnsPose {
    zoom: f64,
    x: f64,
    y: f64,
}

fn pose_at(params: &KenBurnsParams, width: u32, height: u32, u: f64) -> KenBurnsPose {
    let w = width as f64;
    let h = height as f64;
    match params.preset {
        KenBurnsPreset::ZoomIn => KenBurnsPose {
            zoom: 1.00 + (1.20 - 1.00) * u,
            x: 0.0,
            y: 0.0,
        },
        KenBurnsPreset::ZoomOut => KenBurnsPose {
            zoom: 1.20 + (1.00 - 1.20) * u,
            x: 0.0,
            y: 0.0,
        },
        KenBurnsPreset::PanRight => KenBurnsPose {
            zoom: 1.1,
            x: 0.0 + (w * 0.1 - 0.0) * u,
            y: h * 0.05,
        },
        KenBurnsPreset::PanLeft => KenBurnsPose {
            zoom: 1.1,
            x: (w * 0.1) + (0.0 - w * 0.1) * u,
            y: h * 0.05,
        },
        KenBurnsPreset::Custom => KenBurnsPose {
            zoom: params.start_scale + (params.end_scale - params.start_scale) * u,
            x: params.start_x as f64 + (params.end_x - params.start_x) as f64 * u,
            y: params.start_y as f64 + (params.end_y - params.start_y) as f64 * u,
        },
    }
}

/// Drives a still image through a Ken-Burns pan/zoom move, one output frame
/// per call. The source image is decoded and cached once by `ImageDecoder`;
/// this type only crops+resamples it differently each frame.
pub struct KenBurnsSequence {
    params: KenBurnsParams,
    width: u32,
    height: u32,
    total_frames: u64,
    index: u64,
}

impl KenBurnsSequence {
    /// `total_frames` is `round(scene_duration_secs * fps)`, at least 1.
    pub fn start(params: KenBurnsParams, width: u32, height: u32, total_frames: u64) -> Self {
        KenBurnsSequence {
            params,
            width,
            height,
            total_frames: total_frames.max(1),
            index: 0,
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Produce the next frame of the move, cropped+resampled from `source`
    /// (which must already be `width`×`height` YUV420P — the image decoder's
    /// cached output). A call past the `total_frames`th is an error: the
    /// sequence's contract is exactly `total_frames` calls, not "however many
    /// the caller happens to make."
    pub fn fetch_next_frame(&mut self, source: &VideoFrame) -> Result<VideoFrame> {
        if self.index >= self.total_frames {
            return Err(EngineError::Filter(format!(
                "ken-burns sequence exhausted: {} frames already fetched of {}",
                self.index, self.total_frames
            )));
        }

        if source.format() != Pixel::YUV420P || source.width() != self.width || source.height() != self.height {
            return Err(EngineError::Filter(format!(
                "ken-burns source frame is {}x{} {:?}, expected {}x{} YUV420P",
                source.width(),
                source.height(),
                source.format(),
                self.width,
                self.height
            )));
        }

        let last = self.total_frames.saturating_sub(1).max(1);
        let u = (self.index as f64 / last as f64).clamp(0.0, 1.0);
        self.index += 1;

        let pose = pose_at(&self.params, self.width, self.height, u);
        let zoom = pose.zoom.max(1e-3);

        let (w, h) = (self.width as usize, self.height as usize);
        let (uw, uh) = ((self.width / 2).max(1) as usize, (self.height / 2).max(1) as usize);

        let crop_w = w as f64 / zoom;
        let crop_h = h as f64 / zoom;
        let crop_x = (w as f64 - crop_w) / 2.0 + pose.x;
        let crop_y = (h as f64 - crop_h) / 2.0 + pose.y;

        let raw = extract_yuv(source, w, h, uw, uh);
        let (y_src, u_src, v_src) = scenecraft_core::transitions::helpers::split_planes(&raw, self.width, self.height);

        let y_out = resample_plane(y_src, w, h, crop_x, crop_y, crop_w, crop_h, w, h);
        let u_out = resample_plane(u_src, uw, uh, crop_x / 2.0, crop_y / 2.0, crop_w / 2.0, crop_h / 2.0, uw, uh);
        let v_out = resample_plane(v_src, uw, uh, crop_x / 2.0, crop_y / 2.0, crop_w / 2.0, crop_h / 2.0, uw, uh);

        let mut packed = Vec::with_capacity(y_out.len() + u_out.len() + v_out.len());
        packed.extend_from_slice(&y_out);
        packed.extend_from_slice(&u_out);
        packed.extend_from_slice(&v_out);

        let mut out = VideoFrame::new(Pixel::YUV420P, self.width, self.height);
        write_yuv(&packed, &mut out, w, h, uw, uh);
        colorspace::stamp(&mut out, self.height);
        Ok(out)
    }
}

/// Drives a transition scene's output, blending a pair of boundary frames
/// (the outgoing scene's last frame, the incoming scene's first frame)
/// across `total_frames` output frames using the registered
/// [`scenecraft_core::transitions::VideoTransition`] for the scene's kind.
pub struct TransitionSequence {
    transition: Box<dyn transitions::VideoTransition>,
    width: u32,
    height: u32,
    total_frames: u64,
    index: u64,
}

impl TransitionSequence {
    pub fn start(kind: TransitionKind, width: u32, height: u32, total_frames: u64) -> Result<Self> {
        let mut registry = transitions::registry();
        let transition = registry
            .remove(&kind)
            .ok_or_else(|| EngineError::Filter(format!("no transition registered for {kind:?}")))?;
        Ok(TransitionSequence {
            transition,
            width,
            height,
            total_frames: total_frames.max(1),
            index: 0,
        })
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn label(&self) -> &'static str {
        self.transition.label()
    }

    /// Blend `frame_a` (outgoing scene's boundary frame) and `frame_b`
    /// (incoming scene's boundary frame) at the next progress step. Progress
    /// is endpoint-inclusive: frame 0 is `t = 0.0` (100% `frame_a`) and frame
    /// `total_frames - 1` is `t = 1.0` (100% `frame_b`), the same mapping
    /// [`KenBurnsSequence::fetch_next_frame`] uses for its pose parameter —
    /// required so a crossfade's last rendered frame actually matches the
    /// incoming scene's boundary frame, not a frame shy of it. A call past
    /// the `total_frames`th is an error, not a frozen `t = 1.0` repeat.
    pub fn fetch_next_frame(&mut self, frame_a: &VideoFrame, frame_b: &VideoFrame) -> Result<VideoFrame> {
        if self.index >= self.total_frames {
            return Err(EngineError::Filter(format!(
                "transition sequence exhausted: {} frames already fetched of {}",
                self.index, self.total_frames
            )));
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let (uw, uh) = ((self.width / 2).max(1) as usize, (self.height / 2).max(1) as usize);

        let a = extract_yuv(frame_a, w, h, uw, uh);
        let b = extract_yuv(frame_b, w, h, uw, uh);

        let last = self.total_frames.saturating_sub(1).max(1);
        let t = (self.index as f64 / last as f64) as f32;
        self.index += 1;

        let blended = self.transition.apply(&a, &b, self.width, self.height, t);

        let mut out = VideoFrame::new(Pixel::YUV420P, self.width, self.height);
        write_yuv(&blended, &mut out, w, h, uw, uh);
        colorspace::stamp(&mut out, self.height);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, y: u8) -> VideoFrame {
        let mut f = VideoFrame::new(Pixel::YUV420P, width, height);
        for row in 0..height as usize {
            let stride = f.stride(0);
            f.data_mut(0)[row * stride..row * stride + width as usize].fill(y);
        }
        f
    }

    #[test]
    fn zoom_in_starts_at_full_frame_and_ends_zoomed() {
        let params = KenBurnsParams {
            preset: KenBurnsPreset::ZoomIn,
            ..KenBurnsParams::default()
        };
        let mut seq = KenBurnsSequence::start(params, 16, 16, 5);
        let src = solid_frame(16, 16, 100);
        for _ in 0..5 {
            let out = seq.fetch_next_frame(&src).unwrap();
            assert_eq!(out.width(), 16);
            assert_eq!(out.height(), 16);
        }
    }

    #[test]
    fn ken_burns_errors_past_total_frames() {
        let params = KenBurnsParams::default();
        let mut seq = KenBurnsSequence::start(params, 8, 8, 2);
        let src = solid_frame(8, 8, 50);
        assert!(seq.fetch_next_frame(&src).is_ok());
        assert!(seq.fetch_next_frame(&src).is_ok());
        assert!(seq.fetch_next_frame(&src).is_err());
        assert!(seq.fetch_next_frame(&src).is_err());
    }

    #[test]
    fn transition_sequence_runs_to_completion() {
        let mut seq = TransitionSequence::start(TransitionKind::Crossfade, 8, 8, 4).unwrap();
        let a = solid_frame(8, 8, 0);
        let b = solid_frame(8, 8, 255);
        for _ in 0..4 {
            assert!(seq.fetch_next_frame(&a, &b).is_ok());
        }
    }

    #[test]
    fn transition_sequence_errors_past_total_frames() {
        let mut seq = TransitionSequence::start(TransitionKind::Crossfade, 8, 8, 4).unwrap();
        let a = solid_frame(8, 8, 0);
        let b = solid_frame(8, 8, 255);
        for _ in 0..4 {
            assert!(seq.fetch_next_frame(&a, &b).is_ok());
        }
        assert!(seq.fetch_next_frame(&a, &b).is_err());
    }

    #[test]
    fn transition_sequence_endpoints_match_boundary_frames() {
        let mut seq = TransitionSequence::start(TransitionKind::Crossfade, 8, 8, 4).unwrap();
        let a = solid_frame(8, 8, 16);
        let b = solid_frame(8, 8, 235);

        let first = seq.fetch_next_frame(&a, &b).unwrap();
        assert_eq!(first.data(0)[0], 16);

        let _ = seq.fetch_next_frame(&a, &b).unwrap();
        let _ = seq.fetch_next_frame(&a, &b).unwrap();
        let last = seq.fetch_next_frame(&a, &b).unwrap();
        assert_eq!(last.data(0)[0], 235);
    }

    #[test]
    fn wrong_source_dims_errors() {
        let mut seq = KenBurnsSequence::start(KenBurnsParams::default(), 16, 16, 3);
        let src = solid_frame(8, 8, 10);
        assert!(seq.fetch_next_frame(&src).is_err());
    }
}
