// crates/scenecraft-media/src/image.rs
//
// Image decoder: decode one still image, scale+convert to the project's
// output format once, cache the result for every later call.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;

use scenecraft_core::error::{EngineError, Result};

use crate::colorspace;

/// Opens one image file and decodes+scales exactly one frame, caching it so
/// repeat calls never touch the decoder again.
pub struct ImageDecoder {
    path: PathBuf,
    target_w: u32,
    target_h: u32,
    cached: Option<VideoFrame>,
}

impl ImageDecoder {
    pub fn open(path: impl Into<PathBuf>, target_w: u32, target_h: u32) -> Self {
        ImageDecoder {
            path: path.into(),
            target_w,
            target_h,
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode+scale the image on the first call; every later call returns a
    /// clone of the cached frame without touching the decoder again.
    pub fn decode_and_cache(&mut self) -> Result<VideoFrame> {
        if let Some(frame) = &self.cached {
            return Ok(frame.clone());
        }
        let frame = self.decode_and_scale()?;
        self.cached = Some(frame.clone());
        Ok(frame)
    }

    fn decode_and_scale(&self) -> Result<VideoFrame> {
        let mut ictx = input(&self.path).map_err(|e| EngineError::Decode {
            path: self.path.clone(),
            reason: format!("open: {e}"),
        })?;

        let stream_idx = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| EngineError::Decode {
                path: self.path.clone(),
                reason: "no image stream".to_string(),
            })?
            .index();

        let dec_ctx = {
            let stream = ictx.stream(stream_idx).unwrap();
            ffmpeg::codec::context::Context::from_parameters(stream.parameters()).map_err(|e| {
                EngineError::Decode {
                    path: self.path.clone(),
                    reason: format!("decoder params: {e}"),
                }
            })?
        };
        let mut decoder = dec_ctx.decoder().video().map_err(|e| EngineError::Decode {
            path: self.path.clone(),
            reason: format!("open decoder: {e}"),
        })?;

        let mut scaler = SwsContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::YUV420P,
            self.target_w,
            self.target_h,
            Flags::BILINEAR,
        )
        .map_err(|e| EngineError::Filter(format!("create image scaler: {e}")))?;

        for result in ictx.packets() {
            let (stream, packet) = result.map_err(|e| EngineError::Decode {
                path: self.path.clone(),
                reason: format!("read packet: {e}"),
            })?;
            if stream.index() != stream_idx {
                continue;
            }
            decoder.send_packet(&packet).map_err(|e| EngineError::Decode {
                path: self.path.clone(),
                reason: format!("send packet: {e}"),
            })?;

            let mut decoded = VideoFrame::empty();
            if decoder.receive_frame(&mut decoded).is_ok() {
                let mut scaled = VideoFrame::empty();
                scaler
                    .run(&decoded, &mut scaled)
                    .map_err(|e| EngineError::Filter(format!("scale image: {e}")))?;
                colorspace::stamp(&mut scaled, self.target_h);
                return Ok(scaled);
            }
        }

        Err(EngineError::Decode {
            path: self.path.clone(),
            reason: "no decodable frame in image stream".to_string(),
        })
    }
}

/// Deterministic synthetic test-pattern frame, substituted whenever an
/// image or video asset is missing or unreadable.
///
/// A low-frequency sine/cosine gradient on each plane, parameterized by
/// `frame_index`. An Image Scene's missing-asset fallback is a single cached
/// frame (like a real decoded image) so it always passes `frame_index = 0`;
/// a Video Scene's missing-asset fallback streams one call per output frame
/// from `worker::VideoPrefetchWorker` with a running index, so that case
/// does differ frame to frame.
pub fn synthetic_test_pattern(width: u32, height: u32, frame_index: u64) -> VideoFrame {
    use std::f32::consts::TAU;

    let mut frame = VideoFrame::new(Pixel::YUV420P, width, height);
    let t = frame_index as f32 * 0.05;

    let y_stride = frame.stride(0);
    let y_data = frame.data_mut(0);
    for row in 0..height as usize {
        for col in 0..width as usize {
            let nx = col as f32 / width.max(1) as f32;
            let ny = row as f32 / height.max(1) as f32;
            let v = 128.0 + 96.0 * (nx * TAU + t).sin() * (ny * TAU * 0.5).cos();
            y_data[row * y_stride + col] = v.clamp(16.0, 235.0) as u8;
        }
    }

    let uw = (width / 2).max(1) as usize;
    let uh = (height / 2).max(1) as usize;

    let u_stride = frame.stride(1);
    let u_data = frame.data_mut(1);
    for row in 0..uh {
        for col in 0..uw {
            let nx = col as f32 / uw as f32;
            let ny = row as f32 / uh as f32;
            let v = 128.0 + 32.0 * (ny * TAU + t).cos();
            let _ = nx;
            u_data[row * u_stride + col] = v.clamp(16.0, 240.0) as u8;
        }
    }

    let v_stride = frame.stride(2);
    let v_data = frame.data_mut(2);
    for row in 0..uh {
        for col in 0..uw {
            let nx = col as f32 / uw as f32;
            let v = 128.0 + 32.0 * (nx * TAU - t).sin();
            v_data[row * v_stride + col] = v.clamp(16.0, 240.0) as u8;
        }
    }

    colorspace::stamp(&mut frame, height);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_errors() {
        let mut dec = ImageDecoder::open("/nonexistent/image.png", 640, 360);
        assert!(dec.decode_and_cache().is_err());
    }

    #[test]
    fn synthetic_pattern_has_expected_dims() {
        let frame = synthetic_test_pattern(64, 32, 0);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 32);
        assert_eq!(frame.format(), Pixel::YUV420P);
    }

    #[test]
    fn synthetic_pattern_varies_with_frame_index() {
        let a = synthetic_test_pattern(32, 16, 0);
        let b = synthetic_test_pattern(32, 16, 20);
        assert_ne!(a.data(0), b.data(0));
    }
}
