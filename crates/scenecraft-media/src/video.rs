// crates/scenecraft-media/src/video.rs
//
// Video decoder. Demuxes a video file, decodes frames on demand in
// presentation order, and offers the same color-space-aware scaler used
// by the image decoder. Optionally honors `trim_start`/`trim_end`, using
// a pre-roll-skip / out-point-stop pattern for clip trimming.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;

use scenecraft_core::error::{EngineError, Result};

use crate::colorspace;
use crate::helpers::seek::seek_to_secs;

/// Optional `(trim_start, trim_end)` window in seconds. `trim_end <= 0`
/// means "no upper bound".
#[derive(Clone, Copy, Debug, Default)]
pub struct Trim {
    pub start: f64,
    pub end: Option<f64>,
}

pub struct VideoDecoder {
    path: PathBuf,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::video::Video,
    stream_index: usize,
    time_base: Rational,
    container_duration_secs: f64,
    guessed_fps: f64,
    trim: Trim,
    scaler: Option<(SwsContext, Pixel, u32, u32)>,
    eof: bool,
    sent_eof: bool,
}

impl VideoDecoder {
    pub fn open(path: impl Into<PathBuf>, trim: Trim) -> Result<Self> {
        let path = path.into();
        let mut ictx = input(&path).map_err(|e| EngineError::Decode {
            path: path.clone(),
            reason: format!("open: {e}"),
        })?;

        let stream_index = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| EngineError::Decode {
                path: path.clone(),
                reason: "no video stream".to_string(),
            })?
            .index();

        let (time_base, guessed_fps) = {
            let stream = ictx.stream(stream_index).unwrap();
            let tb = stream.time_base();
            let fps = stream.avg_frame_rate();
            let fps = if fps.denominator() != 0 {
                fps.numerator() as f64 / fps.denominator() as f64
            } else {
                0.0
            };
            (tb, fps)
        };

        let container_duration_secs =
            ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;

        if trim.start > 0.0 {
            seek_to_secs(&mut ictx, trim.start, "VideoDecoder::open");
        }

        let dec_ctx = {
            let stream = ictx.stream(stream_index).unwrap();
            ffmpeg::codec::context::Context::from_parameters(stream.parameters()).map_err(
                |e| EngineError::Decode {
                    path: path.clone(),
                    reason: format!("decoder params: {e}"),
                },
            )?
        };
        let decoder = dec_ctx.decoder().video().map_err(|e| EngineError::Decode {
            path: path.clone(),
            reason: format!("open decoder: {e}"),
        })?;

        Ok(VideoDecoder {
            path,
            ictx,
            decoder,
            stream_index,
            time_base,
            container_duration_secs: container_duration_secs.max(0.0),
            guessed_fps,
            trim,
            scaler: None,
            eof: false,
            sent_eof: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_secs(&self) -> f64 {
        self.container_duration_secs
    }

    pub fn guessed_fps(&self) -> f64 {
        self.guessed_fps
    }

    fn pts_to_secs(&self, pts: i64) -> f64 {
        pts as f64 * self.time_base.numerator() as f64 / self.time_base.denominator() as f64
    }

    /// Decode the next frame in presentation order, `None` at end of stream.
    /// Honors `trim.start`/`trim.end` by skipping pre-roll frames and
    /// stopping once `trim.end` is reached.
    pub fn decode_next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.eof {
            return Ok(None);
        }
        loop {
            let mut decoded = VideoFrame::empty();
            if self.try_receive(&mut decoded)? {
                if let Some(pts) = decoded.pts() {
                    let secs = self.pts_to_secs(pts);
                    if secs < self.trim.start - f64::EPSILON {
                        continue;
                    }
                    if let Some(end) = self.trim.end {
                        if secs >= end {
                            self.eof = true;
                            return Ok(None);
                        }
                    }
                }
                return Ok(Some(decoded));
            }

            match self.advance_demuxer()? {
                true => continue,
                false => {
                    self.eof = true;
                    return Ok(None);
                }
            }
        }
    }

    /// Pull one packet through the decoder, returns `true` if the caller
    /// should loop `try_receive` again, `false` once the stream is fully
    /// drained (packets exhausted and EOF already sent to the decoder).
    fn advance_demuxer(&mut self) -> Result<bool> {
        for result in self.ictx.packets() {
            let (stream, packet) = result.map_err(|e| EngineError::Decode {
                path: self.path.clone(),
                reason: format!("read packet: {e}"),
            })?;
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder.send_packet(&packet).map_err(|e| EngineError::Decode {
                path: self.path.clone(),
                reason: format!("send packet: {e}"),
            })?;
            return Ok(true);
        }
        // Demuxer exhausted — flush remaining buffered frames exactly once.
        if !self.sent_eof {
            self.sent_eof = true;
            let _ = self.decoder.send_eof();
            return Ok(true);
        }
        Ok(false)
    }

    /// `receive_frame` returning an error covers both "no frame ready yet,
    /// feed more packets" and true end-of-stream, so it is treated as a
    /// plain boolean here; the packet loop exhausting is what actually
    /// drives `self.eof`.
    fn try_receive(&mut self, out: &mut VideoFrame) -> Result<bool> {
        Ok(self.decoder.receive_frame(out).is_ok())
    }

    /// Scale+convert a decoded frame to `(w, h, fmt)`, applying the same
    /// color-space-aware stamping policy as the image decoder.
    pub fn scale_frame(&mut self, src: &VideoFrame, w: u32, h: u32, fmt: Pixel) -> Result<VideoFrame> {
        let needs_new = match &self.scaler {
            Some((_, cur_fmt, cur_w, cur_h)) => *cur_fmt != fmt || *cur_w != w || *cur_h != h,
            None => true,
        };
        if needs_new {
            let sws = SwsContext::get(src.format(), src.width(), src.height(), fmt, w, h, Flags::BILINEAR)
                .map_err(|e| EngineError::Filter(format!("create video scaler: {e}")))?;
            self.scaler = Some((sws, fmt, w, h));
        }
        let (sws, ..) = self.scaler.as_mut().unwrap();
        let mut out = VideoFrame::empty();
        sws.run(src, &mut out)
            .map_err(|e| EngineError::Filter(format!("scale video frame: {e}")))?;
        colorspace::stamp(&mut out, h);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_errors() {
        assert!(VideoDecoder::open("/nonexistent/clip.mp4", Trim::default()).is_err());
    }
}
