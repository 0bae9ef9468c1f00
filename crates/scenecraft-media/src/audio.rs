// crates/scenecraft-media/src/audio.rs
//
// Audio decoder: demux/decode one audio stream, resample to canonical
// float-planar stereo @ 44100 Hz, and optionally run it through a per-layer
// fade-in/fade-out/gain envelope (`apply_volume_effect`).
//
// Rather than stringing `afade`/`volume` together as a libavfilter graph
// description, this applies the equivalent arithmetic directly to the
// decoded float-planar samples: no filtergraph is built for a pointwise
// gain envelope once frames are already plain float buffers in Rust.

use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, sample::Type as SampleType, Sample};
use ffmpeg::media::Type;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;

use scenecraft_core::error::{EngineError, Result};

use crate::helpers::seek::seek_to_secs;

pub const CANONICAL_RATE: u32 = 44100;

/// One chunk of decoded, resampled, canonical-format audio: deinterleaved
/// float samples, equal length per channel.
#[derive(Clone, Debug, Default)]
pub struct StereoChunk {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoChunk {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Three-stage gain envelope applied pointwise to canonical samples:
/// fade-in window, fade-out window, then constant gain multiply — the
/// arithmetic equivalent of `afade(in)? -> afade(out)? -> volume(gain)`.
/// Disabled (a no-op) iff `fade_in <= 0 && fade_out <= 0 &&
/// |gain - 1| <= 1e-3`.
#[derive(Clone, Copy, Debug)]
struct VolumeEnvelope {
    gain: f64,
    fade_in_secs: f64,
    fade_out_secs: f64,
    track_duration_secs: f64,
}

impl VolumeEnvelope {
    fn enabled(&self) -> bool {
        self.fade_in_secs > 0.0 || self.fade_out_secs > 0.0 || (self.gain - 1.0).abs() > 1e-3
    }

    /// Multiplier to apply to a sample at `t` seconds into the track.
    fn gain_at(&self, t: f64) -> f32 {
        let mut g = self.gain;
        if self.fade_in_secs > 0.0 {
            g *= (t / self.fade_in_secs).clamp(0.0, 1.0);
        }
        if self.fade_out_secs > 0.0 {
            let fade_out_start = (self.track_duration_secs - self.fade_out_secs).max(0.0);
            let remaining = (self.track_duration_secs - t).max(0.0);
            if t >= fade_out_start {
                g *= (remaining / self.fade_out_secs).clamp(0.0, 1.0);
            }
        }
        g as f32
    }
}

pub struct AudioDecoder {
    path: PathBuf,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::audio::Audio,
    stream_index: usize,
    time_base: Rational,
    resampler: Option<resampling::Context>,
    envelope: Option<VolumeEnvelope>,
    /// Running count of canonical-rate samples emitted, used to place the
    /// envelope in track time without needing per-frame PTS bookkeeping.
    samples_emitted: u64,
    sent_eof: bool,
}

impl AudioDecoder {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ictx = input(&path).map_err(|e| EngineError::Decode {
            path: path.clone(),
            reason: format!("open: {e}"),
        })?;

        let stream_index = ictx
            .streams()
            .best(Type::Audio)
            .ok_or_else(|| EngineError::Decode {
                path: path.clone(),
                reason: "no audio stream".to_string(),
            })?
            .index();

        let time_base = ictx.stream(stream_index).unwrap().time_base();

        let dec_ctx = {
            let stream = ictx.stream(stream_index).unwrap();
            ffmpeg::codec::context::Context::from_parameters(stream.parameters()).map_err(
                |e| EngineError::Decode {
                    path: path.clone(),
                    reason: format!("decoder params: {e}"),
                },
            )?
        };
        let decoder = dec_ctx.decoder().audio().map_err(|e| EngineError::Decode {
            path: path.clone(),
            reason: format!("open decoder: {e}"),
        })?;

        Ok(AudioDecoder {
            path,
            ictx,
            decoder,
            stream_index,
            time_base,
            resampler: None,
            envelope: None,
            samples_emitted: 0,
            sent_eof: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Install the per-layer fade/gain envelope. `fade_in`/`fade_out` of
    /// `0.0` disable that side. No-op (disabled) iff gain is ~1 and both
    /// fades are zero.
    pub fn apply_volume_effect(&mut self, base_gain: f64, fade_in: f64, fade_out: f64, track_duration_secs: f64) {
        let envelope = VolumeEnvelope {
            gain: base_gain,
            fade_in_secs: fade_in,
            fade_out_secs: fade_out,
            track_duration_secs,
        };
        self.envelope = if envelope.enabled() { Some(envelope) } else { None };
    }

    /// Seek to the nearest keyframe at or before `seconds`.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        seek_to_secs(&mut self.ictx, seconds, "AudioDecoder::seek");
        self.sent_eof = false;
        Ok(())
    }

    /// Decode, resample, and (if installed) envelope one chunk of audio.
    /// `None` signals end of stream.
    pub fn decode_frame(&mut self) -> Result<Option<StereoChunk>> {
        loop {
            let mut raw = AudioFrame::empty();
            if self.decoder.receive_frame(&mut raw).is_ok() {
                return Ok(Some(self.finish_frame(raw)?));
            }

            if !self.advance()? {
                return Ok(None);
            }
        }
    }

    /// Feed one packet (or, once the demuxer is exhausted, the decoder EOF)
    /// into the decoder. Returns `false` once fully drained.
    fn advance(&mut self) -> Result<bool> {
        for result in self.ictx.packets() {
            let (stream, packet) = result.map_err(|e| EngineError::Decode {
                path: self.path.clone(),
                reason: format!("read packet: {e}"),
            })?;
            if stream.index() != self.stream_index {
                continue;
            }
            // Soft-fail on a bad packet rather than abort the whole decode
            // over one corrupt packet.
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            return Ok(true);
        }
        if !self.sent_eof {
            self.sent_eof = true;
            let _ = self.decoder.send_eof();
            return Ok(true);
        }
        Ok(false)
    }

    /// Resample a raw decoded frame to canonical float-planar stereo @
    /// 44100 Hz (duplicating mono to both channels), then apply the volume
    /// envelope if one is installed.
    fn finish_frame(&mut self, raw: AudioFrame) -> Result<StereoChunk> {
        let target_fmt = Sample::F32(SampleType::Planar);
        let needs_resample =
            raw.format() != target_fmt || raw.rate() != CANONICAL_RATE || raw.ch_layout().channels() < 2;

        let resampled = if needs_resample {
            let src_layout = if raw.ch_layout().channels() >= 2 {
                raw.ch_layout()
            } else {
                ChannelLayout::MONO
            };
            let rs = match &self.resampler {
                Some(_) => self.resampler.as_mut().unwrap(),
                None => {
                    let ctx = resampling::Context::get2(
                        raw.format(),
                        src_layout,
                        raw.rate(),
                        target_fmt,
                        ChannelLayout::STEREO,
                        CANONICAL_RATE,
                    )
                    .map_err(|e| EngineError::Filter(format!("create audio resampler: {e}")))?;
                    self.resampler = Some(ctx);
                    self.resampler.as_mut().unwrap()
                }
            };
            let mut out = AudioFrame::empty();
            rs.run(&raw, &mut out)
                .map_err(|e| EngineError::Filter(format!("resample audio: {e}")))?;
            out
        } else {
            raw
        };

        let n = resampled.samples();
        if n == 0 {
            return Ok(StereoChunk::default());
        }

        let (left, right) = unsafe {
            let l_bytes = resampled.data(0);
            let l: Vec<f32> = std::slice::from_raw_parts(l_bytes.as_ptr() as *const f32, n).to_vec();
            let r_bytes = if resampled.ch_layout().channels() >= 2 {
                resampled.data(1)
            } else {
                resampled.data(0)
            };
            let r: Vec<f32> = std::slice::from_raw_parts(r_bytes.as_ptr() as *const f32, n).to_vec();
            (l, r)
        };

        let mut chunk = StereoChunk { left, right };
        if let Some(envelope) = self.envelope {
            for i in 0..chunk.len() {
                let t = (self.samples_emitted + i as u64) as f64 / CANONICAL_RATE as f64;
                let g = envelope.gain_at(t);
                chunk.left[i] *= g;
                chunk.right[i] *= g;
            }
        }
        self.samples_emitted += chunk.len() as u64;

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_errors() {
        assert!(AudioDecoder::open("/nonexistent/clip.wav").is_err());
    }

    #[test]
    fn envelope_disabled_when_no_fade_and_unity_gain() {
        let e = VolumeEnvelope {
            gain: 1.0,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
            track_duration_secs: 10.0,
        };
        assert!(!e.enabled());
    }

    #[test]
    fn envelope_enabled_by_gain_alone() {
        let e = VolumeEnvelope {
            gain: 0.5,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
            track_duration_secs: 10.0,
        };
        assert!(e.enabled());
        assert!((e.gain_at(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn fade_in_ramps_from_zero() {
        let e = VolumeEnvelope {
            gain: 1.0,
            fade_in_secs: 2.0,
            fade_out_secs: 0.0,
            track_duration_secs: 10.0,
        };
        assert!((e.gain_at(0.0) - 0.0).abs() < 1e-6);
        assert!((e.gain_at(1.0) - 0.5).abs() < 1e-6);
        assert!((e.gain_at(2.0) - 1.0).abs() < 1e-6);
        assert!((e.gain_at(5.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fade_out_ramps_to_zero() {
        let e = VolumeEnvelope {
            gain: 1.0,
            fade_in_secs: 0.0,
            fade_out_secs: 2.0,
            track_duration_secs: 10.0,
        };
        assert!((e.gain_at(8.0) - 1.0).abs() < 1e-6);
        assert!((e.gain_at(9.0) - 0.5).abs() < 1e-6);
        assert!((e.gain_at(10.0) - 0.0).abs() < 1e-6);
    }
}
