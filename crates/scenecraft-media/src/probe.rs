// crates/scenecraft-media/src/probe.rs
//
// In-process FFmpeg duration probing, wired into scenecraft_core's
// DurationProbe trait so the config loader can resolve scene durations
// without depending on FFmpeg itself.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;

use scenecraft_core::DurationProbe;

/// Real `DurationProbe` backed by an FFmpeg demux-only open of the file.
///
/// Stateless — every call opens and immediately closes its own input context.
/// The config loader is responsible for memoizing results per path; this type
/// only needs to answer "what does FFmpeg say the duration is" once per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegProbe;

impl DurationProbe for FfmpegProbe {
    fn probe_audio_duration(&self, path: &str) -> Option<f64> {
        probe_stream_duration(Path::new(path), Type::Audio)
    }

    fn probe_video_duration(&self, path: &str) -> Option<f64> {
        probe_stream_duration(Path::new(path), Type::Video)
    }
}

fn probe_stream_duration(path: &Path, kind: Type) -> Option<f64> {
    let ictx = match input(path) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "probe: failed to open input");
            return None;
        }
    };

    // The container's overall duration is usually reliable and cheapest to
    // read; only fall back to a per-stream duration when it is missing.
    let container_dur = ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
    if container_dur > 0.0 {
        return Some(container_dur);
    }

    let stream = ictx.streams().best(kind)?;
    let tb = stream.time_base();
    let dur = stream.duration() as f64 * tb.numerator() as f64 / tb.denominator() as f64;
    if dur > 0.0 {
        Some(dur)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_returns_none() {
        let probe = FfmpegProbe;
        assert!(probe.probe_audio_duration("/nonexistent/clip.wav").is_none());
        assert!(probe.probe_video_duration("/nonexistent/clip.mp4").is_none());
    }
}
