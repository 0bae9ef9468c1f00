// crates/scenecraft-media/src/worker.rs
//
// Per-scene producer threads: one video-prefetch worker for a Video Scene,
// one audio-layer worker per configured audio layer (primary, auxiliary, or
// embedded video audio treated as just another layer). Both exist only for
// the lifetime of the scene that owns them; the render thread is the sole
// consumer.
//
// Built around a dedicated decode thread feeding a bounded
// `crossbeam_channel` for playback lookahead (plain backpressure is all a
// single-consumer frame queue needs), and a `Mutex`+`Condvar`-guarded shared
// slot for requests the consumer must block on (used for audio layers,
// since the mixer needs to block on "more samples, or tell me you're done",
// not just "next item ready").
//
// `ffmpeg_the_third`'s `VideoFrame`/`AudioFrame` wrap a raw `AVFrame*` and
// are not `Send`, so neither ever crosses a thread boundary directly: video
// frames cross the channel as `PackedFrame` (`helpers::yuv`'s stride-free
// packed buffer), audio as plain `Vec<f32>` pairs, and are only turned back
// into ffmpeg frame types on the render thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use ffmpeg_the_third::format::Pixel;
use ffmpeg_the_third::util::frame::video::Video as VideoFrame;

use scenecraft_core::error::{EngineError, Result};

use crate::audio::{AudioDecoder, StereoChunk};
use crate::colorspace;
use crate::helpers::yuv::{extract_yuv, write_yuv};
use crate::image::synthetic_test_pattern;
use crate::video::{Trim, VideoDecoder};

/// Capacity of a video scene's decode-ahead queue.
pub const VIDEO_QUEUE_CAPACITY: usize = 8;
/// Capacity of an audio layer's per-channel buffer, in samples: 5 seconds at
/// the canonical 44.1 kHz rate.
pub const AUDIO_BUFFER_SAMPLES: usize = 5 * 44_100;

/// A decoded+scaled video frame in `Send`-safe, stride-free packed-plane
/// form. Reconstructed into a strided `VideoFrame` only by the consumer.
pub struct PackedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PackedFrame {
    fn from_video_frame(frame: &VideoFrame) -> Self {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let (uw, uh) = ((frame.width() / 2).max(1) as usize, (frame.height() / 2).max(1) as usize);
        PackedFrame {
            data: extract_yuv(frame, w, h, uw, uh),
            width: frame.width(),
            height: frame.height(),
        }
    }

    pub fn to_video_frame(&self) -> VideoFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let (uw, uh) = ((self.width / 2).max(1) as usize, (self.height / 2).max(1) as usize);
        let mut out = VideoFrame::new(Pixel::YUV420P, self.width, self.height);
        write_yuv(&self.data, &mut out, w, h, uw, uh);
        colorspace::stamp(&mut out, self.height);
        out
    }
}

/// Decodes a Video Scene's frames on a background thread, scaling each to
/// project dimensions and pushing it into a bounded channel. Once the
/// source is exhausted the worker repeats its last frame forever — a
/// configured scene duration longer than its source video is not an error,
/// it just freezes on the final frame. Unlike `effects.rs`'s Ken-Burns and
/// transition sequences, which have a known `total_frames` and error past
/// it, this worker never knows in advance how many frames the consumer will
/// ask for, so it has no exhaustion point to error at.
///
/// Dropping the worker cancels it: the stop flag is set and the receiver is
/// drained so a producer blocked on a full channel observes the flag and
/// exits, then the thread is joined.
pub struct VideoPrefetchWorker {
    rx: crossbeam_channel::Receiver<Result<PackedFrame>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VideoPrefetchWorker {
    /// The decoder is opened *inside* the spawned thread, not on the caller's
    /// — `ffmpeg_the_third`'s decoder/context types wrap a raw `AVFormatContext*`
    /// internally and are not `Send`, so a live handle can never cross a
    /// thread boundary; it has to be constructed where it will be used.
    ///
    /// A path that fails to open is treated as a missing asset: the worker
    /// logs a warning and streams the synthetic test pattern for the
    /// scene's whole duration instead of failing the render.
    pub fn spawn(path: String, trim: Trim, width: u32, height: u32) -> Self {
        let (tx, rx) = crossbeam_channel::bounded::<Result<PackedFrame>>(VIDEO_QUEUE_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut dec = match VideoDecoder::open(path.clone(), trim) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "video open failed, using synthetic test pattern");
                    let mut frame_index = 0u64;
                    loop {
                        if stop_thread.load(Ordering::Relaxed) {
                            return;
                        }
                        let packed = PackedFrame::from_video_frame(&synthetic_test_pattern(width, height, frame_index));
                        frame_index += 1;
                        if tx.send(Ok(packed)).is_err() {
                            return;
                        }
                    }
                }
            };

            let mut last: Option<PackedFrame> = None;
            let mut empty_stream_frame_index = 0u64;
            loop {
                if stop_thread.load(Ordering::Relaxed) {
                    return;
                }
                let item: Result<PackedFrame> = match dec.decode_next_frame() {
                    Ok(Some(raw)) => dec.scale_frame(&raw, width, height, Pixel::YUV420P).map(|scaled| {
                        let packed = PackedFrame::from_video_frame(&scaled);
                        last = Some(PackedFrame {
                            data: packed.data.clone(),
                            width: packed.width,
                            height: packed.height,
                        });
                        packed
                    }),
                    Ok(None) => match &last {
                        Some(prev) => Ok(PackedFrame {
                            data: prev.data.clone(),
                            width: prev.width,
                            height: prev.height,
                        }),
                        None => {
                            let packed = PackedFrame::from_video_frame(&synthetic_test_pattern(width, height, empty_stream_frame_index));
                            empty_stream_frame_index += 1;
                            Ok(packed)
                        }
                    },
                    Err(e) => Err(e),
                };
                if tx.send(item).is_err() {
                    // Receiver dropped — render thread moved on without us.
                    return;
                }
            }
        });

        VideoPrefetchWorker {
            rx,
            stop,
            handle: Some(handle),
        }
    }

    /// Blocks until the next frame is ready.
    pub fn next_frame(&self) -> Result<VideoFrame> {
        match self.rx.recv() {
            Ok(Ok(packed)) => Ok(packed.to_video_frame()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Cancelled),
        }
    }
}

impl Drop for VideoPrefetchWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            // Drain so a decode thread parked on a full channel unblocks,
            // observes the stop flag on its next loop iteration, and exits —
            // bounds the shutdown instead of leaving it joined-not-reaped.
            while !handle.is_finished() {
                let _ = self.rx.try_recv();
                std::thread::yield_now();
            }
            let _ = handle.join();
        }
    }
}

// ── Audio layer worker ──────────────────────────────────────────────────────

struct LayerState {
    left: VecDeque<f32>,
    right: VecDeque<f32>,
    eof: bool,
    error: Option<EngineError>,
    stop: bool,
}

/// Decodes one configured audio layer on a background thread, pushing
/// deinterleaved float samples into a pair of deques bounded to
/// [`AUDIO_BUFFER_SAMPLES`]. The render thread's mixer
/// (`render::mix_from_layers`) is the sole consumer, via [`pull`].
pub struct AudioLayerWorker {
    shared: Arc<(Mutex<LayerState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl AudioLayerWorker {
    /// Opens `path` and installs its fade/gain envelope *inside* the spawned
    /// thread, for the same reason `VideoPrefetchWorker` opens its decoder
    /// there — a live `AudioDecoder` wraps non-`Send` ffmpeg handles and can
    /// never be constructed on one thread and handed to another.
    ///
    /// `start_offset` is *not* a seek — it is the mixer's `delay_samples`
    /// lead-in, so this worker always decodes its source from the
    /// beginning; the caller tracks the delay separately (see
    /// [`ActiveAudioLayer`]).
    ///
    /// A path that fails to open is a recoverable missing-asset case: the
    /// worker logs a warning and reports immediate EOF, so the layer
    /// contributes silence for its whole duration instead of failing the
    /// render.
    pub fn spawn(path: String, volume: f64, fade_in: f64, fade_out: f64, duration_secs: f64) -> Self {
        let shared = Arc::new((
            Mutex::new(LayerState {
                left: VecDeque::new(),
                right: VecDeque::new(),
                eof: false,
                error: None,
                stop: false,
            }),
            Condvar::new(),
        ));
        let thread_shared = shared.clone();

        let handle = std::thread::spawn(move || {
            let (lock, cvar) = &*thread_shared;
            let mut dec = match AudioDecoder::open(path.clone()) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "audio layer open failed, substituting silence");
                    let mut st = lock.lock().unwrap();
                    st.eof = true;
                    cvar.notify_all();
                    return;
                }
            };
            dec.apply_volume_effect(volume, fade_in, fade_out, duration_secs);

            loop {
                {
                    let mut st = lock.lock().unwrap();
                    while !st.stop && st.left.len() >= AUDIO_BUFFER_SAMPLES {
                        st = cvar.wait(st).unwrap();
                    }
                    if st.stop {
                        return;
                    }
                }
                match dec.decode_frame() {
                    Ok(Some(chunk)) if !chunk.is_empty() => {
                        let mut st = lock.lock().unwrap();
                        st.left.extend(chunk.left);
                        st.right.extend(chunk.right);
                        cvar.notify_all();
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => {
                        let mut st = lock.lock().unwrap();
                        st.eof = true;
                        cvar.notify_all();
                        return;
                    }
                    Err(e) => {
                        let mut st = lock.lock().unwrap();
                        st.error = Some(e);
                        cvar.notify_all();
                        return;
                    }
                }
            }
        });

        AudioLayerWorker {
            shared,
            handle: Some(handle),
        }
    }

    fn silent(target_len_samples: usize) -> Self {
        let shared = Arc::new((
            Mutex::new(LayerState {
                left: VecDeque::from(vec![0.0f32; target_len_samples]),
                right: VecDeque::from(vec![0.0f32; target_len_samples]),
                eof: true,
                error: None,
                stop: false,
            }),
            Condvar::new(),
        ));
        AudioLayerWorker { shared, handle: None }
    }

    /// Pull up to `n` samples per channel, blocking until either `n` are
    /// available or the worker has signalled EOF (returning fewer than `n`
    /// in that case — callers zero-pad). A worker error fails the pull,
    /// which the render loop propagates as a render-wide failure.
    pub fn pull(&self, n: usize) -> Result<StereoChunk> {
        let (lock, cvar) = &*self.shared;
        let mut st = lock.lock().unwrap();
        loop {
            if let Some(err) = st.error.take() {
                return Err(err);
            }
            if st.left.len() >= n || st.eof {
                break;
            }
            st = cvar.wait(st).unwrap();
        }
        let take = n.min(st.left.len());
        let left: Vec<f32> = st.left.drain(..take).collect();
        let right: Vec<f32> = st.right.drain(..take).collect();
        cvar.notify_all();
        Ok(StereoChunk { left, right })
    }
}

impl Drop for AudioLayerWorker {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.shared;
        {
            let mut st = lock.lock().unwrap();
            st.stop = true;
        }
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One scene audio layer as the mixer sees it: a live decode worker plus the
/// remaining lead-in silence before its samples should start contributing
/// (`delay_samples = round(start_offset * target_rate)`).
pub struct ActiveAudioLayer {
    worker: AudioLayerWorker,
    delay_samples: i64,
}

impl ActiveAudioLayer {
    pub fn new(worker: AudioLayerWorker, delay_samples: i64) -> Self {
        ActiveAudioLayer { worker, delay_samples }
    }

    /// A layer that is permanently silent — used when an audio file fails to
    /// open so the scene still has a well-formed (silent) contribution
    /// rather than aborting the whole render.
    pub fn silent(target_len_samples: usize) -> Self {
        ActiveAudioLayer {
            worker: AudioLayerWorker::silent(target_len_samples),
            delay_samples: 0,
        }
    }
}

/// Mix `n` samples from every active layer: layers still in
/// their delay window contribute silence and have `delay_samples` decremented
/// by `n`; layers whose delay has elapsed contribute `delay_samples` leading
/// zeros (cleared to 0 after use) followed by up to `n - delay_samples`
/// decoded samples, blocking on each worker's condition variable as needed.
/// No layers, or all layers delayed/EOF-empty, naturally falls out as `n`
/// samples of silence.
pub fn mix_from_layers(layers: &mut [ActiveAudioLayer], n: usize) -> Result<StereoChunk> {
    let mut left = vec![0f32; n];
    let mut right = vec![0f32; n];

    for layer in layers.iter_mut() {
        if layer.delay_samples >= n as i64 {
            layer.delay_samples -= n as i64;
            continue;
        }
        let lead = layer.delay_samples.max(0) as usize;
        layer.delay_samples = 0;
        let need = n - lead;
        if need == 0 {
            continue;
        }
        let chunk = layer.worker.pull(need)?;
        let have = chunk.left.len().min(need);
        for i in 0..have {
            left[lead + i] += chunk.left[i];
            right[lead + i] += chunk.right[i];
        }
    }

    for i in 0..n {
        left[i] = left[i].clamp(-1.0, 1.0);
        right[i] = right[i].clamp(-1.0, 1.0);
    }
    Ok(StereoChunk { left, right })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_layer_mixes_to_zero() {
        let mut layers = vec![ActiveAudioLayer::silent(100)];
        let mix = mix_from_layers(&mut layers, 64).unwrap();
        assert!(mix.left.iter().all(|&s| s == 0.0));
        assert!(mix.right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn no_layers_mixes_to_silence() {
        let mut layers: Vec<ActiveAudioLayer> = Vec::new();
        let mix = mix_from_layers(&mut layers, 32).unwrap();
        assert_eq!(mix.left.len(), 32);
        assert!(mix.left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn delay_holds_off_contribution() {
        // A worker with no decode thread (silent) but a positive delay — the
        // first `n` samples must stay silent (delay not yet elapsed) and the
        // delay counter must decrement exactly by `n`.
        let mut layers = vec![ActiveAudioLayer::new(AudioLayerWorker::silent(10), 50)];
        let mix = mix_from_layers(&mut layers, 20).unwrap();
        assert!(mix.left.iter().all(|&s| s == 0.0));
        assert_eq!(layers[0].delay_samples, 30);
    }

    #[test]
    fn video_worker_falls_back_to_test_pattern_on_missing_file() {
        // The decoder opens inside the worker thread, so a bad path can't
        // fail `spawn` synchronously — it surfaces as synthetic frames.
        let worker = VideoPrefetchWorker::spawn("/nonexistent/clip.mp4".to_string(), Trim::default(), 16, 16);
        let frame = worker.next_frame().unwrap();
        assert_eq!(frame.width(), 16);
        assert_eq!(frame.height(), 16);
    }

    #[test]
    fn audio_worker_reports_silence_on_missing_file() {
        let worker = AudioLayerWorker::spawn("/nonexistent/clip.wav".to_string(), 1.0, 0.0, 0.0, 1.0);
        let chunk = worker.pull(64).unwrap();
        assert!(chunk.left.is_empty());
    }
}
