// crates/scenecraft-media/src/render.rs
//
// Render engine: turns a loaded Project into one encoded output file. Opens
// the muxer and both encoders, then for every scene spawns per-scene
// workers — one video-prefetch thread for a Video Scene, one audio-layer
// thread per configured audio layer (primary, auxiliary, and embedded
// video audio treated as just another layer) — and drains them through an
// interleaving loop that paces video-frame output against audio-sample
// output so the muxer's PTS-based interleaving stays sound. For a
// transition, boundary frames from the two neighboring scenes are blended
// by the effect processor instead.
//
// The encoder/muxer setup idiom here (`avcodec_parameters_from_context`
// FFI, the FIFO-then-zero-pad-flush audio tail) and the producer-thread
// shapes the video/audio workers (`crate::worker`) reuse both follow the
// same conventions as the rest of this codebase's encode/decode paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::{output as open_output, Pixel, Sample};
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use scenecraft_core::error::{EngineError, Result};
use scenecraft_core::project::{AudioLayer, KenBurnsParams, Project, Scene, SceneKind, Subtitle};
use scenecraft_core::ConfigLoader;

use crate::audio::{AudioDecoder, StereoChunk};
use crate::colorspace;
use crate::effects::{KenBurnsSequence, TransitionSequence};
use crate::image::{synthetic_test_pattern, ImageDecoder};
use crate::probe::FfmpegProbe;
use crate::subtitle::SubtitleBurner;
use crate::video::{Trim, VideoDecoder};
use crate::worker::{mix_from_layers, ActiveAudioLayer, AudioLayerWorker, VideoPrefetchWorker};

const AUDIO_RATE: u32 = 44100;

/// Knobs the CLI can override that the project JSON itself does not carry.
pub struct RenderOptions {
    /// TrueType font used for subtitle burn-in. No subtitles are drawn if
    /// unset or unreadable (subtitle burn failures pass the frame through unchanged).
    pub font_path: Option<PathBuf>,
    /// Cross-fade outgoing/incoming audio across a transition scene instead
    /// of defaulting to silence for its duration. Off by default — see
    /// DESIGN.md.
    pub enable_audio_transition: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            font_path: None,
            enable_audio_transition: false,
        }
    }
}

static FFMPEG_INIT: Once = Once::new();

fn ensure_ffmpeg_init() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            tracing::error!(error = %e, "ffmpeg::init failed");
        }
    });
}

/// Load and render `path`'s project JSON to its configured `output_path`.
pub fn render_from_json_file(path: impl AsRef<Path>) -> Result<()> {
    render_from_json_file_with_options(path, &RenderOptions::default())
}

pub fn render_from_json_file_with_options(path: impl AsRef<Path>, opts: &RenderOptions) -> Result<()> {
    let prober = FfmpegProbe;
    let loader = ConfigLoader::new(&prober);
    let project = loader.load_file(path)?;
    render_project(&project, opts)
}

/// Load and render a project JSON string to its configured `output_path`.
pub fn render_from_json_string(text: &str) -> Result<()> {
    render_from_json_string_with_options(text, &RenderOptions::default())
}

pub fn render_from_json_string_with_options(text: &str, opts: &RenderOptions) -> Result<()> {
    let prober = FfmpegProbe;
    let loader = ConfigLoader::new(&prober);
    let project = loader.load_str(text)?;
    render_project(&project, opts)
}

/// Parse a bitrate spec of the form `^[0-9]+[kKmM]?$` into bits per second.
/// `k`/`K` = ×1000, `m`/`M` = ×1,000,000, no suffix = literal bits/sec.
/// Anything else logs a warning and returns `0` (caller treats `0` as "let
/// the encoder pick", same as elsewhere in this crate).
fn parse_bitrate(spec: &str) -> u64 {
    let spec = spec.trim();
    let (digits, mult): (&str, u64) = if let Some(d) = spec.strip_suffix(['k', 'K']) {
        (d, 1_000)
    } else if let Some(d) = spec.strip_suffix(['m', 'M']) {
        (d, 1_000_000)
    } else {
        (spec, 1)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        tracing::warn!(spec, "unparseable bitrate, falling back to encoder default");
        return 0;
    }

    match digits.parse::<u64>() {
        Ok(n) => n * mult,
        Err(_) => {
            tracing::warn!(spec, "bitrate out of range, falling back to encoder default");
            0
        }
    }
}

fn frame_count(duration_secs: f64, fps: u32) -> u64 {
    (duration_secs * fps as f64).round() as u64
}

// ── Per-scene video content sources ─────────────────────────────────────────

enum ContentFrames {
    Image {
        cached: VideoFrame,
        seq: Option<KenBurnsSequence>,
    },
    Video {
        worker: VideoPrefetchWorker,
    },
}

impl ContentFrames {
    fn next_frame(&mut self) -> Result<VideoFrame> {
        match self {
            ContentFrames::Image { cached, seq } => match seq {
                Some(seq) => seq.fetch_next_frame(cached),
                None => Ok(cached.clone()),
            },
            ContentFrames::Video { worker } => worker.next_frame(),
        }
    }
}

/// Wraps a `ContentFrames` so the frame used to preview a transition's
/// incoming boundary is the exact same frame the scene's own rendering later
/// emits as frame zero, not a second independently decoded one.
struct CachingSource {
    inner: ContentFrames,
    replay: Option<VideoFrame>,
}

impl CachingSource {
    fn new(inner: ContentFrames) -> Self {
        CachingSource { inner, replay: None }
    }

    fn peek_first(&mut self) -> Result<VideoFrame> {
        if self.replay.is_none() {
            self.replay = Some(self.inner.next_frame()?);
        }
        Ok(self.replay.clone().unwrap())
    }

    fn next_frame(&mut self) -> Result<VideoFrame> {
        if let Some(f) = self.replay.take() {
            return Ok(f);
        }
        self.inner.next_frame()
    }
}

/// Opens a non-transition scene's video content source. Spawning a
/// `VideoPrefetchWorker` starts its decode thread immediately — calling
/// this ahead of a scene's own turn, while a *preceding* scene is still
/// rendering, is exactly how a scene's first-frame prefetch overlaps with
/// whatever scene is currently rendering.
fn open_content_source(scene: &Scene, project: &Project) -> Result<CachingSource> {
    let total_frames = frame_count(scene.duration, project.fps);
    match &scene.kind {
        SceneKind::Image { image, ken_burns, .. } => {
            let cached = match image {
                Some(cfg) => {
                    let mut dec = ImageDecoder::open(cfg.path.clone(), project.width, project.height);
                    match dec.decode_and_cache() {
                        Ok(f) => f,
                        Err(e) => {
                            tracing::warn!(path = %cfg.path, error = %e, "image decode failed, using synthetic test pattern");
                            synthetic_test_pattern(project.width, project.height, 0)
                        }
                    }
                }
                None => synthetic_test_pattern(project.width, project.height, 0),
            };
            let seq = ken_burns
                .clone()
                .map(|params: KenBurnsParams| KenBurnsSequence::start(params, project.width, project.height, total_frames));
            Ok(CachingSource::new(ContentFrames::Image { cached, seq }))
        }
        SceneKind::Video { video, .. } => {
            let trim = Trim {
                start: video.trim_start,
                end: if video.trim_end > 0.0 { Some(video.trim_end) } else { None },
            };
            let worker = VideoPrefetchWorker::spawn(video.path.clone(), trim, project.width, project.height);
            Ok(CachingSource::new(ContentFrames::Video { worker }))
        }
        SceneKind::Transition { .. } => Err(EngineError::Filter(
            "open_content_source called on a transition scene".to_string(),
        )),
    }
}

// ── Scene audio layers ──────────────────────────────────────────────────────

fn scene_layer_configs(scene: &Scene) -> (&Option<AudioLayer>, &[AudioLayer]) {
    match &scene.kind {
        SceneKind::Image { audio, audio_layers, .. } => (audio, audio_layers),
        SceneKind::Video { audio, audio_layers, .. } => (audio, audio_layers),
        SceneKind::Transition { .. } => (&None, &[]),
    }
}

/// Spawns one `AudioLayerWorker` per configured layer on this scene: the
/// primary layer, every auxiliary layer, and (if given) the scene's embedded
/// video audio treated as just another layer. Each
/// layer's `delay_samples` lead-in is computed from its `start_offset` here,
/// not inside the worker — it is render-thread-local bookkeeping, not shared
/// state, not shared state.
fn spawn_scene_audio_layers(scene: &Scene, embedded_video_path: Option<&str>) -> Vec<ActiveAudioLayer> {
    let (primary, aux) = scene_layer_configs(scene);
    let mut layers = Vec::with_capacity(aux.len() + 2);

    let mut spawn_one = |layer: &AudioLayer| {
        let delay_samples = (layer.start_offset * AUDIO_RATE as f64).round().max(0.0) as i64;
        let worker = AudioLayerWorker::spawn(
            layer.path.clone(),
            layer.volume,
            layer.fade_in,
            layer.fade_out,
            scene.duration,
        );
        layers.push(ActiveAudioLayer::new(worker, delay_samples));
    };

    if let Some(layer) = primary {
        spawn_one(layer);
    }
    for layer in aux {
        spawn_one(layer);
    }
    if let Some(path) = embedded_video_path {
        let embedded = AudioLayer {
            path: path.to_string(),
            ..AudioLayer::default()
        };
        spawn_one(&embedded);
    }
    layers
}

fn scene_embedded_audio_path(scene: &Scene) -> Option<&str> {
    match &scene.kind {
        SceneKind::Video { video, use_embedded_audio, .. } if *use_embedded_audio => Some(video.path.as_str()),
        _ => None,
    }
}

fn scene_subtitle(scene: &Scene) -> Option<&Subtitle> {
    match &scene.kind {
        SceneKind::Image { subtitle, .. } | SceneKind::Video { subtitle, .. } => subtitle.as_ref(),
        SceneKind::Transition { .. } => None,
    }
}

// ── Transition audio crossfade (opt-in) ─────────────────────────────────────

/// Bulk-decodes `layers` (plus optional embedded video audio) starting
/// `seek_secs` into each source, producing exactly `n` samples (short or
/// zero-padded). Used only for the brief transition audio crossfade window,
/// where a one-shot blocking decode is simpler than standing up per-layer
/// workers for a handful of frames.
fn decode_layers_window(
    primary: &Option<AudioLayer>,
    aux: &[AudioLayer],
    embedded_video_path: Option<&str>,
    seek_secs: f64,
    n: usize,
) -> StereoChunk {
    let mut mix = StereoChunk {
        left: vec![0.0; n],
        right: vec![0.0; n],
    };

    let mut add_layer = |layer: &AudioLayer| {
        let mut dec = match AudioDecoder::open(layer.path.clone()) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(path = %layer.path, error = %e, "transition audio layer decode failed, substituting silence");
                return;
            }
        };
        if seek_secs > 0.0 {
            let _ = dec.seek(seek_secs);
        }
        dec.apply_volume_effect(layer.volume, layer.fade_in, layer.fade_out, seek_secs + n as f64 / AUDIO_RATE as f64);

        let mut filled = 0usize;
        while filled < n {
            match dec.decode_frame() {
                Ok(Some(chunk)) if !chunk.is_empty() => {
                    let take = chunk.len().min(n - filled);
                    for i in 0..take {
                        mix.left[filled + i] += chunk.left[i];
                        mix.right[filled + i] += chunk.right[i];
                    }
                    filled += take;
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    };

    if let Some(layer) = primary {
        add_layer(layer);
    }
    for layer in aux {
        add_layer(layer);
    }
    if let Some(path) = embedded_video_path {
        let embedded = AudioLayer {
            path: path.to_string(),
            ..AudioLayer::default()
        };
        add_layer(&embedded);
    }

    for i in 0..n {
        mix.left[i] = mix.left[i].clamp(-1.0, 1.0);
        mix.right[i] = mix.right[i].clamp(-1.0, 1.0);
    }
    mix
}

/// Cross-fades the outgoing scene's tail against the incoming scene's head
/// across the transition window:
/// `w_from = 1 - t`, `w_to = t`, summed after each side's own base volumes
/// (already applied inside `decode_layers_window`) and clamped.
fn transition_crossfade_audio(from_scene: &Scene, to_scene: &Scene, transition_duration: f64) -> StereoChunk {
    let n = (transition_duration * AUDIO_RATE as f64).round().max(0.0) as usize;
    let (from_primary, from_aux) = scene_layer_configs(from_scene);
    let (to_primary, to_aux) = scene_layer_configs(to_scene);

    let from_seek = (from_scene.duration - transition_duration).max(0.0);
    let from_chunk = decode_layers_window(
        from_primary,
        from_aux,
        scene_embedded_audio_path(from_scene),
        from_seek,
        n,
    );
    let to_chunk = decode_layers_window(to_primary, to_aux, scene_embedded_audio_path(to_scene), 0.0, n);

    let mut left = vec![0f32; n];
    let mut right = vec![0f32; n];
    for i in 0..n {
        let t = if n > 1 { i as f32 / (n - 1) as f32 } else { 1.0 };
        let w_from = 1.0 - t;
        let w_to = t;
        left[i] = (from_chunk.left[i] * w_from + to_chunk.left[i] * w_to).clamp(-1.0, 1.0);
        right[i] = (from_chunk.right[i] * w_from + to_chunk.right[i] * w_to).clamp(-1.0, 1.0);
    }
    StereoChunk { left, right }
}

// ── Audio FIFO (matches encode.rs's AudioFifo; operates on plain f32s since
//    the mixer already produces deinterleaved StereoChunks rather than
//    ffmpeg AudioFrames) ───────────────────────────────────────────────────

struct AudioFifo {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl AudioFifo {
    fn new() -> Self {
        AudioFifo { left: Vec::new(), right: Vec::new() }
    }

    fn push(&mut self, chunk: &StereoChunk) {
        self.left.extend_from_slice(&chunk.left);
        self.right.extend_from_slice(&chunk.right);
    }

    fn len(&self) -> usize {
        self.left.len()
    }

    fn pop_frame(&mut self, n: usize, sample_idx: i64) -> AudioFrame {
        let available = self.left.len().min(n);
        let mut frame = AudioFrame::new(Sample::F32(SampleType::Planar), n, ChannelLayoutMask::STEREO);
        frame.set_rate(AUDIO_RATE);
        frame.set_pts(Some(sample_idx));

        unsafe {
            let ldst = std::slice::from_raw_parts_mut(frame.data_mut(0).as_mut_ptr() as *mut f32, n);
            ldst[..available].copy_from_slice(&self.left[..available]);
            if available < n {
                ldst[available..].fill(0.0);
            }
            let rdst = std::slice::from_raw_parts_mut(frame.data_mut(1).as_mut_ptr() as *mut f32, n);
            rdst[..available].copy_from_slice(&self.right[..available]);
            if available < n {
                rdst[available..].fill(0.0);
            }
        }
        self.left.drain(..available);
        self.right.drain(..available);
        frame
    }
}

// ── Encoder state ──────────────────────────────────────────────────────────

struct AudioEncState {
    encoder: ffmpeg::encoder::Audio,
    out_sample_idx: i64,
    frame_size: usize,
    fifo: AudioFifo,
    audio_tb: Rational,
    ost_audio_tb: Rational,
    stream_index: usize,
}

impl AudioEncState {
    fn push_and_drain(&mut self, octx: &mut ffmpeg::format::context::Output, chunk: &StereoChunk) -> Result<()> {
        self.fifo.push(chunk);
        self.drain(octx, false)
    }

    fn drain(&mut self, octx: &mut ffmpeg::format::context::Output, flush: bool) -> Result<()> {
        while self.fifo.len() >= self.frame_size || (flush && self.fifo.len() > 0) {
            let frame = self.fifo.pop_frame(self.frame_size, self.out_sample_idx);
            self.out_sample_idx += self.frame_size as i64;
            self.encoder
                .send_frame(&frame)
                .map_err(|e| EngineError::Encode(format!("send audio frame: {e}")))?;
            self.drain_packets(octx)?;
        }
        Ok(())
    }

    fn drain_packets(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<()> {
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(self.stream_index);
            pkt.rescale_ts(self.audio_tb, self.ost_audio_tb);
            pkt.write_interleaved(octx)
                .map_err(|e| EngineError::Encode(format!("write audio packet: {e}")))?;
        }
        Ok(())
    }

    fn flush(&mut self, octx: &mut ffmpeg::format::context::Output) -> Result<()> {
        self.encoder
            .send_eof()
            .map_err(|e| EngineError::Encode(format!("flush audio encoder: {e}")))?;
        self.drain_packets(octx)
    }
}

/// Builds the audio encoder+stream. Returns `None` (rather than an error) on
/// failure — the render continues without audio, emitting a silent video,
/// rather than aborting.
fn try_setup_audio(octx: &mut ffmpeg::format::context::Output, project: &Project) -> Option<AudioEncState> {
    (|| -> Result<AudioEncState> {
        let audio_tb = Rational::new(1, AUDIO_RATE as i32);
        let audio_codec_id = match project.global_effects.audio_encoding.codec.as_str() {
            "aac" => CodecId::AAC,
            other => {
                tracing::warn!(codec = other, "unrecognized audio codec, falling back to AAC");
                CodecId::AAC
            }
        };
        let audio_codec = encoder::find(audio_codec_id)
            .ok_or_else(|| EngineError::Encode("audio encoder not found".to_string()))?;

        let stream_index = octx.nb_streams() as usize;
        let mut ost_audio = octx
            .add_stream(audio_codec)
            .map_err(|e| EngineError::Encode(format!("add audio stream: {e}")))?;
        ost_audio.set_time_base(audio_tb);

        let audio_enc_ctx = codec::context::Context::new_with_codec(audio_codec);
        let mut audio_enc = audio_enc_ctx
            .encoder()
            .audio()
            .map_err(|e| EngineError::Encode(format!("audio encoder context: {e}")))?;
        audio_enc.set_rate(AUDIO_RATE as i32);
        audio_enc.set_ch_layout(ChannelLayout::STEREO);
        audio_enc.set_format(Sample::F32(SampleType::Planar));
        audio_enc.set_bit_rate(parse_bitrate(&project.global_effects.audio_encoding.bitrate) as usize);

        let audio_encoder = audio_enc
            .open_as_with(audio_codec, ffmpeg::Dictionary::new())
            .map_err(|e| EngineError::Encode(format!("open audio encoder: {e}")))?;
        let audio_frame_size = (audio_encoder.frame_size() as usize).max(1024);
        let ost_audio_tb = octx.stream(stream_index).unwrap().time_base();

        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(stream_index)).codecpar,
                audio_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                return Err(EngineError::Encode(format!("avcodec_parameters_from_context (audio): {ret}")));
            }
        }

        Ok(AudioEncState {
            encoder: audio_encoder,
            out_sample_idx: 0,
            frame_size: audio_frame_size,
            fifo: AudioFifo::new(),
            audio_tb,
            ost_audio_tb,
            stream_index,
        })
    })()
    .map_err(|e| {
        tracing::warn!(error = %e, "audio encoder setup failed, rendering without audio");
        e
    })
    .ok()
}

// ── Interleaving loop (the hot loop) ────────────────────────────────────────

/// Shared mutable render-thread state threaded through every scene's
/// interleaving loop: the running video/audio counters and progress
/// reporting. Everything here is touched only by the render thread: the
/// encoder, muxer, and FIFO are render-thread-only.
struct EngineCounters {
    out_frame_idx: i64,
    frames_emitted: u64,
    last_progress_pct: u64,
    total_project_frames: u64,
}

/// Produces `total_video_frames` output video frames for one scene by
/// comparing `video_time = frame_count/fps` against
/// `audio_time = audio_sample_count/target_rate` at each step:
/// whichever is behind produces its next unit. Video frames come from
/// `video_next`; audio comes from the scene's `audio_layers` via the mixer,
/// in chunks of exactly `audio.frame_size` samples, pushed through the FIFO.
fn run_interleaved_scene(
    total_video_frames: u64,
    mut video_next: impl FnMut() -> Result<VideoFrame>,
    mut audio_layers: Vec<ActiveAudioLayer>,
    subtitle: Option<&Subtitle>,
    subtitle_burner: &SubtitleBurner,
    project: &Project,
    octx: &mut ffmpeg::format::context::Output,
    video_encoder: &mut ffmpeg::encoder::video::Video,
    frame_tb: Rational,
    ost_video_tb: Rational,
    audio: Option<&mut AudioEncState>,
    counters: &mut EngineCounters,
) -> Result<Option<VideoFrame>> {
    let fps = project.fps.max(1) as f64;
    let mut audio = audio;
    let mut video_done: u64 = 0;
    let mut last_frame: Option<VideoFrame> = None;

    while video_done < total_video_frames {
        let video_time = counters.out_frame_idx as f64 / fps;
        let audio_time = match &audio {
            Some(a) => a.out_sample_idx as f64 / AUDIO_RATE as f64,
            None => f64::INFINITY,
        };

        if video_time <= audio_time {
            let mut frame = video_next()?;
            if let Some(sub) = subtitle {
                subtitle_burner.burn(&mut frame, sub, project.width, project.height);
            }
            frame.set_pts(Some(counters.out_frame_idx));
            colorspace::stamp(&mut frame, project.height);
            encode_video_frame(octx, video_encoder, &mut frame, frame_tb, ost_video_tb)?;
            counters.out_frame_idx += 1;
            video_done += 1;
            counters.frames_emitted += 1;
            report_progress(counters.frames_emitted, counters.total_project_frames, &mut counters.last_progress_pct);
            last_frame = Some(frame);
        } else if let Some(a) = audio.as_deref_mut() {
            let n = a.frame_size;
            let chunk = mix_from_layers(&mut audio_layers, n)?;
            a.push_and_drain(octx, &chunk)?;
        }
    }

    Ok(last_frame)
}

// ── Main render pass ────────────────────────────────────────────────────────

fn render_project(project: &Project, opts: &RenderOptions) -> Result<()> {
    ensure_ffmpeg_init();

    if project.scenes.is_empty() {
        return Err(EngineError::ConfigValidation("project has no scenes".to_string()));
    }

    let mut octx = open_output(&project.output_path).map_err(|e| {
        EngineError::Encode(format!("open output '{}': {e}", project.output_path))
    })?;

    let fps = project.fps.max(1);
    let frame_tb = Rational::new(1, fps as i32);

    // ── Video encoder ────────────────────────────────────────────────────
    let video_codec_id = match project.global_effects.video_encoding.codec.as_str() {
        "libx264" | "h264" => CodecId::H264,
        "libx265" | "hevc" => CodecId::HEVC,
        other => {
            tracing::warn!(codec = other, "unrecognized video codec, falling back to H.264");
            CodecId::H264
        }
    };
    let video_codec = encoder::find(video_codec_id)
        .ok_or_else(|| EngineError::Encode("video encoder not found".to_string()))?;

    let mut ost_video = octx
        .add_stream(video_codec)
        .map_err(|e| EngineError::Encode(format!("add video stream: {e}")))?;
    ost_video.set_time_base(frame_tb);

    let video_enc_ctx = codec::context::Context::new_with_codec(video_codec);
    let mut video_enc = video_enc_ctx
        .encoder()
        .video()
        .map_err(|e| EngineError::Encode(format!("video encoder context: {e}")))?;

    video_enc.set_width(project.width);
    video_enc.set_height(project.height);
    video_enc.set_format(Pixel::YUV420P);
    video_enc.set_time_base(frame_tb);
    video_enc.set_frame_rate(Some(Rational::new(fps as i32, 1)));

    let video_bitrate = parse_bitrate(&project.global_effects.video_encoding.bitrate);
    video_enc.set_bit_rate(video_bitrate as usize);

    // Use as many threads as the machine offers, up to 8 — passed as a
    // private codec option since this ffmpeg-the-third version has no safe
    // `set_threading` setter.
    let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8);

    let mut opts_dict = ffmpeg::Dictionary::new();
    opts_dict.set("preset", &project.global_effects.video_encoding.preset);
    opts_dict.set("crf", &project.global_effects.video_encoding.crf.to_string());
    opts_dict.set("threads", &threads.to_string());

    let mut video_encoder = video_enc
        .open_as_with(video_codec, opts_dict)
        .map_err(|e| EngineError::Encode(format!("open video encoder: {e}")))?;
    video_encoder.set_aspect_ratio(Rational::new(1, 1));

    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(0)).codecpar,
            video_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        if ret < 0 {
            return Err(EngineError::Encode(format!("avcodec_parameters_from_context (video): {ret}")));
        }
    }

    // ── Audio encoder (best-effort) ──────────────────────────────────────
    let mut audio_state = try_setup_audio(&mut octx, project);

    octx.write_header()
        .map_err(|e| EngineError::Encode(format!("write header: {e}")))?;

    let subtitle_burner = SubtitleBurner::open(opts.font_path.as_deref());

    // ── Scene loop ───────────────────────────────────────────────────────
    let total_project_frames: u64 = project.scenes.iter().map(|s| frame_count(s.duration, fps)).sum::<u64>().max(1);
    let ost_video_tb = octx.stream(0).unwrap().time_base();

    let mut counters = EngineCounters {
        out_frame_idx: 0,
        frames_emitted: 0,
        last_progress_pct: 0,
        total_project_frames,
    };

    let mut last_content_frame: Option<VideoFrame> = None;
    // Scenes whose content source has already been opened ahead of its own
    // turn: either because a preceding transition peeked its first frame, or
    // because the scene two positions back kicked off its prefetch while
    // rendering. Indexed by
    // scene position in `project.scenes`.
    let mut prefetched: HashMap<usize, CachingSource> = HashMap::new();

    for (i, scene) in project.scenes.iter().enumerate() {
        match &scene.kind {
            SceneKind::Transition { kind } => {
                let total = frame_count(scene.duration, fps);
                let from = last_content_frame
                    .clone()
                    .unwrap_or_else(|| synthetic_test_pattern(project.width, project.height, 0));

                let next_idx = i + 1;
                let mut to_source = match prefetched.remove(&next_idx) {
                    Some(src) => src,
                    None => {
                        let next_scene = project.scenes.get(next_idx).ok_or_else(|| {
                            EngineError::ConfigValidation("transition scene has no following scene".to_string())
                        })?;
                        open_content_source(next_scene, project)?
                    }
                };
                let to = to_source.peek_first()?;
                prefetched.insert(next_idx, to_source);

                let mut seq = TransitionSequence::start(*kind, project.width, project.height, total)?;
                for _ in 0..total {
                    let mut frame = seq.fetch_next_frame(&from, &to)?;
                    frame.set_pts(Some(counters.out_frame_idx));
                    colorspace::stamp(&mut frame, project.height);
                    encode_video_frame(&mut octx, &mut video_encoder, &mut frame, frame_tb, ost_video_tb)?;
                    counters.out_frame_idx += 1;
                    counters.frames_emitted += 1;
                    report_progress(counters.frames_emitted, counters.total_project_frames, &mut counters.last_progress_pct);
                }

                let audio_chunk = if opts.enable_audio_transition {
                    let from_scene = &project.scenes[i - 1];
                    let to_scene = project.scenes.get(next_idx);
                    match to_scene {
                        Some(to_scene) => transition_crossfade_audio(from_scene, to_scene, scene.duration),
                        None => StereoChunk {
                            left: vec![0.0; (scene.duration * AUDIO_RATE as f64).round().max(0.0) as usize],
                            right: vec![0.0; (scene.duration * AUDIO_RATE as f64).round().max(0.0) as usize],
                        },
                    }
                } else {
                    let n = (scene.duration * AUDIO_RATE as f64).round().max(0.0) as usize;
                    StereoChunk {
                        left: vec![0.0; n],
                        right: vec![0.0; n],
                    }
                };
                if let Some(audio) = audio_state.as_mut() {
                    audio.push_and_drain(&mut octx, &audio_chunk)?;
                }
            }
            SceneKind::Image { .. } | SceneKind::Video { .. } => {
                let mut source = match prefetched.remove(&i) {
                    Some(src) => src,
                    None => open_content_source(scene, project)?,
                };

                // Kick off the scene-after-next's content source now, while
                // this scene is about to render — if it is reachable through
                // exactly one transition, its worker thread(s) start decoding
                // concurrently with this scene's own interleaving loop.
                if let Some(Scene { kind: SceneKind::Transition { .. }, .. }) = project.scenes.get(i + 1) {
                    if let Some(lookahead_scene) = project.scenes.get(i + 2) {
                        prefetched
                            .entry(i + 2)
                            .or_insert_with(|| open_content_source(lookahead_scene, project).unwrap_or_else(|e| {
                                tracing::warn!(error = %e, "lookahead prefetch failed, will retry on arrival");
                                CachingSource::new(ContentFrames::Image {
                                    cached: synthetic_test_pattern(project.width, project.height, 0),
                                    seq: None,
                                })
                            }));
                    }
                }

                let embedded_path = scene_embedded_audio_path(scene);
                let audio_layers = spawn_scene_audio_layers(scene, embedded_path);
                let subtitle = scene_subtitle(scene);
                let total = frame_count(scene.duration, fps);

                let last = run_interleaved_scene(
                    total,
                    || source.next_frame(),
                    audio_layers,
                    subtitle,
                    &subtitle_burner,
                    project,
                    &mut octx,
                    &mut video_encoder,
                    frame_tb,
                    ost_video_tb,
                    audio_state.as_mut(),
                    &mut counters,
                )?;
                last_content_frame = last;
                // `source` (and its video-prefetch worker, if any) and every
                // `ActiveAudioLayer` in `audio_layers` are dropped here,
                // cancelling and joining their threads — scene-scoped worker
                // lifetimes, scoped to one scene.
            }
        }
    }

    // ── Teardown ─────────────────────────────────────────────────────────
    video_encoder
        .send_eof()
        .map_err(|e| EngineError::Encode(format!("flush video encoder: {e}")))?;
    let mut pkt = Packet::empty();
    while video_encoder.receive_packet(&mut pkt).is_ok() {
        pkt.set_stream(0);
        pkt.rescale_ts(frame_tb, ost_video_tb);
        pkt.write_interleaved(&mut octx)
            .map_err(|e| EngineError::Encode(format!("write flush video packet: {e}")))?;
    }

    if let Some(mut audio) = audio_state.take() {
        audio.drain(&mut octx, true)?;
        audio.flush(&mut octx)?;
    }

    octx.write_trailer()
        .map_err(|e| EngineError::Encode(format!("write trailer: {e}")))?;

    Ok(())
}

fn encode_video_frame(
    octx: &mut ffmpeg::format::context::Output,
    video_encoder: &mut ffmpeg::encoder::video::Video,
    frame: &mut VideoFrame,
    frame_tb: Rational,
    ost_video_tb: Rational,
) -> Result<()> {
    video_encoder
        .send_frame(frame)
        .map_err(|e| EngineError::Encode(format!("send video frame: {e}")))?;
    let mut pkt = Packet::empty();
    while video_encoder.receive_packet(&mut pkt).is_ok() {
        pkt.set_stream(0);
        pkt.rescale_ts(frame_tb, ost_video_tb);
        pkt.write_interleaved(octx)
            .map_err(|e| EngineError::Encode(format!("write video packet: {e}")))?;
    }
    Ok(())
}

/// Log progress at each strictly increasing integer percent, matching the
/// `round(100 * frame_count / total_project_frames)` rule.
fn report_progress(frames_emitted: u64, total_project_frames: u64, last_pct: &mut u64) {
    let pct = ((frames_emitted as f64 / total_project_frames as f64) * 100.0).round() as u64;
    if pct > *last_pct {
        *last_pct = pct;
        tracing::info!(percent = pct, "render progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_suffixes() {
        assert_eq!(parse_bitrate("5000k"), 5_000_000);
        assert_eq!(parse_bitrate("2M"), 2_000_000);
        assert_eq!(parse_bitrate("128000"), 128_000);
    }

    #[test]
    fn bitrate_garbage_warns_and_zeroes() {
        assert_eq!(parse_bitrate("fast"), 0);
        assert_eq!(parse_bitrate(""), 0);
    }

    #[test]
    fn frame_count_rounds() {
        assert_eq!(frame_count(1.0, 30), 30);
        assert_eq!(frame_count(0.5, 30), 15);
        assert_eq!(frame_count(0.0, 30), 0);
    }

    #[test]
    fn empty_project_errors() {
        let project = Project::default();
        assert!(render_project(&project, &RenderOptions::default()).is_err());
    }
}
