//! JSON project loading: parse, lower into the domain model, validate, and
//! resolve per-scene durations.
//!
//! Probing (asking a real media file how long it is) is the one thing this
//! crate cannot do itself — it carries no FFmpeg dependency — so callers
//! supply a [`DurationProbe`] implementation (`scenecraft-media` provides the
//! real one; tests can supply a fake).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::project::*;
use crate::transitions::TransitionKind;

/// Asks whether a given media file has a probe-able duration.
///
/// Returns `None` when the file can't be opened or has no relevant stream —
/// a failed probe is not fatal, it just removes one signal from the
/// duration-resolution rule.
pub trait DurationProbe: Send + Sync {
    fn probe_audio_duration(&self, path: &str) -> Option<f64>;
    fn probe_video_duration(&self, path: &str) -> Option<f64>;
}

/// A prober that never finds a duration. Useful for tests and for configs
/// where every scene declares an explicit `duration`.
pub struct NullProbe;

impl DurationProbe for NullProbe {
    fn probe_audio_duration(&self, _path: &str) -> Option<f64> {
        None
    }
    fn probe_video_duration(&self, _path: &str) -> Option<f64> {
        None
    }
}

const FALLBACK_DURATION_SECS: f64 = 5.0;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum ProbeKind {
    Audio,
    Video,
}

/// Parses, validates and lowers a project JSON document into a [`Project`].
///
/// Holds a per-path duration-probe cache for the lifetime of one `load_*`
/// call, so a file referenced by several scenes (or a primary audio config
/// and an audio layer) is only probed once.
pub struct ConfigLoader<'a> {
    prober: &'a dyn DurationProbe,
    cache: Mutex<HashMap<(ProbeKind, PathBuf), Option<f64>>>,
}

impl<'a> ConfigLoader<'a> {
    pub fn new(prober: &'a dyn DurationProbe) -> Self {
        ConfigLoader {
            prober,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Project> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&text)
    }

    pub fn load_str(&self, text: &str) -> Result<Project> {
        let raw: RawProjectConfig = serde_json::from_str(text)?;
        let project = self.lower(raw)?;
        self.validate(&project)?;
        Ok(project)
    }

    fn probe_cached(&self, kind: ProbeKind, path: &str) -> Option<f64> {
        let key = (kind, normalize_path(path));
        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            return *hit;
        }
        let result = match kind {
            ProbeKind::Audio => self.prober.probe_audio_duration(path),
            ProbeKind::Video => self.prober.probe_video_duration(path),
        };
        if result.is_none() {
            warn!(path, "probe did not yield a duration");
        }
        self.cache.lock().unwrap().insert(key, result);
        result
    }

    fn lower(&self, raw: RawProjectConfig) -> Result<Project> {
        let project_info = raw.project.unwrap_or_default();
        let global_effects = raw
            .global_effects
            .map(RawGlobalEffects::lower)
            .unwrap_or_default();

        let mut scenes = Vec::with_capacity(raw.scenes.len());
        for (i, raw_scene) in raw.scenes.into_iter().enumerate() {
            scenes.push(self.lower_scene(i as u32 + 1, raw_scene)?);
        }

        Ok(Project {
            name: project_info.name.unwrap_or_default(),
            output_path: project_info.output_path.unwrap_or_default(),
            width: project_info.width.unwrap_or(1920),
            height: project_info.height.unwrap_or(1080),
            fps: project_info.fps.unwrap_or(30),
            background_color: project_info
                .background_color
                .unwrap_or_else(|| "#000000".to_string()),
            scenes,
            global_effects,
        })
    }

    fn lower_scene(&self, id: u32, raw: RawScene) -> Result<Scene> {
        let resources = raw.resources.unwrap_or_default();
        let effects = raw.effects.unwrap_or_default();

        let kind = match raw.type_.as_str() {
            "image_scene" => {
                let audio_layers = self.lower_audio_layers(&resources, &effects);
                SceneKind::Image {
                    image: resources.image.map(RawImageConfig::lower),
                    audio: audio_layers.first().cloned(),
                    audio_layers: audio_layers.into_iter().skip(1).collect(),
                    ken_burns: effects.ken_burns.and_then(RawKenBurns::lower),
                    subtitle: effects.subtitle.map(RawSubtitle::lower),
                }
            }
            "video_scene" => {
                let raw_video = resources.video.clone().unwrap_or_default();
                let audio_layers = self.lower_audio_layers(&resources, &effects);
                SceneKind::Video {
                    video: raw_video.lower(),
                    audio: audio_layers.first().cloned(),
                    audio_layers: audio_layers.into_iter().skip(1).collect(),
                    use_embedded_audio: resources
                        .video
                        .as_ref()
                        .and_then(|v| v.use_audio)
                        .unwrap_or(true),
                    subtitle: effects.subtitle.map(RawSubtitle::lower),
                }
            }
            "transition" => {
                let kind = match raw.transition_type.as_deref() {
                    Some("crossfade") | None => TransitionKind::Crossfade,
                    Some("wipe") => TransitionKind::Wipe,
                    Some("slide") => TransitionKind::Slide,
                    Some(other) => {
                        return Err(EngineError::ConfigValidation(format!(
                            "scene {id}: unknown transition_type {other:?}"
                        )))
                    }
                };
                SceneKind::Transition { kind }
            }
            other => {
                return Err(EngineError::ConfigValidation(format!(
                    "scene {id}: unknown scene type {other:?}"
                )))
            }
        };

        let duration = self.resolve_duration(raw.duration, &kind)?;

        Ok(Scene {
            id,
            duration,
            kind,
        })
    }

    /// Primary `audio` config (if any) followed by every entry of
    /// `audio_layers`, with the scene's `volume_mix` fade envelope applied to
    /// all of them — the wire schema keeps fade-in/out as a per-scene effect
    /// while the domain `AudioLayer` carries it per layer instead.
    fn lower_audio_layers(
        &self,
        resources: &RawResources,
        effects: &RawEffectsConfig,
    ) -> Vec<AudioLayer> {
        let (fade_in, fade_out) = effects
            .volume_mix
            .as_ref()
            .filter(|vm| vm.enabled.unwrap_or(false))
            .map(|vm| (vm.fade_in.unwrap_or(0.0), vm.fade_out.unwrap_or(0.0)))
            .unwrap_or((0.0, 0.0));

        let mut layers = Vec::new();
        if let Some(primary) = &resources.audio {
            layers.push(primary.clone().lower(fade_in, fade_out));
        }
        for extra in resources.audio_layers.iter().flatten() {
            layers.push(extra.clone().lower(fade_in, fade_out));
        }
        layers
    }

    /// Duration resolution rule: explicit > longest probe-able audio
    /// layer > video container duration > 5s fallback.
    fn resolve_duration(&self, explicit: Option<f64>, kind: &SceneKind) -> Result<f64> {
        if let Some(d) = explicit {
            if d < 0.0 {
                return Err(EngineError::ConfigValidation(format!(
                    "scene duration must be >= 0, got {d}"
                )));
            }
            return Ok(d);
        }

        let audio_layers: &[AudioLayer] = match kind {
            SceneKind::Image {
                audio, audio_layers, ..
            }
            | SceneKind::Video {
                audio, audio_layers, ..
            } => {
                return Ok(self.resolve_from_audio_then_video(audio, audio_layers, kind));
            }
            SceneKind::Transition { .. } => &[],
        };
        let _ = audio_layers;
        Ok(FALLBACK_DURATION_SECS)
    }

    fn resolve_from_audio_then_video(
        &self,
        primary: &Option<AudioLayer>,
        extra: &[AudioLayer],
        kind: &SceneKind,
    ) -> f64 {
        let longest_audio = primary
            .iter()
            .chain(extra.iter())
            .filter_map(|layer| self.probe_cached(ProbeKind::Audio, &layer.path))
            .fold(None::<f64>, |acc, d| Some(acc.map_or(d, |m| m.max(d))));

        if let Some(d) = longest_audio {
            return d;
        }

        if let SceneKind::Video { video, .. } = kind {
            if let Some(d) = self.probe_cached(ProbeKind::Video, &video.path) {
                return d;
            }
        }

        FALLBACK_DURATION_SECS
    }

    fn validate(&self, project: &Project) -> Result<()> {
        if project.width == 0 || project.height == 0 || project.fps == 0 {
            return Err(EngineError::ConfigValidation(
                "project width, height and fps must all be > 0".to_string(),
            ));
        }

        for (i, scene) in project.scenes.iter().enumerate() {
            if !matches!(scene.kind, SceneKind::Transition { .. }) {
                continue;
            }
            let prev_ok = i > 0 && project.scenes[i - 1].is_content();
            let next_ok = i + 1 < project.scenes.len() && project.scenes[i + 1].is_content();
            if !prev_ok || !next_ok {
                return Err(EngineError::ConfigValidation(format!(
                    "scene {} (transition) must be sandwiched between two non-transition scenes",
                    scene.id
                )));
            }
        }

        Ok(())
    }
}

fn normalize_path(path: &str) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path))
}

// ── Wire types ─────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawProjectConfig {
    project: Option<RawProjectInfo>,
    #[serde(default)]
    scenes: Vec<RawScene>,
    global_effects: Option<RawGlobalEffects>,
}

#[derive(Deserialize, Default)]
struct RawProjectInfo {
    name: Option<String>,
    output_path: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    background_color: Option<String>,
}

#[derive(Deserialize)]
struct RawScene {
    #[serde(rename = "type")]
    type_: String,
    duration: Option<f64>,
    resources: Option<RawResources>,
    effects: Option<RawEffectsConfig>,
    transition_type: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawResources {
    image: Option<RawImageConfig>,
    video: Option<RawVideoConfig>,
    audio: Option<RawAudioConfig>,
    audio_layers: Option<Vec<RawAudioConfig>>,
}

#[derive(Deserialize, Clone)]
struct RawImageConfig {
    path: String,
    x: Option<i32>,
    y: Option<i32>,
    scale: Option<f64>,
    rotation: Option<f64>,
}

impl RawImageConfig {
    fn lower(self) -> ImageConfig {
        ImageConfig {
            path: self.path,
            x: self.x.unwrap_or(0),
            y: self.y.unwrap_or(0),
            scale: self.scale.unwrap_or(1.0),
            rotation: self.rotation.unwrap_or(0.0),
        }
    }
}

#[derive(Deserialize, Clone, Default)]
struct RawVideoConfig {
    path: Option<String>,
    trim_start: Option<f64>,
    trim_end: Option<f64>,
    use_audio: Option<bool>,
}

impl RawVideoConfig {
    fn lower(self) -> VideoConfig {
        VideoConfig {
            path: self.path.unwrap_or_default(),
            trim_start: self.trim_start.unwrap_or(0.0),
            trim_end: self.trim_end.unwrap_or(-1.0),
            use_audio: self.use_audio.unwrap_or(true),
        }
    }
}

#[derive(Deserialize, Clone)]
struct RawAudioConfig {
    path: String,
    volume: Option<f64>,
    start_offset: Option<f64>,
}

impl RawAudioConfig {
    fn lower(self, fade_in: f64, fade_out: f64) -> AudioLayer {
        AudioLayer {
            path: self.path,
            volume: self.volume.unwrap_or(1.0),
            start_offset: self.start_offset.unwrap_or(0.0),
            fade_in,
            fade_out,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawEffectsConfig {
    ken_burns: Option<RawKenBurns>,
    volume_mix: Option<RawVolumeMix>,
    subtitle: Option<RawSubtitle>,
}

#[derive(Deserialize)]
struct RawKenBurns {
    enabled: Option<bool>,
    preset: Option<String>,
    start_scale: Option<f64>,
    end_scale: Option<f64>,
    start_x: Option<i32>,
    start_y: Option<i32>,
    end_x: Option<i32>,
    end_y: Option<i32>,
}

impl RawKenBurns {
    fn lower(self) -> Option<KenBurnsParams> {
        if !self.enabled.unwrap_or(false) {
            return None;
        }
        let preset = match self.preset.as_deref() {
            Some("zoom_in") | None => KenBurnsPreset::ZoomIn,
            Some("zoom_out") => KenBurnsPreset::ZoomOut,
            Some("pan_left") => KenBurnsPreset::PanLeft,
            Some("pan_right") => KenBurnsPreset::PanRight,
            Some("custom") => KenBurnsPreset::Custom,
            Some(_) => KenBurnsPreset::ZoomIn,
        };
        Some(KenBurnsParams {
            preset,
            start_scale: self.start_scale.unwrap_or(1.0),
            end_scale: self.end_scale.unwrap_or(1.0),
            start_x: self.start_x.unwrap_or(0),
            start_y: self.start_y.unwrap_or(0),
            end_x: self.end_x.unwrap_or(0),
            end_y: self.end_y.unwrap_or(0),
        })
    }
}

#[derive(Deserialize)]
struct RawVolumeMix {
    enabled: Option<bool>,
    fade_in: Option<f64>,
    fade_out: Option<f64>,
}

#[derive(Deserialize)]
struct RawSubtitle {
    text: Option<String>,
    font_size: Option<u32>,
    font_color: Option<String>,
    bg_color: Option<String>,
    margin_bottom: Option<u32>,
}

impl RawSubtitle {
    fn lower(self) -> Subtitle {
        Subtitle {
            text: self.text.unwrap_or_default(),
            font_size: self.font_size.unwrap_or(48),
            font_color: self.font_color.unwrap_or_else(|| "white".to_string()),
            bg_color: self.bg_color.unwrap_or_else(|| "black@0.5".to_string()),
            margin_bottom: self.margin_bottom.unwrap_or(60),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawGlobalEffects {
    audio_normalization: Option<RawAudioNormalization>,
    video_encoding: Option<RawVideoEncoding>,
    audio_encoding: Option<RawAudioEncoding>,
}

impl RawGlobalEffects {
    fn lower(self) -> GlobalEffects {
        GlobalEffects {
            audio_normalization: self
                .audio_normalization
                .map(|a| AudioNormalization {
                    enabled: a.enabled.unwrap_or(false),
                    target_level: a.target_level.unwrap_or(-16.0),
                })
                .unwrap_or_default(),
            video_encoding: self
                .video_encoding
                .map(|v| VideoEncoding {
                    codec: v.codec.unwrap_or_else(|| "libx264".to_string()),
                    bitrate: v.bitrate.unwrap_or_else(|| "5000k".to_string()),
                    preset: v.preset.unwrap_or_else(|| "medium".to_string()),
                    crf: v.crf.unwrap_or(23),
                })
                .unwrap_or_default(),
            audio_encoding: self
                .audio_encoding
                .map(|a| AudioEncoding {
                    codec: a.codec.unwrap_or_else(|| "aac".to_string()),
                    bitrate: a.bitrate.unwrap_or_else(|| "192k".to_string()),
                    channels: a.channels.unwrap_or(2),
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RawAudioNormalization {
    enabled: Option<bool>,
    target_level: Option<f64>,
}

#[derive(Deserialize)]
struct RawVideoEncoding {
    codec: Option<String>,
    bitrate: Option<String>,
    preset: Option<String>,
    crf: Option<i32>,
}

#[derive(Deserialize)]
struct RawAudioEncoding {
    codec: Option<String>,
    bitrate: Option<String>,
    channels: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdMap;

    struct FakeProbe {
        audio: StdMap<String, f64>,
        video: StdMap<String, f64>,
    }

    impl DurationProbe for FakeProbe {
        fn probe_audio_duration(&self, path: &str) -> Option<f64> {
            self.audio.get(path).copied()
        }
        fn probe_video_duration(&self, path: &str) -> Option<f64> {
            self.video.get(path).copied()
        }
    }

    #[test]
    fn explicit_duration_wins() {
        let probe = NullProbe;
        let loader = ConfigLoader::new(&probe);
        let json = r#"{
            "project": {"name":"p","output_path":"out.mp4","width":1280,"height":720,"fps":30},
            "scenes": [
                {"type":"image_scene","duration":2.0,"resources":{"image":{"path":"a.png"}}}
            ]
        }"#;
        let project = loader.load_str(json).unwrap();
        assert_eq!(project.scenes[0].duration, 2.0);
    }

    #[test]
    fn falls_back_to_audio_then_video_then_five_seconds() {
        let mut audio = StdMap::new();
        audio.insert("song.mp3".to_string(), 12.5);
        let probe = FakeProbe {
            audio,
            video: StdMap::new(),
        };
        let loader = ConfigLoader::new(&probe);

        let json = r#"{
            "project": {"width":1280,"height":720,"fps":30},
            "scenes": [
                {"type":"image_scene","resources":{"image":{"path":"a.png"},"audio":{"path":"song.mp3"}}},
                {"type":"image_scene","resources":{"image":{"path":"b.png"}}}
            ]
        }"#;
        let project = loader.load_str(json).unwrap();
        assert_eq!(project.scenes[0].duration, 12.5);
        assert_eq!(project.scenes[1].duration, FALLBACK_DURATION_SECS);
    }

    #[test]
    fn probe_is_memoized_per_path() {
        struct CountingProbe {
            calls: std::sync::atomic::AtomicUsize,
        }
        impl DurationProbe for CountingProbe {
            fn probe_audio_duration(&self, _path: &str) -> Option<f64> {
                self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Some(3.0)
            }
            fn probe_video_duration(&self, _path: &str) -> Option<f64> {
                None
            }
        }
        let probe = CountingProbe {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let loader = ConfigLoader::new(&probe);
        let json = r#"{
            "project": {"width":1280,"height":720,"fps":30},
            "scenes": [
                {"type":"image_scene","resources":{
                    "image":{"path":"a.png"},
                    "audio":{"path":"song.mp3"},
                    "audio_layers":[{"path":"song.mp3"}]
                }}
            ]
        }"#;
        loader.load_str(json).unwrap();
        assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_transition_without_two_neighbors() {
        let probe = NullProbe;
        let loader = ConfigLoader::new(&probe);
        let json = r#"{
            "project": {"width":1280,"height":720,"fps":30},
            "scenes": [
                {"type":"transition","duration":1.0,"transition_type":"crossfade"},
                {"type":"image_scene","duration":2.0,"resources":{"image":{"path":"a.png"}}}
            ]
        }"#;
        assert!(loader.load_str(json).is_err());
    }

    #[test]
    fn rejects_non_positive_fps() {
        let probe = NullProbe;
        let loader = ConfigLoader::new(&probe);
        let json = r#"{"project": {"width":1280,"height":720,"fps":0}, "scenes": []}"#;
        assert!(loader.load_str(json).is_err());
    }
}
