//! Immutable project data model, lowered from the on-disk JSON by
//! [`crate::config::ConfigLoader`].
//!
//! Field defaults match the documented project JSON schema's defaults.

use serde::{Deserialize, Serialize};

use crate::transitions::TransitionKind;

/// Top-level, immutable-after-load project description.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub name: String,
    pub output_path: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub background_color: String,
    pub scenes: Vec<Scene>,
    pub global_effects: GlobalEffects,
}

/// One entry in `Project::scenes`, in render order.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub id: u32,
    pub duration: f64,
    pub kind: SceneKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SceneKind {
    Image {
        image: Option<ImageConfig>,
        audio: Option<AudioLayer>,
        audio_layers: Vec<AudioLayer>,
        ken_burns: Option<KenBurnsParams>,
        subtitle: Option<Subtitle>,
    },
    Video {
        video: VideoConfig,
        audio: Option<AudioLayer>,
        audio_layers: Vec<AudioLayer>,
        use_embedded_audio: bool,
        subtitle: Option<Subtitle>,
    },
    Transition {
        kind: TransitionKind,
    },
}

impl Scene {
    /// `true` for any scene that is not a transition — i.e. one that can be a
    /// transition neighbor.
    pub fn is_content(&self) -> bool {
        !matches!(self.kind, SceneKind::Transition { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageConfig {
    pub path: String,
    pub x: i32,
    pub y: i32,
    pub scale: f64,
    pub rotation: f64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            path: String::new(),
            x: 0,
            y: 0,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoConfig {
    pub path: String,
    /// Honored by the video decoder — see DESIGN.md.
    pub trim_start: f64,
    /// `-1.0` means "use full length".
    pub trim_end: f64,
    pub use_audio: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        VideoConfig {
            path: String::new(),
            trim_start: 0.0,
            trim_end: -1.0,
            use_audio: true,
        }
    }
}

/// One audio source mixed into a scene: the primary `audio` config or any
/// entry of `audio_layers`.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioLayer {
    pub path: String,
    pub volume: f64,
    pub start_offset: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl Default for AudioLayer {
    fn default() -> Self {
        AudioLayer {
            path: String::new(),
            volume: 1.0,
            start_offset: 0.0,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KenBurnsPreset {
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    Custom,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KenBurnsParams {
    pub preset: KenBurnsPreset,
    pub start_scale: f64,
    pub end_scale: f64,
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
}

impl Default for KenBurnsParams {
    fn default() -> Self {
        KenBurnsParams {
            preset: KenBurnsPreset::ZoomIn,
            start_scale: 1.0,
            end_scale: 1.0,
            start_x: 0,
            start_y: 0,
            end_x: 0,
            end_y: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subtitle {
    pub text: String,
    pub font_size: u32,
    pub font_color: String,
    pub bg_color: String,
    pub margin_bottom: u32,
}

impl Default for Subtitle {
    fn default() -> Self {
        Subtitle {
            text: String::new(),
            font_size: 48,
            font_color: "white".to_string(),
            bg_color: "black@0.5".to_string(),
            margin_bottom: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalEffects {
    pub audio_normalization: AudioNormalization,
    pub video_encoding: VideoEncoding,
    pub audio_encoding: AudioEncoding,
}

impl Default for GlobalEffects {
    fn default() -> Self {
        GlobalEffects {
            audio_normalization: AudioNormalization::default(),
            video_encoding: VideoEncoding::default(),
            audio_encoding: AudioEncoding::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioNormalization {
    pub enabled: bool,
    pub target_level: f64,
}

impl Default for AudioNormalization {
    fn default() -> Self {
        AudioNormalization {
            enabled: false,
            target_level: -16.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoEncoding {
    pub codec: String,
    pub bitrate: String,
    pub preset: String,
    pub crf: i32,
}

impl Default for VideoEncoding {
    fn default() -> Self {
        VideoEncoding {
            codec: "libx264".to_string(),
            bitrate: "5000k".to_string(),
            preset: "medium".to_string(),
            crf: 23,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioEncoding {
    pub codec: String,
    pub bitrate: String,
    pub channels: u32,
}

impl Default for AudioEncoding {
    fn default() -> Self {
        AudioEncoding {
            codec: "aac".to_string(),
            bitrate: "192k".to_string(),
            channels: 2,
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Project {
            name: String::new(),
            output_path: String::new(),
            width: 1920,
            height: 1080,
            fps: 30,
            background_color: "#000000".to_string(),
            scenes: Vec::new(),
            global_effects: GlobalEffects::default(),
        }
    }
}
