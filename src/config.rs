use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Longest countdown the operator may configure, in seconds
pub const MAX_COUNTDOWN_SECONDS: u32 = 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothConfig {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub graph: GraphConfig,
    pub paths: PathsConfig,
    pub print: PrintConfig,
}

/// Which camera-control implementation backs the capture worker
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CameraDriverKind {
    /// V4L2 camera driven through a GStreamer capture pipeline
    V4l2,
    /// GStreamer test pattern standing in for a camera
    TestPattern,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera-control implementation
    #[serde(default = "default_camera_driver")]
    pub driver: CameraDriverKind,

    /// Video device path used by the V4L2 driver
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Target preview frame rate
    #[serde(default = "default_preview_fps")]
    pub preview_fps: u32,

    /// Preview frame width delivered by the camera
    #[serde(default = "default_preview_width")]
    pub preview_width: u32,

    /// Preview frame height delivered by the camera
    #[serde(default = "default_preview_height")]
    pub preview_height: u32,

    /// Delay between camera probes while no camera is attached
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Idle tick while the capture worker is paused
    #[serde(default = "default_paused_interval_ms")]
    pub paused_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Shutter countdown length in seconds (0-60)
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,

    /// Audio file played while the countdown runs
    #[serde(default)]
    pub countdown_sound: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphConfig {
    /// Still image composited over preview and photo
    #[serde(default = "default_overlay_image")]
    pub overlay_image: String,

    /// Display sink element factory
    #[serde(default = "default_video_sink")]
    pub video_sink: String,

    /// Photo output width
    #[serde(default = "default_print_width")]
    pub print_width: u32,

    /// Photo output height
    #[serde(default = "default_print_height")]
    pub print_height: u32,

    /// Display surface width reported to the output-size negotiation
    #[serde(default = "default_display_width")]
    pub display_width: u32,

    /// Display surface height reported to the output-size negotiation
    #[serde(default = "default_display_height")]
    pub display_height: u32,

    /// Run face detection on the preview and publish the face rectangles
    #[serde(default)]
    pub face_detect: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    /// Named pipe carrying MJPEG preview frames
    #[serde(default = "default_frame_pipe")]
    pub frame_pipe: String,

    /// JPEG written when the operator accepts a photo
    #[serde(default = "default_print_output")]
    pub print_output: String,

    /// Directory receiving a timestamped copy of every accepted photo
    #[serde(default)]
    pub archive_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrintConfig {
    /// Submit accepted photos to the print spooler
    #[serde(default = "default_print_enabled")]
    pub enabled: bool,

    /// Spooler command receiving the photo path as last argument
    #[serde(default = "default_print_command")]
    pub command: String,

    /// Destination printer; the spooler default when unset
    #[serde(default)]
    pub printer: Option<String>,

    /// Copies per accepted photo
    #[serde(default = "default_print_copies")]
    pub copies: u32,
}

impl BoothConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("photobooth.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.driver", "v4l2")?
            .set_default("camera.device", default_camera_device())?
            .set_default("camera.preview_fps", default_preview_fps())?
            .set_default("camera.preview_width", default_preview_width())?
            .set_default("camera.preview_height", default_preview_height())?
            .set_default("camera.probe_interval_ms", default_probe_interval_ms())?
            .set_default("camera.paused_interval_ms", default_paused_interval_ms())?
            .set_default("session.countdown_seconds", default_countdown_seconds())?
            .set_default("graph.overlay_image", default_overlay_image())?
            .set_default("graph.video_sink", default_video_sink())?
            .set_default("graph.print_width", default_print_width())?
            .set_default("graph.print_height", default_print_height())?
            .set_default("graph.display_width", default_display_width())?
            .set_default("graph.display_height", default_display_height())?
            .set_default("graph.face_detect", false)?
            .set_default("paths.frame_pipe", default_frame_pipe())?
            .set_default("paths.print_output", default_print_output())?
            .set_default("print.enabled", default_print_enabled())?
            .set_default("print.command", default_print_command())?
            .set_default("print.copies", default_print_copies())?
            .add_source(File::with_name(&path_str).required(false))
            // PHOTOBOOTH_SESSION__COUNTDOWN_SECONDS=3
            .add_source(
                Environment::with_prefix("PHOTOBOOTH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: BoothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.countdown_seconds > MAX_COUNTDOWN_SECONDS {
            return Err(ConfigError::Message(format!(
                "Countdown must be between 0 and {} seconds, got {}",
                MAX_COUNTDOWN_SECONDS, self.session.countdown_seconds
            )));
        }

        if self.camera.preview_fps == 0 {
            return Err(ConfigError::Message(
                "Preview fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.preview_width == 0 || self.camera.preview_height == 0 {
            return Err(ConfigError::Message(
                "Preview resolution must be greater than 0".to_string(),
            ));
        }

        if self.graph.print_width == 0 || self.graph.print_height == 0 {
            return Err(ConfigError::Message(
                "Print resolution must be greater than 0".to_string(),
            ));
        }

        if self.graph.display_width == 0 || self.graph.display_height == 0 {
            return Err(ConfigError::Message(
                "Display size must be greater than 0".to_string(),
            ));
        }

        if self.paths.frame_pipe.is_empty() {
            return Err(ConfigError::Message(
                "Frame pipe path must not be empty".to_string(),
            ));
        }

        if self.print.enabled && self.print.command.trim().is_empty() {
            return Err(ConfigError::Message(
                "Print command must not be empty when printing is enabled".to_string(),
            ));
        }

        if self.print.copies == 0 {
            return Err(ConfigError::Message(
                "Print copies must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                driver: default_camera_driver(),
                device: default_camera_device(),
                preview_fps: default_preview_fps(),
                preview_width: default_preview_width(),
                preview_height: default_preview_height(),
                probe_interval_ms: default_probe_interval_ms(),
                paused_interval_ms: default_paused_interval_ms(),
            },
            session: SessionConfig {
                countdown_seconds: default_countdown_seconds(),
                countdown_sound: None,
            },
            graph: GraphConfig {
                overlay_image: default_overlay_image(),
                video_sink: default_video_sink(),
                print_width: default_print_width(),
                print_height: default_print_height(),
                display_width: default_display_width(),
                display_height: default_display_height(),
                face_detect: false,
            },
            paths: PathsConfig {
                frame_pipe: default_frame_pipe(),
                print_output: default_print_output(),
                archive_dir: None,
            },
            print: PrintConfig {
                enabled: default_print_enabled(),
                command: default_print_command(),
                printer: None,
                copies: default_print_copies(),
            },
        }
    }
}

fn default_camera_driver() -> CameraDriverKind {
    CameraDriverKind::V4l2
}
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_preview_fps() -> u32 {
    25
}
fn default_preview_width() -> u32 {
    640
}
fn default_preview_height() -> u32 {
    424
}
fn default_probe_interval_ms() -> u64 {
    5000
}
fn default_paused_interval_ms() -> u64 {
    1000
}

fn default_countdown_seconds() -> u32 {
    5
}

fn default_overlay_image() -> String {
    "overlay_print.png".to_string()
}
fn default_video_sink() -> String {
    "autovideosink".to_string()
}
fn default_print_width() -> u32 {
    2076
}
fn default_print_height() -> u32 {
    1384
}
fn default_display_width() -> u32 {
    1280
}
fn default_display_height() -> u32 {
    800
}

fn default_frame_pipe() -> String {
    "moviepipe.mjpg".to_string()
}
fn default_print_output() -> String {
    "PHOTOBOOTH-PRINT.JPG".to_string()
}

fn default_print_enabled() -> bool {
    true
}
fn default_print_command() -> String {
    "lp".to_string()
}

fn default_print_copies() -> u32 {
    1
}
