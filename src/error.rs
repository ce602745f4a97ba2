use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Media graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Control channel error: {0}")]
    Control(#[from] ControlError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BoothError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the camera-control capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera initialization failed: {details}")]
    InitFailed { details: String },

    #[error("Camera disconnected (code {code})")]
    Disconnected { code: i32 },

    #[error("Capture failed: {details}")]
    CaptureFailed { details: String },

    #[error("Unexpected preview MIME type '{mime}'")]
    UnexpectedMime { mime: String },

    #[error("Camera file transfer failed for {path}: {details}")]
    FileTransfer { path: String, details: String },

    #[error("Camera not initialized")]
    NotInitialized,
}

impl CameraError {
    /// Native return code reported when the device went away mid-call.
    pub const DISCONNECT_CODE: i32 = -7;

    pub fn disconnected() -> Self {
        Self::Disconnected {
            code: Self::DISCONNECT_CODE,
        }
    }

    /// Whether this error means the device is gone and the session must be closed
    pub fn is_disconnect(&self) -> bool {
        matches!(self, CameraError::Disconnected { .. })
    }
}

/// Errors raised while building or rewiring the media graph
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Failed to create element '{factory}' ({name})")]
    MissingElement { factory: String, name: String },

    #[error("Failed to link {from} -> {to}")]
    LinkFailed { from: String, to: String },

    #[error("State change failed for {element}: {details}")]
    StateChange { element: String, details: String },

    #[error("Probe error on {pad}: {details}")]
    Probe { pad: String, details: String },

    #[error("Failed to push still image: {details}")]
    Push { details: String },

    #[error("Photo writer error: {details}")]
    Writer { details: String },

    #[error("GStreamer error: {0}")]
    Gst(#[from] gstreamer::glib::Error),
}

/// Errors raised by the owner/worker control channel
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Control channel closed")]
    Closed,

    #[error("Control channel IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid control command byte 0x{byte:02x}")]
    InvalidCommand { byte: u8 },

    #[error("Timed out delivering {command}")]
    Timeout { command: String },
}

pub type Result<T> = std::result::Result<T, BoothError>;
