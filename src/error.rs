use std::io;
use std::path::PathBuf;

/// A display command that cannot be merged into the object store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("display object has an empty key")]
    EmptyKey,
    #[error("object `{key}` has an empty layer name")]
    EmptyLayer { key: String },
    #[error("object `{key}` has a non-finite position or rotation")]
    NonFinite { key: String },
    #[error("`{0}` commands do not carry object state")]
    NotStorable(&'static str),
}

/// Failure to move a frame across the process boundary.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("pipe i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to bring up or talk to the render process.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("could not locate the current executable: {0}")]
    CurrentExe(#[source] io::Error),
    #[error("failed to start the render process: {0}")]
    Spawn(#[source] io::Error),
    #[error("render process has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("failed to encode viewer configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("invalid viewer configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum IconError {
    #[error("failed to load icon: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised by a render surface.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("pixel surface error: {0}")]
    Pixels(#[from] pixels::Error),
    #[error("pixel buffer resize failed: {0}")]
    Resize(#[from] pixels::TextureError),
    #[error("failed to read font {path}: {source}")]
    FontIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not a usable font")]
    FontParse(PathBuf),
}
