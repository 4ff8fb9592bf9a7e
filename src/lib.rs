//! PPI (plan position indicator) viewer for proximity returns around a
//! vehicle.
//!
//! The window runs in its own process. A controller talks to it through
//! [`PpiViewer`], queueing [`DisplayObject`] commands and reading back
//! [`InteractionEvent`]s.
//!
//! | Module        | Purpose                                                  |
//! |---------------|----------------------------------------------------------|
//! | `geometry`    | world/pixel transforms, zoom, grid rings, hit-testing    |
//! | `store`       | layered object store the renderer draws from             |
//! | `protocol`    | commands, events and their NDJSON framing                |
//! | `channel`     | command/event queues and the termination signal          |
//! | `controller`  | renderer state machine driven by a cooperative tick      |
//! | `render`      | scene building and software rasterisation                |
//! | `lifecycle`   | spawning, bridging and closing the render process        |
//! | `window`      | winit + pixels host for the controller                   |

// ============================================================================
// MODULES
// ============================================================================

pub mod channel;
pub mod config;
pub mod controller;
pub mod demo;
pub mod error;
pub mod geometry;
pub mod icon;
pub mod lifecycle;
pub mod logging;
pub mod protocol;
pub mod render;
pub mod store;
pub mod window;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{Colour, Palette, ViewerConfig};
pub use error::{IconError, ProtocolError, RenderError, ViewerError, WireError};
pub use geometry::{RotationMode, ScreenPoint, ViewState, WorldCoord};
pub use lifecycle::{
    CloseOutcome, CommandHandle, PpiViewer, ProcessSpawner, RendererHandle, RendererSpawner,
};
pub use protocol::{
    DisplayObject, InteractionEvent, KeyEvent, MouseButton, MouseEvent, SelectedObject,
    WindowLayout,
};
