//! Messages exchanged between the controller and the render process, and the
//! newline-delimited JSON framing used to carry them over stdio.

#[cfg(test)]
#[path = "protocol_test.rs"]
mod protocol_test;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::config::Colour;
use crate::error::WireError;
use crate::geometry::{ScreenPoint, WorldCoord};

// ============================================================================
// DISPLAY COMMANDS (controller -> renderer)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayObject {
    /// Place or move a named object on a named layer.
    Position {
        key: String,
        layer: String,
        coord: WorldCoord,
        /// Degrees clockwise from north.
        rotation: f64,
        label: Option<String>,
        colour: Option<Colour>,
    },
    RemoveObject {
        key: String,
    },
    HideObject {
        key: String,
        hidden: bool,
    },
    PolarGrid {},
    Icon {
        image_ref: String,
    },
    /// Current vehicle heading in degrees.
    Heading {
        degrees: f64,
    },
    LayoutUpdate {
        geometry: WindowLayout,
    },
}

impl DisplayObject {
    pub fn kind(&self) -> &'static str {
        match self {
            DisplayObject::Position { .. } => "position",
            DisplayObject::RemoveObject { .. } => "remove_object",
            DisplayObject::HideObject { .. } => "hide_object",
            DisplayObject::PolarGrid {} => "polar_grid",
            DisplayObject::Icon { .. } => "icon",
            DisplayObject::Heading { .. } => "heading",
            DisplayObject::LayoutUpdate { .. } => "layout_update",
        }
    }

    /// Shorthand for a `Position` with no label or colour override.
    pub fn position(key: impl Into<String>, layer: impl Into<String>, coord: WorldCoord) -> Self {
        DisplayObject::Position {
            key: key.into(),
            layer: layer.into(),
            coord,
            rotation: 0.0,
            label: None,
            colour: None,
        }
    }
}

/// Window placement on the desktop, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowLayout {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// INTERACTION EVENTS (renderer -> controller)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedObject {
    pub key: String,
    pub layer: String,
    pub pixel_distance: f64,
}

/// A completed click: the button went down and came back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub screen: ScreenPoint,
    pub world: WorldCoord,
    pub button: MouseButton,
    pub selected: Vec<SelectedObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key_code: String,
    /// World position under the pointer when the key went down.
    pub world: WorldCoord,
    pub selected: Vec<SelectedObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionEvent {
    Mouse(MouseEvent),
    Key(KeyEvent),
}

impl InteractionEvent {
    pub fn selected(&self) -> &[SelectedObject] {
        match self {
            InteractionEvent::Mouse(event) => &event.selected,
            InteractionEvent::Key(event) => &event.selected,
        }
    }
}

/// Everything the renderer puts on the event queue. Layout reports are
/// consumed by the controller proxy and never reach user callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RendererEvent {
    Interaction(InteractionEvent),
    Layout(WindowLayout),
}

// ============================================================================
// WIRE FRAMING
// ============================================================================

/// A frame on the render process's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlFrame {
    Command(DisplayObject),
    /// The controller released the termination signal.
    Close,
}

/// Write `value` as a single JSON line and flush.
pub fn write_frame<T, W>(out: &mut W, value: &T) -> Result<(), WireError>
where
    T: Serialize,
    W: Write,
{
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

pub fn read_frame<T: DeserializeOwned>(line: &str) -> Result<T, WireError> {
    Ok(serde_json::from_str(line.trim())?)
}
