//! The renderer-side state machine: owns the view state and object store,
//! merges incoming commands, and decides when to redraw and when to report
//! window layout. It is driven one `tick` at a time by whatever surface hosts
//! it, so it never blocks waiting on the controller.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::TryRecvError;
use std::time::Instant;

use crate::channel::RendererEnd;
use crate::config::ViewerConfig;
use crate::geometry::{self, RotationMode, ScreenPoint, ViewState, WorldCoord};
use crate::icon::{FileIconLoader, IconImage, IconLoader};
use crate::protocol::{
    DisplayObject, InteractionEvent, KeyEvent, MouseButton, MouseEvent, RendererEvent,
};
use crate::render::{self, Surface};
use crate::store::{Applied, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Closing,
    Terminated,
}

/// View menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Relative,
    Grid,
    DistanceLabels,
}

/// Toolkit-neutral input delivered by the hosting surface.
#[derive(Debug, Clone, PartialEq)]
pub enum UiInput {
    /// `away` is true when the wheel turned away from the user.
    Wheel { away: bool },
    PointerMoved(ScreenPoint),
    Button { button: MouseButton, pressed: bool },
    Key { key_code: String },
    Toggle(Toggle),
    Resized { width: u32, height: u32 },
}

pub struct ViewController {
    config: ViewerConfig,
    link: RendererEnd,
    phase: Phase,
    view: ViewState,
    store: ObjectStore,
    icon: Option<IconImage>,
    icon_loader: Box<dyn IconLoader>,
    need_redraw: bool,
    last_render: Option<Instant>,
    last_layout_emit: Option<Instant>,
    pointer: Option<ScreenPoint>,
    button_down: Option<MouseButton>,
}

impl ViewController {
    pub fn new(config: ViewerConfig, link: RendererEnd) -> Self {
        let mut view = ViewState::new(config.zoom_range, config.zoom_increment);
        view.grid_enabled = config.grid;
        view.distance_labels_enabled = config.distance_labels;
        view.rotation_mode = if config.relative {
            RotationMode::Relative
        } else {
            RotationMode::Absolute
        };
        view.set_viewport(config.window_width, config.window_height);

        Self {
            config,
            link,
            phase: Phase::Starting,
            view,
            store: ObjectStore::new(),
            icon: None,
            icon_loader: Box::new(FileIconLoader),
            need_redraw: true,
            last_render: None,
            last_layout_emit: None,
            pointer: None,
            button_down: None,
        }
    }

    pub fn with_icon_loader(mut self, loader: impl IconLoader + 'static) -> Self {
        self.icon_loader = Box::new(loader);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn needs_redraw(&self) -> bool {
        self.need_redraw
    }

    /// Force a repaint on the next due frame, e.g. after an expose.
    pub fn invalidate(&mut self) {
        self.need_redraw = true;
    }

    /// The hosting surface exists and has a size; start running.
    pub fn surface_ready(&mut self, width: u32, height: u32, now: Instant) {
        if self.phase != Phase::Starting {
            return;
        }
        self.view.set_viewport(width, height);
        self.need_redraw = true;
        self.last_layout_emit = Some(now);
        self.phase = Phase::Running;
        tracing::debug!(width, height, "render surface ready");
    }

    /// One cooperative scheduler step.
    pub fn tick(&mut self, now: Instant, surface: &mut dyn Surface) -> Phase {
        match self.phase {
            Phase::Starting | Phase::Terminated => {}
            Phase::Running => {
                if self.link.shutdown.is_released() {
                    tracing::debug!("termination signal observed");
                    self.phase = Phase::Closing;
                    return self.phase;
                }
                self.drain_commands(surface);
                self.render_if_due(now, surface);
                self.emit_layout_if_due(now, surface);
            }
            Phase::Closing => {
                self.release_resources();
                self.phase = Phase::Terminated;
            }
        }
        self.phase
    }

    /// Close initiated on the renderer side, e.g. the window was closed.
    ///
    /// Releases the termination signal so the controller side sees it too;
    /// the next `tick` finishes the walk to `Terminated`.
    pub fn request_close(&mut self) {
        if self.link.shutdown.release() {
            tracing::debug!("close requested by the renderer");
        }
        if matches!(self.phase, Phase::Starting | Phase::Running) {
            self.phase = Phase::Closing;
        }
    }

    pub fn handle_input(&mut self, input: UiInput) {
        match input {
            UiInput::Wheel { away } => {
                if away {
                    self.view.wheel_in();
                } else {
                    self.view.wheel_out();
                }
                tracing::trace!(zoom_range = self.view.zoom_range, "zoom");
                self.need_redraw = true;
            }
            UiInput::PointerMoved(position) => self.pointer = Some(position),
            UiInput::Button { button, pressed: true } => self.button_down = Some(button),
            UiInput::Button { button, pressed: false } => {
                if self.button_down.take() != Some(button) {
                    return;
                }
                let Some(screen) = self.pointer else {
                    return;
                };
                let event = MouseEvent {
                    screen,
                    world: geometry::to_world(screen, &self.view),
                    button,
                    selected: self.store.pick(screen, &self.view, self.config.pick_radius),
                };
                self.emit(RendererEvent::Interaction(InteractionEvent::Mouse(event)));
            }
            UiInput::Key { key_code } => {
                let (world, selected) = match self.pointer {
                    Some(screen) => (
                        geometry::to_world(screen, &self.view),
                        self.store.pick(screen, &self.view, self.config.pick_radius),
                    ),
                    None => (WorldCoord::ORIGIN, Vec::new()),
                };
                let event = KeyEvent {
                    key_code,
                    world,
                    selected,
                };
                self.emit(RendererEvent::Interaction(InteractionEvent::Key(event)));
            }
            UiInput::Toggle(toggle) => {
                match toggle {
                    Toggle::Relative => {
                        self.view.rotation_mode = match self.view.rotation_mode {
                            RotationMode::Relative => RotationMode::Absolute,
                            RotationMode::Absolute => RotationMode::Relative,
                        }
                    }
                    Toggle::Grid => self.view.grid_enabled = !self.view.grid_enabled,
                    Toggle::DistanceLabels => {
                        self.view.distance_labels_enabled = !self.view.distance_labels_enabled
                    }
                }
                tracing::debug!(?toggle, "view toggled");
                self.need_redraw = true;
            }
            UiInput::Resized { width, height } => {
                self.view.set_viewport(width, height);
                self.need_redraw = true;
            }
        }
    }

    fn drain_commands(&mut self, surface: &mut dyn Surface) {
        loop {
            match self.link.commands.try_recv() {
                Ok(command) => self.apply_command(command, surface),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // nobody can ever send again; treat it like a close
                    if self.link.shutdown.release() {
                        tracing::debug!("command queue disconnected");
                    }
                    break;
                }
            }
        }
    }

    fn apply_command(&mut self, command: DisplayObject, surface: &mut dyn Surface) {
        match command {
            DisplayObject::PolarGrid {} => {
                self.view.grid_enabled = true;
                self.need_redraw = true;
            }
            DisplayObject::Icon { image_ref } => match self.icon_loader.load_icon(Path::new(&image_ref)) {
                Ok(icon) => {
                    self.icon = Some(icon);
                    self.need_redraw = true;
                }
                Err(err) => tracing::warn!(%err, %image_ref, "icon rejected"),
            },
            DisplayObject::Heading { degrees } => {
                if degrees.is_finite() {
                    self.view.set_heading(degrees);
                    self.need_redraw = true;
                } else {
                    tracing::warn!(degrees, "non-finite heading rejected");
                }
            }
            DisplayObject::LayoutUpdate { geometry } => surface.apply_layout(&geometry),
            command => match self.store.apply(command) {
                Ok(Applied::Changed) => self.need_redraw = true,
                Ok(Applied::Unchanged) => {}
                Err(err) => tracing::warn!(%err, "display command rejected"),
            },
        }
    }

    fn render_if_due(&mut self, now: Instant, surface: &mut dyn Surface) {
        if !self.need_redraw {
            return;
        }
        if let Some(last) = self.last_render {
            if now.saturating_duration_since(last) < self.config.frame_interval {
                return;
            }
        }
        self.last_render = Some(now);

        let view = &self.view;
        let store = &self.store;
        let icon = self.icon.as_ref();
        let config = &self.config;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let scene = render::build_scene(view, store, icon, config);
            surface.present(&scene)
        }));
        match outcome {
            Ok(Ok(())) => self.need_redraw = false,
            Ok(Err(err)) => tracing::warn!(%err, "frame failed to draw"),
            Err(payload) => {
                let panic_message = if let Some(message) = payload.downcast_ref::<&str>() {
                    (*message).to_string()
                } else if let Some(message) = payload.downcast_ref::<String>() {
                    message.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                tracing::error!(panic_message, "render step panicked");
            }
        }
    }

    fn emit_layout_if_due(&mut self, now: Instant, surface: &mut dyn Surface) {
        let due = self
            .last_layout_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.layout_interval);
        if due {
            self.last_layout_emit = Some(now);
            self.emit(RendererEvent::Layout(surface.layout()));
        }
    }

    fn emit(&self, event: RendererEvent) {
        if self.link.events.send(event).is_err() {
            tracing::debug!("event queue closed, dropping event");
        }
    }

    fn release_resources(&mut self) {
        self.icon = None;
        self.store = ObjectStore::new();
        self.need_redraw = false;
        tracing::debug!("renderer resources released");
    }
}
