//! Controller-side proxy for the isolated renderer.
//!
//! [`PpiViewer`] owns the command sender, the event queue and the termination
//! signal, and holds a handle to whatever is running the renderer. In
//! production that is a child process started by [`ProcessSpawner`]: the
//! current binary re-executed with the hidden `render` subcommand, with
//! commands on its stdin and events on its stdout as newline-delimited JSON.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::channel::{self, ControllerEnd, EventQueue, RendererEnd, TerminationSignal};
use crate::config::{Colour, ViewerConfig};
use crate::error::ViewerError;
use crate::geometry::WorldCoord;
use crate::protocol::{
    read_frame, write_frame, ControlFrame, DisplayObject, InteractionEvent, RendererEvent,
    WindowLayout,
};

/// How long a renderer gets to exit on its own after the signal is released.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);
pub const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often the stdin bridge looks at the termination signal while idle.
const BRIDGE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The renderer observed the signal and exited within the timeout.
    Graceful,
    /// The renderer had to be killed.
    Forced,
    AlreadyClosed,
}

// ============================================================================
// SPAWNING
// ============================================================================

/// A running renderer, as seen from the controller.
pub trait RendererHandle: Send {
    fn is_alive(&mut self) -> bool;
    /// Forced termination; must not block.
    fn terminate(&mut self);
    /// Reap the renderer and anything bridging to it.
    fn wait(&mut self);
}

/// Starts a renderer serving the given link.
pub trait RendererSpawner {
    type Handle: RendererHandle;

    fn spawn(&self, config: &ViewerConfig, link: RendererEnd) -> Result<Self::Handle, ViewerError>;
}

/// Launches the renderer as a child process and bridges the link over stdio.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Re-execute the running binary in render mode.
    pub fn current_exe() -> Result<Self, ViewerError> {
        let exe = std::env::current_exe().map_err(ViewerError::CurrentExe)?;
        Ok(Self::new(exe).arg("render"))
    }
}

impl RendererSpawner for ProcessSpawner {
    type Handle = ChildHandle;

    fn spawn(&self, config: &ViewerConfig, link: RendererEnd) -> Result<ChildHandle, ViewerError> {
        let encoded = serde_json::to_string(config)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--config")
            .arg(encoded)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ViewerError::Spawn)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            (stdin, _) => {
                let missing = if stdin.is_none() { "stdin" } else { "stdout" };
                let _ = child.kill();
                let _ = child.wait();
                return Err(ViewerError::MissingPipe(missing));
            }
        };
        tracing::debug!(pid = child.id(), program = %self.program.display(), "render process started");

        let RendererEnd {
            commands,
            events,
            shutdown,
        } = link;
        let writer = thread::spawn(move || forward_commands(commands, shutdown, stdin));
        let reader = thread::spawn(move || forward_events(stdout, events));

        Ok(ChildHandle {
            child,
            writer: Some(writer),
            reader: Some(reader),
        })
    }
}

/// Pump queued commands into the child's stdin until the signal is released
/// or the controller goes away, then send `Close` and hang up.
fn forward_commands(commands: Receiver<DisplayObject>, shutdown: TerminationSignal, mut stdin: ChildStdin) {
    loop {
        match commands.recv_timeout(BRIDGE_POLL) {
            Ok(command) => {
                if let Err(err) = write_frame(&mut stdin, &ControlFrame::Command(command)) {
                    tracing::warn!(%err, "render process stopped accepting commands");
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) if !shutdown.is_released() => {}
            Err(_) => break,
        }
    }
    // anything sent before the release still goes out ahead of Close
    for command in commands.try_iter() {
        if write_frame(&mut stdin, &ControlFrame::Command(command)).is_err() {
            return;
        }
    }
    if let Err(err) = write_frame(&mut stdin, &ControlFrame::Close) {
        tracing::debug!(%err, "render process already gone at close");
    }
}

fn forward_events(stdout: ChildStdout, events: Sender<RendererEvent>) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::debug!(%err, "render process stdout closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match read_frame::<RendererEvent>(&line) {
            Ok(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(err) => tracing::warn!(%err, "skipping malformed event frame"),
        }
    }
}

/// Handle to a renderer child process and its two bridge threads.
pub struct ChildHandle {
    child: Child,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl RendererHandle for ChildHandle {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) {
        if let Err(err) = self.child.kill() {
            tracing::warn!(%err, "failed to kill render process");
        }
    }

    fn wait(&mut self) {
        match self.child.wait() {
            Ok(status) => tracing::debug!(%status, "render process reaped"),
            Err(err) => tracing::warn!(%err, "failed to reap render process"),
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        // a grandchild may still hold stdout open; only join a finished reader
        if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                let _ = reader.join();
            }
        }
    }
}

// ============================================================================
// CHILD SIDE
// ============================================================================

/// Connect a renderer-process link to this process's stdio: `Command` frames
/// on stdin become queued commands, `Close` or EOF releases the termination
/// signal, and every event is written to stdout.
pub fn bridge_child_stdio(link: ControllerEnd) -> (JoinHandle<()>, JoinHandle<()>) {
    let ControllerEnd {
        commands,
        events,
        shutdown,
    } = link;

    let reader = thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match read_frame::<ControlFrame>(&line) {
                Ok(ControlFrame::Command(command)) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                Ok(ControlFrame::Close) => {
                    tracing::debug!("close frame received");
                    break;
                }
                Err(err) => tracing::warn!(%err, "skipping malformed control frame"),
            }
        }
        shutdown.release();
    });

    let writer = thread::spawn(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for event in events.iter() {
            if let Err(err) = write_frame(&mut out, &event) {
                tracing::debug!(%err, "controller stopped reading events");
                break;
            }
        }
    });

    (reader, writer)
}

// ============================================================================
// COMMAND HANDLE
// ============================================================================

/// Cloneable sender half of a viewer, for code that cannot borrow the
/// [`PpiViewer`] itself, such as a layout hook restoring window placement.
///
/// Commands sent after the viewer started closing are dropped.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    commands: Sender<DisplayObject>,
    shutdown: TerminationSignal,
}

impl CommandHandle {
    /// Add or update an object in the view.
    pub fn add_object(&self, object: DisplayObject) {
        self.send(object);
    }

    pub fn remove_object(&self, key: impl Into<String>) {
        self.send(DisplayObject::RemoveObject { key: key.into() });
    }

    pub fn hide_object(&self, key: impl Into<String>, hidden: bool) {
        self.send(DisplayObject::HideObject {
            key: key.into(),
            hidden,
        });
    }

    /// Move an object, replacing its label and colour.
    pub fn set_position(
        &self,
        key: impl Into<String>,
        layer: impl Into<String>,
        coord: WorldCoord,
        rotation: f64,
        label: Option<String>,
        colour: Option<Colour>,
    ) {
        self.send(DisplayObject::Position {
            key: key.into(),
            layer: layer.into(),
            coord,
            rotation,
            label,
            colour,
        });
    }

    pub fn set_heading(&self, degrees: f64) {
        self.send(DisplayObject::Heading { degrees });
    }

    pub fn set_layout(&self, layout: WindowLayout) {
        self.send(DisplayObject::LayoutUpdate { geometry: layout });
    }

    fn send(&self, command: DisplayObject) {
        if self.shutdown.is_released() {
            tracing::debug!(kind = command.kind(), "viewer closed, dropping command");
            return;
        }
        if self.commands.send(command).is_err() {
            tracing::debug!("renderer link gone, dropping command");
        }
    }
}

// ============================================================================
// CONTROLLER PROXY
// ============================================================================

/// The controller's view of a running PPI window.
pub struct PpiViewer<H: RendererHandle = ChildHandle> {
    commands: CommandHandle,
    events: EventQueue,
    shutdown: TerminationSignal,
    renderer: Option<H>,
}

impl PpiViewer<ChildHandle> {
    /// Start the renderer as a child process of the current binary.
    pub fn start(config: &ViewerConfig) -> Result<Self, ViewerError> {
        Self::start_with(config, &ProcessSpawner::current_exe()?)
    }
}

impl<H: RendererHandle> PpiViewer<H> {
    pub fn start_with<S>(config: &ViewerConfig, spawner: &S) -> Result<Self, ViewerError>
    where
        S: RendererSpawner<Handle = H>,
    {
        config.validate()?;
        let (controller, renderer) = channel::link();
        let handle = spawner.spawn(config, renderer)?;
        let ControllerEnd {
            commands,
            events,
            shutdown,
        } = controller;
        tracing::info!(title = %config.title, "viewer started");
        Ok(Self {
            commands: CommandHandle {
                commands,
                shutdown: shutdown.clone(),
            },
            events: EventQueue::new(events),
            shutdown,
            renderer: Some(handle),
        })
    }

    /// Ask the renderer to exit, escalating to a kill after [`CLOSE_TIMEOUT`].
    pub fn close(&mut self) -> CloseOutcome {
        let Some(mut renderer) = self.renderer.take() else {
            return CloseOutcome::AlreadyClosed;
        };
        self.shutdown.release();

        let deadline = Instant::now() + CLOSE_TIMEOUT;
        let outcome = loop {
            if !renderer.is_alive() {
                break CloseOutcome::Graceful;
            }
            if Instant::now() >= deadline {
                tracing::warn!("renderer ignored close request, terminating");
                renderer.terminate();
                break CloseOutcome::Forced;
            }
            thread::sleep(CLOSE_POLL_INTERVAL);
        };
        renderer.wait();
        tracing::info!(?outcome, "viewer closed");
        outcome
    }

    pub fn is_alive(&mut self) -> bool {
        self.renderer.as_mut().is_some_and(|r| r.is_alive())
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// A cloneable handle sending to this viewer's renderer.
    pub fn command_handle(&self) -> CommandHandle {
        self.commands.clone()
    }

    /// Add or update an object in the view.
    pub fn add_object(&self, object: DisplayObject) {
        self.commands.add_object(object);
    }

    pub fn remove_object(&self, key: impl Into<String>) {
        self.commands.remove_object(key);
    }

    pub fn hide_object(&self, key: impl Into<String>, hidden: bool) {
        self.commands.hide_object(key, hidden);
    }

    /// Move an object, replacing its label and colour.
    pub fn set_position(
        &self,
        key: impl Into<String>,
        layer: impl Into<String>,
        coord: WorldCoord,
        rotation: f64,
        label: Option<String>,
        colour: Option<Colour>,
    ) {
        self.commands.set_position(key, layer, coord, rotation, label, colour);
    }

    pub fn set_heading(&self, degrees: f64) {
        self.commands.set_heading(degrees);
    }

    pub fn set_layout(&self, layout: WindowLayout) {
        self.commands.set_layout(layout);
    }

    /// Command that installs `path` as the vehicle icon.
    pub fn icon(&self, path: impl AsRef<Path>) -> DisplayObject {
        DisplayObject::Icon {
            image_ref: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    pub fn event_count(&mut self) -> usize {
        self.events.event_count()
    }

    pub fn get_event(&mut self) -> Option<InteractionEvent> {
        self.events.get_event()
    }

    pub fn add_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&InteractionEvent) + Send + 'static,
    {
        self.events.add_callback(callback);
    }

    /// Called with every layout the renderer reports, e.g. to persist it. A
    /// hook that wants to restore placement can capture a
    /// [`command_handle`](Self::command_handle) and call `set_layout`.
    pub fn on_layout<F>(&mut self, hook: F)
    where
        F: FnMut(WindowLayout) + Send + 'static,
    {
        self.events.on_layout(hook);
    }

    pub fn check_events(&mut self) -> usize {
        self.events.check_events()
    }
}

impl<H: RendererHandle> Drop for PpiViewer<H> {
    fn drop(&mut self) {
        if self.renderer.is_some() {
            self.close();
        }
    }
}
