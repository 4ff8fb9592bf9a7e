//! The command/event queue pair and the one-shot termination signal that
//! connect the controller to the renderer.

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::protocol::{DisplayObject, InteractionEvent, RendererEvent, WindowLayout};

// ============================================================================
// TERMINATION SIGNAL
// ============================================================================

/// Starts held; [`release`](Self::release) flips it exactly once.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    released: Arc<AtomicBool>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn release(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

// ============================================================================
// LINK ENDPOINTS
// ============================================================================

/// The controller's half of a link: it produces commands and consumes events.
pub struct ControllerEnd {
    pub commands: Sender<DisplayObject>,
    pub events: Receiver<RendererEvent>,
    pub shutdown: TerminationSignal,
}

/// The renderer's half of a link.
pub struct RendererEnd {
    pub commands: Receiver<DisplayObject>,
    pub events: Sender<RendererEvent>,
    pub shutdown: TerminationSignal,
}

/// Create both halves of a fresh link; the termination signal starts held.
pub fn link() -> (ControllerEnd, RendererEnd) {
    let (command_tx, command_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let shutdown = TerminationSignal::new();
    (
        ControllerEnd {
            commands: command_tx,
            events: event_rx,
            shutdown: shutdown.clone(),
        },
        RendererEnd {
            commands: command_rx,
            events: event_tx,
            shutdown,
        },
    )
}

// ============================================================================
// EVENT QUEUE (controller side)
// ============================================================================

pub type Callback = Box<dyn FnMut(&InteractionEvent) + Send>;
pub type LayoutHook = Box<dyn FnMut(WindowLayout) + Send>;

/// Consumer side of the event channel.
///
/// `mpsc` has no length query, so arrivals are pulled into a local buffer
/// before counting. Layout reports are intercepted on the way out and handed
/// to the layout hook instead of the caller.
pub struct EventQueue {
    rx: Receiver<RendererEvent>,
    pending: VecDeque<RendererEvent>,
    callbacks: Vec<Callback>,
    layout_hook: Option<LayoutHook>,
}

impl EventQueue {
    pub fn new(rx: Receiver<RendererEvent>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            callbacks: Vec::new(),
            layout_hook: None,
        }
    }

    /// Number of queued entries, layout reports included.
    pub fn event_count(&mut self) -> usize {
        self.pump();
        self.pending.len()
    }

    /// Next interaction event, or `None` once only layout reports (or
    /// nothing) remain.
    pub fn get_event(&mut self) -> Option<InteractionEvent> {
        self.pump();
        while let Some(event) = self.pending.pop_front() {
            match event {
                RendererEvent::Layout(layout) => {
                    tracing::trace!(?layout, "layout report");
                    if let Some(hook) = self.layout_hook.as_mut() {
                        hook(layout);
                    }
                }
                RendererEvent::Interaction(event) => return Some(event),
            }
        }
        None
    }

    pub fn add_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&InteractionEvent) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn on_layout<F>(&mut self, hook: F)
    where
        F: FnMut(WindowLayout) + Send + 'static,
    {
        self.layout_hook = Some(Box::new(hook));
    }

    /// Drain everything queued, handing each interaction event to every
    /// callback in registration order. Returns the number of events delivered.
    pub fn check_events(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.get_event() {
            for callback in &mut self.callbacks {
                callback(&event);
            }
            delivered += 1;
        }
        delivered
    }

    fn pump(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.pending.push_back(event);
        }
    }
}
