//! The render process: a winit window with a pixels framebuffer hosting the
//! [`ViewController`]. Commands arrive on stdin and events leave on stdout
//! through [`bridge_child_stdio`].

use pixels::{Pixels, SurfaceTexture};
use rusttype::Font;
use std::sync::Arc;
use std::time::Instant;

use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::channel;
use crate::config::ViewerConfig;
use crate::controller::{Phase, Toggle, UiInput, ViewController};
use crate::error::RenderError;
use crate::geometry::ScreenPoint;
use crate::lifecycle::bridge_child_stdio;
use crate::protocol::{MouseButton, WindowLayout};
use crate::render::{self, Canvas, Scene, Surface};

// ============================================================================
// WINDOW SURFACE
// ============================================================================

struct WinitSurface {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    font: Option<Font<'static>>,
    width: u32,
    height: u32,
}

impl WinitSurface {
    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError> {
        // minimised windows report a zero size
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.pixels.resize_buffer(size.width, size.height)?;
        self.pixels.resize_surface(size.width, size.height)?;
        self.width = size.width;
        self.height = size.height;
        Ok(())
    }
}

impl Surface for WinitSurface {
    fn present(&mut self, scene: &Scene<'_>) -> Result<(), RenderError> {
        let (width, height) = (self.width as usize, self.height as usize);
        let mut canvas = Canvas::new(self.pixels.frame_mut(), width, height);
        scene.render(&mut canvas, self.font.as_ref());
        self.pixels.render()?;
        Ok(())
    }

    fn layout(&self) -> WindowLayout {
        let position = self
            .window
            .outer_position()
            .unwrap_or(PhysicalPosition::new(0, 0));
        let size = self.window.inner_size();
        WindowLayout {
            x: position.x,
            y: position.y,
            width: size.width,
            height: size.height,
        }
    }

    fn apply_layout(&mut self, layout: &WindowLayout) {
        tracing::debug!(?layout, "restoring window layout");
        self.window
            .set_outer_position(PhysicalPosition::new(layout.x, layout.y));
        if layout.width > 0 && layout.height > 0 {
            let _ = self
                .window
                .request_inner_size(PhysicalSize::new(layout.width, layout.height));
        }
    }
}

// ============================================================================
// EVENT LOOP
// ============================================================================

/// Run the renderer until the controller closes it or the window is closed.
pub fn run_renderer(config: ViewerConfig) -> Result<(), RenderError> {
    let font = match config.font_path.as_deref() {
        Some(path) => match render::load_font(path) {
            Ok(font) => Some(font),
            Err(err) => {
                tracing::warn!(%err, "labels disabled");
                None
            }
        },
        None => None,
    };

    let (controller_end, renderer_end) = channel::link();
    let _bridges = bridge_child_stdio(controller_end);

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(LogicalSize::new(
            config.window_width as f64,
            config.window_height as f64,
        ))
        .build(&event_loop)?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
    let pixels = Pixels::new(size.width, size.height, surface_texture)?;
    let mut surface = WinitSurface {
        window,
        pixels,
        font,
        width: size.width,
        height: size.height,
    };

    let tick_interval = config.tick_interval;
    let mut controller = ViewController::new(config, renderer_end);
    controller.surface_ready(size.width, size.height, Instant::now());

    let mut ctrl_held = false;

    event_loop.run(move |event, window_target| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                tracing::info!("window closed by user");
                controller.request_close();
                if controller.tick(Instant::now(), &mut surface) == Phase::Terminated {
                    window_target.exit();
                }
            }
            WindowEvent::Resized(new_size) => match surface.resize(new_size) {
                Ok(()) => controller.handle_input(UiInput::Resized {
                    width: new_size.width,
                    height: new_size.height,
                }),
                Err(err) => tracing::warn!(%err, "resize failed"),
            },
            WindowEvent::RedrawRequested => controller.invalidate(),
            WindowEvent::CursorMoved { position, .. } => {
                controller.handle_input(UiInput::PointerMoved(ScreenPoint::new(position.x, position.y)));
            }
            WindowEvent::MouseInput { state, button, .. } => {
                controller.handle_input(UiInput::Button {
                    button: map_button(button),
                    pressed: state == ElementState::Pressed,
                });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y as f64,
                    MouseScrollDelta::PixelDelta(p) => p.y,
                };
                if dy != 0.0 {
                    controller.handle_input(UiInput::Wheel { away: dy > 0.0 });
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                ctrl_held = modifiers.state().control_key();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match (ctrl_held, code) {
                    (true, KeyCode::KeyR) => controller.handle_input(UiInput::Toggle(Toggle::Relative)),
                    (true, KeyCode::KeyG) => controller.handle_input(UiInput::Toggle(Toggle::Grid)),
                    (true, KeyCode::KeyD) => {
                        controller.handle_input(UiInput::Toggle(Toggle::DistanceLabels))
                    }
                    _ => controller.handle_input(UiInput::Key {
                        key_code: format!("{code:?}"),
                    }),
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            if controller.tick(now, &mut surface) == Phase::Terminated {
                window_target.exit();
            } else {
                window_target.set_control_flow(ControlFlow::WaitUntil(now + tick_interval));
            }
        }
        _ => {}
    })?;

    tracing::debug!("render loop finished");
    Ok(())
}

fn map_button(button: winit::event::MouseButton) -> MouseButton {
    use winit::event::MouseButton as Winit;
    match button {
        Winit::Left => MouseButton::Left,
        Winit::Right => MouseButton::Right,
        Winit::Middle => MouseButton::Middle,
        // X11 numbering
        Winit::Back => MouseButton::Other(8),
        Winit::Forward => MouseButton::Other(9),
        Winit::Other(n) => MouseButton::Other(n),
    }
}
