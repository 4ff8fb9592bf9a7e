use super::*;
use crate::channel::{self, ControllerEnd};
use crate::error::{IconError, RenderError};
use crate::protocol::WindowLayout;
use crate::render::{HeadlessSurface, Scene};
use std::time::Duration;

fn running(config: ViewerConfig) -> (ViewController, ControllerEnd, HeadlessSurface, Instant) {
    let (controller_end, renderer_end) = channel::link();
    let mut vc = ViewController::new(config, renderer_end);
    let t0 = Instant::now();
    vc.surface_ready(800, 600, t0);
    (vc, controller_end, HeadlessSurface::new(800, 600), t0)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn drain(end: &ControllerEnd) -> Vec<RendererEvent> {
    end.events.try_iter().collect()
}

struct FlakySurface {
    inner: HeadlessSurface,
    panics_left: usize,
    errors_left: usize,
}

impl Surface for FlakySurface {
    fn present(&mut self, scene: &Scene<'_>) -> Result<(), RenderError> {
        if self.panics_left > 0 {
            self.panics_left -= 1;
            panic!("gpu fell over");
        }
        if self.errors_left > 0 {
            self.errors_left -= 1;
            return Err(RenderError::FontParse("bogus".into()));
        }
        self.inner.present(scene)
    }

    fn layout(&self) -> WindowLayout {
        self.inner.layout()
    }

    fn apply_layout(&mut self, layout: &WindowLayout) {
        self.inner.apply_layout(layout);
    }
}

struct StubIcons;

impl IconLoader for StubIcons {
    fn load_icon(&self, path: &Path) -> Result<IconImage, IconError> {
        if path.ends_with("ok.png") {
            Ok(IconImage {
                width: 1,
                height: 1,
                rgba: vec![1, 2, 3, 255],
            })
        } else {
            Err(IconError::Image(image::ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "missing",
            ))))
        }
    }
}

#[test]
fn starting_phase_waits_for_surface() {
    let (_controller_end, renderer_end) = channel::link();
    let mut vc = ViewController::new(ViewerConfig::default(), renderer_end);
    let mut surface = HeadlessSurface::new(10, 10);
    assert_eq!(vc.tick(Instant::now(), &mut surface), Phase::Starting);
    assert_eq!(surface.presented(), 0);
    vc.surface_ready(10, 10, Instant::now());
    assert_eq!(vc.phase(), Phase::Running);
    assert_eq!(vc.view().viewport(), (10, 10));
}

#[test]
fn commands_are_merged_and_trigger_one_redraw() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    end.commands
        .send(DisplayObject::position("a", "returns", WorldCoord::new(1.0, 0.0)))
        .unwrap();
    end.commands
        .send(DisplayObject::position("b", "returns", WorldCoord::new(2.0, 0.0)))
        .unwrap();

    vc.tick(t0, &mut surface);
    assert_eq!(vc.store().len(), 2);
    assert_eq!(surface.presented(), 1);
    assert!(!vc.needs_redraw());

    // nothing changed, nothing drawn
    vc.tick(t0 + ms(500), &mut surface);
    assert_eq!(surface.presented(), 1);
}

#[test]
fn redraws_respect_the_frame_interval() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    vc.tick(t0, &mut surface);
    assert_eq!(surface.presented(), 1);

    end.commands.send(DisplayObject::Heading { degrees: 45.0 }).unwrap();
    vc.tick(t0 + ms(50), &mut surface);
    assert_eq!(surface.presented(), 1);
    assert!(vc.needs_redraw());
    assert_eq!(vc.view().heading_deg, 45.0);

    vc.tick(t0 + ms(200), &mut surface);
    assert_eq!(surface.presented(), 2);
}

#[test]
fn toggles_flip_view_state_and_request_redraw() {
    let (mut vc, _end, mut surface, t0) = running(ViewerConfig::default());
    vc.tick(t0, &mut surface);
    assert!(!vc.needs_redraw());

    vc.handle_input(UiInput::Toggle(Toggle::Relative));
    assert_eq!(vc.view().rotation_mode, RotationMode::Absolute);
    assert!(vc.needs_redraw());

    vc.handle_input(UiInput::Toggle(Toggle::Grid));
    assert!(!vc.view().grid_enabled);
    vc.handle_input(UiInput::Toggle(Toggle::DistanceLabels));
    assert!(!vc.view().distance_labels_enabled);
    vc.handle_input(UiInput::Toggle(Toggle::Relative));
    assert_eq!(vc.view().rotation_mode, RotationMode::Relative);
}

#[test]
fn wheel_sequence_changes_zoom_range() {
    let (mut vc, _end, _surface, _t0) = running(ViewerConfig::default());
    vc.handle_input(UiInput::Wheel { away: true });
    vc.handle_input(UiInput::Wheel { away: true });
    vc.handle_input(UiInput::Wheel { away: false });
    assert_eq!(vc.view().zoom_range, 11.0);
}

#[test]
fn layout_is_reported_at_most_once_per_interval() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    for step in 0..=20 {
        vc.tick(t0 + ms(step * 100), &mut surface);
    }
    let layouts = drain(&end)
        .into_iter()
        .filter(|e| matches!(e, RendererEvent::Layout(_)))
        .count();
    // reports at 1.0 s and 2.0 s
    assert_eq!(layouts, 2);
}

#[test]
fn layout_update_command_moves_the_surface() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    let layout = WindowLayout { x: 50, y: 60, width: 640, height: 480 };
    end.commands
        .send(DisplayObject::LayoutUpdate { geometry: layout })
        .unwrap();
    vc.tick(t0, &mut surface);
    assert_eq!(surface.layout(), layout);
    assert!(vc.store().is_empty());
}

#[test]
fn click_reports_hits_under_the_pointer() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    end.commands
        .send(DisplayObject::position("a", "returns", WorldCoord::new(3.0, 0.0)))
        .unwrap();
    end.commands
        .send(DisplayObject::position("b", "returns", WorldCoord::new(3.0, 2.0)))
        .unwrap();
    vc.tick(t0, &mut surface);
    drain(&end);

    let on_a = geometry::to_pixel(WorldCoord::new(3.0, 0.0), vc.view());
    vc.handle_input(UiInput::PointerMoved(on_a));
    vc.handle_input(UiInput::Button { button: MouseButton::Left, pressed: true });
    vc.handle_input(UiInput::Button { button: MouseButton::Left, pressed: false });

    let events = drain(&end);
    assert_eq!(events.len(), 1);
    let RendererEvent::Interaction(InteractionEvent::Mouse(click)) = &events[0] else {
        panic!("expected a mouse event, got {events:?}");
    };
    assert_eq!(click.button, MouseButton::Left);
    let keys: Vec<&str> = click.selected.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, ["a"]);
    assert!((click.world.north - 3.0).abs() < 1e-9);
}

#[test]
fn release_without_press_is_not_a_click() {
    let (mut vc, end, _surface, _t0) = running(ViewerConfig::default());
    vc.handle_input(UiInput::PointerMoved(ScreenPoint::new(5.0, 5.0)));
    vc.handle_input(UiInput::Button { button: MouseButton::Right, pressed: false });
    vc.handle_input(UiInput::Button { button: MouseButton::Left, pressed: true });
    vc.handle_input(UiInput::Button { button: MouseButton::Right, pressed: false });
    assert!(drain(&end).is_empty());
}

#[test]
fn key_press_reports_world_under_pointer() {
    let (mut vc, end, _surface, _t0) = running(ViewerConfig::default());
    vc.handle_input(UiInput::PointerMoved(ScreenPoint::new(430.0, 300.0)));
    vc.handle_input(UiInput::Key { key_code: "KeyM".into() });
    let events = drain(&end);
    let RendererEvent::Interaction(InteractionEvent::Key(key)) = &events[0] else {
        panic!("expected a key event, got {events:?}");
    };
    assert_eq!(key.key_code, "KeyM");
    // 30 px right of centre at 30 px/m, heading 0
    assert!((key.world.east - 1.0).abs() < 1e-9);
    assert!(key.world.north.abs() < 1e-9);
}

#[test]
fn malformed_commands_do_not_stop_the_stream() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    end.commands
        .send(DisplayObject::position("", "returns", WorldCoord::ORIGIN))
        .unwrap();
    end.commands.send(DisplayObject::Heading { degrees: f64::NAN }).unwrap();
    end.commands
        .send(DisplayObject::position("ok", "returns", WorldCoord::new(1.0, 1.0)))
        .unwrap();
    vc.tick(t0, &mut surface);
    assert_eq!(vc.store().len(), 1);
    assert!(vc.store().get("returns", "ok").is_some());
    assert_eq!(vc.view().heading_deg, 0.0);
}

#[test]
fn icon_commands_go_through_the_loader() {
    let (controller_end, renderer_end) = channel::link();
    let mut vc = ViewController::new(ViewerConfig::default(), renderer_end).with_icon_loader(StubIcons);
    let t0 = Instant::now();
    vc.surface_ready(100, 100, t0);
    let mut surface = HeadlessSurface::new(100, 100);

    controller_end
        .commands
        .send(DisplayObject::Icon { image_ref: "missing.png".into() })
        .unwrap();
    vc.tick(t0, &mut surface);
    assert!(vc.icon.is_none());

    controller_end
        .commands
        .send(DisplayObject::Icon { image_ref: "/tmp/ok.png".into() })
        .unwrap();
    vc.tick(t0 + ms(300), &mut surface);
    assert_eq!(vc.icon.as_ref().map(|i| i.width), Some(1));
}

#[test]
fn render_failures_are_contained() {
    let (mut vc, _end, _surface, t0) = running(ViewerConfig::default());
    let mut surface = FlakySurface {
        inner: HeadlessSurface::new(800, 600),
        panics_left: 1,
        errors_left: 1,
    };

    assert_eq!(vc.tick(t0, &mut surface), Phase::Running);
    assert!(vc.needs_redraw());
    assert_eq!(vc.tick(t0 + ms(200), &mut surface), Phase::Running);
    assert!(vc.needs_redraw());
    assert_eq!(vc.tick(t0 + ms(400), &mut surface), Phase::Running);
    assert!(!vc.needs_redraw());
    assert_eq!(surface.inner.presented(), 1);
}

#[test]
fn termination_signal_walks_to_terminated() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    end.commands
        .send(DisplayObject::position("a", "l", WorldCoord::new(1.0, 0.0)))
        .unwrap();
    vc.tick(t0, &mut surface);

    end.shutdown.release();
    assert_eq!(vc.tick(t0 + ms(50), &mut surface), Phase::Closing);
    assert_eq!(vc.tick(t0 + ms(100), &mut surface), Phase::Terminated);
    assert!(vc.store().is_empty());
    assert_eq!(vc.tick(t0 + ms(150), &mut surface), Phase::Terminated);
}

#[test]
fn window_close_releases_resources_and_the_signal() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    end.commands
        .send(DisplayObject::position("a", "l", WorldCoord::new(1.0, 0.0)))
        .unwrap();
    vc.tick(t0, &mut surface);
    assert_eq!(vc.store().len(), 1);

    vc.request_close();
    assert_eq!(vc.phase(), Phase::Closing);
    assert!(end.shutdown.is_released());
    assert_eq!(vc.tick(t0 + ms(50), &mut surface), Phase::Terminated);
    assert!(vc.store().is_empty());

    // a second request once terminated changes nothing
    vc.request_close();
    assert_eq!(vc.phase(), Phase::Terminated);
}

#[test]
fn dropped_controller_counts_as_close() {
    let (mut vc, end, mut surface, t0) = running(ViewerConfig::default());
    drop(end);
    assert_eq!(vc.tick(t0, &mut surface), Phase::Running);
    assert_eq!(vc.tick(t0 + ms(50), &mut surface), Phase::Closing);
}
