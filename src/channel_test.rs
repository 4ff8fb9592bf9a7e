use super::*;
use crate::geometry::{ScreenPoint, WorldCoord};
use crate::protocol::{KeyEvent, MouseButton, MouseEvent};
use std::sync::Mutex;

fn key(code: &str) -> InteractionEvent {
    InteractionEvent::Key(KeyEvent {
        key_code: code.to_string(),
        world: WorldCoord::ORIGIN,
        selected: Vec::new(),
    })
}

fn click() -> InteractionEvent {
    InteractionEvent::Mouse(MouseEvent {
        screen: ScreenPoint::new(1.0, 2.0),
        world: WorldCoord::ORIGIN,
        button: MouseButton::Left,
        selected: Vec::new(),
    })
}

#[test]
fn signal_releases_exactly_once() {
    let signal = TerminationSignal::new();
    let other = signal.clone();
    assert!(!other.is_released());
    assert!(signal.release());
    assert!(!other.release());
    assert!(other.is_released());
}

#[test]
fn link_starts_held() {
    let (controller, renderer) = link();
    assert!(!controller.shutdown.is_released());
    controller.shutdown.release();
    assert!(renderer.shutdown.is_released());
}

#[test]
fn events_come_out_in_order_and_layouts_are_intercepted() {
    let (controller, renderer) = link();
    let mut queue = EventQueue::new(controller.events);
    let layouts = Arc::new(Mutex::new(Vec::new()));
    let seen = layouts.clone();
    queue.on_layout(move |layout| seen.lock().unwrap().push(layout));

    let layout = WindowLayout { x: 10, y: 20, width: 300, height: 200 };
    renderer.events.send(RendererEvent::Interaction(key("A"))).unwrap();
    renderer.events.send(RendererEvent::Layout(layout)).unwrap();
    renderer.events.send(RendererEvent::Interaction(key("B"))).unwrap();
    renderer.events.send(RendererEvent::Interaction(key("C"))).unwrap();
    renderer.events.send(RendererEvent::Layout(layout)).unwrap();

    assert_eq!(queue.event_count(), 5);
    assert_eq!(queue.get_event(), Some(key("A")));
    assert_eq!(queue.get_event(), Some(key("B")));
    assert_eq!(queue.get_event(), Some(key("C")));
    assert_eq!(queue.get_event(), None);
    assert_eq!(queue.event_count(), 0);
    assert_eq!(*layouts.lock().unwrap(), vec![layout, layout]);
}

#[test]
fn callbacks_run_in_registration_order_once_per_event() {
    let (controller, renderer) = link();
    let mut queue = EventQueue::new(controller.events);
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second"] {
        let log = log.clone();
        queue.add_callback(move |event| {
            let tag = match event {
                InteractionEvent::Mouse(_) => "mouse",
                InteractionEvent::Key(_) => "key",
            };
            log.lock().unwrap().push(format!("{name}:{tag}"));
        });
    }

    renderer.events.send(RendererEvent::Interaction(click())).unwrap();
    renderer
        .events
        .send(RendererEvent::Layout(WindowLayout::default()))
        .unwrap();
    renderer.events.send(RendererEvent::Interaction(key("x"))).unwrap();

    assert_eq!(queue.check_events(), 2);
    assert_eq!(
        *log.lock().unwrap(),
        ["first:mouse", "second:mouse", "first:key", "second:key"]
    );
    assert_eq!(queue.check_events(), 0);
}

#[test]
fn commands_flow_fifo() {
    let (controller, renderer) = link();
    for key in ["a", "b", "c"] {
        controller
            .commands
            .send(DisplayObject::RemoveObject { key: key.into() })
            .unwrap();
    }
    let received: Vec<DisplayObject> = renderer.commands.try_iter().collect();
    assert_eq!(
        received,
        ["a", "b", "c"].map(|k| DisplayObject::RemoveObject { key: k.into() })
    );
}
