use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ppi_viewer::channel::RendererEnd;
use ppi_viewer::controller::{Phase, ViewController};
use ppi_viewer::render::HeadlessSurface;
use ppi_viewer::{
    CloseOutcome, DisplayObject, PpiViewer, RendererHandle, RendererSpawner, ViewerConfig,
    ViewerError, WindowLayout, WorldCoord,
};

/// Runs a real [`ViewController`] on a thread against a headless surface.
struct ThreadSpawner {
    honour_close: bool,
}

struct ThreadHandle {
    thread: Option<JoinHandle<()>>,
    killed: Arc<AtomicBool>,
}

impl RendererHandle for ThreadHandle {
    fn is_alive(&mut self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn terminate(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    fn wait(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

impl RendererSpawner for ThreadSpawner {
    type Handle = ThreadHandle;

    fn spawn(&self, config: &ViewerConfig, link: RendererEnd) -> Result<ThreadHandle, ViewerError> {
        let killed = Arc::new(AtomicBool::new(false));
        let killed_flag = killed.clone();
        let honour_close = self.honour_close;
        let config = config.clone();

        let thread = thread::spawn(move || {
            if !honour_close {
                // wedged renderer: holds the link and never looks at the signal
                let _link = link;
                while !killed_flag.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(10));
                }
                return;
            }
            let mut surface = HeadlessSurface::new(config.window_width, config.window_height);
            let mut controller = ViewController::new(config.clone(), link);
            controller.surface_ready(config.window_width, config.window_height, Instant::now());
            while !killed_flag.load(Ordering::SeqCst) {
                if controller.tick(Instant::now(), &mut surface) == Phase::Terminated {
                    break;
                }
                thread::sleep(config.tick_interval);
            }
        });

        Ok(ThreadHandle {
            thread: Some(thread),
            killed,
        })
    }
}

struct FailingSpawner;

impl RendererSpawner for FailingSpawner {
    type Handle = ThreadHandle;

    fn spawn(&self, _config: &ViewerConfig, _link: RendererEnd) -> Result<ThreadHandle, ViewerError> {
        Err(ViewerError::Spawn(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no display",
        )))
    }
}

fn fast_config() -> ViewerConfig {
    ViewerConfig::builder()
        .window_width(200)
        .window_height(200)
        .tick_interval(Duration::from_millis(5))
        .frame_interval(Duration::from_millis(10))
        .layout_interval(Duration::from_millis(20))
        .build()
}

#[test]
fn cooperative_renderer_closes_gracefully() {
    let mut viewer = PpiViewer::start_with(&fast_config(), &ThreadSpawner { honour_close: true }).unwrap();
    assert!(viewer.is_alive());

    let started = Instant::now();
    assert_eq!(viewer.close(), CloseOutcome::Graceful);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!viewer.is_alive());
    assert_eq!(viewer.close(), CloseOutcome::AlreadyClosed);
}

#[test]
fn wedged_renderer_is_terminated() {
    let mut viewer = PpiViewer::start_with(&fast_config(), &ThreadSpawner { honour_close: false }).unwrap();

    let started = Instant::now();
    assert_eq!(viewer.close(), CloseOutcome::Forced);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(5));
    assert!(!viewer.is_alive());
}

#[test]
fn spawn_failure_is_reported() {
    let result = PpiViewer::start_with(&fast_config(), &FailingSpawner);
    assert!(matches!(result, Err(ViewerError::Spawn(_))));
}

#[test]
fn non_finite_zoom_is_rejected_before_spawning() {
    // FailingSpawner would report Spawn; InvalidConfig means it was never asked
    for (range, increment, field) in [
        (f64::INFINITY, 1.0, "zoom_range"),
        (f64::NAN, 1.0, "zoom_range"),
        (10.0, f64::NEG_INFINITY, "zoom_increment"),
        (10.0, 0.0, "zoom_increment"),
    ] {
        let config = ViewerConfig::builder()
            .zoom_range(range)
            .zoom_increment(increment)
            .build();
        match PpiViewer::start_with(&config, &FailingSpawner) {
            Err(ViewerError::InvalidConfig { field: rejected, .. }) => assert_eq!(rejected, field),
            Err(other) => panic!("expected InvalidConfig for {field}, got {other}"),
            Ok(_) => panic!("expected InvalidConfig for {field}"),
        }
    }
}

#[test]
fn valid_config_survives_the_command_line_encoding() {
    let config = ViewerConfig::builder().zoom_range(0.5).zoom_increment(0.25).build();
    config.validate().unwrap();
    let decoded: ViewerConfig = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(decoded, config);
}

#[test]
fn layout_hook_can_restore_placement_through_a_command_handle() {
    let mut viewer = PpiViewer::start_with(&fast_config(), &ThreadSpawner { honour_close: true }).unwrap();
    let saved = WindowLayout { x: 40, y: 30, width: 320, height: 240 };
    let layouts = Arc::new(Mutex::new(Vec::new()));
    let sink = layouts.clone();
    let handle = viewer.command_handle();
    viewer.on_layout(move |layout| {
        sink.lock().unwrap().push(layout);
        if layout != saved {
            handle.set_layout(saved);
        }
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    while !layouts.lock().unwrap().contains(&saved) && Instant::now() < deadline {
        viewer.check_events();
        thread::sleep(Duration::from_millis(10));
    }

    let layouts = layouts.lock().unwrap().clone();
    assert_ne!(layouts.first(), Some(&saved));
    assert!(layouts.contains(&saved));
    assert_eq!(viewer.close(), CloseOutcome::Graceful);
}

#[test]
fn layout_reports_reach_the_hook_not_callbacks() {
    let mut viewer = PpiViewer::start_with(&fast_config(), &ThreadSpawner { honour_close: true }).unwrap();
    let layouts = Arc::new(Mutex::new(Vec::new()));
    let sink = layouts.clone();
    viewer.on_layout(move |layout| sink.lock().unwrap().push(layout));
    let callbacks = Arc::new(Mutex::new(0usize));
    let seen = callbacks.clone();
    viewer.add_callback(move |_| *seen.lock().unwrap() += 1);

    viewer.set_layout(WindowLayout { x: 5, y: 6, width: 300, height: 200 });
    viewer.add_object(DisplayObject::position("a", "returns", WorldCoord::new(2.0, 2.0)));
    viewer.set_heading(90.0);

    let restored = WindowLayout { x: 5, y: 6, width: 300, height: 200 };
    let deadline = Instant::now() + Duration::from_secs(2);
    while !layouts.lock().unwrap().contains(&restored) && Instant::now() < deadline {
        viewer.check_events();
        thread::sleep(Duration::from_millis(10));
    }

    assert!(layouts.lock().unwrap().contains(&restored));
    assert_eq!(*callbacks.lock().unwrap(), 0);
    assert_eq!(viewer.get_event(), None);

    assert_eq!(viewer.close(), CloseOutcome::Graceful);
}

#[test]
fn commands_after_close_are_dropped_quietly() {
    let mut viewer = PpiViewer::start_with(&fast_config(), &ThreadSpawner { honour_close: true }).unwrap();
    assert_eq!(viewer.close(), CloseOutcome::Graceful);
    viewer.remove_object("a");
    viewer.hide_object("a", true);
    assert!(!viewer.is_alive());
    assert_eq!(viewer.close(), CloseOutcome::AlreadyClosed);
}

#[test]
fn icon_builds_an_icon_command() {
    let viewer = PpiViewer::start_with(&fast_config(), &ThreadSpawner { honour_close: true }).unwrap();
    assert_eq!(
        viewer.icon("/data/boat.png"),
        DisplayObject::Icon { image_ref: "/data/boat.png".into() }
    );
}

#[cfg(unix)]
mod child_process {
    use super::*;
    use ppi_viewer::ProcessSpawner;

    fn shell(script: &str) -> ProcessSpawner {
        ProcessSpawner::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn child_exits_when_stdin_closes() {
        let mut viewer = PpiViewer::start_with(&fast_config(), &shell("exec cat > /dev/null")).unwrap();
        viewer.add_object(DisplayObject::position("a", "returns", WorldCoord::new(1.0, 0.0)));
        assert!(viewer.is_alive());
        assert_eq!(viewer.close(), CloseOutcome::Graceful);
        assert!(!viewer.is_alive());
    }

    #[test]
    fn stubborn_child_is_killed() {
        let mut viewer = PpiViewer::start_with(&fast_config(), &shell("exec sleep 30")).unwrap();
        let started = Instant::now();
        assert_eq!(viewer.close(), CloseOutcome::Forced);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn event_frames_from_stdout_are_delivered() {
        let frame = r#"{"Interaction":{"kind":"key","key_code":"KeyA","world":{"north":1.0,"east":2.0},"selected":[]}}"#;
        let script = format!("echo 'garbage'; echo '{frame}'; exec cat > /dev/null");
        let mut viewer = PpiViewer::start_with(&fast_config(), &shell(&script)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut event = None;
        while event.is_none() && Instant::now() < deadline {
            event = viewer.get_event();
            thread::sleep(Duration::from_millis(10));
        }
        let event = event.expect("key event from child stdout");
        assert!(event.selected().is_empty());
        assert_eq!(viewer.close(), CloseOutcome::Graceful);
    }

    #[test]
    fn missing_binary_fails_to_start() {
        let spawner = ProcessSpawner::new("/definitely/not/a/binary");
        let result = PpiViewer::start_with(&fast_config(), &spawner);
        assert!(matches!(result, Err(ViewerError::Spawn(_))));
    }
}
