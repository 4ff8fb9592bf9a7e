use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ppi_viewer::demo::DemoFeed;
use ppi_viewer::{logging, window, DisplayObject, InteractionEvent, PpiViewer, ViewerConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "ppi-viewer", about = "Plan position indicator for proximity returns")]
struct Cli {
    /// The radius of the view, in metres
    #[arg(long, default_value_t = 10.0)]
    range: f64,

    /// Zoom in/out step size, in metres
    #[arg(long, default_value_t = 1.0)]
    zoom_increment: f64,

    /// Show the polar grid (default)
    #[arg(long, overrides_with = "no_grid")]
    grid: bool,

    /// Hide the polar grid
    #[arg(long, overrides_with = "grid")]
    no_grid: bool,

    /// Vehicle icon drawn at the origin
    #[arg(long)]
    icon: Option<PathBuf>,

    /// TrueType/OpenType font for labels; labels are skipped without one
    #[arg(long)]
    font: Option<PathBuf>,

    /// Print mouse and key events
    #[arg(long)]
    verbose: bool,

    /// Show debug info
    #[arg(long)]
    debug: bool,

    /// Feed this many random drifting returns into the view
    #[arg(long, default_value_t = 0)]
    demo: usize,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the render process (started by the viewer itself)
    #[command(hide = true)]
    Render {
        /// JSON-encoded viewer configuration
        #[arg(long)]
        config: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Mode::Render { ref config }) => run_render(config),
        None => run_controller(&cli),
    }
}

fn run_render(encoded: &str) -> anyhow::Result<()> {
    let config: ViewerConfig =
        serde_json::from_str(encoded).context("invalid render configuration")?;
    logging::init(config.debug);
    window::run_renderer(config).context("render process failed")
}

fn run_controller(cli: &Cli) -> anyhow::Result<()> {
    logging::init(cli.debug);

    let grid = !cli.no_grid;
    let config = ViewerConfig::builder()
        .zoom_range(cli.range)
        .zoom_increment(cli.zoom_increment)
        .grid(grid)
        .maybe_font_path(cli.font.clone())
        .debug(cli.debug)
        .build();

    let mut viewer = PpiViewer::start(&config).context("failed to start viewer")?;

    if grid {
        viewer.add_object(DisplayObject::PolarGrid {});
    }
    if let Some(icon) = &cli.icon {
        viewer.add_object(viewer.icon(icon));
    }
    if cli.verbose {
        viewer.add_callback(|event| match event {
            InteractionEvent::Mouse(mouse) => println!(
                "Mouse event at (X/Y={:.0}/{:.0}) for {} objects",
                mouse.screen.x,
                mouse.screen.y,
                mouse.selected.len()
            ),
            InteractionEvent::Key(key) => println!(
                "Key event at {:.2}/{:.2} for {} objects",
                key.world.north,
                key.world.east,
                key.selected.len()
            ),
        });
    }

    let mut feed = (cli.demo > 0).then(|| DemoFeed::new(cli.demo, cli.range, rand::rng()));

    while viewer.is_alive() {
        viewer.check_events();
        if let Some(feed) = feed.as_mut() {
            for command in feed.step() {
                viewer.add_object(command);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    viewer.close();
    Ok(())
}
