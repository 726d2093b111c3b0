//! Kestrel CLI - headless frame driver
//!
//! Loads a JSON scene into a tab, replays its input, runs animation frames
//! through the commit protocol and saves the composited result as a PNG.
//!
//! Usage:
//!   kestrel demos/scene.json
//!   kestrel demos/scene.json --frames 30 --output fade.png
//!   kestrel demos/scene.json --dark --zoom 1.5 --dump-layers

mod scene;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kestrel_browser::{AccessibilityNode, Browser};
use kestrel_common::Settings;
use owo_colors::OwoColorize;

use scene::Scene;

/// Kestrel - render a JSON scene through the threaded pipeline
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Render one frame
    kestrel demos/scene.json

    # Let transitions run for 40 frames
    kestrel demos/scene.json --frames 40 -o out.png

    # Show the composited layers and the accessibility tree
    kestrel demos/scene.json --dump-layers --dump-a11y
"#)]
struct Cli {
    /// Scene file to load
    #[arg(value_name = "SCENE")]
    scene: PathBuf,

    /// Number of animation frames to run
    #[arg(short, long, default_value = "1")]
    frames: u32,

    /// Where to write the PNG
    #[arg(short, long, value_name = "FILE", default_value = "kestrel.png")]
    output: PathBuf,

    /// Scroll by this many pixels before the first frame
    #[arg(long, value_name = "PX")]
    scroll: Option<f32>,

    /// Use the dark color scheme
    #[arg(long)]
    dark: bool,

    /// Zoom factor
    #[arg(long)]
    zoom: Option<f32>,

    /// Viewport width
    #[arg(long)]
    width: Option<f32>,

    /// Viewport height
    #[arg(long)]
    height: Option<f32>,

    /// Settings file (JSON); flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the composited layers after the last frame
    #[arg(long)]
    dump_layers: bool,

    /// Print the accessibility tree as JSON
    #[arg(long)]
    dump_a11y: bool,

    /// Log pipeline stages and commits
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = load_settings(&cli)?;
    let scene = Scene::from_path(&cli.scene)?;
    let document = scene.document()?;

    let mut browser = Browser::new(settings.clone());
    let _ = browser.new_tab(None)?;
    let report = browser.load(document)?;
    for skipped in &report.skipped {
        eprintln!("{} {skipped}", "skipped:".yellow());
    }

    for action in &scene.actions {
        action.apply(&mut browser);
    }
    if let Some(delta) = cli.scroll {
        browser.scroll_by(delta);
    }

    let mut surface = browser
        .new_surface()
        .context("viewport must be at least one pixel in each direction")?;
    let timeout = settings.refresh_interval() * 4 + Duration::from_secs(2);
    let mut drawn = 0;
    for _ in 0..cli.frames.max(1) {
        if browser.render_frame(&mut surface, timeout) {
            drawn += 1;
        }
    }

    surface
        .save_png(&cli.output)
        .with_context(|| format!("failed to write '{}'", cli.output.display()))?;

    let compositor = browser.compositor();
    if cli.dump_layers {
        print_layers(&compositor.layer_items());
    }
    if cli.dump_a11y {
        print_accessibility(compositor.accessibility_tree().as_ref())?;
    }
    for navigation in compositor.take_navigations() {
        println!("{} {}", "navigate:".cyan(), navigation.url);
        if let Some(body) = navigation.body {
            println!("  body: {body}");
        }
    }

    println!(
        "{} {} ({} frames drawn, {} commits, height {:.0}px, scroll {:.0}px)",
        "wrote".green().bold(),
        cli.output.display(),
        drawn,
        compositor.commit_count(),
        compositor.height(),
        compositor.scroll(),
    );
    browser.shutdown();
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Settings from `--config`, then the command-line overrides.
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?;
            Settings::from_json_str(&text)?
        }
        None => Settings::default(),
    };
    if let Some(width) = cli.width {
        settings.viewport_width = width;
    }
    if let Some(height) = cli.height {
        settings.viewport_height = height;
    }
    if let Some(zoom) = cli.zoom {
        settings.zoom = zoom;
    }
    settings.dark_mode |= cli.dark;
    settings.validate()?;
    Ok(settings)
}

fn print_layers(layers: &[Vec<usize>]) {
    println!("{}", format!("=== Composited Layers ({}) ===", layers.len()).bold());
    for (index, items) in layers.iter().enumerate() {
        println!("  layer {index}: {} items {items:?}", items.len());
    }
}

fn print_accessibility(tree: Option<&AccessibilityNode>) -> anyhow::Result<()> {
    println!("{}", "=== Accessibility Tree ===".bold());
    match tree {
        Some(tree) => println!("{}", serde_json::to_string_pretty(tree)?),
        None => println!("  (none committed)"),
    }
    Ok(())
}
