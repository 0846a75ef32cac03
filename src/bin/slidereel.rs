use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "slidereel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the slide timeline of a design as JSON.
    Plan(PlanArgs),
    /// Render the frame shown at a given time as a PNG.
    Frame(FrameArgs),
    /// Record a design in real time.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct CommonArgs {
    /// Input video design JSON.
    #[arg(long)]
    design: PathBuf,

    /// Studio config JSON (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Font file for the CPU surface (overrides the config).
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Elapsed time in seconds.
    #[arg(long, default_value_t = 0.0)]
    at: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Output path. Defaults to a file named after the title in the configured output dir.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output format (overrides the config's recorder).
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,

    /// Run the full session against a draw-call log and an in-memory recorder, in virtual time.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Gif,
    Mp4,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Plan(args) => cmd_plan(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn load(common: &CommonArgs) -> anyhow::Result<(slidereel::VideoDesign, slidereel::StudioConfig)> {
    let design = slidereel::VideoDesign::from_path(&common.design)?;
    design.validate()?;

    let mut config = match &common.config {
        Some(path) => slidereel::StudioConfig::from_path(path)?,
        None => slidereel::StudioConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(font) = &common.font {
        config.font_path = Some(font.clone());
    }
    if config.assets_root.is_none() {
        config.assets_root = Some(
            common
                .design
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf(),
        );
    }
    Ok((design, config))
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let (design, config) = load(&args.common)?;
    let duration_secs = design.effective_duration_secs();
    let plan = slidereel::compute_slide_plan(&design, duration_secs, config.sub_slides);

    let out = serde_json::json!({
        "title": design.title,
        "duration_secs": plan.total_duration_secs(),
        "slide_duration_secs": plan.slide_duration_secs(),
        "slides": plan.slides(),
    });
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &out).context("write plan JSON")?;
    writeln!(stdout)?;
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    use slidereel::SurfaceFactory as _;

    let (design, config) = load(&args.common)?;
    let opts = config.composer_opts()?;
    let plan = slidereel::compute_slide_plan(
        &design,
        design.effective_duration_secs(),
        config.sub_slides,
    );
    let active = plan.slide_at(args.at);

    let mut surface = config.surface_kind()?.create_surface(design.canvas)?;
    let mut images = slidereel::ImageStore::new(
        opts.assets_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(".")),
    );
    slidereel::render_slide(
        surface.as_mut(),
        &slidereel::SlideLayout::for_canvas(design.canvas),
        active.slide,
        &opts.style,
        &mut images,
    )?;
    let frame = surface.snapshot()?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.to_straight_rgba8(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} (slide {} of {})",
        args.out.display(),
        active.index + 1,
        plan.len()
    );
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let (design, mut config) = load(&args.common)?;
    match args.format {
        Some(FormatChoice::Gif) => config.recorder = slidereel::RecorderKind::Gif,
        Some(FormatChoice::Mp4) => {
            if !matches!(config.recorder, slidereel::RecorderKind::Ffmpeg(_)) {
                config.recorder =
                    slidereel::RecorderKind::Ffmpeg(slidereel::FfmpegRecorderOpts::default());
            }
        }
        None => {}
    }
    let mut opts = config.composer_opts()?;

    let composer = if args.dry_run {
        opts.persist = false;
        slidereel::Composer::new(
            opts,
            Arc::new(slidereel::ManualClock::new()),
            slidereel::SurfaceKind::Recording,
            slidereel::RecorderKind::InMemory,
        )
    } else {
        slidereel::Composer::new(
            opts,
            Arc::new(slidereel::SystemClock::new()),
            config.surface_kind()?,
            config.recorder.clone(),
        )
    };

    let mut last = None;
    let rec = composer.generate(&design, |p| {
        if last != Some(p) {
            last = Some(p);
            eprint!("\rrecording... {p:>3}%");
        }
    });
    eprintln!();
    let rec = match rec {
        Ok(rec) => rec,
        Err(e) => match e.stop_reason() {
            Some(reason) => anyhow::bail!("recording stopped early ({}): {e}", reason.code()),
            None => return Err(e.into()),
        },
    };

    let written = match (&args.out, &rec.path) {
        (Some(out), Some(path)) if out != path => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            std::fs::copy(path, out).with_context(|| {
                format!("copy '{}' to '{}'", path.display(), out.display())
            })?;
            Some(out.clone())
        }
        (_, path) => path.clone(),
    };

    let summary = serde_json::json!({
        "frames": rec.frames,
        "duration_secs": rec.duration_secs,
        "mime": rec.mime,
        "size": rec.size,
        "path": written,
        "url": rec.url.as_ref().map(url::Url::as_str),
    });
    println!("{summary}");
    Ok(())
}
