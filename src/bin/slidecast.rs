use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use slidecast::{
    CancellationToken, Canvas, Compositor, DescriptionService, DirectorySink, EXPORT_HEIGHT,
    EXPORT_WIDTH, Encoder, ExportOutcome, ExportSettings, FONT_ENV, GeminiDescriber,
    HeadlessFullscreen, ImageInput, Language, SlideshowConfig, SlideshowView, StaticDescriber,
    Surface, Theme, ThemeTimeline, TitleFont, generate_config,
};

#[derive(Parser, Debug)]
#[command(name = "slidecast", version, about = "Animated slideshow preview and export")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the description service for a title and theme and print the config JSON.
    Describe(DescribeArgs),
    /// Compose a single frame of one slide as a PNG.
    Frame(FrameArgs),
    /// Export the slideshow as a GIF or video file.
    Export(ExportArgs),
    /// Run live playback and write the shown slide to `<out-dir>/current.png` on every change.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
struct DescribeArgs {
    /// Input images, in slideshow order.
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,

    /// Ask for an English and Chinese title.
    #[arg(long, default_value_t = false)]
    bilingual: bool,
}

/// Where the slideshow config comes from.
#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Slideshow config JSON (`{"title": ..., "theme": ...}`).
    #[arg(long, conflicts_with_all = ["title", "theme"])]
    config: Option<PathBuf>,

    /// Title text; with `--theme`, skips the description service.
    #[arg(long, requires = "theme")]
    title: Option<String>,

    /// Animation theme.
    #[arg(long, value_parser = parse_theme, requires = "title")]
    theme: Option<Theme>,

    /// Ask the description service for an English and Chinese title.
    #[arg(long, default_value_t = false)]
    bilingual: bool,
}

#[derive(Parser, Debug)]
struct FontArgs {
    /// Title font (TTF/OTF/TTC); defaults to the installed bold sans-serif.
    #[arg(long, env = FONT_ENV)]
    font: Option<PathBuf>,
}

impl FontArgs {
    fn resolve(&self) -> anyhow::Result<Option<TitleFont>> {
        Ok(TitleFont::resolve(self.font.as_deref())?)
    }
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input image.
    #[arg(long)]
    image: PathBuf,

    /// Animation progress in [0, 1].
    #[arg(long, default_value_t = 1.0)]
    progress: f64,

    /// Title drawn over the image.
    #[arg(long, default_value = "")]
    title: String,

    /// Animation theme.
    #[arg(long, value_parser = parse_theme, default_value = "calm")]
    theme: Theme,

    #[command(flatten)]
    font: FontArgs,

    /// Frame width; export always renders 1280x720.
    #[arg(long, default_value_t = EXPORT_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = EXPORT_HEIGHT)]
    height: u32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Gif,
    /// mp4 when ffmpeg has libx264, otherwise webm.
    Video,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input images, in slideshow order (at least 2).
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,

    #[arg(long, value_enum, default_value_t = FormatArg::Gif)]
    format: FormatArg,

    /// Download directory; the file is named after the title.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Title language.
    #[arg(long, value_parser = parse_language, default_value = "en")]
    lang: Language,

    #[command(flatten)]
    font: FontArgs,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Input images, in slideshow order (at least 2).
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,

    /// Directory receiving `current.png`.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of slide changes to play before exiting.
    #[arg(long, default_value_t = 3)]
    slides: usize,

    /// Title language.
    #[arg(long, value_parser = parse_language, default_value = "en")]
    lang: Language,

    #[command(flatten)]
    font: FontArgs,
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    Theme::parse(s).ok_or_else(|| format!("unknown theme '{s}' (calm|energetic|professional)"))
}

fn parse_language(s: &str) -> Result<Language, String> {
    match s {
        "en" => Ok(Language::En),
        "zh" => Ok(Language::Zh),
        _ => Err(format!("unknown language '{s}' (en|zh)")),
    }
}

fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slidecast=info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    match cli.cmd {
        Command::Describe(args) => rt.block_on(cmd_describe(args)),
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => rt.block_on(cmd_export(args)),
        Command::Preview(args) => rt.block_on(cmd_preview(args)),
    }
}

fn load_images(paths: &[PathBuf]) -> anyhow::Result<Vec<ImageInput>> {
    paths
        .iter()
        .map(|p| ImageInput::from_path(p).map_err(anyhow::Error::from))
        .collect()
}

async fn describe_with<S: DescriptionService>(
    service: &S,
    images: &[ImageInput],
) -> anyhow::Result<SlideshowConfig> {
    generate_config(service, images).await.map_err(|e| {
        let msg = e.user_message();
        anyhow::Error::from(e).context(msg)
    })
}

async fn resolve_config(
    args: &ConfigArgs,
    images: &[ImageInput],
) -> anyhow::Result<SlideshowConfig> {
    if let Some(path) = &args.config {
        return Ok(SlideshowConfig::from_json_path(path)?);
    }
    if let (Some(title), Some(theme)) = (&args.title, args.theme) {
        let service = StaticDescriber::new(&SlideshowConfig::new(title.as_str(), theme))?;
        return describe_with(&service, images).await;
    }
    let service = GeminiDescriber::from_env()?.bilingual(args.bilingual);
    describe_with(&service, images).await
}

fn write_png(path: &Path, frame: &slidecast::FrameRGBA) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        path,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))
}

async fn cmd_describe(args: DescribeArgs) -> anyhow::Result<()> {
    let images = load_images(&args.images)?;
    let service = GeminiDescriber::from_env()?.bilingual(args.bilingual);
    let config = describe_with(&service, &images).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let input = ImageInput::from_path(&args.image)?;
    let image = slidecast::decode_input(&input)?;
    let font = args.font.resolve()?;

    let mut surface = Surface::new(Canvas::new(args.width, args.height)?)?;
    let mut compositor = Compositor::new(font);
    let params = ThemeTimeline::for_theme(args.theme).params_at(args.progress);
    compositor.compose(&mut surface, &image, params, &args.title);

    write_png(&args.out, &surface.read_frame())?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

async fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let images = load_images(&args.images)?;
    let config = resolve_config(&args.config, &images).await?;
    let font = args.font.resolve()?;

    let mut view = SlideshowView::new(
        images,
        config,
        ExportSettings::default(),
        font,
        Arc::new(HeadlessFullscreen::new()),
    )?;
    if view.language() != args.lang {
        view.toggle_language();
    }

    let encoder = match args.format {
        FormatArg::Gif => Encoder::gif(),
        FormatArg::Video => Encoder::video().map_err(|e| {
            let msg = e.user_message();
            anyhow::Error::from(e).context(msg)
        })?,
    };
    let sink = DirectorySink::new(&args.out_dir);
    let outcome = view
        .export(encoder, &sink, CancellationToken::new())
        .await
        .map_err(|e| {
            let msg = e.user_message();
            anyhow::Error::from(e).context(msg)
        })?;
    view.teardown();

    match outcome {
        ExportOutcome::Completed {
            filename,
            duration_ms,
            frames,
            ..
        } => {
            eprintln!(
                "wrote {} ({frames} frames, {:.1}s)",
                sink.path_for(&filename).display(),
                duration_ms as f64 / 1000.0
            );
        }
        ExportOutcome::Ignored => eprintln!("an export is already running"),
        ExportOutcome::Cancelled => eprintln!("export cancelled"),
    }
    Ok(())
}

async fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let images = load_images(&args.images)?;
    let config = resolve_config(&args.config, &images).await?;
    let font = args.font.resolve()?;

    let mut view = SlideshowView::new(
        images,
        config,
        ExportSettings::default(),
        font,
        Arc::new(HeadlessFullscreen::new()),
    )?;
    if view.language() != args.lang {
        view.toggle_language();
    }

    let out = args.out_dir.join("current.png");
    let show = |view: &mut SlideshowView| -> anyhow::Result<()> {
        if let Some(frame) = view.render_preview()? {
            write_png(&out, &frame)?;
            tracing::info!(slide = view.current(), path = %out.display(), "preview updated");
        }
        Ok(())
    };

    show(&mut view)?;
    for _ in 0..args.slides {
        view.advance().await;
        show(&mut view)?;
    }
    view.teardown();
    Ok(())
}
