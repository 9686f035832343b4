mod capture;
mod output;

use anyhow::{Context, Result};
use capture::{CaptureSource, RawStreamCapture, WebcamCapture};
use clap::Parser;
use cloak_fx::{CloakConfig, CloakPipeline, ColorRange, Hsv, StatusOverlay};
use output::{OutputSink, RawStreamOutput, V4L2Output};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Read raw rgb24 frames of the capture size from this file ("-" for
    /// stdin) instead of a webcam
    #[arg(long)]
    input_raw: Option<String>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Write raw rgb24 frames of the output size to this file ("-" for
    /// stdout) instead of a v4l2loopback device
    #[arg(long)]
    output_raw: Option<String>,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Lower HSV bound of the cloak colour, "h,s,v" with hue in [0, 180)
    #[arg(long, default_value_t = ColorRange::BLUE.lower)]
    lower: Hsv,

    /// Upper HSV bound of the cloak colour, "h,s,v" with hue in [0, 180)
    #[arg(long, default_value_t = ColorRange::BLUE.upper)]
    upper: Hsv,

    /// Frames averaged into the background before the cloak activates
    #[arg(long, default_value_t = CloakConfig::DEFAULT_BACKGROUND_FRAMES)]
    background_frames: u32,

    /// Weight of each new frame in the background running average
    #[arg(long, default_value_t = CloakConfig::DEFAULT_DECAY)]
    decay: f32,

    /// Opening/closing iterations applied to the colour mask
    #[arg(long, default_value_t = CloakConfig::DEFAULT_MORPHOLOGY_ITERATIONS)]
    morphology_iterations: u8,

    /// Gaussian kernel size used to soften the mask edge (odd)
    #[arg(long, default_value_t = CloakConfig::DEFAULT_BLUR_KERNEL)]
    blur_kernel: u32,

    /// TrueType font used to render status captions instead of the bundled
    /// DejaVu Sans
    #[arg(long)]
    font: Option<PathBuf>,

    /// Do not draw status indicators on the video
    #[arg(long)]
    no_overlay: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn cloak_config(&self) -> CloakConfig {
        CloakConfig {
            target_color_range: ColorRange {
                lower: self.lower,
                upper: self.upper,
            },
            background_frame_threshold: self.background_frames,
            accumulator_decay: self.decay,
            morphology_iterations: self.morphology_iterations,
            blur_kernel_size: self.blur_kernel,
            overlay: !self.no_overlay,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout may carry raw video
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("cloak-fx starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let config = args.cloak_config();
    tracing::info!(
        "Cloak colour {} .. {}, background from {} frames",
        config.target_color_range.lower,
        config.target_color_range.upper,
        config.background_frame_threshold
    );
    let mut pipeline = CloakPipeline::new(config).context("Invalid cloak configuration")?;
    if let Some(path) = &args.font {
        pipeline = pipeline.with_overlay(StatusOverlay::with_font(load_font(path)?));
    }

    let mut capture = open_capture(&args)?;
    let mut output = open_output(&args)?;

    let (width, height) = capture.resolution();
    tracing::info!("Capturing at {}x{}", width, height);
    let (width, height) = output.resolution();
    tracing::info!("Writing at {}x{}", width, height);

    run_pipeline(
        capture.as_mut(),
        output.as_mut(),
        &mut pipeline,
        args.fps,
        args.max_frames,
    )
}

fn load_font(path: &Path) -> Result<ab_glyph::FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read font {}", path.display()))?;
    ab_glyph::FontArc::try_from_vec(bytes)
        .with_context(|| format!("Failed to parse font {}", path.display()))
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    let (width, height) = (args.capture_width, args.capture_height);
    match args.input_raw.as_deref() {
        Some("-") => Ok(Box::new(RawStreamCapture::new(
            std::io::stdin().lock(),
            width,
            height,
        )?)),
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open raw input {path}"))?;
            Ok(Box::new(RawStreamCapture::new(
                std::io::BufReader::new(file),
                width,
                height,
            )?))
        }
        None => Ok(Box::new(
            WebcamCapture::new(args.input_device, width, height)
                .context("Failed to initialize webcam capture")?,
        )),
    }
}

fn open_output(args: &Args) -> Result<Box<dyn OutputSink>> {
    let (width, height) = (args.output_width, args.output_height);
    match args.output_raw.as_deref() {
        Some("-") => Ok(Box::new(RawStreamOutput::new(
            std::io::stdout().lock(),
            width,
            height,
        ))),
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create raw output {path}"))?;
            Ok(Box::new(RawStreamOutput::new(
                std::io::BufWriter::new(file),
                width,
                height,
            )))
        }
        None => Ok(Box::new(
            V4L2Output::new(&args.output_device, width, height)
                .context("Failed to initialize v4l2loopback output")?,
        )),
    }
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    output: &mut dyn OutputSink,
    pipeline: &mut CloakPipeline,
    target_fps: u32,
    max_frames: Option<u64>,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Stand still while the background is captured");
    tracing::info!("Press Ctrl+C to stop");

    while max_frames.map_or(true, |max| frame_count < max) {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let Some(frame) = capture
            .capture_frame()
            .context("Failed to capture frame")?
        else {
            tracing::info!("Input stream ended");
            break;
        };
        total_capture_time += capture_start.elapsed();

        let process_start = Instant::now();
        let output_frame = pipeline.process_frame(frame);
        total_process_time += process_start.elapsed();

        let output_start = Instant::now();
        output
            .write_frame(&output_frame)
            .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_process_ms = total_process_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_process_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;

            tracing::info!(
                "Frame {} [{}]: capture={:.1}ms, process={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                pipeline.status(),
                avg_capture_ms,
                avg_process_ms,
                avg_output_ms,
                total_ms,
                actual_fps
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    tracing::info!("Processed {} frames", frame_count);
    Ok(())
}
