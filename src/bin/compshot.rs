use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use compshot::{
    Comparison, ComparisonOptions, FfmpegLogLevel, FrameList, OutputFormat, ProgressCallback,
    ProgressInfo, RenderOptions, Renderer, SelectionOptions, VideoFile, Writer,
};

#[cfg(feature = "upload")]
use compshot::{UploadOptions, WebhookOutcome};

const CLI_AFTER_HELP: &str = "Examples:\n  compshot select source.mkv --dark 20 --light 10 --json\n  compshot render encode.mkv --y4m - --timecodes timecodes.txt | x265 --y4m -\n  compshot compare source.mkv encode.mkv --folder comparison --progress\n  compshot completions zsh > _compshot";

#[derive(Debug, Parser)]
#[command(
    name = "compshot",
    version,
    about = "Pick representative frames from video encodes and export comparison stills",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Decoder workers per clip, which also bounds frames in flight.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Parser)]
struct SelectionArgs {
    /// Dark frames to pick.
    #[arg(long, default_value_t = 8)]
    dark: usize,

    /// Light frames to pick.
    #[arg(long, default_value_t = 4)]
    light: usize,

    /// Random seed for subsampling.
    #[arg(long, default_value_t = 20202020)]
    seed: u64,

    /// Minimum distance between picked frames, in seconds.
    #[arg(long, default_value_t = 15.0)]
    min_gap: f64,

    /// Dark brightness range, as START,END.
    #[arg(long, value_parser = parse_range, default_value = "0.075,0.38")]
    dark_range: (f64, f64),

    /// Light brightness range, as START,END.
    #[arg(long, value_parser = parse_range, default_value = "0.45,0.75")]
    light_range: (f64, f64),
}

impl SelectionArgs {
    fn options(&self) -> SelectionOptions {
        SelectionOptions::new()
            .with_dark_frames(self.dark)
            .with_light_frames(self.light)
            .with_seed(self.seed)
            .with_min_gap_seconds(self.min_gap)
            .with_dark_range(self.dark_range.0, self.dark_range.1)
            .with_light_range(self.light_range.0, self.light_range.1)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pick dark and light frames from a clip.
    #[command(
        about = "Select comparison frames",
        after_help = "Examples:\n  compshot select source.mkv\n  compshot select source.mkv --dark 5 --light 5 --min-gap 10 --json"
    )]
    Select {
        /// Reference clip.
        input: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Print the selection as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render every frame of a clip to y4m and/or a timecode file.
    #[command(
        about = "Render a clip to y4m",
        after_help = "Examples:\n  compshot render input.mkv --y4m out.y4m\n  compshot render input.mkv --y4m - --format yuv444p | x264 --demuxer y4m -o out.mkv -\n  compshot render input.mkv --timecodes timecodes.txt"
    )]
    Render {
        /// Input clip.
        input: PathBuf,

        /// y4m destination, `-` for stdout.
        #[arg(long)]
        y4m: Option<String>,

        /// v2 timecode file destination.
        #[arg(long)]
        timecodes: Option<PathBuf>,

        /// Output pixel format (gray8, yuv420p, yuv422p, yuv444p).
        #[arg(long, default_value = "yuv420p")]
        format: String,
    },

    /// Export the same frames from several clips as PNG stills.
    #[command(
        about = "Export comparison stills",
        after_help = "Examples:\n  compshot compare source.mkv encode.mkv\n  compshot compare src=source.mkv enc=encode.mkv --frames frames.txt --writer image\n  compshot compare source.mkv encode.mkv --upload --name \"My encode\""
    )]
    Compare {
        /// Clips as PATH or NAME=PATH. The first clip is the reference.
        #[arg(required = true, num_args = 1..)]
        clips: Vec<String>,

        /// Clip used for automatic selection. Defaults to the first clip.
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Output folder.
        #[arg(long, default_value = "comparison")]
        folder: PathBuf,

        /// Still writer (raw, image).
        #[arg(long, default_value = "raw")]
        writer: Writer,

        /// First image number for the image writer.
        #[arg(long, default_value_t = 1)]
        start: u64,

        /// Frame list file (first field of each line).
        #[arg(long, conflicts_with = "frame")]
        frames: Option<PathBuf>,

        /// Field separator for --frames.
        #[arg(long, default_value = " ")]
        delimiter: String,

        /// Explicit frame numbers, repeatable.
        #[arg(long)]
        frame: Vec<u64>,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Upload the stills to slow.pics.
        #[arg(long)]
        upload: bool,

        /// Collection title for --upload.
        #[arg(long, default_value = "")]
        name: String,

        /// Make the uploaded collection public.
        #[arg(long)]
        public: bool,

        /// Discord webhook to notify after --upload.
        #[arg(long)]
        webhook: Option<String>,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_range(value: &str) -> Result<(f64, f64), String> {
    let (start, end) = value
        .split_once(',')
        .ok_or_else(|| format!("expected START,END, got {value:?}"))?;
    let start = start
        .trim()
        .parse::<f64>()
        .map_err(|error| format!("invalid range start {start:?}: {error}"))?;
    let end = end
        .trim()
        .parse::<f64>()
        .map_err(|error| format!("invalid range end {end:?}: {error}"))?;
    Ok((start, end))
}

fn parse_output_format(value: &str) -> Option<OutputFormat> {
    match value.to_ascii_lowercase().as_str() {
        "gray8" | "gray" | "grey" => Some(OutputFormat::Gray8),
        "yuv420p" | "420" => Some(OutputFormat::Yuv420p),
        "yuv422p" | "422" => Some(OutputFormat::Yuv422p),
        "yuv444p" | "444" => Some(OutputFormat::Yuv444p),
        _ => None,
    }
}

/// Split `NAME=PATH`, defaulting the name to the file stem.
fn parse_clip(value: &str) -> (String, PathBuf) {
    if let Some((name, path)) = value.split_once('=') {
        if !name.is_empty() && !name.contains(['/', '\\']) {
            return (name.to_string(), PathBuf::from(path));
        }
    }
    let path = PathBuf::from(value);
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| value.to_string());
    (name, path)
}

fn open_clip(
    path: &Path,
    format: OutputFormat,
    global: &GlobalOptions,
) -> Result<VideoFile, Box<dyn std::error::Error>> {
    let clip = VideoFile::open_with_format(path, format)?;
    Ok(match global.threads {
        Some(threads) if threads > 0 => clip.with_workers(threads),
        _ => clip,
    })
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    if let Some(level) = &global.log_level {
        let parsed = level.parse::<FfmpegLogLevel>()?;
        compshot::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn render_options(global: &GlobalOptions) -> Result<RenderOptions, Box<dyn std::error::Error>> {
    let mut options = RenderOptions::new();
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()?));
    }
    Ok(options)
}

/// Draws progress reports on an indicatif bar.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {msg:>14} {bar:40.cyan/blue} {pos}/{len} ({eta})",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            if self.bar.length() != Some(total) || info.current < self.bar.position() {
                self.bar.reset();
                self.bar.set_length(total);
            }
        }
        self.bar.set_message(format!("{:?}", info.operation));
        self.bar.set_position(info.current);
        if info.total.is_some_and(|total| info.current >= total) {
            self.bar.finish();
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Select {
            input,
            selection,
            json,
        } => {
            let options = selection.options();
            let clip = open_clip(&input, OutputFormat::Yuv420p, &cli.global)?;
            let render = render_options(&cli.global)?;
            let picked = compshot::select(&clip, &options, &render)?;

            if json {
                let payload = json!({
                    "input": input.display().to_string(),
                    "min_gap_frames": picked.min_gap_frames,
                    "dark": picked.dark,
                    "light": picked.light,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for frame in picked.into_frames() {
                    println!("{frame}");
                }
            }
        }
        Commands::Render {
            input,
            y4m,
            timecodes,
            format,
        } => {
            let output_format =
                parse_output_format(&format).ok_or(format!("unsupported --format: {format}"))?;
            if y4m.is_none() && timecodes.is_none() {
                return Err("nothing to do: pass --y4m and/or --timecodes".into());
            }

            let clip = open_clip(&input, output_format, &cli.global)?;
            let mut renderer = Renderer::new(&clip).with_options(render_options(&cli.global)?);

            match y4m.as_deref() {
                Some("-") => renderer = renderer.with_output(BufWriter::new(io::stdout().lock())),
                Some(path) => renderer = renderer.with_output(BufWriter::new(File::create(path)?)),
                None => {}
            }
            if let Some(path) = &timecodes {
                renderer = renderer.with_timecodes(BufWriter::new(File::create(path)?));
            }

            let summary = renderer.run_with_summary()?;
            eprintln!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Rendered {} frame(s) with {} request(s) in flight",
                    summary.frames_rendered, summary.concurrency
                )
                .green()
            );
            if timecodes.is_some() && summary.timecodes.is_empty() && summary.frames_rendered > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    "frames carry no durations; the timecode file was left empty".yellow()
                );
            }
        }
        Commands::Compare {
            clips,
            reference,
            folder,
            writer,
            start,
            frames,
            delimiter,
            frame,
            selection,
            upload,
            name,
            public,
            webhook,
        } => {
            let frame_list = match (frames, frame.is_empty()) {
                (Some(path), _) => FrameList::File { path, delimiter },
                (None, false) => FrameList::Explicit(frame),
                (None, true) => FrameList::Auto(selection.options()),
            };

            let parsed: Vec<(String, PathBuf)> = clips.iter().map(|clip| parse_clip(clip)).collect();
            let mut opened = Vec::with_capacity(parsed.len());
            for (clip_name, path) in &parsed {
                opened.push((clip_name.clone(), open_clip(path, OutputFormat::Rgb24, &cli.global)?));
            }
            let reference_path = reference.or_else(|| parsed.first().map(|(_, path)| path.clone()));
            let reference = match reference_path {
                Some(path) if matches!(frame_list, FrameList::Auto(_)) => {
                    Some(open_clip(&path, OutputFormat::Yuv420p, &cli.global)?)
                }
                _ => None,
            };

            #[allow(unused_mut)]
            let mut options = ComparisonOptions::new()
                .with_folder(&folder)
                .with_writer(writer)
                .with_start(start)
                .with_frames(frame_list)
                .with_render_options(render_options(&cli.global)?);

            #[cfg(feature = "upload")]
            if upload {
                let mut upload_options = UploadOptions::new()
                    .with_collection_name(name)
                    .with_public(public);
                if let Some(url) = webhook {
                    upload_options = upload_options.with_webhook(url);
                }
                options = options.with_upload(upload_options);
            }
            #[cfg(not(feature = "upload"))]
            if upload || webhook.is_some() {
                let _ = (name, public);
                return Err("--upload requires building with the `upload` feature".into());
            }

            let mut comparison = Comparison::new(options);
            for (clip_name, clip) in &opened {
                comparison = comparison.with_clip(clip_name.clone(), clip);
            }
            if let Some(reference) = &reference {
                comparison = comparison.with_reference(reference);
            }
            let report = comparison.run()?;

            let stills: usize = report.images.iter().map(|(_, paths)| paths.len()).sum();
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Exported {stills} still(s) of {} frame(s) to {}",
                    report.frames.len(),
                    folder.display()
                )
                .green()
            );

            #[cfg(feature = "upload")]
            if let Some(uploaded) = &report.upload {
                println!("{} {}", "uploaded".green().bold(), uploaded.url);
                if let WebhookOutcome::Failed(reason) = &uploaded.webhook {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!("webhook failed: {reason}").yellow()
                    );
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "compshot", &mut io::stdout());
        }
    }

    io::stdout().flush()?;
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_clip, parse_output_format, parse_range};
    use std::path::PathBuf;

    #[test]
    fn parse_range_pairs() {
        assert_eq!(parse_range("0.1,0.4"), Ok((0.1, 0.4)));
        assert_eq!(parse_range(" 0.45 , 0.8 "), Ok((0.45, 0.8)));
        assert!(parse_range("0.1").is_err());
        assert!(parse_range("a,b").is_err());
    }

    #[test]
    fn parse_output_format_aliases() {
        assert!(parse_output_format("yuv420p").is_some());
        assert!(parse_output_format("GRAY").is_some());
        assert!(parse_output_format("444").is_some());
        assert!(parse_output_format("rgb48").is_none());
    }

    #[test]
    fn clip_names_default_to_file_stem() {
        assert_eq!(
            parse_clip("encodes/x265.mkv"),
            ("x265".to_string(), PathBuf::from("encodes/x265.mkv"))
        );
        assert_eq!(
            parse_clip("src=source.mkv"),
            ("src".to_string(), PathBuf::from("source.mkv"))
        );
    }
}
