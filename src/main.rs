// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use tokio::signal;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use epub_downloader::acquire::DEFAULT_DOWNLOADER;
use epub_downloader::{
    AcquireOptions, ConvertOptions, EpubOptions, MediaAcquirer, NoopReporter, ProgressEvent, ProgressReporter,
    ReqwestClient, SharedProgressReporter, YtDlp, convert_url,
};

// Emoji with fallback for terminals without Unicode support
static BOOKS: Emoji<'_, '_> = Emoji("📚 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static PAGE: Emoji<'_, '_> = Emoji("📄 ", "[i] ");
static VIDEO: Emoji<'_, '_> = Emoji("🎬 ", "[m] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "[z] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

const MIB: u64 = 1024 * 1024;

/// Save a web article as an EPUB
#[derive(Parser, Debug)]
#[command(name = "epub-downloader")]
#[command(about = "Save a web article, its images and embedded media as an EPUB")]
#[command(version)]
struct Args {
    /// URL of the article
    url: String,

    /// Output file (default: <date>_<title>.epub)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for the derived output file
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Put the output into a subdirectory named after the site
    #[arg(short = 's', long)]
    create_subfolders: bool,

    /// Cover image URL or path
    #[arg(short, long)]
    cover: Option<String>,

    /// Download embedded videos and media in quoted posts
    #[arg(short = 'm', long)]
    download_media: bool,

    /// Format cascade for embedded media, entries separated by `_`
    #[arg(short = 'f', long, value_name = "FORMATS")]
    media_format: Option<String>,

    /// Abandon a media format once its download passes this many MiB
    #[arg(long, value_name = "MIB")]
    media_filesize: Option<u64>,

    /// Fail instead of keeping an oversized download from the last format
    #[arg(long)]
    reject_oversized: bool,

    /// Downloader executable
    #[arg(long, default_value = DEFAULT_DOWNLOADER)]
    downloader: String,

    /// EPUB version to write
    #[arg(long, value_parser = clap::value_parser!(u8).range(2..=3))]
    epub_version: Option<u8>,

    /// JSON file with book options
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Run `zip -F` over the finished archive
    #[arg(long)]
    repair_archive: bool,

    /// User-Agent for all requests
    #[arg(long)]
    user_agent: Option<String>,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Log debugging details to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    media_bar: Mutex<Option<ProgressBar>>,
    assets_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .expect("progress template is valid");

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            media_bar: Mutex::new(None),
            assets_bar: Mutex::new(None),
        }
    }

    fn new_bar(&self, template: &str, length: u64) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template(template)
            .expect("progress template is valid")
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(length));
        bar.set_style(style);
        bar
    }

    fn media_bar(&self) -> ProgressBar {
        let mut slot = self.media_bar.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            self.new_bar(
                &format!("  {VIDEO}[{{bar:30.cyan/blue}}] {{percent:>3}}% {{prefix}} {{wide_msg}}"),
                100,
            )
        })
        .clone()
    }

    fn take_media_bar(&self) -> Option<ProgressBar> {
        self.media_bar.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn with_assets_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.assets_bar.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            f(bar);
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingPage { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching page: {}", url.cyan()));
            }

            ProgressEvent::ArticleExtracted { title, site_name } => {
                self.main_bar.set_message(format!(
                    "{PAGE}{} • {}",
                    truncate_title(&title, 50).bold().green(),
                    site_name.cyan()
                ));
            }

            ProgressEvent::MediaAttemptStarting {
                url,
                format,
                attempt,
                total_formats,
            } => {
                let bar = self.media_bar();
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {} {}",
                    (attempt + 1).to_string().cyan(),
                    total_formats.to_string().cyan(),
                    truncate_title(&url, 40),
                    truncate_title(&format, 30).dimmed()
                ));
            }

            ProgressEvent::MediaProgress {
                percent, size_bytes, ..
            } => {
                let bar = self.media_bar();
                bar.set_position(percent.clamp(0.0, 100.0) as u64);
                bar.set_prefix(HumanBytes(size_bytes).to_string());
            }

            ProgressEvent::MediaAttemptRejected { reason, .. } => {
                let bar = self.media_bar();
                bar.set_message(format!("{}", reason.yellow()));
            }

            ProgressEvent::MediaAcquired { url, path } => {
                if let Some(bar) = self.take_media_bar() {
                    bar.finish_and_clear();
                }
                let _ = self.multi.println(format!(
                    "  {SUCCESS}{} → {}",
                    truncate_title(&url, 40).green(),
                    path.display().to_string().dimmed()
                ));
            }

            ProgressEvent::MediaFailed { url, error } => {
                if let Some(bar) = self.take_media_bar() {
                    bar.abandon_with_message(format!(
                        "{FAILURE}{} - {}",
                        truncate_title(&url, 30).red(),
                        error.red()
                    ));
                }
            }

            ProgressEvent::AssetsStarting { images, audio_video } => {
                self.main_bar.set_message(format!(
                    "{DOWNLOAD}Placing {} images and {} audio/video files",
                    images.to_string().cyan(),
                    audio_video.to_string().cyan()
                ));
                let total = (images + audio_video) as u64;
                if total > 0 {
                    let bar = self.new_bar(
                        &format!("  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{wide_msg}}"),
                        total,
                    );
                    *self.assets_bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
                }
            }

            ProgressEvent::AssetPlaced { locator, bytes } => {
                self.with_assets_bar(|bar| {
                    bar.inc(1);
                    bar.set_message(format!("{} ({})", truncate_title(&locator, 40), HumanBytes(bytes)));
                });
            }

            ProgressEvent::AssetSkipped { locator, error } => {
                let _ = self.multi.println(format!(
                    "  {CROSS}{} - {}",
                    truncate_title(&locator, 50).yellow(),
                    error.dimmed()
                ));
                self.with_assets_bar(|bar| bar.inc(1));
            }

            ProgressEvent::CoverReady { width, height } => {
                self.main_bar
                    .set_message(format!("{PAGE}Cover image {width}×{height}"));
            }

            ProgressEvent::RenderingFiles { items } => {
                if let Some(bar) = self.assets_bar.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    bar.finish_and_clear();
                }
                self.main_bar
                    .set_message(format!("{PAGE}Writing {} content files", items.to_string().cyan()));
            }

            ProgressEvent::Archiving { output } => {
                self.main_bar.set_message(format!(
                    "{PACKAGE}Packaging {}",
                    output.display().to_string().cyan()
                ));
            }

            ProgressEvent::Completed { output } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {}",
                    "EPUB written:".bold().green(),
                    output.display().to_string().green().bold()
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "epub_downloader=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Interrupt",
        _ = terminate => "Termination signal",
    }
}

fn media_formats(arg: Option<&str>) -> Option<Vec<String>> {
    let formats: Vec<String> = arg?
        .split('_')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    (!formats.is_empty()).then_some(formats)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            BOOKS,
            "epub-downloader".bold().magenta(),
            "- Articles to EPUB".dimmed()
        );
    }

    let mut epub = match &args.options {
        Some(path) => EpubOptions::from_json_file(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => EpubOptions::default(),
    };
    if let Some(cover) = &args.cover {
        epub.cover = Some(cover.clone());
    }
    if let Some(version) = args.epub_version {
        epub.version = version;
    }
    if let Some(user_agent) = &args.user_agent {
        epub.user_agent = user_agent.clone();
    }

    // Everything this invocation writes outside the output goes below here
    let temp_root = epub.temp_root().join(format!("run-{}", Uuid::new_v4()));
    epub.temp_dir = Some(temp_root.clone());

    let client = ReqwestClient::with_user_agent(&epub.user_agent).context("Failed to create HTTP client")?;

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let acquirer = args.download_media.then(|| {
        MediaAcquirer::new(
            YtDlp::new(args.downloader.clone()),
            AcquireOptions {
                size_cap: args.media_filesize.map(|mib| mib.saturating_mul(MIB)),
                reject_oversized_final: args.reject_oversized,
            },
            reporter.clone(),
        )
    });

    let options = ConvertOptions {
        url: args.url.clone(),
        output: args.output.clone(),
        path: args.path.clone(),
        create_subfolders: args.create_subfolders,
        media_formats: media_formats(args.media_format.as_deref()),
        repair_archive: args.repair_archive,
        epub,
    };

    // The losing future is dropped when the select ends, which kills any
    // running downloader before its work files are removed
    let outcome = tokio::select! {
        result = convert_url(&client, acquirer.as_ref(), &options, reporter) => Ok(result),
        signal = shutdown_signal() => Err(signal),
    };
    let result = match outcome {
        Ok(result) => result,
        Err(signal) => {
            let _ = tokio::fs::remove_dir_all(&temp_root).await;
            eprintln!("\n{FAILURE}{signal} received, temporary files removed");
            std::process::exit(130);
        }
    };

    match result {
        Ok(output) => {
            let _ = tokio::fs::remove_dir_all(&temp_root).await;
            if !args.quiet {
                println!("\n{FOLDER}Output: {}\n", output.display().to_string().cyan());
            }
            Ok(())
        }
        Err(e) => {
            if temp_root.exists() {
                warn!(path = %temp_root.display(), "build files kept for inspection");
            }
            Err(e).context("Failed to convert page")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_is_split_on_underscores() {
        assert_eq!(
            media_formats(Some("worstvideo+worstaudio_bestaudio[abr<120]")),
            Some(vec!["worstvideo+worstaudio".to_string(), "bestaudio[abr<120]".to_string()])
        );
        assert_eq!(media_formats(Some("_")), None);
        assert_eq!(media_formats(None), None);
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate_title("short", 10), "short");
        assert_eq!(truncate_title("a very long article title", 10), "a very ...");
    }

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from([
            "epub-downloader",
            "https://example.com/a",
            "-m",
            "-f",
            "best",
            "--media-filesize",
            "20",
            "--epub-version",
            "2",
            "-s",
        ])
        .unwrap();

        assert!(args.download_media);
        assert!(args.create_subfolders);
        assert_eq!(args.media_filesize, Some(20));
        assert_eq!(args.epub_version, Some(2));
        assert_eq!(args.downloader, DEFAULT_DOWNLOADER);
        assert!(Args::try_parse_from(["epub-downloader", "https://example.com/a", "--epub-version", "4"]).is_err());
    }
}
