use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bibfetch_core::interaction::{UiEndpoint, UiRequest, channel};
use bibfetch_core::{
    BrowserProfile, Config, DedupPlan, HttpSessionProvider, RunControl, build_target, config_file,
    parse_references, spawn_worker,
};
use clap::Parser;
use tokio::sync::{mpsc, oneshot};

mod output;

use output::{ColorMode, ProgressView};

/// Bibliography PDF downloader - fetch the PDF behind every entry of a pasted reference list
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Text file with the bibliography ("-" reads standard input)
    input: PathBuf,

    /// Folder that receives the PDFs
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Browser profile to imitate (edge, chrome, firefox)
    #[arg(long)]
    browser: Option<BrowserProfile>,

    /// After the automated passes, open what is still missing in your browser
    #[arg(long)]
    manual_fallback: bool,

    /// Folder your browser saves downloads to (manual fallback)
    #[arg(long)]
    downloads_dir: Option<PathBuf>,

    /// Open the raw target instead of a detected PDF link during manual fallback
    #[arg(long)]
    no_auto_open: bool,

    /// Do not write combined_references.pdf
    #[arg(long)]
    no_merge: bool,

    /// Do not write missing_pdfs.txt
    #[arg(long)]
    no_report: bool,

    /// Search engine URL; the encoded query is appended
    #[arg(long)]
    search_url: Option<String>,

    /// Contact address sent to CrossRef
    #[arg(long)]
    crossref_mailto: Option<String>,

    /// Comma-separated list of strategies to disable
    #[arg(long, value_delimiter = ',')]
    disable_strategies: Vec<String>,

    /// Seconds to wait for a page to load
    #[arg(long)]
    page_timeout: Option<u64>,

    /// Seconds to wait for a download to finish
    #[arg(long)]
    download_timeout: Option<u64>,

    /// Seconds to wait for a verification challenge to be cleared
    #[arg(long)]
    challenge_wait: Option<u64>,

    /// Seconds to wait for a manual download
    #[arg(long)]
    manual_wait: Option<u64>,

    /// Config file to use instead of the default locations
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse and print the references without downloading anything
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let text = read_input(&cli.input)?;
    let color = ColorMode(!cli.no_color);

    if cli.dry_run {
        return dry_run(&text, color);
    }

    let config = build_config(&cli);
    tracing::debug!(?config, "resolved configuration");
    run(text, config, cli.input.as_os_str() != "-", color).await
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn build_config(cli: &Cli) -> Config {
    let mut config = Config::default();
    let file = match cli.config {
        Some(ref path) => config_file::load_from_path(path).unwrap_or_default(),
        None => config_file::load_config(),
    };
    file.apply_to(&mut config);

    if let Some(dest) = cli
        .dest
        .clone()
        .or_else(|| std::env::var("BIBFETCH_DEST").ok().map(PathBuf::from))
    {
        config.destination_dir = dest;
    }
    if let Some(mailto) = cli
        .crossref_mailto
        .clone()
        .or_else(|| std::env::var("CROSSREF_MAILTO").ok())
    {
        config.crossref_mailto = Some(mailto);
    }
    if let Some(browser) = cli.browser {
        config.browser = browser;
    }
    if cli.manual_fallback {
        config.manual_fallback = true;
    }
    if let Some(ref dir) = cli.downloads_dir {
        config.manual_downloads_dir = Some(dir.clone());
    }
    if cli.no_auto_open {
        config.manual_auto_open_link = false;
    }
    if cli.no_merge {
        config.merge_pdfs = false;
    }
    if cli.no_report {
        config.write_missing_report = false;
    }
    if let Some(ref url) = cli.search_url {
        config.search_engine_url = url.clone();
    }
    if !cli.disable_strategies.is_empty() {
        config.disabled_strategies = cli.disable_strategies.clone();
    }
    if let Some(v) = cli.page_timeout {
        config.page_load_timeout_secs = v;
    }
    if let Some(v) = cli.download_timeout {
        config.download_timeout_secs = v;
    }
    if let Some(v) = cli.challenge_wait {
        config.challenge_wait_secs = v;
    }
    if let Some(v) = cli.manual_wait {
        config.manual_wait_secs = v;
    }
    config
}

fn dry_run(text: &str, color: ColorMode) -> anyhow::Result<()> {
    let records = parse_references(text);
    if records.is_empty() {
        println!("No references found.");
        return Ok(());
    }
    let plan = DedupPlan::build(&records);
    let targets: Vec<_> = records.iter().map(build_target).collect();
    let mut stdout = std::io::stdout();
    output::print_dry_run(&mut stdout, &records, &plan, &targets, color)?;
    Ok(())
}

async fn run(text: String, config: Config, interactive: bool, color: ColorMode) -> anyhow::Result<()> {
    if parse_references(&text).is_empty() {
        println!("No references found.");
        return Ok(());
    }

    let destination = config.destination_dir.clone();
    let provider = Arc::new(HttpSessionProvider::new(config.browser));
    let (ui, endpoint) = channel();
    let worker = spawn_worker(text, config, provider, ui)?;

    spawn_interrupt_handler(worker.control());
    let view = ProgressView::new(color);
    view.line("Press Ctrl+C to skip the current reference, twice quickly to stop the run.");

    // Standard input already held the bibliography when reading from "-".
    let lines = if interactive {
        spawn_stdin_lines()
    } else {
        mpsc::unbounded_channel().1
    };
    ui_loop(endpoint, lines, &view).await;
    view.finish();

    let summary = tokio::task::spawn_blocking(move || worker.join()).await??;
    let mut stdout = std::io::stdout();
    output::print_summary(&mut stdout, &summary, &destination, color)?;
    stdout.flush()?;
    Ok(())
}

/// First Ctrl+C skips the current reference; a second one within two seconds
/// cancels the run.
fn spawn_interrupt_handler(control: RunControl) {
    tokio::spawn(async move {
        let mut last: Option<Instant> = None;
        while tokio::signal::ctrl_c().await.is_ok() {
            let now = Instant::now();
            if last.is_some_and(|t| now.duration_since(t) < Duration::from_secs(2)) {
                eprintln!("\nCancelling run...");
                control.cancel_run();
                break;
            }
            eprintln!("\nSkipping current reference (Ctrl+C again to stop)");
            control.skip_current();
            last = Some(now);
        }
    });
}

/// Lines typed by the user, read on a plain thread so a pending read never
/// holds up shutdown.
fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Render progress and answer worker requests until the worker hangs up.
async fn ui_loop(
    mut endpoint: UiEndpoint,
    mut lines: mpsc::UnboundedReceiver<String>,
    view: &ProgressView,
) {
    let mut pending_ack: Option<oneshot::Sender<()>> = None;
    let mut pending_confirm: Option<oneshot::Sender<bool>> = None;
    let mut progress_open = true;
    let mut requests_open = true;
    let mut stdin_open = true;

    while progress_open || requests_open {
        tokio::select! {
            event = endpoint.progress.recv(), if progress_open => match event {
                Some(event) => view.handle(&event),
                None => progress_open = false,
            },
            request = endpoint.requests.recv(), if requests_open => match request {
                Some(UiRequest::Challenge { ack, .. }) => pending_ack = Some(ack),
                Some(UiRequest::ConfirmManualFallback { prompt, reply }) => {
                    if stdin_open {
                        view.line(format!("{} [y/N]", prompt));
                        pending_confirm = Some(reply);
                    } else {
                        view.line(format!("{} (no terminal input, skipping)", prompt));
                        let _ = reply.send(false);
                    }
                }
                None => requests_open = false,
            },
            line = lines.recv(), if stdin_open => match line {
                Some(line) => {
                    if let Some(reply) = pending_confirm.take() {
                        let yes = matches!(line.trim().to_lowercase().as_str(), "y" | "yes");
                        let _ = reply.send(yes);
                    } else if let Some(ack) = pending_ack.take() {
                        let _ = ack.send(());
                    }
                }
                None => {
                    stdin_open = false;
                    if let Some(reply) = pending_confirm.take() {
                        let _ = reply.send(false);
                    }
                }
            },
        }
    }
}
