use clap::Parser;
use git_guilt::config::{self, GuiltConfig};
use git_guilt::git::paths::find_repo_root;
use git_guilt::reporters;
use git_guilt::types::{Report, SortOrder, DEFAULT_CONCURRENCY};
use git_guilt::{AttributionOptions, CancelToken, GitRunner, GuiltError, GuiltRequest, ProgressSink};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "git-guilt",
    about = "⚖ Calculate the change in blame between two revisions, per author",
    version,
    long_about = "Attributes every line of every changed file with git blame and reports\n\
                  how many lines each author gained or lost between SINCE and UNTIL.\n\n\
                  With only SINCE, compares against the working tree. With no revisions\n\
                  (or --at), reports who is blamed for every line at that revision.\n\n\
                  Examples:\n  \
                  git-guilt HEAD~10 HEAD\n  \
                  git-guilt v1.0\n  \
                  git-guilt --at v2.0 --email"
)]
struct Args {
    /// Start of the range.
    #[arg(value_name = "SINCE")]
    since: Option<String>,

    /// End of the range (defaults to the working tree).
    #[arg(value_name = "UNTIL", requires = "since")]
    until: Option<String>,

    /// Blame every file at a single revision instead of comparing two.
    #[arg(long, value_name = "REV", conflicts_with_all = ["since", "until"])]
    at: Option<String>,

    /// Directory inside the repository to start from.
    #[arg(short = 'C', long = "dir", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Repository root (skips `git rev-parse --show-toplevel`).
    #[arg(long = "repo", value_name = "ROOT")]
    repo: Option<PathBuf>,

    /// Identify authors by email instead of name.
    #[arg(short, long)]
    email: bool,

    /// Count whitespace-only changes (drops `-w`).
    #[arg(long)]
    keep_whitespace: bool,

    /// Maximum concurrent git blame processes.
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: Option<u32>,

    /// Output format: terminal, json
    #[arg(long)]
    format: Option<String>,

    /// Output file (json only). Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Author ordering: guilt, name
    #[arg(long)]
    sort: Option<String>,

    /// Config file (defaults to .git-guilt.yml in the repo, then the user config dir).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an annotated config template (or write it to FILE) and exit.
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    generate_config: Option<Option<PathBuf>>,

    /// git executable.
    #[arg(long, value_name = "PROGRAM")]
    git: Option<String>,

    /// Pass git's stderr through.
    #[arg(long)]
    stderr: bool,

    #[arg(long)]
    no_progress: bool,

    /// Log every git invocation.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(target) = &args.generate_config {
        if let Err(e) = config::print_template(target.as_deref()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            tracing::warn!("could not install Ctrl-C handler: {e}");
        }
    }

    if let Err(e) = run(&args, cancel) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "git_guilt=debug" } else { "git_guilt=error" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Guilt pipeline ─────────────────────────────────────────────────────────────

/// Effective settings after layering CLI flags over the config file.
#[derive(Debug)]
struct Settings {
    options: AttributionOptions,
    format: String,
    output: Option<PathBuf>,
    sort: SortOrder,
    git: String,
}

fn resolve_settings(args: &Args, cfg: &GuiltConfig) -> Result<Settings, String> {
    let format = args
        .format
        .clone()
        .or_else(|| cfg.format.clone())
        .unwrap_or_else(|| "terminal".to_string());
    if !matches!(format.as_str(), "terminal" | "json") {
        return Err(format!("Unknown format \"{format}\". Expected terminal or json"));
    }

    let sort = match &args.sort {
        Some(s) => config::parse_sort(s)?,
        None => cfg.sort_order().unwrap_or_default(),
    };

    let options = AttributionOptions {
        ignore_whitespace: if args.keep_whitespace { false } else { cfg.ignore_whitespace.unwrap_or(true) },
        email: args.email || cfg.email.unwrap_or(false),
        concurrency: args
            .concurrency
            .map(|n| n as usize)
            .or(cfg.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY),
    };

    Ok(Settings {
        options,
        format,
        output: args.output.clone().or_else(|| cfg.output.as_ref().map(PathBuf::from)),
        sort,
        git: args.git.clone().or_else(|| cfg.git.clone()).unwrap_or_else(|| "git".to_string()),
    })
}

fn run(args: &Args, cancel: CancelToken) -> Result<(), String> {
    // The repo config can only be found once we know the root, which needs
    // the git executable, which the config may name.
    let root_hint = match &args.repo {
        Some(root) => Some(root.clone()),
        None => {
            let probe = GitRunner::new(args.git.clone().unwrap_or_else(|| "git".to_string()));
            find_repo_root(&probe, None, args.dir.as_deref()).ok()
        }
    };
    let cfg = config::resolve_config(args.config.as_deref(), root_hint.as_deref())?;
    let settings = resolve_settings(args, &cfg)?;

    let runner = GitRunner::new(settings.git.clone())
        .forward_stderr(args.stderr)
        .with_cancel(cancel);
    let request = GuiltRequest {
        at: args.at.clone(),
        since: args.since.clone(),
        until: args.until.clone(),
        repo_root: args.repo.clone().or(root_hint),
        repo_subdir: args.dir.clone(),
        options: settings.options.clone(),
    };

    let progress = BlameProgress::new(!args.no_progress);
    let start = Instant::now();
    let result = git_guilt::guilt(&request, &runner, &progress);
    progress.finish();

    let guilt = result.map_err(|e| match e {
        GuiltError::Cancelled => "interrupted".to_string(),
        other => other.to_string(),
    })?;
    eprintln!(
        "✔ {} files, {} authors — ⏱ {}",
        guilt.file_count,
        guilt.authors.len(),
        fmt_dur(start.elapsed())
    );

    let report = Report::new(&guilt, settings.sort);
    match settings.format.as_str() {
        "json" => reporters::json::report_json(&report, settings.output.as_deref())?,
        _ => {
            if settings.output.is_some() {
                eprintln!("Note: --output only applies to --format json; printing to terminal");
            }
            reporters::terminal::report_terminal(&report)
        }
    }
    Ok(())
}

// ── Progress ───────────────────────────────────────────────────────────────────

/// Blame progress bar on stderr. Hidden when disabled or not on a TTY.
struct BlameProgress {
    pb: ProgressBar,
}

impl BlameProgress {
    fn new(enabled: bool) -> Self {
        let pb = ProgressBar::new(0);
        if enabled {
            pb.set_draw_target(ProgressDrawTarget::stderr());
            if let Ok(style) =
                ProgressStyle::with_template("{spinner:.green} blaming [{bar:40.cyan/blue}] {pos}/{len} files")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.enable_steady_tick(Duration::from_millis(80));
        } else {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        BlameProgress { pb }
    }

    fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressSink for BlameProgress {
    fn on_file_count(&self, count: usize) {
        self.pb.set_length(count as u64);
    }

    fn on_file_done(&self) {
        self.pb.inc(1);
    }
}

// ── Duration formatting ────────────────────────────────────────────────────────

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_millis();
    if ms >= 1000 { format!("{:.1}s", d.as_secs_f64()) } else { format!("{ms}ms") }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
