use std::path::Path;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use rebaseline_cli::OutputFormat;
use rebaseline_cli::RebaselineCli;
use rebaseline_core::FileStore;
use rebaseline_core::RebaselineConfig;
use rebaseline_core::RebaselineRequest;
use rebaseline_core::RunReport;
use rebaseline_core::SourceRoot;
use rebaseline_core::rebaseline;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = match RebaselineCli::try_parse() {
		Ok(args) => args,
		Err(e) => {
			// Usage errors exit with 1; runtime failures own exit code 2.
			let code = i32::from(e.use_stderr());
			e.print().ok();
			process::exit(code);
		}
	};

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stdout).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_logging(args.verbose, use_color);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	if let Err(e) = run(&args) {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<rebaseline_core::RebaselineError>() {
			Ok(err) => {
				let report: miette::Report = (*err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr, filtered by `RUST_LOG`. Without it only warnings are shown,
/// or everything down to `debug` with `--verbose`.
fn init_logging(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
	let layer = tracing_subscriber::fmt::layer()
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.without_time();

	tracing_subscriber::registry()
		.with(filter)
		.with(layer)
		.try_init()
		.ok();
}

fn load_config(args: &RebaselineCli) -> Result<RebaselineConfig, Box<dyn std::error::Error>> {
	if let Some(path) = &args.config {
		return Ok(RebaselineConfig::load_file(path)?);
	}

	let cwd = std::env::current_dir()?;
	Ok(RebaselineConfig::load(&cwd)?.unwrap_or_default())
}

fn run(args: &RebaselineCli) -> Result<(), Box<dyn std::error::Error>> {
	let config = load_config(args)?;
	let roots: Vec<SourceRoot> = args.roots.iter().map(SourceRoot::from_path).collect();
	let request = RebaselineRequest::new(&args.failure_log, roots)
		.with_config(config)
		.with_dry_run(args.dry_run);

	if args.format == OutputFormat::Text {
		println!("Reading failure log {}", args.failure_log.display());
	}

	let report = rebaseline(&request, &mut FileStore)?;

	match args.format {
		OutputFormat::Text => print_report(&report, args),
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
	}

	Ok(())
}

fn print_report(report: &RunReport, args: &RebaselineCli) {
	let cwd = std::env::current_dir().unwrap_or_default();

	for diagnostic in &report.diagnostics {
		eprintln!("{} {diagnostic}", colored!("warning:", yellow));
	}

	println!("Found {} failing test(s) with a new baseline.", report.records);
	if report.records == 0 {
		return;
	}

	for change in &report.changes {
		for fix in &change.fixes {
			println!("Fixing {}", colored!(fix.method, bold));
			if args.verbose {
				println!("  {} (line {})", fix.variable, fix.line);
			}
		}

		let path = make_relative(&change.path, &cwd);
		if change.written {
			println!("Committing changes to {}", colored!(path, green));
		} else {
			println!("Would update {}", colored!(path, green));
		}

		if args.diff {
			print_diff(&change.before, &change.after);
		}
	}

	if !report.unmatched.is_empty() {
		println!(
			"{} {} test(s) had no matching baseline:",
			colored!("note:", yellow),
			report.unmatched.len()
		);
		for method in &report.unmatched {
			println!("  {method}");
		}
	}

	let files = report.changes.len();
	if report.dry_run {
		println!(
			"Dry run: would fix {} baseline(s) in {files} file(s).",
			report.fix_count()
		);
	} else {
		println!("Fixed {} baseline(s) in {files} file(s).", report.fix_count());
	}
	if args.verbose {
		println!("Scanned {} file(s).", report.files_visited);
	}
}

/// Print a unified diff between two strings, colorized.
fn print_diff(current: &str, updated: &str) {
	let diff = TextDiff::from_lines(current, updated);
	for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
		println!("{}", colored!(hunk.header().to_string(), bold));
		for change in hunk.iter_changes() {
			match change.tag() {
				ChangeTag::Delete => print!("{}", colored!(format!("-{change}"), red)),
				ChangeTag::Insert => print!("{}", colored!(format!("+{change}"), green)),
				ChangeTag::Equal => print!(" {change}"),
			}
			if change.missing_newline() {
				println!();
			}
		}
	}
}

/// Make a path relative to the working directory for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
