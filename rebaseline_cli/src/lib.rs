use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Update stale baselines in C# and Visual Basic tests from a failing test run.",
	long_about = "rebaseline reads the log of a failing test run, extracts the actual output \
	              printed for each failed test, and writes it back into the test's \
	              `expectedOperationTree`, `expectedFlowGraph` or `expectedGraph` \
	              literal.\n\nUsage:\n  rebaseline failures.log src/Tests       Fix every \
	              .cs and .vb file under a folder\n  rebaseline failures.log All.sln         Fix \
	              the test projects of a solution"
)]
#[allow(clippy::struct_excessive_bools)]
pub struct RebaselineCli {
	/// The log captured from the failing test run.
	pub failure_log: PathBuf,

	/// Folders to search for test sources, or a single `.sln` file.
	#[arg(required = true)]
	pub roots: Vec<PathBuf>,

	/// Path to a config file. Defaults to `rebaseline.toml`,
	/// `.rebaseline.toml` or `.config/rebaseline.toml` in the current
	/// directory.
	#[arg(long, short)]
	pub config: Option<PathBuf>,

	/// Report what would change without writing any files.
	#[arg(long, default_value_t = false)]
	pub dry_run: bool,

	/// Show a unified diff for every changed file.
	#[arg(long, default_value_t = false)]
	pub diff: bool,

	/// Output format for the run report.
	#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
	pub format: OutputFormat,

	/// Enable verbose output.
	#[arg(long, short, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable progress and summary.
	Text,
	/// A JSON report with every fix, unmatched test and log diagnostic.
	Json,
}
