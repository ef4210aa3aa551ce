use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::RebaselineError;
use crate::RebaselineResult;
use crate::failure_log::UnterminatedCapturePolicy;
use crate::syntax::Dialect;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = [
	"rebaseline.toml",
	".rebaseline.toml",
	".config/rebaseline.toml",
];

/// Local variable names that hold baselines by default.
pub const DEFAULT_BASELINE_NAMES: [&str; 3] =
	["expectedOperationTree", "expectedFlowGraph", "expectedGraph"];

/// Projects whose names end with one of these suffixes are test projects.
pub const DEFAULT_TEST_SUFFIXES: [&str; 1] = ["Tests"];

/// Generated files that never contain hand-written baselines.
pub const DEFAULT_EXCLUDE_PATTERNS: [&str; 7] = [
	"*.Designer.cs",
	"*.Designer.vb",
	"*.g.cs",
	"*.g.i.cs",
	"*.g.vb",
	"*.AssemblyInfo.cs",
	"*.AssemblyInfo.vb",
];

/// How the allow-list of baseline variable names is applied to a local.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowListPolicy {
	/// Rewrite locals whose name is in the list.
	#[default]
	Include,
	/// Rewrite locals whose name is not in the list.
	Exclude,
}

impl AllowListPolicy {
	pub fn permits(self, listed: bool) -> bool {
		match self {
			Self::Include => listed,
			Self::Exclude => !listed,
		}
	}
}

/// Line terminator used inside rebuilt literals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
	/// The platform's terminator.
	#[default]
	Native,
	Lf,
	Crlf,
	/// Whichever terminator is most common in the file being rewritten.
	Preserve,
}

impl LineEnding {
	/// The terminator to use for a file with the given text.
	pub fn resolve(self, text: &str) -> &'static str {
		match self {
			Self::Native if cfg!(windows) => "\r\n",
			Self::Native | Self::Lf => "\n",
			Self::Crlf => "\r\n",
			Self::Preserve => {
				let total = text.matches('\n').count();
				let crlf = text.matches("\r\n").count();
				if total > 0 && crlf * 2 > total {
					"\r\n"
				} else if total == 0 {
					Self::Native.resolve(text)
				} else {
					"\n"
				}
			}
		}
	}
}

/// Configuration loaded from a `rebaseline.toml` file.
///
/// ```toml
/// baseline_names = ["expectedOperationTree", "expectedFlowGraph", "expectedGraph"]
/// line_ending = "native"
///
/// [log]
/// unterminated = "drop"
///
/// [match]
/// csharp = "include"
/// visual_basic = "include"
///
/// [solution]
/// test_suffixes = ["Tests"]
///
/// [exclude]
/// patterns = ["*.Designer.cs", "generated/"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RebaselineConfig {
	/// Local variable names whose initializers hold baselines.
	#[serde(default = "default_baseline_names")]
	pub baseline_names: Vec<String>,
	/// Line terminator written inside rebuilt literals.
	#[serde(default)]
	pub line_ending: LineEnding,
	#[serde(default)]
	pub log: LogConfig,
	#[serde(default, rename = "match")]
	pub matching: MatchConfig,
	#[serde(default)]
	pub solution: SolutionConfig,
	#[serde(default)]
	pub exclude: ExcludeConfig,
}

impl Default for RebaselineConfig {
	fn default() -> Self {
		Self {
			baseline_names: default_baseline_names(),
			line_ending: LineEnding::default(),
			log: LogConfig::default(),
			matching: MatchConfig::default(),
			solution: SolutionConfig::default(),
			exclude: ExcludeConfig::default(),
		}
	}
}

fn default_baseline_names() -> Vec<String> {
	DEFAULT_BASELINE_NAMES.iter().map(ToString::to_string).collect()
}

/// Failure log handling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogConfig {
	/// What to do with an `Actual:` block that is still open at the end of
	/// the log.
	#[serde(default)]
	pub unterminated: UnterminatedCapturePolicy,
}

/// Allow-list polarity per dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MatchConfig {
	#[serde(default)]
	pub csharp: AllowListPolicy,
	#[serde(default)]
	pub visual_basic: AllowListPolicy,
}

impl MatchConfig {
	pub fn policy(&self, dialect: Dialect) -> AllowListPolicy {
		match dialect {
			Dialect::CSharp => self.csharp,
			Dialect::VisualBasic => self.visual_basic,
		}
	}
}

/// Solution mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SolutionConfig {
	/// Project name suffixes that mark test projects.
	#[serde(default = "default_test_suffixes")]
	pub test_suffixes: Vec<String>,
}

impl Default for SolutionConfig {
	fn default() -> Self {
		Self {
			test_suffixes: default_test_suffixes(),
		}
	}
}

fn default_test_suffixes() -> Vec<String> {
	DEFAULT_TEST_SUFFIXES.iter().map(ToString::to_string).collect()
}

/// Paths skipped while collecting sources, in gitignore syntax.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExcludeConfig {
	#[serde(default = "default_exclude_patterns")]
	pub patterns: Vec<String>,
}

impl Default for ExcludeConfig {
	fn default() -> Self {
		Self {
			patterns: default_exclude_patterns(),
		}
	}
}

fn default_exclude_patterns() -> Vec<String> {
	DEFAULT_EXCLUDE_PATTERNS
		.iter()
		.map(ToString::to_string)
		.collect()
}

impl RebaselineConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if there is no config file.
	pub fn load(root: &Path) -> RebaselineResult<Option<RebaselineConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		Self::load_file(&config_path).map(Some)
	}

	/// Load the config from an explicit path.
	pub fn load_file(path: &Path) -> RebaselineResult<RebaselineConfig> {
		let content = std::fs::read_to_string(path)?;
		let config: RebaselineConfig =
			toml::from_str(&content).map_err(|e| RebaselineError::ConfigParse(e.to_string()))?;

		tracing::debug!(path = %path.display(), "loaded config");
		Ok(config)
	}
}
