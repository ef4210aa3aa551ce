use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RebaselineError {
	#[error(transparent)]
	#[diagnostic(code(rebaseline::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to read failure log `{path}`: {reason}")]
	#[diagnostic(
		code(rebaseline::failure_log),
		help("pass the log captured from the failing test run as the first argument")
	)]
	FailureLogRead { path: String, reason: String },

	#[error("test `{method}` has an `Actual:` block that never reaches a stack trace")]
	#[diagnostic(
		code(rebaseline::unterminated_capture),
		help("set `unterminated = \"drop\"` under [log] in rebaseline.toml to skip incomplete records")
	)]
	UnterminatedCapture { method: String },

	#[error("source root does not exist: `{0}`")]
	#[diagnostic(
		code(rebaseline::missing_root),
		help("pass a folder containing test sources or a .sln file")
	)]
	MissingRoot(String),

	#[error("failed to read `{path}`: {reason}")]
	#[diagnostic(code(rebaseline::source_read))]
	SourceRead { path: String, reason: String },

	#[error("failed to write `{path}`: {reason}")]
	#[diagnostic(
		code(rebaseline::source_write),
		help("files processed before this one were already written; rerun after fixing the cause")
	)]
	SourceWrite { path: String, reason: String },

	#[error("`{path}` is not valid {encoding}")]
	#[diagnostic(
		code(rebaseline::encoding),
		help("supported encodings: UTF-8 (with or without BOM), UTF-16 LE, UTF-16 BE")
	)]
	Encoding { path: String, encoding: String },

	#[error("failed to load solution `{path}`: {reason}")]
	#[diagnostic(code(rebaseline::solution))]
	Solution { path: String, reason: String },

	#[error("failed to load project `{path}`: {reason}")]
	#[diagnostic(code(rebaseline::project))]
	Project { path: String, reason: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(rebaseline::config_parse),
		help("check that rebaseline.toml is valid TOML with the documented keys")
	)]
	ConfigParse(String),

	#[error("invalid exclude pattern `{pattern}`: {reason}")]
	#[diagnostic(
		code(rebaseline::exclude_pattern),
		help("exclude patterns use gitignore syntax")
	)]
	ExcludePattern { pattern: String, reason: String },
}

pub type RebaselineResult<T> = Result<T, RebaselineError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
