//! One run: read the failure log, collect sources, rewrite them in order
//! until every record has been applied.

use std::path::PathBuf;

use serde::Serialize;

use crate::RebaselineResult;
use crate::collector::SourceFile;
use crate::collector::SourceRoot;
use crate::collector::collect_sources;
use crate::config::RebaselineConfig;
use crate::failure_log::FailureLog;
use crate::failure_log::LogDiagnostic;
use crate::failure_log::read_failure_log;
use crate::rewriter::AppliedFix;
use crate::rewriter::RewriteOptions;
use crate::rewriter::rewrite;
use crate::store::TextFile;
use crate::store::TextStore;
use crate::syntax::Dialect;
use crate::syntax::SyntaxTree;

/// Everything needed for a run.
#[derive(Debug, Clone)]
pub struct RebaselineRequest {
	/// The log captured from the failing test run.
	pub log: PathBuf,
	pub roots: Vec<SourceRoot>,
	pub config: RebaselineConfig,
	/// Rewrite in memory only; nothing is written back.
	pub dry_run: bool,
}

impl RebaselineRequest {
	pub fn new(log: impl Into<PathBuf>, roots: impl IntoIterator<Item = SourceRoot>) -> Self {
		Self {
			log: log.into(),
			roots: roots.into_iter().collect(),
			config: RebaselineConfig::default(),
			dry_run: false,
		}
	}

	#[must_use]
	pub fn with_config(mut self, config: RebaselineConfig) -> Self {
		self.config = config;
		self
	}

	#[must_use]
	pub fn with_dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}
}

/// A file whose baselines were replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
	pub path: PathBuf,
	pub dialect: Dialect,
	pub fixes: Vec<AppliedFix>,
	/// Whether the new text was written back.
	pub written: bool,
	#[serde(skip)]
	pub before: String,
	#[serde(skip)]
	pub after: String,
}

/// The outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
	/// Number of records read from the failure log.
	pub records: usize,
	pub diagnostics: Vec<LogDiagnostic>,
	/// Number of source files read and parsed.
	pub files_visited: usize,
	pub changes: Vec<FileChange>,
	/// Methods from the log whose baseline was not found.
	pub unmatched: Vec<String>,
	pub dry_run: bool,
}

impl RunReport {
	pub fn fixes(&self) -> impl Iterator<Item = &AppliedFix> {
		self.changes.iter().flat_map(|change| &change.fixes)
	}

	pub fn fix_count(&self) -> usize {
		self.changes.iter().map(|change| change.fixes.len()).sum()
	}

	pub fn is_complete(&self) -> bool {
		self.unmatched.is_empty()
	}
}

/// Rewrites sources through a [`TextStore`].
pub struct Session<'a, S> {
	store: &'a mut S,
	config: &'a RebaselineConfig,
	dry_run: bool,
}

impl<'a, S: TextStore> Session<'a, S> {
	pub fn new(store: &'a mut S, config: &'a RebaselineConfig) -> Self {
		Self {
			store,
			config,
			dry_run: false,
		}
	}

	#[must_use]
	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	/// Apply the records of `log` to `sources`, in order. Sources after the
	/// last applied record are never read. A read or write failure aborts the
	/// run; files already written stay written.
	pub fn run(self, log: FailureLog, sources: &[SourceFile]) -> RebaselineResult<RunReport> {
		let FailureLog {
			records: mut map,
			diagnostics,
		} = log;
		let mut report = RunReport {
			records: map.len(),
			diagnostics,
			dry_run: self.dry_run,
			..RunReport::default()
		};

		for source in sources {
			if map.is_empty() {
				tracing::debug!("all records applied");
				break;
			}

			let file = self.store.read(&source.path)?;
			report.files_visited += 1;
			tracing::debug!(path = %source.path.display(), dialect = %source.dialect, "scanning file");

			let tree = SyntaxTree::parse(source.dialect, &file.text);
			let options = RewriteOptions {
				baseline_names: self.config.baseline_names.clone(),
				policy: self.config.matching.policy(source.dialect),
				newline: self.config.line_ending.resolve(&file.text).to_string(),
				naming: source.naming.clone(),
			};
			let rewritten = rewrite(&tree, &mut map, &options);
			if rewritten.tree.is_same(&tree) {
				continue;
			}

			let after = rewritten.tree.to_string();
			if !self.dry_run {
				self.store
					.write(&source.path, &TextFile::new(after.as_str(), file.encoding))?;
				tracing::info!(path = %source.path.display(), fixes = rewritten.fixes.len(), "committed changes");
			}

			report.changes.push(FileChange {
				path: source.path.clone(),
				dialect: source.dialect,
				fixes: rewritten.fixes,
				written: !self.dry_run,
				before: file.text,
				after,
			});
		}

		report.unmatched = map.keys().cloned().collect();
		Ok(report)
	}
}

/// Run a complete request: parse the log, collect the sources, rewrite.
pub fn rebaseline<S: TextStore>(request: &RebaselineRequest, store: &mut S) -> RebaselineResult<RunReport> {
	let log = read_failure_log(&request.log, request.config.log.unterminated)?;

	let sources = collect_sources(&request.roots, &request.config)?;
	tracing::info!(files = sources.len(), "collected sources");

	Session::new(store, &request.config)
		.dry_run(request.dry_run)
		.run(log, &sources)
}
