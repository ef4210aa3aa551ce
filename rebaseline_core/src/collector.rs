//! Discovery of the test sources that may hold stale baselines.
//!
//! A root is either a folder, walked recursively for `.cs` and `.vb` files,
//! or a `.sln` solution whose test projects contribute their documents.
//! Files are only listed here; reading and parsing happen lazily while the
//! session rewrites them.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use globset::GlobBuilder;
use globset::GlobMatcher;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use regex::Regex;
use serde::Serialize;

use crate::RebaselineError;
use crate::RebaselineResult;
use crate::config::RebaselineConfig;
use crate::rewriter::NameResolution;
use crate::syntax::Dialect;

const SOLUTION_EXTENSION: &str = "sln";
const PROJECT_ENTRY_PATTERN: &str = r#"^\s*Project\("[^"]*"\)\s*=\s*"([^"]*)"\s*,\s*"([^"]*)""#;
const COMPILE_ITEM_PATTERN: &str = r#"<Compile\s+Include\s*=\s*"([^"]+)""#;
const COMPILE_REMOVE_PATTERN: &str = r#"<Compile\s+Remove\s*=\s*"([^"]+)""#;
const SDK_PROJECT_PATTERN: &str = r#"<Project\s[^>]*\bSdk\s*=|<Sdk\s+Name\s*=|Sdk\.props"#;
const ROOT_NAMESPACE_PATTERN: &str = r"<RootNamespace>\s*([^<\s]+)\s*</RootNamespace>";

/// A source file to rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
	pub path: PathBuf,
	pub dialect: Dialect,
	/// How method names in this file are qualified.
	pub naming: NameResolution,
}

/// Where sources are collected from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRoot {
	Folder(PathBuf),
	Solution(PathBuf),
}

impl SourceRoot {
	/// Classify `path`: a `.sln` file is a solution, anything else a folder.
	pub fn from_path(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		let is_solution = path
			.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| ext.eq_ignore_ascii_case(SOLUTION_EXTENSION));

		if is_solution {
			Self::Solution(path)
		} else {
			Self::Folder(path)
		}
	}

	pub fn path(&self) -> &Path {
		match self {
			Self::Folder(path) | Self::Solution(path) => path,
		}
	}
}

/// Collect the sources under every root, in root order. Files within a root
/// are sorted so repeated runs visit them in the same order.
pub fn collect_sources(
	roots: &[SourceRoot],
	config: &RebaselineConfig,
) -> RebaselineResult<Vec<SourceFile>> {
	let mut sources = Vec::new();
	let mut seen = HashSet::new();

	for root in roots {
		let collected = match root {
			SourceRoot::Folder(path) => collect_folder(path, config)?,
			SourceRoot::Solution(path) => collect_solution(path, config)?,
		};
		tracing::debug!(root = %root.path().display(), files = collected.len(), "collected sources");

		for source in collected {
			if seen.insert(source.path.clone()) {
				sources.push(source);
			}
		}
	}

	Ok(sources)
}

/// Every `.cs` and `.vb` file below `root`, named syntactically.
pub fn collect_folder(root: &Path, config: &RebaselineConfig) -> RebaselineResult<Vec<SourceFile>> {
	if !root.is_dir() {
		return Err(RebaselineError::MissingRoot(root.display().to_string()));
	}

	let exclude = build_exclude_matcher(root, &config.exclude.patterns)?;
	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();
	walk_dir(root, &exclude, &mut files, &mut visited_dirs)?;
	files.sort();

	Ok(files
		.into_iter()
		.filter_map(|path| {
			let dialect = Dialect::from_path(&path)?;
			Some(SourceFile {
				path,
				dialect,
				naming: NameResolution::Syntactic,
			})
		})
		.collect())
}

/// Build a `Gitignore` matcher from the configured exclude patterns.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> RebaselineResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			RebaselineError::ExcludePattern {
				pattern: pattern.clone(),
				reason: e.to_string(),
			}
		})?;
	}
	builder.build().map_err(|e| {
		RebaselineError::ExcludePattern {
			pattern: patterns.join(", "),
			reason: e.to_string(),
		}
	})
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.')
		|| name.eq_ignore_ascii_case("bin")
		|| name.eq_ignore_ascii_case("obj")
		|| name == "node_modules"
		|| name == "target"
}

fn walk_dir(
	dir: &Path,
	exclude: &Gitignore,
	files: &mut Vec<PathBuf>,
	visited_dirs: &mut HashSet<PathBuf>,
) -> RebaselineResult<()> {
	// Symlinked directories can loop back on themselves.
	let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
	if !visited_dirs.insert(canonical) {
		return Ok(());
	}

	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();

		if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
			if is_ignored_directory_name(name) && path.is_dir() {
				continue;
			}
		}

		let is_dir = path.is_dir();
		if exclude.matched(&path, is_dir).is_ignore() {
			continue;
		}

		if is_dir {
			walk_dir(&path, exclude, files, visited_dirs)?;
		} else if Dialect::from_path(&path).is_some() {
			files.push(path);
		}
	}

	Ok(())
}

/// A project referenced from a solution file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
	pub name: String,
	pub path: PathBuf,
}

impl ProjectEntry {
	/// The language of the project's documents, from its project file
	/// extension. Solution folders and other project types have none.
	pub fn dialect(&self) -> Option<Dialect> {
		let ext = self.path.extension()?.to_str()?;
		if ext.eq_ignore_ascii_case("csproj") {
			Some(Dialect::CSharp)
		} else if ext.eq_ignore_ascii_case("vbproj") {
			Some(Dialect::VisualBasic)
		} else {
			None
		}
	}
}

/// Read the project entries of a solution file. Project paths are resolved
/// against the solution's directory.
pub fn parse_solution(text: &str, solution_dir: &Path) -> Vec<ProjectEntry> {
	let Ok(entry) = Regex::new(PROJECT_ENTRY_PATTERN) else {
		return Vec::new();
	};

	text.lines()
		.filter_map(|line| entry.captures(line))
		.map(|captures| {
			ProjectEntry {
				name: captures[1].trim().to_string(),
				path: solution_dir.join(native_path(&captures[2])),
			}
		})
		.collect()
}

/// Project files spell paths with backslashes.
fn item_parts(path: &str) -> Vec<&str> {
	path.split(['\\', '/'])
		.filter(|part| !part.is_empty() && *part != ".")
		.collect()
}

fn native_path(path: &str) -> PathBuf {
	item_parts(path).into_iter().collect()
}

/// The documents of every test project in the solution at `path`.
pub fn collect_solution(path: &Path, config: &RebaselineConfig) -> RebaselineResult<Vec<SourceFile>> {
	let text = std::fs::read_to_string(path).map_err(|e| {
		RebaselineError::Solution {
			path: path.display().to_string(),
			reason: e.to_string(),
		}
	})?;
	let solution_dir = path.parent().unwrap_or(Path::new("."));
	let mut sources = Vec::new();

	for project in parse_solution(&text, solution_dir) {
		let Some(dialect) = project.dialect() else {
			continue;
		};
		let is_test = config
			.solution
			.test_suffixes
			.iter()
			.any(|suffix| project.name.ends_with(suffix.as_str()));
		if !is_test {
			tracing::debug!(project = %project.name, "skipping non-test project");
			continue;
		}

		sources.extend(collect_project(&project, dialect, config)?);
	}

	Ok(sources)
}

/// Facts read from a project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFile {
	/// SDK-style projects compile every source below their directory unless
	/// told otherwise.
	pub sdk: bool,
	/// `<Compile Include>` items, as written. A single attribute may list
	/// several items separated by `;`.
	pub compile_items: Vec<String>,
	/// `<Compile Remove>` items, as written.
	pub compile_removes: Vec<String>,
	pub root_namespace: Option<String>,
}

impl ProjectFile {
	pub fn parse(text: &str) -> Self {
		let sdk = Regex::new(SDK_PROJECT_PATTERN).is_ok_and(|pattern| pattern.is_match(text));
		let root_namespace = Regex::new(ROOT_NAMESPACE_PATTERN)
			.ok()
			.and_then(|pattern| pattern.captures(text))
			.map(|captures| captures[1].to_string());

		Self {
			sdk,
			compile_items: item_values(COMPILE_ITEM_PATTERN, text),
			compile_removes: item_values(COMPILE_REMOVE_PATTERN, text),
			root_namespace,
		}
	}
}

fn item_values(pattern: &str, text: &str) -> Vec<String> {
	let Ok(pattern) = Regex::new(pattern) else {
		return Vec::new();
	};

	pattern
		.captures_iter(text)
		.flat_map(|captures| {
			captures[1]
				.split(';')
				.map(str::trim)
				.filter(|item| !item.is_empty())
				.map(str::to_string)
				.collect::<Vec<_>>()
		})
		.collect()
}

fn is_wildcard(part: &str) -> bool {
	part.contains(['*', '?'])
}

/// Match a project item against paths relative to the directory it is
/// anchored on. `*` stays within one directory; `**` crosses them.
fn item_matcher(pattern: &str) -> Option<GlobMatcher> {
	match GlobBuilder::new(pattern).literal_separator(true).build() {
		Ok(glob) => Some(glob.compile_matcher()),
		Err(e) => {
			tracing::debug!(item = pattern, error = %e, "skipping invalid project item");
			None
		}
	}
}

/// The existing source files named by a project item. Wildcard items are
/// expanded below their longest literal prefix; items naming nothing on disk
/// are skipped.
fn expand_item(project_dir: &Path, item: &str) -> RebaselineResult<Vec<PathBuf>> {
	let parts = item_parts(item);
	let Some(wildcard) = parts.iter().position(|part| is_wildcard(part)) else {
		let path = project_dir.join(native_path(item));
		if path.is_file() {
			return Ok(vec![path]);
		}
		tracing::debug!(item, "skipping project item that is not a file");
		return Ok(Vec::new());
	};

	let base: PathBuf = project_dir.join(parts[..wildcard].iter().collect::<PathBuf>());
	let Some(matcher) = item_matcher(&parts[wildcard..].join("/")) else {
		return Ok(Vec::new());
	};
	if !base.is_dir() {
		tracing::debug!(item, "skipping wildcard item without a directory");
		return Ok(Vec::new());
	}

	let mut files = Vec::new();
	walk_dir(&base, &Gitignore::empty(), &mut files, &mut HashSet::new())?;
	Ok(files
		.into_iter()
		.filter(|path| path.strip_prefix(&base).is_ok_and(|relative| matcher.is_match(relative)))
		.collect())
}

/// Whether a `<Compile Remove>` item takes `path` out of the project.
fn is_removed(project_dir: &Path, removes: &[GlobMatcher], path: &Path) -> bool {
	path.strip_prefix(project_dir)
		.is_ok_and(|relative| removes.iter().any(|remove| remove.is_match(relative)))
}

fn collect_project(
	project: &ProjectEntry,
	dialect: Dialect,
	config: &RebaselineConfig,
) -> RebaselineResult<Vec<SourceFile>> {
	let text = std::fs::read_to_string(&project.path).map_err(|e| {
		RebaselineError::Project {
			path: project.path.display().to_string(),
			reason: e.to_string(),
		}
	})?;
	let file = ProjectFile::parse(&text);
	let project_dir = project.path.parent().unwrap_or(Path::new("."));

	// The VB compiler prefixes every name with the project's root namespace.
	let root_namespace = match dialect {
		Dialect::VisualBasic => file.root_namespace.clone(),
		Dialect::CSharp => None,
	};
	let naming = NameResolution::Semantic { root_namespace };

	// SDK-style projects glob their directory; legacy projects list every
	// document explicitly.
	let mut paths: Vec<PathBuf> = if file.sdk {
		collect_folder(project_dir, config)?
			.into_iter()
			.map(|source| source.path)
			.collect()
	} else {
		Vec::new()
	};

	let exclude = build_exclude_matcher(project_dir, &config.exclude.patterns)?;
	for item in &file.compile_items {
		paths.extend(
			expand_item(project_dir, item)?
				.into_iter()
				.filter(|path| !exclude.matched(path, false).is_ignore()),
		);
	}

	let removes: Vec<GlobMatcher> = file
		.compile_removes
		.iter()
		.filter_map(|item| item_matcher(&item_parts(item).join("/")))
		.collect();
	paths.retain(|path| !is_removed(project_dir, &removes, path));
	paths.sort();
	paths.dedup();

	tracing::debug!(project = %project.name, documents = paths.len(), "loaded project");
	Ok(paths
		.into_iter()
		.filter(|path| Dialect::from_path(path) == Some(dialect))
		.map(|path| {
			SourceFile {
				path,
				dialect,
				naming: naming.clone(),
			}
		})
		.collect())
}
