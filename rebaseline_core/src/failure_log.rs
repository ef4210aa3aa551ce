//! Extraction of corrected baselines from a failing test run's log.
//!
//! The log is consumed line by line by a small state machine:
//!
//! ```text
//! NotParsing ──"… FAILED:"──▶ FindingActual ──"Actual: …"──▶ ParsingActual
//!      ▲                            │                              │
//!      └──────"Exception stacktrace"┴──────────────────────────────┘
//! ```
//!
//! Every captured record maps the failing test's qualified method name to the
//! text that followed `Actual:` up to the blank line before the stack trace.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Deserialize;
use serde::Serialize;

use crate::RebaselineError;
use crate::RebaselineResult;
use crate::store::decode_text;

const FAILED_SUFFIX: &str = "FAILED:";
const ACTUAL_PREFIX: &str = "Actual:";
/// `Actual:   True` is the output of a failed boolean assertion, not a
/// baseline.
const BOOLEAN_ACTUAL_PREFIX: &str = "Actual:   True";
const STACK_TRACE_MARKER: &str = "Exception stacktrace";

/// Corrected baseline text keyed by qualified method name
/// (`Namespace.Type.Method`). Entries are removed as they are applied, so a
/// record can never be applied twice in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, Serialize)]
#[serde(transparent)]
pub struct CorrectedTextMap(
	#[deref]
	#[deref_mut]
	BTreeMap<String, String>,
);

impl CorrectedTextMap {
	pub fn new() -> Self {
		Self::default()
	}

	/// Remove and return the corrected text for `method`.
	pub fn take(&mut self, method: &str) -> Option<String> {
		self.0.remove(method)
	}
}

impl<K, V> FromIterator<(K, V)> for CorrectedTextMap
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(
			iter.into_iter()
				.map(|(key, value)| (key.into(), value.into()))
				.collect(),
		)
	}
}

/// What to do with a record whose `Actual:` block is still open when the
/// log ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnterminatedCapturePolicy {
	/// Discard the record and report a diagnostic.
	#[default]
	Drop,
	/// Fail with [`RebaselineError::UnterminatedCapture`].
	Error,
}

/// A non-fatal anomaly found while reading the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogDiagnostic {
	/// A stack trace (or the end of the log) was reached before any
	/// `Actual:` line for a failed test.
	MissingActual { method: String, line: usize },
	/// The log ended while a baseline was still being captured.
	UnterminatedCapture { method: String, line: usize },
}

impl LogDiagnostic {
	pub fn method(&self) -> &str {
		match self {
			Self::MissingActual { method, .. } | Self::UnterminatedCapture { method, .. } => method,
		}
	}
}

impl Display for LogDiagnostic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::MissingActual { method, line } => {
				write!(f, "could not parse test result for {method} (line {line})")
			}
			Self::UnterminatedCapture { method, line } => {
				write!(f, "log ended while capturing the result for {method} (line {line})")
			}
		}
	}
}

/// The outcome of parsing a failure log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureLog {
	pub records: CorrectedTextMap,
	pub diagnostics: Vec<LogDiagnostic>,
}

#[derive(Debug, Default)]
enum State {
	#[default]
	NotParsing,
	FindingActual {
		method: String,
	},
	ParsingActual {
		method: String,
		buffer: Vec<String>,
		/// The most recent line. It is only committed to `buffer` once the
		/// next line arrives, so the blank line before the stack trace marker
		/// never makes it into the record.
		held: String,
	},
}

/// Streaming failure log parser. Feed lines in order, then call
/// [`FailureLogParser::finish`].
#[derive(Debug, Default)]
pub struct FailureLogParser {
	state: State,
	policy: UnterminatedCapturePolicy,
	line: usize,
	log: FailureLog,
}

impl FailureLogParser {
	pub fn new(policy: UnterminatedCapturePolicy) -> Self {
		Self {
			policy,
			..Self::default()
		}
	}

	/// Advance the state machine by one line.
	pub fn feed(&mut self, line: &str) {
		self.line += 1;

		self.state = match std::mem::take(&mut self.state) {
			State::NotParsing => {
				if line.ends_with(FAILED_SUFFIX) {
					let method = failed_method_name(line);
					tracing::debug!(method = %method, line = self.line, "found failed test");
					State::FindingActual { method }
				} else {
					State::NotParsing
				}
			}
			State::FindingActual { method } => {
				if is_stack_trace(line) {
					self.diagnose(LogDiagnostic::MissingActual {
						method,
						line: self.line,
					});
					State::NotParsing
				} else if line.starts_with(ACTUAL_PREFIX) && !line.starts_with(BOOLEAN_ACTUAL_PREFIX) {
					State::ParsingActual {
						method,
						buffer: Vec::new(),
						held: line.to_string(),
					}
				} else {
					State::FindingActual { method }
				}
			}
			State::ParsingActual {
				method,
				mut buffer,
				held,
			} => {
				if is_stack_trace(line) {
					self.record(method, &buffer);
					State::NotParsing
				} else {
					buffer.push(held);
					State::ParsingActual {
						method,
						buffer,
						held: line.to_string(),
					}
				}
			}
		};
	}

	/// Close the log, applying the unterminated capture policy to a record
	/// that is still open.
	pub fn finish(mut self) -> RebaselineResult<FailureLog> {
		match std::mem::take(&mut self.state) {
			State::NotParsing => {}
			State::FindingActual { method } => {
				self.diagnose(LogDiagnostic::MissingActual {
					method,
					line: self.line,
				});
			}
			State::ParsingActual { method, .. } => {
				match self.policy {
					UnterminatedCapturePolicy::Drop => {
						self.diagnose(LogDiagnostic::UnterminatedCapture {
							method,
							line: self.line,
						});
					}
					UnterminatedCapturePolicy::Error => {
						return Err(RebaselineError::UnterminatedCapture { method });
					}
				}
			}
		}

		Ok(self.log)
	}

	fn record(&mut self, method: String, buffer: &[String]) {
		let joined = buffer.join("\n");
		let text = joined
			.strip_prefix(ACTUAL_PREFIX)
			.unwrap_or(&joined)
			.trim()
			.to_string();

		tracing::debug!(method = %method, lines = buffer.len(), "captured corrected baseline");
		if self.log.records.insert(method.clone(), text).is_some() {
			tracing::debug!(method = %method, "replaced an earlier record for the same test");
		}
	}

	fn diagnose(&mut self, diagnostic: LogDiagnostic) {
		tracing::warn!("{diagnostic}");
		self.log.diagnostics.push(diagnostic);
	}
}

/// `'Namespace.Type.Method' FAILED:` → `Namespace.Type.Method`
fn failed_method_name(line: &str) -> String {
	line.replace('\'', "")
		.replace(" FAILED:", "")
		.trim()
		.to_string()
}

fn is_stack_trace(line: &str) -> bool {
	line.trim().starts_with(STACK_TRACE_MARKER)
}

/// Parse a complete log, dropping unterminated records.
pub fn parse_failure_log<I, S>(lines: I) -> FailureLog
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut parser = FailureLogParser::new(UnterminatedCapturePolicy::Drop);
	for line in lines {
		parser.feed(line.as_ref());
	}
	// The drop policy never fails.
	parser.finish().unwrap_or_default()
}

/// Read and parse the failure log at `path`.
pub fn read_failure_log(path: &Path, policy: UnterminatedCapturePolicy) -> RebaselineResult<FailureLog> {
	let failure = |reason: String| {
		RebaselineError::FailureLogRead {
			path: path.display().to_string(),
			reason,
		}
	};
	let bytes = std::fs::read(path).map_err(|error| failure(error.to_string()))?;
	// Logs interleave arbitrary process output; only sources keep strict decoding.
	let text = match decode_text(&bytes) {
		Ok((text, _)) => text,
		Err(encoding) => {
			tracing::warn!(
				path = %path.display(),
				%encoding,
				"failure log is not valid text, replacing invalid bytes"
			);
			String::from_utf8_lossy(&bytes).into_owned()
		}
	};

	let mut parser = FailureLogParser::new(policy);
	for line in text.lines() {
		parser.feed(line);
	}
	let log = parser.finish()?;

	tracing::info!(
		path = %path.display(),
		records = log.records.len(),
		diagnostics = log.diagnostics.len(),
		"parsed failure log"
	);
	Ok(log)
}
