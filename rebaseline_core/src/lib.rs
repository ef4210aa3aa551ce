//! `rebaseline_core` updates the baseline literals embedded in C# and Visual
//! Basic test sources from the output of a failing test run.
//!
//! ## Processing Pipeline
//!
//! ```text
//! failure log
//!   → Failure log parser (state machine: method name → corrected text)
//!   → Source collector (folders or a solution's test projects)
//!   → Syntax (lossless C# / Visual Basic trees)
//!   → Rewriter (replaces the baseline literal of each failing method)
//!   → Text store (writes changed files back in their original encoding)
//! ```
//!
//! ## Modules
//!
//! - [`failure_log`]: Extracts a [`CorrectedTextMap`] from the log of a
//!   failing run.
//! - [`syntax`]: Lossless syntax trees shared by both dialects; [`csharp`]
//!   and [`visual_basic`] hold the dialect lexers, parsers and literal
//!   builders.
//! - [`rewriter`]: Finds failing test methods and replaces their baselines.
//! - [`collector`]: Lists the sources to visit.
//! - [`store`]: Reads and writes source text, preserving encodings.
//! - [`config`]: Configuration loaded from `rebaseline.toml`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rebaseline_core::FileStore;
//! use rebaseline_core::RebaselineRequest;
//! use rebaseline_core::SourceRoot;
//! use rebaseline_core::rebaseline;
//!
//! let request = RebaselineRequest::new("failures.log", [SourceRoot::from_path("src")]);
//! let report = rebaseline(&request, &mut FileStore).unwrap();
//!
//! for fix in report.fixes() {
//!     println!("fixed {}", fix.method);
//! }
//! ```

pub use collector::*;
pub use config::*;
pub use error::*;
pub use failure_log::*;
pub use rewriter::*;
pub use session::*;
pub use store::*;
pub use syntax::Dialect;
pub use syntax::SyntaxTree;

pub mod collector;
pub mod config;
pub mod csharp;
#[allow(unused_assignments)]
mod error;
pub mod failure_log;
pub mod rewriter;
mod session;
pub mod store;
pub mod syntax;
pub mod visual_basic;

#[cfg(test)]
mod __tests;
