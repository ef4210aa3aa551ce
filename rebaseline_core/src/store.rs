//! Reading and writing source text while preserving each file's encoding.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::RebaselineError;
use crate::RebaselineResult;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// The on-disk encoding of a text file, detected from its byte order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
	#[default]
	Utf8,
	Utf8Bom,
	Utf16Le,
	Utf16Be,
}

impl Display for TextEncoding {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::Utf8 => "UTF-8",
			Self::Utf8Bom => "UTF-8 with BOM",
			Self::Utf16Le => "UTF-16 LE",
			Self::Utf16Be => "UTF-16 BE",
		};
		f.write_str(name)
	}
}

/// Decode `bytes`, detecting the encoding from a byte order mark. Without a
/// BOM the bytes must be UTF-8. On failure the attempted encoding is
/// returned.
pub fn decode_text(bytes: &[u8]) -> Result<(String, TextEncoding), TextEncoding> {
	if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
		let text = String::from_utf8(rest.to_vec()).map_err(|_| TextEncoding::Utf8Bom)?;
		return Ok((text, TextEncoding::Utf8Bom));
	}
	if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
		let text = decode_utf16(rest, u16::from_le_bytes).ok_or(TextEncoding::Utf16Le)?;
		return Ok((text, TextEncoding::Utf16Le));
	}
	if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
		let text = decode_utf16(rest, u16::from_be_bytes).ok_or(TextEncoding::Utf16Be)?;
		return Ok((text, TextEncoding::Utf16Be));
	}

	let text = String::from_utf8(bytes.to_vec()).map_err(|_| TextEncoding::Utf8)?;
	Ok((text, TextEncoding::Utf8))
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
	if bytes.len() % 2 != 0 {
		return None;
	}
	let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
	char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Encode `text` in `encoding`, writing a byte order mark where the encoding
/// has one.
pub fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
	match encoding {
		TextEncoding::Utf8 => text.as_bytes().to_vec(),
		TextEncoding::Utf8Bom => [UTF8_BOM, text.as_bytes()].concat(),
		TextEncoding::Utf16Le => {
			let mut bytes = UTF16_LE_BOM.to_vec();
			bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
			bytes
		}
		TextEncoding::Utf16Be => {
			let mut bytes = UTF16_BE_BOM.to_vec();
			bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
			bytes
		}
	}
}

/// Source text together with the encoding it was read in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFile {
	pub text: String,
	pub encoding: TextEncoding,
}

impl TextFile {
	pub fn new(text: impl Into<String>, encoding: TextEncoding) -> Self {
		Self {
			text: text.into(),
			encoding,
		}
	}
}

/// Where source files are read from and written back to.
pub trait TextStore {
	fn read(&mut self, path: &Path) -> RebaselineResult<TextFile>;
	fn write(&mut self, path: &Path, file: &TextFile) -> RebaselineResult<()>;
}

/// The file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl TextStore for FileStore {
	fn read(&mut self, path: &Path) -> RebaselineResult<TextFile> {
		let bytes = std::fs::read(path).map_err(|error| {
			RebaselineError::SourceRead {
				path: path.display().to_string(),
				reason: error.to_string(),
			}
		})?;
		let (text, encoding) = decode_text(&bytes).map_err(|encoding| {
			RebaselineError::Encoding {
				path: path.display().to_string(),
				encoding: encoding.to_string(),
			}
		})?;

		Ok(TextFile { text, encoding })
	}

	fn write(&mut self, path: &Path, file: &TextFile) -> RebaselineResult<()> {
		std::fs::write(path, encode_text(&file.text, file.encoding)).map_err(|error| {
			RebaselineError::SourceWrite {
				path: path.display().to_string(),
				reason: error.to_string(),
			}
		})
	}
}

/// An in-memory store that records every read and write.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	files: BTreeMap<PathBuf, TextFile>,
	reads: Vec<PathBuf>,
	writes: Vec<PathBuf>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add or replace a UTF-8 file.
	pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
		self.files
			.insert(path.into(), TextFile::new(text, TextEncoding::Utf8));
	}

	pub fn get(&self, path: &Path) -> Option<&str> {
		self.files.get(path).map(|file| file.text.as_str())
	}

	/// Paths read so far, in order.
	pub fn reads(&self) -> &[PathBuf] {
		&self.reads
	}

	/// Paths written so far, in order.
	pub fn writes(&self) -> &[PathBuf] {
		&self.writes
	}
}

impl TextStore for MemoryStore {
	fn read(&mut self, path: &Path) -> RebaselineResult<TextFile> {
		self.reads.push(path.to_path_buf());
		self.files.get(path).cloned().ok_or_else(|| {
			RebaselineError::SourceRead {
				path: path.display().to_string(),
				reason: "no such file".into(),
			}
		})
	}

	fn write(&mut self, path: &Path, file: &TextFile) -> RebaselineResult<()> {
		self.writes.push(path.to_path_buf());
		self.files.insert(path.to_path_buf(), file.clone());
		Ok(())
	}
}
