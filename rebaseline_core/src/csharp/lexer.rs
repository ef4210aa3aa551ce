use logos::Lexer;
use logos::Logos;

use crate::syntax::SyntaxToken;
use crate::syntax::TokenKind;
use crate::syntax::TokenSink;
use crate::syntax::clamp_span;

/// Raw tokens produced by logos for C# source text.
#[derive(Logos, Debug, PartialEq)]
enum RawToken {
	#[regex(r"\s+")]
	Whitespace,
	#[regex(r"//[^\n]*", allow_greedy = true)]
	LineComment,
	#[token("/*", block_comment)]
	BlockComment,
	/// `#region`, `#if`, `#nullable` and friends run to the end of the line.
	#[regex(r"#[^\n]*", allow_greedy = true)]
	Directive,
	#[regex(r"@?[\p{L}_][\p{L}\p{N}_]*")]
	Identifier,
	#[regex(r"[0-9][0-9A-Za-z_]*(\.[0-9][0-9A-Za-z_]*)?")]
	Number,
	#[regex(r#""([^"\\\n]|\\.)*""#)]
	String,
	#[regex(r#"@"([^"]|"")*""#)]
	VerbatimString,
	#[regex(r#""""+"#, raw_string)]
	RawString,
	#[regex(r#"\$+@?""#, interpolated_string)]
	#[regex(r#"@\$+""#, interpolated_string)]
	InterpolatedString,
	#[regex(r#"\$+""""+"#, raw_interpolated_string)]
	RawInterpolatedString,
	#[regex(r"'([^'\\\n]|\\.)+'")]
	Char,
	#[token("=>")]
	#[token("==")]
	#[token("!=")]
	#[token("<=")]
	#[token(">=")]
	#[token("&&")]
	#[token("||")]
	#[token("??")]
	#[token("??=")]
	#[token("+=")]
	#[token("-=")]
	#[token("*=")]
	#[token("/=")]
	#[token("%=")]
	#[token("&=")]
	#[token("|=")]
	#[token("^=")]
	#[token("<<=")]
	#[token("<<")]
	#[token("++")]
	#[token("--")]
	#[token("->")]
	#[token("::")]
	#[token("?.")]
	#[token("..")]
	CompoundPunctuation,
	#[regex(r"[{}()\[\];,.=<>+\-*/%&|^!~?:@$\\]")]
	Punctuation,
}

fn block_comment(lex: &mut Lexer<RawToken>) -> bool {
	let remainder = lex.remainder();
	let end = remainder.find("*/").map_or(remainder.len(), |index| index + 2);
	lex.bump(end);
	true
}

/// `"""` opens a raw string; it closes at the first run of the same number of
/// quotes.
fn raw_string(lex: &mut Lexer<RawToken>) -> bool {
	let quotes = lex.slice().len();
	bump_to_closing_quotes(lex, quotes);
	true
}

fn raw_interpolated_string(lex: &mut Lexer<RawToken>) -> bool {
	let quotes = lex.slice().bytes().filter(|byte| *byte == b'"').count();
	bump_to_closing_quotes(lex, quotes);
	true
}

fn bump_to_closing_quotes(lex: &mut Lexer<RawToken>, quotes: usize) {
	let closing = "\"".repeat(quotes);
	let remainder = lex.remainder();
	let end = remainder
		.find(&closing)
		.map_or(remainder.len(), |index| index + quotes);
	lex.bump(end);
}

/// Scan the body of `$"..."` / `$@"..."` including nested holes, strings
/// and braces.
fn interpolated_string(lex: &mut Lexer<RawToken>) -> bool {
	let verbatim = lex.slice().contains('@');
	let consumed = scan_interpolated_body(lex.remainder(), verbatim);
	lex.bump(consumed);
	true
}

/// Returns the number of bytes up to and including the closing quote of an
/// interpolated string whose opening quote has already been consumed.
fn scan_interpolated_body(source: &str, verbatim: bool) -> usize {
	let bytes = source.as_bytes();
	let mut index = 0;
	let mut holes = 0usize;

	while index < bytes.len() {
		let byte = bytes[index];

		if holes == 0 {
			match byte {
				b'"' if verbatim && bytes.get(index + 1) == Some(&b'"') => index += 2,
				b'"' => return index + 1,
				b'\\' if !verbatim => index += 2,
				b'{' if bytes.get(index + 1) == Some(&b'{') => index += 2,
				b'{' => {
					holes = 1;
					index += 1;
				}
				b'\n' if !verbatim => return index,
				_ => index += 1,
			}
			continue;
		}

		match byte {
			b'{' => {
				holes += 1;
				index += 1;
			}
			b'}' => {
				holes -= 1;
				index += 1;
			}
			b'"' => {
				index += 1;
				while index < bytes.len() && bytes[index] != b'"' && bytes[index] != b'\n' {
					if bytes[index] == b'\\' {
						index += 1;
					}
					index += 1;
				}
				index += 1;
			}
			b'\'' => {
				index += 1;
				while index < bytes.len() && bytes[index] != b'\'' && bytes[index] != b'\n' {
					if bytes[index] == b'\\' {
						index += 1;
					}
					index += 1;
				}
				index += 1;
			}
			_ => index += 1,
		}
	}

	bytes.len()
}

/// Tokenize C# source text. Whitespace, comments and preprocessor lines become
/// leading trivia of the following token; every byte of `source` ends up in
/// exactly one token or trivia run.
pub(crate) fn tokenize(source: &str) -> Vec<SyntaxToken> {
	let mut sink = TokenSink::default();
	let mut consumed = 0;

	for (result, span) in RawToken::lexer(source).spanned() {
		let Some(range) = clamp_span(source, &mut consumed, span) else {
			continue;
		};
		let text = &source[range];

		match result {
			Ok(RawToken::Whitespace | RawToken::LineComment | RawToken::BlockComment) => {
				sink.trivia(text);
			}
			Ok(RawToken::Directive) => sink.trivia(text),
			Ok(RawToken::Identifier) => sink.token(TokenKind::Identifier, text),
			Ok(RawToken::Number) => sink.token(TokenKind::Number, text),
			Ok(RawToken::String | RawToken::VerbatimString | RawToken::RawString) => {
				sink.token(TokenKind::String, text);
			}
			Ok(RawToken::InterpolatedString | RawToken::RawInterpolatedString) => {
				sink.token(TokenKind::InterpolatedString, text);
			}
			Ok(RawToken::Char) => sink.token(TokenKind::Char, text),
			Ok(RawToken::CompoundPunctuation | RawToken::Punctuation) => {
				sink.token(TokenKind::Punctuation, text);
			}
			Err(()) => sink.token(TokenKind::Unknown, text),
		}
	}

	sink.finish()
}
