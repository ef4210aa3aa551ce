use logos::Lexer;
use logos::Logos;

use crate::syntax::SyntaxToken;
use crate::syntax::TokenKind;
use crate::syntax::TokenSink;
use crate::syntax::clamp_span;

/// Raw tokens produced by logos for Visual Basic source text. Keywords are
/// case-insensitive and are lexed as identifiers.
#[derive(Logos, Debug, PartialEq)]
enum RawToken {
	#[regex(r"\s+")]
	Whitespace,
	/// An explicit ` _` line continuation, including its line break.
	#[regex(r"_[ \t]*\r?\n")]
	LineContinuation,
	#[regex(r"['\u{2018}\u{2019}][^\n]*", allow_greedy = true)]
	Comment,
	/// `#If`, `#Region`, `#Const` and friends run to the end of the line.
	#[regex(r"#[ \t]*\p{L}[^\n]*", allow_greedy = true)]
	Directive,
	/// `#1/1/2000#`
	#[regex(r"#[0-9][^#\n]*#")]
	Date,
	#[regex(r"[\p{L}_][\p{L}\p{N}_]*[%&@!#$]?")]
	#[regex(r"\[[^\]\n]*\]")]
	Identifier,
	#[regex(r"[0-9][0-9A-Za-z_]*(\.[0-9][0-9A-Za-z_]*)?")]
	#[regex(r"&[HhOoBb][0-9A-Fa-f_]+[A-Za-z]*")]
	Number,
	#[regex(r#""([^"]|"")*"[cC]?"#)]
	String,
	#[token("$\"", interpolated_string)]
	InterpolatedString,
	#[token("<![CDATA[", cdata)]
	CData,
	#[token("<>")]
	#[token("<=")]
	#[token(">=")]
	#[token(":=")]
	#[token("&=")]
	#[token("+=")]
	#[token("-=")]
	#[token("*=")]
	#[token("/=")]
	#[token("\\=")]
	#[token("^=")]
	#[token("<<")]
	#[token(">>")]
	#[token("<<=")]
	#[token(">>=")]
	#[token("?.")]
	CompoundPunctuation,
	#[regex(r"[{}()\[\];,.=<>+\-*/\\%&|^!~?:@$#]")]
	Punctuation,
}

/// Consume a CDATA section up to and including `]]>`.
fn cdata(lex: &mut Lexer<RawToken>) -> bool {
	let remainder = lex.remainder();
	let end = remainder.find("]]>").map_or(remainder.len(), |index| index + 3);
	lex.bump(end);
	true
}

/// Consume the body of `$"..."`, skipping over holes and the strings inside
/// them. `""`, `{{` and `}}` are escapes.
fn interpolated_string(lex: &mut Lexer<RawToken>) -> bool {
	let bytes = lex.remainder().as_bytes();
	let mut index = 0;
	let mut holes = 0usize;

	while index < bytes.len() {
		let byte = bytes[index];
		let next = bytes.get(index + 1).copied();

		if holes == 0 {
			match byte {
				b'"' if next == Some(b'"') => index += 2,
				b'"' => {
					index += 1;
					break;
				}
				b'{' if next == Some(b'{') => index += 2,
				b'{' => {
					holes = 1;
					index += 1;
				}
				_ => index += 1,
			}
			continue;
		}

		match byte {
			b'{' => holes += 1,
			b'}' => holes -= 1,
			b'"' => {
				index += 1;
				while index < bytes.len() && bytes[index] != b'"' {
					index += 1;
				}
			}
			_ => {}
		}
		index += 1;
	}

	lex.bump(index.min(bytes.len()));
	true
}

/// Tokenize Visual Basic source. Whitespace, line breaks, comments,
/// continuations and directives become leading trivia; a CDATA section is
/// split into its start marker, text and end marker.
pub(crate) fn tokenize(source: &str) -> Vec<SyntaxToken> {
	let mut sink = TokenSink::default();
	let mut consumed = 0;

	for (result, span) in RawToken::lexer(source).spanned() {
		let Some(range) = clamp_span(source, &mut consumed, span) else {
			continue;
		};
		let text = &source[range.clone()];

		match result {
			Ok(
				RawToken::Whitespace
				| RawToken::LineContinuation
				| RawToken::Comment
				| RawToken::Directive,
			) => sink.trivia(text),
			Ok(RawToken::Identifier) if text.eq_ignore_ascii_case("rem") => {
				// `REM` comments run to the end of the line.
				let end = source[range.start..]
					.find('\n')
					.map_or(source.len(), |index| range.start + index);
				sink.trivia(&source[range.start..end]);
				consumed = end;
			}
			Ok(RawToken::Identifier) => sink.token(TokenKind::Identifier, text),
			Ok(RawToken::Number | RawToken::Date) => sink.token(TokenKind::Number, text),
			Ok(RawToken::String) => sink.token(TokenKind::String, text),
			Ok(RawToken::InterpolatedString) => sink.token(TokenKind::InterpolatedString, text),
			Ok(RawToken::CData) => split_cdata(&mut sink, text),
			Ok(RawToken::CompoundPunctuation | RawToken::Punctuation) => {
				sink.token(TokenKind::Punctuation, text);
			}
			Err(()) => sink.token(TokenKind::Unknown, text),
		}
	}

	sink.finish()
}

fn split_cdata(sink: &mut TokenSink, text: &str) {
	const START: &str = "<![CDATA[";
	const END: &str = "]]>";

	sink.token(TokenKind::CDataStart, START);
	let body = &text[START.len()..];
	let (body, closed) = match body.strip_suffix(END) {
		Some(body) => (body, true),
		None => (body, false),
	};
	if !body.is_empty() {
		sink.token(TokenKind::XmlText, body);
	}
	if closed {
		sink.token(TokenKind::CDataEnd, END);
	}
}
