//! C# grammar: a logos lexer, a structure parser and the verbatim string
//! literal form used for rewritten baselines.

use std::rc::Rc;

pub(crate) use self::parser::parse;
use self::parser::TYPE_KEYWORDS;
use self::parser::parameter_list;
use crate::rewriter::DialectSyntax;
use crate::rewriter::LocalDeclaration;
use crate::syntax::Dialect;
use crate::syntax::SyntaxElement;
use crate::syntax::SyntaxKind;
use crate::syntax::SyntaxNode;
use crate::syntax::SyntaxToken;
use crate::syntax::TokenKind;

mod lexer;
mod parser;

/// C# rewriting rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharp;

impl DialectSyntax for CSharp {
	const DIALECT: Dialect = Dialect::CSharp;

	fn namespace_name(node: &SyntaxNode) -> Option<String> {
		let name: String = node
			.child_tokens()
			.skip_while(|token| !token.is_word("namespace"))
			.skip(1)
			.take_while(|token| !token.is_punct("{") && !token.is_punct(";"))
			.map(|token| token.text())
			.collect();

		(!name.is_empty()).then_some(name)
	}

	fn type_name(node: &SyntaxNode) -> Option<String> {
		let mut depth = 0usize;
		let mut tokens = node.child_tokens();

		for token in tokens.by_ref() {
			if token.is_punct("[") {
				depth += 1;
			} else if token.is_punct("]") {
				depth = depth.saturating_sub(1);
			} else if depth == 0 && TYPE_KEYWORDS.iter().any(|keyword| token.is_word(keyword)) {
				break;
			}
		}

		// `record struct Name` / `record class Name`
		tokens
			.find(|token| !token.is_word("struct") && !token.is_word("class"))
			.filter(|token| token.kind() == TokenKind::Identifier)
			.map(|token| identifier(token.text()))
	}

	fn method_name(node: &SyntaxNode) -> Option<String> {
		let tokens: Vec<&Rc<SyntaxToken>> = node.child_tokens().collect();
		let (_, name) = parameter_list(&tokens)?;
		Some(identifier(tokens[name].text()))
	}

	fn local_declaration(node: &SyntaxNode) -> Option<LocalDeclaration> {
		let declarators: Vec<&Rc<SyntaxNode>> = node
			.child_nodes()
			.filter(|child| child.kind() == SyntaxKind::VariableDeclarator)
			.collect();
		let first = declarators.first()?;
		let variable = identifier(first.child_tokens().next()?.text());
		let initializer = first
			.child_of_kind(SyntaxKind::EqualsValueClause)
			.and_then(|clause| clause.child_nodes().next())
			.cloned();

		Some(LocalDeclaration {
			declarators: declarators.len(),
			variable,
			initializer,
		})
	}

	fn literal_text(initializer: &SyntaxNode) -> Option<String> {
		if initializer.kind() != SyntaxKind::StringLiteralExpression {
			return None;
		}
		let token = initializer.child_tokens().next()?;
		verbatim_literal_value(token.text()).or_else(|| regular_literal_value(token.text()))
	}

	fn build_literal(initializer: &SyntaxNode, text: &str, newline: &str) -> Option<Rc<SyntaxNode>> {
		let leading = initializer.first_token()?.leading_trivia();
		let token = SyntaxToken::new(TokenKind::String, leading, verbatim_literal(text, newline));
		Some(SyntaxNode::new(
			SyntaxKind::StringLiteralExpression,
			vec![SyntaxElement::from(token)],
		))
	}
}

fn identifier(text: &str) -> String {
	text.strip_prefix('@').unwrap_or(text).to_string()
}

/// Build the verbatim string literal for `text`: `@"`, a line break, the text
/// with every `"` doubled, a line break and the closing `"`. Line breaks in
/// `text` are rewritten to `newline`.
pub fn verbatim_literal(text: &str, newline: &str) -> String {
	let body = text
		.replace("\r\n", "\n")
		.replace('"', "\"\"")
		.replace('\n', newline);
	format!("@\"{newline}{body}{newline}\"")
}

/// Decode a verbatim string literal produced by [`verbatim_literal`] back into
/// its text, dropping the line breaks that follow `@"` and precede the
/// closing quote.
pub fn verbatim_literal_value(literal: &str) -> Option<String> {
	let body = literal.strip_prefix("@\"")?.strip_suffix('"')?;
	let body = body.replace("\"\"", "\"");
	let body = body
		.strip_prefix("\r\n")
		.or_else(|| body.strip_prefix('\n'))
		.unwrap_or(&body);
	let body = body
		.strip_suffix("\r\n")
		.or_else(|| body.strip_suffix('\n'))
		.unwrap_or(body);
	Some(body.replace("\r\n", "\n"))
}

/// Decode a regular `"..."` literal with the common escape sequences.
fn regular_literal_value(literal: &str) -> Option<String> {
	let body = literal.strip_prefix('"')?.strip_suffix('"')?;
	let mut value = String::with_capacity(body.len());
	let mut chars = body.chars();

	while let Some(ch) = chars.next() {
		if ch != '\\' {
			value.push(ch);
			continue;
		}
		match chars.next()? {
			'n' => value.push('\n'),
			'r' => value.push('\r'),
			't' => value.push('\t'),
			'0' => value.push('\0'),
			other => value.push(other),
		}
	}

	Some(value)
}
