//! Visual Basic grammar: a logos lexer, a line-oriented structure parser and
//! the XML CDATA literal form used for rewritten baselines.

use std::rc::Rc;

pub(crate) use self::parser::parse;
use self::parser::declaration_keyword;
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

/// Visual Basic rewriting rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisualBasic;

impl DialectSyntax for VisualBasic {
	const DIALECT: Dialect = Dialect::VisualBasic;

	fn namespace_name(node: &SyntaxNode) -> Option<String> {
		let name: String = node
			.child_tokens()
			.skip_while(|token| !token.is_word_ignore_case("Namespace"))
			.skip(1)
			.take_while(|token| !token.starts_line() || token.is_punct("."))
			.map(|token| identifier(token.text()))
			.collect();
		let name = name.strip_prefix("Global.").unwrap_or(&name);

		(!name.is_empty() && !name.eq_ignore_ascii_case("Global")).then(|| name.to_string())
	}

	fn type_name(node: &SyntaxNode) -> Option<String> {
		declared_name(node)
	}

	fn method_name(node: &SyntaxNode) -> Option<String> {
		declared_name(node)
	}

	fn local_declaration(node: &SyntaxNode) -> Option<LocalDeclaration> {
		let declarators: Vec<&Rc<SyntaxNode>> = node
			.child_nodes()
			.filter(|child| child.kind() == SyntaxKind::VariableDeclarator)
			.collect();
		let first = declarators.first()?;
		let variable = identifier(first.child_tokens().next()?.text());
		// Only CDATA initializers are replaceable.
		let initializer = first
			.child_of_kind(SyntaxKind::EqualsValueClause)
			.and_then(|clause| clause.child_nodes().next())
			.filter(|value| cdata_section(value).is_some())
			.cloned();

		Some(LocalDeclaration {
			declarators: declarators.len(),
			variable,
			initializer,
		})
	}

	fn literal_text(initializer: &SyntaxNode) -> Option<String> {
		let section = cdata_section(initializer)?;
		let text: String = section
			.child_tokens()
			.filter(|token| token.kind() == TokenKind::XmlText)
			.map(|token| token.text())
			.collect();
		Some(cdata_value(&text))
	}

	fn build_literal(initializer: &SyntaxNode, text: &str, newline: &str) -> Option<Rc<SyntaxNode>> {
		let section = cdata_section(initializer)?;
		let start = section
			.child_tokens()
			.find(|token| token.kind() == TokenKind::CDataStart)?;
		let end = section
			.child_tokens()
			.find(|token| token.kind() == TokenKind::CDataEnd)?;

		let mut children = vec![SyntaxElement::Token(Rc::clone(start))];
		children.extend(
			cdata_lines(text, newline)
				.into_iter()
				.map(|line| SyntaxElement::from(SyntaxToken::new(TokenKind::XmlText, "", line))),
		);
		children.push(SyntaxElement::Token(Rc::clone(end)));
		let replacement = SyntaxNode::new(SyntaxKind::XmlCDataSection, children);

		if initializer.kind() == SyntaxKind::XmlCDataSection {
			return Some(replacement);
		}

		let elements = initializer
			.children()
			.iter()
			.map(|child| {
				match child {
					SyntaxElement::Node(node) if node.kind() == SyntaxKind::XmlCDataSection => {
						SyntaxElement::Node(Rc::clone(&replacement))
					}
					other => other.clone(),
				}
			})
			.collect();
		Some(initializer.with_children(elements))
	}
}

/// The CDATA section of an initializer: either the initializer itself or
/// the target of a trailing `.Value`.
fn cdata_section(initializer: &SyntaxNode) -> Option<&SyntaxNode> {
	match initializer.kind() {
		SyntaxKind::XmlCDataSection => Some(initializer),
		SyntaxKind::MemberAccessExpression => {
			initializer
				.child_of_kind(SyntaxKind::XmlCDataSection)
				.map(|section| &**section)
		}
		_ => None,
	}
}

/// The identifier following the declaration keyword of a type or method.
fn declared_name(node: &SyntaxNode) -> Option<String> {
	let tokens: Vec<&Rc<SyntaxToken>> = node.child_tokens().collect();
	let keyword = declaration_keyword(&tokens)?;
	tokens
		.get(keyword + 1)
		.filter(|token| token.kind() == TokenKind::Identifier)
		.map(|token| identifier(token.text()))
}

/// Strip `[...]` escaping and a trailing type character.
fn identifier(text: &str) -> String {
	if let Some(inner) = text.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
		return inner.to_string();
	}
	text.trim_end_matches(['%', '&', '@', '!', '#', '$'])
		.to_string()
}

/// The interior text tokens of a CDATA literal for `text`: one line break,
/// then each line of `text` with carriage returns removed and a line break
/// appended.
pub fn cdata_lines(text: &str, newline: &str) -> Vec<String> {
	let mut lines = vec![newline.to_string()];
	lines.extend(
		text.split('\n')
			.map(|line| format!("{}{newline}", line.replace('\r', ""))),
	);
	lines
}

/// Build the complete CDATA literal for `text`, including `.Value`.
pub fn cdata_literal(text: &str, newline: &str) -> String {
	format!("<![CDATA[{}]]>.Value", cdata_lines(text, newline).concat())
}

/// Decode the interior of a CDATA section built by [`cdata_lines`].
pub fn cdata_value(interior: &str) -> String {
	let interior = interior.replace("\r\n", "\n");
	let interior = interior.strip_prefix('\n').unwrap_or(&interior);
	interior.strip_suffix('\n').unwrap_or(interior).to_string()
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn find(node: &Rc<SyntaxNode>, kind: SyntaxKind) -> Option<Rc<SyntaxNode>> {
		if node.kind() == kind {
			return Some(Rc::clone(node));
		}
		node.child_nodes().find_map(|child| find(child, kind))
	}

	#[rstest]
	#[case::dotted("Namespace Microsoft.CodeAnalysis.Tests\nEnd Namespace\n", "Microsoft.CodeAnalysis.Tests")]
	#[case::global("Namespace Global.Root\nEnd Namespace\n", "Root")]
	#[case::escaped("Namespace [Namespace].Inner\nEnd Namespace\n", "Namespace.Inner")]
	fn namespace_names(#[case] source: &str, #[case] expected: &str) {
		let namespace = find(&parse(source), SyntaxKind::NamespaceDeclaration);
		let name = namespace.and_then(|node| VisualBasic::namespace_name(&node));
		assert_eq!(name.as_deref(), Some(expected));
	}

	#[rstest]
	#[case::class("Public Class Foo\nEnd Class\n", "Foo")]
	#[case::module("Friend Module [Module]\nEnd Module\n", "Module")]
	#[case::structure("<Serializable>\nStructure S\nEnd Structure\n", "S")]
	fn type_names(#[case] source: &str, #[case] expected: &str) {
		let ty = find(&parse(source), SyntaxKind::TypeDeclaration);
		let name = ty.and_then(|node| VisualBasic::type_name(&node));
		assert_eq!(name.as_deref(), Some(expected));
	}

	#[rstest]
	#[case::sub("<Fact()>\nPublic Sub TestA()\nEnd Sub\n", "TestA")]
	#[case::function("Private Async Function Load(Of T)() As Task\nEnd Function\n", "Load")]
	fn method_names(#[case] member: &str, #[case] expected: &str) {
		let source = format!("Class C\n{member}End Class\n");
		let method = find(&parse(&source), SyntaxKind::MethodDeclaration);
		let name = method.and_then(|node| VisualBasic::method_name(&node));
		assert_eq!(name.as_deref(), Some(expected));
	}

	#[test]
	fn cdata_literal_shape() {
		assert_eq!(cdata_literal("X\r\nY", "\n"), "<![CDATA[\nX\nY\n]]>.Value");
		assert_eq!(cdata_lines("a\nb", "\r\n"), vec!["\r\n", "a\r\n", "b\r\n"]);
	}

	#[rstest]
	#[case::single("one line")]
	#[case::multiple("first\n  second\n\"quoted\"")]
	fn cdata_round_trip(#[case] text: &str) {
		let interior = cdata_lines(text, "\n").concat();
		assert_eq!(cdata_value(&interior), text);
	}

	#[test]
	fn initializers_without_cdata_are_not_replaceable() {
		let source = "Module M\nSub S()\nDim expectedGraph = \"x\"\nEnd Sub\nEnd Module\n";
		let declaration = find(&parse(source), SyntaxKind::LocalDeclaration);
		let local = declaration.and_then(|node| VisualBasic::local_declaration(&node));
		let Some(local) = local else {
			panic!("declaration not recognized");
		};
		assert_eq!(local.variable, "expectedGraph");
		assert!(local.initializer.is_none());
	}

	#[test]
	fn built_literal_keeps_markers_and_member_access() {
		let source = "Module M\nSub S()\nDim expectedGraph = <![CDATA[old]]>.Value\nEnd Sub\nEnd Module\n";
		let access = find(&parse(source), SyntaxKind::MemberAccessExpression);
		let Some(access) = access else {
			panic!("missing member access");
		};
		assert_eq!(VisualBasic::literal_text(&access).as_deref(), Some("old"));
		let Some(built) = VisualBasic::build_literal(&access, "new\ntext", "\n") else {
			panic!("literal not built");
		};
		assert_eq!(built.to_string(), " <![CDATA[\nnew\ntext\n]]>.Value");
	}
}
