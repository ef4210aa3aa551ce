use std::ops::Range;
use std::rc::Rc;

use super::lexer::tokenize;
use crate::syntax::SyntaxElement;
use crate::syntax::SyntaxKind;
use crate::syntax::SyntaxNode;
use crate::syntax::SyntaxToken;
use crate::syntax::TokenKind;

/// Modifiers that may precede a declaration keyword.
const MODIFIERS: &[&str] = &[
	"Public",
	"Private",
	"Protected",
	"Friend",
	"Shared",
	"Shadows",
	"Overloads",
	"Overrides",
	"Overridable",
	"NotOverridable",
	"MustOverride",
	"MustInherit",
	"NotInheritable",
	"Partial",
	"Async",
	"Iterator",
	"ReadOnly",
	"WriteOnly",
	"Default",
	"Widening",
	"Narrowing",
	"Custom",
	"Declare",
	"Ansi",
	"Unicode",
	"Auto",
	"WithEvents",
];

/// Keywords that open a type whose members are parsed recursively.
const TYPE_KEYWORDS: &[&str] = &["Class", "Module", "Structure", "Interface"];

/// `End <word>` lines that close a type or namespace. They also end any
/// member body left open by unbalanced input.
const CONTAINER_ENDS: &[&str] = &["Class", "Module", "Structure", "Interface", "Namespace"];

/// Tokens after which a line break does not end the statement.
const CONTINUES_AFTER: &[&str] = &[
	",", "(", "{", "=", "&", "+", "-", "*", "/", "\\", "^", ":=", "&=", "+=", "-=", "*=", "/=",
	"\\=", "^=", "<<", ">>", "<<=", ">>=", "<>", "<=", ">=",
];

const CONTINUES_AFTER_WORDS: &[&str] = &["And", "AndAlso", "Or", "OrElse", "Xor", "Is", "IsNot", "Like", "Mod"];

/// Parse Visual Basic source into a lossless tree.
pub(crate) fn parse(source: &str) -> Rc<SyntaxNode> {
	let tokens: Vec<Rc<SyntaxToken>> = tokenize(source).into_iter().map(Rc::new).collect();
	let lines = split_lines(&tokens);
	Parser {
		tokens,
		lines,
		line: 0,
	}
	.compilation_unit()
}

/// What a logical line declares.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineShape {
	Namespace,
	Type { interface: bool },
	/// `Sub` or `Function` with a body closed by `End <keyword>`.
	Method { keyword: String },
	/// `Sub New`.
	Constructor,
	/// A member with a body closed by `End <keyword>`.
	BlockMember { keyword: String },
	/// `Property` whose block form depends on the following line.
	Property,
	/// `End <keyword>`.
	End { keyword: String },
	Other,
}

struct Parser {
	tokens: Vec<Rc<SyntaxToken>>,
	/// Token ranges of every logical line, excluding the end-of-file token.
	lines: Vec<Range<usize>>,
	line: usize,
}

impl Parser {
	fn has_line(&self) -> bool {
		self.line < self.lines.len()
	}

	fn line_tokens(&self, line: usize) -> &[Rc<SyntaxToken>] {
		&self.tokens[self.lines[line].clone()]
	}

	fn shape(&self, line: usize) -> LineShape {
		line_shape(self.line_tokens(line))
	}

	/// Push the tokens of the current line and advance.
	fn push_line(&mut self, children: &mut Vec<SyntaxElement>) {
		children.extend(
			self.line_tokens(self.line)
				.iter()
				.cloned()
				.map(SyntaxElement::Token),
		);
		self.line += 1;
	}

	fn compilation_unit(mut self) -> Rc<SyntaxNode> {
		let mut children = self.members(false, false);
		if let Some(eof) = self.tokens.last() {
			children.push(SyntaxElement::Token(Rc::clone(eof)));
		}
		SyntaxNode::new(SyntaxKind::CompilationUnit, children)
	}

	/// Parse member lines. Inside a block this stops at the first `End`
	/// line, which the caller consumes.
	fn members(&mut self, in_block: bool, in_interface: bool) -> Vec<SyntaxElement> {
		let mut children = Vec::new();

		while self.has_line() {
			let shape = self.shape(self.line);
			if in_block && matches!(shape, LineShape::End { .. }) {
				break;
			}
			let member = self.member(shape, in_interface);
			children.push(SyntaxElement::Node(member));
		}

		children
	}

	fn member(&mut self, shape: LineShape, in_interface: bool) -> Rc<SyntaxNode> {
		let mut children = Vec::new();
		self.push_line(&mut children);

		match shape {
			LineShape::Namespace => {
				children.extend(self.members(true, false));
				self.push_end_line(&["Namespace"], &mut children);
				SyntaxNode::new(SyntaxKind::NamespaceDeclaration, children)
			}
			LineShape::Type { interface } => {
				children.extend(self.members(true, interface));
				self.push_end_line(TYPE_KEYWORDS, &mut children);
				SyntaxNode::new(SyntaxKind::TypeDeclaration, children)
			}
			LineShape::Method { keyword } if !in_interface => {
				self.body(&keyword, &mut children);
				SyntaxNode::new(SyntaxKind::MethodDeclaration, children)
			}
			LineShape::Constructor if !in_interface => {
				self.body("Sub", &mut children);
				SyntaxNode::new(SyntaxKind::MemberDeclaration, children)
			}
			LineShape::BlockMember { keyword } if !in_interface => {
				self.body(&keyword, &mut children);
				SyntaxNode::new(SyntaxKind::MemberDeclaration, children)
			}
			LineShape::Property if !in_interface && self.next_line_is_accessor() => {
				self.body("Property", &mut children);
				SyntaxNode::new(SyntaxKind::MemberDeclaration, children)
			}
			_ => SyntaxNode::new(SyntaxKind::MemberDeclaration, children),
		}
	}

	/// Consume the current line if it is `End` followed by one of `keywords`.
	fn push_end_line(&mut self, keywords: &[&str], children: &mut Vec<SyntaxElement>) {
		if !self.has_line() {
			return;
		}
		if let LineShape::End { keyword } = self.shape(self.line)
			&& keywords.iter().any(|word| word.eq_ignore_ascii_case(&keyword))
		{
			self.push_line(children);
		}
	}

	fn next_line_is_accessor(&self) -> bool {
		if !self.has_line() {
			return false;
		}
		let tokens = self.line_tokens(self.line);
		let index = skip_modifiers(tokens, skip_attributes(tokens, 0));
		tokens.get(index).is_some_and(|token| {
			["Get", "Set", "Init"]
				.iter()
				.any(|word| token.is_word_ignore_case(word))
		})
	}

	/// Parse statements into a block until `End <keyword>`, then consume the
	/// end line. Multi-line lambdas inside the body are balanced so that
	/// their own `End Sub` does not close the member.
	fn body(&mut self, keyword: &str, children: &mut Vec<SyntaxElement>) {
		let mut statements = Vec::new();
		let mut lambdas = 0usize;

		while self.has_line() {
			let tokens = self.line_tokens(self.line);

			if let LineShape::End { keyword: end } = line_shape(tokens) {
				let closes_lambda = end.eq_ignore_ascii_case("Sub") || end.eq_ignore_ascii_case("Function");
				if lambdas > 0 && closes_lambda {
					lambdas -= 1;
				} else if end.eq_ignore_ascii_case(keyword)
					|| CONTAINER_ENDS.iter().any(|word| word.eq_ignore_ascii_case(&end))
				{
					break;
				}
			}

			if opens_lambda(tokens) {
				lambdas += 1;
			}
			statements.push(SyntaxElement::Node(statement(tokens)));
			self.line += 1;
		}

		children.push(SyntaxElement::Node(SyntaxNode::new(SyntaxKind::Block, statements)));

		if self.has_line()
			&& let LineShape::End { keyword: end } = self.shape(self.line)
			&& end.eq_ignore_ascii_case(keyword)
		{
			self.push_line(children);
		}
	}
}

fn track_depth(token: &SyntaxToken, depth: usize) -> usize {
	if token.kind() != TokenKind::Punctuation {
		return depth;
	}
	match token.text() {
		"(" | "{" => depth + 1,
		")" | "}" => depth.saturating_sub(1),
		_ => depth,
	}
}

/// Whether trivia holds a line break that is not an explicit ` _`
/// continuation.
fn has_line_break(trivia: &str) -> bool {
	let Some((before_last, _)) = trivia.rsplit_once('\n') else {
		return false;
	};
	before_last
		.split('\n')
		.any(|segment| !segment.trim_end().ends_with('_'))
}

fn continues_after(token: &SyntaxToken) -> bool {
	CONTINUES_AFTER.iter().any(|punct| token.is_punct(punct))
		|| CONTINUES_AFTER_WORDS
			.iter()
			.any(|word| token.is_word_ignore_case(word))
}

/// Split the token stream into logical lines. A line ends at a line break
/// outside parentheses unless the previous token implies continuation, or
/// at a `:` statement separator. An attribute block on its own line
/// continues onto the declaration it decorates.
fn split_lines(tokens: &[Rc<SyntaxToken>]) -> Vec<Range<usize>> {
	let end = tokens.len().saturating_sub(1);
	let mut lines = Vec::new();
	let mut start = 0;
	let mut depth = 0usize;
	let mut angles = 0usize;
	let mut attribute_prefix = false;

	for index in 0..end {
		let token = &tokens[index];

		if index > start {
			let previous = &tokens[index - 1];
			let after_attribute = attribute_prefix && angles == 0 && previous.is_punct(">");
			if has_line_break(token.leading_trivia())
				&& depth == 0
				&& !after_attribute
				&& !continues_after(previous)
			{
				lines.push(start..index);
				start = index;
			}
		}

		if index == start {
			depth = 0;
			angles = 0;
			attribute_prefix = token.is_punct("<");
		} else if attribute_prefix && angles == 0 && !token.is_punct("<") {
			attribute_prefix = false;
		}

		if attribute_prefix {
			if token.is_punct("<") {
				angles += 1;
			} else if token.is_punct(">") {
				angles = angles.saturating_sub(1);
			}
		}
		depth = track_depth(token, depth);

		if depth == 0 && angles == 0 && token.is_punct(":") {
			lines.push(start..index + 1);
			start = index + 1;
		}
	}

	if start < end {
		lines.push(start..end);
	}
	lines
}

/// Index just past any leading `<Attribute>` blocks.
pub(crate) fn skip_attributes(tokens: &[impl AsRef<SyntaxToken>], mut index: usize) -> usize {
	while tokens.get(index).is_some_and(|token| token.as_ref().is_punct("<")) {
		let mut angles = 0usize;
		while let Some(token) = tokens.get(index) {
			let token = token.as_ref();
			index += 1;
			if token.is_punct("<") {
				angles += 1;
			} else if token.is_punct(">") {
				angles -= 1;
				if angles == 0 {
					break;
				}
			}
		}
	}
	index
}

/// Index just past any declaration modifiers.
pub(crate) fn skip_modifiers(tokens: &[impl AsRef<SyntaxToken>], mut index: usize) -> usize {
	while tokens
		.get(index)
		.is_some_and(|token| is_modifier(token.as_ref()))
	{
		index += 1;
	}
	index
}

fn is_modifier(token: &SyntaxToken) -> bool {
	MODIFIERS.iter().any(|word| token.is_word_ignore_case(word))
}

/// Index of the declaration keyword (`Sub`, `Class`, ...) of a member line.
pub(crate) fn declaration_keyword(tokens: &[impl AsRef<SyntaxToken>]) -> Option<usize> {
	let index = skip_modifiers(tokens, skip_attributes(tokens, 0));
	(index < tokens.len()).then_some(index)
}

fn line_shape(tokens: &[Rc<SyntaxToken>]) -> LineShape {
	let Some(first) = tokens.first() else {
		return LineShape::Other;
	};

	if first.is_word_ignore_case("End")
		&& let Some(word) = tokens.get(1).filter(|token| token.kind() == TokenKind::Identifier)
	{
		return LineShape::End {
			keyword: word.text().to_string(),
		};
	}
	if first.is_word_ignore_case("Namespace") {
		return LineShape::Namespace;
	}

	let start = skip_attributes(tokens, 0);
	let Some(keyword_index) = declaration_keyword(tokens) else {
		return LineShape::Other;
	};
	let modifiers = &tokens[start..keyword_index];
	let has_modifier = |word: &str| modifiers.iter().any(|token| token.is_word_ignore_case(word));
	let keyword = &tokens[keyword_index];
	let word = |candidate: &str| keyword.is_word_ignore_case(candidate);

	if let Some(kind) = TYPE_KEYWORDS.iter().find(|kind| word(**kind)) {
		return LineShape::Type {
			interface: kind.eq_ignore_ascii_case("Interface"),
		};
	}
	if word("Sub") || word("Function") {
		if has_modifier("MustOverride") || has_modifier("Declare") {
			return LineShape::Other;
		}
		if word("Sub")
			&& tokens
				.get(keyword_index + 1)
				.is_some_and(|name| name.is_word_ignore_case("New"))
		{
			return LineShape::Constructor;
		}
		return LineShape::Method {
			keyword: keyword.text().to_string(),
		};
	}
	if word("Property") && !has_modifier("MustOverride") {
		return LineShape::Property;
	}
	if word("Operator") || word("Enum") || (word("Event") && has_modifier("Custom")) {
		return LineShape::BlockMember {
			keyword: keyword.text().to_string(),
		};
	}

	LineShape::Other
}

/// Whether the line ends with the header of a multi-line lambda such as
/// `Dim f = Sub()` or `Function(x) As Integer`.
fn opens_lambda(tokens: &[Rc<SyntaxToken>]) -> bool {
	for (index, token) in tokens.iter().enumerate().skip(1) {
		if !(token.is_word_ignore_case("Sub") || token.is_word_ignore_case("Function")) {
			continue;
		}
		let mut previous = index - 1;
		while previous > 0
			&& (tokens[previous].is_word_ignore_case("Async")
				|| tokens[previous].is_word_ignore_case("Iterator"))
		{
			previous -= 1;
		}
		let introduced = ["=", "(", ",", ":="]
			.iter()
			.any(|punct| tokens[previous].is_punct(punct))
			|| tokens[previous].is_word_ignore_case("Return");
		if !introduced || !tokens.get(index + 1).is_some_and(|token| token.is_punct("(")) {
			continue;
		}

		let mut depth = 0usize;
		let mut close = None;
		for (offset, token) in tokens[index + 1..].iter().enumerate() {
			depth = track_depth(token, depth);
			if depth == 0 {
				close = Some(index + 1 + offset);
				break;
			}
		}
		let Some(close) = close else {
			continue;
		};
		match tokens.get(close + 1) {
			None => return true,
			Some(next) if next.is_word_ignore_case("As") => return true,
			Some(_) => {}
		}
	}

	false
}

fn statement(tokens: &[Rc<SyntaxToken>]) -> Rc<SyntaxNode> {
	local_declaration(tokens).unwrap_or_else(|| {
		let children = tokens.iter().cloned().map(SyntaxElement::Token).collect();
		SyntaxNode::new(SyntaxKind::Statement, children)
	})
}

/// Recognize `Dim name [As Type] [= value][, ...]` lines, including `Const`
/// and `Static` locals.
fn local_declaration(tokens: &[Rc<SyntaxToken>]) -> Option<Rc<SyntaxNode>> {
	let mut index = 0;
	while tokens.get(index).is_some_and(|token| {
		["Dim", "Const", "Static"]
			.iter()
			.any(|word| token.is_word_ignore_case(word))
	}) {
		index += 1;
	}
	if index == 0 || tokens.get(index)?.kind() != TokenKind::Identifier {
		return None;
	}

	let mut end = tokens.len();
	if tokens[end - 1].is_punct(":") {
		end -= 1;
	}

	let mut children: Vec<SyntaxElement> = tokens[..index]
		.iter()
		.cloned()
		.map(SyntaxElement::Token)
		.collect();
	let mut start = index;
	let mut depth = 0usize;

	for position in index..end {
		let token = &tokens[position];
		if depth == 0 && token.is_punct(",") {
			children.push(SyntaxElement::Node(variable_declarator(&tokens[start..position])));
			children.push(SyntaxElement::Token(Rc::clone(token)));
			start = position + 1;
		}
		depth = track_depth(token, depth);
	}
	if start < end {
		children.push(SyntaxElement::Node(variable_declarator(&tokens[start..end])));
	}
	children.extend(tokens[end..].iter().cloned().map(SyntaxElement::Token));

	Some(SyntaxNode::new(SyntaxKind::LocalDeclaration, children))
}

/// `name [As Type] [= value]`
fn variable_declarator(tokens: &[Rc<SyntaxToken>]) -> Rc<SyntaxNode> {
	let mut depth = 0usize;
	let mut equals = None;
	for (index, token) in tokens.iter().enumerate() {
		if depth == 0 && token.is_punct("=") {
			equals = Some(index);
			break;
		}
		depth = track_depth(token, depth);
	}

	let Some(equals) = equals else {
		let children = tokens.iter().cloned().map(SyntaxElement::Token).collect();
		return SyntaxNode::new(SyntaxKind::VariableDeclarator, children);
	};

	let mut children: Vec<SyntaxElement> = tokens[..equals]
		.iter()
		.cloned()
		.map(SyntaxElement::Token)
		.collect();
	let mut clause = vec![SyntaxElement::Token(Rc::clone(&tokens[equals]))];
	let value = &tokens[equals + 1..];
	if !value.is_empty() {
		clause.push(SyntaxElement::Node(expression(value)));
	}
	children.push(SyntaxElement::Node(SyntaxNode::new(
		SyntaxKind::EqualsValueClause,
		clause,
	)));

	SyntaxNode::new(SyntaxKind::VariableDeclarator, children)
}

/// An initializer. A leading CDATA section becomes its own node, wrapped in
/// a member access when followed by `.Value`.
fn expression(tokens: &[Rc<SyntaxToken>]) -> Rc<SyntaxNode> {
	let to_elements =
		|tokens: &[Rc<SyntaxToken>]| -> Vec<SyntaxElement> { tokens.iter().cloned().map(SyntaxElement::Token).collect() };

	let cdata_end = tokens
		.first()
		.filter(|token| token.kind() == TokenKind::CDataStart)
		.and_then(|_| {
			tokens
				.iter()
				.position(|token| token.kind() == TokenKind::CDataEnd)
		});

	let Some(cdata_end) = cdata_end else {
		return SyntaxNode::new(SyntaxKind::Expression, to_elements(tokens));
	};

	let section = SyntaxNode::new(
		SyntaxKind::XmlCDataSection,
		to_elements(&tokens[..=cdata_end]),
	);
	let rest = &tokens[cdata_end + 1..];
	if rest.is_empty() {
		return section;
	}

	let mut children = vec![SyntaxElement::Node(section)];
	children.extend(to_elements(rest));
	SyntaxNode::new(SyntaxKind::MemberAccessExpression, children)
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn find_all(node: &Rc<SyntaxNode>, kind: SyntaxKind, found: &mut Vec<Rc<SyntaxNode>>) {
		if node.kind() == kind {
			found.push(Rc::clone(node));
		}
		for child in node.child_nodes() {
			find_all(child, kind, found);
		}
	}

	fn nodes_of_kind(source: &str, kind: SyntaxKind) -> Vec<Rc<SyntaxNode>> {
		let mut found = Vec::new();
		find_all(&parse(source), kind, &mut found);
		found
	}

	const TEST_FILE: &str = r#"Imports Xunit

Namespace Microsoft.Tests
    Public Class OperationTests
        Inherits TestBase

        <CompilerTrait(CompilerFeature.IOperation)>
        <Fact()>
        Public Sub TestSimple()
            Dim source = <![CDATA[
Class C
End Class]]>.Value

            Dim expectedOperationTree = <![CDATA[
IBlockOperation
]]>.Value
            Dim handler = Sub()
                              Dim inner = 1
                          End Sub
            VerifyOperationTree(source, expectedOperationTree)
        End Sub

        Public ReadOnly Property Name As String
            Get
                Return "x"
            End Get
        End Property

        Public Sub New()
        End Sub
    End Class
End Namespace
"#;

	#[rstest]
	#[case::empty("")]
	#[case::test_file(TEST_FILE)]
	#[case::unbalanced("Class C\n Sub M()\n Dim x = 1\n")]
	#[case::stray_end("End Class\nEnd Sub\n")]
	#[case::continuation("Dim x = 1 + _\n    2 ' trailing\n")]
	#[case::garbage("` \u{a4} ~ <![CDATA[ open")]
	fn parsing_is_lossless(#[case] source: &str) {
		assert_eq!(parse(source).to_string(), source);
	}

	#[test]
	fn structure_of_a_test_file() {
		assert_eq!(nodes_of_kind(TEST_FILE, SyntaxKind::NamespaceDeclaration).len(), 1);
		assert_eq!(nodes_of_kind(TEST_FILE, SyntaxKind::TypeDeclaration).len(), 1);
		let methods = nodes_of_kind(TEST_FILE, SyntaxKind::MethodDeclaration);
		assert_eq!(methods.len(), 1);
		// source, expectedOperationTree, handler and the lambda's inner local
		let locals = nodes_of_kind(TEST_FILE, SyntaxKind::LocalDeclaration);
		assert_eq!(locals.len(), 4);
		assert!(methods[0].to_string().trim_end().ends_with("End Sub"));
	}

	#[test]
	fn cdata_initializers_are_member_accesses() {
		let accesses = nodes_of_kind(TEST_FILE, SyntaxKind::MemberAccessExpression);
		assert_eq!(accesses.len(), 2);
		for access in accesses {
			assert!(access.child_of_kind(SyntaxKind::XmlCDataSection).is_some());
		}
	}

	#[rstest]
	#[case::single("Dim a = 1", 1)]
	#[case::multiple("Dim a = 1, b = 2", 2)]
	#[case::shared_type("Dim a, b As Integer", 2)]
	#[case::call_arguments("Dim a = F(1, 2)", 1)]
	#[case::constant("Const a As String = \"x\"", 1)]
	fn declarator_counts(#[case] line: &str, #[case] declarators: usize) {
		let source = format!("Module M\nSub S()\n{line}\nEnd Sub\nEnd Module\n");
		let locals = nodes_of_kind(&source, SyntaxKind::LocalDeclaration);
		assert_eq!(locals.len(), 1);
		let count = locals[0]
			.child_nodes()
			.filter(|node| node.kind() == SyntaxKind::VariableDeclarator)
			.count();
		assert_eq!(count, declarators);
	}

	#[test]
	fn interface_members_have_no_bodies() {
		let source = "Interface I\n    Sub M()\n    Function F() As Integer\nEnd Interface\nClass C\nEnd Class\n";
		assert!(nodes_of_kind(source, SyntaxKind::MethodDeclaration).is_empty());
		assert_eq!(nodes_of_kind(source, SyntaxKind::TypeDeclaration).len(), 2);
	}

	#[test]
	fn colon_separates_statements() {
		let source = "Module M\nSub S()\nDim a = 1 : Dim b = 2\nEnd Sub\nEnd Module\n";
		assert_eq!(nodes_of_kind(source, SyntaxKind::LocalDeclaration).len(), 2);
	}
}
