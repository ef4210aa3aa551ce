use std::rc::Rc;

use super::lexer::tokenize;
use crate::syntax::SyntaxElement;
use crate::syntax::SyntaxKind;
use crate::syntax::SyntaxNode;
use crate::syntax::SyntaxToken;
use crate::syntax::TokenKind;

/// Keywords that introduce a type declaration.
pub(crate) const TYPE_KEYWORDS: &[&str] = &["class", "struct", "interface", "record", "enum"];

/// Modifiers that may precede a member's return type.
const MEMBER_MODIFIERS: &[&str] = &[
	"public", "private", "protected", "internal", "static", "virtual", "override", "abstract",
	"sealed", "async", "extern", "unsafe", "new", "partial", "readonly", "file", "required",
];

/// Modifiers that may precede the type of a local declaration.
const LOCAL_MODIFIERS: &[&str] = &["const", "using", "scoped", "ref", "readonly"];

/// Words that start a statement and can never be the type of a local.
const STATEMENT_KEYWORDS: &[&str] = &[
	"return", "throw", "yield", "goto", "break", "continue", "new", "if", "else", "while", "for",
	"foreach", "do", "switch", "case", "default", "try", "catch", "finally", "lock", "fixed",
	"checked", "unchecked", "this", "base", "typeof", "sizeof", "await", "delete",
];

/// Statements starting with these words are expressions up to their `;`, so
/// a `{` inside them belongs to an initializer rather than a nested block.
const EXPRESSION_STATEMENT_KEYWORDS: &[&str] = &["return", "throw", "yield", "await"];

const ASSIGNMENT_OPERATORS: &[&str] = &[
	"=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", "??=",
];

/// Parse C# source into a lossless tree.
pub(crate) fn parse(source: &str) -> Rc<SyntaxNode> {
	let tokens = tokenize(source).into_iter().map(Rc::new).collect();
	Parser { tokens, cursor: 0 }.compilation_unit()
}

/// How a member header was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
	/// `;`, which belongs to the header.
	Semicolon,
	/// `{` opening a body.
	OpenBrace,
	/// `=>` opening an expression body.
	Arrow,
	/// A `}` closing the enclosing body, or the end of input.
	End,
}

enum MemberShape {
	Namespace,
	Type,
	Method,
	Other,
}

struct Parser {
	tokens: Vec<Rc<SyntaxToken>>,
	cursor: usize,
}

impl Parser {
	fn peek(&self) -> &SyntaxToken {
		let index = self.cursor.min(self.tokens.len() - 1);
		&self.tokens[index]
	}

	fn at_end(&self) -> bool {
		self.peek().kind() == TokenKind::EndOfFile
	}

	fn at_punct(&self, punct: &str) -> bool {
		self.peek().is_punct(punct)
	}

	fn bump(&mut self) -> SyntaxElement {
		let token = Rc::clone(&self.tokens[self.cursor]);
		self.cursor += 1;
		SyntaxElement::Token(token)
	}

	fn bump_into(&mut self, children: &mut Vec<SyntaxElement>) {
		children.push(self.bump());
	}

	fn compilation_unit(mut self) -> Rc<SyntaxNode> {
		let mut children = self.members(false);
		// Stray closing braces at the top level are kept as opaque tokens.
		while !self.at_end() {
			self.bump_into(&mut children);
			children.extend(self.members(false));
		}
		self.bump_into(&mut children);
		SyntaxNode::new(SyntaxKind::CompilationUnit, children)
	}

	/// Parse members until the end of input, or until a `}` when
	/// `in_braces` is set.
	fn members(&mut self, in_braces: bool) -> Vec<SyntaxElement> {
		let mut children = Vec::new();

		while !self.at_end() && !self.at_punct("}") {
			children.push(SyntaxElement::Node(self.member(in_braces)));
		}

		children
	}

	fn member(&mut self, in_braces: bool) -> Rc<SyntaxNode> {
		let (end, terminator) = self.scan_header();
		let header = &self.tokens[self.cursor..end];
		let shape = classify_header(header, terminator);
		let mut children: Vec<SyntaxElement> = Vec::new();

		while self.cursor < end {
			self.bump_into(&mut children);
		}

		match shape {
			MemberShape::Namespace => {
				match terminator {
					Terminator::Semicolon => {
						// A file-scoped namespace owns the rest of its member list.
						self.bump_into(&mut children);
						children.extend(self.members(in_braces));
					}
					Terminator::OpenBrace => self.braced_members(&mut children),
					Terminator::Arrow | Terminator::End => {}
				}
				SyntaxNode::new(SyntaxKind::NamespaceDeclaration, children)
			}
			MemberShape::Type => {
				match terminator {
					Terminator::Semicolon => self.bump_into(&mut children),
					Terminator::OpenBrace => self.braced_members(&mut children),
					Terminator::Arrow | Terminator::End => {}
				}
				SyntaxNode::new(SyntaxKind::TypeDeclaration, children)
			}
			MemberShape::Method => {
				self.member_body(terminator, &mut children);
				SyntaxNode::new(SyntaxKind::MethodDeclaration, children)
			}
			MemberShape::Other => {
				self.member_body(terminator, &mut children);
				if children.is_empty() && !self.at_end() {
					// Nothing to parse here; consume one token to make progress.
					self.bump_into(&mut children);
				}
				SyntaxNode::new(SyntaxKind::MemberDeclaration, children)
			}
		}
	}

	/// `{ members } ;?`
	fn braced_members(&mut self, children: &mut Vec<SyntaxElement>) {
		self.bump_into(children);
		children.extend(self.members(true));
		if self.at_punct("}") {
			self.bump_into(children);
		}
		if self.at_punct(";") {
			self.bump_into(children);
		}
	}

	fn member_body(&mut self, terminator: Terminator, children: &mut Vec<SyntaxElement>) {
		match terminator {
			Terminator::Semicolon => self.bump_into(children),
			Terminator::OpenBrace => {
				children.push(SyntaxElement::Node(self.block()));
				// `int P { get; set; } = 5;`
				if self.at_punct("=") {
					self.expression_until_semicolon(children);
				}
			}
			Terminator::Arrow => self.expression_until_semicolon(children),
			Terminator::End => {}
		}
	}

	/// Consume balanced tokens up to and including the next top-level `;`.
	fn expression_until_semicolon(&mut self, children: &mut Vec<SyntaxElement>) {
		let mut depth = 0usize;

		while !self.at_end() {
			let token = self.peek();
			if depth == 0 && token.is_punct("}") {
				return;
			}
			let is_semicolon = depth == 0 && token.is_punct(";");
			depth = track_depth(token, depth);
			self.bump_into(children);
			if is_semicolon {
				return;
			}
		}
	}

	/// Find the end of the member header starting at the cursor.
	fn scan_header(&self) -> (usize, Terminator) {
		let mut depth = 0usize;
		let mut seen_assignment = false;
		let mut index = self.cursor;

		loop {
			let token = &self.tokens[index];
			if token.kind() == TokenKind::EndOfFile {
				return (index, Terminator::End);
			}

			if depth == 0 {
				if token.is_punct(";") {
					return (index, Terminator::Semicolon);
				}
				if token.is_punct("}") {
					return (index, Terminator::End);
				}
				if !seen_assignment && token.is_punct("{") {
					return (index, Terminator::OpenBrace);
				}
				if !seen_assignment && token.is_punct("=>") {
					return (index, Terminator::Arrow);
				}
				if token.is_punct("=") {
					seen_assignment = true;
				}
			}

			depth = track_depth(token, depth);
			index += 1;
		}
	}

	/// `{ statements }`
	fn block(&mut self) -> Rc<SyntaxNode> {
		let mut children = vec![self.bump()];

		while !self.at_end() && !self.at_punct("}") {
			children.push(SyntaxElement::Node(self.statement()));
		}

		if self.at_punct("}") {
			self.bump_into(&mut children);
		}

		SyntaxNode::new(SyntaxKind::Block, children)
	}

	fn statement(&mut self) -> Rc<SyntaxNode> {
		if self.at_punct("{") {
			return self.block();
		}

		let start = self.cursor;
		let mut depth = 0usize;
		let mut expression = self
			.peek()
			.kind()
			.eq(&TokenKind::Identifier)
			.then(|| EXPRESSION_STATEMENT_KEYWORDS.contains(&self.peek().text()))
			.unwrap_or(false);

		while !self.at_end() {
			let token = self.peek();

			if depth == 0 {
				if token.is_punct("}") {
					break;
				}
				if token.is_punct(";") {
					self.cursor += 1;
					let tokens = &self.tokens[start..self.cursor];
					return local_declaration(tokens).unwrap_or_else(|| opaque_statement(tokens));
				}
				if token.is_punct("{") && !expression {
					let mut children: Vec<SyntaxElement> = self.tokens[start..self.cursor]
						.iter()
						.cloned()
						.map(SyntaxElement::Token)
						.collect();
					children.push(SyntaxElement::Node(self.block()));
					return SyntaxNode::new(SyntaxKind::Statement, children);
				}
				if ASSIGNMENT_OPERATORS.iter().any(|op| token.is_punct(op)) {
					expression = true;
				}
			}

			depth = track_depth(token, depth);
			self.cursor += 1;
		}

		opaque_statement(&self.tokens[start..self.cursor])
	}
}

fn track_depth(token: &SyntaxToken, depth: usize) -> usize {
	if token.kind() != TokenKind::Punctuation {
		return depth;
	}
	match token.text() {
		"(" | "[" | "{" => depth + 1,
		")" | "]" | "}" => depth.saturating_sub(1),
		_ => depth,
	}
}

fn opaque_statement(tokens: &[Rc<SyntaxToken>]) -> Rc<SyntaxNode> {
	let children = tokens.iter().cloned().map(SyntaxElement::Token).collect();
	SyntaxNode::new(SyntaxKind::Statement, children)
}

/// The `(` opening a method's parameter list and the index of the name in
/// front of it. Top-level parentheses without a name before them belong to a
/// tuple return type such as `(int, int) M()`.
pub(crate) fn parameter_list(tokens: &[impl AsRef<SyntaxToken>]) -> Option<(usize, usize)> {
	let mut depth = 0usize;
	for (index, token) in tokens.iter().enumerate() {
		let token = token.as_ref();
		if depth == 0 && token.is_punct("(") {
			let name = name_before_paren(tokens, index)
				.filter(|&name| !MEMBER_MODIFIERS.contains(&tokens[name].as_ref().text()));
			if let Some(name) = name {
				return Some((index, name));
			}
		}
		depth = track_depth(token, depth);
	}
	None
}

/// The identifier naming a method whose parameter list starts at `paren`,
/// skipping a generic parameter list such as `M<T>(`.
fn name_before_paren(tokens: &[impl AsRef<SyntaxToken>], paren: usize) -> Option<usize> {
	let mut index = paren.checked_sub(1)?;

	if tokens[index].as_ref().is_punct(">") {
		let mut angles = 0usize;
		loop {
			let token = tokens[index].as_ref();
			if token.is_punct(">") {
				angles += 1;
			} else if token.is_punct("<") {
				angles -= 1;
				if angles == 0 {
					break;
				}
			}
			index = index.checked_sub(1)?;
		}
		index = index.checked_sub(1)?;
	}

	(tokens[index].as_ref().kind() == TokenKind::Identifier).then_some(index)
}

fn classify_header(header: &[Rc<SyntaxToken>], terminator: Terminator) -> MemberShape {
	let mut depth = 0usize;

	for token in header {
		if depth == 0 {
			if token.is_punct("(") || token.is_punct("=") {
				break;
			}
			if token.is_word("namespace") {
				return MemberShape::Namespace;
			}
			if TYPE_KEYWORDS.iter().any(|keyword| token.is_word(keyword)) {
				return MemberShape::Type;
			}
		}
		depth = track_depth(token, depth);
	}

	if terminator == Terminator::End || !is_method_header(header) {
		return MemberShape::Other;
	}

	MemberShape::Method
}

/// A method header has a parameter list before any initializer, a name
/// that is an identifier, and a return type in front of the name.
/// Constructors, destructors, operators and indexers do not qualify.
fn is_method_header(header: &[Rc<SyntaxToken>]) -> bool {
	let Some((paren, name)) = parameter_list(header) else {
		return false;
	};
	let mut depth = 0usize;
	for token in &header[..paren] {
		if depth == 0 && token.is_punct("=") {
			return false;
		}
		depth = track_depth(token, depth);
	}
	if header[name].is_word("operator") || header[name].is_word("this") {
		return false;
	}

	depth = 0;
	let mut has_return_type = false;
	for token in &header[..name] {
		let top_level = depth == 0 && !token.is_punct("[");
		depth = track_depth(token, depth);
		if !top_level || token.is_punct("]") {
			continue;
		}
		if token.is_punct("~") {
			return false;
		}
		if !MEMBER_MODIFIERS.contains(&token.text()) {
			has_return_type = true;
		}
	}

	has_return_type
}

/// Recognize `Type name = value, other = value;` statements.
fn local_declaration(tokens: &[Rc<SyntaxToken>]) -> Option<Rc<SyntaxNode>> {
	let semicolon = tokens.len().checked_sub(1)?;
	let mut index = 0;

	while index < semicolon {
		let token = &tokens[index];
		let is_modifier = LOCAL_MODIFIERS.contains(&token.text())
			|| (token.is_word("await") && tokens.get(index + 1)?.is_word("using"));
		if token.kind() != TokenKind::Identifier || !is_modifier {
			break;
		}
		index += 1;
	}

	let type_start = index;
	let name = skip_type(tokens, type_start)?;
	if name == type_start || name >= semicolon {
		return None;
	}
	if tokens[name].kind() != TokenKind::Identifier {
		return None;
	}
	let after_name = &tokens[name + 1];
	if !(after_name.is_punct("=") || after_name.is_punct(",") || after_name.is_punct(";")) {
		return None;
	}

	let mut children: Vec<SyntaxElement> = tokens[..name]
		.iter()
		.cloned()
		.map(SyntaxElement::Token)
		.collect();

	for (position, (start, end)) in declarator_ranges(tokens, name, semicolon)
		.into_iter()
		.enumerate()
	{
		if position > 0 {
			// The separating comma sits just before each later declarator.
			children.push(SyntaxElement::Token(Rc::clone(&tokens[start - 1])));
		}
		children.push(SyntaxElement::Node(variable_declarator(&tokens[start..end])));
	}

	children.push(SyntaxElement::Token(Rc::clone(&tokens[semicolon])));
	Some(SyntaxNode::new(SyntaxKind::LocalDeclaration, children))
}

/// Skip a type starting at `start`, returning the index just past it.
fn skip_type(tokens: &[Rc<SyntaxToken>], start: usize) -> Option<usize> {
	let first = tokens.get(start)?;
	let mut index = start;

	if first.is_punct("(") {
		// Tuple type.
		let mut depth = 0usize;
		loop {
			depth = track_depth(tokens.get(index)?, depth);
			index += 1;
			if depth == 0 {
				break;
			}
		}
	} else {
		if first.kind() != TokenKind::Identifier
			|| STATEMENT_KEYWORDS.contains(&first.text())
			|| TYPE_KEYWORDS.contains(&first.text())
		{
			return None;
		}
		index += 1;

		while let Some(token) = tokens.get(index) {
			if token.is_punct(".") || token.is_punct("::") {
				if tokens.get(index + 1)?.kind() != TokenKind::Identifier {
					return None;
				}
				index += 2;
			} else if token.is_punct("<") {
				let mut angles = 0usize;
				loop {
					let token = tokens.get(index)?;
					if token.is_punct(";") || token.is_punct("{") {
						return None;
					}
					if token.is_punct("<") {
						angles += 1;
					} else if token.is_punct(">") {
						angles -= 1;
					}
					index += 1;
					if angles == 0 {
						break;
					}
				}
			} else {
				break;
			}
		}
	}

	// Nullable, array and pointer suffixes.
	while let Some(token) = tokens.get(index) {
		if token.is_punct("?") || token.is_punct("*") {
			index += 1;
		} else if token.is_punct("[") {
			index += 1;
			while tokens.get(index)?.is_punct(",") {
				index += 1;
			}
			if !tokens.get(index)?.is_punct("]") {
				return None;
			}
			index += 1;
		} else {
			break;
		}
	}

	Some(index)
}

/// Split the declarator list `[first, end)` at top-level commas that are
/// followed by a new declarator name.
fn declarator_ranges(tokens: &[Rc<SyntaxToken>], first: usize, end: usize) -> Vec<(usize, usize)> {
	let mut ranges = Vec::new();
	let mut start = first;
	let mut depth = 0usize;

	for index in first..end {
		let token = &tokens[index];
		if depth == 0 && token.is_punct(",") && starts_declarator(tokens, index + 1, end) {
			ranges.push((start, index));
			start = index + 1;
		}
		depth = track_depth(token, depth);
	}

	ranges.push((start, end));
	ranges
}

fn starts_declarator(tokens: &[Rc<SyntaxToken>], index: usize, end: usize) -> bool {
	if index + 1 > end || tokens[index].kind() != TokenKind::Identifier {
		return false;
	}
	index + 1 == end || tokens[index + 1].is_punct("=") || tokens[index + 1].is_punct(",")
}

/// `name` or `name = expression`.
fn variable_declarator(tokens: &[Rc<SyntaxToken>]) -> Rc<SyntaxNode> {
	let mut children = vec![SyntaxElement::Token(Rc::clone(&tokens[0]))];

	if let Some(equals) = tokens.get(1).filter(|token| token.is_punct("=")) {
		let value = &tokens[2..];
		let mut clause = vec![SyntaxElement::Token(Rc::clone(equals))];
		if !value.is_empty() {
			clause.push(SyntaxElement::Node(expression(value)));
		}
		children.push(SyntaxElement::Node(SyntaxNode::new(
			SyntaxKind::EqualsValueClause,
			clause,
		)));
	} else {
		children.extend(tokens[1..].iter().cloned().map(SyntaxElement::Token));
	}

	SyntaxNode::new(SyntaxKind::VariableDeclarator, children)
}

fn expression(tokens: &[Rc<SyntaxToken>]) -> Rc<SyntaxNode> {
	let kind = match tokens {
		[literal] if literal.kind() == TokenKind::String => SyntaxKind::StringLiteralExpression,
		_ => SyntaxKind::Expression,
	};
	let children = tokens.iter().cloned().map(SyntaxElement::Token).collect();
	SyntaxNode::new(kind, children)
}
