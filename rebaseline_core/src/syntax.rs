use std::fmt::Display;
use std::ops::Range;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;
use serde::Serialize;

use crate::csharp;
use crate::visual_basic;

/// The source dialect of a test file. Each file belongs to exactly one
/// dialect, chosen once from its extension when sources are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
	/// C# sources (`*.cs`). Baselines are verbatim string literals.
	CSharp,
	/// Visual Basic sources (`*.vb`). Baselines are XML CDATA literals.
	VisualBasic,
}

impl Dialect {
	/// All supported dialects in collection order.
	pub const ALL: [Dialect; 2] = [Dialect::CSharp, Dialect::VisualBasic];

	/// The file extension (without the dot) used by this dialect.
	pub fn extension(self) -> &'static str {
		match self {
			Self::CSharp => "cs",
			Self::VisualBasic => "vb",
		}
	}

	/// Determine the dialect from a file path's extension.
	pub fn from_path(path: &Path) -> Option<Self> {
		let ext = path.extension()?.to_str()?;
		Self::ALL
			.into_iter()
			.find(|dialect| ext.eq_ignore_ascii_case(dialect.extension()))
	}
}

impl Display for Dialect {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::CSharp => write!(f, "C#"),
			Self::VisualBasic => write!(f, "Visual Basic"),
		}
	}
}

/// Token classes shared by both dialects. Keywords are lexed as identifiers
/// and recognized by the parsers in context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
	Identifier,
	Number,
	/// Any string literal form (regular, verbatim, raw).
	String,
	/// A character literal.
	Char,
	/// An interpolated string, including all of its holes.
	InterpolatedString,
	Punctuation,
	/// `<![CDATA[`
	CDataStart,
	/// Text inside a CDATA section.
	XmlText,
	/// `]]>`
	CDataEnd,
	/// Bytes the lexer did not recognize. Kept so that trees stay lossless.
	Unknown,
	EndOfFile,
}

/// A single token together with the trivia (whitespace, comments,
/// preprocessor lines) that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxToken {
	kind: TokenKind,
	leading: String,
	text: String,
}

impl SyntaxToken {
	pub fn new(kind: TokenKind, leading: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			kind,
			leading: leading.into(),
			text: text.into(),
		}
	}

	pub fn kind(&self) -> TokenKind {
		self.kind
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn leading_trivia(&self) -> &str {
		&self.leading
	}

	/// Whether this is a punctuation token with exactly the given text.
	pub fn is_punct(&self, punct: &str) -> bool {
		self.kind == TokenKind::Punctuation && self.text == punct
	}

	/// Whether this is an identifier spelled exactly as `word`.
	pub fn is_word(&self, word: &str) -> bool {
		self.kind == TokenKind::Identifier && self.text == word
	}

	/// Whether this is an identifier matching `word` case-insensitively.
	pub fn is_word_ignore_case(&self, word: &str) -> bool {
		self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(word)
	}

	/// Whether the leading trivia contains a line break.
	pub fn starts_line(&self) -> bool {
		self.leading.contains('\n')
	}

	/// A copy of this token with different leading trivia.
	pub fn with_leading(&self, leading: impl Into<String>) -> Self {
		Self {
			kind: self.kind,
			leading: leading.into(),
			text: self.text.clone(),
		}
	}

	pub fn len(&self) -> usize {
		self.leading.len() + self.text.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of `\n` characters in the trivia and text.
	pub fn newlines(&self) -> usize {
		count_newlines(&self.leading) + count_newlines(&self.text)
	}
}

impl Display for SyntaxToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}{}", self.leading, self.text)
	}
}

/// Node classes shared by both dialects. Only the shapes the rewriter cares
/// about are modelled; everything else is an opaque run of tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
	CompilationUnit,
	NamespaceDeclaration,
	/// `class`, `struct`, `record`, `interface` or VB `Module`.
	TypeDeclaration,
	MethodDeclaration,
	/// Any other member: fields, properties, constructors, events.
	MemberDeclaration,
	Block,
	Statement,
	LocalDeclaration,
	VariableDeclarator,
	EqualsValueClause,
	Expression,
	StringLiteralExpression,
	MemberAccessExpression,
	XmlCDataSection,
}

#[derive(Debug, Clone)]
pub enum SyntaxElement {
	Node(Rc<SyntaxNode>),
	Token(Rc<SyntaxToken>),
}

impl SyntaxElement {
	pub fn len(&self) -> usize {
		match self {
			Self::Node(node) => node.len(),
			Self::Token(token) => token.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn newlines(&self) -> usize {
		match self {
			Self::Node(node) => node.newlines(),
			Self::Token(token) => token.newlines(),
		}
	}

	pub fn as_node(&self) -> Option<&Rc<SyntaxNode>> {
		match self {
			Self::Node(node) => Some(node),
			Self::Token(_) => None,
		}
	}

	pub fn as_token(&self) -> Option<&Rc<SyntaxToken>> {
		match self {
			Self::Token(token) => Some(token),
			Self::Node(_) => None,
		}
	}

	fn write_text(&self, out: &mut String) {
		match self {
			Self::Node(node) => node.write_text(out),
			Self::Token(token) => {
				out.push_str(&token.leading);
				out.push_str(&token.text);
			}
		}
	}
}

impl From<SyntaxToken> for SyntaxElement {
	fn from(token: SyntaxToken) -> Self {
		Self::Token(Rc::new(token))
	}
}

impl From<Rc<SyntaxToken>> for SyntaxElement {
	fn from(token: Rc<SyntaxToken>) -> Self {
		Self::Token(token)
	}
}

impl From<Rc<SyntaxNode>> for SyntaxElement {
	fn from(node: Rc<SyntaxNode>) -> Self {
		Self::Node(node)
	}
}

/// An immutable node. Rewrites build new nodes that share every untouched
/// child, so an unchanged subtree keeps its identity.
#[derive(Debug)]
pub struct SyntaxNode {
	kind: SyntaxKind,
	len: usize,
	newlines: usize,
	children: Vec<SyntaxElement>,
}

impl SyntaxNode {
	pub fn new(kind: SyntaxKind, children: Vec<SyntaxElement>) -> Rc<Self> {
		let len = children.iter().map(SyntaxElement::len).sum();
		let newlines = children.iter().map(SyntaxElement::newlines).sum();
		Rc::new(Self {
			kind,
			len,
			newlines,
			children,
		})
	}

	pub fn kind(&self) -> SyntaxKind {
		self.kind
	}

	pub fn children(&self) -> &[SyntaxElement] {
		&self.children
	}

	/// Length of the full text (trivia included) in bytes.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Number of `\n` characters in the full text.
	pub fn newlines(&self) -> usize {
		self.newlines
	}

	/// Direct child nodes.
	pub fn child_nodes(&self) -> impl Iterator<Item = &Rc<SyntaxNode>> {
		self.children.iter().filter_map(SyntaxElement::as_node)
	}

	/// Direct child tokens.
	pub fn child_tokens(&self) -> impl Iterator<Item = &Rc<SyntaxToken>> {
		self.children.iter().filter_map(SyntaxElement::as_token)
	}

	/// The first direct child node of the given kind.
	pub fn child_of_kind(&self, kind: SyntaxKind) -> Option<&Rc<SyntaxNode>> {
		self.child_nodes().find(|node| node.kind == kind)
	}

	/// Every token below this node, in source order.
	pub fn tokens(&self) -> Vec<&SyntaxToken> {
		let mut tokens = Vec::new();
		self.collect_tokens(&mut tokens);
		tokens
	}

	fn collect_tokens<'a>(&'a self, tokens: &mut Vec<&'a SyntaxToken>) {
		for child in &self.children {
			match child {
				SyntaxElement::Node(node) => node.collect_tokens(tokens),
				SyntaxElement::Token(token) => tokens.push(token),
			}
		}
	}

	pub fn first_token(&self) -> Option<&SyntaxToken> {
		self.children.iter().find_map(|child| {
			match child {
				SyntaxElement::Node(node) => node.first_token(),
				SyntaxElement::Token(token) => Some(token.as_ref()),
			}
		})
	}

	/// Replace `old` (matched by identity) anywhere below this node. Returns
	/// `None` if `old` is not a descendant.
	pub fn replace_node(
		self: &Rc<Self>,
		old: &Rc<SyntaxNode>,
		new: &Rc<SyntaxNode>,
	) -> Option<Rc<SyntaxNode>> {
		if Rc::ptr_eq(self, old) {
			return Some(Rc::clone(new));
		}

		for (index, child) in self.children.iter().enumerate() {
			let SyntaxElement::Node(node) = child else {
				continue;
			};
			if let Some(replaced) = node.replace_node(old, new) {
				return Some(self.with_child(index, SyntaxElement::Node(replaced)));
			}
		}

		None
	}

	/// A copy of this node with the child at `index` swapped out.
	pub fn with_child(&self, index: usize, element: SyntaxElement) -> Rc<SyntaxNode> {
		let mut children = self.children.clone();
		children[index] = element;
		SyntaxNode::new(self.kind, children)
	}

	/// A copy of this node with a new set of children.
	pub fn with_children(&self, children: Vec<SyntaxElement>) -> Rc<SyntaxNode> {
		SyntaxNode::new(self.kind, children)
	}

	pub fn write_text(&self, out: &mut String) {
		for child in &self.children {
			child.write_text(out);
		}
	}
}

impl Display for SyntaxNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut text = String::with_capacity(self.len);
		self.write_text(&mut text);
		f.write_str(&text)
	}
}

/// A parsed source file. Printing the tree reproduces the parsed text
/// byte for byte.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
	dialect: Dialect,
	root: Rc<SyntaxNode>,
}

impl SyntaxTree {
	/// Parse `text` with the grammar of `dialect`. Parsing never fails; input
	/// the grammar does not understand is kept as opaque tokens.
	pub fn parse(dialect: Dialect, text: &str) -> Self {
		let root = match dialect {
			Dialect::CSharp => csharp::parse(text),
			Dialect::VisualBasic => visual_basic::parse(text),
		};

		Self { dialect, root }
	}

	pub fn new(dialect: Dialect, root: Rc<SyntaxNode>) -> Self {
		Self { dialect, root }
	}

	pub fn dialect(&self) -> Dialect {
		self.dialect
	}

	pub fn root(&self) -> &Rc<SyntaxNode> {
		&self.root
	}

	/// Whether both trees share the same root node. A rewrite that changes
	/// nothing returns a tree for which this holds.
	pub fn is_same(&self, other: &SyntaxTree) -> bool {
		Rc::ptr_eq(&self.root, &other.root)
	}
}

impl Display for SyntaxTree {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.root, f)
	}
}

/// Accumulates lexed tokens, attaching pending trivia to the next token.
#[derive(Debug, Default)]
pub(crate) struct TokenSink {
	tokens: Vec<SyntaxToken>,
	trivia: String,
}

impl TokenSink {
	pub(crate) fn trivia(&mut self, text: &str) {
		self.trivia.push_str(text);
	}

	pub(crate) fn token(&mut self, kind: TokenKind, text: &str) {
		let leading = std::mem::take(&mut self.trivia);
		self.tokens.push(SyntaxToken::new(kind, leading, text));
	}

	/// Close the stream with an end-of-file token that owns any trailing
	/// trivia.
	pub(crate) fn finish(mut self) -> Vec<SyntaxToken> {
		self.token(TokenKind::EndOfFile, "");
		self.tokens
	}
}

pub(crate) fn count_newlines(text: &str) -> usize {
	text.bytes().filter(|byte| *byte == b'\n').count()
}

/// Clamp a lexer span to the char boundaries of `source`, skipping bytes an
/// earlier span already covered. Error spans and callbacks on unterminated
/// literals can otherwise end past the input or inside a code point.
pub(crate) fn clamp_span(source: &str, consumed: &mut usize, span: Range<usize>) -> Option<Range<usize>> {
	let start = span.start.max(*consumed);
	let mut end = span.end.min(source.len());
	while !source.is_char_boundary(end) {
		end += 1;
	}
	if start >= end {
		return None;
	}
	*consumed = end;
	Some(start..end)
}
