//! Replacement of stale baseline literals inside failing test methods.
//!
//! The traversal is shared by both dialects; [`DialectSyntax`] supplies the
//! parts that depend on the grammar: how names are spelled and how a
//! baseline literal is built.

use std::marker::PhantomData;
use std::rc::Rc;

use serde::Serialize;

use crate::config::AllowListPolicy;
use crate::csharp::CSharp;
use crate::failure_log::CorrectedTextMap;
use crate::syntax::Dialect;
use crate::syntax::SyntaxElement;
use crate::syntax::SyntaxKind;
use crate::syntax::SyntaxNode;
use crate::syntax::SyntaxTree;
use crate::syntax::count_newlines;
use crate::visual_basic::VisualBasic;

/// Dialect-specific hooks used by the rewriter.
pub(crate) trait DialectSyntax {
	const DIALECT: Dialect;

	fn namespace_name(node: &SyntaxNode) -> Option<String>;
	fn type_name(node: &SyntaxNode) -> Option<String>;
	fn method_name(node: &SyntaxNode) -> Option<String>;
	/// Describe a local declaration statement.
	fn local_declaration(node: &SyntaxNode) -> Option<LocalDeclaration>;
	/// The text currently held by a replaceable initializer, if it can be
	/// decoded.
	fn literal_text(initializer: &SyntaxNode) -> Option<String>;
	/// Build the node that replaces `initializer` with a literal holding
	/// `text`, using `newline` for line breaks.
	fn build_literal(initializer: &SyntaxNode, text: &str, newline: &str) -> Option<Rc<SyntaxNode>>;
}

/// The parts of a local declaration the rewriter looks at.
#[derive(Debug, Clone)]
pub(crate) struct LocalDeclaration {
	pub(crate) declarators: usize,
	/// Name of the first declared variable.
	pub(crate) variable: String,
	/// The replaceable initializer of the first variable.
	pub(crate) initializer: Option<Rc<SyntaxNode>>,
}

/// How the qualified name of a method is formed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameResolution {
	/// `InnermostNamespace.InnermostType.Method`, from the file alone.
	#[default]
	Syntactic,
	/// `Root.Outer.Inner.OuterType.InnerType.Method`, every enclosing
	/// namespace and type, prefixed with the project's root namespace.
	Semantic { root_namespace: Option<String> },
}

/// Settings for one rewrite.
#[derive(Debug, Clone)]
pub struct RewriteOptions {
	pub baseline_names: Vec<String>,
	pub policy: AllowListPolicy,
	/// Line terminator written inside rebuilt literals.
	pub newline: String,
	pub naming: NameResolution,
}

impl Default for RewriteOptions {
	fn default() -> Self {
		Self {
			baseline_names: crate::config::DEFAULT_BASELINE_NAMES
				.iter()
				.map(ToString::to_string)
				.collect(),
			policy: AllowListPolicy::Include,
			newline: "\n".into(),
			naming: NameResolution::Syntactic,
		}
	}
}

/// A baseline that was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFix {
	/// Qualified name of the test method.
	pub method: String,
	/// The local variable whose initializer was replaced.
	pub variable: String,
	/// The decoded text of the replaced literal, when it could be decoded.
	pub previous: Option<String>,
	/// 1-based line of the declaration in the original file.
	pub line: usize,
}

/// The result of rewriting one tree.
#[derive(Debug, Clone)]
pub struct Rewrite {
	pub tree: SyntaxTree,
	pub fixes: Vec<AppliedFix>,
}

impl Rewrite {
	/// Whether any baseline was replaced.
	pub fn is_changed(&self) -> bool {
		!self.fixes.is_empty()
	}
}

/// Replace the baselines of every method in `tree` that has a record in
/// `map`. Applied records are removed from `map`. When nothing matches the
/// returned tree shares its root with `tree`.
pub fn rewrite(tree: &SyntaxTree, map: &mut CorrectedTextMap, options: &RewriteOptions) -> Rewrite {
	match tree.dialect() {
		Dialect::CSharp => Rewriter::<CSharp>::new(map, options).rewrite(tree),
		Dialect::VisualBasic => Rewriter::<VisualBasic>::new(map, options).rewrite(tree),
	}
}

/// Enclosing namespaces and types of the node being visited.
#[derive(Debug, Clone, Default)]
struct Scope {
	namespaces: Vec<String>,
	types: Vec<String>,
}

impl Scope {
	fn with_namespace(&self, name: String) -> Self {
		let mut scope = self.clone();
		scope.namespaces.push(name);
		scope
	}

	fn with_type(&self, name: String) -> Self {
		let mut scope = self.clone();
		scope.types.push(name);
		scope
	}

	fn qualify(&self, method: &str, naming: &NameResolution) -> String {
		let parts: Vec<&str> = match naming {
			NameResolution::Syntactic => {
				self.namespaces
					.last()
					.into_iter()
					.chain(self.types.last())
					.map(String::as_str)
					.chain([method])
					.collect()
			}
			NameResolution::Semantic { root_namespace } => {
				root_namespace
					.iter()
					.chain(&self.namespaces)
					.chain(&self.types)
					.map(String::as_str)
					.chain([method])
					.collect()
			}
		};

		parts
			.into_iter()
			.filter(|part| !part.is_empty())
			.collect::<Vec<_>>()
			.join(".")
	}
}

struct Rewriter<'a, D> {
	map: &'a mut CorrectedTextMap,
	options: &'a RewriteOptions,
	fixes: Vec<AppliedFix>,
	dialect: PhantomData<D>,
}

impl<'a, D: DialectSyntax> Rewriter<'a, D> {
	fn new(map: &'a mut CorrectedTextMap, options: &'a RewriteOptions) -> Self {
		Self {
			map,
			options,
			fixes: Vec::new(),
			dialect: PhantomData,
		}
	}

	fn rewrite(mut self, tree: &SyntaxTree) -> Rewrite {
		let mut active = None;
		let root = self.visit(tree.root(), &Scope::default(), &mut active, 0);

		Rewrite {
			tree: SyntaxTree::new(D::DIALECT, root),
			fixes: self.fixes,
		}
	}

	/// Visit `node`, which starts after `line` line breaks. `active` holds the
	/// qualified name of the enclosing method while it still has a record.
	fn visit(
		&mut self,
		node: &Rc<SyntaxNode>,
		scope: &Scope,
		active: &mut Option<String>,
		line: usize,
	) -> Rc<SyntaxNode> {
		if self.map.is_empty() {
			return Rc::clone(node);
		}

		match node.kind() {
			SyntaxKind::NamespaceDeclaration => {
				let scope = match D::namespace_name(node) {
					Some(name) => scope.with_namespace(name),
					None => scope.clone(),
				};
				self.visit_children(node, &scope, active, line)
			}
			SyntaxKind::TypeDeclaration => {
				let scope = match D::type_name(node) {
					Some(name) => scope.with_type(name),
					None => scope.clone(),
				};
				self.visit_children(node, &scope, active, line)
			}
			SyntaxKind::MethodDeclaration => {
				let qualified = D::method_name(node).map(|name| scope.qualify(&name, &self.options.naming));
				let mut method = qualified.filter(|name| self.map.contains_key(name));
				if let Some(name) = &method {
					tracing::debug!(method = %name, "visiting failing test method");
				}
				self.visit_children(node, scope, &mut method, line)
			}
			SyntaxKind::LocalDeclaration if active.is_some() => {
				match self.replace_baseline(node, active, line) {
					Some(replaced) => replaced,
					None => self.visit_children(node, scope, active, line),
				}
			}
			_ => self.visit_children(node, scope, active, line),
		}
	}

	fn visit_children(
		&mut self,
		node: &Rc<SyntaxNode>,
		scope: &Scope,
		active: &mut Option<String>,
		line: usize,
	) -> Rc<SyntaxNode> {
		let mut line = line;
		let mut changed = false;
		let mut children = Vec::with_capacity(node.children().len());

		for child in node.children() {
			match child {
				SyntaxElement::Node(inner) => {
					let visited = self.visit(inner, scope, active, line);
					changed |= !Rc::ptr_eq(inner, &visited);
					children.push(SyntaxElement::Node(visited));
				}
				SyntaxElement::Token(_) => children.push(child.clone()),
			}
			line += child.newlines();
		}

		if changed {
			node.with_children(children)
		} else {
			Rc::clone(node)
		}
	}

	/// Replace the initializer of an allow-listed single-variable local with a
	/// literal holding the active method's corrected text.
	fn replace_baseline(
		&mut self,
		node: &Rc<SyntaxNode>,
		active: &mut Option<String>,
		line: usize,
	) -> Option<Rc<SyntaxNode>> {
		let method = active.as_deref()?;
		let declaration = D::local_declaration(node)?;

		if declaration.declarators != 1 {
			return None;
		}
		let listed = self
			.options
			.baseline_names
			.iter()
			.any(|name| *name == declaration.variable);
		if !self.options.policy.permits(listed) {
			return None;
		}

		let initializer = declaration.initializer?;
		let text = self.map.get(method)?;
		let literal = D::build_literal(&initializer, text, &self.options.newline)?;
		let replaced = node.replace_node(&initializer, &literal)?;
		let previous = D::literal_text(&initializer);

		let method = active.take()?;
		self.map.take(&method);
		let declaration_line = line
			+ node
				.first_token()
				.map_or(0, |token| count_newlines(token.leading_trivia()))
			+ 1;

		tracing::info!(
			method = %method,
			variable = %declaration.variable,
			line = declaration_line,
			"replaced baseline"
		);
		self.fixes.push(AppliedFix {
			method,
			variable: declaration.variable,
			previous,
			line: declaration_line,
		});

		Some(replaced)
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case::syntactic(NameResolution::Syntactic, "B.Inner.M")]
	#[case::semantic(
		NameResolution::Semantic { root_namespace: Some("Root".into()) },
		"Root.A.B.Outer.Inner.M"
	)]
	#[case::semantic_without_root(NameResolution::Semantic { root_namespace: None }, "A.B.Outer.Inner.M")]
	fn qualified_names(#[case] naming: NameResolution, #[case] expected: &str) {
		let scope = Scope::default()
			.with_namespace("A".into())
			.with_namespace("B".into())
			.with_type("Outer".into())
			.with_type("Inner".into());
		assert_eq!(scope.qualify("M", &naming), expected);
	}

	#[test]
	fn syntactic_names_skip_missing_parts() {
		let scope = Scope::default().with_type("T".into());
		assert_eq!(scope.qualify("M", &NameResolution::Syntactic), "T.M");
	}
}
