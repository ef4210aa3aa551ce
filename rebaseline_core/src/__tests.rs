use std::path::Path;
use std::path::PathBuf;

use rstest::rstest;
use similar_asserts::assert_eq;

use super::*;

const CSHARP_TEST: &str = r#"using System;

namespace N
{
    public class T
    {
        [Fact]
        public void M()
        {
            string source = @"class C { }";
            var expectedOperationTree = @"
old tree
";
            VerifyOperationTree(source, expectedOperationTree);
        }

        [Fact]
        public void Other()
        {
            var expectedOperationTree = @"
untouched
";
        }
    }
}
"#;

const VB_TEST: &str = r#"Namespace N
    Public Class T
        <Fact>
        Public Sub M()
            Dim source = <![CDATA[
Class C
End Class]]>.Value

            Dim expectedOperationTree = <![CDATA[
old tree
]]>.Value

            VerifyOperationTree(source, expectedOperationTree)
        End Sub
    End Class
End Namespace
"#;

fn lf_options() -> RewriteOptions {
	RewriteOptions {
		newline: "\n".into(),
		..RewriteOptions::default()
	}
}

fn lf_config() -> RebaselineConfig {
	RebaselineConfig {
		line_ending: LineEnding::Lf,
		..RebaselineConfig::default()
	}
}

fn source(path: &str, dialect: Dialect) -> SourceFile {
	SourceFile {
		path: PathBuf::from(path),
		dialect,
		naming: NameResolution::Syntactic,
	}
}

#[test]
fn failure_log_example() {
	let log = parse_failure_log([
		"'M' FAILED:",
		"Actual:   foo",
		"bar",
		"",
		"Exception stacktrace ...",
	]);
	assert_eq!(log.records, CorrectedTextMap::from_iter([("M", "foo\nbar")]));
	assert!(log.diagnostics.is_empty());
}

#[rstest]
#[case::csharp(Dialect::CSharp, CSHARP_TEST)]
#[case::visual_basic(Dialect::VisualBasic, VB_TEST)]
fn unmatched_tree_is_returned_unchanged(#[case] dialect: Dialect, #[case] text: &str) {
	let tree = SyntaxTree::parse(dialect, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.Missing", "x")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	assert!(rewritten.tree.is_same(&tree));
	assert!(!rewritten.is_changed());
	assert_eq!(map.len(), 1);
}

#[test]
fn empty_map_leaves_tree_unchanged() {
	let tree = SyntaxTree::parse(Dialect::CSharp, CSHARP_TEST);
	let rewritten = rewrite(&tree, &mut CorrectedTextMap::new(), &lf_options());
	assert!(rewritten.tree.is_same(&tree));
}

#[test]
fn method_with_tuple_return_type_is_rewritten() {
	let tree = SyntaxTree::parse(
		Dialect::CSharp,
		"namespace N { class T { (int, int) M() { var expectedGraph = @\"old\"; return (1, 2); } } }",
	);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "new")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	assert_eq!(rewritten.fixes.len(), 1);
	assert!(map.is_empty());
	assert_eq!(
		rewritten.tree.to_string(),
		"namespace N { class T { (int, int) M() { var expectedGraph = @\"\nnew\n\"; return (1, 2); } } }"
	);
}

#[test]
fn csharp_baseline_is_replaced_once() {
	let tree = SyntaxTree::parse(Dialect::CSharp, CSHARP_TEST);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "IBlockOperation\n  Text: \"x\"")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	let expected = CSHARP_TEST.replacen(
		"@\"\nold tree\n\"",
		"@\"\nIBlockOperation\n  Text: \"\"x\"\"\n\"",
		1,
	);
	assert_eq!(rewritten.tree.to_string(), expected);
	assert!(map.is_empty());
	assert_eq!(
		rewritten.fixes,
		vec![AppliedFix {
			method: "N.T.M".into(),
			variable: "expectedOperationTree".into(),
			previous: Some("old tree".into()),
			line: 11,
		}]
	);
	// The other method keeps its baseline.
	assert!(rewritten.tree.to_string().contains("@\"\nuntouched\n\""));
}

#[test]
fn only_allow_listed_locals_are_replaced() {
	let text = "namespace N { class T { void M() {\n\
	            var source = @\"keep\";\n\
	            var expectedGraph = @\"old\";\n\
	            } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "new")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	let output = rewritten.tree.to_string();
	assert!(output.contains("var source = @\"keep\";"));
	assert!(output.contains("var expectedGraph = @\"\nnew\n\";"));
	assert_eq!(rewritten.fixes[0].line, 3);
}

#[test]
fn exclude_policy_replaces_unlisted_locals() {
	let text = "namespace N { class T { void M() { var actual = @\"old\"; } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "new")]);
	let options = RewriteOptions {
		policy: AllowListPolicy::Exclude,
		..lf_options()
	};

	let rewritten = rewrite(&tree, &mut map, &options);
	assert_eq!(rewritten.fixes.len(), 1);
	assert_eq!(rewritten.fixes[0].variable, "actual");
}

#[test]
fn multi_variable_declarations_are_skipped() {
	let text = "namespace N { class T { void M() {\n\
	            string expectedOperationTree = @\"a\", other = @\"b\";\n\
	            } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "new")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	assert!(rewritten.tree.is_same(&tree));
	assert_eq!(map.len(), 1);
}

#[test]
fn declaration_without_initializer_does_not_consume_the_record() {
	let text = "namespace N { class T { void M() {\n\
	            string expectedOperationTree;\n\
	            var expectedOperationTree2 = 1;\n\
	            var expectedFlowGraph = @\"old\";\n\
	            } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "new")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	assert_eq!(rewritten.fixes.len(), 1);
	assert_eq!(rewritten.fixes[0].variable, "expectedFlowGraph");
	assert!(map.is_empty());
}

#[test]
fn only_the_first_baseline_of_a_method_is_replaced() {
	let text = "namespace N { class T { void M() {\n\
	            var expectedOperationTree = @\"one\";\n\
	            var expectedFlowGraph = @\"two\";\n\
	            } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "new")]);

	let output = rewrite(&tree, &mut map, &lf_options()).tree.to_string();
	assert!(output.contains("expectedOperationTree = @\"\nnew\n\";"));
	assert!(output.contains("expectedFlowGraph = @\"two\";"));
}

#[test]
fn visual_basic_baseline_is_replaced() {
	let tree = SyntaxTree::parse(Dialect::VisualBasic, VB_TEST);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "IBlockOperation\r\n  Locals: 0")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	let expected = VB_TEST.replacen(
		"<![CDATA[\nold tree\n]]>.Value",
		"<![CDATA[\nIBlockOperation\n  Locals: 0\n]]>.Value",
		1,
	);
	assert_eq!(rewritten.tree.to_string(), expected);
	assert_eq!(rewritten.fixes[0].previous.as_deref(), Some("old tree"));
	assert!(map.is_empty());
}

#[test]
fn semantic_names_include_the_root_namespace() {
	let tree = SyntaxTree::parse(Dialect::VisualBasic, VB_TEST);
	let mut map = CorrectedTextMap::from_iter([("Root.N.T.M", "new")]);
	let options = RewriteOptions {
		naming: NameResolution::Semantic {
			root_namespace: Some("Root".into()),
		},
		..lf_options()
	};

	let rewritten = rewrite(&tree, &mut map, &options);
	assert_eq!(rewritten.fixes.len(), 1);
}

#[test]
fn nested_types_use_the_innermost_name() {
	let text = "namespace A.B { class Outer { class Inner { void M() { var expectedGraph = @\"old\"; } } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("A.B.Inner.M", "new")]);

	let rewritten = rewrite(&tree, &mut map, &lf_options());
	assert_eq!(rewritten.fixes.len(), 1);
}

#[test]
fn crlf_line_endings_inside_literals() {
	let text = "namespace N { class T { void M() { var expectedGraph = @\"old\"; } } }";
	let tree = SyntaxTree::parse(Dialect::CSharp, text);
	let mut map = CorrectedTextMap::from_iter([("N.T.M", "a\nb")]);
	let options = RewriteOptions {
		newline: "\r\n".into(),
		..lf_options()
	};

	let output = rewrite(&tree, &mut map, &options).tree.to_string();
	assert!(output.contains("@\"\r\na\r\nb\r\n\";"));
}

#[rstest]
#[case::lf("a\nb\n", "\n")]
#[case::crlf("a\r\nb\r\n", "\r\n")]
#[case::mostly_crlf("a\r\nb\r\nc\n", "\r\n")]
#[case::mostly_lf("a\nb\nc\r\n", "\n")]
fn preserve_line_ending_follows_the_file(#[case] text: &str, #[case] expected: &str) {
	assert_eq!(LineEnding::Preserve.resolve(text), expected);
}

#[test]
fn session_rewrites_the_end_to_end_example() -> RebaselineResult<()> {
	let mut store = MemoryStore::new();
	store.insert(
		"N.cs",
		"namespace N { class T { void M() { var expectedOperationTree = @\"old\"; } } }",
	);
	let log = parse_failure_log(["N.T.M FAILED:", "Actual: X", "Y", "", "Exception stacktrace"]);
	let config = lf_config();

	let report = Session::new(&mut store, &config).run(log, &[source("N.cs", Dialect::CSharp)])?;
	assert_eq!(
		store.get(Path::new("N.cs")),
		Some("namespace N { class T { void M() { var expectedOperationTree = @\"\nX\nY\n\"; } } }")
	);
	assert!(report.unmatched.is_empty());
	assert_eq!(report.fix_count(), 1);
	assert_eq!(report.records, 1);
	assert!(report.changes[0].written);
	Ok(())
}

#[test]
fn no_file_is_read_after_every_record_is_applied() -> RebaselineResult<()> {
	let mut store = MemoryStore::new();
	store.insert("A.cs", "namespace N { class T { void M() { var expectedGraph = @\"old\"; } } }");
	store.insert("B.cs", "namespace N { class U { void M() { } } }");
	store.insert("C.vb", VB_TEST);
	let log = FailureLog {
		records: CorrectedTextMap::from_iter([("N.T.M", "new")]),
		diagnostics: Vec::new(),
	};
	let config = lf_config();
	let sources = [
		source("A.cs", Dialect::CSharp),
		source("B.cs", Dialect::CSharp),
		source("C.vb", Dialect::VisualBasic),
	];

	let report = Session::new(&mut store, &config).run(log, &sources)?;
	assert_eq!(store.reads(), [PathBuf::from("A.cs")]);
	assert_eq!(store.writes(), [PathBuf::from("A.cs")]);
	assert_eq!(report.files_visited, 1);
	Ok(())
}

#[test]
fn dry_run_reports_without_writing() -> RebaselineResult<()> {
	let mut store = MemoryStore::new();
	store.insert("A.cs", "namespace N { class T { void M() { var expectedGraph = @\"old\"; } } }");
	let log = FailureLog {
		records: CorrectedTextMap::from_iter([("N.T.M", "new"), ("N.T.Gone", "x")]),
		diagnostics: Vec::new(),
	};
	let config = lf_config();

	let report = Session::new(&mut store, &config)
		.dry_run(true)
		.run(log, &[source("A.cs", Dialect::CSharp)])?;
	assert!(store.writes().is_empty());
	assert!(!report.changes[0].written);
	assert!(report.changes[0].after.contains("@\"\nnew\n\""));
	assert_eq!(report.unmatched, ["N.T.Gone"]);
	assert!(!report.is_complete());
	Ok(())
}

#[test]
fn unchanged_files_are_not_written() -> RebaselineResult<()> {
	let mut store = MemoryStore::new();
	store.insert("A.cs", CSHARP_TEST);
	let log = FailureLog {
		records: CorrectedTextMap::from_iter([("N.T.Nope", "x")]),
		diagnostics: Vec::new(),
	};
	let config = lf_config();

	let report = Session::new(&mut store, &config).run(log, &[source("A.cs", Dialect::CSharp)])?;
	assert!(store.writes().is_empty());
	assert!(report.changes.is_empty());
	assert_eq!(report.files_visited, 1);
	Ok(())
}

#[test]
fn missing_source_aborts_the_run() {
	let mut store = MemoryStore::new();
	let log = FailureLog {
		records: CorrectedTextMap::from_iter([("N.T.M", "x")]),
		diagnostics: Vec::new(),
	};
	let config = lf_config();

	let result = Session::new(&mut store, &config).run(log, &[source("Gone.cs", Dialect::CSharp)]);
	assert!(matches!(result, Err(RebaselineError::SourceRead { .. })));
}

#[test]
fn rebaseline_from_disk_preserves_encoding() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let root = dir.path();
	let tests = root.join("Tests");
	std::fs::create_dir_all(&tests)?;
	let test_file = tests.join("T.cs");
	FileStore.write(
		&test_file,
		&TextFile::new(
			"namespace N { class T { void M() { var expectedOperationTree = @\"old\"; } } }",
			TextEncoding::Utf8Bom,
		),
	)?;
	let log = root.join("failures.log");
	std::fs::write(&log, "'N.T.M' FAILED:\nActual:   X\nY\n\nException stacktrace\n")?;

	let request = RebaselineRequest::new(&log, [SourceRoot::from_path(&tests)]).with_config(lf_config());
	let report = rebaseline(&request, &mut FileStore)?;

	assert_eq!(report.fix_count(), 1);
	let bytes = std::fs::read(&test_file)?;
	assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
	let file = FileStore.read(&test_file)?;
	assert_eq!(
		file.text,
		"namespace N { class T { void M() { var expectedOperationTree = @\"\nX\nY\n\"; } } }"
	);
	Ok(())
}

#[test]
fn solution_mode_only_visits_test_projects() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let root = dir.path();
	let write = |relative: &str, text: &str| -> std::io::Result<()> {
		let path = root.join(relative);
		std::fs::create_dir_all(path.parent().unwrap_or(root))?;
		std::fs::write(path, text)
	};
	write(
		"All.sln",
		"Project(\"{A}\") = \"Lib\", \"Lib\\Lib.csproj\", \"{1}\"\nEndProject\n\
		 Project(\"{A}\") = \"Lib.Tests\", \"Lib.Tests\\Lib.Tests.csproj\", \"{2}\"\nEndProject\n\
		 Project(\"{B}\") = \"Vb.Tests\", \"Vb.Tests\\Vb.Tests.vbproj\", \"{3}\"\nEndProject\n",
	)?;
	write("Lib/Lib.csproj", "<Project Sdk=\"Microsoft.NET.Sdk\" />")?;
	write("Lib/Code.cs", "")?;
	write("Lib.Tests/Lib.Tests.csproj", "<Project Sdk=\"Microsoft.NET.Sdk\" />")?;
	write("Lib.Tests/Semantics/Tests.cs", "")?;
	write("Lib.Tests/obj/Generated.cs", "")?;
	write("Lib.Tests/Form.Designer.cs", "")?;
	write(
		"Vb.Tests/Vb.Tests.vbproj",
		"<Project>\n<PropertyGroup><RootNamespace>Root</RootNamespace></PropertyGroup>\n\
		 <ItemGroup><Compile Include=\"Tests.vb\" /></ItemGroup>\n</Project>",
	)?;
	write("Vb.Tests/Tests.vb", "")?;
	write("Vb.Tests/Unlisted.vb", "")?;

	let sources = collect_sources(
		&[SourceRoot::from_path(root.join("All.sln"))],
		&RebaselineConfig::default(),
	)?;
	let found: Vec<_> = sources
		.iter()
		.map(|source| source.path.strip_prefix(root).unwrap_or(&source.path).to_path_buf())
		.collect();
	assert_eq!(
		found,
		[
			PathBuf::from("Lib.Tests/Semantics/Tests.cs"),
			PathBuf::from("Vb.Tests/Tests.vb"),
		]
	);
	assert_eq!(
		sources[0].naming,
		NameResolution::Semantic { root_namespace: None }
	);
	assert_eq!(
		sources[1].naming,
		NameResolution::Semantic {
			root_namespace: Some("Root".into())
		}
	);
	Ok(())
}

#[test]
fn sdk_projects_glob_their_folder_and_add_linked_items() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let root = dir.path();
	let write = |relative: &str, text: &str| -> std::io::Result<()> {
		let path = root.join(relative);
		std::fs::create_dir_all(path.parent().unwrap_or(root))?;
		std::fs::write(path, text)
	};
	write(
		"All.sln",
		"Project(\"{A}\") = \"Lib.Tests\", \"Lib.Tests\\Lib.Tests.csproj\", \"{1}\"\nEndProject\n",
	)?;
	write(
		"Lib.Tests/Lib.Tests.csproj",
		"<Project Sdk=\"Microsoft.NET.Sdk\">\n<ItemGroup>\n\
		 <Compile Include=\"..\\Shared\\Helper.cs\" Link=\"Shared\\Helper.cs\" />\n\
		 <Compile Remove=\"Resources\\**\" />\n</ItemGroup>\n</Project>",
	)?;
	write("Lib.Tests/OperationTests.cs", "")?;
	write("Lib.Tests/Resources/Embedded.cs", "")?;
	write("Shared/Helper.cs", "")?;
	write("Shared/Unlinked.cs", "")?;

	let sources = collect_sources(
		&[SourceRoot::from_path(root.join("All.sln"))],
		&RebaselineConfig::default(),
	)?;
	let mut found: Vec<_> = sources
		.iter()
		.filter_map(|source| source.path.file_name()?.to_str())
		.collect();
	found.sort_unstable();
	assert_eq!(found, ["Helper.cs", "OperationTests.cs"]);
	Ok(())
}

#[test]
fn legacy_wildcard_and_stale_items_do_not_abort_the_run() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	let root = dir.path();
	let write = |relative: &str, text: &str| -> std::io::Result<()> {
		let path = root.join(relative);
		std::fs::create_dir_all(path.parent().unwrap_or(root))?;
		std::fs::write(path, text)
	};
	write(
		"All.sln",
		"Project(\"{A}\") = \"Lib.Tests\", \"Lib.Tests\\Lib.Tests.csproj\", \"{1}\"\nEndProject\n",
	)?;
	write(
		"Lib.Tests/Lib.Tests.csproj",
		"<Project ToolsVersion=\"15.0\">\n<ItemGroup>\n\
		 <Compile Include=\"Semantics\\*.cs\" />\n\
		 <Compile Include=\"Removed\\Deleted.cs\" />\n</ItemGroup>\n</Project>",
	)?;
	write(
		"Lib.Tests/Semantics/T.cs",
		"namespace N { class T { void M() { var expectedOperationTree = @\"old\"; } } }",
	)?;
	write("Lib.Tests/Semantics/Other.cs", "")?;
	write("Lib.Tests/Unlisted.cs", "")?;
	write("failures.log", "'N.T.M' FAILED:\nActual:   new\n\nException stacktrace\n")?;

	let solution = [SourceRoot::from_path(root.join("All.sln"))];
	let sources = collect_sources(&solution, &lf_config())?;
	let found: Vec<_> = sources
		.iter()
		.map(|source| source.path.strip_prefix(root).unwrap_or(&source.path).to_path_buf())
		.collect();
	assert_eq!(
		found,
		[
			PathBuf::from("Lib.Tests/Semantics/Other.cs"),
			PathBuf::from("Lib.Tests/Semantics/T.cs"),
		]
	);

	let request = RebaselineRequest::new(root.join("failures.log"), solution).with_config(lf_config());
	let report = rebaseline(&request, &mut FileStore)?;
	assert_eq!(report.fix_count(), 1);
	Ok(())
}

#[test]
fn config_defaults() {
	let config = RebaselineConfig::default();
	assert_eq!(
		config.baseline_names,
		["expectedOperationTree", "expectedFlowGraph", "expectedGraph"]
	);
	assert_eq!(config.line_ending, LineEnding::Native);
	assert_eq!(config.log.unterminated, UnterminatedCapturePolicy::Drop);
	assert_eq!(config.matching.policy(Dialect::CSharp), AllowListPolicy::Include);
	assert_eq!(config.matching.policy(Dialect::VisualBasic), AllowListPolicy::Include);
	assert_eq!(config.solution.test_suffixes, ["Tests"]);
}

#[test]
fn config_is_loaded_from_the_first_candidate() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	std::fs::create_dir_all(dir.path().join(".config"))?;
	std::fs::write(dir.path().join(".config/rebaseline.toml"), "line_ending = \"lf\"")?;
	std::fs::write(
		dir.path().join(".rebaseline.toml"),
		r#"
baseline_names = ["expected"]
line_ending = "crlf"

[log]
unterminated = "error"

[match]
visual_basic = "exclude"

[exclude]
patterns = ["generated/"]
"#,
	)?;

	let Some(config) = RebaselineConfig::load(dir.path())? else {
		panic!("config should be found");
	};
	assert_eq!(config.baseline_names, ["expected"]);
	assert_eq!(config.line_ending, LineEnding::Crlf);
	assert_eq!(config.log.unterminated, UnterminatedCapturePolicy::Error);
	assert_eq!(config.matching.csharp, AllowListPolicy::Include);
	assert_eq!(config.matching.visual_basic, AllowListPolicy::Exclude);
	assert_eq!(config.exclude.patterns, ["generated/"]);
	assert_eq!(config.solution.test_suffixes, ["Tests"]);
	Ok(())
}

#[test]
fn missing_config_is_none() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	assert!(RebaselineConfig::load(dir.path())?.is_none());
	Ok(())
}

#[test]
fn invalid_config_is_a_parse_error() -> AnyEmptyResult {
	let dir = tempfile::tempdir()?;
	std::fs::write(dir.path().join("rebaseline.toml"), "line_ending = \"sideways\"")?;
	let result = RebaselineConfig::load(dir.path());
	assert!(matches!(result, Err(RebaselineError::ConfigParse(_))));
	Ok(())
}

#[test]
fn report_serializes_fixes() -> AnyEmptyResult {
	let fix = AppliedFix {
		method: "N.T.M".into(),
		variable: "expectedGraph".into(),
		previous: None,
		line: 3,
	};
	insta::assert_snapshot!(
		serde_json::to_string(&fix)?,
		@r#"{"method":"N.T.M","variable":"expectedGraph","previous":null,"line":3}"#
	);
	Ok(())
}
