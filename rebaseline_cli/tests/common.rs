#![allow(dead_code)]

use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub const FAILURE_LOG: &str = "\
Starting test execution, please wait...
'N.T.M' FAILED:
Assert.Equal() Failure
Expected: IBlockOperation (0 statements)
Actual:   IBlockOperation (1 statements)
  IReturnOperation (OperationKind.Return)

Exception stacktrace
   at Microsoft.CodeAnalysis.Test.Utilities.AssertEx.Equal
";

pub const CSHARP_TEST: &str = "namespace N
{
    class T
    {
        void M()
        {
            var expectedOperationTree = @\"
IBlockOperation (0 statements)
\";
        }
    }
}
";

pub const FIXED_CSHARP_TEST: &str = "namespace N
{
    class T
    {
        void M()
        {
            var expectedOperationTree = @\"
IBlockOperation (1 statements)
  IReturnOperation (OperationKind.Return)
\";
        }
    }
}
";

pub fn rebaseline_cmd(dir: &Path) -> Command {
	let mut cmd = Command::new(get_cargo_bin("rebaseline"));
	cmd.env("NO_COLOR", "1")
		.env_remove("RUST_LOG")
		.current_dir(dir);
	cmd
}

/// A workspace with a failure log and one test source under `tests/`.
pub fn workspace(source: &str) -> std::io::Result<tempfile::TempDir> {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("failures.log"), FAILURE_LOG)?;
	std::fs::create_dir_all(tmp.path().join("tests"))?;
	std::fs::write(tmp.path().join("tests/T.cs"), source)?;
	// Keep line endings predictable regardless of platform.
	std::fs::write(tmp.path().join("rebaseline.toml"), "line_ending = \"lf\"\n")?;
	Ok(tmp)
}
