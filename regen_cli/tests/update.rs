mod common;

use regen_core::AnyEmptyResult;
use similar_asserts::assert_eq;

#[test]
fn update_inserts_missing_region() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(tmp.path(), "main.c", common::GREETING_DIRECTIVE);

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("Updated 1 region(s) in 1 file(s)."));

	assert_eq!(common::read(tmp.path(), "main.c").as_str(), common::GREETING_GENERATED);

	Ok(())
}

#[test]
fn update_replaces_stale_region() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(tmp.path(), "main.c", &common::stale_greeting());

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	assert_eq!(common::read(tmp.path(), "main.c").as_str(), common::GREETING_GENERATED);

	Ok(())
}

#[test]
fn update_is_idempotent() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(tmp.path(), "main.c", common::GREETING_DIRECTIVE);

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("already up to date"));

	common::regen_cmd()
		.arg("check")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	assert_eq!(common::read(tmp.path(), "main.c").as_str(), common::GREETING_GENERATED);

	Ok(())
}

#[test]
fn update_dry_run_does_not_write() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(tmp.path(), "main.c", &common::stale_greeting());

	common::regen_cmd()
		.arg("update")
		.arg("--dry-run")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("would update 1 region(s) in 1 file(s)"))
		.stdout(predicates::str::contains("main.c"));

	assert_eq!(common::read(tmp.path(), "main.c").as_str(), common::stale_greeting().as_str());

	Ok(())
}

#[test]
fn update_keeps_healthy_files_when_a_script_fails() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(tmp.path(), "broken.c", common::FAILING_DIRECTIVE);
	common::write(tmp.path(), "main.c", common::GREETING_DIRECTIVE);

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.code(1)
		.stderr(predicates::str::contains("boom"));

	assert_eq!(common::read(tmp.path(), "main.c").as_str(), common::GREETING_GENERATED);
	assert_eq!(common::read(tmp.path(), "broken.c").as_str(), common::FAILING_DIRECTIVE);

	Ok(())
}

#[test]
fn update_multiple_directives_in_one_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let first = "/*!!\nlocal t = template 'int `name`;'\nt { name = 'a' }\n!! 2 */\n";
	let second = "/*!!\nlocal t = template 'int `name`;'\nt { name = 'b' }\n!! 2 */\n";
	common::write(tmp.path(), "vars.h", &format!("{first}\n{second}"));

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("Updated 2 region(s) in 1 file(s)."));

	let content = common::read(tmp.path(), "vars.h");
	assert!(content.contains("int a;"));
	assert!(content.contains("int b;"));

	Ok(())
}

#[test]
fn update_verbose_lists_files() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(tmp.path(), "src/main.c", common::GREETING_DIRECTIVE);

	common::regen_cmd()
		.arg("update")
		.arg("--verbose")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("src/main.c"));

	Ok(())
}

#[test]
fn update_uses_configured_indent_width() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	common::write(
		tmp.path(),
		"main.c",
		"/*!!\nindent()\nnl()\nlocal t = template 'int x;'\nt()\nunindent()\n!! 5 */\n",
	);
	common::write(tmp.path(), "regen.toml", "[output]\nindent_width = 2\n");

	common::regen_cmd()
		.arg("update")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();

	let content = common::read(tmp.path(), "main.c");
	assert!(content.contains("\n  int x;\n"), "unexpected content:\n{content}");

	Ok(())
}
