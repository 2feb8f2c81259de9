use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub const GREETING_DIRECTIVE: &str = "int before;\n/*!!\nlocal greet = template 'Hello `name`!'\ngreet { name = 'World' }\n!! 2 */\nint after;\n";

pub const GREETING_GENERATED: &str = "int before;\n/*!!\nlocal greet = template 'Hello `name`!'\ngreet { name = 'World' }\n!! 2 */\n/* ################# !! GENERATED CODE -- DO NOT MODIFY !! ################# */\nHello World!\n\n/* ######################### END OF GENERATED CODE ######################### */\nint after;\n";

pub const FAILING_DIRECTIVE: &str = "/*!!\nerror('boom')\n!! 1 */\n";

pub fn regen_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("regen"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("REGEN_LOG");
	cmd
}

/// A stale copy of the greeting with an outdated generated region.
#[allow(dead_code)]
pub fn stale_greeting() -> String {
	GREETING_GENERATED.replace("Hello World!", "Hello Old!")
}

#[allow(dead_code)]
pub fn write(root: &Path, name: &str, content: &str) {
	let path = root.join(name);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create {}: {e}", parent.display()));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
}

#[allow(dead_code)]
pub fn read(root: &Path, name: &str) -> String {
	let path = root.join(name);
	std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}
