use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::DEFAULT_INDENT_WIDTH;
use crate::DEFAULT_INSTRUCTION_LIMIT;
use crate::RegenError;
use crate::RegenOptions;
use crate::RegenResult;
use crate::ScriptOptions;

/// Default maximum file size in bytes (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["regen.toml", ".regen.toml", ".config/regen.toml"];

/// Configuration loaded from `regen.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct RegenConfig {
	/// Files larger than this many bytes are refused during scanning.
	#[serde(default)]
	pub max_file_size: Option<u64>,
	/// When `true`, `.gitignore` files are not consulted.
	#[serde(default)]
	pub disable_gitignore: bool,
	#[serde(default)]
	pub exclude: ExcludeConfig,
	#[serde(default)]
	pub include: IncludeConfig,
	#[serde(default)]
	pub output: OutputConfig,
	#[serde(default)]
	pub check: CheckConfig,
	#[serde(default)]
	pub script: ScriptConfig,
}

/// Files and directories to skip during scanning.
///
/// Patterns follow gitignore syntax and are applied on top of any
/// `.gitignore` rules (unless `disable_gitignore` is set).
#[derive(Debug, Default, Deserialize)]
pub struct ExcludeConfig {
	/// Relative to the project root. Examples: `"vendor/"`, `"*.gen.c"`,
	/// `"!keep.c"`.
	#[serde(default)]
	pub patterns: Vec<String>,
}

/// Extra files to scan even when their extension is not recognized.
#[derive(Debug, Default, Deserialize)]
pub struct IncludeConfig {
	/// Glob patterns relative to the project root.
	#[serde(default)]
	pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
	/// Spaces emitted per `indent()` level.
	#[serde(default = "default_indent_width")]
	pub indent_width: usize,
}

impl Default for OutputConfig {
	fn default() -> Self {
		Self {
			indent_width: DEFAULT_INDENT_WIDTH,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckConfig {
	/// What to do when a directive's declared line count is wrong.
	#[serde(default)]
	pub line_count: Severity,
}

#[derive(Debug, Deserialize)]
pub struct ScriptConfig {
	/// Maximum Lua instructions per directive. `0` disables the limit.
	#[serde(default = "default_instruction_limit")]
	pub instruction_limit: u64,
}

impl Default for ScriptConfig {
	fn default() -> Self {
		Self {
			instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
		}
	}
}

/// How seriously a recoverable problem is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Ignore,
	#[default]
	Warn,
	Error,
}

fn default_indent_width() -> usize {
	DEFAULT_INDENT_WIDTH
}

fn default_instruction_limit() -> u64 {
	DEFAULT_INSTRUCTION_LIMIT
}

impl RegenConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if there is none.
	pub fn load(root: &Path) -> RegenResult<Option<RegenConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		tracing::debug!(path = %config_path.display(), "loading config");
		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;

		Ok(Some(config))
	}

	pub fn parse(content: &str) -> RegenResult<RegenConfig> {
		toml::from_str(content).map_err(|e| RegenError::ConfigParse(e.to_string()))
	}

	pub fn max_file_size(&self) -> u64 {
		self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE)
	}

	/// Regeneration settings described by this config.
	pub fn options(&self) -> RegenOptions {
		RegenOptions {
			script: ScriptOptions {
				indent_width: self.output.indent_width,
				instruction_limit: (self.script.instruction_limit > 0)
					.then_some(self.script.instruction_limit),
			},
			line_count: self.check.line_count,
		}
	}
}
