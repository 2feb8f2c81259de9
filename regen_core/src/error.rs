use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RegenError {
	#[error(transparent)]
	#[diagnostic(code(regen::io_error))]
	Io(#[from] std::io::Error),

	#[error("unterminated expression in template pattern at byte {offset}")]
	#[diagnostic(
		code(regen::unterminated_expression),
		help("close the expression with a matching backtick, or write two backticks for a literal one")
	)]
	UnterminatedExpression { offset: usize },

	#[error("unterminated directive starting at {line}:{column} (byte {offset})")]
	#[diagnostic(
		code(regen::unterminated_directive),
		help(
			"close the directive with `!! <line count> */` and make sure a generated region \
			 ends with the END OF GENERATED CODE sentinel"
		)
	)]
	UnterminatedDirective {
		offset: usize,
		line: usize,
		column: usize,
	},

	#[error("undefined template parameter `{0}`")]
	#[diagnostic(
		code(regen::undefined_parameter),
		help("pass `{0}` in the template context or define it in the directive script")
	)]
	UndefinedParameter(String),

	#[error("unsupported template expression `{0}`")]
	#[diagnostic(
		code(regen::unsupported_expression),
		help("the native evaluator only resolves parameter names")
	)]
	UnsupportedExpression(String),

	#[error("`unindent()` called at indentation level 0")]
	#[diagnostic(
		code(regen::negative_indent),
		help("every `unindent()` must follow a matching `indent()`")
	)]
	NegativeIndent,

	#[error("directive script failed: {0}")]
	#[diagnostic(code(regen::script))]
	Script(String),

	#[error("directive declares {declared} script line(s) but has {actual}")]
	#[diagnostic(
		code(regen::line_count_drift),
		help("update the number in the `!! <N> */` closer to match the script")
	)]
	LineCountDrift { declared: usize, actual: usize },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(regen::config_parse),
		help("check that regen.toml is valid TOML")
	)]
	ConfigParse(String),

	#[error("file too large: `{path}` is {size} bytes (limit: {limit} bytes)")]
	#[diagnostic(
		code(regen::file_too_large),
		help("increase `max_file_size` in regen.toml or exclude this file")
	)]
	FileTooLarge { path: String, size: u64, limit: u64 },

	#[error("symlink cycle detected at: `{path}`")]
	#[diagnostic(
		code(regen::symlink_cycle),
		help("remove the circular symlink or exclude this path")
	)]
	SymlinkCycle { path: String },
}

impl RegenError {
	/// Recreate errors that travel through the script runtime as opaque
	/// external errors. Only the variants a script can trigger are rebuilt.
	pub(crate) fn resurface(&self) -> Self {
		match self {
			Self::UnterminatedExpression { offset } => {
				Self::UnterminatedExpression { offset: *offset }
			}
			Self::UndefinedParameter(name) => Self::UndefinedParameter(name.clone()),
			Self::UnsupportedExpression(source) => Self::UnsupportedExpression(source.clone()),
			Self::NegativeIndent => Self::NegativeIndent,
			Self::Script(message) => Self::Script(message.clone()),
			other => Self::Script(other.to_string()),
		}
	}
}

pub type RegenResult<T> = Result<T, RegenError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
