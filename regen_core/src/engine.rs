use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use crate::DirectiveBlock;
use crate::Point;
use crate::RegenError;
use crate::RegenResult;
use crate::ScriptHost;
use crate::ScriptOptions;
use crate::config::Severity;
use crate::project::ProjectContext;
use crate::scanner::BEGIN_SENTINEL;
use crate::scanner::END_SENTINEL;
use crate::scanner::scan;

/// Settings that affect how a directive is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegenOptions {
	pub script: ScriptOptions,
	/// How a declared line count that disagrees with the script is treated.
	pub line_count: Severity,
}

/// Run the script of `block` in a fresh scripting state and return the text
/// it generated.
pub fn regenerate(block: &DirectiveBlock, options: &RegenOptions) -> RegenResult<String> {
	let chunk_name = format!("directive:{}:{}", block.start.line, block.start.column);
	ScriptHost::new(options.script).execute(&block.script, &chunk_name)
}

/// Build the replacement for `block.region_span`: both sentinel lines with
/// the artifact between them. Sentinels and non-empty artifact lines are
/// prefixed with the indentation of the closer line.
pub fn render_region(block: &DirectiveBlock, artifact: &str) -> String {
	let indent = block.indent.as_str();
	let body = artifact
		.split('\n')
		.map(|line| {
			if line.is_empty() {
				String::new()
			} else {
				format!("{indent}{line}")
			}
		})
		.collect::<Vec<_>>()
		.join("\n");

	format!("\n{indent}{BEGIN_SENTINEL}\n{body}\n{indent}{END_SENTINEL}")
}

/// A declared line count that differs from the script it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCountDrift {
	pub declared: usize,
	pub actual: usize,
}

/// What happened to a single directive during [`rewrite_source`].
#[derive(Debug)]
pub struct BlockOutcome {
	pub start: Point,
	/// The region currently in the source.
	pub current: String,
	/// The region after regeneration, or the fault that prevented it.
	pub expected: RegenResult<String>,
	/// Set when the line count disagrees and drift is reported as a warning.
	pub drift: Option<LineCountDrift>,
}

impl BlockOutcome {
	pub fn is_stale(&self) -> bool {
		self.expected
			.as_ref()
			.is_ok_and(|expected| *expected != self.current)
	}

	pub fn fault(&self) -> Option<&RegenError> {
		self.expected.as_ref().err()
	}
}

/// Result of regenerating every directive in one source text.
#[derive(Debug)]
pub struct SourceRewrite {
	/// The source with every successfully regenerated region replaced.
	pub content: String,
	/// One entry per directive, in source order.
	pub outcomes: Vec<BlockOutcome>,
}

impl SourceRewrite {
	/// Number of regions whose text changed.
	pub fn changed_count(&self) -> usize {
		self.outcomes.iter().filter(|outcome| outcome.is_stale()).count()
	}

	pub fn has_faults(&self) -> bool {
		self.outcomes.iter().any(|outcome| outcome.fault().is_some())
	}
}

/// Regenerate every directive in `source`.
///
/// A structural problem (an unterminated directive) fails the whole source
/// before anything runs. Faults inside individual blocks are recorded in
/// their outcome and leave that block's region as it was; sibling blocks are
/// still regenerated.
pub fn rewrite_source(source: &str, options: &RegenOptions) -> RegenResult<SourceRewrite> {
	let blocks = scan(source)?;
	let outcomes = blocks
		.iter()
		.map(|block| process_block(block, source, options))
		.collect::<Vec<_>>();

	// Replace from the end so earlier spans keep their offsets.
	let mut content = source.to_string();
	for (block, outcome) in blocks.iter().zip(&outcomes).rev() {
		if let Ok(expected) = &outcome.expected {
			if *expected != outcome.current {
				content.replace_range(block.region_span.clone(), expected);
			}
		}
	}

	Ok(SourceRewrite { content, outcomes })
}

fn process_block(block: &DirectiveBlock, source: &str, options: &RegenOptions) -> BlockOutcome {
	let current = block.region(source).to_string();
	let declared = block.declared_line_count;
	let actual = block.script_line_count();
	let mut drift = None;

	if declared != actual {
		match options.line_count {
			Severity::Ignore => {}
			Severity::Warn => {
				tracing::warn!(
					line = block.start.line,
					declared,
					actual,
					"directive line count does not match its script"
				);
				drift = Some(LineCountDrift { declared, actual });
			}
			Severity::Error => {
				return BlockOutcome {
					start: block.start,
					current,
					expected: Err(RegenError::LineCountDrift { declared, actual }),
					drift,
				};
			}
		}
	}

	let expected = regenerate(block, options).map(|artifact| render_region(block, &artifact));
	if let Err(error) = &expected {
		tracing::debug!(line = block.start.line, %error, "directive failed");
	}

	BlockOutcome {
		start: block.start,
		current,
		expected,
		drift,
	}
}

/// A directive that could not be regenerated.
#[derive(Debug)]
pub struct BlockFault {
	pub file: PathBuf,
	/// 1-indexed line of the directive opener.
	pub line: usize,
	/// 1-indexed column of the directive opener.
	pub column: usize,
	pub offset: usize,
	pub error: RegenError,
}

/// A directive whose declared line count disagrees with its script.
#[derive(Debug, Clone)]
pub struct DriftWarning {
	pub file: PathBuf,
	pub line: usize,
	pub column: usize,
	pub declared: usize,
	pub actual: usize,
}

/// A directive whose generated region is out of date.
#[derive(Debug)]
pub struct StaleEntry {
	pub file: PathBuf,
	pub line: usize,
	pub column: usize,
	/// The region as it is in the file, sentinel lines included.
	pub current_content: String,
	/// The region a fresh regeneration produces.
	pub expected_content: String,
}

/// Result of checking a project for stale directives.
#[derive(Debug, Default)]
pub struct CheckResult {
	pub stale: Vec<StaleEntry>,
	/// Collected instead of aborting so a check reports every problem at
	/// once.
	pub faults: Vec<BlockFault>,
	pub drifts: Vec<DriftWarning>,
}

impl CheckResult {
	/// Returns true if every directive is up to date and none failed.
	pub fn is_ok(&self) -> bool {
		self.stale.is_empty() && self.faults.is_empty()
	}

	pub fn has_faults(&self) -> bool {
		!self.faults.is_empty()
	}

	pub fn has_warnings(&self) -> bool {
		!self.drifts.is_empty()
	}
}

/// Result of updating a project.
#[derive(Debug, Default)]
pub struct UpdateResult {
	/// Files that changed, with their new content.
	pub updated_files: BTreeMap<PathBuf, String>,
	/// Number of regions that were regenerated with different text.
	pub updated_count: usize,
	pub faults: Vec<BlockFault>,
	pub drifts: Vec<DriftWarning>,
}

/// Regenerate every directive in the project and report the stale ones
/// without touching any file.
pub fn check_project(ctx: &ProjectContext) -> RegenResult<CheckResult> {
	let mut result = CheckResult::default();

	for file in &ctx.files {
		let rewrite = rewrite_source(&file.content, &ctx.options)?;

		for outcome in rewrite.outcomes {
			collect_drift(&file.path, &outcome, &mut result.drifts);
			match outcome.expected {
				Ok(expected) if expected != outcome.current => {
					result.stale.push(StaleEntry {
						file: file.path.clone(),
						line: outcome.start.line,
						column: outcome.start.column,
						current_content: outcome.current,
						expected_content: expected,
					});
				}
				Ok(_) => {}
				Err(error) => result.faults.push(fault(&file.path, outcome.start, error)),
			}
		}
	}

	Ok(result)
}

/// Compute the new content of every file with at least one stale directive.
pub fn compute_updates(ctx: &ProjectContext) -> RegenResult<UpdateResult> {
	let mut result = UpdateResult::default();

	for file in &ctx.files {
		let rewrite = rewrite_source(&file.content, &ctx.options)?;
		let changed = rewrite.changed_count();

		for outcome in rewrite.outcomes {
			collect_drift(&file.path, &outcome, &mut result.drifts);
			if let Err(error) = outcome.expected {
				result.faults.push(fault(&file.path, outcome.start, error));
			}
		}

		if changed > 0 {
			tracing::debug!(path = %file.path.display(), changed, "file needs regeneration");
			result.updated_count += changed;
			result.updated_files.insert(file.path.clone(), rewrite.content);
		}
	}

	Ok(result)
}

/// Write updated contents to disk. Each file is written to a temporary
/// sibling first and then renamed over the original.
pub fn write_updates(updates: &UpdateResult) -> RegenResult<()> {
	for (path, content) in &updates.updated_files {
		write_atomic(path, content)?;
	}

	Ok(())
}

fn write_atomic(path: &Path, content: &str) -> RegenResult<()> {
	let file_name = path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();
	let temp_path = path.with_file_name(format!(".{file_name}.regen-{}", std::process::id()));

	std::fs::write(&temp_path, content)?;
	if let Err(error) = std::fs::rename(&temp_path, path) {
		let _ = std::fs::remove_file(&temp_path);
		return Err(error.into());
	}

	Ok(())
}

fn collect_drift(path: &Path, outcome: &BlockOutcome, drifts: &mut Vec<DriftWarning>) {
	if let Some(drift) = outcome.drift {
		drifts.push(DriftWarning {
			file: path.to_path_buf(),
			line: outcome.start.line,
			column: outcome.start.column,
			declared: drift.declared,
			actual: drift.actual,
		});
	}
}

fn fault(path: &Path, start: Point, error: RegenError) -> BlockFault {
	BlockFault {
		file: path.to_path_buf(),
		line: start.line,
		column: start.column,
		offset: start.offset,
		error,
	}
}
