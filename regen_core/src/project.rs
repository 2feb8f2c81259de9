use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use serde::Serialize;

use crate::DirectiveBlock;
use crate::RegenError;
use crate::RegenOptions;
use crate::RegenResult;
use crate::config::CONFIG_FILE_CANDIDATES;
use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::config::RegenConfig;
use crate::scanner::DIRECTIVE_OPEN;
use crate::scanner::memstr;
use crate::scanner::scan;

/// Options for controlling how a project is scanned.
///
/// Use [`ScanOptions::default()`] for sensible defaults or
/// [`ScanOptions::from_config`] to construct from a [`RegenConfig`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
	/// Gitignore-style patterns to exclude from scanning.
	pub exclude_patterns: Vec<String>,
	/// Extra files to scan regardless of their extension.
	pub include_set: GlobSet,
	/// Maximum file size to scan in bytes.
	pub max_file_size: u64,
	/// Whether to disable `.gitignore` integration.
	pub disable_gitignore: bool,
}

impl Default for ScanOptions {
	fn default() -> Self {
		Self {
			exclude_patterns: Vec::new(),
			include_set: GlobSet::empty(),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
		}
	}
}

impl ScanOptions {
	pub fn from_config(config: Option<&RegenConfig>) -> Self {
		let exclude_patterns = config
			.map(|c| c.exclude.patterns.clone())
			.unwrap_or_default();
		let include_patterns = config.map(|c| &c.include.patterns[..]).unwrap_or_default();

		Self {
			exclude_patterns,
			include_set: build_glob_set(include_patterns),
			max_file_size: config.map_or(DEFAULT_MAX_FILE_SIZE, RegenConfig::max_file_size),
			disable_gitignore: config.is_some_and(|c| c.disable_gitignore),
		}
	}
}

/// The kind of diagnostic produced during project scanning.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub enum DiagnosticKind {
	/// A directive without a closer, or a generated region without its end
	/// sentinel. The whole file is skipped.
	UnterminatedDirective { offset: usize },
	/// A file holding a directive opener that is not valid UTF-8. The whole
	/// file is skipped.
	InvalidUtf8 { offset: usize },
}

/// A problem found while scanning that keeps a file out of the pass.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDiagnostic {
	pub file: PathBuf,
	pub kind: DiagnosticKind,
	/// 1-indexed line number.
	pub line: usize,
	/// 1-indexed column number.
	pub column: usize,
}

impl ProjectDiagnostic {
	pub fn message(&self) -> String {
		match &self.kind {
			DiagnosticKind::UnterminatedDirective { offset } => {
				format!("unterminated directive (byte {offset}); file skipped")
			}
			DiagnosticKind::InvalidUtf8 { offset } => {
				format!("file is not valid UTF-8 (byte {offset}); file skipped")
			}
		}
	}

	/// Diagnostic code matching the `regen::` codes of [`RegenError`].
	pub fn code(&self) -> &'static str {
		match &self.kind {
			DiagnosticKind::UnterminatedDirective { .. } => "regen::unterminated_directive",
			DiagnosticKind::InvalidUtf8 { .. } => "regen::invalid_utf8",
		}
	}

	pub fn help(&self) -> &'static str {
		match &self.kind {
			DiagnosticKind::UnterminatedDirective { .. } => {
				"close the directive with `!! <line count> */` and its region with the END sentinel"
			}
			DiagnosticKind::InvalidUtf8 { .. } => "re-encode the file as UTF-8",
		}
	}
}

/// A source file holding at least one directive.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
	pub path: PathBuf,
	/// File content with line endings normalized to `\n`.
	#[serde(skip)]
	pub content: String,
	pub directives: Vec<DirectiveBlock>,
}

/// A scanned project with the settings to regenerate it.
///
/// This is the main entry point returned by [`scan_project_with_config`] and
/// consumed by [`check_project`](crate::check_project) and
/// [`compute_updates`](crate::compute_updates).
#[derive(Debug)]
pub struct ProjectContext {
	pub root: PathBuf,
	/// Files with directives, sorted by path.
	pub files: Vec<SourceFile>,
	pub options: RegenOptions,
	/// Files skipped because their directives could not be delimited.
	pub diagnostics: Vec<ProjectDiagnostic>,
}

impl ProjectContext {
	pub fn directive_count(&self) -> usize {
		self.files.iter().map(|file| file.directives.len()).sum()
	}
}

/// Scan a project with default options and no config file.
pub fn scan_project(root: &Path) -> RegenResult<ProjectContext> {
	scan_project_with_options(root, &ScanOptions::default(), RegenOptions::default())
}

/// Load the discovered config (if any) and scan the project with it.
pub fn scan_project_with_config(root: &Path) -> RegenResult<ProjectContext> {
	let config = RegenConfig::load(root)?;
	let scan_options = ScanOptions::from_config(config.as_ref());
	let options = config
		.as_ref()
		.map(RegenConfig::options)
		.unwrap_or_default();

	scan_project_with_options(root, &scan_options, options)
}

pub fn scan_project_with_options(
	root: &Path,
	scan_options: &ScanOptions,
	options: RegenOptions,
) -> RegenResult<ProjectContext> {
	let mut paths = collect_files(
		root,
		&scan_options.exclude_patterns,
		scan_options.disable_gitignore,
	)?;

	if !scan_options.include_set.is_empty() {
		let custom_exclude = build_exclude_matcher(root, &scan_options.exclude_patterns)?;
		collect_included_files(
			root,
			root,
			&scan_options.include_set,
			&custom_exclude,
			&mut paths,
			true,
		)?;
		paths.sort();
	}

	let mut files = Vec::new();
	let mut diagnostics = Vec::new();

	for path in paths {
		let size = std::fs::metadata(&path)?.len();
		if size > scan_options.max_file_size {
			return Err(RegenError::FileTooLarge {
				path: path.display().to_string(),
				size,
				limit: scan_options.max_file_size,
			});
		}

		let raw_content = match String::from_utf8(std::fs::read(&path)?) {
			Ok(raw_content) => raw_content,
			Err(error) => {
				let bytes = error.as_bytes();
				if memstr(bytes, DIRECTIVE_OPEN.as_bytes()).is_none() {
					tracing::debug!(path = %path.display(), "skipping file that is not valid UTF-8");
					continue;
				}

				let offset = error.utf8_error().valid_up_to();
				let (line, column) = byte_position(bytes, offset);
				tracing::warn!(path = %path.display(), line, column, "directive file is not valid UTF-8");
				diagnostics.push(ProjectDiagnostic {
					file: path,
					kind: DiagnosticKind::InvalidUtf8 { offset },
					line,
					column,
				});
				continue;
			}
		};
		let content = normalize_line_endings(&raw_content);

		match scan(&content) {
			Ok(directives) if directives.is_empty() => {}
			Ok(directives) => {
				tracing::debug!(path = %path.display(), count = directives.len(), "found directives");
				files.push(SourceFile {
					path,
					content,
					directives,
				});
			}
			Err(RegenError::UnterminatedDirective {
				offset,
				line,
				column,
			}) => {
				tracing::warn!(path = %path.display(), line, column, "unterminated directive");
				diagnostics.push(ProjectDiagnostic {
					file: path,
					kind: DiagnosticKind::UnterminatedDirective { offset },
					line,
					column,
				});
			}
			Err(error) => return Err(error),
		}
	}

	Ok(ProjectContext {
		root: root.to_path_buf(),
		files,
		options,
		diagnostics,
	})
}

/// 1-indexed line and column of a byte offset in raw file content.
fn byte_position(bytes: &[u8], offset: usize) -> (usize, usize) {
	let before = &bytes[..offset];
	let line = before.iter().filter(|byte| **byte == b'\n').count() + 1;
	let line_start = before
		.iter()
		.rposition(|byte| *byte == b'\n')
		.map_or(0, |index| index + 1);
	(line, offset - line_start + 1)
}

/// Build a `GlobSet` from a list of glob pattern strings.
fn build_glob_set(patterns: &[String]) -> GlobSet {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		if let Ok(glob) = Glob::new(pattern) {
			builder.add(glob);
		}
	}
	builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Normalize CRLF line endings to LF.
pub fn normalize_line_endings(content: &str) -> String {
	if content.contains('\r') {
		content.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		content.to_string()
	}
}

/// Build a `Gitignore` matcher from the `[exclude]` patterns in
/// `regen.toml`.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> RegenResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			RegenError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
		})?;
	}
	builder
		.build()
		.map_err(|e| RegenError::ConfigParse(format!("failed to build exclude rules: {e}")))
}

/// Build a `Gitignore` matcher from the project's `.gitignore` file (if any).
fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		let _ = builder.add(gitignore_path);
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Collect every scannable source file in a directory tree, sorted.
fn collect_files(
	root: &Path,
	exclude_patterns: &[String],
	disable_gitignore: bool,
) -> RegenResult<Vec<PathBuf>> {
	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();

	let gitignore = if disable_gitignore {
		Gitignore::empty()
	} else {
		build_gitignore(root)
	};
	let custom_exclude = build_exclude_matcher(root, exclude_patterns)?;

	walk_dir(
		root,
		&mut files,
		true,
		&gitignore,
		&custom_exclude,
		&mut visited_dirs,
	)?;
	files.sort();
	Ok(files)
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

fn has_project_config(dir: &Path) -> bool {
	CONFIG_FILE_CANDIDATES
		.iter()
		.any(|candidate| dir.join(candidate).is_file())
}

fn walk_dir(
	dir: &Path,
	files: &mut Vec<PathBuf>,
	is_root: bool,
	gitignore: &Gitignore,
	custom_exclude: &Gitignore,
	visited_dirs: &mut HashSet<PathBuf>,
) -> RegenResult<()> {
	if !dir.is_dir() {
		return Ok(());
	}

	// Detect symlink cycles by tracking canonical paths.
	let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
	if !visited_dirs.insert(canonical) {
		return Err(RegenError::SymlinkCycle {
			path: dir.display().to_string(),
		});
	}

	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();

		if path
			.file_name()
			.and_then(|n| n.to_str())
			.is_some_and(is_ignored_directory_name)
			&& path.is_dir()
		{
			continue;
		}

		let is_dir = path.is_dir();
		if gitignore.matched(&path, is_dir).is_ignore()
			|| custom_exclude.matched(&path, is_dir).is_ignore()
		{
			continue;
		}

		if is_dir {
			// A nested config file marks a separate project.
			if !is_root && has_project_config(&path) {
				continue;
			}
			walk_dir(
				&path,
				files,
				false,
				gitignore,
				custom_exclude,
				visited_dirs,
			)?;
		} else if is_scannable_file(&path) {
			files.push(path);
		}
	}

	Ok(())
}

/// Recursively collect files matching include patterns.
fn collect_included_files(
	root: &Path,
	dir: &Path,
	include_set: &GlobSet,
	exclude_matcher: &Gitignore,
	files: &mut Vec<PathBuf>,
	is_root: bool,
) -> RegenResult<()> {
	if !dir.is_dir() {
		return Ok(());
	}

	for entry in std::fs::read_dir(dir)? {
		let path = entry?.path();
		let is_dir = path.is_dir();

		if is_dir
			&& path
				.file_name()
				.and_then(|n| n.to_str())
				.is_some_and(is_ignored_directory_name)
		{
			continue;
		}

		if exclude_matcher.matched(&path, is_dir).is_ignore() {
			continue;
		}

		if let Ok(rel_path) = path.strip_prefix(root) {
			if path.is_file() && include_set.is_match(rel_path) && !files.contains(&path) {
				files.push(path.clone());
			}
		}

		if is_dir {
			if !is_root && has_project_config(&path) {
				continue;
			}
			collect_included_files(root, &path, include_set, exclude_matcher, files, false)?;
		}
	}

	Ok(())
}

/// Languages whose comments use `/* */`, which directives are written in.
fn is_scannable_file(path: &Path) -> bool {
	let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
		return false;
	};

	matches!(
		ext,
		"c" | "h"
			| "cc" | "cpp"
			| "cxx" | "hh"
			| "hpp" | "hxx"
			| "inl" | "m"
			| "mm" | "cs"
			| "java" | "js"
			| "jsx" | "ts"
			| "tsx" | "go"
			| "rs" | "swift"
			| "kt" | "glsl"
			| "hlsl" | "css"
	)
}
