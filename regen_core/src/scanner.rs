use std::ops::Range;

use serde::Serialize;

use crate::RegenError;
use crate::RegenResult;

/// Marker opening a directive script.
pub const DIRECTIVE_OPEN: &str = "/*!!";
/// Marker prefix closing a directive script. It is followed by the declared
/// line count and `*/`.
pub const DIRECTIVE_CLOSE: &str = "!!";
/// First line of a generated region.
pub const BEGIN_SENTINEL: &str =
	"/* ################# !! GENERATED CODE -- DO NOT MODIFY !! ################# */";
/// Last line of a generated region.
pub const END_SENTINEL: &str =
	"/* ######################### END OF GENERATED CODE ######################### */";

const COMMENT_CLOSE: &str = "*/";

/// A 1-indexed line/column position together with its byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Point {
	pub line: usize,
	pub column: usize,
	pub offset: usize,
}

/// A directive found in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveBlock {
	/// Script body: everything after the opener up to the closer line.
	pub script: String,
	/// The number written in the `!! N */` closer.
	pub declared_line_count: usize,
	/// From the opener to just past the closer's `*/`.
	pub source_span: Range<usize>,
	/// Text strictly between the two sentinel lines, when they exist.
	pub generated_span: Option<Range<usize>>,
	/// The bytes replaced on regeneration, starting at the end of the closer
	/// line. Empty when no generated region follows yet.
	pub region_span: Range<usize>,
	/// Leading whitespace of the closer line.
	pub indent: String,
	pub start: Point,
}

impl DirectiveBlock {
	/// Number of lines in the script body. The newline directly after the
	/// opener does not count.
	pub fn script_line_count(&self) -> usize {
		let body = self.script.strip_prefix('\n').unwrap_or(&self.script);
		if body.is_empty() {
			return 0;
		}

		let newlines = body.bytes().filter(|byte| *byte == b'\n').count();
		if body.ends_with('\n') {
			newlines
		} else {
			newlines + 1
		}
	}

	pub fn has_line_count_drift(&self) -> bool {
		self.script_line_count() != self.declared_line_count
	}

	pub fn has_generated_region(&self) -> bool {
		self.generated_span.is_some()
	}

	/// Previously generated text, excluding the sentinel lines.
	pub fn generated<'a>(&self, source: &'a str) -> Option<&'a str> {
		self.generated_span
			.as_ref()
			.and_then(|span| source.get(span.clone()))
	}

	/// The exact bytes a regeneration replaces.
	pub fn region<'a>(&self, source: &'a str) -> &'a str {
		source.get(self.region_span.clone()).unwrap_or_default()
	}
}

/// Table of line-start byte offsets for offset to point conversion.
pub(crate) struct LineTable {
	line_starts: Vec<usize>,
}

impl LineTable {
	pub(crate) fn new(content: &str) -> Self {
		let mut line_starts = vec![0];
		for (i, byte) in content.bytes().enumerate() {
			if byte == b'\n' {
				line_starts.push(i + 1);
			}
		}
		Self { line_starts }
	}

	pub(crate) fn point(&self, offset: usize) -> Point {
		let line_idx = match self.line_starts.binary_search(&offset) {
			Ok(exact) => exact,
			Err(insert) => insert.saturating_sub(1),
		};

		Point {
			line: line_idx + 1,
			column: offset - self.line_starts[line_idx] + 1,
			offset,
		}
	}
}

/// Find the first occurrence of `needle` in `haystack`.
pub(crate) fn memstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack
		.windows(needle.len())
		.position(|window| window == needle)
}

/// A closer located in the source.
struct Closer {
	/// Offset of the `!!`.
	start: usize,
	/// Offset just past the `*/`.
	end: usize,
	declared_line_count: usize,
}

/// Try to read a closer at `offset`: `!!`, optional blanks, digits, optional
/// blanks, `*/`.
fn closer_at(bytes: &[u8], offset: usize) -> Option<Closer> {
	let mut cursor = offset + DIRECTIVE_CLOSE.len();
	let skip_blanks = |mut at: usize| {
		while matches!(bytes.get(at), Some(b' ' | b'\t')) {
			at += 1;
		}
		at
	};

	cursor = skip_blanks(cursor);
	let digits_start = cursor;
	while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
		cursor += 1;
	}
	if cursor == digits_start {
		return None;
	}

	let declared_line_count = std::str::from_utf8(&bytes[digits_start..cursor])
		.ok()?
		.parse()
		.ok()?;

	cursor = skip_blanks(cursor);
	if !bytes[cursor..].starts_with(COMMENT_CLOSE.as_bytes()) {
		return None;
	}

	Some(Closer {
		start: offset,
		end: cursor + COMMENT_CLOSE.len(),
		declared_line_count,
	})
}

fn find_closer(bytes: &[u8], from: usize) -> Option<Closer> {
	let mut search_from = from;
	while let Some(relative) = memstr(&bytes[search_from..], DIRECTIVE_CLOSE.as_bytes()) {
		let offset = search_from + relative;
		if let Some(closer) = closer_at(bytes, offset) {
			return Some(closer);
		}
		search_from = offset + 1;
	}

	None
}

fn line_start(content: &str, offset: usize) -> usize {
	content[..offset].rfind('\n').map_or(0, |index| index + 1)
}

/// Returns the line starting at `start` without its newline, and the offset
/// of the next line (or the end of the content).
fn line_at(content: &str, start: usize) -> (&str, usize) {
	match content[start..].find('\n') {
		Some(relative) => (&content[start..start + relative], start + relative + 1),
		None => (&content[start..], content.len()),
	}
}

/// Locate every directive block in `content`, in source order.
///
/// Line endings are expected to be normalized to `\n`. A generated region
/// ends at the first END sentinel line; meeting a directive closer or another
/// BEGIN sentinel before it makes the directive unterminated.
pub fn scan(content: &str) -> RegenResult<Vec<DirectiveBlock>> {
	let bytes = content.as_bytes();
	let line_table = LineTable::new(content);
	let mut blocks = Vec::new();
	let mut search_from = 0;

	while search_from < bytes.len() {
		let Some(relative) = memstr(&bytes[search_from..], DIRECTIVE_OPEN.as_bytes()) else {
			break;
		};
		let open = search_from + relative;
		let body_start = open + DIRECTIVE_OPEN.len();
		let unterminated = || {
			let start = line_table.point(open);
			RegenError::UnterminatedDirective {
				offset: open,
				line: start.line,
				column: start.column,
			}
		};

		let closer = find_closer(bytes, body_start).ok_or_else(unterminated)?;
		if memstr(&bytes[body_start..closer.start], DIRECTIVE_OPEN.as_bytes()).is_some() {
			return Err(unterminated());
		}

		let closer_line = line_start(content, closer.start);
		let indent = content[closer_line..]
			.chars()
			.take_while(|c| *c == ' ' || *c == '\t')
			.collect::<String>();
		let script_end =
			if closer_line >= body_start && content[closer_line..closer.start].trim().is_empty() {
				closer_line
			} else {
				closer.start
			};

		// Text after the closer on its line stays where it is; the region
		// starts at the end of that line.
		let (rest_of_closer_line, after_closer_line) = line_at(content, closer.end);
		if memstr(rest_of_closer_line.as_bytes(), DIRECTIVE_OPEN.as_bytes()).is_some() {
			return Err(unterminated());
		}
		let region_start = closer.end + rest_of_closer_line.len();
		let (next_line, after_begin) = line_at(content, after_closer_line);
		let has_begin = after_closer_line < content.len() && next_line.trim() == BEGIN_SENTINEL;

		let (generated_span, region_end) = if has_begin {
			let mut cursor = after_begin;
			let mut end_line = None;
			while cursor < content.len() {
				let (line, next) = line_at(content, cursor);
				let trimmed = line.trim();
				if trimmed == END_SENTINEL {
					end_line = Some((cursor, line));
					break;
				}
				// A region never spans into the next directive's closer or region.
				if trimmed == BEGIN_SENTINEL || find_closer(line.as_bytes(), 0).is_some() {
					break;
				}
				cursor = next;
			}

			let (end_start, end_text) = end_line.ok_or_else(unterminated)?;
			let end_text_end = end_start + end_text.trim_end().len();
			(Some(after_begin..end_start), end_text_end)
		} else {
			(None, region_start)
		};

		tracing::trace!(offset = open, declared = closer.declared_line_count, "found directive");

		blocks.push(DirectiveBlock {
			script: content[body_start..script_end].to_string(),
			declared_line_count: closer.declared_line_count,
			source_span: open..closer.end,
			generated_span,
			region_span: region_start..region_end,
			indent,
			start: line_table.point(open),
		});

		search_from = region_end;
	}

	Ok(blocks)
}
