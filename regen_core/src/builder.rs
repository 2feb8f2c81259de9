use crate::RegenError;
use crate::RegenResult;

/// Default number of spaces emitted per indentation level.
pub const DEFAULT_INDENT_WIDTH: usize = 4;

/// Line-oriented output accumulator with indentation tracking.
///
/// Text is collected into the current line until [`TextBuilder::nl`] flushes
/// it. The indentation prefix of a line is fixed when the line starts, so an
/// `indent()` followed by `nl()` indents the *next* line, never the one being
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBuilder {
	indent_width: usize,
	indent_level: usize,
	/// Depth captured when the current line was started.
	line_indent: usize,
	lines: Vec<String>,
	current: String,
}

impl Default for TextBuilder {
	fn default() -> Self {
		Self::with_indent_width(DEFAULT_INDENT_WIDTH)
	}
}

impl TextBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_indent_width(indent_width: usize) -> Self {
		Self {
			indent_width,
			indent_level: 0,
			line_indent: 0,
			lines: Vec::new(),
			current: String::new(),
		}
	}

	/// Append raw text to the current line. Newlines are not interpreted.
	pub fn write(&mut self, text: &str) {
		self.current.push_str(text);
	}

	/// Append text, treating every `\n` as a call to [`TextBuilder::nl`].
	pub fn write_text(&mut self, text: &str) {
		let mut pieces = text.split('\n');
		if let Some(first) = pieces.next() {
			self.write(first);
		}
		for piece in pieces {
			self.nl();
			self.write(piece);
		}
	}

	/// Flush the current line and start a new one at the current depth.
	pub fn nl(&mut self) {
		let line = std::mem::take(&mut self.current);
		if line.is_empty() {
			self.lines.push(line);
		} else {
			let prefix = " ".repeat(self.line_indent * self.indent_width);
			self.lines.push(format!("{prefix}{line}"));
		}
		self.line_indent = self.indent_level;
	}

	pub fn indent(&mut self) {
		self.indent_level += 1;
	}

	pub fn unindent(&mut self) -> RegenResult<()> {
		if self.indent_level == 0 {
			return Err(RegenError::NegativeIndent);
		}

		self.indent_level -= 1;
		Ok(())
	}

	pub fn indent_level(&self) -> usize {
		self.indent_level
	}

	pub fn indent_width(&self) -> usize {
		self.indent_width
	}

	/// Returns true when nothing has been written or flushed yet.
	pub fn is_empty(&self) -> bool {
		self.lines.is_empty() && self.current.is_empty()
	}

	/// Flush any pending text and return the accumulated artifact. Every
	/// emitted line is newline terminated; an untouched builder yields an
	/// empty string.
	pub fn finish(mut self) -> String {
		if self.indent_level > 0 {
			tracing::warn!(
				level = self.indent_level,
				"generated text finished with unbalanced indentation"
			);
		}

		if !self.current.is_empty() {
			self.nl();
		}

		if self.lines.is_empty() {
			return String::new();
		}

		let mut artifact = self.lines.join("\n");
		artifact.push('\n');
		artifact
	}
}
