use std::str::FromStr;

use logos::Logos;

use crate::RegenError;
use crate::RegenResult;

/// The single character that opens and closes an expression segment.
pub const EXPRESSION_DELIMITER: char = '`';

/// Raw tokens of a template pattern. Everything that is not a delimiter is a
/// text run, newlines included.
#[derive(Logos, Debug, PartialEq)]
enum PatternToken {
	#[token("`")]
	Delimiter,
	#[regex(r"[^`]+")]
	Text,
}

/// A piece of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
	/// Text copied verbatim into the output.
	Literal(String),
	/// Unevaluated source text, resolved against a context at render time.
	Expr(String),
}

/// A compiled pattern. Immutable once built; render it as many times as
/// needed, with any context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
	segments: Vec<Segment>,
}

impl Template {
	pub fn compile(pattern: &str) -> RegenResult<Self> {
		compile(pattern)
	}

	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	/// Source text of every expression segment in order.
	pub fn expressions(&self) -> impl Iterator<Item = &str> {
		self.segments.iter().filter_map(|segment| {
			match segment {
				Segment::Expr(source) => Some(source.as_str()),
				Segment::Literal(_) => None,
			}
		})
	}
}

impl FromStr for Template {
	type Err = RegenError;

	fn from_str(pattern: &str) -> Result<Self, Self::Err> {
		compile(pattern)
	}
}

/// Split `pattern` into literal and expression segments.
///
/// Backtick pairs delimit expressions. Two adjacent backticks produce a
/// literal backtick. Adjacent literal text is merged into one segment.
pub fn compile(pattern: &str) -> RegenResult<Template> {
	let mut segments = Vec::new();
	let mut literal = String::new();
	let mut expression = String::new();
	// Byte offset of the delimiter that opened the current expression.
	let mut open: Option<usize> = None;

	for (token, span) in PatternToken::lexer(pattern).spanned() {
		let slice = &pattern[span.clone()];

		match (open, token) {
			(None, Ok(PatternToken::Delimiter)) => open = Some(span.start),
			(None, _) => literal.push_str(slice),
			(Some(_), Ok(PatternToken::Delimiter)) => {
				open = None;
				if expression.is_empty() {
					literal.push(EXPRESSION_DELIMITER);
					continue;
				}

				if !literal.is_empty() {
					segments.push(Segment::Literal(std::mem::take(&mut literal)));
				}
				segments.push(Segment::Expr(std::mem::take(&mut expression)));
			}
			(Some(_), _) => expression.push_str(slice),
		}
	}

	if let Some(offset) = open {
		return Err(RegenError::UnterminatedExpression { offset });
	}

	if !literal.is_empty() {
		segments.push(Segment::Literal(literal));
	}

	Ok(Template { segments })
}
