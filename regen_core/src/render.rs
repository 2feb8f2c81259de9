use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use derive_more::Deref;
use derive_more::DerefMut;

use crate::RegenError;
use crate::RegenResult;
use crate::Segment;
use crate::Template;
use crate::TextBuilder;

/// Name bound to the current element by [`RenderContext::for_item`].
pub const ITEM_PARAMETER: &str = "it";
/// Name bound to the 1-based position by [`RenderContext::for_item`].
pub const INDEX_PARAMETER: &str = "index";

/// A plain value with a textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
	String(String),
	Integer(i64),
	Float(f64),
	Boolean(bool),
}

impl fmt::Display for Scalar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::String(value) => f.write_str(value),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Float(value) => {
				if value.is_finite() && value.fract() == 0.0 {
					write!(f, "{value:.1}")
				} else {
					write!(f, "{value}")
				}
			}
			Self::Boolean(value) => write!(f, "{value}"),
		}
	}
}

type ThunkFn = dyn Fn(&mut TextBuilder) -> RegenResult<()>;

/// A deferred, zero-argument callable. Invoking it writes into the builder
/// it is handed instead of producing a value.
#[derive(Clone)]
pub struct Thunk(Rc<ThunkFn>);

impl Thunk {
	pub fn new(f: impl Fn(&mut TextBuilder) -> RegenResult<()> + 'static) -> Self {
		Self(Rc::new(f))
	}

	/// Deferred invocation of another template with its own context.
	pub fn template(template: Rc<Template>, context: RenderContext) -> Self {
		Self::new(move |builder| render(&template, &context, builder))
	}

	pub fn invoke(&self, builder: &mut TextBuilder) -> RegenResult<()> {
		(self.0)(builder)
	}
}

impl fmt::Debug for Thunk {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Thunk")
	}
}

impl PartialEq for Thunk {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

/// Everything an expression segment can evaluate to.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	#[default]
	Nil,
	Scalar(Scalar),
	Sequence(Vec<Value>),
	Thunk(Thunk),
}

impl Value {
	/// Capture positional arguments as an ordered sequence.
	pub fn varargs<I, V>(items: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		Self::Sequence(items.into_iter().map(Into::into).collect())
	}

	/// Iterate a sequence as `(1-based index, value)` pairs. Any other value
	/// is treated as a single element.
	pub fn items(&self) -> Vec<(usize, &Value)> {
		match self {
			Self::Sequence(items) => items.iter().enumerate().map(|(i, v)| (i + 1, v)).collect(),
			Self::Nil => Vec::new(),
			other => vec![(1, other)],
		}
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::Scalar(Scalar::String(value.to_string()))
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::Scalar(Scalar::String(value))
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Scalar(Scalar::Integer(value))
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Scalar(Scalar::Integer(i64::from(value)))
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Scalar(Scalar::Float(value))
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Scalar(Scalar::Boolean(value))
	}
}

impl From<Thunk> for Value {
	fn from(value: Thunk) -> Self {
		Self::Thunk(value)
	}
}

impl From<Vec<Value>> for Value {
	fn from(value: Vec<Value>) -> Self {
		Self::Sequence(value)
	}
}

/// Named arguments supplied when a template is invoked.
#[derive(Debug, Clone, PartialEq, Default, Deref, DerefMut)]
pub struct RenderContext(BTreeMap<String, Value>);

impl RenderContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a binding, replacing any previous value for `name`.
	#[must_use]
	pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(name.into(), value.into());
		self
	}

	/// Context for one step of an implicit loop: `it` is the element and
	/// `index` its 1-based position.
	pub fn for_item(index: usize, value: Value) -> Self {
		Self::new()
			.bind(ITEM_PARAMETER, value)
			.bind(INDEX_PARAMETER, index as i64)
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RenderContext {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(
			iter.into_iter()
				.map(|(name, value)| (name.into(), value.into()))
				.collect(),
		)
	}
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for RenderContext {
	fn from(bindings: [(K, V); N]) -> Self {
		bindings.into_iter().collect()
	}
}

/// Resolves the source text of an expression segment into a [`Value`].
///
/// The builder is handed through so evaluators backed by a script runtime
/// can let the script write into it while the expression runs.
pub trait Evaluator {
	fn evaluate(&mut self, source: &str, builder: &mut TextBuilder) -> RegenResult<Value>;
}

/// Native evaluator: an expression is a parameter name looked up in a chain
/// of contexts, innermost first.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
	bindings: &'a RenderContext,
	parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
	pub fn new(bindings: &'a RenderContext) -> Self {
		Self {
			bindings,
			parent: None,
		}
	}

	/// A nested scope whose unresolved names fall back to `self`.
	pub fn child(&'a self, bindings: &'a RenderContext) -> Scope<'a> {
		Scope {
			bindings,
			parent: Some(self),
		}
	}

	pub fn lookup(&self, name: &str) -> Option<&'a Value> {
		self.bindings
			.get(name)
			.or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
	}
}

impl Evaluator for Scope<'_> {
	fn evaluate(&mut self, source: &str, _builder: &mut TextBuilder) -> RegenResult<Value> {
		let name = source.trim();
		if !is_identifier(name) {
			return Err(RegenError::UnsupportedExpression(source.to_string()));
		}

		self.lookup(name)
			.cloned()
			.ok_or_else(|| RegenError::UndefinedParameter(name.to_string()))
	}
}

fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	chars
		.next()
		.is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render `template` with `context` using the native [`Scope`] evaluator.
pub fn render(
	template: &Template,
	context: &RenderContext,
	builder: &mut TextBuilder,
) -> RegenResult<()> {
	render_with(template, &mut Scope::new(context), builder)
}

/// Render `template`, resolving expression segments through `evaluator`.
pub fn render_with<E: Evaluator + ?Sized>(
	template: &Template,
	evaluator: &mut E,
	builder: &mut TextBuilder,
) -> RegenResult<()> {
	for segment in template.segments() {
		match segment {
			Segment::Literal(text) => builder.write_text(text),
			Segment::Expr(source) => {
				let value = evaluator.evaluate(source, builder)?;
				emit(value, builder)?;
			}
		}
	}

	Ok(())
}

/// Write a value at the current cursor position. Sequences are emitted
/// element by element and thunks are invoked with the same builder.
pub fn emit(value: Value, builder: &mut TextBuilder) -> RegenResult<()> {
	match value {
		Value::Nil => {}
		Value::Scalar(scalar) => builder.write_text(&scalar.to_string()),
		Value::Sequence(items) => {
			for item in items {
				emit(item, builder)?;
			}
		}
		Value::Thunk(thunk) => thunk.invoke(builder)?,
	}

	Ok(())
}
