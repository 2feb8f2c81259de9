use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

use mlua::Function;
use mlua::HookTriggers;
use mlua::Lua;
use mlua::LuaOptions;
use mlua::MetaMethod;
use mlua::MultiValue;
use mlua::StdLib;
use mlua::Table;
use mlua::UserData;
use mlua::UserDataMethods;
use mlua::Value as LuaValue;
use mlua::VmState;

use crate::Evaluator;
use crate::RegenError;
use crate::RegenResult;
use crate::Template;
use crate::TextBuilder;
use crate::Thunk;
use crate::Value;
use crate::render_with;

/// Default number of Lua instructions a single directive may execute.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 100_000_000;
const INSTRUCTION_HOOK_INTERVAL: u32 = 10_000;

const SCOPE_FACTORY_KEY: &str = "regen.scope_factory";
const MISSING_NAME_KEY: &str = "regen.missing_name";

/// Builds the environment table for an expression: names resolve in the
/// template context first, then in the block's globals. Anything else is
/// handed to `missing`, which raises.
const SCOPE_FACTORY: &str = r"
local setmetatable, rawget = setmetatable, rawget
return function(context, globals, missing)
	return setmetatable({}, {
		__index = function(_, name)
			local value = context[name]
			if value ~= nil then
				return value
			end
			value = rawget(globals, name)
			if value ~= nil then
				return value
			end
			return missing(name)
		end,
	})
end
";

/// The builder a block renders into. It sits in the slot while Lua code runs
/// and is taken out whenever Rust code renders.
type BuilderSlot = Rc<RefCell<TextBuilder>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptOptions {
	pub indent_width: usize,
	/// Upper bound on executed Lua instructions. `None` disables the check.
	pub instruction_limit: Option<u64>,
}

impl Default for ScriptOptions {
	fn default() -> Self {
		Self {
			indent_width: crate::DEFAULT_INDENT_WIDTH,
			instruction_limit: Some(DEFAULT_INSTRUCTION_LIMIT),
		}
	}
}

/// Runs directive scripts. Every call to [`ScriptHost::execute`] gets a
/// fresh Lua state and a fresh builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptHost {
	options: ScriptOptions,
}

impl ScriptHost {
	pub fn new(options: ScriptOptions) -> Self {
		Self { options }
	}

	pub fn options(&self) -> ScriptOptions {
		self.options
	}

	/// Execute `script` and return the text it generated.
	pub fn execute(&self, script: &str, chunk_name: &str) -> RegenResult<String> {
		tracing::debug!(chunk = chunk_name, "executing directive script");

		let slot: BuilderSlot = Rc::new(RefCell::new(TextBuilder::with_indent_width(
			self.options.indent_width,
		)));
		let lua = create_state(&slot).map_err(|error| recover(&error))?;

		if let Some(limit) = self.options.instruction_limit {
			let spent = Cell::new(0_u64);
			lua.set_hook(
				HookTriggers::new().every_nth_instruction(INSTRUCTION_HOOK_INTERVAL),
				move |_lua, _debug| {
					let total = spent.get() + u64::from(INSTRUCTION_HOOK_INTERVAL);
					spent.set(total);
					if total > limit {
						Err(mlua::Error::RuntimeError(format!(
							"instruction limit exceeded ({limit} instructions)"
						)))
					} else {
						Ok(VmState::Continue)
					}
				},
			);
		}

		lua.load(script)
			.set_name(format!("={chunk_name}"))
			.exec()
			.map_err(|error| recover(&error))?;

		let builder = slot.take();
		Ok(builder.finish())
	}
}

/// A sandboxed Lua state exposing the builder API.
fn create_state(slot: &BuilderSlot) -> mlua::Result<Lua> {
	let lua = Lua::new_with(
		StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
		LuaOptions::new(),
	)?;
	let globals = lua.globals();

	for name in ["load", "loadfile", "dofile", "require"] {
		globals.set(name, LuaValue::Nil)?;
	}

	{
		let slot = slot.clone();
		let template = lua.create_function(move |_, pattern: String| {
			let template = Template::compile(&pattern).map_err(mlua::Error::external)?;
			Ok(TemplateHandle {
				template: Rc::new(template),
				slot: slot.clone(),
			})
		})?;
		globals.set("template", template)?;
	}

	{
		let slot = slot.clone();
		let nl = lua.create_function(move |_, ()| {
			slot.borrow_mut().nl();
			Ok(())
		})?;
		globals.set("nl", nl)?;
	}

	{
		let slot = slot.clone();
		let indent = lua.create_function(move |_, ()| {
			slot.borrow_mut().indent();
			Ok(())
		})?;
		globals.set("indent", indent)?;
	}

	{
		let slot = slot.clone();
		let unindent = lua.create_function(move |_, ()| {
			slot.borrow_mut().unindent().map_err(mlua::Error::external)
		})?;
		globals.set("unindent", unindent)?;
	}

	// Diagnostics only. Nothing printed by a script reaches the artifact.
	let dump = lua.create_function(|_, args: MultiValue| {
		let parts = args.iter().map(describe).collect::<Vec<_>>();
		tracing::debug!("script wrote: {}", parts.join("\t"));
		Ok(())
	})?;
	globals.set("write", dump.clone())?;
	globals.set("print", dump)?;

	let factory: Function = lua.load(SCOPE_FACTORY).set_name("=scope").eval()?;
	lua.set_named_registry_value(SCOPE_FACTORY_KEY, factory)?;

	let missing = lua.create_function(|_, name: String| {
		Err::<(), _>(mlua::Error::external(RegenError::UndefinedParameter(name)))
	})?;
	lua.set_named_registry_value(MISSING_NAME_KEY, missing)?;

	Ok(lua)
}

/// Lua handle to a compiled template. Calling it renders into the active
/// builder: `t(context, ...)`.
#[derive(Clone)]
struct TemplateHandle {
	template: Rc<Template>,
	slot: BuilderSlot,
}

impl TemplateHandle {
	fn render(
		&self,
		lua: &Lua,
		context: Table,
		varargs: MultiValue,
		builder: &mut TextBuilder,
	) -> RegenResult<()> {
		let env = scope(lua, context).map_err(|error| recover(&error))?;
		let mut evaluator = LuaEvaluator {
			lua,
			env,
			varargs,
			slot: &self.slot,
		};

		render_with(&self.template, &mut evaluator, builder)
	}

	/// Render with an empty context and no varargs.
	fn render_bare(&self, lua: &Lua, builder: &mut TextBuilder) -> RegenResult<()> {
		let context = lua.create_table().map_err(|error| recover(&error))?;
		self.render(lua, context, MultiValue::new(), builder)
	}
}

impl UserData for TemplateHandle {
	fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
		methods.add_meta_method(MetaMethod::Call, |lua, this, args: MultiValue| {
			let mut args = args.into_iter();
			let context = match args.next().unwrap_or(LuaValue::Nil) {
				LuaValue::Nil => lua.create_table()?,
				LuaValue::Table(table) => table,
				other => {
					return Err(mlua::Error::external(RegenError::Script(format!(
						"template context must be a table, got {}",
						other.type_name()
					))));
				}
			};
			let varargs = args.collect::<MultiValue>();

			let mut builder = this.slot.take();
			let result = this.render(lua, context, varargs, &mut builder);
			this.slot.replace(builder);

			result.map_err(mlua::Error::external)
		});

		methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
			Ok(format!(
				"template ({} segments)",
				this.template.segments().len()
			))
		});
	}
}

/// Evaluates expression segments as Lua code inside a template scope.
struct LuaEvaluator<'a> {
	lua: &'a Lua,
	env: Table,
	varargs: MultiValue,
	slot: &'a BuilderSlot,
}

impl LuaEvaluator<'_> {
	/// Compile `source` as an expression when possible, otherwise as a block
	/// of statements.
	fn compile(&self, source: &str) -> mlua::Result<Function> {
		let expression = format!("return ({source})");
		self.lua
			.load(expression)
			.set_name("=expression")
			.set_environment(self.env.clone())
			.into_function()
			.or_else(|_| {
				self.lua
					.load(source)
					.set_name("=expression")
					.set_environment(self.env.clone())
					.into_function()
			})
	}
}

impl Evaluator for LuaEvaluator<'_> {
	fn evaluate(&mut self, source: &str, builder: &mut TextBuilder) -> RegenResult<Value> {
		let function = self.compile(source).map_err(|error| recover(&error))?;
		let returned = with_builder(self.slot, builder, || {
			function.call::<MultiValue>(self.varargs.clone())
		})
		.map_err(|error| recover(&error))?;

		let first = returned.into_iter().next().unwrap_or(LuaValue::Nil);
		to_value(self.lua, first, self.slot)
	}
}

fn scope(lua: &Lua, context: Table) -> mlua::Result<Table> {
	let factory: Function = lua.named_registry_value(SCOPE_FACTORY_KEY)?;
	let missing: Function = lua.named_registry_value(MISSING_NAME_KEY)?;
	factory.call((context, lua.globals(), missing))
}

/// Park `builder` in the slot while `run` executes Lua code.
fn with_builder<R>(slot: &BuilderSlot, builder: &mut TextBuilder, run: impl FnOnce() -> R) -> R {
	std::mem::swap(builder, &mut *slot.borrow_mut());
	let result = run();
	std::mem::swap(builder, &mut *slot.borrow_mut());
	result
}

fn to_value(lua: &Lua, value: LuaValue, slot: &BuilderSlot) -> RegenResult<Value> {
	let value = match value {
		LuaValue::Nil => Value::Nil,
		LuaValue::Boolean(value) => value.into(),
		LuaValue::Integer(value) => value.into(),
		LuaValue::Number(value) => value.into(),
		LuaValue::String(value) => String::from(value.to_string_lossy()).into(),
		LuaValue::Function(function) => {
			let slot = slot.clone();
			Value::Thunk(Thunk::new(move |builder| {
				with_builder(&slot, builder, || function.call::<()>(()))
					.map_err(|error| recover(&error))
			}))
		}
		LuaValue::Table(table) => {
			let items = table
				.sequence_values::<LuaValue>()
				.map(|item| {
					item.map_err(|error| recover(&error))
						.and_then(|item| to_value(lua, item, slot))
				})
				.collect::<RegenResult<Vec<_>>>()?;
			Value::Sequence(items)
		}
		LuaValue::UserData(data) if data.is::<TemplateHandle>() => {
			let handle = data
				.borrow::<TemplateHandle>()
				.map(|handle| TemplateHandle::clone(&handle))
				.map_err(|error| recover(&error))?;
			let lua = lua.clone();
			Value::Thunk(Thunk::new(move |builder| handle.render_bare(&lua, builder)))
		}
		other => {
			return Err(RegenError::Script(format!(
				"cannot emit a value of type `{}`",
				other.type_name()
			)));
		}
	};

	Ok(value)
}

/// Map a Lua error back to the crate error it carries, if any.
fn recover(error: &mlua::Error) -> RegenError {
	match error {
		mlua::Error::ExternalError(inner) => {
			inner
				.downcast_ref::<RegenError>()
				.map_or_else(|| RegenError::Script(inner.to_string()), RegenError::resurface)
		}
		mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
			recover(cause)
		}
		mlua::Error::RuntimeError(message) | mlua::Error::SyntaxError { message, .. } => {
			RegenError::Script(message.clone())
		}
		other => RegenError::Script(other.to_string()),
	}
}

fn describe(value: &LuaValue) -> String {
	match value {
		LuaValue::Nil => "nil".to_string(),
		LuaValue::Boolean(value) => value.to_string(),
		LuaValue::Integer(value) => value.to_string(),
		LuaValue::Number(value) => value.to_string(),
		LuaValue::String(value) => String::from(value.to_string_lossy()),
		other => other.type_name().to_string(),
	}
}
