use std::path::Path;
use std::rc::Rc;

use crate::RegenResult;
use crate::RenderContext;
use crate::Template;
use crate::TextBuilder;
use crate::Thunk;
use crate::Value;
use crate::render;

/// A header with two directives: a list generator whose region is up to
/// date, and a script depending on a library the host does not provide.
pub(crate) const LUA_FIXTURE: &str = r##"    /*!!

local test = template [[
Hello `name`!
`values`
]]

list_item = template '<li>`it`</li>'
list = template [[<ul>`
indent()
for i,v in ipairs(table.pack(...)) do
    nl()
    list_item { it = v }
end
unindent()
`
</ul>
]]

test {
    name='World',
    values = function()
        list(nil, 'b')
        list(nil, 'b', 1, true, false)
    end
}

--write(_G)

    !! 15 */
    /* ################# !! GENERATED CODE -- DO NOT MODIFY !! ################# */
    Hello World!
    <ul>
        <li>b</li>
    </ul>
    <ul>
        <li>b</li>
        <li>1</li>
        <li>true</li>
        <li>false</li>
    </ul>


    /* ######################### END OF GENERATED CODE ######################### */
    1
    2
    3
    4


/*!!
local src = [[
    (
        (apple)
        (banana 1 2 3 (asdf 1) 4 )
        1.0 -23 " a b c "
        (asdf fdsa)
    )
]]

local parser = sx.parser(src)
--write(parser:require_object())
--write(parser:require_array())
--parser = sx.parser(src)
parser:require_open()
    parser:require_expression("apple")
    parser:require_close()

    parser:require_expression("banana")
    parser:ignore_remaining_expression()

    if parser:require_float() ~= 1.0 then error("expected 1.0") end
    if parser:require_int() ~= -23 then error("expected -23") end
    if parser:require_string() ~= " a b c " then error("expected string") end
parser:ignore_remaining_expression()
parser:require_done()

!! 4 */
/* ################# !! GENERATED CODE -- DO NOT MODIFY !! ################# */

/* ######################### END OF GENERATED CODE ######################### */
"##;

/// A directive that has never been run: no generated region yet.
pub(crate) const FIRST_RUN_SOURCE: &str = "int before;\n/*!!\nlocal greet = template 'Hello `name`!'\ngreet { name = 'World' }\n!! 2 */\nint after;\n";

pub(crate) const FIRST_RUN_EXPECTED: &str = "int before;\n/*!!\nlocal greet = template 'Hello `name`!'\ngreet { name = 'World' }\n!! 2 */\n/* ################# !! GENERATED CODE -- DO NOT MODIFY !! ################# */\nHello World!\n\n/* ######################### END OF GENERATED CODE ######################### */\nint after;\n";

pub(crate) fn compiled(pattern: &str) -> Rc<Template> {
	Rc::new(Template::compile(pattern).unwrap_or_else(|e| panic!("compile `{pattern}`: {e}")))
}

/// Deferred block emitting one `<li>` line per element of `values`, one
/// level deeper than the surrounding text.
pub(crate) fn list_items(values: Value) -> Thunk {
	let item = compiled("<li>`it`</li>");
	Thunk::new(move |builder| {
		builder.indent();
		for (index, value) in values.items() {
			builder.nl();
			render(&item, &RenderContext::for_item(index, value.clone()), builder)?;
		}
		builder.unindent()
	})
}

/// Render the `<ul>` wrapper around `values` into `builder`.
pub(crate) fn render_list(values: Value, builder: &mut TextBuilder) -> RegenResult<()> {
	let wrapper = compiled("<ul>`items`\n</ul>");
	let context = RenderContext::new().bind("items", list_items(values));
	render(&wrapper, &context, builder)
}

pub(crate) fn write_file(root: &Path, name: &str, content: &str) {
	let path = root.join(name);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create dir: {e}"));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {name}: {e}"));
}

pub(crate) fn read_file(root: &Path, name: &str) -> String {
	std::fs::read_to_string(root.join(name)).unwrap_or_else(|e| panic!("read {name}: {e}"))
}
