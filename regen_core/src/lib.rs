//! `regen_core` is the core library for the regen literate code generator.
//! Source files carry directive blocks whose body is a Lua script; running
//! the script produces text that is spliced back into the file between two
//! sentinel comment lines.
//!
//! ```text
//! /*!!
//! local greet = template 'Hello `name`!'
//! greet { name = "World" }
//! !! 2 */
//! /* ################# !! GENERATED CODE -- DO NOT MODIFY !! ################# */
//! Hello World!
//!
//! /* ######################### END OF GENERATED CODE ######################### */
//! ```
//!
//! ## Processing Pipeline
//!
//! ```text
//! Source file
//!   -> Scanner (finds directives and their generated regions)
//!   -> Script host (runs each directive in a fresh Lua state)
//!   -> Template compiler + renderer (writes into a TextBuilder)
//!   -> Engine (replaces stale regions, reports faults and drift)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration loading from `regen.toml`.
//! - [`project`]: directory walking and directive discovery across a project.
//!
//! ## Key Types
//!
//! - [`Template`]: a compiled pattern of literal and expression segments.
//! - [`TextBuilder`]: the indentation-aware line accumulator templates render
//!   into.
//! - [`DirectiveBlock`]: a directive located by [`scan`].
//! - [`ProjectContext`]: a scanned project ready for checking or updating.
//!
//! ## Quick Start
//!
//! ```rust
//! use regen_core::RenderContext;
//! use regen_core::Template;
//! use regen_core::TextBuilder;
//! use regen_core::render;
//!
//! let template = Template::compile("Hello `name`!")?;
//! let mut builder = TextBuilder::new();
//! render(&template, &RenderContext::new().bind("name", "World"), &mut builder)?;
//! assert_eq!(builder.finish(), "Hello World!\n");
//! # Ok::<(), regen_core::RegenError>(())
//! ```

pub use builder::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use project::*;
pub use render::*;
pub use scanner::*;
pub use script::*;
pub use template::*;

mod builder;
pub mod config;
mod engine;
#[allow(unused_assignments)]
mod error;
pub mod project;
mod render;
mod scanner;
mod script;
mod template;

#[cfg(test)]
mod __fixtures;
