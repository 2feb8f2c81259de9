use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Regenerate the code that directive scripts in your sources write.",
	long_about = "regen is a literate code generator. Source files carry `/*!! ... !! N */` \
	              directive blocks whose body is a Lua script; the text the script writes is \
	              kept between two GENERATED CODE sentinel comments right below the \
	              directive.\n\nQuick start:\n  regen list    Show every directive in the \
	              project\n  regen update  Regenerate stale regions\n  regen check   Verify \
	              everything is up to date"
)]
pub struct RegenCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output and debug logging.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Check that every generated region is up to date.
	///
	/// Runs each directive script and compares the output with the region
	/// currently in the file. Nothing is written. Exits with status 1 when a
	/// region is stale or a script fails, which makes it a good fit for CI.
	Check {
		/// Show a unified diff for each stale region.
		#[arg(long, default_value_t = false)]
		diff: bool,

		/// Output format for check results. Use `text` for human-readable
		/// output, `json` for programmatic consumption, or `github` for
		/// GitHub Actions annotations that appear inline on PRs.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,

		/// Watch for file changes and re-run checks automatically.
		#[arg(long, default_value_t = false)]
		watch: bool,
	},
	/// Regenerate every stale region in place.
	///
	/// Directives that have no generated region yet get one inserted right
	/// after their closing line. A failing script leaves its region untouched
	/// while the rest of the file is still updated.
	Update {
		/// Report which files would change without writing them.
		#[arg(long, default_value_t = false)]
		dry_run: bool,

		/// Watch for file changes and re-run updates automatically.
		#[arg(long, default_value_t = false)]
		watch: bool,
	},
	/// List every directive in the project.
	///
	/// Shows each directive's location, its declared and actual script line
	/// counts, and whether a generated region follows it.
	List {
		/// Output format for the listing.
		#[arg(long, value_enum, default_value_t = ListOutputFormat::Text)]
		format: ListOutputFormat,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption. Each stale entry includes
	/// the file path, location, current content, and expected content.
	Json,
	/// GitHub Actions annotation format. Emits `::warning` or `::error`
	/// annotations that appear inline on pull request diffs.
	Github,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ListOutputFormat {
	/// Human-readable text output.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}
