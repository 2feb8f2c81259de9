use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use miette::Diagnostic;
use owo_colors::OwoColorize;
use regen_cli::Commands;
use regen_cli::ListOutputFormat;
use regen_cli::OutputFormat;
use regen_cli::RegenCli;
use regen_core::BlockFault;
use regen_core::CheckResult;
use regen_core::DriftWarning;
use regen_core::RegenError;
use regen_core::check_project;
use regen_core::compute_updates;
use regen_core::project::ProjectContext;
use regen_core::project::ProjectDiagnostic;
use regen_core::project::scan_project_with_config;
use regen_core::write_updates;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(Ordering::Relaxed)
}

/// Apply an `owo-colors` style only when color is enabled.
macro_rules! colored {
	($text:expr, $style:ident) => {
		if color_enabled() {
			format!("{}", $text.$style())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = RegenCli::parse();

	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	USE_COLOR.store(use_color, Ordering::Relaxed);
	init_tracing(args.verbose);

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match args.command {
		Some(Commands::Check {
			diff,
			format,
			watch,
		}) => run_check(&args, diff, format, watch),
		Some(Commands::Update { dry_run, watch }) => run_update(&args, dry_run, watch),
		Some(Commands::List { format }) => run_list(&args, format),
		None => {
			eprintln!("No subcommand specified. Run `regen --help` for usage.");
			process::exit(2);
		}
	};

	match result {
		Ok(true) => {}
		Ok(false) => process::exit(1),
		Err(e) => {
			match e.downcast::<RegenError>() {
				Ok(regen_err) => {
					let report: miette::Report = (*regen_err).into();
					eprintln!("{report:?}");
				}
				Err(e) => {
					eprintln!("{} {e}", colored!("error:", red));
				}
			}
			process::exit(2);
		}
	}
}

/// Log to stderr, filtered by `REGEN_LOG` when it is set.
fn init_tracing(verbose: bool) {
	let default_level = if verbose { "debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_env("REGEN_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.without_time()
		.try_init();
}

fn resolve_root(args: &RegenCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn scan(args: &RegenCli) -> CliResult<ProjectContext> {
	let root = resolve_root(args);
	let ctx = scan_project_with_config(&root)?;

	if args.verbose {
		println!(
			"Scanned project: {} directive(s) in {} file(s)",
			ctx.directive_count(),
			ctx.files.len()
		);
	}

	Ok(ctx)
}

/// Watch the project root and call `run` after every burst of changes.
fn watch_project(
	args: &RegenCli,
	action: &str,
	run: impl Fn() -> CliResult<bool>,
) -> CliResult<()> {
	use notify::Watcher;

	println!("\nWatching for file changes... (press Ctrl+C to stop)");

	let root = resolve_root(args);
	let (tx, rx) = mpsc::channel();

	let mut watcher =
		notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
			if let Ok(event) = res {
				if matches!(
					event.kind,
					notify::EventKind::Modify(_) | notify::EventKind::Create(_)
				) {
					let _ = tx.send(());
				}
			}
		})?;
	watcher.watch(&root, notify::RecursiveMode::Recursive)?;

	loop {
		rx.recv()?;
		// Debounce: drain additional events within 200ms.
		while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}

		println!("\nFile change detected, {action}...");
		if let Err(e) = run() {
			eprintln!("{} {e}", colored!("error:", red));
		}
	}
}

fn run_check(
	args: &RegenCli,
	show_diff: bool,
	format: OutputFormat,
	watch: bool,
) -> CliResult<bool> {
	let passed = run_check_once(args, show_diff, format)?;

	if !watch {
		return Ok(passed);
	}

	watch_project(args, "checking", || run_check_once(args, show_diff, format))?;
	Ok(passed)
}

/// Run a single check. Returns `true` when every region is up to date and
/// every directive ran.
fn run_check_once(args: &RegenCli, show_diff: bool, format: OutputFormat) -> CliResult<bool> {
	let ctx = scan(args)?;
	let root = resolve_root(args);
	let result = check_project(&ctx)?;
	let passed = result.is_ok() && ctx.diagnostics.is_empty();

	match format {
		OutputFormat::Json => print_check_json(&ctx, &result, &root, passed),
		OutputFormat::Github => print_check_github(&ctx, &result, &root, passed),
		OutputFormat::Text => {
			print_skipped(&ctx.diagnostics, &root);
			print_drifts(&result.drifts, &root);

			if passed {
				println!("Check passed: all generated regions are up to date.");
				return Ok(true);
			}

			eprintln!("Check failed.");
			eprintln!("  failed directives: {}", result.faults.len());
			eprintln!("  skipped files: {}", ctx.diagnostics.len());
			eprintln!("  stale regions: {}", result.stale.len());

			if !result.faults.is_empty() {
				eprintln!();
				for fault in sorted_by_location(&result.faults, &root, |f| (&f.file, f.line, f.column))
				{
					eprintln!("{:?}", fault_to_report(fault, &root));
				}
			}

			if !result.stale.is_empty() {
				eprintln!();
				eprintln!("Stale regions:");
				for entry in sorted_by_location(&result.stale, &root, |s| (&s.file, s.line, s.column))
				{
					let rel = make_relative(&entry.file, &root);
					eprintln!("  directive at {rel}:{}:{}", entry.line, entry.column);

					if show_diff {
						print_diff(&entry.current_content, &entry.expected_content);
					}
				}
			}

			eprintln!();
			eprintln!("{}", check_summary(&ctx, &result));
		}
	}

	Ok(passed)
}

fn print_check_json(ctx: &ProjectContext, result: &CheckResult, root: &Path, passed: bool) {
	let stale: Vec<serde_json::Value> = result
		.stale
		.iter()
		.map(|entry| {
			serde_json::json!({
				"file": make_relative(&entry.file, root),
				"line": entry.line,
				"column": entry.column,
				"current": entry.current_content,
				"expected": entry.expected_content,
			})
		})
		.collect();
	let faults: Vec<serde_json::Value> = result
		.faults
		.iter()
		.map(|fault| {
			serde_json::json!({
				"file": make_relative(&fault.file, root),
				"line": fault.line,
				"column": fault.column,
				"code": error_code(&fault.error),
				"message": fault.error.to_string(),
			})
		})
		.collect();
	let drifts: Vec<serde_json::Value> = result
		.drifts
		.iter()
		.map(|drift| {
			serde_json::json!({
				"file": make_relative(&drift.file, root),
				"line": drift.line,
				"column": drift.column,
				"declared": drift.declared,
				"actual": drift.actual,
			})
		})
		.collect();
	let skipped: Vec<serde_json::Value> = ctx
		.diagnostics
		.iter()
		.map(|diag| {
			serde_json::json!({
				"file": make_relative(&diag.file, root),
				"line": diag.line,
				"column": diag.column,
				"code": diag.code(),
				"message": diag.message(),
			})
		})
		.collect();

	let output = serde_json::json!({
		"ok": passed,
		"stale": stale,
		"faults": faults,
		"drifts": drifts,
		"skipped": skipped,
	});
	println!("{output}");
}

fn print_check_github(ctx: &ProjectContext, result: &CheckResult, root: &Path, passed: bool) {
	for diag in &ctx.diagnostics {
		let rel = make_relative(&diag.file, root);
		println!(
			"::error file={rel},line={},col={}::{}",
			diag.line,
			diag.column,
			diag.message()
		);
	}
	for fault in &result.faults {
		let rel = make_relative(&fault.file, root);
		println!(
			"::error file={rel},line={},col={}::Directive failed: {}",
			fault.line, fault.column, fault.error
		);
	}
	for drift in &result.drifts {
		let rel = make_relative(&drift.file, root);
		println!(
			"::warning file={rel},line={},col={}::Directive declares {} script line(s) but has {}",
			drift.line, drift.column, drift.declared, drift.actual
		);
	}
	for entry in &result.stale {
		let rel = make_relative(&entry.file, root);
		println!(
			"::warning file={rel},line={},col={}::Generated region is out of date",
			entry.line, entry.column
		);
	}

	if passed {
		println!("All generated regions are up to date.");
	} else {
		eprintln!("{}", check_summary(ctx, result));
	}
}

fn check_summary(ctx: &ProjectContext, result: &CheckResult) -> String {
	let mut parts = Vec::new();
	if !result.faults.is_empty() {
		parts.push(format!("{} directive(s) failed", result.faults.len()));
	}
	if !ctx.diagnostics.is_empty() {
		parts.push(format!("{} file(s) skipped", ctx.diagnostics.len()));
	}
	if !result.stale.is_empty() {
		parts.push(format!("{} region(s) are out of date", result.stale.len()));
	}
	format!("{}. Run `regen update` to fix.", parts.join(" and "))
}

fn run_update(args: &RegenCli, dry_run: bool, watch: bool) -> CliResult<bool> {
	let passed = run_update_once(args, dry_run)?;

	if !watch || dry_run {
		return Ok(passed);
	}

	watch_project(args, "updating", || run_update_once(args, false))?;
	Ok(passed)
}

/// Run a single update. Returns `false` when a directive failed or a file
/// was skipped, even though every healthy region was still written.
fn run_update_once(args: &RegenCli, dry_run: bool) -> CliResult<bool> {
	let ctx = scan(args)?;
	let root = resolve_root(args);
	let updates = compute_updates(&ctx)?;

	print_skipped(&ctx.diagnostics, &root);
	print_drifts(&updates.drifts, &root);
	for fault in sorted_by_location(&updates.faults, &root, |f| (&f.file, f.line, f.column)) {
		eprintln!("{:?}", fault_to_report(fault, &root));
	}

	let passed = updates.faults.is_empty() && ctx.diagnostics.is_empty();

	if updates.updated_count == 0 {
		println!("All generated regions are already up to date.");
		return Ok(passed);
	}

	if dry_run {
		println!(
			"Dry run: would update {} region(s) in {} file(s):",
			updates.updated_count,
			updates.updated_files.len()
		);
		for path in updates.updated_files.keys() {
			println!("  {}", make_relative(path, &root));
		}
	} else {
		write_updates(&updates)?;
		println!(
			"Updated {} region(s) in {} file(s).",
			updates.updated_count,
			updates.updated_files.len()
		);

		if args.verbose {
			for path in updates.updated_files.keys() {
				println!("  {}", make_relative(path, &root));
			}
		}
	}

	Ok(passed)
}

fn run_list(args: &RegenCli, format: ListOutputFormat) -> CliResult<bool> {
	let ctx = scan(args)?;
	let root = resolve_root(args);

	if let ListOutputFormat::Json = format {
		let directives: Vec<serde_json::Value> = ctx
			.files
			.iter()
			.flat_map(|file| {
				let rel = make_relative(&file.path, &root);
				file.directives.iter().map(move |block| {
					serde_json::json!({
						"file": rel,
						"line": block.start.line,
						"column": block.start.column,
						"declared_line_count": block.declared_line_count,
						"script_line_count": block.script_line_count(),
						"has_generated_region": block.has_generated_region(),
					})
				})
			})
			.collect();
		println!("{}", serde_json::Value::Array(directives));
		return Ok(true);
	}

	print_skipped(&ctx.diagnostics, &root);

	if ctx.files.is_empty() {
		println!("No directives found.");
		return Ok(true);
	}

	for file in &ctx.files {
		println!("{}", colored!(make_relative(&file.path, &root), bold));
		for block in &file.directives {
			let lines = format!(
				"{}/{} line(s)",
				block.declared_line_count,
				block.script_line_count()
			);
			let lines = if block.has_line_count_drift() {
				colored!(format!("{lines} [drift]"), yellow)
			} else {
				lines
			};
			let region = if block.has_generated_region() {
				"generated"
			} else {
				"not generated"
			};
			println!(
				"  {}:{} {lines} [{region}]",
				block.start.line, block.start.column
			);
		}
	}

	println!(
		"\n{} directive(s) in {} file(s)",
		ctx.directive_count(),
		ctx.files.len()
	);

	Ok(true)
}

/// Print files that were left out because a directive in them could not be
/// read or delimited.
fn print_skipped(diagnostics: &[ProjectDiagnostic], root: &Path) {
	for diag in diagnostics {
		let rel = make_relative(&diag.file, root);
		let report = miette::MietteDiagnostic::new(format!(
			"[{rel}:{}:{}] {}",
			diag.line,
			diag.column,
			diag.message()
		))
		.with_code(diag.code())
		.with_help(diag.help())
		.with_severity(miette::Severity::Error);
		eprintln!("{:?}", miette::Report::new(report));
	}
}

fn print_drifts(drifts: &[DriftWarning], root: &Path) {
	for drift in sorted_by_location(drifts, root, |d| (&d.file, d.line, d.column)) {
		let rel = make_relative(&drift.file, root);
		eprintln!(
			"{} directive at {rel}:{}:{} declares {} script line(s) but has {}",
			colored!("warning:", yellow),
			drift.line,
			drift.column,
			drift.declared,
			drift.actual,
		);
	}
}

fn sorted_by_location<'a, T>(
	items: &'a [T],
	root: &Path,
	location: impl Fn(&T) -> (&PathBuf, usize, usize),
) -> Vec<&'a T> {
	let mut sorted: Vec<_> = items.iter().collect();
	sorted.sort_by(|a, b| {
		let (a_file, a_line, a_column) = location(a);
		let (b_file, b_line, b_column) = location(b);
		make_relative(a_file, root)
			.cmp(&make_relative(b_file, root))
			.then_with(|| a_line.cmp(&b_line))
			.then_with(|| a_column.cmp(&b_column))
	});
	sorted
}

fn error_code(error: &RegenError) -> String {
	error
		.code()
		.map_or_else(|| "regen::error".to_string(), |code| code.to_string())
}

/// Convert a failed directive into a `miette::Report` that points at the
/// directive's location.
fn fault_to_report(fault: &BlockFault, root: &Path) -> miette::Report {
	let rel = make_relative(&fault.file, root);
	let mut diag = miette::MietteDiagnostic::new(format!(
		"[{rel}:{}:{}] {}",
		fault.line, fault.column, fault.error
	))
	.with_code(error_code(&fault.error))
	.with_severity(miette::Severity::Error);

	if let Some(help) = fault.error.help() {
		diag = diag.with_help(help.to_string());
	}

	miette::Report::new(diag)
}

/// Print a unified diff between two strings, colorized.
fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
	// Regions do not end with a newline.
	eprintln!();
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
