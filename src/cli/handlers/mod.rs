mod init;
pub use init::cmd_init;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::Deserialize;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::baseline::BaselineLog;
use crate::io::config_io;
use crate::io::lock::WriteLock;
use crate::io::project_io;
use crate::io::recovery::{
    RecoveryCategory, RecoveryEntry, log_recovery, recovery_entry_count, recovery_log_path,
};
use crate::io::store::{AllocationStore, FileSink};
use crate::model::config::ProjectConfig;
use crate::model::edit::CellEdit;
use crate::model::filter::{FilterState, ViewContext};
use crate::model::insight::{InsightKind, decode_insight};
use crate::model::period::Granularity;
use crate::model::project::Project;
use crate::ops::check;
use crate::ops::coalesce::{FlushOutcome, RejectedEdit};
use crate::ops::pipeline::{Grid, build_grid};
use crate::ops::session::EditSession;
use crate::ops::tree::{WbsTree, build_tree};
use crate::util::clock::{ManualClock, SystemClock};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let dir = cli.project_dir.as_deref();

    match cli.command {
        // Init is handled in main.rs before project discovery
        Commands::Init(args) => cmd_init(args, dir),

        // Read commands
        Commands::Grid(args) => cmd_grid(args, dir, json),
        Commands::Tree => cmd_tree(dir, json),
        Commands::Check => cmd_check(dir, json),
        Commands::Summary(args) => cmd_summary(args, dir, json),
        Commands::Insight(args) => cmd_insight(args, json),

        // Write commands
        Commands::Set(args) => cmd_set(args, dir, json),
        Commands::Apply(args) => cmd_apply(args, dir, json),
        Commands::Window(args) => cmd_window(args, dir),
        Commands::Baseline(cmd) => match cmd.action {
            BaselineAction::Create(args) => cmd_baseline_create(args, dir, json),
            BaselineAction::List => cmd_baseline_list(dir, json),
            BaselineAction::Show(args) => cmd_baseline_show(args, dir, json),
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve `-C` (or the working directory) to a starting path
fn start_dir(dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

fn load_project_from(dir: Option<&str>) -> Result<Project, Box<dyn std::error::Error>> {
    let start = start_dir(dir)?;
    let root = project_io::discover_project(&start)?;
    Ok(project_io::load_project(&root)?)
}

/// The configured fixed date, or the local date
fn today(config: &ProjectConfig) -> NaiveDate {
    config
        .clock
        .today
        .unwrap_or_else(|| Local::now().date_naive())
}

const DEFAULT_SPAN_DAYS: u64 = 13;

/// Explicit bounds win; a single bound gets a two-week window; otherwise the
/// program window, otherwise the two weeks starting this Monday.
fn resolve_window(
    range: &WindowRange,
    config: &ProjectConfig,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), String> {
    let span = Days::new(DEFAULT_SPAN_DAYS);
    let out_of_range = |d: NaiveDate| format!("a two-week window around {} leaves the calendar", d);
    let after = |d: NaiveDate| d.checked_add_days(span).ok_or_else(|| out_of_range(d));
    let (from, to) = match (range.from, range.to) {
        (Some(from), Some(to)) => (from, to),
        (Some(from), None) => (from, after(from)?),
        (None, Some(to)) => (to.checked_sub_days(span).ok_or_else(|| out_of_range(to))?, to),
        (None, None) => match (config.program.from, config.program.to) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                let back = Days::new(u64::from(today.weekday().num_days_from_monday()));
                let monday = today.checked_sub_days(back).ok_or_else(|| out_of_range(today))?;
                (monday, after(monday)?)
            }
        },
    };
    if from > to {
        return Err(format!("window starts after it ends: {} > {}", from, to));
    }
    Ok((from, to))
}

/// Serve the daily matrix from the allocation store, planned against the
/// active baseline, and run the pipeline
fn load_grid(project: &Project, context: ViewContext) -> Result<Grid, Box<dyn std::error::Error>> {
    let tree = build_tree(project.wbs.clone())?;
    let store = AllocationStore::load(&project.data_dir)?;
    let plan = BaselineLog::load(&project.data_dir)?.active_plan();
    let response = store.daily_matrix(&tree, &plan, context.from, context.to, context.today)?;
    Ok(build_grid(project.wbs.clone(), &response, context)?)
}

/// Look a WBS node up by id, then by code
fn resolve_item(tree: &WbsTree, key: &str) -> Result<String, String> {
    if tree.contains(key) {
        return Ok(key.to_string());
    }
    let mut matches = tree.nodes().filter(|n| n.code == key);
    match (matches.next(), matches.next()) {
        (Some(node), None) => Ok(node.id.clone()),
        (Some(_), Some(_)) => Err(format!("WBS code '{}' is ambiguous, use the id", key)),
        (None, _) => Err(format!("no WBS item with id or code '{}'", key)),
    }
}

fn read_input(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|e| format!("could not read {}: {}", path, e).into())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// Append edits the store never applied to the recovery log
fn record_unsaved(data_dir: &Path, unsaved: &[RejectedEdit]) {
    if unsaved.is_empty() {
        return;
    }
    let edits: Vec<_> = unsaved.iter().map(|r| &r.edit).collect();
    let reasons: Vec<(String, String)> = unsaved
        .iter()
        .map(|r| (format!("{} {}", r.edit.item_id, r.edit.date), r.error.clone()))
        .collect();
    log_recovery(
        data_dir,
        RecoveryEntry {
            timestamp: chrono::Utc::now(),
            category: RecoveryCategory::Unsaved,
            description: format!("{} edit(s) not saved", unsaved.len()),
            fields: reasons,
            body: serde_json::to_string_pretty(&edits).unwrap_or_default(),
        },
    );
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_grid(args: GridArgs, dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let today = today(&project.config);
    let (from, to) = resolve_window(&args.range, &project.config, today)?;

    let mut context = ViewContext::new(from, to, today);
    context.granularity = Granularity::parse(&args.view)
        .ok_or_else(|| format!("unknown view '{}' (expected: day, week, month)", args.view))?;
    context.filters = FilterState {
        search: args.search.unwrap_or_default(),
        levels: args.levels,
        buildings: args.buildings,
        statuses: args.statuses,
        target_period: args.target.unwrap_or_default(),
        progress_min: args.min_progress,
        progress_max: args.max_progress,
    };

    let mut grid = load_grid(&project, context)?;
    for key in &args.collapse {
        let id = resolve_item(grid.tree(), key)?;
        if !grid.context().collapsed.contains(&id) {
            grid.toggle_group(&id);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&grid_to_json(&grid))?);
    } else {
        print_lines(&format_grid(&grid));
    }
    Ok(())
}

fn cmd_tree(dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let today = today(&project.config);
    let grid = load_grid(&project, ViewContext::new(today, today, today))?;

    if json {
        let nodes: Vec<TreeNodeJson> = grid.rows().iter().map(row_to_tree_json).collect();
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else if grid.rows().is_empty() {
        println!("(empty WBS)");
    } else {
        for row in grid.rows() {
            println!("{}", format_tree_line(row));
        }
    }
    Ok(())
}

fn cmd_check(dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let store = AllocationStore::load(&project.data_dir)?;
    let result = check::check_project(&project.wbs, &store.keys());
    let recovery_entries = recovery_entry_count(&project.data_dir);

    if json {
        let out = CheckJson {
            result: &result,
            recovery_entries,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_lines(&format_check(&result));
        if recovery_entries > 0 {
            if !result.errors.is_empty() || !result.warnings.is_empty() {
                println!();
            }
            println!(
                "{} unsaved edit entr{} in {}",
                recovery_entries,
                if recovery_entries == 1 { "y" } else { "ies" },
                recovery_log_path(&project.data_dir).display()
            );
        }
        if result.valid {
            println!("✓ project is valid");
        } else {
            println!("✗ project has errors");
        }
    }
    Ok(())
}

fn cmd_summary(args: SummaryArgs, dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let today = today(&project.config);
    let (from, to) = resolve_window(&args.range, &project.config, today)?;
    let grid = load_grid(&project, ViewContext::new(from, to, today))?;

    let out = SummaryJson {
        project: project.config.project.name.clone(),
        summary: grid.summary(),
        period: grid.period_kpi(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_lines(&format_summary(&out.project, &out.summary, &out.period));
    }
    Ok(())
}

fn cmd_insight(args: InsightArgs, json: bool) -> CmdResult {
    let kind = InsightKind::parse(&args.kind)?;
    let body = read_input(&args.file)?;
    let insight = decode_insight(kind, &body)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&insight)?);
    } else {
        println!("{}", insight.headline());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write command handlers
// ---------------------------------------------------------------------------

fn cmd_set(args: SetArgs, dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let today = today(&project.config);
    let grid = load_grid(&project, ViewContext::new(args.date, args.date, today))?;
    let item_id = resolve_item(grid.tree(), &args.item)?;

    let sink = FileSink::new(
        &project.data_dir,
        grid.tree().clone(),
        project.config.grid.max_manpower,
    );
    let mut session = EditSession::new(SystemClock, sink, &project.config.grid);
    let mut edit = CellEdit::new(&item_id, args.date, args.value);
    if let Some(qty) = args.qty_done {
        edit = edit.with_qty_done(qty);
    }
    session.edit(&grid, edit)?;
    let (outcome, unsaved) = session.close();
    record_unsaved(&project.data_dir, &unsaved);

    if json {
        let out = SetJson {
            item_id,
            date: args.date,
            value: args.value,
            qty_done: args.qty_done,
            batch: outcome.as_ref().map(flush_to_json),
            unsaved: unsaved.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if let Some(outcome) = &outcome {
        print_lines(&format_flush(outcome));
    }

    if !unsaved.is_empty() {
        return Err(format!(
            "{} edit(s) not saved; see {}",
            unsaved.len(),
            recovery_log_path(&project.data_dir).display()
        )
        .into());
    }
    Ok(())
}

/// One line of a `cg apply` stream
#[derive(Debug, Deserialize)]
struct TimedEdit {
    /// Milliseconds since the start of the stream
    #[serde(default)]
    at_ms: u64,
    #[serde(alias = "item_id", alias = "wbs_id")]
    item: String,
    date: NaiveDate,
    value: f64,
    #[serde(default)]
    qty_done: Option<f64>,
}

fn parse_timed_edits(text: &str) -> Result<Vec<TimedEdit>, String> {
    let mut edits = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let edit: TimedEdit =
            serde_json::from_str(line).map_err(|e| format!("line {}: {}", n + 1, e))?;
        edits.push(edit);
    }
    Ok(edits)
}

fn cmd_apply(args: ApplyArgs, dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let today = today(&project.config);
    let mut edits = parse_timed_edits(&read_input(&args.file)?)?;
    edits.sort_by_key(|e| e.at_ms);

    let (Some(from), Some(to)) = (
        edits.iter().map(|e| e.date).min(),
        edits.iter().map(|e| e.date).max(),
    ) else {
        println!("no edits");
        return Ok(());
    };
    let grid = load_grid(&project, ViewContext::new(from, to, today))?;
    let sink = FileSink::new(
        &project.data_dir,
        grid.tree().clone(),
        project.config.grid.max_manpower,
    )
    .with_lock_timeout(Duration::from_secs(5));

    let clock = ManualClock::new();
    let mut session = EditSession::new(&clock, sink, &project.config.grid);
    let mut batches: Vec<FlushOutcome> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();

    for timed in &edits {
        // Fire every timer that expires before this edit arrives
        let arrival = clock.at_ms(timed.at_ms);
        while let Some(due) = session.next_due() {
            if due > arrival {
                break;
            }
            clock.advance_to(due);
            match session.tick() {
                Some(outcome) => batches.push(outcome),
                None => break,
            }
        }
        clock.set_ms(timed.at_ms);

        let item_id = match resolve_item(grid.tree(), &timed.item) {
            Ok(id) => id,
            Err(e) => {
                invalid.push(e);
                continue;
            }
        };
        let mut edit = CellEdit::new(&item_id, timed.date, timed.value);
        if let Some(qty) = timed.qty_done {
            edit = edit.with_qty_done(qty);
        }
        if let Err(e) = session.edit(&grid, edit) {
            invalid.push(e.to_string());
        }
    }
    while let Some(due) = session.next_due() {
        clock.advance_to(due);
        match session.tick() {
            Some(outcome) => batches.push(outcome),
            None => break,
        }
    }
    let (last, unsaved) = session.close();
    batches.extend(last);
    record_unsaved(&project.data_dir, &unsaved);

    if json {
        let report = ApplyReportJson {
            edits: edits.len(),
            invalid,
            batches: batches.iter().map(flush_to_json).collect(),
            unsaved: unsaved.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} edit(s) in {} batch(es)", edits.len(), batches.len());
        for reason in &invalid {
            println!("  invalid: {}", reason);
        }
        for outcome in &batches {
            print_lines(&format_flush(outcome));
        }
    }

    if !unsaved.is_empty() {
        return Err(format!(
            "{} edit(s) not saved; see {}",
            unsaved.len(),
            recovery_log_path(&project.data_dir).display()
        )
        .into());
    }
    Ok(())
}

fn cmd_window(args: WindowArgs, dir: Option<&str>) -> CmdResult {
    let start = start_dir(dir)?;
    let root = project_io::discover_project(&start)?;
    let data_dir = root.join(project_io::DATA_DIR);
    let (_, mut doc) = config_io::read_config(&data_dir)?;

    let mut changed = Vec::new();
    if let (Some(from), Some(to)) = (args.from, args.to) {
        if from > to {
            return Err(format!("window starts after it ends: {} > {}", from, to).into());
        }
        config_io::set_program_window(&mut doc, from, to);
        changed.push(format!("program window: {} .. {}", from, to));
    }
    if let Some(today) = args.today {
        config_io::set_fixed_today(&mut doc, Some(today));
        changed.push(format!("today: {}", today));
    } else if args.clear_today {
        config_io::set_fixed_today(&mut doc, None);
        changed.push("today: local date".to_string());
    }

    if changed.is_empty() {
        return Err("nothing to change (use --from/--to, --today or --clear-today)".into());
    }
    config_io::write_config(&data_dir, &doc)?;
    print_lines(&changed);
    Ok(())
}

// ---------------------------------------------------------------------------
// Baseline handlers
// ---------------------------------------------------------------------------

fn cmd_baseline_create(args: BaselineCreateArgs, dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    if args.name.trim().is_empty() {
        return Err("baseline name cannot be empty".into());
    }
    let tree = build_tree(project.wbs.clone())?;

    // Allocations and the log are read and written under one lock
    let _lock = WriteLock::acquire_default(&project.data_dir)?;
    let store = AllocationStore::load(&project.data_dir)?;
    let mut log = BaselineLog::load(&project.data_dir)?;
    let baseline = log
        .create(&tree, &store, args.name.trim(), args.notes, chrono::Utc::now())
        .clone();
    log.save(&project.data_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&baseline_to_json(&baseline))?);
    } else {
        println!("created {}", format_baseline_line(&baseline).trim_start_matches(['*', ' ']));
    }
    Ok(())
}

fn cmd_baseline_list(dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let log = BaselineLog::load(&project.data_dir)?;
    let newest_first: Vec<_> = log.all().iter().rev().collect();

    if json {
        let out: Vec<BaselineJson> = newest_first.iter().map(|b| baseline_to_json(b)).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if newest_first.is_empty() {
        println!("(no baselines)");
    } else {
        for baseline in newest_first {
            println!("{}", format_baseline_line(baseline));
        }
    }
    Ok(())
}

fn cmd_baseline_show(args: BaselineShowArgs, dir: Option<&str>, json: bool) -> CmdResult {
    let project = load_project_from(dir)?;
    let log = BaselineLog::load(&project.data_dir)?;
    let baseline = match args.version {
        Some(v) => log.get(v).ok_or_else(|| format!("no baseline version {}", v))?,
        None => log.active().ok_or("no active baseline")?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(baseline)?);
    } else {
        let codes: std::collections::HashMap<&str, &str> = project
            .wbs
            .iter()
            .map(|n| (n.id.as_str(), n.code.as_str()))
            .collect();
        let label = |id: &str| codes.get(id).map_or_else(|| id.to_string(), |c| c.to_string());
        print_lines(&format_baseline(baseline, label));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::wbs::WbsNode;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn config(program: Option<(&str, &str)>) -> ProjectConfig {
        let mut config: ProjectConfig = toml::from_str("[project]\nname = \"t\"\n").unwrap();
        if let Some((from, to)) = program {
            config.program.from = Some(d(from));
            config.program.to = Some(d(to));
        }
        config
    }

    #[test]
    fn test_window_defaults_to_two_weeks_from_monday() {
        let range = WindowRange::default();
        // 2026-02-18 is a Wednesday
        let window = resolve_window(&range, &config(None), d("2026-02-18")).unwrap();
        assert_eq!(window, (d("2026-02-16"), d("2026-03-01")));
    }

    #[test]
    fn test_window_prefers_args_then_program() {
        let cfg = config(Some(("2026-01-01", "2026-07-31")));
        let today = d("2026-02-18");
        assert_eq!(
            resolve_window(&WindowRange::default(), &cfg, today).unwrap(),
            (d("2026-01-01"), d("2026-07-31"))
        );
        let range = WindowRange {
            from: Some(d("2026-03-02")),
            to: None,
        };
        assert_eq!(
            resolve_window(&range, &cfg, today).unwrap(),
            (d("2026-03-02"), d("2026-03-15"))
        );
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let range = WindowRange {
            from: Some(d("2026-03-02")),
            to: Some(d("2026-03-01")),
        };
        assert!(resolve_window(&range, &config(None), d("2026-02-18")).is_err());
    }

    #[test]
    fn test_window_at_calendar_edge_is_an_error() {
        let range = WindowRange {
            from: Some(NaiveDate::MAX),
            to: None,
        };
        let err = resolve_window(&range, &config(None), d("2026-02-18")).unwrap_err();
        assert!(err.contains("leaves the calendar"));

        let range = WindowRange {
            from: None,
            to: Some(NaiveDate::MIN),
        };
        assert!(resolve_window(&range, &config(None), d("2026-02-18")).is_err());
    }

    #[test]
    fn test_resolve_item_by_id_or_code() {
        let tree = build_tree(vec![
            WbsNode::new("cw", None, "CW", "Curtain wall").summary(),
            WbsNode::new("cw1", Some("cw"), "CW-01", "East"),
        ])
        .unwrap();
        assert_eq!(resolve_item(&tree, "cw1").unwrap(), "cw1");
        assert_eq!(resolve_item(&tree, "CW-01").unwrap(), "cw1");
        assert!(resolve_item(&tree, "CW-99").is_err());
    }

    #[test]
    fn test_parse_timed_edits() {
        let text = "\
# replayed from the grid
{\"at_ms\": 0, \"item\": \"CW-01\", \"date\": \"2026-02-17\", \"value\": 5}

{\"at_ms\": 120, \"item_id\": \"cw2\", \"date\": \"2026-02-17\", \"value\": 9.5}
";
        let edits = parse_timed_edits(text).unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[1].item, "cw2");
        assert_eq!(edits[1].at_ms, 120);
        assert_eq!(edits[1].value, 9.5);

        let err = parse_timed_edits("{\"item\": \"a\"}\n").unwrap_err();
        assert!(err.starts_with("line 1:"));
    }
}
