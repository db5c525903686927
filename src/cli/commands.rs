use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cg", about = concat!("crewgrid v", env!("CARGO_PKG_VERSION"), " - crew allocation by WBS item and day"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different project directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new crewgrid project in the current directory
    Init(InitArgs),
    /// Show the allocation matrix for a date window
    Grid(GridArgs),
    /// Show the numbered WBS hierarchy
    Tree,
    /// Validate the WBS and stored allocations
    Check,
    /// Show project progress and period KPIs
    Summary(SummaryArgs),
    /// Set the actual manpower of one cell
    Set(SetArgs),
    /// Replay a timed stream of cell edits through the debounced writer
    Apply(ApplyArgs),
    /// Decode and summarize an AI result payload
    Insight(InsightArgs),
    /// Change the default program window or the fixed "today"
    Window(WindowArgs),
    /// Capture, list and inspect planned-crew baselines
    Baseline(BaselineCmd),
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Project name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// First day of the program window
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day of the program window
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// Reinitialize even if crewgrid/ already exists
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

/// Date window shared by read commands. Unset bounds fall back to the
/// program window in project.toml, then to two weeks from this Monday.
#[derive(Args, Clone, Default)]
pub struct WindowRange {
    /// First visible day (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last visible day (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[derive(Args)]
pub struct GridArgs {
    #[command(flatten)]
    pub range: WindowRange,
    /// Column granularity: day, week, month
    #[arg(long, default_value = "day")]
    pub view: String,
    /// Case-insensitive text matched against code and name
    #[arg(long)]
    pub search: Option<String>,
    /// Keep only rows at this level (repeatable)
    #[arg(long = "level")]
    pub levels: Vec<u32>,
    /// Keep only rows in this building (repeatable)
    #[arg(long = "building")]
    pub buildings: Vec<String>,
    /// Keep only rows with this WBS status (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<String>,
    /// Keep only rows whose target week contains this text
    #[arg(long)]
    pub target: Option<String>,
    /// Minimum progress in percent
    #[arg(long)]
    pub min_progress: Option<f64>,
    /// Maximum progress in percent
    #[arg(long)]
    pub max_progress: Option<f64>,
    /// Collapse this group, by id or code (repeatable)
    #[arg(long = "collapse")]
    pub collapse: Vec<String>,
}

#[derive(Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub range: WindowRange,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct SetArgs {
    /// WBS item, by id or code
    pub item: String,
    /// Day of the cell (YYYY-MM-DD)
    pub date: NaiveDate,
    /// Actual manpower
    pub value: f64,
    /// Quantity completed that day
    #[arg(long)]
    pub qty_done: Option<f64>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// JSON-lines file of {"at_ms", "item", "date", "value", "qty_done"?}; `-` for stdin
    pub file: String,
}

#[derive(Args)]
pub struct InsightArgs {
    /// Payload kind: optimization, report, digest
    pub kind: String,
    /// JSON file; `-` for stdin
    pub file: String,
}

#[derive(Args)]
pub struct WindowArgs {
    /// First day of the program window
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,
    /// Last day of the program window
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
    /// Pin "today" to a fixed date
    #[arg(long, conflicts_with = "clear_today")]
    pub today: Option<NaiveDate>,
    /// Go back to the local date for "today"
    #[arg(long)]
    pub clear_today: bool,
}

// ---------------------------------------------------------------------------
// Baseline args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct BaselineCmd {
    #[command(subcommand)]
    pub action: BaselineAction,
}

#[derive(Subcommand)]
pub enum BaselineAction {
    /// Snapshot the allocated crew as the new active plan
    Create(BaselineCreateArgs),
    /// List baselines, newest first
    List,
    /// Show one baseline's plan (default: the active one)
    Show(BaselineShowArgs),
}

#[derive(Args)]
pub struct BaselineCreateArgs {
    /// Baseline name
    pub name: String,
    /// Free-text notes
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args)]
pub struct BaselineShowArgs {
    /// Version number
    pub version: Option<u32>,
}
