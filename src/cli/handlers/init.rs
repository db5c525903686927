use std::fs;

use crate::cli::commands::InitArgs;
use crate::io::project_io::{self, DATA_DIR};

const PROJECT_TOML_TEMPLATE: &str = r##"[project]
name = "{name}"

# Default date window for `cg grid` and `cg summary`.
# Dates must be quoted. Change with: cg window --from <date> --to <date>
[program]
{program}
[grid]
# Quiet period before queued cell edits are written, in milliseconds
debounce_ms = 500
# Largest actual manpower accepted for one cell
max_manpower = 200
# Origin tag on written batches: "grid" or "chat"
source = "grid"

[clock]
# Pin "today" (future cells, default window). Unset means the local date.
# today = "2026-02-18"
"##;

const EMPTY_JSON_ARRAY: &str = "[]\n";

/// Infer a project name from a directory name: replace hyphens with spaces, title-case.
fn infer_name(dir_name: &str) -> String {
    dir_name
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    upper + &chars.collect::<String>()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render project.toml, with the program window filled in or left as a
/// commented example
fn render_project_toml(name: &str, window: Option<(chrono::NaiveDate, chrono::NaiveDate)>) -> String {
    let program = match window {
        Some((from, to)) => format!("from = \"{}\"\nto = \"{}\"\n", from, to),
        None => "# from = \"2026-01-01\"\n# to = \"2026-07-31\"\n".to_string(),
    };
    PROJECT_TOML_TEMPLATE
        .replace("{name}", &name.replace('"', "\\\""))
        .replace("{program}", &program)
}

pub fn cmd_init(args: InitArgs, dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = match dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            fs::canonicalize(dir)?
        }
        None => std::env::current_dir()?,
    };
    let data_dir = cwd.join(DATA_DIR);

    // Check if already initialized
    if data_dir.join("project.toml").exists() && !args.force {
        return Err("crewgrid project already exists in ./crewgrid/ (use --force to reinitialize)".into());
    }

    // Check for parent project and warn
    if let Some(parent) = cwd.parent()
        && let Ok(parent_root) = project_io::discover_project(parent)
    {
        let parent_data = parent_root.join(DATA_DIR);
        eprintln!("Note: parent project found at {}/", parent_data.display());
        eprintln!("Creating new project in ./{}/", DATA_DIR);
    }

    let window = match (args.from, args.to) {
        (Some(from), Some(to)) if from > to => {
            return Err(format!("window starts after it ends: {} > {}", from, to).into());
        }
        (Some(from), Some(to)) => Some((from, to)),
        (None, None) => None,
        _ => return Err("--from and --to must be given together".into()),
    };

    // Infer project name
    let name = args.name.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .map(infer_name)
            .unwrap_or_else(|| "Untitled".to_string())
    });

    fs::create_dir_all(&data_dir)?;
    fs::write(data_dir.join("project.toml"), render_project_toml(&name, window))?;

    // Keep existing data on --force; only the config is rewritten
    for file in ["wbs.json", "allocations.json"] {
        let path = data_dir.join(file);
        if !path.exists() {
            fs::write(path, EMPTY_JSON_ARRAY)?;
        }
    }

    println!("Initialized crewgrid project: {}", name);
    if let Some((from, to)) = window {
        println!("  program window: {} .. {}", from, to);
    }
    Ok(())
}
