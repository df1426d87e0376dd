use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use daylog::aggregate::RangeWindow;
use daylog::config::Config;
use daylog::draft::DayEditor;
use daylog::hierarchy::{day_tree, SlotPath};
use daylog::models::{Category, DayMetaPatch, Granularity, Mood, NewEntry};
use daylog::state::TimeLog;
use daylog::{api, clock, db, render};

#[derive(Parser)]
#[command(name = "daylog")]
#[command(about = "Log how your day is spent, block by block (UTC+8)")]
struct Cli {
    /// Remote store URL (overrides DAYLOG_URL)
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Owner identity on the remote store (overrides DAYLOG_OWNER)
    #[arg(long, global = true)]
    owner: Option<String>,

    /// API key for the remote store (overrides DAYLOG_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Local data directory (overrides DAYLOG_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a day's blocks, entries and notes
    Day {
        /// YYYY-MM-DD, defaults to today
        date: Option<String>,

        /// Tree depth: 1 blocks, 2 hours, 3 quarters
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
    /// Log an entry against a slot or a custom range
    Log {
        /// Slot path such as 1, 1.3 or 1.3.2
        #[arg(long, conflicts_with_all = ["start", "end"])]
        slot: Option<String>,

        /// Start time HH:MM
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// End time HH:MM; an end at or before the start means the next day
        #[arg(long, requires = "start")]
        end: Option<String>,

        #[arg(short, long)]
        category: String,

        #[arg(short, long)]
        note: Option<String>,

        #[arg(short, long)]
        date: Option<String>,
    },
    /// Delete an entry
    Rm { id: Uuid },
    /// Show or edit a day's wake time, mood, goal and review
    Meta {
        #[arg(short, long)]
        date: Option<String>,
        #[arg(long)]
        wake: Option<String>,
        #[arg(long)]
        mood: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        review: Option<String>,
    },
    /// Totals per category over a window ending at a date
    Stats {
        #[arg(short, long)]
        date: Option<String>,

        /// Window length: 1, 3, 7 or 30
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Totals per category for a calendar month
    Month {
        /// YYYY-MM, defaults to the current month
        month: Option<String>,
    },
    /// Record use of a note
    Note { text: String },
    /// Recently used notes
    Notes {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Note suggestions for a category
    Suggest {
        category: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage note templates
    Template {
        #[command(subcommand)]
        action: TemplateCommand,
    },
    /// Write all data as JSON
    Export {
        /// Output file, defaults to stdout
        path: Option<PathBuf>,
    },
    /// Replace all data with a JSON export
    Import { path: PathBuf },
    /// Run the remote store server
    Serve {
        #[arg(short, long, default_value = "17020")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// SQLite file, defaults to the platform data directory
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    Add { category: String, text: String },
    Rm { category: String, text: String },
    List { category: Option<String> },
}

/// Initialize tracing to stderr (CLI commands) or stdout (server)
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "daylog=info,tower_http=info".into()),
    );

    if use_stderr {
        // Keep stdout for command output such as `export`.
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let serving = matches!(cli.command, Commands::Serve { .. });
    init_tracing(!serving);

    let command = match cli.command {
        Commands::Serve { port, bind, db } => return serve(&bind, port, db).await,
        command => command,
    };

    let mut config = Config::from_env()?;
    if cli.remote.is_some() {
        config.remote_url = cli.remote;
    }
    if cli.owner.is_some() {
        config.owner = cli.owner;
    }
    if cli.api_key.is_some() {
        config.api_key = cli.api_key;
    }
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }

    let repo = config.backend()?.connect().await?;
    let log = Arc::new(TimeLog::open(repo).await?);
    tracing::debug!("Session started with {} backend", log.backend());

    run(command, &config, log).await
}

async fn serve(bind: &str, port: u16, path: Option<PathBuf>) -> anyhow::Result<()> {
    let db = match path {
        Some(path) => db::Database::open(path)?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    let app = api::create_router_with_config(db, api::SecurityConfig::from_env());

    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("daylog store listening on http://{}/api/v1", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run(command: Commands, config: &Config, log: Arc<TimeLog>) -> anyhow::Result<()> {
    match command {
        Commands::Day { date, depth } => {
            let date = date_arg(date.as_deref())?;
            let meta = log.get_or_create_day(date).await?;
            let tree = day_tree(date);
            print!(
                "{}",
                render::render_day(date, &tree, depth.clamp(1, 3), |slot| log
                    .slot_categories(slot))
            );
            println!();
            print!("{}", render::render_day_meta(&meta));
            print!("{}", render::render_entries(&log.entries_on(date)));
            println!("{}", render::legend());
        }
        Commands::Log {
            slot,
            start,
            end,
            category,
            note,
            date,
        } => {
            let date = date_arg(date.as_deref())?;
            let category = category_arg(&category)?;
            let input = match (slot, start, end) {
                (Some(path), _, _) => {
                    let slot = SlotPath::parse(&path)
                        .and_then(|p| p.resolve(date))
                        .with_context(|| format!("No slot {} in the day", path))?;
                    NewEntry {
                        start: slot.start,
                        end: slot.end,
                        granularity: slot.granularity,
                        category,
                        note_text: note,
                    }
                }
                (None, Some(start), Some(end)) => custom_range(date, &start, &end, category, note)?,
                _ => bail!("Give either --slot or both --start and --end"),
            };
            let entry = log.add_entry(input).await?;
            println!("Logged {}", entry.id);
            print!("{}", render::render_entries(&[entry]));
        }
        Commands::Rm { id } => {
            log.remove_entry(id).await?;
            println!("Removed {}", id);
        }
        Commands::Meta {
            date,
            wake,
            mood,
            goal,
            review,
        } => {
            let date = date_arg(date.as_deref())?;
            let mood = mood.as_deref().map(mood_arg).transpose()?;
            let patch = DayMetaPatch {
                wake_time: wake,
                mood,
                goal,
                review,
            };
            let editor = DayEditor::open(log.clone(), date, config.autosave_delay()).await?;
            if !patch.is_empty() {
                editor.edit(&patch);
                editor.commit_now().await?;
            }
            let meta = editor.committed();
            println!("{}", meta.date);
            print!("{}", render::render_day_meta(&meta));
        }
        Commands::Stats { date, days } => {
            let anchor = date_arg(date.as_deref())?;
            let window = RangeWindow::from_days(days)
                .with_context(|| format!("Unsupported window of {} days; use 1, 3, 7 or 30", days))?;
            let stats = log.range_stats(anchor, window);
            print!("{}", render::render_stats(&stats));
            println!();
            print!("{}", render::render_daily(&stats));
        }
        Commands::Month { month } => {
            let (year, month) = match month {
                Some(raw) => month_arg(&raw)?,
                None => {
                    let today = clock::today();
                    (today.year(), today.month())
                }
            };
            let stats = log.month_stats(year, month);
            print!("{}", render::render_stats(&stats));
        }
        Commands::Note { text } => {
            let note = log.upsert_note(&text).await?;
            print!("{}", render::render_notes(&[note]));
        }
        Commands::Notes { limit } => {
            print!("{}", render::render_notes(&log.recent_notes(limit)));
        }
        Commands::Suggest { category, limit } => {
            for text in log.suggestions(category_arg(&category)?, limit) {
                println!("{}", text);
            }
        }
        Commands::Template { action } => match action {
            TemplateCommand::Add { category, text } => {
                if !log.add_template(category_arg(&category)?, &text).await? {
                    println!("Already listed");
                }
            }
            TemplateCommand::Rm { category, text } => {
                if !log.remove_template(category_arg(&category)?, &text).await? {
                    println!("Not listed");
                }
            }
            TemplateCommand::List { category } => {
                let only = category.as_deref().map(category_arg).transpose()?;
                for (category, texts) in log.templates().iter() {
                    if only.is_some_and(|c| c != category) {
                        continue;
                    }
                    println!("{} {}", render::category_symbol(category), category.as_str());
                    for text in texts {
                        println!("  {}", text);
                    }
                }
            }
        },
        Commands::Export { path } => {
            let json = log.export_json()?;
            match path {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!("Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Import { path } => {
            let json = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let stored = log.import_json(&json).await?;
            println!(
                "Imported {} days, {} entries, {} notes",
                stored.days.len(),
                stored.entries.len(),
                stored.notes.len()
            );
        }
        Commands::Serve { .. } => bail!("serve does not run inside a session"),
    }
    Ok(())
}

fn date_arg(raw: Option<&str>) -> anyhow::Result<NaiveDate> {
    match raw {
        Some(s) => clock::parse_date(s).with_context(|| format!("Invalid date {:?}, expected YYYY-MM-DD", s)),
        None => Ok(clock::today()),
    }
}

fn category_arg(raw: &str) -> anyhow::Result<Category> {
    Category::from_str(&raw.to_lowercase()).with_context(|| {
        format!(
            "Unknown category {:?}; use productivity, investment, consumption or waste",
            raw
        )
    })
}

fn mood_arg(raw: &str) -> anyhow::Result<Mood> {
    Mood::from_str(&raw.to_lowercase()).with_context(|| format!("Unknown mood {:?}", raw))
}

fn month_arg(raw: &str) -> anyhow::Result<(i32, u32)> {
    let parsed = raw
        .split_once('-')
        .and_then(|(y, m)| Some((y.parse().ok()?, m.parse().ok()?)))
        .filter(|&(_, m): &(i32, u32)| (1..=12).contains(&m));
    parsed.with_context(|| format!("Invalid month {:?}, expected YYYY-MM", raw))
}

/// An entry from wall-clock times on `date`. An end at or before the start
/// falls on the next day.
fn custom_range(
    date: NaiveDate,
    start: &str,
    end: &str,
    category: Category,
    note: Option<String>,
) -> anyhow::Result<NewEntry> {
    let clock_of = |s: &str| {
        clock::parse_clock(s).with_context(|| format!("Invalid time {:?}, expected HH:MM", s))
    };
    let (sh, sm) = clock_of(start)?;
    let (eh, em) = clock_of(end)?;

    let start = clock::instant_at(date, sh, sm, 0);
    let mut end = clock::instant_at(date, eh, em, 0);
    if end <= start {
        end = clock::add_minutes(end, clock::MINUTES_PER_DAY);
    }

    let granularity = match clock::minutes_between(&start, &end) {
        m if m <= 15 => Granularity::Quarter,
        m if m <= 60 => Granularity::Hour,
        _ => Granularity::Big,
    };
    Ok(NewEntry {
        start,
        end,
        granularity,
        category,
        note_text: note,
    })
}
