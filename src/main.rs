//! Command-line front end: opens the configured store and exposes the
//! repository operations and PDF export as subcommands.
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, Timelike};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use piece_assignment::db::{end_of_day, start_of_day};
use piece_assignment::report::{self, describe_filters, report_folder, suggested_file_name};
use piece_assignment::{
    load_config, EventBus, PieceDraft, ReportCriteria, ReportHeader, ReportRow, Repository,
    SortDirection, SortKey, Store,
};

const REPORT_TITLE: &str = "Piece Report";

#[derive(Parser)]
#[command(name = "piece-assignment", about = "Track piece assignments and export PDF reports")]
struct Cli {
    /// Configuration file. Defaults to config.toml in the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, seeding default users on first creation.
    Init,
    /// List users.
    Users,
    /// List statuses.
    Statuses,
    /// Add a user.
    AddUser {
        name: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Add a status.
    AddStatus { name: String },
    /// Create or update a piece by code.
    Piece {
        code: String,
        #[arg(long)]
        description: Option<String>,
        /// User id, username or name.
        #[arg(long)]
        user: Option<String>,
        /// Status id or name.
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        photo: Option<String>,
    },
    /// Print the report rows matching the filters.
    List(ReportArgs),
    /// Render the report rows matching the filters to PDF.
    Export {
        #[command(flatten)]
        filters: ReportArgs,
        /// Output file. Defaults to a dated folder under the reports root.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ReportArgs {
    /// Code contains (case-sensitive).
    #[arg(long)]
    code: Option<String>,
    /// Description contains (case-sensitive).
    #[arg(long)]
    description: Option<String>,
    /// User id, username or name.
    #[arg(long)]
    user: Option<String>,
    /// Status id or name.
    #[arg(long)]
    status: Option<String>,
    /// First registration day, inclusive (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last registration day, inclusive (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t = OrderArg::Date)]
    order: OrderArg,
    /// Sort ascending instead of descending.
    #[arg(long)]
    asc: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Code,
    Description,
    User,
    Status,
    Date,
}

impl From<OrderArg> for SortKey {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Code => Self::Code,
            OrderArg::Description => Self::Description,
            OrderArg::User => Self::User,
            OrderArg::Status => Self::Status,
            OrderArg::Date => Self::RegisteredAt,
        }
    }
}

/// Criteria plus the display labels of the selected user and status.
struct ResolvedFilters {
    criteria: ReportCriteria,
    user_label: Option<String>,
    status_label: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let store = Store::initialize(&config.database_path, config.seed_default_users)
        .with_context(|| format!("failed to open database at {}", config.database_path.display()))?;
    let repo = Repository::new(store, EventBus::new());

    match cli.command {
        Commands::Init => println!("{}", repo.store().path().display()),
        Commands::Users => {
            for user in repo.list_users()? {
                println!("{}\t{}", user.id, user);
            }
        }
        Commands::Statuses => {
            for status in repo.list_statuses()? {
                println!("{}\t{}", status.id, status);
            }
        }
        Commands::AddUser { name, username } => {
            let user = repo.add_user(&name, username.as_deref())?;
            println!("{}", user.id);
        }
        Commands::AddStatus { name } => match repo.add_status(&name)? {
            Some(status) => println!("{}", status.id),
            None => bail!("status name is required"),
        },
        Commands::Piece {
            code,
            description,
            user,
            status,
            photo,
        } => {
            let existing = repo.find_piece(code.trim())?;
            let mut draft = existing
                .as_ref()
                .map(PieceDraft::from)
                .unwrap_or_else(|| PieceDraft::new(code.trim()));
            if let Some(description) = description {
                draft = draft.description(description);
            }
            if let Some(user) = user {
                draft = draft.user(Some(resolve_user(&repo, &user)?.0));
            }
            if let Some(status) = status {
                draft = draft.status(Some(resolve_status(&repo, &status)?.0));
            }
            if photo.is_some() {
                draft = draft.photo(photo);
            }
            let piece = repo.upsert_piece(&draft)?;
            println!("{}", piece.code);
        }
        Commands::List(filters) => {
            let filters = resolve_filters(&repo, &filters)?;
            for entry in repo.query_report(&filters.criteria)? {
                let row = ReportRow::from(&entry);
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    row.code, row.description, row.user, row.status, row.date
                );
            }
        }
        Commands::Export { filters, out } => {
            let filters = resolve_filters(&repo, &filters)?;
            let user_label = filters.user_label.as_deref();
            let status_label = filters.status_label.as_deref();
            let now = Local::now().naive_local();
            let now = now.with_nanosecond(0).unwrap_or(now);

            let path = match out {
                Some(path) => path,
                None => {
                    let folder =
                        report_folder(&config.reports_root, user_label, status_label, now.date());
                    fs::create_dir_all(&folder).with_context(|| {
                        format!("failed to create report folder {}", folder.display())
                    })?;
                    folder.join(suggested_file_name(user_label, status_label, now))
                }
            };

            let rows: Vec<ReportRow> = repo
                .query_report(&filters.criteria)?
                .iter()
                .map(ReportRow::from)
                .collect();
            let header = ReportHeader {
                title: REPORT_TITLE.to_string(),
                filters: Some(describe_filters(&filters.criteria, user_label, status_label)),
                generated_at: now,
            };
            report::export(&path, &rows, &header)
                .with_context(|| format!("failed to export report to {}", path.display()))?;
            info!(rows = rows.len(), "report written");
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn resolve_filters(repo: &Repository, args: &ReportArgs) -> Result<ResolvedFilters> {
    let mut criteria = ReportCriteria::default().order_by(
        args.order.into(),
        if args.asc {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        },
    );
    if let Some(code) = &args.code {
        criteria = criteria.code_contains(code.trim());
    }
    if let Some(description) = &args.description {
        criteria = criteria.description_contains(description.trim());
    }
    criteria = criteria.registered_between(args.from.map(start_of_day), args.to.map(end_of_day));

    let mut user_label = None;
    if let Some(user) = &args.user {
        let (id, label) = resolve_user(repo, user)?;
        criteria = criteria.user(id);
        user_label = Some(label);
    }
    let mut status_label = None;
    if let Some(status) = &args.status {
        let (id, label) = resolve_status(repo, status)?;
        criteria = criteria.status(id);
        status_label = Some(label);
    }

    Ok(ResolvedFilters {
        criteria,
        user_label,
        status_label,
    })
}

/// Match a user by id, username or name. Returns the id and display label.
fn resolve_user(repo: &Repository, needle: &str) -> Result<(Uuid, String)> {
    let needle = needle.trim();
    let id = Uuid::parse_str(needle).ok();
    repo.list_users()?
        .into_iter()
        .find(|user| {
            Some(user.id) == id
                || user.username.as_deref() == Some(needle)
                || user.name == needle
        })
        .map(|user| (user.id, user.to_string()))
        .with_context(|| format!("no user matches {needle:?}"))
}

fn resolve_status(repo: &Repository, needle: &str) -> Result<(Uuid, String)> {
    let needle = needle.trim();
    let id = Uuid::parse_str(needle).ok();
    repo.list_statuses()?
        .into_iter()
        .find(|status| Some(status.id) == id || status.name == needle)
        .map(|status| (status.id, status.name))
        .with_context(|| format!("no status matches {needle:?}"))
}
