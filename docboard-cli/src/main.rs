use clap::{Parser, Subcommand, ValueEnum};
use docboard::activity::load_activity;
use docboard::backend::SqliteBackend;
use docboard::config::BackendConfig;
use docboard::metrics::{analytics_trends, dashboard_trends, documents_trends};
use docboard::mutation::ActionOutcome;
use docboard::schema::FilterKind;
use docboard::session::{SessionContext, StaticIdentity};
use docboard::view::{FilterValue, SortKey, ViewMode};
use docboard::{
    Config, Document, DocboardError, MutationOrchestrator, RecordStore, Reviewer, ViewEngine,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Docboard CLI: browse and edit dashboard documents from the command line
#[derive(Parser)]
#[command(name = "docboard", version, about)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, env = "DOCBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    /// Act as this user id (required for create)
    #[arg(long, env = "DOCBOARD_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum TrendKind {
    Dashboard,
    Documents,
    Analytics,
}

#[derive(Subcommand)]
enum Command {
    /// Show one page of the document table
    List {
        /// Case-insensitive search on the header
        #[arg(long)]
        search: Option<String>,
        /// Column filters; comma-separate values for set filters (e.g. --filter status=Done,In Process)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Sort keys, applied in order (e.g. --sort target:desc)
        #[arg(long = "sort")]
        sort: Vec<String>,
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Rows per page (10, 20, 30, 40 or 50)
        #[arg(long)]
        page_size: Option<usize>,
        /// Use the compact column layout
        #[arg(long)]
        compact: bool,
    },

    /// Create a document
    Create {
        /// Field values (e.g. --field header="Q3 report" --field status=Done)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update a document
    Update {
        /// Document ID
        id: String,
        /// Field values to change (use reviewer= to clear the reviewer)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a document
    Delete {
        /// Document ID
        id: String,
    },

    /// List reviewers
    Reviewers,

    /// Distinct values of a column with counts
    Facets {
        /// Column id
        column: String,
        /// Column filters, as for `list`
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Compute trend cards
    Trends {
        #[arg(value_enum)]
        kind: TrendKind,
    },

    /// Add reviewers to a SQLite database (existing names are kept)
    SeedReviewers {
        /// Reviewer names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = Config::load(cli.config.as_deref())?;
    match &cli.config {
        Some(path) => log::debug!("Loaded config from {}", path.display()),
        None => log::debug!("Using default config"),
    }

    if let Command::SeedReviewers { names } = &cli.command {
        let BackendConfig::Sqlite { path } = &config.backend else {
            return Err("seed-reviewers only works with the sqlite backend".into());
        };
        let backend = SqliteBackend::open(path)?;
        log::info!("Seeding {} reviewer name(s) into {}", names.len(), path.display());
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let reviewers = backend.seed_reviewers(&names)?;
        return print_output(&reviewers, &cli.format);
    }

    let store = open_store(&config, cli.user.as_deref()).await?;

    match cli.command {
        Command::List {
            search,
            filters,
            sort,
            page,
            page_size,
            compact,
        } => {
            let mode = if compact { ViewMode::Compact } else { ViewMode::Full };
            let mut engine = build_engine(&config, &store, mode, &filters).await?;
            if let Some(search) = search {
                engine.set_filter("header", Some(FilterValue::Text(search)))?;
            }
            let keys = sort.iter().map(String::as_str).map(parse_sort_key).collect();
            engine.set_sorting(keys)?;
            engine.set_page_size(page_size.unwrap_or(config.page_size))?;
            engine.set_page_index(page.saturating_sub(1));
            print_output(&engine.rows(), &cli.format)?;
        }

        Command::Create { fields } => {
            let reviewers = store.list_reviewers().await?;
            let values = apply_fields(Document::blank(), &fields, &reviewers)?;
            let orchestrator = MutationOrchestrator::with_log_notifier(store.clone());
            orchestrator.open_create()?;
            let outcome = orchestrator.submit(values).await?;
            print_output(&finish(outcome)?, &cli.format)?;
        }

        Command::Update { id, fields } => {
            let reviewers = store.list_reviewers().await?;
            let current = find_document(&store, &id).await?;
            let values = apply_fields(current.clone(), &fields, &reviewers)?;
            let orchestrator = MutationOrchestrator::with_log_notifier(store.clone());
            orchestrator.open_edit(current)?;
            let outcome = orchestrator.submit(values).await?;
            print_output(&finish(outcome)?, &cli.format)?;
        }

        Command::Delete { id } => {
            let current = find_document(&store, &id).await?;
            let orchestrator = MutationOrchestrator::with_log_notifier(store.clone());
            orchestrator.open_delete(current)?;
            let outcome = orchestrator.confirm_delete().await?;
            print_output(&finish(outcome)?, &cli.format)?;
        }

        Command::Reviewers => {
            let reviewers = store.list_reviewers().await?;
            print_output(&*reviewers, &cli.format)?;
        }

        Command::Facets { column, filters } => {
            let engine = build_engine(&config, &store, ViewMode::Full, &filters).await?;
            print_output(&engine.facets(&column)?, &cli.format)?;
        }

        Command::Trends { kind } => {
            let cards = match kind {
                TrendKind::Documents => documents_trends(&store.list_documents().await?),
                TrendKind::Dashboard => {
                    let docs = store.list_documents().await?;
                    let activity = fetch_activity(&config).await?;
                    dashboard_trends(&docs, &activity)
                }
                TrendKind::Analytics => analytics_trends(&fetch_activity(&config).await?),
            };
            print_output(&cards, &cli.format)?;
        }

        Command::SeedReviewers { .. } => {}
    }

    Ok(())
}

async fn open_store(config: &Config, user: Option<&str>) -> CliResult<Arc<RecordStore>> {
    let identity = match user {
        Some(id) => StaticIdentity::user(id),
        None => StaticIdentity::anonymous(),
    };
    let session = SessionContext::new(Arc::new(identity));
    session.init().await?;
    Ok(Arc::new(RecordStore::new(config.open_backend()?, session)))
}

async fn build_engine(
    config: &Config,
    store: &RecordStore,
    mode: ViewMode,
    filters: &[(String, String)],
) -> CliResult<ViewEngine> {
    let mut engine = ViewEngine::new(config.table_schema()?, mode)?;
    engine.set_data(store.list_documents().await?);

    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (column, value) in filters {
        grouped.entry(column.as_str()).or_default().push(value.as_str());
    }
    for (column, values) in grouped {
        let kind = engine
            .schema()
            .require_column(column)?
            .filter
            .ok_or_else(|| format!("Column '{column}' is not filterable"))?;
        let value = match kind {
            FilterKind::Contains => FilterValue::Text(values.join(" ")),
            FilterKind::OneOf | FilterKind::ReviewerIn => FilterValue::values(
                values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(str::trim)
                    .filter(|v| !v.is_empty()),
            ),
        };
        engine.set_filter(column, Some(value))?;
    }
    Ok(engine)
}

fn parse_sort_key(spec: &str) -> SortKey {
    match spec.rsplit_once(':') {
        Some((column, "desc")) => SortKey::desc(column),
        Some((column, "asc")) => SortKey::asc(column),
        _ => SortKey::asc(spec),
    }
}

async fn find_document(store: &RecordStore, id: &str) -> CliResult<Document> {
    store
        .list_documents()
        .await?
        .iter()
        .find(|d| d.id == id)
        .cloned()
        .ok_or_else(|| format!("Document '{id}' not found").into())
}

/// Apply `--field` values on top of `doc`. The reviewer may be given by id
/// or by name; an empty value clears it.
fn apply_fields(
    mut doc: Document,
    fields: &[(String, String)],
    reviewers: &[Reviewer],
) -> CliResult<Document> {
    for (key, value) in fields {
        match key.as_str() {
            "header" => doc.header = value.clone(),
            "type" => doc.doc_type = value.parse()?,
            "status" => doc.status = value.parse()?,
            "target" => doc.target = parse_int(key, value)?,
            "limit" => doc.limit = parse_int(key, value)?,
            "reviewer" if value.trim().is_empty() => doc.reviewer = None,
            "reviewer" => {
                let reviewer = reviewers
                    .iter()
                    .find(|r| r.id == *value || r.name == *value)
                    .cloned()
                    .ok_or_else(|| format!("Unknown reviewer '{value}'"))?;
                doc.reviewer = Some(reviewer);
            }
            other => return Err(format!("Unknown field '{other}'").into()),
        }
    }
    Ok(doc)
}

fn parse_int(key: &str, value: &str) -> CliResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("Field '{key}' must be an integer, got '{value}'").into())
}

fn finish(outcome: ActionOutcome) -> CliResult<serde_json::Value> {
    match outcome {
        ActionOutcome::Saved(doc) => Ok(serde_json::to_value(doc)?),
        ActionOutcome::Deleted(id) => Ok(serde_json::json!({ "ok": true, "deleted": id })),
        ActionOutcome::Invalid(result) => {
            let messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            Err(DocboardError::Validation(messages.join("; ")).into())
        }
        ActionOutcome::Failed(e) => Err(e.into()),
    }
}

async fn fetch_activity(config: &Config) -> CliResult<Vec<docboard::ActivitySample>> {
    let source = config.activity_source()?;
    let today = chrono::Local::now().date_naive();
    Ok(load_activity(&source, config.activity.days, today).await?)
}

fn print_output<T: Serialize + ?Sized>(value: &T, format: &OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
