//! # Spark CLI (`spark`)
//!
//! The `spark` binary ingests calendars, feeds, weather forecasts and
//! contacts into a local SQLite database and turns the entries around
//! today into an LLM-written summary.
//!
//! ## Usage
//!
//! ```bash
//! spark --config ./spark.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `spark init` | Create the SQLite database and run schema migrations |
//! | `spark sources list\|add\|delete\|replace-entries` | Manage sources |
//! | `spark entries list\|add\|show\|delete` | Manage individual entries |
//! | `spark ical2entry <source> <url> [collection]` | Sync a calendar into a source |
//! | `spark rss2entry <source> <url>` | Sync an RSS or Atom feed into a source |
//! | `spark weather2entry <source> <location>` | Sync a weather forecast into a source |
//! | `spark vcf2entry <source> <file>` | Sync contact birthdays into a source |
//! | `spark print` | Print a summary |
//! | `spark chat` | Ask questions about the entries |
//! | `spark mail <recipients>...` | Mail a summary |
//! | `spark md2html` / `spark md2text` | Render Markdown |
//!
//! ## Examples
//!
//! ```bash
//! # Register a source and fill it from a calendar
//! spark sources add work --description "Work calendar"
//! spark ical2entry work https://calendar.example.com/work.ics
//!
//! # Weather for the coming week
//! spark sources add weather
//! spark weather2entry weather "Brussels, Belgium"
//!
//! # Morning summary by mail
//! spark mail --subject "Good morning" me@example.com
//! ```

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use spark::config::{self, Config};
use spark::connector_ical::DEFAULT_COLLECTION;
use spark::connector_weather::{ForecastRange, FORECAST_URL};
use spark::db;
use spark::digest::{self, MailBody, DEFAULT_DAYS_AHEAD, DEFAULT_DAYS_BACK, DEFAULT_SUBJECT};
use spark::entries::{self, NewEntry, MANUAL_SOURCE};
use spark::fetch;
use spark::geocoder::NominatimGeocoder;
use spark::ingest::{self, SyncContext, SyncRequest};
use spark::mailer::Mailer;
use spark::markdown;
use spark::models::EntryFilter;
use spark::prompts::{PromptContext, PromptFormat};
use spark::sources;
use spark::store::SqliteStore;
use spark::summarizer;
use spark::timeparse;

/// Spark, a personal assistant that summarizes your calendars, feeds,
/// weather and birthdays.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `spark.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "spark",
    about = "Spark, a personal assistant digest generator",
    version,
    long_about = "Spark ingests calendars (iCal), RSS/Atom feeds, weather forecasts and vCard \
    birthdays into a local SQLite database, keeping each source an exact snapshot of its feed, \
    and asks an LLM (Gemini, OpenAI or Ollama) to summarize what matters today."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, env = "SPARK_CONFIG", default_value = "./spark.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Manage individual entries.
    Entries {
        #[command(subcommand)]
        action: EntriesAction,
    },

    /// Manage sources.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Replace the entries of a source with the events of a calendar.
    #[command(name = "ical2entry")]
    Ical2Entry {
        /// Source name.
        source: String,
        /// Path or URL of the `.ics` document.
        url: String,
        /// Collection name stored in each entry's metadata.
        collection: Option<String>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Replace the entries of a source with the items of an RSS or Atom feed.
    #[command(name = "rss2entry")]
    Rss2Entry {
        source: String,
        url: String,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Replace the entries of a source with a daily weather forecast.
    #[command(name = "weather2entry")]
    Weather2Entry {
        source: String,
        /// Free-text location, resolved with OpenStreetMap Nominatim.
        location: String,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Replace the entries of a source with the birthdays in a vCard file.
    #[command(name = "vcf2entry")]
    Vcf2Entry {
        source: String,
        /// Path or URL of the `.vcf` file.
        file: String,
    },

    /// Print a summary of the entries around today.
    Print {
        /// Summary format: `today`, `week` or `full`.
        #[arg(short, long, default_value = "full")]
        format: String,
        /// Extra question or instruction for the assistant (repeatable).
        #[arg(short, long = "prompt")]
        prompts: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Ask questions about the entries around today.
    Chat {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Mail a summary to one or more recipients.
    Mail {
        #[arg(required = true)]
        recipients: Vec<String>,
        #[arg(long, default_value = DEFAULT_SUBJECT)]
        subject: String,
        /// Send this Markdown file or URL instead of generating a summary.
        #[arg(long)]
        input: Option<String>,
        #[arg(short, long, default_value = "full")]
        format: String,
        #[arg(short, long = "prompt")]
        prompts: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Convert Markdown to HTML. Reads stdin when no input is given.
    #[command(name = "md2html")]
    Md2Html { input: Option<String> },

    /// Convert Markdown to plain text.
    #[command(name = "md2text")]
    Md2Text { input: String },
}

/// `--days-back` / `--days-ahead`; each command has its own defaults.
#[derive(clap::Args, Clone, Copy)]
struct WindowArgs {
    /// Number of days in the past to include.
    #[arg(short = 'b', long)]
    days_back: Option<u32>,
    /// Number of days in the future to include.
    #[arg(short = 'a', long)]
    days_ahead: Option<u32>,
}

impl WindowArgs {
    fn or(self, days_back: u32, days_ahead: u32) -> (u32, u32) {
        (
            self.days_back.unwrap_or(days_back),
            self.days_ahead.unwrap_or(days_ahead),
        )
    }

    fn summary_filter(self) -> EntryFilter {
        let (back, ahead) = self.or(DEFAULT_DAYS_BACK, DEFAULT_DAYS_AHEAD);
        EntryFilter::window(back, ahead)
    }
}

#[derive(Subcommand)]
enum EntriesAction {
    /// List entries, oldest first.
    List {
        /// Only entries of this source.
        #[arg(short, long)]
        source: Option<String>,
        #[arg(short = 'b', long)]
        days_back: Option<u32>,
        #[arg(short = 'a', long)]
        days_ahead: Option<u32>,
    },
    /// Add an entry.
    Add {
        /// Title of the entry.
        #[arg(short, long)]
        title: String,
        /// `low`, `medium` or `high`.
        #[arg(short, long, default_value = "medium")]
        importance: String,
        /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` or RFC 3339; today when omitted.
        #[arg(short, long)]
        date: Option<String>,
        #[arg(short, long, default_value = MANUAL_SOURCE)]
        source: String,
        /// Metadata as `key=value` pairs.
        #[arg(short, long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,
    },
    /// Show one entry with its metadata.
    Show { id: i64 },
    /// Delete one entry.
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List sources with their entry counts.
    List,
    /// Add a source.
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Delete a source and all of its entries.
    Delete { name: String },
    /// Replace the entries of a source with the contents of a JSON file.
    ReplaceEntries {
        name: String,
        /// Path or URL of a JSON array of entries.
        file: String,
    },
}

/// Parse a `key=value` pair for `--meta` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Md2Html { input } => {
            let md = read_markdown(input.as_deref()).await?;
            print!("{}", markdown::to_html(&md));
            return Ok(());
        }
        Commands::Md2Text { input } => {
            let md = read_markdown(Some(input)).await?;
            print!("{}", markdown::to_text(&md));
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    let tz = timeparse::resolve_local_timezone(cfg.timezone.as_deref())?;
    let store = db::open_store(&cfg, tz).await?;
    let client = fetch::http_client(Duration::from_secs(cfg.llm.timeout_secs))?;
    let geocoder = NominatimGeocoder::new(client.clone());
    let ctx = SyncContext {
        store: &store,
        client: &client,
        geocoder: &geocoder,
        tz,
        forecast_url: FORECAST_URL.to_string(),
    };

    let result = run(cli.command, &cfg, &store, &ctx).await;
    store.pool().close().await;
    result
}

async fn run(
    command: Commands,
    cfg: &Config,
    store: &SqliteStore,
    ctx: &SyncContext<'_>,
) -> Result<()> {
    let tz = ctx.tz;
    let today = Utc::now().with_timezone(&tz).date_naive();

    match command {
        Commands::Init => {
            println!("Database initialized successfully.");
        }
        Commands::Entries { action } => match action {
            EntriesAction::List {
                source,
                days_back,
                days_ahead,
            } => {
                let filter = EntryFilter {
                    source,
                    days_back,
                    days_ahead,
                };
                entries::run_list(store, &filter, Utc::now()).await?;
            }
            EntriesAction::Add {
                title,
                importance,
                date,
                source,
                metadata,
            } => {
                let new = NewEntry {
                    source,
                    date,
                    importance,
                    summary: title,
                    metadata,
                };
                entries::run_add(store, &tz, new).await?;
            }
            EntriesAction::Show { id } => entries::run_show(store, id).await?,
            EntriesAction::Delete { id } => entries::run_delete(store, id).await?,
        },
        Commands::Sources { action } => match action {
            SourcesAction::List => sources::run_list(store).await?,
            SourcesAction::Add { name, description } => {
                sources::run_add(store, &name, &description).await?
            }
            SourcesAction::Delete { name } => sources::run_delete(store, &name).await?,
            SourcesAction::ReplaceEntries { name, file } => {
                sources::run_replace_entries(ctx, &name, &file).await?
            }
        },
        Commands::Ical2Entry {
            source,
            url,
            collection,
            window,
        } => {
            let (days_back, days_ahead) = window.or(30, 120);
            let request = SyncRequest::Ical {
                uri: url,
                collection: collection.unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
                days_back,
                days_ahead,
            };
            ingest::run_sync(ctx, &source, &request).await?;
        }
        Commands::Rss2Entry {
            source,
            url,
            window,
        } => {
            let (days_back, days_ahead) = window.or(30, 120);
            let request = SyncRequest::Rss {
                uri: url,
                days_back,
                days_ahead,
            };
            ingest::run_sync(ctx, &source, &request).await?;
        }
        Commands::Weather2Entry {
            source,
            location,
            window,
        } => {
            let range = ForecastRange::default();
            let (days_back, days_ahead) = window.or(range.past_days, range.forecast_days);
            let request = SyncRequest::Weather {
                location,
                days_back,
                days_ahead,
            };
            ingest::run_sync(ctx, &source, &request).await?;
        }
        Commands::Vcf2Entry { source, file } => {
            let request = SyncRequest::Vcard { uri: file };
            ingest::run_sync(ctx, &source, &request).await?;
        }
        Commands::Print {
            format,
            prompts,
            window,
        } => {
            let format: PromptFormat = format.parse()?;
            let context = digest::build_context(store, cfg, &tz, &window.summary_filter(), Utc::now()).await?;
            let summarizer = summarizer::create_summarizer(&cfg.llm, ctx.client.clone())?;
            digest::run_print(summarizer.as_ref(), cfg, format, context, prompts, today).await?;
        }
        Commands::Chat { window } => {
            let context = digest::build_context(store, cfg, &tz, &window.summary_filter(), Utc::now()).await?;
            let summarizer = summarizer::create_summarizer(&cfg.llm, ctx.client.clone())?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            digest::run_chat(summarizer.as_ref(), cfg, context, today, stdin, &mut stdout).await?;
        }
        Commands::Mail {
            recipients,
            subject,
            input,
            format,
            prompts,
            window,
        } => {
            let mailer = Mailer::smtp(&cfg.mail)?;
            match input {
                Some(input) => {
                    let md = fetch::fetch_string(ctx.client, &input).await?;
                    digest::run_mail(None, cfg, &mailer, MailBody::Markdown(md), &recipients, &subject, today)
                        .await?;
                }
                None => {
                    let format: PromptFormat = format.parse()?;
                    let context: PromptContext =
                        digest::build_context(store, cfg, &tz, &window.summary_filter(), Utc::now()).await?;
                    let summarizer = summarizer::create_summarizer(&cfg.llm, ctx.client.clone())?;
                    let body = MailBody::Generated {
                        format,
                        context,
                        questions: prompts,
                    };
                    digest::run_mail(
                        Some(summarizer.as_ref()),
                        cfg,
                        &mailer,
                        body,
                        &recipients,
                        &subject,
                        today,
                    )
                    .await?;
                }
            }
        }
        Commands::Md2Html { .. } | Commands::Md2Text { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

/// Markdown from a path or URL, or from stdin when `input` is `None`.
async fn read_markdown(input: Option<&str>) -> Result<String> {
    match input {
        Some(uri) => {
            let client = fetch::http_client(Duration::from_secs(30))?;
            fetch::fetch_string(&client, uri).await
        }
        None => {
            let mut md = String::new();
            tokio::io::stdin().read_to_string(&mut md).await?;
            Ok(md)
        }
    }
}
