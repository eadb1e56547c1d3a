//! # Spark
//!
//! A personal-assistant digest generator.
//!
//! Spark pulls calendars, RSS/Atom feeds, weather forecasts and vCard
//! birthdays into canonical [`Entry`](models::Entry) records, keeps every
//! source an exact snapshot of its upstream feed, and asks an LLM to write
//! a Markdown summary of what matters around today.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Connectors  │──▶│  Reconcile  │──▶│  SQLite  │
//! │ iCal/RSS/... │   │ fingerprint │   │  store   │
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │  Prompt  │──LLM──▶│ print /  │
//!                 │ context  │        │chat/mail │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! spark init
//! spark sources add work
//! spark ical2entry work https://calendar.example.com/work.ics
//! spark print --format today
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Domain error types |
//! | [`timeparse`] | Date resolution and display formatting |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content-derived entry identity |
//! | [`fetch`] | File and HTTP resource retrieval |
//! | [`geocoder`] | Location search |
//! | [`connector_ical`] | Calendar connector |
//! | [`connector_rss`] | RSS and Atom connector |
//! | [`connector_weather`] | Open-Meteo forecast connector |
//! | [`connector_vcard`] | vCard birthday connector |
//! | [`store`] | Storage trait, SQLite and in-memory backends |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`ingest`] | Reconciliation and sync orchestration |
//! | [`entries`] | Manual entry commands |
//! | [`sources`] | Source commands |
//! | [`prompts`] | Prompt sections and LLM context |
//! | [`summarizer`] | LLM providers |
//! | [`digest`] | Print, chat and mail summaries |
//! | [`mailer`] | SMTP delivery |
//! | [`markdown`] | Markdown to HTML and text |

pub mod config;
pub mod connector_ical;
pub mod connector_rss;
pub mod connector_vcard;
pub mod connector_weather;
pub mod db;
pub mod digest;
pub mod entries;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod geocoder;
pub mod ingest;
pub mod mailer;
pub mod markdown;
pub mod migrate;
pub mod models;
pub mod prompts;
pub mod sources;
pub mod store;
pub mod summarizer;
pub mod timeparse;
