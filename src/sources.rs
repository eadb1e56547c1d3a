//! Source management: `spark sources list|add|delete|replace-entries`.

use anyhow::Result;

use crate::error::SparkError;
use crate::ingest::{self, SyncContext, SyncRequest};
use crate::store::{SourceSummary, Store};

pub async fn run_list(store: &dyn Store) -> Result<()> {
    let sources = store.list_sources().await?;
    print!("{}", format_table(&sources));
    Ok(())
}

pub fn format_table(sources: &[SourceSummary]) -> String {
    let mut out = format!("{:<20} {:<8} {}\n", "SOURCE", "ENTRIES", "DESCRIPTION");
    for s in sources {
        out.push_str(&format!(
            "{:<20} {:<8} {}\n",
            s.source.name, s.entries, s.source.description
        ));
    }
    out
}

pub async fn run_add(store: &dyn Store, name: &str, description: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("source name must not be empty");
    }
    let source = store.create_source(name, description).await?;
    tracing::info!(id = source.id, name = %source.name, "source created");
    println!("Created source {}", source.name);
    Ok(())
}

/// Delete a source together with every entry it owns.
pub async fn run_delete(store: &dyn Store, name: &str) -> Result<()> {
    let source = store
        .find_source_by_name(name)
        .await?
        .ok_or_else(|| SparkError::SourceNotFound(name.to_string()))?;
    store.delete_source(source.id).await?;
    println!("Deleted source {}", source.name);
    Ok(())
}

/// Replace the entries of `name` with the contents of a JSON entries file.
pub async fn run_replace_entries(ctx: &SyncContext<'_>, name: &str, uri: &str) -> Result<()> {
    let request = SyncRequest::Json {
        uri: uri.to_string(),
    };
    ingest::run_sync(ctx, name, &request).await?;
    Ok(())
}
