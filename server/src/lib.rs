//! # Flashgate Server
//!
//! Configuration and wiring for the `flashgate` binary.

pub mod config;
pub mod dead_letters;

pub use config::Config;
pub use dead_letters::MirroredDeadLetters;

use flashgate_core::Item;

/// Read a JSON array of items.
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a list of items.
pub async fn load_catalog(path: &str) -> anyhow::Result<Vec<Item>> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_catalog(&raw)
}

fn parse_catalog(raw: &str) -> anyhow::Result<Vec<Item>> {
    let items: Vec<Item> = serde_json::from_str(raw)?;
    if let Some(bad) = items.iter().find(|i| i.remaining_stock < 0) {
        anyhow::bail!("item {} has negative stock", bad.id);
    }
    Ok(items)
}
