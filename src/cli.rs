//! Command-line surface for the discovery engine and store.

use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::database::{ContactStore, SearchQuery};
use crate::discovery::{cancel_pair, ContactDiscoveryEngine};
use crate::error::{Result, ScoutError};
use crate::models::ExtractionResult;
use crate::validator::{summarize, ValidationLevel};

#[derive(Parser, Debug)]
#[command(
    name = "contact-scout",
    about = "Discover, score and validate contact channels on real-estate listings",
    version
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yml", env = "CONTACT_SCOUT_CONFIG")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover contacts for a single listing URL
    Discover {
        url: String,
        /// Skip same-site crawling
        #[arg(long)]
        no_crawl: bool,
        /// Skip validation
        #[arg(long)]
        no_validate: bool,
        /// Persist results to the store
        #[arg(long)]
        store: bool,
    },
    /// Discover contacts for many URLs read from a file (one per line)
    Batch {
        file: String,
        /// Persist results to the store
        #[arg(long)]
        store: bool,
    },
    /// Re-validate one stored contact
    Validate {
        contact_id: i64,
        #[arg(long, default_value = "standard")]
        level: String,
    },
    /// Search stored contacts
    Search {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long)]
        listing: Option<i64>,
        /// Free-text match on value and source
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Store statistics (counts, buckets, recent activity)
    Stats,
    /// Delete contacts older than the retention window
    Cleanup {
        /// Override the configured retention in days
        #[arg(long)]
        older_than_days: Option<i64>,
    },
    /// Report duplicate contact clusters across listings
    Dedup,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = crate::config::load_config(&cli.config).await?;

    match cli.command {
        Command::Discover {
            url,
            no_crawl,
            no_validate,
            store,
        } => {
            let mut options = config.discovery_options()?;
            if no_crawl {
                options.enable_crawling = false;
            }
            if no_validate {
                options.enable_validation = false;
            }
            let engine = Arc::new(ContactDiscoveryEngine::new(
                options,
                config.validator_config(),
                config.validation_level()?,
                config.ocr_config(),
            )?);

            let result = engine.discover(&url).await;
            if store {
                let db = ContactStore::open(&config.storage.database_path).await?;
                persist_result(&db, &result).await?;
            }
            print_json(&result)?;
        }

        Command::Batch { file, store } => {
            let content = tokio::fs::read_to_string(&file).await?;
            let urls: Vec<String> = content
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .collect();
            if urls.is_empty() {
                return Err(ScoutError::Config(format!("no URLs found in {}", file)));
            }

            let engine = Arc::new(ContactDiscoveryEngine::new(
                config.discovery_options()?,
                config.validator_config(),
                config.validation_level()?,
                config.ocr_config(),
            )?);

            let (handle, token) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl+C received; cancelling batch");
                    handle.cancel();
                }
            });

            let results = engine.discover_batch(&urls, Some(token)).await;
            if store {
                let db = ContactStore::open(&config.storage.database_path).await?;
                for result in &results {
                    if result.error.is_none() {
                        persist_result(&db, result).await?;
                    }
                }
            }

            let stats = engine.stats().await;
            info!(
                "Batch complete: {}/{} URLs succeeded, {} contacts",
                results.iter().filter(|r| r.error.is_none()).count(),
                results.len(),
                stats.contacts_found
            );
            print_json(&results)?;
        }

        Command::Validate { contact_id, level } => {
            let level = ValidationLevel::from_str(&level).map_err(ScoutError::Config)?;
            let db = ContactStore::open(&config.storage.database_path).await?;
            let Some(contact) = db.contact_for_validation(contact_id).await? else {
                return Err(ScoutError::Config(format!(
                    "no contact with id {}",
                    contact_id
                )));
            };

            let validator = crate::validator::ContactValidator::new(config.validator_config())?;
            let record = validator.validate(&contact, level).await;
            db.apply_validation(contact_id, &record).await?;

            let summary = summarize(std::slice::from_ref(&record));
            print_json(&serde_json::json!({
                "record": record,
                "summary": summary,
            }))?;
        }

        Command::Search {
            status,
            min_confidence,
            listing,
            text,
            limit,
            offset,
        } => {
            let db = ContactStore::open(&config.storage.database_path).await?;
            let query = SearchQuery {
                status,
                min_confidence,
                listing_id: listing,
                text,
                limit,
                offset,
                ..SearchQuery::default()
            };
            let hits = db.search(&query).await?;
            print_json(&hits)?;
        }

        Command::Stats => {
            let db = ContactStore::open(&config.storage.database_path).await?;
            let stats = db.statistics().await?;
            print_json(&stats)?;
        }

        Command::Cleanup { older_than_days } => {
            let days = older_than_days.unwrap_or(config.storage.retention_days);
            let db = ContactStore::open(&config.storage.database_path).await?;
            let deleted = db.cleanup(days).await?;
            print_json(&serde_json::json!({ "deleted": deleted, "older_than_days": days }))?;
        }

        Command::Dedup => {
            let db = ContactStore::open(&config.storage.database_path).await?;
            let clusters = db.dedup_clusters().await?;
            print_json(&clusters)?;
        }
    }

    Ok(())
}

/// Write one extraction result into the store, linked to its listing.
pub async fn persist_result(db: &ContactStore, result: &ExtractionResult) -> Result<()> {
    let listing_id = db.upsert_listing(&result.source_url, None).await?;

    for contact in &result.contacts {
        db.upsert_contact(contact, Some(listing_id)).await?;
    }
    for form in &result.forms {
        db.store_form(form, Some(listing_id)).await?;
    }

    info!(
        "💾 Stored {} contacts and {} forms for {}",
        result.contacts.len(),
        result.forms.len(),
        result.source_url
    );
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn discover_flags_parse() {
        let cli = Cli::parse_from([
            "contact-scout",
            "discover",
            "https://acme.de/wohnung/1",
            "--no-crawl",
            "--store",
        ]);
        match cli.command {
            Command::Discover {
                url,
                no_crawl,
                no_validate,
                store,
            } => {
                assert_eq!(url, "https://acme.de/wohnung/1");
                assert!(no_crawl);
                assert!(!no_validate);
                assert!(store);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn search_defaults_apply() {
        let cli = Cli::parse_from(["contact-scout", "search", "--text", "acme"]);
        match cli.command {
            Command::Search { limit, offset, text, .. } => {
                assert_eq!(limit, 20);
                assert_eq!(offset, 0);
                assert_eq!(text.as_deref(), Some("acme"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
