//! A small async Rust client for the Piano ESP API.
//!
//! Single requests surface their errors. Batches of requests (for example
//! statistics for many campaigns) run concurrently under a cap of 75 in-flight
//! requests by default; requests that fail are logged and left out of the
//! result instead of failing the whole batch.
//!
//! ## Quick start
//! - Configure the endpoint and key via environment variables (`API_ENDPOINT`, `API_KEY`,
//!   `SITE_ID`) or a `.espapirc` file (current directory or home directory).
//! - Build an [`EspClient`] and call its methods.
//!
//! ```no_run
//! use anyhow::Result;
//! use chrono::NaiveDate;
//! use espapi::EspClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let esp = EspClient::from_env()?;
//!     let campaigns = esp.get_all_campaigns(true).await;
//!     let ids: Vec<i64> = campaigns.iter().filter_map(|c| c.id).collect();
//!
//!     let stats = esp
//!         .get_campaign_stats(
//!             ids,
//!             NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
//!             NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
//!         )
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&stats)?);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod accounts;
mod client;
mod config;
mod db;
mod dispatch;
mod error;
mod esp;
mod util;

pub use accounts::{Account, load_accounts};
pub use client::{ApiKey, BaseClient, Endpoint, Params};
pub use config::ClientConfig;
pub use db::{ConnectionString, ConnectionStringBuilder, Session, SessionRegistry};
pub use dispatch::{
    DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT, Dispatcher, MAX_CONCURRENCY, Method, ReqwestTransport,
    RequestDescriptor, Transport,
};
pub use error::{Error, ResponseError, ResponseErrorKind, ValidationError};
pub use esp::{Campaign, CampaignIds, EspClient, parse_date};
pub use util::{validate_path, validate_url};
