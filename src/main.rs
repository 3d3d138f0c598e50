use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::Parser;
use log::{error, info};

use espapi::{Account, BaseClient, ClientConfig, Endpoint, EspClient, load_accounts, parse_date};

/// List Piano ESP campaigns (and optionally their statistics) for every configured account.
#[derive(Parser, Debug)]
#[command(name = "espapi", version)]
struct Cli {
    /// JSON file with `{"items": [{"id", "name", "key"}]}`.
    #[arg(long, default_value = "keys.json")]
    accounts: PathBuf,

    /// Include inactive campaigns.
    #[arg(long)]
    all: bool,

    /// Also fetch statistics for the listed campaigns.
    #[arg(long)]
    stats: bool,

    /// First day of the statistics window (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// Last day of the statistics window (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Show a progress bar while batches run.
    #[arg(long)]
    progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ClientConfig::from_env()?;
    let endpoint = Endpoint::parse(&config.url).context("invalid API endpoint")?;

    let window = if cli.stats {
        let start = cli.start.as_deref().ok_or_else(|| anyhow!("--start is required"))?;
        let end = cli.end.as_deref().ok_or_else(|| anyhow!("--end is required"))?;
        Some((parse_date("start date", start)?, parse_date("end date", end)?))
    } else {
        None
    };

    let mut accounts = load_accounts(&cli.accounts);
    if accounts.is_empty() {
        info!(
            "no accounts in {}; using the configured key and site id",
            cli.accounts.display()
        );
        accounts.push(Account {
            id: config.require_site_id()?,
            name: String::new(),
            key: config.require_key()?.to_string(),
        });
    }

    for account in accounts {
        let esp = match build_client(&endpoint, &config, &account, cli.progress) {
            Ok(esp) => esp,
            Err(e) => {
                error!("skipping account {} ({}): {}", account.id, account.name, e);
                continue;
            }
        };
        println!("{esp}");

        let campaigns = esp.get_all_campaigns(!cli.all).await;
        println!("{}", serde_json::to_string(&campaigns)?);

        if let Some((start, end)) = window {
            print_stats(&esp, campaigns.iter().filter_map(|c| c.id).collect(), start, end).await?;
        }
    }

    Ok(())
}

fn build_client(
    endpoint: &Endpoint,
    config: &ClientConfig,
    account: &Account,
    progress: bool,
) -> Result<EspClient> {
    let base = BaseClient::new(endpoint.clone(), &account.key)?
        .with_concurrency(config.concurrency)
        .with_progress(progress);
    Ok(EspClient::from_base(base, account.id)?.with_name(account.name.clone()))
}

async fn print_stats(esp: &EspClient, ids: Vec<i64>, start: NaiveDate, end: NaiveDate) -> Result<()> {
    if ids.is_empty() {
        info!("site {} has no campaigns to fetch statistics for", esp.site_id());
        return Ok(());
    }

    match esp.get_campaign_stats(ids, start, end).await {
        Ok(stats) => println!("{}", serde_json::to_string(&stats)?),
        Err(e) => error!("failed to get campaign stats for site {}: {}", esp.site_id(), e),
    }
    Ok(())
}
