use anyhow::{Context, Result, anyhow, bail};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::dispatch::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

pub(crate) const ENV_URL: &str = "API_ENDPOINT";
pub(crate) const ENV_KEY: &str = "API_KEY";
pub(crate) const ENV_SITE_ID: &str = "SITE_ID";
pub(crate) const ENV_CONCURRENCY: &str = "ESPAPI_CONCURRENCY";
pub(crate) const ENV_RC: &str = "ESPAPI_RC";

const RC_NAME: &str = ".espapirc";

/// Process configuration, loaded once at startup.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base API URL, e.g. `https://api-esp.piano.io`.
    pub url: String,
    /// API key. Optional here because multi-account setups supply keys separately.
    pub key: Option<String>,
    /// Site identifier for the account owning `key`.
    pub site_id: Option<i64>,
    /// Maximum in-flight requests per batch.
    pub concurrency: usize,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("site_id", &self.site_id)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ClientConfig {
    /// Loads configuration from the environment and/or `.espapirc`.
    ///
    /// Equivalent to `ClientConfig::load(None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::load(None, None)
    }

    /// Loads configuration using (in order of precedence):
    /// - explicit `url`/`key` arguments
    /// - environment variables `API_ENDPOINT`, `API_KEY`, `SITE_ID`, `ESPAPI_CONCURRENCY`
    /// - config file from `ESPAPI_RC` or `.espapirc`
    pub fn load(url: Option<String>, key: Option<String>) -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok();
        let candidates = rc_candidates(env(ENV_RC));
        resolve(url, key, &env, &candidates)
    }

    pub fn require_key(&self) -> Result<&str> {
        self.key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing configuration: key (set {ENV_KEY} or put `key:` in {RC_NAME})"))
    }

    pub fn require_site_id(&self) -> Result<i64> {
        self.site_id.ok_or_else(|| {
            anyhow!("Missing configuration: site_id (set {ENV_SITE_ID} or put `site_id:` in {RC_NAME})")
        })
    }
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    site_id: Option<String>,
    concurrency: Option<String>,
}

pub(crate) fn resolve(
    url: Option<String>,
    key: Option<String>,
    env: &dyn Fn(&str) -> Option<String>,
    rc_candidates: &[PathBuf],
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| env(ENV_URL));
    let mut key = key.or_else(|| env(ENV_KEY));
    let mut site_id = env(ENV_SITE_ID);
    let mut concurrency = env(ENV_CONCURRENCY);

    if url.is_none() || key.is_none() || site_id.is_none() || concurrency.is_none() {
        if let Some(rc_path) = rc_candidates.iter().find(|p| p.exists()) {
            let cfg = read_rc(rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;
            url = url.or(cfg.url);
            key = key.or(cfg.key);
            site_id = site_id.or(cfg.site_id);
            concurrency = concurrency.or(cfg.concurrency);
        }
    }

    let Some(url) = url else {
        if rc_candidates.is_empty() {
            bail!("Missing configuration: url (set {ENV_URL} or create {RC_NAME})");
        }
        bail!(
            "Missing configuration: url (set {ENV_URL} or put `url:` in one of: {})",
            rc_candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let site_id = site_id
        .map(|raw| {
            let id = raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("site_id must be an integer, got {raw:?}"))?;
            if id <= 0 {
                bail!("site_id must be positive, got {id}");
            }
            Ok(id)
        })
        .transpose()?;

    let concurrency = match concurrency {
        Some(raw) => {
            let n = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("concurrency must be a positive integer, got {raw:?}"))?;
            if n == 0 {
                bail!("concurrency must be at least 1");
            }
            if n > MAX_CONCURRENCY {
                bail!("concurrency must be at most {MAX_CONCURRENCY}, got {n}");
            }
            n
        }
        None => DEFAULT_CONCURRENCY,
    };

    Ok(ClientConfig {
        url,
        key,
        site_id,
        concurrency,
    })
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    let mut cfg = RcConfig::default();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Split on the first colon only: URLs contain more.
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let v = strip_quotes(v.trim());
        if v.is_empty() {
            continue;
        }
        let slot = match k.trim() {
            "url" => &mut cfg.url,
            "key" => &mut cfg.key,
            "site_id" => &mut cfg.site_id,
            "concurrency" => &mut cfg.concurrency,
            _ => continue,
        };
        *slot = Some(v.to_string());
    }

    Ok(cfg)
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates(explicit: Option<String>) -> Vec<PathBuf> {
    // 1) ESPAPI_RC, 2) ./.espapirc, 3) ~/.espapirc
    if let Some(p) = explicit {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(RC_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(RC_NAME));
    }
    v
}
