use std::fmt;

use chrono::NaiveDate;
use log::{error, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::client::{BaseClient, Endpoint, Params};
use crate::config::ClientConfig;
use crate::error::{Error, ValidationError};

const CAMPAIGN_LIST_PATH: &str = "publisher/list";
const CAMPAIGN_STATS_PATH: &str = "stats/campaigns/full";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A mailing list ("campaign") as returned by `publisher/list/{site_id}`.
///
/// Only the fields this crate relies on are typed; everything else is kept in `fields`.
/// The typed fields are read leniently so a loosely typed record is never dropped:
/// numeric strings count as ids, and `Active` follows JSON truthiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(rename = "Id", default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(rename = "Name", default, deserialize_with = "lenient_name")]
    pub name: Option<String>,
    #[serde(rename = "Active", default, deserialize_with = "lenient_flag")]
    pub active: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn lenient_id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_name<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

#[derive(Debug, Deserialize)]
struct CampaignList {
    #[serde(default)]
    lists: Vec<Value>,
}

/// One campaign id or several.
///
/// A single id is fetched with a plain request whose failure is returned to the
/// caller; two or more go through the batch dispatcher, which drops failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignIds {
    One(i64),
    Many(Vec<i64>),
}

impl CampaignIds {
    fn into_vec(self) -> Vec<i64> {
        match self {
            CampaignIds::One(id) => vec![id],
            CampaignIds::Many(ids) => ids,
        }
    }
}

impl From<i64> for CampaignIds {
    fn from(id: i64) -> Self {
        CampaignIds::One(id)
    }
}

impl From<Vec<i64>> for CampaignIds {
    fn from(ids: Vec<i64>) -> Self {
        CampaignIds::Many(ids)
    }
}

impl From<&[i64]> for CampaignIds {
    fn from(ids: &[i64]) -> Self {
        CampaignIds::Many(ids.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for CampaignIds {
    fn from(ids: [i64; N]) -> Self {
        CampaignIds::Many(ids.to_vec())
    }
}

/// Parses a `YYYY-MM-DD` date, naming `field` in the error.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// Client for one ESP site.
#[derive(Debug, Clone)]
pub struct EspClient {
    client: BaseClient,
    site_id: i64,
    name: Option<String>,
}

impl EspClient {
    pub fn new(endpoint: Endpoint, api_key: &str, site_id: i64) -> Result<Self, Error> {
        Self::from_base(BaseClient::new(endpoint, api_key)?, site_id)
    }

    /// Wraps an existing [`BaseClient`]. `site_id` must be positive.
    pub fn from_base(client: BaseClient, site_id: i64) -> Result<Self, Error> {
        if site_id <= 0 {
            return Err(ValidationError::InvalidSiteId(site_id).into());
        }
        Ok(Self {
            client,
            site_id,
            name: None,
        })
    }

    /// Creates a client from the environment and/or `.espapirc`.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::from_env()?;
        config.require_key()?;
        let site_id = config.require_site_id()?;
        Ok(Self::from_base(BaseClient::from_config(&config)?, site_id)?)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.trim().is_empty()).then_some(name);
        self
    }

    pub fn base(&self) -> &BaseClient {
        &self.client
    }

    pub fn site_id(&self) -> i64 {
        self.site_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Lists the site's campaigns, only active ones when `filter_active` is set.
    ///
    /// Never fails: any error is logged and an empty list returned.
    pub async fn get_all_campaigns(&self, filter_active: bool) -> Vec<Campaign> {
        let path = format!("{}/{}", CAMPAIGN_LIST_PATH, self.site_id);
        let body = match self.client.request(&path, "GET", &Params::new()).await {
            Ok(body) => body,
            Err(e) => {
                error!("failed to get campaigns for site {}: {}", self.site_id, e);
                return Vec::new();
            }
        };

        let list: CampaignList = match serde_json::from_value(body) {
            Ok(list) => list,
            Err(e) => {
                error!("unexpected campaign list payload for site {}: {}", self.site_id, e);
                return Vec::new();
            }
        };

        list.lists
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Campaign>(raw) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("skipping malformed campaign for site {}: {}", self.site_id, e);
                    None
                }
            })
            .filter(|c| !filter_active || c.active)
            .collect()
    }

    /// Fetches full statistics for one or more campaigns over `[start_date, end_date]`.
    ///
    /// Ids are validated before anything is sent. With exactly one id the request
    /// error, if any, is returned. With several, failed campaigns are logged and
    /// omitted, and the remaining bodies come back in completion order; use the
    /// campaign id inside each body to correlate.
    pub async fn get_campaign_stats(
        &self,
        ids: impl Into<CampaignIds>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Value>, Error> {
        let ids = ids.into().into_vec();
        if ids.is_empty() {
            return Err(ValidationError::EmptyIds.into());
        }

        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            if id <= 0 {
                return Err(ValidationError::InvalidId(id).into());
            }
            paths.push(format!("{CAMPAIGN_STATS_PATH}/{id}"));
        }

        let mut params = Params::new();
        params.insert(
            "date_start".to_string(),
            start_date.format(DATE_FORMAT).to_string(),
        );
        params.insert(
            "date_end".to_string(),
            end_date.format(DATE_FORMAT).to_string(),
        );

        match paths.as_slice() {
            [single] => Ok(vec![self.client.request(single, "GET", &params).await?]),
            _ => self.client.request_batch(&paths, "GET", &params).await,
        }
    }
}

impl fmt::Display for EspClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EspClient(site_id={}", self.site_id)?;
        if let Some(name) = &self.name {
            write!(f, ", name={name}")?;
        }
        write!(f, ", endpoint={})", self.client.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_convert_from_scalar_and_collections() {
        assert_eq!(CampaignIds::from(5), CampaignIds::One(5));
        assert_eq!(CampaignIds::from(vec![1, 2]), CampaignIds::Many(vec![1, 2]));
        assert_eq!(CampaignIds::from([3]), CampaignIds::Many(vec![3]));
        assert_eq!(CampaignIds::from(&[4, 5][..]).into_vec(), vec![4, 5]);
    }

    #[test]
    fn parse_date_accepts_iso_dates_only() {
        assert_eq!(
            parse_date("start date", "2026-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
        );
        assert!(matches!(
            parse_date("start date", ""),
            Err(ValidationError::InvalidDate { field: "start date", .. })
        ));
        assert!(parse_date("end date", "31/01/2026").is_err());
        assert!(parse_date("end date", "2026-02-30").is_err());
    }

    #[test]
    fn campaign_keeps_unknown_fields() {
        let c: Campaign = serde_json::from_value(json!({
            "Id": 12, "Name": "Morning brief", "Active": true, "Subscribers": 1400
        }))
        .unwrap();
        assert_eq!(c.id, Some(12));
        assert!(c.active);
        assert_eq!(c.fields.get("Subscribers"), Some(&json!(1400)));
    }

    #[test]
    fn loosely_typed_campaign_fields_are_accepted() {
        let c: Campaign = serde_json::from_value(json!({"Id": "12", "Active": null})).unwrap();
        assert_eq!(c.id, Some(12));
        assert!(!c.active);

        let c: Campaign = serde_json::from_value(json!({"Id": 3, "Name": 42, "Active": 1})).unwrap();
        assert_eq!(c.name.as_deref(), Some("42"));
        assert!(c.active);

        let c: Campaign = serde_json::from_value(json!({"Id": "n/a", "Active": "0"})).unwrap();
        assert_eq!(c.id, None);
        assert!(c.active);
    }

    #[test]
    fn campaign_without_active_flag_is_inactive() {
        let c: Campaign = serde_json::from_value(json!({"Id": 1})).unwrap();
        assert!(!c.active);
    }

    #[test]
    fn non_positive_site_id_is_rejected() {
        let endpoint = Endpoint::parse("https://api.example.com").unwrap();
        for site_id in [0, -7] {
            assert!(matches!(
                EspClient::new(endpoint.clone(), "key", site_id),
                Err(Error::Validation(ValidationError::InvalidSiteId(_)))
            ));
        }
    }

    #[test]
    fn display_hides_key() {
        let endpoint = Endpoint::parse("https://api.example.com").unwrap();
        let esp = EspClient::new(endpoint, "very-secret", 557)
            .unwrap()
            .with_name("News");
        let text = esp.to_string();
        assert_eq!(
            text,
            "EspClient(site_id=557, name=News, endpoint=https://api.example.com)"
        );
    }
}
