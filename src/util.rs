use url::{Url, form_urlencoded};

use crate::error::ValidationError;

/// Name of the query parameter carrying the API key.
pub(crate) const API_KEY_PARAM: &str = "api_key";

/// Normalises a relative resource path.
///
/// Surrounding whitespace and slashes are stripped. Anything that parses as an
/// absolute URL (it has a scheme, and possibly a host) is rejected so a caller
/// cannot redirect an authenticated request to another host.
pub fn validate_path(path: &str) -> Result<String, ValidationError> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidPath {
            path: path.to_string(),
            reason: "path is empty",
        });
    }

    // A relative path fails to parse without a base; success means a scheme is present.
    if Url::parse(trimmed).is_ok() {
        return Err(ValidationError::InvalidPath {
            path: path.to_string(),
            reason: "path must be relative (no scheme or host)",
        });
    }

    Ok(trimmed.to_string())
}

/// Checks that `url` is absolute with both a scheme and a host.
///
/// Returns the input with surrounding whitespace and slashes removed, otherwise unchanged.
pub fn validate_url(url: &str) -> Result<String, ValidationError> {
    let trimmed = url.trim().trim_matches('/');
    match Url::parse(trimmed) {
        Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(trimmed.to_string()),
        _ => Err(ValidationError::InvalidUrl(url.to_string())),
    }
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Splits a validated path into its resource part and any embedded query pairs.
pub(crate) fn split_query(path: &str) -> (&str, Vec<(String, String)>) {
    match path.split_once('?') {
        Some((resource, query)) => (
            resource.trim_end_matches('/'),
            form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
        ),
        None => (path, Vec::new()),
    }
}

/// Merges caller parameters with the API key.
///
/// Any `api_key` the caller supplied is dropped; the client's key is appended once.
pub(crate) fn authenticated_query<'a, I>(params: I, api_key: &str) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut query: Vec<(String, String)> = params
        .into_iter()
        .filter(|(k, _)| k.as_str() != API_KEY_PARAM)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    query.push((API_KEY_PARAM.to_string(), api_key.to_string()));
    query
}
