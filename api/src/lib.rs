//! HTTP backend for the practice search API
//!
//! Implements [`SearchBackend`] over `reqwest`:
//! - `GET {base}/search` with the parameters as query pairs
//! - `GET {base}/search/suggestions?q=..`

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use medsearch_core::config::ApiSettings;
use medsearch_core::{FetchError, SearchBackend, SearchParams, SearchResponse};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}

/// Client for the search endpoints
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::BaseUrl(settings.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: settings.token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        let mut request = self.client.get(self.url(path)).query(query);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Request to {} failed: {}", path, e);
            FetchError::Network(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl SearchBackend for ApiClient {
    async fn search(&self, params: &SearchParams) -> Result<SearchResponse, FetchError> {
        let query = search_query(params);
        debug!("GET search with {} parameters", query.len());
        self.get("search", &query).await
    }

    async fn suggestions(&self, text: &str) -> Result<Vec<String>, FetchError> {
        let query = [("q", text.trim().to_string())];
        let body: SuggestionsBody = self.get("search/suggestions", &query).await?;
        Ok(body.into_vec())
    }
}

/// The suggestions endpoint answers with either a bare array or an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionsBody {
    List(Vec<String>),
    Wrapped { suggestions: Vec<String> },
}

impl SuggestionsBody {
    fn into_vec(self) -> Vec<String> {
        match self {
            SuggestionsBody::List(list) => list,
            SuggestionsBody::Wrapped { suggestions } => suggestions,
        }
    }
}

/// Pull `message` or `error` out of a JSON error body, else keep it as text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ => body.trim().to_string(),
    }
}

/// Query pairs for `GET /search`. Absent filters are omitted.
pub fn search_query(params: &SearchParams) -> Vec<(&'static str, String)> {
    let filters = &params.filters;
    let mut query = vec![("q", params.query.trim().to_string())];

    if !filters.types.is_empty() {
        let mut types: Vec<&str> = filters.types.iter().map(|t| t.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        query.push(("types", types.join(",")));
    }

    if let Some(ref range) = filters.date_range {
        if let Some(from) = range.from {
            query.push(("dateFrom", from.to_string()));
        }
        if let Some(to) = range.to {
            query.push(("dateTo", to.to_string()));
        }
    }

    let text_filters = [
        ("status", &filters.status),
        ("city", &filters.city),
        ("doctorId", &filters.doctor_id),
        ("medication", &filters.medication),
    ];
    for (name, value) in text_filters {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            query.push((name, value.to_string()));
        }
    }

    if let Some(limit) = filters.limit {
        query.push(("limit", limit.to_string()));
    }
    if let Some(offset) = filters.offset {
        query.push(("offset", offset.to_string()));
    }
    if let Some(sort) = filters.sort {
        query.push(("sort", sort.as_str().to_string()));
    }

    query
}
