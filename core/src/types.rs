//! Core data types for medsearch
//!
//! These types are shared between the session, the REST client, the daemon
//! and the CLI.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of record a search result points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Patient,
    Appointment,
    Prescription,
    LabOrder,
    Document,
    Doctor,
}

impl ResultType {
    /// Return the snake_case string used on the wire and in cache keys.
    ///
    /// # Returns
    /// String slice for this result type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Patient => "patient",
            ResultType::Appointment => "appointment",
            ResultType::Prescription => "prescription",
            ResultType::LabOrder => "lab_order",
            ResultType::Document => "document",
            ResultType::Doctor => "doctor",
        }
    }

    /// Parse a result type from user input (case-insensitive, `-` or `_`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "patient" | "patients" => Some(ResultType::Patient),
            "appointment" | "appointments" => Some(ResultType::Appointment),
            "prescription" | "prescriptions" => Some(ResultType::Prescription),
            "lab_order" | "lab_orders" | "lab" => Some(ResultType::LabOrder),
            "document" | "documents" => Some(ResultType::Document),
            "doctor" | "doctors" => Some(ResultType::Doctor),
            _ => None,
        }
    }
}

/// Result ordering requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Relevance,
    DateDesc,
    DateAsc,
    Name,
}

impl SortOrder {
    /// Return the snake_case string used on the wire and in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::DateDesc => "date_desc",
            SortOrder::DateAsc => "date_asc",
            SortOrder::Name => "name",
        }
    }

    /// Parse a sort order from user input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "relevance" => Some(SortOrder::Relevance),
            "date_desc" | "newest" => Some(SortOrder::DateDesc),
            "date_asc" | "oldest" => Some(SortOrder::DateAsc),
            "name" => Some(SortOrder::Name),
            _ => None,
        }
    }
}

/// Inclusive calendar date range. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// True when neither bound is set.
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Every search parameter except the free-text term.
///
/// # Fields
/// - `types`: Result types to include (empty = all). Order is irrelevant.
/// - `date_range`: Optional date window.
/// - `status`: Optional record status (e.g. "scheduled", "active").
/// - `city`: Optional patient city.
/// - `doctor_id`: Optional doctor identifier.
/// - `medication`: Optional medication name.
/// - `limit`: Optional page size.
/// - `offset`: Optional page offset.
/// - `sort`: Optional sort order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub types: Vec<ResultType>,
    pub date_range: Option<DateRange>,
    pub status: Option<String>,
    pub city: Option<String>,
    pub doctor_id: Option<String>,
    pub medication: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<SortOrder>,
}

/// A complete search request: text plus filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, filters: SearchFilters) -> Self {
        Self {
            query: query.into(),
            filters,
        }
    }
}

/// A single search hit.
///
/// # Fields
/// - `id`: Identifier of the matched record.
/// - `result_type`: Kind of record.
/// - `title`: Primary display text (patient name, medication, ...).
/// - `subtitle`: Optional secondary text.
/// - `description`: Optional longer text.
/// - `url`: Optional client route for the record.
/// - `score`: Optional relevance score (higher is better).
/// - `date`: Optional date associated with the record.
/// - `metadata`: Free-form extra fields returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One value of a facet with its hit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

/// Full payload returned by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub suggestions: Vec<String>,
    /// Facet counts keyed by facet name (status, city, ...).
    pub filters: BTreeMap<String, Vec<FacetValue>>,
    pub total: u64,
    pub by_type: BTreeMap<ResultType, u64>,
}

/// Point-in-time view of a search session, as handed to a UI or over IPC.
///
/// `error` set with empty results means the fetch failed; `error` unset with
/// `total == 0` means the search genuinely found nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSnapshot {
    /// Debounced query text the results belong to
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: u64,
    pub by_type: BTreeMap<ResultType, u64>,
    /// Remote suggestions merged with matching history entries
    pub suggestions: Vec<String>,
    pub is_loading: bool,
    pub is_loading_suggestions: bool,
    pub error: Option<String>,
    /// No debounce pending and no fetch in flight
    pub settled: bool,
    /// Number of session commands reflected in this snapshot
    pub revision: u64,
}

/// IPC message between CLI and daemon.
///
/// Messages are serialized to JSON and sent over the Unix socket, one per line.
/// Each connection owns one search session on the daemon side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcMessage {
    /// Replace the session's raw input (one keystroke or filter change)
    Input {
        text: String,
        #[serde(default)]
        filters: SearchFilters,
    },

    /// Read the session state
    Snapshot {
        /// Wait until no debounce is pending and nothing is in flight
        settle: bool,
        /// Upper bound on the wait (milliseconds)
        timeout_ms: u64,
    },

    /// Record a confirmed query in the shared history
    AddToHistory { query: String },

    /// List the shared history, most recent first
    History,

    /// Empty the shared result cache
    ClearCache,

    /// Re-run the network fetch for the session's current query
    Refetch,

    /// Return the session to the no-search state
    Reset,

    /// Get diagnostic information
    DoctorInfo,

    /// Health check
    Ping,

    /// Shutdown daemon
    Shutdown,
}

/// Response from daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcResponse {
    Ok,
    Error(String),
    Snapshot(SearchSnapshot),
    History(Vec<String>),
    Pong {
        uptime_secs: u64,
        active_sessions: u64,
    },
    /// Diagnostic information
    Doctor(DiagnosticInfo),
}

/// Diagnostic information for the doctor command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticInfo {
    /// Daemon uptime in seconds
    pub uptime_secs: u64,
    /// Connected sessions
    pub active_sessions: u64,
    /// Entries currently held by the result cache (expired ones included)
    pub cache_entries: usize,
    /// Result cache capacity
    pub cache_capacity: usize,
    /// Result cache time-to-live in seconds
    pub cache_ttl_secs: u64,
    /// Entries in the shared search history
    pub history_entries: usize,
    /// Keys tracked by the search query client
    pub tracked_searches: usize,
    /// Keys tracked by the suggestions query client
    pub tracked_suggestions: usize,
    /// Search API base URL
    pub api_base_url: String,
}
