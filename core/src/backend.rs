//! Search capability consumed by sessions
//!
//! The HTTP implementation lives in `medsearch-api`; tests plug in their own.

use std::future::Future;

use crate::error::FetchError;
use crate::types::{SearchParams, SearchResponse};

pub trait SearchBackend: Send + Sync + 'static {
    /// Run a full search.
    fn search(
        &self,
        params: &SearchParams,
    ) -> impl Future<Output = Result<SearchResponse, FetchError>> + Send;

    /// Fetch completion suggestions for partial text.
    fn suggestions(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;
}
