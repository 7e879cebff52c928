//! Page execution

use crate::collection::Collection;
use crate::plan::FetchPlan;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T = JsonValue> {
    pub results: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub total_results: u64,
}

impl<T> PageResult<T> {
    pub fn new(results: Vec<T>, page: u64, limit: u64, total_results: u64) -> Self {
        Self {
            results,
            page,
            limit,
            total_pages: total_pages(total_results, limit),
            total_results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }

    pub fn try_map<U, E>(
        self,
        f: impl FnMut(T) -> std::result::Result<U, E>,
    ) -> std::result::Result<PageResult<U>, E> {
        Ok(PageResult {
            results: self
                .results
                .into_iter()
                .map(f)
                .collect::<std::result::Result<_, _>>()?,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        })
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// `ceil(total / limit)`; 0 when there is nothing to page through.
pub fn total_pages(total_results: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total_results.div_ceil(limit)
}

/// Run the count and the fetch of `plan` concurrently.
///
/// Either failure fails the page; no partial result is returned.
#[tracing::instrument(
    name = "page_query",
    skip_all,
    fields(collection = collection.schema().collection, page = plan.page, limit = plan.limit)
)]
pub async fn execute<C>(collection: &C, plan: &FetchPlan) -> Result<PageResult>
where
    C: Collection + ?Sized,
{
    let started = Instant::now();
    let (total_results, results) = futures::try_join!(
        collection.count_documents(&plan.count),
        collection.find(&plan.find)
    )?;

    tracing::debug!(
        total = total_results,
        returned = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Executed page query"
    );

    Ok(PageResult::new(results, plan.page, plan.limit, total_results))
}
