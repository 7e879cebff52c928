//! Paginated text search over a collection
//!
//! `Paginator` is the entry point callers use: give it a collection once,
//! then issue `search`/`paginate`/`text_search` calls. Every call is
//! independent; the paginator holds no per-call state.

use crate::collection::Collection;
use crate::filter::{FilterBuilder, QueryFilter, SearchFilter};
use crate::options::{PaginationPolicy, QueryOptions, RawQueryOptions};
use crate::pager::{self, PageResult};
use crate::plan::{CountQuery, FindQuery, QueryPlanner};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Un-paged search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchResult<T = JsonValue> {
    pub results: Vec<T>,
    pub total_results: u64,
}

pub struct Paginator<C> {
    collection: C,
    planner: QueryPlanner,
    filters: FilterBuilder,
    policy: PaginationPolicy,
}

impl<C: Collection> Paginator<C> {
    pub fn new(collection: C) -> Self {
        Self {
            collection,
            planner: QueryPlanner::default(),
            filters: FilterBuilder::default(),
            policy: PaginationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PaginationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_filter_builder(mut self, filters: FilterBuilder) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_planner(mut self, planner: QueryPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn policy(&self) -> &PaginationPolicy {
        &self.policy
    }

    /// One page of the documents matching `search`.
    pub async fn search(
        &self,
        search: Option<&str>,
        options: &RawQueryOptions,
    ) -> Result<PageResult> {
        self.search_with(search, &options.normalize(&self.policy))
            .await
    }

    /// Like `search`, with already-normalized options.
    pub async fn search_with(
        &self,
        search: Option<&str>,
        options: &QueryOptions,
    ) -> Result<PageResult> {
        let filter = QueryFilter::from_search(self.search_filter(search)?);
        let plan = self.planner.plan(filter, options);
        pager::execute(&self.collection, &plan).await
    }

    /// One page of the documents matching `base` AND `search`.
    ///
    /// Entries of `base` holding the empty string are ignored.
    pub async fn paginate(
        &self,
        base: &Map<String, JsonValue>,
        options: &RawQueryOptions,
        search: Option<&str>,
    ) -> Result<PageResult> {
        let filter = QueryFilter::from_base(base).with_search(self.search_filter(search)?);
        let plan = self.planner.plan(filter, &options.normalize(&self.policy));
        pager::execute(&self.collection, &plan).await
    }

    /// Every document matching `search`, with the total count.
    ///
    /// Only `populate` is taken from `options`; there is no sorting or
    /// slicing.
    pub async fn text_search(
        &self,
        search: Option<&str>,
        options: &RawQueryOptions,
    ) -> Result<TextSearchResult> {
        let filter = QueryFilter::from_search(self.search_filter(search)?);
        let count = CountQuery {
            filter: filter.clone(),
        };
        let mut find = FindQuery::all(filter);
        find.populate = options.normalize(&self.policy).populate;

        let (total_results, results) = futures::try_join!(
            self.collection.count_documents(&count),
            self.collection.find(&find)
        )?;

        Ok(TextSearchResult {
            results,
            total_results,
        })
    }

    fn search_filter(&self, search: Option<&str>) -> Result<SearchFilter> {
        let fields = self.collection.searchable_fields()?;
        self.filters.build(search, &fields)
    }
}
