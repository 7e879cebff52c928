//! Query planning
//!
//! Turns a filter and normalized options into the two independent queries a
//! page needs: one counting every match, one fetching the requested slice.

use crate::filter::QueryFilter;
use crate::options::{QueryOptions, SortKey, DEFAULT_SORT_FIELD};
use crate::populate::PopulateDirective;

/// Count of every document matching `filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountQuery {
    pub filter: QueryFilter,
}

/// Sorted, sliced and populated fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub filter: QueryFilter,
    /// Never empty once planned
    pub sort: Vec<SortKey>,
    pub skip: u64,
    /// `None` fetches every match after `skip`
    pub limit: Option<u64>,
    pub populate: Vec<PopulateDirective>,
}

impl FindQuery {
    /// Unsorted, unpaginated fetch of every match.
    pub fn all(filter: QueryFilter) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            populate: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    pub count: CountQuery,
    pub find: FindQuery,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct QueryPlanner {
    default_sort: Vec<SortKey>,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self {
            default_sort: vec![SortKey::asc(DEFAULT_SORT_FIELD)],
        }
    }
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort used when the caller gives none.
    pub fn with_default_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.default_sort = sort;
        self
    }

    pub fn plan(&self, filter: QueryFilter, options: &QueryOptions) -> FetchPlan {
        let sort = if options.sort_by.is_empty() {
            self.default_sort.clone()
        } else {
            options.sort_by.clone()
        };

        FetchPlan {
            count: CountQuery {
                filter: filter.clone(),
            },
            find: FindQuery {
                filter,
                sort,
                skip: options.skip(),
                limit: Some(options.limit),
                populate: options.populate.clone(),
            },
            page: options.page,
            limit: options.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{PaginationPolicy, RawQueryOptions};

    #[test]
    fn defaults_to_created_at_ascending() {
        let plan = QueryPlanner::new().plan(QueryFilter::all(), &QueryOptions::default());
        assert_eq!(plan.find.sort, vec![SortKey::asc("createdAt")]);
        assert_eq!(plan.find.skip, 0);
        assert_eq!(plan.find.limit, Some(10));
        assert_eq!(plan.count.filter, plan.find.filter);
    }

    #[test]
    fn carries_sort_slice_and_population() {
        let options = RawQueryOptions::default()
            .sort_by("db:desc")
            .populate("user.team")
            .limit(5i64)
            .page(4i64)
            .normalize(&PaginationPolicy::default());
        let plan = QueryPlanner::new().plan(QueryFilter::all(), &options);
        assert_eq!(plan.find.sort, vec![SortKey::desc("db")]);
        assert_eq!(plan.find.skip, 15);
        assert_eq!((plan.page, plan.limit), (4, 5));
        assert_eq!(
            plan.find.populate,
            vec![PopulateDirective::new("user").then(PopulateDirective::new("team"))]
        );
    }

    #[test]
    fn huge_pages_do_not_overflow() {
        let options = QueryOptions::default().with_page(u64::MAX).with_limit(u64::MAX);
        let plan = QueryPlanner::new().plan(QueryFilter::all(), &options);
        assert_eq!(plan.find.skip, u64::MAX);
    }
}
