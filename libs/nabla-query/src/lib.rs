//! Paginated, searchable queries over document collections
//!
//! The building blocks shared by every collection type:
//! - Static entity schemas and their searchable field sets
//! - Free-text search filters (case-insensitive regex across searchable fields)
//! - Query planning (sort, population, skip/limit)
//! - Page execution with total counts
//! - JSON shaping and CSV export of documents
//!
//! # Example
//!
//! ```rust,no_run
//! use nabla_query::{
//!     EntitySchema, FieldDef, MemoryStore, Paginator, RawQueryOptions, SchemaRegistry,
//! };
//! use serde_json::json;
//!
//! static PEOPLE: EntitySchema = EntitySchema::new(
//!     "people",
//!     &[FieldDef::string("name").searchable(), FieldDef::string("email").searchable()],
//! );
//!
//! # async fn example() -> nabla_query::Result<()> {
//! let store = MemoryStore::new(SchemaRegistry::new().with(&PEOPLE));
//! store.insert(&PEOPLE, json!({"name": "Alice Smith", "email": "a@x.com"})).await?;
//!
//! let people = Paginator::new(store.collection(&PEOPLE));
//! let page = people.search(Some("alice"), &RawQueryOptions::default()).await?;
//! assert_eq!(page.total_results, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod collection;
pub mod csv_export;
pub mod error;
pub mod filter;
pub mod json;
pub mod memory;
pub mod options;
pub mod pager;
pub mod plan;
pub mod populate;
pub mod schema;
pub mod search;

mod path;

pub use collection::Collection;
pub use error::{Error, Result};
pub use filter::{CompiledFilter, FieldEquals, FieldMatch, FilterBuilder, QueryFilter, SearchFilter};
pub use memory::{MemoryCollection, MemoryStore};
pub use options::{
    parse_sort_by, LooseInt, PaginationPolicy, QueryOptions, RawQueryOptions, SortDirection,
    SortKey,
};
pub use pager::{total_pages, PageResult};
pub use plan::{CountQuery, FetchPlan, FindQuery, QueryPlanner};
pub use populate::{DocumentSource, PopulateDirective, Populator};
pub use schema::{
    DefaultValue, EntitySchema, FieldDef, FieldKind, SchemaRegistry, SearchableFieldSet,
};
pub use search::{Paginator, TextSearchResult};

/// Documents are JSON objects; `_id` carries the string id.
pub type Document = serde_json::Value;
