//! Query composition: the query value, criteria, filters, sorts, search and
//! SQL rendering

pub mod builder;
pub mod criteria;
pub mod filter;
pub mod search;
pub mod sort;
pub mod sql;

pub use builder::{
    Boolean, ColumnRef, Direction, Join, Operator, Order, OrderTarget, Predicate, Query, Search,
    Select, Where,
};
pub use criteria::{
    CriteriaRegistry, CriteriaStack, Criterion, CriterionFactory, FilterCriterion, FnCriterion,
    OrderByCriterion, StackState, WhereCriterion,
};
pub use filter::{FilterSpec, filter_by, filter_by_relation, multi_filter_by};
pub use search::{SearchColumns, apply_search};
pub use sort::{SortSpec, multi_sort_by, sort_by, sort_by_relation};
pub use sql::{Dialect, SqlStatement, render_count, render_select};
