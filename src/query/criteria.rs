//! Named, reusable query constraints and the one-shot stack that holds them
//!
//! Criteria pushed onto a [`CriteriaStack`] apply to the next query the
//! repository executes and are then dropped. The stack moves through
//! `Idle -> Loaded -> Executed`; pushing again after execution starts a new
//! round.

use crate::core::error::{CriteriaError, Result};
use crate::core::field::FieldValue;
use crate::core::schema::Schema;
use crate::query::builder::{Boolean, ColumnRef, Direction, Operator, Query};
use crate::query::filter::{FilterSpec, multi_filter_by};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A query constraint.
///
/// `name` identifies the kind of criterion (used by
/// [`CriteriaStack::remove_criteria`]); `fingerprint` captures its state and
/// feeds the cache key. Two criteria with the same name and fingerprint are
/// assumed to constrain a query identically.
pub trait Criterion: Send + Sync {
    fn name(&self) -> &str;

    fn fingerprint(&self) -> Value {
        Value::Null
    }

    fn apply(&self, query: Query, schema: &Schema) -> Result<Query>;
}

/// Lifecycle of a [`CriteriaStack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackState {
    #[default]
    Idle,
    Loaded,
    Executed,
}

/// FIFO stack of criteria, cleared after it is applied once
#[derive(Clone, Default)]
pub struct CriteriaStack {
    state: StackState,
    stack: Vec<Arc<dyn Criterion>>,
}

impl fmt::Debug for CriteriaStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriteriaStack")
            .field("state", &self.state)
            .field("criteria", &self.stack.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl CriteriaStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    /// Append a criterion; duplicates are kept
    pub fn add_criteria(&mut self, criterion: Arc<dyn Criterion>) -> &mut Self {
        self.stack.push(criterion);
        self.state = StackState::Loaded;
        self
    }

    /// Remove every criterion named `name`, or all of them when `name` is empty
    pub fn remove_criteria(&mut self, name: &str) -> bool {
        if name.is_empty() {
            self.stack.clear();
        } else {
            self.stack.retain(|criterion| criterion.name() != name);
        }
        if self.stack.is_empty() && self.state == StackState::Loaded {
            self.state = StackState::Idle;
        }
        true
    }

    pub fn has_criteria(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn criteria(&self) -> &[Arc<dyn Criterion>] {
        &self.stack
    }

    /// `[{"name": .., "state": ..}, ..]` in stack order
    pub fn fingerprints(&self) -> Vec<Value> {
        self.stack
            .iter()
            .map(|criterion| json!({ "name": criterion.name(), "state": criterion.fingerprint() }))
            .collect()
    }

    /// Apply every criterion in order, then clear the stack.
    ///
    /// The stack is cleared even when a criterion fails.
    pub fn execute_on(&mut self, query: Query, schema: &Schema) -> Result<Query> {
        let stack = std::mem::take(&mut self.stack);
        self.state = StackState::Executed;

        if !stack.is_empty() {
            tracing::debug!(table = %query.table, criteria = stack.len(), "applying criteria");
        }
        stack
            .iter()
            .try_fold(query, |query, criterion| criterion.apply(query, schema))
    }

    /// Drop the pending criteria without applying them (a cache hit served
    /// the operation they were meant for)
    pub fn discard(&mut self) {
        self.stack.clear();
        self.state = StackState::Executed;
    }

    /// Move the pending criteria out, leaving this stack executed
    pub fn take(&mut self) -> CriteriaStack {
        let taken = CriteriaStack {
            state: self.state,
            stack: std::mem::take(&mut self.stack),
        };
        self.state = StackState::Executed;
        taken
    }
}

/// `column <operator> value`
#[derive(Debug, Clone)]
pub struct WhereCriterion {
    pub column: String,
    pub operator: Operator,
    pub value: FieldValue,
    pub boolean: Boolean,
}

impl WhereCriterion {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<FieldValue>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            boolean: Boolean::And,
        }
    }
}

impl Criterion for WhereCriterion {
    fn name(&self) -> &str {
        "where"
    }

    fn fingerprint(&self) -> Value {
        json!({
            "column": self.column,
            "operator": self.operator,
            "value": self.value,
            "boolean": self.boolean,
        })
    }

    fn apply(&self, query: Query, schema: &Schema) -> Result<Query> {
        let column = ColumnRef::parse(&self.column);
        if column.table.is_none() {
            schema.table(&query.table)?.ensure_column(&column.column)?;
        }
        Ok(query.where_with(self.boolean, &self.column, self.operator, self.value.clone()))
    }
}

/// Order by a column
#[derive(Debug, Clone)]
pub struct OrderByCriterion {
    pub column: String,
    pub direction: Direction,
}

impl OrderByCriterion {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

impl Criterion for OrderByCriterion {
    fn name(&self) -> &str {
        "order_by"
    }

    fn fingerprint(&self) -> Value {
        json!({ "column": self.column, "direction": self.direction })
    }

    fn apply(&self, query: Query, _schema: &Schema) -> Result<Query> {
        Ok(query.order_by(ColumnRef::parse(&self.column), self.direction))
    }
}

/// A filter specification packaged as a criterion
#[derive(Debug, Clone)]
pub struct FilterCriterion {
    pub filter: FilterSpec,
}

impl Criterion for FilterCriterion {
    fn name(&self) -> &str {
        "filter"
    }

    fn fingerprint(&self) -> Value {
        json!(self.filter)
    }

    fn apply(&self, query: Query, schema: &Schema) -> Result<Query> {
        multi_filter_by(query, schema, &self.filter)
    }
}

type ApplyFn = dyn Fn(Query, &Schema) -> Result<Query> + Send + Sync;

/// Ad-hoc criterion built from a closure.
///
/// Closures are opaque, so the caller supplies the fingerprint. Two closures
/// sharing a name and fingerprint share cache entries.
pub struct FnCriterion {
    name: String,
    fingerprint: Value,
    apply: Box<ApplyFn>,
}

impl FnCriterion {
    pub fn new<F>(name: impl Into<String>, fingerprint: Value, apply: F) -> Self
    where
        F: Fn(Query, &Schema) -> Result<Query> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fingerprint,
            apply: Box::new(apply),
        }
    }
}

impl Criterion for FnCriterion {
    fn name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> Value {
        self.fingerprint.clone()
    }

    fn apply(&self, query: Query, schema: &Schema) -> Result<Query> {
        (self.apply)(query, schema)
    }
}

/// Builds a criterion from JSON arguments
pub type CriterionFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Criterion>> + Send + Sync>;

/// Criteria constructible by name, for configuration and dynamic calls
#[derive(Clone)]
pub struct CriteriaRegistry {
    factories: HashMap<String, CriterionFactory>,
}

impl fmt::Debug for CriteriaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("CriteriaRegistry").field("names", &names).finish()
    }
}

impl Default for CriteriaRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Deserialize)]
struct WhereArgs {
    column: String,
    #[serde(default = "default_operator")]
    operator: String,
    value: FieldValue,
    #[serde(default)]
    boolean: Boolean,
}

fn default_operator() -> String {
    "=".to_string()
}

#[derive(Deserialize)]
struct OrderByArgs {
    column: String,
    #[serde(default)]
    direction: Direction,
}

impl CriteriaRegistry {
    /// A registry with no criteria
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in `where`, `order_by` and `filter` criteria
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register("where", |args| {
            let args: WhereArgs = parse_args("where", args)?;
            let operator = args.operator.parse::<Operator>()?;
            Ok(Arc::new(WhereCriterion {
                column: args.column,
                operator,
                value: args.value,
                boolean: args.boolean,
            }) as Arc<dyn Criterion>)
        });

        registry.register("order_by", |args| {
            let args: OrderByArgs = parse_args("order_by", args)?;
            Ok(Arc::new(OrderByCriterion::new(args.column, args.direction)) as Arc<dyn Criterion>)
        });

        registry.register("filter", |args| {
            let filter: FilterSpec = parse_args("filter", args)?;
            Ok(Arc::new(FilterCriterion { filter }) as Arc<dyn Criterion>)
        });

        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn Criterion>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the criterion registered as `name`
    pub fn make(&self, name: &str, args: &Value) -> Result<Arc<dyn Criterion>> {
        match self.factories.get(name) {
            Some(factory) => factory(args),
            None => {
                tracing::warn!(criteria = %name, "rejected unknown criteria");
                Err(CriteriaError::InvalidCriteria {
                    name: name.to_string(),
                }
                .into())
            }
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, args: &Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| {
        CriteriaError::InvalidArguments {
            name: name.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}
