//! Row selection queries.

use serde_json::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// A selection against one collection.
///
/// An empty column list selects every column. Conditions are equality
/// checks joined by `AND`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Projected columns.
    pub columns: Vec<String>,
    /// Equality conditions.
    pub conditions: Vec<(String, Value)>,
    /// Ordering.
    pub order_by: Vec<(String, OrderDirection)>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Number of rows to skip.
    pub offset: Option<u64>,
}

impl Query {
    /// Select every column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the projected columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add an equality condition.
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// Add an ordering term.
    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    /// Set the row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the row offset.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Every column name the query references.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .chain(self.conditions.iter().map(|(c, _)| c.as_str()))
            .chain(self.order_by.iter().map(|(c, _)| c.as_str()))
    }
}
