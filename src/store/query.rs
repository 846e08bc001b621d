use std::cmp::Ordering;

use serde_json::Value;

use crate::models::document::{parse_timestamp, Document};

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Resume marker: the last document of the previous page.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub id: String,
    pub order_value: Option<Value>,
}

impl Cursor {
    pub fn from_document(doc: &Document, order_field: Option<&str>) -> Self {
        Self {
            id: doc.id.clone(),
            order_value: order_field.and_then(|f| doc.get(f).cloned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn order_field(&self) -> Option<&str> {
        self.order_by.as_ref().map(|o| o.field.as_str())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| doc.get(&f.field) == Some(&f.value))
    }

    /// Evaluates the query against a full collection: filter, order, skip
    /// past the cursor, then cut at the limit.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        matched.sort_by(|a, b| {
            self.compare(
                a.id.as_str(),
                self.order_value(a),
                b.id.as_str(),
                self.order_value(b),
            )
        });

        let start = match &self.start_after {
            Some(cursor) => matched
                .iter()
                .position(|d| {
                    self.compare(
                        d.id.as_str(),
                        self.order_value(d),
                        cursor.id.as_str(),
                        cursor.order_value.as_ref(),
                    ) == Ordering::Greater
                })
                .unwrap_or(matched.len()),
            None => 0,
        };

        let end = self
            .limit
            .map_or(matched.len(), |l| (start + l).min(matched.len()));
        matched.drain(start..end).collect()
    }

    fn order_value<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        self.order_field().and_then(|f| doc.get(f))
    }

    fn compare(&self, a_id: &str, a: Option<&Value>, b_id: &str, b: Option<&Value>) -> Ordering {
        let by_value = match &self.order_by {
            Some(order) => {
                let ord = OrderKey::of(a).cmp(&OrderKey::of(b));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            None => Ordering::Equal,
        };
        by_value.then_with(|| a_id.cmp(b_id))
    }
}

/// Sort key for field values. Timestamps sort chronologically next to plain
/// numbers; missing < bool < number/time < text.
#[derive(Debug, PartialEq)]
enum OrderKey {
    Missing,
    Bool(bool),
    Numeric(f64),
    Text(String),
}

impl OrderKey {
    fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => OrderKey::Missing,
            Some(Value::Bool(b)) => OrderKey::Bool(*b),
            Some(Value::Number(n)) => OrderKey::Numeric(n.as_f64().unwrap_or(0.0)),
            Some(v @ Value::String(s)) => match parse_timestamp(v) {
                Some(t) => OrderKey::Numeric(t.timestamp_millis() as f64 / 1000.0),
                None => OrderKey::Text(s.clone()),
            },
            Some(other) => OrderKey::Text(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            OrderKey::Missing => 0,
            OrderKey::Bool(_) => 1,
            OrderKey::Numeric(_) => 2,
            OrderKey::Text(_) => 3,
        }
    }
}

impl Eq for OrderKey {}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OrderKey::Bool(a), OrderKey::Bool(b)) => a.cmp(b),
            (OrderKey::Numeric(a), OrderKey::Numeric(b)) => a.total_cmp(b),
            (OrderKey::Text(a), OrderKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
