// src/core/bulk/values.rs

//! A small dynamically-typed bind value, used by `BulkInsertGeneric` so one
//! insert loop can serve tables with different column shapes without
//! duplicating the batching/savepoint dance per table.

use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

#[derive(Debug, Clone)]
pub enum BindValue {
    I64(i64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Null,
}

impl BindValue {
    /// A rough byte-size estimate used for `CalculateOptimalBatchSize`'s
    /// `avgFieldSize` input.
    pub fn approx_size(&self) -> usize {
        match self {
            BindValue::I64(_) => 8,
            BindValue::Text(s) => s.len(),
            BindValue::Blob(b) => b.len(),
            BindValue::Bool(_) => 1,
            BindValue::Null => 0,
        }
    }

    pub fn bind<'q>(&'q self, query: Query<'q, Any, AnyArguments<'q>>) -> Query<'q, Any, AnyArguments<'q>> {
        match self {
            BindValue::I64(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
            BindValue::Blob(v) => query.bind(v.as_slice()),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Null => query.bind(Option::<i64>::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_size_reflects_payload_length() {
        assert_eq!(BindValue::Text("hello".into()).approx_size(), 5);
        assert_eq!(BindValue::Blob(vec![0u8; 10]).approx_size(), 10);
        assert_eq!(BindValue::Null.approx_size(), 0);
    }
}
