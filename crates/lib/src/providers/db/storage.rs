use crate::{
    errors::ProviderError, schema::SchemaDescriptor, types::Row, validator::ValidatedSql,
};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// Rows returned by a query, capped at the requested maximum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    /// True when the statement produced more rows than the cap allowed.
    pub truncated: bool,
}

/// A trait for interacting with the relational store.
///
/// Only statements that passed the validator can be executed: `execute_query`
/// takes a `ValidatedSql`, which nothing but `validator::validate` can construct.
#[async_trait]
pub trait Storage: Send + Sync + DynClone + Debug {
    /// Returns the name of the storage provider (e.g., "SQLite").
    fn name(&self) -> &str;

    /// Runs a validated statement and returns at most `max_rows` rows.
    async fn execute_query(
        &self,
        sql: &ValidatedSql,
        max_rows: usize,
    ) -> Result<QueryOutput, ProviderError>;

    /// Reads the store's actual table and column layout.
    async fn describe_schema(&self) -> Result<SchemaDescriptor, ProviderError>;
}

dyn_clone::clone_trait_object!(Storage);
