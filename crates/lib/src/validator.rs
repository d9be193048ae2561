//! # SQL Validator
//!
//! The gate every candidate statement passes before it may reach the store,
//! regardless of whether a rule or the model produced it. Checks run in order:
//!
//! 1. The text is a single `SELECT` (no second statement, no write/DDL keyword,
//!    parses to exactly one query).
//! 2. Every table and column it references exists in the `SchemaDescriptor`.
//! 3. It carries no comments and no terminator beyond a single trailing `;`.
//!
//! Acceptance yields a `ValidatedSql`, the only type the executor takes.

use crate::schema::{SchemaDescriptor, TableDescriptor};
use serde::{Serialize, Serializer};
use sqlparser::ast::{
    Expr, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor, Visit, Visitor,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::ControlFlow;

/// Words that never appear in a read-only statement.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "ATTACH", "DETACH", "CREATE", "PRAGMA",
    "VACUUM", "REINDEX", "TRUNCATE",
];

/// Why a candidate was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NonSelect,
    UnknownIdentifier,
    MultiStatement,
    CommentInjection,
    Unparseable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NonSelect => "non-SELECT",
            RejectReason::UnknownIdentifier => "unknown identifier",
            RejectReason::MultiStatement => "multi-statement",
            RejectReason::CommentInjection => "comment injection",
            RejectReason::Unparseable => "unparseable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RejectReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A rejection with a human-readable detail, e.g. the unknown column's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// A statement that passed every check. It can only be built by `validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted(ValidatedSql),
    Rejected(Rejection),
}

impl ValidationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationVerdict::Accepted(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            ValidationVerdict::Accepted(_) => None,
            ValidationVerdict::Rejected(rejection) => Some(rejection.reason),
        }
    }

    pub fn into_result(self) -> Result<ValidatedSql, Rejection> {
        match self {
            ValidationVerdict::Accepted(sql) => Ok(sql),
            ValidationVerdict::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Validates a candidate statement against the schema.
pub fn validate(candidate: &str, schema: &SchemaDescriptor) -> ValidationVerdict {
    match check(candidate, schema) {
        Ok(()) => {
            let sql = candidate.trim().trim_end_matches(';').trim_end();
            ValidationVerdict::Accepted(ValidatedSql(sql.to_string()))
        }
        Err(rejection) => ValidationVerdict::Rejected(rejection),
    }
}

fn check(candidate: &str, schema: &SchemaDescriptor) -> Result<(), Rejection> {
    let dialect = SQLiteDialect {};
    let tokens = Tokenizer::new(&dialect, candidate)
        .tokenize()
        .map_err(|e| Rejection::new(RejectReason::Unparseable, e.to_string()))?;

    // 1. A single SELECT.
    check_single_statement(&tokens)?;
    check_forbidden_keywords(&tokens)?;
    let statement = parse_single_query(&dialect, candidate)?;

    // 2. Identifiers exist.
    let mut references = References::default();
    let _ = statement.visit(&mut references);
    references.resolve(schema)?;

    // 3. No comments and at most one trailing terminator.
    check_comments_and_terminators(&tokens)
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_) | Token::EOF)
}

fn check_single_statement(tokens: &[Token]) -> Result<(), Rejection> {
    let Some(separator) = tokens.iter().position(|t| matches!(t, Token::SemiColon)) else {
        return Ok(());
    };
    let follows = tokens[separator + 1..]
        .iter()
        .any(|t| !is_trivia(t) && !matches!(t, Token::SemiColon));
    if follows {
        return Err(Rejection::new(
            RejectReason::MultiStatement,
            "a statement separator is followed by another statement",
        ));
    }
    Ok(())
}

fn check_forbidden_keywords(tokens: &[Token]) -> Result<(), Rejection> {
    for token in tokens {
        if let Token::Word(word) = token {
            if word.quote_style.is_none() {
                let upper = word.value.to_ascii_uppercase();
                if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                    return Err(Rejection::new(
                        RejectReason::NonSelect,
                        format!("'{upper}' is not allowed in a read-only query"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn parse_single_query(dialect: &SQLiteDialect, candidate: &str) -> Result<Statement, Rejection> {
    let mut statements = Parser::parse_sql(dialect, candidate)
        .map_err(|e| Rejection::new(RejectReason::Unparseable, e.to_string()))?;
    match statements.len() {
        0 => Err(Rejection::new(RejectReason::Unparseable, "no statement found")),
        1 => {
            let statement = statements.remove(0);
            if matches!(statement, Statement::Query(_)) {
                Ok(statement)
            } else {
                Err(Rejection::new(
                    RejectReason::NonSelect,
                    format!("expected a SELECT query, found: {statement}"),
                ))
            }
        }
        n => Err(Rejection::new(
            RejectReason::MultiStatement,
            format!("found {n} statements"),
        )),
    }
}

fn check_comments_and_terminators(tokens: &[Token]) -> Result<(), Rejection> {
    let has_comment = tokens.iter().any(|t| {
        matches!(
            t,
            Token::Whitespace(Whitespace::SingleLineComment { .. })
                | Token::Whitespace(Whitespace::MultiLineComment(_))
        )
    });
    if has_comment {
        return Err(Rejection::new(
            RejectReason::CommentInjection,
            "comments are not allowed",
        ));
    }
    let terminators = tokens
        .iter()
        .filter(|t| matches!(t, Token::SemiColon))
        .count();
    if terminators > 1 {
        return Err(Rejection::new(
            RejectReason::CommentInjection,
            "only a single trailing terminator is allowed",
        ));
    }
    Ok(())
}

fn lower(value: &str) -> String {
    value.to_lowercase()
}

/// The last segment of a possibly qualified name, unquoted and lower-cased.
fn object_name_tail(name: &ObjectName) -> String {
    let rendered = name.to_string();
    let tail = rendered.rsplit('.').next().unwrap_or(&rendered);
    lower(tail.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']'))
}

/// Names collected from one statement, resolved against the schema afterwards
/// since a select list is visited before the FROM clause that defines its aliases.
#[derive(Debug, Default)]
struct References {
    relations: Vec<String>,
    table_aliases: HashMap<String, String>,
    /// CTE names and derived-table aliases; their columns are not in the schema.
    local_sources: HashSet<String>,
    output_aliases: HashSet<String>,
    columns: Vec<(Option<String>, String)>,
}

impl References {
    fn collect_output_aliases(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    if let SelectItem::ExprWithAlias { alias, .. } = item {
                        self.output_aliases.insert(lower(&alias.value));
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_output_aliases(left);
                self.collect_output_aliases(right);
            }
            SetExpr::Query(query) => self.collect_output_aliases(&query.body),
            _ => {}
        }
    }

    fn resolve(&self, schema: &SchemaDescriptor) -> Result<(), Rejection> {
        let unknown = |what: String| Rejection::new(RejectReason::UnknownIdentifier, what);

        let mut referenced: Vec<&TableDescriptor> = Vec::new();
        for relation in &self.relations {
            if self.local_sources.contains(relation) {
                continue;
            }
            match schema.table(relation) {
                Some(table) => referenced.push(table),
                None => return Err(unknown(format!("unknown table '{relation}'"))),
            }
        }

        for (qualifier, column) in &self.columns {
            match qualifier {
                Some(qualifier) => {
                    let source = self.table_aliases.get(qualifier).unwrap_or(qualifier);
                    if let Some(table) = schema.table(source) {
                        if !table.has_column(column) {
                            return Err(unknown(format!(
                                "unknown column '{qualifier}.{column}' (table '{}')",
                                table.name
                            )));
                        }
                    } else if self.local_sources.contains(source)
                        || self.local_sources.contains(qualifier)
                    {
                        if !schema.has_column_anywhere(column)
                            && !self.output_aliases.contains(column)
                        {
                            return Err(unknown(format!("unknown column '{qualifier}.{column}'")));
                        }
                    } else {
                        return Err(unknown(format!("unknown table or alias '{qualifier}'")));
                    }
                }
                None => {
                    let known = referenced.iter().any(|t| t.has_column(column))
                        || self.output_aliases.contains(column)
                        || (!self.local_sources.is_empty() && schema.has_column_anywhere(column));
                    if !known {
                        return Err(unknown(format!("unknown column '{column}'")));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Visitor for References {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.local_sources.insert(lower(&cte.alias.name.value));
            }
        }
        self.collect_output_aliases(&query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.push(object_name_tail(relation));
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            TableFactor::Table {
                name,
                alias: Some(alias),
                ..
            } => {
                self.table_aliases
                    .insert(lower(&alias.name.value), object_name_tail(name));
            }
            TableFactor::Derived {
                alias: Some(alias), ..
            } => {
                self.local_sources.insert(lower(&alias.name.value));
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => self.columns.push((None, lower(&ident.value))),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let column = lower(&parts[parts.len() - 1].value);
                let qualifier = lower(&parts[parts.len() - 2].value);
                self.columns.push((Some(qualifier), column));
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}
