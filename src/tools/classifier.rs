//! Statement classification for the free-text SQL tools.
//!
//! The classifier looks at the leading keyword only; it never parses the
//! statement body. Tokenization goes through the sqlparser tokenizer so
//! comments, string literals, quoted identifiers and dollar-quoted bodies are
//! skipped exactly the way the database would skip them. That matters for two
//! decisions made here:
//! - the leading keyword is the first real word after any comments
//! - a statement terminator only counts when it sits outside quotes and comments
//!
//! A payload holding more than one statement is rejected instead of being
//! classified by its first statement.

use crate::db::Backend;
use crate::error::{GatewayError, GatewayResult};
use crate::models::QueryKind;
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Token, Tokenizer};

/// Error messages returned for rejected payloads.
mod error_messages {
    pub const EMPTY: &str = "Empty SQL statement";
    pub const MULTIPLE: &str =
        "Multiple SQL statements are not allowed. Submit exactly one statement per call.";
    pub const TOKENIZE: &str = "Could not determine statement boundaries";
}

/// Classifies free-text SQL by its leading keyword.
#[derive(Debug, Clone, Copy)]
pub struct QueryClassifier {
    backend: Backend,
}

impl QueryClassifier {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.backend {
            Backend::Postgres => Box::new(PostgreSqlDialect {}),
            Backend::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    /// Classify one statement.
    ///
    /// Fails with `InvalidInput` for empty input, for input holding more than
    /// one statement, and for input whose quotes or comments are unterminated.
    pub fn classify(&self, sql: &str) -> GatewayResult<QueryKind> {
        let dialect = self.dialect();
        let tokens = Tokenizer::new(dialect.as_ref(), sql)
            .tokenize()
            .map_err(|e| {
                GatewayError::invalid_input(format!("{}: {}", error_messages::TOKENIZE, e))
            })?;

        let mut significant = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF));

        let first = loop {
            match significant.next() {
                Some(Token::SemiColon) => continue,
                Some(token) => break token,
                None => return Err(GatewayError::invalid_input(error_messages::EMPTY)),
            }
        };

        // Anything after a terminator other than more terminators is a second statement.
        let mut terminated = false;
        for token in significant {
            match token {
                Token::SemiColon => terminated = true,
                _ if terminated => {
                    return Err(GatewayError::invalid_input(error_messages::MULTIPLE));
                }
                _ => {}
            }
        }

        Ok(match first {
            Token::Word(word) if word.quote_style.is_none() => {
                kind_for_keyword(&word.value.to_ascii_uppercase())
            }
            _ => QueryKind::Unknown,
        })
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new(Backend::Postgres)
    }
}

/// Classify with the PostgreSQL tokenizer rules.
pub fn classify(sql: &str) -> GatewayResult<QueryKind> {
    QueryClassifier::default().classify(sql)
}

fn kind_for_keyword(keyword: &str) -> QueryKind {
    match keyword {
        "SELECT" | "WITH" => QueryKind::Dql,
        "INSERT" | "UPDATE" | "DELETE" => QueryKind::Dml,
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" => QueryKind::Ddl,
        _ => QueryKind::Unknown,
    }
}
