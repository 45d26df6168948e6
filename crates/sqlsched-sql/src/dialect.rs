//! Database dialect handling: the tagged dialect variant plus the
//! best-effort normalization applied before generic parsing.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lexer::QuoteEscape;

/// Supported database dialects. Pure data: every operation is
/// text-in/text-out with no shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    MySql,
    PostgreSql,
    GaussDb,
    Sqlite,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::MySql => "mysql",
            DbType::PostgreSql => "postgresql",
            DbType::GaussDb => "gaussdb",
            DbType::Sqlite => "sqlite",
        }
    }

    /// Rewrites a statement's quoting so the generic grammar accepts it.
    ///
    /// PostgreSQL and GaussDB rewrite double-quoted identifiers to the
    /// backtick form; the rewrite skips anything inside single-quoted
    /// string literals. GaussDB inherits the PostgreSQL rewrite before
    /// its own extension recognition. MySQL and SQLite statements pass
    /// through unchanged. Normalization never fails: constructs it does
    /// not model are left alone and the validator verdict decides.
    pub fn normalize(&self, sql: &str) -> String {
        for construct in self.extensions(sql) {
            debug!(dialect = self.as_str(), construct, "dialect construct recognized");
        }
        match self {
            DbType::PostgreSql | DbType::GaussDb => rewrite_double_quoted_identifiers(sql),
            DbType::MySql | DbType::Sqlite => sql.to_owned(),
        }
    }

    /// Dialect-specific constructs present in `sql`. Recognition only;
    /// nothing is transformed on the strength of this list.
    pub fn extensions(&self, sql: &str) -> Vec<&'static str> {
        let needles: &[(&'static str, &'static str)] = match self {
            DbType::MySql => &[
                ("backtick identifiers", "`"),
                ("AUTO_INCREMENT", "AUTO_INCREMENT"),
                ("storage engine clause", "ENGINE="),
                ("ON DUPLICATE KEY UPDATE", "ON DUPLICATE KEY UPDATE"),
            ],
            DbType::GaussDb => &[
                ("SERIAL8", "SERIAL8"),
                ("VARCHAR2", "VARCHAR2"),
                ("NUMBER", "NUMBER"),
                ("NEXTVAL", "NEXTVAL"),
                ("CURRVAL", "CURRVAL"),
            ],
            DbType::PostgreSql | DbType::Sqlite => &[],
        };

        let upper = sql.to_uppercase();
        needles
            .iter()
            .filter(|(_, needle)| upper.contains(needle))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Escape rule used when scanning this dialect's string literals.
    /// All dialects currently share [`QuoteEscape::Backslash`]; the
    /// seam is per-dialect so any of them can move to
    /// [`QuoteEscape::Doubled`] independently.
    pub fn quote_escape(&self) -> QuoteEscape {
        QuoteEscape::Backslash
    }

    /// Whether `sql` is a dialect-only directive that the generic
    /// grammar does not model and which therefore skips validation.
    /// Currently only SQLite `PRAGMA` statements qualify.
    pub fn is_directive(&self, sql: &str) -> bool {
        match self {
            DbType::Sqlite => crate::lexer::leading_keyword(sql)
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case("pragma")),
            _ => false,
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql" => Ok(DbType::MySql),
            "postgresql" => Ok(DbType::PostgreSql),
            "gaussdb" => Ok(DbType::GaussDb),
            "sqlite" => Ok(DbType::Sqlite),
            other => Err(anyhow!("unknown database type: {}", other)),
        }
    }
}

/// Replaces `"` with `` ` `` outside single-quoted string literals.
fn rewrite_double_quoted_identifiers(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut in_single = false;

    for (i, &c) in chars.iter().enumerate() {
        if c == '\'' {
            if !in_single {
                in_single = true;
            } else if i == 0 || chars[i - 1] != '\\' {
                in_single = false;
            }
            out.push(c);
        } else if c == '"' && !in_single {
            out.push('`');
        } else {
            out.push(c);
        }
    }

    out
}
