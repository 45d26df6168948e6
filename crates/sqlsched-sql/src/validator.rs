//! Statement-level syntax checking on top of the structured grammar.

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use tracing::debug;

use crate::dialect::DbType;
use crate::lexer::leading_keyword;

/// Verbs a statement must open with to be worth handing to the parser.
/// A cheap pre-filter, not a substitute for parsing.
const SQL_VERBS: [&str; 13] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE", "MERGE",
    "WITH", "BEGIN", "CALL", "DECLARE",
];

/// Configuration problems that make a validity verdict meaningless.
/// Distinct from an invalid-statement verdict, which is an `Ok(false)`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SqlCheckError {
    #[error("database type must be specified before SQL can be validated")]
    MissingDialect,
}

/// Returns whether `sql` parses as an acceptable statement for the
/// given dialect.
///
/// Empty or whitespace-only input is invalid rather than an error; a
/// missing dialect is a configuration error rather than a verdict.
/// SQLite directives (`PRAGMA …`) are accepted outright since the
/// generic grammar does not model them. Everything else is normalized
/// per the dialect and handed to the parser; a parse failure is an
/// ordinary `Ok(false)`.
pub fn is_valid(sql: &str, db_type: Option<DbType>) -> Result<bool, SqlCheckError> {
    let db_type = db_type.ok_or(SqlCheckError::MissingDialect)?;

    let sql = sql.trim();
    if sql.is_empty() {
        return Ok(false);
    }

    if db_type.is_directive(sql) {
        return Ok(true);
    }

    let Some(keyword) = leading_keyword(sql) else {
        return Ok(false);
    };
    if !SQL_VERBS.iter().any(|verb| keyword.eq_ignore_ascii_case(verb)) {
        return Ok(false);
    }

    let normalized = db_type.normalize(sql);
    match Parser::parse_sql(&GenericDialect {}, &normalized) {
        Ok(_) => Ok(true),
        Err(err) => {
            debug!(dialect = db_type.as_str(), error = %err, "statement rejected by parser");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DIALECTS: [DbType; 4] = [
        DbType::MySql,
        DbType::PostgreSql,
        DbType::GaussDb,
        DbType::Sqlite,
    ];

    #[test]
    fn empty_input_is_invalid_for_every_dialect() {
        for db in ALL_DIALECTS {
            assert_eq!(is_valid("", Some(db)), Ok(false));
            assert_eq!(is_valid("   \n", Some(db)), Ok(false));
        }
    }

    #[test]
    fn missing_dialect_is_a_configuration_error() {
        assert_eq!(
            is_valid("SELECT 1", None),
            Err(SqlCheckError::MissingDialect)
        );
    }

    #[test]
    fn well_formed_statements_pass() {
        for db in ALL_DIALECTS {
            assert_eq!(is_valid("SELECT id, name FROM users", Some(db)), Ok(true));
            assert_eq!(
                is_valid("INSERT INTO t (a, b) VALUES (1, 'x')", Some(db)),
                Ok(true)
            );
            assert_eq!(
                is_valid("CREATE TABLE t (id INT PRIMARY KEY)", Some(db)),
                Ok(true)
            );
        }
    }

    #[test]
    fn malformed_statement_fails_for_every_dialect() {
        for db in ALL_DIALECTS {
            assert_eq!(is_valid("SELECT FROM users WHERE;", Some(db)), Ok(false));
        }
    }

    #[test]
    fn non_sql_prefix_is_rejected_before_parsing() {
        assert_eq!(is_valid("GRANT ALL ON t TO u", Some(DbType::MySql)), Ok(false));
        assert_eq!(is_valid("hello world", Some(DbType::Sqlite)), Ok(false));
    }

    #[test]
    fn keyword_prefix_is_case_insensitive() {
        assert_eq!(is_valid("select 1", Some(DbType::MySql)), Ok(true));
        assert_eq!(is_valid("SeLeCt 1", Some(DbType::MySql)), Ok(true));
    }

    #[test]
    fn postgres_double_quoted_identifiers_validate() {
        assert_eq!(
            is_valid(r#"SELECT "id" FROM "users""#, Some(DbType::PostgreSql)),
            Ok(true)
        );
        assert_eq!(
            is_valid(r#"SELECT "id" FROM "users""#, Some(DbType::GaussDb)),
            Ok(true)
        );
    }

    #[test]
    fn mysql_backticks_validate() {
        assert_eq!(
            is_valid("SELECT `id` FROM `users`", Some(DbType::MySql)),
            Ok(true)
        );
    }

    #[test]
    fn sqlite_pragma_is_exempt_from_the_grammar() {
        assert_eq!(
            is_valid("PRAGMA foreign_keys = ON", Some(DbType::Sqlite)),
            Ok(true)
        );
        // Other dialects have no such directive and fail the prefix check.
        assert_eq!(
            is_valid("PRAGMA foreign_keys = ON", Some(DbType::MySql)),
            Ok(false)
        );
    }
}
