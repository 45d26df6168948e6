//! Character-level SQL preprocessing: comment removal and statement
//! splitting that honor quoted string literals.

use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::dialect::DbType;

/// How a quote character may be escaped inside a string literal.
///
/// The scan needs just enough escape awareness to know whether a quote
/// closes the literal; it is not full dialect-exact escape parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteEscape {
    /// A quote preceded by a backslash does not close the literal.
    /// Under this rule a doubled quote reads as close-then-reopen,
    /// which keeps the scan consistent for standard SQL too.
    #[default]
    Backslash,
    /// A doubled quote reads as one escaped quote (the standard SQL
    /// convention).
    Doubled,
}

/// Removes `--` line comments and `/* */` block comments from raw SQL,
/// using the backslash escape rule.
pub fn strip_comments(sql: &str) -> String {
    strip_comments_with(sql, QuoteEscape::Backslash)
}

/// Removes `--` line comments and `/* */` block comments from raw SQL.
///
/// The scan runs in one pass over the characters with four mutually
/// exclusive states: normal text, line comment, block comment, and
/// string literal. A literal opens at an unescaped `'` or `"` and
/// closes at the next matching unescaped quote per `escape`; comment
/// markers inside a literal are copied verbatim. The terminator ending
/// a line comment is preserved so line numbering of the remaining text
/// is unaffected; block comments are dropped entirely.
pub fn strip_comments_with(sql: &str, escape: QuoteEscape) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());

    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut in_string = false;
    let mut quote = '\0';

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if !in_line_comment && !in_block_comment {
            if !in_string && (c == '\'' || c == '"') {
                in_string = true;
                quote = c;
                out.push(c);
                i += 1;
                continue;
            }
            if in_string && c == quote {
                match escape {
                    QuoteEscape::Backslash if i > 0 && chars[i - 1] == '\\' => {
                        // Escaped; stays inside the literal.
                    }
                    QuoteEscape::Doubled if next == Some(quote) => {
                        out.push(c);
                        out.push(c);
                        i += 2;
                        continue;
                    }
                    _ => {
                        in_string = false;
                        out.push(c);
                        i += 1;
                        continue;
                    }
                }
            }
        }

        if in_string {
            out.push(c);
            i += 1;
            continue;
        }

        if !in_line_comment && !in_block_comment && c == '-' && next == Some('-') {
            in_line_comment = true;
            i += 2;
            continue;
        }

        if !in_line_comment && !in_block_comment && c == '/' && next == Some('*') {
            in_block_comment = true;
            i += 2;
            continue;
        }

        if in_line_comment && (c == '\n' || c == '\r') {
            in_line_comment = false;
            out.push(c);
            i += 1;
            continue;
        }

        if in_block_comment && c == '*' && next == Some('/') {
            in_block_comment = false;
            i += 2;
            continue;
        }

        if !in_line_comment && !in_block_comment {
            out.push(c);
        }
        i += 1;
    }

    out
}

/// Splits multi-statement text into individual statements.
///
/// The structured grammar is tried first so statements come back in a
/// canonical rendering; text it rejects (typically dialect-specific
/// extensions) falls back to the semicolon scan. Both strategies agree
/// on the statement count for well-formed standard SQL.
pub fn split_statements(text: &str) -> Vec<String> {
    split_statements_with(text, QuoteEscape::Backslash)
}

fn split_statements_with(text: &str, escape: QuoteEscape) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match Parser::parse_sql(&GenericDialect {}, trimmed) {
        Ok(statements) => statements.iter().map(|stmt| stmt.to_string()).collect(),
        Err(err) => {
            debug!(error = %err, "structured split failed; falling back to semicolon scan");
            split_fallback_with(trimmed, escape)
        }
    }
}

/// Splits SQL text on semicolons that sit outside string literals,
/// using the backslash escape rule.
pub fn split_fallback(text: &str) -> Vec<String> {
    split_fallback_with(text, QuoteEscape::Backslash)
}

/// Splits SQL text on semicolons that sit outside string literals.
///
/// Tracks the same string state as [`strip_comments_with`], so a
/// literal `;` inside a quoted value never produces a spurious split.
/// Pieces are trimmed and empty pieces discarded: terminator-free input
/// yields exactly one statement and a trailing terminator yields no
/// extra one.
pub fn split_fallback_with(text: &str, escape: QuoteEscape) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();

    let mut in_string = false;
    let mut quote = '\0';

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if !in_string && (c == '\'' || c == '"') {
            in_string = true;
            quote = c;
        } else if in_string && c == quote {
            match escape {
                QuoteEscape::Backslash => {
                    if i == 0 || chars[i - 1] != '\\' {
                        in_string = false;
                    }
                }
                QuoteEscape::Doubled => {
                    if chars.get(i + 1).copied() == Some(quote) {
                        current.push(c);
                        current.push(c);
                        i += 2;
                        continue;
                    }
                    in_string = false;
                }
            }
        }

        if c == ';' && !in_string {
            let piece = current.trim();
            if !piece.is_empty() {
                statements.push(piece.to_owned());
            }
            current.clear();
        } else {
            current.push(c);
        }
        i += 1;
    }

    let last = current.trim();
    if !last.is_empty() {
        statements.push(last.to_owned());
    }

    statements
}

/// Comment stripping and splitting in one step, with the escape rule
/// the dialect prescribes. This is the shape in which task entries and
/// `.sql` file contents enter validation.
pub fn extract_statements(text: &str, db_type: DbType) -> Vec<String> {
    let escape = db_type.quote_escape();
    split_statements_with(&strip_comments_with(text, escape), escape)
}

/// First run of identifier characters in `sql`, ignoring leading
/// whitespace. `None` when the text starts with anything else.
pub(crate) fn leading_keyword(sql: &str) -> Option<&str> {
    let trimmed = sql.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(trimmed.len());
    (end > 0).then(|| &trimmed[..end])
}
