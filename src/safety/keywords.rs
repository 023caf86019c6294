//! Token-level guard for write and DDL keywords.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Keywords that never appear in a read-only analytical query.
pub const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "GRANT",
    "REVOKE", "UNLOAD", "MSCK",
];

/// Returns the first unquoted write keyword in `sql`.
///
/// String literals, quoted identifiers and comments are separate tokens, so
/// `WHERE note = 'drop'` does not match. Returns `None` if `sql` cannot be
/// tokenized; the parser rejects such text anyway.
pub fn find_write_keyword(sql: &str) -> Option<&'static str> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize().ok()?;
    tokens.iter().find_map(|token| match token {
        Token::Word(word) if word.quote_style.is_none() => WRITE_KEYWORDS
            .iter()
            .find(|k| word.value.eq_ignore_ascii_case(k))
            .copied(),
        _ => None,
    })
}
