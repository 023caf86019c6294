//! Extracts a single SQL statement from raw generator output.
//!
//! Generator output is untrusted text: it may wrap the query in Markdown
//! fences, surround it with prose, or contain several statements.

use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer};

use crate::error::{Result, TripSqlError};
use crate::safety::find_write_keyword;

/// Words that can open a statement. Write statements are included so they
/// reach the validator and are rejected there as unsafe.
const STATEMENT_STARTS: &[&str] = &[
    "SELECT", "WITH", "VALUES", "EXPLAIN", "SHOW", "DESCRIBE", "INSERT", "UPDATE", "DELETE",
    "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "GRANT", "REVOKE", "UNLOAD", "MSCK",
];

/// Returns the single SQL statement in `raw`.
///
/// Fails with `AmbiguousGeneration` when the response holds no statement or
/// more than one. A multi-statement response that contains a write keyword
/// is returned whole so the validator rejects it as `UnsafeStatement`.
pub fn extract_sql(raw: &str) -> Result<String> {
    let body = match fenced_blocks(raw)? {
        Some(block) => block,
        None => unfenced_sql(raw)?,
    };

    let statements = split_statements(&body);
    match statements.len() {
        0 => Err(TripSqlError::ambiguous_generation(
            "Response contains no SQL statement",
        )),
        1 => Ok(statements[0].to_string()),
        n if find_write_keyword(&body).is_some() => {
            tracing::debug!(statements = n, "Passing multi-statement write to the validator");
            Ok(body.trim().to_string())
        }
        n => Err(TripSqlError::ambiguous_generation(format!(
            "Response contains {} SQL statements, expected one",
            n
        ))),
    }
}

/// Returns the content of the only non-empty fenced block, `None` if there
/// are no complete fences.
fn fenced_blocks(raw: &str) -> Result<Option<String>> {
    let mut blocks = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        // The language tag runs to the end of the fence line.
        let Some(newline) = after_open.find('\n') else {
            break;
        };
        let content = &after_open[newline + 1..];
        let Some(close) = content.find("```") else {
            break;
        };
        let block = content[..close].trim();
        if !block.is_empty() {
            blocks.push(block.to_string());
        }
        rest = &content[close + 3..];
    }

    match blocks.len() {
        0 => Ok(None),
        1 => Ok(blocks.pop()),
        n => Err(TripSqlError::ambiguous_generation(format!(
            "Response contains {} code blocks, expected one",
            n
        ))),
    }
}

fn first_word(line: &str) -> String {
    line.trim_start()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
        .to_uppercase()
}

fn starts_statement(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('(') || STATEMENT_STARTS.contains(&first_word(trimmed).as_str())
}

/// A line that reads as narrative: capitalized, not a statement opener,
/// ending in sentence punctuation.
fn is_prose(line: &str) -> bool {
    let trimmed = line.trim();
    let capitalized = trimmed.chars().next().is_some_and(|c| c.is_uppercase());
    capitalized
        && !starts_statement(trimmed)
        && trimmed.contains(' ')
        && trimmed.ends_with(['.', ':', '!', '?'])
}

/// Finds SQL in a response without fences: from the first line that opens a
/// statement up to a blank line followed by prose.
fn unfenced_sql(raw: &str) -> Result<String> {
    let cleaned = raw.replace("```", "");
    let lines: Vec<&str> = cleaned.lines().collect();

    let start = lines
        .iter()
        .position(|l| starts_statement(l))
        .ok_or_else(|| TripSqlError::ambiguous_generation("Response contains no SQL statement"))?;

    let mut end = lines.len();
    for i in start + 1..lines.len() {
        if lines[i].trim().is_empty() {
            let next = lines[i + 1..].iter().find(|l| !l.trim().is_empty());
            if next.is_some_and(|l| is_prose(l)) {
                end = i;
                break;
            }
        }
    }

    Ok(lines[start..end].join("\n").trim().to_string())
}

/// Splits `sql` on statement separators. Empty and comment-only pieces are
/// dropped.
///
/// Separators are the tokenizer's `;` tokens, so semicolons inside string
/// literals, quoted identifiers of any style and comments never split. Text
/// the tokenizer rejects is split by a quote-aware scan instead.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let dialect = GenericDialect {};
    match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => split_on_tokens(sql, &tokens).unwrap_or_else(|| split_lexically(sql)),
        Err(e) => {
            tracing::debug!(error = %e, "Tokenizer rejected generator output, splitting lexically");
            split_lexically(sql)
        }
    }
}

/// Returns `None` if a token location does not map back onto `sql`.
fn split_on_tokens<'a>(sql: &'a str, tokens: &[TokenWithLocation]) -> Option<Vec<&'a str>> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    // Locations are 1-based lines and 1-based character columns.
    let byte_offset = |location: &Location| -> Option<usize> {
        let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        let start = *line_starts.get(line)?;
        sql[start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| start + i)
    };

    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut has_code = false;
    for token in tokens {
        match token.token {
            Token::SemiColon => {
                let end = byte_offset(&token.location).filter(|&i| sql[i..].starts_with(';'))?;
                if has_code {
                    pieces.push(sql[piece_start..end].trim());
                }
                piece_start = end + 1;
                has_code = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_code = true,
        }
    }
    if has_code {
        pieces.push(sql[piece_start..].trim());
    }
    Some(pieces)
}

fn split_lexically(sql: &str) -> Vec<&str> {
    #[derive(PartialEq)]
    enum State {
        Code,
        Single,
        Double,
        LineComment,
        BlockComment,
    }

    let bytes = sql.as_bytes();
    let mut state = State::Code;
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut has_code = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match b {
                b'\'' => {
                    state = State::Single;
                    has_code = true;
                }
                b'"' => {
                    state = State::Double;
                    has_code = true;
                }
                b'-' if next == Some(b'-') => {
                    state = State::LineComment;
                    i += 1;
                }
                b'/' if next == Some(b'*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                b';' => {
                    if has_code {
                        pieces.push(sql[piece_start..i].trim());
                    }
                    piece_start = i + 1;
                    has_code = false;
                }
                _ if !b.is_ascii_whitespace() => has_code = true,
                _ => {}
            },
            State::Single if b == b'\'' => state = State::Code,
            State::Double if b == b'"' => state = State::Code,
            State::LineComment if b == b'\n' => state = State::Code,
            State::BlockComment if b == b'*' && next == Some(b'/') => {
                state = State::Code;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }

    if has_code {
        pieces.push(sql[piece_start..].trim());
    }
    pieces
}
