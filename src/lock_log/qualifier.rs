//! Lock qualifiers derived from query text.
//!
//! A qualifier is appended to the identity of every lock taken after a
//! `QUERY` line, so one physical resource can be tracked separately per
//! predicate value (for example per warehouse id).

use crate::error::Result;
use regex::Regex;

pub trait QualifierExtractor {
    /// Derives the qualifier for the query given as log tokens.
    fn extract(&self, query: &[&str]) -> String;
}

/// Disabled qualifier: every lock identity stays unqualified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQualifier;

impl QualifierExtractor for NoQualifier {
    fn extract(&self, _query: &[&str]) -> String {
        String::new()
    }
}

/// Picks the values bound to columns whose name matches a pattern.
///
/// `WHERE col <op> value` predicates are used when present; otherwise the
/// column list of an `INSERT ... (cols) VALUES (vals)` is aligned with its
/// first value tuple. Matches render as `col<op>value`, joined by commas.
#[derive(Debug, Clone)]
pub struct ColumnQualifier {
    pattern: Regex,
}

const COMPARISONS: [&str; 7] = ["=", "<", ">", "<=", ">=", "<>", "!="];

impl ColumnQualifier {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(ColumnQualifier {
            pattern: Regex::new(pattern)?,
        })
    }

    fn matches_column(&self, token: &str) -> bool {
        if !is_word(token) {
            return false;
        }
        self.pattern.is_match(column_name(token))
    }

    fn from_where(&self, tokens: &[String], start: usize) -> Vec<String> {
        let mut found = Vec::new();
        let mut i = start;
        while i + 2 < tokens.len() {
            let op = tokens[i + 1].as_str();
            let is_cmp = COMPARISONS.contains(&op) || op.eq_ignore_ascii_case("LIKE");
            if is_cmp && self.matches_column(&tokens[i]) && is_word(&tokens[i + 2]) {
                found.push(format!("{}{}{}", column_name(&tokens[i]), op, tokens[i + 2]));
                i += 3;
            } else {
                i += 1;
            }
        }
        found
    }

    fn from_values(&self, tokens: &[String], values_at: usize) -> Vec<String> {
        let Some(columns) = tokens[..values_at]
            .iter()
            .rposition(|t| t == "(")
            .map(|open| group(tokens, open))
        else {
            return Vec::new();
        };
        let Some(values) = tokens[values_at..]
            .iter()
            .position(|t| t == "(")
            .map(|open| group(tokens, values_at + open))
        else {
            return Vec::new();
        };

        columns
            .iter()
            .zip(values.iter())
            .filter(|(column, _)| self.matches_column(column))
            .map(|(column, value)| format!("{}={}", column_name(column), value))
            .collect()
    }
}

impl QualifierExtractor for ColumnQualifier {
    fn extract(&self, query: &[&str]) -> String {
        let tokens = lex(&query.join(" "));
        let keyword = |k: &str| tokens.iter().position(|t| t.eq_ignore_ascii_case(k));

        let found = if let Some(at) = keyword("WHERE") {
            self.from_where(&tokens, at + 1)
        } else if let Some(at) = keyword("VALUES") {
            self.from_values(&tokens, at)
        } else {
            Vec::new()
        };
        found.join(",")
    }
}

/// Comma-separated items of the parenthesised group opening at `open`.
/// Items spanning several tokens are joined without separators.
fn group(tokens: &[String], open: usize) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for token in &tokens[open..] {
        match token.as_str() {
            "(" => {
                depth += 1;
                if depth > 1 {
                    current.push('(');
                }
            }
            ")" => {
                depth -= 1;
                if depth == 0 {
                    items.push(std::mem::take(&mut current));
                    break;
                }
                current.push(')');
            }
            "," if depth == 1 => items.push(std::mem::take(&mut current)),
            other => current.push_str(other),
        }
    }
    items
}

fn is_word(token: &str) -> bool {
    !matches!(token, "(" | ")" | "," | ";") && !COMPARISONS.contains(&token)
}

/// Bare column name: qualifier prefix and backquotes stripped.
fn column_name(token: &str) -> &str {
    let name = token.rsplit('.').next().unwrap_or(token);
    name.trim_matches('`')
}

fn is_symbol(c: char) -> bool {
    matches!(c, '(' | ')' | ',' | ';')
}

fn is_operator(c: char) -> bool {
    matches!(c, '=' | '<' | '>' | '!')
}

/// Splits SQL text into words, quoted literals, punctuation and operators.
fn lex(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            i = (i + 1).min(chars.len());
        } else if is_symbol(c) {
            i += 1;
        } else if is_operator(c) {
            i += 1;
            while i < chars.len() && matches!(chars[i], '=' | '<' | '>') {
                i += 1;
            }
        } else {
            while i < chars.len()
                && !chars[i].is_whitespace()
                && !is_symbol(chars[i])
                && !is_operator(chars[i])
                && chars[i] != '\''
                && chars[i] != '"'
            {
                i += 1;
            }
        }
        tokens.push(chars[start..i].iter().collect());
    }
    tokens
}
