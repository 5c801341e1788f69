//! SQL identifier quoting, validation and naming utilities.
//!
//! Generated table and column names are validated once at analysis time and
//! quoted per dialect every time they are rendered into a statement.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// SQL dialect for statement and DDL rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => quote_ident(name),
            Dialect::Mysql => quote_ident_mysql(name),
        }
    }

    /// Whether generated keys are read back with `RETURNING` rather than
    /// the driver's last-insert-id.
    pub const fn returns_generated_keys(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use ormgen_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using MySQL backtick quoting.
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").ok())
        .as_ref()
}

/// Whether `name` is usable as an unquoted table or column name.
///
/// Letters, digits and underscores, not starting with a digit, at most 63
/// characters (the PostgreSQL limit).
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_some_and(|re| re.is_match(name))
}

/// Convert a CamelCase entity name to snake_case.
///
/// Runs of capitals stay together: `HTTPRequest` → `http_request`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// English plural of a snake_case word (last segment only).
pub fn pluralize(word: &str) -> String {
    let consonant_y = word.ends_with('y')
        && !matches!(
            word.chars().rev().nth(1),
            Some('a' | 'e' | 'i' | 'o' | 'u') | None
        );
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Default table name for an entity: snake_case, optionally pluralised.
pub fn default_table_name(entity: &str, pluralise: bool) -> String {
    let snake = to_snake_case(entity);
    if pluralise { pluralize(&snake) } else { snake }
}
