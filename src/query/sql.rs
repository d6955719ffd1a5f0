//! Text handling for generated SQL: cleanup, the read-only check, error
//! message parsing and identifier repair.

use std::sync::LazyLock;

use regex::Regex;

static NO_SUCH_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"no such column:\s*([^\s,;]+)").expect("valid regex"));

static NO_SUCH_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"no such table:\s*([^\s,;]+)").expect("valid regex"));

static FROM_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bFROM\s+([\w\.]+|"[^"]+"|`[^`]+`|\[[^\]]+\])"#).expect("valid regex")
});

/// Extract the statement from a model reply.
///
/// Handles markdown fences (with or without a language tag and with chatter
/// around them), a bare leading `sql` tag and trailing semicolons.
///
/// ```
/// use voice_query::query::clean_generated_sql;
///
/// let raw = "Here you go:\n```sql\nSELECT COUNT(*) FROM employees;\n```";
/// assert_eq!(clean_generated_sql(raw), "SELECT COUNT(*) FROM employees");
/// ```
pub fn clean_generated_sql(raw: &str) -> String {
    let mut sql = raw.trim();

    if let Some(start) = sql.find("```") {
        let body = &sql[start + 3..];
        sql = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    }

    let trimmed = sql.trim_start();
    if let Some(tag) = trimmed.get(..3) {
        let rest = &trimmed[3..];
        if tag.eq_ignore_ascii_case("sql") && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
            sql = rest;
        }
    }

    sql.trim().trim_end_matches(';').trim().to_string()
}

/// `true` for a single `SELECT` or `WITH` statement.
pub fn is_read_only(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    let keyword_ok = first.eq_ignore_ascii_case("select") || first.eq_ignore_ascii_case("with");
    keyword_ok && !sql.trim().trim_end_matches(';').contains(';')
}

/// Column named in a `no such column: X` error, without any table qualifier.
pub fn missing_column(message: &str) -> Option<String> {
    let raw = NO_SUCH_COLUMN.captures(message)?.get(1)?.as_str();
    Some(raw.rsplit('.').next().unwrap_or(raw).to_string())
}

/// Table named in a `no such table: X` error.
pub fn missing_table(message: &str) -> Option<String> {
    Some(NO_SUCH_TABLE.captures(message)?.get(1)?.as_str().to_string())
}

/// First table after `FROM`, with any identifier quoting removed.
pub fn table_in_query(sql: &str) -> Option<String> {
    let raw = FROM_TABLE.captures(sql)?.get(1)?.as_str();
    Some(raw.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')).to_string())
}

/// Replace whole-word occurrences of `from` (case-insensitive) with `to`.
pub fn replace_identifier(sql: &str, from: &str, to: &str) -> String {
    match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(from))) {
        Ok(pattern) => pattern.replace_all(sql, regex::NoExpand(to)).into_owned(),
        Err(_) => sql.to_string(),
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | ' ' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Closest candidate to `wanted`: equal after normalisation (case, `_`,
/// spaces, dashes), else the tightest substring match in either direction.
pub fn closest_name<'a>(wanted: &str, candidates: &'a [String]) -> Option<&'a str> {
    let target = normalize(wanted);
    if target.is_empty() {
        return None;
    }

    let normalized: Vec<(String, &'a str)> = candidates
        .iter()
        .map(|c| (normalize(c), c.as_str()))
        .filter(|(n, _)| !n.is_empty())
        .collect();

    if let Some((_, exact)) = normalized.iter().find(|(n, _)| *n == target) {
        return Some(exact);
    }

    normalized
        .iter()
        .filter(|(n, _)| n.contains(&target) || target.contains(n.as_str()))
        .min_by_key(|(n, _)| n.len().abs_diff(target.len()))
        .map(|(_, original)| *original)
}
