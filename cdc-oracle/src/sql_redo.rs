use std::collections::HashMap;

use bigdecimal::BigDecimal;
use cdc_common::{ColumnTypeHint, SourceValue};
use once_cell::sync::Lazy;
use regex::Regex;

static INSERT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)^insert into\s+"[^"]+"\."[^"]+"\s*\((?P<cols>.*?)\)\s*values\s*\((?P<vals>.*)\);?\s*$"#).unwrap());
static UPDATE_SET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)^update\s+"[^"]+"\."[^"]+"\s*set\s+(?P<set>.*?)\s*where\s+(?P<where>.*);?\s*$"#).unwrap());
static DELETE_WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?is)^delete from\s+"[^"]+"\."[^"]+"\s*where\s+(?P<where>.*);?\s*$"#).unwrap());

pub type Row = HashMap<String, (ColumnTypeHint, SourceValue)>;

/// Splits a comma-separated list at top level only, ignoring commas
/// inside single-quoted string literals or parentheses (`TO_DATE(...)`).
fn split_top_level(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '(' if !in_quote => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quote => {
                depth -= 1;
                current.push(c);
            }
            c if c == separator && !in_quote && depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn unquote_column(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

/// Parses one LogMiner-reconstructed literal (`'text'`, a bare number,
/// `NULL`, or `TO_DATE('1999-01-08 00:00:00', 'YYYY-MM-DD HH24:MI:SS')`)
/// into the normalizer's driver-agnostic shape. LogMiner gives no
/// declared column type alongside `SQL_REDO`, so the hint is inferred
/// from the literal's own syntax.
fn parse_literal(raw: &str) -> (ColumnTypeHint, SourceValue) {
    let raw = raw.trim();

    if raw.eq_ignore_ascii_case("null") {
        return (ColumnTypeHint::Unknown, SourceValue::Null);
    }

    if let Some(rest) = raw.strip_prefix("TO_DATE(").or_else(|| raw.strip_prefix("to_date(")) {
        let args = split_top_level(rest.trim_end_matches(')'), ',');
        if let Some(literal) = args.first() {
            let text = literal.trim().trim_matches('\'');
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
                return (ColumnTypeHint::Temporal, SourceValue::Timestamp(naive.and_utc()));
            }
        }
        return (ColumnTypeHint::Temporal, SourceValue::Text(raw.to_string()));
    }

    if raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2 {
        let unescaped = raw[1..raw.len() - 1].replace("''", "'");
        return (ColumnTypeHint::Text, SourceValue::Text(unescaped));
    }

    if let Ok(decimal) = raw.parse::<BigDecimal>() {
        return (ColumnTypeHint::Numeric, SourceValue::Decimal(decimal));
    }

    (ColumnTypeHint::Text, SourceValue::Text(raw.to_string()))
}

/// The reconstructed row image from one `INSERT` `SQL_REDO` statement.
pub fn parse_insert(sql_redo: &str) -> Option<Row> {
    let caps = INSERT_RE.captures(sql_redo)?;
    let cols: Vec<String> = split_top_level(&caps["cols"], ',').into_iter().map(|c| unquote_column(&c)).collect();
    let vals: Vec<String> = split_top_level(&caps["vals"], ',');

    let mut row = HashMap::new();
    for (col, val) in cols.into_iter().zip(vals.into_iter()) {
        row.insert(col, parse_literal(&val));
    }
    Some(row)
}

/// Splits a `SET col = val, col2 = val2, ...` or `WHERE col = val and
/// col2 = val2 and ROWID = '...'` clause into column/value pairs,
/// dropping the trailing `ROWID` predicate LogMiner always appends.
fn parse_assignments(clause: &str, separator_word: &str) -> Row {
    let mut row = HashMap::new();
    for assignment in split_on_word(clause, separator_word) {
        let Some((col, val)) = assignment.split_once('=') else { continue };
        let col = unquote_column(col);
        if col.eq_ignore_ascii_case("ROWID") {
            continue;
        }
        row.insert(col, parse_literal(val));
    }
    row
}

fn split_on_word(input: &str, word: &str) -> Vec<String> {
    let pattern = format!(r"(?i)\s+{}\s+", regex::escape(word));
    let re = Regex::new(&pattern).unwrap();
    re.split(input).map(|s| s.to_string()).collect()
}

/// The after-image (`SET` clause) and before-image (`WHERE` clause) of
/// an `UPDATE` `SQL_REDO` statement.
pub fn parse_update(sql_redo: &str) -> Option<(Row, Row)> {
    let caps = UPDATE_SET_RE.captures(sql_redo)?;
    let after = parse_assignments(&caps["set"], "and");
    let before = parse_assignments(&caps["where"], "and");
    Some((before, after))
}

/// The before-image (`WHERE` clause) of a `DELETE` `SQL_REDO` statement.
pub fn parse_delete(sql_redo: &str) -> Option<Row> {
    let caps = DELETE_WHERE_RE.captures(sql_redo)?;
    Some(parse_assignments(&caps["where"], "and"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_insert_columns_and_values() {
        let redo = r#"insert into "APP"."ORDERS"("ID","STATUS") values ('42','OPEN');"#;
        let row = parse_insert(redo).unwrap();
        assert_eq!(row.len(), 2);
        assert!(matches!(row.get("STATUS"), Some((ColumnTypeHint::Text, SourceValue::Text(s))) if s == "OPEN"));
    }

    #[test]
    fn parses_update_before_and_after() {
        let redo = r#"update "APP"."ORDERS" set "STATUS" = 'SHIPPED' where "STATUS" = 'OPEN' and ROWID = 'AAAA';"#;
        let (before, after) = parse_update(redo).unwrap();
        assert!(matches!(before.get("STATUS"), Some((_, SourceValue::Text(s))) if s == "OPEN"));
        assert!(matches!(after.get("STATUS"), Some((_, SourceValue::Text(s))) if s == "SHIPPED"));
        assert!(!before.contains_key("ROWID"));
    }

    #[test]
    fn parses_delete_where_clause() {
        let redo = r#"delete from "APP"."ORDERS" where "ID" = '42' and ROWID = 'AAAA';"#;
        let row = parse_delete(redo).unwrap();
        assert!(matches!(row.get("ID"), Some((_, SourceValue::Decimal(_)))));
    }
}
