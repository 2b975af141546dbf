//! Key case conversion: result rows go out camelCase, incoming bodies come in as snake_case.

use serde_json::{Map, Value};

/// One result row, column name to scalar value, in select order.
pub type Row = Map<String, Value>;

/// Split an identifier into lowercase words.
/// Separators are `_`, `-`, `.` and whitespace; a lower-to-upper change and the last
/// capital of an acronym followed by lowercase (`XMLHttp` -> `xml`, `http`) also start a word.
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// "task_budgeted_hours" -> "taskBudgetedHours", "import_date" -> "importDate".
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, word) in words(s).iter().enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// "taskBudgetedHours" -> "task_budgeted_hours".
pub fn to_snake_case(s: &str) -> String {
    words(s).join("_")
}

/// Rebuild the map with converted keys. Column positions are kept; if two keys
/// collide after conversion the later one wins.
fn rename_keys(map: &mut Map<String, Value>, convert: fn(&str) -> String) {
    if map.keys().all(|k| convert(k) == *k) {
        return;
    }
    let old = std::mem::take(map);
    for (k, v) in old {
        map.insert(convert(&k), v);
    }
}

pub fn row_keys_to_camel_case(row: &mut Row) {
    rename_keys(row, to_camel_case);
}

/// Convert every row's keys in place, each row independently.
pub fn rows_to_camel_case(rows: &mut [Row]) {
    for row in rows.iter_mut() {
        row_keys_to_camel_case(row);
    }
}

/// Snake-case the keys of a single object or of every object in an array.
/// Anything else is left untouched.
pub fn keys_to_snake_case(value: &mut Value) {
    match value {
        Value::Object(map) => rename_keys(map, to_snake_case),
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::Object(map) = item {
                    rename_keys(map, to_snake_case);
                }
            }
        }
        _ => {}
    }
}
