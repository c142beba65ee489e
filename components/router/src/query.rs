//! Query string parsing with nested bracket notation.
//!
//! `user[name]=x&tags[]=a&tags[]=b&n=1&n=2` parses to
//! `{"user": {"name": "x"}, "tags": ["a", "b"], "n": ["1", "2"]}`.
//! Every leaf is a string.

use serde_json::{Map, Value};

/// Parse a query string (with or without the leading `?`) into a JSON object
pub fn parse_query(query: &str) -> Value {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut root = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        let path = split_key(&key);
        insert(&mut root, &path, Value::String(value.into_owned()));
    }
    Value::Object(root)
}

/// Split `a[b][]` into `["a", "b", ""]`. Keys with unbalanced brackets
/// are taken literally.
fn split_key(key: &str) -> Vec<String> {
    let open = match key.find('[') {
        Some(open) if open > 0 => open,
        _ => return vec![key.to_string()],
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        match inner.find(']') {
            Some(close) => {
                segments.push(inner[..close].to_string());
                rest = &inner[close + 1..];
            }
            None => return vec![key.to_string()],
        }
    }
    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

fn insert(map: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    if rest.is_empty() {
        match map.get_mut(head) {
            None => {
                map.insert(head.clone(), value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
        }
        return;
    }

    if rest[0].is_empty() {
        let entry = map.entry(head.clone()).or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            let previous = entry.take();
            *entry = Value::Array(vec![previous]);
        }
        if let Value::Array(items) = entry {
            if rest.len() == 1 {
                items.push(value);
            } else {
                let mut child = Map::new();
                insert(&mut child, &rest[1..], value);
                items.push(Value::Object(child));
            }
        }
        return;
    }

    let entry = map.entry(head.clone()).or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert(child, rest, value);
    }
}
