//! 宽松的 JSON 字段提取：同一语义的字段在不同来源/版本里名字各不相同，
//! 这里按候选键依次查找，第一个非空值胜出。

use serde_json::Value;

pub type JsonMap = serde_json::Map<String, Value>;

/// 顶层对象以及常见的包裹层（`data`、`novel`、`chapter`……）。
pub fn collect_maps(raw: &Value) -> Vec<&JsonMap> {
    let mut maps = Vec::new();
    if let Some(map) = raw.as_object() {
        maps.push(map);
        for key in ["data", "novel", "series", "book", "chapter", "result", "attributes"] {
            if let Some(inner) = map.get(key).and_then(|v| v.as_object()) {
                maps.push(inner);
            }
        }
    }
    maps
}

/// 在多个候选对象上依次调用 `pick`。
pub fn pick_from<'a, T>(
    maps: &[&'a JsonMap],
    pick: impl Fn(&'a JsonMap) -> Option<T>,
) -> Option<T> {
    maps.iter().find_map(|m| pick(*m))
}

pub fn pick_string(map: &JsonMap, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(s) = val.as_str() {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            } else if let Some(n) = val.as_i64() {
                return Some(n.to_string());
            } else if let Some(n) = val.as_u64() {
                return Some(n.to_string());
            } else if let Some(n) = val.as_f64() {
                if n.is_finite() {
                    return Some(n.to_string());
                }
            } else if let Some(name) = val.get("name").and_then(Value::as_str) {
                // {"author": {"name": "..."}}
                let trimmed = name.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}

pub fn pick_f64(map: &JsonMap, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(n) = val.as_f64().filter(|n| n.is_finite()) {
                return Some(n);
            }
            if let Some(n) = val
                .as_str()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|n| n.is_finite())
            {
                return Some(n);
            }
        }
    }
    None
}

pub fn pick_u64(map: &JsonMap, keys: &[&str]) -> Option<u64> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(n) = val.as_u64() {
                return Some(n);
            }
            if let Some(n) = val.as_str().and_then(|s| s.trim().parse::<u64>().ok()) {
                return Some(n);
            }
        }
    }
    None
}

pub fn pick_bool(map: &JsonMap, keys: &[&str]) -> Option<bool> {
    for key in keys {
        if let Some(val) = map.get(*key) {
            if let Some(b) = val.as_bool() {
                return Some(b);
            }
            if let Some(n) = val.as_i64() {
                return Some(n != 0);
            }
            match val.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
                Some("true" | "yes" | "1") => return Some(true),
                Some("false" | "no" | "0") => return Some(false),
                _ => {}
            }
        }
    }
    None
}

pub fn pick_tags(map: &JsonMap) -> Vec<String> {
    let candidates = ["genres", "tags", "categories", "genre", "category"];
    for key in candidates {
        if let Some(val) = map.get(key) {
            let out = tags_from_value(val);
            if !out.is_empty() {
                return out;
            }
        }
    }
    Vec::new()
}

pub fn pick_cover(map: &JsonMap) -> Option<String> {
    let candidates = [
        "cover",
        "cover_url",
        "coverUrl",
        "image",
        "image_url",
        "thumbnail",
        "thumb",
        "poster",
    ];
    for key in candidates {
        let Some(val) = map.get(key) else {
            continue;
        };
        let url = val
            .as_str()
            .or_else(|| val.get("url").and_then(Value::as_str));
        if let Some(url) = url {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// 数组（字符串或 `{name}` 对象）或分隔符拼接的字符串。保持原有顺序。
pub fn tags_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(arr) => arr
            .iter()
            .filter_map(|v| {
                v.as_str()
                    .or_else(|| v.get("name").and_then(Value::as_str))
                    .or_else(|| v.get("title").and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .split(['|', ',', ';'])
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// 顶层或 `data` 下的第一个数组。
pub fn pick_array<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    let roots = [Some(raw), raw.get("data")];
    for root in roots.into_iter().flatten() {
        if let Some(arr) = root.as_array() {
            return Some(arr);
        }
        for key in keys {
            if let Some(arr) = root.get(*key).and_then(Value::as_array) {
                return Some(arr);
            }
        }
    }
    None
}
