//! 直接 JSON 模式。

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Result, SourceError};

/// 空正文（含 304 / Content-Length: 0 转成的空串）按空对象处理，
/// 调用方因此可以把“没有新数据”和“对象里没有字段”统一对待。
pub fn parse_json_body(body: &str, context: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(body).map_err(|e| SourceError::decode(context, e))
}

/// 解析为强类型结构。目标类型需要能从 `{}` 反序列化（字段带 `#[serde(default)]`）。
pub fn parse_json_as<T: DeserializeOwned>(body: &str, context: &str) -> Result<T> {
    let trimmed = body.trim();
    let text = if trimmed.is_empty() { "{}" } else { trimmed };
    serde_json::from_str(text).map_err(|e| SourceError::decode(context, e))
}
