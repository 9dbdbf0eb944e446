//! 嵌入式 JSON 抽取（SSR 页面中以转义字符串形式内联的组件状态）。
//!
//! 抽取规则是声明式的 [`ExtractionSchema`]：
//! - 锚点正则：识别一条记录的起点，命名捕获组即主字段；
//! - 次要字段：在锚点之后的有限窗口内各自独立搜索（数量、时间、封面等）；
//! - 窗口大小：默认 2000 字符。
//!
//! 站点改版时只需要调整 schema，而不需要改控制流。

use std::collections::BTreeMap;

use regex::{CaptureMatches, Regex};

use super::unescape::unescape_layered;

pub const DEFAULT_WINDOW: usize = 2000;

/// 双重转义字符串值的内容部分（不含引号）。
const ESCAPED_VALUE: &str = r#"(?:[^"\\]|\\\\\\\\|\\\\\\"|\\\\[^"\\])*"#;

/// `\"key\":\"value\"` 形式的片段，值捕获到同名分组。
pub fn escaped_string(key: &str, group: &str) -> String {
    format!(
        r#"\\"{}\\":\s*\\"(?P<{}>{})\\""#,
        regex::escape(key),
        group,
        ESCAPED_VALUE
    )
}

/// `\"key\":123` 形式的片段；也接受被引号包裹的数字。
pub fn escaped_number(key: &str, group: &str) -> String {
    format!(
        r#"\\"{}\\":\s*(?:\\")?(?P<{}>-?\d+(?:\.\d+)?)"#,
        regex::escape(key),
        group
    )
}

/// `\"key\":true|false` 形式的片段。
pub fn escaped_bool(key: &str, group: &str) -> String {
    format!(
        r#"\\"{}\\":\s*(?P<{}>true|false)"#,
        regex::escape(key),
        group
    )
}

#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    anchor: Regex,
    secondary: Vec<(String, Regex)>,
    window: usize,
}

pub struct SchemaBuilder {
    anchor: String,
    secondary: Vec<(String, String)>,
    window: usize,
}

impl SchemaBuilder {
    /// 次要字段的正则需要一个名为 `value` 的分组（缺省时取第 1 组）。
    pub fn secondary(mut self, name: &str, pattern: impl Into<String>) -> Self {
        self.secondary.push((name.to_string(), pattern.into()));
        self
    }

    pub fn secondary_string(self, name: &str, key: &str) -> Self {
        let pattern = escaped_string(key, "value");
        self.secondary(name, pattern)
    }

    pub fn secondary_number(self, name: &str, key: &str) -> Self {
        let pattern = escaped_number(key, "value");
        self.secondary(name, pattern)
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn build(self) -> Result<ExtractionSchema, regex::Error> {
        let anchor = Regex::new(&self.anchor)?;
        let secondary = self
            .secondary
            .into_iter()
            .map(|(name, pattern)| Regex::new(&pattern).map(|re| (name, re)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExtractionSchema {
            anchor,
            secondary,
            window: self.window,
        })
    }
}

impl ExtractionSchema {
    pub fn builder(anchor: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            anchor: anchor.into(),
            secondary: Vec::new(),
            window: DEFAULT_WINDOW,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 对整段正文做全局扫描。返回值可以反复迭代，每次都从头开始。
    pub fn extract<'s, 'b>(&'s self, body: &'b str) -> Extraction<'s, 'b> {
        Extraction { schema: self, body }
    }
}

#[derive(Clone, Copy)]
pub struct Extraction<'s, 'b> {
    schema: &'s ExtractionSchema,
    body: &'b str,
}

impl<'s, 'b> Extraction<'s, 'b> {
    pub fn iter(&self) -> EmbeddedRecords<'s, 'b> {
        EmbeddedRecords {
            schema: self.schema,
            body: self.body,
            matches: self.schema.anchor.captures_iter(self.body),
        }
    }

    pub fn first(&self) -> Option<EmbeddedRecord> {
        self.iter().next()
    }
}

impl<'s, 'b> IntoIterator for &Extraction<'s, 'b> {
    type Item = EmbeddedRecord;
    type IntoIter = EmbeddedRecords<'s, 'b>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct EmbeddedRecords<'s, 'b> {
    schema: &'s ExtractionSchema,
    body: &'b str,
    matches: CaptureMatches<'s, 'b>,
}

impl Iterator for EmbeddedRecords<'_, '_> {
    type Item = EmbeddedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = self.matches.next()?;
        let whole = caps.get(0)?;
        let offset = whole.start();

        let mut fields = BTreeMap::new();
        for name in self.schema.anchor.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                fields.insert(name.to_string(), unescape_layered(m.as_str()).into_owned());
            }
        }

        let window = window_at(self.body, offset, self.schema.window);
        let mut secondary = BTreeMap::new();
        for (name, re) in &self.schema.secondary {
            let Some(c) = re.captures(window) else {
                continue;
            };
            if let Some(m) = c.name("value").or_else(|| c.get(1)) {
                secondary.insert(name.clone(), unescape_layered(m.as_str()).into_owned());
            }
        }

        Some(EmbeddedRecord {
            offset,
            fields,
            secondary,
        })
    }
}

/// `[offset, offset + len)`，两端收缩到 UTF-8 字符边界。
fn window_at(body: &str, offset: usize, len: usize) -> &str {
    let mut start = offset.min(body.len());
    while !body.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = start.saturating_add(len).min(body.len());
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[start..end]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedRecord {
    pub offset: usize,
    pub fields: BTreeMap<String, String>,
    pub secondary: BTreeMap<String, String>,
}

impl EmbeddedRecord {
    /// 先查主字段，再查次要字段。
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .or_else(|| self.secondary.get(name))
            .map(String::as_str)
    }

    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name)?.trim().parse().ok()
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.trim().parse().ok().filter(|n: &f64| n.is_finite())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)?.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }
}
