//! 过滤器声明与取值解析。
//!
//! 来源只声明过滤器（类型、标签、默认值、选项），外层 UI 负责渲染；
//! 这里只负责把“可能缺失/不合法”的用户取值解析成确定值：缺失等价于默认值。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FilterKind {
    Picker {
        options: Vec<FilterOption>,
        default: String,
    },
    CheckboxGroup {
        options: Vec<FilterOption>,
        default: Vec<String>,
    },
    Switch {
        default: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterDef {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FilterKind,
}

impl FilterDef {
    fn default_value(&self) -> FilterValue {
        match &self.kind {
            FilterKind::Picker { default, .. } => FilterValue::Single(default.clone()),
            FilterKind::CheckboxGroup { default, .. } => FilterValue::Multi(default.clone()),
            FilterKind::Switch { default } => FilterValue::Switch(*default),
        }
    }

    /// 类型不符或选项不存在时返回 `None`（调用方回落到默认值）。
    fn accept(&self, value: &FilterValue) -> Option<FilterValue> {
        fn known(opts: &[FilterOption], v: &str) -> bool {
            opts.iter().any(|o| o.value == v)
        }
        match (&self.kind, value) {
            (FilterKind::Picker { options, .. }, FilterValue::Single(v)) if known(options, v) => {
                Some(value.clone())
            }
            (FilterKind::CheckboxGroup { options, .. }, FilterValue::Multi(vs)) => Some(
                FilterValue::Multi(vs.iter().filter(|v| known(options, v)).cloned().collect()),
            ),
            (FilterKind::CheckboxGroup { options, .. }, FilterValue::Single(v))
                if known(options, v) =>
            {
                Some(FilterValue::Multi(vec![v.clone()]))
            }
            (FilterKind::Switch { .. }, FilterValue::Switch(_)) => Some(value.clone()),
            _ => None,
        }
    }

    /// 命令行 `key=value` 形式的原始字符串。
    fn parse_raw(&self, raw: &str) -> FilterValue {
        match &self.kind {
            FilterKind::Picker { .. } => FilterValue::Single(raw.trim().to_string()),
            FilterKind::CheckboxGroup { .. } => FilterValue::Multi(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            FilterKind::Switch { .. } => FilterValue::Switch(matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Switch(bool),
    Multi(Vec<String>),
    Single(String),
}

pub type FilterValues = BTreeMap<String, FilterValue>;

fn options(pairs: &[(&str, &str)]) -> Vec<FilterOption> {
    pairs
        .iter()
        .map(|(label, value)| FilterOption {
            label: label.to_string(),
            value: value.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterSet {
    defs: Vec<FilterDef>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn picker(mut self, key: &str, label: &str, opts: &[(&str, &str)], default: &str) -> Self {
        self.defs.push(FilterDef {
            key: key.to_string(),
            label: label.to_string(),
            kind: FilterKind::Picker {
                options: options(opts),
                default: default.to_string(),
            },
        });
        self
    }

    pub fn checkbox_group(
        mut self,
        key: &str,
        label: &str,
        opts: &[(&str, &str)],
        default: &[&str],
    ) -> Self {
        self.defs.push(FilterDef {
            key: key.to_string(),
            label: label.to_string(),
            kind: FilterKind::CheckboxGroup {
                options: options(opts),
                default: default.iter().map(|s| s.to_string()).collect(),
            },
        });
        self
    }

    pub fn switch(mut self, key: &str, label: &str, default: bool) -> Self {
        self.defs.push(FilterDef {
            key: key.to_string(),
            label: label.to_string(),
            kind: FilterKind::Switch { default },
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterDef> {
        self.defs.iter()
    }

    pub fn get(&self, key: &str) -> Option<&FilterDef> {
        self.defs.iter().find(|d| d.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// 每个声明的过滤器都得到一个确定值；未声明的键被忽略。
    pub fn resolve(&self, values: &FilterValues) -> ResolvedFilters {
        let resolved = self
            .defs
            .iter()
            .map(|def| {
                let value = values
                    .get(&def.key)
                    .and_then(|v| def.accept(v))
                    .unwrap_or_else(|| def.default_value());
                (def.key.clone(), value)
            })
            .collect();
        ResolvedFilters { values: resolved }
    }

    /// 解析命令行里的 `key=value` 列表。未知键和缺少 `=` 的项被跳过。
    pub fn parse_pairs<S: AsRef<str>>(&self, pairs: &[S]) -> FilterValues {
        let mut out = FilterValues::new();
        for pair in pairs {
            let Some((key, raw)) = pair.as_ref().split_once('=') else {
                continue;
            };
            if let Some(def) = self.get(key.trim()) {
                out.insert(def.key.clone(), def.parse_raw(raw));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFilters {
    values: BTreeMap<String, FilterValue>,
}

impl ResolvedFilters {
    pub fn picker(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(FilterValue::Single(v)) => v,
            _ => "",
        }
    }

    pub fn checkboxes(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(FilterValue::Multi(v)) => v,
            _ => &[],
        }
    }

    pub fn switch(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(FilterValue::Switch(true)))
    }
}
