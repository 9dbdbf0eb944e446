//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `sources.yml` 的字段元信息。

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};
use crate::catalog::models::DEFAULT_COVER;
use crate::decoder::DEFAULT_WINDOW;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 解析配置
    #[serde(default = "default_embedded_window")]
    pub embedded_window: usize,
    #[serde(default = "default_skip_take_batch")]
    pub skip_take_batch: usize,
    #[serde(default = "default_false")]
    pub eager_chapter_pages: bool,
    #[serde(default = "default_cover")]
    pub default_cover: String,

    // 来源地址
    #[serde(default = "default_serial_api_base")]
    pub serial_api_base: String,
    #[serde(default = "default_catalog_feed_base")]
    pub catalog_feed_base: String,
    #[serde(default = "default_ssr_pages_base")]
    pub ssr_pages_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            embedded_window: default_embedded_window(),
            skip_take_batch: default_skip_take_batch(),
            eager_chapter_pages: default_false(),
            default_cover: default_cover(),
            serial_api_base: default_serial_api_base(),
            catalog_feed_base: default_catalog_feed_base(),
            ssr_pages_base: default_ssr_pages_base(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "sources.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 11] = [
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "连接超时时间（秒）",
            },
            FieldMeta {
                name: "max_redirects",
                description: "单次请求最多跟随的重定向次数",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "embedded_window",
                description: "嵌入式 JSON 次要字段的搜索窗口（字符数）",
            },
            FieldMeta {
                name: "skip_take_batch",
                description: "skip/take 分页每批章节数",
            },
            FieldMeta {
                name: "eager_chapter_pages",
                description: "按页计数的来源是否在详情里一次拉完全部章节页",
            },
            FieldMeta {
                name: "default_cover",
                description: "缺少封面时使用的默认封面地址",
            },
            FieldMeta {
                name: "serial_api_base",
                description: "serial-api 来源的 API 根地址",
            },
            FieldMeta {
                name: "catalog_feed_base",
                description: "catalog-feed 来源的 API 根地址",
            },
            FieldMeta {
                name: "ssr_pages_base",
                description: "ssr-pages 来源的站点根地址",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedded_window == 0 {
            return Err(ConfigError::Validation("embedded_window must be > 0".into()));
        }
        if self.skip_take_batch == 0 {
            return Err(ConfigError::Validation("skip_take_batch must be > 0".into()));
        }
        for (name, base) in [
            ("serial_api_base", &self.serial_api_base),
            ("catalog_feed_base", &self.catalog_feed_base),
            ("ssr_pages_base", &self.ssr_pages_base),
        ] {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be an http(s) url, got {base:?}"
                )));
            }
        }
        Ok(())
    }
}

fn default_false() -> bool {
    false
}

fn default_request_timeout() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    format!(
        "Mozilla/5.0 (X11; Linux x86_64) novel-source-kit/{}",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_embedded_window() -> usize {
    DEFAULT_WINDOW
}

fn default_skip_take_batch() -> usize {
    500
}

fn default_cover() -> String {
    DEFAULT_COVER.to_string()
}

fn default_serial_api_base() -> String {
    "https://api.serial-reads.example".to_string()
}

fn default_catalog_feed_base() -> String {
    "https://feed.catalog-novels.example".to_string()
}

fn default_ssr_pages_base() -> String {
    "https://www.ssr-fiction.example".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::config::{generate_yaml_with_comments, load_or_create_with_base};

    #[test]
    fn every_field_has_metadata() {
        let yaml = generate_yaml_with_comments(&Config::default()).unwrap();
        for field in Config::fields() {
            assert!(yaml.contains(&format!("{}:", field.name)), "missing {}", field.name);
        }
        assert!(yaml.contains("# 单次请求最多跟随的重定向次数\nmax_redirects: 10"));
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: Config = load_or_create_with_base(None, Some(dir.path())).unwrap();
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.embedded_window, DEFAULT_WINDOW);
        let written = std::fs::read_to_string(dir.path().join("sources.yml")).unwrap();
        assert!(written.contains("skip_take_batch: 500"));
    }

    #[test]
    fn user_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        std::fs::write(&path, "request_timeout: 30\nembedded_window: 4000\n").unwrap();

        let config: Config = load_or_create_with_base(Some(&path), None).unwrap();
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.embedded_window, 4000);
        assert_eq!(config.skip_take_batch, 500);

        // 缺字段时回写完整文件，用户值保留
        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("request_timeout: 30"));
        assert!(rewritten.contains("ssr_pages_base:"));
    }

    #[test]
    fn zero_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yml");
        std::fs::write(&path, "skip_take_batch: 0\n").unwrap();
        assert!(load_or_create_with_base::<Config>(Some(&path), None).is_err());
    }
}
