//! 连载小说来源的内容抽取与分页引擎。
//!
//! 代码结构（读代码入口）：
//! - `network_parser`：HTTP 传输层（手动跟随重定向、状态码校验）
//! - `decoder`：响应正文解码（直接 JSON / 嵌入式转义 JSON / DOM 兜底）
//! - `pagination`：章节目录分页驱动（计数分页、skip/take、不分页）
//! - `catalog`：统一内容模型与构建规则（状态映射、封面、锁定章节、过滤器）
//! - `sources`：各站点插件与注册表
//! - `base_system`：配置/日志等基础设施

pub mod base_system;
pub mod catalog;
pub mod decoder;
pub mod error;
pub mod network_parser;
pub mod pagination;
pub mod sources;

pub use error::{Result, SourceError};
