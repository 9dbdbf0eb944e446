//! 会话级标识缓存：小说 `path` → 上游 id。
//!
//! 详情请求时写入，章节页/正文请求时读取；未命中由调用方通过详情请求重新解析。
//! 并发写入同一键时后写者胜出。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct IdentifierCache {
    ids: Mutex<HashMap<String, String>>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // 缓存内容只是可重新解析的映射，中毒后继续使用即可
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.lock().get(path).cloned()
    }

    pub fn insert(&self, path: impl Into<String>, id: impl Into<String>) {
        self.lock().insert(path.into(), id.into());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
