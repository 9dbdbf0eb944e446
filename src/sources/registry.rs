//! 来源注册表：按来源 id 查找插件实现。

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{CatalogFeed, SerialApi, SourcePlugin, SsrPages};
use crate::base_system::context::Config;
use crate::error::{Result, SourceError};
use crate::network_parser::Transport;

#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<&'static str, Arc<dyn SourcePlugin>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置的三个来源，共用同一个传输层。
    pub fn with_defaults(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(SerialApi::from_config(config, transport.clone())));
        registry.register(Arc::new(CatalogFeed::from_config(config, transport.clone())));
        registry.register(Arc::new(SsrPages::from_config(config, transport)?));
        Ok(registry)
    }

    /// 同 id 的旧实现会被替换。
    pub fn register(&mut self, source: Arc<dyn SourcePlugin>) {
        debug!(target: "source", id = source.id(), "注册来源");
        self.sources.insert(source.id(), source);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn SourcePlugin>> {
        self.sources
            .get(id.trim())
            .cloned()
            .ok_or_else(|| SourceError::UnknownSource(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sources.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourcePlugin>> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
