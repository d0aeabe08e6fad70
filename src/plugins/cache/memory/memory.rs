// Tencent is pleased to support the open source community by making Polaris available.
//
// Copyright (C) 2019 THL A29 Limited, a Tencent company. All rights reserved.
//
// Licensed under the BSD 3-Clause License (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://opensource.org/licenses/BSD-3-Clause
//
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::sync::Arc;

use crate::core::config::global::LocalCacheConfig;
use crate::core::model::cache::{EventType, ResourceEventKey, ResourceValue};
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::naming::{ServiceInstances, ServiceRule};
use crate::core::plugin::cache::{Filter, ResourceCache, ResourceListener};
use crate::core::plugin::connector::Connector;
use crate::core::plugin::plugins::{Extensions, Plugin};
use crate::core::sync::engine::{SyncEngine, SyncOptions};
use crate::core::sync::store::ResourceStore;

static PLUGIN_NAME: &str = "memory";

fn new_resource_cache(
    cache_opt: &LocalCacheConfig,
    extensions: &Extensions,
    connector: Arc<dyn Connector>,
) -> Box<dyn ResourceCache> {
    let store = Arc::new(ResourceStore::new());
    let options = SyncOptions::new(
        cache_opt,
        extensions.conf.global.server_connector.message_timeout,
    );
    let engine = SyncEngine::new(
        extensions.runtime.clone(),
        store.clone(),
        connector,
        options,
        extensions.stat_reporter.clone(),
    );
    Box::new(MemoryCache::new(store, engine))
}

/// MemoryCache 进程内的资源缓存, 由 SyncEngine 在后台保持与控制面同步
pub struct MemoryCache {
    store: Arc<ResourceStore>,
    engine: Arc<SyncEngine>,
}

impl MemoryCache {
    pub fn builder() -> (
        fn(&LocalCacheConfig, &Extensions, Arc<dyn Connector>) -> Box<dyn ResourceCache>,
        String,
    ) {
        (new_resource_cache, PLUGIN_NAME.to_string())
    }

    pub fn new(store: Arc<ResourceStore>, engine: Arc<SyncEngine>) -> Self {
        Self { store, engine }
    }

    pub fn get_engine(&self) -> Arc<SyncEngine> {
        self.engine.clone()
    }

    async fn load(&self, filter: &Filter) -> Result<ResourceValue, PolarisError> {
        let key = &filter.resource_key;
        if self.engine.is_destroyed() {
            return Err(PolarisError::new(
                ErrorCode::InvalidState,
                "resource cache already destroyed".to_string(),
            ));
        }
        if self.store.ref_count(key) == 0 || self.engine.get_task(key).is_none() {
            self.subscribe(key.clone());
        }
        if let Some(value) = self.store.get(key) {
            return Ok(value);
        }
        tracing::debug!(
            "[polaris][cache] wait first value of {}, timeout {:?}",
            key,
            filter.timeout
        );
        self.store.wait_first(key, filter.timeout).await
    }
}

impl Plugin for MemoryCache {
    fn init(&mut self) {
        self.engine.start();
    }

    fn destroy(&self) {
        self.engine.destroy();
    }

    fn name(&self) -> String {
        PLUGIN_NAME.to_string()
    }
}

#[async_trait::async_trait]
impl ResourceCache for MemoryCache {
    fn get(&self, key: &ResourceEventKey) -> Option<ResourceValue> {
        self.store.get(key)
    }

    fn put(&self, key: ResourceEventKey, value: ResourceValue) {
        self.store.put(key, value);
    }

    fn subscribe(&self, key: ResourceEventKey) {
        let refs = self.store.acquire(&key);
        tracing::debug!("[polaris][cache] subscribe {} refs {}", key, refs);
        self.engine.ensure_task(&key);
    }

    fn unsubscribe(&self, key: &ResourceEventKey) {
        let refs = self.store.release(key);
        tracing::debug!("[polaris][cache] unsubscribe {} refs {}", key, refs);
        if refs == 0 {
            self.engine.remove(key);
        }
    }

    async fn load_service_instances(
        &self,
        filter: Filter,
    ) -> Result<Arc<ServiceInstances>, PolarisError> {
        if filter.get_event_type() != EventType::Instance {
            return Err(PolarisError::new(
                ErrorCode::ApiInvalidArgument,
                format!("{} is not an instance resource", filter.resource_key),
            ));
        }
        let value = self.load(&filter).await?;
        value.to_service_instances().ok_or_else(|| {
            PolarisError::new(
                ErrorCode::InternalError,
                format!("resource {} is not instances", filter.resource_key),
            )
        })
    }

    async fn load_service_rule(&self, filter: Filter) -> Result<Arc<ServiceRule>, PolarisError> {
        if !filter.get_event_type().is_rule() {
            return Err(PolarisError::new(
                ErrorCode::ApiInvalidArgument,
                format!("{} is not a rule resource", filter.resource_key),
            ));
        }
        let value = self.load(&filter).await?;
        value.to_service_rule().ok_or_else(|| {
            PolarisError::new(
                ErrorCode::InternalError,
                format!("resource {} is not a rule", filter.resource_key),
            )
        })
    }

    fn register_resource_listener(&self, listener: Arc<dyn ResourceListener>) {
        self.store.register_listener(listener);
    }

    fn remove_resource_listeners(&self, key: &ResourceEventKey) -> usize {
        self.store.remove_listeners(key)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::runtime::Handle;

    use super::*;
    use crate::core::model::naming::ServiceKey;
    use crate::core::plugin::stat::StatReporterChain;
    use crate::test_support::{instances_value, setup_log, ScriptedConnector};

    fn key() -> ResourceEventKey {
        ResourceEventKey::instances(ServiceKey::new("default", "svc"))
    }

    fn new_cache(connector: Arc<ScriptedConnector>) -> MemoryCache {
        let store = Arc::new(ResourceStore::new());
        let engine = SyncEngine::new(
            Handle::current(),
            store.clone(),
            connector,
            SyncOptions::new(&LocalCacheConfig::default(), Duration::from_secs(1)),
            Arc::new(StatReporterChain::default()),
        );
        let mut cache = MemoryCache::new(store, engine);
        cache.init();
        cache
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_blocks_until_first_fetch() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new().with_delay(Duration::from_millis(200)));
        connector.set_value(key(), instances_value("default", "svc", "r1", 3));
        let cache = new_cache(connector.clone());

        let ins = cache
            .load_service_instances(Filter::new(key(), Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(ins.len(), 3);

        // 第二次读取直接命中缓存
        let ins = cache
            .load_service_instances(Filter::new(key(), Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(ins.len(), 3);
        assert_eq!(connector.calls(), 1);
        cache.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new());
        let cache = new_cache(connector.clone());
        let ret = cache
            .load_service_instances(Filter::new(key(), Duration::from_millis(300)))
            .await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::ApiTimeout);
        cache.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_removes_task() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new());
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let cache = new_cache(connector.clone());

        cache.subscribe(key());
        cache.subscribe(key());
        cache.unsubscribe(&key());
        assert!(cache.get_engine().get_task(&key()).is_some());
        cache.unsubscribe(&key());
        assert!(cache.get_engine().get_task(&key()).is_none());
        cache.destroy();
    }

    #[tokio::test]
    async fn test_rule_filter_mismatch() {
        let connector = Arc::new(ScriptedConnector::new());
        let cache = new_cache(connector);
        let ret = cache
            .load_service_rule(Filter::new(key(), Duration::from_millis(10)))
            .await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::ApiInvalidArgument);
        cache.destroy();
    }
}
