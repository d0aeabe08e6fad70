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

use std::collections::HashMap;
use std::env;
use std::fmt::{self, Display};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::runtime::Handle;

use crate::core::config::config::Configuration;
use crate::core::config::global::{LocalCacheConfig, PluginConfig, ServerConnectorConfig};
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::naming::Location;
use crate::core::model::stat::StatInfo;
use crate::core::model::ClientContext;
use crate::core::plugin::cache::ResourceCache;
use crate::core::plugin::circuitbreaker::CircuitBreaker;
use crate::core::plugin::connector::Connector;
use crate::core::plugin::loadbalance::LoadBalancer;
use crate::core::plugin::router::ServiceRouter;
use crate::core::plugin::stat::{StatReporter, StatReporterChain};
use crate::plugins::cache::memory::memory::MemoryCache;
use crate::plugins::connector::fixed::fixed::FixedConnector;
use crate::plugins::loadbalance::random::random::WeightedRandomLoadBalancer;
use crate::plugins::loadbalance::ringhash::ringhash::RingHashLoadBalancer;
use crate::plugins::loadbalance::roundrobin::roundrobin::WeightedRoundRobinLoadBalancer;
use crate::plugins::loadbalance::srt::srt::ShortestResponseTimeLoadBalancer;
use crate::plugins::router::canary::canary::CanaryRouter;
use crate::plugins::router::health::health::HealthRouter;
use crate::plugins::router::metadata::metadata::MetadataRouter;
use crate::plugins::router::mirror::mirror::TrafficMirrorRouter;
use crate::plugins::router::nearby::nearby::NearbyRouter;
use crate::plugins::router::set::set::SetRouter;
use crate::plugins::stat::logging::logging::LoggingStatReporter;

static SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Eq, PartialEq, Hash)]
pub enum PluginType {
    PluginCache,
    PluginRouter,
    PluginLoadBalance,
    PluginCircuitBreaker,
    PluginConnector,
    PluginStatReporter,
}

impl Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub trait Plugin
where
    Self: Send + Sync,
{
    fn init(&mut self);

    fn destroy(&self);

    fn name(&self) -> String;
}

pub type ConnectorSupplier = fn(&ServerConnectorConfig, &Extensions) -> Box<dyn Connector>;

pub type CacheSupplier =
    fn(&LocalCacheConfig, &Extensions, Arc<dyn Connector>) -> Box<dyn ResourceCache>;

pub type RouterSupplier = fn(&PluginConfig) -> Box<dyn ServiceRouter>;

pub type LoadBalancerSupplier = fn(&PluginConfig, &Extensions) -> Box<dyn LoadBalancer>;

pub type StatReporterSupplier = fn(&PluginConfig) -> Box<dyn StatReporter>;

/// Extensions 一个 SDKContext 内所有插件共享的运行环境
pub struct Extensions
where
    Self: Send + Sync,
{
    pub plugin_container: Arc<PluginContainer>,
    pub runtime: Handle,
    pub client: Arc<ClientContext>,
    pub conf: Arc<Configuration>,
    pub stat_reporter: Arc<StatReporterChain>,
    resource_cache: OnceCell<Arc<dyn ResourceCache>>,
    circuit_breaker: Option<Arc<dyn CircuitBreaker>>,
}

impl Extensions {
    pub fn build(
        client_id: String,
        conf: Arc<Configuration>,
        runtime: Handle,
        circuit_breaker: Option<Arc<dyn CircuitBreaker>>,
    ) -> Result<Self, PolarisError> {
        let mut containers = PluginContainer::default();
        // 初始化所有的插件
        let start_time = std::time::Instant::now();
        containers.register_all_plugin();
        tracing::info!(
            "[polaris][plugin] register_all_plugin cost: {:?}",
            start_time.elapsed()
        );

        let stat_reporter = init_stat_reporters(&conf, &containers)?;
        let client = ClientContext::new(client_id, conf.global.location.to_location());

        Ok(Self {
            plugin_container: Arc::new(containers),
            runtime,
            client: Arc::new(client),
            conf,
            stat_reporter: Arc::new(stat_reporter),
            resource_cache: OnceCell::new(),
            circuit_breaker,
        })
    }

    pub fn get_plugin_container(&self) -> Arc<PluginContainer> {
        self.plugin_container.clone()
    }

    pub fn get_client_id(&self) -> String {
        self.client.client_id.clone()
    }

    pub fn get_local_location(&self) -> &Location {
        &self.client.location
    }

    pub fn set_resource_cache(&self, cache: Arc<dyn ResourceCache>) -> Result<(), PolarisError> {
        self.resource_cache.set(cache).map_err(|_| {
            PolarisError::new(
                ErrorCode::InvalidState,
                "resource cache already initialized".to_string(),
            )
        })
    }

    pub fn get_resource_cache(&self) -> Result<Arc<dyn ResourceCache>, PolarisError> {
        self.resource_cache.get().cloned().ok_or_else(|| {
            PolarisError::new(
                ErrorCode::InvalidState,
                "resource cache not initialized".to_string(),
            )
        })
    }

    pub fn get_circuit_breaker(&self) -> Option<Arc<dyn CircuitBreaker>> {
        self.circuit_breaker.clone()
    }

    pub fn report_stat(&self, info: StatInfo) {
        self.stat_reporter.report(info);
    }
}

fn init_stat_reporters(
    conf: &Configuration,
    containers: &PluginContainer,
) -> Result<StatReporterChain, PolarisError> {
    let stat_conf = &conf.global.stat_reporter;
    if !stat_conf.enable {
        return Ok(StatReporterChain::default());
    }
    let mut reporters = Vec::<Arc<dyn StatReporter>>::with_capacity(stat_conf.chain.len());
    for plugin_conf in stat_conf.chain.iter() {
        let supplier = containers.get_stat_reporter_supplier(&plugin_conf.name)?;
        let mut reporter = supplier(plugin_conf);
        reporter.init();
        reporters.push(Arc::from(reporter));
    }
    Ok(StatReporterChain::new(reporters))
}

pub fn init_server_connector(
    connector_opt: &ServerConnectorConfig,
    extensions: &Extensions,
) -> Result<Box<dyn Connector>, PolarisError> {
    let protocol = connector_opt.get_protocol();
    if protocol.is_empty() {
        return Err(PolarisError::new(
            ErrorCode::InvalidConfig,
            "server connector protocol is empty".to_string(),
        ));
    }
    let supplier = extensions
        .get_plugin_container()
        .get_connector_supplier(&protocol)?;
    let mut active_connector = supplier(connector_opt, extensions);
    active_connector.init();

    Ok(active_connector)
}

pub fn init_resource_cache(
    cache_opt: &LocalCacheConfig,
    extensions: &Extensions,
    connector: Arc<dyn Connector>,
) -> Result<Box<dyn ResourceCache>, PolarisError> {
    let cache_name = cache_opt.name.clone();
    if cache_name.is_empty() {
        return Err(PolarisError::new(
            ErrorCode::InvalidConfig,
            "local cache name is empty".to_string(),
        ));
    }

    let supplier = extensions
        .get_plugin_container()
        .get_cache_supplier(&cache_name)?;
    let mut active_cache = supplier(cache_opt, extensions, connector);
    active_cache.init();

    Ok(active_cache)
}

/// PluginContainer 插件名字到构造函数的映射
#[derive(Default)]
pub struct PluginContainer {
    connectors: HashMap<String, ConnectorSupplier>,
    caches: HashMap<String, CacheSupplier>,
    routers: HashMap<String, RouterSupplier>,
    load_balancers: HashMap<String, LoadBalancerSupplier>,
    stat_reporters: HashMap<String, StatReporterSupplier>,
}

impl PluginContainer {
    pub fn register_all_plugin(&mut self) {
        self.register_resource_cache();
        self.register_connector();
        self.register_routers();
        self.register_load_balancers();
        self.register_stat_reporters();
    }

    fn register_connector(&mut self) {
        let vec = vec![FixedConnector::builder];
        for c in vec {
            let (supplier, name) = c();
            self.connectors.insert(name, supplier);
        }
    }

    fn register_resource_cache(&mut self) {
        let vec = vec![MemoryCache::builder];
        for c in vec {
            let (supplier, name) = c();
            self.caches.insert(name, supplier);
        }
    }

    fn register_routers(&mut self) {
        let vec = vec![
            HealthRouter::builder,
            MetadataRouter::builder,
            SetRouter::builder,
            CanaryRouter::builder,
            NearbyRouter::builder,
            TrafficMirrorRouter::builder,
        ];
        for c in vec {
            let (supplier, name) = c();
            self.routers.insert(name, supplier);
        }
    }

    fn register_load_balancers(&mut self) {
        let vec = vec![
            WeightedRandomLoadBalancer::builder,
            WeightedRoundRobinLoadBalancer::builder,
            RingHashLoadBalancer::builder,
            ShortestResponseTimeLoadBalancer::builder,
        ];
        for c in vec {
            let (supplier, name) = c();
            self.load_balancers.insert(name, supplier);
        }
    }

    fn register_stat_reporters(&mut self) {
        let vec = vec![LoggingStatReporter::builder];
        for c in vec {
            let (supplier, name) = c();
            self.stat_reporters.insert(name, supplier);
        }
    }

    pub fn get_connector_supplier(&self, name: &str) -> Result<ConnectorSupplier, PolarisError> {
        lookup(&self.connectors, PluginType::PluginConnector, name)
    }

    pub fn get_cache_supplier(&self, name: &str) -> Result<CacheSupplier, PolarisError> {
        lookup(&self.caches, PluginType::PluginCache, name)
    }

    pub fn get_router_supplier(&self, name: &str) -> Result<RouterSupplier, PolarisError> {
        lookup(&self.routers, PluginType::PluginRouter, name)
    }

    pub fn get_load_balancer_supplier(
        &self,
        name: &str,
    ) -> Result<LoadBalancerSupplier, PolarisError> {
        lookup(&self.load_balancers, PluginType::PluginLoadBalance, name)
    }

    pub fn get_stat_reporter_supplier(
        &self,
        name: &str,
    ) -> Result<StatReporterSupplier, PolarisError> {
        lookup(&self.stat_reporters, PluginType::PluginStatReporter, name)
    }
}

fn lookup<T: Copy>(
    suppliers: &HashMap<String, T>,
    plugin_type: PluginType,
    name: &str,
) -> Result<T, PolarisError> {
    suppliers.get(name).copied().ok_or_else(|| {
        PolarisError::new(
            ErrorCode::PluginError,
            format!("{} plugin {} not found", plugin_type, name),
        )
    })
}

pub fn acquire_client_id() -> String {
    // 读取本地域名 HOSTNAME，如果存在，则客户端 ID 标识为 {HOSTNAME}_{进程 PID}_{单进程全局自增数字}
    // 不满足上述情况，使用UUID作为客户端ID。
    let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    match env::var("HOSTNAME") {
        Ok(host) if !host.is_empty() => format!("{}_{}_{}", host, std::process::id(), seq),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}
