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
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::core::config::config::Configuration;
use crate::core::flow::{build_router_container, CircuitBreakerFlow, RouterFlow};
use crate::core::model::cache::{EventType, ResourceEventKey};
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::loadbalance::Criteria;
use crate::core::model::naming::{Instance, ServiceInstances, ServiceKey, ServiceRule};
use crate::core::model::router::RouteInfo;
use crate::core::model::stat::{ServiceCallResult, StatInfo};
use crate::core::plugin::cache::{Filter, ResourceCache, ResourceListener};
use crate::core::plugin::circuitbreaker::CircuitBreaker;
use crate::core::plugin::connector::Connector;
use crate::core::plugin::loadbalance::LoadBalancer;
use crate::core::plugin::plugins::{
    acquire_client_id, init_resource_cache, init_server_connector, Extensions, Plugin,
};
use crate::core::plugin::router::RouteContext;

/// Engine 组装 SDK 的全部组件: 运行时, 插件, 资源缓存, 路由链与负载均衡器
pub struct Engine
where
    Self: Send + Sync,
{
    extensions: Arc<Extensions>,
    // 在 tokio 运行时之外创建 SDK 时由 Engine 自己持有运行时
    runtime: Option<Runtime>,
    local_cache: Arc<dyn ResourceCache>,
    server_connector: Arc<dyn Connector>,
    router_flow: RouterFlow,
    circuit_breaker_flow: CircuitBreakerFlow,
    load_balancers: HashMap<String, Arc<dyn LoadBalancer>>,
}

impl Engine {
    pub fn new(
        arc_conf: Arc<Configuration>,
        connector: Option<Arc<dyn Connector>>,
        circuit_breaker: Option<Arc<dyn CircuitBreaker>>,
    ) -> Result<Self, PolarisError> {
        let (handle, runtime) = match Handle::try_current() {
            Ok(handle) => (handle, None),
            Err(_) => {
                let runtime = Builder::new_multi_thread()
                    .enable_all()
                    .thread_name("polaris-client-thread-pool")
                    .worker_threads(4)
                    .build()
                    .map_err(|err| {
                        PolarisError::new(
                            ErrorCode::InternalError,
                            format!("build tokio runtime fail: {}", err),
                        )
                    })?;
                (runtime.handle().clone(), Some(runtime))
            }
        };

        let client_id = acquire_client_id();
        tracing::info!("[polaris][engine] create sdk engine, client_id: {}", client_id);

        // 初始化 extensions
        let extensions = Extensions::build(client_id, arc_conf.clone(), handle, circuit_breaker)?;

        let server_connector: Arc<dyn Connector> = match connector {
            Some(connector) => connector,
            None => Arc::from(init_server_connector(
                &arc_conf.global.server_connector,
                &extensions,
            )?),
        };
        let local_cache: Arc<dyn ResourceCache> = Arc::from(init_resource_cache(
            &arc_conf.global.local_cache,
            &extensions,
            server_connector.clone(),
        )?);
        extensions.set_resource_cache(local_cache.clone())?;

        let container = extensions.get_plugin_container();
        let router_container =
            build_router_container(&arc_conf.consumer.service_router, &container)?;

        let mut load_balancers = HashMap::<String, Arc<dyn LoadBalancer>>::new();
        for plugin_conf in arc_conf.consumer.load_balancer.plugins.iter() {
            let supplier = container.get_load_balancer_supplier(&plugin_conf.name)?;
            let mut lb = supplier(plugin_conf, &extensions);
            lb.init();
            load_balancers.insert(plugin_conf.name.clone(), Arc::from(lb));
        }
        let default_policy = &arc_conf.consumer.load_balancer.default_policy;
        if !load_balancers.contains_key(default_policy) {
            return Err(PolarisError::new(
                ErrorCode::InvalidConfig,
                format!("default load balancer {} is not configured", default_policy),
            ));
        }

        let extensions = Arc::new(extensions);
        Ok(Self {
            extensions: extensions.clone(),
            runtime,
            local_cache,
            server_connector,
            router_flow: RouterFlow::new(router_container),
            circuit_breaker_flow: CircuitBreakerFlow::new(extensions),
            load_balancers,
        })
    }

    fn api_timeout(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            return self.extensions.conf.global.api.timeout;
        }
        timeout
    }

    /// get_service_instances 读取服务实例, 首次访问时等待第一次同步完成
    pub async fn get_service_instances(
        &self,
        service: ServiceKey,
        timeout: Duration,
    ) -> Result<Arc<ServiceInstances>, PolarisError> {
        self.local_cache
            .load_service_instances(Filter::new(
                ResourceEventKey::instances(service),
                self.api_timeout(timeout),
            ))
            .await
    }

    /// get_service_rule 获取服务规则
    pub async fn get_service_rule(
        &self,
        service: ServiceKey,
        event_type: EventType,
        timeout: Duration,
    ) -> Result<Arc<ServiceRule>, PolarisError> {
        self.local_cache
            .load_service_rule(Filter::new(
                ResourceEventKey::new(service, event_type),
                self.api_timeout(timeout),
            ))
            .await
    }

    pub fn new_route_context(&self, route_info: RouteInfo) -> RouteContext {
        RouteContext::new(route_info, Some(self.extensions.clone()))
    }

    /// route 只执行路由链
    pub async fn route(
        &self,
        route_ctx: &mut RouteContext,
        instances: ServiceInstances,
    ) -> Result<ServiceInstances, PolarisError> {
        self.router_flow.choose_instances(route_ctx, instances).await
    }

    pub fn get_load_balancer(&self, policy: &str) -> Result<Arc<dyn LoadBalancer>, PolarisError> {
        let policy = if policy.is_empty() {
            self.extensions.conf.consumer.load_balancer.default_policy.as_str()
        } else {
            policy
        };
        self.load_balancers.get(policy).cloned().ok_or_else(|| {
            PolarisError::new(
                ErrorCode::PluginError,
                format!("load balancer {} not found", policy),
            )
        })
    }

    /// load_balance 只执行负载均衡
    pub fn load_balance(
        &self,
        criteria: &Criteria,
        instances: &ServiceInstances,
    ) -> Result<Arc<Instance>, PolarisError> {
        let lb = self.get_load_balancer(&criteria.policy)?;
        let instance = lb.choose_instance(criteria, instances)?;
        self.extensions.report_stat(StatInfo::Selection {
            callee: instances.service.get_service_key(),
            policy: lb.name(),
            instance_id: instance.id.clone(),
        });
        Ok(instance)
    }

    /// resolve 读取缓存, 执行路由链与负载均衡, 返回唯一的实例
    pub async fn resolve(
        &self,
        route_ctx: &mut RouteContext,
        criteria: &Criteria,
        timeout: Duration,
    ) -> Result<Arc<Instance>, PolarisError> {
        let callee = route_ctx.route_info.callee.clone();
        let raw = self.get_service_instances(callee.clone(), timeout).await?;
        if raw.is_empty() {
            return Err(PolarisError::new(
                ErrorCode::InstanceNotFound,
                format!("service {} has no instance", callee),
            ));
        }

        let routed = self.route(route_ctx, raw.as_ref().clone()).await?;
        if routed.is_empty() {
            if !raw.instances.iter().any(|ins| ins.is_available()) {
                return Err(PolarisError::new(
                    ErrorCode::InstanceUnavailable,
                    format!("all instances of service {} are unavailable", callee),
                ));
            }
            return Err(PolarisError::new(
                ErrorCode::RouteRuleNotMatch,
                format!(
                    "all instances of service {} are filtered out by router chain",
                    callee
                ),
            ));
        }
        self.load_balance(criteria, &routed)
    }

    /// report_service_call 调用结果同时交给负载均衡器, 熔断插件与统计插件
    pub async fn report_service_call(&self, result: ServiceCallResult) {
        for lb in self.load_balancers.values() {
            lb.report_call_result(&result);
        }
        if let Err(err) = self.circuit_breaker_flow.report_stat(&result).await {
            tracing::warn!("[polaris][engine] report stat to circuit breaker fail: {}", err);
        }
        self.extensions.report_stat(StatInfo::Call(result));
    }

    /// register_resource_listener 注册资源监听器
    pub fn register_resource_listener(&self, listener: Arc<dyn ResourceListener>) {
        self.local_cache.register_resource_listener(listener);
    }

    /// remove_resource_listeners 移除 key 上的全部监听器, 并释放这些监听器持有的订阅
    pub fn remove_resource_listeners(&self, key: &ResourceEventKey) -> usize {
        let removed = self.local_cache.remove_resource_listeners(key);
        for _ in 0..removed {
            self.local_cache.unsubscribe(key);
        }
        removed
    }

    pub fn get_executor(&self) -> Handle {
        self.extensions.runtime.clone()
    }

    pub fn get_extensions(&self) -> Arc<Extensions> {
        self.extensions.clone()
    }

    pub fn get_resource_cache(&self) -> Arc<dyn ResourceCache> {
        self.local_cache.clone()
    }

    pub fn get_server_connector(&self) -> Arc<dyn Connector> {
        self.server_connector.clone()
    }

    pub fn get_circuit_breaker_flow(&self) -> &CircuitBreakerFlow {
        &self.circuit_breaker_flow
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.local_cache.destroy();
        self.router_flow.destroy();
        for lb in self.load_balancers.values() {
            lb.destroy();
        }
        self.extensions.stat_reporter.destroy();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        tracing::info!("[polaris][engine] sdk engine destroyed");
    }
}
