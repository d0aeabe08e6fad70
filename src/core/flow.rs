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

use crate::core::config::consumer::ServiceRouterConfig;
use crate::core::config::global::PluginConfig;
use crate::core::model::circuitbreaker::{CircuitBreakerStatus, InstanceResource};
use crate::core::model::error::PolarisError;
use crate::core::model::naming::ServiceInstances;
use crate::core::model::router::RouteState;
use crate::core::model::stat::ServiceCallResult;
use crate::core::plugin::plugins::{Extensions, Plugin, PluginContainer};
use crate::core::plugin::router::{RouteContext, RouterContainer, ServiceRouter};

// 路由插件要求整条链重新执行的最大次数
const MAX_ROUTE_RETRY: usize = 3;

/// CircuitBreakerFlow 对可选熔断插件的薄封装, 没有配置熔断插件时全部放行
pub struct CircuitBreakerFlow {
    extensions: Arc<Extensions>,
}

impl CircuitBreakerFlow {
    pub fn new(extensions: Arc<Extensions>) -> Self {
        CircuitBreakerFlow { extensions }
    }

    pub async fn check_resource(
        &self,
        resource: &InstanceResource,
    ) -> Result<CircuitBreakerStatus, PolarisError> {
        match self.extensions.get_circuit_breaker() {
            Some(circuit_breaker) => circuit_breaker.check_resource(resource).await,
            None => Ok(CircuitBreakerStatus::close()),
        }
    }

    pub async fn report_stat(&self, result: &ServiceCallResult) -> Result<(), PolarisError> {
        match self.extensions.get_circuit_breaker() {
            Some(circuit_breaker) => circuit_breaker.report_stat(result).await,
            None => Ok(()),
        }
    }
}

/// build_router_container 按配置把路由插件名解析成有序的路由链
pub fn build_router_container(
    conf: &ServiceRouterConfig,
    container: &PluginContainer,
) -> Result<RouterContainer, PolarisError> {
    let build = |chain: &Vec<PluginConfig>| -> Result<Vec<Arc<dyn ServiceRouter>>, PolarisError> {
        let mut routers = Vec::<Arc<dyn ServiceRouter>>::with_capacity(chain.len());
        for plugin_conf in chain.iter() {
            let supplier = container.get_router_supplier(&plugin_conf.name)?;
            let mut router = supplier(plugin_conf);
            router.init();
            routers.push(Arc::from(router));
        }
        Ok(routers)
    };
    Ok(RouterContainer {
        before_routers: build(&conf.before_chain)?,
        core_routers: build(&conf.core_chain)?,
        after_routers: build(&conf.after_chain)?,
    })
}

/// RouterFlow 依次执行 before, core, after 三段路由链
pub struct RouterFlow {
    container: RouterContainer,
}

impl RouterFlow {
    pub fn new(container: RouterContainer) -> Self {
        RouterFlow { container }
    }

    pub fn get_router_container(&self) -> &RouterContainer {
        &self.container
    }

    /// choose_instances 每个路由插件的输出作为下一个插件的输入, 空列表同样向后传递
    pub async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: ServiceInstances,
    ) -> Result<ServiceInstances, PolarisError> {
        let mut current = instances;
        let mut retry = 0;
        'chain: loop {
            for router in self.container.routers() {
                let name = router.name();
                if route_ctx.route_info.is_router_disabled(&name) {
                    continue;
                }
                if !router.enable(route_ctx, &current).await {
                    continue;
                }
                let ret = router.choose_instances(route_ctx, &current).await?;
                current = ret.instances;
                if ret.state == RouteState::Retry {
                    if retry < MAX_ROUTE_RETRY {
                        retry += 1;
                        tracing::debug!(
                            "[polaris][router] {} asks to rerun the chain, retry {}",
                            name,
                            retry
                        );
                        continue 'chain;
                    }
                    tracing::warn!(
                        "[polaris][router] {} exceeds max route retry {}, continue",
                        name,
                        MAX_ROUTE_RETRY
                    );
                }
            }
            return Ok(current);
        }
    }

    pub fn destroy(&self) {
        for router in self.container.routers() {
            router.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::model::error::ErrorCode;
    use crate::core::model::router::{RouteInfo, RouteResult, DEFAULT_ROUTER_METADATA};
    use crate::test_support::{instance, instance_with_metadata, labels, service_instances};

    struct DropFirst {
        name: String,
        calls: AtomicUsize,
        retry_once: bool,
    }

    impl DropFirst {
        fn new(name: &str, retry_once: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: AtomicUsize::new(0),
                retry_once,
            })
        }
    }

    impl Plugin for DropFirst {
        fn init(&mut self) {}

        fn destroy(&self) {}

        fn name(&self) -> String {
            self.name.clone()
        }
    }

    #[async_trait::async_trait]
    impl ServiceRouter for DropFirst {
        async fn choose_instances(
            &self,
            _route_ctx: &mut RouteContext,
            instances: &ServiceInstances,
        ) -> Result<RouteResult, PolarisError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst);
            let rest = instances.instances.iter().skip(1).cloned().collect();
            let mut ret = RouteResult::next(instances.with_instances(rest));
            if self.retry_once && calls == 0 {
                ret.state = RouteState::Retry;
            }
            Ok(ret)
        }

        async fn enable(&self, _route_ctx: &RouteContext, _instances: &ServiceInstances) -> bool {
            true
        }
    }

    fn three() -> ServiceInstances {
        service_instances(
            &[],
            vec![instance("a", 100), instance("b", 100), instance("c", 100)],
        )
    }

    #[tokio::test]
    async fn test_chain_order_and_disabled_stage() {
        let first = DropFirst::new("first", false);
        let second = DropFirst::new("second", false);
        let flow = RouterFlow::new(RouterContainer {
            before_routers: vec![first.clone()],
            core_routers: vec![second.clone()],
            after_routers: vec![],
        });

        let mut ctx = RouteContext::default();
        let ret = flow.choose_instances(&mut ctx, three()).await.unwrap();
        assert_eq!(ret.instances.len(), 1);
        assert_eq!(ret.instances[0].id, "c");

        let mut ctx = RouteContext::default();
        ctx.route_info.disable_router("second");
        let ret = flow.choose_instances(&mut ctx, three()).await.unwrap();
        assert_eq!(ret.instances.len(), 2);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_reruns_chain_with_output() {
        let router = DropFirst::new("retry", true);
        let flow = RouterFlow::new(RouterContainer {
            before_routers: vec![],
            core_routers: vec![router.clone()],
            after_routers: vec![],
        });
        let mut ctx = RouteContext::default();
        let ret = flow.choose_instances(&mut ctx, three()).await.unwrap();
        assert_eq!(router.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ret.instances.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_list_passed_forward_and_errors_propagate() {
        let mut container = PluginContainer::default();
        container.register_all_plugin();
        let conf = ServiceRouterConfig {
            before_chain: vec![],
            core_chain: vec![PluginConfig::new(DEFAULT_ROUTER_METADATA)],
            after_chain: vec![],
        };
        let flow = RouterFlow::new(build_router_container(&conf, &container).unwrap());
        let instances = service_instances(
            &[],
            vec![instance_with_metadata("a", &[("env", "prod")])],
        );
        let mut ctx = RouteContext::new(RouteInfo::default(), None);
        ctx.route_info.metadata = labels(&[("env", "test")]);
        let ret = flow.choose_instances(&mut ctx, instances).await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::MetadataMismatch);

        let empty = DropFirst::new("drop", false);
        let flow = RouterFlow::new(RouterContainer {
            before_routers: vec![empty.clone(), empty.clone()],
            core_routers: vec![],
            after_routers: vec![],
        });
        let mut ctx = RouteContext::default();
        let ret = flow
            .choose_instances(&mut ctx, service_instances(&[], vec![instance("a", 1)]))
            .await
            .unwrap();
        assert!(ret.is_empty());
        assert_eq!(empty.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_router_name() {
        let mut container = PluginContainer::default();
        container.register_all_plugin();
        let conf = ServiceRouterConfig {
            before_chain: vec![PluginConfig::new("ruleRouter")],
            core_chain: vec![],
            after_chain: vec![],
        };
        let ret = build_router_container(&conf, &container);
        assert_eq!(ret.err().unwrap().code(), ErrorCode::PluginError);
    }

    fn mirror_extensions() -> Arc<Extensions> {
        use std::collections::HashMap;
        use std::time::Duration;

        use crate::core::config::config::Configuration;
        use crate::core::config::global::LocalCacheConfig;
        use crate::core::model::cache::EventType;
        use crate::core::model::naming::{RuleValue, ServiceKey};
        use crate::core::model::router::{MatchString, TrafficMirrorRule};
        use crate::core::plugin::stat::StatReporterChain;
        use crate::core::sync::engine::{SyncEngine, SyncOptions};
        use crate::core::sync::store::ResourceStore;
        use crate::plugins::cache::memory::memory::MemoryCache;
        use crate::plugins::connector::fixed::fixed::FixedConnector;

        let connector = Arc::new(FixedConnector::new());
        let mut destination = HashMap::new();
        destination.insert("env".to_string(), MatchString::exact("shadow"));
        connector.set_rule(
            ServiceKey::new("default", "svc"),
            EventType::TrafficMirrorRule,
            RuleValue::TrafficMirror(vec![TrafficMirrorRule {
                name: "shadow".to_string(),
                enable: true,
                sources: vec![],
                destination_metadata: destination,
                percent: 50.0,
            }]),
        );
        let extensions = Extensions::build(
            "test".to_string(),
            Arc::new(Configuration::default()),
            tokio::runtime::Handle::current(),
            None,
        )
        .unwrap();
        let store = Arc::new(ResourceStore::new());
        let engine = SyncEngine::new(
            tokio::runtime::Handle::current(),
            store.clone(),
            connector,
            SyncOptions::new(&LocalCacheConfig::default(), Duration::from_secs(1)),
            Arc::new(StatReporterChain::default()),
        );
        let mut cache = MemoryCache::new(store, engine);
        cache.init();
        extensions.set_resource_cache(Arc::new(cache)).unwrap();
        Arc::new(extensions)
    }

    #[tokio::test]
    async fn test_default_chain_output_is_stable() {
        use crate::core::model::naming::ServiceKey;

        let mut container = PluginContainer::default();
        container.register_all_plugin();
        let flow = RouterFlow::new(
            build_router_container(&ServiceRouterConfig::default(), &container).unwrap(),
        );
        let extensions = mirror_extensions();
        let snapshot = service_instances(
            &[],
            vec![
                instance_with_metadata("a", &[("env", "prod")]),
                instance_with_metadata("b", &[("env", "prod")]),
                instance_with_metadata("c", &[("env", "shadow")]),
                instance_with_metadata("d", &[("env", "test")]),
            ],
        );
        let mut route_info = RouteInfo::new(
            ServiceKey::new("default", "caller"),
            ServiceKey::new("default", "svc"),
        );
        route_info.metadata = labels(&[("env", "prod")]);

        let mut mirrored = 0;
        for _ in 0..100 {
            let mut ctx = RouteContext::new(route_info.clone(), Some(extensions.clone()));
            let ret = flow.choose_instances(&mut ctx, snapshot.clone()).await.unwrap();
            let ids: Vec<&str> = ret.instances.iter().map(|ins| ins.id.as_str()).collect();
            // 镜像命中与否不影响返回的实例列表
            assert_eq!(ids, vec!["a", "b"]);
            if let Some(mirror) = ctx.mirror_instance {
                assert_eq!(mirror.id, "c");
                mirrored += 1;
            }
        }
        assert!(mirrored > 0 && mirrored < 100, "mirrored {}", mirrored);
        assert_eq!(snapshot.instances.len(), 4);
        extensions.get_resource_cache().unwrap().destroy();
    }
}
