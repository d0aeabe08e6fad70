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

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        naming::{Instance, ServiceInstances},
        router::{MetadataFailoverType, RouteResult, DEFAULT_ROUTER_METADATA},
    },
    plugin::{
        plugins::Plugin,
        router::{RouteContext, ServiceRouter},
    },
};

pub fn new_service_router(_conf: &PluginConfig) -> Box<dyn ServiceRouter> {
    Box::new(MetadataRouter {})
}

static KEY_METADATA_FAILOVER: &str = "internal-metadata-failover-type";

/// 正常场景: 选出实例 metadata 包含请求中全部键值的子集。
/// <p>
/// 异常场景: 需要根据请求的降级策略进行决策
/// <p>
/// 不降级(默认): 返回未找到实例错误
/// 返回所有节点: 返回服务下的全部实例
/// 返回实例元数据不包含请求metadata的key的节点
/// 例如: ip1 set=1 ; ip2 set=2 ; ip3 ; 请求时 set=0 返回的 ip3 (这个时候只判断key)
/// <p>
/// 服务 metadata 中的 internal-metadata-failover-type 优先于请求中的降级策略。
pub struct MetadataRouter {}

impl MetadataRouter {
    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn ServiceRouter>, String) {
        (new_service_router, DEFAULT_ROUTER_METADATA.to_string())
    }
}

impl Plugin for MetadataRouter {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        DEFAULT_ROUTER_METADATA.to_string()
    }
}

fn match_all_metadata(req_meta: &HashMap<String, String>, ins: &Instance) -> bool {
    req_meta
        .iter()
        .all(|(key, value)| ins.metadata.get(key) == Some(value))
}

fn contains_none_key(req_meta: &HashMap<String, String>, ins: &Instance) -> bool {
    !req_meta.keys().any(|key| ins.metadata.contains_key(key))
}

#[async_trait::async_trait]
impl ServiceRouter for MetadataRouter {
    /// choose_instances 实例路由
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError> {
        let mut failover_type = route_ctx.route_info.metadata_failover;
        let svc_info = &instances.service;
        if let Some(custom_failover_type) = svc_info.metadata.get(KEY_METADATA_FAILOVER) {
            failover_type = parse_custom_failover_type(custom_failover_type);
        }
        let req_meta = &route_ctx.route_info.metadata;

        let ret: Vec<Arc<Instance>> = instances
            .instances
            .iter()
            .filter(|ins| match_all_metadata(req_meta, ins))
            .cloned()
            .collect();
        if !ret.is_empty() {
            return Ok(RouteResult::next(instances.with_instances(ret)));
        }

        match failover_type {
            MetadataFailoverType::MetadataFailoverAll => {
                Ok(RouteResult::next(instances.with_instances(instances.instances.clone())))
            }
            MetadataFailoverType::MetadataFailoverNoKey => {
                let ret = instances
                    .instances
                    .iter()
                    .filter(|ins| contains_none_key(req_meta, ins))
                    .cloned()
                    .collect();
                Ok(RouteResult::next(instances.with_instances(ret)))
            }
            MetadataFailoverType::MetadataFailoverNone => Err(PolarisError::new(
                ErrorCode::MetadataMismatch,
                format!(
                    "[{}] no matching instance for metadata {:?} in service namespace({}) name({})",
                    DEFAULT_ROUTER_METADATA, req_meta, svc_info.namespace, svc_info.name
                ),
            )),
        }
    }

    /// enable 请求携带了 metadata 才启用
    async fn enable(&self, route_ctx: &RouteContext, _instances: &ServiceInstances) -> bool {
        !route_ctx.route_info.metadata.is_empty()
    }
}

fn parse_custom_failover_type(v: &str) -> MetadataFailoverType {
    match v {
        "none" => MetadataFailoverType::MetadataFailoverNone,
        "all" => MetadataFailoverType::MetadataFailoverAll,
        "others" => MetadataFailoverType::MetadataFailoverNoKey,
        _ => MetadataFailoverType::MetadataFailoverNone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::router::RouteInfo;
    use crate::test_support::{instance_with_metadata, labels, service_instances, setup_log};

    fn ctx(failover: MetadataFailoverType, meta: &[(&str, &str)]) -> RouteContext {
        RouteContext::new(
            RouteInfo {
                metadata_failover: failover,
                metadata: labels(meta),
                ..Default::default()
            },
            None,
        )
    }

    #[tokio::test]
    async fn test_superset_match() {
        setup_log();
        let router = MetadataRouter {};
        let instances = service_instances(
            &[],
            vec![
                instance_with_metadata("a", &[("env", "prod"), ("zone", "sz")]),
                instance_with_metadata("b", &[("env", "prod")]),
                instance_with_metadata("c", &[("env", "test"), ("zone", "sz")]),
            ],
        );
        let mut route_ctx = ctx(
            MetadataFailoverType::MetadataFailoverNone,
            &[("env", "prod"), ("zone", "sz")],
        );
        let ret = router.choose_instances(&mut route_ctx, &instances).await.unwrap();
        assert_eq!(ret.instances.len(), 1);
        assert_eq!(ret.instances.instances[0].id, "a");
    }

    #[tokio::test]
    async fn test_choose_instances_no_failover() {
        setup_log();
        let router = MetadataRouter {};
        let instances = service_instances(&[], vec![instance_with_metadata("a", &[("env", "prod")])]);
        let mut route_ctx = ctx(MetadataFailoverType::MetadataFailoverNone, &[("env", "canary")]);
        let ret = router.choose_instances(&mut route_ctx, &instances).await;
        let err = ret.err().unwrap();
        assert_eq!(err.code(), ErrorCode::MetadataMismatch);
        assert!(err.message().contains("no matching instance"));
    }

    #[tokio::test]
    async fn test_choose_instances_failover_all() {
        setup_log();
        let instances = service_instances(&[], vec![instance_with_metadata("a", &[("key2", "value2")])]);
        let mut route_ctx = ctx(MetadataFailoverType::MetadataFailoverAll, &[("key1", "value1")]);
        let ret = MetadataRouter {}
            .choose_instances(&mut route_ctx, &instances)
            .await
            .unwrap();
        assert_eq!(ret.instances.len(), 1);
    }

    #[tokio::test]
    async fn test_choose_instances_failover_no_key() {
        setup_log();
        let router = MetadataRouter {};
        let instances = service_instances(
            &[],
            vec![
                instance_with_metadata("a", &[("key1", "value2")]),
                instance_with_metadata("b", &[]),
                instance_with_metadata("c", &[("other", "x")]),
            ],
        );
        let mut route_ctx = ctx(MetadataFailoverType::MetadataFailoverNoKey, &[("key1", "value1")]);
        let ret = router.choose_instances(&mut route_ctx, &instances).await.unwrap();
        let ids: Vec<&str> = ret.instances.instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_service_failover_override() {
        setup_log();
        let router = MetadataRouter {};
        let instances = service_instances(
            &[(KEY_METADATA_FAILOVER, "all")],
            vec![instance_with_metadata("a", &[("env", "prod")])],
        );
        let mut route_ctx = ctx(MetadataFailoverType::MetadataFailoverNone, &[("env", "canary")]);
        let ret = router.choose_instances(&mut route_ctx, &instances).await.unwrap();
        assert_eq!(ret.instances.len(), 1);
    }

    #[tokio::test]
    async fn test_enable() {
        let router = MetadataRouter {};
        let instances = service_instances(&[], vec![]);
        assert!(!router.enable(&ctx(MetadataFailoverType::MetadataFailoverNone, &[]), &instances).await);
        assert!(router.enable(&ctx(MetadataFailoverType::MetadataFailoverNone, &[("a", "b")]), &instances).await);
    }
}
