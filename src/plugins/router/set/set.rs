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

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        naming::{Instance, ServiceInstances},
        router::{RouteResult, DEFAULT_ROUTER_NEARBY, DEFAULT_ROUTER_SET},
    },
    plugin::{
        plugins::Plugin,
        router::{RouteContext, ServiceRouter},
    },
};

use crate::plugins::router::helper::is_match_all;

pub static KEY_SET_NAME: &str = "internal-set-name";
pub static KEY_SET_ENABLE: &str = "internal-enable-set";
static SET_ENABLE_VALUE: &str = "Y";

pub fn new_service_router(_conf: &PluginConfig) -> Box<dyn ServiceRouter> {
    Box::new(SetRouter {})
}

/// SetName 三段式的 set 名称 area.group.unit, 最后一段可以是 *
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetName {
    pub area: String,
    pub group: String,
    pub unit: String,
}

impl SetName {
    pub fn parse(name: &str) -> Option<SetName> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(SetName {
            area: parts[0].to_string(),
            group: parts[1].to_string(),
            unit: parts[2].to_string(),
        })
    }

    pub fn is_wildcard(&self) -> bool {
        is_match_all(&self.unit)
    }

    pub fn same_group(&self, other: &SetName) -> bool {
        self.area == other.area && self.group == other.group
    }
}

impl Display for SetName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area, self.group, self.unit)
    }
}

/// instance_set 实例开启了 set 并且 set 名称合法时返回其 set
fn instance_set(ins: &Instance) -> Option<SetName> {
    if ins.metadata.get(KEY_SET_ENABLE).map(|v| v.as_str()) != Some(SET_ENABLE_VALUE) {
        return None;
    }
    ins.metadata.get(KEY_SET_NAME).and_then(|v| SetName::parse(v))
}

/// SetRouter set 就近路由
///
/// 被调方显式指定目标 set 时优先按目标 set 过滤, 此时忽略主调方的 set。
/// 否则按主调方所在的 set 过滤: 先三段精确匹配, 为空时匹配同 area.group 下 unit 为 * 的实例。
/// 两种情况下选出实例后都会禁用后续的就近路由。
pub struct SetRouter {}

impl SetRouter {
    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn ServiceRouter>, String) {
        (new_service_router, DEFAULT_ROUTER_SET.to_string())
    }

    fn callee_set(route_ctx: &RouteContext) -> Option<&String> {
        route_ctx
            .route_info
            .callee_metadata
            .get(KEY_SET_NAME)
            .filter(|v| !v.is_empty())
    }

    fn caller_set(route_ctx: &RouteContext) -> Option<&String> {
        let caller_meta = &route_ctx.route_info.caller_metadata;
        if caller_meta.get(KEY_SET_ENABLE).map(|v| v.as_str()) != Some(SET_ENABLE_VALUE) {
            return None;
        }
        caller_meta.get(KEY_SET_NAME).filter(|v| !v.is_empty())
    }

    fn route_by_callee_set(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
        set_name: &str,
    ) -> Result<RouteResult, PolarisError> {
        let target = match SetName::parse(set_name) {
            Some(target) => target,
            None => {
                tracing::warn!(
                    "[polaris][router][set] invalid callee set name {}, skip set router",
                    set_name
                );
                return Ok(RouteResult::next(instances.clone()));
            }
        };
        let ret: Vec<Arc<Instance>> = instances
            .instances
            .iter()
            .filter(|ins| match instance_set(ins) {
                Some(ins_set) if target.is_wildcard() => ins_set.same_group(&target),
                Some(ins_set) => ins_set == target,
                None => false,
            })
            .cloned()
            .collect();
        if ret.is_empty() {
            return Err(set_mismatch(&target, instances));
        }
        route_ctx.route_info.disable_router(DEFAULT_ROUTER_NEARBY);
        Ok(RouteResult::next(instances.with_instances(ret)))
    }

    fn route_by_caller_set(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
        set_name: &str,
    ) -> Result<RouteResult, PolarisError> {
        let caller_set = match SetName::parse(set_name) {
            Some(caller_set) => caller_set,
            None => {
                tracing::warn!(
                    "[polaris][router][set] invalid caller set name {}, skip set router",
                    set_name
                );
                return Ok(RouteResult::next(instances.clone()));
            }
        };
        let set_instances: Vec<(SetName, &Arc<Instance>)> = instances
            .instances
            .iter()
            .filter_map(|ins| instance_set(ins).map(|s| (s, ins)))
            .collect();
        // 被调方没有开启 set 的实例, 交给后续路由处理
        if set_instances.is_empty() {
            return Ok(RouteResult::next(instances.clone()));
        }

        let ret: Vec<Arc<Instance>> = if caller_set.is_wildcard() {
            set_instances
                .iter()
                .filter(|(s, _)| s.same_group(&caller_set))
                .map(|(_, ins)| (*ins).clone())
                .collect()
        } else {
            let exact: Vec<Arc<Instance>> = set_instances
                .iter()
                .filter(|(s, _)| *s == caller_set)
                .map(|(_, ins)| (*ins).clone())
                .collect();
            if !exact.is_empty() {
                exact
            } else {
                set_instances
                    .iter()
                    .filter(|(s, _)| s.is_wildcard() && s.same_group(&caller_set))
                    .map(|(_, ins)| (*ins).clone())
                    .collect()
            }
        };
        if ret.is_empty() {
            return Err(set_mismatch(&caller_set, instances));
        }
        route_ctx.route_info.disable_router(DEFAULT_ROUTER_NEARBY);
        Ok(RouteResult::next(instances.with_instances(ret)))
    }
}

fn set_mismatch(set_name: &SetName, instances: &ServiceInstances) -> PolarisError {
    PolarisError::new(
        ErrorCode::SetMismatch,
        format!(
            "[{}] can not find any instance in set {} of service namespace({}) name({})",
            DEFAULT_ROUTER_SET, set_name, instances.service.namespace, instances.service.name
        ),
    )
}

impl Plugin for SetRouter {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        DEFAULT_ROUTER_SET.to_string()
    }
}

#[async_trait::async_trait]
impl ServiceRouter for SetRouter {
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError> {
        if let Some(set_name) = SetRouter::callee_set(route_ctx).cloned() {
            return self.route_by_callee_set(route_ctx, instances, &set_name);
        }
        if let Some(set_name) = SetRouter::caller_set(route_ctx).cloned() {
            return self.route_by_caller_set(route_ctx, instances, &set_name);
        }
        Ok(RouteResult::next(instances.clone()))
    }

    async fn enable(&self, route_ctx: &RouteContext, _instances: &ServiceInstances) -> bool {
        SetRouter::callee_set(route_ctx).is_some() || SetRouter::caller_set(route_ctx).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::router::RouteInfo;
    use crate::test_support::{instance_with_metadata, labels, service_instances, setup_log};

    fn set_instance(id: &str, set: &str) -> Arc<Instance> {
        instance_with_metadata(id, &[(KEY_SET_ENABLE, "Y"), (KEY_SET_NAME, set)])
    }

    fn caller_ctx(set: &str) -> RouteContext {
        RouteContext::new(
            RouteInfo {
                caller_metadata: labels(&[(KEY_SET_ENABLE, "Y"), (KEY_SET_NAME, set)]),
                ..Default::default()
            },
            None,
        )
    }

    fn ids(ret: &RouteResult) -> Vec<&str> {
        ret.instances.instances.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_parse_set_name() {
        let name = SetName::parse("gz.groupA.v1").unwrap();
        assert_eq!(name.area, "gz");
        assert!(!name.is_wildcard());
        assert!(SetName::parse("gz.groupA.*").unwrap().is_wildcard());
        assert!(SetName::parse("gz.groupA").is_none());
        assert!(SetName::parse("gz..v1").is_none());
    }

    #[tokio::test]
    async fn test_caller_wildcard_two_segment_match() {
        setup_log();
        let router = SetRouter {};
        let instances = service_instances(
            &[],
            vec![set_instance("a", "gz.groupA.v1"), set_instance("b", "sh.groupB.v1")],
        );
        let mut ctx = caller_ctx("gz.groupA.*");
        assert!(router.enable(&ctx, &instances).await);
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["a"]);
        assert!(ctx.route_info.is_router_disabled(DEFAULT_ROUTER_NEARBY));
    }

    #[tokio::test]
    async fn test_caller_exact_then_wildcard_fallback() {
        setup_log();
        let router = SetRouter {};
        let instances = service_instances(
            &[],
            vec![
                set_instance("a", "gz.groupA.v1"),
                set_instance("b", "gz.groupA.*"),
                set_instance("c", "gz.groupA.v2"),
            ],
        );
        let mut ctx = caller_ctx("gz.groupA.v1");
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["a"]);

        let mut ctx = caller_ctx("gz.groupA.v3");
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["b"]);

        let mut ctx = caller_ctx("sh.groupB.v1");
        let ret = router.choose_instances(&mut ctx, &instances).await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::SetMismatch);
    }

    #[tokio::test]
    async fn test_callee_without_set_pass_through() {
        setup_log();
        let router = SetRouter {};
        let instances = service_instances(
            &[],
            vec![instance_with_metadata("a", &[]), instance_with_metadata("b", &[])],
        );
        let mut ctx = caller_ctx("gz.groupA.v1");
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ret.instances.len(), 2);
        assert!(!ctx.route_info.is_router_disabled(DEFAULT_ROUTER_NEARBY));
    }

    #[tokio::test]
    async fn test_callee_set_wins_over_caller_set() {
        setup_log();
        let router = SetRouter {};
        let instances = service_instances(
            &[],
            vec![set_instance("a", "gz.groupA.v1"), set_instance("b", "sh.groupB.v1")],
        );
        let mut ctx = caller_ctx("gz.groupA.v1");
        ctx.route_info.callee_metadata = labels(&[(KEY_SET_NAME, "sh.groupB.v1")]);
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["b"]);
        assert!(ctx.route_info.is_router_disabled(DEFAULT_ROUTER_NEARBY));

        ctx.route_info.callee_metadata = labels(&[(KEY_SET_NAME, "sh.groupB.*")]);
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["b"]);

        ctx.route_info.callee_metadata = labels(&[(KEY_SET_NAME, "bj.groupC.v1")]);
        let ret = router.choose_instances(&mut ctx, &instances).await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::SetMismatch);
    }

    #[tokio::test]
    async fn test_invalid_set_name_pass_through() {
        setup_log();
        let router = SetRouter {};
        let instances = service_instances(&[], vec![set_instance("a", "gz.groupA.v1")]);
        let mut ctx = caller_ctx("bad-set");
        let ret = router.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ret.instances.len(), 1);
    }
}
