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

use dashmap::DashSet;
use rand::Rng;

use crate::core::{
    config::global::PluginConfig,
    model::{
        cache::{EventType, ResourceEventKey},
        error::PolarisError,
        naming::{Instance, ServiceInstances, ServiceKey},
        router::{RouteInfo, RouteResult, TrafficMirrorRule, DEFAULT_ROUTER_TRAFFIC_MIRROR},
    },
    plugin::{
        cache::Filter,
        plugins::{Extensions, Plugin},
        router::{RouteContext, ServiceRouter},
    },
};

use super::super::helper::{match_labels, match_service};

pub fn new_service_router(_conf: &PluginConfig) -> Box<dyn ServiceRouter> {
    Box::new(TrafficMirrorRouter::new())
}

/// TrafficMirrorRouter 流量镜像路由
///
/// 按照被调服务的镜像规则抽样选出一个镜像目标, 放在 RouteContext 中交给调用方,
/// 不会缩小本次路由的实例范围。
///
/// 每个被调服务只有第一次访问时会同步等待规则拉取, 之后只读取缓存中已有的规则,
/// 缓存中没有规则时视为没有配置镜像。
pub struct TrafficMirrorRouter {
    first_loaded: DashSet<ResourceEventKey>,
}

impl TrafficMirrorRouter {
    pub fn new() -> Self {
        Self {
            first_loaded: DashSet::new(),
        }
    }

    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn ServiceRouter>, String) {
        (new_service_router, DEFAULT_ROUTER_TRAFFIC_MIRROR.to_string())
    }

    async fn load_rules(
        &self,
        extensions: &Extensions,
        callee: ServiceKey,
    ) -> Result<Vec<TrafficMirrorRule>, PolarisError> {
        let cache = extensions.get_resource_cache()?;
        let key = ResourceEventKey::new(callee, EventType::TrafficMirrorRule);
        if !self.first_loaded.insert(key.clone()) {
            return Ok(match cache.get(&key).and_then(|v| v.to_service_rule()) {
                Some(rule) => rule.traffic_mirror_rules().to_vec(),
                None => {
                    tracing::debug!("[polaris][router][mirror] {} not in cache, skip", key);
                    Vec::new()
                }
            });
        }
        let filter = Filter::new(key, extensions.conf.global.api.timeout);
        let rule = cache.load_service_rule(filter).await?;
        Ok(rule.traffic_mirror_rules().to_vec())
    }
}

fn match_source(rule: &TrafficMirrorRule, route_info: &RouteInfo) -> bool {
    if rule.sources.is_empty() {
        return true;
    }
    rule.sources.iter().any(|source| {
        match_service(
            &source.namespace,
            &source.service,
            &route_info.caller.namespace,
            &route_info.caller.name,
        ) && match_labels(&source.labels, &route_info.traffic_labels)
    })
}

fn pick_destination(rule: &TrafficMirrorRule, instances: &ServiceInstances) -> Option<Arc<Instance>> {
    let candidates: Vec<&Arc<Instance>> = instances
        .instances
        .iter()
        .filter(|ins| ins.is_available() && match_labels(&rule.destination_metadata, &ins.metadata))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..candidates.len());
    Some(candidates[index].clone())
}

fn hit_percent(percent: f64) -> bool {
    if percent <= 0.0 {
        return false;
    }
    if percent >= 100.0 {
        return true;
    }
    rand::thread_rng().gen_range(0.0..100.0) < percent
}

impl Default for TrafficMirrorRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for TrafficMirrorRouter {
    fn init(&mut self) {}

    fn destroy(&self) {
        self.first_loaded.clear();
    }

    fn name(&self) -> String {
        DEFAULT_ROUTER_TRAFFIC_MIRROR.to_string()
    }
}

#[async_trait::async_trait]
impl ServiceRouter for TrafficMirrorRouter {
    /// choose_instances 实例路由
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError> {
        let extensions = match route_ctx.extensions.clone() {
            Some(ext) => ext,
            None => return Ok(RouteResult::next(instances.clone())),
        };
        let mut callee = route_ctx.route_info.callee.clone();
        if callee.is_empty() {
            callee = instances.service.get_service_key();
        }

        // 镜像规则加载失败不影响主调用
        let rules = match self.load_rules(&extensions, callee.clone()).await {
            Ok(rules) => rules,
            Err(err) => {
                tracing::warn!(
                    "[polaris][router][mirror] load traffic mirror rule of {} fail: {}",
                    callee,
                    err
                );
                return Ok(RouteResult::next(instances.clone()));
            }
        };

        for rule in rules.iter().filter(|r| r.enable) {
            if !match_source(rule, &route_ctx.route_info) {
                continue;
            }
            if !hit_percent(rule.percent) {
                break;
            }
            route_ctx.mirror_instance = pick_destination(rule, instances);
            if let Some(ins) = &route_ctx.mirror_instance {
                tracing::debug!(
                    "[polaris][router][mirror] rule {} mirror traffic of {} to {}",
                    rule.name,
                    callee,
                    ins.format_address()
                );
            }
            break;
        }
        Ok(RouteResult::next(instances.clone()))
    }

    /// enable 是否启用
    async fn enable(&self, _route_ctx: &RouteContext, _instances: &ServiceInstances) -> bool {
        true
    }
}
