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

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::PolarisError,
        naming::{Instance, ServiceInstances},
        router::{RouteResult, DEFAULT_ROUTER_CANARY},
    },
    plugin::{
        plugins::Plugin,
        router::{RouteContext, ServiceRouter},
    },
};

static KEY_METADATA_CANARY_ENABLE: &str = "internal-canary";
static KEY_METADATA_CANARY: &str = "canary";

pub fn new_service_router(_conf: &PluginConfig) -> Box<dyn ServiceRouter> {
    Box::new(CanaryRouter {})
}

/// CanaryRouter 金丝雀路由
///
/// 请求带有金丝雀标签时优先选择标签一致的实例, 其次选择非金丝雀实例;
/// 请求不带标签时只选择非金丝雀实例。都没有可选实例时返回全部实例。
pub struct CanaryRouter {}

impl CanaryRouter {
    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn ServiceRouter>, String) {
        (new_service_router, DEFAULT_ROUTER_CANARY.to_string())
    }
}

impl Plugin for CanaryRouter {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        DEFAULT_ROUTER_CANARY.to_string()
    }
}

fn filter<F>(instances: &ServiceInstances, f: F) -> Vec<Arc<Instance>>
where
    F: Fn(&Arc<Instance>) -> bool,
{
    instances
        .instances
        .iter()
        .filter(|ins| f(*ins))
        .cloned()
        .collect()
}

#[async_trait::async_trait]
impl ServiceRouter for CanaryRouter {
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError> {
        let canary = route_ctx.route_info.canary.as_str();
        if !canary.is_empty() {
            let ret = filter(instances, |ins| {
                ins.metadata.get(KEY_METADATA_CANARY).map(|v| v.as_str()) == Some(canary)
            });
            if !ret.is_empty() {
                return Ok(RouteResult::next(instances.with_instances(ret)));
            }
        }
        let ret = filter(instances, |ins| !ins.metadata.contains_key(KEY_METADATA_CANARY));
        if !ret.is_empty() {
            return Ok(RouteResult::next(instances.with_instances(ret)));
        }
        tracing::debug!(
            "[polaris][router][canary] no instance match canary {:?}, return all",
            canary
        );
        Ok(RouteResult::next(instances.clone()))
    }

    async fn enable(&self, _route_ctx: &RouteContext, instances: &ServiceInstances) -> bool {
        instances
            .service
            .metadata
            .get(KEY_METADATA_CANARY_ENABLE)
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}
