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
        circuitbreaker::InstanceResource,
        error::PolarisError,
        naming::{Instance, ServiceInstances},
        router::{RouteResult, DEFAULT_ROUTER_RECOVER},
    },
    plugin::{
        plugins::Plugin,
        router::{RouteContext, ServiceRouter},
    },
};

pub fn new_service_router(conf: &PluginConfig) -> Box<dyn ServiceRouter> {
    Box::new(HealthRouter {
        enable_recover_all: conf.get_bool("enableRecoverAll", true),
    })
}

/// HealthRouter 过滤隔离, 不健康以及被熔断的实例
///
/// 过滤后没有可用实例时, 开启 enableRecoverAll 会返回全部未隔离的实例 (全死全活)。
pub struct HealthRouter {
    pub enable_recover_all: bool,
}

impl HealthRouter {
    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn ServiceRouter>, String) {
        (new_service_router, DEFAULT_ROUTER_RECOVER.to_string())
    }

    async fn is_circuit_broken(&self, route_ctx: &RouteContext, ins: &Instance) -> bool {
        let circuit_breaker = match route_ctx
            .extensions
            .as_ref()
            .and_then(|ext| ext.get_circuit_breaker())
        {
            Some(cb) => cb,
            None => return false,
        };
        let resource = InstanceResource {
            callee: route_ctx.route_info.callee.clone(),
            instance_id: ins.id.clone(),
            host: ins.host.clone(),
            port: ins.port,
        };
        match circuit_breaker.check_resource(&resource).await {
            Ok(status) => !status.is_available(),
            Err(err) => {
                tracing::warn!(
                    "[polaris][router][recover] check circuit breaker of {} fail: {}",
                    ins.id,
                    err
                );
                false
            }
        }
    }
}

impl Plugin for HealthRouter {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        DEFAULT_ROUTER_RECOVER.to_string()
    }
}

#[async_trait::async_trait]
impl ServiceRouter for HealthRouter {
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError> {
        let include_unhealthy = route_ctx.route_info.include_unhealthy;
        let include_circuit_broken = route_ctx.route_info.include_circuit_broken;

        let mut final_instances = Vec::<Arc<Instance>>::with_capacity(instances.len());
        for ins in instances.instances.iter() {
            if ins.isolated {
                continue;
            }
            if !include_unhealthy && !ins.health {
                continue;
            }
            if !include_circuit_broken && self.is_circuit_broken(route_ctx, ins).await {
                continue;
            }
            final_instances.push(ins.clone());
        }

        if final_instances.is_empty() && self.enable_recover_all {
            tracing::info!(
                "[polaris][router][recover] all instances of {} unavailable, recover all",
                route_ctx.route_info.callee
            );
            final_instances = instances
                .instances
                .iter()
                .filter(|ins| !ins.isolated)
                .cloned()
                .collect();
        }

        Ok(RouteResult::next(instances.with_instances(final_instances)))
    }

    async fn enable(&self, _route_ctx: &RouteContext, _instances: &ServiceInstances) -> bool {
        true
    }
}
