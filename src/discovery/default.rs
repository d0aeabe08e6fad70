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

use crate::core::context::SDKContext;
use crate::core::model::cache::{ResourceEventKey, ResourceValue, ServerEvent};
use crate::core::model::error::PolarisError;
use crate::core::model::naming::{ServiceInstancesChangeEvent, ServiceKey};
use crate::core::plugin::cache::{Action, ResourceListener};
use crate::discovery::api::ConsumerAPI;
use crate::discovery::req::{
    GetAllInstanceRequest, GetHealthInstanceRequest, GetOneInstanceRequest,
    GetServiceRuleRequest, InstanceResponse, InstancesResponse, ServiceCallResult,
    ServiceRuleResponse, UnWatchInstanceRequest, WatchInstanceRequest, WatchInstanceResponse,
};

/// InstanceWatcher 把缓存中的实例变更转交给用户回调
struct InstanceWatcher {
    key: ResourceEventKey,
    call_back: Box<dyn Fn(ServiceInstancesChangeEvent) + Send + Sync>,
}

impl ResourceListener for InstanceWatcher {
    fn on_event(&self, action: Action, val: ServerEvent) {
        if action == Action::Delete {
            return;
        }
        if let ResourceValue::Instances(ins) = val.value {
            (self.call_back)(ServiceInstancesChangeEvent {
                service: ins.service.clone(),
                instances: ins.instances.clone(),
            });
        }
    }

    fn watch_key(&self) -> ResourceEventKey {
        self.key.clone()
    }
}

pub struct DefaultConsumerAPI {
    context: Arc<SDKContext>,
}

impl DefaultConsumerAPI {
    pub fn new(context: Arc<SDKContext>) -> Self {
        Self { context }
    }

    async fn list_instances(
        &self,
        service: ServiceKey,
        timeout: std::time::Duration,
        only_available: bool,
    ) -> Result<InstancesResponse, PolarisError> {
        let svc_ins = self
            .context
            .get_engine()
            .get_service_instances(service, timeout)
            .await?;
        Ok(InstancesResponse {
            service_info: svc_ins.service.clone(),
            instances: svc_ins.list_instances(only_available),
        })
    }
}

#[async_trait::async_trait]
impl ConsumerAPI for DefaultConsumerAPI {
    async fn get_one_instance(
        &self,
        req: GetOneInstanceRequest,
    ) -> Result<InstanceResponse, PolarisError> {
        req.check_valid()?;
        let engine = self.context.get_engine();
        let mut route_info = req.route_info.clone();
        route_info.callee = req.get_service_key();
        let mut route_ctx = engine.new_route_context(route_info);
        let instance = engine
            .resolve(&mut route_ctx, &req.criteria, req.timeout)
            .await?;
        tracing::debug!(
            "[polaris][discovery][consumer] flow {} choose instance {} of {}",
            req.flow_id,
            instance.format_address(),
            route_ctx.route_info.callee
        );
        Ok(InstanceResponse {
            instance,
            mirror_instance: route_ctx.mirror_instance,
        })
    }

    async fn get_health_instance(
        &self,
        req: GetHealthInstanceRequest,
    ) -> Result<InstancesResponse, PolarisError> {
        req.check_valid()?;
        self.list_instances(
            ServiceKey::new(req.namespace, req.service),
            req.timeout,
            true,
        )
        .await
    }

    async fn get_all_instance(
        &self,
        req: GetAllInstanceRequest,
    ) -> Result<InstancesResponse, PolarisError> {
        req.check_valid()?;
        self.list_instances(
            ServiceKey::new(req.namespace, req.service),
            req.timeout,
            false,
        )
        .await
    }

    async fn watch_instance(
        &self,
        req: WatchInstanceRequest,
    ) -> Result<WatchInstanceResponse, PolarisError> {
        req.check_valid()?;
        let service = ServiceKey::new(req.namespace, req.service);
        let key = ResourceEventKey::instances(service.clone());
        let engine = self.context.get_engine();
        engine.register_resource_listener(Arc::new(InstanceWatcher {
            key: key.clone(),
            call_back: req.call_back,
        }));
        // 确保后台存在同步任务, 之后的每次变更都会通知回调
        engine.get_resource_cache().subscribe(key);
        Ok(WatchInstanceResponse { service })
    }

    async fn unwatch_instance(&self, req: UnWatchInstanceRequest) -> Result<usize, PolarisError> {
        req.check_valid()?;
        let key = ResourceEventKey::instances(ServiceKey::new(req.namespace, req.service));
        let removed = self.context.get_engine().remove_resource_listeners(&key);
        tracing::info!(
            "[polaris][discovery][consumer] unwatch {} removed {} listeners",
            key,
            removed
        );
        Ok(removed)
    }

    async fn get_service_rule(
        &self,
        req: GetServiceRuleRequest,
    ) -> Result<ServiceRuleResponse, PolarisError> {
        req.check_valid()?;
        let rule = self
            .context
            .get_engine()
            .get_service_rule(
                ServiceKey::new(req.namespace, req.service),
                req.rule_type.to_event_type(),
                req.timeout,
            )
            .await?;
        Ok(ServiceRuleResponse { rule })
    }

    async fn report_service_call(&self, req: ServiceCallResult) {
        self.context.get_engine().report_service_call(req).await;
    }
}
