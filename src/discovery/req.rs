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
use std::time::Duration;

use crate::core::model::cache::EventType;
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::loadbalance::Criteria;
use crate::core::model::naming::{
    Instance, ServiceInfo, ServiceInstancesChangeEvent, ServiceKey, ServiceRule,
};
use crate::core::model::router::RouteInfo;

pub use crate::core::model::circuitbreaker::RetStatus;
pub use crate::core::model::stat::ServiceCallResult;

fn check_service(namespace: &str, service: &str) -> Result<(), PolarisError> {
    if service.is_empty() {
        return Err(PolarisError::new(
            ErrorCode::ApiInvalidArgument,
            "service is empty".to_string(),
        ));
    }

    if namespace.is_empty() {
        return Err(PolarisError::new(
            ErrorCode::ApiInvalidArgument,
            "namespace is empty".to_string(),
        ));
    }
    Ok(())
}

// ConsumerAPI request and response definition

#[derive(Clone, Debug, Default)]
pub struct GetOneInstanceRequest {
    pub flow_id: String,
    // 首次拉取服务数据的最长等待时间, 为 0 时使用 global.api.timeout
    pub timeout: Duration,
    pub service: String,
    pub namespace: String,
    // 路由信息, 被调服务由 namespace 与 service 决定
    pub route_info: RouteInfo,
    pub criteria: Criteria,
}

impl GetOneInstanceRequest {
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn check_valid(&self) -> Result<(), PolarisError> {
        check_service(&self.namespace, &self.service)
    }

    pub fn get_service_key(&self) -> ServiceKey {
        ServiceKey::new(self.namespace.clone(), self.service.clone())
    }
}

#[derive(Clone, Debug)]
pub struct InstanceResponse {
    pub instance: Arc<Instance>,
    // 命中流量镜像规则时的镜像目标
    pub mirror_instance: Option<Arc<Instance>>,
}

#[derive(Clone, Debug, Default)]
pub struct GetHealthInstanceRequest {
    pub flow_id: String,
    pub timeout: Duration,
    pub service: String,
    pub namespace: String,
}

impl GetHealthInstanceRequest {
    pub fn check_valid(&self) -> Result<(), PolarisError> {
        check_service(&self.namespace, &self.service)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GetAllInstanceRequest {
    pub flow_id: String,
    pub timeout: Duration,
    pub service: String,
    pub namespace: String,
}

impl GetAllInstanceRequest {
    pub fn check_valid(&self) -> Result<(), PolarisError> {
        check_service(&self.namespace, &self.service)
    }
}

#[derive(Clone, Debug)]
pub struct InstancesResponse {
    pub service_info: ServiceInfo,
    pub instances: Vec<Arc<Instance>>,
}

pub struct WatchInstanceRequest {
    pub namespace: String,
    pub service: String,
    pub call_back: Box<dyn Fn(ServiceInstancesChangeEvent) + Send + Sync>,
}

impl WatchInstanceRequest {
    pub fn check_valid(&self) -> Result<(), PolarisError> {
        check_service(&self.namespace, &self.service)
    }

    pub fn get_key(&self) -> String {
        format!("{}#{}", self.namespace, self.service)
    }
}

pub struct WatchInstanceResponse {
    pub service: ServiceKey,
}

#[derive(Clone, Debug, Default)]
pub struct UnWatchInstanceRequest {
    pub namespace: String,
    pub service: String,
}

impl UnWatchInstanceRequest {
    pub fn check_valid(&self) -> Result<(), PolarisError> {
        check_service(&self.namespace, &self.service)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceRuleType {
    Router,
    CircuitBreaker,
    RateLimit,
    FaultDetector,
    Lane,
    TrafficMirror,
}

impl ServiceRuleType {
    pub fn to_event_type(&self) -> EventType {
        match self {
            ServiceRuleType::Router => EventType::RouterRule,
            ServiceRuleType::CircuitBreaker => EventType::CircuitBreakerRule,
            ServiceRuleType::RateLimit => EventType::RateLimitRule,
            ServiceRuleType::FaultDetector => EventType::FaultDetectRule,
            ServiceRuleType::Lane => EventType::LaneRule,
            ServiceRuleType::TrafficMirror => EventType::TrafficMirrorRule,
        }
    }
}

pub struct GetServiceRuleRequest {
    pub namespace: String,
    pub service: String,
    pub rule_type: ServiceRuleType,
    pub timeout: Duration,
}

impl GetServiceRuleRequest {
    pub fn check_valid(&self) -> Result<(), PolarisError> {
        check_service(&self.namespace, &self.service)
    }
}

pub struct ServiceRuleResponse {
    pub rule: Arc<ServiceRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_valid() {
        let req = GetOneInstanceRequest::new("default", "");
        assert_eq!(req.check_valid().err().unwrap().code(), ErrorCode::ApiInvalidArgument);
        let req = GetAllInstanceRequest {
            service: "echo".to_string(),
            ..Default::default()
        };
        assert_eq!(req.check_valid().err().unwrap().code(), ErrorCode::ApiInvalidArgument);
        assert!(GetOneInstanceRequest::new("default", "echo").check_valid().is_ok());
    }
}
