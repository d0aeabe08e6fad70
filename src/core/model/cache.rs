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

use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

use super::naming::{ServiceInstances, ServiceKey, ServiceRule};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub enum EventType {
    #[default]
    Unknown,
    Instance,
    RouterRule,
    CircuitBreakerRule,
    RateLimitRule,
    FaultDetectRule,
    BlockAllowRule,
    TrafficMirrorRule,
    LaneRule,
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EventType::Unknown => "unknown",
            EventType::Instance => "Instance",
            EventType::RouterRule => "RouterRule",
            EventType::CircuitBreakerRule => "CircuitBreakerRule",
            EventType::RateLimitRule => "RateLimitRule",
            EventType::FaultDetectRule => "FaultDetectRule",
            EventType::BlockAllowRule => "BlockAllowRule",
            EventType::TrafficMirrorRule => "TrafficMirrorRule",
            EventType::LaneRule => "LaneRule",
        };
        f.write_str(name)
    }
}

impl EventType {
    pub fn is_rule(&self) -> bool {
        !matches!(self, EventType::Unknown | EventType::Instance)
    }
}

/// ResourceEventKey 标识一份可缓存的资源: 某个服务下的某类数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceEventKey {
    pub service: ServiceKey,
    pub event_type: EventType,
}

impl ResourceEventKey {
    pub fn new(service: ServiceKey, event_type: EventType) -> Self {
        Self {
            service,
            event_type,
        }
    }

    pub fn instances(service: ServiceKey) -> Self {
        Self::new(service, EventType::Instance)
    }
}

impl Display for ResourceEventKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}#{}#{}",
            self.event_type, self.service.namespace, self.service.name
        )
    }
}

/// ResourceValue 缓存中存放的完整快照, 写入时整体替换
#[derive(Debug, Clone)]
pub enum ResourceValue {
    Instances(Arc<ServiceInstances>),
    Rule(Arc<ServiceRule>),
}

impl ResourceValue {
    pub fn revision(&self) -> &str {
        match self {
            ResourceValue::Instances(ins) => ins.get_revision(),
            ResourceValue::Rule(rule) => &rule.revision,
        }
    }

    pub fn to_service_instances(&self) -> Option<Arc<ServiceInstances>> {
        match self {
            ResourceValue::Instances(ins) => Some(ins.clone()),
            _ => None,
        }
    }

    pub fn to_service_rule(&self) -> Option<Arc<ServiceRule>> {
        match self {
            ResourceValue::Rule(rule) => Some(rule.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event_key: ResourceEventKey,
    pub value: ResourceValue,
}
