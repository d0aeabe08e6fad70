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
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use std::time::SystemTime;

use super::cache::ResourceEventKey;
use super::router::TrafficMirrorRule;

#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ServiceKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.name.is_empty()
    }
}

impl Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.namespace, self.name)
    }
}

#[derive(Default, Debug, Clone)]
pub struct ServiceInfo {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub revision: String,
}

impl ServiceInfo {
    pub fn get_service_key(&self) -> ServiceKey {
        ServiceKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// ServiceInstances 某一时刻服务实例列表的完整快照
///
/// 缓存中的快照只会被整体替换, 路由插件与负载均衡插件基于它生成新的过滤结果,
/// 实例本身通过 Arc 在各个过滤结果之间共享。
#[derive(Default, Debug, Clone)]
pub struct ServiceInstances {
    pub service: ServiceInfo,
    pub instances: Vec<Arc<Instance>>,
    pub total_weight: u64,
}

impl ServiceInstances {
    pub fn new(service: ServiceInfo, instances: Vec<Arc<Instance>>) -> Self {
        let total_weight = instances.iter().map(|ins| ins.weight as u64).sum();
        Self {
            service,
            instances,
            total_weight,
        }
    }

    /// with_instances 基于当前服务信息构造一个新的过滤结果
    pub fn with_instances(&self, instances: Vec<Arc<Instance>>) -> Self {
        ServiceInstances::new(self.service.clone(), instances)
    }

    pub fn get_cache_key(&self) -> String {
        format!("{}#{}", self.service.namespace, self.service.name)
    }

    pub fn get_revision(&self) -> &str {
        &self.service.revision
    }

    pub fn get_total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn list_instances(&self, only_available: bool) -> Vec<Arc<Instance>> {
        self.instances
            .iter()
            .filter(|ins| !only_available || ins.is_available())
            .cloned()
            .collect()
    }
}

#[derive(Default, Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub namespace: String,
    pub service: String,
    pub host: String,
    pub port: u32,
    pub version: String,
    pub protocol: String,
    pub health: bool,
    pub isolated: bool,
    pub weight: u32,
    pub priority: u32,
    pub metadata: HashMap<String, String>,
    pub location: Location,
    pub create_time: Option<SystemTime>,
    pub revision: String,
}

impl Instance {
    pub fn new() -> Instance {
        Default::default()
    }

    /// is_available 实例健康且未被隔离
    pub fn is_available(&self) -> bool {
        self.health && !self.isolated
    }

    pub fn format_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get_service_key(&self) -> ServiceKey {
        ServiceKey::new(self.namespace.clone(), self.service.clone())
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Instance {}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub region: String,
    pub zone: String,
    pub campus: String,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.region.is_empty() && self.zone.is_empty() && self.campus.is_empty()
    }
}

/// RuleValue 规则内容, 路由链直接消费的规则会被解析成具体类型, 其余交由外部插件自行解释
#[derive(Debug, Clone)]
pub enum RuleValue {
    TrafficMirror(Vec<TrafficMirrorRule>),
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct ServiceRule {
    pub event_key: ResourceEventKey,
    pub value: RuleValue,
    pub revision: String,
}

impl ServiceRule {
    pub fn traffic_mirror_rules(&self) -> &[TrafficMirrorRule] {
        match &self.value {
            RuleValue::TrafficMirror(rules) => rules.as_slice(),
            RuleValue::Opaque(_) => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceInstancesChangeEvent {
    pub service: ServiceInfo,
    pub instances: Vec<Arc<Instance>>,
}
