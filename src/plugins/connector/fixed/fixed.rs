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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use serde::Deserialize;

use crate::core::config::global::ServerConnectorConfig;
use crate::core::model::cache::{EventType, ResourceEventKey, ResourceValue};
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::naming::{
    Instance, Location, RuleValue, ServiceInfo, ServiceInstances, ServiceKey, ServiceRule,
};
use crate::core::model::router::TrafficMirrorRule;
use crate::core::plugin::connector::{Connector, FetchResult};
use crate::core::plugin::plugins::{Extensions, Plugin};

static PLUGIN_NAME: &str = "fixed";
static FILE_ADDRESS_PREFIX: &str = "file://";
static EMPTY_RULE_REVISION: &str = "empty";

fn new_connector(conf: &ServerConnectorConfig, _extensions: &Extensions) -> Box<dyn Connector> {
    let connector = FixedConnector::new();
    for address in conf.addresses.iter() {
        match address.strip_prefix(FILE_ADDRESS_PREFIX) {
            Some(path) => {
                if let Err(err) = connector.load_file(path) {
                    tracing::error!("[polaris][connector][fixed] load {} fail: {}", path, err);
                }
            }
            None => tracing::warn!(
                "[polaris][connector][fixed] ignore unsupported address {}",
                address
            ),
        }
    }
    Box::new(connector)
}

/// FixedConnector 从进程内的静态表读取资源, 适用于静态部署与测试
///
/// 每次更新都会生成新的 revision, 调用方携带的 revision 与当前一致时返回 NotChanged。
pub struct FixedConnector {
    resources: DashMap<ResourceEventKey, ResourceValue>,
    revision: AtomicU64,
}

impl Default for FixedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedConnector {
    pub fn builder() -> (
        fn(&ServerConnectorConfig, &Extensions) -> Box<dyn Connector>,
        String,
    ) {
        (new_connector, PLUGIN_NAME.to_string())
    }

    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            revision: AtomicU64::new(0),
        }
    }

    fn next_revision(&self) -> String {
        format!("fixed-{}", self.revision.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// set_instances 整体替换服务的实例列表
    pub fn set_instances(
        &self,
        service: ServiceKey,
        service_metadata: HashMap<String, String>,
        instances: Vec<Instance>,
    ) -> String {
        let revision = self.next_revision();
        let instances = instances
            .into_iter()
            .map(|mut ins| {
                ins.namespace = service.namespace.clone();
                ins.service = service.name.clone();
                if ins.revision.is_empty() {
                    ins.revision = revision.clone();
                }
                Arc::new(ins)
            })
            .collect();
        let svc = ServiceInstances::new(
            ServiceInfo {
                id: String::new(),
                namespace: service.namespace.clone(),
                name: service.name.clone(),
                metadata: service_metadata,
                revision: revision.clone(),
            },
            instances,
        );
        self.resources.insert(
            ResourceEventKey::instances(service),
            ResourceValue::Instances(Arc::new(svc)),
        );
        revision
    }

    /// set_rule 整体替换服务的某类规则
    pub fn set_rule(&self, service: ServiceKey, event_type: EventType, value: RuleValue) -> String {
        let revision = self.next_revision();
        let event_key = ResourceEventKey::new(service, event_type);
        self.resources.insert(
            event_key.clone(),
            ResourceValue::Rule(Arc::new(ServiceRule {
                event_key,
                value,
                revision: revision.clone(),
            })),
        );
        revision
    }

    pub fn remove(&self, key: &ResourceEventKey) {
        self.resources.remove(key);
    }

    pub fn load_file(&self, path: &str) -> Result<(), PolarisError> {
        let data = std::fs::read_to_string(path).map_err(|err| {
            PolarisError::new(
                ErrorCode::InvalidConfig,
                format!("read fixed resource file {} fail: {}", path, err),
            )
        })?;
        self.load_str(&data)
    }

    pub fn load_str(&self, data: &str) -> Result<(), PolarisError> {
        let file: FixedResourceFile = serde_yaml::from_str(data).map_err(|err| {
            PolarisError::new(
                ErrorCode::InvalidConfig,
                format!("parse fixed resource fail: {}", err),
            )
        })?;
        for svc in file.services {
            let key = ServiceKey::new(svc.namespace, svc.name);
            let instances = svc
                .instances
                .into_iter()
                .map(FixedInstance::into_instance)
                .collect();
            self.set_instances(key.clone(), svc.metadata, instances);
            if !svc.traffic_mirror_rules.is_empty() {
                self.set_rule(
                    key,
                    EventType::TrafficMirrorRule,
                    RuleValue::TrafficMirror(svc.traffic_mirror_rules),
                );
            }
        }
        Ok(())
    }
}

impl Plugin for FixedConnector {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        PLUGIN_NAME.to_string()
    }
}

#[async_trait::async_trait]
impl Connector for FixedConnector {
    async fn fetch(
        &self,
        key: &ResourceEventKey,
        last_revision: &str,
    ) -> Result<FetchResult, PolarisError> {
        let value = self.resources.get(key).map(|v| v.clone());
        match value {
            Some(value) => {
                if value.revision() == last_revision {
                    return Ok(FetchResult::NotChanged);
                }
                Ok(FetchResult::Changed(value))
            }
            None => {
                // 规则不存在时返回空规则, 使用方按无规则处理
                if key.event_type.is_rule() {
                    if last_revision == EMPTY_RULE_REVISION {
                        return Ok(FetchResult::NotChanged);
                    }
                    return Ok(FetchResult::Changed(ResourceValue::Rule(Arc::new(
                        ServiceRule {
                            event_key: key.clone(),
                            value: RuleValue::Opaque(serde_json::Value::Null),
                            revision: EMPTY_RULE_REVISION.to_string(),
                        },
                    ))));
                }
                Err(PolarisError::new(
                    ErrorCode::ServiceNotFound,
                    format!("service {} not found", key.service),
                ))
            }
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct FixedResourceFile {
    services: Vec<FixedService>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct FixedService {
    namespace: String,
    name: String,
    metadata: HashMap<String, String>,
    instances: Vec<FixedInstance>,
    traffic_mirror_rules: Vec<TrafficMirrorRule>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FixedInstance {
    id: String,
    host: String,
    port: u32,
    weight: u32,
    healthy: bool,
    isolated: bool,
    protocol: String,
    version: String,
    metadata: HashMap<String, String>,
    region: String,
    zone: String,
    campus: String,
}

impl Default for FixedInstance {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: String::new(),
            port: 0,
            weight: 100,
            healthy: true,
            isolated: false,
            protocol: String::new(),
            version: String::new(),
            metadata: HashMap::new(),
            region: String::new(),
            zone: String::new(),
            campus: String::new(),
        }
    }
}

impl FixedInstance {
    fn into_instance(self) -> Instance {
        let id = if self.id.is_empty() {
            format!("{}:{}", self.host, self.port)
        } else {
            self.id
        };
        Instance {
            id,
            host: self.host,
            port: self.port,
            version: self.version,
            protocol: self.protocol,
            health: self.healthy,
            isolated: self.isolated,
            weight: self.weight,
            metadata: self.metadata,
            location: Location {
                region: self.region,
                zone: self.zone,
                campus: self.campus,
            },
            create_time: Some(SystemTime::now()),
            ..Default::default()
        }
    }
}
