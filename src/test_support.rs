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

//! 单元测试共用的构造函数与假的 Connector
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tokio::time::Instant;
use tracing::metadata::LevelFilter;

use crate::core::model::cache::{ResourceEventKey, ResourceValue};
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::naming::{Instance, ServiceInfo, ServiceInstances};
use crate::core::plugin::connector::{Connector, FetchResult};
use crate::core::plugin::plugins::Plugin;

static LOGGER_INIT: Once = Once::new();

pub(crate) fn setup_log() {
    LOGGER_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_thread_names(true)
            .with_file(true)
            .with_level(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_max_level(LevelFilter::DEBUG)
            .init()
    });
}

pub(crate) fn instance(id: &str, weight: u32) -> Arc<Instance> {
    Arc::new(Instance {
        id: id.to_string(),
        namespace: "default".to_string(),
        service: "svc".to_string(),
        host: "127.0.0.1".to_string(),
        port: 8080,
        health: true,
        weight,
        ..Default::default()
    })
}

pub(crate) fn instance_with_metadata(id: &str, metadata: &[(&str, &str)]) -> Arc<Instance> {
    Arc::new(Instance {
        metadata: labels(metadata),
        ..(*instance(id, 100)).clone()
    })
}

pub(crate) fn labels(kvs: &[(&str, &str)]) -> HashMap<String, String> {
    kvs.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn service_instances(
    service_metadata: &[(&str, &str)],
    instances: Vec<Arc<Instance>>,
) -> ServiceInstances {
    ServiceInstances::new(
        ServiceInfo {
            namespace: "default".to_string(),
            name: "svc".to_string(),
            metadata: labels(service_metadata),
            revision: "r1".to_string(),
            ..Default::default()
        },
        instances,
    )
}

pub(crate) fn instances_value(ns: &str, name: &str, revision: &str, count: usize) -> ResourceValue {
    let instances = (0..count)
        .map(|i| {
            Arc::new(Instance {
                id: format!("{}-{}", name, i),
                namespace: ns.to_string(),
                service: name.to_string(),
                host: format!("10.0.0.{}", i + 1),
                port: 8080,
                health: true,
                weight: 100,
                ..Default::default()
            })
        })
        .collect();
    ResourceValue::Instances(Arc::new(ServiceInstances::new(
        ServiceInfo {
            namespace: ns.to_string(),
            name: name.to_string(),
            revision: revision.to_string(),
            ..Default::default()
        },
        instances,
    )))
}

struct InFlightGuard<'a>(&'a AtomicU64);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// ScriptedConnector 记录调用情况, 可以注入失败, panic 与延迟
pub(crate) struct ScriptedConnector {
    values: Mutex<HashMap<ResourceEventKey, ResourceValue>>,
    failures: AtomicU32,
    panic_next: AtomicBool,
    delay: Duration,
    calls: AtomicU64,
    pub(crate) in_flight: AtomicU64,
    max_in_flight: AtomicU64,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            failures: AtomicU32::new(0),
            panic_next: AtomicBool::new(false),
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn set_value(&self, key: ResourceEventKey, value: ResourceValue) {
        self.values.lock().unwrap().insert(key, value);
    }

    pub(crate) fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::Release);
    }

    pub(crate) fn panic_next(&self) {
        self.panic_next.store(true, Ordering::Release);
    }

    pub(crate) fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }

    pub(crate) fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

impl Plugin for ScriptedConnector {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        "scripted".to_string()
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn fetch(
        &self,
        key: &ResourceEventKey,
        last_revision: &str,
    ) -> Result<FetchResult, PolarisError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.call_times.lock().unwrap().push(Instant::now());
        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(current, Ordering::AcqRel);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_next.swap(false, Ordering::AcqRel) {
            panic!("scripted connector panic");
        }
        let failures = self.failures.load(Ordering::Acquire);
        if failures > 0 {
            self.failures.store(failures - 1, Ordering::Release);
            return Err(PolarisError::new(
                ErrorCode::NetworkError,
                "scripted failure".to_string(),
            ));
        }
        let value = self.values.lock().unwrap().get(key).cloned();
        match value {
            Some(value) if value.revision() == last_revision => Ok(FetchResult::NotChanged),
            Some(value) => Ok(FetchResult::Changed(value)),
            None => Err(PolarisError::new(
                ErrorCode::ServiceNotFound,
                format!("resource {} not found", key),
            )),
        }
    }
}
