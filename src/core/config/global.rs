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

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::config::serde_duration_ext::parse_duration;
use crate::core::model::naming::Location;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    pub api: APIConfig,
    pub server_connector: ServerConnectorConfig,
    pub local_cache: LocalCacheConfig,
    pub stat_reporter: StatReporterConfig,
    pub location: LocationConfig,
    pub logger: LoggerConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct APIConfig {
    // 首次获取资源时的最长等待时间
    #[serde(with = "crate::core::config::serde_duration_ext")]
    pub timeout: Duration,
}

impl Default for APIConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}

pub static DEFAULT_SERVER_CONNECTOR: &str = "fixed";

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConnectorConfig {
    pub protocol: String,
    pub addresses: Vec<String>,
    // 单次拉取的超时时间
    #[serde(with = "crate::core::config::serde_duration_ext")]
    pub message_timeout: Duration,
}

impl Default for ServerConnectorConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_SERVER_CONNECTOR.to_string(),
            addresses: Vec::new(),
            message_timeout: Duration::from_secs(1),
        }
    }
}

impl ServerConnectorConfig {
    pub fn get_protocol(&self) -> String {
        self.protocol.clone()
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalCacheConfig {
    pub name: String,
    #[serde(with = "crate::core::config::serde_duration_ext")]
    pub service_refresh_interval: Duration,
    #[serde(with = "crate::core::config::serde_duration_ext")]
    pub service_retry_interval: Duration,
    #[serde(with = "crate::core::config::serde_duration_ext")]
    pub sweep_interval: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            service_refresh_interval: Duration::from_secs(2),
            service_retry_interval: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl LocalCacheConfig {
    /// get_sweep_interval 巡检周期不会大于刷新周期
    pub fn get_sweep_interval(&self) -> Duration {
        let sweep = if self.sweep_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.sweep_interval
        };
        sweep.min(self.service_refresh_interval)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StatReporterConfig {
    pub enable: bool,
    pub chain: Vec<PluginConfig>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationConfig {
    pub region: String,
    pub zone: String,
    pub campus: String,
}

impl LocationConfig {
    pub fn to_location(&self) -> Location {
        Location {
            region: self.region.clone(),
            zone: self.zone.clone(),
            campus: self.campus.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerConfig {
    pub dir: String,
    pub file: String,
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            dir: "./logs".to_string(),
            file: "polaris.log".to_string(),
            level: "info".to_string(),
        }
    }
}

/// PluginConfig 插件的名字以及插件自身的配置项
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    pub name: String,
    pub options: HashMap<String, serde_yaml::Value>,
}

impl PluginConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: serde_yaml::Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.options.get(key) {
            Some(serde_yaml::Value::Bool(v)) => *v,
            Some(serde_yaml::Value::String(v)) => v.parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.options.get(key) {
            Some(serde_yaml::Value::String(v)) => v.clone(),
            _ => default.to_string(),
        }
    }

    pub fn get_duration(&self, key: &str, default: Duration) -> Duration {
        match self.options.get(key) {
            Some(serde_yaml::Value::String(v)) => match parse_duration(v) {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!("[polaris][config] plugin {} option {}: {}", self.name, key, err);
                    default
                }
            },
            _ => default,
        }
    }
}
