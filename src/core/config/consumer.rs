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

use crate::core::config::global::PluginConfig;
use crate::core::model::loadbalance::{
    LOADBALANCE_RING_HASH, LOADBALANCE_SHORTEST_RESPONSE_TIME, LOADBALANCE_WEIGHTED_RANDOM,
    LOADBALANCE_WEIGHTED_ROUND_ROBIN,
};
use crate::core::model::router::{
    DEFAULT_ROUTER_CANARY, DEFAULT_ROUTER_METADATA, DEFAULT_ROUTER_NEARBY, DEFAULT_ROUTER_RECOVER,
    DEFAULT_ROUTER_SET, DEFAULT_ROUTER_TRAFFIC_MIRROR,
};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsumerConfig {
    pub service_router: ServiceRouterConfig,
    pub load_balancer: LoadBalancerConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRouterConfig {
    pub before_chain: Vec<PluginConfig>,
    pub core_chain: Vec<PluginConfig>,
    pub after_chain: Vec<PluginConfig>,
}

impl Default for ServiceRouterConfig {
    fn default() -> Self {
        Self {
            before_chain: Vec::new(),
            core_chain: vec![
                PluginConfig::new(DEFAULT_ROUTER_SET),
                PluginConfig::new(DEFAULT_ROUTER_METADATA),
                PluginConfig::new(DEFAULT_ROUTER_CANARY),
                PluginConfig::new(DEFAULT_ROUTER_NEARBY),
            ],
            after_chain: vec![
                PluginConfig::new(DEFAULT_ROUTER_RECOVER),
                PluginConfig::new(DEFAULT_ROUTER_TRAFFIC_MIRROR),
            ],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalancerConfig {
    pub default_policy: String,
    pub plugins: Vec<PluginConfig>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            default_policy: LOADBALANCE_WEIGHTED_RANDOM.to_string(),
            plugins: vec![
                PluginConfig::new(LOADBALANCE_WEIGHTED_RANDOM),
                PluginConfig::new(LOADBALANCE_WEIGHTED_ROUND_ROBIN),
                PluginConfig::new(LOADBALANCE_RING_HASH),
                PluginConfig::new(LOADBALANCE_SHORTEST_RESPONSE_TIME),
            ],
        }
    }
}

impl LoadBalancerConfig {
    pub fn get_plugin_config(&self, name: &str) -> PluginConfig {
        self.plugins
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .unwrap_or_else(|| PluginConfig::new(name))
    }
}
