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

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::naming::{ServiceInstances, ServiceKey};

pub static DEFAULT_ROUTER_RECOVER: &str = "recoverRouter";

pub static DEFAULT_ROUTER_METADATA: &str = "metadataRouter";

pub static DEFAULT_ROUTER_NEARBY: &str = "nearbyBasedRouter";

pub static DEFAULT_ROUTER_SET: &str = "setRouter";

pub static DEFAULT_ROUTER_CANARY: &str = "canaryRouter";

pub static DEFAULT_ROUTER_TRAFFIC_MIRROR: &str = "trafficMirrorRouter";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MetadataFailoverType {
    // 不降级, 返回未找到实例错误
    #[default]
    MetadataFailoverNone,
    // 返回全部实例
    MetadataFailoverAll,
    // 返回不包含请求 metadata key 的实例
    MetadataFailoverNoKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteState {
    Next,
    Retry,
}

#[derive(Debug)]
pub struct RouteResult {
    pub state: RouteState,
    pub instances: ServiceInstances,
}

impl RouteResult {
    pub fn next(instances: ServiceInstances) -> Self {
        Self {
            state: RouteState::Next,
            instances,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RouteInfo {
    // 主调服务数据信息
    pub caller: ServiceKey,
    // 被调服务数据信息
    pub callee: ServiceKey,
    // 主调服务的元数据, set 路由从这里读取主调所在的 set
    pub caller_metadata: HashMap<String, String>,
    // 本次请求对被调服务声明的元数据, 例如显式指定的目标 set
    pub callee_metadata: HashMap<String, String>,
    // 用于元数据路由, 实例 metadata 需要包含全部键值
    pub metadata: HashMap<String, String>,
    pub metadata_failover: MetadataFailoverType,
    // 请求流量标签, 用于匹配流量镜像规则
    pub traffic_labels: HashMap<String, String>,
    pub include_unhealthy: bool,
    pub include_circuit_broken: bool,
    pub canary: String,
    // 前面的路由插件可以在这里禁用后续的路由插件
    pub disabled_routers: HashSet<String>,
}

impl RouteInfo {
    pub fn new(caller: ServiceKey, callee: ServiceKey) -> Self {
        Self {
            caller,
            callee,
            ..Default::default()
        }
    }

    pub fn disable_router(&mut self, name: &str) {
        self.disabled_routers.insert(name.to_string());
    }

    pub fn is_router_disabled(&self, name: &str) -> bool {
        self.disabled_routers.contains(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStringType {
    #[default]
    Exact,
    NotEquals,
    Regex,
    In,
    NotIn,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchString {
    #[serde(default, rename = "type")]
    pub match_type: MatchStringType,
    pub value: String,
}

impl MatchString {
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchStringType::Exact,
            value: value.into(),
        }
    }
}

/// MirrorSource 流量镜像规则的来源匹配条件
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSource {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub labels: HashMap<String, MatchString>,
}

/// TrafficMirrorRule 流量镜像规则
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficMirrorRule {
    pub name: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub sources: Vec<MirrorSource>,
    // 镜像目标实例需要满足的 metadata 条件
    #[serde(default)]
    pub destination_metadata: HashMap<String, MatchString>,
    // 镜像比例, 取值 [0, 100]
    pub percent: f64,
}

fn default_enable() -> bool {
    true
}
