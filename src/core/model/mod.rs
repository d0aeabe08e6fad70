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

pub mod cache;
pub mod circuitbreaker;
pub mod error;
pub mod loadbalance;
pub mod naming;
pub mod router;
pub mod stat;

use std::collections::HashMap;

use naming::Location;

pub static RUST_CLIENT_VERSION: &str = "v0.1.3";
pub static RUST_CLIENT_TYPE: &str = "polaris-rust";

/// ClientContext 描述当前 SDK 实例所在的进程
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub client_id: String,
    pub pid: u32,
    pub pod: String,
    pub host: String,
    pub version: String,
    pub location: Location,
    pub labels: HashMap<String, String>,
}

impl ClientContext {
    pub fn new(client_id: String, location: Location) -> ClientContext {
        let mut labels = HashMap::<String, String>::new();
        labels.insert("CLIENT_ID".to_string(), client_id.clone());
        labels.insert(
            "CLIENT_VERSION".to_string(),
            RUST_CLIENT_VERSION.to_string(),
        );
        labels.insert("CLIENT_LANGUAGE".to_string(), RUST_CLIENT_TYPE.to_string());

        Self {
            client_id,
            pid: std::process::id(),
            pod: get_pod_name(),
            host: std::env::var("HOSTNAME").unwrap_or_default(),
            version: RUST_CLIENT_VERSION.to_string(),
            location,
            labels,
        }
    }
}

pub fn get_pod_name() -> String {
    // 各种容器平台的获取容器名字的环境变量.
    let container_name_envs = ["CONTAINER_NAME", "SUMERU_POD_NAME", "POD_NAME", "MY_POD_NAME"];

    for k in container_name_envs {
        if let Ok(pod_name) = std::env::var(k) {
            return pod_name;
        }
    }
    String::new()
}
