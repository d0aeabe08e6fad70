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

use super::cache::ResourceEventKey;
use super::circuitbreaker::RetStatus;
use super::naming::{Instance, ServiceKey};

/// ServiceCallResult 业务调用结果, 用于更新负载均衡的响应时间统计
#[derive(Debug, Clone)]
pub struct ServiceCallResult {
    pub caller: ServiceKey,
    pub callee: ServiceKey,
    pub instance: Arc<Instance>,
    pub ret_status: RetStatus,
    pub ret_code: i32,
    pub delay: Duration,
}

impl ServiceCallResult {
    pub fn new(instance: Arc<Instance>, ret_status: RetStatus, delay: Duration) -> Self {
        Self {
            caller: ServiceKey::default(),
            callee: instance.get_service_key(),
            instance,
            ret_status,
            ret_code: 0,
            delay,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StatInfo {
    // 一次实例选择的结果
    Selection {
        callee: ServiceKey,
        policy: String,
        instance_id: String,
    },
    // 一次远端拉取的结果
    Fetch {
        key: ResourceEventKey,
        success: bool,
        changed: bool,
        latency: Duration,
    },
    // 业务上报的调用结果
    Call(ServiceCallResult),
}
