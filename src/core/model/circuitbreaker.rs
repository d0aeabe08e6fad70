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

use std::fmt::{self, Display};

use super::naming::ServiceKey;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Status {
    #[default]
    Close,
    HalfOpen,
    Open,
    Destroy,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// CircuitBreakerStatus 资源熔断状态
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerStatus {
    // 标识被哪个熔断器熔断
    pub circuit_breaker: String,
    pub status: Status,
    // 开始被熔断的时间
    pub start_ms: u64,
}

impl CircuitBreakerStatus {
    pub fn close() -> Self {
        Self::default()
    }

    /// is_available 半开状态的实例允许放量探测
    pub fn is_available(&self) -> bool {
        matches!(self.status, Status::Close | Status::HalfOpen)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum RetStatus {
    #[default]
    RetUnknown,
    RetSuccess,
    RetFail,
    RetTimeout,
    RetReject,
}

impl RetStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RetStatus::RetSuccess)
    }
}

/// InstanceResource 实例维度的熔断资源
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceResource {
    pub callee: ServiceKey,
    pub instance_id: String,
    pub host: String,
    pub port: u32,
}
