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

pub static LOADBALANCE_WEIGHTED_RANDOM: &str = "weightedRandom";

pub static LOADBALANCE_WEIGHTED_ROUND_ROBIN: &str = "weightedRoundRobin";

pub static LOADBALANCE_RING_HASH: &str = "ringHash";

pub static LOADBALANCE_SHORTEST_RESPONSE_TIME: &str = "shortestResponseTime";

/// Criteria 负载均衡的选择条件
#[derive(Clone, Debug, Default)]
pub struct Criteria {
    // 指定负载均衡策略, 为空时使用配置中的默认策略
    pub policy: String,
    // 一致性哈希使用的 key
    pub hash_key: String,
    // 外部传入的实例动态权重, key 为实例 ID
    pub dynamic_weights: Option<HashMap<String, u32>>,
}

impl Criteria {
    pub fn with_policy(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            ..Default::default()
        }
    }

    pub fn with_hash_key(mut self, hash_key: impl Into<String>) -> Self {
        self.hash_key = hash_key.into();
        self
    }
}
