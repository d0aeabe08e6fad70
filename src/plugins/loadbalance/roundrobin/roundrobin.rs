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

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        loadbalance::{Criteria, LOADBALANCE_WEIGHTED_ROUND_ROBIN},
        naming::{Instance, ServiceInstances},
    },
    plugin::{
        loadbalance::LoadBalancer,
        plugins::{Extensions, Plugin},
    },
};

// 超过 60s 未被选择过的实例状态会被清理
const ROBIN_EXPIRE: Duration = Duration::from_secs(60);

/// WeightedRoundRobinLoadBalancer 平滑加权轮询
pub struct WeightedRoundRobinLoadBalancer {
    round_robin_cache: DashMap<String, WeightedRoundRobins>,
}

impl WeightedRoundRobinLoadBalancer {
    pub fn builder() -> (fn(&PluginConfig, &Extensions) -> Box<dyn LoadBalancer>, String) {
        (new_instance, LOADBALANCE_WEIGHTED_ROUND_ROBIN.to_string())
    }

    pub fn new() -> Self {
        Self {
            round_robin_cache: DashMap::new(),
        }
    }
}

impl Default for WeightedRoundRobinLoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

fn new_instance(_conf: &PluginConfig, _extensions: &Extensions) -> Box<dyn LoadBalancer> {
    Box::new(WeightedRoundRobinLoadBalancer::new())
}

impl Plugin for WeightedRoundRobinLoadBalancer {
    fn name(&self) -> String {
        LOADBALANCE_WEIGHTED_ROUND_ROBIN.to_string()
    }

    fn init(&mut self) {}

    fn destroy(&self) {
        self.round_robin_cache.clear();
    }
}

impl LoadBalancer for WeightedRoundRobinLoadBalancer {
    fn choose_instance(
        &self,
        _criteria: &Criteria,
        instances: &ServiceInstances,
    ) -> Result<Arc<Instance>, PolarisError> {
        if instances.is_empty() {
            return Err(PolarisError::new(
                ErrorCode::InstanceNotFound,
                format!(
                    "[{}] no instance to choose for {}",
                    LOADBALANCE_WEIGHTED_ROUND_ROBIN,
                    instances.get_cache_key()
                ),
            ));
        }
        // 权重全为 0 时退化为普通轮询
        let all_zero = instances.get_total_weight() == 0;

        let now = Instant::now();
        let mut robins = self
            .round_robin_cache
            .entry(instances.get_cache_key())
            .or_default();
        if robins.revision != instances.get_revision() {
            robins.revision = instances.get_revision().to_string();
            robins.robins.retain(|_, robin| now.duration_since(robin.last_fetch) < ROBIN_EXPIRE);
        }

        let mut total: i64 = 0;
        let mut selected: Option<(&Arc<Instance>, i64)> = None;
        for ins in instances.instances.iter() {
            let weight = if all_zero { 1 } else { ins.weight as i64 };
            let robin = robins
                .robins
                .entry(ins.id.clone())
                .or_insert_with(|| WeightedRoundRobin::new(weight, now));
            if robin.weight != weight {
                robin.reset(weight);
            }
            if now.duration_since(robin.last_fetch) >= ROBIN_EXPIRE {
                robin.current = 0;
            }
            robin.current += weight;
            robin.last_fetch = now;
            total += weight;
            match selected {
                Some((_, cur)) if cur >= robin.current => {}
                _ => selected = Some((ins, robin.current)),
            }
        }

        match selected {
            Some((ins, _)) => {
                if let Some(robin) = robins.robins.get_mut(&ins.id) {
                    robin.current -= total;
                }
                Ok(ins.clone())
            }
            None => Ok(instances.instances[0].clone()),
        }
    }
}

#[derive(Default)]
struct WeightedRoundRobins {
    revision: String,
    robins: HashMap<String, WeightedRoundRobin>,
}

struct WeightedRoundRobin {
    weight: i64,
    current: i64,
    last_fetch: Instant,
}

impl WeightedRoundRobin {
    fn new(weight: i64, now: Instant) -> Self {
        Self {
            weight,
            current: 0,
            last_fetch: now,
        }
    }

    fn reset(&mut self, weight: i64) {
        self.weight = weight;
        self.current = 0;
    }
}
