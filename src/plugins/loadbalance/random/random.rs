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

use rand::Rng;

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        loadbalance::{Criteria, LOADBALANCE_WEIGHTED_RANDOM},
        naming::{Instance, ServiceInstances},
    },
    plugin::{
        loadbalance::LoadBalancer,
        plugins::{Extensions, Plugin},
    },
};

/// WeightedRandomLoadBalancer 权重随机负载均衡
pub struct WeightedRandomLoadBalancer {}

impl WeightedRandomLoadBalancer {
    pub fn builder() -> (fn(&PluginConfig, &Extensions) -> Box<dyn LoadBalancer>, String) {
        (new_instance, LOADBALANCE_WEIGHTED_RANDOM.to_string())
    }
}

fn new_instance(_conf: &PluginConfig, _extensions: &Extensions) -> Box<dyn LoadBalancer> {
    Box::new(WeightedRandomLoadBalancer {})
}

impl Plugin for WeightedRandomLoadBalancer {
    fn name(&self) -> String {
        LOADBALANCE_WEIGHTED_RANDOM.to_string()
    }

    fn init(&mut self) {}

    fn destroy(&self) {}
}

/// instance_weight 优先使用外部传入的动态权重
fn instance_weight(criteria: &Criteria, ins: &Instance) -> u64 {
    match &criteria.dynamic_weights {
        Some(weights) => weights.get(&ins.id).copied().unwrap_or(ins.weight) as u64,
        None => ins.weight as u64,
    }
}

/// select_by_weight 在 [0, total) 中随机取值, 按累计权重落点选择实例
pub(crate) fn select_by_weight(
    instances: &[Arc<Instance>],
    weights: &[u64],
) -> Option<Arc<Instance>> {
    if instances.is_empty() {
        return None;
    }
    let total_weight: u64 = weights.iter().sum();
    let mut rng = rand::thread_rng();
    if total_weight == 0 {
        return Some(instances[rng.gen_range(0..instances.len())].clone());
    }
    let rand_weight = rng.gen_range(0..total_weight);
    let mut right: u64 = 0;
    for (ins, weight) in instances.iter().zip(weights.iter()) {
        right += *weight;
        if rand_weight < right {
            return Some(ins.clone());
        }
    }
    instances.last().cloned()
}

impl LoadBalancer for WeightedRandomLoadBalancer {
    fn choose_instance(
        &self,
        criteria: &Criteria,
        instances: &ServiceInstances,
    ) -> Result<Arc<Instance>, PolarisError> {
        let weights: Vec<u64> = instances
            .instances
            .iter()
            .map(|ins| instance_weight(criteria, ins))
            .collect();
        select_by_weight(&instances.instances, &weights).ok_or_else(|| {
            PolarisError::new(
                ErrorCode::InstanceNotFound,
                format!(
                    "[{}] no instance to choose for {}",
                    LOADBALANCE_WEIGHTED_RANDOM,
                    instances.get_cache_key()
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::test_support::{instance, service_instances};

    #[test]
    fn test_weighted_choice() {
        let lb = WeightedRandomLoadBalancer {};
        let instances = service_instances(&[], vec![instance("a", 0), instance("b", 100)]);
        for _ in 0..100 {
            let ins = lb.choose_instance(&Criteria::default(), &instances).unwrap();
            assert_eq!(ins.id, "b");
        }
    }

    #[test]
    fn test_dynamic_weights_override() {
        let lb = WeightedRandomLoadBalancer {};
        let instances = service_instances(&[], vec![instance("a", 100), instance("b", 100)]);
        let mut weights = HashMap::new();
        weights.insert("a".to_string(), 0);
        let criteria = Criteria {
            dynamic_weights: Some(weights),
            ..Default::default()
        };
        for _ in 0..100 {
            assert_eq!(lb.choose_instance(&criteria, &instances).unwrap().id, "b");
        }
    }

    #[test]
    fn test_zero_total_weight_and_empty() {
        let lb = WeightedRandomLoadBalancer {};
        let instances = service_instances(&[], vec![instance("a", 0), instance("b", 0)]);
        assert!(lb.choose_instance(&Criteria::default(), &instances).is_ok());

        let empty = service_instances(&[], vec![]);
        let ret = lb.choose_instance(&Criteria::default(), &empty);
        assert_eq!(ret.err().unwrap().code(), ErrorCode::InstanceNotFound);
    }
}
