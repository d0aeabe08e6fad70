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
    collections::{hash_map::DefaultHasher, BTreeMap},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        loadbalance::{Criteria, LOADBALANCE_RING_HASH},
        naming::{Instance, ServiceInstances},
    },
    plugin::{
        loadbalance::LoadBalancer,
        plugins::{Extensions, Plugin},
    },
};

const DEFAULT_VNODE_COUNT: u64 = 10;

// 超过 60s 未被使用的哈希环会在下一次构建新环时被清理
const RING_EXPIRE: Duration = Duration::from_secs(60);

/// RingHashLoadBalancer 一致性哈希负载均衡
pub struct RingHashLoadBalancer {
    vnode_count: usize,
    origin: Instant,
    ring_expire: Duration,
    // 需要把 ring hash 进行一次缓存，避免重复构建 ring hash
    ring_hash_cache: DashMap<String, Arc<RingHash>>,
}

impl RingHashLoadBalancer {
    pub fn builder() -> (fn(&PluginConfig, &Extensions) -> Box<dyn LoadBalancer>, String) {
        (new_instance, LOADBALANCE_RING_HASH.to_string())
    }

    pub fn new(vnode_count: usize) -> Self {
        Self {
            vnode_count: vnode_count.max(1),
            origin: Instant::now(),
            ring_expire: RING_EXPIRE,
            ring_hash_cache: DashMap::new(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn get_ring(&self, instances: &ServiceInstances) -> Arc<RingHash> {
        let cache_key = instances.get_cache_key();
        let signature = signature(instances);
        let now_ms = self.now_ms();
        if let Some(ring) = self.ring_hash_cache.get(&cache_key) {
            if ring.signature == signature {
                ring.last_access_ms.store(now_ms, Ordering::Relaxed);
                return ring.clone();
            }
        }
        let expire_ms = self.ring_expire.as_millis() as u64;
        self.ring_hash_cache.retain(|_, ring| {
            now_ms.saturating_sub(ring.last_access_ms.load(Ordering::Relaxed)) < expire_ms
        });
        let ring = Arc::new(RingHash::build(
            self.vnode_count,
            signature,
            instances,
            now_ms,
        ));
        self.ring_hash_cache.insert(cache_key, ring.clone());
        ring
    }

    /// ring_count 当前缓存的哈希环数量
    pub fn ring_count(&self) -> usize {
        self.ring_hash_cache.len()
    }
}

fn new_instance(conf: &PluginConfig, _extensions: &Extensions) -> Box<dyn LoadBalancer> {
    // vnodeCount: 每个实例在哈希环上的虚拟节点数
    let vnode_count = match conf.options.get("vnodeCount") {
        Some(serde_yaml::Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_VNODE_COUNT),
        _ => DEFAULT_VNODE_COUNT,
    };
    Box::new(RingHashLoadBalancer::new(vnode_count as usize))
}

impl Plugin for RingHashLoadBalancer {
    fn name(&self) -> String {
        LOADBALANCE_RING_HASH.to_string()
    }

    fn init(&mut self) {}

    fn destroy(&self) {
        self.ring_hash_cache.clear();
    }
}

impl LoadBalancer for RingHashLoadBalancer {
    fn choose_instance(
        &self,
        criteria: &Criteria,
        instances: &ServiceInstances,
    ) -> Result<Arc<Instance>, PolarisError> {
        if instances.is_empty() {
            return Err(PolarisError::new(
                ErrorCode::InstanceNotFound,
                format!(
                    "[{}] no instance to choose for {}",
                    LOADBALANCE_RING_HASH,
                    instances.get_cache_key()
                ),
            ));
        }
        let key_hash = if criteria.hash_key.is_empty() {
            rand::random::<u64>()
        } else {
            hash(&criteria.hash_key)
        };
        let ring = self.get_ring(instances);
        ring.get_node(key_hash).ok_or_else(|| {
            PolarisError::new(
                ErrorCode::InternalError,
                format!("[{}] hash ring is empty", LOADBALANCE_RING_HASH),
            )
        })
    }
}

fn hash<T: Hash + ?Sized>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

/// signature 路由结果不同的实例列表需要各自的哈希环
fn signature(instances: &ServiceInstances) -> u64 {
    let mut s = DefaultHasher::new();
    instances.get_revision().hash(&mut s);
    for ins in instances.instances.iter() {
        ins.id.hash(&mut s);
    }
    s.finish()
}

struct RingHash {
    nodes: BTreeMap<u64, Arc<Instance>>,
    signature: u64,
    last_access_ms: AtomicU64,
}

impl RingHash {
    fn build(vnode_count: usize, signature: u64, instances: &ServiceInstances, now_ms: u64) -> Self {
        let mut nodes = BTreeMap::new();
        for ins in instances.instances.iter() {
            for i in 0..vnode_count {
                nodes.insert(hash(&(ins.id.as_str(), i)), ins.clone());
            }
        }
        Self {
            nodes,
            signature,
            last_access_ms: AtomicU64::new(now_ms),
        }
    }

    // 顺时针找到第一个不小于 hash 的节点, 越过环尾则回到环首
    fn get_node(&self, hash: u64) -> Option<Arc<Instance>> {
        self.nodes
            .range(hash..)
            .next()
            .or_else(|| self.nodes.iter().next())
            .map(|(_, ins)| ins.clone())
    }
}
