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
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{runtime::Handle, time::Instant};

use crate::core::{
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        loadbalance::{Criteria, LOADBALANCE_SHORTEST_RESPONSE_TIME},
        naming::{Instance, ServiceInstances},
        stat::ServiceCallResult,
    },
    plugin::{
        loadbalance::LoadBalancer,
        plugins::{Extensions, Plugin},
    },
};

use super::super::random::random::select_by_weight;

const BASE_WEIGHT: u64 = 100_000;

const DEFAULT_SLIDE_PERIOD: Duration = Duration::from_secs(30);

/// InstanceStat 单个实例的调用统计, 基线在每个滑动窗口开始时记录
#[derive(Default)]
struct InstanceStat {
    succeeded_count: AtomicU64,
    succeeded_elapsed: AtomicU64,
    base_count: AtomicU64,
    base_elapsed: AtomicU64,
    // 最近一次上报距 origin 的毫秒数
    last_touched_ms: AtomicU64,
}

impl InstanceStat {
    fn record(&self, elapsed_ms: u64, now_ms: u64) {
        self.succeeded_elapsed.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.succeeded_count.fetch_add(1, Ordering::Relaxed);
        self.last_touched_ms.store(now_ms, Ordering::Relaxed);
    }

    /// avg_latency 当前窗口内的平均耗时(ms), 没有数据时为 0
    fn avg_latency(&self) -> u64 {
        let count = self
            .succeeded_count
            .load(Ordering::Relaxed)
            .saturating_sub(self.base_count.load(Ordering::Relaxed));
        if count == 0 {
            return 0;
        }
        let elapsed = self
            .succeeded_elapsed
            .load(Ordering::Relaxed)
            .saturating_sub(self.base_elapsed.load(Ordering::Relaxed));
        elapsed / count
    }

    fn reset_baseline(&self) {
        self.base_count
            .store(self.succeeded_count.load(Ordering::Relaxed), Ordering::Relaxed);
        self.base_elapsed.store(
            self.succeeded_elapsed.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
    }
}

fn latency_to_weight(latency: u64) -> u64 {
    if latency == 0 {
        BASE_WEIGHT * 100
    } else {
        BASE_WEIGHT / latency
    }
}

struct SlideWindow {
    origin: Instant,
    period: Duration,
    // 当前窗口开始时间, 距 origin 的毫秒数
    window_start_ms: AtomicU64,
    resetting: AtomicBool,
}

impl SlideWindow {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn period_ms(&self) -> u64 {
        self.period.as_millis() as u64
    }
}

/// ShortestResponseTimeLoadBalancer 按最近窗口平均响应时间的倒数做加权随机
pub struct ShortestResponseTimeLoadBalancer {
    runtime: Handle,
    stats: Arc<DashMap<String, Arc<InstanceStat>>>,
    window: Arc<SlideWindow>,
}

impl ShortestResponseTimeLoadBalancer {
    pub fn builder() -> (fn(&PluginConfig, &Extensions) -> Box<dyn LoadBalancer>, String) {
        (new_instance, LOADBALANCE_SHORTEST_RESPONSE_TIME.to_string())
    }

    pub fn new(runtime: Handle, slide_period: Duration) -> Self {
        Self {
            runtime,
            stats: Arc::new(DashMap::new()),
            window: Arc::new(SlideWindow {
                origin: Instant::now(),
                period: slide_period,
                window_start_ms: AtomicU64::new(0),
                resetting: AtomicBool::new(false),
            }),
        }
    }

    fn get_stat(&self, instance_id: &str) -> Arc<InstanceStat> {
        if let Some(stat) = self.stats.get(instance_id) {
            return stat.clone();
        }
        self.stats
            .entry(instance_id.to_string())
            .or_default()
            .clone()
    }

    /// weight_of 实例当前窗口的权重, 没有统计的实例按冷实例处理
    pub fn weight_of(&self, instance_id: &str) -> u64 {
        let latency = self
            .stats
            .get(instance_id)
            .map(|stat| stat.avg_latency())
            .unwrap_or(0);
        latency_to_weight(latency)
    }

    /// stat_count 当前保留统计的实例数
    pub fn stat_count(&self) -> usize {
        self.stats.len()
    }

    /// 窗口到期后由抢到标记的调用方提交一次异步重置, 其余调用方直接返回
    ///
    /// 重置时顺带清理超过一个窗口没有上报的实例统计
    fn try_slide_window(&self) {
        let start = self.window.window_start_ms.load(Ordering::Acquire);
        if self.window.now_ms().saturating_sub(start) < self.window.period_ms() {
            return;
        }
        if self
            .window
            .resetting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let stats = self.stats.clone();
        let window = self.window.clone();
        self.runtime.spawn(async move {
            let now_ms = window.now_ms();
            let idle_ms = window.period_ms();
            stats.retain(|_, stat| {
                now_ms.saturating_sub(stat.last_touched_ms.load(Ordering::Relaxed)) <= idle_ms
            });
            for stat in stats.iter() {
                stat.reset_baseline();
            }
            window.window_start_ms.store(now_ms, Ordering::Release);
            window.resetting.store(false, Ordering::Release);
            tracing::debug!(
                "[polaris][loadbalancer][srt] slide window reset, {} instances kept",
                stats.len()
            );
        });
    }
}

fn new_instance(conf: &PluginConfig, extensions: &Extensions) -> Box<dyn LoadBalancer> {
    // slidePeriod: 滑动窗口长度
    let slide_period = conf.get_duration("slidePeriod", DEFAULT_SLIDE_PERIOD);
    Box::new(ShortestResponseTimeLoadBalancer::new(
        extensions.runtime.clone(),
        slide_period,
    ))
}

impl Plugin for ShortestResponseTimeLoadBalancer {
    fn name(&self) -> String {
        LOADBALANCE_SHORTEST_RESPONSE_TIME.to_string()
    }

    fn init(&mut self) {}

    fn destroy(&self) {
        self.stats.clear();
    }
}

impl LoadBalancer for ShortestResponseTimeLoadBalancer {
    fn choose_instance(
        &self,
        _criteria: &Criteria,
        instances: &ServiceInstances,
    ) -> Result<Arc<Instance>, PolarisError> {
        self.try_slide_window();
        let weights: Vec<u64> = instances
            .instances
            .iter()
            .map(|ins| self.weight_of(&ins.id))
            .collect();
        select_by_weight(&instances.instances, &weights).ok_or_else(|| {
            PolarisError::new(
                ErrorCode::InstanceNotFound,
                format!(
                    "[{}] no instance to choose for {}",
                    LOADBALANCE_SHORTEST_RESPONSE_TIME,
                    instances.get_cache_key()
                ),
            )
        })
    }

    fn report_call_result(&self, result: &ServiceCallResult) {
        if !result.ret_status.is_success() {
            return;
        }
        self.get_stat(&result.instance.id)
            .record(result.delay.as_millis() as u64, self.window.now_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::circuitbreaker::RetStatus;
    use crate::test_support::{instance, service_instances};

    fn report(lb: &ShortestResponseTimeLoadBalancer, ins: &Arc<Instance>, times: usize, delay_ms: u64) {
        for _ in 0..times {
            lb.report_call_result(&ServiceCallResult::new(
                ins.clone(),
                RetStatus::RetSuccess,
                Duration::from_millis(delay_ms),
            ));
        }
    }

    #[tokio::test]
    async fn test_inverse_latency_weight() {
        let lb = ShortestResponseTimeLoadBalancer::new(Handle::current(), DEFAULT_SLIDE_PERIOD);
        let a = instance("a", 100);
        let b = instance("b", 100);
        report(&lb, &a, 50, 10);
        report(&lb, &b, 50, 100);
        assert_eq!(lb.weight_of("a"), 10_000);
        assert_eq!(lb.weight_of("b"), 1_000);
        assert_eq!(lb.weight_of("a"), lb.weight_of("b") * 10);

        let instances = service_instances(&[], vec![a, b]);
        let mut hit_a = 0;
        for _ in 0..10_000 {
            if lb.choose_instance(&Criteria::default(), &instances).unwrap().id == "a" {
                hit_a += 1;
            }
        }
        assert!(hit_a > 8_000, "a selected {} times", hit_a);
    }

    #[tokio::test]
    async fn test_cold_instance_gets_max_weight() {
        let lb = ShortestResponseTimeLoadBalancer::new(Handle::current(), DEFAULT_SLIDE_PERIOD);
        let warm = instance("warm", 100);
        report(&lb, &warm, 10, 20);
        // 失败的调用不计入统计
        lb.report_call_result(&ServiceCallResult::new(
            warm.clone(),
            RetStatus::RetFail,
            Duration::from_millis(5000),
        ));
        assert_eq!(lb.weight_of("warm"), BASE_WEIGHT / 20);
        assert_eq!(lb.weight_of("cold"), BASE_WEIGHT * 100);

        let instances = service_instances(&[], vec![warm, instance("cold", 100)]);
        let cold_hits = (0..200)
            .filter(|_| lb.choose_instance(&Criteria::default(), &instances).unwrap().id == "cold")
            .count();
        assert!(cold_hits > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reset() {
        let lb = ShortestResponseTimeLoadBalancer::new(Handle::current(), Duration::from_secs(30));
        let a = instance("a", 100);
        report(&lb, &a, 10, 50);
        let instances = service_instances(&[], vec![a.clone()]);
        lb.choose_instance(&Criteria::default(), &instances).unwrap();
        assert_eq!(lb.weight_of("a"), BASE_WEIGHT / 50);

        tokio::time::advance(Duration::from_secs(31)).await;
        lb.choose_instance(&Criteria::default(), &instances).unwrap();
        // 重置在后台任务中完成
        tokio::task::yield_now().await;
        assert_eq!(lb.weight_of("a"), BASE_WEIGHT * 100);

        report(&lb, &a, 2, 10);
        assert_eq!(lb.weight_of("a"), BASE_WEIGHT / 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stats_pruned_on_window_reset() {
        let lb = ShortestResponseTimeLoadBalancer::new(Handle::current(), Duration::from_secs(30));
        let active = instance("active", 100);
        let gone = instance("gone", 100);
        report(&lb, &active, 5, 20);
        report(&lb, &gone, 5, 20);
        // 只查询权重不会产生统计
        assert_eq!(lb.weight_of("never"), BASE_WEIGHT * 100);
        assert_eq!(lb.stat_count(), 2);

        tokio::time::advance(Duration::from_secs(20)).await;
        report(&lb, &active, 1, 20);
        tokio::time::advance(Duration::from_secs(11)).await;
        let instances = service_instances(&[], vec![active.clone()]);
        lb.choose_instance(&Criteria::default(), &instances).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(lb.stat_count(), 1);
        assert!(lb.stats.contains_key("active"));
        assert_eq!(lb.weight_of("gone"), BASE_WEIGHT * 100);
    }

    #[tokio::test]
    async fn test_empty_instances() {
        let lb = ShortestResponseTimeLoadBalancer::new(Handle::current(), DEFAULT_SLIDE_PERIOD);
        let ret = lb.choose_instance(&Criteria::default(), &service_instances(&[], vec![]));
        assert_eq!(ret.err().unwrap().code(), ErrorCode::InstanceNotFound);
    }
}
