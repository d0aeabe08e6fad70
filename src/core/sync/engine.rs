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

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::config::global::LocalCacheConfig;
use crate::core::model::cache::ResourceEventKey;
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::model::stat::StatInfo;
use crate::core::plugin::connector::{Connector, FetchResult};
use crate::core::plugin::stat::StatReporterChain;
use crate::core::sync::store::ResourceStore;
use crate::core::sync::task::UpdateTask;

// 巡检两次唤醒之间的最小间隔, 到期任务提交后还未开始执行时避免空转
const MIN_SWEEP_GAP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
    pub sweep_interval: Duration,
    pub message_timeout: Duration,
}

impl SyncOptions {
    pub fn new(cache_opt: &LocalCacheConfig, message_timeout: Duration) -> Self {
        Self {
            refresh_interval: cache_opt.service_refresh_interval,
            retry_interval: cache_opt.service_retry_interval,
            sweep_interval: cache_opt.get_sweep_interval(),
            message_timeout,
        }
    }
}

/// SyncEngine 驱动所有更新任务: 首次拉取, 失败重试, 以及长期任务的周期刷新
pub struct SyncEngine {
    runtime: Handle,
    store: Arc<ResourceStore>,
    connector: Arc<dyn Connector>,
    options: SyncOptions,
    tasks: DashMap<ResourceEventKey, Arc<UpdateTask>>,
    long_running: DashMap<ResourceEventKey, Arc<UpdateTask>>,
    token: CancellationToken,
    sweep_started: AtomicBool,
    stat_reporter: Arc<StatReporterChain>,
}

impl SyncEngine {
    pub fn new(
        runtime: Handle,
        store: Arc<ResourceStore>,
        connector: Arc<dyn Connector>,
        options: SyncOptions,
        stat_reporter: Arc<StatReporterChain>,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            store,
            connector,
            options,
            tasks: DashMap::new(),
            long_running: DashMap::new(),
            token: CancellationToken::new(),
            sweep_started: AtomicBool::new(false),
            stat_reporter,
        })
    }

    /// start 启动唯一的巡检协程
    ///
    /// 巡检在最早到期的长期任务的刷新时刻醒来, 最长间隔为 sweep_interval,
    /// 所以每个任务的两次刷新间隔就是它自己的刷新周期。
    pub fn start(self: &Arc<Self>) {
        if self
            .sweep_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let weak: Weak<SyncEngine> = Arc::downgrade(self);
        let token = self.token.clone();
        let period = self.options.sweep_interval;
        self.runtime.spawn(async move {
            loop {
                let deadline = match weak.upgrade() {
                    Some(engine) => engine.next_sweep_deadline(period),
                    None => break,
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                match weak.upgrade() {
                    Some(engine) => engine.sweep_once(),
                    None => break,
                }
            }
            tracing::info!("[polaris][sync] sweep loop exit");
        });
    }

    /// ensure_task 确保 key 存在更新任务, 新建的任务会立即提交执行
    ///
    /// 任务被 remove 后马上重新订阅时, 旧任务的拉取可能仍在进行, 同一个 key 短暂存在两个拉取。
    /// 旧任务已经销毁, 它的结果在 commit 时被丢弃, 只有新任务会写入缓存。
    pub fn ensure_task(self: &Arc<Self>, key: &ResourceEventKey) -> Arc<UpdateTask> {
        let mut created = false;
        let task = self
            .tasks
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(UpdateTask::new(key.clone(), self.options.refresh_interval))
            })
            .clone();
        if created {
            tracing::info!("[polaris][sync] create update task {}", task);
            self.submit(task.clone(), Duration::ZERO);
        }
        task
    }

    pub fn get_task(&self, key: &ResourceEventKey) -> Option<Arc<UpdateTask>> {
        self.tasks.get(key).map(|task| task.clone())
    }

    pub fn add_long_running(&self, task: Arc<UpdateTask>) {
        tracing::debug!("[polaris][sync] add long running task {}", task);
        self.long_running.insert(task.key().clone(), task);
    }

    pub fn long_running_count(&self) -> usize {
        self.long_running.len()
    }

    /// retry 按固定的重试间隔重新提交任务
    pub fn retry(self: &Arc<Self>, task: Arc<UpdateTask>) {
        self.submit(task, self.options.retry_interval);
    }

    /// remove 引用计数归零后移除任务, 正在执行的拉取不会再写入缓存
    pub fn remove(&self, key: &ResourceEventKey) {
        if let Some((_, task)) = self.tasks.remove(key) {
            task.destroy();
            self.long_running
                .remove_if(key, |_, running| Arc::ptr_eq(running, &task));
            tracing::info!("[polaris][sync] remove update task {}", key);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn destroy(&self) {
        self.token.cancel();
        for task in self.tasks.iter() {
            task.destroy();
        }
        self.tasks.clear();
        self.long_running.clear();
        tracing::info!("[polaris][sync] sync engine destroyed");
    }

    fn next_sweep_deadline(&self, period: Duration) -> Instant {
        let now = Instant::now();
        let earliest = self
            .long_running
            .iter()
            .filter_map(|task| task.next_refresh())
            .fold(now + period, |acc, at| acc.min(at));
        earliest.max(now + MIN_SWEEP_GAP)
    }

    fn sweep_once(self: &Arc<Self>) {
        let now = Instant::now();
        let due: Vec<Arc<UpdateTask>> = self
            .long_running
            .iter()
            .filter(|task| task.needs_refresh(now))
            .map(|task| task.clone())
            .collect();
        for task in due {
            self.submit(task, Duration::ZERO);
        }
    }

    fn submit(self: &Arc<Self>, task: Arc<UpdateTask>, delay: Duration) {
        if self.token.is_cancelled() || task.is_destroyed() {
            return;
        }
        let engine = self.clone();
        let token = self.token.clone();
        self.runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            engine.execute(task).await;
        });
    }

    async fn execute(self: Arc<Self>, task: Arc<UpdateTask>) {
        if self.token.is_cancelled() || task.is_destroyed() {
            return;
        }
        let from = match task.try_start() {
            Some(from) => from,
            None => {
                tracing::debug!("[polaris][sync] task {} is running, skip", task.key());
                return;
            }
        };

        let key = task.key().clone();
        let last_revision = self
            .store
            .get(&key)
            .map(|v| v.revision().to_string())
            .unwrap_or_default();
        let start = Instant::now();
        let fetch = AssertUnwindSafe(self.connector.fetch(&key, &last_revision)).catch_unwind();

        let ret = tokio::select! {
            _ = self.token.cancelled() => {
                task.complete(from, false);
                return;
            }
            ret = tokio::time::timeout(self.options.message_timeout, fetch) => ret,
        };
        let latency = start.elapsed();

        let outcome = match ret {
            Err(_) => Err(PolarisError::new(
                ErrorCode::RpcTimeout,
                format!("fetch {} timeout after {:?}", key, self.options.message_timeout),
            )),
            Ok(Err(_)) => Err(PolarisError::new(
                ErrorCode::InternalError,
                format!("connector panicked while fetching {}", key),
            )),
            Ok(Ok(ret)) => ret,
        };

        if self.token.is_cancelled() || task.is_destroyed() {
            task.complete(from, false);
            return;
        }

        match outcome {
            Ok(result) => {
                // 写缓存与转为长期任务在 commit 内完成, 与 remove 互斥
                let committed = task.commit(|| {
                    if self.token.is_cancelled() {
                        return None;
                    }
                    let action = match &result {
                        FetchResult::Changed(value) => Some(self.store.replace(&key, value.clone())),
                        FetchResult::NotChanged => None,
                    };
                    task.mark_updated(start);
                    if task.complete(from, true) {
                        self.add_long_running(task.clone());
                    }
                    Some(action)
                });
                let action = match committed {
                    Some(action) => action,
                    None => {
                        task.complete(from, false);
                        return;
                    }
                };
                let changed = action.is_some();
                if let (Some(action), FetchResult::Changed(value)) = (action, result) {
                    self.store.notify_listeners(action, key.clone(), value);
                }
                self.report_fetch(key, true, changed, latency);
            }
            Err(err) => {
                tracing::warn!(
                    "[polaris][sync] fetch {} fail, retry after {:?}: {}",
                    key,
                    self.options.retry_interval,
                    err
                );
                task.complete(from, false);
                self.report_fetch(key, false, false, latency);
                self.retry(task);
            }
        }
    }

    fn report_fetch(&self, key: ResourceEventKey, success: bool, changed: bool, latency: Duration) {
        if self.stat_reporter.is_empty() {
            return;
        }
        self.stat_reporter.report(StatInfo::Fetch {
            key,
            success,
            changed,
            latency,
        });
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::model::cache::EventType;
    use crate::core::model::naming::ServiceKey;
    use crate::core::sync::task::TaskState;
    use crate::test_support::{instances_value, setup_log, ScriptedConnector};

    fn key() -> ResourceEventKey {
        ResourceEventKey::new(ServiceKey::new("default", "svc"), EventType::Instance)
    }

    fn options() -> SyncOptions {
        SyncOptions {
            refresh_interval: Duration::from_secs(2),
            retry_interval: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(100),
            message_timeout: Duration::from_secs(1),
        }
    }

    fn new_engine(connector: Arc<ScriptedConnector>) -> (Arc<SyncEngine>, Arc<ResourceStore>) {
        let store = Arc::new(ResourceStore::new());
        let engine = SyncEngine::new(
            Handle::current(),
            store.clone(),
            connector,
            options(),
            Arc::new(StatReporterChain::default()),
        );
        engine.start();
        (engine, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_promotes_task() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new());
        connector.set_value(key(), instances_value("default", "svc", "r1", 2));
        let (engine, store) = new_engine(connector.clone());

        let task = engine.ensure_task(&key());
        let value = store.wait_first(&key(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(value.revision(), "r1");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(task.state(), TaskState::Periodic);
        assert_eq!(task.success_count(), 1);
        assert_eq!(engine.long_running_count(), 1);

        // 重复 ensure 不会创建新的任务
        let again = engine.ensure_task(&key());
        assert!(Arc::ptr_eq(&task, &again));
        engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_per_key() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new().with_delay(Duration::from_millis(800)));
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let (engine, _store) = new_engine(connector.clone());

        let task = engine.ensure_task(&key());
        // 首次拉取进行中, 再提交多次都会被状态门拦住
        tokio::time::sleep(Duration::from_millis(10)).await;
        for _ in 0..5 {
            engine.submit(task.clone(), Duration::ZERO);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.max_in_flight(), 1);
        engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_fixed_delay() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new());
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        connector.fail_next(1);
        let (engine, store) = new_engine(connector.clone());

        engine.ensure_task(&key());
        let value = store.wait_first(&key(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(value.revision(), "r1");

        let times = connector.call_times();
        assert_eq!(times.len(), 2);
        let gap = times[1] - times[0];
        assert!(gap >= Duration::from_millis(500), "retry gap {:?}", gap);
        assert!(gap < Duration::from_millis(600), "retry gap {:?}", gap);
        engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_converted_to_retry() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new());
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        connector.panic_next();
        let (engine, store) = new_engine(connector.clone());

        engine.ensure_task(&key());
        let value = store.wait_first(&key(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(value.revision(), "r1");
        assert_eq!(connector.calls(), 2);
        engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_cadence_with_jitter() {
        setup_log();
        // 默认配置下巡检间隔为 1s, 拉取本身耗时 50ms
        let connector = Arc::new(ScriptedConnector::new().with_delay(Duration::from_millis(50)));
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let store = Arc::new(ResourceStore::new());
        let conf = LocalCacheConfig::default();
        let engine = SyncEngine::new(
            Handle::current(),
            store.clone(),
            connector.clone(),
            SyncOptions::new(&conf, Duration::from_secs(1)),
            Arc::new(StatReporterChain::default()),
        );
        engine.start();

        let task = engine.ensure_task(&key());
        tokio::time::sleep(Duration::from_secs(30)).await;
        engine.destroy();

        let interval = task.refresh_interval();
        assert!(interval >= conf.service_refresh_interval);
        assert!(interval < conf.service_refresh_interval + Duration::from_secs(1));
        let times = connector.call_times();
        assert!(times.len() >= 10, "calls {}", times.len());
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= interval, "gap {:?} interval {:?}", gap, interval);
            assert!(
                gap <= interval + MIN_SWEEP_GAP,
                "gap {:?} interval {:?}",
                gap,
                interval
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_changed_keeps_snapshot() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new());
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let (engine, store) = new_engine(connector.clone());

        engine.ensure_task(&key());
        let first = store.wait_first(&key(), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        let current = store.get(&key()).unwrap();
        // 版本未变化时不会写入新的快照
        match (first, current) {
            (
                crate::core::model::cache::ResourceValue::Instances(a),
                crate::core::model::cache::ResourceValue::Instances(b),
            ) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("unexpected resource value"),
        }
        assert!(connector.calls() >= 3);
        engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_writes() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new().with_delay(Duration::from_millis(300)));
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let (engine, store) = new_engine(connector.clone());

        engine.ensure_task(&key());
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.destroy();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.get(&key()).is_none());
        assert_eq!(connector.calls(), 1);
        assert!(engine.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_task_does_not_write() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new().with_delay(Duration::from_millis(300)));
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let (engine, store) = new_engine(connector.clone());

        let task = engine.ensure_task(&key());
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.remove(&key());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(task.is_destroyed());
        assert!(store.get(&key()).is_none());
        assert!(engine.get_task(&key()).is_none());
        assert_eq!(connector.in_flight.load(Ordering::Acquire), 0);
        engine.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_while_old_fetch_in_flight() {
        setup_log();
        let connector = Arc::new(ScriptedConnector::new().with_delay(Duration::from_millis(300)));
        connector.set_value(key(), instances_value("default", "svc", "r1", 1));
        let (engine, store) = new_engine(connector.clone());

        let old = engine.ensure_task(&key());
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.remove(&key());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let new = engine.ensure_task(&key());
        assert!(!Arc::ptr_eq(&old, &new));

        // 旧任务的拉取在 300ms 结束, 结果被丢弃
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get(&key()).is_none());
        assert_eq!(old.success_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get(&key()).unwrap().revision(), "r1");
        assert_eq!(new.success_count(), 1);
        assert_eq!(new.state(), TaskState::Periodic);
        assert_eq!(connector.max_in_flight(), 2);
        assert_eq!(engine.long_running_count(), 1);
        assert!(engine.get_task(&key()).is_some_and(|t| Arc::ptr_eq(&t, &new)));
        engine.destroy();
    }
}
