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
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::core::model::cache::ResourceEventKey;

// 刷新周期的随机抖动上限, 避免大量任务在同一时刻访问控制面
const MAX_REFRESH_JITTER_MS: u64 = 1000;

/// TaskState 更新任务的状态机
///
/// Pending: 尚未拉取成功, 等待首次执行或重试
/// Active: 正在拉取
/// Periodic: 至少成功过一次, 由巡检按刷新周期重新提交
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Active = 1,
    Periodic = 2,
}

impl TaskState {
    fn from_u8(v: u8) -> TaskState {
        match v {
            1 => TaskState::Active,
            2 => TaskState::Periodic,
            _ => TaskState::Pending,
        }
    }
}

/// UpdateTask 单个 (服务, 资源类型) 的同步任务
///
/// 首次拉取成功后任务从 Pending 进入 Periodic, 之后由巡检协程按刷新周期重新提交。
/// 进入 Active 只能通过 compare-and-swap, 保证同一个 key 同一时刻最多只有一个拉取在执行。
pub struct UpdateTask {
    key: ResourceEventKey,
    state: AtomicU8,
    created_at: Instant,
    // 最近一次成功拉取的开始时间, 相对 created_at 的纳秒数
    last_update_ns: AtomicU64,
    refresh_interval: Duration,
    success_count: AtomicU64,
    destroyed: AtomicBool,
    // 写入缓存与销毁互斥
    commit_lock: Mutex<()>,
}

impl UpdateTask {
    pub fn new(key: ResourceEventKey, base_interval: Duration) -> Self {
        let jitter = rand::thread_rng().gen_range(0..MAX_REFRESH_JITTER_MS);
        Self::with_interval(key, base_interval + Duration::from_millis(jitter))
    }

    pub fn with_interval(key: ResourceEventKey, refresh_interval: Duration) -> Self {
        Self {
            key,
            state: AtomicU8::new(TaskState::Pending as u8),
            created_at: Instant::now(),
            last_update_ns: AtomicU64::new(0),
            refresh_interval,
            success_count: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &ResourceEventKey {
        &self.key
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// try_start 从空闲状态切换到 Active, 返回切换前的状态; 返回 None 说明已有拉取在执行
    pub fn try_start(&self) -> Option<TaskState> {
        for from in [TaskState::Pending, TaskState::Periodic] {
            if self
                .state
                .compare_exchange(
                    from as u8,
                    TaskState::Active as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Some(from);
            }
        }
        None
    }

    /// complete 结束一次拉取; 首次成功时返回 true, 调用方需要把任务加入巡检集合
    pub fn complete(&self, from: TaskState, success: bool) -> bool {
        let to = if success { TaskState::Periodic } else { from };
        self.state.store(to as u8, Ordering::Release);
        success && from == TaskState::Pending
    }

    /// mark_updated 记录一次成功拉取, 刷新周期从这次拉取开始的时刻算起
    pub fn mark_updated(&self, fetch_start: Instant) {
        let elapsed = fetch_start.saturating_duration_since(self.created_at).as_nanos() as u64;
        self.last_update_ns.store(elapsed, Ordering::Release);
        self.success_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn last_update(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.last_update_ns.load(Ordering::Acquire))
    }

    /// next_refresh 下一次刷新的时刻, 只有空闲的长期任务才有
    pub fn next_refresh(&self) -> Option<Instant> {
        if self.is_destroyed() || self.state() != TaskState::Periodic {
            return None;
        }
        Some(self.last_update() + self.refresh_interval)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Acquire)
    }

    pub fn needs_refresh(&self, now: Instant) -> bool {
        if self.is_destroyed() {
            return false;
        }
        if self.state() != TaskState::Periodic {
            return false;
        }
        now.saturating_duration_since(self.last_update()) >= self.refresh_interval
    }

    /// commit 任务未被销毁时执行写入; write 返回 None 表示放弃本次写入
    pub fn commit<T>(&self, write: impl FnOnce() -> Option<T>) -> Option<T> {
        let _guard = self.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_destroyed() {
            return None;
        }
        write()
    }

    pub fn destroy(&self) {
        let _guard = self.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.destroyed.store(true, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl Display for UpdateTask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "UpdateTask{{key: {}, state: {:?}, interval: {:?}}}",
            self.key,
            self.state(),
            self.refresh_interval
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::cache::EventType;
    use crate::core::model::naming::ServiceKey;

    fn key() -> ResourceEventKey {
        ResourceEventKey::new(ServiceKey::new("default", "svc"), EventType::Instance)
    }

    #[test]
    fn test_refresh_interval_jitter() {
        for _ in 0..100 {
            let task = UpdateTask::new(key(), Duration::from_secs(2));
            assert!(task.refresh_interval() >= Duration::from_secs(2));
            assert!(task.refresh_interval() < Duration::from_secs(3));
        }
    }

    #[test]
    fn test_state_gate() {
        let task = UpdateTask::new(key(), Duration::from_secs(2));
        assert_eq!(task.try_start(), Some(TaskState::Pending));
        assert_eq!(task.try_start(), None);
        // 首次失败回到 Pending
        assert!(!task.complete(TaskState::Pending, false));
        assert_eq!(task.state(), TaskState::Pending);

        let from = task.try_start().unwrap();
        assert!(task.complete(from, true));
        assert_eq!(task.state(), TaskState::Periodic);

        // 之后的成功与失败都停留在 Periodic, 不会再次晋升
        let from = task.try_start().unwrap();
        assert_eq!(from, TaskState::Periodic);
        assert!(!task.complete(from, true));
        let from = task.try_start().unwrap();
        assert!(!task.complete(from, false));
        assert_eq!(task.state(), TaskState::Periodic);
    }

    #[tokio::test(start_paused = true)]
    async fn test_needs_refresh() {
        let task = UpdateTask::with_interval(key(), Duration::from_millis(500));
        // Pending 状态的任务不参与巡检
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!task.needs_refresh(Instant::now()));

        let from = task.try_start().unwrap();
        let fetch_start = Instant::now();
        // 拉取本身的耗时不会推迟下一次刷新
        tokio::time::advance(Duration::from_millis(120)).await;
        task.mark_updated(fetch_start);
        task.complete(from, true);
        assert_eq!(task.last_update(), fetch_start);
        assert_eq!(task.next_refresh(), Some(fetch_start + Duration::from_millis(500)));
        assert!(!task.needs_refresh(Instant::now()));
        tokio::time::advance(Duration::from_millis(380)).await;
        assert!(task.needs_refresh(Instant::now()));

        let from = task.try_start().unwrap();
        assert!(!task.needs_refresh(Instant::now()));
        assert_eq!(task.next_refresh(), None);
        task.complete(from, true);
        task.destroy();
        assert!(!task.needs_refresh(Instant::now()));
    }

    #[test]
    fn test_commit_after_destroy() {
        let task = UpdateTask::new(key(), Duration::from_secs(2));
        assert_eq!(task.commit(|| Some(1)), Some(1));
        assert_eq!(task.commit(|| None::<i32>), None);
        task.destroy();
        let mut written = false;
        assert_eq!(
            task.commit(|| {
                written = true;
                Some(2)
            }),
            None
        );
        assert!(!written);
    }
}
