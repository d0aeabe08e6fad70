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

use dashmap::DashMap;
use tokio::sync::watch;

use crate::core::model::cache::{ResourceEventKey, ResourceValue, ServerEvent};
use crate::core::model::error::{ErrorCode, PolarisError};
use crate::core::plugin::cache::{Action, ResourceListener};

struct StoreEntry {
    value_tx: watch::Sender<Option<ResourceValue>>,
    refs: usize,
}

impl StoreEntry {
    fn new() -> Self {
        let (value_tx, _rx) = watch::channel(None);
        Self { value_tx, refs: 0 }
    }
}

/// ResourceStore 以 (服务, 资源类型) 为 key 的快照存储
///
/// 每个 key 的值只会被整体替换, 读到的永远是某一次完整写入的结果。
/// 等待首次数据的调用方通过 watch channel 被唤醒。
#[derive(Default)]
pub struct ResourceStore {
    entries: DashMap<ResourceEventKey, StoreEntry>,
    listeners: DashMap<ResourceEventKey, Vec<Arc<dyn ResourceListener>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResourceEventKey) -> Option<ResourceValue> {
        self.entries
            .get(key)
            .and_then(|entry| entry.value_tx.borrow().clone())
    }

    /// put 整体替换, 按到达顺序后写覆盖先写
    pub fn put(&self, key: ResourceEventKey, value: ResourceValue) {
        let action = self.replace(&key, value.clone());
        self.notify_listeners(action, key, value);
    }

    /// replace 只替换快照并唤醒等待者, 不通知监听器
    pub fn replace(&self, key: &ResourceEventKey, value: ResourceValue) -> Action {
        let old = {
            let entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(StoreEntry::new);
            entry.value_tx.send_replace(Some(value.clone()))
        };
        let action = if old.is_some() {
            Action::Update
        } else {
            Action::Add
        };
        tracing::debug!(
            "[polaris][cache] put resource {} revision {} action {:?}",
            key,
            value.revision(),
            action
        );
        action
    }

    pub fn notify_listeners(&self, action: Action, key: ResourceEventKey, value: ResourceValue) {
        let listeners = match self.listeners.get(&key) {
            Some(listeners) => listeners.clone(),
            None => return,
        };
        for listener in listeners.iter() {
            listener.on_event(
                action,
                ServerEvent {
                    event_key: key.clone(),
                    value: value.clone(),
                },
            );
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn ResourceListener>) {
        self.listeners
            .entry(listener.watch_key())
            .or_default()
            .push(listener);
    }

    /// remove_listeners 移除 key 上的全部监听器, 返回移除的数量
    pub fn remove_listeners(&self, key: &ResourceEventKey) -> usize {
        self.listeners
            .remove(key)
            .map(|(_, listeners)| listeners.len())
            .unwrap_or(0)
    }

    /// acquire 增加引用计数, 返回增加后的值
    pub fn acquire(&self, key: &ResourceEventKey) -> usize {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(StoreEntry::new);
        entry.refs += 1;
        entry.refs
    }

    /// release 减少引用计数, 返回减少后的值
    pub fn release(&self, key: &ResourceEventKey) -> usize {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs
            }
            None => 0,
        }
    }

    pub fn ref_count(&self, key: &ResourceEventKey) -> usize {
        self.entries.get(key).map(|entry| entry.refs).unwrap_or(0)
    }

    fn receiver(&self, key: &ResourceEventKey) -> watch::Receiver<Option<ResourceValue>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(StoreEntry::new)
            .value_tx
            .subscribe()
    }

    /// wait_first 等待 key 的第一份数据, 超时返回 ApiTimeout
    pub async fn wait_first(
        &self,
        key: &ResourceEventKey,
        timeout: Duration,
    ) -> Result<ResourceValue, PolarisError> {
        let mut rx = self.receiver(key);
        let waited = tokio::time::timeout(timeout, rx.wait_for(|v| v.is_some())).await;
        match waited {
            Ok(Ok(value)) => value.clone().ok_or_else(|| {
                PolarisError::new(
                    ErrorCode::InternalError,
                    format!("resource {} is empty after notify", key),
                )
            }),
            Ok(Err(_)) => Err(PolarisError::new(
                ErrorCode::InvalidState,
                format!("resource {} store closed", key),
            )),
            Err(_) => Err(PolarisError::new(
                ErrorCode::ApiTimeout,
                format!("wait resource {} timeout after {:?}", key, timeout),
            )),
        }
    }
}
