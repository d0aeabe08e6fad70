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

use crate::core::model::cache::{EventType, ResourceEventKey, ResourceValue, ServerEvent};
use crate::core::model::error::PolarisError;
use crate::core::model::naming::{ServiceInstances, ServiceRule};
use crate::core::plugin::plugins::Plugin;

#[derive(Clone, Default, Debug)]
pub struct Filter {
    pub resource_key: ResourceEventKey,
    // 首次加载时等待远端数据的最长时间
    pub timeout: Duration,
}

impl Filter {
    pub fn new(resource_key: ResourceEventKey, timeout: Duration) -> Self {
        Self {
            resource_key,
            timeout,
        }
    }

    pub fn get_event_type(&self) -> EventType {
        self.resource_key.event_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Update,
    Delete,
}

pub trait ResourceListener: Send + Sync {
    // 处理事件
    fn on_event(&self, action: Action, val: ServerEvent);
    // 获取监听的key
    fn watch_key(&self) -> ResourceEventKey;
}

/// 资源缓存
#[async_trait::async_trait]
pub trait ResourceCache: Plugin {
    /// get 读取当前快照, 不会触发远端拉取
    fn get(&self, key: &ResourceEventKey) -> Option<ResourceValue>;
    /// put 整体替换快照, 并唤醒等待首次数据的调用方
    fn put(&self, key: ResourceEventKey, value: ResourceValue);
    /// subscribe 增加引用计数, 确保同步引擎中存在对应的更新任务
    fn subscribe(&self, key: ResourceEventKey);
    /// unsubscribe 减少引用计数, 计数归零后移除更新任务
    fn unsubscribe(&self, key: &ResourceEventKey);
    // 加载服务实例
    async fn load_service_instances(
        &self,
        filter: Filter,
    ) -> Result<Arc<ServiceInstances>, PolarisError>;
    // 加载服务规则
    async fn load_service_rule(&self, filter: Filter) -> Result<Arc<ServiceRule>, PolarisError>;
    // 注册资源监听器
    fn register_resource_listener(&self, listener: Arc<dyn ResourceListener>);
    // 移除 key 上的全部监听器, 返回移除的数量
    fn remove_resource_listeners(&self, key: &ResourceEventKey) -> usize;
}
