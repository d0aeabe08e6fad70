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

use crate::core::model::cache::{ResourceEventKey, ResourceValue};
use crate::core::model::error::PolarisError;
use crate::core::plugin::plugins::Plugin;

#[derive(Debug, Clone)]
pub enum FetchResult {
    Changed(ResourceValue),
    NotChanged,
}

/// Connector 与控制面交互的适配层, 具体的传输协议由插件实现
#[async_trait::async_trait]
pub trait Connector: Plugin {
    /// fetch 拉取资源, last_revision 与服务端一致时返回 NotChanged
    async fn fetch(
        &self,
        key: &ResourceEventKey,
        last_revision: &str,
    ) -> Result<FetchResult, PolarisError>;
}
