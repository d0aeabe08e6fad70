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

use crate::core::{
    model::{
        error::PolarisError,
        naming::{Instance, ServiceInstances},
        router::{RouteInfo, RouteResult},
    },
    plugin::plugins::Plugin,
};

use super::plugins::Extensions;

/// RouterContainer 按配置顺序排列好的路由插件
#[derive(Clone, Default)]
pub struct RouterContainer {
    pub before_routers: Vec<Arc<dyn ServiceRouter>>,
    pub core_routers: Vec<Arc<dyn ServiceRouter>>,
    pub after_routers: Vec<Arc<dyn ServiceRouter>>,
}

impl RouterContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// routers 依次返回 before, core, after 三段路由
    pub fn routers(&self) -> impl Iterator<Item = &Arc<dyn ServiceRouter>> {
        self.before_routers
            .iter()
            .chain(self.core_routers.iter())
            .chain(self.after_routers.iter())
    }
}

/// RouteContext 单次请求的路由上下文
#[derive(Clone, Default)]
pub struct RouteContext {
    pub route_info: RouteInfo,
    pub extensions: Option<Arc<Extensions>>,
    // 流量镜像路由选出的镜像目标
    pub mirror_instance: Option<Arc<Instance>>,
}

impl RouteContext {
    pub fn new(route_info: RouteInfo, extensions: Option<Arc<Extensions>>) -> Self {
        Self {
            route_info,
            extensions,
            mirror_instance: None,
        }
    }
}

#[async_trait::async_trait]
pub trait ServiceRouter: Plugin {
    /// choose_instances 实例路由, 不能修改传入的实例列表
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError>;

    /// enable 是否启用
    async fn enable(&self, route_ctx: &RouteContext, instances: &ServiceInstances) -> bool;
}
