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

use crate::core::context::SDKContext;
use crate::core::model::error::PolarisError;
use crate::discovery::default::DefaultConsumerAPI;
use crate::discovery::req::*;

/// new_consumer_api 读取默认配置创建 SDKContext
pub fn new_consumer_api() -> Result<impl ConsumerAPI, PolarisError> {
    let context = SDKContext::default()?;
    Ok(DefaultConsumerAPI::new(Arc::new(context)))
}

pub fn new_consumer_api_by_context(
    context: Arc<SDKContext>,
) -> Result<impl ConsumerAPI, PolarisError> {
    Ok(DefaultConsumerAPI::new(context))
}

/// ConsumerAPI 负责服务消费方完成获取被调服务的 IP 地址完成远程调用
#[async_trait::async_trait]
pub trait ConsumerAPI
where
    Self: Send + Sync,
{
    /// get_one_instance 拉取一个实例
    async fn get_one_instance(
        &self,
        req: GetOneInstanceRequest,
    ) -> Result<InstanceResponse, PolarisError>;

    /// get_health_instance 拉取健康实例
    async fn get_health_instance(
        &self,
        req: GetHealthInstanceRequest,
    ) -> Result<InstancesResponse, PolarisError>;

    /// get_all_instance 拉取所有实例
    async fn get_all_instance(
        &self,
        req: GetAllInstanceRequest,
    ) -> Result<InstancesResponse, PolarisError>;

    /// watch_instance 监听实例变化
    async fn watch_instance(
        &self,
        req: WatchInstanceRequest,
    ) -> Result<WatchInstanceResponse, PolarisError>;

    /// unwatch_instance 取消该服务上的全部实例监听, 返回取消的监听数量
    async fn unwatch_instance(&self, req: UnWatchInstanceRequest) -> Result<usize, PolarisError>;

    /// get_service_rule 获取服务规则
    async fn get_service_rule(
        &self,
        req: GetServiceRuleRequest,
    ) -> Result<ServiceRuleResponse, PolarisError>;

    /// report_service_call 上报服务调用结果
    async fn report_service_call(&self, req: ServiceCallResult);
}
