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
use crate::router::api::RouterAPI;
use crate::router::req::{
    ProcessLoadBalanceRequest, ProcessLoadBalanceResponse, ProcessRouteRequest,
    ProcessRouteResponse,
};

pub struct DefaultRouterAPI {
    context: Arc<SDKContext>,
}

impl DefaultRouterAPI {
    pub fn new(context: Arc<SDKContext>) -> Self {
        Self { context }
    }
}

#[async_trait::async_trait]
impl RouterAPI for DefaultRouterAPI {
    async fn router(&self, req: ProcessRouteRequest) -> Result<ProcessRouteResponse, PolarisError> {
        let engine = self.context.get_engine();
        let mut route_info = req.route_info;
        if route_info.callee.is_empty() {
            route_info.callee = req.service_instances.service.get_service_key();
        }
        let mut route_ctx = engine.new_route_context(route_info);
        let service_instances = engine.route(&mut route_ctx, req.service_instances).await?;
        Ok(ProcessRouteResponse {
            service_instances,
            mirror_instance: route_ctx.mirror_instance,
        })
    }

    async fn load_balance(
        &self,
        req: ProcessLoadBalanceRequest,
    ) -> Result<ProcessLoadBalanceResponse, PolarisError> {
        let instance = self
            .context
            .get_engine()
            .load_balance(&req.criteria, &req.service_instances)?;
        Ok(ProcessLoadBalanceResponse { instance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::config::Configuration;
    use crate::core::model::error::ErrorCode;
    use crate::core::model::loadbalance::{Criteria, LOADBALANCE_RING_HASH};
    use crate::core::model::router::RouteInfo;
    use crate::test_support::{instance, instance_with_metadata, labels, service_instances};

    fn api() -> DefaultRouterAPI {
        let ctx = SDKContext::create_by_configuration(Configuration::default()).unwrap();
        DefaultRouterAPI::new(Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_router_only() {
        let api = api();
        let mut route_info = RouteInfo::default();
        route_info.metadata = labels(&[("env", "prod")]);
        let rsp = api
            .router(ProcessRouteRequest {
                service_instances: service_instances(
                    &[],
                    vec![
                        instance_with_metadata("a", &[("env", "prod")]),
                        instance_with_metadata("b", &[("env", "test")]),
                    ],
                ),
                route_info,
            })
            .await
            .unwrap();
        assert_eq!(rsp.service_instances.len(), 1);
        assert_eq!(rsp.service_instances.instances[0].id, "a");
        assert!(rsp.mirror_instance.is_none());
    }

    #[tokio::test]
    async fn test_load_balance_only() {
        let api = api();
        let rsp = api
            .load_balance(ProcessLoadBalanceRequest {
                service_instances: service_instances(&[], vec![instance("a", 100)]),
                criteria: Criteria::with_policy(LOADBALANCE_RING_HASH).with_hash_key("k"),
            })
            .await
            .unwrap();
        assert_eq!(rsp.instance.id, "a");

        let ret = api
            .load_balance(ProcessLoadBalanceRequest {
                service_instances: service_instances(&[], vec![instance("a", 100)]),
                criteria: Criteria::with_policy("leastConnection"),
            })
            .await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::PluginError);
    }
}
