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
    config::global::PluginConfig,
    model::{
        error::{ErrorCode, PolarisError},
        naming::{Instance, Location, ServiceInstances},
        router::{RouteResult, DEFAULT_ROUTER_NEARBY},
    },
    plugin::{
        plugins::Plugin,
        router::{RouteContext, ServiceRouter},
    },
};

static KEY_METADATA_NEARBY: &str = "internal-enable-nearby";
static DEFAULT_NEARBY_MATCH_LEVEL: &str = "zone";
static DEFAULT_NEARBY_MAX_MATCH_LEVEL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchLevel {
    Campus = 1,
    Zone = 2,
    Region = 3,
    All = 4,
}

impl MatchLevel {
    fn parse(v: &str) -> Option<MatchLevel> {
        match v {
            "campus" => Some(MatchLevel::Campus),
            "zone" => Some(MatchLevel::Zone),
            "region" => Some(MatchLevel::Region),
            "all" => Some(MatchLevel::All),
            _ => None,
        }
    }

    fn wider(&self) -> Option<MatchLevel> {
        match self {
            MatchLevel::Campus => Some(MatchLevel::Zone),
            MatchLevel::Zone => Some(MatchLevel::Region),
            MatchLevel::Region => Some(MatchLevel::All),
            MatchLevel::All => None,
        }
    }
}

fn parse_level(conf: &PluginConfig, key: &str, default: &str) -> MatchLevel {
    let v = conf.get_string(key, default);
    MatchLevel::parse(&v).unwrap_or_else(|| {
        tracing::warn!(
            "[polaris][router][nearby] invalid {} {}, use {}",
            key,
            v,
            default
        );
        MatchLevel::parse(default).unwrap_or(MatchLevel::All)
    })
}

pub fn new_service_router(conf: &PluginConfig) -> Box<dyn ServiceRouter> {
    // #描述: 就近路由的最小匹配级别。region(大区)、zone(区域)、campus(园区)
    // matchLevel: zone
    // #描述: 最大匹配级别
    // maxMatchLevel: all
    // #描述: 强制就近
    // strictNearby: false
    let mut match_level = parse_level(conf, "matchLevel", DEFAULT_NEARBY_MATCH_LEVEL);
    let max_match_level = parse_level(conf, "maxMatchLevel", DEFAULT_NEARBY_MAX_MATCH_LEVEL);
    if match_level > max_match_level {
        match_level = max_match_level;
    }
    Box::new(NearbyRouter {
        strict_nearby: conf.get_bool("strictNearby", false),
        match_level,
        max_match_level,
    })
}

/// NearbyRouter 就近路由, 从 matchLevel 开始逐级放宽直到 maxMatchLevel
pub struct NearbyRouter {
    pub strict_nearby: bool,
    pub match_level: MatchLevel,
    pub max_match_level: MatchLevel,
}

impl NearbyRouter {
    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn ServiceRouter>, String) {
        (new_service_router, DEFAULT_ROUTER_NEARBY.to_string())
    }

    fn select_instances(
        &self,
        local_loc: &Location,
        match_level: MatchLevel,
        instances: &ServiceInstances,
    ) -> Vec<Arc<Instance>> {
        instances
            .instances
            .iter()
            .filter(|ins| match match_level {
                MatchLevel::Campus => {
                    local_loc.campus.is_empty() || ins.location.campus == local_loc.campus
                }
                MatchLevel::Zone => local_loc.zone.is_empty() || ins.location.zone == local_loc.zone,
                MatchLevel::Region => {
                    local_loc.region.is_empty() || ins.location.region == local_loc.region
                }
                MatchLevel::All => true,
            })
            .cloned()
            .collect()
    }
}

impl Plugin for NearbyRouter {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        DEFAULT_ROUTER_NEARBY.to_string()
    }
}

#[async_trait::async_trait]
impl ServiceRouter for NearbyRouter {
    /// choose_instances 实例路由
    async fn choose_instances(
        &self,
        route_ctx: &mut RouteContext,
        instances: &ServiceInstances,
    ) -> Result<RouteResult, PolarisError> {
        let location = route_ctx
            .extensions
            .as_ref()
            .map(|ext| ext.get_local_location().clone())
            .unwrap_or_default();
        if location.is_empty() {
            if self.strict_nearby {
                return Err(PolarisError::new(
                    ErrorCode::LocationNotFound,
                    format!("[{}] local location is empty", DEFAULT_ROUTER_NEARBY),
                ));
            }
            tracing::debug!("[polaris][router][nearby] local location is empty, skip");
            return Ok(RouteResult::next(instances.clone()));
        }

        let mut level = Some(self.match_level);
        while let Some(cur) = level {
            if cur > self.max_match_level {
                break;
            }
            let ret = self.select_instances(&location, cur, instances);
            if !ret.is_empty() {
                return Ok(RouteResult::next(instances.with_instances(ret)));
            }
            level = cur.wider();
        }

        if self.strict_nearby {
            return Err(PolarisError::new(
                ErrorCode::LocationMismatch,
                format!(
                    "[{}] can not find any instance near {:?} up to level {:?}",
                    DEFAULT_ROUTER_NEARBY, location, self.max_match_level
                ),
            ));
        }
        Ok(RouteResult::next(instances.clone()))
    }

    /// enable 是否启用
    async fn enable(&self, _route_ctx: &RouteContext, instances: &ServiceInstances) -> bool {
        instances
            .service
            .metadata
            .get(KEY_METADATA_NEARBY)
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::config::Configuration;
    use crate::core::plugin::plugins::Extensions;
    use crate::test_support::{instance, service_instances, setup_log};

    fn located(id: &str, region: &str, zone: &str, campus: &str) -> Arc<Instance> {
        Arc::new(Instance {
            location: Location {
                region: region.to_string(),
                zone: zone.to_string(),
                campus: campus.to_string(),
            },
            ..(*instance(id, 100)).clone()
        })
    }

    fn ctx_at(region: &str, zone: &str, campus: &str) -> RouteContext {
        let mut conf = Configuration::default();
        conf.global.location.region = region.to_string();
        conf.global.location.zone = zone.to_string();
        conf.global.location.campus = campus.to_string();
        let extensions = Extensions::build(
            "test".to_string(),
            Arc::new(conf),
            tokio::runtime::Handle::current(),
            None,
        )
        .unwrap();
        RouteContext::new(Default::default(), Some(Arc::new(extensions)))
    }

    fn router(strict: bool, max_level: MatchLevel) -> NearbyRouter {
        NearbyRouter {
            strict_nearby: strict,
            match_level: MatchLevel::Zone,
            max_match_level: max_level,
        }
    }

    fn ids(ret: &RouteResult) -> Vec<&str> {
        ret.instances.instances.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_zone_first_then_region() {
        setup_log();
        let instances = service_instances(
            &[(KEY_METADATA_NEARBY, "true")],
            vec![
                located("a", "south", "sz", "c1"),
                located("b", "south", "gz", "c2"),
                located("c", "north", "bj", "c3"),
            ],
        );
        let r = router(false, MatchLevel::All);

        let mut ctx = ctx_at("south", "sz", "");
        assert!(r.enable(&ctx, &instances).await);
        let ret = r.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["a"]);

        let mut ctx = ctx_at("south", "sh", "");
        let ret = r.choose_instances(&mut ctx, &instances).await.unwrap();
        assert_eq!(ids(&ret), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_strict_nearby_mismatch() {
        setup_log();
        let instances = service_instances(
            &[(KEY_METADATA_NEARBY, "true")],
            vec![located("a", "north", "bj", "c3")],
        );
        let mut ctx = ctx_at("south", "sz", "");

        let ret = router(true, MatchLevel::Region)
            .choose_instances(&mut ctx, &instances)
            .await;
        assert_eq!(ret.err().unwrap().code(), ErrorCode::LocationMismatch);

        let ret = router(false, MatchLevel::Region)
            .choose_instances(&mut ctx, &instances)
            .await
            .unwrap();
        assert_eq!(ids(&ret), vec!["a"]);
    }

    #[tokio::test]
    async fn test_disabled_without_service_flag() {
        let instances = service_instances(&[], vec![located("a", "south", "sz", "c1")]);
        let ctx = RouteContext::default();
        assert!(!router(false, MatchLevel::All).enable(&ctx, &instances).await);
    }

    #[test]
    fn test_options() {
        let conf = PluginConfig::new(DEFAULT_ROUTER_NEARBY)
            .with_option("matchLevel", serde_yaml::Value::String("region".to_string()))
            .with_option("maxMatchLevel", serde_yaml::Value::String("zone".to_string()));
        let r = new_service_router(&conf);
        assert_eq!(r.name(), DEFAULT_ROUTER_NEARBY);
    }
}
