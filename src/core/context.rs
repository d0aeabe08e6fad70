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

use std::path::Path;
use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;

use crate::core::config::config::{load, load_default, Configuration};
use crate::core::engine::Engine;
use crate::core::logger::logger::init_logger;
use crate::core::model::error::PolarisError;
use crate::core::plugin::circuitbreaker::CircuitBreaker;
use crate::core::plugin::connector::Connector;

/// SDKContext 一个 SDK 实例, 各类 API 通过它共享同一套缓存与插件
pub struct SDKContext {
    conf: Arc<Configuration>,
    engine: Arc<Engine>,
    _log_guard: Option<WorkerGuard>,
}

impl SDKContext {
    /// default 读取当前目录下的 polaris.yaml 创建 SDKContext
    pub fn default() -> Result<SDKContext, PolarisError> {
        Self::create_by_configuration(load_default()?)
    }

    /// create_by_file 读取指定的配置文件创建 SDKContext
    pub fn create_by_file<P: AsRef<Path>>(path: P) -> Result<SDKContext, PolarisError> {
        Self::create_by_configuration(load(path)?)
    }

    // create_by_configuration
    pub fn create_by_configuration(cfg: Configuration) -> Result<SDKContext, PolarisError> {
        SDKContextBuilder::new(cfg).build()
    }

    pub fn builder(cfg: Configuration) -> SDKContextBuilder {
        SDKContextBuilder::new(cfg)
    }

    pub fn get_engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    pub fn get_configuration(&self) -> Arc<Configuration> {
        self.conf.clone()
    }
}

/// SDKContextBuilder 可以注入自定义的 Connector 与熔断插件
pub struct SDKContextBuilder {
    conf: Configuration,
    connector: Option<Arc<dyn Connector>>,
    circuit_breaker: Option<Arc<dyn CircuitBreaker>>,
    enable_logger: bool,
}

impl SDKContextBuilder {
    pub fn new(conf: Configuration) -> Self {
        Self {
            conf,
            connector: None,
            circuit_breaker: None,
            enable_logger: false,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<dyn CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    /// with_logger 按 global.logger 配置把 SDK 日志写入滚动文件
    pub fn with_logger(mut self) -> Self {
        self.enable_logger = true;
        self
    }

    pub fn build(self) -> Result<SDKContext, PolarisError> {
        let log_guard = if self.enable_logger {
            match init_logger(&self.conf.global.logger) {
                Ok(guard) => Some(guard),
                Err(err) => {
                    tracing::warn!("[polaris][context] init logger fail, skip: {}", err);
                    None
                }
            }
        } else {
            None
        };

        let start_time = std::time::Instant::now();
        let conf = Arc::new(self.conf);
        let engine = Engine::new(conf.clone(), self.connector, self.circuit_breaker)?;
        tracing::info!(
            "[polaris][context] create sdk context cost: {:?}",
            start_time.elapsed()
        );
        Ok(SDKContext {
            conf,
            engine: Arc::new(engine),
            _log_guard: log_guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::global::PluginConfig;
    use crate::core::model::error::ErrorCode;
    use crate::core::plugin::plugins::Plugin;

    #[tokio::test]
    async fn test_create_with_defaults() {
        let ctx = SDKContext::create_by_configuration(Configuration::default()).unwrap();
        assert!(ctx.get_engine().get_load_balancer("").is_ok());
        assert_eq!(
            ctx.get_engine().get_server_connector().name(),
            "fixed".to_string()
        );
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails_creation() {
        let mut conf = Configuration::default();
        conf.consumer.load_balancer.plugins = vec![PluginConfig::new("leastConnection")];
        let ret = SDKContext::create_by_configuration(conf);
        assert_eq!(ret.err().unwrap().code(), ErrorCode::PluginError);

        let mut conf = Configuration::default();
        conf.consumer.load_balancer.default_policy = "ringHash".to_string();
        conf.consumer.load_balancer.plugins = vec![PluginConfig::new("weightedRandom")];
        let ret = SDKContext::create_by_configuration(conf);
        assert_eq!(ret.err().unwrap().code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_create_outside_runtime() {
        let ctx = SDKContext::create_by_configuration(Configuration::default()).unwrap();
        let handle = ctx.get_engine().get_executor();
        let ret = handle.block_on(async { 1 + 1 });
        assert_eq!(ret, 2);
        drop(ctx);
    }
}
