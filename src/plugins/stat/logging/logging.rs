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

use crate::core::{
    config::global::PluginConfig,
    model::stat::StatInfo,
    plugin::{plugins::Plugin, stat::StatReporter},
};

static PLUGIN_NAME: &str = "logging";

fn new_reporter(conf: &PluginConfig) -> Box<dyn StatReporter> {
    Box::new(LoggingStatReporter {
        // 是否记录每一次实例选择, 默认只记录拉取与调用结果
        log_selection: conf.get_bool("logSelection", false),
    })
}

/// LoggingStatReporter 把统计数据输出到 tracing 日志
pub struct LoggingStatReporter {
    log_selection: bool,
}

impl LoggingStatReporter {
    pub fn builder() -> (fn(&PluginConfig) -> Box<dyn StatReporter>, String) {
        (new_reporter, PLUGIN_NAME.to_string())
    }
}

impl Plugin for LoggingStatReporter {
    fn init(&mut self) {}

    fn destroy(&self) {}

    fn name(&self) -> String {
        PLUGIN_NAME.to_string()
    }
}

impl StatReporter for LoggingStatReporter {
    fn report(&self, info: &StatInfo) {
        match info {
            StatInfo::Selection {
                callee,
                policy,
                instance_id,
            } => {
                if self.log_selection {
                    tracing::info!(
                        target: "polaris::stat",
                        callee = %callee,
                        policy = %policy,
                        instance = %instance_id,
                        "instance selected"
                    );
                }
            }
            StatInfo::Fetch {
                key,
                success,
                changed,
                latency,
            } => {
                if *success {
                    tracing::info!(
                        target: "polaris::stat",
                        resource = %key,
                        changed = *changed,
                        latency_ms = latency.as_millis() as u64,
                        "resource fetched"
                    );
                } else {
                    tracing::warn!(
                        target: "polaris::stat",
                        resource = %key,
                        latency_ms = latency.as_millis() as u64,
                        "resource fetch failed"
                    );
                }
            }
            StatInfo::Call(result) => {
                tracing::info!(
                    target: "polaris::stat",
                    callee = %result.callee,
                    instance = %result.instance.format_address(),
                    status = ?result.ret_status,
                    delay_ms = result.delay.as_millis() as u64,
                    "service call reported"
                );
            }
        }
    }
}
