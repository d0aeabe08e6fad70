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

use crate::core::model::stat::StatInfo;
use crate::core::plugin::plugins::Plugin;

pub trait StatReporter: Plugin {
    /// report 上报一条统计数据, 实现方不能阻塞调用方
    fn report(&self, info: &StatInfo);
}

/// StatReporterChain 按配置顺序分发统计数据
#[derive(Clone, Default)]
pub struct StatReporterChain {
    reporters: Vec<Arc<dyn StatReporter>>,
}

impl StatReporterChain {
    pub fn new(reporters: Vec<Arc<dyn StatReporter>>) -> Self {
        Self { reporters }
    }

    pub fn report(&self, info: StatInfo) {
        for reporter in self.reporters.iter() {
            reporter.report(&info);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    pub fn destroy(&self) {
        for reporter in self.reporters.iter() {
            reporter.destroy();
        }
    }
}
