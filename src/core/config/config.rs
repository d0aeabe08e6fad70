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

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::core::config::consumer::ConsumerConfig;
use crate::core::config::global::GlobalConfig;
use crate::core::model::error::{ErrorCode, PolarisError};

pub static DEFAULT_CONFIG_FILE: &str = "./polaris.yaml";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub global: GlobalConfig,
    pub consumer: ConsumerConfig,
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Configuration, PolarisError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|err| {
        PolarisError::new(
            ErrorCode::InvalidConfig,
            format!("read config file {} fail: {}", path.display(), err),
        )
    })?;
    load_from_str(&data)
}

pub fn load_from_str(data: &str) -> Result<Configuration, PolarisError> {
    serde_yaml::from_str::<Configuration>(data).map_err(|err| {
        PolarisError::new(
            ErrorCode::InvalidConfig,
            format!("failure to parse yaml config: {}", err),
        )
    })
}

/// load_default 读取当前目录下的 polaris.yaml, 文件不存在时使用默认配置
pub fn load_default() -> Result<Configuration, PolarisError> {
    if Path::new(DEFAULT_CONFIG_FILE).exists() {
        return load(DEFAULT_CONFIG_FILE);
    }
    Ok(Configuration::default())
}
