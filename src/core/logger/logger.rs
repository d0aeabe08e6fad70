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

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use crate::core::config::global::LoggerConfig;
use crate::core::model::error::{ErrorCode, PolarisError};

/// init_logger 安装写入滚动日志文件的全局 subscriber, 调用方需要持有返回的 guard
/// 直到进程退出, 否则缓冲中的日志会丢失
pub fn init_logger(conf: &LoggerConfig) -> Result<WorkerGuard, PolarisError> {
    let level = LevelFilter::from_str(&conf.level).map_err(|err| {
        PolarisError::new(
            ErrorCode::InvalidConfig,
            format!("invalid logger level {}: {}", conf.level, err),
        )
    })?;

    let file_appender = rolling::daily(&conf.dir, &conf.file);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_thread_names(true)
        .with_file(true)
        .with_level(true)
        .with_writer(non_blocking_appender)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_max_level(level)
        .try_init()
        .map_err(|_| {
            PolarisError::new(
                ErrorCode::InternalError,
                "logger already initialized".to_string(),
            )
        })?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level() {
        let conf = LoggerConfig {
            level: "verbose".to_string(),
            ..Default::default()
        };
        let ret = init_logger(&conf);
        assert_eq!(ret.err().unwrap().code(), ErrorCode::InvalidConfig);
    }
}
