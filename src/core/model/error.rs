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

use std::fmt;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,
    ApiInvalidArgument = 1001,
    InvalidConfig = 1002,
    PluginError = 1003,
    ApiTimeout = 1004,
    InvalidState = 1005,
    ServerUserError = 1006,
    NetworkError = 1007,
    CircuitBreakError = 1008,
    InstanceInfoError = 1009,
    InstanceNotFound = 1010,
    InvalidRule = 1011,
    RouteRuleNotMatch = 1012,
    InvalidResponse = 1013,
    InternalError = 1014,
    ServiceNotFound = 1015,
    ServerException = 1016,
    LocationNotFound = 1017,
    LocationMismatch = 1018,
    MetadataMismatch = 1019,
    SetMismatch = 1020,
    InstanceUnavailable = 1021,
    ConnectError = 2001,
    ServerError = 2002,
    RpcError = 2003,
    RpcTimeout = 2004,
    InvalidServerResponse = 2005,
    InvalidRequest = 2006,
    NotSupport = 20010,
    ParameterError = 40000,
}

impl Default for ErrorCode {
    fn default() -> Self {
        Self::InternalError
    }
}

impl ErrorCode {
    pub fn value(&self) -> u32 {
        *self as u32
    }
}

#[derive(Debug, Clone)]
pub struct PolarisError {
    err_msg: String,
    err_code: ErrorCode,
}

impl Display for PolarisError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "code: {:?}({}), msg: {}",
            self.err_code,
            self.err_code.value(),
            self.err_msg
        )
    }
}

impl std::error::Error for PolarisError {}

impl PolarisError {
    pub fn new(code: ErrorCode, err_msg: String) -> Self {
        PolarisError {
            err_msg,
            err_code: code,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.err_code
    }

    pub fn message(&self) -> &str {
        &self.err_msg
    }
}
