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

use std::collections::HashMap;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::model::router::{MatchString, MatchStringType};

static WILDCARD: &str = "*";

static REGEX_CACHE: Lazy<DashMap<String, Option<Regex>>> = Lazy::new(DashMap::new);

/// match_label_value 匹配标签值
pub fn match_label_value(rule_value: &MatchString, actual_val: &str) -> bool {
    let match_value = rule_value.value.as_str();
    if is_match_all(match_value) {
        return true;
    }

    match rule_value.match_type {
        MatchStringType::Exact => match_value == actual_val,
        MatchStringType::NotEquals => match_value != actual_val,
        MatchStringType::Regex => match compile_regex(match_value) {
            Some(re) => re.is_match(actual_val),
            None => false,
        },
        MatchStringType::In => match_value.split(',').any(|x| x.trim() == actual_val),
        MatchStringType::NotIn => !match_value.split(',').any(|x| x.trim() == actual_val),
    }
}

/// match_labels 要求 labels 满足全部规则, 缺失的标签按空字符串匹配
pub fn match_labels(rules: &HashMap<String, MatchString>, labels: &HashMap<String, String>) -> bool {
    rules.iter().all(|(key, rule_value)| {
        let actual = labels.get(key).map(|v| v.as_str()).unwrap_or("");
        match_label_value(rule_value, actual)
    })
}

fn compile_regex(pattern: &str) -> Option<Regex> {
    if let Some(re) = REGEX_CACHE.get(pattern) {
        return re.clone();
    }
    let re = match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!("[polaris][router] invalid regex {}: {}", pattern, err);
            None
        }
    };
    REGEX_CACHE.insert(pattern.to_string(), re.clone());
    re
}

pub fn is_match_all(s: &str) -> bool {
    s == WILDCARD
}

/// match_service 规则里的服务名与命名空间为空或 * 时匹配任意服务
pub fn match_service(rule_namespace: &str, rule_service: &str, namespace: &str, service: &str) -> bool {
    let ns_match = rule_namespace.is_empty() || is_match_all(rule_namespace) || rule_namespace == namespace;
    let svc_match = rule_service.is_empty() || is_match_all(rule_service) || rule_service == service;
    ns_match && svc_match
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(match_type: MatchStringType, value: &str) -> MatchString {
        MatchString {
            match_type,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_match_label_value() {
        assert!(match_label_value(&ms(MatchStringType::Exact, "a"), "a"));
        assert!(!match_label_value(&ms(MatchStringType::Exact, "a"), "b"));
        assert!(match_label_value(&ms(MatchStringType::Exact, "*"), "b"));
        assert!(match_label_value(&ms(MatchStringType::NotEquals, "a"), "b"));
        assert!(match_label_value(&ms(MatchStringType::Regex, "^v[0-9]+$"), "v12"));
        assert!(!match_label_value(&ms(MatchStringType::Regex, "("), "v12"));
        assert!(match_label_value(&ms(MatchStringType::In, "a, b,c"), "b"));
        assert!(match_label_value(&ms(MatchStringType::NotIn, "a,b"), "c"));
    }

    #[test]
    fn test_match_service() {
        assert!(match_service("*", "", "default", "echo"));
        assert!(match_service("default", "echo", "default", "echo"));
        assert!(!match_service("prod", "echo", "default", "echo"));
    }
}
