//! 필터 컴파일러 -- 구조화 필터를 연쇄 매칭 패턴으로 변환
//!
//! 필터는 `(field, op, value)` 삼중항입니다.
//!
//! | op       | 패턴                        |
//! |----------|-----------------------------|
//! | `raw`    | field 자체가 패턴           |
//! | `exists` | `"<field>":`                |
//! | `in`     | `"<field>":"(<v1>\|<v2>)"`  |
//!
//! 컴파일된 패턴은 하나로 합치지 않고 파이프라인으로 연결됩니다. 첫 패턴이
//! 파일 내용을 거르고, 이후 패턴은 앞 단계의 출력을 거릅니다 (논리 AND).
//!
//! `raw` 패턴의 매칭은 전적으로 grep(ERE)에 맡깁니다. 컴파일 시점에 `regex`
//! 크레이트로 문법만 확인하며, 레코드 단위 재검사에서는 사용하지 않습니다.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SearchError;

/// 필터 연산자 이름
pub const OP_RAW: &str = "raw";
/// 필드 존재 연산자
pub const OP_EXISTS: &str = "exists";
/// 문자열 집합 포함 연산자
pub const OP_IN: &str = "in";

/// 검색 필터 정의
///
/// 연산자는 컴파일 전까지 문자열로 보관되어, 알 수 없는 연산자를
/// [`SearchError::UnknownFilterOp`]로 보고할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// 대상 필드 (`raw`에서는 패턴)
    pub field: String,
    /// 연산자
    pub op: String,
    /// 연산자 인자
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Filter {
    /// 원시 패턴 필터를 생성합니다.
    pub fn raw(pattern: impl Into<String>) -> Self {
        Self {
            field: pattern.into(),
            op: OP_RAW.to_owned(),
            value: None,
        }
    }

    /// 필드 존재 필터를 생성합니다.
    pub fn exists(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: OP_EXISTS.to_owned(),
            value: None,
        }
    }

    /// 문자열 집합 포함 필터를 생성합니다.
    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|v| Value::String(v.into())).collect();
        Self {
            field: field.into(),
            op: OP_IN.to_owned(),
            value: Some(Value::Array(values)),
        }
    }

    /// JSON 배열 표기(`["req_id", "in", ["A", "B"]]`)로부터 필터를 생성합니다.
    pub fn from_json(value: &Value) -> Result<Self, SearchError> {
        let items = value.as_array().ok_or_else(|| SearchError::UnsupportedFilterValue {
            field: value.to_string(),
            reason: "filter must be a [field, op, value?] array".to_owned(),
        })?;

        let field = items.first().and_then(Value::as_str);
        let op = items.get(1).and_then(Value::as_str);
        match (field, op) {
            (Some(field), Some(op)) if items.len() <= 3 => Ok(Self {
                field: field.to_owned(),
                op: op.to_owned(),
                value: items.get(2).cloned(),
            }),
            _ => Err(SearchError::UnsupportedFilterValue {
                field: value.to_string(),
                reason: "filter must be a [field, op, value?] array".to_owned(),
            }),
        }
    }
}

/// 컴파일된 필터 한 단계
#[derive(Debug, Clone)]
enum Stage {
    Raw,
    Exists(String),
    OneOf(String, HashSet<String>),
}

/// 컴파일된 필터 체인
#[derive(Debug, Clone)]
pub struct FilterChain {
    patterns: Vec<String>,
    stages: Vec<Stage>,
}

impl FilterChain {
    /// 파이프라인 순서대로 매칭 패턴을 반환합니다.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// 패턴 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// 체인이 비어있는지 확인합니다. 컴파일된 체인은 항상 하나 이상의 패턴을 가집니다.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 파싱된 레코드가 `exists`/`in` 필터를 만족하는지 레코드 단위로 재검사합니다.
    ///
    /// grep 패턴은 문자열 매칭이므로 다른 위치(중첩 객체 등)에서 우연히 일치한
    /// 라인을 걸러내는 데 사용합니다. `raw` 단계는 grep 결과를 그대로 신뢰합니다.
    pub fn accepts(&self, record: &Value) -> bool {
        self.stages.iter().all(|stage| match stage {
            Stage::Raw => true,
            Stage::Exists(field) => record.get(field).is_some(),
            Stage::OneOf(field, set) => record
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| set.contains(v)),
        })
    }

    /// grep 파이프라인 명령을 생성합니다.
    ///
    /// 첫 단계는 `input`(파일 glob 또는 파일 경로)을 읽고, 이후 단계는 앞 단계
    /// 출력을 읽습니다.
    pub fn pipeline(&self, grep: &str, input: &str) -> String {
        let mut cmd = String::new();
        for (idx, pattern) in self.patterns.iter().enumerate() {
            if idx == 0 {
                cmd.push_str(&format!("{grep} -h -- {} {input}", shell_quote(pattern)));
            } else {
                cmd.push_str(&format!(" | {grep} -- {}", shell_quote(pattern)));
            }
        }
        cmd
    }
}

/// 필터 목록을 패턴 체인으로 컴파일합니다.
///
/// # Errors
/// - [`SearchError::NoFilters`]: 필터가 없음
/// - [`SearchError::UnknownFilterOp`]: 알 수 없는 연산자
/// - [`SearchError::UnsupportedFilterValue`]: `in`의 값이 비었거나 문자열이 아님
/// - [`SearchError::InvalidPattern`]: 정규식으로 컴파일되지 않는 패턴
pub fn compile(filters: &[Filter]) -> Result<FilterChain, SearchError> {
    if filters.is_empty() {
        return Err(SearchError::NoFilters);
    }

    let mut patterns = Vec::with_capacity(filters.len());
    let mut stages = Vec::with_capacity(filters.len());

    for filter in filters {
        let (pattern, stage) = match filter.op.as_str() {
            OP_RAW => (filter.field.clone(), Stage::Raw),
            OP_EXISTS => (
                format!("\"{}\":", filter.field),
                Stage::Exists(filter.field.clone()),
            ),
            OP_IN => {
                let values = string_set(filter)?;
                let pattern = format!("\"{}\":\"({})\"", filter.field, values.join("|"));
                let set = values.into_iter().collect();
                (pattern, Stage::OneOf(filter.field.clone(), set))
            }
            other => return Err(SearchError::UnknownFilterOp(other.to_owned())),
        };

        // 모든 패턴은 grep -E에 그대로 전달되므로 문법 오류는 실행 전에 거부
        check_pattern(&pattern)?;
        patterns.push(pattern);
        stages.push(stage);
    }

    Ok(FilterChain { patterns, stages })
}

fn string_set(filter: &Filter) -> Result<Vec<String>, SearchError> {
    let unsupported = |reason: &str| SearchError::UnsupportedFilterValue {
        field: filter.field.clone(),
        reason: reason.to_owned(),
    };

    let items = filter
        .value
        .as_ref()
        .and_then(Value::as_array)
        .ok_or_else(|| unsupported("'in' requires an array of strings"))?;
    if items.is_empty() {
        return Err(unsupported("'in' requires a non-empty set"));
    }

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| unsupported(&format!("non-string value {item}")))
        })
        .collect()
}

fn check_pattern(pattern: &str) -> Result<(), SearchError> {
    Regex::new(pattern)
        .map(drop)
        .map_err(|e| SearchError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })
}

/// 문자열을 POSIX 셸의 작은따옴표 리터럴로 감쌉니다.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
