//! 도메인 타입 -- 함대(fleet) 토폴로지와 호스트 스코프
//!
//! 토폴로지 제공자가 반환하는 호스트/서비스 인스턴스와,
//! 로그 파일이 위치하는 스코프(글로벌 또는 격리 컨테이너)를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 글로벌 스코프를 나타내는 예약 이름
pub const GLOBAL_SCOPE: &str = "global";

/// 물리 호스트 (compute node)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// 호스트 UUID
    pub uuid: String,
    /// 호스트명
    pub hostname: String,
    /// 실행 중 여부
    #[serde(default = "default_true")]
    pub running: bool,
    /// 셋업 완료 여부
    #[serde(default = "default_true")]
    pub setup: bool,
    /// 가상 호스트 여부
    #[serde(default, rename = "virtual")]
    pub virtual_host: bool,
    /// 헤드노드 여부
    #[serde(default)]
    pub headnode: bool,
}

impl Host {
    /// 실행 중이고 셋업이 완료된 호스트를 생성합니다.
    pub fn new(uuid: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            hostname: hostname.into(),
            running: true,
            setup: true,
            virtual_host: false,
            headnode: false,
        }
    }

    /// 헤드노드로 표시합니다.
    pub fn with_headnode(mut self, headnode: bool) -> Self {
        self.headnode = headnode;
        self
    }

    /// 가상 호스트로 표시합니다.
    pub fn with_virtual(mut self, virtual_host: bool) -> Self {
        self.virtual_host = virtual_host;
        self
    }

    /// 검색 대상이 될 수 있는 호스트인지 확인합니다.
    pub fn is_searchable(&self, exclude_virtual: bool) -> bool {
        self.running && self.setup && !(exclude_virtual && self.virtual_host)
    }

    /// 이름 또는 UUID가 일치하는지 확인합니다.
    pub fn matches_name(&self, name: &str) -> bool {
        self.uuid == name || self.hostname == name
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.uuid)
    }
}

fn default_true() -> bool {
    true
}

/// 서비스 인스턴스 (격리 컨테이너 하나)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// 인스턴스 UUID (zone 이름과 동일)
    pub uuid: String,
    /// 서비스 이름
    pub service: String,
    /// 현재 인스턴스가 실행 중인 호스트 UUID
    #[serde(default)]
    pub host: Option<String>,
}

impl ServiceInstance {
    /// 새 서비스 인스턴스를 생성합니다.
    pub fn new(
        uuid: impl Into<String>,
        service: impl Into<String>,
        host: Option<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            service: service.into(),
            host,
        }
    }
}

/// 로그 파일이 위치하는 스코프
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum HostScope {
    /// 호스트 전역 (global zone)
    #[default]
    Global,
    /// 특정 격리 컨테이너 (zone 이름)
    Zone(String),
}

impl HostScope {
    /// 글로벌 스코프인지 확인합니다.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// 스코프 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Global => GLOBAL_SCOPE,
            Self::Zone(zone) => zone,
        }
    }
}

impl From<String> for HostScope {
    fn from(value: String) -> Self {
        if value == GLOBAL_SCOPE || value.is_empty() {
            Self::Global
        } else {
            Self::Zone(value)
        }
    }
}

impl From<&str> for HostScope {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<HostScope> for String {
    fn from(scope: HostScope) -> Self {
        scope.as_str().to_owned()
    }
}

impl fmt::Display for HostScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
