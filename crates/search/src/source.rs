//! 로그 소스 레지스트리 -- 이름 붙은 로그 소스와 파일 glob 생성
//!
//! [`Source`]는 한 종류의 구조화 로그가 어디에 쓰이는지를 기술합니다.
//! [`SourceRegistry::builtin`]은 알려진 서비스/에이전트 로그의 고정 카탈로그를
//! 제공하며, 설정 파일의 `[[sources]]` 정의로 확장할 수 있습니다.
//!
//! glob 생성은 I/O 없는 순수 문자열 조합입니다.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use evtrace_core::config::SourceDef;
use evtrace_core::types::HostScope;
use serde::Serialize;

use crate::error::SearchError;
use crate::window::TimeBucket;

/// 비글로벌 스코프 파일시스템의 루트 디렉토리
pub const ZONE_ROOT: &str = "/zones";

/// 소스 스코프
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceScope {
    /// 모든 호스트에 하나씩 존재하는 호스트 전역 로그
    Global,
    /// 이름 붙은 서비스의 인스턴스별 로그
    Service(String),
}

/// 로테이션 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    /// 시간 단위 로테이션 (`<name>_<id>_<YYYY-MM-DDTHH>:*.log`)
    Hourly,
    /// 로테이션하지 않음 (현재 로그만 존재)
    Unrotated,
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Unrotated => write!(f, "none"),
        }
    }
}

/// 로그 소스 정의
///
/// 생성 후 변경되지 않습니다. 모든 소스는 `(HostScope, TimeBucket)`이 주어지면
/// 결정적으로 하나의 파일 glob을 만들어냅니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// 소스 이름 (고유)
    name: String,
    /// 스코프
    scope: SourceScope,
    /// 현재 로그 경로 템플릿
    current: String,
    /// 로테이션 방식
    rotation: Rotation,
    /// 로테이션 파일 디렉토리
    rotation_dir: String,
    /// 로테이션 파일 기본 이름 (없으면 소스 이름)
    rotation_name: Option<String>,
}

impl Source {
    /// 모든 필드를 지정하여 소스를 생성합니다.
    pub fn new(
        name: impl Into<String>,
        scope: SourceScope,
        current: impl Into<String>,
        rotation: Rotation,
        rotation_dir: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            current: current.into(),
            rotation,
            rotation_dir: rotation_dir.into(),
            rotation_name: None,
        }
    }

    /// 서비스 zone 로그 소스를 기본 경로로 생성합니다.
    ///
    /// 서비스 이름은 소스 이름과 같고, 현재 로그는
    /// `/var/svc/log/smartdc-site-<name>:default.log`입니다.
    pub fn zone(name: &str) -> Self {
        Self::new(
            name,
            SourceScope::Service(name.to_owned()),
            format!("/var/svc/log/smartdc-site-{name}:default.log"),
            Rotation::Hourly,
            "/var/log/sdc/upload",
        )
    }

    /// 글로벌 에이전트 로그 소스를 기본 경로로 생성합니다.
    pub fn agent(name: &str) -> Self {
        Self::new(
            name,
            SourceScope::Global,
            format!("/var/svc/log/smartdc-agent-{name}:default.log"),
            Rotation::Hourly,
            format!("/var/log/sdc/{name}"),
        )
    }

    /// 인스턴스를 조회할 서비스 이름을 바꿉니다.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.scope = SourceScope::Service(service.into());
        self
    }

    /// 현재 로그 경로 템플릿을 바꿉니다.
    pub fn with_current(mut self, current: impl Into<String>) -> Self {
        self.current = current.into();
        self
    }

    /// 로테이션 디렉토리를 바꿉니다.
    pub fn with_rotation_dir(mut self, dir: impl Into<String>) -> Self {
        self.rotation_dir = dir.into();
        self
    }

    /// 로테이션 파일 기본 이름을 설정합니다.
    pub fn with_rotation_name(mut self, name: impl Into<String>) -> Self {
        self.rotation_name = Some(name.into());
        self
    }

    /// 로테이션 방식을 바꿉니다.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// 설정 파일의 소스 정의로부터 소스를 생성합니다.
    pub fn from_def(def: &SourceDef) -> Self {
        let mut source = if def.global {
            Self::agent(&def.name)
        } else {
            Self::zone(&def.name)
        };
        if let (false, Some(service)) = (def.global, &def.service) {
            source = source.with_service(service.clone());
        }
        if let Some(current) = &def.current {
            source = source.with_current(current.clone());
        }
        if let Some(dir) = &def.rotation_dir {
            source = source.with_rotation_dir(dir.clone());
        }
        if let Some(name) = &def.rotation_name {
            source = source.with_rotation_name(name.clone());
        }
        if def.rotation == "none" {
            source = source.with_rotation(Rotation::Unrotated);
        }
        source
    }

    /// 소스 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 스코프를 반환합니다.
    pub fn scope(&self) -> &SourceScope {
        &self.scope
    }

    /// 글로벌 소스인지 확인합니다.
    pub fn is_global(&self) -> bool {
        self.scope == SourceScope::Global
    }

    /// 인스턴스를 조회할 서비스 이름을 반환합니다 (글로벌 소스는 None).
    pub fn service(&self) -> Option<&str> {
        match &self.scope {
            SourceScope::Global => None,
            SourceScope::Service(service) => Some(service),
        }
    }

    /// 현재 로그 경로 템플릿을 반환합니다.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// 로테이션 방식을 반환합니다.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// 주어진 스코프와 시간 버킷에 해당하는 파일 glob을 생성합니다.
    ///
    /// # Errors
    /// - [`SearchError::InvalidScope`]: 비글로벌 소스를 글로벌 스코프로 조회
    /// - [`SearchError::UnsupportedRotation`]: 시간 버킷을 지원하지 않는 로테이션
    pub fn resolve_glob(
        &self,
        scope: &HostScope,
        bucket: &TimeBucket,
    ) -> Result<String, SearchError> {
        if !self.is_global() && scope.is_global() {
            return Err(SearchError::InvalidScope(self.name.clone()));
        }

        let glob = match bucket {
            TimeBucket::Current => self.current.clone(),
            TimeBucket::Hour(label) => {
                if self.rotation != Rotation::Hourly {
                    return Err(SearchError::UnsupportedRotation {
                        source_name: self.name.clone(),
                        rotation: self.rotation.to_string(),
                    });
                }
                let base = self.rotation_name.as_deref().unwrap_or(&self.name);
                format!(
                    "{}/{base}_*_{label}*.log",
                    self.rotation_dir.trim_end_matches('/')
                )
            }
        };

        Ok(match scope {
            HostScope::Global => glob,
            HostScope::Zone(zone) => format!("{ZONE_ROOT}/{zone}/root{glob}"),
        })
    }
}

/// 로그 소스 레지스트리
///
/// 이름 순서가 아닌 등록 순서를 유지합니다.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<Source>>,
}

impl SourceRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 카탈로그로 레지스트리를 생성합니다.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for source in builtin_sources() {
            registry.sources.push(Arc::new(source));
        }
        registry
    }

    /// 기본 카탈로그에 설정 파일 정의를 추가한 레지스트리를 생성합니다.
    pub fn with_defs(defs: &[SourceDef]) -> Result<Self, SearchError> {
        let mut registry = Self::builtin();
        for def in defs {
            registry.register(Source::from_def(def))?;
        }
        Ok(registry)
    }

    /// 소스를 등록합니다. 같은 이름이 이미 있으면 에러를 반환합니다.
    pub fn register(&mut self, source: Source) -> Result<(), SearchError> {
        if self.get(source.name()).is_some() {
            return Err(SearchError::Config {
                field: "sources".to_owned(),
                reason: format!("duplicate source name '{}'", source.name()),
            });
        }
        self.sources.push(Arc::new(source));
        Ok(())
    }

    /// 이름으로 소스를 조회합니다.
    pub fn get(&self, name: &str) -> Option<&Arc<Source>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// 등록된 모든 소스를 반환합니다.
    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    /// 등록된 소스 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// 레지스트리가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// 검색할 소스를 선택합니다.
    ///
    /// `names`가 없거나 비어있으면 모든 소스를 반환합니다. 중복 이름은 한 번만 포함됩니다.
    ///
    /// # Errors
    /// 레지스트리에 없는 이름이 있으면 [`SearchError::UnknownSource`]
    pub fn select(&self, names: Option<&[String]>) -> Result<Vec<Arc<Source>>, SearchError> {
        let names = match names {
            Some(names) if !names.is_empty() => names,
            _ => return Ok(self.sources.clone()),
        };

        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let source = self
                .get(name)
                .ok_or_else(|| SearchError::UnknownSource(name.clone()))?;
            if seen.insert(source.name().to_owned()) {
                selected.push(Arc::clone(source));
            }
        }
        Ok(selected)
    }
}

fn builtin_sources() -> Vec<Source> {
    vec![
        Source::zone("imgapi"),
        Source::zone("napi"),
        Source::zone("cnapi"),
        Source::zone("vmapi"),
        Source::zone("docker")
            .with_current("/var/svc/log/smartdc-application-docker:default.log"),
        Source::zone("sapi"),
        Source::zone("papi"),
        Source::zone("fwapi"),
        Source::zone("amon-master").with_service("amon"),
        Source::zone("wf-api")
            .with_service("workflow")
            .with_current("/var/svc/log/smartdc-application-wf-api:default.log"),
        Source::zone("wf-runner")
            .with_service("workflow")
            .with_current("/var/svc/log/smartdc-application-wf-runner:default.log"),
        Source::zone("volapi-server")
            .with_service("volapi")
            .with_current("/var/svc/log/smartdc-application-volapi-server:default.log"),
        Source::zone("volapi-updater")
            .with_service("volapi")
            .with_current("/var/svc/log/smartdc-application-volapi-updater:default.log"),
        Source::zone("cloudapi")
            .with_current("/var/svc/log/smartdc-application-cloudapi:cloudapi-*.log")
            .with_rotation_name("cloudapi-*"),
        Source::zone("ufds-master")
            .with_service("ufds")
            .with_current("/var/svc/log/smartdc-application-ufds-master:ufds-*.log")
            .with_rotation_name("ufds-master-*"),
        Source::agent("vm-agent"),
        Source::agent("net-agent"),
        Source::agent("firewaller").with_rotation_dir("/var/log/sdc/upload"),
        Source::agent("vminfod").with_rotation_dir("/var/log/sdc/upload"),
        Source::agent("cn-agent"),
        Source::agent("cn-agent-tasks")
            .with_current("/var/log/cn-agent/logs/*.log")
            .with_rotation_dir("/var/log/cn-agent"),
        Source::agent("provisioner"),
        Source::agent("provisioner-tasks")
            .with_current("/var/log/provisioner/logs/*.log")
            .with_rotation_dir("/var/log/provisioner")
            .with_rotation_name("provisioner_tasks"),
        Source::agent("vmadm")
            .with_current("/var/log/vm/logs/*.log")
            .with_rotation_dir("/var/log/vm"),
        Source::agent("vmadmd")
            .with_current("/var/svc/log/system-smartdc-vmadmd:default.log")
            .with_rotation_dir("/var/log/vm"),
        Source::agent("fwadm")
            .with_current("/var/log/fw/logs/*.log")
            .with_rotation_dir("/var/log/fw"),
    ]
}
