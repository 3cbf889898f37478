//! 타겟 해석기 -- (소스, 호스트, 스코프) 검색 타겟 목록 생성
//!
//! 글로벌 소스는 검색 가능한 호스트마다 하나의 타겟을 만들고, 서비스 소스는
//! 토폴로지에서 인스턴스를 조회하여 인스턴스가 실행 중인 호스트에 바인딩합니다.
//! 살아있는 호스트에 매핑되지 않는 인스턴스는 조용히 제외됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use evtrace_core::types::{Host, HostScope};
use tracing::debug;

use crate::error::SearchError;
use crate::source::Source;
use crate::topology::TopologyProvider;

/// 검색 타겟: 한 호스트의 한 스코프에 바인딩된 소스
#[derive(Debug, Clone)]
pub struct SearchTarget {
    /// 검색할 소스
    pub source: Arc<Source>,
    /// 대상 호스트
    pub host: Host,
    /// 로그 파일 스코프
    pub scope: HostScope,
    /// 로컬 프로세스로 실행 가능한지 여부
    pub local: bool,
}

impl SearchTarget {
    /// 로그에 사용할 짧은 설명을 반환합니다.
    pub fn describe(&self) -> String {
        format!("{}@{}/{}", self.source.name(), self.host.hostname, self.scope)
    }
}

/// 타겟 해석 옵션
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// 검색할 호스트 이름/UUID 목록 (비어있으면 전체)
    pub hosts: Vec<String>,
    /// 가상 호스트 제외 여부
    pub exclude_virtual: bool,
    /// 현재 프로세스가 실행 중인 호스트 UUID
    pub local_host: Option<String>,
    /// 현재 프로세스의 스코프
    pub invoking_scope: HostScope,
}

/// 소스 목록을 검색 타겟으로 해석합니다.
///
/// # Errors
/// - [`SearchError::UnknownHost`]: `options.hosts`에 토폴로지에 없는 이름이 있음
/// - 토폴로지 조회 실패
pub async fn resolve_targets<T: TopologyProvider>(
    topology: &T,
    sources: &[Arc<Source>],
    options: &ResolveOptions,
) -> Result<Vec<SearchTarget>, SearchError> {
    let all_hosts = topology.list_hosts().await?;
    let hosts = select_hosts(&all_hosts, options)?;
    let by_uuid: HashMap<&str, &Host> = hosts.iter().map(|h| (h.uuid.as_str(), h)).collect();

    let mut targets = Vec::new();
    for source in sources {
        match source.service() {
            None => {
                for host in &hosts {
                    targets.push(SearchTarget {
                        source: Arc::clone(source),
                        host: host.clone(),
                        scope: HostScope::Global,
                        local: is_local(host, options),
                    });
                }
            }
            Some(service) => {
                let instances = topology.list_service_instances(service).await?;
                for inst in instances {
                    let host = inst
                        .host
                        .as_deref()
                        .and_then(|uuid| by_uuid.get(uuid).copied());
                    let Some(host) = host else {
                        debug!(
                            source = source.name(),
                            instance = %inst.uuid,
                            host = ?inst.host,
                            "instance not on a searchable host, skipping"
                        );
                        continue;
                    };
                    targets.push(SearchTarget {
                        source: Arc::clone(source),
                        host: host.clone(),
                        scope: HostScope::Zone(inst.uuid),
                        local: is_local(host, options),
                    });
                }
            }
        }
    }

    Ok(targets)
}

/// 원격 실행이 필요한 타겟 수를 반환합니다.
pub fn requires_remote(targets: &[SearchTarget]) -> usize {
    targets.iter().filter(|t| !t.local).count()
}

fn is_local(host: &Host, options: &ResolveOptions) -> bool {
    options.invoking_scope.is_global()
        && options.local_host.as_deref() == Some(host.uuid.as_str())
}

fn select_hosts(all: &[Host], options: &ResolveOptions) -> Result<Vec<Host>, SearchError> {
    let eligible = |host: &&Host| host.is_searchable(options.exclude_virtual);

    if options.hosts.is_empty() {
        return Ok(all.iter().filter(eligible).cloned().collect());
    }

    let mut selected: Vec<Host> = Vec::new();
    for name in &options.hosts {
        let host = all
            .iter()
            .find(|h| h.matches_name(name))
            .ok_or_else(|| SearchError::UnknownHost(name.clone()))?;
        if !eligible(&host) {
            debug!(host = %host, "requested host is not searchable, skipping");
            continue;
        }
        if !selected.iter().any(|h| h.uuid == host.uuid) {
            selected.push(host.clone());
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceRegistry;
    use crate::topology::StaticTopology;
    use evtrace_core::types::ServiceInstance;

    fn topology() -> StaticTopology {
        let mut down = Host::new("h3", "cn3");
        down.running = false;
        StaticTopology::new()
            .with_host(Host::new("h1", "headnode").with_headnode(true))
            .with_host(Host::new("h2", "cn2"))
            .with_host(down)
            .with_host(Host::new("h4", "vcn4").with_virtual(true))
            .with_instance(ServiceInstance::new("z1", "cnapi", Some("h1".to_owned())))
            .with_instance(ServiceInstance::new("z2", "cnapi", Some("h9".to_owned())))
            .with_instance(ServiceInstance::new("z3", "cnapi", None))
    }

    fn options() -> ResolveOptions {
        ResolveOptions {
            exclude_virtual: true,
            local_host: Some("h1".to_owned()),
            ..ResolveOptions::default()
        }
    }

    fn sources(names: &[&str]) -> Vec<Arc<Source>> {
        let names: Vec<String> = names.iter().map(|s| (*s).to_owned()).collect();
        SourceRegistry::builtin().select(Some(&names)).unwrap()
    }

    #[tokio::test]
    async fn global_source_targets_each_searchable_host() {
        let targets = resolve_targets(&topology(), &sources(&["vm-agent"]), &options())
            .await
            .unwrap();
        let hosts: Vec<&str> = targets.iter().map(|t| t.host.uuid.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2"]);
        assert!(targets.iter().all(|t| t.scope.is_global()));
    }

    #[tokio::test]
    async fn virtual_hosts_included_when_not_excluded() {
        let opts = ResolveOptions {
            exclude_virtual: false,
            ..options()
        };
        let targets = resolve_targets(&topology(), &sources(&["vm-agent"]), &opts)
            .await
            .unwrap();
        assert_eq!(targets.len(), 3);
    }

    #[tokio::test]
    async fn scoped_source_drops_unmappable_instances() {
        let targets = resolve_targets(&topology(), &sources(&["cnapi"]), &options())
            .await
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].scope, HostScope::Zone("z1".to_owned()));
        assert_eq!(targets[0].host.uuid, "h1");
    }

    #[tokio::test]
    async fn local_only_on_local_host_from_global_scope() {
        let targets = resolve_targets(&topology(), &sources(&["vm-agent"]), &options())
            .await
            .unwrap();
        assert!(targets[0].local);
        assert!(!targets[1].local);
        assert_eq!(requires_remote(&targets), 1);

        let opts = ResolveOptions {
            invoking_scope: HostScope::Zone("z9".to_owned()),
            ..options()
        };
        let targets = resolve_targets(&topology(), &sources(&["vm-agent"]), &opts)
            .await
            .unwrap();
        assert_eq!(requires_remote(&targets), 2);
    }

    #[tokio::test]
    async fn host_subset_by_name_or_uuid() {
        let opts = ResolveOptions {
            hosts: vec!["cn2".to_owned(), "h2".to_owned()],
            ..options()
        };
        let targets = resolve_targets(&topology(), &sources(&["vm-agent"]), &opts)
            .await
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].host.hostname, "cn2");
    }

    #[tokio::test]
    async fn unknown_host_is_rejected() {
        let opts = ResolveOptions {
            hosts: vec!["nope".to_owned()],
            ..options()
        };
        let err = resolve_targets(&topology(), &sources(&["vm-agent"]), &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownHost(name) if name == "nope"));
    }
}
