//! 함대 토폴로지 제공자 trait과 정적 구현
//!
//! [`TopologyProvider`]는 인벤토리 서비스를 추상화합니다.
//! [`StaticTopology`]는 설정 파일의 `[topology]` 섹션에서 직접 구성됩니다.

use std::future::Future;

use evtrace_core::config::TopologyConfig;
use evtrace_core::types::{Host, ServiceInstance};

use crate::error::SearchError;

/// 토폴로지 조회 trait
///
/// 테스트에서는 Mock 구현으로 교체할 수 있습니다.
pub trait TopologyProvider: Send + Sync + 'static {
    /// 모든 호스트 목록을 조회합니다.
    fn list_hosts(&self) -> impl Future<Output = Result<Vec<Host>, SearchError>> + Send;

    /// 서비스의 인스턴스 목록을 조회합니다.
    fn list_service_instances(
        &self,
        service: &str,
    ) -> impl Future<Output = Result<Vec<ServiceInstance>, SearchError>> + Send;
}

/// 메모리 내 정적 토폴로지
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    hosts: Vec<Host>,
    instances: Vec<ServiceInstance>,
}

impl StaticTopology {
    /// 빈 토폴로지를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 섹션에서 토폴로지를 생성합니다.
    pub fn from_config(config: &TopologyConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            instances: config.instances.clone(),
        }
    }

    /// 호스트를 추가합니다.
    pub fn with_host(mut self, host: Host) -> Self {
        self.hosts.push(host);
        self
    }

    /// 서비스 인스턴스를 추가합니다.
    pub fn with_instance(mut self, instance: ServiceInstance) -> Self {
        self.instances.push(instance);
        self
    }
}

impl TopologyProvider for StaticTopology {
    async fn list_hosts(&self) -> Result<Vec<Host>, SearchError> {
        Ok(self.hosts.clone())
    }

    async fn list_service_instances(
        &self,
        service: &str,
    ) -> Result<Vec<ServiceInstance>, SearchError> {
        Ok(self
            .instances
            .iter()
            .filter(|inst| inst.service == service)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_instances_by_service() {
        let topology = StaticTopology::new()
            .with_host(Host::new("h1", "cn1"))
            .with_instance(ServiceInstance::new("z1", "cnapi", Some("h1".to_owned())))
            .with_instance(ServiceInstance::new("z2", "vmapi", Some("h1".to_owned())));

        let cnapi = topology.list_service_instances("cnapi").await.unwrap();
        assert_eq!(cnapi.len(), 1);
        assert_eq!(cnapi[0].uuid, "z1");
        assert!(topology.list_service_instances("napi").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn from_config_copies_inventory() {
        let config = TopologyConfig {
            hosts: vec![Host::new("h1", "cn1"), Host::new("h2", "cn2")],
            ..TopologyConfig::default()
        };
        let topology = StaticTopology::from_config(&config);
        assert_eq!(topology.list_hosts().await.unwrap().len(), 2);
    }
}
