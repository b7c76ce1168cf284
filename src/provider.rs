use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    client::DnsApi,
    dns::{Changes, DomainFilter, Endpoint},
    error::UnifiError,
    metrics::{Metrics, PROVIDER_NAME},
    records::{self, RECORD_TYPE_CNAME},
};

/// Provider logic between the webhook surface and the controller API:
/// groups single-value records into multi-target endpoints, applies the
/// domain filter, and sequences change batches.
pub struct UnifiProvider {
    api: Arc<dyn DnsApi>,
    domain_filter: DomainFilter,
    metrics: Arc<Metrics>,
}

impl UnifiProvider {
    pub fn new(api: Arc<dyn DnsApi>, domain_filter: DomainFilter, metrics: Arc<Metrics>) -> Self {
        Self {
            api,
            domain_filter,
            metrics,
        }
    }

    pub fn domain_filter(&self) -> &DomainFilter {
        &self.domain_filter
    }

    /// Current zone state as endpoints. Records sharing a name and type
    /// merge into one endpoint, targets in controller order; the first
    /// record of a group decides the TTL.
    pub async fn records(&self) -> Result<Vec<Endpoint>, UnifiError> {
        let records = self.api.list_records().await?;

        let mut endpoints: Vec<Endpoint> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        let mut by_type: HashMap<String, usize> = HashMap::new();

        for record in records {
            if !records::is_supported(&record.record_type) || !self.domain_filter.matches(&record.key)
            {
                continue;
            }
            *by_type.entry(record.record_type.clone()).or_default() += 1;

            let key = (record.key.clone(), record.record_type.clone());
            match index.get(&key) {
                Some(&i) => endpoints[i].targets.push(record.value),
                None => {
                    index.insert(key, endpoints.len());
                    endpoints.push(Endpoint {
                        dns_name: record.key,
                        record_type: record.record_type,
                        targets: vec![record.value],
                        record_ttl: record.ttl,
                        ..Default::default()
                    });
                }
            }
        }

        for (record_type, count) in &by_type {
            self.metrics.set_records_by_type(record_type, *count);
        }

        debug!(endpoints = endpoints.len(), "listed records");
        Ok(endpoints)
    }

    /// Apply one change batch: deletes first (old halves of updates plus
    /// plain deletes), then creates (plain creates plus new halves).
    /// Deletes are fail-fast; there is no rollback, a failed batch leaves
    /// already-applied changes in place and the next reconcile loop
    /// converges.
    pub async fn apply_changes(&self, changes: &Changes) -> Result<(), UnifiError> {
        info!(
            create = changes.create.len(),
            update_old = changes.update_old.len(),
            update_new = changes.update_new.len(),
            delete = changes.delete.len(),
            "applying changes"
        );

        // Snapshot for CNAME conflict detection; if the controller is
        // unreachable nothing gets applied.
        let existing = self.records().await?;

        let deletes: Vec<&Endpoint> = changes.update_old.iter().chain(&changes.delete).collect();
        let creates: Vec<&Endpoint> = changes.create.iter().chain(&changes.update_new).collect();

        self.metrics
            .batch_size
            .with_label_values(&[PROVIDER_NAME, "delete"])
            .observe(deletes.len() as f64);
        self.metrics
            .batch_size
            .with_label_values(&[PROVIDER_NAME, "create"])
            .observe(creates.len() as f64);

        for endpoint in deletes {
            self.api.delete_endpoint(endpoint).await?;
            self.metrics.record_change("delete", &endpoint.record_type);
        }

        for endpoint in creates {
            // A CNAME create for a name that already holds one replaces it.
            if endpoint.record_type == RECORD_TYPE_CNAME {
                let conflict = existing.iter().any(|e| {
                    e.dns_name == endpoint.dns_name && e.record_type == RECORD_TYPE_CNAME
                });
                if conflict {
                    info!(dns_name = %endpoint.dns_name, "replacing existing CNAME record");
                    self.metrics
                        .cname_conflicts_total
                        .with_label_values(&[PROVIDER_NAME])
                        .inc();
                    self.api.delete_endpoint(endpoint).await?;
                }
            }

            self.api.create_endpoint(endpoint).await?;
            self.metrics.record_change("create", &endpoint.record_type);
        }

        Ok(())
    }

    /// The webhook makes no per-endpoint adjustments; external-dns gets
    /// its endpoints back unchanged.
    pub fn adjust_endpoints(&self, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
        endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::DnsRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted controller double: serves a fixed record list and logs
    /// every mutation in order.
    #[derive(Default)]
    struct FakeApi {
        records: Vec<DnsRecord>,
        calls: Mutex<Vec<String>>,
        fail_delete_for: Option<String>,
        fail_create_for: Option<String>,
        fail_list: bool,
    }

    impl FakeApi {
        fn with_records(records: Vec<DnsRecord>) -> Self {
            Self {
                records,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DnsApi for FakeApi {
        async fn list_records(&self) -> Result<Vec<DnsRecord>, UnifiError> {
            if self.fail_list {
                return Err(UnifiError::data("list", "records", "unavailable"));
            }
            Ok(self.records.clone())
        }

        async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<Vec<DnsRecord>, UnifiError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {} {}", endpoint.record_type, endpoint.dns_name));
            if self.fail_create_for.as_deref() == Some(endpoint.dns_name.as_str()) {
                return Err(UnifiError::data("create", "record", "rejected"));
            }
            Ok(vec![])
        }

        async fn delete_endpoint(&self, endpoint: &Endpoint) -> Result<(), UnifiError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {} {}", endpoint.record_type, endpoint.dns_name));
            if self.fail_delete_for.as_deref() == Some(endpoint.dns_name.as_str()) {
                return Err(UnifiError::Delete { failed: 1, total: 1 });
            }
            Ok(())
        }
    }

    fn record(key: &str, record_type: &str, value: &str, ttl: u32) -> DnsRecord {
        DnsRecord {
            id: format!("id-{value}"),
            enabled: true,
            key: key.to_string(),
            record_type: record_type.to_string(),
            value: value.to_string(),
            ttl,
            ..Default::default()
        }
    }

    fn endpoint(name: &str, record_type: &str, targets: &[&str]) -> Endpoint {
        Endpoint {
            dns_name: name.to_string(),
            record_type: record_type.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn provider(api: Arc<FakeApi>, filter: DomainFilter) -> UnifiProvider {
        UnifiProvider::new(api, filter, Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn records_groups_by_name_and_type() {
        let api = Arc::new(FakeApi::with_records(vec![
            record("a.example.com", "A", "192.168.1.1", 300),
            record("a.example.com", "A", "192.168.1.2", 600),
            record("a.example.com", "TXT", "owner", 0),
            record("b.example.com", "A", "192.168.1.3", 0),
        ]));
        let provider = provider(api, DomainFilter::default());

        let endpoints = provider.records().await.unwrap();
        assert_eq!(endpoints.len(), 3);

        let a = &endpoints[0];
        assert_eq!(a.dns_name, "a.example.com");
        assert_eq!(a.targets, vec!["192.168.1.1", "192.168.1.2"]);
        // first record of the group wins
        assert_eq!(a.record_ttl, 300);
        assert_eq!(endpoints[1].record_type, "TXT");
        assert_eq!(endpoints[2].dns_name, "b.example.com");
    }

    #[tokio::test]
    async fn records_applies_domain_filter() {
        let api = Arc::new(FakeApi::with_records(vec![
            record("svc.example.com", "A", "192.168.1.1", 0),
            record("svc.example.org", "A", "192.168.1.2", 0),
        ]));
        let provider = provider(api, DomainFilter::new(vec!["example.com".into()], vec![]));

        let endpoints = provider.records().await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].dns_name, "svc.example.com");
    }

    #[tokio::test]
    async fn apply_changes_deletes_before_creates() {
        let api = Arc::new(FakeApi::with_records(vec![record(
            "old.example.com",
            "A",
            "192.168.1.1",
            0,
        )]));
        let provider = provider(api.clone(), DomainFilter::default());

        let changes = Changes {
            create: vec![endpoint("new.example.com", "A", &["192.168.1.5"])],
            update_old: vec![endpoint("old.example.com", "A", &["192.168.1.1"])],
            update_new: vec![endpoint("old.example.com", "A", &["192.168.1.9"])],
            delete: vec![endpoint("gone.example.com", "A", &["192.168.1.2"])],
        };
        provider.apply_changes(&changes).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "delete A old.example.com",
                "delete A gone.example.com",
                "create A new.example.com",
                "create A old.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn cname_conflict_replaces_existing_record() {
        let api = Arc::new(FakeApi::with_records(vec![record(
            "alias.example.com",
            "CNAME",
            "old-target.example.com",
            0,
        )]));
        let provider = provider(api.clone(), DomainFilter::default());

        let changes = Changes {
            create: vec![endpoint(
                "alias.example.com",
                "CNAME",
                &["new-target.example.com"],
            )],
            ..Default::default()
        };
        provider.apply_changes(&changes).await.unwrap();

        assert_eq!(
            api.calls(),
            vec!["delete CNAME alias.example.com", "create CNAME alias.example.com"]
        );
        assert_eq!(
            provider
                .metrics
                .cname_conflicts_total
                .with_label_values(&[PROVIDER_NAME])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn cname_create_without_conflict_skips_delete() {
        let api = Arc::new(FakeApi::with_records(vec![]));
        let provider = provider(api.clone(), DomainFilter::default());

        let changes = Changes {
            create: vec![endpoint("alias.example.com", "CNAME", &["target.example.com"])],
            ..Default::default()
        };
        provider.apply_changes(&changes).await.unwrap();

        assert_eq!(api.calls(), vec!["create CNAME alias.example.com"]);
    }

    #[tokio::test]
    async fn apply_changes_aborts_when_baseline_list_fails() {
        let api = Arc::new(FakeApi {
            fail_list: true,
            ..Default::default()
        });
        let provider = provider(api.clone(), DomainFilter::default());

        let changes = Changes {
            create: vec![endpoint("a.example.com", "A", &["192.168.1.1"])],
            ..Default::default()
        };
        assert!(provider.apply_changes(&changes).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_stops_the_batch() {
        let api = Arc::new(FakeApi {
            fail_delete_for: Some("a.example.com".into()),
            ..Default::default()
        });
        let provider = provider(api.clone(), DomainFilter::default());

        let changes = Changes {
            delete: vec![
                endpoint("a.example.com", "A", &[]),
                endpoint("b.example.com", "A", &[]),
            ],
            create: vec![endpoint("c.example.com", "A", &["192.168.1.1"])],
            ..Default::default()
        };
        let err = provider.apply_changes(&changes).await.unwrap_err();
        assert!(matches!(err, UnifiError::Delete { .. }));
        // nothing after the failed delete runs
        assert_eq!(api.calls(), vec!["delete A a.example.com"]);
    }

    #[tokio::test]
    async fn create_failure_propagates() {
        let api = Arc::new(FakeApi {
            fail_create_for: Some("a.example.com".into()),
            ..Default::default()
        });
        let provider = provider(api.clone(), DomainFilter::default());

        let changes = Changes {
            create: vec![endpoint("a.example.com", "A", &["192.168.1.1"])],
            ..Default::default()
        };
        assert!(provider.apply_changes(&changes).await.is_err());
    }

    #[test]
    fn adjust_endpoints_is_identity() {
        let api = Arc::new(FakeApi::default());
        let provider = provider(api, DomainFilter::default());
        let input = vec![endpoint("a.example.com", "A", &["192.168.1.1"])];
        let output = provider.adjust_endpoints(input.clone());
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].dns_name, input[0].dns_name);
    }
}
