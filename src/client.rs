use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, warn};

use crate::{
    dns::Endpoint,
    error::UnifiError,
    metrics::{Metrics, PROVIDER_NAME},
    records::{self, DnsRecord, RECORD_TYPE_CNAME, RECORD_TYPE_SRV},
    transport::Transport,
};

/// The controller-facing operations the provider layer needs. Behind a
/// trait so provider logic tests against an in-memory double.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// All supported records on the configured site.
    async fn list_records(&self) -> Result<Vec<DnsRecord>, UnifiError>;

    /// Create one record per endpoint target.
    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<Vec<DnsRecord>, UnifiError>;

    /// Delete every record matching the endpoint's name and type.
    async fn delete_endpoint(&self, endpoint: &Endpoint) -> Result<(), UnifiError>;
}

pub struct UnifiClient {
    transport: Transport,
    metrics: Arc<Metrics>,
}

impl UnifiClient {
    pub fn new(transport: Transport, metrics: Arc<Metrics>) -> Self {
        Self { transport, metrics }
    }

    /// Fetch the raw record list, keeping only supported types and folding
    /// SRV fields back into the packed value external-dns expects.
    async fn fetch_records(&self) -> Result<Vec<DnsRecord>, UnifiError> {
        let url = self.transport.records_url();
        let resp = self.transport.request(Method::GET, &url, None).await?;
        let mut raw: Vec<DnsRecord> = resp
            .json()
            .await
            .map_err(|err| UnifiError::data("deserialize", "DNS record list", err))?;

        raw.retain(|r| records::is_supported(&r.record_type));

        for record in &mut raw {
            if record.record_type != RECORD_TYPE_SRV {
                continue;
            }
            match (record.priority, record.weight, record.port) {
                (Some(priority), Some(weight), Some(port)) => {
                    record.value = records::format_srv(priority, weight, port, &record.value);
                    record.priority = None;
                    record.weight = None;
                    record.port = None;
                }
                _ => {
                    warn!(
                        key = %record.key,
                        "SRV record is missing priority, weight or port; leaving value as-is"
                    );
                }
            }
        }

        Ok(raw)
    }

    async fn post_record(&self, record: &DnsRecord) -> Result<DnsRecord, UnifiError> {
        let url = self.transport.records_url();
        let body = serde_json::to_value(record)
            .map_err(|err| UnifiError::data("serialize", "DNS record", err))?;
        let resp = self.transport.request(Method::POST, &url, Some(&body)).await?;
        resp.json()
            .await
            .map_err(|err| UnifiError::data("deserialize", "created DNS record", err))
    }
}

#[async_trait]
impl DnsApi for UnifiClient {
    async fn list_records(&self) -> Result<Vec<DnsRecord>, UnifiError> {
        let start = Instant::now();
        let result = self.fetch_records().await;
        self.metrics
            .observe_api_call("get_endpoints", start.elapsed(), result.is_err());
        result
    }

    async fn create_endpoint(&self, endpoint: &Endpoint) -> Result<Vec<DnsRecord>, UnifiError> {
        let start = Instant::now();
        let result = self.create(endpoint).await;
        self.metrics
            .observe_api_call("create_endpoint", start.elapsed(), result.is_err());
        result
    }

    async fn delete_endpoint(&self, endpoint: &Endpoint) -> Result<(), UnifiError> {
        let start = Instant::now();
        let result = self.delete(endpoint).await;
        self.metrics
            .observe_api_call("delete_endpoint", start.elapsed(), result.is_err());
        result
    }
}

impl UnifiClient {
    async fn create(&self, endpoint: &Endpoint) -> Result<Vec<DnsRecord>, UnifiError> {
        let mut targets: &[String] = &endpoint.targets;

        // The controller rejects multiple CNAMEs for one name; keep the
        // first target and account for the rest.
        if endpoint.record_type == RECORD_TYPE_CNAME && targets.len() > 1 {
            warn!(
                dns_name = %endpoint.dns_name,
                ignored = targets.len() - 1,
                "CNAME endpoint has multiple targets, only the first will be used"
            );
            self.metrics
                .ignored_cname_targets_total
                .with_label_values(&[PROVIDER_NAME])
                .inc_by((targets.len() - 1) as f64);
            targets = &targets[..1];
        }

        // Build every record before the first request so a malformed SRV
        // target aborts the endpoint without partial writes.
        let mut pending = Vec::with_capacity(targets.len());
        for target in targets {
            let mut record = records::build_record(endpoint, target);
            if endpoint.record_type == RECORD_TYPE_SRV {
                if let Err(err) = records::pack_srv(&mut record, target) {
                    self.metrics
                        .srv_parsing_errors_total
                        .with_label_values(&[PROVIDER_NAME])
                        .inc();
                    return Err(err);
                }
            }
            pending.push(record);
        }

        let mut created = Vec::with_capacity(pending.len());
        for record in &pending {
            debug!(key = %record.key, record_type = %record.record_type, "creating DNS record");
            created.push(self.post_record(record).await?);
        }

        Ok(created)
    }

    /// Deletion matches on name and type only; all records of the pair go,
    /// regardless of value. Failures are collected rather than aborting so
    /// one stuck record does not strand the rest.
    async fn delete(&self, endpoint: &Endpoint) -> Result<(), UnifiError> {
        let all = self.fetch_records().await?;
        let matching: Vec<&DnsRecord> = all
            .iter()
            .filter(|r| r.key == endpoint.dns_name && r.record_type == endpoint.record_type)
            .collect();

        if matching.is_empty() {
            debug!(
                dns_name = %endpoint.dns_name,
                record_type = %endpoint.record_type,
                "no matching records to delete"
            );
            return Ok(());
        }

        let total = matching.len();
        let mut failed = 0usize;
        for record in matching {
            let url = self.transport.record_url(&record.id);
            debug!(key = %record.key, id = %record.id, "deleting DNS record");
            if let Err(err) = self.transport.request(Method::DELETE, &url, None).await {
                warn!(key = %record.key, id = %record.id, error = %err, "failed to delete record");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(UnifiError::Delete { failed, total });
        }
        Ok(())
    }
}
