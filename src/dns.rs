use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// external-dns webhook contract types
// ─────────────────────────────────────────────────────────────────────────────

/// A provider-specific property attached to an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpecific {
    pub name: String,
    pub value: String,
}

/// One DNS endpoint as external-dns understands it: a name+type pair with
/// a list of target values. The UniFi controller stores one value per
/// record, so a multi-target endpoint fans out into several records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: String,
    #[serde(default)]
    pub targets: Vec<String>,
    /// TTL in seconds; zero means "use the controller default".
    #[serde(rename = "recordTTL", default)]
    pub record_ttl: u32,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub labels: std::collections::HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_specific: Vec<ProviderSpecific>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub set_identifier: String,
}

/// The payload sent by external-dns to POST /records.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    #[serde(default)]
    pub create: Vec<Endpoint>,
    #[serde(default)]
    pub update_old: Vec<Endpoint>,
    #[serde(default)]
    pub update_new: Vec<Endpoint>,
    #[serde(default)]
    pub delete: Vec<Endpoint>,
}

/// Domain-filter negotiated with external-dns via GET /.
///
/// Suffix matching; an empty include list matches everything, and an
/// exclusion always wins over an inclusion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl DomainFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn matches(&self, dns_name: &str) -> bool {
        if self.exclude.iter().any(|d| dns_name.ends_with(d.as_str())) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|d| dns_name.ends_with(d.as_str()))
    }
}
