use serde::{Deserialize, Serialize};

use crate::{dns::Endpoint, error::UnifiError};

// ─────────────────────────────────────────────────────────────────────────────
// UniFi static-dns wire shape
// ─────────────────────────────────────────────────────────────────────────────

pub const RECORD_TYPE_A: &str = "A";
pub const RECORD_TYPE_AAAA: &str = "AAAA";
pub const RECORD_TYPE_CNAME: &str = "CNAME";
pub const RECORD_TYPE_MX: &str = "MX";
pub const RECORD_TYPE_NS: &str = "NS";
pub const RECORD_TYPE_SRV: &str = "SRV";
pub const RECORD_TYPE_TXT: &str = "TXT";

/// Record types the webhook manages; anything else the controller holds is
/// filtered out on read, never treated as an error.
pub const SUPPORTED_RECORD_TYPES: &[&str] = &[
    RECORD_TYPE_A,
    RECORD_TYPE_AAAA,
    RECORD_TYPE_CNAME,
    RECORD_TYPE_MX,
    RECORD_TYPE_NS,
    RECORD_TYPE_SRV,
    RECORD_TYPE_TXT,
];

pub fn is_supported(record_type: &str) -> bool {
    SUPPORTED_RECORD_TYPES.contains(&record_type)
}

fn ttl_is_default(ttl: &u32) -> bool {
    *ttl == 0
}

/// One DNS record as the UniFi static-dns API represents it: a single
/// name+type+value tuple.
///
/// `priority`/`weight`/`port` are only ever present on SRV records; for
/// every other type they must stay `None` so they are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Controller-assigned identifier, empty until the record is created.
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub enabled: bool,
    pub key: String,
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "ttl_is_default")]
    pub ttl: u32,
    pub value: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint <-> DnsRecord transformation
// ─────────────────────────────────────────────────────────────────────────────

/// Build one wire record for a single target of an endpoint. Records the
/// webhook creates are always enabled.
pub fn build_record(endpoint: &Endpoint, target: &str) -> DnsRecord {
    DnsRecord {
        enabled: true,
        key: endpoint.dns_name.clone(),
        record_type: endpoint.record_type.clone(),
        ttl: endpoint.record_ttl,
        value: target.to_string(),
        ..Default::default()
    }
}

/// Split an external-dns SRV target (`"priority weight port host"`) into
/// the record's priority/weight/port fields, leaving the host in `value`.
///
/// Tokens after the host are silently ignored; that loose parsing is
/// long-standing behavior external-dns consumers rely on.
pub fn pack_srv(record: &mut DnsRecord, target: &str) -> Result<(), UnifiError> {
    let parts: Vec<&str> = target.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(UnifiError::data(
            "parse",
            "SRV record target",
            format!("expected \"priority weight port host\", got {target:?}"),
        ));
    }

    let priority = parts[0]
        .parse()
        .map_err(|_| srv_field_error("priority", parts[0]))?;
    let weight = parts[1]
        .parse()
        .map_err(|_| srv_field_error("weight", parts[1]))?;
    let port = parts[2]
        .parse()
        .map_err(|_| srv_field_error("port", parts[2]))?;

    record.priority = Some(priority);
    record.weight = Some(weight);
    record.port = Some(port);
    record.value = parts[3].to_string();

    Ok(())
}

fn srv_field_error(field: &str, value: &str) -> UnifiError {
    UnifiError::data(
        "parse",
        "SRV record target",
        format!("invalid {field} {value:?}"),
    )
}

/// Inverse of [`pack_srv`]: fold SRV fields back into the packed string
/// external-dns expects.
pub fn format_srv(priority: u16, weight: u16, port: u16, host: &str) -> String {
    format!("{priority} {weight} {port} {host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, record_type: &str, targets: &[&str], ttl: u32) -> Endpoint {
        Endpoint {
            dns_name: name.to_string(),
            record_type: record_type.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            record_ttl: ttl,
            ..Default::default()
        }
    }

    #[test]
    fn build_record_copies_endpoint_fields() {
        let ep = endpoint("test.example.com", "A", &["192.168.1.1"], 300);
        let record = build_record(&ep, "192.168.1.1");
        assert!(record.enabled);
        assert_eq!(record.key, "test.example.com");
        assert_eq!(record.record_type, "A");
        assert_eq!(record.ttl, 300);
        assert_eq!(record.value, "192.168.1.1");
        assert!(record.id.is_empty());
        assert_eq!(record.priority, None);
    }

    #[test]
    fn pack_srv_splits_all_fields() {
        let ep = endpoint("_sip._tcp.example.com", "SRV", &[], 120);
        let mut record = build_record(&ep, "10 60 5060 sip.example.com");
        pack_srv(&mut record, "10 60 5060 sip.example.com").unwrap();
        assert_eq!(record.priority, Some(10));
        assert_eq!(record.weight, Some(60));
        assert_eq!(record.port, Some(5060));
        assert_eq!(record.value, "sip.example.com");
    }

    #[test]
    fn pack_srv_rejects_missing_fields() {
        let mut record = DnsRecord::default();
        let err = pack_srv(&mut record, "10 60 sip.example.com").unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn pack_srv_rejects_non_integer_fields() {
        let mut record = DnsRecord::default();
        assert!(pack_srv(&mut record, "ten 60 5060 sip.example.com").is_err());
        assert!(pack_srv(&mut record, "10 60 http sip.example.com").is_err());
        // out of u16 range
        assert!(pack_srv(&mut record, "70000 60 5060 sip.example.com").is_err());
    }

    #[test]
    fn pack_srv_ignores_trailing_tokens() {
        let mut record = DnsRecord::default();
        pack_srv(&mut record, "10 60 5060 sip.example.com extra junk").unwrap();
        assert_eq!(record.value, "sip.example.com");
    }

    #[test]
    fn srv_round_trip() {
        for (priority, weight, port) in [
            (0u16, 0u16, 0u16),
            (10, 20, 8080),
            (65535, 65535, 65535),
            (1, 0, 53),
        ] {
            let host = "target.example.com";
            let packed = format_srv(priority, weight, port, host);
            let mut record = DnsRecord::default();
            pack_srv(&mut record, &packed).unwrap();
            assert_eq!(record.priority, Some(priority));
            assert_eq!(record.weight, Some(weight));
            assert_eq!(record.port, Some(port));
            assert_eq!(record.value, host);
        }
    }

    #[test]
    fn non_srv_record_never_serializes_srv_fields() {
        let ep = endpoint("test.example.com", "A", &["192.168.1.1"], 300);
        let record = build_record(&ep, "192.168.1.1");
        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("priority"));
        assert!(!obj.contains_key("weight"));
        assert!(!obj.contains_key("port"));
        assert!(!obj.contains_key("_id"));
    }

    #[test]
    fn srv_record_serializes_srv_fields() {
        let ep = endpoint("_sip._tcp.example.com", "SRV", &[], 0);
        let mut record = build_record(&ep, "10 60 5060 sip.example.com");
        pack_srv(&mut record, "10 60 5060 sip.example.com").unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["priority"], 10);
        assert_eq!(json["weight"], 60);
        assert_eq!(json["port"], 5060);
        // ttl 0 means controller default and is omitted
        assert!(json.as_object().unwrap().get("ttl").is_none());
    }

    #[test]
    fn record_deserializes_controller_response() {
        let record: DnsRecord = serde_json::from_str(
            r#"{"_id": "abc123", "enabled": true, "key": "test.example.com",
                "record_type": "A", "value": "192.168.1.1", "ttl": 300}"#,
        )
        .unwrap();
        assert_eq!(record.id, "abc123");
        assert_eq!(record.record_type, "A");
        assert_eq!(record.priority, None);
    }

    #[test]
    fn supported_types_filter() {
        assert!(is_supported("A"));
        assert!(is_supported("SRV"));
        assert!(!is_supported("SOA"));
        assert!(!is_supported("PTR"));
    }
}
