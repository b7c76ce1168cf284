use thiserror::Error;

/// Failure taxonomy for the UniFi adapter.
///
/// Callers need to tell "the controller said no" (`Api`) apart from
/// "we never reached the controller" (`Network`), so the transport never
/// collapses the two. `Data` covers local encode/decode failures and is
/// never caused by the network.
#[derive(Debug, Error)]
pub enum UnifiError {
    /// Login attempt rejected or returned a non-200 status.
    #[error("authentication failed during {operation} (status {status}): {message}")]
    Auth {
        operation: String,
        status: u16,
        message: String,
    },

    /// The HTTP call itself could not complete (DNS, TLS, connection
    /// refused, timeout, cancellation).
    #[error("network error during {operation} to {url}: {source}")]
    Network {
        operation: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The controller responded, but with a non-success status.
    #[error("API error during {operation} to {url} (status {status}): {message}")]
    Api {
        operation: String,
        url: String,
        status: u16,
        message: String,
    },

    /// Local encode/decode failure (malformed JSON, unparseable SRV value).
    #[error("data error during {operation} of {what}: {message}")]
    Data {
        operation: String,
        what: String,
        message: String,
    },

    /// Aggregate outcome of a per-record delete loop. Records that were
    /// deleted successfully stay deleted; there is no rollback.
    #[error("failed to delete {failed} of {total} matching records")]
    Delete { failed: usize, total: usize },
}

impl UnifiError {
    pub fn data(operation: &str, what: &str, err: impl std::fmt::Display) -> Self {
        Self::Data {
            operation: operation.to_string(),
            what: what.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_api(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}
