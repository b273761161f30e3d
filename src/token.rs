use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens reported as expiring within this window are treated as already
/// expired, so a caller never receives a token that dies mid-flight.
const EXPIRY_LEEWAY_SECS: i64 = 10;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Raw token endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenResponse {
    /// Converts a wire response into a persistable record. `expires_in` is
    /// relative to the moment the response was received, so the caller passes
    /// that instant in.
    pub fn into_stored(self, received_at: DateTime<Utc>) -> StoredToken {
        let expiry = self
            .expires_in
            .map(|secs| received_at + Duration::seconds(secs as i64));
        StoredToken {
            access_token: self.access_token,
            token_type: self
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            refresh_token: self.refresh_token,
            expiry,
        }
    }
}

/// One persisted credential record. `expiry` of `None` means the token never
/// expires. The refresh token is absent for client-credentials grants and for
/// providers that do not issue one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            None => true,
            Some(expiry) => expiry - Duration::seconds(EXPIRY_LEEWAY_SECS) > now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
