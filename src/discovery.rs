use serde::Deserialize;

use crate::Error;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// The subset of OIDC provider metadata this crate consumes: the endpoint
/// pair. Everything else in the document is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
}

/// Fetches well-known OAuth/OIDC metadata for an issuer. Issuer URLs that
/// already point at a well-known document are fetched as-is; otherwise the
/// standard suffix is appended.
pub async fn discover(http: &reqwest::Client, issuer: &str) -> Result<DiscoveryDocument, Error> {
    let url = if issuer.contains("/.well-known/") {
        issuer.to_string()
    } else {
        format!("{}{}", issuer.trim_end_matches('/'), WELL_KNOWN_PATH)
    };

    let response = http.get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(Error::InvalidResponse {
            message: format!("metadata endpoint returned status {}", status.as_u16()),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|err| Error::InvalidResponse {
        message: err.to_string(),
        body,
    })
}
