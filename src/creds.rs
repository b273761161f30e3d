use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{Broker, Config, Error, Provider, StoredToken};

const CREDS_PATH_PREFIX: &str = "creds/";

/// Word characters plus a conservative set of punctuation that is safe in
/// storage paths and URLs; separators may not lead or trail.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w(?:[\w.@~!_,:^-]*\w)?$").expect("credential name pattern"));

/// Hashes the name and splits the digest into nested path segments to bound
/// directory fan-out in the storage backend. Sharding, not security.
pub(crate) fn cred_key(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    format!(
        "{}{}/{}/{}",
        CREDS_PATH_PREFIX,
        hex::encode(&digest[..2]),
        hex::encode(&digest[2..4]),
        hex::encode(&digest[4..]),
    )
}

fn validate_name(name: &str) -> Result<(), Error> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidCredentialName(name.to_string()))
    }
}

/// Outcome of reading a credential. Conditions a caller can act on are
/// statuses, not errors; transport and storage faults surface as [`Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    /// No provider configuration is active.
    NotConfigured,
    /// The provider rejected the stored client credentials while minting a
    /// client-credentials token.
    InvalidClientCredentials,
    /// No record exists under this name (3-legged providers only).
    Absent,
    /// A usable access token.
    Current(StoredToken),
    /// The stored token is stale and no refresh token is available. The
    /// caller decides whether to re-initiate authorization.
    Expired(StoredToken),
}

/// Inputs for creating or replacing a credential: exactly one of `code` and
/// `refresh_token`.
#[derive(Debug, Clone, Default)]
pub struct WriteCredential {
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    pub redirect_url: Option<String>,
}

impl Broker {
    /// Returns the current access token for a named credential, refreshing or
    /// minting as needed.
    ///
    /// A still-valid record returns immediately with no lock and no network
    /// call. For 2-legged providers a missing or stale record mints a fresh
    /// token via the client-credentials grant, honoring `scopes` when given.
    /// For 3-legged providers a stale record with a refresh token triggers a
    /// single refresh; a refresh failure leaves the record untouched so the
    /// refresh token survives for a later retry.
    pub async fn credential(
        &self,
        name: &str,
        scopes: Option<&[String]>,
    ) -> Result<CredentialStatus, Error> {
        validate_name(name)?;
        let Some((config, provider)) = self.provider().await? else {
            return Ok(CredentialStatus::NotConfigured);
        };
        let key = cred_key(name);

        match self.read_token(&key).await? {
            Some(token) if token.is_valid() => return Ok(CredentialStatus::Current(token)),
            Some(_) => {}
            None if provider.is_authorization_required() => {
                return Ok(CredentialStatus::Absent);
            }
            None => {}
        }

        self.refresh_credential(&key, &config, provider.as_ref(), scopes)
            .await
    }

    /// Exchanges an authorization code or an externally obtained refresh
    /// token and persists the resulting record. Provider-level rejections
    /// come back as [`Error::InvalidCode`] / [`Error::InvalidRefreshToken`];
    /// nothing is persisted in that case.
    pub async fn write_credential(&self, name: &str, request: WriteCredential) -> Result<(), Error> {
        validate_name(name)?;
        let Some((config, provider)) = self.provider().await? else {
            return Err(Error::NotConfigured);
        };
        if !provider.is_authorization_required() {
            return Err(Error::AuthorizationNotRequired);
        }

        let builder = provider
            .exchange_builder(&config.client_id, &config.client_secret)
            .with_http_client(self.http().clone());

        let response = match (request.code, request.refresh_token) {
            (Some(_), Some(_)) => return Err(Error::CodeAndRefreshToken),
            (None, None) => return Err(Error::MissingCodeOrRefreshToken),
            (Some(code), None) => {
                let mut builder = builder;
                if let Some(redirect_url) = request.redirect_url {
                    builder = builder.with_redirect_url(redirect_url);
                }
                match builder.build().exchange_code(&code).await {
                    Ok(response) => response,
                    Err(Error::Rejected { code, description }) => {
                        tracing::warn!(error = %code, ?description, "invalid code");
                        return Err(Error::InvalidCode);
                    }
                    Err(err) => return Err(err),
                }
            }
            (None, Some(refresh_token)) => {
                match builder.build().refresh(&refresh_token).await {
                    Ok(response) => response,
                    Err(Error::Rejected { code, description }) => {
                        tracing::warn!(error = %code, ?description, "invalid refresh_token");
                        return Err(Error::InvalidRefreshToken);
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        let token = response.into_stored(Utc::now());
        let _guard = self.cred_lock.lock().await;
        self.put_token(&cred_key(name), &token).await
    }

    /// Removes a credential record. Deleting a nonexistent credential is not
    /// an error.
    pub async fn delete_credential(&self, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        let _guard = self.cred_lock.lock().await;
        self.storage()
            .delete(&cred_key(name))
            .await
            .map_err(Error::Storage)
    }

    async fn refresh_credential(
        &self,
        key: &str,
        config: &Config,
        provider: &dyn Provider,
        scopes: Option<&[String]>,
    ) -> Result<CredentialStatus, Error> {
        let _guard = self.cred_lock.lock().await;

        // Re-read under the lock; a concurrent refresh may already have won.
        match self.read_token(key).await? {
            Some(token) if token.is_valid() => Ok(CredentialStatus::Current(token)),
            Some(token) => match token.refresh_token.clone() {
                Some(refresh_token) => {
                    tracing::debug!("refreshing expired access token");
                    let response = provider
                        .exchange_builder(&config.client_id, &config.client_secret)
                        .with_http_client(self.http().clone())
                        .build()
                        .refresh(&refresh_token)
                        .await?;

                    let mut renewed = response.into_stored(Utc::now());
                    // Providers may rotate the refresh token; keep ours if
                    // this one did not.
                    if renewed.refresh_token.is_none() {
                        renewed.refresh_token = Some(refresh_token);
                    }
                    self.put_token(key, &renewed).await?;
                    Ok(CredentialStatus::Current(renewed))
                }
                None if provider.is_authorization_required() => {
                    Ok(CredentialStatus::Expired(token))
                }
                None => self.mint_token(key, config, provider, scopes).await,
            },
            None if provider.is_authorization_required() => Ok(CredentialStatus::Absent),
            None => self.mint_token(key, config, provider, scopes).await,
        }
    }

    /// 2-legged creation-on-read: fetch a token via the client-credentials
    /// grant and persist it.
    async fn mint_token(
        &self,
        key: &str,
        config: &Config,
        provider: &dyn Provider,
        scopes: Option<&[String]>,
    ) -> Result<CredentialStatus, Error> {
        tracing::debug!("minting client-credentials token");
        let mut builder = provider
            .token_builder(&config.client_id, &config.client_secret)?
            .with_http_client(self.http().clone());
        if let Some(scopes) = scopes {
            builder = builder.with_scopes(scopes.to_vec());
        }

        match builder.build().token().await {
            Ok(response) => {
                let token = response.into_stored(Utc::now());
                self.put_token(key, &token).await?;
                Ok(CredentialStatus::Current(token))
            }
            Err(Error::Rejected { code, description }) => {
                tracing::warn!(error = %code, ?description, "invalid client credentials");
                Ok(CredentialStatus::InvalidClientCredentials)
            }
            Err(err) => Err(err),
        }
    }

    async fn read_token(&self, key: &str) -> Result<Option<StoredToken>, Error> {
        let Some(bytes) = self.storage().get(key).await.map_err(Error::Storage)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn put_token(&self, key: &str, token: &StoredToken) -> Result<(), Error> {
        let bytes = serde_json::to_vec(token)?;
        self.storage().put(key, bytes).await.map_err(Error::Storage)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::registry::LATEST_VERSION;
    use crate::{MemoryStorage, Storage, standard_registry};

    fn token_body(access_token: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt-next",
        })
    }

    fn broker() -> (Broker, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let broker = Broker::new(storage.clone() as Arc<dyn Storage>, standard_registry())
            .expect("client construction");
        (broker, storage)
    }

    async fn configure(broker: &Broker, provider: &str, token_url: &str) {
        let mut provider_options =
            HashMap::from([("token_url".to_string(), token_url.to_string())]);
        if provider == "custom" {
            provider_options.insert(
                "auth_code_url".to_string(),
                "https://example.com/authorize".to_string(),
            );
        }
        broker
            .write_config(Config {
                provider: provider.to_string(),
                provider_version: LATEST_VERSION,
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                provider_options,
                auth_url_params: HashMap::new(),
            })
            .await
            .expect("config write");
    }

    async fn seed_token(broker: &Broker, name: &str, token: &StoredToken) {
        broker.put_token(&cred_key(name), token).await.unwrap();
    }

    fn expired_token(refresh_token: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "stale".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expiry: Some(Utc::now() - Duration::hours(1)),
        }
    }

    #[test]
    fn keys_are_deterministic_sharded_and_distinct() {
        let key = cred_key("my-credential");
        assert_eq!(key, cred_key("my-credential"));
        assert_ne!(key, cred_key("my-credential2"));

        let segments: Vec<_> = key.split('/').collect();
        assert_eq!(segments[0], "creds");
        assert_eq!(segments[1].len(), 4);
        assert_eq!(segments[2].len(), 4);
        assert_eq!(segments[3].len(), 56);
    }

    #[test]
    fn name_validation_accepts_conservative_charset() {
        for name in ["a", "alice", "svc@prod", "a.b~c!d,e:f^g-h", "x_1"] {
            assert!(validate_name(name).is_ok(), "expected {name:?} to be valid");
        }
        for name in ["", "-leading", "trailing-", "has space", "slash/y", "a\nb"] {
            assert!(
                matches!(validate_name(name), Err(Error::InvalidCredentialName(_))),
                "expected {name:?} to be invalid"
            );
        }
    }

    #[tokio::test]
    async fn read_without_config_reports_not_configured() {
        let (broker, _) = broker();
        let status = broker.credential("a", None).await.unwrap();
        assert_eq!(status, CredentialStatus::NotConfigured);
    }

    #[tokio::test]
    async fn three_legged_read_before_write_is_absent_without_network() {
        // No mock server at all: any network call would error out.
        let (broker, _) = broker();
        configure(&broker, "custom", "https://unreachable.invalid/token").await;
        let status = broker.credential("a", None).await.unwrap();
        assert_eq!(status, CredentialStatus::Absent);
    }

    #[tokio::test]
    async fn two_legged_read_mints_once_then_serves_from_store() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "minted",
                "token_type": "bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(
            &broker,
            "custom_client_credentials",
            &format!("{}/token", server.uri()),
        )
        .await;

        let scopes = vec!["read".to_string()];
        for _ in 0..2 {
            let status = broker.credential("a", Some(&scopes)).await.unwrap();
            match status {
                CredentialStatus::Current(token) => assert_eq!(token.access_token, "minted"),
                other => panic!("expected current token, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn two_legged_rejection_is_invalid_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": "invalid_client"})),
            )
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(
            &broker,
            "custom_client_credentials",
            &format!("{}/token", server.uri()),
        )
        .await;

        let status = broker.credential("a", None).await.unwrap();
        assert_eq!(status, CredentialStatus::InvalidClientCredentials);
    }

    #[tokio::test]
    async fn expired_record_refreshes_once_and_rotates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;
        let stale = expired_token(Some("rt-old"));
        seed_token(&broker, "a", &stale).await;

        let status = broker.credential("a", None).await.unwrap();
        let token = match status {
            CredentialStatus::Current(token) => token,
            other => panic!("expected current token, got {other:?}"),
        };
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("rt-next"));
        assert!(token.expiry.unwrap() > stale.expiry.unwrap());

        // Second read is served from the store.
        let status = broker.credential("a", None).await.unwrap();
        assert!(matches!(status, CredentialStatus::Current(_)));
    }

    #[tokio::test]
    async fn refresh_response_without_rotation_keeps_old_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "token_type": "bearer",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;
        seed_token(&broker, "a", &expired_token(Some("rt-old"))).await;

        let status = broker.credential("a", None).await.unwrap();
        match status {
            CredentialStatus::Current(token) => {
                assert_eq!(token.refresh_token.as_deref(), Some("rt-old"));
            }
            other => panic!("expected current token, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_failure_leaves_record_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;
        let stale = expired_token(Some("rt-old"));
        seed_token(&broker, "a", &stale).await;

        let err = broker.credential("a", None).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));

        let kept = broker.read_token(&cred_key("a")).await.unwrap().unwrap();
        assert_eq!(kept, stale);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_marked_expired() {
        let (broker, _) = broker();
        configure(&broker, "custom", "https://unreachable.invalid/token").await;
        let stale = expired_token(None);
        seed_token(&broker, "a", &stale).await;

        let status = broker.credential("a", None).await.unwrap();
        match status {
            CredentialStatus::Expired(token) => assert_eq!(token.access_token, "stale"),
            other => panic!("expected expired status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_exchanges_code_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("granted")))
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;

        broker
            .write_credential(
                "a",
                WriteCredential {
                    code: Some("abc123".to_string()),
                    redirect_url: Some("https://app.example.com/callback".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let status = broker.credential("a", None).await.unwrap();
        match status {
            CredentialStatus::Current(token) => assert_eq!(token.access_token, "granted"),
            other => panic!("expected current token, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_code_is_a_diagnostic_and_persists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;

        let err = broker
            .write_credential(
                "a",
                WriteCredential {
                    code: Some("bogus".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCode));
        assert!(err.is_user_error());

        assert_eq!(broker.credential("a", None).await.unwrap(), CredentialStatus::Absent);
    }

    #[tokio::test]
    async fn write_accepts_external_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-ext"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("granted")))
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;

        broker
            .write_credential(
                "a",
                WriteCredential {
                    refresh_token: Some("rt-ext".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn write_input_validation() {
        let (broker, _) = broker();
        configure(&broker, "custom", "https://unreachable.invalid/token").await;

        let err = broker
            .write_credential(
                "a",
                WriteCredential {
                    code: Some("x".to_string()),
                    refresh_token: Some("y".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CodeAndRefreshToken));

        let err = broker
            .write_credential("a", WriteCredential::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCodeOrRefreshToken));

        let err = broker
            .write_credential("bad name", WriteCredential::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentialName(_)));
    }

    #[tokio::test]
    async fn write_is_unsupported_for_two_legged_providers() {
        let (broker, _) = broker();
        configure(
            &broker,
            "custom_client_credentials",
            "https://unreachable.invalid/token",
        )
        .await;

        let err = broker
            .write_credential(
                "a",
                WriteCredential {
                    code: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthorizationNotRequired));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (broker, _) = broker();
        broker.delete_credential("a").await.unwrap();
        broker.delete_credential("a").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_refreshes_make_one_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("fresh"))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (broker, _) = broker();
        configure(&broker, "custom", &format!("{}/token", server.uri())).await;
        seed_token(&broker, "a", &expired_token(Some("rt-old"))).await;

        let broker = Arc::new(broker);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move {
                broker.credential("a", None).await
            }));
        }
        for handle in handles {
            let status = handle.await.unwrap().unwrap();
            match status {
                CredentialStatus::Current(token) => assert_eq!(token.access_token, "fresh"),
                other => panic!("expected current token, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn config_delete_blocks_future_reads_but_not_stored_records() {
        let (broker, storage) = broker();
        configure(&broker, "custom", "https://unreachable.invalid/token").await;
        seed_token(&broker, "a", &expired_token(Some("rt-old"))).await;

        broker.delete_config().await.unwrap();
        let status = broker.credential("a", None).await.unwrap();
        assert_eq!(status, CredentialStatus::NotConfigured);

        // The record itself is untouched.
        assert!(storage.get(&cred_key("a")).await.unwrap().is_some());
    }
}
