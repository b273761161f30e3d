use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, header};
use serde::Deserialize;
use url::Url;
use url::form_urlencoded;

use crate::{AuthStyle, Endpoint, Error, TokenResponse};

const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_REFRESH_TOKEN: &str = "refresh_token";
const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Builds the URL a resource owner is redirected to in an authorization-code
/// flow. Parameters set later overwrite earlier ones with the same key.
#[derive(Debug, Clone)]
pub struct AuthCodeUrlBuilder {
    endpoint: Endpoint,
    client_id: String,
    redirect_url: Option<String>,
    scopes: Vec<String>,
    params: Vec<(String, String)>,
}

impl AuthCodeUrlBuilder {
    pub(crate) fn new(endpoint: Endpoint, client_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            redirect_url: None,
            scopes: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_param(&mut self.params, &key.into(), value.into());
        self
    }

    pub fn build(self, state: &str) -> Result<String, Error> {
        let mut url = Url::parse(&self.endpoint.auth_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("response_type", "code");
            pairs.append_pair("client_id", &self.client_id);
            if let Some(redirect_url) = &self.redirect_url {
                pairs.append_pair("redirect_uri", redirect_url);
            }
            if !self.scopes.is_empty() {
                pairs.append_pair("scope", &self.scopes.join(" "));
            }
            pairs.append_pair("state", state);
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }
}

/// Builder for code and refresh-token exchanges against a provider's token
/// endpoint.
#[derive(Debug, Clone)]
pub struct ExchangeBuilder {
    endpoint: Endpoint,
    client_id: String,
    client_secret: String,
    redirect_url: Option<String>,
    http: Option<Client>,
}

impl ExchangeBuilder {
    pub(crate) fn new(
        endpoint: Endpoint,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: None,
            http: None,
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Exchange {
        Exchange {
            endpoint: self.endpoint,
            client_id: self.client_id,
            client_secret: self.client_secret,
            redirect_url: self.redirect_url,
            http: self.http.unwrap_or_default(),
        }
    }
}

/// Exchanges authorization codes or refresh tokens for tokens.
#[derive(Debug, Clone)]
pub struct Exchange {
    endpoint: Endpoint,
    client_id: String,
    client_secret: String,
    redirect_url: Option<String>,
    http: Client,
}

impl Exchange {
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, Error> {
        let mut params = vec![
            ("grant_type".to_string(), GRANT_AUTHORIZATION_CODE.to_string()),
            ("code".to_string(), code.to_string()),
        ];
        if let Some(redirect_url) = &self.redirect_url {
            params.push(("redirect_uri".to_string(), redirect_url.clone()));
        }
        request_token(
            &self.http,
            &self.endpoint.token_url,
            self.endpoint.auth_style,
            &self.client_id,
            &self.client_secret,
            params,
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = vec![
            ("grant_type".to_string(), GRANT_REFRESH_TOKEN.to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];
        request_token(
            &self.http,
            &self.endpoint.token_url,
            self.endpoint.auth_style,
            &self.client_id,
            &self.client_secret,
            params,
        )
        .await
    }
}

/// Builder for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    token_url: String,
    auth_style: AuthStyle,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    http: Option<Client>,
}

impl TokenBuilder {
    pub(crate) fn new(
        endpoint: &Endpoint,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: endpoint.token_url.clone(),
            auth_style: endpoint.auth_style,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Vec::new(),
            http: None,
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> ClientCredentials {
        ClientCredentials {
            token_url: self.token_url,
            auth_style: self.auth_style,
            client_id: self.client_id,
            client_secret: self.client_secret,
            scopes: self.scopes,
            http: self.http.unwrap_or_default(),
        }
    }
}

/// Fetches tokens via the client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    token_url: String,
    auth_style: AuthStyle,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    http: Client,
}

impl ClientCredentials {
    pub async fn token(&self) -> Result<TokenResponse, Error> {
        let mut params = vec![(
            "grant_type".to_string(),
            GRANT_CLIENT_CREDENTIALS.to_string(),
        )];
        if !self.scopes.is_empty() {
            params.push(("scope".to_string(), self.scopes.join(" ")));
        }
        request_token(
            &self.http,
            &self.token_url,
            self.auth_style,
            &self.client_id,
            &self.client_secret,
            params,
        )
        .await
    }
}

async fn request_token(
    http: &Client,
    token_url: &str,
    auth_style: AuthStyle,
    client_id: &str,
    client_secret: &str,
    params: Vec<(String, String)>,
) -> Result<TokenResponse, Error> {
    match auth_style {
        AuthStyle::InHeader => {
            send_token_request(http, token_url, Some((client_id, client_secret)), params).await
        }
        AuthStyle::InParams => {
            send_token_request(http, token_url, None, with_credentials(params, client_id, client_secret))
                .await
        }
        AuthStyle::Auto => {
            // Probe with header auth; some providers only read body fields.
            let attempt =
                send_token_request(http, token_url, Some((client_id, client_secret)), params.clone())
                    .await;
            match attempt {
                Err(Error::Rejected { .. }) => {
                    send_token_request(
                        http,
                        token_url,
                        None,
                        with_credentials(params, client_id, client_secret),
                    )
                    .await
                }
                other => other,
            }
        }
    }
}

fn with_credentials(
    mut params: Vec<(String, String)>,
    client_id: &str,
    client_secret: &str,
) -> Vec<(String, String)> {
    params.push(("client_id".to_string(), client_id.to_string()));
    params.push(("client_secret".to_string(), client_secret.to_string()));
    params
}

async fn send_token_request(
    http: &Client,
    token_url: &str,
    basic_auth: Option<(&str, &str)>,
    params: Vec<(String, String)>,
) -> Result<TokenResponse, Error> {
    let mut builder = http
        .post(token_url)
        .header(header::ACCEPT, "application/json");
    if let Some((client_id, client_secret)) = basic_auth {
        builder = builder.header(
            header::AUTHORIZATION,
            basic_auth_header(client_id, client_secret),
        );
    }

    let response = builder.form(&params).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(rejection(status.as_u16(), &body));
    }

    let token: TokenResponse =
        serde_json::from_str(&body).map_err(|err| Error::InvalidResponse {
            message: err.to_string(),
            body: body.clone(),
        })?;
    if token.access_token.is_empty() {
        return Err(Error::InvalidResponse {
            message: "server response missing access_token".to_string(),
            body,
        });
    }
    Ok(token)
}

/// RFC 6749 section 2.3.1: both values are form-urlencoded before being
/// joined and base64-encoded.
fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let client_id: String = form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
    let client_secret: String =
        form_urlencoded::byte_serialize(client_secret.as_bytes()).collect();
    format!(
        "Basic {}",
        STANDARD.encode(format!("{client_id}:{client_secret}"))
    )
}

fn rejection(status: u16, body: &str) -> Error {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: Option<String>,
        error_description: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
        if let Some(code) = parsed.error {
            return Error::Rejected {
                code,
                description: parsed.error_description,
            };
        }
    }

    let excerpt: String = body.trim().chars().take(256).collect();
    Error::Rejected {
        code: format!("http_status_{status}"),
        description: (!excerpt.is_empty()).then_some(excerpt),
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    if let Some((_, existing)) = params.iter_mut().find(|(param, _)| param == key) {
        *existing = value;
    } else {
        params.push((key.to_string(), value));
    }
}
