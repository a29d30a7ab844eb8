//! @acp:module "Azure Credentials"
//! @acp:summary "Token credential trait and the ambient default credential chain"
//! @acp:domain azure
//! @acp:layer infrastructure
//!
//! Tokens are acquired per call; nothing is cached.
//!
//! The default chain tries, in order:
//! 1. client secret from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`
//! 2. managed identity (App Service / Functions endpoint, else IMDS)
//! 3. the Azure CLI (`az account get-access-token`)
//!
//! A source that cannot run in this environment reports
//! [`Error::CredentialUnavailable`] and the chain moves on. Any other error
//! stops the chain.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
const CLI_TIMEOUT: Duration = Duration::from_secs(10);

/// Bearer token with its expiry
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Anything that can hand out a bearer token for a set of scopes
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

/// Convert a `.default` scope into the v1 `resource` form used by
/// managed identity and the Azure CLI.
fn scope_to_resource(scopes: &[&str]) -> Result<String> {
    match scopes {
        [scope] => Ok(scope
            .strip_suffix("/.default")
            .unwrap_or(*scope)
            .to_string()),
        _ => Err(Error::Authentication(format!(
            "expected exactly one scope, got {}",
            scopes.len()
        ))),
    }
}

fn parse_epoch(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
struct EntraTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct EntraErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Service principal authenticating with a client secret
pub struct ClientSecretCredential {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(
        http: Client,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build from the standard environment variables, if all are present
    pub fn from_env(http: Client, authority_host: &str) -> Option<Self> {
        let tenant_id = env_var("AZURE_TENANT_ID")?;
        let client_id = env_var("AZURE_CLIENT_ID")?;
        let client_secret = env_var("AZURE_CLIENT_SECRET")?;
        Some(Self::new(
            http,
            authority_host,
            tenant_id,
            client_id,
            client_secret,
        ))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let scope = scopes.join(" ");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<EntraErrorResponse>(&body) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) => body,
            };
            return Err(Error::Authentication(format!(
                "ClientSecretCredential ({}): {}",
                status, detail
            )));
        }

        let token: EntraTokenResponse = response.json().await?;
        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }
}

enum ManagedIdentitySource {
    AppService { endpoint: String, secret: String },
    Imds { endpoint: String },
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    expires_on: Value,
}

/// Managed identity of the hosting Azure compute
pub struct ManagedIdentityCredential {
    http: Client,
    source: ManagedIdentitySource,
    client_id: Option<String>,
    imds_reachable: AtomicBool,
}

impl ManagedIdentityCredential {
    /// Use the App Service / Functions identity endpoint when the host
    /// advertises one, otherwise the instance metadata service.
    pub fn from_env(http: Client) -> Self {
        let credential = match (env_var("IDENTITY_ENDPOINT"), env_var("IDENTITY_HEADER")) {
            (Some(endpoint), Some(secret)) => Self::app_service(http, endpoint, secret),
            _ => Self::imds(http, IMDS_ENDPOINT),
        };
        // User-assigned identity, if one is named
        Self {
            client_id: env_var("AZURE_CLIENT_ID"),
            ..credential
        }
    }

    pub fn app_service(
        http: Client,
        endpoint: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            source: ManagedIdentitySource::AppService {
                endpoint: endpoint.into(),
                secret: secret.into(),
            },
            client_id: None,
            imds_reachable: AtomicBool::new(false),
        }
    }

    pub fn imds(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            source: ManagedIdentitySource::Imds {
                endpoint: endpoint.into(),
            },
            client_id: None,
            imds_reachable: AtomicBool::new(false),
        }
    }

    /// Short-timeout request without the `Metadata` header. IMDS rejects it,
    /// but any HTTP answer proves the endpoint exists. Only runs until the
    /// first success.
    async fn check_imds_reachable(&self, endpoint: &str) -> Result<()> {
        if self.imds_reachable.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.http.get(endpoint).timeout(IMDS_CHECK_TIMEOUT).send().await {
            Ok(_) => {
                self.imds_reachable.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) if e.is_connect() || e.is_timeout() => Err(Error::CredentialUnavailable(
                format!("ManagedIdentityCredential: IMDS endpoint unreachable ({})", e),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_token(response: reqwest::Response) -> Result<AccessToken> {
        let body: ManagedIdentityTokenResponse = response.json().await?;
        let expires_on = parse_epoch(&body.expires_on).ok_or_else(|| {
            Error::Authentication(format!(
                "ManagedIdentityCredential: unreadable expires_on {}",
                body.expires_on
            ))
        })?;
        Ok(AccessToken {
            token: body.access_token,
            expires_on,
        })
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let resource = scope_to_resource(scopes)?;

        match &self.source {
            ManagedIdentitySource::AppService { endpoint, secret } => {
                let mut request = self
                    .http
                    .get(endpoint)
                    .query(&[
                        ("api-version", APP_SERVICE_API_VERSION),
                        ("resource", resource.as_str()),
                    ])
                    .header("X-IDENTITY-HEADER", secret);
                if let Some(ref client_id) = self.client_id {
                    request = request.query(&[("client_id", client_id.as_str())]);
                }

                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Authentication(format!(
                        "ManagedIdentityCredential ({}): {}",
                        status, body
                    )));
                }
                Self::read_token(response).await
            }
            ManagedIdentitySource::Imds { endpoint } => {
                self.check_imds_reachable(endpoint).await?;

                let mut request = self
                    .http
                    .get(endpoint)
                    .query(&[
                        ("api-version", IMDS_API_VERSION),
                        ("resource", resource.as_str()),
                    ])
                    .header("Metadata", "true");
                if let Some(ref client_id) = self.client_id {
                    request = request.query(&[("client_id", client_id.as_str())]);
                }

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(e) if e.is_connect() => {
                        return Err(Error::CredentialUnavailable(format!(
                            "ManagedIdentityCredential: IMDS endpoint unreachable ({})",
                            e
                        )));
                    }
                    Err(e) => return Err(e.into()),
                };

                let status = response.status();
                // IMDS answers 400 when no identity is assigned to the host
                if status == reqwest::StatusCode::BAD_REQUEST {
                    return Err(Error::CredentialUnavailable(
                        "ManagedIdentityCredential: no identity assigned to this host".to_string(),
                    ));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Authentication(format!(
                        "ManagedIdentityCredential ({}): {}",
                        status, body
                    )));
                }
                Self::read_token(response).await
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresOn")]
    expires_on_local: Option<String>,
    expires_on: Option<Value>,
}

/// Token from the signed-in Azure CLI user
pub struct AzureCliCredential {
    program: PathBuf,
    timeout: Duration,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        Self::with_program(program)
    }
}

impl AzureCliCredential {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: CLI_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn expiry(response: &CliTokenResponse) -> Option<DateTime<Utc>> {
        if let Some(at) = response.expires_on.as_ref().and_then(parse_epoch) {
            return Some(at);
        }
        // Older CLI versions only report local wall-clock time
        let local = response.expires_on_local.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .single()
            .map(|at| at.with_timezone(&Utc))
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let resource = scope_to_resource(scopes)?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args([
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                resource.as_str(),
            ])
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(Error::CredentialUnavailable(format!(
                    "AzureCliCredential: {} did not answer within {:?}",
                    self.program.display(),
                    self.timeout
                )));
            }
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CredentialUnavailable(format!(
                    "AzureCliCredential: {} not found",
                    self.program.display()
                )));
            }
            Ok(Err(e)) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("az login") || stderr.contains("az account set") {
                return Err(Error::CredentialUnavailable(format!(
                    "AzureCliCredential: not logged in ({})",
                    stderr
                )));
            }
            return Err(Error::Authentication(format!(
                "AzureCliCredential: {}",
                stderr
            )));
        }

        let response: CliTokenResponse = serde_json::from_slice(&output.stdout)?;
        let expires_on = Self::expiry(&response).ok_or_else(|| {
            Error::Authentication("AzureCliCredential: token has no readable expiry".to_string())
        })?;
        Ok(AccessToken {
            token: response.access_token,
            expires_on,
        })
    }
}

/// Ordered chain of credentials; the first one that yields a token wins
pub struct DefaultAzureCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl DefaultAzureCredential {
    pub fn from_env(http: Client, authority_host: &str) -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();

        match ClientSecretCredential::from_env(http.clone(), authority_host) {
            Some(credential) => sources.push(Arc::new(credential)),
            None => debug!("Client secret environment not set, skipping ClientSecretCredential"),
        }
        sources.push(Arc::new(ManagedIdentityCredential::from_env(http)));
        sources.push(Arc::new(AzureCliCredential::default()));

        Self::with_sources(sources)
    }

    pub fn with_sources(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let mut unavailable = Vec::new();

        for source in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => return Ok(token),
                Err(Error::CredentialUnavailable(reason)) => {
                    debug!("{}", reason);
                    unavailable.push(reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::CredentialChainExhausted(unavailable.join("\n")))
    }
}
