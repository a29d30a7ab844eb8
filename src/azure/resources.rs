//! @acp:module "Resource Queries"
//! @acp:summary "Read-only Azure Resource Manager client for groups and resources"
//! @acp:domain azure
//! @acp:layer infrastructure
//!
//! Thin pass-through over the ARM REST API. Every list call follows
//! `nextLink` until the listing is exhausted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::credential::{AccessToken, TokenCredential};
use crate::config::Settings;
use crate::error::{Error, Result};

pub const API_VERSION: &str = "2021-04-01";

/// Extra properties requested when listing resources
pub const RESOURCE_EXPAND: &str = "createdTime,changedTime";

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroupSummary {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSummary {
    pub name: String,
    /// Full provider type, e.g. `Microsoft.Compute/virtualMachines`
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(rename = "createdTime", default, deserialize_with = "lenient_timestamp")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(rename = "changedTime", default, deserialize_with = "lenient_timestamp")]
    pub changed_time: Option<DateTime<Utc>>,
}

/// Timestamps are informational; one that does not parse reads as absent
fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc)))
}

impl ResourceSummary {
    /// Second `/`-delimited segment of the type string
    /// (`virtualMachines` for `Microsoft.Compute/virtualMachines`).
    pub fn short_type(&self) -> Result<&str> {
        self.resource_type
            .split('/')
            .nth(1)
            .ok_or_else(|| Error::MalformedResourceType(self.resource_type.clone()))
    }
}

/// Read operations the tools need from Azure Resource Manager
#[async_trait]
pub trait ResourceQuery: Send + Sync {
    /// All resource groups in the subscription
    async fn list_resource_groups(&self) -> Result<Vec<ResourceGroupSummary>>;

    /// All resources in one resource group, with creation/change timestamps
    async fn list_by_resource_group(&self, resource_group: &str) -> Result<Vec<ResourceSummary>>;
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorResponse {
    error: ArmErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

const UNKNOWN_ERROR_CODE: &str = "UnknownError";

fn api_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ArmErrorResponse>(body) {
        Ok(parsed) => Error::Api {
            status,
            code: parsed.error.code.unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
            message: parsed.error.message.unwrap_or_default(),
        },
        Err(_) => Error::Api {
            status,
            code: UNKNOWN_ERROR_CODE.to_string(),
            message: body.to_string(),
        },
    }
}

/// ARM REST client authenticated with an injected credential
pub struct ResourceManagementClient {
    http: Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
    scope: String,
    subscription_id: Option<String>,
}

impl ResourceManagementClient {
    pub fn new(http: Client, credential: Arc<dyn TokenCredential>, settings: &Settings) -> Self {
        Self {
            http,
            credential,
            endpoint: settings.resource_manager_endpoint.clone(),
            scope: settings.management_scope(),
            subscription_id: settings.subscription_id().ok().map(str::to_string),
        }
    }

    fn subscription_id(&self) -> Result<&str> {
        self.subscription_id
            .as_deref()
            .ok_or(Error::MissingSubscription)
    }

    async fn token(&self) -> Result<AccessToken> {
        self.credential.get_token(&[self.scope.as_str()]).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::InvalidEndpoint(format!("{}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidEndpoint(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, token: &AccessToken) -> Result<T> {
        debug!("GET {}", url);
        let response = self.http.get(url).bearer_auth(&token.token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(response.json().await?)
    }

    async fn collect_pages<T: DeserializeOwned>(
        &self,
        first: Url,
        token: &AccessToken,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(url, token).await?;
            items.extend(page.value);
            next = match page.next_link {
                Some(link) => Some(
                    Url::parse(&link)
                        .map_err(|e| Error::InvalidEndpoint(format!("nextLink {}: {}", link, e)))?,
                ),
                None => None,
            };
        }

        Ok(items)
    }
}

#[async_trait]
impl ResourceQuery for ResourceManagementClient {
    async fn list_resource_groups(&self) -> Result<Vec<ResourceGroupSummary>> {
        let subscription_id = self.subscription_id()?;
        let token = self.token().await?;

        let mut url = self.url(&["subscriptions", subscription_id, "resourcegroups"])?;
        url.query_pairs_mut().append_pair("api-version", API_VERSION);

        self.collect_pages(url, &token).await
    }

    async fn list_by_resource_group(&self, resource_group: &str) -> Result<Vec<ResourceSummary>> {
        let subscription_id = self.subscription_id()?;
        let token = self.token().await?;

        let mut url = self.url(&[
            "subscriptions",
            subscription_id,
            "resourceGroups",
            resource_group,
            "resources",
        ])?;
        url.query_pairs_mut()
            .append_pair("$expand", RESOURCE_EXPAND)
            .append_pair("api-version", API_VERSION);

        self.collect_pages(url, &token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticCredential;

    #[async_trait]
    impl TokenCredential for StaticCredential {
        async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
            assert_eq!(scopes.len(), 1);
            Ok(AccessToken {
                token: "test-token".to_string(),
                expires_on: Utc::now(),
            })
        }
    }

    fn client_for(server: &MockServer, subscription: Option<&str>) -> ResourceManagementClient {
        let settings = Settings {
            subscription_id: subscription.map(str::to_string),
            resource_manager_endpoint: server.uri(),
            ..Settings::default()
        };
        ResourceManagementClient::new(Client::new(), Arc::new(StaticCredential), &settings)
    }

    fn resource(name: &str, resource_type: &str) -> ResourceSummary {
        ResourceSummary {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            created_time: None,
            changed_time: None,
        }
    }

    #[test]
    fn test_short_type() {
        let vm = resource("vm1", "Microsoft.Compute/virtualMachines");
        assert_eq!(vm.short_type().unwrap(), "virtualMachines");

        let nested = resource("db", "Microsoft.Sql/servers/databases");
        assert_eq!(nested.short_type().unwrap(), "servers");
    }

    #[test]
    fn test_short_type_malformed() {
        let bad = resource("odd", "Microsoft.Compute");
        assert!(matches!(
            bad.short_type(),
            Err(Error::MalformedResourceType(t)) if t == "Microsoft.Compute"
        ));
    }

    #[test]
    fn test_api_error_parsing() {
        let body = r#"{"error":{"code":"ResourceGroupNotFound","message":"Resource group 'x' could not be found."}}"#;
        let err = api_error(404, body);
        match err {
            Error::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "ResourceGroupNotFound");
                assert!(message.contains("could not be found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = api_error(502, "Bad Gateway");
        assert!(matches!(err, Error::Api { status: 502, ref code, .. } if code == "UnknownError"));
    }

    #[tokio::test]
    async fn test_list_resource_groups_follows_next_link() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourcegroups"))
            .and(query_param("api-version", API_VERSION))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"name": "rg-a", "location": "westeurope"}],
                "nextLink": format!(
                    "{}/subscriptions/sub-1/resourcegroups?api-version={}&%24skiptoken=page2",
                    server.uri(),
                    API_VERSION
                )
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourcegroups"))
            .and(query_param("$skiptoken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"name": "rg-b", "location": "eastus"}]
            })))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sub-1"));
        let groups = client.list_resource_groups().await.unwrap();

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["rg-a", "rg-b"]);
        assert_eq!(groups[1].location.as_deref(), Some("eastus"));
    }

    #[tokio::test]
    async fn test_list_by_resource_group_requests_expand() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourceGroups/rg-a/resources"))
            .and(query_param("$expand", RESOURCE_EXPAND))
            .and(query_param("api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {
                        "name": "vm1",
                        "type": "Microsoft.Compute/virtualMachines",
                        "createdTime": "2024-03-01T10:15:30.1234567Z",
                        "changedTime": "2024-03-02T08:00:00Z"
                    },
                    {
                        "name": "stg1",
                        "type": "Microsoft.Storage/storageAccounts"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sub-1"));
        let resources = client.list_by_resource_group("rg-a").await.unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, "vm1");
        assert!(resources[0].created_time.is_some());
        assert!(resources[0].changed_time.is_some());
        assert_eq!(resources[1].resource_type, "Microsoft.Storage/storageAccounts");
        assert!(resources[1].created_time.is_none());
    }

    #[test]
    fn test_unreadable_timestamp_reads_as_absent() {
        let parsed: ResourceSummary = serde_json::from_value(serde_json::json!({
            "name": "vm1",
            "type": "Microsoft.Compute/virtualMachines",
            "createdTime": "03/01/2024 10:15:30",
            "changedTime": 1709287200
        }))
        .unwrap();

        assert_eq!(parsed.name, "vm1");
        assert!(parsed.created_time.is_none());
        assert!(parsed.changed_time.is_none());
    }

    #[tokio::test]
    async fn test_page_without_value_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourcegroups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sub-1"));
        let groups = client.list_resource_groups().await.unwrap();
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn test_api_error_is_returned() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/resourceGroups/missing/resources"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {
                    "code": "ResourceGroupNotFound",
                    "message": "Resource group 'missing' could not be found."
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sub-1"));
        let err = client.list_by_resource_group("missing").await.unwrap_err();

        assert!(matches!(err, Error::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_missing_subscription() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);

        let err = client.list_resource_groups().await.unwrap_err();
        assert!(matches!(err, Error::MissingSubscription));
    }
}
