//! `ArmClient` speaks the Azure Resource Manager REST API for the handful of resource types the
//! deployment creates, plus the two data-plane calls it needs (blob upload and zip deploy).

use super::wait::{self, PollSettings};
use super::{error, CloudApi, ResourceGroup, Result, SubscriptionInfo, REGISTERED};
use crate::auth::AccessTokens;
use crate::shared::{printable_string, Secret};
use async_trait::async_trait;
use deploysys_config::CloudConfig;
use http::StatusCode;
use log::{debug, info, trace};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use url::Url;

const RESOURCES_API_VERSION: &str = "2021-04-01";
const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";
const STORAGE_API_VERSION: &str = "2023-01-01";
const COGNITIVE_API_VERSION: &str = "2023-05-01";
const SEARCH_API_VERSION: &str = "2020-08-01";
const INSIGHTS_API_VERSION: &str = "2020-02-02";
const WEB_API_VERSION: &str = "2022-03-01";
const BLOB_SERVICE_VERSION: &str = "2021-08-06";

const STORAGE_SKU: &str = "Standard_LRS";
const COGNITIVE_KIND: &str = "CognitiveServices";
const COGNITIVE_SKU: &str = "S0";
const SEARCH_REPLICAS: u32 = 1;
const SEARCH_PARTITIONS: u32 = 1;
const PLAN_SKU: &str = "S1";
const PLAN_TIER: &str = "Standard";
const PLAN_WORKERS: u32 = 1;

pub(crate) struct ArmClient {
    client: Client,
    cloud: CloudConfig,
    subscription: String,
    tokens: AccessTokens,
    poll: PollSettings,
}

impl ArmClient {
    pub(crate) fn new(cloud: CloudConfig, subscription: &str, tokens: AccessTokens) -> Self {
        Self {
            client: Client::new(),
            cloud,
            subscription: subscription.to_string(),
            tokens,
            poll: PollSettings::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// `{management}/subscriptions/{subscription}{path}`
    fn subscription_url(&self, path: &str) -> String {
        format!(
            "{}/subscriptions/{}{}",
            self.cloud.management_endpoint.trim_end_matches('/'),
            self.subscription,
            path
        )
    }

    fn provider_url(&self, namespace: &str) -> String {
        self.subscription_url(&format!(
            "/providers/{}?api-version={}",
            namespace, RESOURCES_API_VERSION
        ))
    }

    fn resource_url(&self, resource_group: &str, provider_path: &str, api_version: &str) -> String {
        self.subscription_url(&format!(
            "/resourceGroups/{}/providers/{}?api-version={}",
            resource_group, provider_path, api_version
        ))
    }

    /// Sends a request and returns the status and body, whatever the status is.
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: &Secret,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        debug!("Requesting {} {}", method, uri);
        let mut request = self
            .client
            .request(method.clone(), uri)
            .bearer_auth(token.expose());
        request = match body {
            Some(body) => request.json(body),
            // The management API wants a Content-Length on bodiless POSTs.
            None if method == Method::POST => request.body(Vec::new()),
            None => request,
        };
        let response = request.send().await.context(error::RequestSnafu {
            method: method.as_str(),
            uri,
        })?;
        let code = response.status();
        let response_body = response
            .bytes()
            .await
            .context(error::ResponseBodySnafu {
                method: method.as_str(),
                uri,
                code,
            })?
            .to_vec();
        trace!("{} {} returned {}", method, uri, code);
        Ok((code, response_body))
    }

    /// Sends a management request and fails on any non-2xx response.
    async fn send_management(
        &self,
        method: Method,
        uri: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let (code, response_body) = self
            .send(method.clone(), uri, &self.tokens.management, body)
            .await?;
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                method: method.as_str(),
                uri,
                code,
                response_body: printable_string(&response_body),
            }
        );
        parse_body(uri, &response_body)
    }

    /// GETs a management resource, returning `None` on 404.
    pub(super) async fn get_json(&self, uri: &str) -> Result<Option<Value>> {
        let (code, response_body) = self
            .send(Method::GET, uri, &self.tokens.management, None)
            .await?;
        if code == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                method: "GET",
                uri,
                code,
                response_body: printable_string(&response_body),
            }
        );
        parse_body(uri, &response_body).map(Some)
    }

    /// PUTs a resource definition, then waits until the resource reports it has finished
    /// provisioning.
    async fn put_and_wait(&self, uri: &str, body: &Value, resource: &str) -> Result<Value> {
        let (code, response_body) = self
            .send(Method::PUT, uri, &self.tokens.management, Some(body))
            .await?;
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                method: "PUT",
                uri,
                code,
                response_body: printable_string(&response_body),
            }
        );
        let created = parse_body(uri, &response_body)?;
        if code == StatusCode::ACCEPTED {
            return wait::wait_for_provisioning(self, uri, resource, &self.poll).await;
        }
        match wait::provisioning_state(&created) {
            None => Ok(created),
            Some(state) if wait::is_succeeded(state) => Ok(created),
            Some(state) if wait::is_failed(state) => error::ProvisioningFailedSnafu {
                resource,
                state,
            }
            .fail(),
            Some(_) => wait::wait_for_provisioning(self, uri, resource, &self.poll).await,
        }
    }
}

fn parse_body(uri: &str, body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).context(error::SerdeSnafu { uri })
}

fn string_field(value: &Value, pointer: &str, uri: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .context(error::MissingFieldSnafu {
            uri,
            field: pointer,
        })
}

/// Appends `container` and each `/`-separated piece of `blob_name` to the blob endpoint, escaping
/// as needed.
fn blob_url(endpoint: &str, container: &str, blob_name: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint).context(error::InvalidUrlSnafu { url: endpoint })?;
    url.path_segments_mut()
        .ok()
        .context(error::BaseUrlSnafu { url: endpoint })?
        .pop_if_empty()
        .push(container)
        .extend(blob_name.split('/'));
    Ok(url)
}

#[async_trait]
impl CloudApi for ArmClient {
    async fn subscription(&self) -> Result<SubscriptionInfo> {
        let uri = self.subscription_url(&format!("?api-version={}", SUBSCRIPTIONS_API_VERSION));
        let subscription = self.send_management(Method::GET, &uri, None).await?;
        Ok(SubscriptionInfo {
            id: string_field(&subscription, "/subscriptionId", &uri)?,
            display_name: string_field(&subscription, "/displayName", &uri)?,
            state: string_field(&subscription, "/state", &uri)?,
        })
    }

    async fn provider_state(&self, namespace: &str) -> Result<String> {
        let uri = self.provider_url(namespace);
        let provider = self.send_management(Method::GET, &uri, None).await?;
        string_field(&provider, "/registrationState", &uri)
    }

    async fn register_provider(&self, namespace: &str) -> Result<()> {
        let uri = self.subscription_url(&format!(
            "/providers/{}/register?api-version={}",
            namespace, RESOURCES_API_VERSION
        ));
        let provider = self.send_management(Method::POST, &uri, None).await?;
        let state = provider
            .get("registrationState")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if state.eq_ignore_ascii_case(REGISTERED) {
            return Ok(());
        }
        wait::wait_for_registration(self, &self.provider_url(namespace), namespace, &self.poll)
            .await
    }

    async fn resource_group(&self, name: &str) -> Result<Option<ResourceGroup>> {
        let uri = self.subscription_url(&format!(
            "/resourcegroups/{}?api-version={}",
            name, RESOURCES_API_VERSION
        ));
        match self.get_json(&uri).await? {
            Some(group) => Ok(Some(ResourceGroup {
                name: name.to_string(),
                location: string_field(&group, "/location", &uri)?,
            })),
            None => Ok(None),
        }
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<()> {
        let uri = self.subscription_url(&format!(
            "/resourcegroups/{}?api-version={}",
            name, RESOURCES_API_VERSION
        ));
        self.put_and_wait(&uri, &json!({ "location": location }), name)
            .await?;
        Ok(())
    }

    async fn create_storage_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.Storage/storageAccounts/{}", name),
            STORAGE_API_VERSION,
        );
        let body = json!({
            "location": location,
            "kind": "StorageV2",
            "sku": { "name": STORAGE_SKU },
            "properties": {
                "allowSharedKeyAccess": false,
                "allowBlobPublicAccess": false,
                "minimumTlsVersion": "TLS1_2",
                "supportsHttpsTrafficOnly": true
            }
        });
        self.put_and_wait(&uri, &body, name).await?;
        Ok(())
    }

    async fn create_blob_container(
        &self,
        resource_group: &str,
        account: &str,
        container: &str,
    ) -> Result<()> {
        let uri = self.resource_url(
            resource_group,
            &format!(
                "Microsoft.Storage/storageAccounts/{}/blobServices/default/containers/{}",
                account, container
            ),
            STORAGE_API_VERSION,
        );
        let body = json!({ "properties": { "publicAccess": "None" } });
        self.send_management(Method::PUT, &uri, Some(&body)).await?;
        Ok(())
    }

    async fn upload_blob(
        &self,
        account: &str,
        container: &str,
        blob_name: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<()> {
        let endpoint = self.cloud.blob_url(account);
        let url = blob_url(&endpoint, container, blob_name)?;
        let uri = url.to_string();
        debug!("Uploading {} bytes to {}", body.len(), uri);
        let response = self
            .client
            .put(url)
            .bearer_auth(self.tokens.storage.expose())
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", BLOB_SERVICE_VERSION)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .context(error::RequestSnafu {
                method: "PUT",
                uri: &uri,
            })?;
        let code = response.status();
        if !code.is_success() {
            let response_body = response.bytes().await.context(error::ResponseBodySnafu {
                method: "PUT",
                uri: &uri,
                code,
            })?;
            return error::ResponseSnafu {
                method: "PUT",
                uri,
                code,
                response_body: printable_string(&response_body),
            }
            .fail();
        }
        Ok(())
    }

    async fn create_cognitive_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.CognitiveServices/accounts/{}", name),
            COGNITIVE_API_VERSION,
        );
        let body = json!({
            "location": location,
            "kind": COGNITIVE_KIND,
            "sku": { "name": COGNITIVE_SKU },
            "properties": {}
        });
        self.put_and_wait(&uri, &body, name).await?;
        Ok(())
    }

    async fn cognitive_key(&self, resource_group: &str, name: &str) -> Result<String> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.CognitiveServices/accounts/{}/listKeys", name),
            COGNITIVE_API_VERSION,
        );
        let keys = self.send_management(Method::POST, &uri, None).await?;
        string_field(&keys, "/key1", &uri)
    }

    async fn create_search_service(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
        sku: &str,
    ) -> Result<()> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.Search/searchServices/{}", name),
            SEARCH_API_VERSION,
        );
        let body = json!({
            "location": location,
            "sku": { "name": sku },
            "properties": {
                "replicaCount": SEARCH_REPLICAS,
                "partitionCount": SEARCH_PARTITIONS,
                "hostingMode": "default"
            }
        });
        self.put_and_wait(&uri, &body, name).await?;
        Ok(())
    }

    async fn search_admin_key(&self, resource_group: &str, name: &str) -> Result<String> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.Search/searchServices/{}/listAdminKeys", name),
            SEARCH_API_VERSION,
        );
        let keys = self.send_management(Method::POST, &uri, None).await?;
        string_field(&keys, "/primaryKey", &uri)
    }

    async fn create_app_insights(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<String> {
        let uri = self.resource_url(
            resource_group,
            &format!("microsoft.insights/components/{}", name),
            INSIGHTS_API_VERSION,
        );
        let body = json!({
            "location": location,
            "kind": "web",
            "properties": { "Application_Type": "web" }
        });
        let component = self.put_and_wait(&uri, &body, name).await?;
        string_field(&component, "/properties/InstrumentationKey", &uri)
    }

    async fn create_app_service_plan(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<String> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.Web/serverfarms/{}", name),
            WEB_API_VERSION,
        );
        let body = json!({
            "location": location,
            "kind": "app",
            "sku": { "name": PLAN_SKU, "tier": PLAN_TIER, "capacity": PLAN_WORKERS }
        });
        let plan = self.put_and_wait(&uri, &body, name).await?;
        Ok(plan
            .pointer("/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/serverfarms/{}",
                    self.subscription, resource_group, name
                )
            }))
    }

    async fn create_web_app(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
        plan_id: &str,
    ) -> Result<()> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.Web/sites/{}", name),
            WEB_API_VERSION,
        );
        let body = json!({
            "location": location,
            "kind": "app",
            "properties": { "serverFarmId": plan_id, "httpsOnly": true }
        });
        self.put_and_wait(&uri, &body, name).await?;
        Ok(())
    }

    async fn set_app_settings(
        &self,
        resource_group: &str,
        name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<()> {
        let uri = self.resource_url(
            resource_group,
            &format!("Microsoft.Web/sites/{}/config/appsettings", name),
            WEB_API_VERSION,
        );
        let body = json!({ "properties": settings });
        self.send_management(Method::PUT, &uri, Some(&body)).await?;
        Ok(())
    }

    async fn publish_web_app(&self, name: &str, archive: Vec<u8>) -> Result<()> {
        let uri = format!("{}/api/zipdeploy", self.cloud.scm_url(name));
        info!("Uploading {} byte archive to {}", archive.len(), uri);
        let response = self
            .client
            .post(&uri)
            .bearer_auth(self.tokens.management.expose())
            .header(http::header::CONTENT_TYPE, "application/zip")
            .body(archive)
            .send()
            .await
            .context(error::RequestSnafu {
                method: "POST",
                uri: &uri,
            })?;
        let code = response.status();
        let response_body = response
            .bytes()
            .await
            .context(error::ResponseBodySnafu {
                method: "POST",
                uri: &uri,
                code,
            })?
            .to_vec();
        ensure!(
            code.is_success(),
            error::ResponseSnafu {
                method: "POST",
                uri: &uri,
                code,
                response_body: printable_string(&response_body),
            }
        );
        debug!("zipdeploy response: {}", printable_string(&response_body));
        Ok(())
    }
}
