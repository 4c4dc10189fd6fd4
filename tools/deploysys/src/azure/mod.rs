//! The azure module holds the management operations the deployment needs, behind the
//! [`CloudApi`] trait so phases can be exercised without a real subscription.

pub(crate) mod client;
#[cfg(test)]
pub(crate) mod fake;
mod wait;

use async_trait::async_trait;
use std::collections::BTreeMap;

pub(crate) use client::ArmClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubscriptionInfo {
    pub(crate) id: String,
    pub(crate) display_name: String,
    pub(crate) state: String,
}

/// Provider registration state as reported by the management API, e.g. "Registered"
pub(crate) const REGISTERED: &str = "Registered";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResourceGroup {
    pub(crate) name: String,
    pub(crate) location: String,
}

/// Every call the deployment makes against the cloud.  Creation calls return once the resource
/// has finished provisioning.
#[async_trait]
pub(crate) trait CloudApi: Send + Sync {
    async fn subscription(&self) -> Result<SubscriptionInfo>;

    async fn provider_state(&self, namespace: &str) -> Result<String>;

    /// Returns once the provider reports `Registered`.
    async fn register_provider(&self, namespace: &str) -> Result<()>;

    /// Returns `None` if the group doesn't exist.
    async fn resource_group(&self, name: &str) -> Result<Option<ResourceGroup>>;

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<()>;

    /// Creates a StorageV2 account with shared-key access and public blob access disabled.
    async fn create_storage_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()>;

    async fn create_blob_container(
        &self,
        resource_group: &str,
        account: &str,
        container: &str,
    ) -> Result<()>;

    /// Uploads a block blob, overwriting whatever is there.
    async fn upload_blob(
        &self,
        account: &str,
        container: &str,
        blob_name: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<()>;

    async fn create_cognitive_account(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<()>;

    /// Returns the primary access key.
    async fn cognitive_key(&self, resource_group: &str, name: &str) -> Result<String>;

    async fn create_search_service(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
        sku: &str,
    ) -> Result<()>;

    /// Returns the primary admin key.
    async fn search_admin_key(&self, resource_group: &str, name: &str) -> Result<String>;

    /// Returns the instrumentation key of the new component.
    async fn create_app_insights(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<String>;

    /// Returns the resource ID of the plan, which is what a web app binds to.
    async fn create_app_service_plan(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
    ) -> Result<String>;

    async fn create_web_app(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
        plan_id: &str,
    ) -> Result<()>;

    /// Replaces the web app's application settings with exactly `settings`.
    async fn set_app_settings(
        &self,
        resource_group: &str,
        name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Deploys a zip archive to the web app.
    async fn publish_web_app(&self, name: &str, archive: Vec<u8>) -> Result<()>;
}

pub(crate) mod error {
    use http::StatusCode;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(crate)))]
    pub(crate) enum Error {
        #[snafu(display("Error {}ing '{}': {}", method, uri, source))]
        Request {
            method: String,
            uri: String,
            source: reqwest::Error,
        },

        #[snafu(display("Error {} when {}ing '{}': {}", code, method, uri, response_body))]
        Response {
            method: String,
            uri: String,
            code: StatusCode,
            response_body: String,
        },

        #[snafu(display(
            "Unable to read response body when {}ing '{}' (code {}) - {}",
            method,
            uri,
            code,
            source
        ))]
        ResponseBody {
            method: String,
            uri: String,
            code: StatusCode,
            source: reqwest::Error,
        },

        #[snafu(display("Invalid JSON in response from '{}': {}", uri, source))]
        Serde {
            uri: String,
            source: serde_json::Error,
        },

        #[snafu(display("Response from '{}' is missing '{}'", uri, field))]
        MissingField { uri: String, field: String },

        #[snafu(display("Invalid URL '{}': {}", url, source))]
        InvalidUrl {
            url: String,
            source: url::ParseError,
        },

        #[snafu(display("URL '{}' cannot have path segments appended", url))]
        BaseUrl { url: String },

        #[snafu(display("'{}' finished provisioning in state '{}'", resource, state))]
        ProvisioningFailed { resource: String, state: String },

        #[snafu(display(
            "'{}' still provisioning after {} attempts, last state '{}'",
            resource,
            attempts,
            state
        ))]
        ProvisioningTimeout {
            resource: String,
            attempts: u32,
            state: String,
        },

        #[snafu(display(
            "Provider '{}' still not registered after {} attempts, last state '{}'",
            namespace,
            attempts,
            state
        ))]
        RegistrationTimeout {
            namespace: String,
            attempts: u32,
            state: String,
        },
    }
}
pub(crate) use error::Error;
pub(crate) type Result<T> = std::result::Result<T, error::Error>;
