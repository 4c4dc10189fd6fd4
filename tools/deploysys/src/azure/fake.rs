//! An in-memory cloud for exercising phases without a subscription.

use super::{error, CloudApi, ResourceGroup, Result, SubscriptionInfo, REGISTERED};
use async_trait::async_trait;
use http::StatusCode;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadedBlob {
    pub(crate) content_type: String,
    pub(crate) body: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub(crate) subscription_state: String,
    pub(crate) providers: HashMap<String, String>,
    pub(crate) registrations: Vec<String>,
    pub(crate) resource_groups: HashMap<String, String>,
    pub(crate) resource_group_creates: u32,
    pub(crate) storage_accounts: HashSet<String>,
    pub(crate) containers: HashSet<(String, String)>,
    pub(crate) blobs: BTreeMap<(String, String, String), UploadedBlob>,
    pub(crate) cognitive_accounts: HashSet<String>,
    pub(crate) search_services: HashMap<String, String>,
    pub(crate) app_insights: HashSet<String>,
    pub(crate) plans: HashSet<String>,
    pub(crate) web_apps: HashMap<String, String>,
    pub(crate) app_settings: HashMap<String, BTreeMap<String, String>>,
    pub(crate) published: HashMap<String, Vec<u8>>,
    /// Every call in order, for asserting on sequencing
    pub(crate) calls: Vec<String>,
    /// Any call whose name is listed here fails
    pub(crate) fail_on: HashSet<String>,
}

pub(crate) struct FakeCloud {
    pub(crate) state: Mutex<FakeState>,
}

impl FakeCloud {
    pub(crate) fn new() -> Self {
        let state = FakeState {
            subscription_state: "Enabled".to_string(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn with_state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut FakeState) -> T,
    {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn record(&self, call: &str, target: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", call, target));
        if state.fail_on.contains(call) {
            return error::ResponseSnafu {
                method: "PUT",
                uri: format!("fake://{}/{}", call, target),
                code: StatusCode::CONFLICT,
                response_body: "injected failure",
            }
            .fail();
        }
        Ok(())
    }

    fn require(&self, exists: bool, what: &str) -> Result<()> {
        if exists {
            Ok(())
        } else {
            error::ResponseSnafu {
                method: "GET",
                uri: format!("fake://{}", what),
                code: StatusCode::NOT_FOUND,
                response_body: "not found",
            }
            .fail()
        }
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn subscription(&self) -> Result<SubscriptionInfo> {
        self.record("subscription", "sub1")?;
        Ok(SubscriptionInfo {
            id: "sub1".to_string(),
            display_name: "Test subscription".to_string(),
            state: self.with_state(|s| s.subscription_state.clone()),
        })
    }

    async fn provider_state(&self, namespace: &str) -> Result<String> {
        self.record("provider_state", namespace)?;
        Ok(self.with_state(|s| {
            s.providers
                .get(namespace)
                .cloned()
                .unwrap_or_else(|| "NotRegistered".to_string())
        }))
    }

    async fn register_provider(&self, namespace: &str) -> Result<()> {
        self.record("register_provider", namespace)?;
        self.with_state(|s| {
            s.registrations.push(namespace.to_string());
            s.providers
                .insert(namespace.to_string(), REGISTERED.to_string());
        });
        Ok(())
    }

    async fn resource_group(&self, name: &str) -> Result<Option<ResourceGroup>> {
        self.record("resource_group", name)?;
        Ok(self.with_state(|s| {
            s.resource_groups.get(name).map(|location| ResourceGroup {
                name: name.to_string(),
                location: location.clone(),
            })
        }))
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<()> {
        self.record("create_resource_group", name)?;
        self.with_state(|s| {
            s.resource_group_creates += 1;
            s.resource_groups
                .insert(name.to_string(), location.to_string());
        });
        Ok(())
    }

    async fn create_storage_account(
        &self,
        resource_group: &str,
        name: &str,
        _location: &str,
    ) -> Result<()> {
        self.record("create_storage_account", name)?;
        let group_exists = self.with_state(|s| s.resource_groups.contains_key(resource_group));
        self.require(group_exists, resource_group)?;
        self.with_state(|s| s.storage_accounts.insert(name.to_string()));
        Ok(())
    }

    async fn create_blob_container(
        &self,
        _resource_group: &str,
        account: &str,
        container: &str,
    ) -> Result<()> {
        self.record("create_blob_container", container)?;
        let account_exists = self.with_state(|s| s.storage_accounts.contains(account));
        self.require(account_exists, account)?;
        self.with_state(|s| {
            s.containers
                .insert((account.to_string(), container.to_string()))
        });
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
        self.record("upload_blob", blob_name)?;
        let container_exists = self.with_state(|s| {
            s.containers
                .contains(&(account.to_string(), container.to_string()))
        });
        self.require(container_exists, container)?;
        self.with_state(|s| {
            s.blobs.insert(
                (
                    account.to_string(),
                    container.to_string(),
                    blob_name.to_string(),
                ),
                UploadedBlob {
                    content_type: content_type.to_string(),
                    body,
                },
            )
        });
        Ok(())
    }

    async fn create_cognitive_account(
        &self,
        _resource_group: &str,
        name: &str,
        _location: &str,
    ) -> Result<()> {
        self.record("create_cognitive_account", name)?;
        self.with_state(|s| s.cognitive_accounts.insert(name.to_string()));
        Ok(())
    }

    async fn cognitive_key(&self, _resource_group: &str, name: &str) -> Result<String> {
        self.record("cognitive_key", name)?;
        let exists = self.with_state(|s| s.cognitive_accounts.contains(name));
        self.require(exists, name)?;
        Ok(format!("{}-key1", name))
    }

    async fn create_search_service(
        &self,
        _resource_group: &str,
        name: &str,
        _location: &str,
        sku: &str,
    ) -> Result<()> {
        self.record("create_search_service", name)?;
        self.with_state(|s| {
            s.search_services
                .insert(name.to_string(), sku.to_string())
        });
        Ok(())
    }

    async fn search_admin_key(&self, _resource_group: &str, name: &str) -> Result<String> {
        self.record("search_admin_key", name)?;
        let exists = self.with_state(|s| s.search_services.contains_key(name));
        self.require(exists, name)?;
        Ok(format!("{}-admin", name))
    }

    async fn create_app_insights(
        &self,
        _resource_group: &str,
        name: &str,
        _location: &str,
    ) -> Result<String> {
        self.record("create_app_insights", name)?;
        self.with_state(|s| s.app_insights.insert(name.to_string()));
        Ok(format!("{}-instrumentation", name))
    }

    async fn create_app_service_plan(
        &self,
        resource_group: &str,
        name: &str,
        _location: &str,
    ) -> Result<String> {
        self.record("create_app_service_plan", name)?;
        self.with_state(|s| s.plans.insert(name.to_string()));
        Ok(format!(
            "/subscriptions/sub1/resourceGroups/{}/providers/Microsoft.Web/serverfarms/{}",
            resource_group, name
        ))
    }

    async fn create_web_app(
        &self,
        _resource_group: &str,
        name: &str,
        _location: &str,
        plan_id: &str,
    ) -> Result<()> {
        self.record("create_web_app", name)?;
        self.with_state(|s| {
            s.web_apps.insert(name.to_string(), plan_id.to_string());
            // New sites come with a default setting, which a settings update must drop.
            s.app_settings.insert(
                name.to_string(),
                BTreeMap::from([(
                    "WEBSITE_NODE_DEFAULT_VERSION".to_string(),
                    "6.9.1".to_string(),
                )]),
            );
        });
        Ok(())
    }

    async fn set_app_settings(
        &self,
        _resource_group: &str,
        name: &str,
        settings: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record("set_app_settings", name)?;
        let exists = self.with_state(|s| s.web_apps.contains_key(name));
        self.require(exists, name)?;
        self.with_state(|s| s.app_settings.insert(name.to_string(), settings.clone()));
        Ok(())
    }

    async fn publish_web_app(&self, name: &str, archive: Vec<u8>) -> Result<()> {
        self.record("publish_web_app", name)?;
        let exists = self.with_state(|s| s.web_apps.contains_key(name));
        self.require(exists, name)?;
        self.with_state(|s| s.published.insert(name.to_string(), archive));
        Ok(())
    }
}
