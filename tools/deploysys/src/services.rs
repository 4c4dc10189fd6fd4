//! Provisioning for the two AI services: the cognitive services account the skillset bills to,
//! and the search service that hosts the index.

use crate::azure::CloudApi;
use crate::deploy::Provisioned;
use crate::error::{self, Result};
use crate::shared::Secret;
use log::info;
use snafu::ResultExt;

#[derive(Debug, Clone)]
pub(crate) struct CognitiveOutputs {
    pub(crate) account: String,
    pub(crate) key: Secret,
}

#[derive(Debug, Clone)]
pub(crate) struct SearchServiceOutputs {
    pub(crate) service: String,
    pub(crate) endpoint: String,
    pub(crate) admin_key: Secret,
}

pub(crate) async fn provision_cognitive_services(
    cloud: &dyn CloudApi,
    resource_group: &str,
    account: &str,
    location: &str,
    provisioned: &mut Provisioned,
) -> Result<CognitiveOutputs> {
    info!("Creating cognitive services account '{}'...", account);
    cloud
        .create_cognitive_account(resource_group, account, location)
        .await
        .context(error::CloudSnafu {
            op: "create cognitive services account",
            target: account,
        })?;
    provisioned.record("cognitive services account", account);

    let key = cloud
        .cognitive_key(resource_group, account)
        .await
        .context(error::CloudSnafu {
            op: "list keys of",
            target: account,
        })?;
    Ok(CognitiveOutputs {
        account: account.to_string(),
        key: Secret::new(key),
    })
}

/// Creates the search service and fetches its admin key.  `endpoint` is where the search REST
/// calls go.
pub(crate) async fn provision_search_service(
    cloud: &dyn CloudApi,
    resource_group: &str,
    service: &str,
    location: &str,
    sku: &str,
    endpoint: String,
    provisioned: &mut Provisioned,
) -> Result<SearchServiceOutputs> {
    info!("Creating search service '{}' ({} tier)...", service, sku);
    cloud
        .create_search_service(resource_group, service, location, sku)
        .await
        .context(error::CloudSnafu {
            op: "create search service",
            target: service,
        })?;
    provisioned.record("search service", service);

    let admin_key = cloud
        .search_admin_key(resource_group, service)
        .await
        .context(error::CloudSnafu {
            op: "list admin keys of",
            target: service,
        })?;
    Ok(SearchServiceOutputs {
        service: service.to_string(),
        endpoint,
        admin_key: Secret::new(admin_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::fake::FakeCloud;

    #[tokio::test]
    async fn keys_come_from_the_new_services() {
        let cloud = FakeCloud::new();
        let mut provisioned = Provisioned::default();

        let cognitive =
            provision_cognitive_services(&cloud, "rg1", "fabrikam1cog", "usgovvirginia", &mut provisioned)
                .await
                .unwrap();
        let search = provision_search_service(
            &cloud,
            "rg1",
            "fabrikam1search",
            "usgovvirginia",
            "basic",
            "https://fabrikam1search.search.azure.us".to_string(),
            &mut provisioned,
        )
        .await
        .unwrap();

        assert_eq!(cognitive.key.expose(), "fabrikam1cog-key1");
        assert_eq!(search.admin_key.expose(), "fabrikam1search-admin");
        assert_eq!(
            cloud.with_state(|s| s.search_services["fabrikam1search"].clone()),
            "basic"
        );
        assert_eq!(
            provisioned.created(),
            [
                "cognitive services account 'fabrikam1cog'",
                "search service 'fabrikam1search'"
            ]
        );
    }

    #[tokio::test]
    async fn key_fetch_failure_is_reported_against_the_service() {
        let cloud = FakeCloud::new();
        cloud.with_state(|s| s.fail_on.insert("search_admin_key".to_string()));
        let mut provisioned = Provisioned::default();

        let err = provision_search_service(
            &cloud,
            "rg1",
            "fabrikam1search",
            "usgovvirginia",
            "basic",
            "https://fabrikam1search.search.azure.us".to_string(),
            &mut provisioned,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to list admin keys of 'fabrikam1search': Error 409 Conflict when PUTing \
             'fake://search_admin_key/fabrikam1search': injected failure"
        );
    }
}
