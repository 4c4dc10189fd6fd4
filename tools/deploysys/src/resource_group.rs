use crate::azure::{CloudApi, ResourceGroup};
use crate::deploy::Provisioned;
use crate::error::{self, Result};
use log::{info, warn};
use snafu::ResultExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResourceGroupOutcome {
    Existing(ResourceGroup),
    Created(ResourceGroup),
}

impl ResourceGroupOutcome {
    pub(crate) fn group(&self) -> &ResourceGroup {
        match self {
            ResourceGroupOutcome::Existing(group) | ResourceGroupOutcome::Created(group) => group,
        }
    }
}

/// Reuses the group if it exists anywhere, otherwise creates it in `location`.
pub(crate) async fn resolve_resource_group(
    cloud: &dyn CloudApi,
    name: &str,
    location: &str,
    provisioned: &mut Provisioned,
) -> Result<ResourceGroupOutcome> {
    let existing = cloud.resource_group(name).await.context(error::CloudSnafu {
        op: "read resource group",
        target: name,
    })?;
    if let Some(group) = existing {
        if !group.location.eq_ignore_ascii_case(location) {
            warn!(
                "Resource group '{}' is in '{}', not '{}'; resources will still be created in '{}'",
                name, group.location, location, location
            );
        }
        info!("Using existing resource group '{}'", name);
        return Ok(ResourceGroupOutcome::Existing(group));
    }

    info!("Creating resource group '{}' in '{}'...", name, location);
    cloud
        .create_resource_group(name, location)
        .await
        .context(error::CloudSnafu {
            op: "create resource group",
            target: name,
        })?;
    provisioned.record("resource group", name);
    Ok(ResourceGroupOutcome::Created(ResourceGroup {
        name: name.to_string(),
        location: location.to_string(),
    }))
}
