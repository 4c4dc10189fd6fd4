use crate::azure::CloudApi;
use crate::deploy::Provisioned;
use crate::error::{self, Result};
use crate::shared::Secret;
use log::info;
use snafu::ResultExt;
use std::collections::BTreeMap;

/// Values the web app reads from its application settings
pub(crate) struct SettingsSource<'a> {
    pub(crate) search_service: &'a str,
    pub(crate) search_admin_key: &'a Secret,
    pub(crate) storage_account: &'a str,
    pub(crate) storage_connection_string: &'a str,
    pub(crate) cognitive_key: &'a Secret,
    pub(crate) instrumentation_key: Option<&'a Secret>,
}

/// The complete settings map; whatever isn't in it is removed from the web app.
pub(crate) fn app_settings(source: &SettingsSource<'_>) -> BTreeMap<String, String> {
    let mut settings = BTreeMap::new();
    settings.insert(
        "SearchServiceName".to_string(),
        source.search_service.to_string(),
    );
    settings.insert(
        "SearchApiKey".to_string(),
        source.search_admin_key.expose().to_string(),
    );
    settings.insert(
        "StorageAccountName".to_string(),
        source.storage_account.to_string(),
    );
    settings.insert(
        "StorageAccountKey".to_string(),
        source.storage_connection_string.to_string(),
    );
    settings.insert(
        "CognitiveServicesKey".to_string(),
        source.cognitive_key.expose().to_string(),
    );
    if let Some(key) = source.instrumentation_key {
        settings.insert(
            "APPINSIGHTS_INSTRUMENTATIONKEY".to_string(),
            key.expose().to_string(),
        );
    }
    settings
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WebAppOutputs {
    pub(crate) plan: String,
    pub(crate) web_app: String,
    pub(crate) app_insights: Option<String>,
}

/// Names for the web app phase
pub(crate) struct WebAppNames<'a> {
    pub(crate) plan: &'a str,
    pub(crate) web_app: &'a str,
    /// Set when an Application Insights component should be created
    pub(crate) app_insights: Option<&'a str>,
}

/// Creates the plan and web app, then replaces the app's settings.  With Application Insights
/// enabled, the component is created first so its key can go into the settings.
pub(crate) async fn provision_web_app(
    cloud: &dyn CloudApi,
    resource_group: &str,
    location: &str,
    names: &WebAppNames<'_>,
    source: SettingsSource<'_>,
    provisioned: &mut Provisioned,
) -> Result<WebAppOutputs> {
    let mut source = source;
    let instrumentation_key = match names.app_insights {
        Some(component) => {
            info!("Creating Application Insights component '{}'...", component);
            let key = cloud
                .create_app_insights(resource_group, component, location)
                .await
                .context(error::CloudSnafu {
                    op: "create Application Insights component",
                    target: component,
                })?;
            provisioned.record("Application Insights component", component);
            Some(Secret::new(key))
        }
        None => None,
    };
    source.instrumentation_key = instrumentation_key.as_ref();

    info!("Creating app service plan '{}'...", names.plan);
    let plan_id = cloud
        .create_app_service_plan(resource_group, names.plan, location)
        .await
        .context(error::CloudSnafu {
            op: "create app service plan",
            target: names.plan,
        })?;
    provisioned.record("app service plan", names.plan);

    info!("Creating web app '{}'...", names.web_app);
    cloud
        .create_web_app(resource_group, names.web_app, location, &plan_id)
        .await
        .context(error::CloudSnafu {
            op: "create web app",
            target: names.web_app,
        })?;
    provisioned.record("web app", names.web_app);

    let settings = app_settings(&source);
    info!(
        "Replacing application settings of '{}' ({} settings)...",
        names.web_app,
        settings.len()
    );
    cloud
        .set_app_settings(resource_group, names.web_app, &settings)
        .await
        .context(error::CloudSnafu {
            op: "update application settings of",
            target: names.web_app,
        })?;

    Ok(WebAppOutputs {
        plan: names.plan.to_string(),
        web_app: names.web_app.to_string(),
        app_insights: names.app_insights.map(str::to_string),
    })
}
