//! The deploy module runs a whole deployment: pre-flight checks, authentication, then every
//! provisioning phase in order, finishing with `Deploy.lock` and a summary of what was created.

use crate::auth;
use crate::azure::{ArmClient, CloudApi};
use crate::error::{self, Result};
use crate::names::DerivedNames;
use crate::resource_group::{resolve_resource_group, ResourceGroupOutcome};
use crate::search::template::{self, Substitutions, TemplateSet, Token};
use crate::search::{build_pipeline, ArtifactNames, SearchClient};
use crate::services::{
    provision_cognitive_services, provision_search_service, CognitiveOutputs,
    SearchServiceOutputs,
};
use crate::shared::Secret;
use crate::storage::{self, provision_storage, StorageOutputs};
use crate::subscription::{register_providers, select_subscription};
use crate::webapp::{provision_web_app, SettingsSource, WebAppNames, WebAppOutputs};
use crate::webui::{publish_web_ui, WebUiSettings};
use deploysys_config::{DeployConfig, DeployLock, DeploymentConfig, DeploymentParameters};
use log::{error, info, warn};
use snafu::ResultExt;
use std::path::Path;

/// Switches that change how a run behaves without changing what it deploys
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DeployOptions {
    pub(crate) skip_web_ui: bool,
    pub(crate) show_secrets: bool,
}

/// Resources created during this run, kept so a failed run can say what it left behind.
#[derive(Debug, Default)]
pub(crate) struct Provisioned {
    created: Vec<String>,
}

impl Provisioned {
    pub(crate) fn record(&mut self, kind: &str, name: &str) {
        self.created.push(format!("{} '{}'", kind, name));
    }

    pub(crate) fn created(&self) -> &[String] {
        &self.created
    }

    fn log_created(&self) {
        if self.created.is_empty() {
            error!("No resources were created before the failure");
            return;
        }
        error!("Resources created before the failure, which may need cleaning up:");
        for resource in &self.created {
            error!("  {}", resource);
        }
    }
}

/// Everything known before touching the cloud
pub(crate) struct Plan {
    pub(crate) config: DeployConfig,
    pub(crate) params: DeploymentParameters,
    pub(crate) names: DerivedNames,
    pub(crate) templates: TemplateSet,
}

/// Outputs of every phase of a successful run
pub(crate) struct Deployed {
    pub(crate) resource_group: ResourceGroupOutcome,
    pub(crate) storage: StorageOutputs,
    pub(crate) cognitive: CognitiveOutputs,
    pub(crate) search: SearchServiceOutputs,
    pub(crate) artifacts: ArtifactNames,
    pub(crate) web_app: WebAppOutputs,
    pub(crate) web_ui_published: bool,
}

impl Deployed {
    fn lock(&self, plan: &Plan) -> DeployLock {
        DeployLock {
            subscription: plan.params.subscription.clone(),
            resource_group: self.resource_group.group().name.clone(),
            location: plan.params.location.clone(),
            storage_account: self.storage.account.clone(),
            storage_container: self.storage.container.clone(),
            uploaded_documents: self.storage.uploaded.clone(),
            cognitive_services_account: self.cognitive.account.clone(),
            search_service: self.search.service.clone(),
            search_endpoint: self.search.endpoint.clone(),
            search_data_source: self.artifacts.data_source.clone(),
            search_skillset: self.artifacts.skillset.clone(),
            search_index: self.artifacts.index.clone(),
            search_indexer: self.artifacts.indexer.clone(),
            app_service_plan: self.web_app.plan.clone(),
            web_app: self.web_app.web_app.clone(),
            application_insights: self.web_app.app_insights.clone(),
            web_ui_published: self.web_ui_published,
        }
    }
}

fn substitutions(
    names: &DerivedNames,
    storage: &StorageOutputs,
    cognitive_key: &Secret,
) -> Substitutions {
    let mut subs = Substitutions::new();
    subs.set(Token::DataSourceName, &names.data_source)
        .set(Token::SkillsetName, &names.skillset)
        .set(Token::IndexName, &names.index)
        .set(Token::IndexerName, &names.indexer)
        .set(Token::StorageAccountName, &storage.account)
        .set(Token::StorageConnectionString, &storage.connection_string)
        .set(Token::StorageContainer, &storage.container)
        .set(Token::CognitiveServicesKey, cognitive_key.expose());
    subs
}

fn artifact_names(names: &DerivedNames) -> ArtifactNames {
    ArtifactNames {
        data_source: names.data_source.clone(),
        skillset: names.skillset.clone(),
        index: names.index.clone(),
        indexer: names.indexer.clone(),
    }
}

/// Validates parameters and local inputs so that mistakes surface before anything is created.
pub(crate) fn preflight(config: DeployConfig, overrides: DeploymentConfig) -> Result<Plan> {
    let params = config
        .deployment
        .with_overrides(overrides)
        .validate()
        .context(error::ConfigSnafu)?;
    let names = DerivedNames::new(&params.unique_name);
    for warning in names.naming_warnings() {
        warn!("{}", warning);
    }

    let templates = TemplateSet::load(&config.search.templates_dir).context(error::SearchSnafu)?;
    // Rendering with stand-in values catches unknown tokens and broken JSON up front.
    let stand_in = StorageOutputs {
        account: names.storage_account.clone(),
        container: config.storage.container.clone(),
        connection_string: storage::connection_string(
            &names.storage_account,
            &config.cloud.storage_endpoint_suffix,
        ),
        uploaded: Vec::new(),
    };
    template::check_tokens(
        &templates,
        &substitutions(&names, &stand_in, &Secret::new("stand-in")),
    )
    .context(error::SearchSnafu)?;

    let documents = storage::sample_documents(&config.storage.sample_documents_dir)?;
    info!(
        "Found {} sample documents in '{}'",
        documents.len(),
        config.storage.sample_documents_dir.display()
    );

    Ok(Plan {
        config,
        params,
        names,
        templates,
    })
}

/// Runs every phase in order against `cloud`.  Created resources are recorded in `provisioned`
/// as they appear.
pub(crate) async fn run_phases(
    cloud: &dyn CloudApi,
    plan: &Plan,
    options: DeployOptions,
    provisioned: &mut Provisioned,
) -> Result<Deployed> {
    let params = &plan.params;
    let names = &plan.names;
    let config = &plan.config;

    select_subscription(cloud, &params.subscription).await?;
    register_providers(cloud).await?;

    let resource_group =
        resolve_resource_group(cloud, &params.resource_group, &params.location, provisioned)
            .await?;
    let rg = resource_group.group().name.clone();

    let storage = provision_storage(
        cloud,
        &rg,
        &names.storage_account,
        &params.location,
        &config.cloud.storage_endpoint_suffix,
        &config.storage,
        provisioned,
    )
    .await?;

    let cognitive = provision_cognitive_services(
        cloud,
        &rg,
        &names.cognitive_account,
        &params.location,
        provisioned,
    )
    .await?;
    let search = provision_search_service(
        cloud,
        &rg,
        &names.search_service,
        &params.location,
        &params.search_sku,
        config.cloud.search_url(&names.search_service),
        provisioned,
    )
    .await?;

    let search_client = SearchClient::new(
        &search.endpoint,
        search.admin_key.clone(),
        &config.search.api_version,
    );
    let artifacts = build_pipeline(
        &search_client,
        &plan.templates,
        &substitutions(names, &storage, &cognitive.key),
        &artifact_names(names),
    )
    .await
    .context(error::SearchSnafu)?;
    provisioned.record("search data source", &artifacts.data_source);
    provisioned.record("search skillset", &artifacts.skillset);
    provisioned.record("search index", &artifacts.index);
    provisioned.record("search indexer", &artifacts.indexer);

    let web_app_names = WebAppNames {
        plan: &names.app_service_plan,
        web_app: &names.web_app,
        app_insights: if config.web_app.application_insights {
            Some(names.app_insights.as_str())
        } else {
            None
        },
    };
    let web_app = provision_web_app(
        cloud,
        &rg,
        &params.location,
        &web_app_names,
        SettingsSource {
            search_service: &search.service,
            search_admin_key: &search.admin_key,
            storage_account: &storage.account,
            storage_connection_string: &storage.connection_string,
            cognitive_key: &cognitive.key,
            instrumentation_key: None,
        },
        provisioned,
    )
    .await?;

    let web_ui_published = match (&config.web_ui, options.skip_web_ui) {
        (Some(web_ui), false) => {
            let settings = WebUiSettings {
                search_service: &search.service,
                search_admin_key: &search.admin_key,
                index: &artifacts.index,
                indexer: &artifacts.indexer,
                storage_account: &storage.account,
                storage_connection_string: &storage.connection_string,
                storage_container_address: format!(
                    "{}/{}",
                    config.cloud.blob_url(&storage.account),
                    storage.container
                ),
                branding: &web_ui.branding,
            };
            publish_web_ui(cloud, web_ui, &settings, &web_app.web_app).await?;
            true
        }
        (Some(_), true) => {
            info!("Skipping web UI publish as requested");
            false
        }
        (None, _) => {
            info!("No [web_ui] configured, skipping web UI publish");
            false
        }
    };

    Ok(Deployed {
        resource_group,
        storage,
        cognitive,
        search,
        artifacts,
        web_app,
        web_ui_published,
    })
}

/// Deploys everything described by the config at `config_path`, with `overrides` taking
/// precedence over its `[deployment]` table.
pub(crate) async fn deploy(
    config_path: &Path,
    overrides: DeploymentConfig,
    options: DeployOptions,
) -> Result<()> {
    info!("Parsing {}...", config_path.display());
    let config = DeployConfig::from_path_or_default(config_path).context(error::ConfigSnafu)?;
    let plan = preflight(config, overrides)?;

    let tokens = auth::acquire_tokens(&plan.config.cloud, &plan.params.subscription)
        .context(error::AuthSnafu)?;
    let client = ArmClient::new(
        plan.config.cloud.clone(),
        &plan.params.subscription,
        tokens,
    );

    let mut provisioned = Provisioned::default();
    let deployed = match run_phases(&client, &plan, options, &mut provisioned).await {
        Ok(deployed) => deployed,
        Err(e) => {
            provisioned.log_created();
            return Err(e);
        }
    };

    let lock_path = DeployLock::compute_lock_path(config_path).context(error::ConfigSnafu)?;
    info!("Writing {}...", lock_path.display());
    deployed
        .lock(&plan)
        .write(&lock_path)
        .context(error::ConfigSnafu)?;

    log_summary(&plan, &deployed, options.show_secrets);
    Ok(())
}

fn log_summary(plan: &Plan, deployed: &Deployed, show_secrets: bool) {
    let reveal = |secret: &Secret| {
        if show_secrets {
            secret.expose().to_string()
        } else {
            secret.masked()
        }
    };
    info!("Deployment '{}' complete", plan.names.unique_name);
    info!("  Resource group:     {}", deployed.resource_group.group().name);
    info!("  Storage account:    {}", deployed.storage.account);
    info!(
        "  Documents uploaded: {} to '{}'",
        deployed.storage.uploaded.len(),
        deployed.storage.container
    );
    info!("  Cognitive services: {}", deployed.cognitive.account);
    info!("  Cognitive key:      {}", reveal(&deployed.cognitive.key));
    info!("  Search service:     {}", deployed.search.endpoint);
    info!("  Search admin key:   {}", reveal(&deployed.search.admin_key));
    info!("  Search index:       {}", deployed.artifacts.index);
    info!("  Web app:            {}", deployed.web_app.web_app);
    if !deployed.web_ui_published {
        info!("  Web UI was not published");
    }
}

/// Prints the resource names a unique name maps to, without touching the cloud.
pub(crate) fn show_names(config_path: &Path, overrides: DeploymentConfig) -> Result<()> {
    let config = DeployConfig::from_path_or_default(config_path).context(error::ConfigSnafu)?;
    let params = config
        .deployment
        .with_overrides(overrides)
        .validate()
        .context(error::ConfigSnafu)?;
    let names = DerivedNames::new(&params.unique_name);
    for warning in names.naming_warnings() {
        warn!("{}", warning);
    }
    println!("resource group:       {}", params.resource_group);
    println!("location:             {}", params.location);
    println!("storage account:      {}", names.storage_account);
    println!("cognitive services:   {}", names.cognitive_account);
    println!("search service:       {}", names.search_service);
    println!("search data source:   {}", names.data_source);
    println!("search skillset:      {}", names.skillset);
    println!("search index:         {}", names.index);
    println!("search indexer:       {}", names.indexer);
    println!("app service plan:     {}", names.app_service_plan);
    println!("web app:              {}", names.web_app);
    println!("application insights: {}", names.app_insights);
    Ok(())
}
