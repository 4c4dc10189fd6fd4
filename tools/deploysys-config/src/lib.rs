//! The config module owns the definition and loading process for our configuration sources.
//!
//! `Deploy.toml` describes one deployment: the operator-chosen parameters, the cloud endpoints to
//! talk to, and where the local inputs (sample documents, search templates, web UI sources) live.
//! Deployment parameters can also be given on the command line or through the environment; those
//! are merged over the file with [`DeploymentConfig::with_overrides`] before validation.
pub mod lock;

use log::info;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

pub use crate::lock::DeployLock;

/// Location used when none is configured.
pub const DEFAULT_LOCATION: &str = "usgovvirginia";
/// Search service SKU used when none is configured.
pub const DEFAULT_SEARCH_SKU: &str = "basic";

/// Everything needed to provision and publish one search deployment
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub web_app: WebAppConfig,
    // The web UI phase is skipped entirely when this table is absent.
    pub web_ui: Option<WebUiConfig>,
}

impl DeployConfig {
    /// Deserializes a DeployConfig from a given path.  Relative paths inside the file are
    /// resolved against the directory holding it.
    pub fn from_path<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let deploy_config_str = fs::read_to_string(path).context(error::FileSnafu { path })?;
        let mut config: Self =
            toml::from_str(&deploy_config_str).context(error::InvalidTomlSnafu { path })?;
        let base_dir = path.parent().context(error::ParentSnafu { path })?;
        config.resolve_paths(base_dir);
        Ok(config)
    }

    /// Deserializes a DeployConfig from a given path, if it exists, otherwise builds a default
    /// config that relies entirely on command-line parameters.
    pub fn from_path_or_default<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        if path.as_ref().exists() {
            info!("Found deploy config at path: {}", path.as_ref().display());
            Self::from_path(path)
        } else {
            info!(
                "No deploy config at '{}', using defaults",
                path.as_ref().display()
            );
            let mut config = Self::default();
            if let Some(base_dir) = path.as_ref().parent() {
                config.resolve_paths(base_dir);
            }
            Ok(config)
        }
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        resolve(base_dir, &mut self.storage.sample_documents_dir);
        resolve(base_dir, &mut self.search.templates_dir);
        if let Some(web_ui) = self.web_ui.as_mut() {
            resolve(base_dir, &mut web_ui.source_dir);
            resolve(base_dir, &mut web_ui.output_dir);
        }
    }
}

fn resolve(base_dir: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base_dir.join(&path);
    }
}

/// Operator-chosen parameters; any of them may be filled in later from the command line
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    pub unique_name: Option<String>,
    pub resource_group: Option<String>,
    pub subscription: Option<String>,
    pub location: Option<String>,
    pub search_sku: Option<String>,
}

impl DeploymentConfig {
    /// Returns a copy of this config where every field set in `overrides` wins.
    pub fn with_overrides(&self, overrides: DeploymentConfig) -> DeploymentConfig {
        DeploymentConfig {
            unique_name: overrides.unique_name.or_else(|| self.unique_name.clone()),
            resource_group: overrides
                .resource_group
                .or_else(|| self.resource_group.clone()),
            subscription: overrides.subscription.or_else(|| self.subscription.clone()),
            location: overrides.location.or_else(|| self.location.clone()),
            search_sku: overrides.search_sku.or_else(|| self.search_sku.clone()),
        }
    }

    /// Checks that every required parameter is present and non-blank, and fills in defaults for
    /// the optional ones.  All missing parameters are reported at once.
    pub fn validate(&self) -> Result<DeploymentParameters> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str, value: &Option<String>| match non_blank(value) {
            Some(value) => value,
            None => {
                missing.push(name);
                String::new()
            }
        };
        let unique_name = required("unique_name", &self.unique_name);
        let resource_group = required("resource_group", &self.resource_group);
        let subscription = required("subscription", &self.subscription);
        ensure!(missing.is_empty(), error::MissingParametersSnafu { missing });

        Ok(DeploymentParameters {
            unique_name,
            resource_group,
            subscription,
            location: non_blank(&self.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            search_sku: non_blank(&self.search_sku)
                .unwrap_or_else(|| DEFAULT_SEARCH_SKU.to_string()),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validated deployment parameters; immutable for the rest of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParameters {
    pub unique_name: String,
    pub resource_group: String,
    pub subscription: String,
    pub location: String,
    pub search_sku: String,
}

/// Endpoints of the target cloud.  The defaults point at Azure Government.
///
/// The `*_endpoint` templates may contain `{name}`, which is replaced by the name of the
/// resource being addressed.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CloudConfig {
    pub az_cloud_name: String,
    pub management_endpoint: String,
    pub storage_token_resource: String,
    pub storage_endpoint_suffix: String,
    pub blob_endpoint: String,
    pub search_endpoint: String,
    pub scm_endpoint: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            az_cloud_name: "AzureUSGovernment".to_string(),
            management_endpoint: "https://management.usgovcloudapi.net".to_string(),
            storage_token_resource: "https://storage.azure.com/".to_string(),
            storage_endpoint_suffix: "core.usgovcloudapi.net".to_string(),
            blob_endpoint: "https://{name}.blob.core.usgovcloudapi.net".to_string(),
            search_endpoint: "https://{name}.search.azure.us".to_string(),
            scm_endpoint: "https://{name}.scm.azurewebsites.us".to_string(),
        }
    }
}

impl CloudConfig {
    /// The token audience for management calls, which is the management endpoint itself.
    pub fn management_token_resource(&self) -> String {
        format!("{}/", self.management_endpoint.trim_end_matches('/'))
    }

    pub fn blob_url(&self, account: &str) -> String {
        fill_endpoint(&self.blob_endpoint, account)
    }

    pub fn search_url(&self, service: &str) -> String {
        fill_endpoint(&self.search_endpoint, service)
    }

    pub fn scm_url(&self, web_app: &str) -> String {
        fill_endpoint(&self.scm_endpoint, web_app)
    }
}

fn fill_endpoint(template: &str, name: &str) -> String {
    template
        .replace("{name}", name)
        .trim_end_matches('/')
        .to_string()
}

/// Where sample documents come from and where they land
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub container: String,
    pub sample_documents_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            container: "documents".to_string(),
            sample_documents_dir: PathBuf::from("sample-documents"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Directory holding datasource.json, skillset.json, index.json and indexer.json
    pub templates_dir: PathBuf,
    pub api_version: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("tools/deploysys/search-templates"),
            api_version: "2020-06-30".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct WebAppConfig {
    /// Create an Application Insights component and hand its key to the web app
    pub application_insights: bool,
}

/// The companion web UI: how to build it and what to write into its settings
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct WebUiConfig {
    pub source_dir: PathBuf,
    /// `{output}` is replaced with the (quoted) output directory
    #[serde(default = "default_build_command")]
    pub build_command: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Relative to `output_dir`
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    #[serde(default)]
    pub branding: BrandingConfig,
}

fn default_build_command() -> String {
    "dotnet publish -c Release -o {output}".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("web-ui-publish")
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("appsettings.json")
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct BrandingConfig {
    pub organization_name: String,
    pub organization_logo: String,
    pub organization_web_site_url: String,
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            organization_name: "Microsoft".to_string(),
            organization_logo: "~/images/logo.png".to_string(),
            organization_web_site_url: "https://www.microsoft.com".to_string(),
        }
    }
}

mod error {
    use snafu::Snafu;
    use std::io;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Failed to read '{}': {}", path.display(), source))]
        File { path: PathBuf, source: io::Error },

        #[snafu(display("Invalid config file at '{}': {}", path.display(), source))]
        InvalidToml {
            path: PathBuf,
            source: toml::de::Error,
        },

        #[snafu(display("Invalid lock file at '{}': {}", path.display(), source))]
        InvalidLock {
            path: PathBuf,
            source: serde_yaml::Error,
        },

        #[snafu(display("Failed to serialize lock file: {}", source))]
        SerializeLock { source: serde_yaml::Error },

        #[snafu(display("Failed to write '{}': {}", path.display(), source))]
        WriteLock { path: PathBuf, source: io::Error },

        #[snafu(display("Missing required parameters: {}", missing.join(", ")))]
        MissingParameters { missing: Vec<&'static str> },

        #[snafu(display("Failed to get parent of path: {}", path.display()))]
        Parent { path: PathBuf },
    }
}
pub use error::Error;
pub type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn test_toml(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("test_tomls")
            .join(name)
    }

    #[test]
    fn full_config() {
        let path = test_toml("full.toml");
        let config = DeployConfig::from_path(&path).unwrap();
        let base = path.parent().unwrap();

        assert_eq!(
            config.deployment.unique_name.as_deref(),
            Some("fabrikam1")
        );
        assert_eq!(config.storage.container, "samples");
        assert_eq!(
            config.storage.sample_documents_dir,
            base.join("docs/samples")
        );
        assert_eq!(config.search.api_version, "2020-06-30");
        assert!(config.web_app.application_insights);

        let web_ui = config.web_ui.unwrap();
        assert_eq!(web_ui.source_dir, base.join("ui"));
        assert_eq!(web_ui.output_dir, base.join("web-ui-publish"));
        assert_eq!(web_ui.settings_file, PathBuf::from("appsettings.json"));
        assert_eq!(web_ui.branding.organization_name, "Fabrikam");
        assert_eq!(web_ui.branding.organization_logo, "~/images/logo.png");
    }

    #[test]
    fn minimal_config_uses_government_defaults() {
        let config = DeployConfig::from_path(test_toml("minimal.toml")).unwrap();
        assert_eq!(config.cloud, CloudConfig::default());
        assert_eq!(config.cloud.az_cloud_name, "AzureUSGovernment");
        assert_eq!(
            config.cloud.search_url("fabrikam1search"),
            "https://fabrikam1search.search.azure.us"
        );
        assert_eq!(
            config.cloud.management_token_resource(),
            "https://management.usgovcloudapi.net/"
        );
        assert!(config.web_ui.is_none());
    }

    #[test]
    fn example_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../Deploy.toml.example");
        let config = DeployConfig::from_path(&path).unwrap();
        let params = config.deployment.validate().unwrap();
        assert_eq!(params.unique_name, "fabrikam1");
        assert_eq!(params.location, DEFAULT_LOCATION);
        assert!(config.search.templates_dir.ends_with("tools/deploysys/search-templates"));
        assert!(config.web_ui.is_some());
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = toml::from_str::<DeployConfig>("[deployment]\nunique = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn defaults_fill_optional_parameters() {
        let deployment = DeploymentConfig {
            unique_name: Some("fabrikam1".to_string()),
            resource_group: Some("rg1".to_string()),
            subscription: Some("sub1".to_string()),
            location: Some("  ".to_string()),
            search_sku: None,
        };
        let params = deployment.validate().unwrap();
        assert_eq!(params.location, "usgovvirginia");
        assert_eq!(params.search_sku, "basic");
    }

    #[test]
    fn all_missing_parameters_reported() {
        let deployment = DeploymentConfig {
            resource_group: Some("".to_string()),
            ..Default::default()
        };
        match deployment.validate() {
            Err(Error::MissingParameters { missing }) => {
                assert_eq!(missing, vec!["unique_name", "resource_group", "subscription"])
            }
            other => panic!("expected missing parameters, got {:?}", other),
        }
    }

    #[test]
    fn overrides_win() {
        let file = DeploymentConfig {
            unique_name: Some("fromfile".to_string()),
            location: Some("usgovtexas".to_string()),
            ..Default::default()
        };
        let merged = file.with_overrides(DeploymentConfig {
            unique_name: Some("fromflag".to_string()),
            subscription: Some("sub1".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.unique_name.as_deref(), Some("fromflag"));
        assert_eq!(merged.subscription.as_deref(), Some("sub1"));
        assert_eq!(merged.location.as_deref(), Some("usgovtexas"));
        assert_eq!(merged.resource_group, None);
    }

    #[test]
    fn endpoint_templates() {
        let cloud = CloudConfig {
            search_endpoint: "http://127.0.0.1:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(cloud.search_url("anything"), "http://127.0.0.1:8080");
        assert_eq!(
            cloud.scm_url("fabrikam1app"),
            "https://fabrikam1app.scm.azurewebsites.us"
        );
    }
}
