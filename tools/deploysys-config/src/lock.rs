//! `Deploy.lock` records what a successful deployment provisioned.  It holds names and endpoints
//! only; keys are never written to disk.
use crate::{error, Result};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeployLock {
    pub subscription: String,
    pub resource_group: String,
    pub location: String,
    pub storage_account: String,
    pub storage_container: String,
    #[serde(default)]
    pub uploaded_documents: Vec<String>,
    pub cognitive_services_account: String,
    pub search_service: String,
    pub search_endpoint: String,
    pub search_data_source: String,
    pub search_skillset: String,
    pub search_index: String,
    pub search_indexer: String,
    pub app_service_plan: String,
    pub web_app: String,
    pub application_insights: Option<String>,
    #[serde(default)]
    pub web_ui_published: bool,
}

impl DeployLock {
    /// Deserializes a DeployLock from the given path
    pub fn from_path<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let lock_str = fs::read_to_string(path).context(error::FileSnafu { path })?;
        serde_yaml::from_str(&lock_str).context(error::InvalidLockSnafu { path })
    }

    /// Writes this lock as YAML to the given path, replacing any earlier lock.
    pub fn write<P>(&self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let yaml_string = serde_yaml::to_string(self).context(error::SerializeLockSnafu)?;
        fs::write(path, yaml_string).context(error::WriteLockSnafu { path })
    }

    /// Returns the file path to a file named `Deploy.lock` in the same directory as the file
    /// named by `deploy_config_path`.
    pub fn compute_lock_path<P>(deploy_config_path: P) -> Result<PathBuf>
    where
        P: AsRef<Path>,
    {
        Ok(deploy_config_path
            .as_ref()
            .parent()
            .context(error::ParentSnafu {
                path: deploy_config_path.as_ref(),
            })?
            .join("Deploy.lock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_written_next_to_config() {
        let lock_path = DeployLock::compute_lock_path("/work/deploy/Deploy.toml").unwrap();
        assert_eq!(lock_path, PathBuf::from("/work/deploy/Deploy.lock"));
    }

    #[test]
    fn write_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Deploy.lock");
        let lock = DeployLock {
            subscription: "sub1".to_string(),
            resource_group: "rg1".to_string(),
            location: "usgovvirginia".to_string(),
            storage_account: "fabrikam1str".to_string(),
            storage_container: "documents".to_string(),
            uploaded_documents: vec!["a.pdf".to_string(), "nested/b.txt".to_string()],
            search_service: "fabrikam1search".to_string(),
            search_index: "fabrikam1-index".to_string(),
            ..Default::default()
        };
        lock.write(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("storage_account: fabrikam1str"));
        assert_eq!(DeployLock::from_path(&path).unwrap(), lock);
    }
}
