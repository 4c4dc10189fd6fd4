use crate::azure::CloudApi;
use crate::deploy::Provisioned;
use crate::error::{self, Result};
use deploysys_config::StorageConfig;
use log::{debug, info};
use snafu::{ensure, OptionExt, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What later phases need from the storage phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StorageOutputs {
    pub(crate) account: String,
    pub(crate) container: String,
    /// Connection string handed to the search data source and the web app.  It names the account
    /// but carries no key; access is granted through the account's identity settings.
    pub(crate) connection_string: String,
    pub(crate) uploaded: Vec<String>,
}

pub(crate) fn connection_string(account: &str, endpoint_suffix: &str) -> String {
    format!(
        "DefaultEndpointsProtocol=https;AccountName={};EndpointSuffix={}",
        account, endpoint_suffix
    )
}

/// A local file and the blob name it is uploaded as
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SampleDocument {
    pub(crate) path: PathBuf,
    pub(crate) blob_name: String,
}

/// Lists every file under `dir`, sorted, named relative to `dir` with `/` separators.
pub(crate) fn sample_documents(dir: &Path) -> Result<Vec<SampleDocument>> {
    ensure!(
        dir.is_dir(),
        error::MissingSampleDirSnafu { path: dir }
    );
    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.context(error::WalkDirSnafu { path: dir })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .context(error::StripPrefixSnafu {
                path: entry.path(),
                prefix: dir,
            })?;
        let mut parts = Vec::new();
        for component in relative.components() {
            let part = component
                .as_os_str()
                .to_str()
                .context(error::NonUtf8PathSnafu { path: entry.path() })?;
            parts.push(part);
        }
        documents.push(SampleDocument {
            path: entry.path().to_path_buf(),
            blob_name: parts.join("/"),
        });
    }
    Ok(documents)
}

/// Content type for a file based on its extension
pub(crate) fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Creates the storage account and container, then uploads the sample documents.
pub(crate) async fn provision_storage(
    cloud: &dyn CloudApi,
    resource_group: &str,
    account: &str,
    location: &str,
    endpoint_suffix: &str,
    config: &StorageConfig,
    provisioned: &mut Provisioned,
) -> Result<StorageOutputs> {
    let documents = sample_documents(&config.sample_documents_dir)?;

    info!("Creating storage account '{}'...", account);
    cloud
        .create_storage_account(resource_group, account, location)
        .await
        .context(error::CloudSnafu {
            op: "create storage account",
            target: account,
        })?;
    provisioned.record("storage account", account);

    info!("Creating blob container '{}'...", config.container);
    cloud
        .create_blob_container(resource_group, account, &config.container)
        .await
        .context(error::CloudSnafu {
            op: "create blob container",
            target: &config.container,
        })?;

    info!(
        "Uploading {} documents from '{}'...",
        documents.len(),
        config.sample_documents_dir.display()
    );
    let mut uploaded = Vec::with_capacity(documents.len());
    for document in documents {
        let body = fs::read(&document.path).context(error::FileReadSnafu {
            path: &document.path,
        })?;
        let content_type = content_type(&document.path);
        debug!(
            "Uploading '{}' ({}, {} bytes)",
            document.blob_name,
            content_type,
            body.len()
        );
        cloud
            .upload_blob(
                account,
                &config.container,
                &document.blob_name,
                &content_type,
                body,
            )
            .await
            .context(error::CloudSnafu {
                op: "upload blob",
                target: &document.blob_name,
            })?;
        uploaded.push(document.blob_name);
    }

    Ok(StorageOutputs {
        account: account.to_string(),
        container: config.container.clone(),
        connection_string: connection_string(account, endpoint_suffix),
        uploaded,
    })
}
