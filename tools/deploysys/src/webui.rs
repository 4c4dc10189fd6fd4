//! Builds the companion web UI, points its settings file at the new resources, and publishes
//! the build output to the web app as a zip archive.

use crate::azure::CloudApi;
use crate::error::{self, Result};
use crate::shared::Secret;
use deploysys_config::{BrandingConfig, WebUiConfig};
use duct::cmd;
use log::{debug, info};
use serde_json::Value;
use snafu::{ensure, OptionExt, ResultExt};
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Values written into the web UI's settings file
pub(crate) struct WebUiSettings<'a> {
    pub(crate) search_service: &'a str,
    pub(crate) search_admin_key: &'a Secret,
    pub(crate) index: &'a str,
    pub(crate) indexer: &'a str,
    pub(crate) storage_account: &'a str,
    pub(crate) storage_connection_string: &'a str,
    pub(crate) storage_container_address: String,
    pub(crate) branding: &'a BrandingConfig,
}

impl WebUiSettings<'_> {
    fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("SearchServiceName", self.search_service),
            ("SearchApiKey", self.search_admin_key.expose()),
            ("SearchIndexName", self.index),
            ("SearchIndexerName", self.indexer),
            ("StorageAccountName", self.storage_account),
            ("StorageAccountKey", self.storage_connection_string),
            (
                "StorageContainerAddress",
                self.storage_container_address.as_str(),
            ),
            ("OrganizationName", self.branding.organization_name.as_str()),
            ("OrganizationLogo", self.branding.organization_logo.as_str()),
            (
                "OrganizationWebSiteUrl",
                self.branding.organization_web_site_url.as_str(),
            ),
        ]
    }
}

/// Runs the configured build command from the web UI's source directory.
pub(crate) fn build(config: &WebUiConfig) -> Result<()> {
    let output = config
        .output_dir
        .to_str()
        .context(error::NonUtf8PathSnafu {
            path: &config.output_dir,
        })?;
    let command = config
        .build_command
        .replace("{output}", &shell_words::quote(output));
    let words = shell_words::split(&command).context(error::CommandSplitSnafu {
        command: &command,
    })?;
    let (program, args) = words.split_first().context(error::EmptyCommandSnafu)?;

    info!(
        "Building web UI in '{}': {}",
        config.source_dir.display(),
        command
    );
    let result = cmd(program.as_str(), args)
        .dir(&config.source_dir)
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .run()
        .context(error::BuildSpawnSnafu { command: &command })?;
    ensure!(
        result.status.success(),
        error::BuildResultSnafu {
            command: &command,
            code: result
                .status
                .code()
                .map(|i| i.to_string())
                .unwrap_or_else(|| "<unknown>".to_string()),
            output: String::from_utf8_lossy(&result.stdout),
        }
    );
    debug!("Build output:\n{}", String::from_utf8_lossy(&result.stdout));

    ensure!(
        config.output_dir.is_dir(),
        error::MissingBuildOutputSnafu {
            path: &config.output_dir
        }
    );
    Ok(())
}

/// Overwrites the known top-level fields of the JSON settings file at `path`, keeping the rest.
pub(crate) fn rewrite_settings(path: &Path, settings: &WebUiSettings<'_>) -> Result<()> {
    let original = fs::read_to_string(path).context(error::FileReadSnafu { path })?;
    let mut document: Value =
        serde_json::from_str(&original).context(error::SettingsParseSnafu { path })?;
    let object = document
        .as_object_mut()
        .context(error::SettingsNotObjectSnafu { path })?;
    for (field, value) in settings.fields() {
        object.insert(field.to_string(), Value::String(value.to_string()));
    }
    let rewritten =
        serde_json::to_string_pretty(&document).context(error::SettingsSerializeSnafu { path })?;
    fs::write(path, rewritten).context(error::FileWriteSnafu { path })
}

/// Zips everything under `indir`, with entry names relative to it.
pub(crate) fn create_archive<W>(indir: &Path, writer: W) -> Result<W>
where
    W: io::Write + Seek,
{
    let mut archive = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(indir).sort_by_file_name() {
        let entry = entry.context(error::WalkDirSnafu { path: indir })?;
        let path = entry.path();
        let relative = path.strip_prefix(indir).context(error::StripPrefixSnafu {
            path,
            prefix: indir,
        })?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let mut parts = Vec::new();
        for component in relative.components() {
            parts.push(
                component
                    .as_os_str()
                    .to_str()
                    .context(error::NonUtf8PathSnafu { path })?,
            );
        }
        let name = parts.join("/");

        if entry.file_type().is_dir() {
            archive
                .add_directory(name, options)
                .context(error::ArchiveSnafu { path })?;
        } else {
            archive
                .start_file(name, options)
                .context(error::ArchiveSnafu { path })?;
            let mut file = File::open(path).context(error::FileReadSnafu { path })?;
            io::copy(&mut file, &mut archive).context(error::FileReadSnafu { path })?;
        }
    }

    archive.finish().context(error::ArchiveSnafu { path: indir })
}

/// Builds the web UI, rewrites its settings and deploys the output to `web_app`.
pub(crate) async fn publish_web_ui(
    cloud: &dyn CloudApi,
    config: &WebUiConfig,
    settings: &WebUiSettings<'_>,
    web_app: &str,
) -> Result<()> {
    build(config)?;

    let settings_path = config.output_dir.join(&config.settings_file);
    info!("Writing web UI settings to '{}'...", settings_path.display());
    rewrite_settings(&settings_path, settings)?;

    let scratch = tempfile::tempfile().context(error::FileWriteSnafu {
        path: &config.output_dir,
    })?;
    let mut file = create_archive(&config.output_dir, scratch)?;
    file.rewind().context(error::FileReadSnafu {
        path: &config.output_dir,
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .context(error::FileReadSnafu {
            path: &config.output_dir,
        })?;

    info!(
        "Publishing web UI to '{}' ({} bytes)...",
        web_app,
        bytes.len()
    );
    cloud
        .publish_web_app(web_app, bytes)
        .await
        .context(error::CloudSnafu {
            op: "publish web UI to",
            target: web_app,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::fake::FakeCloud;
    use crate::error::Error;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;
    use std::io::Cursor;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn web_ui_config(source: &Path, output: &Path, build_command: &str) -> WebUiConfig {
        WebUiConfig {
            source_dir: source.to_path_buf(),
            build_command: build_command.to_string(),
            output_dir: output.to_path_buf(),
            settings_file: "appsettings.json".into(),
            branding: BrandingConfig::default(),
        }
    }

    fn with_settings<F: FnOnce(&WebUiSettings<'_>)>(f: F) {
        let key = Secret::new("fabrikam1search-admin");
        let branding = BrandingConfig {
            organization_name: "Fabrikam".to_string(),
            ..Default::default()
        };
        let settings = WebUiSettings {
            search_service: "fabrikam1search",
            search_admin_key: &key,
            index: "fabrikam1-index",
            indexer: "fabrikam1-indexer",
            storage_account: "fabrikam1str",
            storage_connection_string: "DefaultEndpointsProtocol=https;AccountName=fabrikam1str;EndpointSuffix=core.usgovcloudapi.net",
            storage_container_address: "https://fabrikam1str.blob.core.usgovcloudapi.net/documents"
                .to_string(),
            branding: &branding,
        };
        f(&settings)
    }

    #[test]
    fn settings_rewritten_other_fields_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appsettings.json");
        fs::write(
            &path,
            r#"{"Logging": {"LogLevel": {"Default": "Warning"}}, "SearchServiceName": "", "AllowedHosts": "*"}"#,
        )
        .unwrap();

        with_settings(|settings| rewrite_settings(&path, settings).unwrap());

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_json_eq!(
            value,
            json!({
                "Logging": {"LogLevel": {"Default": "Warning"}},
                "AllowedHosts": "*",
                "SearchServiceName": "fabrikam1search",
                "SearchApiKey": "fabrikam1search-admin",
                "SearchIndexName": "fabrikam1-index",
                "SearchIndexerName": "fabrikam1-indexer",
                "StorageAccountName": "fabrikam1str",
                "StorageAccountKey": "DefaultEndpointsProtocol=https;AccountName=fabrikam1str;EndpointSuffix=core.usgovcloudapi.net",
                "StorageContainerAddress": "https://fabrikam1str.blob.core.usgovcloudapi.net/documents",
                "OrganizationName": "Fabrikam",
                "OrganizationLogo": "~/images/logo.png",
                "OrganizationWebSiteUrl": "https://www.microsoft.com"
            })
        );
    }

    #[test]
    fn non_object_settings_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("appsettings.json");
        fs::write(&path, "[1, 2]").unwrap();
        with_settings(|settings| {
            assert!(matches!(
                rewrite_settings(&path, settings),
                Err(Error::SettingsNotObject { .. })
            ))
        });
    }

    #[test]
    fn archive_paths_relative_to_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("wwwroot/css")).unwrap();
        fs::write(dir.path().join("app.dll"), b"binary").unwrap();
        fs::write(dir.path().join("wwwroot/css/site.css"), b"body {}").unwrap();

        let cursor = create_archive(dir.path(), Cursor::new(Vec::new())).unwrap();
        let mut archive = ZipArchive::new(cursor).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["app.dll", "wwwroot/", "wwwroot/css/", "wwwroot/css/site.css"]
        );

        let mut css = String::new();
        archive
            .by_name("wwwroot/css/site.css")
            .unwrap()
            .read_to_string(&mut css)
            .unwrap();
        assert_eq!(css, "body {}");
    }

    #[test]
    fn build_runs_in_source_dir() {
        let source = TempDir::new().unwrap();
        let output = source.path().join("publish out");
        let config = web_ui_config(
            source.path(),
            &output,
            r#"sh -c 'mkdir -p "$0" && pwd > "$0/built-in.txt"' {output}"#,
        );

        build(&config).unwrap();
        let built_in = fs::read_to_string(output.join("built-in.txt")).unwrap();
        assert_eq!(
            Path::new(built_in.trim()).canonicalize().unwrap(),
            source.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn failed_build_carries_output() {
        let source = TempDir::new().unwrap();
        let config = web_ui_config(
            source.path(),
            &source.path().join("out"),
            "sh -c 'echo restore failed >&2; exit 3'",
        );

        match build(&config) {
            Err(Error::BuildResult { code, output, .. }) => {
                assert_eq!(code, "3");
                assert!(output.contains("restore failed"));
            }
            other => panic!("expected build failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn published_archive_has_rewritten_settings() {
        let source = TempDir::new().unwrap();
        let output = source.path().join("out");
        let config = web_ui_config(
            source.path(),
            &output,
            r#"sh -c 'mkdir -p "$0" && echo "{}" > "$0/appsettings.json"' {output}"#,
        );
        let cloud = FakeCloud::new();
        cloud.with_state(|s| {
            s.web_apps
                .insert("fabrikam1app".to_string(), "plan".to_string())
        });

        let key = Secret::new("fabrikam1search-admin");
        let branding = BrandingConfig::default();
        let settings = WebUiSettings {
            search_service: "fabrikam1search",
            search_admin_key: &key,
            index: "fabrikam1-index",
            indexer: "fabrikam1-indexer",
            storage_account: "fabrikam1str",
            storage_connection_string: "label",
            storage_container_address: "https://fabrikam1str.blob.core.usgovcloudapi.net/documents"
                .to_string(),
            branding: &branding,
        };
        publish_web_ui(&cloud, &config, &settings, "fabrikam1app")
            .await
            .unwrap();

        let published = cloud.with_state(|s| s.published["fabrikam1app"].clone());
        let mut archive = ZipArchive::new(Cursor::new(published)).unwrap();
        let mut contents = String::new();
        archive
            .by_name("appsettings.json")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["SearchIndexName"], "fabrikam1-index");
        assert_eq!(value["OrganizationName"], "Microsoft");
    }
}
