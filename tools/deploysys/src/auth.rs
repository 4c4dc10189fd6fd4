//! Authentication goes through the Azure CLI: the operator logs in once with `az login`, and we
//! ask `az` for bearer tokens scoped to the subscription we deploy into.

use crate::shared::Secret;
use deploysys_config::CloudConfig;
use duct::cmd;
use log::{info, trace};
use serde::Deserialize;
use snafu::{ensure, ResultExt};

/// The az macro wraps duct to simplify calls to the Azure CLI, returning captured stdout.
macro_rules! az {
    ($format_str:expr, $($format_arg:expr),*) => {{
        let arg_str = format!($format_str, $($format_arg),*);
        trace!("az arg string: {}", arg_str);
        let args = shell_words::split(&arg_str).context(error::CommandSplitSnafu { command: &arg_str })?;
        trace!("az split args: {:#?}", args);

        let output = cmd("az", args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .context(error::AzSpawnSnafu)?;

        ensure!(output.status.success(), error::AzResultSnafu {
            command: arg_str,
            code: output.status.code().map(|i| i.to_string()).unwrap_or_else(|| "<unknown>".to_string()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
        output.stdout
    }}
}

/// Bearer tokens for the two audiences we talk to
#[derive(Debug, Clone)]
pub(crate) struct AccessTokens {
    pub(crate) management: Secret,
    pub(crate) storage: Secret,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzAccessToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
}

/// Authenticates once for the run: checks that `az` targets the expected cloud, then fetches a
/// management token and a storage data-plane token for the subscription.
pub(crate) fn acquire_tokens(cloud: &CloudConfig, subscription: &str) -> Result<AccessTokens> {
    let active_cloud = az!("cloud show --query name --output tsv",);
    let active_cloud = String::from_utf8_lossy(&active_cloud).trim().to_string();
    ensure!(
        active_cloud.eq_ignore_ascii_case(&cloud.az_cloud_name),
        error::WrongCloudSnafu {
            expected: &cloud.az_cloud_name,
            active: active_cloud,
        }
    );

    info!("Fetching access tokens for subscription '{}'...", subscription);
    let management = fetch_token(subscription, &cloud.management_token_resource())?;
    let storage = fetch_token(subscription, &cloud.storage_token_resource)?;
    Ok(AccessTokens {
        management,
        storage,
    })
}

fn fetch_token(subscription: &str, resource: &str) -> Result<Secret> {
    let stdout = az!(
        "account get-access-token --subscription '{}' --resource '{}' --output json",
        subscription,
        resource
    );
    parse_token(&stdout, resource)
}

fn parse_token(stdout: &[u8], resource: &str) -> Result<Secret> {
    let token: AzAccessToken =
        serde_json::from_slice(stdout).context(error::ParseTokenSnafu { resource })?;
    ensure!(
        !token.access_token.is_empty(),
        error::EmptyTokenSnafu { resource }
    );
    if let Some(expires_on) = token.expires_on {
        trace!("Token for '{}' expires on {}", resource, expires_on);
    }
    Ok(Secret::new(token.access_token))
}

pub(crate) mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(crate) enum Error {
        #[snafu(display("Error splitting shell command '{}': {}", command, source))]
        CommandSplit {
            command: String,
            source: shell_words::ParseError,
        },

        #[snafu(display("Failed to start az, is the Azure CLI installed? {}", source))]
        AzSpawn { source: std::io::Error },

        #[snafu(display("'az {}' returned {}: {}", command, code, stderr))]
        AzResult {
            command: String,
            code: String,
            stderr: String,
        },

        #[snafu(display(
            "az is configured for cloud '{}' but '{}' was expected; run 'az cloud set --name {}' and 'az login'",
            active,
            expected,
            expected
        ))]
        WrongCloud { expected: String, active: String },

        #[snafu(display("Failed to parse access token for '{}': {}", resource, source))]
        ParseToken {
            resource: String,
            source: serde_json::Error,
        },

        #[snafu(display("az returned an empty access token for '{}'", resource))]
        EmptyToken { resource: String },
    }
}
pub(crate) use error::Error;
type Result<T> = std::result::Result<T, error::Error>;
