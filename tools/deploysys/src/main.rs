/*!
`deploysys` stands up a document search solution in an Azure Government subscription.

It provisions a storage account holding sample documents, a cognitive services account, a search
service with a data source, skillset, index and indexer over those documents, and a web app
configured to query them.  It can then build and publish a companion web UI to that web app.

Deployment parameters come from `Deploy.toml`, command-line flags, or `DEPLOYSYS_*` environment
variables.  Authentication goes through the Azure CLI, which must already be logged in.
*/

mod auth;
mod azure;
mod deploy;
mod error;
mod names;
mod resource_group;
mod search;
mod services;
mod shared;
mod storage;
mod subscription;
mod webapp;
mod webui;

use clap::Parser;
use deploy::DeployOptions;
use deploysys_config::DeploymentConfig;
use error::Result;
use simplelog::{CombinedLogger, Config as LogConfig, ConfigBuilder, LevelFilter, SimpleLogger};
use snafu::ResultExt;
use std::path::PathBuf;
use std::process;
use tokio::runtime::Runtime;

//   =^..^=   =^..^=   =^..^=  SUB-COMMAND STRUCTS  =^..^=   =^..^=   =^..^=

#[derive(Debug, Parser)]
struct Args {
    #[arg(global = true, long, default_value = "INFO")]
    log_level: LevelFilter,

    // Path to Deploy.toml (NOTE: must be specified before subcommand)
    #[arg(long, env = "DEPLOYSYS_CONFIG_PATH", default_value = "Deploy.toml")]
    deploy_config_path: PathBuf,

    #[command(subcommand)]
    subcommand: SubCommand,
}

/// Deployment parameters that take precedence over Deploy.toml
#[derive(Debug, Parser)]
struct ParameterArgs {
    /// Prefix every resource name is derived from
    #[arg(long, env = "DEPLOYSYS_UNIQUE_NAME")]
    unique_name: Option<String>,

    #[arg(long, env = "DEPLOYSYS_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Subscription ID to deploy into
    #[arg(long, env = "DEPLOYSYS_SUBSCRIPTION")]
    subscription: Option<String>,

    #[arg(long, env = "DEPLOYSYS_LOCATION")]
    location: Option<String>,

    /// Pricing tier of the search service, e.g. basic or standard
    #[arg(long, env = "DEPLOYSYS_SEARCH_SKU")]
    search_sku: Option<String>,
}

impl From<ParameterArgs> for DeploymentConfig {
    fn from(args: ParameterArgs) -> Self {
        DeploymentConfig {
            unique_name: args.unique_name,
            resource_group: args.resource_group,
            subscription: args.subscription,
            location: args.location,
            search_sku: args.search_sku,
        }
    }
}

#[derive(Debug, Parser)]
struct DeployArgs {
    #[command(flatten)]
    parameters: ParameterArgs,

    /// Provision everything but don't build or publish the web UI.
    #[arg(long)]
    skip_web_ui: bool,

    /// Print keys in full in the final summary instead of masking them.
    #[arg(long)]
    show_secrets: bool,
}

#[derive(Debug, Parser)]
struct ShowNamesArgs {
    #[command(flatten)]
    parameters: ParameterArgs,
}

#[derive(Debug, Parser)]
enum SubCommand {
    /// Provisions and configures every resource of the deployment.
    Deploy(DeployArgs),
    /// Prints the resource names the deployment would use.
    ShowNames(ShowNamesArgs),
}

//  =^..^=   =^..^=   =^..^=  MAIN METHODS  =^..^=   =^..^=   =^..^=

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.log_level {
        // Keep the HTTP stack quiet unless something goes wrong.
        LevelFilter::Info => {
            CombinedLogger::init(vec![
                SimpleLogger::new(
                    LevelFilter::Info,
                    ConfigBuilder::new()
                        .add_filter_ignore_str("reqwest")
                        .add_filter_ignore_str("hyper")
                        .add_filter_ignore_str("rustls")
                        .build(),
                ),
                SimpleLogger::new(
                    LevelFilter::Warn,
                    ConfigBuilder::new()
                        .add_filter_allow_str("reqwest")
                        .add_filter_allow_str("hyper")
                        .add_filter_allow_str("rustls")
                        .build(),
                ),
            ])
            .context(error::LoggerSnafu)?;
        }

        // Any other level applies to every crate, HTTP stack included.
        _ => {
            SimpleLogger::init(args.log_level, LogConfig::default()).context(error::LoggerSnafu)?
        }
    }

    match args.subcommand {
        SubCommand::Deploy(deploy_args) => {
            let options = DeployOptions {
                skip_web_ui: deploy_args.skip_web_ui,
                show_secrets: deploy_args.show_secrets,
            };
            let rt = Runtime::new().context(error::RuntimeSnafu)?;
            rt.block_on(async {
                deploy::deploy(
                    &args.deploy_config_path,
                    deploy_args.parameters.into(),
                    options,
                )
                .await
            })
        }
        SubCommand::ShowNames(show_args) => {
            deploy::show_names(&args.deploy_config_path, show_args.parameters.into())
        }
    }
}
