use super::client::ArmClient;
use super::{error, Result, REGISTERED};
use log::info;
use serde_json::Value;
use snafu::ensure;
use std::time::Duration;

/// How long to keep checking on a resource that is still provisioning
#[derive(Debug, Clone)]
pub(crate) struct PollSettings {
    pub(crate) max_attempts: u32,
    pub(crate) interval: Duration,
}

impl Default for PollSettings {
    // Max wait is 15 mins (90 attempts * 10s)
    fn default() -> Self {
        Self {
            max_attempts: 90,
            interval: Duration::from_secs(10),
        }
    }
}

pub(super) fn provisioning_state(resource: &Value) -> Option<&str> {
    resource
        .pointer("/properties/provisioningState")
        .and_then(Value::as_str)
}

pub(super) fn is_succeeded(state: &str) -> bool {
    state.eq_ignore_ascii_case("Succeeded")
}

pub(super) fn is_failed(state: &str) -> bool {
    state.eq_ignore_ascii_case("Failed") || state.eq_ignore_ascii_case("Canceled")
}

/// Polls the resource at `uri` until its provisioning state is terminal.  A resource that
/// doesn't report a provisioning state is taken as ready once it can be read; one that can't be
/// read yet counts as still provisioning.
pub(super) async fn wait_for_provisioning(
    client: &ArmClient,
    uri: &str,
    resource: &str,
    poll: &PollSettings,
) -> Result<Value> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let current = client.get_json(uri).await?;
        let state = match &current {
            Some(value) => provisioning_state(value).unwrap_or("Succeeded").to_string(),
            None => "NotFound".to_string(),
        };

        if is_succeeded(&state) {
            info!("'{}' is ready", resource);
            return Ok(current.unwrap_or(Value::Null));
        }
        ensure!(
            !is_failed(&state),
            error::ProvisioningFailedSnafu { resource, state }
        );
        ensure!(
            attempts < poll.max_attempts,
            error::ProvisioningTimeoutSnafu {
                resource,
                attempts,
                state,
            }
        );

        info!(
            "Waiting for '{}' to finish provisioning, current state is '{}'...",
            resource, state
        );
        tokio::time::sleep(poll.interval).await;
    }
}

/// Polls the provider at `uri` until its registration state is `Registered`.  Registration runs
/// in the background after the register call returns.
pub(super) async fn wait_for_registration(
    client: &ArmClient,
    uri: &str,
    namespace: &str,
    poll: &PollSettings,
) -> Result<()> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let state = match client.get_json(uri).await? {
            Some(provider) => provider
                .get("registrationState")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            None => "NotFound".to_string(),
        };

        if state.eq_ignore_ascii_case(REGISTERED) {
            info!("Provider '{}' is registered", namespace);
            return Ok(());
        }
        ensure!(
            attempts < poll.max_attempts,
            error::RegistrationTimeoutSnafu {
                namespace,
                attempts,
                state,
            }
        );

        info!(
            "Waiting for provider '{}' to register, current state is '{}'...",
            namespace, state
        );
        tokio::time::sleep(poll.interval).await;
    }
}
