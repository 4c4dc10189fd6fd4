use crate::azure::{CloudApi, SubscriptionInfo, REGISTERED};
use crate::error::{self, Result};
use log::info;
use snafu::{ensure, ResultExt};

/// Resource providers every deployment needs
pub(crate) const REQUIRED_PROVIDERS: [&str; 5] = [
    "Microsoft.Storage",
    "Microsoft.Search",
    "Microsoft.CognitiveServices",
    "Microsoft.Web",
    "microsoft.insights",
];

/// Confirms the subscription can be used.
pub(crate) async fn select_subscription(
    cloud: &dyn CloudApi,
    subscription: &str,
) -> Result<SubscriptionInfo> {
    let info = cloud.subscription().await.context(error::CloudSnafu {
        op: "read subscription",
        target: subscription,
    })?;
    ensure!(
        info.state.eq_ignore_ascii_case("Enabled"),
        error::SubscriptionDisabledSnafu {
            subscription,
            state: &info.state,
        }
    );
    info!(
        "Using subscription '{}' ({})",
        info.display_name, info.id
    );
    Ok(info)
}

/// Registers any required provider that isn't registered yet, returning the ones registered.
pub(crate) async fn register_providers(cloud: &dyn CloudApi) -> Result<Vec<String>> {
    let mut registered = Vec::new();
    for namespace in REQUIRED_PROVIDERS {
        let state = cloud
            .provider_state(namespace)
            .await
            .context(error::CloudSnafu {
                op: "read provider",
                target: namespace,
            })?;
        if state.eq_ignore_ascii_case(REGISTERED) {
            info!("Provider '{}' is already registered", namespace);
            continue;
        }
        info!("Registering provider '{}' (was '{}')...", namespace, state);
        cloud
            .register_provider(namespace)
            .await
            .context(error::CloudSnafu {
                op: "register provider",
                target: namespace,
            })?;
        registered.push(namespace.to_string());
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::fake::FakeCloud;
    use crate::error::Error;

    #[tokio::test]
    async fn registered_providers_are_skipped() {
        let cloud = FakeCloud::new();
        cloud.with_state(|s| {
            s.providers
                .insert("Microsoft.Storage".to_string(), REGISTERED.to_string());
            s.providers
                .insert("Microsoft.Web".to_string(), "Unregistered".to_string());
        });

        let registered = register_providers(&cloud).await.unwrap();
        assert_eq!(
            registered,
            vec![
                "Microsoft.Search",
                "Microsoft.CognitiveServices",
                "Microsoft.Web",
                "microsoft.insights"
            ]
        );

        // Everything is registered now, so a second pass is a no-op.
        assert!(register_providers(&cloud).await.unwrap().is_empty());
        assert_eq!(cloud.with_state(|s| s.registrations.len()), 4);
    }

    #[tokio::test]
    async fn disabled_subscription_rejected() {
        let cloud = FakeCloud::new();
        cloud.with_state(|s| s.subscription_state = "Warned".to_string());
        let err = select_subscription(&cloud, "sub1").await.unwrap_err();
        assert!(matches!(err, Error::SubscriptionDisabled { state, .. } if state == "Warned"));
    }

    #[tokio::test]
    async fn enabled_subscription_selected() {
        let cloud = FakeCloud::new();
        let info = select_subscription(&cloud, "sub1").await.unwrap();
        assert_eq!(info.id, "sub1");
    }
}
