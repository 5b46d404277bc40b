use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use skysweep_core::CredentialHandle;

/// Per-call deadline applied to every AWS operation.
const API_DEADLINE: Duration = Duration::from_secs(120);

/// Build an `SdkConfig` for one (handle, region) pair.
///
/// This is the only place that translates a [`CredentialHandle`] into AWS SDK
/// credentials; service clients are constructed from the returned config on
/// demand and are cheap to clone. The operation timeout bounds each API call
/// including the SDK's own retries.
pub async fn sdk_config(handle: &CredentialHandle, region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(API_DEADLINE)
                .build(),
        )
        .credentials_provider(aws_sdk_sts::config::Credentials::new(
            handle.access_key.clone(),
            handle.secret_key.clone(),
            None,
            None,
            "skysweep-handle",
        ))
        .load()
        .await
}
