//! Application state for gateway service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::auth::AuthForwarder;
use common::config::AppConfig;
use common::router::GatewayRouter;
use common::server::HttpState;
use common::signing::{CredentialSource, SdkCredentialSource, ServiceScope, SignatureVerifier};

use crate::proxy::BastionForwarder;

/// Wires the router: `/auth` goes straight to the identity provider, `/sql`
/// takes the signed hop to the bastion.
pub async fn build_state(config: &AppConfig) -> Result<HttpState> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to create HTTP client")?;

    let bastion_url = config
        .services
        .bastion
        .as_deref()
        .context("BASTION_FUNCTION_URL is not set")?;

    let sdk_config = config.aws_sdk_config().await;
    let credentials: Arc<dyn CredentialSource> = Arc::new(SdkCredentialSource::new(&sdk_config));

    let bastion = BastionForwarder::new(
        bastion_url,
        ServiceScope::new(&config.signing.region, &config.signing.bastion_service),
        credentials.clone(),
        http_client.clone(),
    )?;
    let auth = AuthForwarder::new(&config.contently_url, http_client);

    let mut router = GatewayRouter::new(auth, Arc::new(bastion));
    if config.signing.verify_signatures {
        router = router.with_verifier(SignatureVerifier::new(
            credentials,
            ServiceScope::new(&config.signing.region, &config.signing.inbound_service),
        ));
    }

    Ok(HttpState {
        service_name: config.service_name.clone(),
        router,
    })
}
