//! Application state for the bastion.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::auth::AuthForwarder;
use common::config::AppConfig;
use common::query::DirectSqlBackend;
use common::router::GatewayRouter;
use common::secrets::{build_secret_store, SecretResolver};
use common::server::HttpState;
use common::signing::{SdkCredentialSource, ServiceScope, SignatureVerifier};
use tracing::info;

use crate::executor::PgQueryExecutor;

/// Wires the router: `/sql` runs against Postgres, `/auth` goes to the
/// identity provider. With `VERIFY_SIGNATURES` every request must carry the
/// gateway's second-hop signature.
pub async fn build_state(config: &AppConfig) -> Result<HttpState> {
    let sdk_config = config.aws_sdk_config().await;

    let store = build_secret_store(config, &sdk_config)?;
    let resolver = SecretResolver::new(store);
    let backend = DirectSqlBackend::new(config, resolver, Arc::new(PgQueryExecutor::new()));

    let auth = AuthForwarder::with_timeout(
        &config.contently_url,
        Duration::from_secs(config.http_timeout_secs),
    )?;

    let mut router = GatewayRouter::new(auth, Arc::new(backend));
    if config.signing.verify_signatures {
        let scope = ServiceScope::new(&config.signing.region, &config.signing.bastion_service);
        info!(region = %scope.region, service = %scope.service, "verifying request signatures");
        router = router.with_verifier(SignatureVerifier::new(
            Arc::new(SdkCredentialSource::new(&sdk_config)),
            scope,
        ));
    }

    info!(
        environment = %config.environment,
        read_only = config.read_only,
        secret = %config.secret_name,
        "bastion configured"
    );

    Ok(HttpState {
        service_name: config.service_name.clone(),
        router,
    })
}
