//! Reachability commands.

use bazaar_client::Marketplace;
use bazaar_client::diagnostics::{check_server, probe_endpoints};
use serde_json::json;
use tracing::warn;

use super::{CliError, print_json};

/// Check that the backend answers.
pub async fn health(market: &Marketplace) -> Result<(), CliError> {
    let path = check_server(&market.client).await?;
    print_json(&json!({
        "reachable": true,
        "base_url": market.client.config().base_url.as_str(),
        "path": path,
    }))
}

/// Probe each read endpoint.
pub async fn probe(market: &Marketplace) -> Result<(), CliError> {
    let reports = probe_endpoints(&market.auth, &market.catalog, &market.favorites).await;
    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        warn!(failed, total = reports.len(), "Some endpoints failed");
    }
    print_json(&reports)
}
