//! Charity Destination Resolver
//!
//! The charity routing collaborator turns an external organization id into a
//! per-settlement deposit address. When routing fails (timeout, non-OK
//! response, malformed address), a host-supplied static address is the
//! fallback; when neither produces a destination, distribution aborts. The
//! charity minimum share is a product invariant, never best-effort.

use crate::errors::{SettlementError, SettleResult};
use crate::types::{AccountId, AssetId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Request body for the routing collaborator's deposit-address endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct DepositAddressRequest {
    pub organization_id: String,
    pub asset: AssetId,
    pub network: String,
    pub amount: u64,
    pub metadata: String,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResponse {
    deposit_address: String,
}

/// External charity-routing collaborator.
#[async_trait]
pub trait CharityRouter: Send + Sync {
    /// Obtain a deposit destination for this settlement.
    async fn deposit_address(&self, request: &DepositAddressRequest) -> SettleResult<AccountId>;
}

/// HTTP implementation of the routing collaborator:
/// `POST {base_url}/deposit-address`.
pub struct HttpCharityRouter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCharityRouter {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> SettleResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SettlementError::Config(format!("charity http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CharityRouter for HttpCharityRouter {
    async fn deposit_address(&self, request: &DepositAddressRequest) -> SettleResult<AccountId> {
        let url = format!("{}/deposit-address", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SettlementError::CharityResolution(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SettlementError::CharityResolution(format!(
                "routing collaborator returned {}",
                status
            )));
        }

        let body: DepositAddressResponse = response.json().await.map_err(|e| {
            SettlementError::CharityResolution(format!("malformed response: {}", e))
        })?;
        AccountId::new(body.deposit_address)
            .map_err(|e| SettlementError::CharityResolution(format!("malformed address: {}", e)))
    }
}

/// Resolves the charity leg's destination for one settlement attempt.
pub struct CharityResolver<'a> {
    router: &'a dyn CharityRouter,
    network: String,
}

impl<'a> CharityResolver<'a> {
    pub fn new(router: &'a dyn CharityRouter, network: impl Into<String>) -> Self {
        Self {
            router,
            network: network.into(),
        }
    }

    /// Resolve the destination: routed address when an organization is
    /// given, falling back to the host-supplied static address, aborting
    /// when neither succeeds.
    pub async fn resolve(
        &self,
        organization_id: Option<&str>,
        fallback: Option<&AccountId>,
        asset: &AssetId,
        amount_preview: u64,
        memo: &str,
    ) -> SettleResult<AccountId> {
        if let Some(org) = organization_id {
            let request = DepositAddressRequest {
                organization_id: org.to_string(),
                asset: asset.clone(),
                network: self.network.clone(),
                amount: amount_preview,
                metadata: memo.to_string(),
            };
            match self.router.deposit_address(&request).await {
                Ok(address) => {
                    info!(organization = org, %address, "charity destination routed");
                    return Ok(address);
                }
                Err(e) => {
                    warn!(organization = org, error = %e, "charity routing failed");
                }
            }
        }
        match fallback {
            Some(address) => {
                info!(%address, "using host-supplied charity fallback address");
                Ok(address.clone())
            }
            None => Err(SettlementError::CharityResolution(
                "routing unavailable and no fallback address supplied".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRouter(Option<&'static str>);

    #[async_trait]
    impl CharityRouter for FixedRouter {
        async fn deposit_address(
            &self,
            _request: &DepositAddressRequest,
        ) -> SettleResult<AccountId> {
            match self.0 {
                Some(address) => AccountId::new(address),
                None => Err(SettlementError::CharityResolution("timed out".to_string())),
            }
        }
    }

    fn usdc() -> AssetId {
        AssetId::new("USDC").unwrap()
    }

    #[tokio::test]
    async fn test_routed_address_wins() {
        let router = FixedRouter(Some("charity-routed"));
        let resolver = CharityResolver::new(&router, "mainnet");
        let fallback = AccountId::new("static-addr").unwrap();
        let address = resolver
            .resolve(Some("org-1"), Some(&fallback), &usdc(), 480, "memo")
            .await
            .unwrap();
        assert_eq!(address.as_str(), "charity-routed");
    }

    #[tokio::test]
    async fn test_router_failure_falls_back_to_static() {
        let router = FixedRouter(None);
        let resolver = CharityResolver::new(&router, "mainnet");
        let fallback = AccountId::new("static-addr").unwrap();
        let address = resolver
            .resolve(Some("org-1"), Some(&fallback), &usdc(), 480, "memo")
            .await
            .unwrap();
        assert_eq!(address.as_str(), "static-addr");
    }

    #[tokio::test]
    async fn test_no_route_no_fallback_aborts() {
        // Scenario E: routing times out and no fallback was supplied
        let router = FixedRouter(None);
        let resolver = CharityResolver::new(&router, "mainnet");
        let err = resolver
            .resolve(Some("org-1"), None, &usdc(), 480, "memo")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::CharityResolution(_)));
    }

    #[tokio::test]
    async fn test_no_organization_uses_fallback_directly() {
        let router = FixedRouter(Some("should-not-be-called"));
        let resolver = CharityResolver::new(&router, "mainnet");
        let fallback = AccountId::new("static-addr").unwrap();
        let address = resolver
            .resolve(None, Some(&fallback), &usdc(), 480, "memo")
            .await
            .unwrap();
        assert_eq!(address.as_str(), "static-addr");
    }
}
