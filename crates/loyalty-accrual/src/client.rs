//! # Accrual Oracle Client
//!
//! Asks the external accrual system what an order earned.
//!
//! ## Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET {base}/api/orders/{number}                                        │
//! │                                                                         │
//! │  200  { "order": "79927398713", "status": "PROCESSED", "accrual": 500 } │
//! │       → verdict merged into the order                                  │
//! │  204  → NotRegistered     (the oracle has not seen the order yet)      │
//! │  429  → RateLimited       (Retry-After: <seconds>)                     │
//! │  ...  → UnexpectedStatus                                               │
//! │                                                                         │
//! │  Status REGISTERED is read as NEW. A verdict naming a different order  │
//! │  or carrying a negative accrual is an InvalidResponse.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One request per call. Nothing is retried here; the reconciler asks
//! again on its next tick.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{AccrualError, AccrualResult};
use loyalty_core::{Order, OrderStatus, Points};

// =============================================================================
// Oracle Trait
// =============================================================================

/// Source of accrual verdicts.
///
/// The reconciler only talks to this trait, so tests can script verdicts
/// without a network.
#[async_trait]
pub trait AccrualOracle: Send + Sync {
    /// Returns `order` with status and accrual as the oracle now sees them.
    /// Number, owner and upload time are carried over unchanged.
    async fn resolve(&self, order: &Order) -> AccrualResult<Order>;
}

// =============================================================================
// Base URL
// =============================================================================

/// Parses the configured oracle address into a base URL.
///
/// `http://` is assumed when the scheme is missing, and the path always
/// ends in `/` so relative joins keep any prefix.
pub fn base_url(address: &str) -> Result<Url, url::ParseError> {
    let address = address.trim();
    let mut url = if address.contains("://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{address}"))?
    };

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

// =============================================================================
// HTTP Client
// =============================================================================

/// Verdict body as the oracle sends it.
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(alias = "order")]
    number: String,
    status: OrderStatus,
    #[serde(default)]
    accrual: Option<Points>,
}

impl Verdict {
    fn merge_into(self, order: &Order) -> AccrualResult<Order> {
        if self.number != order.number {
            return Err(AccrualError::InvalidResponse(format!(
                "asked about order {}, got a verdict for {}",
                order.number, self.number
            )));
        }

        if self.accrual.is_some_and(|a| a.is_negative()) {
            return Err(AccrualError::InvalidResponse(format!(
                "negative accrual for order {}",
                order.number
            )));
        }

        Ok(Order {
            status: self.status,
            accrual: self.accrual,
            ..order.clone()
        })
    }
}

/// HTTP implementation of [`AccrualOracle`].
#[derive(Debug, Clone)]
pub struct AccrualClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl AccrualClient {
    /// Creates a client for the oracle at `address`.
    ///
    /// ## Arguments
    /// * `address` - base address, scheme optional
    /// * `timeout` - deadline for each request, connect through body
    pub fn new(address: &str, timeout: Duration) -> AccrualResult<Self> {
        let base = base_url(address)
            .map_err(|e| AccrualError::Request(format!("invalid oracle address '{address}': {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccrualError::Request(e.to_string()))?;

        Ok(AccrualClient {
            http,
            base,
            timeout,
        })
    }

    /// The resolved base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn order_url(&self, number: &str) -> AccrualResult<Url> {
        self.base
            .join(&format!("api/orders/{number}"))
            .map_err(|e| AccrualError::Request(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> AccrualError {
        if err.is_timeout() {
            AccrualError::Timeout(self.timeout)
        } else {
            AccrualError::from(err)
        }
    }
}

#[async_trait]
impl AccrualOracle for AccrualClient {
    async fn resolve(&self, order: &Order) -> AccrualResult<Order> {
        let url = self.order_url(&order.number)?;
        debug!(order = %order.number, %url, "Asking oracle");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::OK => {
                let verdict: Verdict = response.json().await.map_err(|e| self.transport_error(e))?;
                debug!(
                    order = %order.number,
                    status = %verdict.status,
                    accrual = ?verdict.accrual,
                    "Oracle verdict"
                );
                verdict.merge_into(order)
            }
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered(order.number.clone())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(AccrualError::RateLimited { retry_after })
            }
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
