//! Broker Client Trait
//!
//! The `BrokerClient` trait is the seam between the sync pipeline and the
//! broker's REST API. The pipeline only needs two calls: the account's order
//! history and per-instrument details for lot sizes.

use crate::domain::entities::account::AccountRef;
use crate::domain::entities::history::HistoryPayload;
use crate::domain::entities::instrument::InstrumentDetails;
use crate::domain::errors::BrokerError;
use async_trait::async_trait;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Fetch the full order history of an account, shape already resolved
    async fn fetch_history(&self, account: &AccountRef) -> BrokerResult<HistoryPayload>;

    /// Fetch display name and lot size of an instrument on a route
    async fn fetch_instrument(
        &self,
        account: &AccountRef,
        instrument_id: &str,
        route_id: &str,
    ) -> BrokerResult<InstrumentDetails>;
}
