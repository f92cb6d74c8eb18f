use async_trait::async_trait;

use crate::model::Reservation;

/// Payment authorization, consulted between Pending and Confirmed.
/// Capturing, refunding and the gateway protocol live behind this seam.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(&self, reservation: &Reservation) -> bool;
}

/// Authorizes everything. Used when no payment gateway is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl PaymentAuthorizer for AcceptAll {
    async fn authorize(&self, _reservation: &Reservation) -> bool {
        true
    }
}
