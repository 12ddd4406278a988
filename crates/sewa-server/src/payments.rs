//! eSewa-style redirect payments.
//!
//! The buyer opens a transaction for a booking and is sent to the gateway
//! form. The gateway redirects the browser back to the success or failure
//! callback, which records the payment and redirects to the frontend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sewa_shared::constants::BUYER_FEE_PERCENT;
use sewa_shared::{format_minor_units, parse_minor_units, BookingId, Principal};
use sewa_store::PaymentStatus;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bookings::BookingService;
use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::store::Store;

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub booking_id: Option<BookingId>,
}

/// Everything the client needs to post the gateway form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaymentInitiation {
    pub booking_id: BookingId,
    pub transaction_id: String,
    pub gateway_url: String,
    pub product_code: String,
    /// Package price plus the buyer service fee, e.g. `"1050.00"`.
    pub amount: String,
    pub success_url: String,
    pub failure_url: String,
}

/// Query string of the success callback.
#[derive(Debug, Default, Deserialize)]
pub struct SuccessCallback {
    pub oid: Option<String>,
    #[serde(rename = "refId")]
    pub ref_id: Option<String>,
    pub amt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailureCallback {
    pub oid: Option<String>,
}

/// Amount charged for a booking, in minor units.
pub fn charge_for(price: i64) -> i64 {
    price * (100 + BUYER_FEE_PERCENT)
}

pub struct PaymentService {
    store: Store,
    bookings: Arc<BookingService>,
    config: Arc<ServerConfig>,
}

impl PaymentService {
    pub fn new(store: Store, bookings: Arc<BookingService>, config: Arc<ServerConfig>) -> Self {
        Self {
            store,
            bookings,
            config,
        }
    }

    pub async fn initiate(
        &self,
        buyer: &Principal,
        req: InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, ServiceError> {
        let booking_id = req
            .booking_id
            .ok_or_else(|| ServiceError::InvalidArgument("booking_id is required".into()))?;
        let booking = self.store.call(move |db| db.get_booking(booking_id)).await?;

        if booking.buyer_id != buyer.id {
            return Err(ServiceError::Forbidden(
                "Only the buyer can pay for this booking".into(),
            ));
        }
        if booking.paid {
            return Err(ServiceError::InvalidState("Booking is already paid".into()));
        }
        if !booking.status.accepts_payment() {
            return Err(ServiceError::InvalidState(format!(
                "A {} booking cannot be paid",
                booking.status
            )));
        }

        let amount = charge_for(booking.price);
        let transaction_id = Uuid::new_v4().to_string();
        let tx = transaction_id.clone();
        self.store
            .call(move |db| db.insert_payment(&tx, booking_id, amount))
            .await?;

        info!(booking = %booking_id, transaction = %transaction_id, amount, "Payment initiated");

        let base = &self.config.public_base_url;
        Ok(PaymentInitiation {
            booking_id,
            transaction_id,
            gateway_url: self.config.payment_gateway_url.clone(),
            product_code: self.config.payment_product_code.clone(),
            amount: format_minor_units(amount),
            success_url: format!("{base}/api/payments/esewa/success"),
            failure_url: format!("{base}/api/payments/esewa/failure"),
        })
    }

    /// Record a successful gateway redirect. Returns the paid booking.
    pub async fn complete(&self, callback: SuccessCallback) -> Result<BookingId, ServiceError> {
        let oid = callback
            .oid
            .filter(|o| !o.is_empty())
            .ok_or_else(|| ServiceError::InvalidArgument("missing oid".into()))?;

        let lookup = oid.clone();
        let payment = self.store.call(move |db| db.get_payment(&lookup)).await?;
        if payment.status == PaymentStatus::Failed {
            return Err(ServiceError::InvalidState("Payment already failed".into()));
        }

        let reported = callback.amt.as_deref().and_then(parse_minor_units);
        if reported != Some(payment.amount) {
            warn!(
                transaction = %oid,
                expected = payment.amount,
                reported = ?callback.amt,
                "Payment amount mismatch"
            );
            return Err(ServiceError::InvalidArgument("amount mismatch".into()));
        }

        let booking = self.bookings.mark_paid(payment.booking_id, &oid).await?;

        let tx = oid.clone();
        let reference = callback.ref_id;
        self.store
            .call(move |db| db.settle_payment(&tx, PaymentStatus::Completed, reference.as_deref()))
            .await?;

        Ok(booking.id)
    }

    /// Mark a referenced pending payment failed. Unknown ids are ignored.
    pub async fn fail(&self, callback: FailureCallback) {
        let Some(oid) = callback.oid.filter(|o| !o.is_empty()) else {
            return;
        };
        let tx = oid.clone();
        match self
            .store
            .call(move |db| db.settle_payment(&tx, PaymentStatus::Failed, None))
            .await
        {
            Ok(true) => info!(transaction = %oid, "Payment failed at gateway"),
            Ok(false) => {}
            Err(e) => warn!(transaction = %oid, error = %e, "Could not record failed payment"),
        }
    }

    pub fn success_redirect(&self, booking_id: BookingId) -> String {
        format!(
            "{}/booking/confirm?success=true&booking={booking_id}",
            self.config.frontend_url
        )
    }

    pub fn failure_redirect(&self) -> String {
        format!("{}/booking/confirm?error=true", self.config.frontend_url)
    }
}
