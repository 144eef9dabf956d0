//! Quote aggregate - a priced offer built from customer CAD files.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{CustomerId, OrderId, QuoteId, QuoteLineItemId, QuotePartId};

/// Lifecycle status of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Rfq,
    Draft,
    Sent,
    Accepted,
    Rejected,
    Dropped,
    Expired,
}

impl QuoteStatus {
    /// Only quotes the customer has seen (or accepted) may become orders.
    pub fn is_convertible(self) -> bool {
        matches!(self, Self::Sent | Self::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rfq => "rfq",
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Dropped => "dropped",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rfq" => Ok(Self::Rfq),
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "dropped" => Ok(Self::Dropped),
            "expired" => Ok(Self::Expired),
            other => Err(DomainError::parse(format!("Unknown quote status: {other}"))),
        }
    }
}

/// A quote under negotiation with a customer.
///
/// `converted_to_order_id` transitions null -> set exactly once; the
/// compare-and-swap that enforces this under concurrent requests lives at
/// the storage layer, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    id: QuoteId,
    customer_id: CustomerId,
    number: String,
    status: QuoteStatus,
    converted_to_order_id: Option<OrderId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        customer_id: CustomerId,
        number: impl Into<String>,
        status: QuoteStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QuoteId::new(),
            customer_id,
            number: number.into(),
            status,
            converted_to_order_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct from stored data.
    pub fn reconstruct(
        id: QuoteId,
        customer_id: CustomerId,
        number: String,
        status: QuoteStatus,
        converted_to_order_id: Option<OrderId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            number,
            status,
            converted_to_order_id,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> QuoteId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn status(&self) -> QuoteStatus {
        self.status
    }

    pub fn converted_to_order_id(&self) -> Option<OrderId> {
        self.converted_to_order_id
    }

    pub fn is_converted(&self) -> bool {
        self.converted_to_order_id.is_some()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_status(&mut self, status: QuoteStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// One priced line on a quote.
///
/// `quote_part_id` is `None` for free-text lines (tooling charges, shipping)
/// that reference no CAD part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLineItem {
    pub id: QuoteLineItemId,
    pub quote_id: QuoteId,
    pub quote_part_id: Option<QuotePartId>,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl QuoteLineItem {
    pub fn new(
        quote_id: QuoteId,
        quote_part_id: Option<QuotePartId>,
        description: impl Into<String>,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Self {
        Self {
            id: QuoteLineItemId::new(),
            quote_id,
            quote_part_id,
            description: description.into(),
            quantity,
            unit_price_cents,
        }
    }

    pub fn total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}
