//! Order aggregate - a confirmed production order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{CustomerId, OrderId, OrderLineItemId, PartId, QuoteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProduction,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProduction => "in_production",
            Self::Shipped => "shipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_production" => Ok(Self::InProduction),
            "shipped" => Ok(Self::Shipped),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::parse(format!("Unknown order status: {other}"))),
        }
    }
}

/// A production order. Within this core, orders are created only by the
/// quote conversion transaction; the total is always re-summed server-side
/// from line items, never taken from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    number: String,
    customer_id: CustomerId,
    quote_id: Option<QuoteId>,
    status: OrderStatus,
    total_cents: i64,
    created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        number: impl Into<String>,
        customer_id: CustomerId,
        quote_id: Option<QuoteId>,
        total_cents: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            number: number.into(),
            customer_id,
            quote_id,
            status: OrderStatus::Pending,
            total_cents,
            created_at: now,
        }
    }

    /// Reconstruct from stored data.
    pub fn reconstruct(
        id: OrderId,
        number: String,
        customer_id: CustomerId,
        quote_id: Option<QuoteId>,
        status: OrderStatus,
        total_cents: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            number,
            customer_id,
            quote_id,
            status,
            total_cents,
            created_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn quote_id(&self) -> Option<QuoteId> {
        self.quote_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_cents(&self) -> i64 {
        self.total_cents
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One line on an order, optionally pointing at a permanent part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    pub id: OrderLineItemId,
    pub order_id: OrderId,
    pub part_id: Option<PartId>,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl OrderLineItem {
    pub fn new(
        order_id: OrderId,
        part_id: Option<PartId>,
        description: impl Into<String>,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Self {
        Self {
            id: OrderLineItemId::new(),
            order_id,
            part_id,
            description: description.into(),
            quantity,
            unit_price_cents,
        }
    }

    pub fn total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}
