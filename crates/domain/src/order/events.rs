//! Order domain events.

use common::{Money, OrderId, UserId};
use events::Exchange;
use serde::{Deserialize, Serialize};

use crate::record::DomainEvent;

use super::model::Order;
use super::state::OrderStatus;

/// Events published on the `orders` exchange.
///
/// Each variant serializes as its data only; the event type travels in the
/// envelope and as the routing key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OrderEvent {
    /// Order was placed.
    Created(OrderEventData),

    /// Items, addresses or notes were edited.
    Updated(OrderEventData),

    /// Order moved to a new status other than cancelled.
    StatusChanged(OrderEventData),

    /// Order was cancelled.
    Cancelled(OrderEventData),
}

impl OrderEvent {
    pub const CREATED: &'static str = "order.created";
    pub const UPDATED: &'static str = "order.updated";
    pub const STATUS_CHANGED: &'static str = "order.status_changed";
    pub const CANCELLED: &'static str = "order.cancelled";

    pub fn created(order: &Order) -> Self {
        OrderEvent::Created(OrderEventData::new(order))
    }

    pub fn updated(order: &Order) -> Self {
        OrderEvent::Updated(OrderEventData::new(order))
    }

    /// Builds the event for a transition from `before` to `after`.
    pub fn transitioned(before: &Order, after: &Order) -> Self {
        let data = OrderEventData {
            old_status: Some(before.status),
            new_status: Some(after.status),
            ..OrderEventData::new(after)
        };
        if after.status == OrderStatus::Cancelled {
            OrderEvent::Cancelled(data)
        } else {
            OrderEvent::StatusChanged(data)
        }
    }

    pub fn data(&self) -> &OrderEventData {
        match self {
            OrderEvent::Created(data)
            | OrderEvent::Updated(data)
            | OrderEvent::StatusChanged(data)
            | OrderEvent::Cancelled(data) => data,
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => Self::CREATED,
            OrderEvent::Updated(_) => Self::UPDATED,
            OrderEvent::StatusChanged(_) => Self::STATUS_CHANGED,
            OrderEvent::Cancelled(_) => Self::CANCELLED,
        }
    }

    fn exchange(&self) -> Exchange {
        Exchange::Orders
    }
}

/// Payload shared by all order events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventData {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<OrderStatus>,
    pub order: Order,
}

impl OrderEventData {
    pub fn new(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id.clone(),
            status: order.status,
            total: order.total_price,
            old_status: None,
            new_status: None,
            order: order.clone(),
        }
    }
}
