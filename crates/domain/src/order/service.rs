//! Order service providing the API for order operations.

use std::time::Duration;

use cache::Cache;
use chrono::{TimeDelta, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use events::EventPublisher;
use ledger::{LedgerStore, RowQuery, SortOrder, Table};

use crate::error::{DomainError, Result};
use crate::pagination::{Page, Pagination};
use crate::record::DomainEvent;
use crate::repository::{Repository, WriteResult};

use super::{
    CreateOrder, Order, OrderEvent, OrderItem, OrderStatus, UpdateOrder, calculate_total,
};

/// Default age after which an unpaid order is cancelled.
pub const DEFAULT_PENDING_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Largest number of stale orders cancelled in one sweep.
const STALE_SWEEP_BATCH: usize = 500;

/// Service for managing orders.
///
/// Reads go through the cache; every write is decided against the store's
/// current row and committed with a conditional update. Events are published
/// after the write commits.
pub struct OrderService<S: LedgerStore, C: Cache> {
    repo: Repository<S, C, Order>,
    publisher: EventPublisher,
}

impl<S: LedgerStore, C: Cache> OrderService<S, C> {
    /// Creates a new order service.
    pub fn new(store: S, cache: C, publisher: EventPublisher, cache_ttl: Duration) -> Self {
        Self {
            repo: Repository::new(store, cache, cache_ttl),
            publisher,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S, C, Order> {
        &self.repo
    }

    /// Places a new order.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order> {
        let order = Order::place(cmd, Utc::now())?;
        self.repo.create(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_price, "Order created");

        self.publish(OrderEvent::created(&order)).await;
        Ok(order)
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.repo.get(&order_id.to_string()).await
    }

    /// Edits items, addresses or notes of an order that has not started
    /// processing.
    #[tracing::instrument(skip(self, cmd))]
    pub async fn update_order(&self, order_id: OrderId, cmd: UpdateOrder) -> Result<Order> {
        cmd.validate()?;

        let result = self
            .repo
            .execute(&order_id.to_string(), |order| {
                order.apply_update(&cmd, Utc::now()).map(Some)
            })
            .await?;

        tracing::info!(%order_id, "Order updated");
        self.publish(OrderEvent::updated(&result.record)).await;
        Ok(result.record)
    }

    /// Moves an order to a new status.
    ///
    /// The tracking number is recorded when moving to shipped.
    #[tracing::instrument(skip(self))]
    pub async fn transition_status(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        let result = self
            .repo
            .execute(&order_id.to_string(), |order| {
                order
                    .transition(to, tracking_number.as_deref(), Utc::now())
                    .map(Some)
            })
            .await?;

        self.after_transition(&result).await;
        Ok(result.record)
    }

    /// Cancels an order.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        self.transition_status(order_id, OrderStatus::Cancelled, None)
            .await
    }

    /// Lists a user's orders, newest first. Always reads the store.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_user(&self, user_id: &UserId, pagination: Pagination) -> Result<Page<Order>> {
        let query = RowQuery::new(Table::Orders).owner_id(user_id.as_str());
        self.list(query, pagination).await
    }

    /// Lists orders in a status, newest first. Always reads the store.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_status(
        &self,
        status: OrderStatus,
        pagination: Pagination,
    ) -> Result<Page<Order>> {
        let query = RowQuery::new(Table::Orders).status(status.as_str());
        self.list(query, pagination).await
    }

    /// Computes the rounded total of a list of items.
    pub fn calculate_total(items: &[OrderItem]) -> Result<Money> {
        calculate_total(items)
    }

    /// Cancels pending orders created more than `max_age` ago.
    ///
    /// An order that leaves pending while the sweep runs is skipped. Returns
    /// the number of orders cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_stale_pending(&self, max_age: Duration) -> Result<usize> {
        let max_age = TimeDelta::from_std(max_age)
            .map_err(|e| DomainError::validation(format!("invalid max age: {e}")))?;
        let cutoff = Utc::now() - max_age;

        let query = RowQuery::new(Table::Orders)
            .status(OrderStatus::Pending.as_str())
            .created_before(cutoff)
            .order(SortOrder::OldestFirst)
            .limit(STALE_SWEEP_BATCH);
        let (stale, _) = self.repo.query(query).await?;

        let mut cancelled = 0;
        for order in stale {
            let result = self
                .repo
                .execute(&order.id.to_string(), |current| {
                    if current.status != OrderStatus::Pending {
                        return Ok(None);
                    }
                    current
                        .transition(OrderStatus::Cancelled, None, Utc::now())
                        .map(Some)
                })
                .await;

            match result {
                Ok(result) if result.changed => {
                    self.after_transition(&result).await;
                    cancelled += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to cancel stale order");
                }
            }
        }

        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled stale pending orders");
        }
        Ok(cancelled)
    }

    /// Records a completed payment against an order and confirms it.
    ///
    /// Nothing changes if the order already carries the payment or is no
    /// longer pending.
    #[tracing::instrument(skip(self))]
    pub async fn record_payment(
        &self,
        order_id: OrderId,
        payment_id: &PaymentId,
    ) -> Result<WriteResult<Order>> {
        let result = self
            .repo
            .execute(&order_id.to_string(), |order| {
                Ok(order.record_payment(payment_id, Utc::now()))
            })
            .await?;

        if result.changed {
            self.after_transition(&result).await;
        } else {
            tracing::debug!(%order_id, %payment_id, "Payment already reflected on order");
        }
        Ok(result)
    }

    async fn list(&self, query: RowQuery, pagination: Pagination) -> Result<Page<Order>> {
        let query = query
            .limit(pagination.limit() as usize)
            .offset(pagination.offset());
        let (items, total) = self.repo.query(query).await?;
        Ok(Page {
            items,
            total,
            page: pagination.page(),
            limit: pagination.limit(),
        })
    }

    async fn after_transition(&self, result: &WriteResult<Order>) {
        let (from, to) = (result.before.status, result.record.status);
        metrics::counter!("order_transitions_total", "to" => to.as_str()).increment(1);
        tracing::info!(order_id = %result.record.id, %from, %to, "Order status changed");

        self.publish(OrderEvent::transitioned(&result.before, &result.record))
            .await;
    }

    async fn publish(&self, event: OrderEvent) {
        self.publisher
            .publish(event.exchange(), event.event_type(), &event)
            .await;
    }
}
