//! Order and payment lifecycle managers.
//!
//! This crate provides:
//! - Record trait and a cache-aside Repository over the ledger store
//! - Order state machine and OrderService
//! - Payment state machine, PaymentService and webhook handling
//! - PaymentSync, which confirms orders when their payment completes

pub mod error;
pub mod order;
pub mod pagination;
pub mod payment;
pub mod record;
pub mod repository;

pub use error::{DomainError, Result};
pub use pagination::{Page, Pagination, Window};
pub use record::{DomainEvent, Record};
pub use repository::{
    DEFAULT_CACHE_TTL, MAX_WRITE_ATTEMPTS, MISS_FILL_TTL, Repository, WriteResult,
};
