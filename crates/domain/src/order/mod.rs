//! Order records, state machine and service.

mod commands;
mod events;
mod model;
mod service;
mod state;
mod sync;
mod value_objects;

pub use commands::{CreateOrder, UpdateOrder, validate_items};
pub use events::{OrderEvent, OrderEventData};
pub use model::{DEFAULT_CURRENCY, Order};
pub use service::{DEFAULT_PENDING_MAX_AGE, OrderService};
pub use state::OrderStatus;
pub use sync::{PAYMENT_SYNC_GROUP, PaymentSync};
pub use value_objects::{Address, OrderItem, ProductId, calculate_total};
