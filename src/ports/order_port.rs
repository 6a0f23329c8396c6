//! Order processing port.

use crate::domain::error::SimError;
use crate::domain::order::{OrderAck, OrderTicket};

pub trait OrderProcessor: Send + Sync {
    /// Accept an order and return its id, with a fill when it executed
    /// immediately.
    fn submit(&self, ticket: &OrderTicket) -> Result<OrderAck, SimError>;
}
