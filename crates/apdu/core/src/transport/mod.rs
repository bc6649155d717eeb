//! Transport traits for frame exchange with cards
//!
//! A transport only moves raw bytes. It knows nothing about TLV bodies,
//! encryption or status words; the contactless radio stack that backs it is
//! supplied by the embedding application.

pub mod error;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for basic card transports
///
/// Exactly one exchange may be in flight at a time; callers serialize access
/// through `&mut self`.
#[async_trait]
pub trait CardTransport: Send + fmt::Debug {
    /// Establish the physical link to a card in the field
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Send raw frame bytes to the card and return the raw response bytes
    async fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command).await;
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    async fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Tear down the link. Must be safe to call more than once.
    async fn disconnect(&mut self);

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;
}
