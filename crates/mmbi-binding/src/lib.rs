//! MCTP transport binding over MMBI channels.
//!
//! This is the layer applications use. A [`TransportContext`] owns a
//! [`BindingAdapter`] (open-with-retry, size checks, transmit retry, one frame
//! per poll) and a [`ProtocolStack`] (packetization, routing, reassembly), and
//! exposes byte-message send plus a single receive callback.

pub mod adapter;
pub mod context;
pub mod error;
pub mod retry;
pub mod stack;

pub use adapter::{
    AdapterConfig, AdapterStats, BindingAdapter, FailureKind, LinkStatus, PollStatus,
};
pub use context::{RxCallback, TagPolicy, TransportConfig, TransportContext};
pub use error::{BindingError, Result};
pub use retry::{Attempt, RetryError, RetryPolicy};
pub use stack::{MctpStack, MessageConfig, PacketSink, ProtocolStack, ReceiveHandler};
