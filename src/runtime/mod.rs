//! Single-threaded readiness runtime for the relay.
//!
//! Layers, leaves first:
//! - `FrameBuffer`: length-tracked bytes of one in-progress frame
//! - `ConnectionTable`: every live client, keyed by mio token
//! - `broadcast`: best-effort fan-out of one frame
//! - `Relay`: accumulate, fan out and tear down over the table
//! - `Reactor`: mio poll loop driving accept, read and disconnect

mod broadcast;
mod buffer;
mod connection;
mod event_loop;
mod relay;

pub use broadcast::{broadcast, Delivery};
pub use buffer::{FrameBuffer, FRAME_TERMINATOR, INITIAL_CAPACITY};
pub use connection::{ConnState, Connection, ConnectionTable};
pub use event_loop::Reactor;
pub use relay::Relay;

use crate::config::Config;
use crate::error::ReactorError;

/// Bind according to `config` and serve until a fatal error.
pub fn run(config: &Config) -> Result<(), ReactorError> {
    Reactor::bind(config)?.run()
}
