//! Blocking collaborators that speak the relay's framing.
//!
//! - `echo`: accepts one client at a time and reflects each frame back
//! - `client`: sends one line from its input, then waits for one reply frame
//!
//! Both are plain request/response loops over blocking sockets and exist to
//! generate and consume relay traffic.

pub mod client;
pub mod echo;
