//! Topos Discovery - Client-side cluster topology discovery

pub mod backoff;
pub mod client;
pub mod discovery;
pub mod dns;
pub mod gossip;
pub mod http_client;
pub mod listener;
pub mod polling;
pub mod pool;
pub mod preference;

#[cfg(test)]
mod testing;

pub use backoff::*;
pub use client::*;
pub use discovery::*;
pub use dns::*;
pub use gossip::*;
pub use http_client::*;
pub use listener::*;
pub use polling::*;
pub use pool::*;
pub use preference::*;
