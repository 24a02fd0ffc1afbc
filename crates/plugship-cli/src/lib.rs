//! HTTP side of plugship: the distribution server and the update client
//! that consumes it.

pub mod client;
pub mod server;
