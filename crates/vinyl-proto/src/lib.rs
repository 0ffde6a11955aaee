//! Wire types, client configuration and platform paths shared by the
//! vinyl-dash engine and its front-end.

pub mod config;
pub mod platform;
pub mod protocol;
