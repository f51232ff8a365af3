//! Shared code for the OpenVPN up/down hook that confines a tunnel
//! to its own network namespace.

#![cfg(unix)]

mod err;
pub use err::*;

pub mod netmask;
pub mod options;
pub mod params;
pub mod policy;

mod subprocess;
pub use subprocess::*;

pub mod namespace;
pub mod firewall;
pub mod resolver;
pub mod lifecycle;
