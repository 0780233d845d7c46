// Runtime-independent pieces live in peercore
pub use peercore::{candidates, ice, net, state, watchdog};

// Wire and state types come from peercore; the broadcast event bus needs tokio and stays here
pub mod types {
    pub use peercore::types::*;
    pub mod events;
}

pub mod calls;
pub mod config;
pub mod http;
pub mod ice_config;
pub mod socket;

#[cfg(test)]
pub mod test_utils;
