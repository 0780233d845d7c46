pub mod candidates;
pub mod ice;
pub mod net;
pub mod state;
pub mod types;
pub mod watchdog;
