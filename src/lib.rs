//! ICMP echo ping and traceroute over raw IPv4 sockets.
//!
//! [`probe`] builds and parses packets, [`trace`] sends them and runs batches,
//! [`state`] holds results and statistics, [`export`] renders them.

pub mod cli;
pub mod config;
pub mod export;
pub mod logging;
pub mod lookup;
pub mod prefs;
pub mod probe;
pub mod state;
pub mod trace;
