use clap::{ArgAction, Parser};

use crate::config::{ProbeMode, positive_secs};

/// ICMP echo ping and TTL-escalation traceroute
#[derive(Parser, Debug, Clone)]
#[command(name = "icmptrace")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host (IP address or hostname); empty probes 127.0.0.1
    #[arg(default_value = "")]
    pub target: String,

    /// Trace the route instead of pinging
    #[arg(long = "trace")]
    pub trace: bool,

    /// Probes per batch [default: 4]
    #[arg(short = 'c', long = "count")]
    pub count: Option<u16>,

    /// TTL for ping probes, 0 disables sending [default: 255]
    #[arg(short = 't', long = "ttl")]
    pub ttl: Option<u8>,

    /// Maximum TTL (hops) for traceroute [default: 255]
    #[arg(short = 'm', long = "max-ttl")]
    pub max_ttl: Option<u8>,

    /// Seconds to wait for each reply [default: 30]
    #[arg(short = 'w', long = "wait")]
    pub wait: Option<f64>,

    /// Socket send/receive timeout in seconds [default: 60]
    #[arg(long = "socket-timeout")]
    pub socket_timeout: Option<f64>,

    /// ICMP identifier (defaults to the process id)
    #[arg(long = "identifier")]
    pub identifier: Option<u16>,

    /// Output JSON after the run instead of text lines
    #[arg(long = "json")]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn mode(&self) -> ProbeMode {
        if self.trace {
            ProbeMode::Trace
        } else {
            ProbeMode::Ping
        }
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.count == Some(0) {
            return Err("Count must be at least 1".into());
        }

        if self.max_ttl == Some(0) {
            return Err("Max TTL must be at least 1".into());
        }

        if let Some(wait) = self.wait {
            if positive_secs(wait).is_none() {
                return Err("Wait must be a positive number of seconds".into());
            }
        }

        if let Some(timeout) = self.socket_timeout {
            if positive_secs(timeout).is_none() {
                return Err("Socket timeout must be a positive number of seconds".into());
            }
        }

        if self.trace && self.ttl.is_some() {
            return Err("--ttl applies to ping; use --max-ttl with --trace".into());
        }

        Ok(())
    }
}
