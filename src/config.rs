use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

use crate::cli::Args;
use crate::prefs::Prefs;

/// Probes per batch (one ping run, or one traceroute hop)
pub const DEFAULT_COUNT: u16 = 4;
/// TTL used for plain ping
pub const DEFAULT_TTL: u8 = 255;
/// Traceroute hop ceiling
pub const DEFAULT_MAX_TTL: u8 = 255;
/// Readiness budget for one reply
pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);
/// Coarse send/receive timeout on the raw socket
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(60);
/// Largest datagram read per probe
pub const RECV_BUFFER_SIZE: usize = 1024;

/// What the run does with the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    #[default]
    Ping,
    Trace,
}

/// Runtime configuration derived from CLI args and user preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Probes per batch
    pub count: u16,
    /// TTL for ping mode
    pub ttl: u8,
    /// Maximum TTL for traceroute
    pub max_ttl: u8,
    /// How long to wait for a reply
    #[serde(with = "duration_serde")]
    pub wait: Duration,
    /// Socket-level send/receive timeout
    #[serde(with = "duration_serde")]
    pub socket_timeout: Duration,
    /// Receive buffer size in bytes
    pub recv_buffer: usize,
    /// ICMP identifier override (defaults to the process id)
    pub identifier: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            ttl: DEFAULT_TTL,
            max_ttl: DEFAULT_MAX_TTL,
            wait: DEFAULT_WAIT,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            recv_buffer: RECV_BUFFER_SIZE,
            identifier: None,
        }
    }
}

impl Config {
    /// Build a config where CLI flags override saved preferences,
    /// which override built-in defaults.
    ///
    /// Out-of-range values (zero counts, non-positive or unrepresentable
    /// durations) are ignored with a warning and the default is used.
    pub fn from_args(args: &Args, prefs: &Prefs) -> Self {
        let defaults = Self::default();

        Self {
            count: layered("count", args.count, prefs.count, defaults.count, |c| c > 0),
            ttl: args.ttl.or(prefs.ttl).unwrap_or(defaults.ttl),
            max_ttl: layered("max_ttl", args.max_ttl, prefs.max_ttl, defaults.max_ttl, |t| t > 0),
            wait: layered_secs("wait", args.wait, prefs.wait, defaults.wait),
            socket_timeout: layered_secs(
                "socket_timeout",
                args.socket_timeout,
                prefs.socket_timeout,
                defaults.socket_timeout,
            ),
            recv_buffer: defaults.recv_buffer,
            identifier: args.identifier,
        }
    }
}

/// Seconds as a Duration, if strictly positive and representable
pub fn positive_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

fn layered<T: Copy + Display>(
    name: &str,
    cli: Option<T>,
    saved: Option<T>,
    default: T,
    valid: impl Fn(T) -> bool,
) -> T {
    match cli.or(saved) {
        Some(value) if valid(value) => value,
        Some(value) => {
            warn!("ignoring invalid {} = {}; using {}", name, value, default);
            default
        }
        None => default,
    }
}

fn layered_secs(name: &str, cli: Option<f64>, saved: Option<f64>, default: Duration) -> Duration {
    match cli.or(saved) {
        Some(secs) => positive_secs(secs).unwrap_or_else(|| {
            warn!("ignoring invalid {} = {}; using {:?}", name, secs, default);
            default
        }),
        None => default,
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
