use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::config::{Config, ProbeMode};
use crate::probe::{EchoRequest, Validation};
use crate::state::stats::BatchStats;

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Echo reply from the destination, checked against the request
    EchoReply {
        validation: Validation,
        /// RTT derived from the timestamp echoed in the payload
        embedded_rtt_ms: Option<f64>,
    },
    TimeExceeded { code: u8, reason: String },
    DestUnreachable { code: u8, reason: String },
    /// A reply with an ICMP type this engine does not classify
    Unclassified { icmp_type: u8, code: u8 },
    /// A reply too short to decode
    Malformed { len: usize },
    /// No reply within the wait budget. `late` is set when bytes did
    /// arrive but only after the budget ran out.
    Timeout { late: bool },
    /// TTL 0 disables transmission
    NotSent,
}

impl ProbeStatus {
    /// Short classification tag
    pub fn label(&self) -> &'static str {
        match self {
            Self::EchoReply { .. } => "echo-reply",
            Self::TimeExceeded { .. } => "time-exceeded",
            Self::DestUnreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::NotSent => "not-sent",
            Self::Unclassified { .. } | Self::Malformed { .. } => "error",
        }
    }

    /// Only echo replies count as received for loss statistics
    pub fn is_received(&self) -> bool {
        matches!(self, Self::EchoReply { .. })
    }

    /// A classified reply whose round trip feeds the RTT aggregates
    pub fn is_answered(&self) -> bool {
        matches!(
            self,
            Self::EchoReply { .. } | Self::TimeExceeded { .. } | Self::DestUnreachable { .. }
        )
    }

    /// Reason text for ICMP error replies
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::TimeExceeded { reason, .. } | Self::DestUnreachable { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub ttl: u8,
    pub identifier: u16,
    pub sequence: u16,
    /// Address the probe was sent to
    pub destination: Ipv4Addr,
    /// Round trip in milliseconds; None when no reply arrived
    pub rtt_ms: Option<f64>,
    pub responder: Option<IpAddr>,
    pub icmp_type: Option<u8>,
    pub icmp_code: Option<u8>,
    pub status: ProbeStatus,
}

impl ProbeResult {
    /// A result for `request` with no reply recorded yet
    pub fn pending(request: &EchoRequest, destination: Ipv4Addr, status: ProbeStatus) -> Self {
        Self {
            ttl: request.ttl(),
            identifier: request.identifier(),
            sequence: request.sequence(),
            destination,
            rtt_ms: None,
            responder: None,
            icmp_type: None,
            icmp_code: None,
            status,
        }
    }

    /// Record the reply that produced this result
    pub fn with_reply(mut self, responder: IpAddr, rtt: Duration) -> Self {
        self.responder = Some(responder);
        self.rtt_ms = Some(duration_ms(rtt));
        self
    }

    pub fn with_icmp(mut self, icmp_type: u8, icmp_code: u8) -> Self {
        self.icmp_type = Some(icmp_type);
        self.icmp_code = Some(icmp_code);
        self
    }

    pub fn is_received(&self) -> bool {
        self.status.is_received()
    }

    pub fn is_answered(&self) -> bool {
        self.status.is_answered()
    }

    pub fn is_valid_echo_reply(&self) -> bool {
        matches!(&self.status, ProbeStatus::EchoReply { validation, .. } if validation.is_valid_response())
    }
}

/// Milliseconds with sub-millisecond precision
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Target being probed
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    /// Name as given by the user (may be empty)
    pub original: String,
    pub resolved: Ipv4Addr,
}

impl Target {
    pub fn new(original: String, resolved: Ipv4Addr) -> Self {
        Self { original, resolved }
    }
}

/// One batch of probes sent with the same TTL
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub ttl: u8,
    pub probes: Vec<ProbeResult>,
    pub stats: BatchStats,
}

impl Batch {
    pub fn new(ttl: u8, probes: Vec<ProbeResult>) -> Self {
        let stats = BatchStats::from_results(&probes);
        Self { ttl, probes, stats }
    }

    /// True if a reply in this batch came from `destination`
    pub fn reached(&self, destination: Ipv4Addr) -> bool {
        self.stats.responder == Some(IpAddr::V4(destination))
    }
}

/// A complete ping or traceroute run
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub target: Target,
    pub mode: ProbeMode,
    pub started_at: DateTime<Utc>,
    pub config: Config,
    pub batches: Vec<Batch>,
    /// Destination reached?
    pub complete: bool,
}

impl Session {
    pub fn new(target: Target, mode: ProbeMode, config: Config) -> Self {
        Self {
            target,
            mode,
            started_at: Utc::now(),
            config,
            batches: Vec::new(),
            complete: false,
        }
    }

    /// Record a finished batch, marking the session complete if it reached the target
    pub fn push_batch(&mut self, batch: Batch) {
        if batch.reached(self.target.resolved) {
            self.complete = true;
        }
        self.batches.push(batch);
    }

    /// Total probes sent across all batches
    pub fn total_sent(&self) -> usize {
        self.batches
            .iter()
            .flat_map(|b| &b.probes)
            .filter(|p| p.status != ProbeStatus::NotSent)
            .count()
    }
}
