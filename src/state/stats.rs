use serde::Serialize;
use std::net::IpAddr;

use crate::state::session::ProbeResult;

/// Aggregate RTT and loss figures for one batch of probes.
///
/// With no replies the RTT figures stay at their initial values:
/// min = +inf, max = -inf, average = 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    /// Probes in the batch
    pub sent: usize,
    /// Probes answered by an echo reply
    pub received: usize,
    /// Replies contributing to the RTT figures: echo reply, time exceeded
    /// or unreachable
    pub answered: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    /// Fraction of probes without a reply (0.0 - 1.0)
    pub loss: f64,
    /// Address of the last responder in the batch
    pub responder: Option<IpAddr>,
}

impl Default for BatchStats {
    fn default() -> Self {
        Self {
            sent: 0,
            received: 0,
            answered: 0,
            min_ms: f64::INFINITY,
            max_ms: f64::NEG_INFINITY,
            avg_ms: 0.0,
            loss: 0.0,
            responder: None,
        }
    }
}

impl BatchStats {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut stats = Self {
            sent: results.len(),
            ..Self::default()
        };

        stats.received = results.iter().filter(|r| r.is_received()).count();

        let mut total = 0.0;
        let mut samples = 0;
        for result in results.iter().filter(|r| r.is_answered()) {
            stats.answered += 1;
            if let Some(rtt) = result.rtt_ms {
                stats.min_ms = stats.min_ms.min(rtt);
                stats.max_ms = stats.max_ms.max(rtt);
                total += rtt;
                samples += 1;
            }
            if result.responder.is_some() {
                stats.responder = result.responder;
            }
        }

        if samples > 0 {
            stats.avg_ms = total / samples as f64;
        }
        if stats.sent > 0 {
            stats.loss = (stats.sent - stats.received) as f64 / stats.sent as f64;
        }
        stats
    }

    /// Loss as a percentage
    pub fn loss_pct(&self) -> f64 {
        self.loss * 100.0
    }
}
