use anyhow::Result;
use std::io::Write;

use crate::lookup::sanitize_display;
use crate::state::{Batch, ProbeResult, ProbeStatus, Session, Target};
use crate::trace::ProbeObserver;

const TIMEOUT_MARK: &str = "  *        *        *        *        *    Request timed out";

/// Streams one line per probe and a summary per batch
pub struct TextReporter<W: Write> {
    writer: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ProbeObserver for TextReporter<W> {
    fn on_batch_start(&mut self, target: &Target, ttl: u8, count: u16) -> Result<()> {
        writeln!(
            self.writer,
            "Ping {} packets to {} (TTL {})",
            count, target.resolved, ttl
        )?;
        Ok(())
    }

    fn on_probe(&mut self, result: &ProbeResult) -> Result<()> {
        write_probe_line(&mut self.writer, result)?;
        Ok(())
    }

    fn on_batch(&mut self, batch: &Batch) -> Result<()> {
        write_batch_summary(&mut self.writer, batch)?;
        Ok(())
    }
}

/// Write the report line (plus any validation diagnostics) for one probe
pub fn write_probe_line<W: Write>(writer: &mut W, result: &ProbeResult) -> std::io::Result<()> {
    let responder = result
        .responder
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    let rtt = result.rtt_ms.unwrap_or_default();
    let icmp_type = result.icmp_type.unwrap_or_default();
    let icmp_code = result.icmp_code.unwrap_or_default();

    match &result.status {
        ProbeStatus::Timeout { late: false } => writeln!(writer, "{}.", TIMEOUT_MARK),
        ProbeStatus::Timeout { late: true } => {
            writeln!(writer, "{} (By no remaining time left).", TIMEOUT_MARK)
        }
        ProbeStatus::NotSent => writeln!(
            writer,
            "  TTL={}    Sequence={}    probe not sent",
            result.ttl, result.sequence
        ),
        ProbeStatus::EchoReply {
            validation,
            embedded_rtt_ms,
        } => {
            // Echo replies report the RTT measured against the echoed send timestamp
            let rtt = embedded_rtt_ms.unwrap_or(rtt);
            writeln!(
                writer,
                "  TTL={}    RTT={:.0} ms    Type={}    Code={}    Identifier={}    SequenceNumber={}    {}",
                result.ttl, rtt, icmp_type, icmp_code, result.identifier, result.sequence, responder
            )?;
            for mismatch in &validation.mismatches {
                writeln!(writer, "----------{} Error----------", mismatch.field.label())?;
                writeln!(writer, "Expected value: {}", sanitize_display(&mismatch.expected))?;
                writeln!(writer, "Actual value: {}", sanitize_display(&mismatch.actual))?;
            }
            Ok(())
        }
        status => {
            let error = match status {
                ProbeStatus::Unclassified { icmp_type, .. } => {
                    format!("Unexpected ICMP type {}", icmp_type)
                }
                ProbeStatus::Malformed { len } => format!("Malformed reply ({} bytes)", len),
                other => other.reason().unwrap_or_default().to_string(),
            };
            writeln!(
                writer,
                "  TTL={}    RTT={:.0} ms    Type={}    Code={}    Identifier={}    Sequence={}    {}    Error: {}",
                result.ttl, rtt, icmp_type, icmp_code, result.identifier, result.sequence, responder, error
            )
        }
    }
}

/// Write the min/max/average/loss line for a finished batch
pub fn write_batch_summary<W: Write>(writer: &mut W, batch: &Batch) -> std::io::Result<()> {
    let stats = &batch.stats;
    let addr = stats
        .responder
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "None".to_string());
    writeln!(
        writer,
        "Min={:.0} ms  Max={:.0} ms  Average={:.0} ms  Packet_Loss={:.2}  Addr= {}",
        stats.min_ms, stats.max_ms, stats.avg_ms, stats.loss, addr
    )
}

/// Generate a per-batch summary table for a finished session
pub fn generate_report<W: Write>(session: &Session, mut writer: W) -> std::io::Result<()> {
    let name = if session.target.original.trim().is_empty() {
        session.target.resolved.to_string()
    } else {
        sanitize_display(&session.target.original)
    };
    writeln!(writer, "icmptrace report for {} ({})", name, session.target.resolved)?;
    writeln!(writer, "Started: {}", session.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer)?;

    // Header
    writeln!(
        writer,
        "{:>3}  {:<20} {:>6} {:>6} {:>8} {:>8} {:>8}",
        "#", "Host", "Loss%", "Sent", "Avg", "Min", "Max"
    )?;
    writeln!(writer, "{}", "-".repeat(66))?;

    for batch in &session.batches {
        let stats = &batch.stats;
        let host = match stats.responder {
            Some(ip) => ip.to_string(),
            None => "* * *".to_string(),
        };

        let (avg, min, max) = if stats.answered > 0 {
            (
                format!("{:.1}ms", stats.avg_ms),
                format!("{:.1}ms", stats.min_ms),
                format!("{:.1}ms", stats.max_ms),
            )
        } else {
            ("-".into(), "-".into(), "-".into())
        };

        writeln!(
            writer,
            "{:>3}  {:<20} {:>5.1}% {:>6} {:>8} {:>8} {:>8}",
            batch.ttl,
            host,
            stats.loss_pct(),
            stats.sent,
            avg,
            min,
            max
        )?;
    }

    if !session.complete {
        writeln!(writer)?;
        writeln!(writer, "Destination not reached")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProbeMode};
    use crate::probe::{EchoRequest, FieldMismatch, ReplyField, Validation};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn result(status: ProbeStatus, reply: Option<(IpAddr, u64)>) -> ProbeResult {
        let mut request = EchoRequest::new();
        request.set_ttl(7);
        request.build(1234, 2);
        let result = ProbeResult::pending(&request, Ipv4Addr::new(192, 0, 2, 1), status);
        match reply {
            Some((ip, ms)) => result
                .with_reply(ip, Duration::from_millis(ms))
                .with_icmp(11, 0),
            None => result,
        }
    }

    fn line(result: &ProbeResult) -> String {
        let mut buf = Vec::new();
        write_probe_line(&mut buf, result).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_time_exceeded_line() {
        let out = line(&result(
            ProbeStatus::TimeExceeded {
                code: 0,
                reason: "Time to Live exceeded in Transit".into(),
            },
            Some((IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 12)),
        ));
        assert!(out.starts_with("  TTL=7    RTT=12 ms    Type=11    Code=0"));
        assert!(out.contains("Identifier=1234    Sequence=2    10.0.0.1"));
        assert!(out.trim_end().ends_with("Error: Time to Live exceeded in Transit"));
    }

    #[test]
    fn test_timeout_lines() {
        let out = line(&result(ProbeStatus::Timeout { late: false }, None));
        assert!(out.contains("Request timed out."));
        let out = line(&result(ProbeStatus::Timeout { late: true }, None));
        assert!(out.contains("By no remaining time left"));
    }

    #[test]
    fn test_validation_diagnostics_are_sanitized() {
        let validation = Validation {
            identifier_valid: true,
            sequence_valid: true,
            data_valid: false,
            mismatches: vec![FieldMismatch {
                field: ReplyField::Data,
                expected: "ABC".into(),
                actual: "A\x1b[2JC".into(),
            }],
        };
        let out = line(&result(
            ProbeStatus::EchoReply {
                validation,
                embedded_rtt_ms: None,
            },
            Some((IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 3)),
        ));
        assert!(out.contains("----------RawData Error----------"));
        assert!(out.contains("Expected value: ABC"));
        assert!(out.contains("Actual value: A[2JC"));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_mismatched_echo_reply_keeps_probe_line() {
        let validation = Validation {
            identifier_valid: true,
            sequence_valid: false,
            data_valid: true,
            mismatches: vec![FieldMismatch {
                field: ReplyField::Sequence,
                expected: "2".into(),
                actual: "3".into(),
            }],
        };
        let out = line(
            &result(
                ProbeStatus::EchoReply {
                    validation,
                    embedded_rtt_ms: Some(6.4),
                },
                Some((IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9)),
            )
            .with_icmp(0, 0),
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "  TTL=7    RTT=6 ms    Type=0    Code=0    Identifier=1234    SequenceNumber=2    192.0.2.1"
        );
        assert_eq!(lines[1], "----------SequenceNumber Error----------");
        assert_eq!(lines[2], "Expected value: 2");
        assert_eq!(lines[3], "Actual value: 3");
    }

    #[test]
    fn test_valid_echo_reply_falls_back_to_wall_rtt() {
        let validation = Validation {
            identifier_valid: true,
            sequence_valid: true,
            data_valid: true,
            mismatches: Vec::new(),
        };
        let out = line(
            &result(
                ProbeStatus::EchoReply {
                    validation,
                    embedded_rtt_ms: None,
                },
                Some((IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9)),
            )
            .with_icmp(0, 0),
        );
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("  TTL=7    RTT=9 ms    Type=0    Code=0"));
    }

    #[test]
    fn test_all_timeout_summary_shows_sentinels() {
        let batch = Batch::new(
            255,
            (0..4)
                .map(|_| result(ProbeStatus::Timeout { late: false }, None))
                .collect(),
        );
        let mut buf = Vec::new();
        write_batch_summary(&mut buf, &batch).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(
            out,
            "Min=inf ms  Max=-inf ms  Average=0 ms  Packet_Loss=1.00  Addr= None\n"
        );
    }

    #[test]
    fn test_generate_report_table() {
        let dest = Ipv4Addr::new(192, 0, 2, 1);
        let mut session = Session::new(
            Target::new("example.test".into(), dest),
            ProbeMode::Trace,
            Config::default(),
        );
        session.push_batch(Batch::new(
            1,
            vec![result(
                ProbeStatus::TimeExceeded { code: 0, reason: String::new() },
                Some((IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 4)),
            )],
        ));
        session.push_batch(Batch::new(
            2,
            vec![result(ProbeStatus::Timeout { late: false }, None)],
        ));

        let mut buf = Vec::new();
        generate_report(&session, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("icmptrace report for example.test (192.0.2.1)"));
        assert!(out.contains("10.0.0.1"));
        assert!(out.contains("4.0ms"));
        assert!(out.contains("* * *"));
        assert!(out.contains("Destination not reached"));
    }

    #[test]
    fn test_reporter_streams_batch() {
        let mut reporter = TextReporter::new(Vec::new());
        let target = Target::new("x".into(), Ipv4Addr::new(192, 0, 2, 1));
        reporter.on_batch_start(&target, 64, 4).unwrap();
        let probe = result(ProbeStatus::Timeout { late: false }, None);
        reporter.on_probe(&probe).unwrap();
        reporter.on_batch(&Batch::new(64, vec![probe])).unwrap();

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Ping 4 packets to 192.0.2.1 (TTL 64)");
        assert!(lines[2].starts_with("Min=inf ms"));
    }
}
