use log::{debug, trace, warn};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::probe::{
    EchoReply, EchoRequest, ProbeError, ReplyClass, bind_any, classify, create_raw_icmp_socket,
    epoch_seconds, recv_icmp, send_icmp, set_ttl, validate, wait_readable,
};
use crate::state::{ProbeResult, ProbeStatus, duration_ms};

/// One datagram received in answer to a probe
#[derive(Debug, Clone)]
pub struct Exchange {
    pub frame: Vec<u8>,
    pub source: IpAddr,
    pub sent_at: Instant,
    pub received_at: Instant,
    /// Time spent blocked waiting for readiness
    pub waited: Duration,
}

/// Sends one probe and waits for one datagram.
///
/// Implementations must release any socket they open before returning,
/// whatever the outcome.
pub trait Channel {
    /// Transmit `packet` to `destination` with the given TTL and wait up to
    /// `budget` for a datagram. `Ok(None)` means nothing became readable.
    fn exchange(
        &mut self,
        packet: &[u8],
        destination: Ipv4Addr,
        ttl: u8,
        budget: Duration,
    ) -> Result<Option<Exchange>, ProbeError>;
}

/// Channel backed by a fresh raw ICMP socket per probe
#[derive(Debug, Clone)]
pub struct RawSocketChannel {
    socket_timeout: Duration,
    recv_buffer: usize,
}

impl RawSocketChannel {
    pub fn new(socket_timeout: Duration, recv_buffer: usize) -> Self {
        Self {
            socket_timeout,
            recv_buffer,
        }
    }
}

impl Channel for RawSocketChannel {
    fn exchange(
        &mut self,
        packet: &[u8],
        destination: Ipv4Addr,
        ttl: u8,
        budget: Duration,
    ) -> Result<Option<Exchange>, ProbeError> {
        let socket = create_raw_icmp_socket(self.socket_timeout)?;
        let socket = scopeguard::guard(socket, |socket| {
            trace!("closing ICMP socket for {}", destination);
            drop(socket);
        });

        bind_any(&socket)?;
        set_ttl(&socket, ttl)?;

        send_icmp(&socket, packet, destination)?;
        let sent_at = Instant::now();

        let ready = wait_readable(&socket, budget)?;
        let waited = sent_at.elapsed();
        if !ready {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.recv_buffer];
        let recv = recv_icmp(&socket, &mut buffer)?;
        let received_at = Instant::now();
        buffer.truncate(recv.len);

        Ok(Some(Exchange {
            frame: buffer,
            source: recv.source,
            sent_at,
            received_at,
            waited,
        }))
    }
}

/// Sends echo requests and turns whatever comes back into a [`ProbeResult`].
///
/// Only fatal socket failures are errors; timeouts, ICMP errors, malformed
/// frames and validation failures are reported through [`ProbeStatus`].
pub struct ProbeTransport<C: Channel = RawSocketChannel> {
    channel: C,
    wait: Duration,
}

impl ProbeTransport<RawSocketChannel> {
    pub fn new(config: &Config) -> Self {
        Self::with_channel(
            RawSocketChannel::new(config.socket_timeout, config.recv_buffer),
            config.wait,
        )
    }
}

impl<C: Channel> ProbeTransport<C> {
    pub fn with_channel(channel: C, wait: Duration) -> Self {
        Self { channel, wait }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send one finalized echo request and classify the reply.
    ///
    /// A request without a resolved destination goes to 127.0.0.1.
    pub fn send(&mut self, request: &EchoRequest) -> Result<ProbeResult, ProbeError> {
        let destination = request.destination().unwrap_or(Ipv4Addr::LOCALHOST);

        if request.ttl() == 0 {
            debug!("TTL 0 for seq {}; probe not sent", request.sequence());
            return Ok(ProbeResult::pending(request, destination, ProbeStatus::NotSent));
        }

        let packet = request.packet()?;
        debug!("Pinging ({}) {}", request.target(), destination);

        let exchange = match self
            .channel
            .exchange(packet, destination, request.ttl(), self.wait)?
        {
            Some(exchange) => exchange,
            None => {
                debug!("seq {} timed out", request.sequence());
                return Ok(ProbeResult::pending(
                    request,
                    destination,
                    ProbeStatus::Timeout { late: false },
                ));
            }
        };

        // A datagram that only arrived once the budget was spent is still a timeout
        if exchange.waited >= self.wait {
            debug!(
                "seq {} reply arrived after {:?}, budget {:?}",
                request.sequence(),
                exchange.waited,
                self.wait
            );
            return Ok(ProbeResult::pending(
                request,
                destination,
                ProbeStatus::Timeout { late: true },
            ));
        }

        let rtt = exchange.received_at.saturating_duration_since(exchange.sent_at);
        Ok(classify_exchange(
            request,
            destination,
            exchange.frame,
            exchange.source,
            rtt,
            epoch_seconds(),
        ))
    }
}

fn classify_exchange(
    request: &EchoRequest,
    destination: Ipv4Addr,
    frame: Vec<u8>,
    source: IpAddr,
    rtt: Duration,
    arrived_epoch: f64,
) -> ProbeResult {
    let malformed = |len: usize| {
        warn!("malformed reply from {} ({} bytes)", source, len);
        ProbeResult::pending(request, destination, ProbeStatus::Malformed { len })
            .with_reply(source, rtt)
    };

    let class = match classify(&frame) {
        Ok(class) => class,
        Err(_) => return malformed(frame.len()),
    };
    let (icmp_type, icmp_code) = (frame[20], frame[21]);

    let status = match class {
        ReplyClass::EchoReply => {
            let len = frame.len();
            let reply = match EchoReply::parse(frame) {
                Ok(reply) => reply,
                Err(_) => return malformed(len).with_icmp(icmp_type, icmp_code),
            };
            if !reply.checksum_ok() {
                warn!("echo reply from {} has a bad checksum {:#06x}", source, reply.checksum());
            }
            let embedded_rtt_ms = reply.embedded_rtt(arrived_epoch).map(duration_ms);
            let validated = validate(request, reply);
            ProbeStatus::EchoReply {
                validation: validated.validation,
                embedded_rtt_ms,
            }
        }
        ReplyClass::TimeExceeded { code } => ProbeStatus::TimeExceeded {
            code,
            reason: class.reason().unwrap_or_default().to_string(),
        },
        ReplyClass::DestUnreachable { code } => ProbeStatus::DestUnreachable {
            code,
            reason: class.reason().unwrap_or_default().to_string(),
        },
        ReplyClass::Other { icmp_type, code } => {
            debug!("unclassified ICMP type {} code {} from {}", icmp_type, code, source);
            ProbeStatus::Unclassified { icmp_type, code }
        }
    };

    ProbeResult::pending(request, destination, status)
        .with_reply(source, rtt)
        .with_icmp(icmp_type, icmp_code)
}
