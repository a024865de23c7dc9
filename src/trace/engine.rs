use anyhow::Result;
use log::debug;
use std::net::Ipv4Addr;

use crate::config::{Config, ProbeMode};
use crate::lookup::resolve_target;
use crate::probe::{EchoRequest, get_identifier};
use crate::state::{Batch, ProbeResult, Session, Target};
use crate::trace::transport::{Channel, ProbeTransport, RawSocketChannel};

/// Receives progress from a running [`ProbeEngine`]
pub trait ProbeObserver {
    /// A batch of `count` probes at `ttl` is about to start
    fn on_batch_start(&mut self, _target: &Target, _ttl: u8, _count: u16) -> Result<()> {
        Ok(())
    }

    /// One probe finished
    fn on_probe(&mut self, _result: &ProbeResult) -> Result<()> {
        Ok(())
    }

    /// A batch finished and its statistics are final
    fn on_batch(&mut self, _batch: &Batch) -> Result<()> {
        Ok(())
    }
}

/// Observer that discards everything
impl ProbeObserver for () {}

/// The probe engine sends batches of echo requests one at a time.
///
/// Ping sends one batch at the configured TTL. Traceroute sends one batch per
/// TTL starting at 1 and stops once the destination answers or the hop
/// ceiling is reached.
pub struct ProbeEngine<C: Channel = RawSocketChannel> {
    config: Config,
    identifier: u16,
    transport: ProbeTransport<C>,
}

impl ProbeEngine<RawSocketChannel> {
    pub fn new(config: Config) -> Self {
        let transport = ProbeTransport::new(&config);
        Self::with_transport(config, transport)
    }
}

impl<C: Channel> ProbeEngine<C> {
    pub fn with_transport(config: Config, transport: ProbeTransport<C>) -> Self {
        let identifier = config.identifier.unwrap_or_else(get_identifier);
        Self {
            config,
            identifier,
            transport,
        }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn transport(&self) -> &ProbeTransport<C> {
        &self.transport
    }

    /// Run ping or traceroute against `target`
    pub fn run(
        &mut self,
        mode: ProbeMode,
        target: &str,
        observer: &mut dyn ProbeObserver,
    ) -> Result<Session> {
        match mode {
            ProbeMode::Ping => self.ping(target, observer),
            ProbeMode::Trace => self.trace(target, observer),
        }
    }

    /// Send one batch at the configured TTL
    pub fn ping(&mut self, target: &str, observer: &mut dyn ProbeObserver) -> Result<Session> {
        let mut session = self.new_session(target, ProbeMode::Ping)?;
        let batch = self.run_batch(&session.target, self.config.ttl, observer)?;
        session.push_batch(batch);
        Ok(session)
    }

    /// Send one batch per TTL until the destination answers
    pub fn trace(&mut self, target: &str, observer: &mut dyn ProbeObserver) -> Result<Session> {
        let mut session = self.new_session(target, ProbeMode::Trace)?;

        for ttl in 1..=self.config.max_ttl {
            let batch = self.run_batch(&session.target, ttl, observer)?;
            session.push_batch(batch);
            if session.complete {
                debug!("destination {} reached at TTL {}", session.target.resolved, ttl);
                break;
            }
        }

        Ok(session)
    }

    /// Send `config.count` probes at `ttl`, sequence numbers starting at 0
    pub fn run_batch(
        &mut self,
        target: &Target,
        ttl: u8,
        observer: &mut dyn ProbeObserver,
    ) -> Result<Batch> {
        observer.on_batch_start(target, ttl, self.config.count)?;

        let destination = target.resolved.to_string();
        let mut results = Vec::with_capacity(self.config.count as usize);
        for sequence in 0..self.config.count {
            let mut request = EchoRequest::new();
            request.set_ttl(ttl);
            request.build(self.identifier, sequence);
            request.set_target(&destination)?;

            let result = self.transport.send(&request)?;
            observer.on_probe(&result)?;
            results.push(result);
        }

        let batch = Batch::new(ttl, results);
        observer.on_batch(&batch)?;
        Ok(batch)
    }

    fn new_session(&self, target: &str, mode: ProbeMode) -> Result<Session> {
        let resolved = if target.trim().is_empty() {
            Ipv4Addr::LOCALHOST
        } else {
            resolve_target(target)?
        };
        Ok(Session::new(
            Target::new(target.to_string(), resolved),
            mode,
            self.config.clone(),
        ))
    }
}
