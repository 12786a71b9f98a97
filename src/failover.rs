//! The failover URI grammar and reconnect-delay iterator (C7).

use std::net::{Ipv4Addr, ToSocketAddrs};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::StompError;
use crate::Result;

const FAILOVER_PREFIX: &str = "failover:";

/// One broker address parsed out of a failover URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Only meaningful for `ws`/`wss`; defaults to `/`.
    pub path: Option<String>,
}

/// Reconnect-policy options, parsed out of the failover URI's query string.
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverOptions {
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub use_exponential_back_off: bool,
    pub back_off_multiplier: f64,
    pub max_reconnect_attempts: i64,
    pub startup_max_reconnect_attempts: i64,
    pub reconnect_delay_jitter_ms: u64,
    pub randomize: bool,
    pub priority_backup: bool,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        FailoverOptions {
            initial_reconnect_delay_ms: 10,
            max_reconnect_delay_ms: 30_000,
            use_exponential_back_off: true,
            back_off_multiplier: 2.0,
            max_reconnect_attempts: -1,
            startup_max_reconnect_attempts: 0,
            reconnect_delay_jitter_ms: 0,
            randomize: true,
            priority_backup: false,
        }
    }
}

/// A parsed `failover:(u1,...,uN)?k1=v1,...` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverUri {
    pub brokers: Vec<Broker>,
    pub options: FailoverOptions,
}

impl FailoverUri {
    pub fn parse(uri: &str) -> Result<FailoverUri> {
        let (body, options_part) = match uri.split_once('?') {
            Some((body, options)) => (body, Some(options)),
            None => (uri, None),
        };
        let body = body.strip_prefix(FAILOVER_PREFIX).unwrap_or(body);
        let body = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')).unwrap_or(body);

        let options = parse_options(options_part).map_err(|e| StompError::protocol(format!("invalid uri: {uri} [invalid options: {e}]")))?;
        let brokers = body
            .split(',')
            .map(parse_broker)
            .collect::<Result<Vec<Broker>>>()
            .map_err(|e| StompError::protocol(format!("invalid uri: {uri} [invalid broker(s): {e}]")))?;

        Ok(FailoverUri { brokers, options })
    }
}

fn parse_broker(uri: &str) -> Result<Broker> {
    let (scheme, rest) = uri.split_once("://").ok_or_else(|| StompError::protocol(format!("malformed broker uri: {uri}")))?;
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, Some(format!("/{path}"))),
        None => (rest, None),
    };
    let (host, port_str) = authority.split_once(':').ok_or_else(|| StompError::protocol(format!("malformed broker uri (missing port): {uri}")))?;
    let port: u16 = port_str.parse().map_err(|_| StompError::protocol(format!("malformed broker uri (invalid port): {uri}")))?;

    let (port, path) = match scheme {
        "ws" => (if port == 0 { 80 } else { port }, Some(path.unwrap_or_else(|| "/".to_string()))),
        "wss" => (if port == 0 { 443 } else { port }, Some(path.unwrap_or_else(|| "/".to_string()))),
        _ => (if port == 0 { 443 } else { port }, None),
    };

    Ok(Broker { protocol: scheme.to_string(), host: host.to_string(), port, path })
}

fn parse_options(options: Option<&str>) -> std::result::Result<FailoverOptions, String> {
    let mut opts = FailoverOptions::default();
    let Some(options) = options else { return Ok(opts) };
    if options.is_empty() {
        return Ok(opts);
    }
    for entry in options.split(',') {
        let (key, value) = entry.split_once('=').ok_or_else(|| format!("malformed option: {entry}"))?;
        match key {
            "initialReconnectDelay" => opts.initial_reconnect_delay_ms = parse_num(value)?,
            "maxReconnectDelay" => opts.max_reconnect_delay_ms = parse_num(value)?,
            "useExponentialBackOff" => opts.use_exponential_back_off = parse_bool(value)?,
            "backOffMultiplier" => opts.back_off_multiplier = value.parse().map_err(|_| format!("invalid float: {value}"))?,
            "maxReconnectAttempts" => opts.max_reconnect_attempts = value.parse().map_err(|_| format!("invalid int: {value}"))?,
            "startupMaxReconnectAttempts" => opts.startup_max_reconnect_attempts = value.parse().map_err(|_| format!("invalid int: {value}"))?,
            "reconnectDelayJitter" => opts.reconnect_delay_jitter_ms = parse_num(value)?,
            "randomize" => opts.randomize = parse_bool(value)?,
            "priorityBackup" => opts.priority_backup = parse_bool(value)?,
            other => return Err(format!("unsupported option: {other}")),
        }
    }
    Ok(opts)
}

fn parse_num(value: &str) -> std::result::Result<u64, String> {
    value.parse().map_err(|_| format!("invalid integer: {value}"))
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("invalid bool: {other}")),
    }
}

/// Whether `host` names this machine. Used only for `priorityBackup`. DNS or
/// resolution failures are treated as "not local" rather than propagated.
pub fn is_local_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    if host.parse::<Ipv4Addr>().map(|ip| ip.octets()[0] == 127).unwrap_or(false) {
        return true;
    }
    (host, 0u16).to_socket_addrs().map(|addrs| addrs.map(|a| a.ip()).any(|ip| ip.is_loopback())).unwrap_or(false)
}

/// An endless iterator over `(broker, delay_seconds)` reconnect attempts,
/// driven by a [`FailoverUri`]'s options. Delay grows per the backoff policy
/// and resets each time [`FailoverTransport::note_connected`] is called.
pub struct FailoverTransport {
    uri: FailoverUri,
    max_reconnect_attempts: Option<i64>,
    reconnect_attempts: i64,
    reconnect_delay_ms: f64,
    pending: Vec<Broker>,
}

impl FailoverTransport {
    pub fn new(uri: FailoverUri) -> FailoverTransport {
        let mut transport = FailoverTransport { uri, max_reconnect_attempts: None, reconnect_attempts: -1, reconnect_delay_ms: 0.0, pending: Vec::new() };
        transport.reset_cycle();
        transport
    }

    /// Tell the transport that a handshake succeeded: subsequent reconnect
    /// attempts are governed by `maxReconnectAttempts` rather than
    /// `startupMaxReconnectAttempts`, and the delay/attempt counters reset.
    pub fn note_connected(&mut self) {
        self.max_reconnect_attempts = Some(self.uri.options.max_reconnect_attempts);
        self.reset_cycle();
    }

    /// Produce the next `(broker, delay_seconds)` pair, or a
    /// [`StompError::ConnectTimeout`] if the attempt cap has been exceeded.
    pub fn next(&mut self) -> Result<(Broker, f64)> {
        if self.pending.is_empty() {
            self.pending = self.shuffled_brokers();
        }
        let broker = self.pending.remove(0);
        let delay = self.delay()?;
        Ok((broker, delay))
    }

    fn shuffled_brokers(&self) -> Vec<Broker> {
        let options = &self.uri.options;
        let mut brokers = self.uri.brokers.clone();
        if options.randomize {
            brokers.shuffle(&mut rand::rng());
        }
        if options.priority_backup {
            brokers.sort_by_key(|b| !is_local_host(&b.host));
        }
        brokers
    }

    fn delay(&mut self) -> Result<f64> {
        let options = &self.uri.options;
        self.reconnect_attempts += 1;
        if self.reconnect_attempts == 0 {
            return Ok(0.0);
        }
        let cap = self.max_reconnect_attempts.unwrap_or(options.startup_max_reconnect_attempts);
        if cap != -1 && self.reconnect_attempts > cap {
            return Err(StompError::ConnectTimeout(format!("reconnect timeout: {cap} attempts")));
        }
        let jitter = rand::rng().random::<f64>() * options.reconnect_delay_jitter_ms as f64;
        let delay_ms = (self.reconnect_delay_ms + jitter).max(0.0).min(options.max_reconnect_delay_ms as f64);
        self.reconnect_delay_ms *= if options.use_exponential_back_off { options.back_off_multiplier } else { 1.0 };
        Ok(delay_ms / 1000.0)
    }

    fn reset_cycle(&mut self) {
        self.reconnect_delay_ms = self.uri.options.initial_reconnect_delay_ms as f64;
        if self.max_reconnect_attempts.is_none() {
            self.max_reconnect_attempts = Some(self.uri.options.startup_max_reconnect_attempts);
        }
        self.reconnect_attempts = -1;
        self.pending.clear();
    }
}
