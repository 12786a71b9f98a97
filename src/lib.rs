//! stomp-proto - a transport-agnostic STOMP 1.0/1.1/1.2 protocol engine
//!
//! This crate owns the wire format (frame model, header codec, streaming
//! parser, serializer), the stateless command API, the session state
//! machine, and a failover reconnect policy. It does not open sockets: a
//! client built on top supplies the transport and drives the parser/session
//! with the bytes and events it observes.

mod codec;
mod commands;
mod config;
mod error;
mod failover;
mod frame;
mod parser;
mod session;
mod spec;
mod transport;

pub use commands::{ConnectedInfo, SubscriptionToken};
pub use config::Config;
pub use error::{Result, StompError};
pub use failover::{Broker, FailoverOptions, FailoverTransport, FailoverUri};
pub use frame::{Frame, HeartBeat};
pub use parser::{Parser, ParserItem};
pub use session::{Phase, ReplayedSubscription, Session};
pub use spec::StompVersion;
pub use transport::Transport;
