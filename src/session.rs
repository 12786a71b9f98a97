//! The session state machine (C6): wraps the stateless [`crate::commands`] API
//! with connection phase tracking, subscription/transaction/receipt
//! bookkeeping, and heart-beat accounting.

use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

use crate::commands::{self, ConnectedInfo, SubscriptionToken};
use crate::error::StompError;
use crate::frame::{Frame, HeartBeat};
use crate::spec::StompVersion;
use crate::Result;

/// The session's connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Disconnected
    }
}

struct Subscription<Ctx> {
    sequence: u64,
    destination: String,
    headers: Vec<(String, String)>,
    receipt: Option<String>,
    context: Ctx,
}

/// A replayable subscription, as returned by [`Session::replay`].
pub struct ReplayedSubscription<Ctx> {
    pub destination: String,
    pub headers: Vec<(String, String)>,
    pub receipt: Option<String>,
    pub context: Ctx,
}

/// An abstract, transport-agnostic STOMP session. `Ctx` is an opaque value you
/// can attach to a subscription (e.g. a channel handle) and retrieve later
/// with [`Session::subscription`]; use `()` if you don't need one.
pub struct Session<Ctx = ()> {
    default_version: StompVersion,
    strict: bool,
    next_sequence: u64,
    negotiated_version: Option<StompVersion>,
    offered_versions: Option<Vec<StompVersion>>,
    phase: Phase,
    id: Option<String>,
    server: Option<String>,
    last_sent: Option<Instant>,
    last_received: Option<Instant>,
    client_send_heart_beat: u32,
    client_receive_heart_beat: u32,
    server_send_heart_beat: u32,
    server_receive_heart_beat: u32,
    receipts: Vec<String>,
    subscriptions: HashMap<SubscriptionToken, Subscription<Ctx>>,
    transactions: Vec<String>,
}

impl<Ctx> Session<Ctx> {
    /// A new session pinned to `version` (the highest version it will ever
    /// offer/accept). When `strict` is true, calls outside their proper
    /// phase raise [`StompError::Protocol`]; when false, phase checks are skipped.
    pub fn new(version: StompVersion, strict: bool) -> Session<Ctx> {
        Session {
            default_version: version,
            strict,
            next_sequence: 0,
            negotiated_version: None,
            offered_versions: None,
            phase: Phase::Disconnected,
            id: None,
            server: None,
            last_sent: None,
            last_received: None,
            client_send_heart_beat: 0,
            client_receive_heart_beat: 0,
            server_send_heart_beat: 0,
            server_receive_heart_beat: 0,
            receipts: Vec::new(),
            subscriptions: HashMap::new(),
            transactions: Vec::new(),
        }
    }

    /// The version of the current connection, or the version this session
    /// was created with if there is none yet.
    pub fn version(&self) -> StompVersion {
        self.negotiated_version.unwrap_or(self.default_version)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    // ---- outgoing commands ----

    pub fn connect(
        &mut self,
        login: Option<&str>,
        passcode: Option<&str>,
        headers: &[(String, String)],
        versions: Option<&[StompVersion]>,
        host: Option<&str>,
        heart_beats: Option<(u32, u32)>,
    ) -> Result<Frame> {
        self.check("connect", &[Phase::Disconnected])?;
        let offered = self.validate_offered_versions(versions)?;
        let frame = commands::connect(login, passcode, headers, &offered, host, heart_beats)?;
        self.offered_versions = Some(offered);
        let (send, receive) = heart_beats.unwrap_or((0, 0));
        self.client_send_heart_beat = send;
        self.client_receive_heart_beat = receive;
        self.phase = Phase::Connecting;
        Ok(frame)
    }

    pub fn disconnect(&mut self, receipt: Option<&str>) -> Result<Frame> {
        self.check("disconnect", &[Phase::Connected])?;
        let frame = commands::disconnect(receipt, Some(self.version()))?;
        self.track_receipt(receipt)?;
        self.phase = Phase::Disconnecting;
        Ok(frame)
    }

    /// Reset the session to [`Phase::Disconnected`]. When `flush` is true,
    /// subscriptions are cleared too; when false, they survive to be
    /// re-subscribed with [`Session::replay`] after reconnecting.
    pub fn close(&mut self, flush: bool) {
        self.id = None;
        self.server = None;
        self.phase = Phase::Disconnected;
        self.last_sent = None;
        self.last_received = None;
        self.client_send_heart_beat = 0;
        self.client_receive_heart_beat = 0;
        self.server_send_heart_beat = 0;
        self.server_receive_heart_beat = 0;
        self.negotiated_version = None;
        self.offered_versions = None;
        self.receipts.clear();
        self.transactions.clear();
        if flush {
            self.subscriptions.clear();
        }
    }

    pub fn send(&mut self, destination: &str, body: Vec<u8>, headers: &[(String, String)], receipt: Option<&str>) -> Result<Frame> {
        self.check("send", &[Phase::Connected])?;
        let frame = commands::send(destination, body, headers, receipt, Some(self.version()))?;
        self.track_receipt(receipt)?;
        Ok(frame)
    }

    /// Subscribe to `destination`, attaching an opaque `context` retrievable
    /// later via [`Session::subscription`].
    pub fn subscribe(&mut self, destination: &str, headers: &[(String, String)], receipt: Option<&str>, context: Ctx) -> Result<(Frame, SubscriptionToken)> {
        self.check("subscribe", &[Phase::Connected])?;
        let (frame, token) = commands::subscribe(destination, headers, receipt, Some(self.version()))?;
        if self.subscriptions.contains_key(&token) {
            return Err(StompError::protocol(format!("already subscribed [{}={}]", token.0, token.1)));
        }
        self.track_receipt(receipt)?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.subscriptions.insert(
            token.clone(),
            Subscription { sequence, destination: destination.to_string(), headers: headers.to_vec(), receipt: receipt.map(str::to_string), context },
        );
        Ok((frame, token))
    }

    pub fn unsubscribe(&mut self, token: &SubscriptionToken, receipt: Option<&str>) -> Result<Frame> {
        self.check("unsubscribe", &[Phase::Connected])?;
        let frame = commands::unsubscribe(token, receipt, Some(self.version()))?;
        if !self.subscriptions.contains_key(token) {
            return Err(StompError::protocol(format!("no such subscription [{}={}]", token.0, token.1)));
        }
        self.track_receipt(receipt)?;
        self.subscriptions.remove(token);
        Ok(frame)
    }

    pub fn ack(&mut self, frame: &Frame, receipt: Option<&str>) -> Result<Frame> {
        self.check("ack", &[Phase::Connected])?;
        let out = commands::ack(frame, &self.transactions, receipt)?;
        self.track_receipt(receipt)?;
        Ok(out)
    }

    pub fn nack(&mut self, frame: &Frame, receipt: Option<&str>) -> Result<Frame> {
        self.check("nack", &[Phase::Connected])?;
        let out = commands::nack(frame, &self.transactions, receipt)?;
        self.track_receipt(receipt)?;
        Ok(out)
    }

    /// Generate a transaction id for [`Session::begin`]/[`Session::abort`]/[`Session::commit`].
    pub fn transaction(&self, transaction: Option<&str>) -> String {
        transaction.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    pub fn begin(&mut self, transaction: &str, receipt: Option<&str>) -> Result<Frame> {
        self.check("begin", &[Phase::Connected])?;
        let frame = commands::begin(transaction, receipt, Some(self.version()))?;
        if self.transactions.iter().any(|t| t == transaction) {
            return Err(StompError::protocol(format!("transaction already active: {transaction}")));
        }
        self.track_receipt(receipt)?;
        self.transactions.push(transaction.to_string());
        Ok(frame)
    }

    pub fn abort(&mut self, transaction: &str, receipt: Option<&str>) -> Result<Frame> {
        self.check("abort", &[Phase::Connected])?;
        let frame = commands::abort(transaction, receipt, Some(self.version()))?;
        if !self.transactions.iter().any(|t| t == transaction) {
            return Err(StompError::protocol(format!("transaction unknown: {transaction}")));
        }
        self.track_receipt(receipt)?;
        self.remove_transaction(transaction)?;
        Ok(frame)
    }

    pub fn commit(&mut self, transaction: &str, receipt: Option<&str>) -> Result<Frame> {
        self.check("commit", &[Phase::Connected])?;
        let frame = commands::commit(transaction, receipt, Some(self.version()))?;
        if !self.transactions.iter().any(|t| t == transaction) {
            return Err(StompError::protocol(format!("transaction unknown: {transaction}")));
        }
        self.track_receipt(receipt)?;
        self.remove_transaction(transaction)?;
        Ok(frame)
    }

    // ---- incoming frames ----

    pub fn connected(&mut self, frame: &Frame) -> Result<()> {
        self.check("connected", &[Phase::Connecting])?;
        let offered = self.offered_versions.take().unwrap_or_default();
        let ConnectedInfo { version, server, session, heart_beat } = commands::connected(frame, &offered)?;
        self.negotiated_version = Some(version);
        self.server = server;
        self.id = session;
        self.server_send_heart_beat = heart_beat.0;
        self.server_receive_heart_beat = heart_beat.1;
        self.phase = Phase::Connected;
        Ok(())
    }

    pub fn message(&self, frame: &Frame) -> Result<SubscriptionToken> {
        self.check("message", &[Phase::Connected])?;
        let token = commands::message(frame)?;
        if !self.subscriptions.contains_key(&token) {
            return Err(StompError::protocol(format!("no such subscription [{}={}]", token.0, token.1)));
        }
        Ok(token)
    }

    pub fn receipt(&mut self, frame: &Frame) -> Result<String> {
        self.check("receipt", &[Phase::Connected, Phase::Disconnecting])?;
        let receipt = commands::receipt(frame)?;
        match self.receipts.iter().position(|r| *r == receipt) {
            Some(idx) => {
                self.receipts.remove(idx);
                Ok(receipt)
            }
            None => Err(StompError::protocol(format!("unexpected receipt: {receipt}"))),
        }
    }

    // ---- heart-beating ----

    pub fn beat(&self) -> Result<HeartBeat> {
        commands::beat(Some(self.version()))
    }

    pub fn sent(&mut self) {
        self.last_sent = Some(Instant::now());
    }

    pub fn received(&mut self) {
        self.last_received = Some(Instant::now());
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    pub fn last_received(&self) -> Option<Instant> {
        self.last_received
    }

    pub fn client_heart_beat(&self) -> u32 {
        commands::negotiate_heart_beat(self.client_send_heart_beat, self.server_receive_heart_beat)
    }

    pub fn server_heart_beat(&self) -> u32 {
        commands::negotiate_heart_beat(self.client_receive_heart_beat, self.server_send_heart_beat)
    }

    // ---- subscription replay ----

    /// Clear all active subscriptions and return them in original insertion
    /// order, ready to be re-submitted to [`Session::subscribe`] after a reconnect.
    pub fn replay(&mut self) -> Vec<ReplayedSubscription<Ctx>> {
        let mut entries: Vec<(u64, SubscriptionToken, Subscription<Ctx>)> =
            self.subscriptions.drain().map(|(token, sub)| (sub.sequence, token, sub)).collect();
        entries.sort_by_key(|(sequence, _, _)| *sequence);
        entries
            .into_iter()
            .map(|(_, _, sub)| ReplayedSubscription { destination: sub.destination, headers: sub.headers, receipt: sub.receipt, context: sub.context })
            .collect()
    }

    pub fn subscription(&self, token: &SubscriptionToken) -> Option<&Ctx> {
        self.subscriptions.get(token).map(|sub| &sub.context)
    }

    // ---- helpers ----

    fn validate_offered_versions(&self, versions: Option<&[StompVersion]>) -> Result<Vec<StompVersion>> {
        let upper = self.default_version.up_to();
        match versions {
            None => Ok(upper),
            Some(versions) => {
                if versions.iter().any(|v| !upper.contains(v)) {
                    return Err(StompError::protocol(format!("invalid versions: {versions:?} [version={}]", self.default_version)));
                }
                let mut versions = versions.to_vec();
                versions.sort();
                Ok(versions)
            }
        }
    }

    fn track_receipt(&mut self, receipt: Option<&str>) -> Result<()> {
        let Some(receipt) = receipt else { return Ok(()) };
        if receipt.is_empty() {
            return Ok(());
        }
        if self.receipts.iter().any(|r| r == receipt) {
            return Err(StompError::protocol(format!("duplicate receipt: {receipt}")));
        }
        self.receipts.push(receipt.to_string());
        Ok(())
    }

    fn remove_transaction(&mut self, transaction: &str) -> Result<()> {
        match self.transactions.iter().position(|t| t == transaction) {
            Some(idx) => {
                self.transactions.remove(idx);
                Ok(())
            }
            None => Err(StompError::protocol(format!("transaction unknown: {transaction}"))),
        }
    }

    fn check(&self, command: &str, phases: &[Phase]) -> Result<()> {
        if self.strict && !phases.contains(&self.phase) {
            return Err(StompError::protocol(format!("cannot handle command {command:?} in phase {:?} (only in phases {phases:?})", self.phase)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_frame(version: StompVersion) -> Frame {
        Frame::with_headers("CONNECTED", [("version".to_string(), version.as_str().to_string())], Vec::new(), version)
    }

    #[test]
    fn full_handshake_moves_through_phases() {
        env_logger::try_init().unwrap_or_default();
        let mut session: Session = Session::new(StompVersion::V1_1, true);
        assert_eq!(session.phase(), Phase::Disconnected);
        session.connect(None, None, &[], None, None, None).unwrap();
        assert_eq!(session.phase(), Phase::Connecting);
        session.connected(&connected_frame(StompVersion::V1_1)).unwrap();
        assert_eq!(session.phase(), Phase::Connected);
        assert_eq!(session.version(), StompVersion::V1_1);
        session.disconnect(None).unwrap();
        assert_eq!(session.phase(), Phase::Disconnecting);
        session.close(true);
        assert_eq!(session.phase(), Phase::Disconnected);
    }

    #[test]
    fn strict_session_rejects_out_of_phase_commands() {
        let mut session: Session = Session::new(StompVersion::V1_1, true);
        assert!(session.send("/queue/a", Vec::new(), &[], None).is_err());
    }

    #[test]
    fn non_strict_session_skips_phase_checks() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        assert!(session.send("/queue/a", Vec::new(), &[], None).is_ok());
    }

    #[test]
    fn duplicate_subscription_token_rejected() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        session.subscribe("/queue/a", &[("id".to_string(), "1".to_string())], None, ()).unwrap();
        assert!(session.subscribe("/queue/a", &[("id".to_string(), "1".to_string())], None, ()).is_err());
    }

    #[test]
    fn replay_preserves_insertion_order_and_clears_table() {
        let mut session: Session<&'static str> = Session::new(StompVersion::V1_1, false);
        session.subscribe("/queue/a", &[("id".to_string(), "1".to_string())], None, "ctx-a").unwrap();
        session.subscribe("/queue/b", &[("id".to_string(), "2".to_string())], None, "ctx-b").unwrap();
        let replayed = session.replay();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].destination, "/queue/a");
        assert_eq!(replayed[0].context, "ctx-a");
        assert_eq!(replayed[1].destination, "/queue/b");
        assert!(session.subscription(&("id".to_string(), "1".to_string())).is_none());
    }

    #[test]
    fn replay_after_unsubscribe_yields_only_the_remaining_subscription() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        let (_, token_a) = session.subscribe("/queue/a", &[("id".to_string(), "a".to_string())], None, ()).unwrap();
        session.subscribe("/queue/b", &[("id".to_string(), "b".to_string())], None, ()).unwrap();
        session.unsubscribe(&token_a, None).unwrap();
        let replayed = session.replay();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].destination, "/queue/b");
        assert!(session.subscription(&token_a).is_none());
    }

    #[test]
    fn rejected_subscribe_leaves_bookkeeping_unchanged() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        session.subscribe("/queue/a", &[("id".to_string(), "1".to_string())], None, ()).unwrap();
        let before = session.subscriptions.len();
        assert!(session.subscribe("/queue/a", &[("id".to_string(), "1".to_string())], None, ()).is_err());
        assert_eq!(session.subscriptions.len(), before);
    }

    #[test]
    fn rejected_unsubscribe_leaves_subscription_in_place() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        let (_, token) = session.subscribe("/queue/a", &[("id".to_string(), "1".to_string())], None, ()).unwrap();
        session.send("/queue/a", Vec::new(), &[], Some("r1")).unwrap();
        assert!(session.unsubscribe(&token, Some("r1")).is_err());
        assert_eq!(session.subscriptions.len(), 1);
        assert!(session.subscription(&token).is_some());
    }

    #[test]
    fn rejected_begin_leaves_transactions_unchanged() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        session.send("/queue/a", Vec::new(), &[], Some("r1")).unwrap();
        let before = session.transactions.len();
        assert!(session.begin("t1", Some("r1")).is_err());
        assert_eq!(session.transactions.len(), before);
    }

    #[test]
    fn rejected_abort_leaves_transaction_active() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        session.begin("t1", None).unwrap();
        session.send("/queue/a", Vec::new(), &[], Some("r1")).unwrap();
        assert!(session.abort("t1", Some("r1")).is_err());
        assert_eq!(session.transactions, vec!["t1".to_string()]);
    }

    #[test]
    fn rejected_commit_leaves_transaction_active() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        session.begin("t1", None).unwrap();
        session.send("/queue/a", Vec::new(), &[], Some("r1")).unwrap();
        assert!(session.commit("t1", Some("r1")).is_err());
        assert_eq!(session.transactions, vec!["t1".to_string()]);
    }

    #[test]
    fn duplicate_receipt_rejected() {
        let mut session: Session = Session::new(StompVersion::V1_1, false);
        session.send("/queue/a", Vec::new(), &[], Some("r1")).unwrap();
        assert!(session.send("/queue/a", Vec::new(), &[], Some("r1")).is_err());
    }

    #[test]
    fn transaction_generates_uuid_when_unspecified() {
        let session: Session = Session::new(StompVersion::V1_1, false);
        let id = session.transaction(None);
        assert_eq!(Uuid::parse_str(&id).unwrap().get_version_num(), 4);
        assert_eq!(session.transaction(Some("fixed")), "fixed");
    }

    #[test]
    fn heart_beat_negotiation_uses_cross_pair() {
        let mut session: Session = Session::new(StompVersion::V1_1, true);
        session.connect(None, None, &[], None, None, Some((100, 200))).unwrap();
        let frame = Frame::with_headers(
            "CONNECTED",
            [("version".to_string(), "1.1".to_string()), ("heart-beat".to_string(), "300,400".to_string())],
            Vec::new(),
            StompVersion::V1_1,
        );
        session.connected(&frame).unwrap();
        assert_eq!(session.client_heart_beat(), commands::negotiate_heart_beat(100, 400));
        assert_eq!(session.server_heart_beat(), commands::negotiate_heart_beat(200, 300));
    }
}
