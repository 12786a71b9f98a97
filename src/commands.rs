//! Stateless builders and interpreters for every STOMP command (C5). This is
//! the low-level API that [`crate::session::Session`] is built on top of; it
//! can also be used directly by callers who want to roll their own session
//! bookkeeping.

use crate::error::StompError;
use crate::frame::{Frame, HeartBeat};
use crate::spec::{self, header, StompVersion};
use crate::Result;

/// What you get back from [`subscribe`]: the header that identifies this
/// subscription (`id` when the broker supports it, `destination` otherwise
/// under 1.0) paired with its value. Match incoming MESSAGE frames against
/// this with [`message`].
pub type SubscriptionToken = (String, String);

/// What a CONNECTED frame told us: the version the broker accepted, its
/// `server` and `session` headers (if any), and the negotiated heart-beat
/// period in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedInfo {
    pub version: StompVersion,
    pub server: Option<String>,
    pub session: Option<String>,
    pub heart_beat: (u32, u32),
}

// ---- outgoing frames ----

/// Build a STOMP-command frame (1.1+ only; synonymous with [`connect`] otherwise).
pub fn stomp(
    login: Option<&str>,
    passcode: Option<&str>,
    headers: &[(String, String)],
    versions: &[StompVersion],
    host: Option<&str>,
    heart_beats: Option<(u32, u32)>,
) -> Result<Frame> {
    if versions.is_empty() || versions == [StompVersion::V1_0] {
        return Err(StompError::protocol(format!("unsupported command (version {}): STOMP", StompVersion::V1_0)));
    }
    let frame = connect(login, passcode, headers, versions, host, heart_beats)?;
    Ok(Frame::with_headers("STOMP", frame.headers().iter().cloned(), frame.body().to_vec(), frame.version()))
}

/// Build a CONNECT frame. Always encoded under version 1.0 rules, since the
/// broker has not yet told us which version it accepts.
pub fn connect(
    login: Option<&str>,
    passcode: Option<&str>,
    headers: &[(String, String)],
    versions: &[StompVersion],
    host: Option<&str>,
    heart_beats: Option<(u32, u32)>,
) -> Result<Frame> {
    let mut frame = Frame::new("CONNECT", StompVersion::V1_0);
    for (name, value) in headers {
        frame.set_header(name.clone(), value.clone());
    }
    if let Some(login) = login {
        frame.set_header(header::LOGIN, login);
    }
    if let Some(passcode) = passcode {
        frame.set_header(header::PASSCODE, passcode);
    }

    let mut sorted_versions: Vec<StompVersion> = if versions.is_empty() { vec![StompVersion::V1_0] } else { versions.to_vec() };
    sorted_versions.sort();

    if sorted_versions != [StompVersion::V1_0] {
        let accept = sorted_versions.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(",");
        frame.set_header(header::ACCEPT_VERSION, accept);
        frame.set_header(header::HOST, host.unwrap_or(""));
    }

    if let Some((client, server)) = heart_beats {
        if sorted_versions == [StompVersion::V1_0] {
            return Err(StompError::protocol(format!("heart-beating not supported (version {})", StompVersion::V1_0)));
        }
        frame.set_header(header::HEART_BEAT, format!("{client},{server}"));
    }

    Ok(frame)
}

/// Build a DISCONNECT frame.
pub fn disconnect(receipt: Option<&str>, version: Option<StompVersion>) -> Result<Frame> {
    let mut frame = Frame::new("DISCONNECT", version.unwrap_or_default());
    add_receipt_header(&mut frame, receipt)?;
    Ok(frame)
}

/// Build a SEND frame.
pub fn send(destination: &str, body: Vec<u8>, headers: &[(String, String)], receipt: Option<&str>, version: Option<StompVersion>) -> Result<Frame> {
    let mut frame = Frame::with_headers("SEND", headers.iter().cloned(), body, version.unwrap_or_default());
    frame.set_header(header::DESTINATION, destination);
    add_receipt_header(&mut frame, receipt)?;
    Ok(frame)
}

/// Build a SUBSCRIBE frame together with the token to match its MESSAGEs.
pub fn subscribe(destination: &str, headers: &[(String, String)], receipt: Option<&str>, version: Option<StompVersion>) -> Result<(Frame, SubscriptionToken)> {
    let version = version.unwrap_or_default();
    let mut frame = Frame::new("SUBSCRIBE", version);
    for (name, value) in headers {
        frame.set_header(name.clone(), value.clone());
    }
    frame.set_header(header::DESTINATION, destination);
    add_receipt_header(&mut frame, receipt)?;

    let subscription = match check_header(&frame, header::ID) {
        Ok(id) => Some(id),
        Err(err) => {
            if version != StompVersion::V1_0 {
                return Err(err);
            }
            None
        }
    };
    let token = match subscription {
        Some(id) => (header::ID.to_string(), id),
        None => (header::DESTINATION.to_string(), destination.to_string()),
    };
    Ok((frame, token))
}

/// Build an UNSUBSCRIBE frame from the token returned by [`subscribe`].
pub fn unsubscribe(token: &SubscriptionToken, receipt: Option<&str>, version: Option<StompVersion>) -> Result<Frame> {
    let version = version.unwrap_or_default();
    let mut frame = Frame::new("UNSUBSCRIBE", version);
    frame.set_header(token.0.clone(), token.1.clone());
    add_receipt_header(&mut frame, receipt)?;

    if let Err(err) = check_header(&frame, header::ID) {
        if version != StompVersion::V1_0 {
            return Err(err);
        }
        check_header(&frame, header::DESTINATION)?;
    }
    Ok(frame)
}

/// Build an ACK frame for a received MESSAGE frame.
pub fn ack(frame: &Frame, transactions: &[String], receipt: Option<&str>) -> Result<Frame> {
    let mut ack = Frame::with_headers("ACK", ack_headers(frame, transactions)?, Vec::new(), frame.version());
    add_receipt_header(&mut ack, receipt)?;
    Ok(ack)
}

/// Build a NACK frame for a received MESSAGE frame (1.1+ only).
pub fn nack(frame: &Frame, transactions: &[String], receipt: Option<&str>) -> Result<Frame> {
    if frame.version() == StompVersion::V1_0 {
        return Err(StompError::protocol(format!("NACK not supported (version {})", StompVersion::V1_0)));
    }
    let mut nack = Frame::with_headers("NACK", ack_headers(frame, transactions)?, Vec::new(), frame.version());
    add_receipt_header(&mut nack, receipt)?;
    Ok(nack)
}

/// Build a BEGIN frame.
pub fn begin(transaction: &str, receipt: Option<&str>, version: Option<StompVersion>) -> Result<Frame> {
    let mut frame = Frame::new("BEGIN", version.unwrap_or_default());
    frame.set_header(header::TRANSACTION, transaction);
    add_receipt_header(&mut frame, receipt)?;
    Ok(frame)
}

/// Build an ABORT frame.
pub fn abort(transaction: &str, receipt: Option<&str>, version: Option<StompVersion>) -> Result<Frame> {
    let mut frame = Frame::new("ABORT", version.unwrap_or_default());
    frame.set_header(header::TRANSACTION, transaction);
    add_receipt_header(&mut frame, receipt)?;
    Ok(frame)
}

/// Build a COMMIT frame.
pub fn commit(transaction: &str, receipt: Option<&str>, version: Option<StompVersion>) -> Result<Frame> {
    let mut frame = Frame::new("COMMIT", version.unwrap_or_default());
    frame.set_header(header::TRANSACTION, transaction);
    add_receipt_header(&mut frame, receipt)?;
    Ok(frame)
}

/// Build a heart-beat (1.1+ only).
pub fn beat(version: Option<StompVersion>) -> Result<HeartBeat> {
    let version = version.unwrap_or_default();
    if version == StompVersion::V1_0 {
        return Err(StompError::protocol(format!("heart-beating not supported (version {})", StompVersion::V1_0)));
    }
    Ok(HeartBeat::new(version))
}

/// Determine the negotiated heart-beating period from a pair of proposed
/// intervals: `0` if either side proposed `0` (no heart-beats), else the max.
pub fn negotiate_heart_beat(client: u32, server: u32) -> u32 {
    if client == 0 || server == 0 {
        0
    } else {
        client.max(server)
    }
}

// ---- incoming frames ----

/// Interpret a CONNECTED frame against the versions we offered in [`connect`].
pub fn connected(frame: &Frame, versions: &[StompVersion]) -> Result<ConnectedInfo> {
    let mut sorted_versions: Vec<StompVersion> = if versions.is_empty() { vec![StompVersion::V1_0] } else { versions.to_vec() };
    sorted_versions.sort();
    let mut version = sorted_versions.last().copied().unwrap_or(StompVersion::V1_0);

    check_command(frame, &["CONNECTED"])?;

    if version != StompVersion::V1_0 {
        let header_version = frame.header(header::VERSION).unwrap_or(StompVersion::V1_0.as_str());
        let parsed = StompVersion::parse(header_version)
            .map_err(|_| StompError::protocol(format!("server version incompatible with accepted versions {sorted_versions:?} [headers={:?}]", frame.headers())))?;
        if !sorted_versions.contains(&parsed) {
            return Err(StompError::protocol(format!("server version incompatible with accepted versions {sorted_versions:?} [headers={:?}]", frame.headers())));
        }
        version = parsed;
    }

    let session = frame.header(header::SESSION).map(str::to_string);
    let server = if version == StompVersion::V1_0 { None } else { frame.header(header::SERVER).map(str::to_string) };

    let mut heart_beat = (0u32, 0u32);
    if version != StompVersion::V1_0 {
        if let Some(raw) = frame.header(header::HEART_BEAT) {
            heart_beat = parse_heart_beat_header(raw)?;
        }
    }

    Ok(ConnectedInfo { version, server, session, heart_beat })
}

/// Interpret a MESSAGE frame, returning the token to match it to its subscription.
pub fn message(frame: &Frame) -> Result<SubscriptionToken> {
    check_command(frame, &["MESSAGE"])?;
    check_header(frame, header::MESSAGE_ID)?;
    let destination = check_header(frame, header::DESTINATION)?;
    let subscription = match check_header(frame, header::SUBSCRIPTION) {
        Ok(id) => Some(id),
        Err(err) => {
            if frame.version() != StompVersion::V1_0 {
                return Err(err);
            }
            None
        }
    };
    Ok(match subscription {
        Some(id) => (header::ID.to_string(), id),
        None => (header::DESTINATION.to_string(), destination),
    })
}

/// Interpret a RECEIPT frame, returning its receipt id.
pub fn receipt(frame: &Frame) -> Result<String> {
    check_command(frame, &["RECEIPT"])?;
    check_header(frame, header::RECEIPT_ID)
}

/// Interpret an ERROR frame (only validates that it is one).
pub fn error(frame: &Frame) -> Result<()> {
    check_command(frame, &["ERROR"])
}

// ---- private helpers ----

fn ack_headers(frame: &Frame, transactions: &[String]) -> Result<Vec<(String, String)>> {
    let version = frame.version();
    check_command(frame, &["MESSAGE"])?;
    check_header(frame, header::MESSAGE_ID)?;
    if version != StompVersion::V1_0 {
        check_header(frame, header::SUBSCRIPTION)?;
    }

    let mut keys: Vec<(&str, &str)> = match version {
        StompVersion::V1_0 | StompVersion::V1_1 => vec![(header::SUBSCRIPTION, header::SUBSCRIPTION), (header::MESSAGE_ID, header::MESSAGE_ID)],
        StompVersion::V1_2 => {
            check_header(frame, header::ACK)?;
            vec![(header::ACK, header::ID)]
        }
    };
    if let Some(transaction) = frame.header(header::TRANSACTION) {
        if transactions.iter().any(|t| t == transaction) {
            keys.push((header::TRANSACTION, header::TRANSACTION));
        }
    }

    Ok(keys
        .into_iter()
        .filter_map(|(from, to)| frame.header(from).map(|v| (to.to_string(), v.to_string())))
        .collect())
}

fn add_receipt_header(frame: &mut Frame, receipt: Option<&str>) -> Result<()> {
    if let Some(receipt) = receipt {
        if receipt.is_empty() {
            return Ok(());
        }
        frame.set_header(header::RECEIPT, receipt);
    }
    Ok(())
}

fn check_command(frame: &Frame, commands: &[&str]) -> Result<()> {
    if !commands.contains(&frame.command()) {
        return Err(StompError::protocol(format!(
            "cannot handle command: {} [expected={}, headers={:?}]",
            frame.command(),
            commands.join(", "),
            frame.headers()
        )));
    }
    Ok(())
}

fn check_header(frame: &Frame, name: &str) -> Result<String> {
    frame.header(name).map(str::to_string).ok_or_else(|| {
        StompError::protocol(format!(
            "invalid {} frame ({name} header mandatory in version {}) [headers={:?}]",
            frame.command(),
            frame.version(),
            frame.headers()
        ))
    })
}

fn parse_heart_beat_header(raw: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = raw.split(spec::HEART_BEAT_SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(StompError::protocol(format!("invalid heart-beat header (two comma-separated and non-negative integers required): {raw}")));
    }
    let client: u32 = parts[0]
        .parse()
        .map_err(|_| StompError::protocol(format!("invalid heart-beat header (two comma-separated and non-negative integers required): {raw}")))?;
    let server: u32 = parts[1]
        .parse()
        .map_err(|_| StompError::protocol(format!("invalid heart-beat header (two comma-separated and non-negative integers required): {raw}")))?;
    Ok((client, server))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_offers_versions_and_host() {
        let frame = connect(None, None, &[], &[StompVersion::V1_0, StompVersion::V1_1], None, None).unwrap();
        assert_eq!(frame.header(header::ACCEPT_VERSION), Some("1.0,1.1"));
        assert_eq!(frame.header(header::HOST), Some(""));
    }

    #[test]
    fn connect_without_explicit_versions_has_no_accept_version_header() {
        let frame = connect(None, None, &[], &[], None, None).unwrap();
        assert_eq!(frame.header(header::ACCEPT_VERSION), None);
    }

    #[test]
    fn connect_rejects_heart_beats_under_1_0_only() {
        assert!(connect(None, None, &[], &[StompVersion::V1_0], None, Some((10, 10))).is_err());
        assert!(connect(None, None, &[], &[StompVersion::V1_0, StompVersion::V1_1], None, Some((10, 10))).is_ok());
    }

    #[test]
    fn subscribe_falls_back_to_destination_token_under_1_0() {
        let (_, token) = subscribe("/queue/test", &[], None, Some(StompVersion::V1_0)).unwrap();
        assert_eq!(token, (header::DESTINATION.to_string(), "/queue/test".to_string()));
    }

    #[test]
    fn subscribe_requires_id_header_from_1_1_onward() {
        assert!(subscribe("/queue/test", &[], None, Some(StompVersion::V1_1)).is_err());
        let (_, token) = subscribe("/queue/test", &[("id".to_string(), "42".to_string())], None, Some(StompVersion::V1_1)).unwrap();
        assert_eq!(token, (header::ID.to_string(), "42".to_string()));
    }

    #[test]
    fn message_token_matches_subscribe_token() {
        let frame = Frame::with_headers(
            "MESSAGE",
            [(header::DESTINATION.to_string(), "/queue/test".to_string()), (header::MESSAGE_ID.to_string(), "007".to_string())],
            Vec::new(),
            StompVersion::V1_0,
        );
        assert_eq!(message(&frame).unwrap(), (header::DESTINATION.to_string(), "/queue/test".to_string()));
    }

    #[test]
    fn ack_under_1_2_uses_id_header_from_ack() {
        let frame = Frame::with_headers(
            "MESSAGE",
            [
                (header::MESSAGE_ID.to_string(), "007".to_string()),
                (header::SUBSCRIPTION.to_string(), "0".to_string()),
                (header::ACK.to_string(), "abc123".to_string()),
            ],
            Vec::new(),
            StompVersion::V1_2,
        );
        let ack = ack(&frame, &[], None).unwrap();
        assert_eq!(ack.header(header::ID), Some("abc123"));
        assert_eq!(ack.header(header::MESSAGE_ID), None);
    }

    #[test]
    fn ack_under_1_1_uses_message_id_and_subscription() {
        let frame = Frame::with_headers(
            "MESSAGE",
            [
                (header::MESSAGE_ID.to_string(), "m".to_string()),
                (header::SUBSCRIPTION.to_string(), "s".to_string()),
                (header::ACK.to_string(), "a".to_string()),
            ],
            Vec::new(),
            StompVersion::V1_1,
        );
        let ack = ack(&frame, &[], None).unwrap();
        assert_eq!(ack.header(header::MESSAGE_ID), Some("m"));
        assert_eq!(ack.header(header::SUBSCRIPTION), Some("s"));
        assert_eq!(ack.header(header::ID), None);
    }

    #[test]
    fn nack_rejected_under_1_0() {
        let frame = Frame::with_headers(
            "MESSAGE",
            [(header::MESSAGE_ID.to_string(), "007".to_string())],
            Vec::new(),
            StompVersion::V1_0,
        );
        assert!(nack(&frame, &[], None).is_err());
    }

    #[test]
    fn ack_includes_transaction_only_when_active() {
        let frame = Frame::with_headers(
            "MESSAGE",
            [
                (header::MESSAGE_ID.to_string(), "007".to_string()),
                (header::SUBSCRIPTION.to_string(), "0".to_string()),
                (header::TRANSACTION.to_string(), "t1".to_string()),
            ],
            Vec::new(),
            StompVersion::V1_1,
        );
        assert_eq!(ack(&frame, &[], None).unwrap().header(header::TRANSACTION), None);
        assert_eq!(ack(&frame, &["t1".to_string()], None).unwrap().header(header::TRANSACTION), Some("t1"));
    }

    #[test]
    fn negotiate_heart_beat_zero_if_either_side_is_zero() {
        assert_eq!(negotiate_heart_beat(0, 500), 0);
        assert_eq!(negotiate_heart_beat(500, 0), 0);
        assert_eq!(negotiate_heart_beat(400, 500), 500);
    }

    #[test]
    fn connected_rejects_incompatible_version() {
        let frame = Frame::with_headers("CONNECTED", [(header::VERSION.to_string(), "1.2".to_string())], Vec::new(), StompVersion::V1_1);
        let result = connected(&frame, &[StompVersion::V1_0, StompVersion::V1_1]);
        assert!(result.is_err());
    }

    #[test]
    fn connected_reports_negotiated_heart_beat() {
        let frame = Frame::with_headers(
            "CONNECTED",
            [(header::VERSION.to_string(), "1.1".to_string()), (header::HEART_BEAT.to_string(), "10,20".to_string())],
            Vec::new(),
            StompVersion::V1_1,
        );
        let info = connected(&frame, &[StompVersion::V1_0, StompVersion::V1_1]).unwrap();
        assert_eq!(info.version, StompVersion::V1_1);
        assert_eq!(info.heart_beat, (10, 20));
    }
}
