//! Core value types shared by every dot1x layer.
//!
//! These describe a supplicant's session from the outside: where it is
//! attached, what hardware address it uses, which correlation tag its
//! current exchange carries, and which lifecycle notifications it emits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TypesError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The primary key of an authentication session.
///
/// One physical attachment point (switch + port) hosts at most one
/// session, so the key is derived from it. The content is opaque to the
/// session layer: it is compared and hashed, never parsed.
///
/// `#[serde(transparent)]` keeps the JSON form a plain string instead of
/// `{ "0": "..." }`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wraps any string-like value as a session key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrows the key as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A session is keyed by the device and port it was seen on, written back
/// to back the same way switch-port identities are usually printed
/// (`of:0000000000000001` + `3`).
impl From<&AttachmentPoint> for SessionKey {
    fn from(point: &AttachmentPoint) -> Self {
        Self(format!("{}{}", point.device, point.port))
    }
}

/// A 6-byte Ethernet hardware address.
///
/// Parsed from and displayed as lowercase `aa:bb:cc:dd:ee:ff`. Dashes are
/// accepted on input as well, since some switch vendors print them that
/// way.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Returns the raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypesError::InvalidMac(s.to_string());

        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

/// Where on the network a supplicant is connected: a switch (device) and
/// one of its ports.
///
/// The session layer never interprets this. It is carried on the session
/// so that downstream consumers of [`AuthEvent`] know which port to
/// open or block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentPoint {
    /// Switch identifier, e.g. `of:0000000000000001`.
    pub device: String,
    /// Port number on that switch.
    pub port: u32,
}

impl AttachmentPoint {
    pub fn new(device: impl Into<String>, port: u32) -> Self {
        Self {
            device: device.into(),
            port,
        }
    }
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.port)
    }
}

// ---------------------------------------------------------------------------
// Correlation identifiers
// ---------------------------------------------------------------------------

/// A one-byte tag correlating a request with the authentication server's
/// eventual response.
///
/// Session exchanges use the range `2..=254`. Values 0 and 1 are reserved
/// for exchanges that don't belong to any session (server status probes
/// and synthetic access requests), which is why the allocator in the
/// session layer never hands them out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct CorrelationId(pub u8);

impl CorrelationId {
    /// Smallest identifier handed out to a session.
    pub const MIN: u8 = 2;
    /// Largest identifier handed out to a session.
    pub const MAX: u8 = 254;
    /// Number of distinct identifiers in the session range.
    pub const SPAN: u8 = Self::MAX - Self::MIN + 1;

    /// Builds an identifier, checking that it lies in the session range.
    pub fn new(value: u8) -> Result<Self, TypesError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TypesError::CorrelationIdOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

/// The kind of lifecycle notification a session emits.
///
/// There is deliberately no `LoggedOff` kind: a logoff changes state but
/// doesn't notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    /// The supplicant sent a start; authentication has begun.
    Started,
    /// The supplicant identified itself; a request went upstream.
    Requested,
    /// The authentication server accepted the supplicant.
    Approved,
    /// The authentication server rejected the supplicant.
    Denied,
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Requested => write!(f, "REQUESTED"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Denied => write!(f, "DENIED"),
        }
    }
}

/// A lifecycle notification for one session.
///
/// `attachment_point` is `None` when the caller never told the session
/// where it lives. Consumers that enforce per-port policy should ignore
/// such events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub attachment_point: Option<AttachmentPoint>,
}

impl AuthEvent {
    pub fn new(
        kind: AuthEventKind,
        attachment_point: Option<AttachmentPoint>,
    ) -> Self {
        Self {
            kind,
            attachment_point,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Tests for the value types and their serialized shapes.

    use super::*;

    // =====================================================================
    // SessionKey
    // =====================================================================

    #[test]
    fn test_session_key_serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionKey::new("of:1/3")).unwrap();
        assert_eq!(json, "\"of:1/3\"");
    }

    #[test]
    fn test_session_key_from_attachment_point_concatenates() {
        let point = AttachmentPoint::new("of:0000000000000001", 3);
        let key = SessionKey::from(&point);
        assert_eq!(key.as_str(), "of:00000000000000013");
    }

    // =====================================================================
    // MacAddress
    // =====================================================================

    #[test]
    fn test_mac_parse_colon_separated() {
        let mac: MacAddress = "AA:bb:0c:DD:ee:01".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0x0c, 0xdd, 0xee, 0x01]);
    }

    #[test]
    fn test_mac_parse_dash_separated() {
        let mac: MacAddress = "00-11-22-33-44-55".parse().unwrap();
        assert_eq!(mac, MacAddress([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));
    }

    #[test]
    fn test_mac_display_is_lowercase_colon_form() {
        let mac = MacAddress([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn test_mac_parse_rejects_malformed_input() {
        for bad in [
            "",
            "aa:bb:cc:dd:ee",
            "aa:bb:cc:dd:ee:ff:00",
            "zz:bb:cc:dd:ee:ff",
            "a:bb:cc:dd:ee:ff0",
        ] {
            assert!(
                matches!(bad.parse::<MacAddress>(), Err(TypesError::InvalidMac(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    // =====================================================================
    // CorrelationId
    // =====================================================================

    #[test]
    fn test_correlation_id_accepts_session_range() {
        assert_eq!(CorrelationId::new(2).unwrap().value(), 2);
        assert_eq!(CorrelationId::new(254).unwrap().value(), 254);
    }

    #[test]
    fn test_correlation_id_rejects_reserved_values() {
        for reserved in [0u8, 1, 255] {
            assert_eq!(
                CorrelationId::new(reserved),
                Err(TypesError::CorrelationIdOutOfRange(reserved))
            );
        }
    }

    #[test]
    fn test_correlation_id_span_is_253() {
        assert_eq!(CorrelationId::SPAN, 253);
    }

    // =====================================================================
    // AuthEvent
    // =====================================================================

    #[test]
    fn test_event_kind_serializes_screaming_case() {
        let json = serde_json::to_string(&AuthEventKind::Approved).unwrap();
        assert_eq!(json, "\"APPROVED\"");
        assert_eq!(AuthEventKind::Requested.to_string(), "REQUESTED");
    }

    #[test]
    fn test_auth_event_json_shape() {
        let event = AuthEvent::new(
            AuthEventKind::Started,
            Some(AttachmentPoint::new("of:1", 7)),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "STARTED");
        assert_eq!(json["attachment_point"]["device"], "of:1");
        assert_eq!(json["attachment_point"]["port"], 7);
    }
}
