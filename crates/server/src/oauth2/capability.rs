//! Attenuable bearer capabilities.
//!
//! A capability is a key id (`head`), an ordered list of caveats and a
//! `tail` signature:
//!
//! ```text
//! tail_0 = HMAC-SHA256(root_secret, head)
//! tail_n = HMAC-SHA256(tail_{n-1}, caveat_n)
//! ```
//!
//! Anyone holding a capability can append a caveat and re-chain, which only
//! narrows it. Dropping or editing a caveat requires the previous tail, which
//! cannot be recovered from the current one.

use crate::error::CapabilityError;
use crate::oauth2::scope::{Operation, Scope};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// A single restriction. All fields narrow; an absent field restricts nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disallow_reads: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disallow_writes: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disallow_lists: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disallow_deletes: bool,
    /// Buckets the holder may touch. Empty allows every bucket.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_buckets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Unix seconds after which the capability is dead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl Caveat {
    /// Build the caveat that confines a capability to a consented scope.
    pub fn for_scope(scope: &Scope, not_after: Option<OffsetDateTime>) -> Self {
        Caveat {
            disallow_reads: !scope.permissions.read,
            disallow_writes: !scope.permissions.write,
            disallow_lists: !scope.permissions.list,
            disallow_deletes: !scope.permissions.delete,
            allowed_buckets: scope.buckets.clone(),
            project: Some(scope.project.clone()),
            not_after: not_after.map(|t| t.unix_timestamp()),
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    fn check(&self, action: &Action<'_>) -> Result<(), CapabilityError> {
        if let Some(not_after) = self.not_after
            && action.time.unix_timestamp() >= not_after
        {
            return Err(CapabilityError::Expired);
        }
        let disallowed = match action.op {
            Operation::Read => self.disallow_reads,
            Operation::Write => self.disallow_writes,
            Operation::List => self.disallow_lists,
            Operation::Delete => self.disallow_deletes,
        };
        if disallowed {
            return Err(CapabilityError::Denied(action.op.to_string()));
        }
        if let Some(project) = &self.project
            && project != action.project
        {
            return Err(CapabilityError::Denied(format!("project {}", action.project)));
        }
        if let Some(bucket) = action.bucket
            && !self.allowed_buckets.is_empty()
            && !self.allowed_buckets.iter().any(|b| b == bucket)
        {
            return Err(CapabilityError::Denied(format!("bucket {bucket}")));
        }
        Ok(())
    }
}

/// Something a holder wants to do with a capability.
#[derive(Clone, Debug)]
pub struct Action<'a> {
    pub op: Operation,
    pub project: &'a str,
    pub bucket: Option<&'a str>,
    pub time: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability {
    head: Vec<u8>,
    /// Caveats kept as the exact bytes that were signed.
    caveats: Vec<Vec<u8>>,
    tail: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Wire {
    h: String,
    #[serde(default)]
    c: Vec<String>,
    t: String,
}

impl Capability {
    /// Mint an unrestricted capability for a root key.
    pub fn new(root_secret: &[u8], head: &[u8]) -> Self {
        Capability {
            head: head.to_vec(),
            caveats: Vec::new(),
            tail: sign(root_secret, head),
        }
    }

    /// Return a copy narrowed by one more caveat.
    pub fn restrict(&self, caveat: &Caveat) -> Result<Self, CapabilityError> {
        let encoded = serde_json::to_vec(caveat)?;
        let tail = sign(&self.tail, &encoded);
        let mut caveats = self.caveats.clone();
        caveats.push(encoded);
        Ok(Capability {
            head: self.head.clone(),
            caveats,
            tail,
        })
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// The root key id, when the head is UTF-8.
    pub fn key_id(&self) -> Option<&str> {
        std::str::from_utf8(&self.head).ok()
    }

    pub fn caveats(&self) -> Result<Vec<Caveat>, CapabilityError> {
        self.caveats
            .iter()
            .map(|c| serde_json::from_slice(c).map_err(CapabilityError::from))
            .collect()
    }

    /// Check the signature chain against the root secret.
    pub fn verify_signature(&self, root_secret: &[u8]) -> Result<(), CapabilityError> {
        let Some((last, rest)) = self.caveats.split_last() else {
            return verify_mac(root_secret, &self.head, &self.tail);
        };
        let mut tail = sign(root_secret, &self.head);
        for caveat in rest {
            tail = sign(&tail, caveat);
        }
        verify_mac(&tail, last, &self.tail)
    }

    /// Check the signature chain and that every caveat permits `action`.
    pub fn verify(&self, root_secret: &[u8], action: &Action<'_>) -> Result<(), CapabilityError> {
        self.verify_signature(root_secret)?;
        for caveat in self.caveats()? {
            caveat.check(action)?;
        }
        Ok(())
    }

    /// Check the signature chain, the time bound and the project binding,
    /// without asking for any particular operation.
    pub fn verify_bound(
        &self,
        root_secret: &[u8],
        project: &str,
        time: OffsetDateTime,
    ) -> Result<(), CapabilityError> {
        self.verify_signature(root_secret)?;
        for caveat in self.caveats()? {
            if let Some(not_after) = caveat.not_after
                && time.unix_timestamp() >= not_after
            {
                return Err(CapabilityError::Expired);
            }
            if let Some(bound) = &caveat.project
                && bound != project
            {
                return Err(CapabilityError::Denied(format!("project {project}")));
            }
        }
        Ok(())
    }

    /// Earliest `not_after` across all caveats.
    pub fn expires_at(&self) -> Result<Option<OffsetDateTime>, CapabilityError> {
        Ok(self
            .caveats()?
            .iter()
            .filter_map(|c| c.not_after)
            .min()
            .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok()))
    }

    pub fn serialize(&self) -> String {
        let wire = Wire {
            h: URL_SAFE_NO_PAD.encode(&self.head),
            c: self.caveats.iter().map(|c| URL_SAFE_NO_PAD.encode(c)).collect(),
            t: URL_SAFE_NO_PAD.encode(&self.tail),
        };
        // Wire only holds strings, serialization cannot fail.
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn parse(token: &str) -> Result<Self, CapabilityError> {
        let json = URL_SAFE_NO_PAD.decode(token)?;
        let wire: Wire = serde_json::from_slice(&json)?;
        Ok(Capability {
            head: URL_SAFE_NO_PAD.decode(wire.h)?,
            caveats: wire
                .c
                .into_iter()
                .map(|c| URL_SAFE_NO_PAD.decode(c))
                .collect::<Result<_, _>>()?,
            tail: URL_SAFE_NO_PAD.decode(wire.t)?,
        })
    }
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 takes keys of any size"),
    }
}

fn sign(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn verify_mac(key: &[u8], data: &[u8], expected: &[u8]) -> Result<(), CapabilityError> {
    let mut mac = new_mac(key);
    mac.update(data);
    mac.verify_slice(expected)
        .map_err(|_| CapabilityError::Signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::scope::Permissions;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(seconds).unwrap()
    }

    fn action<'a>(op: Operation, bucket: Option<&'a str>, time: i64) -> Action<'a> {
        Action {
            op,
            project: "P",
            bucket,
            time: at(time),
        }
    }

    fn restricted() -> Capability {
        let scope = Scope::new("P")
            .with_buckets(["b1", "b2"])
            .with_permissions(Permissions {
                read: true,
                list: true,
                ..Permissions::none()
            });
        Capability::new(SECRET, b"key-1")
            .restrict(&Caveat::for_scope(&scope, Some(at(2_000))).with_nonce("n"))
            .unwrap()
    }

    #[test]
    fn root_capability_verifies() {
        let cap = Capability::new(SECRET, b"key-1");
        assert!(cap.verify(SECRET, &action(Operation::Delete, Some("any"), 0)).is_ok());
        assert_eq!(cap.key_id(), Some("key-1"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let cap = restricted();
        assert!(matches!(
            cap.verify_signature(b"another secret"),
            Err(CapabilityError::Signature)
        ));
    }

    #[test]
    fn caveats_are_enforced() {
        let cap = restricted();
        assert!(cap.verify(SECRET, &action(Operation::Read, Some("b1"), 1_000)).is_ok());
        assert!(cap.verify(SECRET, &action(Operation::List, None, 1_000)).is_ok());
        assert!(matches!(
            cap.verify(SECRET, &action(Operation::Write, Some("b1"), 1_000)),
            Err(CapabilityError::Denied(_))
        ));
        assert!(matches!(
            cap.verify(SECRET, &action(Operation::Read, Some("b3"), 1_000)),
            Err(CapabilityError::Denied(_))
        ));
        let other_project = Action {
            project: "Q",
            ..action(Operation::Read, Some("b1"), 1_000)
        };
        assert!(cap.verify(SECRET, &other_project).is_err());
    }

    #[test]
    fn expiry_boundary() {
        let cap = restricted();
        assert!(cap.verify(SECRET, &action(Operation::Read, None, 1_999)).is_ok());
        assert!(matches!(
            cap.verify(SECRET, &action(Operation::Read, None, 2_000)),
            Err(CapabilityError::Expired)
        ));
        assert_eq!(cap.expires_at().unwrap(), Some(at(2_000)));
    }

    #[test]
    fn bound_check_ignores_operations() {
        let cap = restricted();
        assert!(cap.verify_bound(SECRET, "P", at(1_999)).is_ok());
        assert!(matches!(
            cap.verify_bound(SECRET, "P", at(2_000)),
            Err(CapabilityError::Expired)
        ));
        assert!(matches!(
            cap.verify_bound(SECRET, "Q", at(1_000)),
            Err(CapabilityError::Denied(_))
        ));
        assert!(cap.verify_bound(b"wrong", "P", at(1_000)).is_err());
    }

    #[test]
    fn dropping_a_caveat_breaks_the_chain() {
        let cap = restricted();
        let stripped = Capability {
            head: cap.head.clone(),
            caveats: Vec::new(),
            tail: cap.tail.clone(),
        };
        assert!(stripped.verify_signature(SECRET).is_err());
    }

    #[test]
    fn editing_a_caveat_breaks_the_chain() {
        let cap = restricted();
        let mut caveat = cap.caveats().unwrap().remove(0);
        caveat.disallow_writes = false;
        caveat.not_after = None;
        let forged = Capability {
            head: cap.head.clone(),
            caveats: vec![serde_json::to_vec(&caveat).unwrap()],
            tail: cap.tail.clone(),
        };
        assert!(matches!(
            forged.verify_signature(SECRET),
            Err(CapabilityError::Signature)
        ));
    }

    #[test]
    fn further_restriction_only_narrows() {
        let cap = restricted()
            .restrict(&Caveat {
                allowed_buckets: vec!["b2".into()],
                ..Caveat::default()
            })
            .unwrap();
        assert!(cap.verify(SECRET, &action(Operation::Read, Some("b2"), 1_000)).is_ok());
        assert!(cap.verify(SECRET, &action(Operation::Read, Some("b1"), 1_000)).is_err());
    }

    #[test]
    fn serialize_parse() {
        let cap = restricted();
        let token = cap.serialize();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        let parsed = Capability::parse(&token).unwrap();
        assert_eq!(parsed, cap);
        assert!(parsed.verify_signature(SECRET).is_ok());
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(Capability::parse("not a token!").is_err());
        assert!(Capability::parse(&URL_SAFE_NO_PAD.encode(b"{}")).is_err());
    }
}
