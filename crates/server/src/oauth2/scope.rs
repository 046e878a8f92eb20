//! Structured authorization scope and its flat string encoding.
//!
//! The token protocol carries scope as one whitespace-separated string. A
//! [`Scope`] is encoded as `prefix:value` tokens in a fixed order:
//!
//! ```text
//! object:read object:list project:P bucket:b1 bucket:b2 cubbyhole:<base64url>
//! ```
//!
//! Every value is percent-encoded, so reserved delimiters inside a value can
//! never split or merge tokens. Decoding is a pure parse: it validates syntax
//! only and leaves ownership checks to the caller.

use crate::error::ScopeError;
use base64::Engine;
use std::fmt;

/// Upper bound on the number of buckets a single grant may name.
pub const MAX_BUCKETS: usize = 64;
/// Upper bound on the encoded cubbyhole payload length.
pub const MAX_CUBBYHOLE_LEN: usize = 4096;

const PROJECT: &str = "project";
const BUCKET: &str = "bucket";
const CUBBYHOLE: &str = "cubbyhole";
const OBJECT: &str = "object";

/// Object operations a grant may allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    List,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Read,
        Operation::Write,
        Operation::List,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::List => "list",
            Operation::Delete => "delete",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Operation::ALL.into_iter().find(|op| op.as_str() == value)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of allowed object operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub list: bool,
    pub delete: bool,
}

impl Permissions {
    pub const fn all() -> Self {
        Permissions {
            read: true,
            write: true,
            list: true,
            delete: true,
        }
    }

    pub const fn none() -> Self {
        Permissions {
            read: false,
            write: false,
            list: false,
            delete: false,
        }
    }

    pub fn allows(&self, op: Operation) -> bool {
        match op {
            Operation::Read => self.read,
            Operation::Write => self.write,
            Operation::List => self.list,
            Operation::Delete => self.delete,
        }
    }

    fn set(&mut self, op: Operation) {
        match op {
            Operation::Read => self.read = true,
            Operation::Write => self.write = true,
            Operation::List => self.list = true,
            Operation::Delete => self.delete = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Permissions::none()
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::all()
    }
}

/// The resources and key-sharing payload a user consented to expose.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub permissions: Permissions,
    pub project: String,
    /// Buckets in consent order. Empty means every bucket in the project.
    pub buckets: Vec<String>,
    /// Client-encrypted key material, opaque to the provider.
    pub cubbyhole: Option<String>,
}

impl Scope {
    /// A scope granting all operations on the whole project.
    pub fn new(project: impl Into<String>) -> Self {
        Scope {
            permissions: Permissions::all(),
            project: project.into(),
            buckets: Vec::new(),
            cubbyhole: None,
        }
    }

    pub fn with_buckets<I, S>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buckets = buckets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cubbyhole(mut self, cubbyhole: impl Into<String>) -> Self {
        self.cubbyhole = Some(cubbyhole.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Check that every field is within the scope grammar.
    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.permissions.is_empty() {
            return Err(ScopeError::EmptyPermissions);
        }
        if !is_valid_project(&self.project) {
            return Err(ScopeError::InvalidProject(self.project.clone()));
        }
        if self.buckets.len() > MAX_BUCKETS {
            return Err(ScopeError::TooManyBuckets {
                count: self.buckets.len(),
                max: MAX_BUCKETS,
            });
        }
        for (i, bucket) in self.buckets.iter().enumerate() {
            if !is_valid_bucket(bucket) {
                return Err(ScopeError::InvalidBucket(bucket.clone()));
            }
            if self.buckets[..i].contains(bucket) {
                return Err(ScopeError::DuplicateBucket(bucket.clone()));
            }
        }
        if let Some(cubbyhole) = &self.cubbyhole
            && !is_valid_cubbyhole(cubbyhole)
        {
            return Err(ScopeError::InvalidCubbyhole);
        }
        Ok(())
    }

    /// Serialize to the protocol scope string. Deterministic for equal scopes.
    ///
    /// Fails for any scope [`Scope::decode`] would not read back unchanged,
    /// including one that allows no operation.
    pub fn encode(&self) -> Result<String, ScopeError> {
        self.validate()?;

        let mut tokens = Vec::with_capacity(6 + self.buckets.len());
        for op in Operation::ALL {
            if self.permissions.allows(op) {
                tokens.push(format!("{OBJECT}:{op}"));
            }
        }
        tokens.push(format!("{PROJECT}:{}", urlencoding::encode(&self.project)));
        for bucket in &self.buckets {
            tokens.push(format!("{BUCKET}:{}", urlencoding::encode(bucket)));
        }
        if let Some(cubbyhole) = &self.cubbyhole {
            tokens.push(format!("{CUBBYHOLE}:{}", urlencoding::encode(cubbyhole)));
        }
        Ok(tokens.join(" "))
    }

    /// Parse a protocol scope string.
    ///
    /// Tokens without a `prefix:` or with an unknown prefix (e.g. `openid`)
    /// are skipped. Everything else must be well formed.
    pub fn decode(raw: &str) -> Result<Scope, ScopeError> {
        let mut permissions = Permissions::none();
        let mut project: Option<String> = None;
        let mut buckets: Vec<String> = Vec::new();
        let mut cubbyhole: Option<String> = None;

        for token in raw.split_whitespace() {
            let Some((prefix, value)) = token.split_once(':') else {
                continue;
            };
            match prefix {
                OBJECT => {
                    let op = Operation::parse(value)
                        .ok_or_else(|| ScopeError::UnknownPermission(value.to_string()))?;
                    permissions.set(op);
                }
                PROJECT => {
                    if project.is_some() {
                        return Err(ScopeError::DuplicateField(PROJECT));
                    }
                    let value = unescape(value, PROJECT)?;
                    if !is_valid_project(&value) {
                        return Err(ScopeError::InvalidProject(value));
                    }
                    project = Some(value);
                }
                BUCKET => {
                    let value = unescape(value, BUCKET)?;
                    if !is_valid_bucket(&value) {
                        return Err(ScopeError::InvalidBucket(value));
                    }
                    if buckets.contains(&value) {
                        return Err(ScopeError::DuplicateBucket(value));
                    }
                    buckets.push(value);
                    if buckets.len() > MAX_BUCKETS {
                        return Err(ScopeError::TooManyBuckets {
                            count: buckets.len(),
                            max: MAX_BUCKETS,
                        });
                    }
                }
                CUBBYHOLE => {
                    if cubbyhole.is_some() {
                        return Err(ScopeError::DuplicateField(CUBBYHOLE));
                    }
                    let value = unescape(value, CUBBYHOLE)?;
                    if !is_valid_cubbyhole(&value) {
                        return Err(ScopeError::InvalidCubbyhole);
                    }
                    cubbyhole = Some(value);
                }
                _ => {}
            }
        }

        let project = project.ok_or(ScopeError::MissingProject)?;
        if permissions.is_empty() {
            permissions = Permissions::all();
        }

        Ok(Scope {
            permissions,
            project,
            buckets,
            cubbyhole,
        })
    }

    /// Whether this grant covers the given bucket.
    pub fn covers_bucket(&self, bucket: &str) -> bool {
        self.buckets.is_empty() || self.buckets.iter().any(|b| b == bucket)
    }
}

impl std::str::FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::decode(s)
    }
}

fn unescape(value: &str, field: &'static str) -> Result<String, ScopeError> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|_| ScopeError::InvalidEncoding(field))
}

fn is_valid_project(value: &str) -> bool {
    (1..=64).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_valid_bucket(value: &str) -> bool {
    let bytes = value.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    bytes.len() <= 63
        && is_lower_alnum(*first)
        && is_lower_alnum(*last)
        && bytes
            .iter()
            .all(|&b| is_lower_alnum(b) || b == b'-' || b == b'.')
}

fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn is_valid_cubbyhole(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_CUBBYHOLE_LEN
        && base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(value)
            .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Scope {
        Scope::new("P")
            .with_buckets(["b1", "b2"])
            .with_cubbyhole("c2VjcmV0LWtleS1tYXRlcmlhbA")
    }

    #[test]
    fn encode_is_canonical() {
        assert_eq!(
            sample().encode().unwrap(),
            "object:read object:write object:list object:delete project:P bucket:b1 bucket:b2 cubbyhole:c2VjcmV0LWtleS1tYXRlcmlhbA"
        );
    }

    #[test]
    fn decode_reverses_encode() {
        let scope = sample();
        assert_eq!(Scope::decode(&scope.encode().unwrap()).unwrap(), scope);

        let narrow = Scope::new("proj_1.a-b")
            .with_permissions(Permissions {
                read: true,
                list: true,
                ..Permissions::none()
            })
            .with_buckets(["photos", "a.b-c"]);
        assert_eq!(Scope::decode(&narrow.encode().unwrap()).unwrap(), narrow);
    }

    #[test]
    fn bucket_order_is_preserved() {
        let scope = Scope::new("P").with_buckets(["zeta", "alpha"]);
        let decoded = Scope::decode(&scope.encode().unwrap()).unwrap();
        assert_eq!(decoded.buckets, vec!["zeta", "alpha"]);
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let decoded = Scope::decode("openid email project:P future:thing bucket:b1").unwrap();
        assert_eq!(decoded.project, "P");
        assert_eq!(decoded.buckets, vec!["b1"]);
        assert_eq!(decoded.permissions, Permissions::all());
    }

    #[test]
    fn explicit_permissions_narrow_the_grant() {
        let decoded = Scope::decode("object:read project:P").unwrap();
        assert!(decoded.permissions.allows(Operation::Read));
        assert!(!decoded.permissions.allows(Operation::Write));
        assert!(!decoded.permissions.allows(Operation::Delete));
    }

    #[test]
    fn missing_project_fails() {
        assert_eq!(
            Scope::decode("bucket:b1").unwrap_err(),
            ScopeError::MissingProject
        );
        assert_eq!(Scope::decode("").unwrap_err(), ScopeError::MissingProject);
    }

    #[test]
    fn duplicate_fields_fail() {
        assert_eq!(
            Scope::decode("project:P project:Q").unwrap_err(),
            ScopeError::DuplicateField("project")
        );
        assert_eq!(
            Scope::decode("project:P cubbyhole:YQ cubbyhole:Yg").unwrap_err(),
            ScopeError::DuplicateField("cubbyhole")
        );
        assert!(matches!(
            Scope::decode("project:P bucket:b1 bucket:b1"),
            Err(ScopeError::DuplicateBucket(_))
        ));
    }

    #[test]
    fn invalid_identifiers_fail() {
        assert!(matches!(
            Scope::decode("project:a%20b"),
            Err(ScopeError::InvalidProject(_))
        ));
        assert!(matches!(
            Scope::decode("project:P bucket:UPPER"),
            Err(ScopeError::InvalidBucket(_))
        ));
        assert!(matches!(
            Scope::decode("project:P bucket:-lead"),
            Err(ScopeError::InvalidBucket(_))
        ));
        assert!(matches!(
            Scope::decode("project:"),
            Err(ScopeError::InvalidProject(_))
        ));
    }

    #[test]
    fn bad_percent_encoding_fails() {
        assert_eq!(
            Scope::decode("project:%FF%FE").unwrap_err(),
            ScopeError::InvalidEncoding("project")
        );
    }

    #[test]
    fn bad_cubbyhole_fails() {
        assert_eq!(
            Scope::decode("project:P cubbyhole:not*base64").unwrap_err(),
            ScopeError::InvalidCubbyhole
        );
        let huge = "A".repeat(MAX_CUBBYHOLE_LEN + 1);
        assert_eq!(
            Scope::decode(&format!("project:P cubbyhole:{huge}")).unwrap_err(),
            ScopeError::InvalidCubbyhole
        );
    }

    #[test]
    fn unknown_permission_fails() {
        assert!(matches!(
            Scope::decode("object:admin project:P"),
            Err(ScopeError::UnknownPermission(_))
        ));
    }

    #[test]
    fn bucket_limit_is_enforced() {
        let names: Vec<String> = (0..=MAX_BUCKETS).map(|i| format!("b{i}")).collect();
        let raw = format!(
            "project:P {}",
            names
                .iter()
                .map(|n| format!("bucket:{n}"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        assert!(matches!(
            Scope::decode(&raw),
            Err(ScopeError::TooManyBuckets { .. })
        ));
    }

    #[test]
    fn arbitrary_input_never_panics() {
        for raw in [
            ":", "::::", "project", "project:%", "project:%2", "\u{0}project:P", "bucket: project:P",
            "project:P\tbucket:b1\nbucket:b2",
        ] {
            let _ = Scope::decode(raw);
        }
        let decoded = Scope::decode("project:P\tbucket:b1\nbucket:b2").unwrap();
        assert_eq!(decoded.buckets, vec!["b1", "b2"]);
    }

    #[test]
    fn encode_rejects_scopes_decode_would_change() {
        assert_eq!(
            Scope::new("P")
                .with_permissions(Permissions::none())
                .encode()
                .unwrap_err(),
            ScopeError::EmptyPermissions
        );
        assert!(matches!(
            Scope::new("my project").encode(),
            Err(ScopeError::InvalidProject(_))
        ));
        assert!(matches!(
            Scope::new("P").with_buckets(["Bad_Bucket"]).encode(),
            Err(ScopeError::InvalidBucket(_))
        ));
        assert!(matches!(
            Scope::new("P").with_buckets(["b1", "b1"]).encode(),
            Err(ScopeError::DuplicateBucket(_))
        ));
        assert_eq!(
            Scope::new("P").with_cubbyhole("").encode().unwrap_err(),
            ScopeError::InvalidCubbyhole
        );
        let names: Vec<String> = (0..=MAX_BUCKETS).map(|i| format!("b{i}")).collect();
        assert!(matches!(
            Scope::new("P").with_buckets(names).encode(),
            Err(ScopeError::TooManyBuckets { .. })
        ));
    }

    #[test]
    fn covers_bucket_respects_empty_list() {
        assert!(Scope::new("P").covers_bucket("anything"));
        assert!(sample().covers_bucket("b2"));
        assert!(!sample().covers_bucket("b3"));
    }
}
