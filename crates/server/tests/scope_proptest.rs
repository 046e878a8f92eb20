//! Property-based tests for the scope codec.

use base64::Engine;
use oidc_provider::error::ScopeError;
use oidc_provider::oauth2::Scope;
use oidc_provider::oauth2::scope::{MAX_BUCKETS, Permissions};
use proptest::prelude::*;

fn arb_permissions() -> impl Strategy<Value = Permissions> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(read, write, list, delete)| Permissions {
            read,
            write,
            list,
            delete,
        },
    )
}

fn arb_bucket() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9]",
        "[a-z0-9][a-z0-9.-]{0,61}[a-z0-9]",
    ]
}

fn arb_cubbyhole() -> impl Strategy<Value = String> {
    proptest::collection::vec(any::<u8>(), 1..512)
        .prop_map(|bytes| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Scopes with arbitrary, possibly empty, permission sets and valid fields.
fn arb_scope() -> impl Strategy<Value = Scope> {
    (
        arb_permissions(),
        "[A-Za-z0-9._-]{1,64}",
        proptest::collection::hash_set(arb_bucket(), 0..16),
        proptest::option::of(arb_cubbyhole()),
    )
        .prop_map(|(permissions, project, buckets, cubbyhole)| Scope {
            permissions,
            project,
            buckets: buckets.into_iter().collect(),
            cubbyhole,
        })
}

proptest! {
    /// Every scope either round-trips exactly or is refused by `encode`.
    #[test]
    fn encode_then_decode_is_identity(scope in arb_scope()) {
        match scope.encode() {
            Ok(encoded) => {
                prop_assert!(!scope.permissions.is_empty());
                let decoded = Scope::decode(&encoded).expect("decode encoded scope");
                prop_assert_eq!(decoded, scope);
            }
            Err(e) => {
                prop_assert!(scope.permissions.is_empty());
                prop_assert_eq!(e, ScopeError::EmptyPermissions);
            }
        }
    }

    /// Identifiers outside the grammar never encode.
    #[test]
    fn invalid_project_never_encodes(project in "[^A-Za-z0-9._-]{1,8}") {
        let result = Scope::new(project).encode();
        prop_assert!(matches!(result, Err(ScopeError::InvalidProject(_))));
    }

    /// Whatever `decode` accepts re-encodes to a canonical string that decodes
    /// to the same scope.
    #[test]
    fn decoded_scopes_are_canonical(raw in "((object|project|bucket|cubbyhole|openid):[A-Za-z0-9._%-]{0,12} ?){0,8}") {
        if let Ok(scope) = Scope::decode(&raw) {
            let encoded = scope.encode().expect("decoded scope re-encodes");
            prop_assert_eq!(Scope::decode(&encoded).expect("canonical decode"), scope);
        }
    }
}

#[test]
fn bucket_limit_round_trips() {
    let buckets: Vec<String> = (0..MAX_BUCKETS).map(|i| format!("bucket-{i}")).collect();
    let scope = Scope::new("P").with_buckets(buckets);
    let encoded = scope.encode().expect("encode");
    assert_eq!(Scope::decode(&encoded).expect("decode"), scope);
}
