//! Property-Based Tests for capability derivation
//!
//! These tests check the derivation rules for arbitrary inputs:
//! 1. A capability always derives from itself
//! 2. Adding caveats to the claim never breaks derivation
//! 3. Changing a delegated caveat value is always an escalation
//! 4. Ability wildcards cover exactly their namespace

use proptest::prelude::*;
use invocation_core::{ability_covers, default_derives, Capability, DeriveError};

const OWNER: &str = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK";

fn caveats() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z]{1,8}", "[ -~]{0,16}"), 0..5)
}

fn capability(can: &str, with: &str, nb: &[(String, String)]) -> Capability {
    nb.iter()
        .fold(Capability::new(can, with), |cap, (k, v)| cap.with_caveat(k.clone(), v.clone()))
}

proptest! {
    /// Derivation is reflexive
    #[test]
    fn prop_derives_from_itself(nb in caveats(), ns in "[a-z]{1,8}", name in "[a-z]{1,8}") {
        let cap = capability(&format!("{}/{}", ns, name), OWNER, &nb);
        prop_assert!(default_derives(&cap, &cap).is_ok());
    }

    /// A claim with more caveats than the delegation is a narrowing, not an escalation
    #[test]
    fn prop_extra_claimed_caveats_allowed(delegated_nb in caveats(), extra in caveats()) {
        let delegated = capability("test/echo", OWNER, &delegated_nb);

        let mut claimed = delegated.clone();
        for (k, v) in &extra {
            if !delegated.nb.contains_key(k) {
                claimed = claimed.with_caveat(k.clone(), v.clone());
            }
        }

        prop_assert!(default_derives(&claimed, &delegated).is_ok());
    }

    /// Changing any delegated caveat value is rejected
    #[test]
    fn prop_changed_caveat_rejected(
        field in "[a-z]{1,8}",
        delegated_value in "[a-z]{1,8}",
        claimed_value in "[a-z]{1,8}",
    ) {
        prop_assume!(delegated_value != claimed_value);

        let delegated = Capability::new("test/echo", OWNER).with_caveat(field.clone(), delegated_value);
        let claimed = Capability::new("test/echo", OWNER).with_caveat(field.clone(), claimed_value);

        let is_caveat_violation = matches!(
            default_derives(&claimed, &delegated),
            Err(DeriveError::CaveatViolation { .. })
        );
        prop_assert!(is_caveat_violation);
    }

    /// A resource other than the delegated one is rejected
    #[test]
    fn prop_other_resource_rejected(suffix in "[a-z]{1,12}") {
        let delegated = Capability::new("test/echo", OWNER);
        let claimed = Capability::new("test/echo", format!("did:web:{}", suffix));
        prop_assert!(default_derives(&claimed, &delegated).is_err());
    }

    /// Namespace wildcards cover exactly their namespace
    #[test]
    fn prop_namespace_wildcard(ns in "[a-z]{1,8}", other in "[a-z]{1,8}", name in "[a-z]{1,8}") {
        let ns_wildcard = format!("{}/*", ns);
        let ns_ability = format!("{}/{}", ns, name);
        let other_ability = format!("{}/{}", other, name);
        prop_assert!(ability_covers(&ns_wildcard, &ns_ability));
        prop_assert!(ability_covers("*", &other_ability));

        if ns != other {
            prop_assert!(!ability_covers(&ns_wildcard, &other_ability));
        }
    }
}
