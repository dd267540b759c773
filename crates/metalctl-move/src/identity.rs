//! Provider identity strings of the form `<scheme>://<uid>`

/// Identity scheme used by Metal3 machines and nodes
pub const METAL3_SCHEME: &str = "metal3";

/// Identity string pointing at `uid`
pub fn expected(scheme: &str, uid: &str) -> String {
    format!("{}://{}", scheme, uid)
}

/// Compute the identity that should replace `current` after a host got `new_uid`
///
/// Returns the expected identity and whether it differs from `current`.
pub fn rewrite(current: &str, new_uid: &str, scheme: &str) -> (String, bool) {
    let expected = expected(scheme, new_uid);
    let changed = current != expected;
    (expected, changed)
}

/// Split an identity into scheme and uid
pub fn parse(identity: &str) -> Option<(&str, &str)> {
    identity
        .split_once("://")
        .filter(|(scheme, uid)| !scheme.is_empty() && !uid.is_empty())
}

/// True when `identity` points at `uid` under `scheme`
pub fn points_at(identity: &str, scheme: &str, uid: &str) -> bool {
    parse(identity) == Some((scheme, uid))
}
