// SPDX-License-Identifier: Apache-2.0

use crate::canonical::sha256_hex;

/// Content-addressed id: `<prefix>_<first 16 hex of sha256(parts joined by '|')>`.
///
/// Every persisted entity id (apps, mutations, reports, intents, bundles,
/// studio jobs) is derived this way so replays of the same request always
/// land on the same row.
#[must_use]
pub fn stable_id(prefix: &str, parts: &[&str]) -> String {
    let payload = parts.join("|");
    let digest = sha256_hex(payload.as_bytes());
    format!("{prefix}_{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::stable_id;

    #[test]
    fn stable_id_is_deterministic() {
        let a = stable_id("app", &["t_acme", "k1", "A"]);
        let b = stable_id("app", &["t_acme", "k1", "A"]);
        assert_eq!(a, b);
        assert!(a.starts_with("app_"));
        assert_eq!(a.len(), "app_".len() + 16);
    }

    #[test]
    fn stable_id_varies_with_any_part() {
        let a = stable_id("app", &["t_acme", "k1", "A"]);
        let b = stable_id("app", &["t_acme", "k2", "A"]);
        assert_ne!(a, b);
    }
}
