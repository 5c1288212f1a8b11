//! Canonical identity resolution between WhatsApp's privacy-mode `lid`
//! addressing and disclosed `jid` addressing (spec §4.D).

pub mod backfill;
pub mod error;
pub mod reconcile;
pub mod resolver;

pub use error::{IdentityError, Result};
pub use resolver::{IdentityResolver, IdentityResolverConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_alt_pair_reads_participant_and_alt() {
        let raw = json!({"participant": "123@lid", "participantAlt": "5511999999999@s.whatsapp.net"});
        let pair = IdentityResolver::extract_alt_pair(&raw);
        assert_eq!(
            pair,
            Some((
                "123@lid".to_string(),
                "5511999999999@s.whatsapp.net".to_string()
            ))
        );
    }

    #[test]
    fn extract_alt_pair_is_none_without_alt() {
        let raw = json!({"participant": "123@lid"});
        assert_eq!(IdentityResolver::extract_alt_pair(&raw), None);
    }

    #[test]
    fn extract_lid_pn_pair_normalizes_bare_phone_number() {
        let raw = json!({"lid": "L1@lid", "pn": 5511999999999u64});
        assert_eq!(
            IdentityResolver::extract_lid_pn_pair(&raw),
            Some(("L1@lid".to_string(), "5511999999999@s.whatsapp.net".to_string()))
        );
    }

    #[test]
    fn extract_lid_pn_pair_prefers_explicit_jid() {
        let raw = json!({"lid": "L1@lid", "jid": "5511999999999@s.whatsapp.net", "pn": 123});
        assert_eq!(
            IdentityResolver::extract_lid_pn_pair(&raw),
            Some(("L1@lid".to_string(), "5511999999999@s.whatsapp.net".to_string()))
        );
    }

    #[test]
    fn extract_lid_pn_pair_is_none_without_lid() {
        let raw = json!({"pn": 123});
        assert_eq!(IdentityResolver::extract_lid_pn_pair(&raw), None);
    }
}
