//! Two-stage link detector for the per-group anti-link policy: a primary
//! regex catches URLs and invite links outright; a secondary regex catches
//! bare domain names, but only when the trailing label is a known TLD (to
//! avoid flagging ordinary prose with a dot in it).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.)\S+|\bchat\.whatsapp\.com/\S+").expect("hardcoded url regex")
});

static BARE_DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9][a-z0-9-]*(?:\.[a-z0-9][a-z0-9-]*)+\.([a-z]{2,})\b")
        .expect("hardcoded bare domain regex")
});

const KNOWN_TLDS: &[&str] = &[
    "com", "net", "org", "io", "co", "me", "info", "biz", "xyz", "app", "dev", "gg", "link", "site",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub matched_text: String,
    pub is_invite_link: bool,
}

/// Scans `text` for a link, returning the first match not covered by
/// `allowed_networks`/`allowed_domains`. `allowed_networks` bypasses the
/// primary URL pattern wholesale (e.g. an internal file-sharing domain);
/// `allowed_domains` is checked against both stages.
pub fn detect(text: &str, allowed_networks: &BTreeSet<String>, allowed_domains: &BTreeSet<String>) -> Option<LinkMatch> {
    if let Some(m) = URL_PATTERN.find(text) {
        let matched = m.as_str();
        if !is_allowed(matched, allowed_networks, allowed_domains) {
            return Some(LinkMatch {
                matched_text: matched.to_string(),
                is_invite_link: matched.to_ascii_lowercase().contains("chat.whatsapp.com"),
            });
        }
    }

    if let Some(caps) = BARE_DOMAIN_PATTERN.captures(text) {
        let tld = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        if KNOWN_TLDS.contains(&tld.as_str()) {
            let matched = caps.get(0).expect("capture 0 always present").as_str();
            if !is_allowed(matched, allowed_networks, allowed_domains) {
                return Some(LinkMatch {
                    matched_text: matched.to_string(),
                    is_invite_link: false,
                });
            }
        }
    }

    None
}

fn is_allowed(matched: &str, allowed_networks: &BTreeSet<String>, allowed_domains: &BTreeSet<String>) -> bool {
    let lowered = matched.to_ascii_lowercase();
    allowed_networks.iter().any(|n| lowered.contains(&n.to_ascii_lowercase()))
        || allowed_domains.iter().any(|d| lowered.contains(&d.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_url() {
        let result = detect("check this out https://example.com/path", &BTreeSet::new(), &BTreeSet::new());
        assert!(result.is_some());
        assert!(!result.unwrap().is_invite_link);
    }

    #[test]
    fn detects_invite_link() {
        let result = detect("join us chat.whatsapp.com/AbCd1234", &BTreeSet::new(), &BTreeSet::new());
        let m = result.expect("invite link should match");
        assert!(m.is_invite_link);
    }

    #[test]
    fn detects_bare_domain_with_known_tld() {
        let result = detect("visit spam-site.xyz now", &BTreeSet::new(), &BTreeSet::new());
        assert!(result.is_some());
    }

    #[test]
    fn ignores_dotted_text_without_known_tld() {
        let result = detect("v1.2.3-release-notes", &BTreeSet::new(), &BTreeSet::new());
        assert!(result.is_none());
    }

    #[test]
    fn allowed_domain_bypasses_detection() {
        let mut allowed = BTreeSet::new();
        allowed.insert("example.com".to_string());
        let result = detect("see https://example.com/offer", &BTreeSet::new(), &allowed);
        assert!(result.is_none());
    }

    #[test]
    fn allowed_network_bypasses_invite_link() {
        let mut allowed = BTreeSet::new();
        allowed.insert("chat.whatsapp.com".to_string());
        let result = detect("chat.whatsapp.com/ourowngroup", &allowed, &BTreeSet::new());
        assert!(result.is_none());
    }

    #[test]
    fn ignores_clean_text() {
        let result = detect("good morning everyone", &BTreeSet::new(), &BTreeSet::new());
        assert!(result.is_none());
    }
}
