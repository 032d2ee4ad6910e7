//! Referral-domain classifier
//!
//! A referral counts when the referring URL sits on a `canada.ca` or
//! `gc.ca` host (ending at a domain boundary) and is not one of the
//! internal, design or test subdomains of `canada.ca`.

use bson::{doc, Document};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches hosts ending in `canada.ca` or `gc.ca`
pub const INCLUDE_PATTERN: &str = r"(://|\.)(canada\.ca|gc\.ca)([/?#:]|$)";

/// Matches internal, design, test and staging subdomains of `canada.ca`
pub const EXCLUDE_PATTERN: &str = r"(://|\.)(blog|blogue|digital|numerique|design|conception|alpha|staging|[^./]*test[^./]*)\.canada\.ca([/?#:]|$)";

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?i){}", INCLUDE_PATTERN)).expect("Valid referral include regex")
});

static EXCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?i){}", EXCLUDE_PATTERN)).expect("Valid referral exclude regex")
});

/// Whether the URL is on a government domain
pub fn is_included(url: &str) -> bool {
    INCLUDE.is_match(url)
}

/// Whether the URL is on an excluded internal subdomain
pub fn is_excluded(url: &str) -> bool {
    EXCLUDE.is_match(url)
}

/// Whether an interaction counts as "referred public"
pub fn is_referred_public(referring_url: Option<&str>, has_creator: bool) -> bool {
    match referring_url {
        Some(url) if !has_creator => is_included(url) && !is_excluded(url),
        _ => false,
    }
}

/// Query fragments applying the classifier to a field
///
/// Returned as two predicates because both constrain the same path.
pub fn referral_predicates(field: &str) -> [Document; 2] {
    [
        doc! { field: { "$regex": INCLUDE_PATTERN, "$options": "i" } },
        doc! { field: { "$not": { "$regex": EXCLUDE_PATTERN, "$options": "i" } } },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusion_requires_domain_boundary() {
        assert!(is_included("https://www.canada.ca/en/services.html"));
        assert!(is_included("https://ised-isde.canada.ca/site/x"));
        assert!(is_included("https://www.tpsgc-pwgsc.gc.ca"));
        assert!(is_included("HTTPS://WWW.CANADA.CA/FR"));
        assert!(!is_included("https://canada-preview.adobecqms.net/en"));
        assert!(!is_included("https://www.canada.ca.example.com/"));
        assert!(!is_included("https://notcanada.ca/"));
    }

    #[test]
    fn test_exclusion_subdomains() {
        for url in [
            "https://blog.canada.ca/x",
            "https://blogue.canada.ca/x",
            "https://digital.canada.ca/",
            "https://numerique.canada.ca/",
            "https://design.canada.ca/",
            "https://conception.canada.ca/",
            "https://alpha.canada.ca/",
            "https://staging.canada.ca/",
            "https://my-test-site.canada.ca/",
        ] {
            assert!(is_excluded(url), "{} should be excluded", url);
        }
        assert!(!is_excluded("https://ised-isde.canada.ca/site/x"));
        assert!(!is_excluded("https://www.canada.ca/en"));
    }

    #[test]
    fn test_referred_public() {
        assert!(!is_referred_public(Some("https://blog.canada.ca/x"), false));
        assert!(is_referred_public(Some("https://ised-isde.canada.ca/site/x"), false));
        assert!(!is_referred_public(Some("https://ised-isde.canada.ca/site/x"), true));
        assert!(!is_referred_public(None, false));
    }

    #[test]
    fn test_predicates_match_classifier() {
        let [include, exclude] = referral_predicates("referringUrl");
        assert!(include.get_document("referringUrl").is_ok());
        assert!(exclude
            .get_document("referringUrl")
            .unwrap()
            .get_document("$not")
            .is_ok());
    }
}
