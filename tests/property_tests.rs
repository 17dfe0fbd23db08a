/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use riva_leads::models::LeadRequest;
use riva_leads::rate_limiter::{RateLimiter, RequestKind};
use riva_leads::validation::{is_valid_email, normalize_email, sanitize_text, validate_lead};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// Property: validators never panic
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn sanitized_text_is_bounded_and_clean(raw in "\\PC*", max in 1usize..64) {
        if let Some(clean) = sanitize_text(&raw, max) {
            prop_assert!(clean.chars().count() <= max);
            prop_assert!(!clean.chars().any(|c| c.is_control()));
            prop_assert_eq!(clean.trim(), clean.as_str());
            prop_assert!(!clean.is_empty());
        }
    }

    #[test]
    fn normalized_emails_are_lowercase_and_valid(
        local in "[A-Za-z0-9]{1,12}",
        domain in "[A-Za-z]{1,12}",
        tld in "[a-z]{2,4}"
    ) {
        let raw = format!("  {}@{}.{} ", local, domain, tld);
        let email = normalize_email(&raw).unwrap();
        prop_assert_eq!(email.clone(), email.to_lowercase());
        prop_assert!(is_valid_email(&email));
    }
}

// Property: a lead without email and phone is always rejected
proptest! {
    #[test]
    fn leads_without_contact_are_rejected(
        first_name in proptest::option::of("\\PC{0,40}"),
        company in proptest::option::of("\\PC{0,40}"),
        blank in "[ \\t]{0,4}"
    ) {
        let request = LeadRequest {
            first_name,
            company_name: company,
            email: Some(blank.clone()),
            phone: Some(blank),
            ..Default::default()
        };
        prop_assert!(validate_lead(request).is_err());
    }
}

// Property: the limiter never admits more than the cap inside one window
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn limiter_never_exceeds_cap_in_any_window(offsets in proptest::collection::vec(0i64..7200, 1..40)) {
        let mut offsets = offsets;
        offsets.sort_unstable();

        let admitted = block_on(async {
            let limiter = RateLimiter::new();
            let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            let mut admitted = Vec::new();
            for offset in &offsets {
                let now = start + Duration::seconds(*offset);
                if limiter.allow_at("203.0.113.9", RequestKind::Download, now).await {
                    admitted.push(now);
                }
            }
            admitted
        });

        let window = RequestKind::Download.window();
        for (i, t) in admitted.iter().enumerate() {
            let in_window = admitted[..=i].iter().filter(|a| **a >= *t - window).count();
            prop_assert!(in_window <= RequestKind::Download.max_requests());
        }
    }
}
