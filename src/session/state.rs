//! Page state classification.
//!
//! [`classify`] is a pure function over the page's observable state at the
//! instant it runs: the current URL plus freshly gathered DOM probe results.
//! Nothing is cached; callers re-run the classification after every
//! navigation and after every explicit wait.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SiteProfile;

// ============================================================================
// PageState
// ============================================================================

/// What the session page currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageState {
    /// The application's canonical top-level page with content mounted.
    Home,
    /// A login or passport page.
    Login,
    /// A verification challenge.
    Captcha,
    /// A risk-control interstitial.
    RiskControl,
    /// Anything else.
    Unknown,
}

impl PageState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Login => "login",
            Self::Captcha => "captcha",
            Self::RiskControl => "risk-control",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` if this state needs a human before automation can
    /// continue.
    #[inline]
    #[must_use]
    pub const fn needs_human(self) -> bool {
        matches!(self, Self::Login | Self::Captcha | Self::RiskControl)
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DomProbes
// ============================================================================

/// Results of the DOM probes classification consumes.
///
/// Gathered fresh from the live page right before classification; never
/// reused across an await.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomProbes {
    /// The home content selector matched.
    pub home_marker: bool,
    /// A challenge element is present.
    pub captcha_marker: bool,
    /// A risk-control element is present.
    pub risk_marker: bool,
}

// ============================================================================
// Classification
// ============================================================================

/// Classifies a page from its URL and DOM probe results.
///
/// Challenge and risk-control markers win over everything else, including a
/// home URL: during a login-to-home redirect race the home URL can be
/// showing while a challenge overlay is mounted, and automation must not
/// mistake that for a usable home page. `Home` additionally requires the
/// home DOM marker because a transitional redirect can present the home URL
/// before content mounts.
#[must_use]
pub fn classify(url: &str, probes: &DomProbes, site: &SiteProfile) -> PageState {
    let lower = url.to_ascii_lowercase();

    if probes.captcha_marker || contains_any(&lower, &site.captcha_markers) {
        return PageState::Captcha;
    }
    if probes.risk_marker || contains_any(&lower, &site.risk_markers) {
        return PageState::RiskControl;
    }
    if contains_any(&lower, &site.login_markers) {
        return PageState::Login;
    }
    if site.home_pattern.is_match(url) && probes.home_marker {
        return PageState::Home;
    }
    PageState::Unknown
}

/// Returns `true` if any marker occurs in the URL.
fn contains_any(url: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| url.contains(m.as_str()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn site() -> SiteProfile {
        SiteProfile::new("https://site").unwrap()
    }

    fn probes(home: bool, captcha: bool, risk: bool) -> DomProbes {
        DomProbes {
            home_marker: home,
            captcha_marker: captcha,
            risk_marker: risk,
        }
    }

    #[test]
    fn test_login_url() {
        let state = classify("https://site/login?x=1", &DomProbes::default(), &site());
        assert_eq!(state, PageState::Login);
    }

    #[test]
    fn test_captcha_url_wins_over_home_markers() {
        // Even with the home DOM marker present, a captcha URL classifies
        // as captcha.
        let state = classify(
            "https://site/captcha/verify",
            &probes(true, false, false),
            &site(),
        );
        assert_eq!(state, PageState::Captcha);
    }

    #[test]
    fn test_captcha_dom_wins_over_home_url() {
        let state = classify("https://site/", &probes(true, true, false), &site());
        assert_eq!(state, PageState::Captcha);
    }

    #[test]
    fn test_home_requires_dom_marker() {
        assert_eq!(
            classify("https://site/", &probes(true, false, false), &site()),
            PageState::Home
        );
        // Home URL alone is insufficient.
        assert_eq!(
            classify("https://site/", &DomProbes::default(), &site()),
            PageState::Unknown
        );
    }

    #[test]
    fn test_risk_control() {
        let state = classify(
            "https://site/security/check",
            &DomProbes::default(),
            &site(),
        );
        assert_eq!(state, PageState::RiskControl);
    }

    #[test]
    fn test_unrelated_url_is_unknown() {
        let state = classify(
            "https://site/u/12345/profile",
            &DomProbes::default(),
            &site(),
        );
        assert_eq!(state, PageState::Unknown);
    }

    #[test]
    fn test_passport_marker() {
        let state = classify(
            "https://passport.site/sso?next=/",
            &DomProbes::default(),
            &site(),
        );
        assert_eq!(state, PageState::Login);
    }

    #[test]
    fn test_needs_human() {
        assert!(PageState::Login.needs_human());
        assert!(PageState::Captcha.needs_human());
        assert!(PageState::RiskControl.needs_human());
        assert!(!PageState::Home.needs_human());
        assert!(!PageState::Unknown.needs_human());
    }

    proptest! {
        // Classification is a pure function: the same inputs always yield
        // the same state, and no URL panics the classifier.
        #[test]
        fn prop_classification_idempotent(url in "\\PC{0,60}", home in any::<bool>(), captcha in any::<bool>(), risk in any::<bool>()) {
            let site = site();
            let probes = probes(home, captcha, risk);
            let first = classify(&url, &probes, &site);
            let second = classify(&url, &probes, &site);
            prop_assert_eq!(first, second);
        }
    }
}
