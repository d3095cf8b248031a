//! Session configuration types.
//!
//! Provides a type-safe interface for everything a collaborator injects at
//! session creation: the site profile (URL and DOM markers used for page
//! classification), fingerprint parameters, behavior-simulation toggles and
//! the timing knobs for polling, settling and retrying.
//!
//! The crate only defines these types; loading them from disk or environment
//! is the configuration collaborator's job.
//!
//! # Example
//!
//! ```ignore
//! use session_pilot::SessionOptions;
//!
//! let options = SessionOptions::new("https://example.com")?
//!     .with_viewport(1920, 1080)
//!     .with_locale("en-US")
//!     .with_data_dir("./data");
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default interval between login-status polls.
const DEFAULT_LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default cap on how long `ensure_on_target_page` waits for a human login.
const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Default hard timeout for manual captcha resolution (5 minutes).
const DEFAULT_CAPTCHA_TIMEOUT: Duration = Duration::from_secs(300);

/// Default settle delay after navigation before markers are re-probed.
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default settle time after an observed action sequence.
const DEFAULT_OBSERVER_SETTLE: Duration = Duration::from_secs(2);

/// Default quiet period that counts as network idleness.
const DEFAULT_NETWORK_IDLE_THRESHOLD: Duration = Duration::from_millis(500);

/// Default cap on waiting for network idleness.
const DEFAULT_NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default delay between replayed requests in a batch.
const DEFAULT_REPLAY_DELAY: Duration = Duration::from_secs(1);

/// Default cap on retained navigation events.
const DEFAULT_HISTORY_CAP: usize = 100;

// ============================================================================
// SiteProfile
// ============================================================================

/// URL and DOM markers for one target site.
///
/// Page classification is driven entirely by this profile, so pointing the
/// crate at a different site is a configuration change, not a code change.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Canonical top-level URL of the application.
    pub base_url: Url,
    /// Pattern a URL must match to be a candidate for the home state.
    pub home_pattern: Regex,
    /// URL substrings that mark a login page.
    pub login_markers: Vec<String>,
    /// URL substrings that mark a verification challenge.
    pub captcha_markers: Vec<String>,
    /// URL substrings that mark a risk-control page.
    pub risk_markers: Vec<String>,
    /// Selector that must be present for the home classification.
    ///
    /// The home URL alone is insufficient: a transitional redirect can show
    /// the home URL before the primary content area mounts.
    pub home_selector: String,
    /// Selectors probed for a logged-in username, first match wins.
    pub username_selectors: Vec<String>,
    /// Selectors probed for the account avatar, first match wins.
    pub avatar_selectors: Vec<String>,
}

impl SiteProfile {
    /// Creates a profile for a base URL with default markers.
    ///
    /// The home pattern accepts the base URL's origin with an empty or `/`
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be parsed.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid base URL {base_url}: {e}")))?;
        let host = base_url
            .host_str()
            .ok_or_else(|| Error::config("base URL has no host"))?;

        let pattern = format!(r"^https?://(www\.)?{}/?(\?.*)?$", regex::escape(host));
        let home_pattern =
            Regex::new(&pattern).map_err(|e| Error::config(format!("home pattern: {e}")))?;

        Ok(Self {
            base_url,
            home_pattern,
            login_markers: vec![
                "login".to_string(),
                "passport".to_string(),
                "newlogin".to_string(),
            ],
            captcha_markers: vec!["captcha".to_string(), "verify".to_string()],
            risk_markers: vec!["security".to_string(), "risk".to_string()],
            home_selector: ".main-content".to_string(),
            username_selectors: vec![
                "[data-user-id]".to_string(),
                ".gn_name".to_string(),
                ".username".to_string(),
            ],
            avatar_selectors: vec![".gn_avatar img".to_string(), ".avatar img".to_string()],
        })
    }

    /// Replaces the home URL pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern is not a valid regex.
    pub fn with_home_pattern(mut self, pattern: &str) -> Result<Self> {
        self.home_pattern =
            Regex::new(pattern).map_err(|e| Error::config(format!("home pattern: {e}")))?;
        Ok(self)
    }

    /// Replaces the home content selector.
    #[must_use]
    pub fn with_home_selector(mut self, selector: impl Into<String>) -> Self {
        self.home_selector = selector.into();
        self
    }

    /// Replaces the login URL markers.
    #[must_use]
    pub fn with_login_markers(mut self, markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.login_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Browser fingerprint parameters applied at session creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// BCP 47 locale tag.
    pub locale: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Viewport dimensions in pixels (width, height).
    pub viewport: (u32, u32),
    /// Optional geolocation override (latitude, longitude).
    pub geolocation: Option<(f64, f64)>,
    /// Optional user-agent override.
    pub user_agent: Option<String>,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            viewport: (1200, 800),
            geolocation: None,
            user_agent: None,
        }
    }
}

// ============================================================================
// BehaviorProfile
// ============================================================================

/// Human-behavior simulation toggles.
///
/// The `simulate_*` flags and `max_delay` are hints for backends that
/// implement behavior simulation; embedders configure their backend from
/// the same profile they pass in here. The orchestration layer itself
/// consumes only `min_delay`, as a fixed pacing delay between observed
/// actions. Pacing is deliberately not randomized at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorProfile {
    /// Simulate mouse movement before clicks.
    pub simulate_mouse: bool,
    /// Simulate incremental scrolling.
    pub simulate_scroll: bool,
    /// Simulate focus/blur around inputs.
    pub simulate_focus: bool,
    /// Fixed delay the observer applies between scripted actions.
    pub min_delay: Duration,
    /// Upper bound on any extra delay a behavior-simulating backend adds
    /// on top of the fixed pacing.
    pub max_delay: Duration,
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self {
            simulate_mouse: true,
            simulate_scroll: true,
            simulate_focus: true,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(1200),
        }
    }
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounded retry with exponential backoff for in-page script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Cap applied to the computed backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay after a given zero-based failed attempt.
    ///
    /// `base * 2^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Everything injected into [`Session::open`](crate::Session::open).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Target site markers.
    pub site: SiteProfile,
    /// Fingerprint parameters.
    pub fingerprint: Fingerprint,
    /// Behavior-simulation toggles.
    pub behavior: BehaviorProfile,
    /// Script retry policy.
    pub retry: RetryPolicy,
    /// Interval between login-status polls while waiting for a human login.
    pub login_poll_interval: Duration,
    /// Default timeout for the login-wait protocol.
    pub login_timeout: Duration,
    /// Hard timeout for manual captcha resolution.
    pub captcha_timeout: Duration,
    /// Settle delay after navigation before markers are re-probed.
    pub settle_delay: Duration,
    /// Quiet period that counts as network idleness.
    pub network_idle_threshold: Duration,
    /// Cap on waiting for network idleness.
    pub network_idle_timeout: Duration,
    /// Settle time after an observed action sequence.
    pub observer_settle: Duration,
    /// Delay between replayed requests in a batch.
    pub replay_delay: Duration,
    /// Directory where exchange-log artifacts are written.
    pub data_dir: PathBuf,
    /// Cap on retained navigation events, oldest evicted first.
    pub history_cap: usize,
}

impl SessionOptions {
    /// Creates options for a target site with all defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is invalid.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            site: SiteProfile::new(base_url)?,
            fingerprint: Fingerprint::default(),
            behavior: BehaviorProfile::default(),
            retry: RetryPolicy::default(),
            login_poll_interval: DEFAULT_LOGIN_POLL_INTERVAL,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            captcha_timeout: DEFAULT_CAPTCHA_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            network_idle_threshold: DEFAULT_NETWORK_IDLE_THRESHOLD,
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT,
            observer_settle: DEFAULT_OBSERVER_SETTLE,
            replay_delay: DEFAULT_REPLAY_DELAY,
            data_dir: PathBuf::from("./data"),
            history_cap: DEFAULT_HISTORY_CAP,
        })
    }
}

// ============================================================================
// SessionOptions - Builder Methods
// ============================================================================

impl SessionOptions {
    /// Replaces the site profile.
    #[must_use]
    pub fn with_site(mut self, site: SiteProfile) -> Self {
        self.site = site;
        self
    }

    /// Sets the viewport size in pixels.
    #[inline]
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.fingerprint.viewport = (width, height);
        self
    }

    /// Sets the locale tag.
    #[inline]
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.fingerprint.locale = locale.into();
        self
    }

    /// Sets the timezone name.
    #[inline]
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.fingerprint.timezone = timezone.into();
        self
    }

    /// Sets a geolocation override.
    #[inline]
    #[must_use]
    pub fn with_geolocation(mut self, latitude: f64, longitude: f64) -> Self {
        self.fingerprint.geolocation = Some((latitude, longitude));
        self
    }

    /// Sets a user-agent override.
    #[inline]
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.fingerprint.user_agent = Some(user_agent.into());
        self
    }

    /// Replaces the behavior profile.
    #[must_use]
    pub fn with_behavior(mut self, behavior: BehaviorProfile) -> Self {
        self.behavior = behavior;
        self
    }

    /// Replaces the retry policy.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the login poll interval.
    #[inline]
    #[must_use]
    pub fn with_login_poll_interval(mut self, interval: Duration) -> Self {
        self.login_poll_interval = interval;
        self
    }

    /// Sets the default login-wait timeout.
    #[inline]
    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Sets the data directory for exchange-log artifacts.
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the navigation-history cap.
    #[inline]
    #[must_use]
    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }
}

// ============================================================================
// SessionOptions - Validation
// ============================================================================

impl SessionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let (width, height) = self.fingerprint.viewport;
        if width == 0 || height == 0 {
            return Err(Error::config("viewport dimensions must be non-zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry max_attempts must be at least 1"));
        }
        if self.behavior.min_delay > self.behavior.max_delay {
            return Err(Error::config("behavior min_delay exceeds max_delay"));
        }
        if self.history_cap == 0 {
            return Err(Error::config("history_cap must be at least 1"));
        }
        if self.login_poll_interval.is_zero() {
            return Err(Error::config("login_poll_interval must be non-zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
