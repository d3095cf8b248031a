//! Structured in-page commands.
//!
//! Every script this crate sends into a page is built from a [`PageCommand`]
//! value. Caller-supplied data (selectors, input text, request samples,
//! function arguments) crosses into JavaScript only through JSON
//! serialization, so a selector containing quotes or backticks cannot break
//! out of the generated script.
//!
//! The one escape hatch is [`PageCommand::Eval`], which carries a caller's
//! self-contained script verbatim per the script-injection contract: the
//! script must return a JSON-serializable value or throw, and is not
//! inspected further.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::session::CaptchaKind;
use crate::traffic::RequestSample;

// ============================================================================
// Helpers
// ============================================================================

/// Serializes a string into a JavaScript string literal.
pub(crate) fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
}

/// Serializes a JSON value into a JavaScript expression.
pub(crate) fn js_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Expression snippet that snapshots title, URL and element count.
const SNAPSHOT_EXPR: &str = "({ title: document.title, url: window.location.href, \
     elementCount: document.querySelectorAll('*').length })";

// ============================================================================
// CaptchaSelectors
// ============================================================================

/// DOM selectors probed for each challenge kind, in priority order.
#[derive(Debug, Clone)]
pub struct CaptchaSelectors {
    /// Image captcha selectors.
    pub image: Vec<String>,
    /// Slider captcha selectors.
    pub slider: Vec<String>,
    /// SMS code selectors.
    pub sms: Vec<String>,
    /// Email code selectors.
    pub email: Vec<String>,
    /// Generic challenge selectors matched last.
    pub generic: Vec<String>,
}

impl Default for CaptchaSelectors {
    fn default() -> Self {
        Self {
            image: vec![
                ".captcha img".to_string(),
                ".verify-code img".to_string(),
                "[class*=\"captcha\"] img".to_string(),
            ],
            slider: vec![
                ".slider-captcha".to_string(),
                ".drag-verify".to_string(),
                "[class*=\"slider\"]".to_string(),
            ],
            sms: vec![
                "input[name*=\"code\"]".to_string(),
                ".sms-code".to_string(),
            ],
            email: vec![".email-code".to_string()],
            generic: vec![
                "[class*=\"captcha\"]".to_string(),
                "[class*=\"verify\"]".to_string(),
            ],
        }
    }
}

impl CaptchaSelectors {
    /// Returns `(kind, selectors)` pairs in detection priority order.
    fn ranked(&self) -> [(CaptchaKind, &[String]); 5] {
        [
            (CaptchaKind::Image, self.image.as_slice()),
            (CaptchaKind::Slider, self.slider.as_slice()),
            (CaptchaKind::Sms, self.sms.as_slice()),
            (CaptchaKind::Email, self.email.as_slice()),
            (CaptchaKind::Unknown, self.generic.as_slice()),
        ]
    }
}

// ============================================================================
// PageCommand
// ============================================================================

/// A command rendered into an in-page script.
#[derive(Debug, Clone)]
pub enum PageCommand {
    /// A caller-supplied self-contained script, passed through verbatim.
    Eval {
        /// The script body.
        script: String,
    },
    /// Probe whether a selector matches any element.
    SelectorExists {
        /// CSS selector.
        selector: String,
    },
    /// Probe login markers and report the current login status.
    LoginProbe {
        /// Selectors checked for a logged-in user, first match wins.
        username_selectors: Vec<String>,
        /// Selectors checked for the account avatar, first match wins.
        avatar_selectors: Vec<String>,
    },
    /// Probe challenge markers in priority order.
    DetectCaptcha {
        /// Per-kind selectors.
        selectors: CaptchaSelectors,
    },
    /// Snapshot title, URL and element count.
    Snapshot,
    /// Click the first element matching a selector.
    Click {
        /// CSS selector.
        selector: String,
    },
    /// Fill the first element matching a selector and fire an input event.
    Input {
        /// CSS selector.
        selector: String,
        /// Value to set.
        value: String,
    },
    /// Scroll the page vertically.
    Scroll {
        /// Pixels to scroll by.
        pixels: i64,
    },
    /// Replay a request with `fetch` from inside the page.
    Fetch {
        /// The request to resubmit.
        sample: RequestSample,
    },
    /// Invoke a named page-global function with escaped arguments.
    CallFunction {
        /// Name of the page global.
        name: String,
        /// JSON arguments spread into the call.
        args: Vec<Value>,
    },
}

// ============================================================================
// PageCommand - Properties
// ============================================================================

impl PageCommand {
    /// Returns `true` if executing this command can mutate page or server
    /// state.
    ///
    /// The executor retries failed commands; an effectful command that
    /// failed transiently *after* taking effect is duplicated on retry.
    /// Callers running effectful commands either accept that or perform
    /// their own deduplication. [`PageCommand::Eval`] is treated as
    /// effectful because its content is opaque.
    #[must_use]
    pub fn is_effectful(&self) -> bool {
        matches!(
            self,
            Self::Eval { .. }
                | Self::Click { .. }
                | Self::Input { .. }
                | Self::Scroll { .. }
                | Self::Fetch { .. }
                | Self::CallFunction { .. }
        )
    }

    /// Short command name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Eval { .. } => "eval",
            Self::SelectorExists { .. } => "selector_exists",
            Self::LoginProbe { .. } => "login_probe",
            Self::DetectCaptcha { .. } => "detect_captcha",
            Self::Snapshot => "snapshot",
            Self::Click { .. } => "click",
            Self::Input { .. } => "input",
            Self::Scroll { .. } => "scroll",
            Self::Fetch { .. } => "fetch",
            Self::CallFunction { .. } => "call_function",
        }
    }
}

// ============================================================================
// PageCommand - Rendering
// ============================================================================

impl PageCommand {
    /// Renders the command into a self-contained script.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Eval { script } => script.clone(),

            Self::SelectorExists { selector } => {
                format!("(() => !!document.querySelector({}))()", js_str(selector))
            }

            Self::LoginProbe {
                username_selectors,
                avatar_selectors,
            } => render_login_probe(username_selectors, avatar_selectors),

            Self::DetectCaptcha { selectors } => render_captcha_probe(selectors),

            Self::Snapshot => format!("(() => {SNAPSHOT_EXPR})()"),

            Self::Click { selector } => format!(
                "(() => {{\n\
                   const el = document.querySelector({sel});\n\
                   if (!el) {{ throw new Error('click target not found: ' + {sel}); }}\n\
                   el.click();\n\
                   return true;\n\
                 }})()",
                sel = js_str(selector)
            ),

            Self::Input { selector, value } => format!(
                "(() => {{\n\
                   const el = document.querySelector({sel});\n\
                   if (!el) {{ throw new Error('input target not found: ' + {sel}); }}\n\
                   el.focus();\n\
                   el.value = {val};\n\
                   el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
                   el.dispatchEvent(new Event('change', {{ bubbles: true }}));\n\
                   return true;\n\
                 }})()",
                sel = js_str(selector),
                val = js_str(value)
            ),

            Self::Scroll { pixels } => {
                format!("(() => {{ window.scrollBy(0, {pixels}); return true; }})()")
            }

            Self::Fetch { sample } => render_fetch(sample),

            Self::CallFunction { name, args } => render_call_function(name, args),
        }
    }
}

// ============================================================================
// Render Helpers
// ============================================================================

/// Renders the login-status probe.
fn render_login_probe(username_selectors: &[String], avatar_selectors: &[String]) -> String {
    let users = js_value(&Value::from(username_selectors.to_vec()));
    let avatars = js_value(&Value::from(avatar_selectors.to_vec()));
    format!(
        "(() => {{\n\
           const first = (list) => {{\n\
             for (const s of list) {{\n\
               const el = document.querySelector(s);\n\
               if (el) {{ return el; }}\n\
             }}\n\
             return null;\n\
           }};\n\
           const user = first({users});\n\
           const avatar = first({avatars});\n\
           return {{\n\
             isLoggedIn: !!user,\n\
             username: user ? (user.textContent || user.getAttribute('data-user-id') || '').trim() : null,\n\
             avatar: avatar ? avatar.src : null\n\
           }};\n\
         }})()"
    )
}

/// Renders the challenge probe; first matching kind wins.
fn render_captcha_probe(selectors: &CaptchaSelectors) -> String {
    let mut checks = String::new();
    for (kind, list) in selectors.ranked() {
        let list = js_value(&Value::from(list.to_vec()));
        let kind = js_str(kind.as_str());
        checks.push_str(&format!(
            "for (const s of {list}) {{\n\
               if (document.querySelector(s)) {{ return {{ kind: {kind}, selector: s }}; }}\n\
             }}\n"
        ));
    }
    format!("(() => {{\n{checks}return null;\n}})()")
}

/// Renders the in-page fetch replay.
///
/// Snapshots are taken inside the page immediately before and after the
/// request; diffing happens on the Rust side.
fn render_fetch(sample: &RequestSample) -> String {
    let sample_json = js_value(&serde_json::to_value(sample).unwrap_or(Value::Null));
    format!(
        "(async () => {{\n\
           const sample = {sample_json};\n\
           const before = {SNAPSHOT_EXPR};\n\
           try {{\n\
             const init = {{\n\
               method: sample.method,\n\
               headers: sample.headers,\n\
               credentials: 'include',\n\
               mode: 'cors'\n\
             }};\n\
             if (sample.body !== null && sample.body !== undefined) {{ init.body = sample.body; }}\n\
             const response = await fetch(sample.url, init);\n\
             const text = await response.text();\n\
             const headers = {{}};\n\
             response.headers.forEach((value, key) => {{ headers[key] = value; }});\n\
             const after = {SNAPSHOT_EXPR};\n\
             return {{\n\
               success: true,\n\
               response: {{ status: response.status, headers, body: text }},\n\
               before, after\n\
             }};\n\
           }} catch (error) {{\n\
             return {{ success: false, error: error instanceof Error ? error.message : String(error) }};\n\
           }}\n\
         }})()"
    )
}

/// Renders the named-function replay.
fn render_call_function(name: &str, args: &[Value]) -> String {
    let name_json = js_str(name);
    let args_json = js_value(&Value::from(args.to_vec()));
    format!(
        "(async () => {{\n\
           const fn = window[{name_json}];\n\
           if (typeof fn !== 'function') {{ return {{ success: false, missing: true }}; }}\n\
           const args = {args_json};\n\
           const before = {SNAPSHOT_EXPR};\n\
           try {{\n\
             const value = await fn(...args);\n\
             const after = {SNAPSHOT_EXPR};\n\
             return {{\n\
               success: true,\n\
               response: {{ status: 200, headers: {{}}, body: JSON.stringify(value) }},\n\
               before, after\n\
             }};\n\
           }} catch (error) {{\n\
             return {{ success: false, error: error instanceof Error ? error.message : String(error) }};\n\
           }}\n\
         }})()"
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_is_escaped() {
        let cmd = PageCommand::SelectorExists {
            selector: "a[title=\"x`${y}\"]".to_string(),
        };
        let script = cmd.render();
        // The raw quote/backtick characters only appear JSON-escaped.
        assert!(script.contains("\\\"x`${y}\\\""));
        assert!(!script.contains("querySelector(a["));
    }

    #[test]
    fn test_input_value_is_escaped() {
        let cmd = PageCommand::Input {
            selector: "#msg".to_string(),
            value: "hi\"); alert(1); (\"".to_string(),
        };
        let script = cmd.render();
        assert!(script.contains(r#"el.value = "hi\"); alert(1); (\"""#));
    }

    #[test]
    fn test_eval_passthrough() {
        let cmd = PageCommand::Eval {
            script: "document.title".to_string(),
        };
        assert_eq!(cmd.render(), "document.title");
    }

    #[test]
    fn test_fetch_embeds_sample_as_json() {
        let sample = RequestSample::new("https://example.com/api", "POST")
            .with_header("content-type", "application/json")
            .with_body("{\"k\":1}");
        let script = PageCommand::Fetch { sample }.render();
        assert!(script.contains("credentials: 'include'"));
        assert!(script.contains("mode: 'cors'"));
        assert!(script.contains("\"url\":\"https://example.com/api\""));
        assert!(script.contains("{\\\"k\\\":1}"));
    }

    #[test]
    fn test_captcha_probe_priority_order() {
        let script = PageCommand::DetectCaptcha {
            selectors: CaptchaSelectors::default(),
        }
        .render();
        let image = script.find("\"image\"").unwrap();
        let slider = script.find("\"slider\"").unwrap();
        let sms = script.find("\"sms\"").unwrap();
        let email = script.find("\"email\"").unwrap();
        let unknown = script.find("\"unknown\"").unwrap();
        assert!(image < slider && slider < sms && sms < email && email < unknown);
    }

    #[test]
    fn test_call_function_checks_callable() {
        let script = PageCommand::CallFunction {
            name: "publishPost".to_string(),
            args: vec![Value::from("hello")],
        }
        .render();
        assert!(script.contains("window[\"publishPost\"]"));
        assert!(script.contains("typeof fn !== 'function'"));
        assert!(script.contains("missing: true"));
    }

    #[test]
    fn test_effectful_classification() {
        assert!(PageCommand::Eval { script: String::new() }.is_effectful());
        assert!(
            PageCommand::Click {
                selector: "#go".to_string()
            }
            .is_effectful()
        );
        assert!(!PageCommand::Snapshot.is_effectful());
        assert!(
            !PageCommand::SelectorExists {
                selector: ".x".to_string()
            }
            .is_effectful()
        );
    }
}
