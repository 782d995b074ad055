//! Soft-block classification.
//!
//! Search engines answer automated traffic with HTTP 200 pages that carry a
//! CAPTCHA or an "unusual traffic" notice instead of results. Detection is
//! a phrase/signature scan; the lists are configuration data tied to the
//! engines' historical markup and will need periodic tuning.

use regex::Regex;

const DEFAULT_PHRASES: &[&str] = &[
    "captcha",
    "unusual traffic",
    "automated queries",
    "suspicious activity",
    "security check",
    "confirm you're not a robot",
    "detected unusual activity",
    "solve this puzzle",
    "verify you are a human",
    "enable javascript",
    "before we continue",
];

const DEFAULT_SCRIPT_SIGNATURES: &[&str] = &[
    "www.google.com/recaptcha/api.js",
    "hcaptcha.com/1/api.js",
];

/// Classifies an HTML body as a soft block (or not).
#[derive(Debug, Clone)]
pub struct BlockDetector {
    phrases: Vec<String>,
    script_signatures: Vec<String>,
    captcha_asset: Regex,
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_PHRASES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_SCRIPT_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl BlockDetector {
    pub fn new(phrases: Vec<String>, script_signatures: Vec<String>) -> Self {
        Self {
            phrases,
            script_signatures,
            // Typical CAPTCHA challenge image names.
            captcha_asset: Regex::new(r"(?i)(captcha|recaptcha)\.(jpg|png|gif)")
                .expect("captcha asset pattern is valid"),
        }
    }

    /// Returns the matched indicator when the body looks like a block
    /// page, `None` when it looks like a genuine response.
    pub fn classify(&self, html: &str) -> Option<String> {
        if html.is_empty() {
            return None;
        }

        // Specific indicators first: the phrase list includes bare
        // "captcha", which would shadow the script and asset matches.
        for sig in &self.script_signatures {
            if html.contains(sig.as_str()) {
                return Some(format!("captcha script: '{sig}'"));
            }
        }

        if self.captcha_asset.is_match(html) {
            return Some("captcha image asset".to_string());
        }

        let lower = html.to_lowercase();
        for phrase in &self.phrases {
            if lower.contains(&phrase.to_lowercase()) {
                return Some(format!("block phrase: '{phrase}'"));
            }
        }

        None
    }
}
