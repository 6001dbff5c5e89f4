//! Static pattern library: blacklisted sender domains and regex classifiers
//! for automated, marketing, and notification email content.
//!
//! Patterns are compiled once per [`PatternLibrary`]; construct one and share
//! it across filter calls. All content patterns are case-insensitive and run
//! against the concatenated `sender + subject + body` text.

use regex::RegexSet;

/// Bulk-sender and tracking domains filtered by default.
///
/// Entries are matched exactly or as `*.suffix` wildcards against the
/// sender's domain. Custom blacklists from configuration and per-call lists
/// are unioned with this set.
pub const DEFAULT_BLACKLIST_DOMAINS: &[&str] = &[
    "*.mailchimp.com",
    "*.sendgrid.net",
    "*.amazonses.com",
    "*.mailgun.org",
    "*.constantcontact.com",
    "*.mktomail.com",
    "*.hubspotemail.net",
    "*.exacttarget.com",
    "*.cmail19.com",
    "*.cmail20.com",
    "*.rsgsv.net",
    "*.mcsv.net",
];

const AUTOMATED_PATTERNS: &[&str] = &[
    r"(?i)\bno-?reply\b",
    r"(?i)\bdo-?not-?reply\b",
    r"(?i)\bmailer-daemon\b",
    r"(?i)\bpostmaster@",
    r"(?i)this is an automated (message|email|notification)",
    r"(?i)automatically generated",
    r"(?i)\bauto-?generated\b",
    r"(?i)please do not reply to this",
];

const MARKETING_PATTERNS: &[&str] = &[
    r"(?i)\bunsubscribe\b",
    r"(?i)\bspecial offer\b",
    r"(?i)\blimited time\b",
    r"(?i)\bclick here\b",
    r"(?i)\bdiscount\b",
    r"(?i)\b\d+%\s*off\b",
    r"(?i)\bfree shipping\b",
    r"(?i)\bnewsletter\b",
    r"(?i)\bexclusive (deal|offer)\b",
    r"(?i)\bact now\b",
    r"(?i)\bsale ends\b",
    r"(?i)\bpromo(tion|tional)?\b",
    r"(?i)view (this email )?in (your )?browser",
];

const NOTIFICATION_PATTERNS: &[&str] = &[
    r"(?i)\bnotification\b",
    r"(?i)\balert\b",
    r"(?i)\breminder\b",
    r"(?i)your (account|order|subscription|password)",
    r"(?i)has been (updated|changed|shipped|processed)",
    r"(?i)\bweekly (digest|summary)\b",
    r"(?i)\bactivity (summary|report)\b",
    r"(?i)\bnew (login|sign-?in)\b",
];

/// Compiled classifier patterns shared across filter calls.
pub struct PatternLibrary {
    automated: RegexSet,
    marketing: RegexSet,
    notification: RegexSet,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self {
            automated: RegexSet::new(AUTOMATED_PATTERNS).expect("valid automated patterns"),
            marketing: RegexSet::new(MARKETING_PATTERNS).expect("valid marketing patterns"),
            notification: RegexSet::new(NOTIFICATION_PATTERNS)
                .expect("valid notification patterns"),
        }
    }

    /// True if any automated/system pattern matches.
    pub fn is_automated(&self, text: &str) -> bool {
        self.automated.is_match(text)
    }

    /// Number of distinct marketing patterns that match.
    pub fn marketing_matches(&self, text: &str) -> usize {
        self.marketing.matches(text).iter().count()
    }

    /// Number of distinct notification patterns that match.
    pub fn notification_matches(&self, text: &str) -> usize {
        self.notification.matches(text).iter().count()
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}
