//! Rule-based email filtering.
//!
//! [`DomainFilter`] applies whitelist/blacklist domain rules and content
//! pattern scoring; [`EmailFilter`] orchestrates it with a size check and
//! fail-open error handling to produce [`FilteredEmail`] records.
//!
//! Rule precedence, first match wins:
//! 1. cached verdict for the same `(sender, subject, body)` triple
//! 2. whitelist (custom lists only; always overrides blacklist)
//! 3. blacklist (default list ∪ configured ∪ per-call)
//! 4. automated patterns, then marketing, then notification (strict mode)

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use crate::cache::ClassificationCache;
use crate::config::FilterConfig;
use crate::models::{
    FilterKind, FilterRule, FilterVerdict, FilteredEmail, FilteringStats, RawEmail,
};
use crate::patterns::{PatternLibrary, DEFAULT_BLACKLIST_DOMAINS};

/// Extract the lower-cased domain from a sender address.
///
/// Handles `Name <user@host>` forms by taking the substring after the last
/// `@` and trimming angle brackets and whitespace.
fn extract_domain(sender: &str) -> Option<String> {
    let after_at = sender.rsplit_once('@')?.1;
    let domain = after_at
        .trim()
        .trim_end_matches('>')
        .trim()
        .to_lowercase();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Exact or `*.suffix` wildcard match against a domain.
///
/// `*.example.com` matches `example.com` itself and any subdomain.
fn domain_matches(domain: &str, pattern: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        domain == suffix || domain.ends_with(&format!(".{suffix}"))
    } else {
        domain == pattern
    }
}

/// Domain and content-pattern classifier.
///
/// Stateless apart from the injected verdict cache; configuration is an
/// immutable value so tests can substitute fresh, isolated instances.
pub struct DomainFilter {
    config: FilterConfig,
    patterns: PatternLibrary,
    cache: Arc<ClassificationCache>,
}

impl DomainFilter {
    pub fn new(config: FilterConfig, cache: Arc<ClassificationCache>) -> Self {
        Self {
            config,
            patterns: PatternLibrary::new(),
            cache,
        }
    }

    /// Classify one email. Every computed verdict, including "keep", is
    /// written back to the cache before returning, so a second call with
    /// identical arguments returns an identical verdict.
    pub fn filter_email(
        &self,
        sender: &str,
        subject: &str,
        body: &str,
        custom_blacklist: &[String],
        custom_whitelist: &[String],
    ) -> FilterVerdict {
        if let Some(cached) = self.cache.get(sender, subject, body) {
            return cached;
        }

        let verdict = self.classify(sender, subject, body, custom_blacklist, custom_whitelist);
        self.cache
            .set(sender, subject, body, verdict.clone());
        verdict
    }

    fn classify(
        &self,
        sender: &str,
        subject: &str,
        body: &str,
        custom_blacklist: &[String],
        custom_whitelist: &[String],
    ) -> FilterVerdict {
        let Some(domain) = extract_domain(sender) else {
            return FilterVerdict::keep();
        };

        // Whitelist strictly dominates: custom lists only, no default set.
        let whitelisted = self
            .config
            .custom_whitelist
            .iter()
            .chain(custom_whitelist)
            .any(|p| domain_matches(&domain, p));
        if whitelisted {
            return FilterVerdict {
                is_filtered: false,
                reason: Some(format!("Whitelisted domain: {domain}")),
                confidence: 1.0,
            };
        }

        let blacklisted = DEFAULT_BLACKLIST_DOMAINS
            .iter()
            .map(|p| p.to_string())
            .chain(self.config.custom_blacklist.iter().cloned())
            .chain(custom_blacklist.iter().cloned())
            .any(|p| domain_matches(&domain, &p));
        if blacklisted {
            return FilterVerdict::filtered(format!("Blacklisted domain: {domain}"), 0.9);
        }

        let combined = format!("{sender} {subject} {body}").to_lowercase();

        if self.patterns.is_automated(&combined) {
            return FilterVerdict::filtered("Automated/system email detected", 0.8);
        }

        let marketing = self.patterns.marketing_matches(&combined);
        if marketing >= self.config.marketing_threshold {
            let confidence = (0.7 + 0.1 * marketing as f32).min(0.95);
            return FilterVerdict::filtered("Marketing email detected", confidence);
        }

        if self.config.strict_mode {
            let notifications = self.patterns.notification_matches(&combined);
            if notifications >= self.config.notification_threshold {
                return FilterVerdict::filtered("Notification email detected", 0.6);
            }
        }

        FilterVerdict::keep()
    }

    /// Filter emails whose combined text+HTML body exceeds the configured
    /// size cap. This is independent of the per-attachment size ceilings.
    pub fn check_email_size(&self, body_text: &str, body_html: &str) -> FilterVerdict {
        let total = body_text.len() + body_html.len();
        if total > self.config.max_email_size_bytes {
            FilterVerdict::filtered(
                format!(
                    "Email size exceeds limit ({} bytes > {} bytes)",
                    total, self.config.max_email_size_bytes
                ),
                1.0,
            )
        } else {
            FilterVerdict::keep()
        }
    }
}

/// Top-level per-email filter: domain/content rules plus the size check,
/// with fail-open semantics on internal errors.
pub struct EmailFilter {
    domain_filter: DomainFilter,
}

impl EmailFilter {
    pub fn new(config: FilterConfig, cache: Arc<ClassificationCache>) -> Self {
        Self {
            domain_filter: DomainFilter::new(config, cache),
        }
    }

    /// Produce the final verdict for one email.
    ///
    /// The domain/content verdict takes priority over the size verdict when
    /// both fire. Any internal error fails open: the email is kept and the
    /// reason records the degradation, favoring recall over availability
    /// risk.
    pub fn filter_email(&self, email: &RawEmail, rules: &[FilterRule]) -> FilteredEmail {
        let verdict = match self.apply_rules(email, rules) {
            Ok(v) => v,
            Err(e) => {
                warn!(email_id = %email.external_id, error = %e, "filter failed; keeping email");
                FilterVerdict {
                    is_filtered: false,
                    reason: Some("Filter error - not filtered".to_string()),
                    confidence: 0.0,
                }
            }
        };

        FilteredEmail {
            email: email.clone(),
            is_filtered: verdict.is_filtered,
            filter_reason: verdict.reason,
            processed_at: Utc::now(),
        }
    }

    fn apply_rules(&self, email: &RawEmail, rules: &[FilterRule]) -> Result<FilterVerdict> {
        let mut blacklist = Vec::new();
        let mut whitelist = Vec::new();
        for rule in rules {
            match rule.filter_type {
                FilterKind::Blacklist => blacklist.push(rule.domain_pattern.clone()),
                FilterKind::Whitelist => whitelist.push(rule.domain_pattern.clone()),
            }
        }

        let content_verdict = self.domain_filter.filter_email(
            &email.sender,
            &email.subject,
            &email.body_text,
            &blacklist,
            &whitelist,
        );
        if content_verdict.is_filtered {
            return Ok(content_verdict);
        }

        let size_verdict = self
            .domain_filter
            .check_email_size(&email.body_text, &email.body_html);
        if size_verdict.is_filtered {
            return Ok(size_verdict);
        }

        Ok(content_verdict)
    }

    /// Filter a list of emails sequentially, preserving input order.
    pub fn filter_emails(&self, emails: &[RawEmail], rules: &[FilterRule]) -> Vec<FilteredEmail> {
        emails
            .iter()
            .map(|email| self.filter_email(email, rules))
            .collect()
    }

    /// Aggregate statistics over a set of filter results.
    pub fn filtering_stats(results: &[FilteredEmail]) -> FilteringStats {
        let total = results.len();
        let filtered = results.iter().filter(|r| r.is_filtered).count();
        let mut filter_reasons: HashMap<String, usize> = HashMap::new();
        for result in results.iter().filter(|r| r.is_filtered) {
            if let Some(reason) = &result.filter_reason {
                *filter_reasons.entry(reason.clone()).or_insert(0) += 1;
            }
        }
        FilteringStats {
            total,
            filtered,
            kept: total - filtered,
            filter_reasons,
            filter_rate: if total == 0 {
                0.0
            } else {
                filtered as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn email(sender: &str, subject: &str, body: &str) -> RawEmail {
        RawEmail {
            external_id: "ext-1".into(),
            thread_id: "thr-1".into(),
            subject: subject.into(),
            sender: sender.into(),
            recipient: "me@inbox.test".into(),
            body_text: body.into(),
            body_html: String::new(),
            sent_at: Utc::now(),
            has_attachments: false,
        }
    }

    fn domain_filter(config: FilterConfig) -> DomainFilter {
        DomainFilter::new(config, Arc::new(ClassificationCache::new(64)))
    }

    #[test]
    fn extracts_domain_from_display_name_form() {
        assert_eq!(
            extract_domain("Alice <alice@Example.COM>"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_domain("not an address"), None);
        assert_eq!(extract_domain("broken@"), None);
    }

    #[test]
    fn wildcard_matches_domain_and_subdomains() {
        assert!(domain_matches("spam.io", "*.spam.io"));
        assert!(domain_matches("mail.spam.io", "*.spam.io"));
        assert!(!domain_matches("notspam.io", "*.spam.io"));
        assert!(domain_matches("exact.com", "exact.com"));
    }

    #[test]
    fn whitelist_dominates_blacklist_and_content() {
        let filter = domain_filter(FilterConfig::default());
        let verdict = filter.filter_email(
            "promo@deals.shop",
            "unsubscribe now, huge discount, click here",
            "limited time offer",
            &["deals.shop".to_string()],
            &["*.deals.shop".to_string()],
        );
        assert!(!verdict.is_filtered);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Whitelisted domain: deals.shop")
        );
    }

    #[test]
    fn blacklisted_domain_filtered_with_fixed_confidence() {
        let filter = domain_filter(FilterConfig::default());
        let verdict = filter.filter_email(
            "news@mail.mailchimp.com",
            "hello",
            "plain body",
            &[],
            &[],
        );
        assert!(verdict.is_filtered);
        assert_eq!(verdict.confidence, 0.9);
        assert!(verdict.reason.unwrap().starts_with("Blacklisted domain:"));
    }

    #[test]
    fn per_call_blacklist_is_honored() {
        let filter = domain_filter(FilterConfig::default());
        let verdict = filter.filter_email(
            "a@corp.example",
            "status",
            "body",
            &["corp.example".to_string()],
            &[],
        );
        assert!(verdict.is_filtered);
    }

    #[test]
    fn automated_pattern_beats_marketing_score() {
        let filter = domain_filter(FilterConfig::default());
        let verdict = filter.filter_email(
            "noreply@app.example",
            "your receipt: unsubscribe, discount",
            "this is an automated message",
            &[],
            &[],
        );
        assert!(verdict.is_filtered);
        assert_eq!(verdict.confidence, 0.8);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Automated/system email detected")
        );
    }

    #[test]
    fn marketing_confidence_scales_with_matches_capped() {
        let filter = domain_filter(FilterConfig::default());
        let verdict = filter.filter_email(
            "offers@shop.example",
            "special offer: 50% off, limited time",
            "click here to unsubscribe from the newsletter, free shipping, act now",
            &[],
            &[],
        );
        assert!(verdict.is_filtered);
        assert_eq!(verdict.reason.as_deref(), Some("Marketing email detected"));
        assert!(verdict.confidence <= 0.95);
        assert!(verdict.confidence >= 0.9);
    }

    #[test]
    fn notification_rule_only_in_strict_mode() {
        let body = "Alert: your account has been updated. New login notification reminder.";
        let lax = domain_filter(FilterConfig::default());
        assert!(!lax
            .filter_email("ops@corp.example", "alert", body, &[], &[])
            .is_filtered);

        let strict = domain_filter(FilterConfig {
            strict_mode: true,
            ..FilterConfig::default()
        });
        let verdict = strict.filter_email("ops@corp.example", "alert", body, &[], &[]);
        assert!(verdict.is_filtered);
        assert_eq!(verdict.confidence, 0.6);
        assert_eq!(
            verdict.reason.as_deref(),
            Some("Notification email detected")
        );
    }

    #[test]
    fn sender_without_domain_is_kept() {
        let filter = domain_filter(FilterConfig::default());
        let verdict = filter.filter_email("local-part-only", "hi", "body", &[], &[]);
        assert!(!verdict.is_filtered);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn verdicts_are_cache_consistent() {
        let filter = domain_filter(FilterConfig::default());
        let first = filter.filter_email("a@b.com", "subject", "body", &[], &[]);
        let second = filter.filter_email("a@b.com", "subject", "body", &[], &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn size_check_reports_exceeds_limit() {
        let filter = domain_filter(FilterConfig {
            max_email_size_bytes: 16,
            ..FilterConfig::default()
        });
        let verdict = filter.check_email_size("0123456789", "0123456789");
        assert!(verdict.is_filtered);
        assert_eq!(verdict.confidence, 1.0);
        assert!(verdict.reason.unwrap().contains("exceeds limit"));
    }

    #[test]
    fn email_filter_prefers_content_verdict_over_size() {
        let cache = Arc::new(ClassificationCache::new(64));
        let filter = EmailFilter::new(
            FilterConfig {
                max_email_size_bytes: 4,
                ..FilterConfig::default()
            },
            cache,
        );
        let msg = email("news@mail.mailchimp.com", "hello", "a body past the cap");
        let result = filter.filter_email(&msg, &[]);
        assert!(result.is_filtered);
        assert!(result
            .filter_reason
            .unwrap()
            .starts_with("Blacklisted domain:"));
    }

    #[test]
    fn oversized_email_filtered_by_size() {
        let cache = Arc::new(ClassificationCache::new(64));
        let filter = EmailFilter::new(
            FilterConfig {
                max_email_size_bytes: 8,
                ..FilterConfig::default()
            },
            cache,
        );
        let msg = email("friend@home.example", "hi", "a body well past the size cap");
        let result = filter.filter_email(&msg, &[]);
        assert!(result.is_filtered);
        assert!(result.filter_reason.unwrap().contains("exceeds limit"));
    }

    #[test]
    fn filter_emails_preserves_order_and_stats_add_up() {
        let cache = Arc::new(ClassificationCache::new(64));
        let filter = EmailFilter::new(FilterConfig::default(), cache);
        let emails = vec![
            email("friend@home.example", "lunch", "see you at noon"),
            email("news@mail.mailchimp.com", "deals", "buy things"),
            email("colleague@work.example", "report", "attached as discussed"),
        ];
        let results = filter.filter_emails(&emails, &[]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].email.sender, "friend@home.example");
        assert!(results[1].is_filtered);

        let stats = EmailFilter::filtering_stats(&results);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.kept, 2);
        assert!((stats.filter_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.filter_reasons.len(), 1);
    }
}
