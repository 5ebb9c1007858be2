//! Operation policy synthesis
//!
//! Turns the rate/quota columns of a row into an operation-scoped policy
//! document. Documents are always generated whole and replace whatever
//! policy the operation had before.

use super::identity::Identity;
use super::row::RowConfig;
use quick_xml::escape::escape;
use std::fmt::Write as _;

/// Counter key: the caller's subscription when there is one, else its address
pub const COUNTER_KEY: &str = "@(context.Subscription?.Id ?? context.Request.IpAddress)";

/// The platform rejects quota windows shorter than five minutes
pub const MIN_QUOTA_PERIOD_SECS: u64 = 300;

/// Window of the per-second rate limit
pub const RATE_LIMIT_WINDOW_SECS: u64 = 1;

/// Variable holding the rewrite base in wildcard mode
const REWRITE_BASE_VAR: &str = "rewriteBase";

/// How the backend URL is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewriteStyle {
    /// Rewrite every call to the row's target path (`/` when absent)
    #[default]
    Fixed,
    /// Prefix the target path to the `{*path}` wildcard the operation matched
    WildcardSuffix,
}

/// One clause of the inbound section, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundClause {
    /// `<base />`: run the enclosing scope's policy first
    Base,
    SetVariable { name: String, value: String },
    RewriteUri { template: String },
    QuotaByKey { calls: u64, renewal_period: u64 },
    RateLimitByKey { calls: u64, renewal_period: u64 },
}

/// Policy for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    pub api_id: String,
    pub operation_id: String,
    pub inbound: Vec<InboundClause>,
}

impl PolicyDocument {
    pub fn quota(&self) -> Option<(u64, u64)> {
        self.inbound.iter().find_map(|c| match c {
            InboundClause::QuotaByKey {
                calls,
                renewal_period,
            } => Some((*calls, *renewal_period)),
            _ => None,
        })
    }

    pub fn rate_limit(&self) -> Option<(u64, u64)> {
        self.inbound.iter().find_map(|c| match c {
            InboundClause::RateLimitByKey {
                calls,
                renewal_period,
            } => Some((*calls, *renewal_period)),
            _ => None,
        })
    }

    pub fn rewrite_template(&self) -> Option<&str> {
        self.inbound.iter().find_map(|c| match c {
            InboundClause::RewriteUri { template } => Some(template.as_str()),
            _ => None,
        })
    }

    /// Render as the `rawxml` policy format
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<policies>\n  <inbound>\n");
        for clause in &self.inbound {
            xml.push_str("    ");
            // Writing to a String cannot fail
            let _ = match clause {
                InboundClause::Base => write!(xml, "<base />"),
                InboundClause::SetVariable { name, value } => write!(
                    xml,
                    r#"<set-variable name="{}" value="{}" />"#,
                    escape(name.as_str()),
                    escape(value.as_str())
                ),
                InboundClause::RewriteUri { template } => {
                    write!(xml, r#"<rewrite-uri template="{}" />"#, escape(template.as_str()))
                }
                InboundClause::QuotaByKey {
                    calls,
                    renewal_period,
                } => write!(
                    xml,
                    r#"<quota-by-key calls="{calls}" renewal-period="{renewal_period}" counter-key="{}" />"#,
                    escape(COUNTER_KEY)
                ),
                InboundClause::RateLimitByKey {
                    calls,
                    renewal_period,
                } => write!(
                    xml,
                    r#"<rate-limit-by-key calls="{calls}" renewal-period="{renewal_period}" counter-key="{}" />"#,
                    escape(COUNTER_KEY)
                ),
            };
            xml.push('\n');
        }
        xml.push_str(
            "  </inbound>\n  <backend>\n    <base />\n  </backend>\n  <outbound>\n    <base />\n  </outbound>\n</policies>",
        );
        xml
    }
}

/// Build the policy for one operation of a row
///
/// Clause order is fixed: base, rewrite, then quota and rate limit.
/// - Quota is emitted only when the ceiling is positive and the period is at
///   least [`MIN_QUOTA_PERIOD_SECS`]. An unrecognized period maps to zero
///   seconds, so it silently disables the quota instead of failing the row.
/// - Rate limit is emitted when the QPS ceiling is positive, always with a
///   one second window.
pub fn build_policy(
    api_id: &Identity,
    operation_id: &Identity,
    config: &RowConfig,
    style: RewriteStyle,
) -> PolicyDocument {
    let mut inbound = vec![InboundClause::Base];

    match style {
        RewriteStyle::Fixed => inbound.push(InboundClause::RewriteUri {
            template: config
                .outbound_rewrite_target
                .clone()
                .unwrap_or_else(|| "/".to_string()),
        }),
        RewriteStyle::WildcardSuffix => {
            let base = config
                .outbound_rewrite_target
                .as_deref()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string();
            inbound.push(InboundClause::SetVariable {
                name: REWRITE_BASE_VAR.to_string(),
                value: base,
            });
            inbound.push(InboundClause::RewriteUri {
                template: format!(
                    r#"@((string)context.Variables["{REWRITE_BASE_VAR}"] + context.Request.MatchedParameters["path"])"#
                ),
            });
        }
    }

    let period_secs = config.rate_limit.period.seconds();
    if config.rate_limit.ceiling > 0 && period_secs >= MIN_QUOTA_PERIOD_SECS {
        inbound.push(InboundClause::QuotaByKey {
            calls: config.rate_limit.ceiling,
            renewal_period: period_secs,
        });
    }

    if config.qps_limit > 0 {
        inbound.push(InboundClause::RateLimitByKey {
            calls: config.qps_limit,
            renewal_period: RATE_LIMIT_WINDOW_SECS,
        });
    }

    PolicyDocument {
        api_id: api_id.to_string(),
        operation_id: operation_id.to_string(),
        inbound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::row::{RateLimit, RatePeriod};
    use crate::sheet::SourceRecord;

    fn config(ceiling: u64, period: &str, qps: u64, target: Option<&str>) -> RowConfig {
        let mut fields = vec![("APIName".to_string(), "Weather API".to_string())];
        if let Some(target) = target {
            fields.push(("outboundRequestTargetPath".to_string(), target.to_string()));
        }
        let mut row = RowConfig::from_record(&SourceRecord::new(2, fields)).unwrap();
        row.rate_limit = RateLimit {
            ceiling,
            period: RatePeriod::parse(period),
        };
        row.qps_limit = qps;
        row
    }

    fn ids() -> (Identity, Identity) {
        (
            Identity::derive("Weather API").unwrap(),
            Identity::derive("GET-forecast").unwrap(),
        )
    }

    #[test]
    fn test_quota_and_rate_limit() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(100, "hour", 5, None), RewriteStyle::Fixed);

        assert_eq!(doc.quota(), Some((100, 3600)));
        assert_eq!(doc.rate_limit(), Some((5, 1)));
        assert_eq!(doc.rewrite_template(), Some("/"));
        assert_eq!(doc.inbound[0], InboundClause::Base);
        assert!(matches!(doc.inbound[1], InboundClause::RewriteUri { .. }));
    }

    #[test]
    fn test_short_period_skips_quota() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(100, "minute", 0, None), RewriteStyle::Fixed);
        assert_eq!(doc.quota(), None);
        assert_eq!(doc.rate_limit(), None);
        assert_eq!(doc.inbound.len(), 2);
    }

    #[test]
    fn test_unknown_period_skips_quota() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(100, "fortnight", 0, None), RewriteStyle::Fixed);
        assert_eq!(doc.quota(), None);
    }

    #[test]
    fn test_zero_ceiling_skips_quota() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(0, "day", 0, None), RewriteStyle::Fixed);
        assert_eq!(doc.quota(), None);
    }

    #[test]
    fn test_rewrite_target_used() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(0, "", 0, Some("/v2/forecast")), RewriteStyle::Fixed);
        assert_eq!(doc.rewrite_template(), Some("/v2/forecast"));
    }

    #[test]
    fn test_wildcard_style() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(0, "", 0, Some("/v2/")), RewriteStyle::WildcardSuffix);
        assert_eq!(
            doc.inbound[1],
            InboundClause::SetVariable {
                name: "rewriteBase".to_string(),
                value: "/v2".to_string()
            }
        );
        assert!(doc.rewrite_template().unwrap().contains("MatchedParameters"));
    }

    #[test]
    fn test_xml_rendering() {
        let (api, op) = ids();
        let doc = build_policy(&api, &op, &config(1000, "day", 10, Some("/a&b")), RewriteStyle::Fixed);
        let xml = doc.to_xml();

        assert!(xml.starts_with("<policies>\n  <inbound>\n    <base />\n"));
        assert!(xml.contains(r#"<rewrite-uri template="/a&amp;b" />"#));
        assert!(xml.contains(r#"<quota-by-key calls="1000" renewal-period="86400""#));
        assert!(xml.contains(r#"<rate-limit-by-key calls="10" renewal-period="1""#));
        assert!(xml.contains("context.Subscription?.Id ?? context.Request.IpAddress"));
        assert!(xml.ends_with("</outbound>\n</policies>"));

        let quota_at = xml.find("quota-by-key").unwrap();
        let rate_at = xml.find("rate-limit-by-key").unwrap();
        assert!(quota_at < rate_at);
    }
}
