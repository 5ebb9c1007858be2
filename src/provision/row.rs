//! Typed provisioning rows
//!
//! Maps the loosely typed sheet records into [`RowConfig`]. All field
//! validation happens here, before anything is sent to the control plane.

use crate::sheet::SourceRecord;
use thiserror::Error;

/// Column names of the provisioning sheet
pub mod columns {
    pub const API_NAME: &str = "APIName";
    pub const ENDPOINT_NAME: &str = "EndpointName";
    pub const URL_SUFFIX: &str = "urlSuffix";
    pub const PROTOCOL: &str = "outboundTransportProtocol";
    pub const SYSTEM_DOMAINS: &str = "systemDomains";
    pub const PUBLIC_DOMAINS: &str = "publicDomains";
    pub const DESCRIPTION: &str = "description";
    pub const HTTP_METHODS: &str = "supportedHttpMethods";
    pub const OPERATION_PATH: &str = "operationPath";
    pub const REWRITE_TARGET: &str = "outboundRequestTargetPath";
    pub const KEY_HEADER: &str = "apiKeyValueLocationKey";
    pub const RATE_LIMIT_CEILING: &str = "rateLimitCeiling";
    pub const RATE_LIMIT_PERIOD: &str = "rateLimitPeriod";
    pub const QPS_LIMIT_CEILING: &str = "qpsLimitCeiling";
    pub const ORGANIZATION: &str = "Organization";
    pub const PACKAGE_NAME: &str = "packageName";
}

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_OPERATION_PATH: &str = "/";
pub const DEFAULT_PROTOCOL: &str = "https";
pub const DEFAULT_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const DEFAULT_PRODUCT: &str = "Default Product";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("required column '{0}' is empty")]
    MissingColumn(&'static str),

    #[error("column '{column}' must be an integer, got '{value}'")]
    NotANumber { column: &'static str, value: String },
}

/// Quota window of a rate limit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RatePeriod {
    Minute,
    Hour,
    Day,
    /// Blank period
    #[default]
    Unspecified,
    /// Anything else; kept verbatim for logging
    Unrecognized(String),
}

impl RatePeriod {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" => Self::Unspecified,
            "minute" => Self::Minute,
            "hour" => Self::Hour,
            "day" => Self::Day,
            _ => Self::Unrecognized(raw.trim().to_string()),
        }
    }

    /// Length of the window in seconds.
    ///
    /// Unspecified and unrecognized periods map to 0, which disables quota
    /// enforcement for the row rather than guessing a window.
    pub fn seconds(&self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
            Self::Unspecified | Self::Unrecognized(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RateLimit {
    pub ceiling: u64,
    pub period: RatePeriod,
}

/// One declarative row of desired gateway state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowConfig {
    /// The record this row was read from, kept for the failure artifact
    pub source: SourceRecord,
    pub api_display_name: String,
    pub endpoint_name: String,
    pub url_path_suffix: String,
    pub service_protocol: String,
    pub service_host: String,
    pub description: String,
    /// Upper-cased, deduplicated, in sheet order
    pub http_methods: Vec<String>,
    pub operation_path_template: String,
    pub outbound_rewrite_target: Option<String>,
    pub auth_key_header_name: String,
    pub rate_limit: RateLimit,
    pub qps_limit: u64,
    pub organization_tag: Option<String>,
    /// Domain labels and the organization, deduplicated in order
    pub tags: Vec<String>,
    pub product_names: Vec<String>,
}

impl RowConfig {
    pub fn from_record(record: &SourceRecord) -> Result<Self, RowError> {
        use columns::*;

        let api_display_name = record
            .get(API_NAME)
            .ok_or(RowError::MissingColumn(API_NAME))?
            .to_string();

        let mut http_methods = Vec::new();
        for method in split_list(record.get(HTTP_METHODS).unwrap_or(DEFAULT_METHOD)) {
            push_unique(&mut http_methods, method.to_uppercase());
        }
        if http_methods.is_empty() {
            http_methods.push(DEFAULT_METHOD.to_string());
        }

        let public_domains = record.get(PUBLIC_DOMAINS).unwrap_or_default();
        let system_domains = record.get(SYSTEM_DOMAINS).unwrap_or_default();
        let organization_tag = record.get(ORGANIZATION).map(str::to_string);

        let mut tags = Vec::new();
        for domain in split_list(public_domains).chain(split_list(system_domains)) {
            if let Some(label) = leading_label(domain) {
                push_unique(&mut tags, label.to_string());
            }
        }
        if let Some(org) = &organization_tag {
            push_unique(&mut tags, org.clone());
        }

        let mut product_names = Vec::new();
        for name in split_list(record.get(PACKAGE_NAME).unwrap_or_default()) {
            push_unique(&mut product_names, name.to_string());
        }
        if product_names.is_empty() {
            product_names.push(DEFAULT_PRODUCT.to_string());
        }

        Ok(Self {
            endpoint_name: record
                .get(ENDPOINT_NAME)
                .unwrap_or(&api_display_name)
                .to_string(),
            url_path_suffix: record.get(URL_SUFFIX).unwrap_or_default().to_string(),
            service_protocol: record.get(PROTOCOL).unwrap_or(DEFAULT_PROTOCOL).to_string(),
            service_host: system_domains.trim_end_matches('/').to_string(),
            description: record.get(DESCRIPTION).unwrap_or_default().to_string(),
            http_methods,
            operation_path_template: record
                .get(OPERATION_PATH)
                .unwrap_or(DEFAULT_OPERATION_PATH)
                .to_string(),
            outbound_rewrite_target: record.get(REWRITE_TARGET).map(str::to_string),
            auth_key_header_name: record.get(KEY_HEADER).unwrap_or(DEFAULT_KEY_HEADER).to_string(),
            rate_limit: RateLimit {
                ceiling: parse_count(record, RATE_LIMIT_CEILING)?,
                period: RatePeriod::parse(record.get(RATE_LIMIT_PERIOD).unwrap_or_default()),
            },
            qps_limit: parse_count(record, QPS_LIMIT_CEILING)?,
            organization_tag,
            tags,
            product_names,
            api_display_name,
            source: record.clone(),
        })
    }

    /// `protocol://host` of the backend service
    pub fn service_url(&self) -> String {
        format!("{}://{}", self.service_protocol, self.service_host)
    }

    /// API path suffix without its leading slash
    pub fn api_path(&self) -> &str {
        self.url_path_suffix.trim_start_matches('/')
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// First DNS label of a host name (`orders.example.com` -> `orders`).
/// Hosts without a dot have no label to take.
fn leading_label(domain: &str) -> Option<&str> {
    let (label, _) = domain.split_once('.')?;
    let valid = !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then_some(label)
}

/// Whole count. Blank, zero and negative values are 0, which turns the
/// matching policy clause off; spreadsheet floats like `100.0` are accepted.
fn parse_count(record: &SourceRecord, column: &'static str) -> Result<u64, RowError> {
    let Some(raw) = record.get(column) else {
        return Ok(0);
    };
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(u64::try_from(n).unwrap_or(0));
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(if f <= 0.0 { 0 } else { f as u64 }),
        _ => Err(RowError::NotANumber {
            column,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        SourceRecord::new(
            2,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_full_row_mapping() {
        let rec = record(&[
            ("APIName", "Weather API"),
            ("EndpointName", "forecast"),
            ("urlSuffix", "/weather"),
            ("outboundTransportProtocol", "http"),
            ("systemDomains", "backend.internal.example.com/"),
            ("publicDomains", "api.example.com, weather.example.com"),
            ("supportedHttpMethods", "get, post,GET"),
            ("operationPath", "/forecast/{city}"),
            ("rateLimitCeiling", "100"),
            ("rateLimitPeriod", "Hour"),
            ("qpsLimitCeiling", "5.0"),
            ("Organization", "Meteo"),
            ("packageName", "Gold, Silver"),
        ]);
        let row = RowConfig::from_record(&rec).unwrap();

        assert_eq!(row.http_methods, vec!["GET", "POST"]);
        assert_eq!(row.service_url(), "http://backend.internal.example.com");
        assert_eq!(row.api_path(), "weather");
        assert_eq!(row.rate_limit.ceiling, 100);
        assert_eq!(row.rate_limit.period, RatePeriod::Hour);
        assert_eq!(row.qps_limit, 5);
        assert_eq!(row.tags, vec!["api", "weather", "backend", "Meteo"]);
        assert_eq!(row.product_names, vec!["Gold", "Silver"]);
        assert_eq!(row.auth_key_header_name, DEFAULT_KEY_HEADER);
        assert_eq!(row.outbound_rewrite_target, None);
    }

    #[test]
    fn test_defaults() {
        let row = RowConfig::from_record(&record(&[("APIName", "Orders")])).unwrap();
        assert_eq!(row.http_methods, vec!["GET"]);
        assert_eq!(row.operation_path_template, "/");
        assert_eq!(row.endpoint_name, "Orders");
        assert_eq!(row.service_protocol, "https");
        assert_eq!(row.product_names, vec![DEFAULT_PRODUCT]);
        assert_eq!(row.rate_limit, RateLimit::default());
        assert!(row.tags.is_empty());
    }

    #[test]
    fn test_missing_api_name_rejected() {
        let err = RowConfig::from_record(&record(&[("APIName", "  ")])).unwrap_err();
        assert_eq!(err, RowError::MissingColumn("APIName"));
    }

    #[test]
    fn test_bad_number_rejected() {
        let err = RowConfig::from_record(&record(&[
            ("APIName", "Orders"),
            ("qpsLimitCeiling", "ten"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RowError::NotANumber { column: "qpsLimitCeiling", .. }));

        let err = RowConfig::from_record(&record(&[
            ("APIName", "Orders"),
            ("rateLimitCeiling", "2.5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RowError::NotANumber { column: "rateLimitCeiling", .. }));
    }

    #[test]
    fn test_non_positive_limits_disable_clauses() {
        let row = RowConfig::from_record(&record(&[
            ("APIName", "Weather API"),
            ("systemDomains", "backend.example.com"),
            ("rateLimitCeiling", "-1"),
            ("rateLimitPeriod", "hour"),
            ("qpsLimitCeiling", "5"),
        ]))
        .unwrap();
        assert_eq!(row.rate_limit.ceiling, 0);
        assert_eq!(row.qps_limit, 5);

        let row = RowConfig::from_record(&record(&[
            ("APIName", "Weather API"),
            ("rateLimitCeiling", "100"),
            ("qpsLimitCeiling", "-1"),
        ]))
        .unwrap();
        assert_eq!(row.rate_limit.ceiling, 100);
        assert_eq!(row.qps_limit, 0);

        let row = RowConfig::from_record(&record(&[
            ("APIName", "Weather API"),
            ("qpsLimitCeiling", "-3.0"),
        ]))
        .unwrap();
        assert_eq!(row.qps_limit, 0);
    }

    #[test]
    fn test_rate_period_mapping() {
        assert_eq!(RatePeriod::parse("minute").seconds(), 60);
        assert_eq!(RatePeriod::parse(" DAY ").seconds(), 86_400);
        assert_eq!(RatePeriod::parse("").seconds(), 0);
        let weekly = RatePeriod::parse("week");
        assert_eq!(weekly, RatePeriod::Unrecognized("week".to_string()));
        assert_eq!(weekly.seconds(), 0);
    }
}
