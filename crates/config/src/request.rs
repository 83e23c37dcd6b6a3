//! Per-invocation renewal request.

use std::io::Read;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ConfigError;

/// Upper bound for `renew_days_before_expiry`, ten years
pub const MAX_RENEW_DAYS: u32 = 3650;

/// A request to renew one certificate
///
/// ```json
/// {
///   "cn_name": "*.example.com",
///   "alt_names": [],
///   "renew_days_before_expiry": 30,
///   "auto_deploy": false,
///   "dns_zone_name": "example.com"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RenewalRequest {
    /// Common name; a `*.` prefix requests a wildcard certificate
    pub cn_name: String,

    /// Subject alternative names besides the common name
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// Renew when the current certificate expires within this many days
    #[serde(default = "default_renew_days")]
    #[validate(range(max = MAX_RENEW_DAYS))]
    pub renew_days_before_expiry: u32,

    /// Store the new version as CURRENT instead of PENDING
    #[serde(default)]
    pub auto_deploy: bool,

    /// DNS zone for DNS-01 challenges. Takes precedence over `waf_policy_id`.
    #[serde(default)]
    pub dns_zone_name: Option<String>,

    /// WAF policy serving HTTP-01 challenge responses
    #[serde(default)]
    pub waf_policy_id: Option<String>,
}

fn default_renew_days() -> u32 {
    30
}

impl RenewalRequest {
    /// Parse a request from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let request: Self = serde_json::from_str(content)?;
        request.validate()?;
        Ok(request)
    }

    /// Parse a request from a reader (file or stdin)
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let request: Self = serde_json::from_reader(reader)?;
        request.validate()?;
        Ok(request)
    }
}
