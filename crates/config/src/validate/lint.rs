//! Configuration linting
//!
//! Checks configuration for settings that are valid but likely mistakes.

use url::Url;

use super::{ValidationResult, ValidationWarning};
use crate::{RenewerConfig, LETS_ENCRYPT_STAGING};

/// Lint configuration for likely mistakes
pub fn lint_config(config: &RenewerConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    // ACME directory
    if config.acme.directory_url == LETS_ENCRYPT_STAGING {
        result.add_warning(ValidationWarning::new(
            "ACME directory is Let's Encrypt staging; issued certificates are not publicly trusted",
        ));
    }
    if let Ok(url) = Url::parse(&config.acme.directory_url) {
        if url.scheme() != "https" {
            result.add_warning(ValidationWarning::new(format!(
                "ACME directory '{}' is not served over HTTPS",
                config.acme.directory_url
            )));
        }
    }

    // Challenge targets
    if config.dns.is_none() && config.waf.is_none() {
        result.add_warning(ValidationWarning::new(
            "Neither [dns] nor [waf] is configured; every renewal will fail challenge selection",
        ));
    }
    for (section, endpoint) in [("dns", &config.dns), ("waf", &config.waf)] {
        if let Some(endpoint) = endpoint {
            if endpoint.auth_token.is_none() {
                result.add_warning(ValidationWarning::new(format!(
                    "[{}] endpoint '{}' has no auth_token",
                    section, endpoint.endpoint
                )));
            }
        }
    }

    // Timing
    let timing = &config.timing;
    if timing.propagation_delay_secs == 0 {
        result.add_warning(ValidationWarning::new(
            "propagation_delay_secs is 0; the CA may validate before records propagate",
        ));
    }
    if timing.retry_attempts > 1 && timing.retry_delay_secs == 0 {
        result.add_warning(ValidationWarning::new(
            "retry_delay_secs is 0; retries will hit concurrent writers immediately",
        ));
    }
    if timing.max_validation_polls.is_none() {
        result.add_warning(ValidationWarning::new(
            "max_validation_polls is unset; a CA that never settles a challenge blocks the run",
        ));
    }

    result
}
