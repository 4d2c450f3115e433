//! Comparison of a token's bound context against a presented one.

use crate::claims::Context;
use crate::config::{LocationPolicy, TokenSettings};
use crate::error::Rejection;

const REGION_SEPARATORS: [char; 4] = ['_', '-', '/', ':'];

/// Which context attributes are enforced and how.
///
/// An attribute left empty at issuance is unbound and never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPolicy {
    pub check_device: bool,
    pub check_location: bool,
    pub location: LocationPolicy,
}

impl ContextPolicy {
    pub fn from_settings(settings: &TokenSettings) -> Self {
        Self {
            check_device: settings.enable_device_fingerprint,
            check_location: settings.enable_geo,
            location: settings.location_policy,
        }
    }

    pub fn check(&self, bound: &Context, presented: &Context) -> Result<(), Rejection> {
        if !bound.client_type.is_empty() && bound.client_type != presented.client_type {
            return Err(Rejection::context("client_type_mismatch"));
        }

        if self.check_device
            && !bound.device_fingerprint.is_empty()
            && bound.device_fingerprint != presented.device_fingerprint
        {
            return Err(Rejection::context("device_mismatch"));
        }

        if self.check_location
            && !bound.location.is_empty()
            && !self.location_matches(&bound.location, &presented.location)
        {
            return Err(Rejection::context("location_mismatch"));
        }

        Ok(())
    }

    fn location_matches(&self, bound: &str, presented: &str) -> bool {
        match self.location {
            LocationPolicy::Exact => bound == presented,
            LocationPolicy::Drift => {
                !presented.is_empty() && region(bound).eq_ignore_ascii_case(region(presented))
            }
        }
    }
}

/// Leading region of a location tag, e.g. `US` for `US_West`.
fn region(location: &str) -> &str {
    location
        .split(&REGION_SEPARATORS[..])
        .next()
        .unwrap_or(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;

    fn policy(location: LocationPolicy) -> ContextPolicy {
        ContextPolicy {
            check_device: true,
            check_location: true,
            location,
        }
    }

    #[test]
    fn test_identical_context_passes() {
        let ctx = Context::new("dev-1", "US_West", "web");
        assert!(policy(LocationPolicy::Exact).check(&ctx, &ctx).is_ok());
    }

    #[test]
    fn test_device_and_client_are_exact() {
        let bound = Context::new("dev-1", "US_West", "web");

        let err = policy(LocationPolicy::Drift)
            .check(&bound, &Context::new("dev-2", "US_West", "web"))
            .unwrap_err();
        assert_eq!(err.error, TokenError::ContextMismatch);
        assert_eq!(err.reason, "device_mismatch");

        let err = policy(LocationPolicy::Drift)
            .check(&bound, &Context::new("dev-1", "US_West", "mobile"))
            .unwrap_err();
        assert_eq!(err.reason, "client_type_mismatch");
    }

    #[test]
    fn test_location_drift() {
        let bound = Context::new("dev-1", "US_West", "web");
        let moved = Context::new("dev-1", "us-east", "web");
        let abroad = Context::new("dev-1", "EU_West", "web");

        assert!(policy(LocationPolicy::Exact).check(&bound, &moved).is_err());
        assert!(policy(LocationPolicy::Drift).check(&bound, &moved).is_ok());
        assert!(policy(LocationPolicy::Drift).check(&bound, &abroad).is_err());
    }

    #[test]
    fn test_disabled_checks_are_skipped() {
        let bound = Context::new("dev-1", "US_West", "web");
        let other = Context::new("dev-9", "JP", "web");
        let lenient = ContextPolicy {
            check_device: false,
            check_location: false,
            location: LocationPolicy::Exact,
        };
        assert!(lenient.check(&bound, &other).is_ok());
    }

    #[test]
    fn test_unbound_attributes_are_skipped() {
        let bound = Context::new("", "", "web");
        let presented = Context::new("dev-1", "US", "web");
        assert!(policy(LocationPolicy::Exact).check(&bound, &presented).is_ok());
    }

    #[test]
    fn test_region() {
        assert_eq!(region("US_West"), "US");
        assert_eq!(region("eu/paris"), "eu");
        assert_eq!(region("JP"), "JP");
    }
}
