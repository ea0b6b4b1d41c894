use std::{net::IpAddr, num::NonZeroU32, sync::Arc};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

/// Per-client cap on account registrations. Every attempt counts, including
/// ones later rejected by validation.
#[derive(Clone)]
pub struct RegistrationLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl RegistrationLimiter {
    pub fn per_hour(attempts: NonZeroU32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_hour(attempts))),
        }
    }

    /// Records an attempt from `ip` and returns false once the quota is spent.
    pub fn check(&self, ip: IpAddr) -> bool {
        let allowed = self.limiter.check_key(&ip).is_ok();
        if !allowed {
            tracing::warn!(%ip, "Registration rate limit exceeded");
        }
        allowed
    }
}

impl std::fmt::Debug for RegistrationLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationLimiter").finish_non_exhaustive()
    }
}
