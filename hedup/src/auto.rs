//! Automatic mode, driven by certbot's manual auth hook.
//!
//! certbot passes the domain under validation and the validation token in the environment.
//! After the update has been sent we wait for the change to propagate before handing control
//! back, since certbot asks the ACME server to validate right after the hook returns.

use std::ffi::OsString;

use tracing::info;

use crate::config::Config;
use crate::pipeline::ZoneUpdater;
use crate::Error;

/// Domain under validation.
pub const DOMAIN_VAR: &str = "CERTBOT_DOMAIN";

/// Validation token to publish.
pub const VALIDATION_VAR: &str = "CERTBOT_VALIDATION";

/// Strip the wildcard label of a domain, `*.example.com` is validated via `example.com`.
pub fn strip_wildcard(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// A challenge handed to us through the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoChallenge {
    pub domain: String,
    pub validation: String,
}

impl AutoChallenge {
    /// Read the challenge from the process environment.
    pub fn from_env() -> Result<Option<Self>, Error> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Read the challenge via `lookup`.
    ///
    /// Returns `Ok(None)` if neither variable is set, so the caller can fall back to printing
    /// usage information. If only one of them is set, this fails. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, Error>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |name: &'static str| match lookup(name).map(OsString::into_string) {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value).filter(|value| !value.is_empty())),
            Some(Err(_)) => Err(Error::EnvNotUnicode(name)),
        };

        match (get(DOMAIN_VAR)?, get(VALIDATION_VAR)?) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(Error::MissingEnv(DOMAIN_VAR)),
            (Some(_), None) => Err(Error::MissingEnv(VALIDATION_VAR)),
            (Some(domain), Some(validation)) => Ok(Some(Self {
                domain: strip_wildcard(&domain).to_string(),
                validation,
            })),
        }
    }

    /// The configuration for this challenge, domain and token override every other layer.
    pub fn apply(&self, config: &Config) -> Config {
        config.for_update(&self.domain, vec![self.validation.clone()])
    }

    /// Publish the challenge and wait for the configured propagation time.
    pub fn run<U: ZoneUpdater + ?Sized>(
        &self,
        config: &Config,
        updater: &mut U,
    ) -> Result<(), Error> {
        updater.update_zone(&self.apply(config))?;

        let propagation = config.propagation();
        info!(
            "Waiting {} seconds for DNS changes to propagate",
            propagation.as_secs()
        );
        std::thread::sleep(propagation);

        info!("Published ACME challenge for {}", self.domain);
        Ok(())
    }
}
