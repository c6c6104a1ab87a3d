//! DNS-01 authenticator for certificate clients.
//!
//! The certificate client drives an [`Authenticator`]: `setup` once, `perform` with all
//! challenges of an order, `cleanup` after validation. The mail based implementation batches
//! consecutive challenges for the same domain into a single update, since each update replaces
//! the whole zone. Challenges for a domain should therefore be passed together: a domain which
//! reappears later in the list gets an update of its own, replacing the earlier one.

use std::time::Duration;

use tracing::info;

use crate::auto::strip_wildcard;
use crate::config::Config;
use crate::pipeline::ZoneUpdater;
use crate::Error;

/// A DNS-01 challenge to publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    /// Domain to validate, may carry a wildcard label.
    pub domain: String,
    /// Token for the `_acme-challenge` TXT record.
    pub validation: String,
}

impl Challenge {
    pub fn new(domain: &str, validation: &str) -> Self {
        Self {
            domain: domain.to_string(),
            validation: validation.to_string(),
        }
    }
}

/// Reported back for every performed challenge, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeResponse {
    pub domain: String,
    pub validation: String,
}

/// Challenge authenticator interface expected by certificate clients.
pub trait Authenticator {
    /// Check the configuration needed to publish challenges.
    fn setup(&mut self) -> Result<(), Error>;

    /// Publish all `challenges`, returning once they can be validated.
    fn perform(&mut self, challenges: &[Challenge]) -> Result<Vec<ChallengeResponse>, Error>;

    /// Remove the published challenges again.
    fn cleanup(&mut self, challenges: &[Challenge]) -> Result<(), Error>;
}

/// Group consecutive challenges by domain, keeping the order.
fn batches(challenges: &[Challenge]) -> Vec<(&str, Vec<String>)> {
    let mut batches: Vec<(&str, Vec<String>)> = Vec::new();

    for challenge in challenges {
        let domain = strip_wildcard(&challenge.domain);
        match batches.last_mut() {
            Some((current, tokens)) if *current == domain => {
                tokens.push(challenge.validation.clone());
            }
            _ => batches.push((domain, vec![challenge.validation.clone()])),
        }
    }

    batches
}

pub const DESCRIPTION: &str = "Perform dns-01 challenge via Hetzner mail updater.";

const MORE_INFO: &str = "Updates Hetzner DNS via email. Zonefiles and gpg keys need to be setup \
    in advance. See https://github.com/obreitwi/hedup for details.";

/// Publishes challenges via signed zonefile updates.
pub struct MailAuthenticator<U> {
    config: Config,
    updater: U,
    propagation: Duration,
    ready: bool,
}

impl<U: ZoneUpdater> MailAuthenticator<U> {
    /// Create an authenticator for `config`, waiting `config.propagation()` after publishing.
    pub fn new(config: Config, updater: U) -> Self {
        Self {
            propagation: config.propagation(),
            config,
            updater,
            ready: false,
        }
    }

    /// Builder-style method to change the propagation delay.
    pub fn with_propagation(mut self, propagation: Duration) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn description(&self) -> &'static str {
        DESCRIPTION
    }

    pub fn more_info(&self) -> &'static str {
        MORE_INFO
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }

    pub fn into_updater(self) -> U {
        self.updater
    }
}

impl<U: ZoneUpdater> Authenticator for MailAuthenticator<U> {
    fn setup(&mut self) -> Result<(), Error> {
        self.config.hetzner_account()?;
        self.config.gpg_sign_key()?;
        self.config.from_address()?;
        self.ready = true;
        Ok(())
    }

    fn perform(&mut self, challenges: &[Challenge]) -> Result<Vec<ChallengeResponse>, Error> {
        if !self.ready {
            self.setup()?;
        }

        let batches = batches(challenges);
        for (domain, tokens) in &batches {
            let update = self.config.for_update(domain, tokens.clone());
            self.updater.update_zone(&update)?;
        }

        if !batches.is_empty() {
            info!(
                "Waiting {} seconds for DNS changes to propagate",
                self.propagation.as_secs()
            );
            std::thread::sleep(self.propagation);
        }

        Ok(challenges
            .iter()
            .map(|challenge| ChallengeResponse {
                domain: challenge.domain.clone(),
                validation: challenge.validation.clone(),
            })
            .collect())
    }

    fn cleanup(&mut self, challenges: &[Challenge]) -> Result<(), Error> {
        for (domain, _) in batches(challenges) {
            // republish the plain zonefile
            let update = self.config.for_update(domain, Vec::new());
            self.updater.update_zone(&update)?;
        }
        Ok(())
    }
}
