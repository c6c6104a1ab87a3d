use std::ffi::OsString;
use std::io::Write;

use anyhow::{Context, Error};
use clap::Parser;

use hedup::auto::AutoChallenge;
use hedup::command::SearchPath;
use hedup::config::{Config, ConfigFiles, ConfigLayer};
use hedup::log::{self, LevelFilter, LOG_ENV_VAR};
use hedup::pipeline::{MailUpdater, ZoneUpdater};
use hedup::zonefile::ZonefileSearchPath;

const USAGE_HINT: &str = "Must specify either --domain or --list-domains.";

const LONG_ABOUT: &str = "\
Perform HEtzner Dns UPdates via command line.

Generate a DNS zonefile update mail, append Let's Encrypt ACME challenges, sign it via GPG and \
send it to the Hetzner DNS robot.

The zonefiles are searched for at the following locations:
  * $HOME/.config/hedup/zonefiles
  * /etc/hedup/zonefiles
  * the bundled zonefile directory

Without --domain and --list-domains, hedup runs as certbot manual auth hook and reads \
CERTBOT_DOMAIN and CERTBOT_VALIDATION from the environment.";

/// Set ACME challenges for Hetzner DNS via mail.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = LONG_ABOUT)]
struct Args {
    /// Domain to update.
    #[arg(short = 'D', long, value_name = "domain", conflicts_with = "list_domains")]
    domain: Option<String>,

    /// ACME challenge to set, may be given multiple times.
    #[arg(short, long, value_name = "challenge")]
    acme_challenge: Vec<String>,

    /// Print the mail that would be sent instead of sending it.
    #[arg(short, long)]
    dry_run: bool,

    /// Sender address registered with the Hetzner robot.
    #[arg(short, long, value_name = "address")]
    from_address: Option<String>,

    /// GPG key used to sign the mail.
    #[arg(short, long, value_name = "key")]
    gpg_sign_key: Option<String>,

    /// Hetzner robot account.
    #[arg(long, value_name = "account")]
    hetzner_account: Option<String>,

    /// Path or name of the gpg executable.
    #[arg(long, value_name = "program")]
    gpg_binary: Option<String>,

    /// Path or name of the mail executable.
    #[arg(long, value_name = "program")]
    mail_binary: Option<String>,

    /// TTL of the ACME challenge records.
    #[arg(long, value_name = "seconds")]
    acme_ttl: Option<u32>,

    /// Seconds to wait for DNS propagation in automatic mode.
    #[arg(long, value_name = "seconds")]
    propagation_seconds: Option<u64>,

    /// List all domains for which a zonefile exists.
    #[arg(short, long)]
    list_domains: bool,
}

impl Args {
    /// The command line as configuration layer, containing only options actually given.
    fn config_layer(&self) -> ConfigLayer {
        ConfigLayer {
            hetzner_account: self.hetzner_account.clone(),
            gpg_sign_key: self.gpg_sign_key.clone(),
            from_address: self.from_address.clone(),
            gpg_binary: self.gpg_binary.clone(),
            mail_binary: self.mail_binary.clone(),
            domain: self.domain.clone(),
            acme_challenge: (!self.acme_challenge.is_empty()).then(|| self.acme_challenge.clone()),
            acme_ttl: self.acme_ttl,
            propagation_seconds: self.propagation_seconds,
            dry_run: self.dry_run.then_some(true),
        }
    }
}

/// Run the mode selected by `list_domains`, the configuration and the certbot environment.
///
/// An explicit domain always wins over automatic mode. Without any of them only a usage hint is
/// printed.
fn dispatch<U, F, W>(
    list_domains: bool,
    config: &Config,
    zonefiles: &ZonefileSearchPath,
    lookup: F,
    updater: &mut U,
    out: &mut W,
) -> Result<(), hedup::Error>
where
    U: ZoneUpdater,
    F: Fn(&str) -> Option<OsString>,
    W: Write,
{
    if list_domains {
        zonefiles.list_domains(out)
    } else if config.has_domain() {
        updater.update_zone(config)
    } else if let Some(challenge) = AutoChallenge::from_lookup(lookup)? {
        challenge.run(config, updater)
    } else {
        writeln!(out, "{USAGE_HINT}")?;
        Ok(())
    }
}

fn main() -> Result<(), Error> {
    log::init(log::level_from_env(LOG_ENV_VAR, LevelFilter::INFO))?;

    let args = Args::parse();

    let config = Config::resolve(&ConfigFiles::from_env(), args.config_layer())
        .context("unable to load configuration")?;

    let zonefiles = ZonefileSearchPath::from_env();
    let mut updater = MailUpdater::new(zonefiles.clone(), SearchPath::from_env());

    dispatch(
        args.list_domains,
        &config,
        &zonefiles,
        |name| std::env::var_os(name),
        &mut updater,
        &mut std::io::stdout(),
    )?;

    Ok(())
}
