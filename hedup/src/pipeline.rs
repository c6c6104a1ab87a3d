//! Signing and delivery of updates.
//!
//! The assembled update is clear-signed with `gpg` and piped into `mail`, addressed to the
//! Hetzner DNS robot. In dry-run mode the `mail` command line and the signed message are printed
//! as a shell here-document instead.

use std::borrow::Cow;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::command::CommandResolver;
use crate::config::Config;
use crate::message::UpdateMessage;
use crate::zonefile::ZonefileSearchPath;
use crate::Error;

/// The Hetzner DNS robot.
pub const ROBOT_ADDRESS: &str = "robot@robot.first-ns.de";

/// Subject of every update mail.
pub const MAIL_SUBJECT: &str = "DNS Update";

/// The resolved signing and mail executables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Programs {
    pub gpg: PathBuf,
    pub mail: PathBuf,
}

impl Programs {
    pub fn resolve<R: CommandResolver + ?Sized>(
        config: &Config,
        resolver: &R,
    ) -> Result<Self, Error> {
        let gpg = resolver.resolve(config.gpg_binary())?;
        let mail = resolver.resolve(config.mail_binary())?;
        debug!("using gpg {gpg:?} and mail {mail:?}");
        Ok(Self { gpg, mail })
    }
}

/// Clear-sign `message` with `key`, returning the signed message.
pub fn sign(gpg: &Path, key: &str, message: &[u8]) -> Result<Vec<u8>, Error> {
    let pipe_error = |source| Error::Pipe {
        program: gpg.to_owned(),
        source,
    };

    // stdin is a temporary file, a second pipe could dead-lock against a full stdout pipe
    let mut input = tempfile::tempfile().map_err(pipe_error)?;
    input.write_all(message).map_err(pipe_error)?;
    input.rewind().map_err(pipe_error)?;

    debug!("signing update with key {key}");

    let process = Command::new(gpg)
        .args(["-o", "-", "-u", key, "--clearsign"])
        .stdin(Stdio::from(input))
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            program: gpg.to_owned(),
            source,
        })?;

    let output = process.wait_with_output().map_err(pipe_error)?;
    if !output.status.success() {
        return Err(Error::ProcessFailed {
            program: gpg.to_owned(),
            status: output.status,
        });
    }

    Ok(output.stdout)
}

/// Arguments passed to `mail` for delivering an update sent by `from_address`.
pub fn mail_args(from_address: &str) -> [&str; 5] {
    ["-s", MAIL_SUBJECT, "-r", from_address, ROBOT_ADDRESS]
}

/// Pipe the signed update into `mail` and wait for it to finish.
pub fn deliver(mail: &Path, from_address: &str, signed: &[u8]) -> Result<(), Error> {
    let pipe_error = |source| Error::Pipe {
        program: mail.to_owned(),
        source,
    };

    let mut process = Command::new(mail)
        .args(mail_args(from_address))
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            program: mail.to_owned(),
            source,
        })?;

    let written = match process.stdin.take() {
        // stdin is dropped after writing, which closes the pipe
        Some(mut stdin) => stdin.write_all(signed),
        None => Ok(()),
    };

    // always reap the child, its exit status explains a broken pipe
    let status = process.wait().map_err(pipe_error)?;
    if !status.success() {
        return Err(Error::ProcessFailed {
            program: mail.to_owned(),
            status,
        });
    }

    written.map_err(pipe_error)
}

fn quote_spaces(arg: &str) -> Cow<'_, str> {
    if arg.contains(' ') {
        Cow::Owned(format!("\"{arg}\""))
    } else {
        Cow::Borrowed(arg)
    }
}

/// Print the `mail` invocation and the signed update as a here-document.
pub fn render_dry_run<W: Write + ?Sized>(
    out: &mut W,
    mail: &Path,
    from_address: &str,
    signed: &[u8],
) -> Result<(), Error> {
    let args: Vec<_> = mail_args(from_address)
        .into_iter()
        .map(quote_spaces)
        .collect();

    writeln!(out, "{} {} <<EOF", mail.display(), args.join(" "))?;
    out.write_all(signed)?;
    if !signed.ends_with(b"\n") {
        writeln!(out)?;
    }
    writeln!(out, "EOF")?;
    Ok(())
}

/// Publishes zonefile updates for a [`Config`].
pub trait ZoneUpdater {
    /// Send the update described by `config` (domain, challenges, dry-run flag).
    fn update_zone(&mut self, config: &Config) -> Result<(), Error>;
}

/// Sends updates by signed mail, see the [module documentation](self).
#[derive(Clone, Debug)]
pub struct MailUpdater<R> {
    zonefiles: ZonefileSearchPath,
    resolver: R,
}

impl<R: CommandResolver> MailUpdater<R> {
    pub fn new(zonefiles: ZonefileSearchPath, resolver: R) -> Self {
        Self {
            zonefiles,
            resolver,
        }
    }

    pub fn zonefiles(&self) -> &ZonefileSearchPath {
        &self.zonefiles
    }

    /// Build, sign and deliver the update for the configured domain.
    ///
    /// Dry-run output goes to `out`. The executables are resolved before anything else happens.
    pub fn update_dns<W: Write + ?Sized>(
        &self,
        config: &Config,
        out: &mut W,
    ) -> Result<(), Error> {
        let programs = Programs::resolve(config, &self.resolver)?;

        let account = config.hetzner_account()?;
        let key = config.gpg_sign_key()?;
        let from_address = config.from_address()?;
        let domain = config.domain()?;

        let (path, zonefile) = self.zonefiles.read(domain)?;
        info!(
            "updating {domain} from {path:?} with {} challenge(s)",
            config.acme_challenges().len()
        );

        let message = UpdateMessage::new(account, domain, &zonefile)
            .with_challenges(config.acme_challenges(), config.acme_ttl())
            .to_bytes()?;

        let signed = sign(&programs.gpg, key, &message)?;

        if config.dry_run() {
            render_dry_run(out, &programs.mail, from_address, &signed)
        } else {
            deliver(&programs.mail, from_address, &signed)?;
            info!("sent update for {domain} to {ROBOT_ADDRESS}");
            Ok(())
        }
    }
}

impl<R: CommandResolver> ZoneUpdater for MailUpdater<R> {
    fn update_zone(&mut self, config: &Config) -> Result<(), Error> {
        self.update_dns(config, &mut std::io::stdout())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dry_run_rendering() -> Result<(), Error> {
        let mut out = Vec::new();
        render_dry_run(
            &mut out,
            Path::new("/usr/bin/mail"),
            "me@example.com",
            b"signed\n",
        )?;

        assert_eq!(
            String::from_utf8_lossy(&out),
            "/usr/bin/mail -s \"DNS Update\" -r me@example.com robot@robot.first-ns.de <<EOF\n\
             signed\n\
             EOF\n"
        );
        Ok(())
    }

    #[test]
    fn dry_run_terminates_body_line() -> Result<(), Error> {
        let mut out = Vec::new();
        render_dry_run(&mut out, Path::new("mail"), "me@example.com", b"signed")?;

        assert!(String::from_utf8_lossy(&out).ends_with("\nsigned\nEOF\n"));
        Ok(())
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_spaces("DNS Update"), "\"DNS Update\"");
        assert_eq!(quote_spaces("-s"), "-s");
    }

    #[test]
    fn missing_signer_fails_to_spawn() {
        let err = sign(Path::new("/nonexistent/hedup-gpg"), "KEY", b"message").unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }), "{err}");
    }
}
