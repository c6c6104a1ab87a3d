//! End to end updates against stub `gpg` and `mail` executables.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Error;

use hedup::auto::AutoChallenge;
use hedup::command::SearchPath;
use hedup::config::{Config, ConfigLayer};
use hedup::pipeline::{deliver, MailUpdater};
use hedup::zonefile::ZonefileSearchPath;

// Writing an executable while another thread forks can make exec fail with ETXTBSY, so the
// tests in this file run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

const STUB_GPG: &str = r#"#!/bin/sh
dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/gpg.args"
echo "-----BEGIN PGP SIGNED MESSAGE-----"
cat
echo "-----END PGP SIGNATURE-----"
"#;

const STUB_MAIL: &str = r#"#!/bin/sh
dir=$(dirname "$0")
printf '%s\n' "$@" > "$dir/mail.args"
cat > "$dir/mail.stdin"
"#;

const FAILING: &str = "#!/bin/sh\ncat > /dev/null\nexit 3\n";

struct Setup {
    _root: tempfile::TempDir,
    bin: PathBuf,
    updater: MailUpdater<SearchPath>,
}

impl Setup {
    fn new(gpg: &str, mail: &str) -> Result<Self, Error> {
        let root = tempfile::tempdir()?;
        let bin = root.path().join("bin");
        let zonefiles = root.path().join("zonefiles");
        std::fs::create_dir(&bin)?;
        std::fs::create_dir(&zonefiles)?;

        write_executable(&bin.join("gpg"), gpg)?;
        write_executable(&bin.join("mail"), mail)?;
        std::fs::write(zonefiles.join("example.com"), "A 1.2.3.4\n")?;

        let updater = MailUpdater::new(
            ZonefileSearchPath::new(vec![root.path().join("missing"), zonefiles]),
            SearchPath::new(vec![bin.clone()]),
        );

        Ok(Self {
            _root: root,
            bin,
            updater,
        })
    }

    fn read(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.bin.join(name)).ok()
    }
}

fn write_executable(path: &Path, content: &str) -> Result<(), Error> {
    std::fs::write(path, content)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

fn config(domain: Option<&str>, challenges: &[&str], dry_run: bool) -> Config {
    Config::from_layer(ConfigLayer {
        hetzner_account: Some("K0123".to_string()),
        gpg_sign_key: Some("0xDEADBEEF".to_string()),
        from_address: Some("me@example.com".to_string()),
        domain: domain.map(str::to_string),
        acme_challenge: Some(challenges.iter().map(|c| c.to_string()).collect()),
        propagation_seconds: Some(0),
        dry_run: Some(dry_run),
        ..Default::default()
    })
}

const UPDATE: &str = "user: K0123\n\
    job: ns\n\
    task: upd\n\
    domain: example.com\n\
    primary: yours\n\
    zonefile: /begin\n\
    A 1.2.3.4\n\
    _acme-challenge 300 IN TXT \"abc\"\n\
    _acme-challenge 300 IN TXT \"def\"\n\
    /end\n";

#[test]
fn update_is_signed_and_mailed() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, STUB_MAIL)?;

    let mut out = Vec::new();
    setup
        .updater
        .update_dns(&config(Some("example.com"), &["abc", "def"], false), &mut out)?;

    assert!(out.is_empty());
    assert_eq!(
        setup.read("gpg.args").as_deref(),
        Some("-o\n-\n-u\n0xDEADBEEF\n--clearsign\n")
    );
    assert_eq!(
        setup.read("mail.args").as_deref(),
        Some("-s\nDNS Update\n-r\nme@example.com\nrobot@robot.first-ns.de\n")
    );
    assert_eq!(
        setup.read("mail.stdin"),
        Some(format!(
            "-----BEGIN PGP SIGNED MESSAGE-----\n{UPDATE}-----END PGP SIGNATURE-----\n"
        ))
    );
    Ok(())
}

#[test]
fn dry_run_prints_instead_of_mailing() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, STUB_MAIL)?;

    let mut out = Vec::new();
    setup
        .updater
        .update_dns(&config(Some("example.com"), &["abc", "def"], true), &mut out)?;

    let expected = format!(
        "{} -s \"DNS Update\" -r me@example.com robot@robot.first-ns.de <<EOF\n\
         -----BEGIN PGP SIGNED MESSAGE-----\n\
         {UPDATE}\
         -----END PGP SIGNATURE-----\n\
         EOF\n",
        setup.bin.join("mail").display()
    );
    assert_eq!(String::from_utf8(out)?, expected);
    assert_eq!(setup.read("mail.args"), None);
    assert_eq!(setup.read("mail.stdin"), None);
    Ok(())
}

#[test]
fn signing_failure_stops_delivery() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(FAILING, STUB_MAIL)?;

    let err = setup
        .updater
        .update_dns(&config(Some("example.com"), &[], false), &mut Vec::new())
        .unwrap_err();

    assert!(
        matches!(err, hedup::Error::ProcessFailed { ref program, .. } if program.ends_with("gpg")),
        "{err}"
    );
    assert_eq!(setup.read("mail.stdin"), None);
    Ok(())
}

#[test]
fn failing_mail_is_reported() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, FAILING)?;

    let err = setup
        .updater
        .update_dns(&config(Some("example.com"), &[], false), &mut Vec::new())
        .unwrap_err();

    assert!(
        matches!(err, hedup::Error::ProcessFailed { ref program, .. } if program.ends_with("mail")),
        "{err}"
    );
    Ok(())
}

// larger than any pipe buffer, so writing blocks until the reader is gone
fn large_message() -> Vec<u8> {
    b"A 1.2.3.4\n".repeat(400 * 1024)
}

#[test]
fn mail_exiting_early_reports_its_status() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, "#!/bin/sh\nexit 5\n")?;

    let err = deliver(&setup.bin.join("mail"), "me@example.com", &large_message()).unwrap_err();

    assert!(
        matches!(err, hedup::Error::ProcessFailed { status, .. } if status.code() == Some(5)),
        "{err}"
    );
    Ok(())
}

#[test]
fn mail_ignoring_input_is_a_pipe_error() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, "#!/bin/sh\nexit 0\n")?;

    let err = deliver(&setup.bin.join("mail"), "me@example.com", &large_message()).unwrap_err();

    assert!(matches!(err, hedup::Error::Pipe { .. }), "{err}");
    Ok(())
}

#[test]
fn unresolvable_executable_fails_before_signing() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, STUB_MAIL)?;

    let config = Config::from_layer(ConfigLayer {
        mail_binary: Some("no-such-mailer".to_string()),
        ..ConfigLayer::default()
    });
    let err = setup
        .updater
        .update_dns(&config, &mut Vec::new())
        .unwrap_err();

    assert!(matches!(err, hedup::Error::ExecutableNotFound(ref name) if name == "no-such-mailer"));
    assert_eq!(setup.read("gpg.args"), None);
    Ok(())
}

#[test]
fn missing_zonefile_is_fatal() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let setup = Setup::new(STUB_GPG, STUB_MAIL)?;

    let err = setup
        .updater
        .update_dns(&config(Some("example.org"), &[], false), &mut Vec::new())
        .unwrap_err();

    assert!(matches!(err, hedup::Error::ZonefileNotFound(ref domain) if domain == "example.org"));
    assert_eq!(setup.read("gpg.args"), None);
    Ok(())
}

#[test]
fn automatic_mode_publishes_wildcard_challenge() -> Result<(), Error> {
    let _guard = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
    let mut setup = Setup::new(STUB_GPG, STUB_MAIL)?;

    let challenge = AutoChallenge::from_lookup(|name| match name {
        "CERTBOT_DOMAIN" => Some("*.example.com".into()),
        "CERTBOT_VALIDATION" => Some("token".into()),
        _ => None,
    })?
    .expect("both variables are set");

    challenge.run(&config(None, &[], false), &mut setup.updater)?;

    let mail = setup.read("mail.stdin").unwrap_or_default();
    assert!(mail.contains("domain: example.com\n"), "{mail}");
    assert!(
        mail.contains("A 1.2.3.4\n_acme-challenge 300 IN TXT \"token\"\n/end\n"),
        "{mail}"
    );
    Ok(())
}
