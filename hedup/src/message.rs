//! Assembly of the zonefile update message understood by the Hetzner DNS robot.

use std::fmt;
use std::io::{self, Write};

/// Marks the start of the zonefile in the update.
pub const ZONEFILE_BEGIN: &str = "zonefile: /begin";

/// Terminates the zonefile (and the update).
pub const ZONEFILE_END: &str = "/end";

/// A TXT record publishing one ACME DNS-01 validation token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChallengeRecord<'a> {
    pub ttl: u32,
    pub token: &'a str,
}

impl fmt::Display for ChallengeRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "_acme-challenge {} IN TXT \"{}\"", self.ttl, self.token)
    }
}

/// An update for one domain: the preamble, the verbatim zonefile and the challenge records.
#[derive(Clone, Debug)]
pub struct UpdateMessage<'a> {
    account: &'a str,
    domain: &'a str,
    zonefile: &'a [u8],
    challenges: &'a [String],
    ttl: u32,
}

impl<'a> UpdateMessage<'a> {
    /// Creates an update publishing `zonefile` (without any challenges) for `domain`.
    pub fn new(account: &'a str, domain: &'a str, zonefile: &'a [u8]) -> Self {
        Self {
            account,
            domain,
            zonefile,
            challenges: &[],
            ttl: crate::config::DEFAULT_ACME_TTL,
        }
    }

    /// Builder-style method to append one `_acme-challenge` record per token, in order.
    pub fn with_challenges(mut self, challenges: &'a [String], ttl: u32) -> Self {
        self.challenges = challenges;
        self.ttl = ttl;
        self
    }

    fn preamble(&self) -> [String; 6] {
        [
            format!("user: {}", self.account),
            "job: ns".to_string(),
            "task: upd".to_string(),
            format!("domain: {}", self.domain),
            "primary: yours".to_string(),
            ZONEFILE_BEGIN.to_string(),
        ]
    }

    /// Write the complete update.
    ///
    /// The zonefile is copied byte for byte, no line endings are touched.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for line in self.preamble() {
            writeln!(out, "{line}")?;
        }

        out.write_all(self.zonefile)?;

        for token in self.challenges {
            let record = ChallengeRecord {
                ttl: self.ttl,
                token: token.as_str(),
            };
            writeln!(out, "{record}")?;
        }

        writeln!(out, "{ZONEFILE_END}")
    }

    /// The complete update as bytes.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.zonefile.len() + 256);
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }
}
