//! hedup: Perform HEtzner Dns UPdates via mail.
//!
//! The Hetzner DNS robot accepts zonefile updates by mail. This crate builds such an update from
//! a locally maintained zonefile, appends ACME DNS-01 challenge records, clear-signs the result
//! with `gpg` and sends it with `mail`. This is mostly useful to obtain Let's Encrypt wildcard
//! certificates automatically.
//!
//! The pieces, in the order an update flows through them:
//!
//! * [`config`]: merge the configuration files and command line into a [`Config`](config::Config)
//! * [`zonefile`]: find the zonefile for the domain
//! * [`message`]: assemble the update
//! * [`pipeline`]: sign and deliver it (or print it in dry-run mode)
//!
//! [`auto`] and [`authenticator`] adapt this to certificate clients.

pub mod authenticator;
pub mod auto;
pub mod command;
pub mod config;
pub mod log;
pub mod message;
pub mod pipeline;
pub mod zonefile;

mod error;

#[doc(inline)]
pub use error::Error;
