//! # scanbridge transport
//!
//! Transport-level plumbing shared by the discovery backends and the
//! eSCL server:
//!
//! - [`Url`] / [`parse_url`] / [`parse_addr`]: canonicalized URLs for
//!   the printer/scanner schemes (http, https, ipp, ipps, unix).
//! - [`AutoTlsListener`]: wraps a TCP listener and splits incoming
//!   connections into plaintext and TLS streams by peeking at the
//!   first byte of each connection.
//! - [`McastSocket`]: a UDP socket prepared for multicast reception on
//!   multiple interfaces at once, reporting the receiving interface of
//!   every datagram.
//! - [`netstate`]: network interface monitoring with
//!   add/delete/primary-address events.

mod autotls;
mod mcast;
pub mod netstate;
mod url;

pub use autotls::{AutoTlsChild, AutoTlsListener};
pub use mcast::McastSocket;
pub use url::{clean_url_path, parse_addr, parse_url, Scheme, Url, UrlError};
