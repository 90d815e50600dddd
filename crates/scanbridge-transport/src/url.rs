//! URL parsing and canonicalization for the printer/scanner schemes.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

/// URL parse errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("URL scheme is missed")]
    SchemeMissed,

    #[error("URL scheme is invalid")]
    SchemeInvalid,

    #[error("URL is invalid")]
    Invalid,

    #[error("URL host must be empty or localhost for the unix scheme")]
    UnixHost,
}

/// URL schemes recognized by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ipp,
    Ipps,
    Unix,
}

impl Scheme {
    /// Returns the default port for the scheme, elided on output.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
            Scheme::Ipp | Scheme::Ipps => Some(631),
            Scheme::Unix => None,
        }
    }

    /// Returns true if the scheme implies TLS.
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https | Scheme::Ipps)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ipp => "ipp",
            Scheme::Ipps => "ipps",
            Scheme::Unix => "unix",
        }
    }

    fn from_str(s: &str) -> Option<Scheme> {
        match s {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            "ipp" => Some(Scheme::Ipp),
            "ipps" => Some(Scheme::Ipps),
            "unix" => Some(Scheme::Unix),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonicalized URL.
///
/// Canonical form elides default ports (`http:80`, `https:443`,
/// `ipp:631`, `ipps:631`), collapses the path (`//` to `/`, `.` and
/// `..` resolved, empty path to `/`) and renders unix-socket URLs as
/// `unix:/path`. Parsing the rendered form again yields an equal URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
}

impl Url {
    /// Returns the URL scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the host, without brackets for IPv6 literals.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the effective port (explicit or scheme default).
    pub fn port(&self) -> Option<u16> {
        self.port.or_else(|| self.scheme.default_port())
    }

    /// Returns the canonicalized path. For unix URLs this is the
    /// socket path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the `host:port` authority in the form expected by
    /// socket addresses (IPv6 hosts bracketed).
    pub fn authority(&self) -> String {
        let port = self.port().unwrap_or(0);
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        }
    }

    /// Returns a copy with a different path.
    pub fn with_path(&self, path: &str) -> Url {
        Url {
            path: clean_url_path(path),
            ..self.clone()
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme == Scheme::Unix {
            return write!(f, "unix:{}", self.path);
        }

        write!(f, "{}://", self.scheme)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            if Some(port) != self.scheme.default_port() {
                write!(f, ":{}", port)?;
            }
        }
        f.write_str(&self.path)
    }
}

/// Parses and canonicalizes a URL.
pub fn parse_url(input: &str) -> Result<Url, UrlError> {
    let (scheme_str, rest) = match input.split_once(':') {
        Some(parts) => parts,
        None => return Err(UrlError::SchemeMissed),
    };

    if !valid_scheme_shape(scheme_str) {
        return Err(UrlError::SchemeMissed);
    }

    let scheme = Scheme::from_str(&scheme_str.to_ascii_lowercase())
        .ok_or(UrlError::SchemeInvalid)?;

    if scheme == Scheme::Unix {
        return parse_unix(rest);
    }

    let rest = rest.strip_prefix("//").ok_or(UrlError::Invalid)?;

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let (host, port) = parse_authority(authority)?;

    Ok(Url {
        scheme,
        host,
        port,
        path: clean_url_path(path),
    })
}

fn parse_unix(rest: &str) -> Result<Url, UrlError> {
    let path = if let Some(after) = rest.strip_prefix("//") {
        // unix://host/path form; the host must be empty or localhost.
        let (authority, path) = match after.find('/') {
            Some(idx) => (&after[..idx], &after[idx..]),
            None => (after, ""),
        };

        if !authority.is_empty() && !authority.eq_ignore_ascii_case("localhost") {
            return Err(UrlError::UnixHost);
        }
        path
    } else {
        rest
    };

    Ok(Url {
        scheme: Scheme::Unix,
        host: String::new(),
        port: None,
        path: clean_url_path(path),
    })
}

fn parse_authority(authority: &str) -> Result<(String, Option<u16>), UrlError> {
    if authority.is_empty() {
        return Err(UrlError::Invalid);
    }

    let (host, port_str) = if let Some(after) = authority.strip_prefix('[') {
        // Bracketed IPv6 literal, possibly with a zone.
        let end = after.find(']').ok_or(UrlError::Invalid)?;
        let host = &after[..end];
        let tail = &after[end + 1..];
        let port_str = match tail.strip_prefix(':') {
            Some(port) => Some(port),
            None if tail.is_empty() => None,
            None => return Err(UrlError::Invalid),
        };
        (host.to_string(), port_str)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (authority.to_string(), None),
        }
    };

    if host.is_empty() || host.chars().any(|c| c.is_whitespace()) {
        return Err(UrlError::Invalid);
    }

    let port = match port_str {
        Some(p) => Some(p.parse::<u16>().map_err(|_| UrlError::Invalid)?),
        None => None,
    };

    Ok((host, port))
}

fn valid_scheme_shape(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
}

/// Collapses a URL path: `//` becomes `/`, `.` and `..` segments are
/// resolved, the empty path becomes `/`. A trailing slash is kept.
pub fn clean_url_path(path: &str) -> String {
    let trailing = path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut out = String::from("/");
    out.push_str(&segments.join("/"));

    if trailing && out.len() > 1 {
        out.push('/');
    }

    out
}

/// Parses a device address into a canonicalized URL.
///
/// Accepts a bare IP address, `ip:port`, `[v6]:port`, a unix socket
/// path, or a full URL. When the address lacks a scheme or path, the
/// optional template URL supplies them; without a template the scheme
/// is inferred from the port (443 is https, 631 is ipp, anything else
/// http).
pub fn parse_addr(addr: &str, template: &str) -> Result<Url, UrlError> {
    // Unix socket path?
    if addr.starts_with('/') {
        return Ok(Url {
            scheme: Scheme::Unix,
            host: String::new(),
            port: None,
            path: clean_url_path(addr),
        });
    }

    // Bare IP or IP:port?
    if let Some((host, port)) = split_host_port(addr) {
        let template = if template.is_empty() {
            None
        } else {
            Some(parse_url(template)?)
        };

        let port = port.or_else(|| template.as_ref().and_then(|t| t.port));
        let scheme = match &template {
            Some(t) => t.scheme,
            None => match port {
                Some(443) => Scheme::Https,
                Some(631) => Scheme::Ipp,
                _ => Scheme::Http,
            },
        };
        let path = template
            .as_ref()
            .map(|t| t.path.clone())
            .unwrap_or_else(|| "/".to_string());

        return Ok(Url {
            scheme,
            host,
            port,
            path,
        });
    }

    // Otherwise this must be a full URL.
    parse_url(addr)
}

// Recognizes bare `ip`, `ip:port`, `[v6]` and `[v6]:port` forms.
fn split_host_port(addr: &str) -> Option<(String, Option<u16>)> {
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Some((ip.to_string(), None));
    }

    if let Ok(sa) = addr.parse::<SocketAddr>() {
        return Some((sa.ip().to_string(), Some(sa.port())));
    }

    // [v6] without a port
    if let Some(inner) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        if let Ok(ip) = inner.parse::<IpAddr>() {
            return Some((ip.to_string(), None));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(input: &str) -> String {
        parse_url(input).unwrap().to_string()
    }

    #[test]
    fn test_http_schemes() {
        assert_eq!(canon("http://127.0.0.1/ipp/print"), "http://127.0.0.1/ipp/print");
        assert_eq!(canon("http://127.0.0.1:80/ipp/print"), "http://127.0.0.1/ipp/print");
        assert_eq!(canon("http://127.0.0.1:81/ipp/print"), "http://127.0.0.1:81/ipp/print");
        assert_eq!(canon("https://127.0.0.1:443/ipp/print"), "https://127.0.0.1/ipp/print");
        assert_eq!(canon("https://127.0.0.1:444/ipp/print"), "https://127.0.0.1:444/ipp/print");
    }

    #[test]
    fn test_ipp_schemes() {
        assert_eq!(canon("ipp://127.0.0.1/ipp/print"), "ipp://127.0.0.1/ipp/print");
        assert_eq!(canon("ipp://127.0.0.1:631/ipp/print"), "ipp://127.0.0.1/ipp/print");
        assert_eq!(canon("ipps://127.0.0.1:631/ipp/print"), "ipps://127.0.0.1/ipp/print");
        assert_eq!(canon("ipps://127.0.0.1:632/ipp/print"), "ipps://127.0.0.1:632/ipp/print");
    }

    #[test]
    fn test_ipv6_host() {
        assert_eq!(canon("http://[::1]:81/x"), "http://[::1]:81/x");
        assert_eq!(
            canon("http://[fe80::aec5:1bff:fe1c:6fa7%252]/ipp/print"),
            "http://[fe80::aec5:1bff:fe1c:6fa7%252]/ipp/print"
        );
    }

    #[test]
    fn test_unix_scheme() {
        assert_eq!(canon("unix:///var/run/cups/cups.sock"), "unix:/var/run/cups/cups.sock");
        assert_eq!(canon("unix:/var/run/cups/cups.sock"), "unix:/var/run/cups/cups.sock");
        assert_eq!(canon("unix://localhost/var/run/cups/cups.sock"), "unix:/var/run/cups/cups.sock");
        assert_eq!(canon("unix://LoCaLhOsT/var/run/cups/cups.sock"), "unix:/var/run/cups/cups.sock");

        assert_eq!(
            parse_url("unix://localhost:80/var/run/cups/cups.sock").unwrap_err(),
            UrlError::UnixHost
        );
        assert_eq!(
            parse_url("unix://example.com/var/run/cups/cups.sock").unwrap_err(),
            UrlError::UnixHost
        );
    }

    #[test]
    fn test_path_handling() {
        assert_eq!(canon("http://127.0.0.1/"), "http://127.0.0.1/");
        assert_eq!(canon("http://127.0.0.1"), "http://127.0.0.1/");
        assert_eq!(canon("http://127.0.0.1/foo/"), "http://127.0.0.1/foo/");
        assert_eq!(canon("http://127.0.0.1/foo//////bar"), "http://127.0.0.1/foo/bar");
        assert_eq!(canon("http://127.0.0.1/foo/./bar/../foobar"), "http://127.0.0.1/foo/foobar");
        assert_eq!(
            canon("http://127.0.0.1:80/ipp//print/../print"),
            "http://127.0.0.1/ipp/print"
        );
    }

    #[test]
    fn test_scheme_errors() {
        assert_eq!(parse_url("foo").unwrap_err(), UrlError::SchemeMissed);
        assert_eq!(parse_url("foo:").unwrap_err(), UrlError::SchemeInvalid);
        assert_eq!(parse_url("").unwrap_err(), UrlError::SchemeMissed);
        assert_eq!(parse_url("http://Invalid URL").unwrap_err(), UrlError::Invalid);
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            "http://127.0.0.1:80/ipp//print/../print",
            "ipps://[::1]:631/eSCL/",
            "unix://localhost/run/x.sock",
            "http://example.com",
        ];

        for input in inputs {
            let once = parse_url(input).unwrap().to_string();
            let twice = parse_url(&once).unwrap().to_string();
            assert_eq!(once, twice, "canonical form of {:?} is not stable", input);
        }
    }

    #[test]
    fn test_parse_addr_bare() {
        let cases = [
            ("127.0.0.1", "", "http://127.0.0.1/"),
            ("::1", "", "http://[::1]/"),
            ("[::1]", "", "http://[::1]/"),
            ("127.0.0.1:80", "", "http://127.0.0.1/"),
            ("127.0.0.1:81", "", "http://127.0.0.1:81/"),
            ("127.0.0.1:443", "", "https://127.0.0.1/"),
            ("127.0.0.1:631", "", "ipp://127.0.0.1/"),
            ("[::1]:80", "", "http://[::1]/"),
            ("[::1]:81", "", "http://[::1]:81/"),
            ("/var/run/cups/cups.sock", "", "unix:/var/run/cups/cups.sock"),
        ];

        for (addr, template, expected) in cases {
            assert_eq!(
                parse_addr(addr, template).unwrap().to_string(),
                expected,
                "parse_addr({:?}, {:?})",
                addr,
                template
            );
        }
    }

    #[test]
    fn test_parse_addr_with_template() {
        let cases = [
            ("127.0.0.1", "https://localhost/", "https://127.0.0.1/"),
            ("127.0.0.1", "http://localhost:222/", "http://127.0.0.1:222/"),
            ("127.0.0.1:1234", "https://localhost/path", "https://127.0.0.1:1234/path"),
        ];

        for (addr, template, expected) in cases {
            assert_eq!(parse_addr(addr, template).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn test_parse_addr_full_url() {
        assert_eq!(
            parse_addr("http://127.0.0.1:80/ipp/print", "").unwrap().to_string(),
            "http://127.0.0.1/ipp/print"
        );
    }

    #[test]
    fn test_authority_formatting() {
        let url = parse_url("http://[::1]:8080/x").unwrap();
        assert_eq!(url.authority(), "[::1]:8080");

        let url = parse_url("ipp://10.0.0.1/x").unwrap();
        assert_eq!(url.authority(), "10.0.0.1:631");
    }
}
