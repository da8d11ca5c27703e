use std::fmt;
use url::{Position, Url};

/// Schemes a `*` scheme glob stands for.
const WILDCARD_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// A parsed outbound request URL, split into the parts a [`BlockPattern`] globs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    raw: String,
    scheme: String,
    host: String,
    // explicit port, or the scheme's default
    port: Option<u16>,
    // path plus `?query`, without the fragment
    path: String,
}

impl CandidateUrl {
    pub fn parse(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();
        Some(Self {
            raw: raw.to_string(),
            scheme: url.scheme().to_string(),
            host,
            port: url.port_or_known_default(),
            path: url[Position::BeforePath..Position::AfterQuery].to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SchemeGlob {
    Any,
    Exact(Box<str>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HostGlob {
    Any,
    /// `*.example.com`: the domain itself and every subdomain.
    Subdomains(Box<str>),
    Exact(Box<str>),
    /// Any other host containing `*`.
    Wildcard(Box<str>),
}

/// A URL glob of the form `scheme://host-glob/path-glob`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockPattern {
    raw: Box<str>,
    scheme: SchemeGlob,
    host: HostGlob,
    /// Glob over the port, from a `host:port` host part.
    port: Option<Box<str>>,
    path: Box<str>,
}

impl BlockPattern {
    /// Parses a glob, returning `None` if it does not have the
    /// `scheme://host/path` shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (scheme, rest) = raw.split_once("://")?;

        let scheme = match scheme {
            "*" => SchemeGlob::Any,
            s if !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') =>
            {
                SchemeGlob::Exact(s.to_ascii_lowercase().into_boxed_str())
            }
            _ => return None,
        };

        let slash = rest.find('/')?;
        let (host, path) = rest.split_at(slash);
        if host.is_empty() || !host.chars().all(is_host_glob_char) {
            return None;
        }
        let host = host.to_ascii_lowercase();
        let (host, port) = match host.split_once(':') {
            Some((h, p)) if !h.is_empty() && !p.is_empty() && !p.contains(':') => {
                if !p.chars().all(|c| c.is_ascii_digit() || c == '*') {
                    return None;
                }
                (h.to_string(), Some(p.into()))
            }
            Some(_) => return None,
            None => (host, None),
        };

        let host = if host == "*" {
            HostGlob::Any
        } else if let Some(domain) = host.strip_prefix("*.") {
            if domain.is_empty() || domain.contains('*') {
                HostGlob::Wildcard(host.into_boxed_str())
            } else {
                HostGlob::Subdomains(domain.into())
            }
        } else if host.contains('*') {
            HostGlob::Wildcard(host.into_boxed_str())
        } else {
            HostGlob::Exact(host.into_boxed_str())
        };

        Some(Self {
            raw: raw.into(),
            scheme,
            host,
            port,
            path: path.into(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The concrete domain this pattern is anchored on, if any. Used to
    /// index patterns by host suffix.
    pub fn anchor_domain(&self) -> Option<&str> {
        match &self.host {
            HostGlob::Subdomains(d) | HostGlob::Exact(d) => Some(d),
            _ => None,
        }
    }

    pub fn matches(&self, url: &CandidateUrl) -> bool {
        self.matches_scheme(url.scheme()) && self.matches_host(url.host())
            && self.matches_port(url.port())
            && self.matches_path(url)
    }

    fn matches_scheme(&self, scheme: &str) -> bool {
        match &self.scheme {
            SchemeGlob::Any => WILDCARD_SCHEMES.contains(&scheme),
            SchemeGlob::Exact(s) => &**s == scheme,
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        match &self.host {
            HostGlob::Any => true,
            HostGlob::Subdomains(domain) => {
                host == &**domain
                    || (host.len() > domain.len()
                        && host.ends_with(&**domain)
                        && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
            }
            HostGlob::Exact(h) => &**h == host,
            HostGlob::Wildcard(glob) => glob_match(glob, host),
        }
    }

    fn matches_port(&self, port: Option<u16>) -> bool {
        match (&self.port, port) {
            (None, _) => true,
            (Some(glob), Some(port)) => glob_match(glob, &port.to_string()),
            (Some(glob), None) => &**glob == "*",
        }
    }

    pub(crate) fn matches_path(&self, url: &CandidateUrl) -> bool {
        glob_match(&self.path, url.path())
    }
}

impl fmt::Display for BlockPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_host_glob_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '*' | ':')
}

/// `*`-only glob match, iterative with single-star backtracking.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            pi += 1;
            mark = ti;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}
