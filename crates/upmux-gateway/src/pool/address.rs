//! Loopback address rewriting for containerized deployments
//!
//! Inside a container `localhost` is the container itself, so upstreams the
//! operator registered as `http://localhost:3000/mcp` must be reached through
//! the host alias instead.

use tracing::debug;
use upmux_core::ConnectorConfig;

/// Rewrites loopback hosts in upstream URLs when enabled.
///
/// Only the host component changes. Scheme, userinfo, port, path, query and
/// fragment are copied byte-for-byte from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressNormalizer {
    rewrite: bool,
    alias: String,
}

impl AddressNormalizer {
    pub fn new(rewrite: bool, alias: impl Into<String>) -> Self {
        Self {
            rewrite,
            alias: alias.into(),
        }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(config.rewrite_localhost, config.docker_host_alias.clone())
    }

    /// A normalizer that never rewrites
    pub fn disabled() -> Self {
        Self::new(false, upmux_core::config::DEFAULT_DOCKER_HOST_ALIAS)
    }

    pub fn normalize(&self, url: &str) -> String {
        if !self.rewrite {
            return url.to_string();
        }

        match rewrite_loopback_host(url, &self.alias) {
            Some(rewritten) => {
                debug!(before = %url, after = %rewritten, "Rewrote loopback host for container networking");
                rewritten
            }
            None => url.to_string(),
        }
    }
}

fn is_loopback_literal(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

/// Replace a loopback host in `url` with `alias`, or `None` when the host is
/// not loopback (or the input does not parse).
fn rewrite_loopback_host(url: &str, alias: &str) -> Option<String> {
    let mut parsed = url::Url::parse(url).ok()?;
    if !is_loopback_literal(parsed.host_str()?) {
        return None;
    }

    if let Some(spliced) = splice_host(url, alias) {
        return Some(spliced);
    }

    // Spellings the parser accepts without a literal `//host` span
    // (`http:localhost`, backslashes, numeric IPv4 forms)
    parsed.set_host(Some(alias)).ok()?;
    Some(parsed.to_string())
}

/// Locate the host in the original text rather than re-serializing, which
/// would normalize the rest of the URL (e.g. add a trailing slash).
fn splice_host(url: &str, alias: &str) -> Option<String> {
    let authority_start = url.find("://")? + 3;
    let rest = &url[authority_start..];
    let authority_len = rest.find(['/', '?', '#', '\\']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let host_offset = authority.rfind('@').map(|i| i + 1).unwrap_or(0);
    let host_and_port = &authority[host_offset..];
    let host_len = host_and_port.find(':').unwrap_or(host_and_port.len());
    if !is_loopback_literal(&host_and_port[..host_len]) {
        return None;
    }

    let host_start = authority_start + host_offset;
    let host_end = host_start + host_len;
    Some(format!("{}{}{}", &url[..host_start], alias, &url[host_end..]))
}
