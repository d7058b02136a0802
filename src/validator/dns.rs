//! DNS lookups for email domain validation: MX first, A/AAAA fallback.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use trust_dns_resolver::config::{
    LookupIpStrategy, NameServerConfig, Protocol, ResolverConfig, ResolverOpts,
};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{Result, ScoutError};

/// Outcome of a mail-server lookup. `Server` carries the most-preferred MX
/// exchange; `AddressFallback` the host address when no MX exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxLookup {
    Server(String),
    AddressFallback(String),
    NoRecords,
    NxDomain,
    Timeout,
    Error(String),
}

pub fn create_resolver(dns_servers: &[String], timeout: Duration) -> Result<TokioAsyncResolver> {
    let mut config = ResolverConfig::new();

    for server in dns_servers {
        let ip = IpAddr::from_str(server).map_err(|e| {
            ScoutError::Config(format!("invalid DNS server address '{}': {}", server, e))
        })?;
        let socket_addr = SocketAddr::new(ip, 53);
        config.add_name_server(NameServerConfig {
            socket_addr,
            protocol: Protocol::Udp,
            tls_dns_name: None,
            trust_negative_responses: true,
            bind_addr: None,
        });
        config.add_name_server(NameServerConfig {
            socket_addr,
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: true,
            bind_addr: None,
        });
    }

    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 2;
    opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

    Ok(TokioAsyncResolver::tokio(config, opts))
}

/// Resolve the mail server for a domain. MX records are preferred by their
/// preference value; domains without MX fall back to A/AAAA.
pub async fn resolve_mail_server(resolver: &TokioAsyncResolver, domain: &str) -> MxLookup {
    tracing::debug!("MX lookup for {}", domain);

    match resolver.mx_lookup(domain).await {
        Ok(response) => {
            let mut records: Vec<_> = response.iter().collect();
            if records.is_empty() {
                return resolve_address_fallback(resolver, domain).await;
            }
            records.sort_by_key(|r| r.preference());
            let best = records[0];
            let exchange = best.exchange().to_utf8().trim_end_matches('.').to_string();
            if exchange.is_empty() {
                return MxLookup::NoRecords;
            }
            tracing::debug!("MX for {}: {} (pref {})", domain, exchange, best.preference());
            MxLookup::Server(exchange)
        }
        Err(e) => {
            let kind = format!("{:?}", e.kind());
            if kind.contains("NoRecordsFound") {
                resolve_address_fallback(resolver, domain).await
            } else if kind.contains("NXDomain") || kind.contains("Name does not exist") {
                MxLookup::NxDomain
            } else if kind.contains("Timeout") {
                MxLookup::Timeout
            } else {
                MxLookup::Error(e.to_string())
            }
        }
    }
}

async fn resolve_address_fallback(resolver: &TokioAsyncResolver, domain: &str) -> MxLookup {
    tracing::debug!("A/AAAA fallback for {}", domain);
    match resolver.lookup_ip(domain).await {
        Ok(response) => match response.iter().next() {
            Some(ip) => MxLookup::AddressFallback(ip.to_string()),
            None => MxLookup::NoRecords,
        },
        Err(e) => {
            let kind = format!("{:?}", e.kind());
            if kind.contains("NoRecordsFound") {
                MxLookup::NoRecords
            } else if kind.contains("NXDomain") || kind.contains("Name does not exist") {
                MxLookup::NxDomain
            } else if kind.contains("Timeout") {
                MxLookup::Timeout
            } else {
                MxLookup::Error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_rejects_bad_server_address() {
        let err = create_resolver(&["not-an-ip".to_string()], Duration::from_secs(1));
        assert!(err.is_err());
    }

    #[test]
    fn resolver_accepts_public_servers() {
        let resolver = create_resolver(
            &["8.8.8.8".to_string(), "1.1.1.1".to_string()],
            Duration::from_secs(2),
        );
        assert!(resolver.is_ok());
    }
}
