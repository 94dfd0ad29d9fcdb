use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use super::error::{HttpError, HttpResult};

#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> HttpResult<SocketAddr>;
}

/// Uses the system resolver through tokio, preferring IPv4 answers.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> HttpResult<SocketAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|err| HttpError::Resolve {
                host: host.to_string(),
                message: err.to_string(),
            })?
            .collect::<Vec<_>>();
        pick_preferred(&addrs).ok_or_else(|| HttpError::Resolve {
            host: host.to_string(),
            message: "no addresses returned".into(),
        })
    }
}

pub(crate) fn pick_preferred(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_ipv4_answers() {
        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let v4: SocketAddr = "192.0.2.10:443".parse().unwrap();
        assert_eq!(pick_preferred(&[v6, v4]), Some(v4));
        assert_eq!(pick_preferred(&[v6]), Some(v6));
        assert_eq!(pick_preferred(&[]), None);
    }

    #[tokio::test]
    async fn literal_addresses_skip_lookup() {
        let addr = SystemResolver.resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }
}
