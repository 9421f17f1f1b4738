//! Outbound proxy pool
//!
//! reqwest binds proxies at client build time, so the pool holds one client
//! per configured proxy and picks one uniformly at random per attempt.

use rand::Rng;
use reqwest::{Client, ClientBuilder, Proxy};
use serde::{Deserialize, Serialize};

/// One outbound proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ProxyConfig {
    /// Proxy address as `url:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.url.trim_end_matches('/'), self.port)
    }

    /// Basic auth is only attached when both parts are present
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    fn to_reqwest(&self) -> Result<Proxy, reqwest::Error> {
        let proxy = Proxy::all(self.address())?;
        if self.has_credentials() {
            Ok(proxy.basic_auth(&self.username, &self.password))
        } else {
            Ok(proxy)
        }
    }
}

/// The direct client plus one client per proxy
pub struct ProxyPool {
    direct: Client,
    proxied: Vec<(ProxyConfig, Client)>,
}

impl ProxyPool {
    /// Builds the pool, applying `configure` to every client builder
    ///
    /// # Arguments
    ///
    /// * `proxies` - Configured proxies, possibly empty
    /// * `configure` - Shared client settings (user agent, timeouts, redirects)
    ///
    /// # Returns
    ///
    /// * `Ok(ProxyPool)` - All clients built
    /// * `Err(reqwest::Error)` - A proxy address or client setting was rejected
    pub fn build<F>(proxies: &[ProxyConfig], configure: F) -> Result<Self, reqwest::Error>
    where
        F: Fn(ClientBuilder) -> ClientBuilder,
    {
        let direct = configure(Client::builder()).build()?;

        let mut proxied = Vec::with_capacity(proxies.len());
        for proxy in proxies {
            let client = configure(Client::builder().proxy(proxy.to_reqwest()?)).build()?;
            proxied.push((proxy.clone(), client));
        }

        Ok(Self { direct, proxied })
    }

    pub fn len(&self) -> usize {
        self.proxied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxied.is_empty()
    }

    /// Picks the client for one request attempt
    ///
    /// Without proxies this is always the direct client.
    pub fn select(&self) -> (&Client, Option<&ProxyConfig>) {
        match pick_index(self.proxied.len(), &mut rand::thread_rng()) {
            Some(index) => {
                let (config, client) = &self.proxied[index];
                (client, Some(config))
            }
            None => (&self.direct, None),
        }
    }
}

fn pick_index<R: Rng>(len: usize, rng: &mut R) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(rng.gen_range(0..len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn proxy(url: &str, port: u16, username: &str, password: &str) -> ProxyConfig {
        ProxyConfig {
            url: url.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_address_and_credentials() {
        let p = proxy("http://proxy.example.com/", 3128, "user", "");
        assert_eq!(p.address(), "http://proxy.example.com:3128");
        assert!(!p.has_credentials());
        assert!(proxy("http://p.example.com", 1, "user", "pass").has_credentials());
    }

    #[test]
    fn test_pick_index_covers_every_proxy() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[pick_index(3, &mut rng).unwrap()] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(pick_index(0, &mut rng), None);
    }

    #[test]
    fn test_pool_without_proxies_uses_direct_client() {
        let pool = ProxyPool::build(&[], |builder| builder).unwrap();
        assert!(pool.is_empty());
        assert!(pool.select().1.is_none());
    }

    #[test]
    fn test_pool_selects_configured_proxy() {
        let proxies = vec![proxy("http://proxy.example.com", 8080, "u", "p")];
        let pool = ProxyPool::build(&proxies, |builder| builder).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.select().1, Some(&proxies[0]));
    }
}
