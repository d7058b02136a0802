//! Polite HTTP fetching: shared client, per-origin rate limiting and a
//! robots.txt cache.
//!
//! The rate limiter guarantees that the k-th request to an origin starts at
//! least `rate_limit` after the (k-1)-th. Robots decisions are cached per
//! origin; an unreachable robots.txt means crawling is allowed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use texting_robots::Robot;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, ScoutError};
use crate::models::DiscoveryContext;

const ROBOTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Response body cap; listing pages past this size are truncated downloads we
/// refuse to parse.
const MAX_BODY_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
    pub final_url: String,
}

/// Per-origin state shared between concurrent fetches.
#[derive(Default)]
struct OriginState {
    robots: HashMap<String, Option<Arc<Robot>>>,
    next_slot: HashMap<String, Instant>,
}

pub struct Fetcher {
    client: Client,
    rate_limit: Duration,
    state: Mutex<OriginState>,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration, rate_limit: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ScoutError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Fetcher {
            client,
            rate_limit,
            state: Mutex::new(OriginState::default()),
        })
    }

    /// Fetch a page, honoring robots.txt and the per-origin rate window.
    pub async fn fetch(&self, url: &str, ctx: &DiscoveryContext) -> Result<FetchedPage> {
        let parsed = Url::parse(url).map_err(|e| ScoutError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let origin = origin_of(&parsed);

        if ctx.respect_robots && !self.robots_allows(&origin, url, ctx).await {
            return Err(ScoutError::RobotsBlocked(url.to_string()));
        }

        self.wait_for_slot(&origin).await;

        debug!("GET {}", url);
        let response = self
            .client
            .get(parsed)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(
                reqwest::header::ACCEPT_LANGUAGE,
                format!("{}, en;q=0.5", ctx.language),
            )
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ScoutError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > MAX_BODY_BYTES {
                return Err(ScoutError::TooLarge {
                    url: url.to_string(),
                    size: len,
                    cap: MAX_BODY_BYTES,
                });
            }
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        Ok(FetchedPage {
            status: status.as_u16(),
            body,
            final_url,
        })
    }

    /// Download a binary artifact (image, PDF) with an explicit size cap.
    /// Robots and rate limiting apply the same as for pages.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        ctx: &DiscoveryContext,
        cap: u64,
    ) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|e| ScoutError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let origin = origin_of(&parsed);

        if ctx.respect_robots && !self.robots_allows(&origin, url, ctx).await {
            return Err(ScoutError::RobotsBlocked(url.to_string()));
        }

        self.wait_for_slot(&origin).await;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ScoutError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if let Some(len) = response.content_length() {
            if len > cap {
                return Err(ScoutError::TooLarge {
                    url: url.to_string(),
                    size: len,
                    cap,
                });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;
        if bytes.len() as u64 > cap {
            return Err(ScoutError::TooLarge {
                url: url.to_string(),
                size: bytes.len() as u64,
                cap,
            });
        }
        Ok(bytes.to_vec())
    }

    /// HEAD request without body download; used by the validator.
    pub async fn head_status(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;
        Ok(response.status().as_u16())
    }

    /// Reserve the next request slot for the origin and sleep until it
    /// arrives. The slot map is updated under the lock; sleeping happens
    /// outside it so other origins proceed.
    async fn wait_for_slot(&self, origin: &str) {
        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = state
                .next_slot
                .get(origin)
                .copied()
                .filter(|s| *s > now)
                .unwrap_or(now);
            state.next_slot.insert(origin.to_string(), slot + self.rate_limit);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!("Rate limit: waiting {:?} for {}", wait, origin);
            tokio::time::sleep(wait).await;
        }
    }

    async fn robots_allows(&self, origin: &str, url: &str, ctx: &DiscoveryContext) -> bool {
        // Fast path: cached decision for this origin.
        {
            let state = self.state.lock().await;
            if let Some(cached) = state.robots.get(origin) {
                return match cached {
                    Some(robot) => robot.allowed(url),
                    None => true,
                };
            }
        }

        let robots_url = format!("{}/robots.txt", origin);
        let fetched = self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_TIMEOUT)
            .send()
            .await;

        let robot = match fetched {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => Robot::new(&ctx.user_agent, &bytes).ok().map(Arc::new),
                Err(_) => None,
            },
            Ok(_) => None,
            Err(e) => {
                debug!("robots.txt fetch failed for {}: {} (allowing)", origin, e);
                None
            }
        };

        let mut state = self.state.lock().await;
        let allowed = match &robot {
            Some(r) => r.allowed(url),
            None => true,
        };
        state.robots.insert(origin.to_string(), robot);
        if !allowed {
            warn!("robots.txt disallows {}", url);
        }
        allowed
    }
}

pub fn origin_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    }
}

fn classify_reqwest_error(url: &str, e: reqwest::Error) -> ScoutError {
    if e.is_timeout() {
        ScoutError::Timeout(url.to_string())
    } else if let Some(status) = e.status() {
        ScoutError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        ScoutError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_includes_scheme_host_and_port() {
        let url = Url::parse("https://acme.de:8443/kontakt?x=1").unwrap();
        assert_eq!(origin_of(&url), "https://acme.de:8443");

        let url = Url::parse("http://acme.de/a").unwrap();
        assert_eq!(origin_of(&url), "http://acme.de");
    }

    #[tokio::test]
    async fn rate_limiter_spaces_out_same_origin_slots() {
        let fetcher = Fetcher::new(
            "ContactScout/1.0",
            Duration::from_secs(5),
            Duration::from_millis(200),
        )
        .unwrap();

        let start = Instant::now();
        fetcher.wait_for_slot("https://acme.de").await;
        fetcher.wait_for_slot("https://acme.de").await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(200),
            "second slot came too early: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn rate_limiter_does_not_couple_origins() {
        let fetcher = Fetcher::new(
            "ContactScout/1.0",
            Duration::from_secs(5),
            Duration::from_millis(500),
        )
        .unwrap();

        let start = Instant::now();
        fetcher.wait_for_slot("https://acme.de").await;
        fetcher.wait_for_slot("https://other.example").await;
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(400),
            "different origins should not wait on each other: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_any_io() {
        let fetcher = Fetcher::new(
            "ContactScout/1.0",
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .unwrap();
        let ctx = DiscoveryContext::for_url("https://acme.de").unwrap();

        let err = fetcher.fetch("::not-a-url::", &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_url");
    }
}
