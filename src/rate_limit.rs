//! Best-effort, per-process request limiter. Counts live in memory only, so
//! every server instance enforces its own budget.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Prune expired windows once the map holds this many keys.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per key inside one window.
    pub max_requests: u32,
    #[serde(with = "crate::config::duration_serde")]
    pub window: Duration,
    /// How much of the bearer token joins the IP in the key. 0 keys by IP only.
    pub token_prefix_len: usize,
    /// Token budgets one IP may draw on per window. Bounds what an IP gains by
    /// sending made-up tokens to `max_requests * max_tokens_per_ip`.
    pub max_tokens_per_ip: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window: Duration::from_secs(60),
            token_prefix_len: 16,
            max_tokens_per_ip: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, ip: Option<IpAddr>, bearer_token: Option<&str>) -> RateLimitDecision {
        self.check_at(ip, bearer_token, Instant::now())
    }

    /// Counts one request from `ip`. Requests with a bearer token also count
    /// against the IP's aggregate budget, and are limited once either is spent.
    pub fn check_at(
        &self,
        ip: Option<IpAddr>,
        bearer_token: Option<&str>,
        now: Instant,
    ) -> RateLimitDecision {
        let key = self.key_for(ip, bearer_token);
        let ip_key = ip_key(ip);

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() >= PRUNE_THRESHOLD {
            let window = self.config.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        if key != ip_key {
            let aggregate = self
                .config
                .max_requests
                .saturating_mul(self.config.max_tokens_per_ip.max(1));
            let decision = self.count(&mut windows, &format!("{ip_key}:*"), aggregate, now);
            if let RateLimitDecision::Limited { .. } = decision {
                return decision;
            }
        }
        self.count(&mut windows, &key, self.config.max_requests, now)
    }

    /// The first request opens a window; once the window has elapsed the next
    /// request starts a fresh one.
    fn count(
        &self,
        windows: &mut HashMap<String, Window>,
        key: &str,
        limit: u32,
        now: Instant,
    ) -> RateLimitDecision {
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.config.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > limit {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(entry.started));
            tracing::debug!(key, count = entry.count, "Rate limit exceeded");
            RateLimitDecision::Limited { retry_after }
        } else {
            RateLimitDecision::Allowed {
                remaining: limit - entry.count,
            }
        }
    }

    /// Builds the limiter key from the client address and, when configured, a
    /// prefix of the bearer token so that users behind one NAT get separate budgets.
    pub fn key_for(&self, ip: Option<IpAddr>, bearer_token: Option<&str>) -> String {
        let ip = ip_key(ip);
        let prefix: String = bearer_token
            .map(|token| token.chars().take(self.config.token_prefix_len).collect())
            .unwrap_or_default();
        if prefix.is_empty() {
            ip
        } else {
            format!("{ip}:{prefix}")
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

fn ip_key(ip: Option<IpAddr>) -> String {
    ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}
