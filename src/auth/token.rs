//! Opaque bearer token cache (spec component D).
//!
//! Grounded in `pkg/server/auth.go`'s package-level `_tokens` map and
//! `pkg/server/tokens.go`'s sibling implementation. Spec.md §9 calls for
//! replacing the source's global mutable map with a value threaded through
//! handlers; here that's `Arc<TokenCache>` held by `AppState`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::Rights;

/// Idle timeout before a token is evicted. Matches the source's
/// `tokenMaxAge = 3600000` (milliseconds).
pub const TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub issued_at: SystemTime,
    pub last_used_at: SystemTime,
    pub admin: bool,
    pub images_pull: Vec<String>,
    pub images_push: Vec<String>,
}

impl TokenRecord {
    pub fn allows_pull(&self, image: &str) -> bool {
        self.admin || self.images_pull.iter().any(|p| crate::wildcard::matches(image, p))
    }

    pub fn allows_push(&self, image: &str) -> bool {
        self.admin || self.images_push.iter().any(|p| crate::wildcard::matches(image, p))
    }
}

pub struct TokenCache {
    tokens: Mutex<HashMap<String, TokenRecord>>,
}

impl TokenCache {
    pub fn new() -> Self {
        TokenCache {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a new token, sweeping expired entries first. Rights are either a
    /// single image's `Rights` (scope present) or account-wide rights
    /// expressed as a single-entry `*`-or-named pull/push list — the caller
    /// decides which lists to pass in.
    pub async fn issue(&self, admin: bool, images_pull: Vec<String>, images_push: Vec<String>) -> String {
        let now = SystemTime::now();
        let id = format!("DockerToken.{}", Uuid::new_v4());

        let mut tokens = self.tokens.lock().await;
        tokens.retain(|_, record| {
            now.duration_since(record.last_used_at)
                .map(|age| age <= TOKEN_TTL)
                .unwrap_or(true)
        });
        tokens.insert(
            id.clone(),
            TokenRecord {
                issued_at: now,
                last_used_at: now,
                admin,
                images_pull,
                images_push,
            },
        );
        id
    }

    /// Looks up `token`. Returns `None` (and evicts) if it's expired or
    /// unknown; otherwise bumps `last_used_at` and returns a snapshot.
    pub async fn touch(&self, token: &str) -> Option<TokenRecord> {
        let now = SystemTime::now();
        let mut tokens = self.tokens.lock().await;
        let record = tokens.get_mut(token)?;
        if now
            .duration_since(record.last_used_at)
            .map(|age| age > TOKEN_TTL)
            .unwrap_or(false)
        {
            tokens.remove(token);
            return None;
        }
        record.last_used_at = now;
        Some(record.clone())
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience conversion for a single-image policy lookup: a `Rights` value
/// becomes at-most-one-element pull/push lists naming that image.
pub fn rights_to_lists(image: &str, rights: Rights) -> (Vec<String>, Vec<String>) {
    let pull = if rights.pull { vec![image.to_string()] } else { vec![] };
    let push = if rights.push { vec![image.to_string()] } else { vec![] };
    (pull, push)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issue_and_touch_round_trip() {
        let cache = TokenCache::new();
        let id = cache.issue(false, vec!["alpine".into()], vec![]).await;
        let record = cache.touch(&id).await.expect("token should be present");
        assert!(record.allows_pull("alpine"));
        assert!(!record.allows_push("alpine"));
    }

    #[tokio::test]
    async fn unknown_token_is_none() {
        let cache = TokenCache::new();
        assert!(cache.touch("DockerToken.nope").await.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_evicted_on_touch() {
        let cache = TokenCache::new();
        let id = cache.issue(false, vec!["*".into()], vec![]).await;
        {
            let mut tokens = cache.tokens.lock().await;
            let record = tokens.get_mut(&id).unwrap();
            record.last_used_at = SystemTime::now() - TOKEN_TTL - Duration::from_secs(1);
        }
        assert!(cache.touch(&id).await.is_none());
        assert_eq!(cache.len().await, 0);
    }
}
