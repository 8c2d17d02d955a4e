use crate::domain::ports::ResponseCache;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 行程內的 TTL 快取，供本機執行與測試使用
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>,
}

/// `None` 表示永不過期（TTL 超出 `Instant` 可表示的範圍）
fn is_live(expires_at: &Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |at| at > now)
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some((value, expires_at)) if is_live(expires_at, Instant::now()) => {
                return Ok(Some(value.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }

        // 過期項目在讀取時移除
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        // 寫入時清掉所有過期項目，避免不再被讀取的 key 累積
        entries.retain(|_, (_, expires_at)| is_live(expires_at, now));
        entries.insert(key.to_string(), (value.to_string(), now.checked_add(ttl)));
        Ok(())
    }
}

/// 永遠未命中的快取
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ResponseCache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }
}
