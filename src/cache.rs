//! In-flight de-duplication for pipeline stages and fetched resources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use sha2::Digest as _;

use crate::error::StageError;
use crate::fetch::Fetcher;

type StageFuture<T> = Shared<BoxFuture<'static, Result<T, StageError>>>;

/// Holds the pending run of one stage. Callers arriving while it runs share its
/// result; the slot empties once it settles so a failed stage can be retried.
pub struct StageSlot<T: Clone> {
    inflight: Mutex<Option<StageFuture<T>>>,
}

impl<T: Clone> Default for StageSlot<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }
}

impl<T> StageSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub async fn run<F>(&self, start: F) -> Result<T, StageError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, StageError>>,
    {
        let fut = {
            let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let fut = start().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = fut.clone().await;

        let mut slot = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|pending| pending.ptr_eq(&fut)) {
            *slot = None;
        }
        result
    }

    pub fn is_running(&self) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

type FetchFuture = Shared<BoxFuture<'static, Result<Arc<[u8]>, Arc<anyhow::Error>>>>;

#[derive(Default)]
struct CacheEntries {
    ready: HashMap<String, Arc<[u8]>>,
    inflight: HashMap<String, FetchFuture>,
}

/// Content-keyed byte cache with at most one fetch in flight per key.
/// Failures are handed to every waiter but never stored.
#[derive(Default)]
pub struct ResourceCache {
    entries: Mutex<CacheEntries>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        self.lock().ready.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.lock().ready.insert(key.into(), data.into());
    }

    /// Stores bytes that have no URL under their content fingerprint.
    pub fn insert_fingerprinted(&self, data: Vec<u8>) -> String {
        let key = fingerprint(&data);
        self.insert(key.clone(), data);
        key
    }

    pub async fn get_or_fetch(
        &self,
        url: &str,
        fetcher: Arc<dyn Fetcher>,
    ) -> anyhow::Result<Arc<[u8]>> {
        let fut = {
            let mut entries = self.lock();
            if let Some(data) = entries.ready.get(url) {
                return Ok(Arc::clone(data));
            }
            match entries.inflight.get(url) {
                Some(pending) => pending.clone(),
                None => {
                    let owned_url = url.to_owned();
                    let fut = async move {
                        fetcher
                            .fetch_binary(&owned_url)
                            .await
                            .map(Arc::<[u8]>::from)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    entries.inflight.insert(url.to_owned(), fut.clone());
                    fut
                }
            }
        };

        let result = fut.await;

        let mut entries = self.lock();
        entries.inflight.remove(url);
        match result {
            Ok(data) => {
                entries.ready.insert(url.to_owned(), Arc::clone(&data));
                Ok(data)
            }
            Err(err) => Err(anyhow::anyhow!("{err:#}")),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn fingerprint(data: &[u8]) -> String {
    let digest = sha2::Sha256::digest(data);
    format!("sha256:{}", hex::encode(digest))
}
