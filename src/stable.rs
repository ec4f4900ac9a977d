//! Single-record, exact-key cache tier. §4.2.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::envelope::{self, Envelope};
use crate::error::CacheError;
use crate::options::Options;
use crate::remote::{RemoteStore, StoreError};
use crate::single_flight::SingleFlight;
use crate::tier::{validate_key, BoxLoader, LoaderOutcome, Tier};

/// Caches single-record lookups under their exact key. Negative
/// results are cached too, under [`Options::negative_ttl`].
pub struct StableTier<S, C> {
    store: Arc<S>,
    codec: C,
    options: Options,
    in_flight: SingleFlight,
}

impl<S, C> StableTier<S, C>
where
    S: RemoteStore + 'static,
    C: Codec + Clone + 'static,
{
    pub fn new(store: Arc<S>, codec: C, options: Options) -> Self {
        Self {
            store,
            codec,
            options,
            in_flight: SingleFlight::new(),
        }
    }

    pub(crate) fn effective_key(&self, key: &str) -> String {
        match &self.options.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{key}"),
            _ => key.to_string(),
        }
    }

    /// Typed `GetOrLoad`: `loader` returns `Ok(None)` for not-found,
    /// `Ok(Some(value))` on success, or `Err` to propagate a loader
    /// error (classified not-found via [`Options::is_not_found`] when
    /// it is [`CacheError::NotFound`]).
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Option<T>, CacheError>> + Send + 'static,
    {
        let codec = self.codec.clone();
        let codec_for_decode = self.codec.clone();
        let boxed: BoxLoader = Box::new(move || {
            Box::pin(async move {
                match loader().await? {
                    Some(value) => {
                        let payload = codec.encode(&value)?;
                        Ok(LoaderOutcome::Present(Bytes::from(payload)))
                    }
                    None => Ok(LoaderOutcome::NotFound),
                }
            })
        });

        let bytes = self.get_or_load_bytes(key, ttl, boxed).await?;
        codec_for_decode.decode(&bytes).map_err(CacheError::from)
    }

    /// Synchronous write-through; bypasses the load path entirely.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        validate_key(key)?;
        let payload = self.codec.encode(value)?;
        let envelope = envelope::encode_present(&payload);
        let effective_key = self.effective_key(key);
        let jittered = self.options.jittered_ttl(ttl);
        timeout(self.options.write_timeout, self.store.set(&effective_key, envelope, jittered))
            .await
            .map_err(|_| CacheError::Store(StoreError::Timeout))??;
        Ok(())
    }

    async fn probe(&self, effective_key: &str) -> Probe {
        match timeout(self.options.read_timeout, self.store.get(effective_key)).await {
            Ok(Ok(Some(bytes))) => match envelope::decode(&bytes) {
                Ok(Envelope::Present(payload)) => Probe::Present(payload),
                Ok(Envelope::Absent) => Probe::Absent,
                Err(_) => Probe::Corrupt,
            },
            Ok(Ok(None)) => Probe::Miss,
            Ok(Err(err)) => Probe::RemoteError(CacheError::from(err)),
            Err(_) => Probe::RemoteError(CacheError::Store(StoreError::Timeout)),
        }
    }
}

enum Probe {
    Present(Bytes),
    Absent,
    Miss,
    Corrupt,
    RemoteError(CacheError),
}

#[async_trait]
impl<S, C> Tier for StableTier<S, C>
where
    S: RemoteStore + 'static,
    C: Codec + Clone + 'static,
{
    async fn get_or_load_bytes(&self, key: &str, ttl: Duration, loader: BoxLoader) -> Result<Bytes, CacheError> {
        validate_key(key)?;
        let effective_key = self.effective_key(key);

        match self.probe(&effective_key).await {
            Probe::Present(payload) => return Ok(payload),
            Probe::Absent => return Err(CacheError::NotFound),
            Probe::Corrupt => {
                // Unlike a remote read error, a corrupt record is not
                // evidence the value is merely absent from this layer;
                // it is this layer's own data that failed to decode,
                // so it is reported and returned as-is rather than
                // papered over by falling through to the loader.
                self.options.report_error("stable", "get", key, &CacheError::Corrupt);
                return Err(CacheError::Corrupt);
            }
            Probe::Miss => {}
            Probe::RemoteError(err) => {
                // Degrade: call the loader directly, no retry, no
                // cache write. The typed wrapper above means no
                // marshal-then-unmarshal round-trip happens here;
                // the caller already gets `T` back at the edge.
                self.options.report_error("stable", "get", key, &err);
                return match loader().await? {
                    LoaderOutcome::Present(bytes) => Ok(bytes),
                    LoaderOutcome::NotFound => Err(CacheError::NotFound),
                };
            }
        }

        let jittered_ttl = self.options.jittered_ttl(ttl);
        let negative_ttl = self.options.negative_ttl;
        let read_timeout = self.options.read_timeout;
        let write_timeout = self.options.write_timeout;
        let is_not_found = self.options.is_not_found.clone();
        let store = self.store.clone();
        let effective_key_for_load = effective_key.clone();

        self.in_flight
            .run(&effective_key, move || async move {
                // Double-check: another caller may have filled the
                // slot while we waited to be elected leader.
                if let Ok(Ok(Some(bytes))) = timeout(read_timeout, store.get(&effective_key_for_load)).await {
                    return Ok(bytes);
                }

                match loader().await {
                    Ok(LoaderOutcome::Present(payload)) => {
                        let envelope = envelope::encode_present(&payload);
                        spawn_write(store.clone(), effective_key_for_load.clone(), envelope.clone(), jittered_ttl, write_timeout);
                        Ok(envelope)
                    }
                    Ok(LoaderOutcome::NotFound) => {
                        let envelope = envelope::encode_absent();
                        spawn_write(store.clone(), effective_key_for_load.clone(), envelope, negative_ttl, write_timeout);
                        Err(CacheError::NotFound)
                    }
                    Err(err) if is_not_found(&err) => {
                        let envelope = envelope::encode_absent();
                        spawn_write(store.clone(), effective_key_for_load.clone(), envelope, negative_ttl, write_timeout);
                        Err(err)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
    }

    async fn del(&self, keys: &[&str]) -> Result<(), CacheError> {
        let effective: Vec<String> = keys.iter().map(|k| self.effective_key(k)).collect();
        self.store.del(&effective).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stable"
    }
}

/// Fire-and-forget write on a detached task, bounded by `WriteTimeout`.
/// Runs on its own context, not the caller's: failures surface only
/// through tracing, never back to the caller that triggered the fill.
fn spawn_write<S>(store: Arc<S>, key: String, envelope: Bytes, ttl: Duration, write_timeout: Duration)
where
    S: RemoteStore + 'static,
{
    tokio::spawn(async move {
        match timeout(write_timeout, store.set(&key, envelope, ttl)).await {
            Ok(Ok(())) => debug!(key = %key, "async write committed"),
            Ok(Err(err)) => warn!(key = %key, error = %err, "async write failed"),
            Err(_) => warn!(key = %key, "async write timed out"),
        }
    });
}
