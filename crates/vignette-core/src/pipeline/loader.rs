//! The loader task: one per request, driving resolve → decode →
//! transform → cache → deliver.
//!
//! Cancellation is checked at every phase boundary (and inside the
//! transform chain between per-frame steps). Gate permits and
//! intermediate buffers are scoped, so failure and cancellation release
//! them on the way out; a cancelled task never inserts into the cache.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::TargetDispatcher;
use crate::error::{LoadError, LoadResult};
use crate::gate::DECODE_GATE;
use crate::pipeline::dedup::{self, Admission, TaskOutcome};
use crate::pipeline::decode::DecodeOptions;
use crate::pipeline::resolve::ResolvedData;
use crate::pipeline::transform::{self, TransformContext};
use crate::request::{CacheKey, LoadRequest};
use crate::types::DecodedImage;
use crate::PipelineShared;

/// Lifecycle states of a loader task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Resolving,
    Decoding,
    Transforming,
    Caching,
    Delivering,
    Completed,
    Cancelled,
    Failed,
}

/// Checkpoint helper: observe cancellation between phases.
fn checkpoint(cancel: &CancellationToken) -> LoadResult<()> {
    if cancel.is_cancelled() {
        Err(LoadError::Cancelled)
    } else {
        Ok(())
    }
}

/// One in-flight load.
pub(crate) struct LoaderTask {
    shared: Arc<PipelineShared>,
    request: LoadRequest,
    state: TaskState,
}

impl LoaderTask {
    pub(crate) fn new(shared: Arc<PipelineShared>, request: LoadRequest) -> Self {
        Self {
            shared,
            request,
            state: TaskState::Pending,
        }
    }

    fn advance(&mut self, next: TaskState) {
        tracing::trace!(from = ?self.state, to = ?next, "loader state");
        self.state = next;
    }

    /// Drive the request to a terminal state, delivering through
    /// `dispatcher` on success.
    pub(crate) async fn run(
        mut self,
        dispatcher: Option<&Arc<dyn TargetDispatcher>>,
    ) -> TaskOutcome {
        let cancel = self.request.cancellation_token();
        let key = self
            .request
            .cache_key(self.shared.config.decode.allow_upscale);
        tracing::debug!(
            key = %key,
            source = %self.request.source(),
            priority = ?self.request.priority,
            "load requested"
        );

        if cancel.is_cancelled() {
            self.advance(TaskState::Cancelled);
            return Err(LoadError::Cancelled);
        }

        let admission = self.shared.registry.admit(&key, &self.shared.cache);
        let outcome = match admission {
            Admission::Hit(image) => {
                tracing::debug!(key = %key, "memory cache hit");
                Ok(image)
            }
            Admission::Waiter(receiver) => {
                tracing::debug!(key = %key, "joining in-flight load");
                dedup::wait_for_owner(receiver, &cancel).await
            }
            Admission::Owner(owner) => {
                let outcome = self.execute(&key, &cancel).await;
                if let Ok(image) = &outcome {
                    self.advance(TaskState::Caching);
                    self.shared.cache.put(key.clone(), image.clone());
                }
                // Fan out to waiters before delivering to our own target.
                owner.complete(outcome.clone());
                outcome
            }
        };

        match outcome {
            Ok(image) => {
                if checkpoint(&cancel).is_err() {
                    self.advance(TaskState::Cancelled);
                    return Err(LoadError::Cancelled);
                }
                self.advance(TaskState::Delivering);
                if let Some(dispatcher) = dispatcher {
                    dispatcher.deliver(&image, image.is_animated()).await;
                }
                self.advance(TaskState::Completed);
                Ok(image)
            }
            Err(error) => {
                if error.is_cancelled() {
                    self.advance(TaskState::Cancelled);
                } else {
                    self.advance(TaskState::Failed);
                    tracing::debug!(key = %key, error = %error, "load failed");
                }
                Err(error)
            }
        }
    }

    /// The owner path: resolve, decode, transform.
    async fn execute(&mut self, key: &CacheKey, cancel: &CancellationToken) -> TaskOutcome {
        self.advance(TaskState::Resolving);
        let resolved = self.shared.resolver.fetch(self.request.source()).await?;
        checkpoint(cancel)?;

        self.advance(TaskState::Decoding);
        let decoded = self.decode_phase(resolved, cancel).await?;
        checkpoint(cancel)?;

        let decoded = if self.request.transformations.is_empty() {
            decoded
        } else {
            self.advance(TaskState::Transforming);
            self.transform_phase(decoded, key, cancel).await?
        };
        checkpoint(cancel)?;

        Ok(Arc::new(decoded))
    }

    /// Decode under the decode gate (plus the codec's auxiliary gate when
    /// it needs serialized access). Permits live for this scope only.
    async fn decode_phase(
        &self,
        resolved: ResolvedData,
        cancel: &CancellationToken,
    ) -> LoadResult<DecodedImage> {
        let decoder = self.shared.decoder.clone();
        let aux_gate = decoder
            .auxiliary_gate(&resolved.bytes)
            .map(|name| self.shared.gates.gate(name));

        let _aux_permit = match &aux_gate {
            Some(gate) => Some(gate.acquire().await),
            None => None,
        };
        let _permit = self.shared.gates.gate(DECODE_GATE).acquire().await;
        checkpoint(cancel)?;

        let source = self.request.source().identity();
        let options = DecodeOptions {
            max_width: self.request.max_width,
            max_height: self.request.max_height,
            allow_upscale: self
                .request
                .effective_allow_upscale(self.shared.config.decode.allow_upscale),
        };
        let bytes = resolved.bytes;

        tokio::task::spawn_blocking(move || decoder.decode(&bytes, &source, &options))
            .await
            .map_err(|e| LoadError::Decode {
                origin: self.request.source().identity(),
                message: format!("decode task join error: {e}"),
            })?
    }

    /// Apply the transformation chain under the decode gate; applying
    /// transformations is CPU and memory intensive.
    async fn transform_phase(
        &self,
        image: DecodedImage,
        key: &CacheKey,
        cancel: &CancellationToken,
    ) -> LoadResult<DecodedImage> {
        let _permit = self.shared.gates.gate(DECODE_GATE).acquire().await;
        checkpoint(cancel)?;

        let transformations = self.request.transformations.clone();
        let source = self.request.source().identity();
        let source_kind = self.request.source().kind();
        let is_placeholder = self.request.is_placeholder;
        let key = key.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let ctx = TransformContext {
                source: &source,
                source_kind,
                is_placeholder,
                cache_key: &key,
            };
            transform::apply_chain(image, &transformations, &ctx, &cancel)
        })
        .await
        .map_err(|e| LoadError::Transform {
            key: "unknown".to_string(),
            message: format!("transform task join error: {e}"),
        })?
    }
}
