//! Device definition runtime
//!
//! A [`Definition`] is the concatenation of every builder's output for one
//! device model. It routes inbound frames to decoders, state change requests
//! to encoders, and runs configuration steps in declaration order.

use crate::converter::{Configure, DecodeContext, Decoder, Encode, EncodeMeta, Entity, Publisher, State};
use crate::endpoint::{default_endpoint, split_endpoint_key};
use crate::error::ExtendError;
use crate::expose::{access, Expose};
use crate::extend::{DefinitionMeta, Extend};
use crate::options::DeviceOptions;
use crate::store::EphemeralStore;
use std::collections::HashSet;
use std::sync::Arc;
use zigbee_core::{DeviceSession, Message};

/// Process-wide collaborators of stateful converters
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    pub store: Arc<EphemeralStore>,
    pub publisher: Publisher,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A composed device definition
pub struct Definition {
    pub zigbee_model: Vec<String>,
    pub model: String,
    pub vendor: String,
    pub description: String,
    exposes: Vec<Expose>,
    decoders: Vec<Decoder>,
    encoders: Vec<Arc<dyn Encode>>,
    configure: Vec<Arc<dyn Configure>>,
    options: Vec<Expose>,
    meta: DefinitionMeta,
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("model", &self.model)
            .field("vendor", &self.vendor)
            .field("exposes", &self.expose_names())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Definition {
    /// Compose a definition from builder outputs, in order
    #[must_use]
    pub fn from_extends(
        zigbee_model: Vec<String>,
        model: &str,
        vendor: &str,
        description: &str,
        extends: Vec<Extend>,
    ) -> Self {
        let merged: Extend = extends.into_iter().collect();
        Self {
            zigbee_model,
            model: model.to_string(),
            vendor: vendor.to_string(),
            description: description.to_string(),
            exposes: merged.exposes,
            decoders: merged.decoders,
            encoders: merged.encoders,
            configure: merged.configure,
            options: merged.options,
            meta: merged.meta,
        }
    }

    #[must_use]
    pub fn exposes(&self) -> &[Expose] {
        &self.exposes
    }

    #[must_use]
    pub fn options(&self) -> &[Expose] {
        &self.options
    }

    #[must_use]
    pub fn meta(&self) -> &DefinitionMeta {
        &self.meta
    }

    /// Every leaf state key the definition publishes
    #[must_use]
    pub fn expose_names(&self) -> Vec<String> {
        self.exposes.iter().flat_map(Expose::properties).collect()
    }

    /// Run every matching decoder; later decoders override earlier keys
    #[must_use]
    pub fn decode(
        &self,
        msg: &Message,
        session: &dyn DeviceSession,
        options: &DeviceOptions,
        runtime: &Runtime,
    ) -> State {
        let ctx = DecodeContext {
            session,
            options,
            meta: &self.meta,
            store: &runtime.store,
            publisher: &runtime.publisher,
        };
        let mut state = State::new();
        for decoder in self.decoders.iter().filter(|d| d.matches(msg)) {
            if let Some(delta) = decoder.convert(msg, &ctx) {
                state.extend(delta);
            }
        }
        if state.is_empty() {
            tracing::trace!(
                "No state from {} {:?} on {} endpoint {}",
                msg.cluster,
                msg.kind,
                session.ieee_address(),
                msg.endpoint
            );
        }
        state
    }

    fn resolve_endpoint(
        &self,
        session: &dyn DeviceSession,
        endpoint_name: Option<&str>,
    ) -> Result<u8, ExtendError> {
        match endpoint_name {
            Some(name) => self
                .meta
                .endpoints
                .as_ref()
                .and_then(|map| map.get(name))
                .copied()
                .ok_or_else(|| ExtendError::UnknownEndpoint(name.to_string())),
            None => default_endpoint(session),
        }
    }

    /// Apply a state change request.
    ///
    /// Each key is routed to the first set-capable encoder that handles it;
    /// an encoder that already handled one key of the request for the same
    /// endpoint is not invoked again. Keys without an encoder are skipped
    /// with a warning. Returns the merged optimistic echo, with keys
    /// qualified by endpoint name when the request addressed one.
    pub async fn set(
        &self,
        session: &dyn DeviceSession,
        options: &DeviceOptions,
        runtime: &Runtime,
        request: &State,
        current: &State,
    ) -> Result<State, ExtendError> {
        let mut echo = State::new();
        let mut used: HashSet<(usize, Option<String>)> = HashSet::new();

        for (key, value) in request {
            let (base, endpoint_name) = split_endpoint_key(key, self.meta.endpoints.as_ref());
            let Some((index, encoder)) = self
                .encoders
                .iter()
                .enumerate()
                .find(|(_, e)| e.supports_set() && e.keys().iter().any(|k| *k == base))
            else {
                tracing::warn!("No converter available for '{}' on {}", key, session.ieee_address());
                continue;
            };
            if !used.insert((index, endpoint_name.clone())) {
                continue;
            }

            let endpoint = self.resolve_endpoint(session, endpoint_name.as_deref())?;
            let entity = Entity { session, endpoint };
            let meta = EncodeMeta {
                message: request,
                state: current,
                endpoint_name: endpoint_name.as_deref(),
                options,
                meta: &self.meta,
                store: &runtime.store,
            };
            tracing::debug!(
                "Publishing '{}' = {} to {} endpoint {}",
                base,
                value,
                session.ieee_address(),
                endpoint
            );

            if let Some(delta) = encoder.convert_set(&entity, &base, value, &meta).await? {
                for (k, v) in delta {
                    let k = match &endpoint_name {
                        Some(name) => format!("{k}_{name}"),
                        None => k,
                    };
                    echo.insert(k, v);
                }
            }
        }
        Ok(echo)
    }

    /// Issue reads for the given keys; values arrive through `decode`
    pub async fn get(
        &self,
        session: &dyn DeviceSession,
        options: &DeviceOptions,
        runtime: &Runtime,
        keys: &[String],
    ) -> Result<(), ExtendError> {
        let empty = State::new();
        let mut used: HashSet<(usize, Option<String>)> = HashSet::new();

        for key in keys {
            let (base, endpoint_name) = split_endpoint_key(key, self.meta.endpoints.as_ref());
            let (index, encoder) = self
                .encoders
                .iter()
                .enumerate()
                .find(|(_, e)| e.supports_get() && e.keys().iter().any(|k| *k == base))
                .ok_or_else(|| ExtendError::UnknownKey(key.clone()))?;
            if !used.insert((index, endpoint_name.clone())) {
                continue;
            }

            let endpoint = self.resolve_endpoint(session, endpoint_name.as_deref())?;
            let entity = Entity { session, endpoint };
            let meta = EncodeMeta {
                message: &empty,
                state: &empty,
                endpoint_name: endpoint_name.as_deref(),
                options,
                meta: &self.meta,
                store: &runtime.store,
            };
            encoder.convert_get(&entity, &base, &meta).await?;
        }
        Ok(())
    }

    /// Run configuration steps in order, stopping at the first failure
    pub async fn configure(&self, session: &dyn DeviceSession) -> Result<(), ExtendError> {
        for step in &self.configure {
            step.configure(session, &self.meta).await.map_err(|e| {
                tracing::warn!(
                    "Configuration step '{}' failed for {}: {}",
                    step.name(),
                    session.ieee_address(),
                    e
                );
                e
            })?;
        }
        tracing::info!("Configured {} ({})", session.ieee_address(), self.model);
        Ok(())
    }

    /// Run every configuration step even if some fail; returns the failures.
    /// Steps that succeeded stay in effect.
    pub async fn configure_all(&self, session: &dyn DeviceSession) -> Vec<(String, ExtendError)> {
        let mut failures = Vec::new();
        for step in &self.configure {
            if let Err(e) = step.configure(session, &self.meta).await {
                tracing::warn!(
                    "Configuration step '{}' failed for {}: {}",
                    step.name(),
                    session.ieee_address(),
                    e
                );
                failures.push((step.name(), e));
            }
        }
        if failures.is_empty() {
            tracing::info!("Configured {} ({})", session.ieee_address(), self.model);
        } else {
            tracing::info!(
                "Configured {} ({}) with {} failed step(s)",
                session.ieee_address(),
                self.model,
                failures.len()
            );
        }
        failures
    }

    /// Whether an exposed leaf can be read on request
    #[must_use]
    pub fn is_gettable(&self, property: &str) -> bool {
        fn find<'a>(exposes: &'a [Expose], property: &str) -> Option<&'a Expose> {
            exposes.iter().find_map(|e| {
                if e.property == property && e.features().is_empty() {
                    Some(e)
                } else {
                    find(e.features(), property)
                }
            })
        }
        find(&self.exposes, property).is_some_and(|e| e.access & access::GET != 0)
    }
}
