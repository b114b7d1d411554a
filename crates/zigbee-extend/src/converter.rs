//! Converter contracts
//!
//! Decoders turn inbound frames into partial state, encoders turn state
//! change requests into cluster writes and commands, configuration steps
//! prepare a device once at pairing or re-interview.

use crate::endpoint;
use crate::error::ExtendError;
use crate::extend::DefinitionMeta;
use crate::options::DeviceOptions;
use crate::store::{EntityKey, EphemeralStore};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use zigbee_core::{DeviceSession, Message, MessageKind};

/// Partial device state, keyed by exposed property
pub type State = serde_json::Map<String, Value>;

/// State published outside of the decode call path (timer fires)
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub ieee_address: String,
    pub endpoint: u8,
    pub state: State,
}

/// Broadcasts deferred state updates
#[derive(Debug, Clone)]
pub struct Publisher {
    event_tx: broadcast::Sender<StateUpdate>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self { event_tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.event_tx.subscribe()
    }

    pub fn publish(&self, update: StateUpdate) {
        let _ = self.event_tx.send(update);
    }
}

/// Everything a decoder may consult besides the frame itself
pub struct DecodeContext<'a> {
    pub session: &'a dyn DeviceSession,
    pub options: &'a DeviceOptions,
    pub meta: &'a DefinitionMeta,
    pub store: &'a Arc<EphemeralStore>,
    pub publisher: &'a Publisher,
}

impl DecodeContext<'_> {
    /// Endpoint name of the frame's source, or its id as a string
    #[must_use]
    pub fn endpoint_name(&self, msg: &Message) -> String {
        endpoint::endpoint_name(msg.endpoint, self.meta.endpoints.as_ref())
            .unwrap_or_else(|| msg.endpoint.to_string())
    }

    /// `key`, qualified with the source endpoint name on multi-endpoint devices
    #[must_use]
    pub fn postfix(&self, key: &str, msg: &Message) -> String {
        endpoint::postfix_with_endpoint_name(key, msg.endpoint, self.meta)
    }

    #[must_use]
    pub fn entity(&self, msg: &Message) -> EntityKey {
        match msg.group_id {
            Some(group) => EntityKey::Group(group),
            None => EntityKey::endpoint(&self.session.ieee_address(), msg.endpoint),
        }
    }
}

type DecodeFn = dyn Fn(&Message, &DecodeContext<'_>) -> Option<State> + Send + Sync;

/// Inbound decoder: a cluster, the frame kinds it accepts, and a synchronous
/// conversion to partial state. Returning `None` means "nothing to publish".
#[derive(Clone)]
pub struct Decoder {
    pub cluster: String,
    pub kinds: Vec<MessageKind>,
    convert: Arc<DecodeFn>,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("cluster", &self.cluster)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

impl Decoder {
    pub fn new<F>(cluster: &str, kinds: Vec<MessageKind>, convert: F) -> Self
    where
        F: Fn(&Message, &DecodeContext<'_>) -> Option<State> + Send + Sync + 'static,
    {
        Self {
            cluster: cluster.to_string(),
            kinds,
            convert: Arc::new(convert),
        }
    }

    /// Decoder for attribute reports and read responses
    pub fn attributes<F>(cluster: &str, convert: F) -> Self
    where
        F: Fn(&Message, &DecodeContext<'_>) -> Option<State> + Send + Sync + 'static,
    {
        Self::new(
            cluster,
            vec![MessageKind::AttributeReport, MessageKind::ReadResponse],
            convert,
        )
    }

    #[must_use]
    pub fn matches(&self, msg: &Message) -> bool {
        self.cluster == msg.cluster && self.kinds.contains(&msg.kind)
    }

    #[must_use]
    pub fn convert(&self, msg: &Message, ctx: &DecodeContext<'_>) -> Option<State> {
        (self.convert)(msg, ctx)
    }
}

/// Target of an outbound request
pub struct Entity<'a> {
    pub session: &'a dyn DeviceSession,
    pub endpoint: u8,
}

/// Request context for encoders
pub struct EncodeMeta<'a> {
    /// The full request, for encoders that combine several keys
    pub message: &'a State,
    /// Last published state of the device
    pub state: &'a State,
    /// Endpoint name parsed from the request key, if any
    pub endpoint_name: Option<&'a str>,
    pub options: &'a DeviceOptions,
    pub meta: &'a DefinitionMeta,
    pub store: &'a Arc<EphemeralStore>,
}

impl EncodeMeta<'_> {
    /// Request value for `key`, falling back to the endpoint-qualified key
    #[must_use]
    pub fn message_value(&self, key: &str) -> Option<&Value> {
        self.message.get(key).or_else(|| {
            self.endpoint_name
                .and_then(|name| self.message.get(&format!("{key}_{name}")))
        })
    }

    /// Current state value for `key`, endpoint-qualified when addressed by name
    #[must_use]
    pub fn state_value(&self, key: &str) -> Option<&Value> {
        match self.endpoint_name {
            Some(name) => self
                .state
                .get(&format!("{key}_{name}"))
                .or_else(|| self.state.get(key)),
            None => self.state.get(key),
        }
    }
}

/// Outbound encoder
#[async_trait]
pub trait Encode: Send + Sync {
    /// State keys this encoder handles
    fn keys(&self) -> &[String];

    fn supports_set(&self) -> bool {
        true
    }

    fn supports_get(&self) -> bool {
        false
    }

    /// Issue the write or command for `key`; returns the optimistic state echo
    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError>;

    /// Issue a read for `key`; the value arrives later through a decoder
    async fn convert_get(
        &self,
        _entity: &Entity<'_>,
        key: &str,
        _meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        Err(ExtendError::UnknownKey(key.to_string()))
    }
}

/// One configuration routine
#[async_trait]
pub trait Configure: Send + Sync {
    /// Short name for logs
    fn name(&self) -> String;

    async fn configure(
        &self,
        session: &dyn DeviceSession,
        meta: &DefinitionMeta,
    ) -> Result<(), ExtendError>;
}

/// Build a one-key state delta
#[must_use]
pub fn state_of(key: impl Into<String>, value: impl Into<Value>) -> State {
    let mut state = State::new();
    state.insert(key.into(), value.into());
    state
}
