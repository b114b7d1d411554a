//! Identify: make the device blink or beep so it can be found

use crate::converter::{Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{access, Category, Expose};
use crate::extend::Extend;
use crate::utils::to_number;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{AttributeMap, CommandOptions};

const DEFAULT_IDENTIFY_SECONDS: f64 = 3.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentifyArgs {
    /// Sleepy end devices only hear the command while awake
    pub is_sleepy: bool,
}

struct IdentifyEncoder {
    keys: Vec<String>,
}

#[async_trait]
impl Encode for IdentifyEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        _key: &str,
        _value: &Value,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let seconds = meta
            .options
            .extra("identify_timeout")
            .and_then(to_number)
            .unwrap_or(DEFAULT_IDENTIFY_SECONDS)
            .clamp(1.0, 30.0);
        let mut payload = AttributeMap::new();
        payload.insert("identifytime".to_string(), (seconds as u64).into());
        entity
            .session
            .command(entity.endpoint, name::IDENTIFY, "identify", payload, &CommandOptions::default())
            .await?;
        Ok(None)
    }
}

/// Identify capability
pub fn identify(args: IdentifyArgs) -> Result<Extend, ExtendError> {
    let description = if args.is_sleepy {
        "Initiate device identification. This device is asleep by default. \
         You may need to wake it up first before sending the identify command."
    } else {
        "Initiate device identification"
    };
    Ok(Extend::new()
        .with_expose(
            Expose::enumeration("identify", access::SET, vec!["identify".to_string()])
                .with_description(description)
                .with_category(Category::Config),
        )
        .with_encoder(Arc::new(IdentifyEncoder {
            keys: vec!["identify".to_string()],
        }))
        .with_option(
            Expose::numeric("identify_timeout", access::SET)
                .with_value_min(1.0)
                .with_value_max(30.0)
                .with_unit("s")
                .with_description("Sets the duration of the identification procedure in seconds (i.e., how long the device would flash). The value ranges from 1 to 30 seconds (default: 3)."),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, Runtime};
    use crate::options::DeviceOptions;
    use serde_json::json;
    use zigbee_core::cluster::id;
    use zigbee_core::memory::SessionCall;
    use zigbee_core::{Endpoint, MemoryDevice, ZigbeeDevice};

    async fn identify_time(options: &DeviceOptions) -> Value {
        let mut device = ZigbeeDevice::new([6, 0, 0, 0, 0, 0, 0, 0], 0x0006);
        device
            .endpoints
            .push(Endpoint::new(1, vec![id::BASIC, id::IDENTIFY], vec![]));
        let session = MemoryDevice::new(device);
        let definition = Definition::from_extends(
            vec![],
            "BULB",
            "Test",
            "",
            vec![identify(IdentifyArgs::default()).unwrap()],
        );
        let mut request = State::new();
        request.insert("identify".to_string(), json!("identify"));
        let echo = definition
            .set(&session, options, &Runtime::new(), &request, &State::new())
            .await
            .unwrap();
        assert!(echo.is_empty());
        match session.calls().pop() {
            Some(SessionCall::Command { cluster, command, payload, .. }) => {
                assert_eq!(cluster, "genIdentify");
                assert_eq!(command, "identify");
                payload["identifytime"].clone()
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identify_default_and_option() {
        assert_eq!(identify_time(&DeviceOptions::default()).await, json!(3));

        let mut options = DeviceOptions::default();
        options.extra.insert("identify_timeout".to_string(), json!(10));
        assert_eq!(identify_time(&options).await, json!(10));
    }
}
