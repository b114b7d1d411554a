//! Registration of manufacturer-specific clusters on the device session

use crate::converter::Configure;
use crate::error::ExtendError;
use crate::extend::{DefinitionMeta, Extend};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use zigbee_core::{CustomCluster, DeviceSession};

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAddCustomClusterArgs {
    /// Name the cluster is addressed by, e.g. `manuSpecificTuya`
    pub cluster: String,
    pub definition: CustomCluster,
}

struct RegisterCluster {
    name: String,
    cluster: CustomCluster,
}

#[async_trait]
impl Configure for RegisterCluster {
    fn name(&self) -> String {
        format!("register {}", self.name)
    }

    async fn configure(
        &self,
        session: &dyn DeviceSession,
        _meta: &DefinitionMeta,
    ) -> Result<(), ExtendError> {
        if session.custom_clusters().contains_key(&self.name) {
            tracing::debug!(
                "Custom cluster '{}' already registered on {}",
                self.name,
                session.ieee_address()
            );
            return Ok(());
        }
        session.add_custom_cluster(&self.name, self.cluster.clone());
        session.save().await?;
        tracing::info!(
            "Registered custom cluster '{}' ({:#06x}) on {}",
            self.name,
            self.cluster.id,
            session.ieee_address()
        );
        Ok(())
    }
}

/// Ensure a vendor cluster is registered before anything addresses it by name.
/// Place it ahead of builders that use the cluster.
pub fn device_add_custom_cluster(args: DeviceAddCustomClusterArgs) -> Result<Extend, ExtendError> {
    if args.cluster.is_empty() {
        return Err(ExtendError::Construction(
            "custom cluster without a name".to_string(),
        ));
    }
    Ok(Extend::new().with_configure(Arc::new(RegisterCluster {
        name: args.cluster,
        cluster: args.definition,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;
    use std::collections::BTreeMap;
    use zigbee_core::cluster::CustomAttribute;
    use zigbee_core::memory::SessionCall;
    use zigbee_core::{DataType, Endpoint, MemoryDevice, ZigbeeDevice};

    fn vendor_cluster() -> CustomCluster {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "motorSpeed".to_string(),
            CustomAttribute {
                id: 0x0001,
                data_type: DataType::Uint8,
            },
        );
        CustomCluster {
            id: 0xfc00,
            manufacturer_code: Some(0x1234),
            attributes,
            commands: BTreeMap::new(),
            commands_response: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_registers_once() {
        let mut device = ZigbeeDevice::new([5, 0, 0, 0, 0, 0, 0, 0], 0x0005);
        device.endpoints.push(Endpoint::new(1, vec![0x0000], vec![]));
        let session = MemoryDevice::new(device);

        let extend = device_add_custom_cluster(DeviceAddCustomClusterArgs {
            cluster: "manuSpecificVendor".to_string(),
            definition: vendor_cluster(),
        })
        .unwrap();
        let definition = Definition::from_extends(vec![], "VENDOR", "Test", "", vec![extend]);

        definition.configure(&session).await.unwrap();
        definition.configure(&session).await.unwrap();

        let saves = session
            .calls()
            .into_iter()
            .filter(|call| *call == SessionCall::Save)
            .count();
        assert_eq!(saves, 1);
        assert_eq!(
            session.custom_clusters().get("manuSpecificVendor"),
            Some(&vendor_cluster())
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = device_add_custom_cluster(DeviceAddCustomClusterArgs {
            cluster: String::new(),
            definition: vendor_cluster(),
        });
        assert!(matches!(result, Err(ExtendError::Construction(_))));
    }
}
