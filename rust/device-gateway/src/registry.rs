/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::{Device, DeviceStatus, RegistryError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read side of the platform's device registry plus the status write-back.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError>;

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, RegistryError>;

    async fn record_status(&self, status: &DeviceStatus) -> Result<(), RegistryError>;
}

/// Registry backed by a fixed device list (configuration file or tests).
#[derive(Default)]
pub struct StaticRegistry {
    devices: RwLock<HashMap<String, Device>>,
    statuses: RwLock<HashMap<String, DeviceStatus>>,
}

impl StaticRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
            statuses: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, device: Device) {
        self.devices.write().insert(device.id.clone(), device);
    }

    pub fn remove(&self, device_id: &str) {
        self.devices.write().remove(device_id);
    }

    pub fn status(&self, device_id: &str) -> Option<DeviceStatus> {
        self.statuses.read().get(device_id).cloned()
    }
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn list_devices(&self) -> Result<Vec<Device>, RegistryError> {
        let mut devices: Vec<Device> = self.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }

    async fn get_device(&self, device_id: &str) -> Result<Option<Device>, RegistryError> {
        Ok(self.devices.read().get(device_id).cloned())
    }

    async fn record_status(&self, status: &DeviceStatus) -> Result<(), RegistryError> {
        self.statuses
            .write()
            .insert(status.device_id.clone(), status.clone());
        Ok(())
    }
}
