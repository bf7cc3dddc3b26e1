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

//! Key layout shared by every process talking to the store.

pub fn device_status(device_id: &str) -> String {
    format!("device:{device_id}:status")
}

pub fn device_lock(device_id: &str) -> String {
    format!("lock:device:{device_id}")
}

pub fn poll_result(device_id: &str) -> String {
    format!("device:{device_id}:poll")
}
