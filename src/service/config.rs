// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;

use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<RecordsConfig> = OnceCell::new();
static DEFAULT_CONFIG: Lazy<RecordsConfig> = Lazy::new(RecordsConfig::default);

/// Returns the installed configuration, or the defaults when nothing was set.
/// The defaults are not installed, [`GLOBAL_CONFIG`] can still be set later.
pub fn global_config() -> &'static RecordsConfig {
    GLOBAL_CONFIG
        .get()
        .unwrap_or_else(|| Lazy::force(&DEFAULT_CONFIG))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    /// Largest batch (length field plus log overhead) the decoder accepts.
    pub max_batch_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            max_batch_size: 1024 * 1024 + 12,
        }
    }
}

/// Represents the configuration for the page pool backing decoded batches.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    /// Initial capacity of a freshly allocated page.
    pub page_size: usize,
    /// Number of released pages kept around for reuse.
    pub max_free_pages: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            page_size: 64 * 1024,
            max_free_pages: 64,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub general: GeneralConfig,
    pub pool: PoolConfig,
}

impl RecordsConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<RecordsConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let records_config: RecordsConfig = config.try_deserialize()?;
        if records_config.pool.page_size == 0 {
            return Err(AppError::InvalidValue(
                "pool.page_size must be positive".to_string(),
            ));
        }

        Ok(records_config)
    }
}
