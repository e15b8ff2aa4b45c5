use kuzu::SystemConfig;

/// Tuning knobs for the embedded database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Buffer pool size in bytes (default: 256 MB; a single repository's
    /// symbol count fits comfortably).
    pub buffer_pool_size: Option<u64>,
    pub enable_compression: Option<bool>,
    pub read_only: Option<bool>,
    pub max_db_size: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: Some(256 * 1024 * 1024),
            enable_compression: Some(true),
            read_only: Some(false),
            max_db_size: None,
        }
    }
}

impl StoreConfig {
    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }

    pub fn with_buffer_size(mut self, size: u64) -> Self {
        self.buffer_pool_size = Some(size);
        self
    }

    pub fn to_system_config(&self) -> SystemConfig {
        let mut system_config = SystemConfig::default();
        if let Some(buffer_size) = self.buffer_pool_size {
            system_config = system_config.buffer_pool_size(buffer_size);
        }
        if let Some(compression) = self.enable_compression {
            system_config = system_config.enable_compression(compression);
        }
        if let Some(read_only) = self.read_only {
            system_config = system_config.read_only(read_only);
        }
        if let Some(max_size) = self.max_db_size {
            system_config = system_config.max_db_size(max_size);
        }
        system_config
    }
}
