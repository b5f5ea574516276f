use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::partition::constants::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// A leaf holds strictly fewer records than this.
    pub threshold: usize,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub max_depth: usize,
    pub parallel_subtrees: bool,
    pub stop_on_error: bool,
    pub skip_unreadable_inputs: bool,
    pub clear_output: bool,
    pub input_extension: String,
    pub io_buffer_size_kb: usize,
    pub verbose: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            parallel_subtrees: false,
            stop_on_error: false,
            skip_unreadable_inputs: false,
            clear_output: false,
            input_extension: DEFAULT_INPUT_EXTENSION.to_string(),
            io_buffer_size_kb: DEFAULT_IO_BUFFER_SIZE_KB,
            verbose: false,
        }
    }
}

impl PartitionConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold < MIN_THRESHOLD {
            return Err(anyhow::anyhow!(
                "Threshold must be at least {}", MIN_THRESHOLD
            ));
        }

        if self.worker_count < MIN_WORKER_COUNT || self.worker_count > MAX_WORKER_COUNT {
            return Err(anyhow::anyhow!(
                "Worker count must be between {} and {}",
                MIN_WORKER_COUNT, MAX_WORKER_COUNT
            ));
        }

        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(anyhow::anyhow!(
                "Queue capacity must be at least {}", MIN_QUEUE_CAPACITY
            ));
        }

        if self.max_depth < MIN_MAX_DEPTH || self.max_depth > MAX_MAX_DEPTH {
            return Err(anyhow::anyhow!(
                "Max depth must be between {} and {}",
                MIN_MAX_DEPTH, MAX_MAX_DEPTH
            ));
        }

        if self.io_buffer_size_kb < MIN_IO_BUFFER_SIZE_KB
            || self.io_buffer_size_kb > MAX_IO_BUFFER_SIZE_KB {
            return Err(anyhow::anyhow!(
                "IO buffer size must be between {} and {} KB",
                MIN_IO_BUFFER_SIZE_KB, MAX_IO_BUFFER_SIZE_KB
            ));
        }

        if self.input_extension.is_empty() || self.input_extension.contains(['/', '\\', '.']) {
            return Err(anyhow::anyhow!(
                "Input extension must be a bare extension such as \"txt\", got {:?}",
                self.input_extension
            ));
        }

        Ok(())
    }

    pub fn io_buffer_size_bytes(&self) -> usize {
        self.io_buffer_size_kb * BYTES_PER_KB
    }

    /// Bytes of memory currently available to hold the loaded records.
    pub fn available_memory_bytes(&self) -> usize {
        use sysinfo::System;
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory() as usize
    }
}
