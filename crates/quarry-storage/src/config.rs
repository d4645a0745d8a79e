//! Storage Configuration
//!
//! Knobs for block shaping and compaction. Defaults match the production
//! profile; tests shrink `block_max_rows` to exercise multi-block layouts
//! cheaply.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum rows per block (default: 8192)
    #[serde(default = "default_block_max_rows")]
    pub block_max_rows: u32,

    /// Maximum blocks per segment (default: 256)
    #[serde(default = "default_segment_max_blocks")]
    pub segment_max_blocks: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            block_max_rows: default_block_max_rows(),
            segment_max_blocks: default_segment_max_blocks(),
        }
    }
}

fn default_block_max_rows() -> u32 {
    8192
}

fn default_segment_max_blocks() -> u16 {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = StorageConfig::default();
        assert_eq!(cfg.block_max_rows, 8192);
        assert_eq!(cfg.segment_max_blocks, 256);
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let cfg: StorageConfig = serde_json::from_str(r#"{"block_max_rows": 16}"#).unwrap();
        assert_eq!(cfg.block_max_rows, 16);
        assert_eq!(cfg.segment_max_blocks, 256);
    }
}
