//! Configuration for listfile readers

use crate::error::{ListfileError, ListfileResult};
use serde::{Deserialize, Serialize};

/// Size of one page of a name source held in memory
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// Name buffer capacity, including the terminator slot (`MAX_PATH`)
pub const DEFAULT_MAX_NAME_LENGTH: usize = 260;

/// Configuration for reading name sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListfileConfig {
    /// Bytes loaded from the stream per page
    pub page_size: usize,

    /// Name buffer capacity; names keep at most `max_name_length - 1` bytes
    pub max_name_length: usize,
}

impl Default for ListfileConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

impl ListfileConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the name buffer capacity
    #[must_use]
    pub const fn with_max_name_length(mut self, max_name_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the page size is zero or the name buffer
    /// cannot hold at least one byte besides the terminator.
    pub fn validate(&self) -> ListfileResult<()> {
        if self.page_size == 0 {
            return Err(ListfileError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.max_name_length < 2 {
            return Err(ListfileError::InvalidConfig(format!(
                "max_name_length must be at least 2, got {}",
                self.max_name_length
            )));
        }
        Ok(())
    }
}
