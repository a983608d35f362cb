use crate::error::SettingsError;
use std::{fmt, num::NonZeroUsize};

pub const BATCH_SIZE_PRESETS: &[usize] = &[100, 500, 1000, 2000, 5000];

/// Records per batch, restricted to the supported presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(NonZeroUsize);

impl BatchSize {
    pub fn get(&self) -> NonZeroUsize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(NonZeroUsize::new(1000).unwrap_or(NonZeroUsize::MIN))
    }
}

impl TryFrom<usize> for BatchSize {
    type Error = SettingsError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match NonZeroUsize::new(value) {
            Some(size) if BATCH_SIZE_PRESETS.contains(&value) => Ok(Self(size)),
            _ => Err(SettingsError::InvalidBatchSize {
                value,
                allowed: BATCH_SIZE_PRESETS,
            }),
        }
    }
}

impl fmt::Display for BatchSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
