use crate::error::SettingsError;
use std::{fmt, num::NonZeroUsize};

pub const CONCURRENCY_PRESETS: &[usize] = &[1, 2, 5, 10];

/// Worker count and pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency(NonZeroUsize);

impl Concurrency {
    pub fn get(&self) -> NonZeroUsize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self(NonZeroUsize::MIN)
    }
}

impl TryFrom<usize> for Concurrency {
    type Error = SettingsError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match NonZeroUsize::new(value) {
            Some(n) if CONCURRENCY_PRESETS.contains(&value) => Ok(Self(n)),
            _ => Err(SettingsError::InvalidConcurrency {
                value,
                allowed: CONCURRENCY_PRESETS,
            }),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
