use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: usize },

    #[error("Buffer is full (capacity {capacity})")]
    Full { capacity: usize },
}

impl BufferError {
    /// A full buffer drains on the next flush, so the write can be retried.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BufferError::Full { .. } => true,
            BufferError::InvalidCapacity { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(BufferError::Full { capacity: 10 }.is_recoverable());
        assert!(!BufferError::InvalidCapacity { capacity: 0 }.is_recoverable());
    }
}
