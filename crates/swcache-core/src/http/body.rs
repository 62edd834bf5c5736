use crate::error::{CacheError, Result};

/// A body stream that can be read exactly once.
#[derive(Debug, Default)]
pub struct Body {
    bytes: Option<Vec<u8>>,
}

impl Body {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Some(bytes.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_used(&self) -> bool {
        self.bytes.is_none()
    }

    /// Consume the body. A second call fails.
    pub fn take(&mut self) -> Result<Vec<u8>> {
        self.bytes.take().ok_or(CacheError::BodyConsumed)
    }

    /// Produce an independent unread copy, leaving this body unread as well.
    pub fn duplicate(&self) -> Result<Body> {
        match &self.bytes {
            Some(bytes) => Ok(Body::new(bytes.clone())),
            None => Err(CacheError::BodyConsumed),
        }
    }
}
