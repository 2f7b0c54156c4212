/// Errors reported by the container runtime.
///
/// `Clone` so the stats broadcaster can hand the same error to every listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no such container")]
    ContainerNotFound,
    #[error("container has wrong state")]
    ContainerWrongState,
    #[error("runtime request failed: {0}")]
    Request(String),
}

impl Error {
    /// Returns `true` if the error proves the container is no longer running.
    pub fn is_gone(&self) -> bool {
        matches!(self, Error::ContainerNotFound | Error::ContainerWrongState)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_gone() {
        assert!(Error::ContainerNotFound.is_gone());
        assert!(Error::ContainerWrongState.is_gone());
        assert!(!Error::Request("connection reset".to_owned()).is_gone());
    }
}
