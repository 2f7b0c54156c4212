use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Number of characters shown by [`ContainerID::short`].
const SHORT_ID_LEN: usize = 12;

/// A validated container identifier as reported by the container runtime.
///
/// # Examples
///
/// ```
/// # use creo_supervisor::container::ContainerID;
/// let container_id = ContainerID::new("3f4e1b2c9a0d8e7f6a5b4c3d2e1f0a9b").unwrap();
/// assert_eq!(container_id.short(), "3f4e1b2c9a0d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty, contains whitespace
    /// or exceeds [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_ID_MAX_LEN
            || src.bytes().any(|b| b.is_ascii_whitespace())
        {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the first twelve characters of the id, the way runtimes print it.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the orchestrator assigns to a task. One task maps to exactly one container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskID(Arc<str>);

impl TaskID {
    /// Creates a new `TaskID`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTaskID`] for an empty id.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() {
            return Err(Error::InvalidTaskID(src.to_owned()));
        }
        Ok(Self(src.into()))
    }
}

impl TryFrom<String> for TaskID {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskID> for String {
    fn from(value: TaskID) -> Self {
        value.0.as_ref().to_owned()
    }
}

impl AsRef<str> for TaskID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TaskID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_validation() {
        assert!(ContainerID::new("abc123").is_ok());
        assert!(ContainerID::new("").is_err());
        assert!(ContainerID::new("abc 123").is_err());
        assert!(ContainerID::new("a".repeat(CONTAINER_ID_MAX_LEN + 1)).is_err());
        assert!(ContainerID::new("a".repeat(CONTAINER_ID_MAX_LEN)).is_ok());
    }

    #[test]
    fn test_container_id_short() {
        let id = ContainerID::new("0123456789abcdef").unwrap();
        assert_eq!(id.short(), "0123456789ab");

        let id = ContainerID::new("web").unwrap();
        assert_eq!(id.short(), "web");
    }

    #[test]
    fn test_task_id_serde() {
        let id: TaskID = serde_json::from_str("\"task-1\"").unwrap();
        assert_eq!(id.as_ref(), "task-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"task-1\"");
        assert!(serde_json::from_str::<TaskID>("\"\"").is_err());
    }
}
