/// Logs and discards errors of operations whose failure must not stop a background loop.
pub trait ResultOkLogExt<T, E> {
    /// Returns the value on success, logs `context: error` as a warning otherwise.
    fn ok_log(self, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
