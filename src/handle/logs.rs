//! Resumable forwarding of container output.

use std::io;
use std::time::SystemTime;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio_util::sync::CancellationToken;

use super::TaskHandle;
use crate::config::HandleConfig;
use crate::error::ResultOkLogExt;
use crate::runtime::ContainerRuntime;

/// Opens the stdout and stderr FIFOs of `config` for non-blocking writes.
///
/// Fails if a path is not a FIFO or nobody holds its read side open.
pub fn open_fifo_sinks(config: &HandleConfig) -> io::Result<(pipe::Sender, pipe::Sender)> {
    let options = pipe::OpenOptions::new();
    let stdout = options.open_sender(&config.stdout_path).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("failed to open `{}`: {}", config.stdout_path.display(), err),
        )
    })?;
    let stderr = options.open_sender(&config.stderr_path).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("failed to open `{}`: {}", config.stderr_path.display(), err),
        )
    })?;
    Ok((stdout, stderr))
}

impl TaskHandle {
    /// Forwards the container output into `stdout` and `stderr` until the stream ends
    /// cleanly or `token` is cancelled.
    ///
    /// After an interruption the log pointer is moved to the current time and the
    /// stream is reopened from there once `log_retry_delay` passed. Output emitted
    /// around the interruption may be lost or duplicated. Both sinks are shut down on
    /// return.
    pub async fn run_log_streamer<R, W>(
        &self,
        runtime: &R,
        mut stdout: W,
        mut stderr: W,
        token: &CancellationToken,
    ) where
        R: ContainerRuntime,
        W: AsyncWrite + Unpin + Send,
    {
        log::debug!("Starting log streamer for `{}`", self.container_id);
        let retry_delay = self.settings.log_retry_delay;
        let mut since = self.log_pointer();
        let mut first_attempt = true;

        loop {
            if !first_attempt {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
            first_attempt = false;

            let streamed = tokio::select! {
                _ = token.cancelled() => break,
                streamed = runtime.container_logs(&self.container_id, since, &mut stdout, &mut stderr) => streamed,
            };
            match streamed {
                Ok(()) => {
                    log::trace!("Log stream of `{}` ended", self.container_id);
                    break;
                }
                Err(err) => {
                    log::warn!(
                        "Log stream of `{}` was interrupted: {}",
                        self.container_id,
                        err
                    );
                    since = self.advance_log_pointer(SystemTime::now());
                }
            }
        }

        stdout.shutdown().await.ok_log("failed to close stdout sink");
        stderr.shutdown().await.ok_log("failed to close stderr sink");
        log::debug!("Stopping log streamer for `{}`", self.container_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::container::ContainerID;
    use crate::handle::tests::{fast_settings, test_handle};
    use crate::runtime::Error;
    use crate::runtime::testing::ScriptedRuntime;

    fn sinks() -> ((DuplexStream, DuplexStream), (DuplexStream, DuplexStream)) {
        (tokio::io::duplex(4096), tokio::io::duplex(4096))
    }

    async fn read_all(mut reader: DuplexStream) -> String {
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_resumes_after_interruptions() {
        let handle = Arc::new(test_handle(fast_settings()));
        let runtime = Arc::new(ScriptedRuntime::new(ContainerID::new("c0ffee").unwrap()));
        for _ in 0..3 {
            runtime.push_logs(Err(Error::Request("stream reset".to_owned())));
        }
        runtime.push_logs(Ok(()));
        let started_at = handle.log_pointer();
        {
            let handle = Arc::clone(&handle);
            runtime.watch_log_cursor(move || handle.log_pointer());
        }

        let ((stdout_w, stdout_r), (stderr_w, stderr_r)) = sinks();
        handle
            .spawn_log_streamer(
                Arc::clone(&runtime),
                stdout_w,
                stderr_w,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = runtime.log_calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], started_at);
        assert!(calls.windows(2).all(|w| w[0] <= w[1]));
        assert!(calls[1] > started_at);
        assert_eq!(handle.log_pointer(), calls[3]);
        // every retry resumes from the cursor the previous interruption left behind
        let cursors = runtime.cursor_at_calls();
        assert_eq!(cursors.len(), 4);
        assert_eq!(cursors[0], started_at);
        for i in 0..3 {
            assert!(cursors[i + 1] >= cursors[i]);
            assert_eq!(calls[i + 1], cursors[i + 1]);
        }

        // sinks are closed, so the readers see EOF
        assert_eq!(read_all(stdout_r).await, "out\n".repeat(4));
        assert_eq!(read_all(stderr_r).await, "err\n".repeat(4));
    }

    #[tokio::test]
    async fn test_clean_end_does_not_touch_pointer() {
        let handle = Arc::new(test_handle(fast_settings()));
        let runtime = Arc::new(ScriptedRuntime::new(ContainerID::new("c0ffee").unwrap()));
        runtime.push_logs(Ok(()));
        let before = handle.log_pointer();

        let ((stdout_w, _stdout_r), (stderr_w, _stderr_r)) = sinks();
        handle
            .spawn_log_streamer(runtime, stdout_w, stderr_w, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.log_pointer(), before);
    }

    #[tokio::test]
    async fn test_cancel_while_streaming() {
        let handle = Arc::new(test_handle(fast_settings()));
        // nothing scripted: the stream never ends on its own
        let runtime = Arc::new(ScriptedRuntime::new(ContainerID::new("c0ffee").unwrap()));
        let token = CancellationToken::new();

        let ((stdout_w, stdout_r), (stderr_w, _stderr_r)) = sinks();
        let streamer =
            handle.spawn_log_streamer(Arc::clone(&runtime), stdout_w, stderr_w, token.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), streamer)
            .await
            .expect("log streamer ignored cancellation")
            .unwrap();
        assert_eq!(runtime.log_calls().len(), 1);
        assert_eq!(read_all(stdout_r).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_delay() {
        let mut settings = fast_settings();
        settings.log_retry_delay = Duration::from_secs(3600);
        let handle = Arc::new(test_handle(settings));
        let runtime = Arc::new(ScriptedRuntime::new(ContainerID::new("c0ffee").unwrap()));
        runtime.push_logs(Err(Error::Request("stream reset".to_owned())));
        runtime.push_logs(Ok(()));
        let token = CancellationToken::new();

        let ((stdout_w, _stdout_r), (stderr_w, _stderr_r)) = sinks();
        let streamer =
            handle.spawn_log_streamer(Arc::clone(&runtime), stdout_w, stderr_w, token.clone());
        tokio::time::sleep(Duration::from_secs(60)).await;
        token.cancel();
        streamer.await.unwrap();

        // the retry never happened
        assert_eq!(runtime.log_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_open_fifo_sinks_missing_path() {
        let handle = test_handle(fast_settings());
        let mut config = handle.config().clone();
        config.stdout_path = "/definitely/does/not/exist".into();
        let err = open_fifo_sinks(&config).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
