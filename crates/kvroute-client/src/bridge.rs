//! Blocking calls over the async execution core.
//!
//! Only the async form of each operation is implemented natively. The
//! blocking form runs it on a tokio runtime and parks the calling thread
//! until it completes, bounded by the same timeout the operation was given.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tracing::warn;

use kvroute_core::{ClientError, ClientResult, ErrorCode};

/// Runs futures to completion on behalf of blocking callers.
///
/// Cloning is cheap; clones share the runtime. Calls from different threads
/// proceed in parallel, each blocking only its own thread. The runtime doing
/// the work is always multi-threaded, so it keeps making progress while the
/// caller is parked.
#[derive(Clone)]
pub struct SyncBridge {
    handle: Handle,
    /// Present when the bridge owns its runtime
    runtime: Option<Arc<Runtime>>,
}

impl SyncBridge {
    /// Bridge backed by a dedicated multi-threaded runtime.
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .thread_name("kvroute-bridge")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Bridge onto an existing multi-threaded runtime.
    ///
    /// Current-thread handles are rejected: blocking on one only makes
    /// progress while another thread drives that runtime, so the wait could
    /// outlive its timeout.
    pub fn from_handle(handle: Handle) -> io::Result<Self> {
        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "sync bridge needs a multi-threaded runtime",
            ));
        }
        Ok(Self { handle, runtime: None })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Block until `fut` completes or `timeout` elapses.
    ///
    /// The future's own result is returned as-is; an elapsed wait becomes
    /// [`ErrorCode::Timeout`]. Callable from plain threads and from inside
    /// any tokio runtime. Inside a current-thread runtime the wait runs on a
    /// helper thread, since that runtime's only thread cannot block in place.
    pub fn wait<F, T>(&self, timeout: Duration, fut: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>> + Send,
        T: Send,
    {
        let bounded = async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "blocking call timed out");
                    Err(ClientError::new(ErrorCode::Timeout))
                }
            }
        };

        match Handle::try_current().map(|current| current.runtime_flavor()) {
            Err(_) => self.handle.block_on(bounded),
            Ok(RuntimeFlavor::CurrentThread) => std::thread::scope(|scope| {
                match scope.spawn(|| self.handle.block_on(bounded)).join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }),
            Ok(_) => tokio::task::block_in_place(|| self.handle.block_on(bounded)),
        }
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        // The last clone may be dropped inside async code, where a blocking
        // runtime shutdown would panic.
        if let Some(runtime) = self.runtime.take().and_then(|rt| Arc::try_unwrap(rt).ok()) {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_returns_result() {
        let bridge = SyncBridge::new().unwrap();
        let value = bridge.wait(Duration::from_secs(1), async { Ok::<_, ClientError>(42) }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_wait_passes_errors_through() {
        let bridge = SyncBridge::new().unwrap();
        let err = bridge
            .wait(Duration::from_secs(1), async { Err::<(), _>(ClientError::new(ErrorCode::InvalidValue)) })
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidValue);
    }

    #[test]
    fn test_wait_is_bounded() {
        let bridge = SyncBridge::new().unwrap();
        let start = std::time::Instant::now();
        let err = bridge
            .wait(Duration::from_millis(50), std::future::pending::<ClientResult<()>>())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_parallel_waits() {
        let bridge = SyncBridge::new().unwrap();
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let bridge = bridge.clone();
                std::thread::spawn(move || {
                    bridge
                        .wait(Duration::from_secs(2), async move {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, ClientError>(i)
                        })
                        .unwrap()
                })
            })
            .collect();
        let sum: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(sum, 28);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_inside_runtime() {
        let bridge = SyncBridge::from_handle(Handle::current()).unwrap();
        let value = bridge.wait(Duration::from_secs(1), async { Ok::<_, ClientError>("done") }).unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_wait_inside_current_thread_runtime() {
        let bridge = SyncBridge::new().unwrap();
        let value = bridge
            .wait(Duration::from_secs(1), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, ClientError>(7)
            })
            .unwrap();
        assert_eq!(value, 7);

        let err = bridge
            .wait(Duration::from_millis(50), std::future::pending::<ClientResult<()>>())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_current_thread_handle_rejected() {
        let err = SyncBridge::from_handle(Handle::current()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_dropped_inside_async_code() {
        let outer = Builder::new_current_thread().enable_all().build().unwrap();
        outer.block_on(async {
            let bridge = SyncBridge::new().unwrap();
            let clone = bridge.clone();
            drop(bridge);
            assert_eq!(clone.wait(Duration::from_secs(1), async { Ok::<_, ClientError>(1) }).unwrap(), 1);
        });
    }
}
