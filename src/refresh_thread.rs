//! A background thread that runs refresh cycles on a fixed cadence.
use std::{
    sync::{mpsc::RecvTimeoutError, Arc, Condvar, Mutex, PoisonError},
    thread::JoinHandle,
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    refresh_loop::{RefreshLoop, RefreshOutcome},
    Error, Result,
};

/// Configuration for [`RefreshThread`].
#[derive(Debug, Clone)]
pub(crate) struct RefreshThreadConfig {
    /// Interval to wait between cycles.
    pub interval: Duration,
    /// Random amount subtracted from each wait, so many processes started together do not
    /// synchronize their requests.
    pub jitter: Duration,
}

type FirstResult = Arc<(Mutex<Option<Result<()>>>, Condvar)>;

/// A refresh thread.
///
/// Cycles run sequentially on a single thread, so a cycle never overlaps the previous one. The
/// first cycle runs immediately on start.
pub(crate) struct RefreshThread {
    join_handle: Mutex<Option<JoinHandle<()>>>,

    /// Used to send a stop command to the refresh thread.
    stop_sender: std::sync::mpsc::SyncSender<()>,

    /// Holds `None` until the first engine is published, then `Some(Ok(()))`. Holds
    /// `Some(Err(Error::Stopped))` if the thread exited before that.
    result: FirstResult,
}

impl RefreshThread {
    pub fn start(
        mut refresh_loop: RefreshLoop,
        config: RefreshThreadConfig,
    ) -> std::io::Result<RefreshThread> {
        // Buffer of 1 is enough: a second stop command can be dropped.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);

        let result: FirstResult = Arc::new((Mutex::new(None), Condvar::new()));

        let join_handle = {
            let result = Arc::clone(&result);
            let update_result = move |value: Result<()>| {
                let (slot, condvar) = &*result;
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(value);
                    condvar.notify_all();
                }
            };

            std::thread::Builder::new()
                .name("datafile-refresh".to_owned())
                .spawn(move || {
                    loop {
                        // A panicking source or factory fails this cycle only.
                        let cycle = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            refresh_loop.refresh()
                        }));
                        match cycle {
                            Ok(Ok(RefreshOutcome::Updated)) => update_result(Ok(())),
                            Ok(Ok(RefreshOutcome::Unchanged)) => {}
                            Ok(Err(err)) => {
                                log::warn!(target: "datafile_manager",
                                           "refresh cycle failed, keeping current engine: {err}");
                            }
                            Err(_) => {
                                log::warn!(target: "datafile_manager",
                                           "refresh cycle panicked, keeping current engine");
                            }
                        }

                        let timeout = jitter(config.interval, config.jitter);
                        match stop_receiver.recv_timeout(timeout) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) => {
                                log::debug!(target: "datafile_manager", "refresh thread received stop command");
                                break;
                            }
                            Err(RecvTimeoutError::Disconnected) => {
                                // The manager owning the sender was dropped.
                                log::debug!(target: "datafile_manager", "refresh thread disconnected");
                                break;
                            }
                        }
                    }

                    // No-op if an engine was published earlier.
                    update_result(Err(Error::Stopped));
                })?
        };

        Ok(RefreshThread {
            join_handle: Mutex::new(Some(join_handle)),
            stop_sender,
            result,
        })
    }

    /// Block until the first engine is published, or until the thread exits without publishing
    /// one.
    pub fn wait_for_configuration(&self) -> Result<()> {
        let (slot, condvar) = &*self.result;
        let mut lock = slot.lock().map_err(|_| Error::RefreshThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = condvar
                        .wait(lock)
                        .map_err(|_| Error::RefreshThreadPanicked)?;
                }
            }
        }
    }

    /// Block until the first engine is published or `timeout` elapses. Returns `Ok(false)` on
    /// timeout.
    pub fn wait_for_configuration_timeout(&self, timeout: Duration) -> Result<bool> {
        let (slot, condvar) = &*self.result;
        let lock = slot.lock().map_err(|_| Error::RefreshThreadPanicked)?;
        let (lock, _) = condvar
            .wait_timeout_while(lock, timeout, |result| result.is_none())
            .map_err(|_| Error::RefreshThreadPanicked)?;
        match &*lock {
            Some(result) => result.clone().map(|()| true),
            None => Ok(false),
        }
    }

    /// Stop the thread without waiting for it to exit.
    pub fn stop(&self) {
        // Err means the thread already exited or a stop command is already queued.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the thread and block until it exits. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        self.stop();

        let join_handle = self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join_handle) = join_handle {
            join_handle
                .join()
                .map_err(|_| Error::RefreshThreadPanicked)?;
        }

        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    use serde_json::json;

    use super::{RefreshThread, RefreshThreadConfig};
    use crate::{
        datafile::DatafileEngineFactory,
        engine::EngineOptions,
        engine_slot::EngineSlot,
        refresh_loop::{
            tests::{CountingFactory, ScriptedSource},
            RefreshLoop,
        },
        ConfigurationDocument, Error, FetchError,
    };

    fn config(interval: Duration) -> RefreshThreadConfig {
        RefreshThreadConfig {
            interval,
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn publishes_first_document_and_wakes_waiters() {
        let source = ScriptedSource::default();
        source.push(Ok(json!({"flags": {"f": {"enabled": true}}})));
        let slot = Arc::new(EngineSlot::new());
        let refresh_loop = RefreshLoop::new(
            Box::new(source),
            Arc::new(DatafileEngineFactory),
            EngineOptions::new(),
            slot.clone(),
        );

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_millis(10))).unwrap();
        thread.wait_for_configuration().unwrap();

        assert!(slot
            .get()
            .unwrap()
            .engine()
            .is_feature_enabled("f", "u1", &HashMap::new()));
        thread.shutdown().unwrap();
    }

    #[test]
    fn wait_times_out_while_fetches_fail() {
        let slot = Arc::new(EngineSlot::new());
        let refresh_loop = RefreshLoop::new(
            Box::new(|| -> Result<ConfigurationDocument, FetchError> { Err(FetchError::Status(500)) }),
            Arc::new(DatafileEngineFactory),
            EngineOptions::new(),
            slot.clone(),
        );

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_millis(5))).unwrap();
        assert!(!thread
            .wait_for_configuration_timeout(Duration::from_millis(50))
            .unwrap());
        assert!(slot.get().is_none());
        thread.shutdown().unwrap();
    }

    #[test]
    fn keeps_cycling_after_failures() {
        let source = ScriptedSource::default();
        source.push(Err(FetchError::Status(500)));
        source.push(Ok(json!({"nope": true})));
        source.push(Ok(json!({"flags": {}})));
        let factory = Arc::new(CountingFactory::default());
        let slot = Arc::new(EngineSlot::new());
        let refresh_loop = RefreshLoop::new(
            Box::new(source),
            factory.clone(),
            EngineOptions::new(),
            slot.clone(),
        );

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_millis(1))).unwrap();
        assert!(thread
            .wait_for_configuration_timeout(Duration::from_secs(5))
            .unwrap());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        thread.shutdown().unwrap();
    }

    #[test]
    fn stop_wakes_sleeping_thread() {
        let calls = Arc::new(AtomicUsize::new(0));
        let refresh_loop = {
            let calls = calls.clone();
            RefreshLoop::new(
                Box::new(move || -> Result<ConfigurationDocument, FetchError> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Status(503))
                }),
                Arc::new(DatafileEngineFactory),
                EngineOptions::new(),
                Arc::new(EngineSlot::new()),
            )
        };

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_secs(3600))).unwrap();
        let started = Instant::now();
        thread.shutdown().unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(calls.load(Ordering::SeqCst) <= 1);
        // Second shutdown is a no-op.
        thread.shutdown().unwrap();
    }

    #[test]
    fn shutdown_before_first_document_wakes_waiters() {
        let refresh_loop = RefreshLoop::new(
            Box::new(|| -> Result<ConfigurationDocument, FetchError> { Err(FetchError::Status(503)) }),
            Arc::new(DatafileEngineFactory),
            EngineOptions::new(),
            Arc::new(EngineSlot::new()),
        );

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_secs(3600))).unwrap();
        let waiter = std::thread::scope(|scope| {
            let waiter = scope.spawn(|| thread.wait_for_configuration());
            thread.shutdown().unwrap();
            waiter.join().unwrap()
        });

        assert!(matches!(waiter, Err(Error::Stopped)));
        assert!(matches!(thread.wait_for_configuration(), Err(Error::Stopped)));
        assert!(matches!(
            thread.wait_for_configuration_timeout(Duration::from_millis(1)),
            Err(Error::Stopped)
        ));
    }

    #[test]
    fn shutdown_after_first_document_keeps_success() {
        let source = ScriptedSource::default();
        source.push(Ok(json!({"flags": {}})));
        let refresh_loop = RefreshLoop::new(
            Box::new(source),
            Arc::new(DatafileEngineFactory),
            EngineOptions::new(),
            Arc::new(EngineSlot::new()),
        );

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_millis(5))).unwrap();
        thread.wait_for_configuration().unwrap();
        thread.shutdown().unwrap();

        thread.wait_for_configuration().unwrap();
    }

    #[test]
    fn panicking_cycle_does_not_end_refreshing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(EngineSlot::new());
        let refresh_loop = {
            let calls = calls.clone();
            RefreshLoop::new(
                Box::new(move || -> Result<ConfigurationDocument, FetchError> {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("source blew up");
                    }
                    Ok(ConfigurationDocument::new(json!({"flags": {"f": {"enabled": true}}})))
                }),
                Arc::new(DatafileEngineFactory),
                EngineOptions::new(),
                slot.clone(),
            )
        };

        let thread = RefreshThread::start(refresh_loop, config(Duration::from_millis(1))).unwrap();
        assert!(thread
            .wait_for_configuration_timeout(Duration::from_secs(5))
            .unwrap());
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert!(slot
            .get()
            .unwrap()
            .engine()
            .is_feature_enabled("f", "u1", &HashMap::new()));
        thread.shutdown().unwrap();
    }
}
