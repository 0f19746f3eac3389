//! Marshalling work onto the single UI thread.
//!
//! Background tasks never touch UI-owned state directly. They hand a closure
//! to [`UiDispatch`], which queues it on the UI thread's calloop event loop and
//! suspends the caller until the closure has run.

use anyhow::{Context, Result, anyhow};
use calloop::{EventLoop, LoopSignal, channel};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

type UiJob = Box<dyn FnOnce() + Send + 'static>;

// Claim states shared between a queued job and its waiting caller.
const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const ABANDONED: u8 = 2;

/// Errors reported by [`UiDispatch::run`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("UI work cancelled before it started")]
    Cancelled,

    #[error("UI thread is not running")]
    Closed,

    #[error("UI work panicked: {0}")]
    Panicked(String),
}

#[derive(Clone)]
enum Target {
    EventLoop {
        sender: channel::Sender<UiJob>,
        ui_thread: ThreadId,
    },
    Inline,
}

/// Cloneable handle for running closures on the UI thread.
#[derive(Clone)]
pub struct UiDispatch {
    target: Target,
}

impl UiDispatch {
    /// Dispatcher that runs every closure immediately on the calling thread.
    ///
    /// Used by tests and by hosts without a dedicated UI thread.
    pub fn inline() -> Self {
        Self {
            target: Target::Inline,
        }
    }

    /// True when called from the thread that executes UI work.
    pub fn is_ui_thread(&self) -> bool {
        match &self.target {
            Target::Inline => true,
            Target::EventLoop { ui_thread, .. } => thread::current().id() == *ui_thread,
        }
    }

    /// Run `work` on the UI thread and wait for its result.
    ///
    /// Work queued from the same caller executes in FIFO order. When called on
    /// the UI thread itself, `work` runs synchronously. Cancellation only takes
    /// effect while `work` is still queued; once the UI thread has picked it
    /// up, this waits for it to finish.
    pub async fn run<F, R>(&self, cancel: &CancellationToken, work: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let sender = match &self.target {
            Target::EventLoop { sender, ui_thread } if thread::current().id() != *ui_thread => {
                sender
            }
            _ => {
                return panic::catch_unwind(AssertUnwindSafe(work))
                    .map_err(|payload| DispatchError::Panicked(panic_message(payload)));
            }
        };

        let state = Arc::new(AtomicU8::new(QUEUED));
        let (result_tx, mut result_rx) = oneshot::channel();
        let job_state = Arc::clone(&state);
        let job: UiJob = Box::new(move || {
            if job_state
                .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                log::trace!("Skipping UI work abandoned by its caller");
                return;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(work)).map_err(panic_message);
            // The caller only drops the receiver after abandoning, which we ruled out.
            let _ = result_tx.send(outcome);
        });

        sender.send(job).map_err(|_| DispatchError::Closed)?;

        tokio::select! {
            biased;
            outcome = &mut result_rx => return flatten(outcome),
            _ = cancel.cancelled() => {}
        }

        if state
            .compare_exchange(QUEUED, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::debug!("UI work cancelled while queued");
            return Err(DispatchError::Cancelled);
        }

        // Already running on the UI thread and cannot be interrupted.
        flatten(result_rx.await)
    }

    /// Queue `work` on the UI thread without waiting for it.
    pub fn post<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: UiJob = Box::new(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
                log::error!("Posted UI work panicked: {}", panic_message(payload));
            }
        });

        match &self.target {
            Target::EventLoop { sender, ui_thread } if thread::current().id() != *ui_thread => {
                if sender.send(job).is_err() {
                    log::warn!("Dropping UI work: UI thread is not running");
                }
            }
            _ => job(),
        }
    }
}

fn flatten<R>(
    outcome: Result<Result<R, String>, oneshot::error::RecvError>,
) -> Result<R, DispatchError> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(DispatchError::Panicked(message)),
        // Job dropped unexecuted: the event loop went away.
        Err(_) => Err(DispatchError::Closed),
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle for stopping a running [`UiLoop`] from any thread.
#[derive(Clone)]
pub struct UiStopHandle {
    signal: LoopSignal,
}

impl UiStopHandle {
    pub fn stop(&self) {
        self.signal.stop();
        self.signal.wakeup();
    }
}

/// The UI thread's event loop.
///
/// Must be created on the thread that will call [`UiLoop::run`]; that thread
/// becomes the UI thread for every dispatcher handed out by this loop.
pub struct UiLoop {
    event_loop: EventLoop<'static, ()>,
    dispatch: UiDispatch,
}

impl UiLoop {
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::<()>::try_new().context("Failed to create UI event loop")?;
        let (sender, jobs) = channel::channel::<UiJob>();
        let signal = event_loop.get_signal();

        event_loop
            .handle()
            .insert_source(jobs, move |event, _, _| match event {
                channel::Event::Msg(job) => job(),
                channel::Event::Closed => {
                    log::debug!("All UI dispatchers dropped, stopping UI loop");
                    signal.stop();
                }
            })
            .map_err(|e| anyhow!("Failed to register UI work channel: {}", e.error))?;

        Ok(Self {
            event_loop,
            dispatch: UiDispatch {
                target: Target::EventLoop {
                    sender,
                    ui_thread: thread::current().id(),
                },
            },
        })
    }

    pub fn dispatch(&self) -> UiDispatch {
        self.dispatch.clone()
    }

    pub fn stop_handle(&self) -> UiStopHandle {
        UiStopHandle {
            signal: self.event_loop.get_signal(),
        }
    }

    /// Process UI work until stopped.
    pub fn run(&mut self) -> Result<()> {
        log::debug!("UI loop running");
        self.event_loop
            .run(None::<Duration>, &mut (), |_| {})
            .context("UI event loop failed")?;
        log::debug!("UI loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;

    /// Spawns a UI thread and returns its dispatcher, stop handle and join handle.
    fn spawn_ui_thread() -> (UiDispatch, UiStopHandle, thread::JoinHandle<ThreadId>) {
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut ui_loop = UiLoop::new().expect("ui loop");
            ready_tx
                .send((ui_loop.dispatch(), ui_loop.stop_handle()))
                .expect("send dispatcher");
            ui_loop.run().expect("ui loop runs");
            thread::current().id()
        });
        let (dispatch, stop) = ready_rx.recv().expect("ui thread ready");
        (dispatch, stop, handle)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn work_runs_on_ui_thread() {
        let (dispatch, stop, handle) = spawn_ui_thread();
        let cancel = CancellationToken::new();

        assert!(!dispatch.is_ui_thread());
        let ran_on = dispatch
            .run(&cancel, || thread::current().id())
            .await
            .unwrap();
        let on_ui = dispatch
            .run(&cancel, {
                let dispatch = dispatch.clone();
                move || dispatch.is_ui_thread()
            })
            .await
            .unwrap();

        stop.stop();
        let ui_thread = handle.join().unwrap();
        assert_eq!(ran_on, ui_thread);
        assert!(on_ui);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn work_from_one_caller_runs_in_fifo_order() {
        let (dispatch, stop, handle) = spawn_ui_thread();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            dispatch.post(move || order.lock().unwrap().push(i));
        }
        let order_clone = order.clone();
        dispatch
            .run(&CancellationToken::new(), move || {
                order_clone.lock().unwrap().push(99)
            })
            .await
            .unwrap();

        stop.stop();
        handle.join().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 99]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_while_queued_never_runs() {
        let (dispatch, stop, handle) = spawn_ui_thread();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let ran = Arc::new(Mutex::new(false));

        // Block the UI thread so the next job stays queued.
        dispatch.post(move || {
            let _ = gate_rx.recv();
        });

        let cancel = CancellationToken::new();
        let ran_clone = ran.clone();
        let pending = {
            let dispatch = dispatch.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                dispatch
                    .run(&cancel, move || *ran_clone.lock().unwrap() = true)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = pending.await.unwrap();
        gate_tx.send(()).unwrap();

        // Flush the queue before inspecting the flag.
        dispatch
            .run(&CancellationToken::new(), || ())
            .await
            .unwrap();
        stop.stop();
        handle.join().unwrap();

        assert_eq!(result, Err(DispatchError::Cancelled));
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn started_work_is_awaited_despite_cancellation() {
        let (dispatch, stop, handle) = spawn_ui_thread();
        let cancel = CancellationToken::new();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let pending = {
            let dispatch = dispatch.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                dispatch
                    .run(&cancel, move || {
                        let _ = started_tx.send(());
                        let _ = release_rx.recv();
                        42
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        release_tx.send(()).unwrap();

        assert_eq!(pending.await.unwrap(), Ok(42));
        stop.stop();
        handle.join().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_work_is_reported_and_loop_survives() {
        let (dispatch, stop, handle) = spawn_ui_thread();
        let cancel = CancellationToken::new();

        let err = dispatch
            .run(&cancel, || -> u32 { panic!("dialog exploded") })
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Panicked("dialog exploded".into()));

        assert_eq!(dispatch.run(&cancel, || 7).await, Ok(7));
        stop.stop();
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn inline_dispatch_runs_immediately() {
        let dispatch = UiDispatch::inline();
        let caller = thread::current().id();
        let ran_on = dispatch
            .run(&CancellationToken::new(), || thread::current().id())
            .await
            .unwrap();
        assert_eq!(ran_on, caller);
        assert!(dispatch.is_ui_thread());
    }

    #[tokio::test]
    async fn already_cancelled_work_is_not_run() {
        let dispatch = UiDispatch::inline();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dispatch.run(&cancel, || unreachable!()).await;
        assert_eq!(result, Err::<(), _>(DispatchError::Cancelled));
    }

    #[test]
    fn closed_loop_reports_closed() {
        let ui_loop = UiLoop::new().unwrap();
        let dispatch = ui_loop.dispatch();
        drop(ui_loop);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // Run from a different thread than the one that created the loop.
        let result = thread::spawn(move || {
            runtime.block_on(dispatch.run(&CancellationToken::new(), || 1))
        })
        .join()
        .unwrap();
        assert_eq!(result, Err(DispatchError::Closed));
    }
}
