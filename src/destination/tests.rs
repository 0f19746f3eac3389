use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::capture::{Capture, CaptureDetails};
use crate::i18n::{self, Language};
use crate::notification::{Notification, NotificationKind};
use crate::ui::{UiDispatch, UiLoop, UiStopHandle};

enum Behaviour {
    Succeed,
    Fail(&'static str),
    Panic(&'static str),
    ReturnCancelled,
    WaitForCancel,
}

struct MockOperation {
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl MockOperation {
    fn new(behaviour: Behaviour) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                behaviour,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl ExportOperation for MockOperation {
    async fn export(
        &self,
        _context: &ExportContext,
        capture: &Capture,
        cancel: &CancellationToken,
    ) -> Result<Notification, DestinationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(Notification::success(
                "Mock",
                format!("exported {}", capture.details().title),
            )),
            Behaviour::Fail(message) => Err(DestinationError::Print(message.to_string())),
            Behaviour::Panic(message) => panic!("{}", message),
            Behaviour::ReturnCancelled => Err(DestinationError::Cancelled),
            Behaviour::WaitForCancel => {
                cancel.cancelled().await;
                Err(DestinationError::Print("spooler killed".into()))
            }
        }
    }
}

/// Discovery returning a fixed list of names, optionally failing or blocking.
struct MockDiscovery {
    batches: Mutex<Vec<Result<Vec<&'static str>, &'static str>>>,
    block_until_cancelled: bool,
}

impl MockDiscovery {
    fn returning(batches: Vec<Result<Vec<&'static str>, &'static str>>) -> Self {
        Self {
            batches: Mutex::new(batches),
            block_until_cancelled: false,
        }
    }
}

#[async_trait]
impl ChildDiscovery for MockDiscovery {
    async fn discover(
        &self,
        _context: &ExportContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Destination>, DestinationError> {
        if self.block_until_cancelled {
            cancel.cancelled().await;
            return Err(DestinationError::Cancelled);
        }
        let batch = {
            let mut batches = self.batches.lock().unwrap();
            if batches.len() > 1 {
                batches.remove(0)
            } else {
                batches[0].clone()
            }
        };
        match batch {
            Ok(names) => Ok(names.into_iter().map(leaf).collect()),
            Err(message) => Err(DestinationError::Unavailable(message.to_string())),
        }
    }
}

fn leaf(name: &str) -> Destination {
    let (operation, _) = MockOperation::new(Behaviour::Succeed);
    Destination::builder(name).text(name).export(operation).build()
}

fn capture() -> Capture {
    Capture::new(
        vec![137u8, 80, 78, 71],
        CaptureDetails {
            title: "terminal".into(),
            ..CaptureDetails::default()
        },
    )
}

fn context() -> ExportContext {
    ExportContext::new(UiDispatch::inline(), "tests")
}

fn child_names(destination: &Destination) -> Vec<String> {
    destination
        .children()
        .iter()
        .map(|child| child.designation().to_string())
        .collect()
}

fn spawn_ui_thread() -> (UiDispatch, UiStopHandle, thread::JoinHandle<()>) {
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut ui_loop = UiLoop::new().expect("ui loop");
        ready_tx
            .send((ui_loop.dispatch(), ui_loop.stop_handle()))
            .expect("send dispatcher");
        ui_loop.run().expect("ui loop runs");
    });
    let (dispatch, stop) = ready_rx.recv().expect("ui thread ready");
    (dispatch, stop, handle)
}

#[tokio::test]
async fn export_returns_operation_notification() {
    let (operation, calls) = MockOperation::new(Behaviour::Succeed);
    let destination = Destination::builder("Mock").export(operation).build();

    let notification = destination
        .export(&context(), &capture(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(notification.is_success());
    assert_eq!(notification.text(), "exported terminal");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn export_converts_operation_errors_into_failures() {
    let (operation, _) = MockOperation::new(Behaviour::Fail("paper jam"));
    let destination = Destination::builder("Printer")
        .text("Print")
        .failure_text("Cannot print")
        .export(operation)
        .build();

    let notification = destination
        .export(&context(), &capture(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(notification.kind(), NotificationKind::Fail);
    assert_eq!(notification.source(), "Printer");
    assert_eq!(notification.text(), "Cannot print");
    let error_text = notification.error_text().unwrap();
    assert!(error_text.contains("paper jam"), "got {error_text}");
}

#[tokio::test]
async fn export_converts_panics_into_failures() {
    let (operation, _) = MockOperation::new(Behaviour::Panic("driver crashed"));
    let destination = Destination::builder("Printer").export(operation).build();

    let notification = destination
        .export(&context(), &capture(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(notification.kind(), NotificationKind::Fail);
    assert_eq!(notification.error_text(), Some("driver crashed"));
}

#[tokio::test]
#[should_panic(expected = "has no export operation bound")]
async fn export_without_operation_is_a_contract_violation() {
    let destination = Destination::builder("Group").build();
    let _ = destination
        .export(&context(), &capture(), &CancellationToken::new())
        .await;
}

#[test]
#[should_panic(expected = "designation must not be empty")]
fn building_without_designation_is_a_contract_violation() {
    let _ = Destination::builder("  ").build();
}

#[tokio::test]
async fn cancelled_export_is_not_a_failure() {
    let (operation, calls) = MockOperation::new(Behaviour::Succeed);
    let destination = Destination::builder("Mock").export(operation).build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = destination.export(&context(), &capture(), &cancel).await;
    assert_eq!(result, Err(Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (operation, _) = MockOperation::new(Behaviour::ReturnCancelled);
    let destination = Destination::builder("Mock").export(operation).build();
    let result = destination
        .export(&context(), &capture(), &CancellationToken::new())
        .await;
    assert_eq!(result, Err(Cancelled));
}

#[tokio::test]
async fn errors_caused_by_cancellation_are_reported_as_cancelled() {
    let (operation, _) = MockOperation::new(Behaviour::WaitForCancel);
    let destination = Destination::builder("Mock").export(operation).build();
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        })
    };

    let result = destination.export(&context(), &capture(), &cancel).await;
    canceller.await.unwrap();
    assert_eq!(result, Err(Cancelled));
}

#[tokio::test]
async fn refresh_replaces_children() {
    let destination = Destination::builder("Printer")
        .discovery(MockDiscovery::returning(vec![
            Ok(vec!["A", "B"]),
            Ok(vec!["C"]),
        ]))
        .build();
    assert!(destination.children().is_empty());

    let cancel = CancellationToken::new();
    assert_eq!(destination.refresh(&context(), &cancel).await.unwrap(), 2);
    assert_eq!(child_names(&destination), vec!["A", "B"]);

    assert_eq!(destination.refresh(&context(), &cancel).await.unwrap(), 1);
    assert_eq!(child_names(&destination), vec!["C"]);
    assert!(destination.find_child("C").is_some());
    assert!(destination.find_child("A").is_none());
}

#[tokio::test]
async fn refresh_drops_duplicate_children() {
    let destination = Destination::builder("Printer")
        .discovery(MockDiscovery::returning(vec![Ok(vec!["A", "B", "A"])]))
        .build();

    destination
        .refresh(&context(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(child_names(&destination), vec!["A", "B"]);
}

#[tokio::test]
async fn failed_discovery_keeps_previous_children() {
    let destination = Destination::builder("Printer")
        .discovery(MockDiscovery::returning(vec![
            Ok(vec!["A"]),
            Err("cups not running"),
        ]))
        .build();
    let cancel = CancellationToken::new();
    destination.refresh(&context(), &cancel).await.unwrap();
    let before = destination.children();

    let err = destination.refresh(&context(), &cancel).await.unwrap_err();
    assert!(matches!(err, DestinationError::Unavailable(_)));
    assert!(Arc::ptr_eq(&before, &destination.children()));
}

#[tokio::test]
async fn cancelled_refresh_keeps_previous_children() {
    let destination = Destination::builder("Printer")
        .discovery(MockDiscovery {
            batches: Mutex::new(vec![Ok(vec!["A"])]),
            block_until_cancelled: true,
        })
        .build();
    let before = destination.children();
    let cancel = CancellationToken::new();

    let refresh = {
        let destination = destination.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { destination.refresh(&context(), &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let err = refresh.await.unwrap().unwrap_err();
    assert!(matches!(err, DestinationError::Cancelled));
    assert!(Arc::ptr_eq(&before, &destination.children()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_cancelled_while_swap_is_queued_keeps_children() {
    let (dispatch, stop, handle) = spawn_ui_thread();
    let context = ExportContext::new(dispatch.clone(), "tests");
    let destination = Destination::builder("Printer")
        .discovery(MockDiscovery::returning(vec![Ok(vec!["A"]), Ok(vec!["B"])]))
        .build();
    let cancel = CancellationToken::new();
    destination.refresh(&context, &cancel).await.unwrap();
    let before = destination.children();

    // Hold the UI thread so the swap stays queued.
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    dispatch.post(move || {
        let _ = gate_rx.recv();
    });

    let refresh = {
        let destination = destination.clone();
        let context = context.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { destination.refresh(&context, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let result = refresh.await.unwrap();
    gate_tx.send(()).unwrap();
    dispatch
        .run(&CancellationToken::new(), || ())
        .await
        .unwrap();

    stop.stop();
    handle.join().unwrap();
    assert!(matches!(result, Err(DestinationError::Cancelled)));
    assert!(Arc::ptr_eq(&before, &destination.children()));
    assert_eq!(child_names(&destination), vec!["A"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_see_complete_child_lists() {
    const OLD: [&str; 4] = ["A", "B", "C", "D"];
    const NEW: [&str; 3] = ["W", "X", "Y"];

    let (dispatch, stop, handle) = spawn_ui_thread();
    let context = ExportContext::new(dispatch, "tests");
    let batches = (0..50)
        .map(|i| {
            if i % 2 == 0 {
                Ok(NEW.to_vec())
            } else {
                Ok(OLD.to_vec())
            }
        })
        .collect();
    let destination = Destination::builder("Printer")
        .discovery(MockDiscovery::returning(batches))
        .build();

    let done = CancellationToken::new();
    let reader = {
        let destination = destination.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.is_cancelled() {
                let names = child_names(&destination);
                assert!(
                    names.is_empty() || names == OLD || names == NEW,
                    "observed a mixed child list: {names:?}"
                );
                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        })
    };

    let cancel = CancellationToken::new();
    for _ in 0..50 {
        destination.refresh(&context, &cancel).await.unwrap();
    }
    done.cancel();

    let observed = reader.await.expect("reader never saw a mixed list");
    stop.stop();
    handle.join().unwrap();
    assert!(observed > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operations_can_hop_to_the_ui_thread() {
    struct DialogOperation;

    #[async_trait]
    impl ExportOperation for DialogOperation {
        async fn export(
            &self,
            context: &ExportContext,
            _capture: &Capture,
            cancel: &CancellationToken,
        ) -> Result<Notification, DestinationError> {
            let ui = context.ui().clone();
            let on_ui = context.ui().run(cancel, move || ui.is_ui_thread()).await?;
            Ok(Notification::success("Dialog", format!("on ui: {on_ui}")))
        }
    }

    let (dispatch, stop, handle) = spawn_ui_thread();
    let context = ExportContext::new(dispatch, "tests");
    let destination = Destination::builder("Dialog").export(DialogOperation).build();

    let notification = destination
        .export(&context, &capture(), &CancellationToken::new())
        .await
        .unwrap();
    stop.stop();
    handle.join().unwrap();
    assert_eq!(notification.text(), "on ui: true");
}

#[tokio::test]
async fn relabel_preserves_identity() {
    let language = Language::english();
    let (operation, _) = MockOperation::new(Behaviour::Succeed);
    let destination = Destination::builder("Printer")
        .localized(&language, i18n::DESTINATION_PRINTER, i18n::PRINTER_ERROR)
        .icon(Icon::named("printer"))
        .export(operation)
        .discovery(MockDiscovery::returning(vec![Ok(vec!["HP LaserJet"])]))
        .build();
    destination
        .refresh(&context(), &CancellationToken::new())
        .await
        .unwrap();
    let child_before = destination.find_child("HP LaserJet").unwrap();
    let handle = destination.clone();
    assert_eq!(destination.display_text(), "Print");

    language.switch_to(
        "de-DE",
        [(i18n::DESTINATION_PRINTER.to_string(), "Drucken".to_string())].into(),
    );
    destination.relabel(&language);

    assert_eq!(handle.display_text(), "Drucken");
    assert_eq!(handle.designation(), "Printer");
    assert_eq!(handle.icon(), &Icon::named("printer"));
    assert!(handle.same_as(&destination));
    let child_after = destination.find_child("HP LaserJet").unwrap();
    assert!(child_before.same_as(&child_after));
    assert_eq!(child_after.display_text(), "HP LaserJet");
}
