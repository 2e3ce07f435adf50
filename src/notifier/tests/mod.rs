//! Unit tests for the notifier module.

#![allow(clippy::unwrap_used)]


use std::{
    sync::{
        Arc, Mutex, OnceLock, mpsc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
    time::Duration,
};

use crate::notifier::{
    BroadcastChannel, BroadcastTransport, ChangeHandler, ChangeMessage, ChangeNotifier,
    InProcessTransport, LocalDispatcher, MessageKind, MessageListener, NotifyError,
};

fn counter() -> (Arc<AtomicUsize>, ChangeHandler) {
    let count = Arc::new(AtomicUsize::new(0));
    let handler_count = Arc::clone(&count);
    let handler: ChangeHandler = Arc::new(move || {
        handler_count.fetch_add(1, Ordering::SeqCst);
    });
    (count, handler)
}

fn notifier_on(transport: &InProcessTransport) -> ChangeNotifier {
    let transport: Arc<dyn BroadcastTransport> = Arc::new(transport.clone());
    ChangeNotifier::new("hlp-config", Some(transport))
}

#[test]
fn message_wire_format() {
    let message = ChangeMessage {
        kind: MessageKind::ConfigUpdated,
        timestamp: 1_700_000_000_000,
    };

    let json = serde_json::to_value(message).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"kind": "config-updated", "timestamp": 1_700_000_000_000i64})
    );
}

#[test]
fn unknown_message_kinds_decode_as_unknown() {
    let message: ChangeMessage =
        serde_json::from_str(r#"{"kind":"theme-preview","timestamp":5}"#).unwrap();

    assert_eq!(message.kind, MessageKind::Unknown);
    assert!(!message.is_config_update());
}

#[test]
fn config_updated_is_stamped_now() {
    let before = chrono::Utc::now().timestamp_millis();
    let message = ChangeMessage::config_updated();
    let after = chrono::Utc::now().timestamp_millis();

    assert!(message.is_config_update());
    assert!(message.timestamp >= before && message.timestamp <= after);
}

#[test]
fn local_dispatcher_runs_each_handler_once() {
    let dispatcher = LocalDispatcher::new("hlp-config-change");
    let (first, first_handler) = counter();
    let (second, second_handler) = counter();

    dispatcher.add(first_handler);
    let second_id = dispatcher.add(second_handler);
    dispatcher.dispatch();

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    assert!(dispatcher.remove(second_id));
    assert!(!dispatcher.remove(second_id));
    dispatcher.dispatch();

    assert_eq!(first.load(Ordering::SeqCst), 2);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn handler_may_remove_itself_during_dispatch() {
    let dispatcher = LocalDispatcher::new("hlp-config-change");
    let count = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(std::sync::Mutex::new(None));

    let handler_dispatcher = dispatcher.clone();
    let handler_slot = Arc::clone(&slot);
    let handler_count = Arc::clone(&count);
    let id = dispatcher.add(Arc::new(move || {
        handler_count.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = *handler_slot.lock().unwrap() {
            handler_dispatcher.remove(id);
        }
    }));
    *slot.lock().unwrap() = Some(id);

    dispatcher.dispatch();
    dispatcher.dispatch();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(dispatcher.is_empty());
}

#[test]
fn in_process_channel_skips_its_own_posts() {
    let transport = InProcessTransport::new();
    let (count, handler) = counter();

    let mut channel = transport.open("hlp-config").unwrap();
    channel
        .listen(Arc::new(move |_message: &ChangeMessage| handler()))
        .unwrap();

    channel.post(&ChangeMessage::config_updated()).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let other = transport.open("hlp-config").unwrap();
    other.post(&ChangeMessage::config_updated()).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn in_process_channels_are_scoped_by_name_and_hub() {
    let transport = InProcessTransport::new();
    let (count, handler) = counter();

    let mut channel = transport.open("hlp-config").unwrap();
    channel
        .listen(Arc::new(move |_message: &ChangeMessage| handler()))
        .unwrap();

    transport
        .open("other-channel")
        .unwrap()
        .post(&ChangeMessage::config_updated())
        .unwrap();
    InProcessTransport::new()
        .open("hlp-config")
        .unwrap()
        .post(&ChangeMessage::config_updated())
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn closed_channel_rejects_posts_and_stops_listening() {
    let transport = InProcessTransport::new();
    let mut channel = transport.open("hlp-config").unwrap();
    channel.listen(Arc::new(|_message: &ChangeMessage| {})).unwrap();
    assert_eq!(transport.listener_count("hlp-config"), 1);

    channel.close();
    channel.close();

    assert_eq!(transport.listener_count("hlp-config"), 0);
    assert!(channel.post(&ChangeMessage::config_updated()).is_err());
}

#[tokio::test]
async fn notify_reaches_local_and_remote_subscribers() {
    let transport = InProcessTransport::new();
    let writer = notifier_on(&transport);
    let reader = notifier_on(&transport);

    let (writer_count, writer_handler) = counter();
    let (reader_count, reader_handler) = counter();
    let _writer_sub = writer.subscribe(writer_handler);
    let _reader_sub = reader.subscribe(reader_handler);

    writer.notify().await;

    // Writer hears the local event and the broadcast; the reader only the broadcast.
    assert_eq!(writer_count.load(Ordering::SeqCst), 2);
    assert_eq!(reader_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notify_closes_its_transient_channel() {
    let transport = InProcessTransport::new();
    let notifier = notifier_on(&transport);

    notifier.notify().await;

    assert_eq!(transport.listener_count("hlp-config"), 0);
}

#[test]
fn unknown_kinds_do_not_wake_subscribers() {
    let transport = InProcessTransport::new();
    let notifier = notifier_on(&transport);
    let (count, handler) = counter();
    let _sub = notifier.subscribe(handler);

    transport
        .open("hlp-config")
        .unwrap()
        .post(&ChangeMessage {
            kind: MessageKind::Unknown,
            timestamp: 0,
        })
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_detaches_both_paths() {
    let transport = InProcessTransport::new();
    let writer = notifier_on(&transport);
    let (count, handler) = counter();

    let subscription = writer.subscribe(handler);
    assert!(subscription.is_active());
    assert!(subscription.has_broadcast());
    assert_eq!(transport.listener_count("hlp-config"), 1);

    subscription.unsubscribe();
    subscription.unsubscribe();

    assert!(!subscription.is_active());
    assert_eq!(transport.listener_count("hlp-config"), 0);

    writer.notify().await;
    notifier_on(&transport).notify().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropping_subscription_unsubscribes() {
    let transport = InProcessTransport::new();
    let notifier = notifier_on(&transport);
    let (count, handler) = counter();

    drop(notifier.subscribe(handler));
    notifier.notify().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(transport.listener_count("hlp-config"), 0);
}

#[tokio::test]
async fn degraded_notifier_still_notifies_this_context() {
    let notifier = ChangeNotifier::same_context_only("hlp-config");
    let (count, handler) = counter();

    let subscription = notifier.subscribe(handler);
    assert!(notifier.is_degraded());
    assert!(!subscription.has_broadcast());

    notifier.notify().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    notifier.notify().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_waits_for_handler_running_on_another_thread() {
    let transport = InProcessTransport::new();
    let reader = notifier_on(&transport);
    let count = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();

    let handler_count = Arc::clone(&count);
    let subscription = reader.subscribe(Arc::new(move || {
        let _ = started_tx.send(());
        thread::sleep(Duration::from_millis(100));
        handler_count.fetch_add(1, Ordering::SeqCst);
    }));

    let poster_transport = transport.clone();
    let poster = thread::spawn(move || {
        poster_transport
            .open("hlp-config")
            .unwrap()
            .post(&ChangeMessage::config_updated())
            .unwrap();
    });

    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    subscription.unsubscribe();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    poster.join().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_may_unsubscribe_itself() {
    let notifier = ChangeNotifier::same_context_only("hlp-config");
    let count = Arc::new(AtomicUsize::new(0));
    let slot: Arc<OnceLock<crate::notifier::Subscription>> = Arc::new(OnceLock::new());

    let handler_slot = Arc::clone(&slot);
    let handler_count = Arc::clone(&count);
    let subscription = notifier.subscribe(Arc::new(move || {
        handler_count.fetch_add(1, Ordering::SeqCst);
        if let Some(subscription) = handler_slot.get() {
            subscription.unsubscribe();
        }
    }));
    assert!(slot.set(subscription).is_ok());

    notifier.notify().await;
    notifier.notify().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!slot.get().unwrap().is_active());
}

/// Records which thread each post ran on.
#[derive(Clone, Default)]
struct RecordingTransport {
    posted_on: Arc<Mutex<Vec<ThreadId>>>,
}

struct RecordingChannel {
    posted_on: Arc<Mutex<Vec<ThreadId>>>,
}

impl BroadcastTransport for RecordingTransport {
    fn open(&self, _name: &str) -> Result<Box<dyn BroadcastChannel>, NotifyError> {
        Ok(Box::new(RecordingChannel {
            posted_on: Arc::clone(&self.posted_on),
        }))
    }
}

impl BroadcastChannel for RecordingChannel {
    fn post(&self, _message: &ChangeMessage) -> Result<(), NotifyError> {
        self.posted_on.lock().unwrap().push(thread::current().id());
        Ok(())
    }

    fn listen(&mut self, _listener: MessageListener) -> Result<(), NotifyError> {
        Ok(())
    }

    fn close(&mut self) {}
}

#[tokio::test]
async fn notify_posts_off_the_calling_thread() {
    let transport = RecordingTransport::default();
    let notifier = ChangeNotifier::new("hlp-config", Some(Arc::new(transport.clone())));
    let (count, handler) = counter();
    let _sub = notifier.subscribe(handler);

    notifier.notify().await;

    let posted_on = transport.posted_on.lock().unwrap().clone();
    assert_eq!(posted_on.len(), 1);
    assert_ne!(posted_on[0], thread::current().id());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
