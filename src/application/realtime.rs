use crate::application::controller::Reconciler;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::wire::{PushEvent, decode_push_payload};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Transient user-facing notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Server-side subscription that must be (re)established for pushes to arrive.
#[async_trait]
pub trait PushSubscription: Send + Sync {
    async fn subscribe(&self) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Connected,
    Reconnected,
    Payload(String),
    Disconnected,
}

pub struct RealtimeSyncBridge<R, S, N>
where
    R: Reconciler,
    S: PushSubscription,
    N: Notifier,
{
    reconciler: Arc<R>,
    subscription: Arc<S>,
    notifier: Arc<N>,
}

impl<R, S, N> RealtimeSyncBridge<R, S, N>
where
    R: Reconciler,
    S: PushSubscription,
    N: Notifier,
{
    pub fn new(reconciler: Arc<R>, subscription: Arc<S>, notifier: Arc<N>) -> Self {
        Self {
            reconciler,
            subscription,
            notifier,
        }
    }

    /// Consumes channel messages until every sender is dropped.
    pub async fn run(&self, mut messages: mpsc::Receiver<ChannelMessage>) {
        while let Some(message) = messages.recv().await {
            if let Err(error) = self.handle(message).await {
                warn!(%error, "realtime message handling failed");
            }
        }
        debug!("realtime channel closed");
    }

    pub async fn handle(&self, message: ChannelMessage) -> Result<(), EngineError> {
        match message {
            ChannelMessage::Connected => {
                info!("subscribing to appointment pushes");
                self.subscription.subscribe().await
            }
            ChannelMessage::Reconnected => {
                info!("reconnected, re-subscribing to appointment pushes");
                self.subscription.subscribe().await
            }
            ChannelMessage::Disconnected => {
                warn!("realtime channel disconnected");
                Ok(())
            }
            ChannelMessage::Payload(raw) => match decode_push_payload(&raw) {
                Ok(event) => self.on_push(event).await,
                Err(error) => {
                    warn!(%error, "dropping malformed push payload");
                    Ok(())
                }
            },
        }
    }

    async fn on_push(&self, event: PushEvent) -> Result<(), EngineError> {
        debug!(?event, "push event received");
        if let Some(summary) = event.summary() {
            self.notifier.notify(&summary);
        }
        self.reconciler.reconcile().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingReconciler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        async fn reconcile(&self) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSubscription {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PushSubscription for FakeSubscription {
        async fn subscribe(&self) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Network("socket closed".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str) {
            self.messages
                .lock()
                .expect("notifier mutex poisoned")
                .push(message.to_string());
        }
    }

    type TestBridge = RealtimeSyncBridge<CountingReconciler, FakeSubscription, RecordingNotifier>;

    fn bridge(
        subscription: FakeSubscription,
    ) -> (
        TestBridge,
        Arc<CountingReconciler>,
        Arc<FakeSubscription>,
        Arc<RecordingNotifier>,
    ) {
        let reconciler = Arc::new(CountingReconciler::default());
        let subscription = Arc::new(subscription);
        let notifier = Arc::new(RecordingNotifier::default());
        let bridge = RealtimeSyncBridge::new(
            Arc::clone(&reconciler),
            Arc::clone(&subscription),
            Arc::clone(&notifier),
        );
        (bridge, reconciler, subscription, notifier)
    }

    #[tokio::test]
    async fn new_appointment_notifies_and_reconciles() {
        let (bridge, reconciler, _, notifier) = bridge(FakeSubscription::default());

        bridge
            .handle(ChannelMessage::Payload(
                r#"{"type":"newAppointment","customerName":"Ayla","time":"14:30"}"#.to_string(),
            ))
            .await
            .expect("handled");

        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *notifier.messages.lock().expect("notifier mutex poisoned"),
            vec!["New appointment: Ayla at 14:30".to_string()]
        );
    }

    #[tokio::test]
    async fn update_reconciles_without_toast() {
        let (bridge, reconciler, _, notifier) = bridge(FakeSubscription::default());

        bridge
            .handle(ChannelMessage::Payload(r#"{"type":"updateAppointment"}"#.to_string()))
            .await
            .expect("handled");

        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);
        assert!(notifier.messages.lock().expect("notifier mutex poisoned").is_empty());
    }

    #[tokio::test]
    async fn run_resubscribes_and_skips_malformed_payloads() {
        let (bridge, reconciler, subscription, _) = bridge(FakeSubscription::default());
        let (sender, receiver) = mpsc::channel(8);
        for message in [
            ChannelMessage::Connected,
            ChannelMessage::Payload("not json".to_string()),
            ChannelMessage::Payload(r#"{"type":"somethingElse"}"#.to_string()),
            ChannelMessage::Disconnected,
            ChannelMessage::Reconnected,
            ChannelMessage::Payload(r#"{"type":"updateAppointment"}"#.to_string()),
        ] {
            sender.send(message).await.expect("channel open");
        }
        drop(sender);

        bridge.run(receiver).await;

        assert_eq!(subscription.calls.load(Ordering::SeqCst), 2);
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_subscribe_is_reported_to_caller() {
        let (bridge, _, _, _) = bridge(FakeSubscription {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let result = bridge.handle(ChannelMessage::Reconnected).await;
        assert!(matches!(result, Err(EngineError::Network(_))));
    }
}
