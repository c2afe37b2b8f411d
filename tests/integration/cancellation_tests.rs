//! Explicit cancellation and cross-session isolation.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use chat_relay::config::RelayConfig;
use chat_relay::relay::channel::ClientChannel;
use chat_relay::relay::event::StreamEvent;
use chat_relay::relay::orchestrator::StreamOrchestrator;
use chat_relay::relay::registry::{SessionContext, StreamMode, StreamSessionRegistry};
use chat_relay::relay::MessageStore;
use chat_relay::upstream::CompletionBackend;

use super::support::{decode_chunks, FakeBackend, FakeStore};

const IDLE: Duration = Duration::from_secs(60);

fn harness(reply: &str) -> (Arc<FakeStore>, Arc<StreamSessionRegistry>, Arc<StreamOrchestrator>) {
    let store = Arc::new(FakeStore::new());
    let backend = Arc::new(FakeBackend::completing(reply));
    let registry = Arc::new(StreamSessionRegistry::new());
    let orchestrator = Arc::new(StreamOrchestrator::new(
        Arc::clone(&store) as Arc<dyn MessageStore>,
        backend as Arc<dyn CompletionBackend>,
        Arc::clone(&registry),
        RelayConfig::default(),
        "be helpful".into(),
    ));
    (store, registry, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn stop_mid_stream_ends_with_a_cancellation_error() {
    let (store, registry, orchestrator) =
        harness("one two three four five six seven eight nine ten");

    let context = SessionContext::new(1, 10, 100, "count".into(), StreamMode::Paced);
    let id = registry.create(context).await;
    let (channel, frames) = ClientChannel::new(id.clone(), 64, IDLE);
    let (context, cancel) = registry.attach(&id, channel.clone()).await.expect("attach");

    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let id = id.clone();
        async move { orchestrator.run(&id, context, channel, cancel).await }
    });

    // Let a few tokens flow, then pull the plug.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(registry.stop(&id).await);
    run.await.expect("run task");

    let frames: Vec<_> = frames.collect().await;
    let events = decode_chunks(&frames);
    assert_eq!(events.first(), Some(&StreamEvent::Start));
    assert!(events
        .iter()
        .any(|event| matches!(event, StreamEvent::Content(_))));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Error("stream cancelled".into()))
    );
    assert_eq!(
        events.iter().filter(|event| event.is_terminal()).count(),
        1
    );

    // No END, so nothing was persisted; the registry entry is gone.
    assert!(store.saved_messages().is_empty());
    assert_eq!(registry.live_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn stopping_an_unattached_session_just_removes_it() {
    let (_store, registry, _orchestrator) = harness("unused");

    let context = SessionContext::new(1, 10, 100, "hi".into(), StreamMode::Paced);
    let id = registry.create(context).await;

    assert!(registry.stop(&id).await);
    assert!(!registry.stop(&id).await);
    assert_eq!(registry.live_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_sessions_do_not_leak_content_across_channels() {
    let replies = ["alpha alpha alpha", "bravo bravo bravo", "charlie charlie charlie"];
    let mut runs = Vec::new();
    let mut registries = Vec::new();

    // Independent turns over one shared registry and store.
    let store = Arc::new(FakeStore::new());
    let registry = Arc::new(StreamSessionRegistry::new());
    for (index, reply) in replies.iter().enumerate() {
        let backend = Arc::new(FakeBackend::completing(reply));
        let orchestrator = Arc::new(StreamOrchestrator::new(
            Arc::clone(&store) as Arc<dyn MessageStore>,
            backend as Arc<dyn CompletionBackend>,
            Arc::clone(&registry),
            RelayConfig::default(),
            "be helpful".into(),
        ));

        let conversation_id = i64::try_from(index).expect("index") + 10;
        let context = SessionContext::new(1, conversation_id, 100, "go".into(), StreamMode::Paced);
        let id = registry.create(context).await;
        let (channel, frames) = ClientChannel::new(id.clone(), 64, IDLE);
        let (context, cancel) = registry.attach(&id, channel.clone()).await.expect("attach");

        registries.push((frames, *reply));
        runs.push(tokio::spawn(async move {
            orchestrator.run(&id, context, channel, cancel).await;
        }));
    }

    for run in runs {
        run.await.expect("run task");
    }

    for (frames, reply) in registries {
        let frames: Vec<_> = frames.collect().await;
        let events = decode_chunks(&frames);
        assert_eq!(events.last(), Some(&StreamEvent::End((*reply).into())));

        let own_word = reply.split_whitespace().next().expect("word");
        for event in &events {
            if let StreamEvent::Content(text) = event {
                assert!(
                    text.split_whitespace().all(|word| word == own_word),
                    "foreign content leaked into channel: {text}"
                );
            }
        }
    }

    assert_eq!(registry.live_count().await, 0);
    assert_eq!(store.saved_messages().len(), replies.len());
}
