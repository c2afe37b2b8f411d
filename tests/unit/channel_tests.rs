//! Unit tests for the client push channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_relay::relay::channel::{ClientChannel, CloseReason, Frame};
use chat_relay::relay::event::StreamEvent;
use chat_relay::AppError;
use tokio_stream::StreamExt;

const IDLE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn send_delivers_an_encoded_chunk_frame() {
    let (channel, mut frames) = ClientChannel::new("s1", 8, IDLE);

    channel
        .send(&StreamEvent::Content("hi".into()))
        .await
        .expect("send");
    let frame = frames.next().await.expect("frame");
    assert_eq!(
        frame,
        Frame::Chunk(r#"{"type":"CONTENT","content":"hi"}"#.into())
    );
}

#[tokio::test]
async fn connect_frame_carries_the_session_id() {
    let (channel, mut frames) = ClientChannel::new("s2", 8, IDLE);
    assert_eq!(channel.session_id(), "s2");

    channel.send_connect().await.expect("send connect");
    let frame = frames.next().await.expect("frame");
    assert_eq!(
        frame,
        Frame::Connect(r#"{"type":"CONNECT","streamId":"s2"}"#.into())
    );
}

#[tokio::test]
async fn close_emits_the_close_sentinel() {
    let (channel, mut frames) = ClientChannel::new("s3", 8, IDLE);

    channel.close(CloseReason::Completed);
    assert_eq!(frames.next().await, Some(Frame::Close));
}

#[tokio::test]
async fn send_after_close_is_channel_closed() {
    let (channel, _frames) = ClientChannel::new("s4", 8, IDLE);

    channel.close(CloseReason::Completed);
    let result = channel.send(&StreamEvent::Start).await;
    assert!(matches!(result, Err(AppError::ChannelClosed)));
}

#[tokio::test]
async fn send_after_peer_disconnect_is_channel_closed() {
    let (channel, frames) = ClientChannel::new("s5", 8, IDLE);
    drop(frames);

    let result = channel.send(&StreamEvent::Start).await;
    assert!(matches!(result, Err(AppError::ChannelClosed)));
}

#[tokio::test]
async fn completion_hook_fires_exactly_once() {
    let (channel, _frames) = ClientChannel::new("s6", 8, IDLE);
    let fired = Arc::new(AtomicUsize::new(0));

    channel.on_completion({
        let fired = Arc::clone(&fired);
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    });

    channel.close(CloseReason::Completed);
    channel.close(CloseReason::Completed);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn only_the_matching_hook_fires() {
    let (channel, _frames) = ClientChannel::new("s7", 8, IDLE);
    let completions = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));

    channel.on_completion({
        let completions = Arc::clone(&completions);
        move || {
            completions.fetch_add(1, Ordering::SeqCst);
        }
    });
    channel.on_error({
        let errors = Arc::clone(&errors);
        move || {
            errors.fetch_add(1, Ordering::SeqCst);
        }
    });

    channel.close(CloseReason::Error);
    // A second close with a different reason is a no-op.
    channel.close(CloseReason::Completed);

    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(completions.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn idle_watchdog_fires_the_timeout_hook() {
    let (channel, mut frames) = ClientChannel::new("s8", 8, Duration::from_millis(100));
    let timeouts = Arc::new(AtomicUsize::new(0));

    channel.on_timeout({
        let timeouts = Arc::clone(&timeouts);
        move || {
            timeouts.fetch_add(1, Ordering::SeqCst);
        }
    });

    // No sends: the watchdog closes the channel on its own.
    assert_eq!(frames.next().await, Some(Frame::Close));
    assert!(channel.is_closed());
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn close_before_timeout_disarms_the_watchdog() {
    let (channel, _frames) = ClientChannel::new("s9", 8, Duration::from_millis(100));
    let timeouts = Arc::new(AtomicUsize::new(0));

    channel.on_timeout({
        let timeouts = Arc::clone(&timeouts);
        move || {
            timeouts.fetch_add(1, Ordering::SeqCst);
        }
    });

    channel.close(CloseReason::Completed);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(timeouts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn clones_share_close_state() {
    let (channel, _frames) = ClientChannel::new("s10", 8, IDLE);
    let clone = channel.clone();

    channel.close(CloseReason::Completed);
    assert!(clone.is_closed());
    let result = clone.send(&StreamEvent::Start).await;
    assert!(matches!(result, Err(AppError::ChannelClosed)));
}
