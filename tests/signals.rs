//! OS signal handling. Kept in its own binary: a raised signal reaches every
//! observer in the process.

#![cfg(unix)]

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{ScriptedListener, ServeScript, StopScript};
use runway::lifecycle::run_listener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_sighup_triggers_graceful_shutdown() {
    // Keep the default action (terminate) from applying to the test process.
    let _hangup = signal(SignalKind::hangup()).unwrap();

    let listener = ScriptedListener::new(ServeScript::UntilStopped, StopScript::After(Duration::from_millis(10)));
    let ctx = CancellationToken::new();
    let run = tokio::spawn({
        let listener = listener.clone();
        let ctx = ctx.clone();
        async move { run_listener(&ctx, listener, Duration::from_secs(1)).await }
    });

    // Let the observer install its handlers.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = std::process::Command::new("kill")
        .args(["-HUP", &std::process::id().to_string()])
        .status()
        .expect("kill available");
    assert!(status.success());

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run_listener returns after SIGHUP")
        .unwrap();
    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(listener.stop_calls.load(Ordering::SeqCst), 1);
    // Only the listener's own token tree was cancelled.
    assert!(!ctx.is_cancelled());
}
