//! Retry budget and spacing tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use autoupdate_core::{with_retry, DownloadError, FetchError, RetryPolicy};

#[tokio::test]
async fn test_always_failing_runs_max_retry_plus_one_with_spacing() {
    let delay = Duration::from_millis(40);
    let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let result: Result<(), FetchError> = with_retry(3, delay, "manifest.fetch", {
        let stamps = stamps.clone();
        move || {
            let stamps = stamps.clone();
            async move {
                let mut s = stamps.lock().unwrap();
                s.push(Instant::now());
                Err(FetchError::BadStatus {
                    status: 500 + s.len() as u16,
                })
            }
        }
    })
    .await;

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 4);
    for pair in stamps.windows(2) {
        assert!(
            pair[1] - pair[0] >= delay,
            "gap {:?} shorter than delay {:?}",
            pair[1] - pair[0],
            delay
        );
    }
    // Last error is returned, not the first.
    assert_eq!(result, Err(FetchError::BadStatus { status: 504 }));
}

#[tokio::test]
async fn test_digest_mismatch_is_never_retried() {
    let calls = Arc::new(Mutex::new(0u32));
    let policy = RetryPolicy::new(4, Duration::from_millis(1));

    let result: Result<(), DownloadError> = policy
        .run("package.download", {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Err(DownloadError::DigestMismatch {
                        expected: autoupdate_core::Sha256Digest::from_bytes(b"a"),
                        actual: autoupdate_core::Sha256Digest::from_bytes(b"b"),
                    })
                }
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_policy_waits_five_seconds_between_attempts() {
    let started = tokio::time::Instant::now();
    let result: Result<(), FetchError> = RetryPolicy::default()
        .run("manifest.fetch", || async {
            Err(FetchError::Timeout { limit_ms: 30_000 })
        })
        .await;

    assert!(result.is_err());
    // Three pauses for four attempts.
    assert!(started.elapsed() >= Duration::from_secs(15));
}
