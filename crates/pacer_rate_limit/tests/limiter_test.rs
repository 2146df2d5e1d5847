//! Tests for token bucket waiting and cancellation.

use pacer_error::{Cancellation, PacerErrorKind};
use pacer_rate_limit::{CallContext, Calibration, RateLimiter, TokenBucket};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_unconstrained_wait_returns_immediately() {
    let bucket = TokenBucket::unconstrained();
    let ctx = CallContext::new();

    let start = Instant::now();
    for _ in 0..500 {
        bucket.wait(&ctx).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn test_wait_blocks_until_refill() {
    // 20 tokens per second, one at a time: the second wait sleeps ~50ms
    let bucket = TokenBucket::new(20.0, 1).unwrap();
    let ctx = CallContext::new();

    bucket.wait(&ctx).await.unwrap();
    let start = Instant::now();
    bucket.wait(&ctx).await.unwrap();
    assert!(
        start.elapsed() >= Duration::from_millis(30),
        "Second token should wait for refill, waited {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_cancelled_context_fails_even_when_unconstrained() {
    let ctx = CallContext::new();
    ctx.cancel();

    let err = TokenBucket::unconstrained().wait(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), &PacerErrorKind::Cancelled(Cancellation::Cancelled));
}

#[tokio::test]
async fn test_deadline_interrupts_wait() {
    // One token every ten seconds
    let bucket = TokenBucket::new(0.1, 1).unwrap();
    bucket.wait(&CallContext::new()).await.unwrap();

    let ctx = CallContext::with_timeout(Duration::from_millis(50));
    let start = Instant::now();
    let err = bucket.wait(&ctx).await.unwrap_err();

    assert_eq!(
        err.kind(),
        &PacerErrorKind::Cancelled(Cancellation::DeadlineExceeded)
    );
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancel_from_another_task() {
    let bucket = Arc::new(TokenBucket::new(0.1, 1).unwrap());
    bucket.wait(&CallContext::new()).await.unwrap();

    let ctx = CallContext::new();
    let waiter = {
        let bucket = Arc::clone(&bucket);
        let ctx = ctx.clone();
        tokio::spawn(async move { bucket.wait(&ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_shared_bucket_across_tasks() {
    let bucket = Arc::new(TokenBucket::new(1.0, 5).unwrap());
    let mut handles = Vec::new();
    for _ in 0..5 {
        let bucket = Arc::clone(&bucket);
        handles.push(tokio::spawn(async move {
            bucket.wait(&CallContext::new()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(!bucket.try_acquire(), "Burst should be spent by the five tasks");
}

#[tokio::test]
async fn test_calibrated_bucket_from_limit() {
    let bucket = Calibration::from_limit(7200.0).unwrap().bucket().unwrap();
    assert_eq!(bucket.burst(), 39);
    for _ in 0..39 {
        assert!(bucket.try_acquire());
    }
}
