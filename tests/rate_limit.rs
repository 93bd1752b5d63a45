use http::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use http::{Method, StatusCode};
use pagehook::prelude::*;
use pagehook::rate_limit::retry_message;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

const HOUR: u64 = 3_600_000;

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn five_per_hour_then_denied() {
    let clock = ManualClock::new(1_000);
    let limiter = FixedWindowLimiter::with_clock(clock.clone());
    let config = RateLimitConfig::default();

    for expected in (0..5).rev() {
        let result = limiter.check("1.2.3.4", &config);
        assert!(result.allowed);
        assert_eq!(result.remaining, expected);
        assert_eq!(result.reset_at, 1_000 + HOUR);
    }

    clock.advance(HOUR / 2);
    let denied = limiter.check("1.2.3.4", &config);
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after_minutes(clock.now_millis()), 30);
    assert_eq!(retry_message(denied.retry_after_minutes(clock.now_millis())), "Please try again in 30 minutes.");
}

#[test]
fn config_changes_apply_to_existing_windows() {
    let clock = ManualClock::new(0);
    let limiter = FixedWindowLimiter::with_clock(clock);
    let loose = RateLimitConfig::new(10, HOUR).unwrap();
    for _ in 0..3 {
        limiter.check("k", &loose);
    }
    let tight = RateLimitConfig::new(3, HOUR).unwrap();
    assert!(!limiter.check("k", &tight).allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_never_exceed_quota() {
    let limiter = Arc::new(FixedWindowLimiter::new());
    let config = RateLimitConfig::new(25, HOUR).unwrap();

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.check("shared", &config).allowed })
        })
        .collect();

    let mut allowed = 0;
    for task in tasks {
        if task.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 25);
    assert_eq!(limiter.store().get("shared").unwrap().count, 25);
}

#[test]
fn denial_is_logged_with_key() {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_target(true)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let limiter = FixedWindowLimiter::with_clock(ManualClock::new(0));
    let config = RateLimitConfig::new(1, 1_000).unwrap();
    limiter.check("203.0.113.7", &config);
    limiter.check("203.0.113.7", &config);

    let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("rate limit exceeded"), "{logs}");
    assert!(logs.contains("203.0.113.7"), "{logs}");
    assert!(logs.contains("WARN"), "{logs}");
}

#[tokio::test(start_paused = true)]
async fn sweeper_bounds_memory() {
    let clock = ManualClock::new(0);
    let limiter = Arc::new(FixedWindowLimiter::with_clock(clock.clone()));
    let config = RateLimitConfig::new(1, 60_000).unwrap();
    for i in 0..50 {
        limiter.check(&format!("10.0.0.{i}"), &config);
    }
    assert_eq!(limiter.store().len(), 50);

    let sweeper = Sweeper::start(limiter.clone(), Duration::from_secs(30));
    clock.advance(60_001);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(limiter.store().is_empty());
    sweeper.stop().await;
}

#[tokio::test]
async fn hook_rejects_with_429_per_client() {
    let clock = ManualClock::new(0);
    let limiter = Arc::new(FixedWindowLimiter::with_clock(clock));
    let config = DynamicConfig::new(RateLimitConfig::new(1, 30_000).unwrap());
    let pipeline = Sequence::new()
        .then(RateLimitHook::new(limiter, "feedback", config).only_when(|ctx| *ctx.method() == Method::POST))
        .resolve_with(resolver_fn(|_| Ok(Response::new("accepted".to_string()))));

    let post = |ip: &'static str| {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        RequestContext::new("https://blog.example/api/feedback".parse().unwrap())
            .with_method(Method::POST)
            .with_headers(headers)
    };

    assert_eq!(pipeline.handle(post("1.1.1.1")).await.unwrap().body(), "accepted");
    let throttled = pipeline.handle(post("1.1.1.1")).await.unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(throttled.headers()[RETRY_AFTER], "30");
    assert_eq!(throttled.body(), "Too many requests. Please try again in 1 minute.");

    assert_eq!(pipeline.handle(post("2.2.2.2")).await.unwrap().status(), StatusCode::OK);
}
