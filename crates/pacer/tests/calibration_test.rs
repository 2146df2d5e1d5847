//! Calibration under concurrent first responses.
//!
//! Lives in its own test binary because it installs a global subscriber that
//! counts calibration events across worker threads.

use pacer::{CallContext, Controller, Discard, Method, StatusCode};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CALIBRATED: &str = "Calibrated rate limiter from response headers";

/// Counts events whose message marks a limiter swap.
#[derive(Clone, Default)]
struct CalibrationCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CalibrationCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor::default();
        event.record(&mut message);
        if message.0 == CALIBRATED {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_calibration_runs_once_under_concurrent_first_responses() {
    let counter = CalibrationCounter::default();
    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(counter.clone()))
        .unwrap();

    let server = MockServer::start().await;
    let racers: Vec<u32> = (0..16).collect();
    let limit_for = |racer: u32| 6000 + 60 * racer;

    for &racer in &racers {
        Mock::given(method("GET"))
            .and(path(format!("/burst/{}", racer)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-RateLimit-Limit", limit_for(racer).to_string())
                    .set_body_json(serde_json::json!({"ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/later"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-RateLimit-Limit", "60"))
        .expect(1)
        .mount(&server)
        .await;

    let controller = Arc::new(Controller::new(&server.uri(), []).unwrap());
    let mut tasks = JoinSet::new();
    for &racer in &racers {
        let controller = controller.clone();
        tasks.spawn(async move {
            let ctx = CallContext::new();
            let request = controller
                .build_request(&ctx, Method::GET, &format!("burst/{}", racer), None::<&()>)
                .unwrap();
            controller
                .dispatch_json::<serde_json::Value>(&request)
                .await
                .map(|(response, _)| *response.status())
        });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), StatusCode::OK);
    }
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);

    let calibration = controller.calibration().expect("calibrated");
    let winner = racers
        .iter()
        .copied()
        .find(|racer| f64::from(limit_for(*racer)) == calibration.limit_per_minute())
        .expect("calibrated from one of the racing responses");
    let per_second = f64::from(limit_for(winner)) / 60.0;
    assert!((calibration.rate() - per_second * 0.66).abs() < 1e-9);
    assert_eq!(calibration.burst(), (per_second * 0.33).floor() as u32);

    // A later response advertising another limit changes nothing
    let ctx = CallContext::new();
    let request = controller
        .build_request(&ctx, Method::GET, "later", None::<&()>)
        .unwrap();
    controller.dispatch(&request, &mut Discard).await.unwrap();

    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    assert_eq!(controller.calibration(), Some(calibration));
}
