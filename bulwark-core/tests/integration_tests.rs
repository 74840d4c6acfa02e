//! Integration tests for the executor wired to real adapters
//!
//! These tests drive the public API the way a service would: configuration loaded
//! through figment, Prometheus metrics, a shared breaker registry and concurrent callers.

use bulwark_core::prelude::*;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn isolated_executor(metrics: Arc<PrometheusToolMetrics>) -> (ToolExecutor, Arc<BreakerRegistry>) {
    let breakers = Arc::new(BreakerRegistry::new());
    let executor = ToolExecutor::builder()
        .breakers(breakers.clone())
        .metrics(metrics)
        .logger(Arc::new(TracingAttemptLogger))
        .build();
    (executor, breakers)
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_success_exported_to_prometheus() {
    let metrics = Arc::new(PrometheusToolMetrics::new().unwrap());
    let (executor, _) = isolated_executor(metrics.clone());
    let config = ToolConfig::builder()
        .hard_timeout(Duration::from_millis(200))
        .retry_count(1)
        .jitter(Duration::from_millis(10), Duration::from_millis(20))
        .cache_ttl(Duration::ZERO)
        .build()
        .unwrap();

    let calls = AtomicU32::new(0);
    let result = executor
        .execute(
            &ToolContext::new("weather", "trace-e2e").with_run_id("run-1"),
            &config,
            |_p: Value| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                    Ok::<_, anyhow::Error>(json!({"forecast": "rain"}))
                }
            },
            json!({"city": "Paris", "days": 3}),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.value["forecast"], "rain");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(metrics.error_count("weather", ErrorReason::Timeout), 1);
    assert_eq!(metrics.latency_sample_count("weather", Outcome::Timeout), 1);
    assert_eq!(metrics.latency_sample_count("weather", Outcome::Success), 1);
    assert_eq!(metrics.cache_hit_count("weather"), 0);

    let exposition = metrics.render().unwrap();
    assert!(exposition.contains("tool_latency_ms_bucket"));
    assert!(exposition.contains(r#"reason="timeout""#));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_all_counted() {
    let metrics = Arc::new(PrometheusToolMetrics::new().unwrap());
    let (executor, breakers) = isolated_executor(metrics.clone());
    let config = ToolConfig::builder()
        .retry_count(0)
        .breaker_failure_threshold(5)
        .build()
        .unwrap();

    let calls = AtomicU32::new(0);
    let failing = |_p: Value| {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<Value, _>(anyhow::anyhow!("connection refused"))
        }
    };

    let contexts: Vec<ToolContext> = (0..10)
        .map(|i| ToolContext::new("flights", format!("trace-{i}")))
        .collect();
    let cancel = CancelToken::new();
    let results = join_all(
        contexts
            .iter()
            .map(|ctx| executor.execute(ctx, &config, failing, json!({}), &cancel)),
    )
    .await;

    assert!(results.iter().all(|r| matches!(r, Err(ToolError::Execution { .. }))));
    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert_eq!(metrics.error_count("flights", ErrorReason::ExecutionError), 10);

    let breaker = breakers.get("flights").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.failure_count(), 10);

    let rejected = executor
        .execute(&contexts[0], &config, failing, json!({}), &cancel)
        .await
        .unwrap_err();
    assert!(rejected.is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_cache() {
    let metrics = Arc::new(PrometheusToolMetrics::new().unwrap());
    let (executor, _) = isolated_executor(metrics.clone());
    let config = ToolConfig::builder()
        .cache_ttl(Duration::from_secs(600))
        .build()
        .unwrap();

    let calls = AtomicU32::new(0);
    let lookup = |p: Value| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, anyhow::Error>(json!({"rate": 1.1, "pair": p["pair"]})) }
    };
    let ctx = ToolContext::new("fx", "trace-fx");
    let cancel = CancelToken::new();

    executor
        .execute(&ctx, &config, lookup, json!({"pair": "USD/EUR"}), &cancel)
        .await
        .unwrap();

    let results = join_all(
        (0..5).map(|_| executor.execute(&ctx, &config, lookup, json!({"pair": "USD/EUR"}), &cancel)),
    )
    .await;

    assert!(results.iter().all(|r| r.as_ref().map(|v| v.is_cache_hit()).unwrap_or(false)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.cache_hit_count("fx"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_does_not_abort_in_flight_call() {
    let metrics = Arc::new(PrometheusToolMetrics::new().unwrap());
    let (executor, _) = isolated_executor(metrics);
    let config = ToolConfig::builder().build().unwrap();
    let cancel = CancelToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    };
    let ctx = ToolContext::new("attractions", "trace-cancel");
    let (result, ()) = tokio::join!(
        executor.execute(
            &ctx,
            &config,
            |_p: Value| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, anyhow::Error>(json!(["Louvre", "Orsay"]))
            },
            json!({"city": "Paris"}),
            &cancel,
        ),
        canceller,
    );

    let result = result.unwrap();
    assert_eq!(result.value, json!(["Louvre", "Orsay"]));
    assert!(cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_health_snapshot_reports_each_tool() {
    let metrics = Arc::new(PrometheusToolMetrics::new().unwrap());
    let (executor, breakers) = isolated_executor(metrics);
    let config = ToolConfig::builder()
        .retry_count(0)
        .breaker_failure_threshold(1)
        .build()
        .unwrap();
    let cancel = CancelToken::new();

    executor
        .execute(
            &ToolContext::new("weather", "t1"),
            &config,
            |_p: Value| async { Ok::<_, anyhow::Error>(json!("sunny")) },
            json!({}),
            &cancel,
        )
        .await
        .unwrap();
    executor
        .execute(
            &ToolContext::new("flights", "t2"),
            &config,
            |_p: Value| async { Err::<Value, _>(anyhow::anyhow!("503")) },
            json!({}),
            &cancel,
        )
        .await
        .unwrap_err();

    let snapshot = breakers.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].tool, "flights");
    assert_eq!(snapshot[0].state, CircuitState::Open);
    assert!(!snapshot[0].healthy);
    assert_eq!(snapshot[1].tool, "weather");
    assert!(snapshot[1].healthy);

    assert!(executor.is_healthy("weather"));
    assert!(!executor.is_healthy("flights"));
    assert!(executor.is_healthy("never-called"));

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json[0]["state"], "open");
}

#[test]
fn test_per_tool_overrides_from_config_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "bulwark.toml",
            r#"
            [defaults]
            hard_timeout = "1s"
            retry_count = 2

            [tools.weather]
            cache_ttl = "10m"

            [tools.flights]
            retry_count = 0
            breaker_failure_threshold = 3
            "#,
        )?;
        jail.set_env("BULWARK_TOOLS__FLIGHTS__HARD_TIMEOUT", "750ms");

        let config = BulwarkConfig::load().expect("config loads");

        let weather = config.config_for("weather").unwrap();
        assert_eq!(weather.cache_ttl(), Duration::from_secs(600));
        assert_eq!(weather.retry_count(), 2);
        assert_eq!(weather.hard_timeout(), Duration::from_secs(1));

        let flights = config.config_for("flights").unwrap();
        assert_eq!(flights.retry_count(), 0);
        assert_eq!(flights.breaker_failure_threshold(), 3);
        assert_eq!(flights.hard_timeout(), Duration::from_millis(750));

        let other = config.config_for("fx").unwrap();
        assert_eq!(other, config.defaults);
        Ok(())
    });
}
