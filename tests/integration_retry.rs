use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use http::{Method, StatusCode};
use httpie::prelude::{
    Client, CustomAgent, Dispatcher, HttpStatusPolicy, HttpieError, MockDispatcher, MockReply,
    RequestOptions, RetryError, RetryOptions, Verdict, retry, retry_with_policy,
};
use tokio_util::sync::CancellationToken;

fn agent_client(mock: &Arc<MockDispatcher>) -> Client {
    let dispatcher: Arc<dyn Dispatcher> = mock.clone();
    Client::builder()
        .agent(
            CustomAgent::new("svc", "https://svc.internal.test", dispatcher)
                .expect("agent origin should parse"),
        )
        .build()
}

fn options(retries: u32) -> RetryOptions {
    RetryOptions::new()
        .retries(retries)
        .factor(1.0)
        .min_timeout(Duration::from_millis(10))
}

#[tokio::test(start_paused = true)]
async fn server_error_exceeds_retry_budget() {
    let mock = Arc::new(MockDispatcher::new());
    mock.intercept_persistent(
        Method::GET,
        "/health",
        MockReply::new(StatusCode::INTERNAL_SERVER_ERROR),
    );
    let client = agent_client(&mock);

    let error = retry_with_policy(
        |_| client.get("/svc/health", RequestOptions::new()),
        &options(2),
        &HttpStatusPolicy::default(),
    )
    .await
    .expect_err("500 keeps failing");

    assert_eq!(
        error.to_string(),
        "Exceeded the maximum number of allowed retries!"
    );
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn aborting_mid_backoff_stops_the_loop() {
    let mock = Arc::new(MockDispatcher::new());
    mock.intercept_persistent(
        Method::GET,
        "/health",
        MockReply::new(StatusCode::SERVICE_UNAVAILABLE),
    );
    let client = agent_client(&mock);
    let signal = CancellationToken::new();
    let options = RetryOptions::new()
        .forever(true)
        .min_timeout(Duration::from_secs(1))
        .signal(signal.clone());

    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        trigger.cancel();
    });

    let error = retry_with_policy(
        |_| client.get("/svc/health", RequestOptions::new()),
        &options,
        &HttpStatusPolicy::default(),
    )
    .await
    .expect_err("cancellation should abort");

    assert!(error.is_aborted());
    assert_eq!(error.to_string(), "Aborted");
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn closure_policy_can_accept_errors_as_values() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in_op = Arc::clone(&calls);

    let outcome = retry_with_policy(
        move |_| {
            let calls = Arc::clone(&calls_in_op);
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 3 {
                    Err::<String, String>(format!("fail {call}"))
                } else {
                    Err("fatal".to_owned())
                }
            }
        },
        &options(10),
        &|outcome: Result<String, String>| -> Verdict<String, String> {
            match outcome {
                Ok(value) => Verdict::Accept(value),
                Err(message) if message == "fatal" => Verdict::Accept(message),
                Err(_) => Verdict::Retry,
            }
        },
    )
    .await
    .expect("fatal is accepted by the closure");

    assert_eq!(outcome.data, "fatal");
    assert_eq!(outcome.metrics.attempt, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn attempt_context_carries_one_based_counter() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_in_op = Arc::clone(&seen);

    let outcome: Result<_, RetryError<HttpieError>> = retry(
        move |context| {
            let seen = Arc::clone(&seen_in_op);
            async move {
                seen.lock().expect("lock seen").push(context.attempt);
                if context.attempt < 2 {
                    Err(HttpieError::ConcurrencyLimitClosed)
                } else {
                    Ok(context.attempt)
                }
            }
        },
        &options(3),
    )
    .await;

    let retried = outcome.expect("second attempt succeeds");
    assert_eq!(retried.data, 2);
    assert_eq!(retried.metrics.attempt, 1);
    assert_eq!(*seen.lock().expect("lock seen"), vec![1, 2]);
}
