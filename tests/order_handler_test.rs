use robot_device::framework::mock::RecordingSession;
use robot_device::framework::{DeliveryGuarantee, TransportError};
use robot_device::lifecycle::{shutdown_channel, DeviceConfig, RobotDevice};
use robot_device::order_handler::{
    DuplicatePolicy, HandlerError, InstantSimulator, OrderHandler, OrderOutcome, RetryPolicy,
    SleepSimulator,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn instant_handler(session: &Arc<RecordingSession>) -> OrderHandler {
    OrderHandler::new(session.clone(), Arc::new(InstantSimulator))
}

/// The canonical exchange: one order on arm-7 yields one completion on arm-7.
#[tokio::test]
async fn test_order_yields_completion_on_device_success_topic() {
    let session = Arc::new(RecordingSession::new());
    session
        .expect_publish("robots/arm-7/success")
        .with_json(json!({"TaskToken": "abc123"}))
        .return_ok();
    let handler = instant_handler(&session);

    let outcome = handler
        .handle_order("robots/arm-7/order", br#"{"task_token":"abc123"}"#)
        .await
        .expect("order should complete");

    assert_eq!(
        outcome,
        OrderOutcome::Completed {
            device_id: "arm-7".into(),
            task_token: "abc123".into(),
            topic: "robots/arm-7/success".into(),
            attempts: 1,
        }
    );
    let sent = session.published();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].guarantee, DeliveryGuarantee::AtLeastOnce);
    session.verify();
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);

    handler
        .handle_order(
            "robots/blender/order",
            br#"{"task_token":"t-9","smoothie":"Mango","priority":3}"#,
        )
        .await
        .expect("order should complete");

    let sent = session.published_to("robots/blender/success");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].json(), json!({"TaskToken": "t-9"}));
}

#[tokio::test]
async fn test_missing_token_publishes_nothing() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);

    let result = handler.handle_order("robots/arm-7/order", b"{}").await;
    assert!(matches!(result, Err(HandlerError::MalformedOrder { .. })));

    let result = handler
        .handle_order("robots/arm-7/order", br#"{"task_token": 42}"#)
        .await;
    assert!(matches!(result, Err(HandlerError::MalformedOrder { .. })));

    assert!(session.published().is_empty());
    assert_eq!(handler.stats().malformed, 2);
}

#[tokio::test]
async fn test_topic_without_device_segment_is_rejected() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);

    let result = handler
        .handle_order("robots", br#"{"task_token":"abc"}"#)
        .await;
    assert!(matches!(result, Err(HandlerError::InvalidTopic(_))));

    let result = handler
        .handle_order("robots//order", br#"{"task_token":"abc"}"#)
        .await;
    assert!(matches!(result, Err(HandlerError::InvalidTopic(_))));

    assert!(session.published().is_empty());
}

#[tokio::test]
async fn test_each_device_completes_on_its_own_topic() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);

    for (device, token) in [("arm-1", "t1"), ("arm-2", "t2"), ("arm-3", "t3")] {
        handler
            .handle_order(
                &format!("robots/{device}/order"),
                json!({"task_token": token}).to_string().as_bytes(),
            )
            .await
            .expect("order should complete");
    }

    for (device, token) in [("arm-1", "t1"), ("arm-2", "t2"), ("arm-3", "t3")] {
        let sent = session.published_to(&format!("robots/{device}/success"));
        assert_eq!(sent.len(), 1, "one completion for {device}");
        assert_eq!(sent[0].json(), json!({"TaskToken": token}));
    }
}

#[tokio::test]
async fn test_token_is_echoed_verbatim() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);
    let token = "AAAAKgAAAAIAAAAA/ünïcødé \"quoted\" \\ token";

    handler
        .handle_order(
            "robots/arm-7/order",
            json!({"task_token": token}).to_string().as_bytes(),
        )
        .await
        .expect("order should complete");

    let sent = session.published_to("robots/arm-7/success");
    assert_eq!(sent[0].json()["TaskToken"], token);
}

#[tokio::test]
async fn test_redelivery_republishes_by_default() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);
    let payload = br#"{"task_token":"dup"}"#;

    handler.handle_order("robots/arm-7/order", payload).await.unwrap();
    handler.handle_order("robots/arm-7/order", payload).await.unwrap();

    assert_eq!(session.published_to("robots/arm-7/success").len(), 2);
}

#[tokio::test]
async fn test_redelivery_suppressed_when_configured() {
    let session = Arc::new(RecordingSession::new());
    let handler =
        instant_handler(&session).with_duplicates(DuplicatePolicy::Suppress { capacity: 16 });
    let payload = br#"{"task_token":"dup"}"#;

    handler.handle_order("robots/arm-7/order", payload).await.unwrap();
    let second = handler.handle_order("robots/arm-7/order", payload).await.unwrap();

    assert!(matches!(second, OrderOutcome::DuplicateSuppressed { .. }));
    assert_eq!(session.published_to("robots/arm-7/success").len(), 1);
    assert_eq!(handler.stats().duplicates_suppressed, 1);
}

#[tokio::test]
async fn test_completion_waits_for_work() {
    let session = Arc::new(RecordingSession::new());
    let work = Duration::from_millis(50);
    let handler = OrderHandler::new(session.clone(), Arc::new(SleepSimulator::new(work)));

    let started = tokio::time::Instant::now();
    handler
        .handle_order("robots/arm-7/order", br#"{"task_token":"slow"}"#)
        .await
        .unwrap();

    let sent = session.published_to("robots/arm-7/success");
    assert!(sent[0].at.duration_since(started) >= work);
}

#[tokio::test]
async fn test_publish_failure_without_retry_is_reported() {
    let session = Arc::new(RecordingSession::new());
    session
        .expect_publish("robots/arm-7/success")
        .return_err(TransportError::Closed);
    let handler = instant_handler(&session);

    let result = handler
        .handle_order("robots/arm-7/order", br#"{"task_token":"lost"}"#)
        .await;

    match result {
        Err(HandlerError::PublishFailure {
            task_token,
            attempts,
            source,
            ..
        }) => {
            assert_eq!(task_token, "lost");
            assert_eq!(attempts, 1);
            assert_eq!(source, TransportError::Closed);
        }
        other => panic!("expected a publish failure, got {other:?}"),
    }
    assert!(session.published_to("robots/arm-7/success").is_empty());
    assert_eq!(handler.stats().publish_failures, 1);
    session.verify();
}

#[tokio::test]
async fn test_publish_retried_until_accepted() {
    let session = Arc::new(RecordingSession::new());
    let rejected = TransportError::PublishRejected {
        topic: "robots/arm-7/success".into(),
        reason: "broker busy".into(),
    };
    session
        .expect_publish("robots/arm-7/success")
        .return_err(rejected.clone());
    session
        .expect_publish("robots/arm-7/success")
        .return_err(rejected);
    session
        .expect_publish("robots/arm-7/success")
        .with_json(json!({"TaskToken": "retry-me"}))
        .return_ok();

    let handler = instant_handler(&session).with_retry(RetryPolicy::exponential(
        3,
        Duration::from_millis(5),
        Duration::from_millis(20),
    ));

    let outcome = handler
        .handle_order("robots/arm-7/order", br#"{"task_token":"retry-me"}"#)
        .await
        .unwrap();

    assert!(matches!(outcome, OrderOutcome::Completed { attempts: 3, .. }));
    assert_eq!(session.published().len(), 3);
    assert_eq!(session.published_to("robots/arm-7/success").len(), 1);
    session.verify();
}

#[tokio::test]
async fn test_shutdown_during_work_publishes_nothing() {
    let session = Arc::new(RecordingSession::new());
    let (trigger, signal) = shutdown_channel();
    let handler = OrderHandler::new(
        session.clone(),
        Arc::new(SleepSimulator::new(Duration::from_secs(10))),
    )
    .with_shutdown(signal);

    let (result, _) = tokio::join!(
        handler.handle_order("robots/arm-7/order", br#"{"task_token":"late"}"#),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        }
    );

    assert!(matches!(result, Err(HandlerError::Cancelled { ref task_token }) if task_token == "late"));
    assert!(session.published().is_empty());
    assert_eq!(handler.stats().cancelled, 1);
}

/// Deliveries arrive through the session; failures are logged, never surfaced.
#[tokio::test]
async fn test_device_subscribes_and_survives_bad_orders() {
    let session = Arc::new(RecordingSession::new());
    let device = RobotDevice::with_simulator(
        session.clone(),
        &DeviceConfig::default(),
        Arc::new(InstantSimulator),
    );
    device.start().await.unwrap();

    assert_eq!(
        session.subscriptions(),
        vec![("robots/+/order".to_string(), DeliveryGuarantee::AtLeastOnce)]
    );

    assert_eq!(session.deliver("robots/arm-7/order", "not json").await, 1);
    assert_eq!(session.deliver("robots/arm-7/order", "{}").await, 1);
    assert_eq!(
        session
            .deliver("robots/arm-7/order", r#"{"task_token":"ok"}"#)
            .await,
        1
    );

    assert_eq!(session.published_to("robots/arm-7/success").len(), 1);
    let stats = device.stats();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_non_object_payload_is_malformed() {
    let session = Arc::new(RecordingSession::new());
    let handler = instant_handler(&session);

    let payloads: [&[u8]; 4] = [br#"["abc123"]"#, br#""abc123""#, b"42", b"null"];
    for payload in payloads {
        let result = handler.handle_order("robots/arm-7/order", payload).await;
        assert!(
            matches!(result, Err(HandlerError::MalformedOrder { .. })),
            "{} gave {result:?}",
            String::from_utf8_lossy(payload)
        );
    }

    assert!(session.published().is_empty());
    assert_eq!(handler.stats().malformed, 4);
}

/// A redelivery that overlaps a failing attempt completes the order itself.
#[tokio::test]
async fn test_overlapping_redelivery_completes_after_failed_publish() {
    let session = Arc::new(RecordingSession::new());
    session
        .expect_publish("robots/arm-7/success")
        .return_err(TransportError::Closed);
    session
        .expect_publish("robots/arm-7/success")
        .with_json(json!({"TaskToken": "flaky"}))
        .return_ok();
    let handler = OrderHandler::new(
        session.clone(),
        Arc::new(SleepSimulator::new(Duration::from_millis(50))),
    )
    .with_duplicates(DuplicatePolicy::Suppress { capacity: 16 });
    let payload = br#"{"task_token":"flaky"}"#;

    let (first, second) = tokio::join!(handler.handle_order("robots/arm-7/order", payload), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handler.handle_order("robots/arm-7/order", payload).await
    });

    assert!(matches!(first, Err(HandlerError::PublishFailure { .. })));
    assert!(matches!(second, Ok(OrderOutcome::Completed { .. })), "{second:?}");
    assert_eq!(session.published_to("robots/arm-7/success").len(), 1);
    session.verify();
}

#[tokio::test]
async fn test_overlapping_redelivery_suppressed_after_success() {
    let session = Arc::new(RecordingSession::new());
    let handler = OrderHandler::new(
        session.clone(),
        Arc::new(SleepSimulator::new(Duration::from_millis(50))),
    )
    .with_duplicates(DuplicatePolicy::Suppress { capacity: 16 });
    let payload = br#"{"task_token":"twice"}"#;

    let (first, second) = tokio::join!(handler.handle_order("robots/arm-7/order", payload), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handler.handle_order("robots/arm-7/order", payload).await
    });

    assert!(matches!(first, Ok(OrderOutcome::Completed { .. })));
    assert!(matches!(second, Ok(OrderOutcome::DuplicateSuppressed { .. })));
    assert_eq!(session.published_to("robots/arm-7/success").len(), 1);
}

#[tokio::test]
async fn test_shutdown_interrupts_retry_backoff() {
    let session = Arc::new(RecordingSession::new());
    session
        .expect_publish("robots/arm-7/success")
        .return_err(TransportError::Closed);
    let (trigger, signal) = shutdown_channel();
    let handler = instant_handler(&session)
        .with_retry(RetryPolicy::exponential(
            3,
            Duration::from_secs(10),
            Duration::from_secs(10),
        ))
        .with_shutdown(signal);

    let started = tokio::time::Instant::now();
    let (result, _) = tokio::join!(
        handler.handle_order("robots/arm-7/order", br#"{"task_token":"backoff"}"#),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        }
    );

    assert!(matches!(result, Err(HandlerError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.published().len(), 1);
    assert!(session.published_to("robots/arm-7/success").is_empty());
    session.verify();
}

#[tokio::test]
async fn test_orders_after_shutdown_are_dropped() {
    let session = Arc::new(RecordingSession::new());
    let device = RobotDevice::with_simulator(
        session.clone(),
        &DeviceConfig::default(),
        Arc::new(InstantSimulator),
    );
    device.start().await.unwrap();
    device.shutdown();

    assert_eq!(
        session
            .deliver("robots/arm-7/order", r#"{"task_token":"too-late"}"#)
            .await,
        1
    );

    assert!(session.published().is_empty());
    let stats = device.stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 0);
}
