mod common;

use common::{RecordingTransport, batch_config, event, scheduler, settle};
use shopfront_telemetry::buffer::{BatchConfig, FlushTrigger, SchedulerState};
use shopfront_telemetry::reliability::RetryConfig;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_partial_batch_flushes_once_after_quiescence_delay() {
    let transport = RecordingTransport::new();
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    scheduler.enqueue(event("a"));
    sleep(Duration::from_millis(100)).await;
    scheduler.enqueue(event("b"));
    sleep(Duration::from_millis(100)).await;
    scheduler.enqueue(event("c"));

    assert_eq!(scheduler.state(), SchedulerState::Armed);
    assert_eq!(scheduler.timers_armed(), 1);

    // t = 4999ms: the timer armed by the first event has not fired yet.
    sleep(Duration::from_millis(4799)).await;
    assert!(transport.attempts().is_empty());
    assert_eq!(scheduler.pending(), 3);

    sleep(Duration::from_millis(2)).await;
    assert_eq!(transport.delivered_sizes(), vec![3]);
    assert_eq!(transport.delivered_tags(), vec!["a", "b", "c"]);
    assert_eq!(transport.delivered()[0].trigger(), FlushTrigger::Time);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_flushes_immediately_and_cancels_timer() {
    let transport = RecordingTransport::new();
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    for i in 0..9 {
        scheduler.enqueue(event(&format!("e{i}")));
    }
    assert_eq!(scheduler.state(), SchedulerState::Armed);

    scheduler.enqueue(event("e9"));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.pending(), 0);

    settle().await;
    assert_eq!(transport.delivered_sizes(), vec![10]);
    assert_eq!(transport.delivered()[0].trigger(), FlushTrigger::Size);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(scheduler.timers_armed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_while_armed_does_not_restart_timer() {
    let transport = RecordingTransport::new();
    let (scheduler, _) = scheduler(batch_config(100, 5000), RetryConfig::default(), &transport);

    for _ in 0..20 {
        scheduler.enqueue(event("x"));
        sleep(Duration::from_millis(200)).await;
    }

    // Twenty events over 4s, all under one timer.
    assert_eq!(scheduler.timers_armed(), 1);
    sleep(Duration::from_millis(1001)).await;
    assert_eq!(transport.delivered_sizes(), vec![20]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_queue_at_fire_time_returns_to_idle() {
    let transport = RecordingTransport::new();
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    scheduler.enqueue(event("a"));
    assert!(scheduler.flush_now(FlushTrigger::Manual));
    assert!(!scheduler.flush_now(FlushTrigger::Manual));
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_is_retried_ahead_of_new_events() {
    let transport = RecordingTransport::failing(1);
    let (scheduler, stats) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    for i in 0..5 {
        scheduler.enqueue(event(&format!("old{i}")));
    }
    sleep(Duration::from_millis(5001)).await;

    assert_eq!(transport.attempts().len(), 1);
    assert!(transport.delivered().is_empty());
    assert_eq!(scheduler.pending(), 5);
    // Failure does not arm a timer by default.
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    scheduler.enqueue(event("new0"));
    scheduler.enqueue(event("new1"));
    sleep(Duration::from_millis(5001)).await;

    assert_eq!(transport.delivered_sizes(), vec![7]);
    assert_eq!(
        transport.delivered_tags(),
        vec!["old0", "old1", "old2", "old3", "old4", "new0", "new1"]
    );

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.batches_failed, 1);
    assert_eq!(snapshot.events_requeued, 5);
    assert_eq!(snapshot.batches_sent, 1);
    assert_eq!(snapshot.events_sent, 7);
}

#[tokio::test(start_paused = true)]
async fn test_requeue_goes_ahead_of_events_enqueued_during_send() {
    let transport = RecordingTransport::slow(Duration::from_millis(1000));
    transport.fail_next(1);
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    scheduler.enqueue(event("a"));
    scheduler.enqueue(event("b"));
    scheduler.flush_now(FlushTrigger::Manual);
    settle().await;

    scheduler.enqueue(event("c"));
    assert_eq!(scheduler.in_flight(), 1);

    sleep(Duration::from_millis(1000)).await;
    let queued: Vec<_> = scheduler
        .snapshot()
        .iter()
        .map(|e| e.event_type.to_string())
        .collect();
    assert_eq!(queued, vec!["a", "b", "c"]);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(transport.delivered_tags(), vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_without_new_events_waits_for_traffic() {
    let transport = RecordingTransport::failing(1);
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    scheduler.enqueue(event("a"));
    scheduler.flush_now(FlushTrigger::Manual);
    sleep(Duration::from_secs(60)).await;

    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(scheduler.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_on_failure_retries_with_backoff() {
    let transport = RecordingTransport::failing(2);
    let retry = RetryConfig {
        rearm_on_failure: true,
        base_delay: Duration::from_millis(1000),
        max_delay: Duration::from_secs(10),
        jitter: false,
    };
    let (scheduler, _) = scheduler(batch_config(10, 5000), retry, &transport);

    scheduler.enqueue(event("a"));
    scheduler.enqueue(event("b"));
    scheduler.flush_now(FlushTrigger::Manual);
    settle().await;

    assert_eq!(transport.attempts().len(), 1);
    assert_eq!(scheduler.state(), SchedulerState::Armed);

    // First retry after 1s fails again, second waits 2s.
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(transport.attempts().len(), 2);
    assert!(transport.delivered().is_empty());

    sleep(Duration::from_millis(2000)).await;
    assert_eq!(transport.delivered_sizes(), vec![2]);
    assert_eq!(transport.delivered()[0].trigger(), FlushTrigger::Retry);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_drops_oldest_events() {
    let transport = RecordingTransport::new();
    let config = BatchConfig {
        batch_size: 100,
        flush_delay: Duration::from_millis(5000),
        max_queue_size: 5,
    };
    let (scheduler, stats) = scheduler(config, RetryConfig::default(), &transport);

    for i in 0..7 {
        scheduler.enqueue(event(&format!("e{i}")));
    }

    let queued: Vec<_> = scheduler
        .snapshot()
        .iter()
        .map(|e| e.event_type.to_string())
        .collect();
    assert_eq!(queued, vec!["e2", "e3", "e4", "e5", "e6"]);
    assert_eq!(stats.snapshot().events_dropped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_sends_remaining_events() {
    let transport = RecordingTransport::new();
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    scheduler.enqueue(event("a"));
    scheduler.enqueue(event("b"));

    let report = scheduler.shutdown(Duration::from_secs(4)).await;
    assert_eq!(report.undelivered, 0);
    assert!(!report.timed_out);
    assert_eq!(transport.delivered_sizes(), vec![2]);
    assert_eq!(transport.delivered()[0].trigger(), FlushTrigger::Shutdown);

    // Nothing is armed once closed.
    scheduler.enqueue(event("late"));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(scheduler.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_reports_sends_outliving_grace() {
    let transport = RecordingTransport::slow(Duration::from_secs(10));
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    for _ in 0..3 {
        scheduler.enqueue(event("slow"));
    }

    let report = scheduler.shutdown(Duration::from_secs(4)).await;
    assert!(report.timed_out);
    assert_eq!(report.undelivered, 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_counts_failed_final_batch_as_undelivered() {
    let transport = RecordingTransport::failing(1);
    let (scheduler, _) = scheduler(batch_config(10, 5000), RetryConfig::default(), &transport);

    for _ in 0..4 {
        scheduler.enqueue(event("doomed"));
    }

    let report = scheduler.shutdown(Duration::from_secs(4)).await;
    assert!(!report.timed_out);
    assert_eq!(report.undelivered, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_delivers_every_event_once() {
    let transport = RecordingTransport::new();
    let (scheduler, _) = scheduler(batch_config(10, 50), RetryConfig::default(), &transport);

    let handles: Vec<_> = (0..8)
        .map(|task| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    scheduler.enqueue(event(&format!("t{task}-{i}")));
                    if i % 25 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let report = scheduler.shutdown(Duration::from_secs(5)).await;
    assert_eq!(report.undelivered, 0);

    let tags = transport.delivered_tags();
    assert_eq!(tags.len(), 800);
    assert_eq!(tags.iter().collect::<HashSet<_>>().len(), 800);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_undelivered_count_is_stable_while_sends_fail() {
    let transport = RecordingTransport::failing(usize::MAX);
    let (scheduler, _) = scheduler(batch_config(100, 60_000), RetryConfig::default(), &transport);

    for i in 0..25 {
        scheduler.enqueue(event(&format!("e{i}")));
    }

    let sampler = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            for _ in 0..2_000 {
                assert_eq!(scheduler.undelivered(), 25);
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..200 {
        scheduler.flush_now(FlushTrigger::Manual);
        tokio::task::yield_now().await;
    }
    sampler.await.unwrap();

    let report = scheduler.shutdown(Duration::from_secs(4)).await;
    assert_eq!(report.undelivered, 25);
    assert!(transport.delivered().is_empty());
}
