//! Pool behavior under concurrent load
//!
//! These tests drive the pool through the scripted in-memory backend, so no
//! database server is required.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio_test::{assert_err, assert_ok};

use academia_pool::pool::testing::ScriptedBackend;
use academia_pool::{Pool, PoolConfig, PoolError};

fn config(max_connections: usize) -> PoolConfig {
    PoolConfig {
        max_connections,
        acquire_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test]
async fn test_third_acquire_fails_without_release() {
    let pool = Pool::new(config(2), ScriptedBackend::new()).unwrap();

    let _a = assert_ok!(pool.acquire_timeout(ms(100)).await);
    let _b = assert_ok!(pool.acquire_timeout(ms(100)).await);

    let started = tokio::time::Instant::now();
    let err = assert_err!(pool.acquire_timeout(ms(100)).await);
    assert!(matches!(err, PoolError::PoolExhausted { max_connections: 2, in_use: 2, .. }));
    assert!(started.elapsed() >= ms(100));
    assert_eq!(pool.stats().waiters, 0);
}

#[tokio::test]
async fn test_third_acquire_succeeds_after_release() {
    let pool = Pool::new(config(2), ScriptedBackend::new()).unwrap();

    let a = assert_ok!(pool.acquire_timeout(ms(100)).await);
    let _b = assert_ok!(pool.acquire_timeout(ms(100)).await);
    let released_id = a.id();

    let waiting_pool = pool.clone();
    let third = tokio::spawn(async move { waiting_pool.acquire_timeout(ms(500)).await });

    tokio::time::sleep(ms(20)).await;
    drop(a);

    let conn = assert_ok!(third.await.unwrap());
    assert_eq!(conn.id(), released_id);
    assert_eq!(pool.stats().in_use, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_concurrent_acquires_at_max_two() {
    let pool = Pool::new(config(2), ScriptedBackend::new()).unwrap();

    let results = join_all((0..3).map(|_| pool.acquire_timeout(ms(100)))).await;

    let (held, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    assert_eq!(held.len(), 2);
    assert_eq!(failed.len(), 1);
    for result in failed {
        assert!(matches!(result, Err(PoolError::PoolExhausted { max_connections: 2, .. })));
    }

    let stats = pool.stats();
    assert_eq!(stats.in_use, 2);
    assert_eq!(stats.waiters, 0);
    assert_eq!(stats.timed_out, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_never_exceeded_under_load() {
    const MAX: usize = 4;
    let pool = Pool::new(config(MAX), ScriptedBackend::new()).unwrap();
    let checked_out = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let held_ids = Arc::new(Mutex::new(HashSet::new()));

    let tasks = (0..32).map(|_| {
        let pool = pool.clone();
        let checked_out = Arc::clone(&checked_out);
        let peak = Arc::clone(&peak);
        let held_ids = Arc::clone(&held_ids);
        tokio::spawn(async move {
            for _ in 0..25 {
                let conn = pool.acquire_timeout(Duration::from_secs(10)).await.unwrap();
                assert!(
                    held_ids.lock().unwrap().insert(conn.id()),
                    "connection {} checked out twice",
                    conn.id()
                );

                let now = checked_out.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(pool.stats().total() <= MAX);

                let hold = rand::rng().random_range(0..3);
                tokio::time::sleep(ms(hold)).await;

                checked_out.fetch_sub(1, Ordering::SeqCst);
                held_ids.lock().unwrap().remove(&conn.id());
                drop(conn);
            }
        })
    });

    for result in join_all(tasks).await {
        result.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= MAX);
    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.waiters, 0);
    assert_eq!(stats.connecting, 0);
    assert!(stats.idle <= MAX);
    assert_eq!(stats.acquired, 32 * 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_churn_with_broken_connections_and_connect_failures() {
    const MAX: usize = 3;
    let backend = ScriptedBackend::new();
    let pool = Pool::new(config(MAX), backend.clone()).unwrap();

    let tasks = (0..16).map(|i| {
        let pool = pool.clone();
        let backend = backend.clone();
        tokio::spawn(async move {
            let mut successes = 0;
            for round in 0..20 {
                if (i + round) % 7 == 0 {
                    backend.fail_next_connects(1);
                }

                let mut conn = match pool.acquire_timeout(Duration::from_secs(10)).await {
                    Ok(conn) => conn,
                    Err(PoolError::ConnectFailed(_)) => continue,
                    Err(e) => panic!("unexpected acquire error: {e}"),
                };
                successes += 1;

                if (i * round) % 5 == 1 {
                    conn.mark_broken();
                }
                tokio::task::yield_now().await;
                pool.release(&mut conn).unwrap();
            }
            successes
        })
    });

    let successes: usize = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();
    assert!(successes > 0);

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.connecting, 0);
    assert_eq!(stats.waiters, 0);
    assert!(stats.idle <= MAX);
    assert!(stats.discarded > 0);
    assert_eq!(stats.created as usize, backend.connects() - stats.connect_failures as usize);
}

#[tokio::test]
async fn test_waiters_wake_in_arrival_order() {
    let pool = Pool::new(config(1), ScriptedBackend::new()).unwrap();
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut waiters = Vec::new();
    for n in 0..5 {
        let waiter_pool = pool.clone();
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            let conn = waiter_pool.acquire_timeout(Duration::from_secs(5)).await.unwrap();
            order.lock().unwrap().push(n);
            tokio::time::sleep(ms(2)).await;
            drop(conn);
        }));
        // Let each waiter enqueue before the next one arrives
        while pool.stats().waiters < n + 1 {
            tokio::task::yield_now().await;
        }
    }

    drop(held);
    for waiter in waiters {
        waiter.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_fails_all_waiters_promptly() {
    let pool = Pool::new(config(1), ScriptedBackend::new()).unwrap();
    let _held = pool.acquire().await.unwrap();

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(30)).await })
        })
        .collect();

    while pool.stats().waiters < 10 {
        tokio::time::sleep(ms(1)).await;
    }

    pool.shutdown().await;

    let results = tokio::time::timeout(Duration::from_secs(1), join_all(waiters))
        .await
        .expect("waiters did not finish after shutdown");
    for result in results {
        assert!(matches!(result.unwrap(), Err(PoolError::PoolClosed)));
    }
    assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));
}

#[tokio::test]
async fn test_connect_in_flight_during_shutdown_is_closed() {
    let backend = ScriptedBackend::new();
    backend.set_connect_delay(ms(50));
    let pool = Pool::new(config(1), backend.clone()).unwrap();

    let connecting_pool = pool.clone();
    let pending = tokio::spawn(async move { connecting_pool.acquire().await });
    tokio::time::sleep(ms(10)).await;
    assert_eq!(pool.stats().connecting, 1);

    pool.shutdown().await;

    assert!(matches!(pending.await.unwrap(), Err(PoolError::PoolClosed)));
    tokio::time::sleep(ms(10)).await;
    assert_eq!(backend.closed(), vec![1]);
    assert_eq!(pool.stats().total(), 0);
}

#[tokio::test]
async fn test_acquire_timeout_covers_slow_connect() {
    let backend = ScriptedBackend::new();
    backend.set_connect_delay(ms(200));
    let pool = Pool::new(config(1), backend).unwrap();

    let err = assert_err!(pool.acquire_timeout(ms(50)).await);
    assert!(matches!(err, PoolError::PoolExhausted { .. }));

    // The abandoned slot is free again
    let stats = pool.stats();
    assert_eq!(stats.connecting, 0);
    assert_eq!(stats.timed_out, 1);
}
