//! Supervision tests across the worker kernel's public surface.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_controller::worker::{
    clean_kill, dirty_kill, with_deadline, GroupBuilder, ResourceStack, Supervised, TerminationError, Worker,
    WorkerError, WorkerState,
};

/// A worker that holds one resource until killed and counts releases.
fn idle(name: &'static str, released: Arc<AtomicUsize>) -> Supervised {
    Supervised::spawn(name, move |lc| async move {
        let mut resources = ResourceStack::new(name);
        resources.push("token", move || async move {
            released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        lc.dying().await;
        resources.release().await
    })
}

#[tokio::test]
async fn test_group_of_three_with_failing_setup() {
    let released = Arc::new(AtomicUsize::new(0));
    let first = idle("first", released.clone());
    let third = idle("third", released.clone());

    let setup_error = WorkerError::setup("second", io::Error::other("address in use"));
    let reported = setup_error.clone();
    let second = Supervised::spawn("second", move |_lc| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err(reported)
    });

    let group = GroupBuilder::new("trio")
        .add("first", first.clone())
        .add("second", second.clone())
        .add("third", third.clone())
        .start();

    let err = tokio::time::timeout(Duration::from_secs(2), group.wait())
        .await
        .expect("group did not stop")
        .unwrap_err();
    assert!(err.same_as(&setup_error));

    // Siblings were killed without a reason, so they stop cleanly.
    for sibling in [&first, &third] {
        let outcome = tokio::time::timeout(Duration::from_secs(2), sibling.wait())
            .await
            .expect("sibling did not stop");
        assert!(outcome.is_ok(), "{}: {outcome:?}", sibling.name());
    }
    assert!(second.wait().await.unwrap_err().same_as(&setup_error));

    for child in [&first, &second, &third] {
        assert_eq!(child.state(), WorkerState::Dead);
    }
    assert_eq!(released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_nested_groups_propagate_kill() {
    let released = Arc::new(AtomicUsize::new(0));
    let inner = GroupBuilder::new("inner")
        .add("a", idle("a", released.clone()))
        .add("b", idle("b", released.clone()))
        .start();
    let outer = GroupBuilder::new("outer")
        .add("inner", inner.clone())
        .add("c", idle("c", released.clone()))
        .start();

    clean_kill(&outer, Duration::from_secs(2)).await.unwrap();
    assert_eq!(inner.state(), WorkerState::Dead);
    assert_eq!(released.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_deadline_turns_hang_into_timeout() {
    let stuck: Arc<dyn Worker> = Arc::new(Supervised::spawn("stuck", |lc| async move {
        lc.dying().await;
        Ok(())
    }));
    let bounded = with_deadline("stuck", stuck.clone(), Duration::from_millis(30));

    let err = stuck.wait().await.unwrap_err();
    assert_eq!(err.as_label(), "timeout");
    bounded.wait().await.unwrap();
}

#[tokio::test]
async fn test_dirty_kill_tolerates_failure_clean_kill_does_not() {
    let failing = || {
        Supervised::spawn("failing-teardown", |lc| async move {
            lc.dying().await;
            Err(WorkerError::runtime("failing-teardown", io::Error::other("flush failed")))
        })
    };

    let outcome = dirty_kill(&failing(), Duration::from_secs(1)).await.unwrap();
    assert!(outcome.is_err());

    let err = clean_kill(&failing(), Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, TerminationError::Failed(_)));
}

#[tokio::test]
async fn test_wait_observes_outcome_from_many_callers() {
    let worker = Supervised::spawn("shared", |lc| async move {
        lc.dying().await;
        Ok(())
    });

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let worker = worker.clone();
            tokio::spawn(async move { worker.wait().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(waiters.iter().all(|w| !w.is_finished()));

    worker.kill();
    for waiter in waiters {
        assert!(waiter.await.unwrap().is_ok());
    }
}
