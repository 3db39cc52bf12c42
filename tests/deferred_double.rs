use async_patch::{AsyncMock, Failure, Namespace, Outcome, PatchGroup, Substitution, WithPatches};
use futures::task::noop_waker_ref;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

#[derive(Debug, PartialEq)]
struct Unavailable;

type Fetch = AsyncMock<u32, &'static str, Unavailable>;

fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
    let mut cx = Context::from_waker(noop_waker_ref());
    Pin::new(future).poll(&mut cx)
}

#[test]
fn test_completion_count_follows_driven_calls() {
    let fetch = Fetch::returning("fetch", "ok");

    for round in 1..=5 {
        let call = fetch.call(round);
        assert_eq!(fetch.call_count(), round as usize);
        assert_eq!(fetch.await_count(), round as usize - 1);

        futures::executor::block_on(call).unwrap();
        assert_eq!(fetch.await_count(), round as usize);
    }
    fetch.assert_awaited_with(&5).unwrap();
}

#[test]
fn test_out_of_order_completion_reports_latest_finished() {
    let fetch = Fetch::returning("fetch", "ok");
    let mut first = fetch.call(1);
    let mut second = fetch.call(2);

    assert!(poll_once(&mut second).is_ready());
    assert!(poll_once(&mut first).is_ready());

    assert_eq!(fetch.await_args(), Some(1));
    assert_eq!(fetch.await_args_list(), [2, 1]);
    fetch.assert_awaited_with(&1).unwrap();
    assert!(fetch.assert_awaited_with(&2).is_err());
    fetch.assert_any_await(&2).unwrap();
}

#[test]
fn test_has_awaits_ordered_and_any_order() {
    let fetch = Fetch::returning("fetch", "ok");
    futures::executor::block_on(async {
        for args in [3, 1, 2] {
            fetch.call(args).await.unwrap();
        }
    });

    fetch.assert_has_awaits(&[3, 2], false).unwrap();
    fetch.assert_has_awaits(&[2, 1], true).unwrap();

    let err = fetch.assert_has_awaits(&[2, 1], false).unwrap_err();
    assert!(err.to_string().contains("in order"));
    assert!(fetch.assert_has_awaits(&[4], true).is_err());
}

#[test]
fn test_values_then_exhausted() {
    let fetch = Fetch::new("fetch", Outcome::values(["a", "b"]));

    futures::executor::block_on(async {
        assert_eq!(fetch.call(0).await.unwrap(), "a");
        assert_eq!(fetch.call(0).await.unwrap(), "b");
        assert!(fetch.call(0).await.unwrap_err().is_exhausted());
    });

    assert_eq!(fetch.await_count(), 3);
    assert!(!fetch.ledger().completions()[2].is_success());
}

#[test]
fn test_raise_reuses_error_instance() {
    let fetch = Fetch::new("fetch", Outcome::raise(Unavailable));

    let (first, second) = futures::executor::block_on(async {
        (fetch.call(1).await.unwrap_err(), fetch.call(2).await.unwrap_err())
    });

    assert!(Arc::ptr_eq(first.error().unwrap(), second.error().unwrap()));
    assert_eq!(**first.error().unwrap(), Unavailable);
    fetch.assert_awaited().unwrap();
}

#[test]
fn test_dropped_call_records_no_completion() {
    let fetch = Fetch::returning("fetch", "ok");
    drop(fetch.call(1));

    fetch.assert_called().unwrap();
    fetch.assert_not_awaited().unwrap();
    assert_eq!(fetch.ledger().invocations()[0].args, 1);
}

#[test]
fn test_forwarded_deferred_result() {
    let (sender, receiver) = futures::channel::oneshot::channel();
    let fetch = Fetch::new(
        "fetch",
        Outcome::deferred(async move { receiver.await.map_err(|_| Failure::Exhausted) }),
    );

    let mut call = fetch.call(1);
    assert!(poll_once(&mut call).is_pending());
    fetch.assert_not_awaited().unwrap();

    sender.send("late").unwrap();
    assert!(matches!(poll_once(&mut call), Poll::Ready(Ok("late"))));
    fetch.assert_awaited_once_with(&1).unwrap();
}

#[tokio::test]
async fn test_waiter_skips_completions() {
    let fetch = Fetch::returning("fetch", "ok");
    fetch.call(1).await.unwrap();

    let wait = fetch.ledger().wait(1);
    assert_eq!(wait.threshold(), 3);
    let waiter = tokio::spawn(wait);

    tokio::time::sleep(Duration::from_millis(10)).await;
    fetch.call(2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    fetch.call(3).await.unwrap();
    let reached = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reached, 3);
}

#[test]
fn test_dropped_waiter_detaches() {
    let fetch = Fetch::returning("fetch", "ok");
    let mut waiter = fetch.ledger().wait(0);

    assert!(poll_once(&mut waiter).is_pending());
    assert_eq!(fetch.ledger().pending_waiters(), 1);

    drop(waiter);
    assert_eq!(fetch.ledger().pending_waiters(), 0);
    futures::executor::block_on(fetch.call(1)).unwrap();
}

#[test]
fn test_double_as_replacement_inside_patched_computation() {
    let http = Namespace::new("app.http");
    http.set("fetch", Fetch::returning("real_fetch", "real"));
    let double = Fetch::new("fetch", Outcome::function(|id: &u32| {
        if *id == 0 {
            Outcome::raise(Unavailable)
        } else {
            Outcome::value("fake")
        }
    }));

    let client = http.clone();
    let bodies = futures::executor::block_on(
        async move {
            let fetch = client.get("fetch").unwrap();
            let mut bodies = Vec::new();
            for id in [1, 0, 2] {
                bodies.push(fetch.call(id).await.ok());
            }
            bodies
        }
        .with_patches(
            PatchGroup::new().with(Substitution::object(&http, "fetch", double.clone()).limited()),
        ),
    )
    .unwrap();

    assert_eq!(bodies, [Some("fake"), None, Some("fake")]);
    double.assert_has_awaits(&[1, 0, 2], false).unwrap();
    assert_eq!(http.get("fetch").unwrap().name(), "real_fetch");
}
