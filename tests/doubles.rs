use async_patch::mocks::LogCapture;
use async_patch::{
    AnyMock, AsyncMock, AttributeSpec, BuildError, CallLedger, ConfigurationError, DoubleKind,
    Failure, Mock, MockBuilder, Outcome, Settings, TIMEOUT_ENV,
};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, PartialEq)]
struct Closed;

type Client = Mock<(), u32, Closed>;

#[test]
fn test_builder_rejects_invalid_configurations() {
    let missing = MockBuilder::<(), u32, Closed>::new("send").build().unwrap_err();
    assert_eq!(missing, BuildError::MissingOutcome("send".into()));
    assert_eq!(missing.to_string(), "callable double `send` needs an outcome");

    let holder = MockBuilder::<(), u32, Closed>::new("holder")
        .with_kind(DoubleKind::NonCallable)
        .returning(1)
        .build();
    assert_eq!(holder.unwrap_err(), BuildError::OutcomeOnNonCallable("holder".into()));

    let keys = MockBuilder::<(), u32, Closed>::new("send")
        .returning(1)
        .with_container_keys(["a"])
        .build();
    assert_eq!(keys.unwrap_err(), BuildError::ContainerProtocolUnsupported("send".into()));

    let mismatch = MockBuilder::<(), u32, Closed>::new("send")
        .with_kind(DoubleKind::Callable)
        .returning(1)
        .build_async();
    assert!(matches!(
        mismatch.unwrap_err(),
        BuildError::KindMismatch { found: DoubleKind::Callable, .. }
    ));
}

#[test]
fn test_builder_variants() {
    let sync = MockBuilder::<(), u32, Closed>::new("send").returning_default().build().unwrap();
    assert!(matches!(sync, AnyMock::Sync(_)));
    assert_eq!(sync.as_sync().unwrap().call(()).unwrap(), 0);

    let deferred = MockBuilder::<(), u32, Closed>::new("fetch")
        .raising(Closed)
        .build_async()
        .unwrap();
    assert_eq!(deferred.kind(), DoubleKind::DeferredResult);
    let failure = futures::executor::block_on(deferred.call(())).unwrap_err();
    assert_eq!(**failure.error().unwrap(), Closed);
}

#[test]
fn test_shared_ledger_between_doubles() {
    let ledger = CallLedger::new();
    let read = AsyncMock::<u8, u8, Closed>::builder("read")
        .returning(1)
        .with_ledger(ledger.clone())
        .build_async()
        .unwrap();
    let write = AsyncMock::<u8, u8, Closed>::builder("write")
        .returning(2)
        .with_ledger(ledger.clone())
        .build_async()
        .unwrap();

    futures::executor::block_on(async {
        read.call(10).await.unwrap();
        write.call(20).await.unwrap();
    });

    assert!(read.ledger().same_ledger(write.ledger()));
    assert_eq!(ledger.completed_args(), [10, 20]);
}

#[test]
fn test_children_follow_spec() {
    let spec = AttributeSpec::new().attribute("close").deferred_attribute("fetch");
    let client = Client::builder("client")
        .with_kind(DoubleKind::NonCallable)
        .with_spec(spec)
        .build_sync()
        .unwrap();

    let fetch = client.child("fetch").unwrap();
    let close = client.child("close").unwrap();
    let other = client.child("other").unwrap();

    assert_eq!(fetch.kind(), DoubleKind::DeferredResult);
    assert_eq!(close.kind(), DoubleKind::Callable);
    assert_eq!(other.kind(), DoubleKind::Callable);
    assert_eq!(fetch.name(), "client.fetch");

    let value = futures::executor::block_on(fetch.as_deferred().unwrap().call(())).unwrap();
    assert_eq!(value, 0);
    assert!(client.child("fetch").unwrap().ledger().same_ledger(fetch.ledger()));
}

#[test]
fn test_strict_spec_rejects_unknown_children() {
    let client = Client::builder("client")
        .returning(0)
        .with_spec(AttributeSpec::new().attribute("close").strict())
        .build_sync()
        .unwrap();

    assert!(client.child("close").is_ok());
    assert_eq!(
        client.child("fetch").unwrap_err(),
        ConfigurationError::MissingAttribute {
            container: "client".into(),
            name: "fetch".into(),
        }
    );
}

#[test]
fn test_sync_double_assertions() {
    let send = Mock::<&str, bool, Closed>::new(
        "send",
        Outcome::function(|payload: &&str| {
            if payload.is_empty() {
                Outcome::raise(Closed)
            } else {
                Outcome::value(true)
            }
        }),
    );

    assert!(send.call("hello").unwrap());
    assert!(matches!(send.call(""), Err(Failure::Raised(_))));

    send.assert_called().unwrap();
    send.assert_called_with(&"").unwrap();
    send.assert_any_call(&"hello").unwrap();
    send.assert_has_calls(&["", "hello"], true).unwrap();
    assert!(send.assert_has_calls(&["", "hello"], false).is_err());
    assert_eq!(send.call_args_list(), ["hello", ""]);

    send.reset_mock();
    send.assert_not_called().unwrap();
    assert_eq!(send.call_args(), None);
}

#[test]
fn test_container_protocol_double() {
    let headers = Client::builder("headers")
        .with_kind(DoubleKind::CallableWithContainerProtocol)
        .returning(0)
        .with_container_keys(["host"])
        .build_sync()
        .unwrap();

    assert!(!headers.is_empty().unwrap());
    assert!(headers.contains("host").unwrap());
    assert_eq!(
        headers.child("nested").unwrap().kind(),
        DoubleKind::CallableWithContainerProtocol
    );
}

#[test]
fn test_invalid_timeout_is_logged() {
    let capture = LogCapture::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    let settings = tracing::subscriber::with_default(subscriber, || {
        Settings::from_lookup(|key| (key == TIMEOUT_ENV).then(|| "soon".to_string()))
    });

    assert_eq!(settings, Settings::default());
    assert_eq!(capture.count_at(Level::WARN), 1);
    let events = capture.events();
    let event = &events[0];
    assert!(event.message.contains("invalid timeout"));
    assert_eq!(event.fields["value"], "soon");
}

#[test]
fn test_child_generation_is_logged() {
    let capture = LogCapture::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let client = Client::returning("client", 0);

    tracing::subscriber::with_default(subscriber, || {
        client.child("close").unwrap();
        client.child("close").unwrap();
    });

    assert_eq!(capture.count(), 1);
    assert_eq!(capture.events()[0].fields["double"], "client.close");
}
