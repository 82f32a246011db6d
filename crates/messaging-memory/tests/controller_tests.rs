use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use neuron_messaging::delivery::{EXACTLY_ONCE, PEER_TO_PEER};
use neuron_messaging::request::RequestHandler;
use neuron_messaging::transport::ConsumerLimit;
use neuron_messaging::{
    Controller, ControllerOptions, Decode, Encode, Error, Handler, Integrity, Json, Mode,
    PubSubConfig, Slot,
};
use neuron_messaging_memory::MemoryTransport;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct Reading {
    sensor: String,
    value: i64,
}

fn controller() -> Controller<MemoryTransport> {
    Controller::new(MemoryTransport::new(), ControllerOptions::default())
}

fn exactly_once(topic: &str) -> PubSubConfig {
    PubSubConfig::new(topic).with_integrity(Integrity::ExactlyOnce)
}

async fn consumers(controller: &Controller<MemoryTransport>, stream: &str) -> usize {
    controller.streams().stream_info(stream).await.unwrap().consumers
}

async fn wait_for_consumer(controller: &Controller<MemoryTransport>, stream: &str) {
    timeout(Duration::from_secs(1), async {
        loop {
            if controller.streams().exists(stream).await.unwrap()
                && consumers(controller, stream).await > 0
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_peer_to_peer_admits_a_single_subscriber() {
    let controller = controller();
    let config = PubSubConfig::new("foo").with_mode(Mode::PeerToPeer);
    controller.publish("data_foo", &config).await.unwrap();

    let _first = controller
        .subscribe(&config, Slot::<String>::new())
        .await
        .unwrap();
    let second = controller.subscribe(&config, Slot::<String>::new()).await;

    assert!(matches!(second, Err(Error::ConsumerLimitExceeded(topic)) if topic == "foo"));
}

#[tokio::test]
async fn test_broadcast_delivers_to_every_subscriber() {
    let controller = controller();
    let config = PubSubConfig::new("foo");
    controller.streams()
        .ensure_stream("foo", ["foo"], ConsumerLimit::Unbounded)
        .await
        .unwrap();

    let first = Slot::<String>::new();
    let second = Slot::<String>::new();
    let _a = controller.subscribe(&config, first.clone()).await.unwrap();
    let _b = controller.subscribe(&config, second.clone()).await.unwrap();

    controller.publish("data_foo", &config).await.unwrap();

    for slot in [first, second] {
        let value = timeout(Duration::from_secs(1), slot.wait()).await.unwrap();
        assert_eq!(value.as_deref(), Some("data_foo"));
    }
}

#[tokio::test]
async fn test_exactly_once_late_joiner_sees_only_the_latest() {
    let controller = controller();
    let config = exactly_once("counter");

    for n in 1..=5_u32 {
        controller.publish(&Json(n), &config).await.unwrap();
    }

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let _subscription = controller
        .subscribe(
            &config,
            Handler::value(move |value: Json<u32>| {
                let _ = sender.send(value.into_inner());
            }),
        )
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(1), receiver.recv()).await.unwrap();
    assert_eq!(first, Some(5));

    let more = timeout(Duration::from_millis(50), receiver.recv()).await;
    assert!(more.is_err());
}

#[tokio::test]
async fn test_exactly_once_round_trips_text_bytes_and_structured_values() {
    let controller = controller();

    controller.publish("data_foo", &exactly_once("text")).await.unwrap();
    let text = Slot::<String>::new();
    let _text = controller.subscribe(&exactly_once("text"), text.clone()).await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), text.wait()).await.unwrap().as_deref(),
        Some("data_foo")
    );

    let raw = Bytes::from_static(&[0, 159, 146, 150]);
    controller.publish(&raw, &exactly_once("raw")).await.unwrap();
    let bytes = Slot::<Bytes>::new();
    let _bytes = controller.subscribe(&exactly_once("raw"), bytes.clone()).await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), bytes.wait()).await.unwrap(),
        Some(raw)
    );

    let reading = Reading {
        sensor: "t1".to_string(),
        value: -4,
    };
    controller
        .publish(&Json(reading.clone()), &exactly_once("readings"))
        .await
        .unwrap();
    let structured = Slot::<Json<Reading>>::new();
    let _structured = controller
        .subscribe(&exactly_once("readings"), structured.clone())
        .await
        .unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), structured.wait())
            .await
            .unwrap()
            .map(Json::into_inner),
        Some(reading)
    );
}

#[tokio::test]
async fn test_request_and_reply_see_each_others_payloads() {
    let controller = controller();
    let pending = controller.listen("foo").await.unwrap();

    let requester = controller.clone();
    let request = tokio::spawn(async move {
        requester
            .request::<str, String>("foo", "data_foo", Duration::from_secs(1))
            .await
    });

    let received = pending
        .reply("receiver received!".encode().unwrap(), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(String::decode(received).unwrap(), "data_foo");
    assert_eq!(request.await.unwrap().unwrap(), "receiver received!");
    assert_eq!(consumers(&controller, "foo").await, 0);
}

#[tokio::test]
async fn test_respond_answers_a_request_sent_after_it_started() {
    let controller = controller();

    let responder = controller.clone();
    let response = tokio::spawn(async move {
        responder
            .respond::<String, str>("foo", "receiver received!", Duration::from_secs(1))
            .await
    });
    wait_for_consumer(&controller, "foo").await;

    let reply: String = controller
        .request("foo", "data_foo", Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(reply, "receiver received!");
    assert_eq!(response.await.unwrap().unwrap(), "data_foo");
}

#[derive(Clone)]
struct Shout;

#[async_trait]
impl RequestHandler for Shout {
    type Error = Infallible;

    async fn handle(&self, _subject: &str, request: Bytes) -> Result<Bytes, Infallible> {
        Ok(Bytes::from(request.to_ascii_uppercase()))
    }
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_replies() {
    let controller = controller();
    let _service = controller.serve("shout", Shout).await.unwrap();

    let first = controller.request::<str, String>("shout", "first", Duration::from_secs(1));
    let second = controller.request::<str, String>("shout", "second", Duration::from_secs(1));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), "FIRST");
    assert_eq!(second.unwrap(), "SECOND");
}

#[tokio::test]
async fn test_unanswered_request_times_out_and_releases_its_subscription() {
    let controller = controller();

    let result = controller
        .request::<str, String>("quiet", "data_foo", Duration::from_millis(100))
        .await;

    assert!(matches!(
        result,
        Err(Error::Timeout { subject, timeout }) if subject == "quiet" && timeout == Duration::from_millis(100)
    ));
    assert_eq!(consumers(&controller, "quiet").await, 0);
}

#[tokio::test]
async fn test_cancelled_request_releases_its_subscription() {
    let controller = controller();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = controller
        .request_with_cancel::<str, String>("quiet", "data_foo", Duration::from_secs(5), &cancel)
        .await;

    assert!(matches!(result, Err(Error::Cancelled(subject)) if subject == "quiet"));
    assert_eq!(consumers(&controller, "quiet").await, 0);
}

#[tokio::test]
async fn test_responder_without_request_times_out() {
    let controller = controller();

    let pending = controller.listen("idle").await.unwrap();
    assert_eq!(consumers(&controller, "idle").await, 1);

    let result = pending
        .reply(Bytes::new(), Duration::from_millis(50))
        .await;

    assert!(matches!(result, Err(Error::Timeout { .. })));
    assert_eq!(consumers(&controller, "idle").await, 0);
}

#[tokio::test]
async fn test_undecodable_messages_reach_the_error_channel() {
    let controller = controller();
    let config = PubSubConfig::new("readings");
    controller
        .streams()
        .ensure_stream("readings", ["readings"], ConsumerLimit::Unbounded)
        .await
        .unwrap();

    let slot = Slot::<Json<Reading>>::new();
    let mut subscription = controller.subscribe(&config, slot.clone()).await.unwrap();

    controller.publish("not a reading", &config).await.unwrap();

    let failure = timeout(Duration::from_secs(1), subscription.next_error())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.subject, "readings");
    assert_eq!(failure.sequence, 1);
    assert!(!slot.is_set());
}

#[tokio::test]
async fn test_undrained_error_channel_does_not_stall_delivery() {
    let controller = Controller::new(
        MemoryTransport::new(),
        ControllerOptions {
            error_buffer: 1,
            ..ControllerOptions::default()
        },
    );
    let config = PubSubConfig::new("readings");
    controller
        .streams()
        .ensure_stream("readings", ["readings"], ConsumerLimit::Unbounded)
        .await
        .unwrap();

    let slot = Slot::<Json<u32>>::new();
    let subscription = controller.subscribe(&config, slot.clone()).await.unwrap();

    controller.publish("bad1", &config).await.unwrap();
    controller.publish("bad2", &config).await.unwrap();
    controller.publish(&Json(7_u32), &config).await.unwrap();

    let value = timeout(Duration::from_secs(1), slot.wait()).await.unwrap();
    assert_eq!(value, Some(Json(7)));
    assert_eq!(subscription.dropped_errors(), 1);
}

#[tokio::test]
async fn test_repeated_requests_do_not_grow_the_stream_subjects() {
    let controller = controller();
    let _service = controller.serve("shout", Shout).await.unwrap();

    let reply = controller
        .request::<str, String>("shout", "first", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, "FIRST");
    let subjects = controller.streams().stream_info("shout").await.unwrap().subjects;

    for n in 0..50 {
        let request = format!("data_{n}");
        controller
            .request::<str, String>("shout", &request, Duration::from_secs(1))
            .await
            .unwrap();
    }

    let info = controller.streams().stream_info("shout").await.unwrap();
    assert_eq!(info.subjects, subjects);
    assert_eq!(info.subjects.len(), 2);
    assert!(info.subjects.contains("StreamResponsePrefix.*.shout"));
}

#[tokio::test]
async fn test_delete_previous_clears_history() {
    let controller = controller();
    let config = PubSubConfig::new("foo");

    controller.publish("one", &config).await.unwrap();
    controller.publish("two", &config).await.unwrap();
    assert_eq!(controller.streams().stream_info("foo").await.unwrap().messages, 2);

    let ack = controller
        .publish("three", &config.clone().with_delete_previous(true))
        .await
        .unwrap();

    assert_eq!(ack.sequence, 1);
    assert_eq!(controller.streams().stream_info("foo").await.unwrap().messages, 1);
}

#[tokio::test]
async fn test_deleting_or_purging_a_missing_stream_succeeds() {
    let controller = controller();

    controller.streams().delete_stream("nope").await.unwrap();
    controller.streams().purge_stream("nope").await.unwrap();
    assert!(!controller.streams().exists("nope").await.unwrap());
}

#[tokio::test]
async fn test_extending_subjects_keeps_the_consumer_limit() {
    let controller = controller();
    let config = PubSubConfig {
        topic: "foo".to_string(),
        mode: PEER_TO_PEER.to_string(),
        integrity: EXACTLY_ONCE.to_string(),
        delete_previous: false,
    };
    controller.publish("data_foo", &config).await.unwrap();

    let info = controller
        .streams()
        .extend_subjects("foo", ["foo", "foo.reply"])
        .await
        .unwrap();

    assert_eq!(info.consumer_limit, ConsumerLimit::Single);
    assert!(info.subjects.contains("foo.reply"));
}

#[tokio::test]
async fn test_unsubscribe_frees_the_peer_to_peer_slot() {
    let controller = controller();
    let config = PubSubConfig::new("foo").with_mode(Mode::PeerToPeer);
    controller.publish("data_foo", &config).await.unwrap();

    let first = controller
        .subscribe(&config, Slot::<String>::new())
        .await
        .unwrap();
    controller.unsubscribe(first).await.unwrap();

    controller
        .subscribe(&config, Slot::<String>::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_closed_controller_reports_transport_errors() {
    let controller = controller();
    controller.close().await.unwrap();

    let result = controller.publish("data_foo", &PubSubConfig::new("foo")).await;

    assert!(matches!(result, Err(Error::Transport(_))));
}
