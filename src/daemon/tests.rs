use crate::daemon::history::SECONDS_PER_DAY;
use crate::daemon::{
    ClientId, Message, MessageDecoder, State, encode, handle_connection,
    protocol::{IAmCamera, IAmDispatcher, Plate, Ticket, WantHeartbeat},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

/// The client end of an in-memory connection to a session.
struct TestClient {
    stream: DuplexStream,
    decoder: MessageDecoder,
}

impl TestClient {
    async fn send(&mut self, message: Message) {
        self.send_raw(&encode(&message).unwrap()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next message from the server, or `None` once it hangs up.
    async fn recv(&mut self) -> Option<Message> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(message) = self.decoder.next_message().unwrap() {
                return Some(message);
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return None;
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    async fn recv_within(&mut self, limit: Duration) -> Option<Message> {
        timeout(limit, self.recv())
            .await
            .expect("timed out waiting for the server")
    }
}

fn connect(state: &Arc<State>) -> (TestClient, JoinHandle<anyhow::Result<()>>) {
    let (client, server) = tokio::io::duplex(4096);
    let id: ClientId = state.next_client_id();
    let handle = tokio::spawn(handle_connection(server, id, Arc::clone(state)));

    let client = TestClient {
        stream: client,
        decoder: MessageDecoder::new(),
    };
    (client, handle)
}

fn camera(road: u16, mile: u16, limit: u16) -> Message {
    Message::IAmCamera(IAmCamera { road, mile, limit })
}

fn dispatcher(roads: Vec<u16>) -> Message {
    Message::IAmDispatcher(IAmDispatcher { roads })
}

fn plate(plate: &str, timestamp: u32) -> Message {
    Message::Plate(Plate {
        plate: plate.to_string(),
        timestamp,
    })
}

async fn wait_for_pending(state: &State, road: u16, count: usize) {
    timeout(Duration::from_secs(5), async {
        while state.registry.pending(road).await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tickets were never queued");
}

async fn expect_error_and_close(client: &mut TestClient) {
    match client.recv_within(Duration::from_secs(5)).await {
        Some(Message::Error(_)) => {}
        other => panic!("expected an error, got {:?}", other),
    }
    assert_eq!(client.recv_within(Duration::from_secs(5)).await, None);
}

#[tokio::test]
async fn test_camera_pair_tickets_dispatcher() {
    let state = Arc::new(State::new());

    let (mut camera1, _) = connect(&state);
    camera1.send(camera(123, 8, 60)).await;
    camera1.send(plate("UN1X", 0)).await;

    let (mut camera2, _) = connect(&state);
    camera2.send(camera(123, 9, 60)).await;
    camera2.send(plate("UN1X", 45)).await;

    let (mut dispatch, _) = connect(&state);
    dispatch.send(dispatcher(vec![123])).await;

    assert_eq!(
        dispatch.recv_within(Duration::from_secs(5)).await,
        Some(Message::Ticket(Ticket {
            plate: "UN1X".to_string(),
            road: 123,
            mile1: 8,
            timestamp1: 0,
            mile2: 9,
            timestamp2: 45,
            speed: 8000,
        }))
    );
}

#[tokio::test]
async fn test_queued_tickets_delivered_in_order() {
    let state = Arc::new(State::new());

    let (mut camera1, _) = connect(&state);
    camera1.send(camera(7, 0, 60)).await;
    let (mut camera2, _) = connect(&state);
    camera2.send(camera(7, 10, 60)).await;

    camera1.send(plate("FIRST", 0)).await;
    camera2.send(plate("FIRST", 300)).await;
    wait_for_pending(&state, 7, 1).await;

    camera1.send(plate("SECOND", 1000)).await;
    camera2.send(plate("SECOND", 1300)).await;
    wait_for_pending(&state, 7, 2).await;

    let (mut dispatch, _) = connect(&state);
    dispatch.send(dispatcher(vec![7])).await;

    let mut plates = Vec::new();
    for _ in 0..2 {
        match dispatch.recv_within(Duration::from_secs(5)).await {
            Some(Message::Ticket(ticket)) => plates.push(ticket.plate),
            other => panic!("expected a ticket, got {:?}", other),
        }
    }
    assert_eq!(plates, vec!["FIRST", "SECOND"]);
}

#[tokio::test]
async fn test_camera_cannot_become_dispatcher() {
    let state = Arc::new(State::new());
    let (mut client, handle) = connect(&state);

    client.send(camera(123, 8, 60)).await;
    client.send(dispatcher(vec![123])).await;

    expect_error_and_close(&mut client).await;
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_dispatcher_cannot_become_camera() {
    let state = Arc::new(State::new());
    let (mut client, _) = connect(&state);

    client.send(dispatcher(vec![123])).await;
    client.send(camera(123, 8, 60)).await;

    expect_error_and_close(&mut client).await;
}

#[tokio::test]
async fn test_plate_before_identification() {
    let state = Arc::new(State::new());
    let (mut client, _) = connect(&state);

    client.send(plate("UN1X", 1000)).await;

    expect_error_and_close(&mut client).await;
}

#[tokio::test]
async fn test_malformed_message() {
    let state = Arc::new(State::new());
    let (mut client, _) = connect(&state);

    client.send_raw(&[0x99, 0x01, 0x02]).await;

    expect_error_and_close(&mut client).await;
}

#[tokio::test]
async fn test_duplicate_heartbeat_request() {
    let state = Arc::new(State::new());
    let (mut client, _) = connect(&state);

    client
        .send(Message::WantHeartbeat(WantHeartbeat { interval: 0 }))
        .await;
    client
        .send(Message::WantHeartbeat(WantHeartbeat { interval: 0 }))
        .await;

    expect_error_and_close(&mut client).await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_every_interval() {
    let state = Arc::new(State::new());
    let (mut client, _) = connect(&state);

    let start = Instant::now();
    client
        .send(Message::WantHeartbeat(WantHeartbeat { interval: 10 }))
        .await;

    for beat in 1..=3u32 {
        assert_eq!(
            client.recv_within(Duration::from_secs(5)).await,
            Some(Message::Heartbeat)
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(beat.into()));
        assert!(elapsed < Duration::from_millis(u64::from(beat) * 1000 + 100));
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_sends_no_heartbeat() {
    let state = Arc::new(State::new());
    let (mut client, _) = connect(&state);

    client
        .send(Message::WantHeartbeat(WantHeartbeat { interval: 0 }))
        .await;
    assert!(timeout(Duration::from_secs(30), client.recv()).await.is_err());

    // The connection is still usable.
    client.send(camera(1, 1, 60)).await;
    client.send(camera(1, 1, 60)).await;
    expect_error_and_close(&mut client).await;
}

#[tokio::test]
async fn test_dispatcher_disconnect_unregisters() {
    let state = Arc::new(State::new());
    let (mut client, handle) = connect(&state);

    client.send(dispatcher(vec![123, 124])).await;
    timeout(Duration::from_secs(5), async {
        while state.registry.dispatchers(123).await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    drop(client);
    assert!(handle.await.unwrap().is_ok());
    assert_eq!(state.registry.dispatchers(123).await, 0);
    assert_eq!(state.registry.dispatchers(124).await, 0);
}

#[tokio::test]
async fn test_observations_outlive_camera() {
    let state = Arc::new(State::new());

    let (mut camera1, handle) = connect(&state);
    camera1.send(camera(5, 0, 60)).await;
    camera1.send(plate("GONE", 0)).await;
    drop(camera1);
    handle.await.unwrap().unwrap();

    let (mut camera2, _) = connect(&state);
    camera2.send(camera(5, 10, 60)).await;
    camera2.send(plate("GONE", 300)).await;

    wait_for_pending(&state, 5, 1).await;
}

#[tokio::test]
async fn test_split_reads_with_mock_stream() {
    let error = encode(&Message::error("client is not identified")).unwrap();
    let stream = tokio_test::io::Builder::new()
        .read(&[0x20])
        .read(&[0x04, b'U', b'N'])
        .read(&[b'1', b'X', 0x00, 0x00])
        .read(&[0x03, 0xe8])
        .write(&error)
        .build();

    let state = Arc::new(State::new());
    handle_connection(stream, 0, state).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cameras_ticket_each_plate_once() {
    const PLATES: u32 = 50;
    const ROADS: [u16; 4] = [11, 12, 13, 14];
    let state = Arc::new(State::new());

    // Two cameras per road, 10 miles apart, report every plate 300s apart
    // (120 mph) at the same moment from separate connections.
    let mut senders = Vec::new();
    for road in ROADS {
        for (offset, mile) in [(0, 0), (300, 10)] {
            let (mut client, _) = connect(&state);
            senders.push(tokio::spawn(async move {
                client.send(camera(road, mile, 60)).await;
                for n in 0..PLATES {
                    let timestamp = n * SECONDS_PER_DAY + offset;
                    let name = format!("R{}CAR{}", road, n);
                    client.send(plate(&name, timestamp)).await;
                }
                client
            }));
        }
    }

    let mut clients = Vec::new();
    for sender in senders {
        clients.push(sender.await.unwrap());
    }

    for road in ROADS {
        wait_for_pending(&state, road, PLATES as usize).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    for road in ROADS {
        assert_eq!(state.registry.pending(road).await, PLATES as usize);
    }
    drop(clients);
}
