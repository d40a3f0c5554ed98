// End-to-end tests: a real server on an ephemeral loopback port and real
// client streams against it.

use simpleperf::{
    Client, Config, Error, ProgressEvent, Server, SessionSummary, SizeUnit, StreamMode,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

type Sessions = Arc<Mutex<Vec<SessionSummary>>>;

async fn start_server(format: SizeUnit) -> (SocketAddr, Sessions) {
    let sessions: Sessions = Arc::new(Mutex::new(Vec::new()));
    let sink = sessions.clone();

    let server = Server::new(Config::server(0).with_format(format).with_json(true))
        .with_callback(move |event| {
            if let ProgressEvent::SessionCompleted(summary) = event {
                sink.lock().unwrap().push(summary);
            }
        });

    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (addr, sessions)
}

async fn wait_for_sessions(sessions: &Sessions, count: usize) -> Vec<SessionSummary> {
    timeout(Duration::from_secs(10), async {
        loop {
            {
                let done = sessions.lock().unwrap();
                if done.len() >= count {
                    return done.clone();
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server did not finish its sessions in time")
}

fn client_config(addr: SocketAddr) -> Config {
    Config::client(addr.ip().to_string(), addr.port())
        .with_stagger(Duration::from_millis(50))
        .with_json(true)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_byte_count_megabytes_end_to_end() {
    let (addr, sessions) = start_server(SizeUnit::MB).await;

    let config = client_config(addr)
        .with_format(SizeUnit::MB)
        .with_num_bytes(Some(2_000_000));
    let results = Client::new(config).unwrap().run().await;

    assert_eq!(results.len(), 1);
    let result = results.into_iter().next().unwrap().unwrap();
    assert_eq!(result.mode, StreamMode::ByteCount);
    assert_eq!(result.bytes_sent, 2_000_000);
    assert!(result.intervals.is_empty());
    let summary = result.summary.expect("byte count mode has a summary");
    assert_eq!(summary.transfer, 2.0);
    assert_eq!(summary.unit, SizeUnit::MB);

    let done = wait_for_sessions(&sessions, 1).await;
    assert_eq!(done[0].bytes_received, 2_000_000);
    assert_eq!(done[0].transfer, 2.0);
    assert_eq!(done[0].unit, SizeUnit::MB);
    assert!(!done[0].sentinel_seen, "client closes without sending BYE");
    assert_eq!(done[0].peer, result.local_addr);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_byte_count_exact_multiple() {
    let (addr, sessions) = start_server(SizeUnit::B).await;

    let config = client_config(addr).with_num_bytes(Some(5_000));
    let results = Client::new(config).unwrap().run().await;
    let result = results.into_iter().next().unwrap().unwrap();
    assert_eq!(result.bytes_sent, 5_000);

    let done = wait_for_sessions(&sessions, 1).await;
    assert_eq!(done[0].bytes_received, 5_000);
    assert_eq!(done[0].transfer, 5_000.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interval_windows_and_aggregate() {
    let (addr, sessions) = start_server(SizeUnit::MB).await;

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let config = client_config(addr)
        .with_duration(Duration::from_millis(400))
        .with_interval(Some(Duration::from_millis(200)));
    let client = Client::new(config)
        .unwrap()
        .with_callback(move |event| sink.lock().unwrap().push(event));

    let result = client.run().await.into_iter().next().unwrap().unwrap();

    assert_eq!(result.mode, StreamMode::Interval);
    assert_eq!(result.intervals.len(), 2);
    assert_eq!(result.intervals[0].label, "0-0.2");
    assert_eq!(result.intervals[1].label, "0.2-0.4");
    for sample in &result.intervals {
        assert!(sample.bytes > 0);
        assert_eq!(sample.bytes % 1000, 0);
    }
    let window_total: u64 = result.intervals.iter().map(|s| s.bytes).sum();
    assert_eq!(window_total, result.bytes_sent);
    assert!(result.summary.is_some());

    let events = events.lock().unwrap().clone();
    let updates = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::IntervalUpdate { .. }))
        .count();
    assert_eq!(updates, 2);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::StreamCompleted { summary: Some(_), .. })));

    let done = wait_for_sessions(&sessions, 1).await;
    assert_eq!(done[0].bytes_received, result.bytes_sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_window_label_may_exceed_duration() {
    let (addr, _sessions) = start_server(SizeUnit::MB).await;

    let config = client_config(addr)
        .with_duration(Duration::from_millis(250))
        .with_interval(Some(Duration::from_millis(100)));
    let result = Client::new(config)
        .unwrap()
        .run()
        .await
        .into_iter()
        .next()
        .unwrap()
        .unwrap();

    let labels: Vec<_> = result.intervals.iter().map(|s| s.label.clone()).collect();
    assert_eq!(labels, ["0-0.1", "0.1-0.2", "0.2-0.3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interval_unset_single_window() {
    let (addr, sessions) = start_server(SizeUnit::KB).await;

    let config = client_config(addr)
        .with_duration(Duration::from_millis(200))
        .with_interval(None);
    let result = Client::new(config)
        .unwrap()
        .run()
        .await
        .into_iter()
        .next()
        .unwrap()
        .unwrap();

    assert_eq!(result.mode, StreamMode::SingleWindow);
    assert_eq!(result.intervals.len(), 1);
    assert!(result.summary.is_none());

    let done = wait_for_sessions(&sessions, 1).await;
    assert_eq!(done[0].bytes_received, result.bytes_sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_streams_are_independent() {
    let (addr, sessions) = start_server(SizeUnit::B).await;

    let config = client_config(addr)
        .with_parallel(3)
        .with_num_bytes(Some(10_000));
    let results = Client::new(config).unwrap().run().await;

    assert_eq!(results.len(), 3);
    let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    let ids: Vec<_> = results.iter().map(|r| r.stream_id).collect();
    assert_eq!(ids, [5, 7, 9]);

    let locals: HashSet<_> = results.iter().map(|r| r.local_addr).collect();
    assert_eq!(locals.len(), 3, "each stream has its own connection");

    for result in &results {
        assert_eq!(result.bytes_sent, 10_000);
    }

    let done = wait_for_sessions(&sessions, 3).await;
    assert_eq!(done.len(), 3);
    for summary in &done {
        assert_eq!(summary.bytes_received, 10_000);
        assert!(locals.contains(&summary.peer));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_start_is_staggered() {
    let (addr, _sessions) = start_server(SizeUnit::B).await;

    let config = client_config(addr)
        .with_parallel(3)
        .with_stagger(Duration::from_millis(150))
        .with_num_bytes(Some(1_000));

    let started = std::time::Instant::now();
    let results = Client::new(config).unwrap().run().await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opt_in_sentinel_is_acknowledged() {
    let (addr, sessions) = start_server(SizeUnit::B).await;

    let config = client_config(addr)
        .with_num_bytes(Some(3_000))
        .with_sentinel(true)
        .with_io_timeout(Some(Duration::from_secs(5)));
    let result = Client::new(config)
        .unwrap()
        .run()
        .await
        .into_iter()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(result.bytes_sent, 3_000);

    let done = wait_for_sessions(&sessions, 1).await;
    assert!(done[0].sentinel_seen);
    assert_eq!(done[0].bytes_received, 3_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connection_refused() {
    // Reserve a port, then free it so nothing listens there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let errors = Arc::new(Mutex::new(0usize));
    let sink = errors.clone();
    let config = client_config(addr).with_num_bytes(Some(1_000));
    let client = Client::new(config).unwrap().with_callback(move |event| {
        if let ProgressEvent::Error(_) = event {
            *sink.lock().unwrap() += 1;
        }
    });

    let results = client.run().await;
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::Connect { .. })));
    assert_eq!(*errors.lock().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_failure_aborts_only_that_stream() {
    // A peer that accepts and immediately hangs up.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    let config = client_config(addr)
        .with_duration(Duration::from_secs(3))
        .with_interval(Some(Duration::from_secs(1)));
    let results = Client::new(config).unwrap().run().await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::SendFailure(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_stream_leaves_siblings_running() {
    // The first connection is dropped at once; the others are read to the end.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut accepted = 0usize;
        while let Ok((mut socket, _)) = listener.accept().await {
            accepted += 1;
            if accepted == 1 {
                drop(socket);
                continue;
            }
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut socket, &mut tokio::io::sink()).await;
            });
        }
    });

    let config = client_config(addr)
        .with_parallel(3)
        .with_num_bytes(Some(20_000_000));
    let results = Client::new(config).unwrap().run().await;

    assert_eq!(results.len(), 3);
    let failures = results
        .iter()
        .filter(|r| matches!(r, Err(Error::SendFailure(_))))
        .count();
    assert_eq!(failures, 1);

    let completed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(completed.len(), 2);
    for result in completed {
        assert_eq!(result.bytes_sent, 20_000_000);
        assert!(result.summary.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_server_survives_reset_peer() {
    let (addr, sessions) = start_server(SizeUnit::B).await;

    // A client that connects and goes away without sending anything.
    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    drop(stream);

    let config = client_config(addr).with_num_bytes(Some(4_000));
    let result = Client::new(config)
        .unwrap()
        .run()
        .await
        .into_iter()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(result.bytes_sent, 4_000);

    let done = wait_for_sessions(&sessions, 2).await;
    let bytes: HashSet<_> = done.iter().map(|s| s.bytes_received).collect();
    assert!(bytes.contains(&4_000));
    assert!(bytes.contains(&0));
}
