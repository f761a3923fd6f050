//! End-to-end transfer tests against an in-process IRC server and a
//! loopback DCC peer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use xdcc_core::{
    FileLocator, SupervisedTransfer, TlsPolicy, TransferConfig, TransferEvent,
};

/// 127.0.0.1 as the wire's big-endian u32.
const LOOPBACK_U32: u32 = 0x7F00_0001;

/// Collects events until a terminal one arrives.
async fn collect_events(mut rx: mpsc::Receiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for transfer events")
    {
        let terminal = matches!(
            event,
            TransferEvent::Completed | TransferEvent::Aborted { .. }
        );
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}

fn assert_event_invariants(events: &[TransferEvent]) {
    let started_at = events
        .iter()
        .position(|e| matches!(e, TransferEvent::Started { .. }));
    let terminal_count = events
        .iter()
        .filter(|e| matches!(e, TransferEvent::Completed | TransferEvent::Aborted { .. }))
        .count();
    assert!(terminal_count <= 1, "at most one terminal event");

    for (i, event) in events.iter().enumerate() {
        if matches!(event, TransferEvent::Progress { .. }) {
            let started = started_at.expect("progress without a start");
            assert!(started < i, "Started must precede Progress");
        }
    }
    if let Some(last) = events.last() {
        if matches!(last, TransferEvent::Completed) {
            assert!(started_at.is_some(), "Completed requires Started");
        }
    }
}

/// Serves `payload` to every DCC connection, then closes.
async fn spawn_dcc_peer(payload: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let _ = stream.write_all(payload).await;
            let _ = stream.shutdown().await;
        }
    });
    port
}

/// Minimal scripted IRC server side of one client connection.
struct IrcPeer {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    nick: String,
}

impl IrcPeer {
    fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
            nick: String::new(),
        }
    }

    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end().to_string()),
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Consumes registration (NICK + USER) and answers with RPL_WELCOME.
    async fn register(&mut self) {
        loop {
            let line = self.read_line().await.expect("client closed early");
            if let Some(rest) = line.strip_prefix("NICK ") {
                self.nick = rest.to_string();
            }
            if line.starts_with("USER ") {
                let welcome = format!(":testserver 001 {} :Welcome", self.nick);
                self.send(&welcome).await;
                return;
            }
        }
    }

    async fn echo_join(&mut self, channel: &str) {
        let line = format!(":{}!user@localhost JOIN {channel}", self.nick);
        self.send(&line).await;
    }

    async fn send_dcc_offer(&mut self, file: &str, port: u16, size: u64) {
        let line = format!(
            ":MegaBot!bot@localhost PRIVMSG {} :\u{1}SEND {file} {LOOPBACK_U32} {port} {size}\u{1}",
            self.nick
        );
        self.send(&line).await;
    }
}

fn test_config(irc_port: u16, out_dir: &std::path::Path) -> TransferConfig {
    TransferConfig {
        locator: FileLocator {
            network: format!("127.0.0.1:{irc_port}"),
            channel: "#movies".to_string(),
            user_name: "MegaBot".to_string(),
            slot: 42,
        },
        out_dir: out_dir.to_path_buf(),
        tls: TlsPolicy {
            no_ssl: true,
            ..TlsPolicy::default()
        },
    }
}

#[tokio::test]
async fn test_happy_path_transfer_writes_file_and_orders_events() {
    let payload = b"0123456789";
    let dcc_port = spawn_dcc_peer(payload).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("PRIVMSG MegaBot") && line.contains("xdcc send #42") {
                peer.send_dcc_offer("holiday.mkv", dcc_port, 10).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.expect("negotiation succeeds");

    let events = collect_events(events).await;
    assert_event_invariants(&events);

    assert!(matches!(
        events.first(),
        Some(TransferEvent::Started { file_name, file_size })
            if file_name == "holiday.mkv" && *file_size == 10
    ));
    assert_eq!(events.last(), Some(&TransferEvent::Completed));

    let written = std::fs::read(out_dir.path().join("holiday.mkv")).unwrap();
    assert_eq!(written, payload);
}

#[tokio::test]
async fn test_duplicate_join_does_not_repeat_slot_request() {
    let dcc_port = spawn_dcc_peer(b"abc").await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    let requests = Arc::new(AtomicUsize::new(0));
    let requests_seen = Arc::clone(&requests);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("xdcc send #42") {
                requests_seen.fetch_add(1, Ordering::SeqCst);
                // A second JOIN for the same channel must not re-trigger
                // the request.
                peer.echo_join("#movies").await;
                sleep(Duration::from_millis(300)).await;
                peer.send_dcc_offer("dup.bin", dcc_port, 3).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.unwrap();

    let events = collect_events(events).await;
    assert_eq!(events.last(), Some(&TransferEvent::Completed));
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reconnect_cap_aborts_without_started() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    let accepts = Arc::new(AtomicUsize::new(0));
    let accepts_seen = Arc::clone(&accepts);

    // Accept and drop every connection before registration completes.
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            accepts_seen.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            drop(stream);
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.expect("initial TCP connect succeeds");

    let events = collect_events(events).await;
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, TransferEvent::Started { .. })),
        "no Started without an offer"
    );
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Aborted { reason }) if reason.contains("reconnect attempts exhausted")
    ));
    // Initial connection plus five reconnects.
    assert_eq!(accepts.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_tls_fallback_lands_on_plain_tcp() {
    let payload = b"fallback";
    let dcc_port = spawn_dcc_peer(payload).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    let accepts = Arc::new(AtomicUsize::new(0));
    let accepts_seen = Arc::clone(&accepts);

    tokio::spawn(async move {
        // The first two connections are TLS attempts: close them so the
        // handshakes fail and the supervisor falls through to plain TCP.
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            accepts_seen.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }

        let (stream, _) = listener.accept().await.unwrap();
        accepts_seen.fetch_add(1, Ordering::SeqCst);
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("xdcc send #42") {
                peer.send_dcc_offer("fallback.bin", dcc_port, 8).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(irc_port, out_dir.path());
    config.tls = TlsPolicy::default();

    let mut transfer = SupervisedTransfer::new(config);
    let events = transfer.take_events().unwrap();
    transfer.start().await.expect("plain fallback succeeds");

    let events = collect_events(events).await;
    assert_eq!(events.last(), Some(&TransferEvent::Completed));
    assert_eq!(accepts.load(Ordering::SeqCst), 3);

    let written = std::fs::read(out_dir.path().join("fallback.bin")).unwrap();
    assert_eq!(written, payload);
}

#[tokio::test]
async fn test_short_read_aborts_transfer() {
    // Peer advertises 10 bytes but serves only 5.
    let dcc_port = spawn_dcc_peer(b"01234").await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("xdcc send #42") {
                peer.send_dcc_offer("short.bin", dcc_port, 10).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.unwrap();

    let events = collect_events(events).await;
    assert_event_invariants(&events);
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Aborted { reason }) if reason.contains("short read")
    ));
}

#[tokio::test]
async fn test_dial_failure_aborts_transfer() {
    // Reserve a port with no listener behind it.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = unused.local_addr().unwrap().port();
    drop(unused);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("xdcc send #42") {
                peer.send_dcc_offer("gone.bin", dead_port, 10).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.unwrap();

    let events = collect_events(events).await;
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Aborted { reason }) if reason.contains("dial failed")
    ));
}

#[tokio::test]
async fn test_zero_size_offer_completes_without_data_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("xdcc send #42") {
                // Port 1 is never dialed for an empty file.
                peer.send_dcc_offer("empty.bin", 1, 0).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.unwrap();

    let events = collect_events(events).await;
    assert!(matches!(
        events.first(),
        Some(TransferEvent::Started { file_size: 0, .. })
    ));
    assert_eq!(events.last(), Some(&TransferEvent::Completed));
}

#[tokio::test]
async fn test_traversal_file_name_is_rejected() {
    let dcc_port = spawn_dcc_peer(b"evil").await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let irc_port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = IrcPeer::new(stream);
        peer.register().await;
        loop {
            let Some(line) = peer.read_line().await else {
                return;
            };
            if line.starts_with("JOIN ") {
                peer.echo_join("#movies").await;
            }
            if line.contains("xdcc send #42") {
                peer.send_dcc_offer("../evil.bin", dcc_port, 4).await;
            }
        }
    });

    let out_dir = tempfile::tempdir().unwrap();
    let mut transfer = SupervisedTransfer::new(test_config(irc_port, out_dir.path()));
    let events = transfer.take_events().unwrap();
    transfer.start().await.unwrap();

    let events = collect_events(events).await;
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, TransferEvent::Started { .. })),
        "unsafe names never start a download"
    );
    assert!(matches!(
        events.last(),
        Some(TransferEvent::Aborted { reason }) if reason.contains("unsafe file name")
    ));
    assert!(!out_dir.path().parent().unwrap().join("evil.bin").exists());
}
