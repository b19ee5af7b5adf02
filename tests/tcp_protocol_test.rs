//! Line protocol over a real socket.

mod common;

use cascade_bridge::device::{DevState, SimulatedDetector};
use cascade_bridge::server::tcp::MAX_LINE_LEN;
use cascade_bridge::Bridge;
use common::{pv, start_bridge};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(bridge: &Bridge) -> Self {
        let stream = TcpStream::connect(bridge.local_addr()).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> String {
        self.lines.next_line().await.unwrap().expect("connection closed")
    }

    async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await
    }
}

#[tokio::test]
async fn test_get_put_roundtrip() {
    let (bridge, _detector) = start_bridge(SimulatedDetector::new()).await;
    let mut client = Client::connect(&bridge).await;

    let name = pv("TIMECHANS:SP");
    assert_eq!(client.request(&format!("GET {}", name)).await, format!("OK {} 0", name));
    assert_eq!(client.request(&format!("PUT {} 256", name)).await, "OK");
    assert_eq!(client.request(&format!("get {}", name)).await, format!("OK {} 256", name));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_fractional_integer_truncates() {
    let (bridge, _detector) = start_bridge(SimulatedDetector::new()).await;
    let mut client = Client::connect(&bridge).await;

    let name = pv("BINX:SP");
    assert_eq!(client.request(&format!("PUT {} 3.7", name)).await, "OK");
    assert_eq!(client.request(&format!("GET {}", name)).await, format!("OK {} 3", name));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_oversized_request_closes_connection() {
    let (bridge, _detector) = start_bridge(SimulatedDetector::new()).await;
    let mut client = Client::connect(&bridge).await;

    let flood = "x".repeat(MAX_LINE_LEN + 2);
    client.writer.write_all(flood.as_bytes()).await.unwrap();
    let reply = client.recv().await;
    assert!(reply.starts_with("ERR Malformed request: request line exceeds"), "{}", reply);
    assert!(client.lines.next_line().await.unwrap_or(None).is_none());

    // Other clients are unaffected.
    let mut other = Client::connect(&bridge).await;
    assert!(other.request("LIST").await.starts_with("OK "));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_errors_are_reported() {
    let (bridge, _detector) = start_bridge(SimulatedDetector::new()).await;
    let mut client = Client::connect(&bridge).await;

    let unknown = client.request(&format!("GET {}", pv("NOPE"))).await;
    assert!(unknown.starts_with("ERR Unknown process variable"), "{}", unknown);

    let read_only = client.request(&format!("PUT {} 2", pv("BINX"))).await;
    assert_eq!(
        read_only,
        format!("ERR Process variable '{}' is read-only", pv("BINX"))
    );

    let invalid = client.request(&format!("PUT {} lots", pv("BINX:SP"))).await;
    assert!(invalid.starts_with("ERR Invalid value"), "{}", invalid);

    let malformed = client.request("FROB").await;
    assert!(malformed.starts_with("ERR Malformed request"), "{}", malformed);

    // The connection survives errors.
    assert!(client.request("LIST").await.starts_with("OK "));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_putw_waits_for_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counts with space.dat");
    let (bridge, _detector) = start_bridge(SimulatedDetector::new()).await;
    let mut client = Client::connect(&bridge).await;

    let put = format!("PUT {} {}", pv("FILENAME:SP"), path.display());
    assert_eq!(client.request(&put).await, "OK");
    assert_eq!(
        client.request(&format!("PUTW {} 1", pv("SAVEDATA:SP"))).await,
        "OK"
    );
    assert_eq!(
        std::fs::read(&path).unwrap(),
        vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_list_and_info() {
    let (bridge, _detector) = start_bridge(SimulatedDetector::new()).await;
    let mut client = Client::connect(&bridge).await;

    let list = client.request("LIST").await;
    let names: Vec<&str> = list.trim_start_matches("OK ").split(' ').collect();
    assert_eq!(names.len(), 16);
    assert!(names.contains(&pv("SAVEDATA:SP").as_str()));

    let info = client.request(&format!("INFO {}", pv("PRESELECTION"))).await;
    let json: serde_json::Value = serde_json::from_str(info.trim_start_matches("OK ")).unwrap();
    assert_eq!(json["type"], "float");
    assert_eq!(json["prec"], 1);
    assert_eq!(json["writable"], false);

    let info = client.request(&format!("INFO {}", pv("STATE"))).await;
    let json: serde_json::Value = serde_json::from_str(info.trim_start_matches("OK ")).unwrap();
    assert_eq!(json["enums"], serde_json::json!(["Idle", "Counting", "Fault"]));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_monitor_streams_state_changes() {
    let (bridge, detector) = start_bridge(SimulatedDetector::new().with_state(DevState::On)).await;
    let mut client = Client::connect(&bridge).await;

    let name = pv("STATE");
    assert_eq!(client.request(&format!("MONITOR {}", name)).await, "OK");
    assert!(client.recv().await.starts_with(&format!("EVENT {} ", name)));

    detector.set_state(DevState::Fault);
    let expected = format!("EVENT {} 2", name);
    let seen = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if client.recv().await == expected {
                break;
            }
        }
    })
    .await;
    assert!(seen.is_ok(), "no Fault event received");

    bridge.shutdown().await;
}
