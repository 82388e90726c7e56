use async_trait::async_trait;
use locago::agent::{RecordSender, TcpConnector};
use locago::pipeline::record_queue;
use locago::record::Record;
use locago::server::Acceptor;
use locago::storage::{RecordStore, StorageError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<Record>>,
}

impl MemoryStore {
    fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn store(&self, record: &Record) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn record(n: usize) -> Record {
    Record {
        message: format!("line {}", n),
        container_name: "web".to_string(),
        container_id: "c0ffee".to_string(),
        timestamp: 1_700_000_000 + n as i64,
        hostname: "agent-host".to_string(),
    }
}

async fn start_acceptor(
    store: Arc<MemoryStore>,
    token: &CancellationToken,
) -> (String, tokio::task::JoinHandle<()>) {
    let acceptor = Acceptor::bind("127.0.0.1:0", store, 1000, token.clone())
        .await
        .unwrap();
    let addr = acceptor.local_addr().unwrap().to_string();
    (addr, tokio::spawn(acceptor.run()))
}

async fn wait_for_records(store: &MemoryStore, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.records.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("records should arrive");
}

#[tokio::test]
async fn test_records_arrive_in_order_with_fields_intact() {
    let store = Arc::new(MemoryStore::default());
    let token = CancellationToken::new();
    let (addr, server) = start_acceptor(Arc::clone(&store), &token).await;

    let (tx, rx) = record_queue(16);
    let sender = RecordSender::new("web", TcpConnector::new(addr), Duration::from_millis(50), token.clone());
    let sending = tokio::spawn(sender.run(rx));

    for n in 0..50 {
        tx.send(record(n)).await.unwrap();
    }
    drop(tx);

    let stats = sending.await.unwrap().unwrap();
    assert_eq!(stats.delivered, 50);

    wait_for_records(&store, 50).await;
    let expected: Vec<String> = (0..50).map(|n| format!("line {}", n)).collect();
    assert_eq!(store.messages(), expected);
    assert_eq!(store.records.lock().unwrap()[7], record(7));

    token.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn test_sender_waits_for_server_to_come_up() {
    // Reserve a port, then release it so the first dials are refused
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let token = CancellationToken::new();
    let (tx, rx) = record_queue(16);
    let sender = RecordSender::new(
        "web",
        TcpConnector::new(addr.to_string()),
        Duration::from_millis(50),
        token.clone(),
    );
    let sending = tokio::spawn(sender.run(rx));
    tx.send(record(1)).await.unwrap();
    drop(tx);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!sending.is_finished());

    let store = Arc::new(MemoryStore::default());
    let listener = TcpListener::bind(addr).await.unwrap();
    let acceptor = Acceptor::from_listener(listener, store.clone(), 1000, token.clone());
    let server = tokio::spawn(acceptor.run());

    let stats = tokio::time::timeout(Duration::from_secs(5), sending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.delivered, 1);

    wait_for_records(&store, 1).await;
    assert_eq!(store.messages(), vec!["line 1"]);

    token.cancel();
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_message_ends_only_that_session() {
    let store = Arc::new(MemoryStore::default());
    let token = CancellationToken::new();
    let (addr, server) = start_acceptor(Arc::clone(&store), &token).await;

    let mut bad = TcpStream::connect(&addr).await.unwrap();
    bad.write_all(&record(1).to_line().unwrap()).await.unwrap();
    bad.write_all(b"{not json}\n").await.unwrap();
    bad.write_all(&record(2).to_line().unwrap()).await.unwrap();
    bad.flush().await.unwrap();

    wait_for_records(&store, 1).await;

    // A fresh connection is still served
    let mut good = TcpStream::connect(&addr).await.unwrap();
    good.write_all(&record(3).to_line().unwrap()).await.unwrap();
    good.shutdown().await.unwrap();

    wait_for_records(&store, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.messages(), vec!["line 1", "line 3"]);

    token.cancel();
    server.await.unwrap();
}
