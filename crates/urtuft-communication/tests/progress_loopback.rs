use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use urtuft_communication::{
    deliver_or_skip, DeliveryOutcome, ProgramDelivery, ProgressListener, ScriptClient,
};
use urtuft_core::{ProgressEvent, ProgressStore};

async fn wait_for_current(progress: &ProgressStore, job_id: &str, expected: u64) {
    for _ in 0..50 {
        if progress.get(job_id).map(|e| e.current) == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("progress for {job_id} never reached {expected}");
}

#[tokio::test]
async fn test_out_of_order_telemetry_last_write_wins() {
    let progress = Arc::new(ProgressStore::in_memory());
    progress.register("x", 10);
    let mut events = progress.subscribe();

    let listener = ProgressListener::bind("127.0.0.1:0", Arc::clone(&progress))
        .await
        .unwrap();
    let handle = listener.spawn().unwrap();

    let mut socket = TcpStream::connect(handle.local_addr()).await.unwrap();
    socket
        .write_all(b"{jobId: \"x\", current: 5, total: 10}\n")
        .await
        .unwrap();
    wait_for_current(&progress, "x", 5).await;

    socket
        .write_all(b"not a record\n{jobId: \"x\", current: 3, total: 10}\n")
        .await
        .unwrap();
    wait_for_current(&progress, "x", 3).await;

    let first = events.recv().await.unwrap();
    assert!(matches!(first, ProgressEvent::Recorded(ref e) if e.current == 5));

    drop(socket);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_multiple_connections_are_independent() {
    let progress = Arc::new(ProgressStore::in_memory());
    let handle = ProgressListener::bind("127.0.0.1:0", Arc::clone(&progress))
        .await
        .unwrap()
        .spawn()
        .unwrap();

    let mut first = TcpStream::connect(handle.local_addr()).await.unwrap();
    let mut second = TcpStream::connect(handle.local_addr()).await.unwrap();
    first.write_all(b"{jobId:\"a\",current:2,total:8}\n").await.unwrap();
    second.write_all(b"{jobId:\"b\",current:7,total:8}\n").await.unwrap();

    wait_for_current(&progress, "a", 2).await;
    wait_for_current(&progress, "b", 7).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_failed_delivery_does_not_stop_telemetry() {
    let progress = Arc::new(ProgressStore::in_memory());
    let handle = ProgressListener::bind("127.0.0.1:0", Arc::clone(&progress))
        .await
        .unwrap()
        .spawn()
        .unwrap();

    let unused_port = {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap().port()
    };
    let client =
        ScriptClient::new("127.0.0.1", unused_port).with_timeout(Duration::from_millis(300));
    let outcome = deliver_or_skip(Some(&client as &dyn ProgramDelivery), "end\n").await;
    assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));

    let mut socket = TcpStream::connect(handle.local_addr()).await.unwrap();
    socket
        .write_all(b"{jobId:\"c\",current:1,total:2}\n")
        .await
        .unwrap();
    wait_for_current(&progress, "c", 1).await;

    handle.shutdown().await;
}
