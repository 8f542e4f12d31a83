use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::connection;
use common::{Function, Message, Operation, ShardOutput};
use glint_worker::{GlintWorker, WorkerConfig};

/// A coordinator stand-in speaking the wire protocol by hand.
#[tokio::test]
async fn joins_and_answers_shards() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = WorkerConfig {
        max_mem: 4096,
        ..WorkerConfig::default()
    };
    let joining = tokio::spawn(async move { GlintWorker::join(addr, &config).await });

    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = connection::split(stream, 1024);

    assert_eq!(
        reader.recv().await.unwrap(),
        Some(Message::WorkerJoin { max_mem: 4096 })
    );
    writer
        .send(&Message::WorkerAccepted { worker_id: 7 })
        .await
        .unwrap();

    let worker = joining.await.unwrap().unwrap();
    assert_eq!(worker.id(), 7);

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(worker.serve(shutdown.clone()));

    let job_id = Uuid::new_v4();
    writer
        .send(&Message::ShardRequest {
            job_id,
            shard: 1,
            offset: 3,
            operations: vec![
                Operation::filter(Function::named("index_below").with_arg(5)),
                Operation::map(Function::named("double")),
            ],
            data: vec![json!(10), json!(20), json!(30)],
        })
        .await
        .unwrap();

    // Positions 3 and 4 of the job's dataset are below 5.
    assert_eq!(
        reader.recv().await.unwrap(),
        Some(Message::ShardResult {
            job_id,
            shard: 1,
            worker_id: 7,
            output: ShardOutput::Elements(vec![json!(20), json!(40)]),
        })
    );

    writer
        .send(&Message::ShardRequest {
            job_id,
            shard: 2,
            offset: 0,
            operations: vec![Operation::map(Function::named("negate"))],
            data: vec![json!("not a number")],
        })
        .await
        .unwrap();

    match reader.recv().await.unwrap() {
        Some(Message::ShardFailed {
            job_id: failed,
            shard,
            worker_id,
            reason,
        }) => {
            assert_eq!((failed, shard, worker_id), (job_id, 2, 7));
            assert!(!reason.is_empty());
        }
        other => panic!("expected shard-failed, got {other:?}"),
    }

    shutdown.cancel();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn serve_ends_when_the_coordinator_leaves() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let joining =
        tokio::spawn(async move { GlintWorker::join(addr, &WorkerConfig::default()).await });

    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = connection::split(stream, 1024);
    reader.recv().await.unwrap();
    writer
        .send(&Message::WorkerAccepted { worker_id: 0 })
        .await
        .unwrap();

    let worker = joining.await.unwrap().unwrap();
    drop((reader, writer));

    worker.serve(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn join_fails_without_acceptance() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let joining =
        tokio::spawn(async move { GlintWorker::join(addr, &WorkerConfig::default()).await });

    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = connection::split(stream, 1024);
    reader.recv().await.unwrap();
    writer.send(&Message::StatusRequest).await.unwrap();

    assert!(joining.await.unwrap().is_err());
}
