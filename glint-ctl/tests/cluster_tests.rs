use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::connection::{self, MessageReader, MessageWriter};
use common::{Function, JobStatus, Message, Operation};
use glint_coordinator::{Coordinator, CoordinatorConfig, Job, JobInFlight};
use glint_ctl::{ClientError, GlintClient};
use glint_worker::{GlintWorker, WorkerConfig};

const CHUNK_SIZE: usize = 1024;

struct Cluster {
    coordinator: Coordinator,
    shutdown: CancellationToken,
}

impl Cluster {
    /// A coordinator on an ephemeral port with one worker per capacity.
    async fn start(capacities: &[u64]) -> Self {
        let coordinator = Coordinator::init(CoordinatorConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            chunk_size: CHUNK_SIZE,
        })
        .await
        .unwrap();

        let shutdown = CancellationToken::new();
        for &max_mem in capacities {
            let config = WorkerConfig {
                max_mem,
                chunk_size: CHUNK_SIZE,
            };
            let worker = GlintWorker::join(coordinator.local_addr(), &config)
                .await
                .unwrap();
            tokio::spawn(worker.serve(shutdown.clone()));
        }
        assert_eq!(coordinator.worker_count().await, capacities.len());

        Self {
            coordinator,
            shutdown,
        }
    }

    fn addr(&self) -> SocketAddr {
        self.coordinator.local_addr()
    }

    async fn client(&self) -> GlintClient {
        let mut client = GlintClient::with_chunk_size(CHUNK_SIZE);
        client.connect(self.addr()).await.unwrap();
        client
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.coordinator.shutdown().await;
    }
}

/// A worker that joins and then never answers on its own.
async fn join_silent_worker(addr: SocketAddr) -> (MessageReader, MessageWriter) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = connection::split(stream, CHUNK_SIZE);
    writer
        .send(&Message::WorkerJoin { max_mem: 1 << 20 })
        .await
        .unwrap();
    assert!(matches!(
        reader.recv().await.unwrap(),
        Some(Message::WorkerAccepted { .. })
    ));
    (reader, writer)
}

fn numbers(range: std::ops::Range<i64>) -> Vec<Value> {
    range.map(|i| json!(i)).collect()
}

#[tokio::test]
async fn map_and_filter_by_value_or_index() {
    let cluster = Cluster::start(&[1 << 20]).await;
    let mut client = cluster.client().await;

    client
        .parallelize(numbers(1..5))
        .unwrap()
        .map(Function::named("add").with_arg(324))
        .filter(Function::named("eq_or_index").with_arg(325).with_arg(2));
    let id = client.run().unwrap();

    let outcome = client.wait_for_job().await.unwrap();
    assert_eq!(outcome.id, id);
    assert_eq!(outcome.status, JobStatus::Done);
    assert_eq!(outcome.data, Some(json!([325, 327])));
    assert!(!client.is_running());

    cluster.stop().await;
}

#[tokio::test]
async fn job_larger_than_any_worker_is_split() {
    // "[0,1,...,1999]" is 8891 bytes.
    let cluster = Cluster::start(&[5000, 5000]).await;
    let mut client = cluster.client().await;

    let operations = vec![
        Operation::filter(Function::named("odd")),
        Operation::map(Function::named("square")),
        Operation::reduce(Function::named("sum"), 0),
    ];
    let data = numbers(0..2000);
    let expected = workload::reference(&operations, data.clone()).unwrap();

    client
        .parallelize(data)
        .unwrap()
        .filter(Function::named("odd"))
        .map(Function::named("square"))
        .reduce(Function::named("sum"), 0);
    client.run().unwrap();

    let outcome = client.wait_for_job().await.unwrap();
    assert_eq!(outcome.status, JobStatus::Done);
    assert_eq!(outcome.data, Some(expected));

    cluster.stop().await;
}

#[tokio::test]
async fn split_map_keeps_dataset_order() {
    let cluster = Cluster::start(&[3000, 3000, 3000, 3000]).await;
    let mut client = cluster.client().await;

    let data = numbers(0..2000);
    client
        .parallelize(data.clone())
        .unwrap()
        .map(Function::named("to_string"));
    client.run().unwrap();

    let outcome = client.wait_for_job().await.unwrap();
    let expected: Vec<Value> = (0..2000).map(|i| json!(i.to_string())).collect();
    assert_eq!(outcome.data, Some(Value::Array(expected)));

    cluster.stop().await;
}

#[tokio::test]
async fn job_without_capacity_is_a_bad_job() {
    let cluster = Cluster::start(&[100]).await;
    let mut client = cluster.client().await;

    client
        .parallelize(numbers(0..1000))
        .unwrap()
        .map(Function::named("double"));
    client.run().unwrap();

    let outcome = client.wait_for_job().await.unwrap();
    assert_eq!(outcome.status, JobStatus::BadJob);
    assert_eq!(outcome.data, None);

    // The client is free for another job.
    client.reset().unwrap();
    client
        .parallelize(numbers(0..3))
        .unwrap()
        .map(Function::named("double"));
    client.run().unwrap();
    assert_eq!(
        client.wait_for_job().await.unwrap().data,
        Some(json!([0, 2, 4]))
    );

    cluster.stop().await;
}

#[tokio::test]
async fn reduce_before_map_is_a_bad_job() {
    let cluster = Cluster::start(&[1 << 20]).await;
    let mut client = cluster.client().await;

    client
        .parallelize(numbers(0..3))
        .unwrap()
        .reduce(Function::named("sum"), 0)
        .map(Function::named("double"));
    client.run().unwrap();
    assert_eq!(
        client.wait_for_job().await.unwrap().status,
        JobStatus::BadJob
    );

    cluster.stop().await;
}

#[tokio::test]
async fn failing_function_is_a_bad_job() {
    let cluster = Cluster::start(&[1 << 20]).await;
    let mut client = cluster.client().await;

    client
        .parallelize(vec![json!(1), json!("two")])
        .unwrap()
        .map(Function::named("double"));
    client.run().unwrap();
    assert_eq!(
        client.wait_for_job().await.unwrap().status,
        JobStatus::BadJob
    );

    cluster.stop().await;
}

#[tokio::test]
async fn job_without_data_terminates() {
    let cluster = Cluster::start(&[1 << 20]).await;

    let id = cluster.coordinator.process_job(Job::new(
        Uuid::new_v4(),
        vec![Operation::map(Function::named("double"))],
        None,
    ))
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while cluster.coordinator.is_job_running(&id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(cluster.coordinator.job_status(&id), Some(JobStatus::Terminated));
    assert_eq!(cluster.coordinator.job_result(&id), None);

    cluster.stop().await;
}

#[tokio::test]
async fn coordinator_lists_jobs_and_workers() {
    let cluster = Cluster::start(&[1000, 2000]).await;
    let mut client = cluster.client().await;

    let workers = client.status().await.unwrap();
    let capacities: Vec<_> = workers.iter().map(|w| w.max_mem).collect();
    assert_eq!(capacities, vec![1000, 2000]);

    client
        .parallelize(numbers(0..3))
        .unwrap()
        .map(Function::named("negate"));
    let first = client.run().unwrap();
    client.wait_for_job().await.unwrap();

    client.reset().unwrap();
    client
        .parallelize(numbers(0..3))
        .unwrap()
        .map(Function::named("negate"));
    let second = client.run().unwrap();
    client.wait_for_job().await.unwrap();

    let jobs = client.jobs().await.unwrap();
    let listed: Vec<_> = jobs.iter().map(|job| (job.id, job.status)).collect();
    assert_eq!(
        listed,
        vec![(first, JobStatus::Done), (second, JobStatus::Done)]
    );
    assert!(cluster.coordinator.job_result(&first).is_some());

    cluster.stop().await;
}

#[tokio::test]
async fn timed_out_wait_keeps_the_job_in_flight() {
    let cluster = Cluster::start(&[]).await;
    let (mut reader, _writer) = join_silent_worker(cluster.addr()).await;

    let mut client = cluster.client().await;
    client
        .parallelize(numbers(0..3))
        .unwrap()
        .map(Function::named("double"));
    let id = client.run().unwrap();

    assert!(matches!(
        reader.recv().await.unwrap(),
        Some(Message::ShardRequest { job_id, .. }) if job_id == id
    ));

    assert!(matches!(
        client.wait_for_job_timeout(Duration::from_millis(100)).await,
        Err(ClientError::Timeout { .. })
    ));
    assert!(client.is_running());
    assert!(cluster.coordinator.is_job_running(&id));

    // Shutting down ends the stuck job.
    cluster.stop().await;
    let outcome = client.wait_for_job().await.unwrap();
    assert_eq!(outcome.status, JobStatus::Terminated);
}

#[tokio::test]
async fn run_while_running_is_refused() {
    let cluster = Cluster::start(&[1 << 20]).await;
    let mut client = cluster.client().await;

    client
        .parallelize(numbers(0..3))
        .unwrap()
        .map(Function::named("double"));
    client.run().unwrap();

    assert!(matches!(client.run(), Err(ClientError::JobInProgress(_))));
    assert!(matches!(client.reset(), Err(ClientError::JobInProgress(_))));

    client.wait_for_job().await.unwrap();
    client.reset().unwrap();

    cluster.stop().await;
}

#[tokio::test]
async fn duplicate_id_of_a_running_job_is_refused() {
    let cluster = Cluster::start(&[]).await;
    let (mut reader, _writer) = join_silent_worker(cluster.addr()).await;

    let id = Uuid::new_v4();
    let job = || Job::new(id, vec![Operation::map(Function::named("double"))], Some(numbers(0..3)));

    assert_eq!(cluster.coordinator.process_job(job()), Ok(id));
    assert!(matches!(
        reader.recv().await.unwrap(),
        Some(Message::ShardRequest { job_id, .. }) if job_id == id
    ));

    assert_eq!(cluster.coordinator.process_job(job()), Err(JobInFlight(id)));

    // Over the wire the duplicate is acknowledged and answered as a bad job.
    let stream = TcpStream::connect(cluster.addr()).await.unwrap();
    let (mut client_reader, mut client_writer) = connection::split(stream, CHUNK_SIZE);
    client_writer
        .send(&Message::JobRequest {
            id,
            operations: vec![Operation::map(Function::named("double"))],
            data: Some(numbers(0..3)),
        })
        .await
        .unwrap();
    assert!(matches!(
        client_reader.recv().await.unwrap(),
        Some(Message::JobResponse { id: acked }) if acked == id
    ));
    assert!(matches!(
        client_reader.recv().await.unwrap(),
        Some(Message::JobComplete { id: done, status: JobStatus::BadJob, data: None }) if done == id
    ));

    // The first job is untouched and still waiting on its shard.
    assert!(cluster.coordinator.is_job_running(&id));

    cluster.stop().await;
}

#[tokio::test]
async fn worker_disconnect_fails_its_shards() {
    let cluster = Cluster::start(&[]).await;
    let (mut reader, writer) = join_silent_worker(cluster.addr()).await;

    let mut client = cluster.client().await;
    client
        .parallelize(numbers(0..3))
        .unwrap()
        .map(Function::named("double"));
    let id = client.run().unwrap();

    assert!(matches!(
        reader.recv().await.unwrap(),
        Some(Message::ShardRequest { job_id, .. }) if job_id == id
    ));
    drop(reader);
    drop(writer);

    let outcome = tokio::time::timeout(Duration::from_secs(5), client.wait_for_job())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.status, JobStatus::BadJob);
    assert_eq!(outcome.data, None);
    assert_eq!(cluster.coordinator.worker_count().await, 0);

    cluster.stop().await;
}
