// Benchmark for the batch decode and event filter pipeline.
// Covers whole-batch decoding at several sizes, per-event evaluation for
// each disposition, and a handler pass over a mixed batch.

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use longtext_ingest::decode::{
    AuthorPayload, Envelope, Event, MessageBatch, StatusPayload, decode_batch, evaluate_event,
};
use longtext_ingest::errors::PublishError;
use longtext_ingest::metrics::NoOpMetricsPublisher;
use longtext_ingest::publisher::{LongTextPublisher, PublishOutcome};
use longtext_ingest::queue_adapter::{MpscQueueAdapter, OverflowPolicy};
use longtext_ingest::retry::RetryTask;
use longtext_ingest::tasks::HandlerTask;
use prost::Message;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

struct InstantPublisher;

#[async_trait]
impl LongTextPublisher for InstantPublisher {
    async fn publish(&self, _: u64, _: u64) -> Result<PublishOutcome, PublishError> {
        Ok(PublishOutcome::Posted)
    }
}

fn event(kind: &str, id: u64, level: i32, flag: u64) -> Event {
    let status = StatusPayload {
        mid: 4_000_000_000 + id,
        author: Some(AuthorPayload {
            id: 1_000_000 + id,
            level,
            sign: flag << 6,
        }),
    };
    Event {
        kind: kind.to_string(),
        payload: Envelope {
            body: status.encode_to_vec(),
        }
        .encode_to_vec(),
    }
}

// Roughly one qualifying status in four
fn mixed_batch(size: u64) -> MessageBatch {
    let events = (0..size)
        .map(|i| match i % 4 {
            0 => event("status", i, 2, 3),
            1 => event("comment", i, 2, 3),
            2 => event("status", i, 1, 3),
            _ => event("repost_status", i, 2, 12),
        })
        .collect();
    MessageBatch { events }
}

fn bench_decode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_batch");

    for size in [1u64, 50, 500] {
        let bytes = mixed_batch(size).encode_to_vec();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| decode_batch(black_box(bytes)))
        });
    }

    group.finish();
}

fn bench_evaluate_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_event");

    let cases = [
        ("qualified", event("status", 1, 2, 3)),
        ("unsupported_type", event("comment", 1, 2, 3)),
        ("unverified", event("status", 1, 1, 3)),
        (
            "malformed",
            Event {
                kind: "status".to_string(),
                payload: vec![0x0a, 0xff, 0xff],
            },
        ),
    ];
    for (name, event) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), event, |b, event| {
            b.iter(|| evaluate_event(black_box(event)))
        });
    }

    group.finish();
}

fn bench_handle_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let handler = HandlerTask::new(
        "bench",
        3,
        Arc::new(MpscQueueAdapter::<MessageBatch>::new(1)),
        Arc::new(MpscQueueAdapter::<RetryTask>::with_policy(
            1,
            OverflowPolicy::DropNewest,
        )),
        Arc::new(InstantPublisher),
        Arc::new(NoOpMetricsPublisher::new()),
        CancellationToken::new(),
    );
    let batch = mixed_batch(200);

    let mut group = c.benchmark_group("handle_batch");
    group.throughput(Throughput::Elements(batch.events.len() as u64));
    group.bench_function("mixed_200", |b| {
        b.to_async(&rt)
            .iter(|| handler.handle_batch(black_box(batch.clone())))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_batch,
    bench_evaluate_event,
    bench_handle_batch
);
criterion_main!(benches);
