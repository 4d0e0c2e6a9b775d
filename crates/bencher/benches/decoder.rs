use std::hint::black_box;

use bencher::{Fixture, SPLITS};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use strand_http::builder::{MessageBuilder, MessageObserver};
use strand_http::codec::{MessageDecoder, MessageEvent};
use strand_http::protocol::{Message, ParseError, PayloadFragment};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static SMALL_HEADER: Fixture = Fixture::new("get_small", include_bytes!("../resources/request/get_small.txt"));
static LARGE_HEADER: Fixture = Fixture::new("get_large", include_bytes!("../resources/request/get_large.txt"));
static CHUNKED: Fixture = Fixture::new("post_chunked", include_bytes!("../resources/request/post_chunked.txt"));

const PIPELINED: usize = 32;

fn fixtures() -> [Fixture; 3] {
    [SMALL_HEADER, LARGE_HEADER, CHUNKED]
}

fn benchmark_message_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("message_decoder");

    for fixture in fixtures() {
        let wire = fixture.pipelined(PIPELINED);
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fixture.name()), &wire, |b, wire| {
            let mut decoder = MessageDecoder::new();
            b.iter_batched_ref(
                || BytesMut::from(&wire[..]),
                |bytes_mut| {
                    let mut messages = 0;
                    while let Some(event) = decoder.decode(bytes_mut).expect("input should be valid http") {
                        if let MessageEvent::Message(message) = event {
                            messages += 1;
                            black_box(message);
                        }
                    }
                    assert_eq!(messages, PIPELINED);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

#[derive(Default)]
struct Count {
    messages: usize,
    bytes: usize,
}

impl MessageObserver for Count {
    fn on_message(&mut self, message: Message) {
        self.messages += 1;
        black_box(message);
    }

    fn on_data(&mut self, fragment: PayloadFragment) {
        self.bytes += fragment.len();
    }

    fn on_error(&mut self, error: ParseError) {
        panic!("input should be valid http: {error}");
    }
}

fn benchmark_message_builder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("message_builder");

    for split in SPLITS {
        let wire = CHUNKED.pipelined(PIPELINED);
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_with_input(BenchmarkId::new(CHUNKED.name(), split), &wire, |b, wire| {
            b.iter(|| {
                let mut builder = MessageBuilder::new(Count::default());
                for piece in wire.chunks(split) {
                    builder.write(piece);
                }
                assert_eq!(builder.observer().messages, PIPELINED);
            });
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_message_decoder, benchmark_message_builder);
criterion_main!(decoder);
