use std::hint::black_box;
use std::io::Write;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use httpie::{
    AgentRegistry, CustomAgent, DecodeMode, Dispatcher, MockDispatcher, ResponseDecoder,
    ResponseEnvelope, Resolver,
};

fn json_payload(items: usize) -> Vec<u8> {
    let rows = (0..items)
        .map(|index| format!(r#"{{"id":{index},"name":"item-{index}","active":true}}"#))
        .collect::<Vec<_>>()
        .join(",");
    format!("[{rows}]").into_bytes()
}

fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .expect("write gzip source bytes should succeed");
    encoder.finish().expect("finish gzip stream should succeed")
}

fn bench_decode(criterion: &mut Criterion) {
    let decoder = ResponseDecoder::new();
    let mut group = criterion.benchmark_group("decode_gzip_json");

    for items in [16_usize, 256, 4096] {
        let plain = json_payload(items);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let envelope = ResponseEnvelope::new(StatusCode::OK, headers, gzip_bytes(&plain));

        group.throughput(Throughput::Bytes(plain.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), &envelope, |bench, envelope| {
            bench.iter(|| {
                let data = decoder
                    .decode(black_box(envelope), DecodeMode::Parse)
                    .expect("payload should decode");
                black_box(data);
            });
        });
    }
    group.finish();
}

fn bench_resolve(criterion: &mut Criterion) {
    let registry = Arc::new(AgentRegistry::new());
    for index in 0..32 {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(MockDispatcher::new());
        registry.register(
            CustomAgent::new(
                format!("svc{index}"),
                &format!("https://svc{index}.internal.test"),
                dispatcher,
            )
            .expect("agent origin should parse"),
        );
    }
    let resolver = Resolver::new(Arc::clone(&registry));
    let mut group = criterion.benchmark_group("resolve");

    group.bench_function("cached", |bench| {
        bench.iter(|| {
            let target = resolver
                .resolve(&Method::GET, black_box("/svc31/health"))
                .expect("target should resolve");
            black_box(target);
        });
    });

    group.bench_function("uncached", |bench| {
        bench.iter(|| {
            let target = resolver
                .resolve_str(black_box("/svc31/health"))
                .expect("target should resolve");
            black_box(target);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode, bench_resolve);
criterion_main!(benches);
