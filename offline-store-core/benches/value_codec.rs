use criterion::{Criterion, criterion_group, criterion_main};
use offline_store_core::value::{ScalarValue, decode, encode};

fn sample_values() -> Vec<ScalarValue> {
    vec![
        ScalarValue::Int32(31),
        ScalarValue::Int64(i64::MAX),
        ScalarValue::Float32(0.25),
        ScalarValue::Float64(1234.5678),
        ScalarValue::String("premium".to_string()),
        ScalarValue::Bool(true),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let values = sample_values();
    c.bench_function("value_codec_encode", |b| {
        b.iter(|| {
            for value in &values {
                let envelope = encode(value).expect("encode failed");
                criterion::black_box(envelope);
            }
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    let documents = sample_values()
        .iter()
        .map(|value| {
            serde_json::to_value(encode(value).expect("encode failed"))
                .expect("serialize failed")
        })
        .collect::<Vec<_>>();
    c.bench_function("value_codec_decode", |b| {
        b.iter(|| {
            for document in &documents {
                let value = decode(document.clone()).expect("decode failed");
                criterion::black_box(value);
            }
        });
    });
}

criterion_group!(value_codec_benches, bench_encode, bench_decode);
criterion_main!(value_codec_benches);
