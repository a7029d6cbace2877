use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use jobboard_payments::{
    PaymentStatus, ReportedOutcome, SslcommerzSignatureVerifier, StripeSignatureVerifier, decide,
};

fn stripe_payload(size: usize) -> Vec<u8> {
    let mut body = br#"{"id":"evt_bench","type":"checkout.session.completed","data":{"object":{"id":"cs_bench","payment_status":"paid","metadata":{"pad":""#.to_vec();
    body.extend(std::iter::repeat_n(b'x', size));
    body.extend_from_slice(br#""}}}}"#);
    body
}

fn bench_stripe_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("stripe_signature_verify");
    let verifier = StripeSignatureVerifier::new(Some("whsec_bench".to_string()), 300);
    let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);

    for size in [256usize, 4 * 1024, 64 * 1024].iter() {
        let payload = stripe_payload(*size);
        let header = verifier
            .sign(&payload, now.timestamp())
            .expect("bench secret is configured");
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| verifier.verify(black_box(payload), black_box(&header), now))
        });
    }

    group.finish();
}

fn bench_sslcommerz_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("sslcommerz_signature_verify");
    let verifier = SslcommerzSignatureVerifier::new(Some("store-pass".to_string()));

    for field_count in [4usize, 16, 64].iter() {
        let mut fields = BTreeMap::new();
        fields.insert("tran_id".to_string(), "ssl-bench".to_string());
        fields.insert("status".to_string(), "VALID".to_string());
        for i in 0..*field_count {
            fields.insert(format!("value_{i}"), format!("v{i}"));
        }
        verifier.sign(&mut fields).expect("bench password is configured");

        group.throughput(Throughput::Elements(*field_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(field_count), &fields, |b, fields| {
            b.iter(|| verifier.verify(black_box(fields)))
        });
    }

    group.finish();
}

fn bench_decide(c: &mut Criterion) {
    let statuses = [
        PaymentStatus::Pending,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
    ];
    let outcomes = [
        ReportedOutcome::Success,
        ReportedOutcome::Failed,
        ReportedOutcome::Cancelled,
        ReportedOutcome::Expired,
        ReportedOutcome::Unknown,
    ];

    c.bench_function("decide_all_pairs", |b| {
        b.iter(|| {
            for status in statuses {
                for outcome in outcomes {
                    black_box(decide(black_box(status), black_box(outcome)));
                }
            }
        })
    });
}

criterion_group!(
    benches,
    bench_stripe_signature,
    bench_sslcommerz_signature,
    bench_decide
);
criterion_main!(benches);
