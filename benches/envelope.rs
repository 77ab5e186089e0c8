//! Performance benchmarks for a3s-session
//!
//! Run with: cargo bench

use a3s_session::engine::{EngineEvent, EngineStatus, InboundMessage};
use a3s_session::session::transition;
use a3s_session::{envelope, ConnectionRecord, EventType};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_envelope_build(c: &mut Criterion) {
    c.bench_function("envelope::build", |b| {
        b.iter(|| {
            envelope::build(
                EventType::Connection,
                "tenant-a",
                serde_json::json!({"status": "SYNCHRONIZING", "progressSync": 42}),
            )
        });
    });

    let built = envelope::build(
        EventType::ReceivedMessage,
        "tenant-a",
        serde_json::json!({"id": "m1", "message": {"conversation": "hello"}}),
    );
    c.bench_function("Envelope serialize", |b| {
        b.iter(|| serde_json::to_vec(&built).unwrap());
    });
}

fn bench_transition(c: &mut Criterion) {
    let record = ConnectionRecord::new("tenant-a");

    let in_chat = EngineEvent::StatusChange(EngineStatus::InChat);
    c.bench_function("transition inChat", |b| {
        b.iter(|| transition(&record, &in_chat));
    });

    let message = EngineEvent::InboundMessage(InboundMessage {
        id: "false_5511@c.us_3EB0".to_string(),
        message_type: "chat".to_string(),
        content: Some("hello".to_string()),
        sender_id: "5511@c.us".to_string(),
        push_name: Some("Ana".to_string()),
        from_me: false,
        is_group: false,
        list_response: None,
        raw: serde_json::Value::Null,
    });
    c.bench_function("transition inbound message", |b| {
        b.iter(|| transition(&record, &message));
    });
}

criterion_group!(benches, bench_envelope_build, bench_transition);
criterion_main!(benches);
