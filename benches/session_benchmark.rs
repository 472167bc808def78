use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tigerpad::presence::PresenceRegistry;
use tigerpad::protocol::{
    ClientMessage, CollaboratorMap, CursorPos, Participant, SelectionRange, ServerMessage,
};
use tigerpad::reconcile::Reconciler;
use uuid::Uuid;

fn bench_code_frame_encode(c: &mut Criterion) {
    let code = "def handler(request):\n    return respond(request)\n".repeat(20);

    c.bench_function("code_frame_encode_1KB", |b| {
        b.iter(|| {
            let msg = ServerMessage::Code {
                code: black_box(code.clone()),
            };
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_code_frame_decode(c: &mut Criterion) {
    let code = "def handler(request):\n    return respond(request)\n".repeat(20);
    let encoded = ServerMessage::Code { code }.encode().unwrap();

    c.bench_function("code_frame_decode_1KB", |b| {
        b.iter(|| {
            black_box(ServerMessage::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_cursor_update_decode(c: &mut Criterion) {
    let encoded = ClientMessage::CursorUpdate {
        cursor: Some(CursorPos::new(12, 40)),
        selection: Some(SelectionRange::new(12, 1, 14, 8)),
    }
    .encode()
    .unwrap();

    c.bench_function("cursor_update_decode", |b| {
        b.iter(|| {
            black_box(ClientMessage::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn snapshot_with(participants: usize) -> CollaboratorMap {
    let mut map = CollaboratorMap::new();
    for i in 0..participants {
        map.insert(
            Uuid::new_v4(),
            Participant {
                name: format!("user-{i}"),
                cursor: Some(CursorPos::new(i as u32 + 1, 1)),
                selection: Some(SelectionRange::new(i as u32 + 1, 1, i as u32 + 1, 10)),
            },
        );
    }
    map
}

fn bench_collaborators_encode(c: &mut Criterion) {
    for count in [2, 8, 32] {
        let msg = ServerMessage::Collaborators {
            collaborators: snapshot_with(count),
        };
        c.bench_function(&format!("collaborators_encode_{count}"), |b| {
            b.iter(|| {
                black_box(msg.encode().unwrap());
            })
        });
    }
}

fn bench_presence_snapshot(c: &mut Criterion) {
    let mut registry = PresenceRegistry::new();
    for i in 0..16 {
        registry.upsert(
            Uuid::new_v4(),
            &format!("user-{i}"),
            Some(CursorPos::new(i + 1, 1)),
            None,
        );
    }

    c.bench_function("presence_snapshot_16", |b| {
        b.iter(|| {
            black_box(registry.snapshot());
        })
    });
}

fn bench_reconcile_cycle(c: &mut Criterion) {
    let local = Uuid::new_v4();
    let snapshot = snapshot_with(8);

    c.bench_function("reconcile_cycle_8", |b| {
        b.iter(|| {
            let mut reconciler = Reconciler::new(local);
            reconciler.apply_collaborators(black_box(&snapshot));
            black_box(reconciler.apply_collaborators(black_box(&snapshot)));
        })
    });
}

criterion_group!(
    benches,
    bench_code_frame_encode,
    bench_code_frame_decode,
    bench_cursor_update_decode,
    bench_collaborators_encode,
    bench_presence_snapshot,
    bench_reconcile_cycle
);
criterion_main!(benches);
