//! vm_hotpath.rs — micro-benchs « hot path » de la VM Ember
//!
//! Lancer :
//!   cargo bench -p ember-benches --bench vm_hotpath
//!   cargo bench -p ember-benches --bench vm_hotpath -- --save-baseline hot
//!   cargo bench -p ember-benches --bench vm_hotpath -- --baseline hot
//!
//! Données : tout est généré en mémoire, pas de corpus externe.

use std::io;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use ember_core::{disasm::disassemble_chunk, Chunk, Opcode, Value};
use ember_vm::{Vm, VmConfig};

const SIZES: &[usize] = &[64, 1_024, 16_384];

// ────────────────────────────────────────────────────────────────────────────
// Générateurs de chunks
// ────────────────────────────────────────────────────────────────────────────

/// `1 op 1 op 1 ...` sur `ops` opérations, puis RETURN. Une seule constante.
fn chain(ops: usize, op: Opcode) -> Chunk {
    let mut chunk = Chunk::new(format!("chain_{}", op.name().to_ascii_lowercase()));
    let one = chunk.add_constant(Value::Int(1)).expect("pool");
    chunk.write_bytes(&[Opcode::Const.as_byte(), one]).expect("code");
    for _ in 0..ops {
        chunk.write_bytes(&[Opcode::Const.as_byte(), one, op.as_byte()]).expect("code");
    }
    chunk.write_opcode(Opcode::Return).expect("code");
    chunk
}

/// Pile profonde : `depth` constantes puis `depth - 1` ADD.
fn deep_stack(depth: usize) -> Chunk {
    let mut chunk = Chunk::new("deep");
    let two = chunk.add_constant(Value::Int(2)).expect("pool");
    for _ in 0..depth {
        chunk.write_bytes(&[Opcode::Const.as_byte(), two]).expect("code");
    }
    for _ in 1..depth {
        chunk.write_opcode(Opcode::Add).expect("code");
    }
    chunk.write_opcode(Opcode::Return).expect("code");
    chunk
}

fn fresh_vm() -> Vm {
    Vm::with_output(VmConfig::default(), io::sink())
}

// ────────────────────────────────────────────────────────────────────────────
// Benches
// ────────────────────────────────────────────────────────────────────────────

fn bench_interpret(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm/interpret");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_millis(300));

    for &n in SIZES {
        for (label, chunk) in [("add", chain(n, Opcode::Add)), ("mul", chain(n, Opcode::Mul)), ("deep", deep_stack(n))] {
            group.throughput(Throughput::Bytes(chunk.len() as u64));
            group.bench_with_input(BenchmarkId::new(label, n), &chunk, |b, chunk| {
                b.iter_batched(
                    || (fresh_vm(), chunk.clone()),
                    |(mut vm, chunk)| black_box(vm.interpret(chunk)),
                    BatchSize::SmallInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_disassemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk/disassemble");
    for &n in SIZES {
        let chunk = chain(n, Opcode::Sub);
        group.throughput(Throughput::Bytes(chunk.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &chunk, |b, chunk| {
            b.iter(|| black_box(disassemble_chunk(chunk)));
        });
    }
    group.finish();
}

fn bench_container(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk/container");
    let chunk = chain(16_384, Opcode::Add);
    let bytes = chunk.to_bytes().expect("encodes");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("to_bytes", |b| b.iter(|| black_box(chunk.to_bytes().expect("encodes"))));
    group.bench_function("from_bytes", |b| b.iter(|| black_box(Chunk::from_bytes(&bytes))));
    group.finish();
}

criterion_group!(benches, bench_interpret, bench_disassemble, bench_container);
criterion_main!(benches);
