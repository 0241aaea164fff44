//! Throughput of `ExecutionHelper::step` on a small hot loop, run through the
//! instruction feeder on every iteration so the benchmark reflects steady-
//! state cache-hit cost rather than cold parsing.

use cfgcpu_cpu::test_util::VecMemoryBus;
use cfgcpu_cpu::{ExecutionHelper, NullCallbackHandler};
use cfgcpu_types::{Reg16, SegReg, State};
use criterion::{criterion_group, criterion_main, Criterion};

/// `mov cx, 1000` ; loop: `inc ax` ; `dec cx` ; `jnz loop` ; `hlt`.
const PROGRAM: &[u8] = &[
    0xB9, 0xE8, 0x03, // mov cx, 0x03E8
    0x40, // inc ax
    0x49, // dec cx
    0x75, 0xFB, // jnz -5
    0xF4, // hlt
];

fn new_helper() -> ExecutionHelper<VecMemoryBus, NullCallbackHandler> {
    let mut bus = VecMemoryBus::new(0x1_0000);
    bus.seed(0, PROGRAM);
    let mut state = State::new();
    state.set_segment(SegReg::Cs, 0);
    state.set_segment(SegReg::Ss, 0x1000);
    state.set16(Reg16::Sp, 0xFFFE);
    state.set_ip(0);
    ExecutionHelper::new(state, bus, NullCallbackHandler)
}

fn bench_tight_loop(c: &mut Criterion) {
    c.bench_function("step/tight_loop_1000_iters", |b| {
        b.iter(|| {
            let mut helper = new_helper();
            while helper.state.ip() != 8 {
                helper.step().unwrap();
            }
        })
    });
}

fn bench_single_step_cache_hit(c: &mut Criterion) {
    let mut helper = new_helper();
    helper.step().unwrap(); // warm the feeder cache for the `inc ax` node
    c.bench_function("step/single_cached_instruction", |b| {
        b.iter(|| {
            helper.state.set_ip(3);
            helper.step().unwrap();
        })
    });
}

criterion_group!(benches, bench_tight_loop, bench_single_step_cache_hit);
criterion_main!(benches);
