use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sim_core::MarketParams;
use sim_econ::LogitMarket;

fn bench_simulate_period(c: &mut Criterion) {
    let market = LogitMarket::new(MarketParams::default()).unwrap();
    c.bench_function("simulate_period 200x", |b| {
        b.iter(|| {
            for i in 0..200u32 {
                let p0 = 1.40 + (i % 80) as f64 * 0.01;
                let p1 = 2.20 - (i % 80) as f64 * 0.01;
                let _ = black_box(market.simulate_period(p0, p1));
            }
        })
    });
}

criterion_group!(benches, bench_simulate_period);
criterion_main!(benches);
