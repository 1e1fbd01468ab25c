use burn_char_rnn::{BatchGenerator, CharVocab};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

#[derive(Clone, Copy)]
struct BatchingConfig {
    name: &'static str,
    batch: usize,
    unroll: usize,
}

const BATCHING_CONFIGS: &[BatchingConfig] = &[
    BatchingConfig {
        name: "b20_u10",
        batch: 20,
        unroll: 10,
    },
    BatchingConfig {
        name: "b64_u50",
        batch: 64,
        unroll: 50,
    },
    BatchingConfig {
        name: "b128_u100",
        batch: 128,
        unroll: 100,
    },
];

fn batching_bench(c: &mut Criterion) {
    let text = "First Citizen:\nBefore we proceed any further, hear me speak.\n".repeat(2048);
    let vocab = CharVocab::fit(std::iter::once(text.as_str())).expect("vocab");

    let mut group = c.benchmark_group("batch_generator_next");
    for config in BATCHING_CONFIGS {
        let mut generator =
            BatchGenerator::new(&text, config.batch, config.unroll, &vocab).expect("generator");
        group.bench_with_input(
            BenchmarkId::from_parameter(config.name),
            config,
            |b, _config| {
                b.iter(|| {
                    let batch = generator.next_batch();
                    batch.split()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, batching_bench);
criterion_main!(benches);
