use aes_cpa::{
    config::Config,
    distinguishers::{
        correlation::pearson,
        cpa::{ByteResult, KeyByteSolver},
    },
    scheduler::WorkScheduler,
    trace::{BLOCK_SIZE, Dataset},
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ndarray::Array2;
use ndarray_rand::RandomExt;
use ndarray_rand::rand::{SeedableRng, rngs::StdRng};
use ndarray_rand::rand_distr::Uniform;

fn random_dataset(rng: &mut StdRng, num_traces: usize, num_samples: usize) -> Dataset {
    let traces = Array2::random_using((num_traces, num_samples), Uniform::new(-2., 2.), rng);
    let plaintexts = Array2::random_using(
        (num_traces, BLOCK_SIZE),
        Uniform::new_inclusive(0u8, 255u8),
        rng,
    );

    Dataset::from_arrays(plaintexts.view(), traces.view()).unwrap()
}

fn bench_pearson(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let data = Array2::random_using((2, 5000), Uniform::new(-2., 2.), &mut rng);

    c.bench_function("pearson_5000", |b| {
        b.iter(|| pearson(data.row(0), data.row(1)))
    });
}

fn bench_cpa(c: &mut Criterion) {
    // Seed rng to get the same output each run
    let mut rng = StdRng::seed_from_u64(0);

    let mut group = c.benchmark_group("cpa");

    group.measurement_time(std::time::Duration::from_secs(30));

    for num_traces in [50, 500, 2000].into_iter() {
        let dataset = random_dataset(&mut rng, num_traces, 500);
        let solver = KeyByteSolver::new(&dataset);

        group.bench_with_input(
            BenchmarkId::new("solve_one_byte", num_traces),
            &solver,
            |b, solver| b.iter(|| solver.solve(0)),
        );
        group.bench_with_input(
            BenchmarkId::new("solve_full_key", num_traces),
            &solver,
            |b, solver| {
                let scheduler = WorkScheduler::new(Config::default()).unwrap();
                let positions: Vec<usize> = (0..BLOCK_SIZE).collect();
                b.iter(|| {
                    scheduler
                        .run(solver, &positions, &mut Vec::<ByteResult>::new())
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_pearson, bench_cpa);
criterion_main!(benches);
