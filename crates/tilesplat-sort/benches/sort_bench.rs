use rand::{Rng, SeedableRng};
use tilesplat_sort::radix_argsort;

fn main() {
    divan::main();
}

const SIZES: [usize; 3] = [10_000, 100_000, 1_000_000];

fn random_keys(len: usize, bits: u32) -> Vec<u64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let max = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    (0..len).map(|_| rng.random_range(0..=max)).collect()
}

#[divan::bench(args = SIZES)]
fn sort_depth_keys(bencher: divan::Bencher, len: usize) {
    let keys = random_keys(len, 32);
    let values: Vec<u32> = (0..len as u32).collect();
    bencher
        .with_inputs(|| (keys.clone(), values.clone()))
        .bench_values(|(keys, values)| radix_argsort(keys, values, 32));
}

#[divan::bench(args = SIZES)]
fn sort_intersection_keys(bencher: divan::Bencher, len: usize) {
    let keys = random_keys(len, 48);
    let values: Vec<u32> = (0..len as u32).collect();
    bencher
        .with_inputs(|| (keys.clone(), values.clone()))
        .bench_values(|(keys, values)| radix_argsort(keys, values, 48));
}
