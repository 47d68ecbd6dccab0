//! Radix argsort over `u64` keys.
//!
//! A least-significant-digit radix sort with 4 bit digits. Every pass runs the
//! same stages as a GPU radix sort: per-block digit histograms (in parallel),
//! a scan of the histograms in bin-major order, and a stable scatter.

use rayon::prelude::*;

/// Bits consumed per pass.
pub const BITS_PER_PASS: u32 = 4;
/// Number of digit bins per pass.
pub const BIN_COUNT: usize = 1 << BITS_PER_PASS;
/// Number of keys that share one histogram.
pub const BLOCK_SIZE: usize = 256 * 4;

fn digit(key: u64, shift: u32) -> usize {
    ((key >> shift) & (BIN_COUNT as u64 - 1)) as usize
}

/// Perform a radix argsort on the input keys and values.
///
/// Only the lowest `sorting_bits` bits of the keys are considered, higher bits
/// must be zero for the output to be fully sorted. The sort is stable: values
/// with equal keys keep their input order.
pub fn radix_argsort<V: Copy>(
    input_keys: Vec<u64>,
    input_values: Vec<V>,
    sorting_bits: u32,
) -> (Vec<u64>, Vec<V>) {
    assert_eq!(
        input_keys.len(),
        input_values.len(),
        "Input keys and values must have the same number of elements"
    );
    assert!(sorting_bits <= 64, "Can only sort up to 64 bits");

    let _span = tracing::trace_span!("Radix sort", len = input_keys.len()).entered();

    let mut cur_keys = input_keys;
    let mut cur_vals = input_values;

    if cur_keys.len() <= 1 {
        return (cur_keys, cur_vals);
    }

    let mut out_keys = vec![0u64; cur_keys.len()];
    let mut out_vals = cur_vals.clone();

    for pass in 0..sorting_bits.div_ceil(BITS_PER_PASS) {
        let shift = pass * BITS_PER_PASS;

        // Count: one histogram per block.
        let block_counts: Vec<[u32; BIN_COUNT]> = cur_keys
            .par_chunks(BLOCK_SIZE)
            .map(|block| {
                let mut counts = [0u32; BIN_COUNT];
                for &key in block {
                    counts[digit(key, shift)] += 1;
                }
                counts
            })
            .collect();

        // A pass where every key lands in the same bin is a no-op.
        let mut bin_totals = [0usize; BIN_COUNT];
        for counts in &block_counts {
            for (total, &count) in bin_totals.iter_mut().zip(counts) {
                *total += count as usize;
            }
        }
        if bin_totals.contains(&cur_keys.len()) {
            continue;
        }

        // Scan: bin-major, so every block writes after all lower bins and after
        // earlier blocks within the same bin.
        let mut block_offsets = vec![[0usize; BIN_COUNT]; block_counts.len()];
        let mut running = 0usize;
        for bin in 0..BIN_COUNT {
            for (offsets, counts) in block_offsets.iter_mut().zip(&block_counts) {
                offsets[bin] = running;
                running += counts[bin] as usize;
            }
        }

        // Scatter.
        for ((keys, vals), offsets) in cur_keys
            .chunks(BLOCK_SIZE)
            .zip(cur_vals.chunks(BLOCK_SIZE))
            .zip(block_offsets.iter_mut())
        {
            for (&key, &val) in keys.iter().zip(vals) {
                let slot = &mut offsets[digit(key, shift)];
                out_keys[*slot] = key;
                out_vals[*slot] = val;
                *slot += 1;
            }
        }

        std::mem::swap(&mut cur_keys, &mut out_keys);
        std::mem::swap(&mut cur_vals, &mut out_vals);
    }

    (cur_keys, cur_vals)
}
