//! Prefix sums over `u32` counts.
//!
//! The scan is hierarchical: every block of [`THREADS_PER_GROUP`] elements is
//! scanned independently, the block totals are scanned recursively, and the
//! scanned totals are added back onto every block. Blocks are processed in
//! parallel with rayon.

use rayon::prelude::*;

/// Number of elements scanned together in one block.
pub const THREADS_PER_GROUP: usize = 512;

fn scan_block(block: &mut [u32]) {
    let mut acc = 0u32;
    for v in block {
        acc += *v;
        *v = acc;
    }
}

fn prefix_sum_in_place(data: &mut [u32]) {
    if data.len() <= THREADS_PER_GROUP {
        scan_block(data);
        return;
    }

    data.par_chunks_mut(THREADS_PER_GROUP).for_each(scan_block);

    // Totals of every block, scanned so entry i holds the sum of blocks 0..=i.
    let mut group_sums: Vec<u32> = data
        .chunks(THREADS_PER_GROUP)
        .map(|block| block[block.len() - 1])
        .collect();
    prefix_sum_in_place(&mut group_sums);

    data.par_chunks_mut(THREADS_PER_GROUP)
        .skip(1)
        .zip(group_sums.par_iter())
        .for_each(|(block, &offset)| {
            for v in block {
                *v += offset;
            }
        });
}

/// Compute the inclusive prefix sum of `input`.
///
/// Element `i` of the output is `input[0] + ... + input[i]`. The caller is
/// responsible for making sure the total fits in a `u32`.
pub fn prefix_sum(input: &[u32]) -> Vec<u32> {
    let _span = tracing::trace_span!("prefix_sum", len = input.len()).entered();
    let mut output = input.to_vec();
    prefix_sum_in_place(&mut output);
    output
}

/// Compute the exclusive prefix sum of `input`.
///
/// Element `i` of the output is `input[0] + ... + input[i - 1]`, so the first
/// element is always zero. Returns the scanned values together with the total.
pub fn exclusive_prefix_sum(input: &[u32]) -> (Vec<u32>, u32) {
    let inclusive = prefix_sum(input);
    let total = inclusive.last().copied().unwrap_or(0);
    let exclusive = inclusive
        .par_iter()
        .zip(input.par_iter())
        .map(|(&sum, &x)| sum - x)
        .collect();
    (exclusive, total)
}
