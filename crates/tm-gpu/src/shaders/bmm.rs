//! Batched float matmul.
//!
//! Input `[B, H, K]` is channels-packed, so texel `(k, row, b/4)` carries
//! four batches in its lanes. The weight `[B, K, N]` is 4-plane tiled with
//! one 2x2 block per texel at `(col/2, k/2, b)`. Each invocation produces
//! a 2x2 output block for four batches.

use super::{fetch, tiled_element, Bindings};
use crate::params::{BaddbmmBlock, BmmBlock};

fn run(
    b: &mut Bindings<'_>,
    out_extents: [u32; 3],
    k: u32,
    id: [u32; 3],
    multiplier: [f32; 2],
    with_bias: bool,
) {
    let [out_w, out_h, out_d] = out_extents;
    if id[0] * 2 >= out_w || id[1] * 2 >= out_h || id[2] >= out_d {
        return;
    }
    let batches = b.input(1).extents()[2];
    let [alpha, beta] = multiplier;
    let [col0, row0] = [id[0] * 2, id[1] * 2];

    // acc[r][c] holds four batch lanes.
    let mut acc = [[[0.0f32; 4]; 2]; 2];
    for kt in 0..k {
        let a: [[[f32; 4]; 2]; 2] = std::array::from_fn(|r| {
            std::array::from_fn(|j| fetch(b.input(0), 2 * kt + j as u32, row0 + r as u32, id[2]))
        });
        for lane in 0..4u32 {
            let batch = id[2] * 4 + lane;
            if batch >= batches {
                break;
            }
            let w = fetch(b.input(1), id[0], kt, batch);
            let l = lane as usize;
            for r in 0..2 {
                acc[r][0][l] += a[r][0][l] * w[0] + a[r][1][l] * w[2];
                acc[r][1][l] += a[r][0][l] * w[1] + a[r][1][l] * w[3];
            }
        }
    }

    for r in 0..2u32 {
        for c in 0..2u32 {
            let (row, col) = (row0 + r, col0 + c);
            let mut texel = [0.0f32; 4];
            for lane in 0..4u32 {
                let batch = id[2] * 4 + lane;
                if batch >= batches {
                    break;
                }
                let mut value = alpha * acc[r as usize][c as usize][lane as usize];
                if with_bias {
                    value += beta * tiled_element(b.input(2), row, col, batch);
                }
                texel[lane as usize] = value;
            }
            b.output.store(col as i64, row as i64, id[2] as i64, texel);
        }
    }
}

pub(super) fn bmm(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: BmmBlock = b.params();
    run(b, p.out_extents, p.k, id, p.multiplier, false);
}

pub(super) fn baddbmm(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: BaddbmmBlock = b.params();
    run(b, p.out_extents, p.k, id, p.multiplier, true);
}
