//! Non-batched float matmul.
//!
//! Input `[M, K]` is width-packed, weight `[K, N]` height-packed, so the
//! texel `(kt, row)` of the input and `(col, kt)` of the weight each hold
//! four matching inner-dimension elements. The output `[M, N]` is
//! channels-packed with one element per texel.

use tm_tensor::div_up;

use super::{dot, fetch, Bindings};
use crate::params::{AddmmBlock, MmBlock};

/// Output rows and columns covered by one invocation.
const BLOCK: u32 = 4;

fn accumulate(
    b: &Bindings<'_>,
    out_extents: [u32; 3],
    k: u32,
    id: [u32; 3],
) -> Option<[[f32; 4]; 4]> {
    let [out_w, out_h, _] = out_extents;
    if id[0] * BLOCK >= out_w || id[1] * BLOCK >= out_h || id[2] > 0 {
        return None;
    }
    let (input, weight) = (b.input(0), b.input(1));
    let texels = div_up(k as usize, 2) as u32;
    let mut sums = [[0.0f32; 4]; 4];
    for kt in 0..texels {
        let rows: [[f32; 4]; 4] =
            std::array::from_fn(|r| fetch(input, kt, id[1] * BLOCK + r as u32, 0));
        let cols: [[f32; 4]; 4] =
            std::array::from_fn(|c| fetch(weight, id[0] * BLOCK + c as u32, kt, 0));
        for (r, row) in rows.iter().enumerate() {
            for (c, col) in cols.iter().enumerate() {
                sums[r][c] += dot(*row, *col);
            }
        }
    }
    Some(sums)
}

fn write_block(
    b: &mut Bindings<'_>,
    id: [u32; 3],
    values: impl Fn(u32, u32, f32) -> f32,
    sums: [[f32; 4]; 4],
) {
    for (r, row) in sums.iter().enumerate() {
        for (c, &sum) in row.iter().enumerate() {
            let (x, y) = (id[0] * BLOCK + c as u32, id[1] * BLOCK + r as u32);
            b.output.store(x as i64, y as i64, 0, [values(x, y, sum), 0.0, 0.0, 0.0]);
        }
    }
}

pub(super) fn mm(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: MmBlock = b.params();
    let alpha = p.multiplier[0];
    if let Some(sums) = accumulate(b, p.out_extents, p.k, id) {
        write_block(b, id, |_, _, sum| alpha * sum, sums);
    }
}

/// `alpha * (A . W) + beta * bias` with a width-packed bias. A bias row or
/// column count of 1 broadcasts.
pub(super) fn addmm(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: AddmmBlock = b.params();
    let [alpha, beta] = p.multiplier;
    let Some(sums) = accumulate(b, p.out_extents, p.k, id) else {
        return;
    };

    let mut bias = [[0.0f32; 4]; 4];
    for (r, row) in bias.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            let x = if p.bias_width == 1 { 0 } else { id[0] * BLOCK + c as u32 };
            let y = if p.bias_extents[1] == 1 { 0 } else { id[1] * BLOCK + r as u32 };
            *v = fetch(b.input(2), x / 4, y, 0)[(x % 4) as usize];
        }
    }
    let base = [id[0] * BLOCK, id[1] * BLOCK];
    write_block(
        b,
        id,
        |x, y, sum| alpha * sum + beta * bias[(y - base[1]) as usize][(x - base[0]) as usize],
        sums,
    );
}
