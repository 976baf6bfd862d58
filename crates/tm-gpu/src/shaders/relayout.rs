//! Element-wise copy between two image descriptions.
//!
//! One invocation per destination texel. Each destination component is
//! mapped to its row-major element index, which is then located in the
//! source under the source sizes and layout. This single kernel covers
//! layout conversion (same sizes), reshape (same element count) and plain
//! copies.

use super::{fetch, Bindings};
use crate::layout::{element_at, texel_of, MemoryLayout, Whcn};
use crate::params::RelayoutBlock;

pub(super) fn relayout(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: RelayoutBlock = b.params();
    let [ex, ey, ez] = b.output.extents();
    if id[0] >= ex || id[1] >= ey || id[2] >= ez {
        return;
    }
    let (Some(dst_layout), Some(src_layout)) = (
        MemoryLayout::from_u32(p.dst_layout),
        MemoryLayout::from_u32(p.src_layout),
    ) else {
        return;
    };
    let dst = Whcn::from_u32(p.dst_sizes);
    let src = Whcn::from_u32(p.src_sizes);

    let mut texel = [0.0f32; 4];
    for (comp, value) in texel.iter_mut().enumerate() {
        if let Some(coords) = element_at(&dst, dst_layout, id, comp) {
            let (pos, src_comp) = texel_of(&src, src_layout, src.coords(dst.index(coords)));
            *value = fetch(b.input(0), pos[0], pos[1], pos[2])[src_comp];
        }
    }
    b.output.store(id[0] as i64, id[1] as i64, id[2] as i64, texel);
}
