use std::fmt;

use tm_tensor::div_up;

/// Physical packing of a tensor into the texels of its image.
///
/// Every layout packs four consecutive elements of one logical dimension
/// into the four components of a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    /// Four consecutive columns (innermost dim) per texel.
    WidthPacked,
    /// Four consecutive rows per texel.
    HeightPacked,
    /// Four consecutive channels per texel. Default for fresh tensors.
    ChannelsPacked,
}

impl MemoryLayout {
    /// Stable numeric tag used inside uniform blocks.
    pub fn as_u32(self) -> u32 {
        match self {
            MemoryLayout::WidthPacked => 0,
            MemoryLayout::HeightPacked => 1,
            MemoryLayout::ChannelsPacked => 2,
        }
    }

    pub fn from_u32(tag: u32) -> Option<MemoryLayout> {
        match tag {
            0 => Some(MemoryLayout::WidthPacked),
            1 => Some(MemoryLayout::HeightPacked),
            2 => Some(MemoryLayout::ChannelsPacked),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLayout::WidthPacked => write!(f, "width-packed"),
            MemoryLayout::HeightPacked => write!(f, "height-packed"),
            MemoryLayout::ChannelsPacked => write!(f, "channels-packed"),
        }
    }
}

/// A conversion between two layouts. Every ordered pair of layouts maps to
/// exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutConversion {
    Identity,
    ChannelsToWidth,
    ChannelsToHeight,
    WidthToChannels,
    WidthToHeight,
    HeightToChannels,
    HeightToWidth,
}

impl LayoutConversion {
    pub fn between(from: MemoryLayout, to: MemoryLayout) -> LayoutConversion {
        use MemoryLayout::*;
        match (from, to) {
            (WidthPacked, WidthPacked)
            | (HeightPacked, HeightPacked)
            | (ChannelsPacked, ChannelsPacked) => LayoutConversion::Identity,
            (ChannelsPacked, WidthPacked) => LayoutConversion::ChannelsToWidth,
            (ChannelsPacked, HeightPacked) => LayoutConversion::ChannelsToHeight,
            (WidthPacked, ChannelsPacked) => LayoutConversion::WidthToChannels,
            (WidthPacked, HeightPacked) => LayoutConversion::WidthToHeight,
            (HeightPacked, ChannelsPacked) => LayoutConversion::HeightToChannels,
            (HeightPacked, WidthPacked) => LayoutConversion::HeightToWidth,
        }
    }

    /// Label recorded in the command stream for this conversion.
    pub fn label(self) -> &'static str {
        match self {
            LayoutConversion::Identity => "copy",
            LayoutConversion::ChannelsToWidth => "convert_channels_to_width_packed",
            LayoutConversion::ChannelsToHeight => "convert_channels_to_height_packed",
            LayoutConversion::WidthToChannels => "convert_width_to_channels_packed",
            LayoutConversion::WidthToHeight => "convert_width_to_height_packed",
            LayoutConversion::HeightToChannels => "convert_height_to_channels_packed",
            LayoutConversion::HeightToWidth => "convert_height_to_width_packed",
        }
    }
}

/// Sizes aligned from the innermost dimension as (W, H, C, N).
///
/// Missing dims are 1; everything in front of the channel dim folds into N.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Whcn {
    pub w: usize,
    pub h: usize,
    pub c: usize,
    pub n: usize,
}

impl Whcn {
    pub fn from_sizes(sizes: &[usize]) -> Whcn {
        let r = sizes.len();
        let at = |back: usize| if r >= back { sizes[r - back] } else { 1 };
        let n = if r > 3 { sizes[..r - 3].iter().product() } else { 1 };
        Whcn {
            w: at(1),
            h: at(2),
            c: at(3),
            n,
        }
    }

    pub fn numel(&self) -> usize {
        self.w * self.h * self.c * self.n
    }

    /// Split a row-major (NCHW) element index into coordinates.
    pub fn coords(&self, index: usize) -> [usize; 4] {
        let w = index % self.w;
        let h = (index / self.w) % self.h;
        let c = (index / (self.w * self.h)) % self.c;
        let n = index / (self.w * self.h * self.c);
        [w, h, c, n]
    }

    /// Inverse of `coords`.
    pub fn index(&self, [w, h, c, n]: [usize; 4]) -> usize {
        ((n * self.c + c) * self.h + h) * self.w + w
    }

    pub fn as_u32(&self) -> [u32; 4] {
        [self.w as u32, self.h as u32, self.c as u32, self.n as u32]
    }

    pub fn from_u32([w, h, c, n]: [u32; 4]) -> Whcn {
        Whcn {
            w: w as usize,
            h: h as usize,
            c: c as usize,
            n: n as usize,
        }
    }
}

/// Image extents (x, y, z) needed to hold `sizes` under `layout`.
pub fn image_extents(sizes: &[usize], layout: MemoryLayout) -> [u32; 3] {
    let s = Whcn::from_sizes(sizes);
    let ext = match layout {
        MemoryLayout::ChannelsPacked => [s.w, s.h, s.n * div_up(s.c, 4)],
        MemoryLayout::WidthPacked => [div_up(s.w, 4), s.h, s.n * s.c],
        MemoryLayout::HeightPacked => [s.w, div_up(s.h, 4), s.n * s.c],
    };
    [ext[0] as u32, ext[1] as u32, ext[2] as u32]
}

/// Texel position and component holding logical element `[w, h, c, n]`.
pub fn texel_of(sizes: &Whcn, layout: MemoryLayout, [w, h, c, n]: [usize; 4]) -> ([u32; 3], usize) {
    let (pos, comp) = match layout {
        MemoryLayout::ChannelsPacked => ([w, h, n * div_up(sizes.c, 4) + c / 4], c % 4),
        MemoryLayout::WidthPacked => ([w / 4, h, n * sizes.c + c], w % 4),
        MemoryLayout::HeightPacked => ([w, h / 4, n * sizes.c + c], h % 4),
    };
    ([pos[0] as u32, pos[1] as u32, pos[2] as u32], comp)
}

/// Logical element stored in component `comp` of texel `pos`, or `None`
/// when that slot is padding.
pub fn element_at(
    sizes: &Whcn,
    layout: MemoryLayout,
    pos: [u32; 3],
    comp: usize,
) -> Option<[usize; 4]> {
    let [x, y, z] = [pos[0] as usize, pos[1] as usize, pos[2] as usize];
    let coords = match layout {
        MemoryLayout::ChannelsPacked => {
            let groups = div_up(sizes.c, 4);
            [x, y, (z % groups) * 4 + comp, z / groups]
        }
        MemoryLayout::WidthPacked => [x * 4 + comp, y, z % sizes.c, z / sizes.c],
        MemoryLayout::HeightPacked => [x, y * 4 + comp, z % sizes.c, z / sizes.c],
    };
    let [w, h, c, n] = coords;
    (w < sizes.w && h < sizes.h && c < sizes.c && n < sizes.n).then_some(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whcn_alignment() {
        assert_eq!(Whcn::from_sizes(&[]), Whcn { w: 1, h: 1, c: 1, n: 1 });
        assert_eq!(Whcn::from_sizes(&[5]), Whcn { w: 5, h: 1, c: 1, n: 1 });
        assert_eq!(Whcn::from_sizes(&[2, 3, 4]), Whcn { w: 4, h: 3, c: 2, n: 1 });
        assert_eq!(Whcn::from_sizes(&[2, 2, 3, 4, 5]), Whcn { w: 5, h: 4, c: 3, n: 4 });
    }

    #[test]
    fn test_coords_roundtrip() {
        let s = Whcn::from_sizes(&[2, 3, 4, 5]);
        for i in 0..s.numel() {
            assert_eq!(s.index(s.coords(i)), i);
        }
    }

    #[test]
    fn test_image_extents() {
        assert_eq!(image_extents(&[3, 6], MemoryLayout::ChannelsPacked), [6, 3, 1]);
        assert_eq!(image_extents(&[3, 6], MemoryLayout::WidthPacked), [2, 3, 1]);
        assert_eq!(image_extents(&[5, 6], MemoryLayout::HeightPacked), [6, 2, 1]);
        assert_eq!(image_extents(&[6, 3, 4], MemoryLayout::ChannelsPacked), [4, 3, 2]);
        assert_eq!(image_extents(&[2, 4, 3, 3], MemoryLayout::ChannelsPacked), [3, 3, 2]);
    }

    #[test]
    fn test_texel_and_element_are_inverse() {
        let sizes = [3, 5, 6];
        let s = Whcn::from_sizes(&sizes);
        for layout in [
            MemoryLayout::WidthPacked,
            MemoryLayout::HeightPacked,
            MemoryLayout::ChannelsPacked,
        ] {
            let ext = image_extents(&sizes, layout);
            for i in 0..s.numel() {
                let (pos, comp) = texel_of(&s, layout, s.coords(i));
                assert!(pos[0] < ext[0] && pos[1] < ext[1] && pos[2] < ext[2]);
                assert_eq!(element_at(&s, layout, pos, comp), Some(s.coords(i)));
            }
        }
    }

    #[test]
    fn test_padding_slots() {
        let s = Whcn::from_sizes(&[2, 5]);
        // second texel of a width-packed row holds column 4 and three pads
        assert_eq!(element_at(&s, MemoryLayout::WidthPacked, [1, 0, 0], 0), Some([4, 0, 0, 0]));
        assert_eq!(element_at(&s, MemoryLayout::WidthPacked, [1, 0, 0], 1), None);
        assert_eq!(element_at(&s, MemoryLayout::ChannelsPacked, [0, 0, 0], 1), None);
    }

    #[test]
    fn test_conversion_is_total() {
        use MemoryLayout::*;
        let all = [WidthPacked, HeightPacked, ChannelsPacked];
        for from in all {
            for to in all {
                let conv = LayoutConversion::between(from, to);
                assert_eq!(conv == LayoutConversion::Identity, from == to);
            }
        }
        assert_eq!(
            LayoutConversion::between(ChannelsPacked, WidthPacked).label(),
            "convert_channels_to_width_packed"
        );
    }

    #[test]
    fn test_layout_tags() {
        for layout in [
            MemoryLayout::WidthPacked,
            MemoryLayout::HeightPacked,
            MemoryLayout::ChannelsPacked,
        ] {
            assert_eq!(MemoryLayout::from_u32(layout.as_u32()), Some(layout));
        }
        assert_eq!(MemoryLayout::from_u32(9), None);
    }
}
