use binrw::prelude::*;
use modular_bitfield::prelude::*;

pub const HEADER_SIZE: usize = 80;
pub const FACET_SIZE: usize = 50;

/// Size a binary file holding `facet_count` facets must have.
pub fn binary_size(facet_count: u32) -> u64 {
    (HEADER_SIZE as u64 + 4) + facet_count as u64 * FACET_SIZE as u64
}

#[derive(Debug, Clone, BinRead)]
pub struct StlHeader {
    pub text: [u8; HEADER_SIZE],
    pub facet_count: u32,
}

impl StlHeader {
    /// Default colour of Materialise files, stored as `COLOR=` followed by
    /// four bytes somewhere in the header text.
    pub fn materialise_color(&self) -> Option<[u8; 4]> {
        let start = self
            .text
            .windows(6)
            .position(|window| window == b"COLOR=")?
            + 6;
        let mut color = [0u8; 4];
        for (index, channel) in color.iter_mut().enumerate() {
            *channel = self.text.get(start + index).copied().unwrap_or(0);
        }
        Some(color)
    }
}

/// 5-5-5-1 colour attribute of a facet.
///
/// Materialise swaps the order of the two outer channels, so they are named
/// by position rather than by colour.
#[bitfield]
#[derive(Debug, Clone, Copy, BinRead)]
#[br(map = Self::from_bytes)]
pub struct StlColor {
    pub low: B5,
    pub middle: B5,
    pub high: B5,
    pub valid: bool,
}

impl StlColor {
    pub fn to_rgba(self, materialise: bool) -> [f32; 4] {
        let scale = |value: u8| value as f32 / 31.0;
        let (red, blue) = if materialise {
            (self.low(), self.high())
        } else {
            (self.high(), self.low())
        };
        [scale(red), scale(self.middle()), scale(blue), 1.0]
    }
}

#[derive(Debug, Clone, BinRead)]
pub struct StlFacet {
    pub normal: [f32; 3],
    pub vertices: [[f32; 3]; 3],
    pub color: StlColor,
}

#[derive(Debug, Clone, BinRead)]
#[br(little)]
pub struct StlBinaryFile {
    pub header: StlHeader,
    #[br(count = header.facet_count)]
    pub facets: Vec<StlFacet>,
}
