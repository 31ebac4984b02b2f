use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// An opaque sRGB color. Serialized as a `#rrggbb` string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (leading `#` optional, case-insensitive).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Packed little-endian RGBA with full alpha, the byte order canvas `ImageData` expects.
    pub fn to_rgba_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::from_hex(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid color {raw:?}, expected #rrggbb")))
    }
}

/// Curated, perceptually distinct region colors.
///
/// Datasets with more regions than entries wrap around and reuse colors;
/// that collision is a known limitation of index-based assignment.
pub const PALETTE: [Color; 81] = [
    Color::rgb(0xe6, 0x19, 0x4b), Color::rgb(0x3c, 0xb4, 0x4b), Color::rgb(0xff, 0xe1, 0x19),
    Color::rgb(0x43, 0x63, 0xd8), Color::rgb(0xf5, 0x82, 0x31), Color::rgb(0x91, 0x1e, 0xb4),
    Color::rgb(0x46, 0xf0, 0xf0), Color::rgb(0xf0, 0x32, 0xe6), Color::rgb(0xbc, 0xf6, 0x0c),
    Color::rgb(0xfa, 0xbe, 0xbe), Color::rgb(0x00, 0x80, 0x80), Color::rgb(0xe6, 0xbe, 0xff),
    Color::rgb(0x9a, 0x63, 0x24), Color::rgb(0xff, 0xfa, 0xc8), Color::rgb(0x80, 0x00, 0x00),
    Color::rgb(0xaa, 0xff, 0xc3), Color::rgb(0x80, 0x80, 0x00), Color::rgb(0xff, 0xd8, 0xb1),
    Color::rgb(0x00, 0x00, 0x75), Color::rgb(0x80, 0x80, 0x80), Color::rgb(0xff, 0xff, 0xff),
    Color::rgb(0x00, 0x00, 0x00), Color::rgb(0xff, 0xe4, 0xe1), Color::rgb(0x8a, 0x2b, 0xe2),
    Color::rgb(0x00, 0xce, 0xd1), Color::rgb(0xff, 0x14, 0x93), Color::rgb(0x7f, 0xff, 0xd4),
    Color::rgb(0xdc, 0x14, 0x3c), Color::rgb(0x00, 0xfa, 0x9a), Color::rgb(0xb8, 0x86, 0x0b),
    Color::rgb(0xff, 0x7f, 0x50), Color::rgb(0x1e, 0x90, 0xff), Color::rgb(0xad, 0xff, 0x2f),
    Color::rgb(0xff, 0x69, 0xb4), Color::rgb(0xff, 0xd7, 0x00), Color::rgb(0x7c, 0xfc, 0x00),
    Color::rgb(0x64, 0x95, 0xed), Color::rgb(0xff, 0x45, 0x00), Color::rgb(0x2e, 0x8b, 0x57),
    Color::rgb(0xee, 0x82, 0xee), Color::rgb(0x40, 0xe0, 0xd0), Color::rgb(0xd2, 0x69, 0x1e),
    Color::rgb(0x9a, 0xcd, 0x32), Color::rgb(0xba, 0x55, 0xd3), Color::rgb(0xff, 0x63, 0x47),
    Color::rgb(0x5f, 0x9e, 0xa0), Color::rgb(0xff, 0xbf, 0x00), Color::rgb(0xb0, 0x30, 0x60),
    Color::rgb(0xff, 0x8c, 0x00), Color::rgb(0x32, 0xcd, 0x32), Color::rgb(0x46, 0x82, 0xb4),
    Color::rgb(0xda, 0x70, 0xd6), Color::rgb(0x00, 0xbf, 0xff), Color::rgb(0xb2, 0x22, 0x22),
    Color::rgb(0x8d, 0xb6, 0x00), Color::rgb(0xff, 0x00, 0xff), Color::rgb(0xff, 0xde, 0xad),
    Color::rgb(0x00, 0x80, 0x00), Color::rgb(0xde, 0xb8, 0x87), Color::rgb(0xb0, 0xe0, 0xe6),
    Color::rgb(0xc7, 0x15, 0x85), Color::rgb(0x66, 0xcd, 0xaa), Color::rgb(0xff, 0xa0, 0x7a),
    Color::rgb(0x80, 0x00, 0x80), Color::rgb(0x98, 0xfb, 0x98), Color::rgb(0xff, 0xb6, 0xc1),
    Color::rgb(0x55, 0x6b, 0x2f), Color::rgb(0xff, 0x6e, 0xb4), Color::rgb(0x6b, 0x8e, 0x23),
    Color::rgb(0xff, 0xda, 0xb9), Color::rgb(0x41, 0x69, 0xe1), Color::rgb(0xff, 0x6f, 0x00),
    Color::rgb(0x20, 0xb2, 0xaa), Color::rgb(0xd2, 0xb4, 0x8c), Color::rgb(0x8b, 0x00, 0x00),
    Color::rgb(0x00, 0xff, 0x7f), Color::rgb(0xbf, 0x00, 0xff), Color::rgb(0x70, 0x80, 0x90),
    Color::rgb(0xff, 0xea, 0x00), Color::rgb(0x6a, 0x5a, 0xcd), Color::rgb(0x00, 0xff, 0x00),
];

/// Deterministic color for the region at `index` in dataset order.
pub fn color_for(index: usize) -> Color {
    PALETTE[index % PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::{Color, PALETTE, color_for};

    #[test]
    fn color_for_wraps_at_palette_length() {
        for i in 0..PALETTE.len() {
            for k in 0..4 {
                assert_eq!(color_for(i), color_for(i + k * PALETTE.len()));
            }
        }
    }

    #[test]
    fn first_colors_match_curated_order() {
        assert_eq!(color_for(0).to_hex(), "#e6194b");
        assert_eq!(color_for(1).to_hex(), "#3cb44b");
        assert_eq!(color_for(80).to_hex(), "#00ff00");
    }

    #[test]
    fn palette_entries_are_distinct() {
        for (i, a) in PALETTE.iter().enumerate() {
            for b in &PALETTE[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn hex_parsing_accepts_case_and_missing_hash() {
        assert_eq!(Color::from_hex("#FF8800"), Some(Color::rgb(255, 136, 0)));
        assert_eq!(Color::from_hex("ff8800"), Some(Color::rgb(255, 136, 0)));
        assert_eq!(Color::from_hex("#ff88"), None);
        assert_eq!(Color::from_hex("#gg0000"), None);
        assert_eq!(Color::from_hex("#ffé000"), None);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let json = serde_json::to_string(&Color::rgb(1, 2, 3)).expect("serialize color");
        assert_eq!(json, "\"#010203\"");
        let back: Color = serde_json::from_str("\"#0A0b0C\"").expect("deserialize color");
        assert_eq!(back, Color::rgb(10, 11, 12));
        assert!(serde_json::from_str::<Color>("\"red\"").is_err());
    }
}
