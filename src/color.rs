use palette::{Hsl, IntoColor, Srgb};

/// 8-bit sRGB colour used in figure descriptions.
pub type Color = Srgb<u8>;

pub const HISTOGRAM_COLOR: Color = palette::named::BLACK;
pub const RECO_COLOR: Color = palette::named::RED;
pub const REFERENCE_COLOR: Color = palette::named::BLUE;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Srgb::new(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

/// `#rrggbb` notation.
pub fn to_hex(color: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_colours_are_distinct() {
        let colors = generate_palette(4);
        assert_eq!(colors.len(), 4);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn hex_notation() {
        assert_eq!(to_hex(RECO_COLOR), "#ff0000");
        assert_eq!(to_hex(HISTOGRAM_COLOR), "#000000");
    }
}
