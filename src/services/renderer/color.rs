/// An opaque RGB text color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Parses `#rgb`, `#rrggbb`, `rgb` or `rrggbb` (any case, surrounding
    /// whitespace ignored).
    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };

        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Rgb {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Picks the color for one layout field.
///
/// The field's own color wins, then the template color, then black. An
/// unparseable field color falls through to the template color rather than
/// straight to black.
pub fn resolve_text_color(field_color: Option<&str>, template_color: Option<&str>) -> Rgb {
    field_color
        .or(template_color)
        .and_then(Rgb::parse_hex)
        .or_else(|| template_color.and_then(Rgb::parse_hex))
        .unwrap_or(Rgb::BLACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_digit_hex_with_and_without_hash() {
        let expected = Rgb { r: 0x1f, g: 0x29, b: 0x37 };
        assert_eq!(Rgb::parse_hex("#1f2937"), Some(expected));
        assert_eq!(Rgb::parse_hex("1F2937"), Some(expected));
        assert_eq!(Rgb::parse_hex("  #1f2937 "), Some(expected));
    }

    #[test]
    fn expands_three_digit_hex() {
        assert_eq!(Rgb::parse_hex("#fA0"), Some(Rgb { r: 0xff, g: 0xaa, b: 0x00 }));
    }

    #[test]
    fn rejects_other_lengths_and_non_hex() {
        assert_eq!(Rgb::parse_hex("#1234"), None);
        assert_eq!(Rgb::parse_hex("#ggg"), None);
        assert_eq!(Rgb::parse_hex("red"), None);
        assert_eq!(Rgb::parse_hex(""), None);
    }

    #[test]
    fn invalid_field_color_falls_back_to_template_then_black() {
        assert_eq!(
            resolve_text_color(Some("nope"), Some("#ffffff")),
            Rgb { r: 255, g: 255, b: 255 }
        );
        assert_eq!(resolve_text_color(Some("nope"), Some("also-bad")), Rgb::BLACK);
        assert_eq!(resolve_text_color(None, None), Rgb::BLACK);
        assert_eq!(
            resolve_text_color(Some("#f00"), Some("#00f")),
            Rgb { r: 255, g: 0, b: 0 }
        );
    }

    #[test]
    fn renders_lowercase_hex() {
        assert_eq!(Rgb { r: 31, g: 41, b: 55 }.to_hex(), "#1f2937");
    }
}
