//! RGBA color strings as stored in settings.
//!
//! Accepted forms: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` and
//! `rgba(r, g, b, a)` / `rgb(r, g, b)` with 0-255 channels and a 0-1 alpha.

use serde::{Deserialize, Serialize};

/// Linear RGBA color with channels in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
            a: a.clamp(0.0, 1.0),
        }
    }

    /// Parse a color string, returning `None` when it is not recognized.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        let lower = s.to_ascii_lowercase();
        if let Some(body) = lower.strip_prefix("rgba(").and_then(|b| b.strip_suffix(')')) {
            return parse_functional(body, true);
        }
        if let Some(body) = lower.strip_prefix("rgb(").and_then(|b| b.strip_suffix(')')) {
            return parse_functional(body, false);
        }
        None
    }

    /// Parse `input`, falling back to `fallback` when unrecognized.
    pub fn parse_or(input: &str, fallback: Rgba) -> Self {
        Self::parse(input).unwrap_or(fallback)
    }

    /// 8-bit channels, e.g. for rerun.
    pub fn to_u8(self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    /// Canonical `#rrggbbaa` form.
    pub fn to_hex(self) -> String {
        let [r, g, b, a] = self.to_u8();
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    let channels: [u8; 4] = match hex.len() {
        3 => [nibble(0)?, nibble(1)?, nibble(2)?, 255],
        4 => [nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?],
        6 => [byte(0)?, byte(2)?, byte(4)?, 255],
        8 => [byte(0)?, byte(2)?, byte(4)?, byte(6)?],
        _ => return None,
    };
    let [r, g, b, a] = channels.map(|c| c as f32 / 255.0);
    Some(Rgba::new(r, g, b, a))
}

fn parse_functional(body: &str, with_alpha: bool) -> Option<Rgba> {
    let parts: Vec<f32> = body
        .split(',')
        .map(|p| p.trim().parse::<f32>().ok())
        .collect::<Option<Vec<_>>>()?;

    let expected = if with_alpha { 4 } else { 3 };
    if parts.len() != expected || parts.iter().any(|p| !p.is_finite()) {
        return None;
    }
    let alpha = if with_alpha { parts[3] } else { 1.0 };
    Some(Rgba::new(parts[0] / 255.0, parts[1] / 255.0, parts[2] / 255.0, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Rgba::parse("#fff"), Some(Rgba::WHITE));
        assert_eq!(Rgba::parse("#ffffffff"), Some(Rgba::WHITE));
        assert_eq!(Rgba::parse("#ff000080").map(Rgba::to_u8), Some([255, 0, 0, 128]));
        assert_eq!(Rgba::parse("#00ff00").map(Rgba::to_u8), Some([0, 255, 0, 255]));
        assert_eq!(Rgba::parse("#0f08").map(Rgba::to_u8), Some([0, 255, 0, 136]));
    }

    #[test]
    fn test_parse_functional_forms() {
        assert_eq!(
            Rgba::parse("rgba(255, 0, 0, 0.5)").map(Rgba::to_u8),
            Some([255, 0, 0, 128])
        );
        assert_eq!(Rgba::parse("RGB(0,0,255)").map(Rgba::to_u8), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Rgba::parse("").is_none());
        assert!(Rgba::parse("#12345").is_none());
        assert!(Rgba::parse("#ggg").is_none());
        assert!(Rgba::parse("rgba(1,2,3)").is_none());
        assert!(Rgba::parse("blue").is_none());
        assert_eq!(Rgba::parse_or("blue", Rgba::WHITE), Rgba::WHITE);
    }

    #[test]
    fn test_hex_round_trip() {
        let color = Rgba::parse("#7c6bffff").unwrap();
        assert_eq!(color.to_hex(), "#7c6bffff");
    }
}
