use crate::util::{FiniteF32, FiniteF32Error};

/// A premultiplied RGBA pixel, as stored in every texture.
pub type Premul = [f32; 4];

/// A straight (non-premultiplied) RGBA color with every channel in `[0, 1]`.
/// All fully transparent colors are normalized to transparent black.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, bytemuck::Zeroable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(into = "[f32; 4]", try_from = "[f32; 4]")]
#[repr(transparent)]
pub struct Color([FiniteF32; 4]);
impl Color {
    pub const TRANSPARENT: Self = Self([FiniteF32::ZERO; 4]);
    pub const WHITE: Self = Self([FiniteF32::ONE; 4]);
    pub const BLACK: Self = Self([
        FiniteF32::ZERO,
        FiniteF32::ZERO,
        FiniteF32::ZERO,
        FiniteF32::ONE,
    ]);
    /// Create a color from straight channels, clamping each into `[0, 1]`.
    pub fn new_lossy(r: f32, g: f32, b: f32, a: f32) -> Result<Self, FiniteF32Error> {
        let channel = |v: f32| FiniteF32::new(v).map(|v| FiniteF32::new(v.get().clamp(0.0, 1.0)));
        let raw = Self([
            channel(r)??,
            channel(g)??,
            channel(b)??,
            channel(a)??,
        ]);
        if raw.0[3].get() == 0.0 {
            Ok(Self::TRANSPARENT)
        } else {
            Ok(raw)
        }
    }
    pub fn from_array_lossy([r, g, b, a]: [f32; 4]) -> Result<Self, FiniteF32Error> {
        Self::new_lossy(r, g, b, a)
    }
    /// Build from 8-bit straight channels. Infallible, every byte maps to a finite channel.
    #[must_use]
    pub fn from_rgba8([r, g, b, a]: [u8; 4]) -> Self {
        let f = |v: u8| f32::from(v) / 255.0;
        Self::new_lossy(f(r), f(g), f(b), f(a)).unwrap_or(Self::TRANSPARENT)
    }
    #[must_use]
    pub fn as_array(&self) -> [f32; 4] {
        self.0.map(FiniteF32::get)
    }
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.0[3].get()
    }
    /// Premultiplied form, for blending.
    #[must_use]
    pub fn premultiplied(&self) -> Premul {
        let [r, g, b, a] = self.as_array();
        [r * a, g * a, b * a, a]
    }
    /// Convert a premultiplied pixel back to a straight color.
    #[must_use]
    pub fn from_premultiplied([r, g, b, a]: Premul) -> Self {
        if a <= 0.0 {
            return Self::TRANSPARENT;
        }
        Self::new_lossy(r / a, g / a, b / a, a).unwrap_or(Self::TRANSPARENT)
    }
    #[must_use]
    pub fn to_rgba8(&self) -> [u8; 4] {
        self.as_array().map(|v| (v * 255.0).round() as u8)
    }
}
impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}
impl From<Color> for [f32; 4] {
    fn from(value: Color) -> Self {
        value.as_array()
    }
}
impl TryFrom<[f32; 4]> for Color {
    type Error = FiniteF32Error;
    fn try_from(value: [f32; 4]) -> Result<Self, Self::Error> {
        Self::from_array_lossy(value)
    }
}

#[cfg(test)]
mod test {
    use super::Color;
    #[test]
    fn transparent_normalized() {
        let c = Color::new_lossy(1.0, 0.5, 0.2, 0.0).unwrap();
        assert_eq!(c, Color::TRANSPARENT);
    }
    #[test]
    fn premultiply_round_trip() {
        let c = Color::new_lossy(1.0, 0.5, 0.0, 0.5).unwrap();
        assert_eq!(c.premultiplied(), [0.5, 0.25, 0.0, 0.5]);
        assert_eq!(Color::from_premultiplied(c.premultiplied()), c);
    }
    #[test]
    fn rejects_nan_and_clamps() {
        assert!(Color::new_lossy(f32::NAN, 0.0, 0.0, 1.0).is_err());
        let c = Color::new_lossy(2.0, -1.0, 0.0, 1.0).unwrap();
        assert_eq!(c.as_array(), [1.0, 0.0, 0.0, 1.0]);
    }
    #[test]
    fn rgba8() {
        assert_eq!(Color::from_rgba8([255, 0, 0, 255]).to_rgba8(), [255, 0, 0, 255]);
        assert_eq!(Color::WHITE.to_rgba8(), [255; 4]);
    }
}
