use crate::color::Premul;

#[derive(
    strum::AsRefStr,
    PartialEq,
    Eq,
    strum::EnumIter,
    Copy,
    Clone,
    Hash,
    Debug,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum BlendMode {
    /// Premultiplied source-over.
    Transparent,
    /// Destination-alpha erase. The source color is ignored, only its coverage matters.
    Subtractive,
}
impl Default for BlendMode {
    fn default() -> Self {
        Self::Transparent
    }
}
impl BlendMode {
    /// Blend a premultiplied `src` onto `dst` with an extra opacity modulate.
    #[inline]
    #[must_use]
    pub fn apply(self, dst: Premul, src: Premul, opacity: f32) -> Premul {
        let coverage = src[3] * opacity;
        let keep = 1.0 - coverage;
        match self {
            Self::Transparent => [
                src[0] * opacity + dst[0] * keep,
                src[1] * opacity + dst[1] * keep,
                src[2] * opacity + dst[2] * keep,
                coverage + dst[3] * keep,
            ],
            Self::Subtractive => dst.map(|channel| channel * keep),
        }
    }
}

/// Blend mode for an object, including a mode and opacity modulate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Blend {
    pub mode: BlendMode,
    pub opacity: f32,
}
impl Default for Blend {
    fn default() -> Self {
        Self {
            mode: BlendMode::default(),
            opacity: 1.0,
        }
    }
}
impl Blend {
    #[must_use]
    pub fn transparent(opacity: f32) -> Self {
        Self {
            mode: BlendMode::Transparent,
            opacity: crate::util::unit_clamp(opacity),
        }
    }
    /// Transparent normally, subtractive when `erase`.
    #[must_use]
    pub fn for_tool(erase: bool, opacity: f32) -> Self {
        Self {
            mode: if erase {
                BlendMode::Subtractive
            } else {
                BlendMode::Transparent
            },
            opacity: crate::util::unit_clamp(opacity),
        }
    }
    #[inline]
    #[must_use]
    pub fn apply(&self, dst: Premul, src: Premul) -> Premul {
        self.mode.apply(dst, src, self.opacity)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn over_opaque_replaces() {
        let out = BlendMode::Transparent.apply([1.0; 4], [0.0, 0.0, 0.0, 1.0], 1.0);
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0]);
    }
    #[test]
    fn over_half_opacity() {
        let out = Blend::transparent(0.5).apply([0.0; 4], [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.5]);
    }
    #[test]
    fn subtractive_erases_alpha() {
        let dst = [0.2, 0.4, 0.6, 1.0];
        let out = BlendMode::Subtractive.apply(dst, [0.0, 0.0, 0.0, 1.0], 1.0);
        assert_eq!(out, [0.0; 4]);
        let half = BlendMode::Subtractive.apply(dst, [1.0, 1.0, 1.0, 0.5], 1.0);
        assert_eq!(half, [0.1, 0.2, 0.3, 0.5]);
    }
}
