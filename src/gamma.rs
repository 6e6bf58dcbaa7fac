// Gamma-correct mixing for anti-aliased edges, via lookup tables instead of powf.
// Partial-coverage pixels are mixed in linear light so circle rims don't look
// darker or thinner than their interior.

pub struct GammaLut {
    // sRGB(0..255) -> linear (0..1)
    srgb_to_linear: [f32; 256],
    // linear(0..1) -> sRGB(0..255), quantized to 4096 steps
    linear_to_srgb: [u8; 4096],
}

impl Default for GammaLut {
    fn default() -> Self {
        Self::new()
    }
}

impl GammaLut {
    /// Build both tables once; the render loop keeps one for its lifetime.
    pub fn new() -> Self {
        let mut s2l = [0.0f32; 256];
        for (v, slot) in s2l.iter_mut().enumerate() {
            let c = v as f32 / 255.0;
            *slot = if c <= 0.04045 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) };
        }

        let mut l2s = [0u8; 4096];
        for (i, slot) in l2s.iter_mut().enumerate() {
            let l = i as f32 / 4095.0;
            let s = if l <= 0.003_130_8 { 12.92 * l } else { 1.055 * l.powf(1.0 / 2.4) - 0.055 };
            *slot = (s * 255.0).round().clamp(0.0, 255.0) as u8;
        }

        Self { srgb_to_linear: s2l, linear_to_srgb: l2s }
    }

    #[inline]
    pub fn srgb_u8_to_linear(&self, v: u8) -> f32 {
        self.srgb_to_linear[v as usize]
    }

    #[inline]
    pub fn linear_to_srgb_u8(&self, l: f32) -> u8 {
        let idx = (l.clamp(0.0, 1.0) * 4095.0).round() as usize;
        self.linear_to_srgb[idx]
    }

    /// Mix `src` over `dst` by `coverage` (0 = keep dst, 1 = src), per RGB channel.
    #[inline]
    pub fn mix(&self, dst: [u8; 3], src: [u8; 3], coverage: f32) -> [u8; 3] {
        let a = coverage.clamp(0.0, 1.0);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let d = self.srgb_u8_to_linear(dst[c]);
            let s = self.srgb_u8_to_linear(src[c]);
            out[c] = self.linear_to_srgb_u8(d + (s - d) * a);
        }
        out
    }
}
