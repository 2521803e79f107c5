//! 複素平面上の表示範囲

use num_complex::Complex;

use super::constants::{IMAG_END, IMAG_START, REAL_END, REAL_START};
use super::render::RenderError;

/// 描画対象となる複素平面上の長方形
///
/// 1回の描画中は変更されない。`real_start < real_end` かつ
/// `imag_start < imag_end` でなければならない。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub real_start: f64,
    pub real_end: f64,
    pub imag_start: f64,
    pub imag_end: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(REAL_START, REAL_END, IMAG_START, IMAG_END)
    }
}

impl Viewport {
    pub const fn new(real_start: f64, real_end: f64, imag_start: f64, imag_end: f64) -> Self {
        Self {
            real_start,
            real_end,
            imag_start,
            imag_end,
        }
    }

    /// 各軸の範囲が有限かつ狭義単調増加であることを確認
    pub fn validate(&self) -> Result<(), RenderError> {
        let bounds = [self.real_start, self.real_end, self.imag_start, self.imag_end];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(RenderError::InvalidViewport);
        }
        if self.real_start < self.real_end && self.imag_start < self.imag_end {
            Ok(())
        } else {
            Err(RenderError::InvalidViewport)
        }
    }

    pub fn real_span(&self) -> f64 {
        self.real_end - self.real_start
    }

    pub fn imag_span(&self) -> f64 {
        self.imag_end - self.imag_start
    }

    /// ピクセル座標を複素平面上の座標に変換
    ///
    /// 画像の上端（y = 0）が `imag_start` に対応する。
    pub fn pixel_to_complex(&self, x: usize, y: usize, width: usize, height: usize) -> Complex<f64> {
        let re = self.real_start + (x as f64 / width as f64) * self.real_span();
        let im = self.imag_start + (y as f64 / height as f64) * self.imag_span();
        Complex::new(re, im)
    }
}
