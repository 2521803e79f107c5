//! 描画先のピクセル面

use image::RgbaImage;

use super::colors::{blend_over, Color};

/// レンダラが書き込むピクセル面
///
/// 呼び出し側が作成・所有する。レンダラは1回の描画の間だけ借用し、
/// サイズの変更や差し替えは行わない。
pub trait Surface {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn put_pixel(&mut self, x: usize, y: usize, color: Color);
}

impl Surface for RgbaImage {
    fn width(&self) -> usize {
        self.dimensions().0 as usize
    }

    fn height(&self) -> usize {
        self.dimensions().1 as usize
    }

    fn put_pixel(&mut self, x: usize, y: usize, color: Color) {
        RgbaImage::put_pixel(self, x as u32, y as u32, color);
    }
}

/// 0xRRGGBB 形式のフレームバッファ（minifb にそのまま渡せる）
///
/// 書き込まれた色は背景色の上に合成して保持する。
pub struct FrameBuffer {
    width: usize,
    height: usize,
    background: u32,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize, background: u32) -> Self {
        Self {
            width,
            height,
            background,
            pixels: vec![background; width * height],
        }
    }

    pub fn background(&self) -> u32 {
        self.background
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }
}

impl Surface for FrameBuffer {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn put_pixel(&mut self, x: usize, y: usize, color: Color) {
        self.pixels[y * self.width + x] = blend_over(color, self.background);
    }
}
