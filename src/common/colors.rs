//! カラーテーブルと色変換関数

use image::Rgba;

use super::constants::COLOR_TABLE_SIZE;
use super::mandelbrot::Escape;

/// 1ピクセルの色（RGBA, 各8bit）
pub type Color = Rgba<u8>;

pub const WHITE: Color = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);
pub const TRANSPARENT: Color = Rgba([0x00, 0x00, 0x00, 0x00]);

/// 発散速度の段階表示に使うグラデーション
const GRADIENT: [(f64, f64, f64); 10] = [
    (0.0, 0.0, 0.2), // 深い青
    (0.1, 0.2, 0.5), // 青
    (0.2, 0.5, 0.8), // 水色
    (0.5, 0.8, 0.9), // 薄い水色
    (1.0, 1.0, 0.8), // クリーム
    (1.0, 0.8, 0.3), // 黄色
    (1.0, 0.5, 0.1), // オレンジ
    (0.8, 0.2, 0.1), // 赤
    (0.5, 0.0, 0.2), // 暗い赤
    (0.0, 0.0, 0.0), // 黒
];

/// 既定のカラーテーブル
///
/// 0番（集合内部）が不透明な白、1〜15番は完全に透明。
/// 背景の上に集合の内部だけが白く浮かぶ。
pub fn default_color_table() -> Vec<Color> {
    let mut table = vec![TRANSPARENT; COLOR_TABLE_SIZE];
    table[0] = WHITE;
    table
}

/// 外部の各段階をグラデーションで塗り分けるカラーテーブル
///
/// 0番は不透明な黒。`len` が2未満なら空のテーブルになるので、
/// 描画時に `InvalidColorTable` として弾かれる。
pub fn gradient_color_table(len: usize) -> Vec<Color> {
    if len < 2 {
        return Vec::new();
    }

    let buckets = len - 1;
    let mut table = Vec::with_capacity(len);
    table.push(Rgba([0, 0, 0, 0xFF]));

    for i in 0..buckets {
        let t = if buckets > 1 {
            i as f64 / (buckets - 1) as f64
        } else {
            0.0
        };
        table.push(gradient_at(t));
    }
    table
}

/// t ∈ [0, 1] に対応するグラデーション上の色
fn gradient_at(t: f64) -> Color {
    let scaled = t.clamp(0.0, 1.0) * (GRADIENT.len() - 1) as f64;
    let idx = (scaled as usize).min(GRADIENT.len() - 2);
    let frac = scaled - idx as f64;

    let (r1, g1, b1) = GRADIENT[idx];
    let (r2, g2, b2) = GRADIENT[idx + 1];

    let r = ((r1 + (r2 - r1) * frac) * 255.0) as u8;
    let g = ((g1 + (g2 - g1) * frac) * 255.0) as u8;
    let b = ((b1 + (b2 - b1) * frac) * 255.0) as u8;

    Rgba([r, g, b, 0xFF])
}

/// 判定結果からカラーテーブルの番号を求める
///
/// 内部は常に0番。外部は `1 + (n mod (len - 1))` なので
/// 内部の色と衝突しない。`len >= 2` であること。
pub fn bucket_index(escape: Escape, len: usize) -> usize {
    match escape {
        Escape::Inside => 0,
        Escape::Escaped(n) => 1 + (n as usize % (len - 1)),
    }
}

/// RGBA の色を不透明な背景色（0xRRGGBB）の上に合成
pub fn blend_over(color: Color, background: u32) -> u32 {
    let Rgba([r, g, b, a]) = color;
    let alpha = a as u32;

    let mix = |fg: u8, shift: u32| -> u32 {
        let bg = (background >> shift) & 0xFF;
        (fg as u32 * alpha + bg * (255 - alpha) + 127) / 255
    };

    (mix(r, 16) << 16) | (mix(g, 8) << 8) | mix(b, 0)
}
