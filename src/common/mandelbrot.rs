//! マンデルブロ集合計算関数

use num_complex::Complex;

use super::constants::ESCAPE_RADIUS;

/// 1点の判定結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escape {
    /// 反復回数の上限まで |z| <= 2 のまま（集合に属するとみなす）
    Inside,
    /// n 回目の反復で |z| > 2 となった
    Escaped(u32),
}

impl Escape {
    pub fn is_inside(self) -> bool {
        matches!(self, Escape::Inside)
    }
}

/// エスケープタイム法による判定（f64版）
///
/// z = 0 から z ← z² + c を最低1回は適用し、|z| > 2 となるか
/// 反復回数が `max_iter` に達するまで続ける。
/// 上限に達した反復で発散した場合は `Escaped(max_iter)` となる。
pub fn escape_time(c: Complex<f64>, max_iter: u32) -> Escape {
    let mut z = Complex::new(0.0, 0.0);
    let mut n = 0;

    loop {
        z = z * z + c;
        n += 1;
        // |z| = sqrt(re² + im²) で判定する
        let magnitude = (z.re * z.re + z.im * z.im).sqrt();
        if magnitude > ESCAPE_RADIUS {
            return Escape::Escaped(n);
        }
        if n >= max_iter {
            return Escape::Inside;
        }
    }
}
