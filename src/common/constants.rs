//! 共通定数

/// 初期表示範囲（実軸）
pub const REAL_START: f64 = -2.0;
pub const REAL_END: f64 = 1.0;

/// 初期表示範囲（虚軸）
pub const IMAG_START: f64 = -1.0;
pub const IMAG_END: f64 = 1.0;

/// 最大反復回数
pub const MAX_ITER: u32 = 80;

/// カラーテーブルの色数（0番は集合内部用）
pub const COLOR_TABLE_SIZE: usize = 16;

/// 発散判定の半径
pub const ESCAPE_RADIUS: f64 = 2.0;

/// ビューアの初期ウィンドウサイズ（16:9）
pub const WINDOW_WIDTH: usize = 960;
pub const WINDOW_HEIGHT: usize = 540;

/// 透明色を合成する背景色（0xRRGGBB）
pub const BACKGROUND: u32 = 0x000000;
