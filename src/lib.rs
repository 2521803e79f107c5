//! マンデルブロ集合レンダラ
//!
//! ピクセル面（[`Surface`]）と複素平面上の表示範囲（[`Viewport`]）を受け取り、
//! エスケープタイム法で各ピクセルを1回ずつ塗る。

pub mod common;

pub use common::colors::{default_color_table, gradient_color_table, Color};
pub use common::mandelbrot::{escape_time, Escape};
pub use common::render::{render, render_cancellable, RenderError, RenderOutcome, Renderer};
pub use common::surface::{FrameBuffer, Surface};
pub use common::viewport::Viewport;
