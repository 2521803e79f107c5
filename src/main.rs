//! マンデルブロ集合ビューア
//!
//! ウィンドウのサイズが確定した時点で1回だけ描画する。
//! ウィンドウサイズが変わった場合は描画中のジョブをキャンセルして描き直す。
//! 既定では集合の内部だけを白く、外部は背景色のまま表示する。
//!
//! 操作方法:
//!   - ウィンドウのリサイズ: 新しいサイズで再描画
//!   - Q / Escape キー: 終了

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use mandelbrot_canvas::common::constants::{
    BACKGROUND, COLOR_TABLE_SIZE, IMAG_END, IMAG_START, MAX_ITER, REAL_END, REAL_START,
    WINDOW_HEIGHT, WINDOW_WIDTH,
};
use mandelbrot_canvas::{
    default_color_table, gradient_color_table, Color, FrameBuffer, RenderError, RenderOutcome,
    Renderer, Surface, Viewport,
};
use minifb::{Key, Window, WindowOptions};

/// カラーテーブルの種類
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Palette {
    /// 内部を白、外部を透明にする
    Default,
    /// 外部を発散速度に応じたグラデーションで塗る
    Gradient,
}

impl Palette {
    fn colors(self) -> Vec<Color> {
        match self {
            Palette::Default => default_color_table(),
            Palette::Gradient => gradient_color_table(COLOR_TABLE_SIZE),
        }
    }
}

/// マンデルブロ集合をウィンドウに描画するビューア
#[derive(Parser, Debug)]
#[command(name = "mandelbrot-canvas", version, about)]
struct Cli {
    /// ウィンドウの初期幅（ピクセル）
    #[arg(long, default_value_t = WINDOW_WIDTH)]
    width: usize,

    /// ウィンドウの初期高さ（ピクセル）
    #[arg(long, default_value_t = WINDOW_HEIGHT)]
    height: usize,

    /// 最大反復回数
    #[arg(long, default_value_t = MAX_ITER)]
    max_iter: u32,

    /// 実軸の始点
    #[arg(long, default_value_t = REAL_START, allow_hyphen_values = true)]
    real_start: f64,

    /// 実軸の終点
    #[arg(long, default_value_t = REAL_END, allow_hyphen_values = true)]
    real_end: f64,

    /// 虚軸の始点
    #[arg(long, default_value_t = IMAG_START, allow_hyphen_values = true)]
    imag_start: f64,

    /// 虚軸の終点
    #[arg(long, default_value_t = IMAG_END, allow_hyphen_values = true)]
    imag_end: f64,

    /// カラーテーブル
    #[arg(long, value_enum, default_value_t = Palette::Default)]
    palette: Palette,

    /// 背景色（RRGGBB 形式の16進数、省略時は黒）
    #[arg(long, value_parser = parse_hex_color)]
    background: Option<u32>,

    /// ワーカースレッド数（省略時は CPU コア数）
    #[arg(long)]
    threads: Option<usize>,
}

fn parse_hex_color(s: &str) -> std::result::Result<u32, String> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("RRGGBB 形式で指定してください: {}", s));
    }
    u32::from_str_radix(hex, 16).map_err(|e| format!("16進数として解釈できません: {} ({})", s, e))
}

/// 1回の描画に使う設定（全ジョブで共有、読み取り専用）
struct Scene {
    viewport: Viewport,
    max_iter: u32,
    colors: Vec<Color>,
    background: u32,
}

type JobResult = std::result::Result<(FrameBuffer, RenderOutcome), RenderError>;

/// バックグラウンドで実行中の描画
struct RenderJob {
    size: (usize, usize),
    cancel: Arc<AtomicBool>,
    started: Instant,
    result: Receiver<JobResult>,
}

impl RenderJob {
    fn spawn(renderer: Arc<Renderer>, scene: Arc<Scene>, size: (usize, usize)) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let flag = Arc::clone(&cancel);

        thread::spawn(move || {
            let mut frame = FrameBuffer::new(size.0, size.1, scene.background);
            let result = renderer
                .render(&mut frame, &scene.viewport, scene.max_iter, &scene.colors, &flag)
                .map(|outcome| (frame, outcome));
            // キャンセル済みのジョブは受信側が既に破棄されている
            let _ = tx.send(result);
        });

        Self {
            size,
            cancel,
            started: Instant::now(),
            result: rx,
        }
    }

    fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let scene = Arc::new(Scene {
        viewport: Viewport::new(cli.real_start, cli.real_end, cli.imag_start, cli.imag_end),
        max_iter: cli.max_iter,
        colors: cli.palette.colors(),
        background: cli.background.unwrap_or(BACKGROUND),
    });
    let renderer = Arc::new(Renderer::new(cli.threads).context("レンダラの初期化に失敗しました")?);

    println!("マンデルブロ集合ビューア");
    println!("  表示範囲: {:?}", scene.viewport);
    println!("  最大反復回数: {}", scene.max_iter);
    println!("  ワーカー: {} スレッド", renderer.threads());
    println!("  Q / Escape キーで終了");

    let mut window = Window::new(
        "マンデルブロ集合",
        cli.width,
        cli.height,
        WindowOptions {
            resize: true,
            ..WindowOptions::default()
        },
    )
    .context("ウィンドウの作成に失敗しました")?;

    window.set_target_fps(60);

    let mut frame: Option<FrameBuffer> = None;
    let mut job: Option<RenderJob> = None;
    let mut requested: Option<(usize, usize)> = None;

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        // サイズが確定している（0でない）ときだけ描画を依頼する
        let size = window.get_size();
        if size.0 > 0 && size.1 > 0 && requested != Some(size) {
            if let Some(previous) = job.take() {
                debug!("サイズ変更のため描画を中断: {:?} → {:?}", previous.size, size);
                previous.cancel();
            }
            job = Some(RenderJob::spawn(Arc::clone(&renderer), Arc::clone(&scene), size));
            requested = Some(size);
        }

        let finished = match job.as_ref().map(|j| j.result.try_recv()) {
            None | Some(Err(TryRecvError::Empty)) => None,
            Some(Ok(result)) => Some(result),
            Some(Err(TryRecvError::Disconnected)) => bail!("描画スレッドが異常終了しました"),
        };

        if let Some(result) = finished {
            let done = job.take();
            match result.context("描画に失敗しました")? {
                (fb, RenderOutcome::Completed) => {
                    if let Some(done) = done {
                        info!(
                            "描画完了: {}x{} {:.2?}",
                            fb.width(),
                            fb.height(),
                            done.started.elapsed()
                        );
                    }
                    frame = Some(fb);
                }
                (_, RenderOutcome::Cancelled { rows_written }) => {
                    debug!("中断された描画を破棄: {} 行", rows_written);
                }
            }
        }

        match &frame {
            Some(fb) => window
                .update_with_buffer(fb.pixels(), fb.width(), fb.height())
                .context("バッファの更新に失敗しました")?,
            None => window.update(),
        }
    }

    if let Some(job) = job {
        job.cancel();
    }
    println!("終了しました");
    Ok(())
}
