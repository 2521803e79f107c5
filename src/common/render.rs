//! エスケープタイム法による一括描画
//!
//! 入力はすべて描画前に検証し、不正な場合はピクセルを1つも書かずに失敗する。
//! 検証後はI/Oを伴わないため、途中で失敗するのはキャンセル時のみ
//! （エラーではなく [`RenderOutcome::Cancelled`] として返す）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use super::colors::{bucket_index, Color, TRANSPARENT};
use super::mandelbrot::escape_time;
use super::surface::Surface;
use super::viewport::Viewport;

/// 描画入力の検証エラー
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("表示範囲が不正です（各軸で start < end である必要があります）")]
    InvalidViewport,
    #[error("最大反復回数は1以上である必要があります")]
    InvalidIterationBudget,
    #[error("カラーテーブルには2色以上が必要です（{len}色）")]
    InvalidColorTable { len: usize },
    #[error("描画先のサイズが不正です（{width}x{height}）")]
    InvalidSurface { width: usize, height: usize },
    #[error("ワーカープールの作成に失敗しました: {0}")]
    WorkerPool(#[from] ThreadPoolBuildError),
}

impl PartialEq for RenderError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RenderError::InvalidViewport, RenderError::InvalidViewport) => true,
            (RenderError::InvalidIterationBudget, RenderError::InvalidIterationBudget) => true,
            (RenderError::InvalidColorTable { len: a }, RenderError::InvalidColorTable { len: b }) => {
                a == b
            }
            (
                RenderError::InvalidSurface { width: w1, height: h1 },
                RenderError::InvalidSurface { width: w2, height: h2 },
            ) => w1 == w2 && h1 == h2,
            // ThreadPoolBuildError は比較できない
            _ => false,
        }
    }
}

/// 描画の終わり方
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// 全ピクセルを書き込んだ
    Completed,
    /// キャンセルされた。書き込み済みの行はそのまま残る
    Cancelled { rows_written: usize },
}

fn validate<S: Surface + ?Sized>(
    surface: &S,
    viewport: &Viewport,
    max_iter: u32,
    colors: &[Color],
) -> Result<(), RenderError> {
    let (width, height) = (surface.width(), surface.height());
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSurface { width, height });
    }
    viewport.validate()?;
    if max_iter < 1 {
        return Err(RenderError::InvalidIterationBudget);
    }
    if colors.len() < 2 {
        return Err(RenderError::InvalidColorTable { len: colors.len() });
    }
    Ok(())
}

/// 1行分の色を `row` に書き込む
fn scanline(
    row: &mut [Color],
    viewport: &Viewport,
    height: usize,
    y: usize,
    max_iter: u32,
    colors: &[Color],
) {
    let width = row.len();
    for (x, pixel) in row.iter_mut().enumerate() {
        let c = viewport.pixel_to_complex(x, y, width, height);
        *pixel = colors[bucket_index(escape_time(c, max_iter), colors.len())];
    }
}

fn write_row<S: Surface + ?Sized>(surface: &mut S, y: usize, row: &[Color]) {
    for (x, &color) in row.iter().enumerate() {
        surface.put_pixel(x, y, color);
    }
}

/// マンデルブロ集合を描画（単一スレッド）
///
/// `surface` の全ピクセルをちょうど1回ずつ書き込む。
/// 集合内部は `colors[0]`、外部は発散までの反復回数 n に応じて
/// `colors[1 + n % (colors.len() - 1)]` で塗る。
pub fn render<S: Surface + ?Sized>(
    surface: &mut S,
    viewport: &Viewport,
    max_iter: u32,
    colors: &[Color],
) -> Result<RenderOutcome, RenderError> {
    render_cancellable(surface, viewport, max_iter, colors, &AtomicBool::new(false))
}

/// キャンセル可能な描画（単一スレッド）
///
/// `cancel` は各行の計算前に確認する。
pub fn render_cancellable<S: Surface + ?Sized>(
    surface: &mut S,
    viewport: &Viewport,
    max_iter: u32,
    colors: &[Color],
    cancel: &AtomicBool,
) -> Result<RenderOutcome, RenderError> {
    validate(surface, viewport, max_iter, colors)?;

    let (width, height) = (surface.width(), surface.height());
    debug!("描画開始: {}x{} 最大反復 {} 回 ({:?})", width, height, max_iter, viewport);
    let start = Instant::now();
    let mut row = vec![TRANSPARENT; width];

    for y in 0..height {
        if cancel.load(Ordering::Relaxed) {
            debug!("描画をキャンセルしました: {}/{} 行", y, height);
            return Ok(RenderOutcome::Cancelled { rows_written: y });
        }
        scanline(&mut row, viewport, height, y, max_iter, colors);
        write_row(surface, y, &row);
    }

    info!("描画完了: {}x{} {:.2?}", width, height, start.elapsed());
    Ok(RenderOutcome::Completed)
}

/// 固定サイズのワーカープールで行単位に並列描画するレンダラ
///
/// 各ワーカーは表示範囲とカラーテーブルを読むだけで、
/// 他のワーカーの出力には触れない。全行の計算が終わってから
/// 呼び出し元のスレッドで `surface` に書き込む。
pub struct Renderer {
    pool: ThreadPool,
}

impl Renderer {
    /// `threads` が `None` の場合は CPU コア数分のワーカーを用意する
    pub fn new(threads: Option<usize>) -> Result<Self, RenderError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("mandelbrot-{}", i));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;
        debug!("ワーカープール: {} スレッド", pool.current_num_threads());
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// 並列描画
    ///
    /// 出力は [`render`] と同一。キャンセルされた場合は、
    /// キャンセル前に計算を終えた行だけを書き込む。
    pub fn render<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        viewport: &Viewport,
        max_iter: u32,
        colors: &[Color],
        cancel: &AtomicBool,
    ) -> Result<RenderOutcome, RenderError> {
        validate(surface, viewport, max_iter, colors)?;

        let (width, height) = (surface.width(), surface.height());
        debug!(
            "並列描画開始: {}x{} 最大反復 {} 回 ({:?}) [{} スレッド]",
            width,
            height,
            max_iter,
            viewport,
            self.threads()
        );
        let start = Instant::now();

        // 行単位で並列計算（1フレーム分のバッファに書き込む）
        let mut pixels = vec![TRANSPARENT; width * height];
        let finished: Vec<bool> = self.pool.install(|| {
            pixels
                .par_chunks_mut(width)
                .enumerate()
                .map(|(y, row)| {
                    if cancel.load(Ordering::Relaxed) {
                        return false;
                    }
                    scanline(row, viewport, height, y, max_iter, colors);
                    true
                })
                .collect()
        });

        let mut rows_written = 0;
        for (y, row) in pixels.chunks(width).enumerate() {
            if finished[y] {
                write_row(surface, y, row);
                rows_written += 1;
            }
        }

        if rows_written < height {
            debug!("並列描画をキャンセルしました: {}/{} 行", rows_written, height);
            return Ok(RenderOutcome::Cancelled { rows_written });
        }

        info!("並列描画完了: {}x{} {:.2?}", width, height, start.elapsed());
        Ok(RenderOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::colors::{default_color_table, gradient_color_table, WHITE};
    use image::{Rgba, RgbaImage};

    /// 書き込み回数を数えるテスト用の面
    struct CountingSurface {
        width: usize,
        height: usize,
        writes: Vec<u32>,
        last: Vec<Option<Color>>,
    }

    impl CountingSurface {
        fn new(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                writes: vec![0; width * height],
                last: vec![None; width * height],
            }
        }

        fn color_at(&self, x: usize, y: usize) -> Option<Color> {
            self.last[y * self.width + x]
        }
    }

    impl Surface for CountingSurface {
        fn width(&self) -> usize {
            self.width
        }

        fn height(&self) -> usize {
            self.height
        }

        fn put_pixel(&mut self, x: usize, y: usize, color: Color) {
            self.writes[y * self.width + x] += 1;
            self.last[y * self.width + x] = Some(color);
        }
    }

    fn sentinel_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 4]))
    }

    #[test]
    fn test_every_pixel_written_exactly_once() {
        let mut surface = CountingSurface::new(37, 23);
        let outcome = render(&mut surface, &Viewport::default(), 80, &default_color_table()).unwrap();
        assert_eq!(outcome, RenderOutcome::Completed);
        assert!(surface.writes.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_parallel_every_pixel_written_exactly_once() {
        let renderer = Renderer::new(Some(4)).unwrap();
        let mut surface = CountingSurface::new(41, 29);
        let outcome = renderer
            .render(
                &mut surface,
                &Viewport::default(),
                80,
                &gradient_color_table(16),
                &AtomicBool::new(false),
            )
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Completed);
        assert!(surface.writes.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_render_is_deterministic() {
        let colors = gradient_color_table(16);
        let mut a = RgbaImage::new(64, 48);
        let mut b = RgbaImage::new(64, 48);
        render(&mut a, &Viewport::default(), 80, &colors).unwrap();
        render(&mut b, &Viewport::default(), 80, &colors).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let colors = gradient_color_table(16);
        let vp = Viewport::new(-0.75, -0.7, 0.1, 0.15);
        let mut seq = RgbaImage::new(80, 60);
        let mut par = RgbaImage::new(80, 60);

        render(&mut seq, &vp, 200, &colors).unwrap();
        Renderer::new(Some(3))
            .unwrap()
            .render(&mut par, &vp, 200, &colors, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(seq.as_raw(), par.as_raw());
    }

    #[test]
    fn test_literal_scenario_pixel_is_inside() {
        let mut surface = CountingSurface::new(100, 100);
        render(&mut surface, &Viewport::default(), 80, &default_color_table()).unwrap();
        assert_eq!(surface.color_at(33, 50), Some(WHITE));
    }

    #[test]
    fn test_origin_pixel_is_inside_for_any_budget() {
        // 2x2 で (1, 1) がちょうど c = 0 になる
        let vp = Viewport::new(-1.0, 1.0, -1.0, 1.0);
        let colors = gradient_color_table(16);
        for max_iter in [1, 5, 80] {
            let mut surface = CountingSurface::new(2, 2);
            render(&mut surface, &vp, max_iter, &colors).unwrap();
            assert_eq!(surface.color_at(1, 1), Some(colors[0]));
        }
    }

    #[test]
    fn test_far_region_escapes_on_first_iteration() {
        // |c| > 2 の領域は1回目で発散し、1 + (1 mod 15) = 2 番の色になる
        let vp = Viewport::new(3.0, 4.0, 0.0, 1.0);
        let colors = gradient_color_table(16);
        let mut surface = CountingSurface::new(8, 8);
        render(&mut surface, &vp, 80, &colors).unwrap();
        assert!(surface.last.iter().all(|&c| c == Some(colors[2])));
    }

    #[test]
    fn test_invalid_inputs_leave_surface_untouched() {
        let colors = default_color_table();
        let pristine = sentinel_image(10, 10);

        let mut img = pristine.clone();
        let err = render(&mut img, &Viewport::new(1.0, 1.0, -1.0, 1.0), 80, &colors).unwrap_err();
        assert_eq!(err, RenderError::InvalidViewport);
        assert_eq!(img, pristine);

        let mut img = pristine.clone();
        let err = render(&mut img, &Viewport::default(), 0, &colors).unwrap_err();
        assert_eq!(err, RenderError::InvalidIterationBudget);
        assert_eq!(img, pristine);

        let mut img = pristine.clone();
        let err = render(&mut img, &Viewport::default(), 80, &colors[..1]).unwrap_err();
        assert_eq!(err, RenderError::InvalidColorTable { len: 1 });
        assert_eq!(img, pristine);
    }

    #[test]
    fn test_parallel_invalid_inputs_leave_surface_untouched() {
        let renderer = Renderer::new(Some(2)).unwrap();
        let pristine = sentinel_image(10, 10);
        let mut img = pristine.clone();
        let err = renderer
            .render(
                &mut img,
                &Viewport::new(-2.0, 1.0, 1.0, -1.0),
                80,
                &default_color_table(),
                &AtomicBool::new(false),
            )
            .unwrap_err();
        assert_eq!(err, RenderError::InvalidViewport);
        assert_eq!(img, pristine);
    }

    #[test]
    fn test_zero_sized_surface_is_rejected() {
        let mut surface = CountingSurface::new(0, 5);
        let err = render(&mut surface, &Viewport::default(), 80, &default_color_table()).unwrap_err();
        assert_eq!(err, RenderError::InvalidSurface { width: 0, height: 5 });
    }

    #[test]
    fn test_changing_color_table_keeps_classification() {
        let vp = Viewport::default();
        let white_table = default_color_table();
        let gradient = gradient_color_table(16);

        let mut a = CountingSurface::new(60, 40);
        let mut b = CountingSurface::new(60, 40);
        render(&mut a, &vp, 80, &white_table).unwrap();
        render(&mut b, &vp, 80, &gradient).unwrap();

        for (ca, cb) in a.last.iter().zip(b.last.iter()) {
            let inside_a = *ca == Some(white_table[0]);
            let inside_b = *cb == Some(gradient[0]);
            assert_eq!(inside_a, inside_b);
        }
        assert!(a.last.iter().any(|&c| c == Some(white_table[0])));
        assert!(a.last.iter().any(|&c| c != Some(white_table[0])));
    }

    #[test]
    fn test_cancelled_before_start_writes_nothing() {
        let cancel = AtomicBool::new(true);
        let mut surface = CountingSurface::new(16, 16);
        let outcome =
            render_cancellable(&mut surface, &Viewport::default(), 80, &default_color_table(), &cancel)
                .unwrap();
        assert_eq!(outcome, RenderOutcome::Cancelled { rows_written: 0 });
        assert!(surface.writes.iter().all(|&n| n == 0));

        let renderer = Renderer::new(Some(2)).unwrap();
        let outcome = renderer
            .render(&mut surface, &Viewport::default(), 80, &default_color_table(), &cancel)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Cancelled { rows_written: 0 });
        assert!(surface.writes.iter().all(|&n| n == 0));
    }

    /// 指定した行数を書いた時点でキャンセルフラグを立てる面
    struct CancellingSurface<'a> {
        inner: CountingSurface,
        cancel: &'a AtomicBool,
        cancel_after_row: usize,
    }

    impl Surface for CancellingSurface<'_> {
        fn width(&self) -> usize {
            self.inner.width
        }

        fn height(&self) -> usize {
            self.inner.height
        }

        fn put_pixel(&mut self, x: usize, y: usize, color: Color) {
            self.inner.put_pixel(x, y, color);
            if y == self.cancel_after_row && x == self.inner.width - 1 {
                self.cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn test_cancel_mid_render_keeps_committed_rows() {
        let cancel = AtomicBool::new(false);
        let mut surface = CancellingSurface {
            inner: CountingSurface::new(10, 10),
            cancel: &cancel,
            cancel_after_row: 3,
        };
        let outcome =
            render_cancellable(&mut surface, &Viewport::default(), 80, &default_color_table(), &cancel)
                .unwrap();
        assert_eq!(outcome, RenderOutcome::Cancelled { rows_written: 4 });

        let writes = &surface.inner.writes;
        assert!(writes[..40].iter().all(|&n| n == 1));
        assert!(writes[40..].iter().all(|&n| n == 0));
    }

    #[test]
    fn test_parallel_cancel_mid_render_commits_whole_rows_only() {
        // 主カルジオイドの内部: 全ピクセルが上限まで反復するので十分に遅い
        let vp = Viewport::new(-0.3, -0.2, -0.05, 0.05);
        let (width, height) = (400, 400);
        let renderer = Renderer::new(Some(2)).unwrap();
        let cancel = AtomicBool::new(false);
        let mut surface = CountingSurface::new(width, height);

        let outcome = std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                cancel.store(true, Ordering::Relaxed);
            });
            renderer
                .render(&mut surface, &vp, 10_000, &default_color_table(), &cancel)
                .unwrap()
        });

        let rows_written = match outcome {
            RenderOutcome::Cancelled { rows_written } => rows_written,
            RenderOutcome::Completed => panic!("描画がキャンセルされなかった"),
        };
        assert!(rows_written < height);

        let mut full_rows = 0;
        for row in surface.writes.chunks(width) {
            if row[0] == 1 {
                assert!(row.iter().all(|&n| n == 1));
                full_rows += 1;
            } else {
                assert!(row.iter().all(|&n| n == 0));
            }
        }
        assert_eq!(full_rows, rows_written);
    }

    #[test]
    fn test_worker_pool_size() {
        let renderer = Renderer::new(Some(3)).unwrap();
        assert_eq!(renderer.threads(), 3);
    }
}
