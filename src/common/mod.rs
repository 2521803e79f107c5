pub mod colors;
pub mod constants;
pub mod mandelbrot;
pub mod render;
pub mod surface;
pub mod viewport;
