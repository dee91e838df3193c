//! Synthetic cursor glyph rasterization.
//!
//! The glyph is an arrow with its tip at the cursor position. While the
//! primary button is held the arrow is enlarged and a translucent ring is
//! drawn around the tip.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_polygon_mut, Blend};
use imageproc::point::Point;

/// Arrow height in pixels when idle.
pub const ARROW_SIZE: i32 = 20;

/// Arrow height in pixels while the button is held.
pub const ARROW_SIZE_PRESSED: i32 = 24;

/// Ring radius around the tip while the button is held.
pub const RING_RADIUS: i32 = 15;

const OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RING: Rgba<u8> = Rgba([255, 196, 0, 170]);

/// Cursor rendering instruction for one frame, in raster pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorOverlay {
    pub x: f64,
    pub y: f64,
    pub pressed: bool,
}

/// Draw the cursor glyph onto `canvas`. Parts outside the canvas are clipped.
pub fn draw_cursor(canvas: &mut RgbaImage, overlay: CursorOverlay) {
    let tip = (
        overlay.x.floor().clamp(i32::MIN as f64 / 2.0, i32::MAX as f64 / 2.0) as i32,
        overlay.y.floor().clamp(i32::MIN as f64 / 2.0, i32::MAX as f64 / 2.0) as i32,
    );
    if overlay.pressed {
        draw_ring(canvas, tip);
        draw_arrow(canvas, tip, ARROW_SIZE_PRESSED);
    } else {
        draw_arrow(canvas, tip, ARROW_SIZE);
    }
}

/// Black arrow with a white body: straight left edge, diagonal right edge,
/// closed at 70% of the height.
fn draw_arrow(canvas: &mut RgbaImage, (x, y): (i32, i32), size: i32) {
    let wing = size * 7 / 10;
    let outline = [
        Point::new(x, y),
        Point::new(x, y + size),
        Point::new(x + wing, y + wing),
    ];
    let body = [
        Point::new(x + 2, y + 5),
        Point::new(x + 2, y + size - 3),
        Point::new(x + size / 2, y + size * 13 / 20),
    ];
    draw_polygon_mut(canvas, &outline, OUTLINE);
    draw_polygon_mut(canvas, &body, FILL);
}

/// Translucent three-pixel ring centred on the tip.
fn draw_ring(canvas: &mut RgbaImage, centre: (i32, i32)) {
    let mut layer = Blend(std::mem::take(canvas));
    for radius in RING_RADIUS - 1..=RING_RADIUS + 1 {
        draw_hollow_circle_mut(&mut layer, centre, radius, RING);
    }
    *canvas = layer.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    fn canvas() -> RgbaImage {
        RgbaImage::from_pixel(100, 100, GRAY)
    }

    #[test]
    fn arrow_hangs_below_and_right_of_the_tip() {
        let mut img = canvas();
        draw_cursor(
            &mut img,
            CursorOverlay {
                x: 30.0,
                y: 30.0,
                pressed: false,
            },
        );
        assert_eq!(*img.get_pixel(30, 30), OUTLINE);
        assert_eq!(*img.get_pixel(33, 40), FILL);
        assert_eq!(*img.get_pixel(29, 35), GRAY);
        assert_eq!(*img.get_pixel(40, 31), GRAY);
        assert_eq!(*img.get_pixel(30, 60), GRAY);
    }

    #[test]
    fn pressed_cursor_is_larger_and_ringed() {
        let mut idle = canvas();
        let mut pressed = canvas();
        let at = |pressed| CursorOverlay {
            x: 50.0,
            y: 50.0,
            pressed,
        };
        draw_cursor(&mut idle, at(false));
        draw_cursor(&mut pressed, at(true));

        // Row 72 is past the idle arrow but inside the pressed one.
        assert_eq!(*idle.get_pixel(51, 72), GRAY);
        assert_ne!(*pressed.get_pixel(51, 72), GRAY);

        // Ring to the left of the tip, clear of the arrow.
        assert_eq!(*idle.get_pixel(35, 50), GRAY);
        let ring = *pressed.get_pixel(35, 50);
        assert_ne!(ring, GRAY);
        assert_eq!(ring[3], 255);
        assert_eq!(*pressed.get_pixel(50, 48), GRAY);
    }

    #[test]
    fn glyph_is_clipped_at_the_edges() {
        let mut img = RgbaImage::from_pixel(10, 10, GRAY);
        draw_cursor(
            &mut img,
            CursorOverlay {
                x: 8.0,
                y: -5.0,
                pressed: true,
            },
        );
        draw_cursor(
            &mut img,
            CursorOverlay {
                x: -100.0,
                y: 500.0,
                pressed: true,
            },
        );
    }
}
