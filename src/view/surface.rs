/// RGBA color, straight (non-premultiplied) alpha.
pub type Color = [u8; 4];

pub const TRANSPARENT: Color = [0, 0, 0, 0];

/// Owned RGBA pixel buffer. All drawing is bounds-checked; out-of-range
/// coordinates are silently dropped so callers can draw partially
/// off-screen shapes without pre-clipping.
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>, // RGBA, row-major
}

impl Surface {
    /// Create a transparent surface with the given pixel dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consume the surface, returning the raw RGBA bytes.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Fill the whole surface with one color.
    pub fn fill(&mut self, color: Color) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    /// Reset to fully transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    #[inline(always)]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Write a pixel, replacing whatever was there.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        self.pixels[i..i + 4].copy_from_slice(&color);
    }

    /// Write a pixel using signed coordinates (ignores negative values).
    pub fn set_pixel_signed(&mut self, x: i64, y: i64, color: Color) {
        if x >= 0 && y >= 0 {
            self.set_pixel(x as u32, y as u32, color);
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Color {
        if x >= self.width || y >= self.height {
            return TRANSPARENT;
        }
        let i = self.index(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Blend a pixel over the existing one (straight-alpha over operator).
    pub fn blend_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.index(x, y);
        let dst = [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ];
        let out = blend(color, dst);
        self.pixels[i..i + 4].copy_from_slice(&out);
    }

    #[inline(always)]
    pub fn blend_pixel_signed(&mut self, x: i64, y: i64, color: Color) {
        if x >= 0 && y >= 0 {
            self.blend_pixel(x as u32, y as u32, color);
        }
    }

    /// Composite another surface of identical dimensions over this one.
    pub fn blit_over(&mut self, src: &Surface) {
        debug_assert_eq!((self.width, self.height), (src.width, src.height));
        for (dst, s) in self
            .pixels
            .chunks_exact_mut(4)
            .zip(src.pixels.chunks_exact(4))
        {
            if s[3] == 0 {
                continue;
            }
            if s[3] == 255 {
                dst.copy_from_slice(s);
                continue;
            }
            let out = blend([s[0], s[1], s[2], s[3]], [dst[0], dst[1], dst[2], dst[3]]);
            dst.copy_from_slice(&out);
        }
    }

    /// Draw an RGBA image scaled (nearest-neighbor) into the destination
    /// rectangle. The rectangle may extend past the surface edges.
    pub fn blit_scaled(
        &mut self,
        src: &[u8],
        src_w: u32,
        src_h: u32,
        dst_x: i64,
        dst_y: i64,
        dst_w: u32,
        dst_h: u32,
    ) {
        if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
            return;
        }
        debug_assert_eq!(src.len(), src_w as usize * src_h as usize * 4);

        let x0 = dst_x.max(0);
        let y0 = dst_y.max(0);
        let x1 = (dst_x + dst_w as i64).min(self.width as i64);
        let y1 = (dst_y + dst_h as i64).min(self.height as i64);

        for y in y0..y1 {
            let sy = ((y - dst_y) as u64 * src_h as u64 / dst_h as u64) as u32;
            let sy = sy.min(src_h - 1);
            for x in x0..x1 {
                let sx = ((x - dst_x) as u64 * src_w as u64 / dst_w as u64) as u32;
                let sx = sx.min(src_w - 1);
                let si = (sy as usize * src_w as usize + sx as usize) * 4;
                let di = self.index(x as u32, y as u32);
                self.pixels[di..di + 4].copy_from_slice(&src[si..si + 4]);
            }
        }
    }

    /// Fill an axis-aligned rectangle (clipped to the surface).
    pub fn fill_rect(&mut self, x: i64, y: i64, w: u32, h: u32, color: Color) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w as i64).min(self.width as i64);
        let y1 = (y + h as i64).min(self.height as i64);
        for py in y0..y1 {
            for px in x0..x1 {
                let i = self.index(px as u32, py as u32);
                self.pixels[i..i + 4].copy_from_slice(&color);
            }
        }
    }

    /// Draw a filled circle.
    pub fn fill_circle(&mut self, cx: i64, cy: i64, radius: i64, color: Color) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.blend_pixel_signed(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Draw a line using Bresenham's algorithm.
    pub fn draw_line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Color) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.blend_pixel_signed(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;

            if e2 >= dy {
                if x == x1 {
                    break;
                }
                err += dy;
                x += sx;
            }

            if e2 <= dx {
                if y == y1 {
                    break;
                }
                err += dx;
                y += sy;
            }
        }
    }

    /// Draw a flat-top hexagon outline with the given circumradius and
    /// stroke width. The stroke grows inward.
    pub fn stroke_hexagon(&mut self, cx: i64, cy: i64, radius: i64, stroke: i64, color: Color) {
        for ring in 0..stroke.max(1) {
            let r = (radius - ring).max(1) as f64;
            let mut prev: Option<(i64, i64)> = None;
            for i in 0..=6 {
                let angle = std::f64::consts::FRAC_PI_3 * i as f64;
                let px = cx + (r * angle.cos()).round() as i64;
                let py = cy + (r * angle.sin()).round() as i64;
                if let Some((lx, ly)) = prev {
                    self.draw_line(lx, ly, px, py, color);
                }
                prev = Some((px, py));
            }
        }
    }
}

/// Straight-alpha "over" blend of `src` on `dst`.
#[inline(always)]
fn blend(src: Color, dst: Color) -> Color {
    let sa = src[3] as u32;
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let da = dst[3] as u32;
    let inv = 255 - sa;
    let out_a = sa + da * inv / 255;
    if out_a == 0 {
        return TRANSPARENT;
    }
    let ch = |s: u8, d: u8| -> u8 {
        let s = s as u32;
        let d = d as u32;
        (((s * sa + d * da * inv / 255) * 255) / (out_a * 255)).min(255) as u8
    };
    [
        ch(src[0], dst[0]),
        ch(src[1], dst[1]),
        ch(src[2], dst[2]),
        out_a as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = [255, 0, 0, 255];
    const BLUE: Color = [0, 0, 255, 255];

    #[test]
    fn test_set_and_get() {
        let mut s = Surface::new(4, 4);
        s.set_pixel(1, 2, RED);
        assert_eq!(s.get_pixel(1, 2), RED);
        assert_eq!(s.get_pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut s = Surface::new(2, 2);
        s.set_pixel(5, 5, RED);
        s.set_pixel_signed(-1, 0, RED);
        assert!(s.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blit_over_opaque_wins() {
        let mut base = Surface::new(2, 1);
        base.fill(BLUE);
        let mut top = Surface::new(2, 1);
        top.set_pixel(0, 0, RED);
        base.blit_over(&top);
        assert_eq!(base.get_pixel(0, 0), RED);
        assert_eq!(base.get_pixel(1, 0), BLUE);
    }

    #[test]
    fn test_blit_over_half_alpha() {
        let mut base = Surface::new(1, 1);
        base.fill([0, 0, 0, 255]);
        let mut top = Surface::new(1, 1);
        top.set_pixel(0, 0, [255, 255, 255, 128]);
        base.blit_over(&top);
        let [r, g, b, a] = base.get_pixel(0, 0);
        assert_eq!(a, 255);
        assert!(r > 120 && r < 135);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn test_blit_scaled_upscale() {
        // 1x1 red source scaled to 4x4 fills the rect
        let src = [255u8, 0, 0, 255];
        let mut s = Surface::new(4, 4);
        s.blit_scaled(&src, 1, 1, 0, 0, 4, 4);
        assert_eq!(s.get_pixel(0, 0), RED);
        assert_eq!(s.get_pixel(3, 3), RED);
    }

    #[test]
    fn test_blit_scaled_clips() {
        let src = [255u8, 0, 0, 255];
        let mut s = Surface::new(2, 2);
        s.blit_scaled(&src, 1, 1, -1, -1, 4, 4);
        assert_eq!(s.get_pixel(0, 0), RED);
        assert_eq!(s.get_pixel(1, 1), RED);
    }

    #[test]
    fn test_fill_circle_center() {
        let mut s = Surface::new(9, 9);
        s.fill_circle(4, 4, 3, RED);
        assert_eq!(s.get_pixel(4, 4), RED);
        assert_eq!(s.get_pixel(4, 1), RED);
        // corners stay empty
        assert_eq!(s.get_pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn test_hexagon_touches_extremes() {
        let mut s = Surface::new(21, 21);
        s.stroke_hexagon(10, 10, 8, 1, RED);
        // flat-top hexagon has vertices on the horizontal axis
        assert_eq!(s.get_pixel(18, 10), RED);
        assert_eq!(s.get_pixel(2, 10), RED);
        assert_eq!(s.get_pixel(10, 10), TRANSPARENT);
    }
}
