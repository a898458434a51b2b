use egui::{pos2, vec2, Pos2, Rect, Vec2};

/// Pan and zoom of the canvas showing the image.
///
/// The editor works in image space; the viewport maps pointer positions in
/// and tells hit-testing how large a screen pixel is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub canvas: Rect,
    pub image_size: Vec2,
    pub pan: Vec2,
    pub zoom: f32,
}

impl Viewport {
    pub const MIN_ZOOM: f32 = 0.1;
    pub const MAX_ZOOM: f32 = 10.0;

    pub fn new(canvas: Rect, image_size: Vec2) -> Self {
        Self {
            canvas,
            image_size,
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }

    /// Convert image-space coords to screen-space
    pub fn image_to_screen(&self, img_pos: Pos2) -> Pos2 {
        let center = self.canvas.center();
        center + self.pan + (img_pos.to_vec2() - self.image_size * 0.5) * self.zoom
    }

    /// Convert screen-space coords to image-space
    pub fn screen_to_image(&self, screen_pos: Pos2) -> Pos2 {
        let center = self.canvas.center();
        let rel = screen_pos - center - self.pan;
        pos2(
            rel.x / self.zoom + self.image_size.x * 0.5,
            rel.y / self.zoom + self.image_size.y * 0.5,
        )
    }

    pub fn image_rect_on_screen(&self) -> Rect {
        Rect::from_min_max(
            self.image_to_screen(Pos2::ZERO),
            self.image_to_screen(pos2(self.image_size.x, self.image_size.y)),
        )
    }

    /// Zoom by `factor` keeping the image point under `cursor` fixed.
    pub fn zoom_at(&mut self, cursor: Pos2, factor: f32) {
        let new_zoom = (self.zoom * factor).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
        let cursor_rel = cursor - self.canvas.center() - self.pan;
        self.pan -= cursor_rel * (new_zoom / self.zoom - 1.0);
        self.zoom = new_zoom;
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(
            Rect::from_min_size(Pos2::ZERO, vec2(800.0, 600.0)),
            vec2(800.0, 600.0),
        )
    }
}
