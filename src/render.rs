#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use rusttype::{point, Font, PositionedGlyph, Scale};
use std::path::Path;

use crate::config::{Colour, ViewerConfig};
use crate::error::RenderError;
use crate::geometry::{self, ViewState, WorldCoord};
use crate::icon::IconImage;
use crate::protocol::WindowLayout;
use crate::store::ObjectStore;

/// Radial spokes of the polar grid, in degrees.
const SPOKE_STEP_DEG: f64 = 45.0;

// ============================================================================
// SURFACE ABSTRACTION
// ============================================================================

/// Something a scene can be presented on.
pub trait Surface {
    fn present(&mut self, scene: &Scene<'_>) -> Result<(), RenderError>;
    /// Current placement, reported to the controller as a layout event.
    fn layout(&self) -> WindowLayout;
    fn apply_layout(&mut self, layout: &WindowLayout);
}

/// Off-screen surface backed by a plain RGBA buffer.
pub struct HeadlessSurface {
    frame: Vec<u8>,
    width: u32,
    height: u32,
    layout: WindowLayout,
    font: Option<Font<'static>>,
    presented: usize,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            frame: vec![0; width as usize * height as usize * 4],
            width,
            height,
            layout: WindowLayout { x: 0, y: 0, width, height },
            font: None,
            presented: 0,
        }
    }

    pub fn with_font(mut self, font: Font<'static>) -> Self {
        self.font = Some(font);
        self
    }

    /// Number of frames presented so far.
    pub fn presented(&self) -> usize {
        self.presented
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Colour> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        Some(Colour::new(self.frame[idx], self.frame[idx + 1], self.frame[idx + 2]))
    }
}

impl Surface for HeadlessSurface {
    fn present(&mut self, scene: &Scene<'_>) -> Result<(), RenderError> {
        let mut canvas = Canvas::new(&mut self.frame, self.width as usize, self.height as usize);
        scene.render(&mut canvas, self.font.as_ref());
        self.presented += 1;
        Ok(())
    }

    fn layout(&self) -> WindowLayout {
        self.layout
    }

    fn apply_layout(&mut self, layout: &WindowLayout) {
        self.layout = *layout;
    }
}

pub fn load_font(path: &Path) -> Result<Font<'static>, RenderError> {
    let data = std::fs::read(path).map_err(|source| RenderError::FontIo {
        path: path.to_path_buf(),
        source,
    })?;
    Font::try_from_vec(data).ok_or_else(|| RenderError::FontParse(path.to_path_buf()))
}

// ============================================================================
// RETAINED MODE ABSTRACTIONS
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear(Colour),
    Ring {
        cx: i32,
        cy: i32,
        r: i32,
        thickness: i32,
        colour: Colour,
    },
    Line {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        thickness: f32,
        colour: Colour,
    },
    Dot {
        cx: i32,
        cy: i32,
        radius: i32,
        colour: Colour,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        font_size: f32,
        colour: Colour,
    },
    Icon {
        cx: i32,
        cy: i32,
        /// Degrees clockwise.
        angle: f64,
    },
}

pub struct Scene<'a> {
    commands: Vec<DrawCommand>,
    icon: Option<&'a IconImage>,
}

impl<'a> Scene<'a> {
    pub fn new(icon: Option<&'a IconImage>) -> Self {
        Self {
            commands: Vec::new(),
            icon,
        }
    }

    pub fn add_command(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn render(&self, canvas: &mut Canvas, font: Option<&Font<'static>>) {
        for command in &self.commands {
            match command {
                DrawCommand::Clear(colour) => canvas.clear(*colour),
                DrawCommand::Ring {
                    cx,
                    cy,
                    r,
                    thickness,
                    colour,
                } => draw_ring(canvas, *cx, *cy, *r, *thickness, *colour),
                DrawCommand::Line {
                    x0,
                    y0,
                    x1,
                    y1,
                    thickness,
                    colour,
                } => draw_thick_line_aa(canvas, *x0, *y0, *x1, *y1, *thickness, *colour),
                DrawCommand::Dot {
                    cx,
                    cy,
                    radius,
                    colour,
                } => draw_circle(canvas, *cx, *cy, *radius, *colour),
                DrawCommand::Text {
                    x,
                    y,
                    text,
                    font_size,
                    colour,
                } => {
                    // labels need a font; without one they are skipped
                    if let Some(font) = font {
                        draw_text(canvas, *x, *y, text, font, Scale::uniform(*font_size), *colour);
                    }
                }
                DrawCommand::Icon { cx, cy, angle } => {
                    if let Some(icon) = self.icon {
                        draw_icon_rotated(canvas, icon, *cx, *cy, *angle);
                    }
                }
            }
        }
    }
}

// ============================================================================
// SCENE BUILDING
// ============================================================================

/// Turn the current view and object store into draw commands.
pub fn build_scene<'a>(
    view: &ViewState,
    store: &ObjectStore,
    icon: Option<&'a IconImage>,
    config: &ViewerConfig,
) -> Scene<'a> {
    let palette = &config.palette;
    let mut scene = Scene::new(icon);
    scene.add_command(DrawCommand::Clear(palette.background));

    let center = view.center();
    let (cx, cy) = (center.x.round() as i32, center.y.round() as i32);
    let scale = view.scale();

    if view.grid_enabled {
        add_polar_grid(&mut scene, view, config, cx, cy, scale);
    }

    let (width, height) = view.viewport();
    let margin = f64::from(config.marker_radius) * 4.0;
    for (_layer, object) in store.snapshot() {
        if object.hidden {
            continue;
        }
        let p = geometry::to_pixel(object.coord, view);
        if p.x < -margin || p.y < -margin || p.x > width as f64 + margin || p.y > height as f64 + margin {
            continue;
        }
        let (px, py) = (p.x.round() as i32, p.y.round() as i32);
        let colour = object.colour.unwrap_or(palette.object);
        scene.add_command(DrawCommand::Dot {
            cx: px,
            cy: py,
            radius: config.marker_radius,
            colour,
        });

        // orientation tick
        let angle = (object.rotation - view.display_rotation()).to_radians();
        let length = f64::from(config.marker_radius) * 3.0;
        scene.add_command(DrawCommand::Line {
            x0: px,
            y0: py,
            x1: (p.x + angle.sin() * length).round() as i32,
            y1: (p.y - angle.cos() * length).round() as i32,
            thickness: config.marker_line_width,
            colour,
        });

        let text = match (&object.label, view.distance_labels_enabled) {
            (Some(label), true) => Some(format!("{label} {:.1}m", object.coord.range())),
            (Some(label), false) => Some(label.clone()),
            (None, true) => Some(format!("{:.1}m", object.coord.range())),
            (None, false) => None,
        };
        if let Some(text) = text {
            scene.add_command(DrawCommand::Text {
                x: px,
                y: py + config.marker_radius * 2 + config.label_font_size as i32 / 2,
                text,
                font_size: config.label_font_size,
                colour: palette.label,
            });
        }
    }

    add_vehicle(&mut scene, view, config, icon.is_some(), cx, cy);
    scene
}

fn add_polar_grid(scene: &mut Scene<'_>, view: &ViewState, config: &ViewerConfig, cx: i32, cy: i32, scale: f64) {
    let palette = &config.palette;
    for ring in geometry::grid_rings(view) {
        let r = (ring * scale).round() as i32;
        scene.add_command(DrawCommand::Ring {
            cx,
            cy,
            r,
            thickness: 1,
            colour: palette.grid,
        });
        if view.distance_labels_enabled {
            scene.add_command(DrawCommand::Text {
                x: cx + 4,
                y: cy - r - config.label_font_size as i32 / 2,
                text: format_range(ring),
                font_size: config.label_font_size,
                colour: palette.grid_text,
            });
        }
    }

    let reach = view.zoom_range;
    let mut bearing = 0.0;
    while bearing < 360.0 {
        let end = geometry::to_pixel(WorldCoord::from_range_bearing(reach, bearing), view);
        scene.add_command(DrawCommand::Line {
            x0: cx,
            y0: cy,
            x1: end.x.round() as i32,
            y1: end.y.round() as i32,
            thickness: 1.0,
            colour: palette.grid,
        });
        bearing += SPOKE_STEP_DEG;
    }

    // north marker rides the grid so relative mode shows where north went
    let north = geometry::to_pixel(WorldCoord::from_range_bearing(reach * 0.95, 0.0), view);
    scene.add_command(DrawCommand::Text {
        x: north.x.round() as i32,
        y: north.y.round() as i32,
        text: "N".to_string(),
        font_size: config.label_font_size,
        colour: palette.grid_text,
    });
}

fn add_vehicle(scene: &mut Scene<'_>, view: &ViewState, config: &ViewerConfig, has_icon: bool, cx: i32, cy: i32) {
    let angle = view.vehicle_rotation();
    if has_icon {
        scene.add_command(DrawCommand::Icon { cx, cy, angle });
        return;
    }

    // chevron pointing along the vehicle nose
    let size = f64::from(config.vehicle_size);
    let rotate = |dx: f64, dy: f64| {
        let (sin, cos) = angle.to_radians().sin_cos();
        (
            (f64::from(cx) + dx * cos - dy * sin).round() as i32,
            (f64::from(cy) + dx * sin + dy * cos).round() as i32,
        )
    };
    let nose = rotate(0.0, -size);
    let left = rotate(-size * 0.6, size * 0.6);
    let right = rotate(size * 0.6, size * 0.6);
    for (a, b) in [(nose, left), (nose, right), (left, (cx, cy)), (right, (cx, cy))] {
        scene.add_command(DrawCommand::Line {
            x0: a.0,
            y0: a.1,
            x1: b.0,
            y1: b.1,
            thickness: 2.0,
            colour: config.palette.vehicle,
        });
    }
}

fn format_range(metres: f64) -> String {
    if metres.fract().abs() < 1e-9 {
        format!("{}m", metres as i64)
    } else {
        format!("{metres:.1}m")
    }
}

// ============================================================================
// CORE DATA TYPES
// ============================================================================

pub struct Canvas<'a> {
    frame: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut [u8], width: usize, height: usize) -> Self {
        Self {
            frame,
            width,
            height,
        }
    }

    fn clear(&mut self, colour: Colour) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&[colour.r, colour.g, colour.b, 0xff]);
        }
    }

    /// Inclusive pixel bounds clipped to the canvas, or `None` when empty.
    fn clip(&self, min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Option<(i32, i32, i32, i32)> {
        let max_w = self.width as i32 - 1;
        let max_h = self.height as i32 - 1;
        let (min_x, min_y) = (min_x.max(0), min_y.max(0));
        let (max_x, max_y) = (max_x.min(max_w), max_y.min(max_h));
        (min_x <= max_x && min_y <= max_y).then_some((min_x, min_y, max_x, max_y))
    }
}

// ============================================================================
// DRAWING PRIMITIVES
// ============================================================================

fn set_pixel(canvas: &mut Canvas, x: i32, y: i32, colour: Colour, alpha: f32) {
    if x < 0 || y < 0 || x as usize >= canvas.width || y as usize >= canvas.height {
        return;
    }
    let idx = (y as usize * canvas.width + x as usize) * 4;
    let Some(dst) = canvas.frame.get_mut(idx..idx + 4) else {
        return;
    };
    let a = alpha.clamp(0.0, 1.0);
    let blend = |src: u8, dst: u8| (src as f32 * a + dst as f32 * (1.0 - a)).round() as u8;
    let out = [
        blend(colour.r, dst[0]),
        blend(colour.g, dst[1]),
        blend(colour.b, dst[2]),
        0xff,
    ];
    dst.copy_from_slice(&out);
}

fn draw_thick_line_aa(canvas: &mut Canvas, x0: i32, y0: i32, x1: i32, y1: i32, thickness: f32, colour: Colour) {
    let pad = thickness.ceil() as i32 + 1;
    let Some((min_x, min_y, max_x, max_y)) = canvas.clip(
        x0.min(x1) - pad,
        y0.min(y1) - pad,
        x0.max(x1) + pad,
        y0.max(y1) + pad,
    ) else {
        return;
    };
    let dx = (x1 - x0) as f32;
    let dy = (y1 - y0) as f32;
    let len_sq = dx * dx + dy * dy;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let px = x as f32 - x0 as f32;
            let py = y as f32 - y0 as f32;
            let t = if len_sq > 0.0 {
                ((px * dx + py * dy) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let lx = x0 as f32 + t * dx;
            let ly = y0 as f32 + t * dy;
            let dist = ((lx - x as f32).powi(2) + (ly - y as f32).powi(2)).sqrt();
            let aa = (1.0 - (dist - thickness / 2.0).clamp(0.0, 1.0)).clamp(0.0, 1.0);
            if aa > 0.01 {
                set_pixel(canvas, x, y, colour, aa);
            }
        }
    }
}

fn draw_circle(canvas: &mut Canvas, cx: i32, cy: i32, radius: i32, colour: Colour) {
    let Some((min_x, min_y, max_x, max_y)) =
        canvas.clip(cx - radius - 1, cy - radius - 1, cx + radius + 1, cy + radius + 1)
    else {
        return;
    };
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (dx, dy) = ((x - cx) as f64, (y - cy) as f64);
            let dist = (dx * dx + dy * dy).sqrt();
            let aa = if dist > radius as f64 {
                1.0 - (dist - radius as f64).min(1.0)
            } else {
                1.0
            };
            if aa > 0.0 {
                set_pixel(canvas, x, y, colour, aa as f32);
            }
        }
    }
}

fn draw_ring(canvas: &mut Canvas, cx: i32, cy: i32, r: i32, thickness: i32, colour: Colour) {
    let Some((min_x, min_y, max_x, max_y)) = canvas.clip(cx - r - 1, cy - r - 1, cx + r + 1, cy + r + 1) else {
        return;
    };
    let outer = r as f64;
    let inner = (r - thickness) as f64;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (dx, dy) = ((x - cx) as f64, (y - cy) as f64);
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < inner - 1.0 || dist > outer + 1.0 {
                continue;
            }
            let aa = if dist > outer {
                1.0 - (dist - outer).min(1.0)
            } else if dist < inner {
                1.0 - (inner - dist).min(1.0)
            } else {
                1.0
            };
            if aa > 0.0 {
                set_pixel(canvas, x, y, colour, aa as f32);
            }
        }
    }
}

/// Text centred on (`x`, `y`).
fn draw_text(canvas: &mut Canvas, x: i32, y: i32, text: &str, font: &Font, scale: Scale, colour: Colour) {
    let v_metrics = font.v_metrics(scale);
    let glyphs: Vec<PositionedGlyph> = font.layout(text, scale, point(0.0, v_metrics.ascent)).collect();
    let (min_x, max_x, min_y, max_y) = glyphs.iter().filter_map(|g| g.pixel_bounding_box()).fold(
        (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
        |(min_x, max_x, min_y, max_y), bb| {
            (
                min_x.min(bb.min.x),
                max_x.max(bb.max.x),
                min_y.min(bb.min.y),
                max_y.max(bb.max.y),
            )
        },
    );
    let width_px = if min_x < max_x { max_x - min_x } else { 0 };
    let height_px = if min_y < max_y { max_y - min_y } else { 0 };
    let offset_x = x - width_px / 2;
    let offset_y = y - height_px / 2;
    for glyph in glyphs {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                let px = offset_x + gx as i32 + bb.min.x - min_x;
                let py = offset_y + gy as i32 + bb.min.y - min_y;
                set_pixel(canvas, px, py, colour, v);
            });
        }
    }
}

/// Nearest-neighbour blit of `icon` centred on (`cx`, `cy`), turned
/// `angle` degrees clockwise. Icon alpha is honoured.
fn draw_icon_rotated(canvas: &mut Canvas, icon: &IconImage, cx: i32, cy: i32, angle: f64) {
    let half_diag = f64::from(icon.width).hypot(f64::from(icon.height)) / 2.0;
    let reach = half_diag.ceil() as i32 + 1;
    let Some((min_x, min_y, max_x, max_y)) = canvas.clip(cx - reach, cy - reach, cx + reach, cy + reach) else {
        return;
    };
    let (sin, cos) = angle.to_radians().sin_cos();
    let (half_w, half_h) = (icon.width as f64 / 2.0, icon.height as f64 / 2.0);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (dx, dy) = ((x - cx) as f64, (y - cy) as f64);
            // inverse rotation back into icon space
            let ix = dx * cos + dy * sin + half_w;
            let iy = -dx * sin + dy * cos + half_h;
            if ix < 0.0 || iy < 0.0 {
                continue;
            }
            if let Some([r, g, b, a]) = icon.pixel(ix as u32, iy as u32) {
                if a > 0 {
                    set_pixel(canvas, x, y, Colour::new(r, g, b), a as f32 / 255.0);
                }
            }
        }
    }
}
