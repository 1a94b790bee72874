use crate::types::{Color, Length, Size};
use std::f32::consts::{FRAC_PI_2, TAU};

/// One recorded drawing operation. Coordinates live in a y-down user space whose
/// origin is the top-left corner of the page; both backends honor that.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(Length, Length),
    Scale(f32, f32),
    Rotate(f32),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Length),
    SetLineCap(u8),
    SetLineJoin(u8),
    SetMiterLimit(Length),
    SetDash {
        pattern: Vec<Length>,
        phase: Length,
    },
    // Fill and stroke alpha. Values outside 0..1 are clamped.
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    SetFontName(String),
    SetFontSize(Length),
    MoveTo {
        x: Length,
        y: Length,
    },
    LineTo {
        x: Length,
        y: Length,
    },
    CurveTo {
        x1: Length,
        y1: Length,
        x2: Length,
        y2: Length,
        x: Length,
        y: Length,
    },
    ClosePath,
    Fill,
    FillEvenOdd,
    Stroke,
    FillStroke,
    FillStrokeEvenOdd,
    // Single line of text with its baseline starting at (x, y).
    DrawString {
        x: Length,
        y: Length,
        text: String,
    },
    DrawRect {
        x: Length,
        y: Length,
        width: Length,
        height: Length,
    },
    DrawImage {
        x: Length,
        y: Length,
        width: Length,
        height: Length,
        resource_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Length,
    line_cap: u8,
    line_join: u8,
    font_size: Length,
    font_name: String,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Length::from_f32(1.0),
            line_cap: 0,
            line_join: 0,
            font_size: Length::from_f32(12.0),
            font_name: "Helvetica".to_string(),
        }
    }
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
    current_point: Option<(Length, Length)>,
    subpath_start: Option<(Length, Length)>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
            current_point: None,
            subpath_start: None,
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn translate(&mut self, x: Length, y: Length) {
        self.current.commands.push(Command::Translate(x, y));
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.current.commands.push(Command::Scale(x, y));
    }

    pub fn rotate(&mut self, angle_radians: f32) {
        self.current.commands.push(Command::Rotate(angle_radians));
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Length) {
        let width = width.max(Length::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_line_cap(&mut self, cap: u8) {
        if self.current_state.line_cap == cap {
            return;
        }
        self.current_state.line_cap = cap;
        self.current.commands.push(Command::SetLineCap(cap));
    }

    pub fn set_line_join(&mut self, join: u8) {
        if self.current_state.line_join == join {
            return;
        }
        self.current_state.line_join = join;
        self.current.commands.push(Command::SetLineJoin(join));
    }

    pub fn set_miter_limit(&mut self, limit: Length) {
        self.current
            .commands
            .push(Command::SetMiterLimit(limit.max(Length::ZERO)));
    }

    pub fn set_dash(&mut self, pattern: Vec<Length>, phase: Length) {
        self.current
            .commands
            .push(Command::SetDash { pattern, phase });
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        self.current.commands.push(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Length) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn move_to(&mut self, x: Length, y: Length) {
        self.current_point = Some((x, y));
        self.subpath_start = Some((x, y));
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Length, y: Length) {
        if self.current_point.is_none() {
            self.move_to(x, y);
            return;
        }
        self.current_point = Some((x, y));
        self.current.commands.push(Command::LineTo { x, y });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn curve_to(
        &mut self,
        x1: Length,
        y1: Length,
        x2: Length,
        y2: Length,
        x: Length,
        y: Length,
    ) {
        if self.current_point.is_none() {
            self.move_to(x1, y1);
        }
        self.current_point = Some((x, y));
        self.current.commands.push(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.current_point = self.subpath_start;
        self.current.commands.push(Command::ClosePath);
    }

    /// Forgets the current point so the next arc starts a fresh subpath
    /// instead of connecting to the previous one.
    pub fn new_sub_path(&mut self) {
        self.current_point = None;
        self.subpath_start = None;
    }

    /// Circular arc around (cx, cy) walked in the direction of increasing angle
    /// (clockwise on the y-down page). When a current point exists it is joined
    /// to the arc start with a straight line.
    pub fn arc(&mut self, cx: Length, cy: Length, radius: Length, angle1: f32, angle2: f32) {
        let mut end = angle2;
        while end < angle1 {
            end += TAU;
        }
        self.arc_segments(cx, cy, radius, angle1, end);
    }

    /// Like [`Canvas::arc`], walked in the direction of decreasing angle.
    pub fn arc_negative(
        &mut self,
        cx: Length,
        cy: Length,
        radius: Length,
        angle1: f32,
        angle2: f32,
    ) {
        let mut end = angle2;
        while end > angle1 {
            end -= TAU;
        }
        self.arc_segments(cx, cy, radius, angle1, end);
    }

    fn arc_segments(&mut self, cx: Length, cy: Length, radius: Length, start: f32, end: f32) {
        let r = radius.to_f32().max(0.0);
        let (cx_f, cy_f) = (cx.to_f32(), cy.to_f32());
        let point = |angle: f32| {
            (
                Length::from_f32(cx_f + r * libm::cosf(angle)),
                Length::from_f32(cy_f + r * libm::sinf(angle)),
            )
        };

        let (sx, sy) = point(start);
        if self.current_point.is_some() {
            self.line_to(sx, sy);
        } else {
            self.move_to(sx, sy);
        }
        if r <= 0.0 {
            return;
        }

        let sweep = end - start;
        // Tolerance keeps an exact quarter-turn multiple from spilling into an extra segment.
        let count = libm::ceilf(sweep.abs() / FRAC_PI_2 - 1e-4).max(1.0) as i32;
        let delta = sweep / count as f32;
        let k = (4.0 / 3.0) * libm::tanf(delta / 4.0);
        for index in 0..count {
            let t1 = start + delta * index as f32;
            let t2 = t1 + delta;
            let (s1, c1) = (libm::sinf(t1), libm::cosf(t1));
            let (s2, c2) = (libm::sinf(t2), libm::cosf(t2));
            self.curve_to(
                Length::from_f32(cx_f + r * (c1 - k * s1)),
                Length::from_f32(cy_f + r * (s1 + k * c1)),
                Length::from_f32(cx_f + r * (c2 + k * s2)),
                Length::from_f32(cy_f + r * (s2 - k * c2)),
                Length::from_f32(cx_f + r * c2),
                Length::from_f32(cy_f + r * s2),
            );
        }
    }

    pub fn fill(&mut self) {
        self.end_path();
        self.current.commands.push(Command::Fill);
    }

    pub fn fill_evenodd(&mut self) {
        self.end_path();
        self.current.commands.push(Command::FillEvenOdd);
    }

    pub fn stroke(&mut self) {
        self.end_path();
        self.current.commands.push(Command::Stroke);
    }

    pub fn fill_stroke(&mut self) {
        self.end_path();
        self.current.commands.push(Command::FillStroke);
    }

    pub fn fill_stroke_evenodd(&mut self) {
        self.end_path();
        self.current.commands.push(Command::FillStrokeEvenOdd);
    }

    fn end_path(&mut self) {
        self.current_point = None;
        self.subpath_start = None;
    }

    pub fn draw_string(&mut self, x: Length, y: Length, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    /// Fills an axis-aligned rectangle with the current fill color.
    pub fn draw_rect(&mut self, x: Length, y: Length, width: Length, height: Length) {
        self.current.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw_image(
        &mut self,
        x: Length,
        y: Length,
        width: Length,
        height: Length,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::default();
        self.end_path();
    }

    pub fn commands(&self) -> &[Command] {
        &self.current.commands
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn canvas() -> Canvas {
        Canvas::new(Size::new(100.0, 100.0))
    }

    fn curve_count(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, Command::CurveTo { .. }))
            .count()
    }

    #[test]
    fn redundant_state_changes_are_dropped() {
        let mut c = canvas();
        c.set_fill_color(Color::WHITE);
        c.set_fill_color(Color::WHITE);
        c.set_font_name("Serif");
        c.set_font_name("Serif");
        assert_eq!(c.commands().len(), 2);
    }

    #[test]
    fn restore_rewinds_tracked_state() {
        let mut c = canvas();
        c.save_state();
        c.set_fill_color(Color::WHITE);
        c.restore_state();
        c.set_fill_color(Color::WHITE);
        let fills = c
            .commands()
            .iter()
            .filter(|cmd| matches!(cmd, Command::SetFillColor(_)))
            .count();
        assert_eq!(fills, 2);
    }

    #[test]
    fn arc_without_current_point_starts_with_move() {
        let mut c = canvas();
        c.arc(
            Length::from_f32(50.0),
            Length::from_f32(50.0),
            Length::from_f32(10.0),
            0.0,
            PI,
        );
        let cmds = c.commands();
        assert_eq!(
            cmds[0],
            Command::MoveTo {
                x: Length::from_f32(60.0),
                y: Length::from_f32(50.0)
            }
        );
        assert_eq!(curve_count(cmds), 2);
        // Increasing angle on a y-down page passes through the bottom of the circle.
        let Command::CurveTo { x, y, .. } = cmds[1].clone() else {
            panic!("expected a curve");
        };
        assert_eq!(x, Length::from_f32(50.0));
        assert_eq!(y, Length::from_f32(60.0));
    }

    #[test]
    fn arc_joins_existing_point_with_a_line() {
        let mut c = canvas();
        c.move_to(Length::ZERO, Length::ZERO);
        c.arc(
            Length::from_f32(50.0),
            Length::from_f32(50.0),
            Length::from_f32(10.0),
            0.0,
            FRAC_PI_2,
        );
        assert!(matches!(c.commands()[1], Command::LineTo { .. }));
    }

    #[test]
    fn arc_wraps_end_angle_forward() {
        let mut c = canvas();
        c.arc(Length::ZERO, Length::ZERO, Length::from_f32(5.0), 5.0 * PI / 4.0, PI / 4.0);
        // 5π/4 → 9π/4 is a half turn, split into two quarter segments.
        assert_eq!(curve_count(c.commands()), 2);
    }

    #[test]
    fn arc_negative_full_turn_ends_where_it_started() {
        let mut c = canvas();
        c.arc_negative(Length::ZERO, Length::ZERO, Length::from_f32(5.0), TAU, 0.0);
        let cmds = c.commands();
        assert_eq!(curve_count(cmds), 4);
        let Command::CurveTo { x, y, .. } = cmds[cmds.len() - 1].clone() else {
            panic!("expected a curve");
        };
        assert_eq!(x, Length::from_f32(5.0));
        assert_eq!(y, Length::ZERO);
    }

    #[test]
    fn new_sub_path_detaches_following_arc() {
        let mut c = canvas();
        c.move_to(Length::ZERO, Length::ZERO);
        c.close_path();
        c.new_sub_path();
        c.arc(Length::ZERO, Length::ZERO, Length::from_f32(5.0), 0.0, PI);
        assert!(matches!(c.commands()[2], Command::MoveTo { .. }));
    }

    #[test]
    fn finish_flushes_partial_page_once() {
        let mut c = canvas();
        c.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(1), Length::from_i32(1));
        c.show_page();
        c.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(1), Length::from_i32(1));
        let doc = c.finish();
        assert_eq!(doc.pages.len(), 2);
    }

    #[test]
    fn pages_hold_only_drawing_commands() {
        let mut c = canvas();
        c.set_fill_color(Color::from_rgb8(255, 0, 0));
        c.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(1), Length::from_i32(1));
        let doc = c.finish();
        assert_eq!(doc.pages[0].commands.len(), 2);
        assert!(matches!(doc.pages[0].commands[1], Command::DrawRect { .. }));
    }

    #[test]
    fn empty_canvas_still_produces_a_page() {
        assert_eq!(canvas().finish().pages.len(), 1);
    }
}
