use crate::canvas::Canvas;
use crate::drawable::{Drawable, Painter};
use crate::types::{Color, Length, Rect};
use std::f32::consts::{FRAC_PI_4, PI, TAU};

/// Half the thickness of the sign's ring and bar, in the drawing unit.
pub const BAR_HALF_THICKNESS: f32 = 1.3;
const SIGN_ALPHA: f32 = 0.7;

/// Angular half-width of the bar's gap in the ring for a sign of `radius`,
/// or `None` when the sign is too small to have a hole.
pub fn gap_half_angle(radius: f32) -> Option<f32> {
    let inner = radius - BAR_HALF_THICKNESS;
    if inner <= 0.0 {
        return None;
    }
    Some(libm::atanf(BAR_HALF_THICKNESS / inner))
}

/// Wraps `base` in a painter that draws it and then a translucent
/// "prohibited" sign on top.
pub fn make_overlay(base: Drawable) -> Drawable {
    let size = base.intrinsic_size();
    Drawable::Painter(Painter::new(size, move |canvas, rect| {
        base.fit(canvas, rect);
        draw_sign(canvas, rect);
    }))
}

fn draw_sign(canvas: &mut Canvas, rect: Rect) {
    let radius = rect.width.min(rect.height).to_f32() / 2.0;
    if radius <= 0.0 {
        return;
    }
    let cx = rect.x + rect.width / 2;
    let cy = rect.y + rect.height / 2;

    canvas.save_state();
    canvas.set_fill_color(Color::BLACK);
    canvas.set_opacity(SIGN_ALPHA, SIGN_ALPHA);
    match gap_half_angle(radius) {
        Some(gap) => {
            let inner = Length::from_f32(radius - BAR_HALF_THICKNESS);
            // Two half disks split by the bar, wound against the outer circle so
            // their interiors cancel and only the ring and bar stay filled.
            canvas.new_sub_path();
            canvas.arc(cx, cy, inner, PI + FRAC_PI_4 + gap, FRAC_PI_4 - gap);
            canvas.close_path();
            canvas.new_sub_path();
            canvas.arc(cx, cy, inner, FRAC_PI_4 + gap, PI + FRAC_PI_4 - gap);
            canvas.close_path();
            canvas.new_sub_path();
            canvas.arc_negative(cx, cy, Length::from_f32(radius), TAU, 0.0);
            canvas.close_path();
        }
        None => {
            canvas.new_sub_path();
            canvas.arc(cx, cy, Length::from_f32(radius), 0.0, TAU);
            canvas.close_path();
        }
    }
    canvas.fill();
    canvas.restore_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::drawable::ImageAsset;
    use crate::types::Size;
    use std::sync::Arc;

    fn icon() -> Drawable {
        Drawable::Image(Arc::new(ImageAsset::raster(
            "keeper.png",
            Size::new(20.0, 10.0),
            "keeper.png",
        )))
    }

    fn move_count(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, Command::MoveTo { .. }))
            .count()
    }

    #[test]
    fn gap_for_a_ten_unit_box() {
        let gap = gap_half_angle(5.0).unwrap();
        assert!((gap - (1.3f32 / 3.7).atan()).abs() < 1e-6);
    }

    #[test]
    fn tiny_sign_has_no_gap() {
        assert!(gap_half_angle(1.3).is_none());
        assert!(gap_half_angle(0.5).is_none());
    }

    #[test]
    fn overlay_keeps_base_size_and_draws_base_first() {
        let overlay = make_overlay(icon());
        assert_eq!(overlay.intrinsic_size(), Size::new(20.0, 10.0));
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        overlay.fit(&mut canvas, Rect::from_f32(0.0, 0.0, 10.0, 10.0));
        let cmds = canvas.commands();
        assert!(matches!(cmds[0], Command::DrawImage { .. }));
        assert!(cmds.contains(&Command::SetOpacity {
            fill: 0.7,
            stroke: 0.7
        }));
        assert_eq!(move_count(cmds), 3);
        assert_eq!(
            cmds.iter().filter(|c| **c == Command::ClosePath).count(),
            3
        );
        assert_eq!(cmds[cmds.len() - 2], Command::Fill);
        assert_eq!(cmds[cmds.len() - 1], Command::RestoreState);
    }

    #[test]
    fn sign_is_centered_on_the_box() {
        let overlay = make_overlay(icon());
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        overlay.fit(&mut canvas, Rect::from_f32(10.0, 20.0, 30.0, 10.0));
        // The outer circle starts at angle 2π: (cx + r, cy).
        let last_move = canvas.commands().iter().rev().find_map(|c| match c {
            Command::MoveTo { x, y } => Some((*x, *y)),
            _ => None,
        });
        assert_eq!(last_move, Some((Length::from_f32(30.0), Length::from_f32(25.0))));
    }

    #[test]
    fn small_box_fills_the_whole_disk() {
        let overlay = make_overlay(icon());
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        overlay.fit(&mut canvas, Rect::from_f32(0.0, 0.0, 2.0, 2.0));
        assert_eq!(move_count(canvas.commands()), 1);
    }
}
