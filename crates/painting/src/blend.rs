//! Blend modes for vertex colors and weights.

use chisel_config::PaintBlend;
use glam::{Vec3, Vec4, Vec4Swizzles};

/// Blend `paint` into `current` with opacity `alpha`.
///
/// The paint color's own alpha scales the opacity. Color modes composite
/// the alpha channel like a normal "over"; the two alpha modes touch only
/// alpha.
pub fn blend_color(blend: PaintBlend, current: Vec4, paint: Vec4, alpha: f32) -> Vec4 {
    let t = (alpha * paint.w).clamp(0.0, 1.0);
    if t == 0.0 {
        return current;
    }
    let cur = current.xyz();
    let src = paint.xyz();

    let target = match blend {
        PaintBlend::Mix => src,
        PaintBlend::Add => cur + src,
        PaintBlend::Subtract => cur - src,
        PaintBlend::Multiply => cur * src,
        PaintBlend::Lighten => cur.max(src),
        PaintBlend::Darken => cur.min(src),
        PaintBlend::Screen => Vec3::ONE - (Vec3::ONE - cur) * (Vec3::ONE - src),
        PaintBlend::Overlay => Vec3::new(
            overlay(cur.x, src.x),
            overlay(cur.y, src.y),
            overlay(cur.z, src.z),
        ),
        PaintBlend::Difference => (cur - src).abs(),
        PaintBlend::EraseAlpha => {
            return cur.extend(current.w * (1.0 - t));
        }
        PaintBlend::AddAlpha => {
            return cur.extend((current.w + t).min(1.0));
        }
    };

    let rgb = (cur * (1.0 - t) + target * t).max(Vec3::ZERO);
    rgb.extend(t + current.w * (1.0 - t))
}

#[inline]
fn overlay(base: f32, paint: f32) -> f32 {
    if base > 0.5 {
        1.0 - 2.0 * (1.0 - base) * (1.0 - paint)
    } else {
        2.0 * base * paint
    }
}

/// Keep `blended` between `original` and `limit` per channel.
///
/// `limit` is what one full dab applied to `original` produces, so a stroke
/// without accumulation never goes past it however often it passes over a
/// vertex.
pub fn clip_to_dab(blended: Vec4, original: Vec4, limit: Vec4) -> Vec4 {
    let mut out = blended.to_array();
    let original = original.to_array();
    let limit = limit.to_array();
    for i in 0..4 {
        let (low, high) = if limit[i] < original[i] {
            (limit[i], original[i])
        } else {
            (original[i], limit[i])
        };
        out[i] = out[i].clamp(low, high);
    }
    Vec4::from_array(out)
}

/// Blend modes weight paint understands. Anything else acts as mix.
pub fn weight_blend_mode(blend: PaintBlend, flip: bool) -> PaintBlend {
    let blend = match blend {
        PaintBlend::Mix
        | PaintBlend::Add
        | PaintBlend::Subtract
        | PaintBlend::Multiply
        | PaintBlend::Lighten
        | PaintBlend::Darken => blend,
        _ => PaintBlend::Mix,
    };
    if !flip {
        return blend;
    }
    match blend {
        PaintBlend::Add => PaintBlend::Subtract,
        PaintBlend::Subtract => PaintBlend::Add,
        PaintBlend::Lighten => PaintBlend::Darken,
        PaintBlend::Darken => PaintBlend::Lighten,
        other => other,
    }
}

/// Blend `paint` into `weight` with opacity `alpha`; the result is clamped
/// to 0-1. Flipping mix paints `1 - paint`, flipping the other modes swaps
/// them with their opposite.
pub fn blend_weight(blend: PaintBlend, weight: f32, paint: f32, alpha: f32, flip: bool) -> f32 {
    let mode = weight_blend_mode(blend, flip);
    let paint = if flip && mode == PaintBlend::Mix { 1.0 - paint } else { paint };
    let result = match mode {
        PaintBlend::Add => weight + paint * alpha,
        PaintBlend::Subtract => weight - paint * alpha,
        PaintBlend::Multiply => weight * ((1.0 - alpha) + paint * alpha),
        PaintBlend::Lighten if paint > weight => weight + (paint - weight) * alpha,
        PaintBlend::Darken if paint < weight => weight + (paint - weight) * alpha,
        PaintBlend::Lighten | PaintBlend::Darken => weight,
        _ => weight + (paint - weight) * alpha,
    };
    result.clamp(0.0, 1.0)
}

/// Only let a weight move away from its stroke-start value, never back.
///
/// `previous` is the start value, `current` the stored value and `new` the
/// freshly blended one.
pub fn clamp_monotonic(previous: f32, current: f32, new: f32) -> f32 {
    if new < previous {
        new.min(current)
    } else if new > previous {
        new.max(current)
    } else {
        new
    }
}
