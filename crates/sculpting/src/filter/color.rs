//! Color filter: per-vertex color adjustments over the whole mesh.
//!
//! Adjustments start from the colors captured at `start`, so the result
//! depends only on the current strength. Smooth is the exception and blends
//! the current colors toward their neighbors.

use glam::{Vec3, Vec4, Vec4Swizzles};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SculptError, SculptResult};
use crate::host::{ChangeKind, Host, ReportLevel, report};
use crate::mesh::VertexAttributeStore;
use crate::neighbors::{Neighbors, Topology};
use crate::parallel::{LeafWrites, map_leaves};
use crate::session::SculptSession;
use crate::smooth::neighbor_color_average;
use crate::spatial::{LeafDirty, LeafId, SpatialTree};
use crate::undo::{UndoKind, UndoSink};

use super::{FilterCache, contrast_gain_offset, logged_step};

/// Saturation below which a color counts as gray and keeps its value
const GRAY_SATURATION: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColorFilterType {
    #[default]
    Fill = 0,
    Hue = 1,
    Saturation = 2,
    Value = 3,
    Brightness = 4,
    Contrast = 5,
    Red = 6,
    Green = 7,
    Blue = 8,
    Smooth = 9,
}

/// Color filter operator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorFilterSettings {
    pub filter_type: ColorFilterType,
    /// Fill color, linear RGB (default: white)
    pub fill_color: [f32; 3],
}

impl Default for ColorFilterSettings {
    fn default() -> Self {
        Self {
            filter_type: ColorFilterType::Fill,
            fill_color: [1.0, 1.0, 1.0],
        }
    }
}

/// RGB to HSV, all components 0-1.
pub fn rgb_to_hsv(rgb: Vec3) -> Vec3 {
    let max = rgb.max_element();
    let min = rgb.min_element();
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rgb.x {
        ((rgb.y - rgb.z) / delta).rem_euclid(6.0) / 6.0
    } else if max == rgb.y {
        ((rgb.z - rgb.x) / delta + 2.0) / 6.0
    } else {
        ((rgb.x - rgb.y) / delta + 4.0) / 6.0
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    Vec3::new(hue, saturation, max)
}

/// HSV to RGB, all components 0-1.
pub fn hsv_to_rgb(hsv: Vec3) -> Vec3 {
    let h = hsv.x.rem_euclid(1.0) * 6.0;
    let c = hsv.z * hsv.y;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = hsv.z - c;

    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    Vec3::new(r + m, g + m, b + m)
}

/// An interactive color filter.
#[derive(Debug)]
pub struct ColorFilter {
    settings: ColorFilterSettings,
    cache: FilterCache,
    /// Twice-smoothed start colors, the reference for negative smoothing
    pre_smoothed: Option<Vec<Vec4>>,
}

impl ColorFilter {
    /// Capture start colors. Fails before touching anything when the mesh
    /// has no color attribute.
    pub fn start(
        session: &mut SculptSession,
        settings: ColorFilterSettings,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> SculptResult<Self> {
        if !session.attrs().has_colors() {
            report(host, ReportLevel::Warning, "Mesh has no color attribute");
            return Err(SculptError::MissingColorAttribute);
        }
        session.cancel.reset();
        let mut cache = FilterCache::new(session, UndoKind::Colors)?;
        cache.capture_colors(session);

        let pre_smoothed = (settings.filter_type == ColorFilterType::Smooth).then(|| {
            let original = cache.original_colors();
            crate::with_topology!(session.topology(), |t| pre_smooth(t, original, 2))
        });

        info!(
            "Color filter {:?} started over {} leaves",
            settings.filter_type,
            cache.leaves.len()
        );
        undo.push_begin("Color Filter");
        Ok(Self {
            settings,
            cache,
            pre_smoothed,
        })
    }

    pub fn settings(&self) -> &ColorFilterSettings {
        &self.settings
    }

    /// Evaluate the filter at `strength`. Returns the number of color
    /// writes.
    pub fn update(
        &mut self,
        session: &mut SculptSession,
        strength: f32,
        undo: &mut dyn UndoSink,
        host: &dyn Host,
    ) -> SculptResult<usize> {
        self.cache.push_undo(session, undo)?;
        let written = logged_step(session, undo, |session| {
            let writes = {
                let (attrs, topology, tree) = session.parts();
                let Some(colors) = attrs.colors.as_deref() else {
                    return Err(SculptError::MissingColorAttribute);
                };
                let ctx = PassContext {
                    attrs,
                    colors,
                    tree,
                    filter: &*self,
                    strength,
                };
                crate::with_topology!(topology, |t| {
                    map_leaves(&self.cache.leaves, session.parallel(), &session.cancel, |leaf| {
                        color_leaf(&ctx, t, leaf)
                    })
                })?
            };
            Ok(session.scatter(&writes, LeafDirty::COLOR, |attrs, v, color| {
                if let Some(colors) = attrs.colors.as_mut() {
                    colors[v as usize] = color;
                }
            }))
        })?;
        self.cache.iteration += 1;
        debug!("Color filter update at strength {:.3}: {} writes", strength, written);
        host.notify(ChangeKind::Color, session.object());
        Ok(written)
    }

    /// Close the undo step. Applied updates stay applied.
    pub fn finish(self, session: &mut SculptSession, undo: &mut dyn UndoSink) {
        session.flush_updates();
        undo.push_end();
        info!("Color filter finished after {} updates", self.cache.iteration);
    }
}

/// `iterations` passes of halfway blending toward the neighbor average.
fn pre_smooth<T: Topology + ?Sized>(topology: &T, colors: &[Vec4], iterations: u32) -> Vec<Vec4> {
    let mut neighbors = Neighbors::new();
    let mut current = colors.to_vec();
    for _ in 0..iterations {
        current = (0..current.len() as u32)
            .map(|v| {
                let own = current[v as usize];
                if !topology.is_valid_vertex(v) {
                    return own;
                }
                own.lerp(neighbor_color_average(topology, &current, v, &mut neighbors), 0.5)
            })
            .collect();
    }
    current
}

struct PassContext<'a> {
    attrs: &'a VertexAttributeStore,
    colors: &'a [Vec4],
    tree: &'a SpatialTree,
    filter: &'a ColorFilter,
    strength: f32,
}

fn color_leaf<T: Topology + ?Sized>(ctx: &PassContext<'_>, topology: &T, leaf: LeafId) -> LeafWrites<Vec4> {
    let mut out = LeafWrites::new(leaf);
    let mut neighbors = Neighbors::new();
    let filter = ctx.filter;
    let original = filter.cache.original_colors();
    let fill = Vec3::from_array(filter.settings.fill_color);

    for &v in ctx.tree.leaf(leaf).verts() {
        let i = v as usize;
        if !ctx.attrs.is_visible(v) {
            continue;
        }
        let fade = filter.cache.fade(topology, v, ctx.attrs.masks[i], ctx.strength).clamp(-1.0, 1.0);
        if fade == 0.0 {
            continue;
        }
        let current = ctx.colors[i];
        let orig = original.get(i).copied().unwrap_or(current);
        let rgb = orig.xyz();

        let new_color = match filter.settings.filter_type {
            ColorFilterType::Fill => {
                // Exact fill at fade 1
                let f = fade.clamp(0.0, 1.0);
                (rgb * (1.0 - f) + fill * f).extend(orig.w * (1.0 - f) + f)
            }
            ColorFilterType::Hue => {
                let mut hsv = rgb_to_hsv(rgb);
                hsv.x = (hsv.x + fade.abs()).rem_euclid(1.0);
                hsv_to_rgb(hsv).extend(orig.w)
            }
            ColorFilterType::Saturation => {
                let mut hsv = rgb_to_hsv(rgb);
                if hsv.y > GRAY_SATURATION {
                    hsv.y = (hsv.y + fade * hsv.y).clamp(0.0, 1.0);
                    hsv_to_rgb(hsv).extend(orig.w)
                } else {
                    orig
                }
            }
            ColorFilterType::Value => {
                let mut hsv = rgb_to_hsv(rgb);
                hsv.z = (hsv.z + fade).clamp(0.0, 1.0);
                hsv_to_rgb(hsv).extend(orig.w)
            }
            ColorFilterType::Red => Vec4::new(orig.x + fade, orig.y, orig.z, orig.w),
            ColorFilterType::Green => Vec4::new(orig.x, orig.y + fade, orig.z, orig.w),
            ColorFilterType::Blue => Vec4::new(orig.x, orig.y, orig.z + fade, orig.w),
            ColorFilterType::Brightness | ColorFilterType::Contrast => {
                let (gain, offset) = if filter.settings.filter_type == ColorFilterType::Brightness {
                    contrast_gain_offset(fade, 0.0)
                } else {
                    contrast_gain_offset(0.0, fade)
                };
                (rgb * gain + Vec3::splat(offset)).extend(orig.w)
            }
            ColorFilterType::Smooth => {
                let average = neighbor_color_average(topology, ctx.colors, v, &mut neighbors);
                if fade < 0.0 {
                    // Unsharp mask against the pre-smoothed reference
                    let reference = filter.pre_smoothed.as_ref().map_or(current, |p| p[i]);
                    current + (reference - average) * fade
                } else {
                    current.lerp(average, fade)
                }
            }
        };
        out.push(v, new_color.clamp(Vec4::ZERO, Vec4::ONE));
    }
    out
}
