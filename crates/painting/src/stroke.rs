//! Stroke state shared by vertex and weight paint.

use chisel_config::{PaintSettings, ToolSettings};
use glam::Vec3;
use sculpting::brush::BrushTest;
use sculpting::host::{Host, ReportLevel, report};
use sculpting::neighbors::FacesTopology;
use sculpting::session::{Backing, BackingKind, SculptSession};
use sculpting::symmetry::{SymmetryFrame, SymmetryPass, symmetry_passes};
use sculpting::{SculptError, StrokeSample};

use crate::error::PaintResult;

/// Transient state of one paint stroke.
#[derive(Debug, Clone)]
pub struct PaintStrokeCache {
    pub settings: PaintSettings,
    pub radius: f32,
    /// Pressure-scaled strength of the current dab
    pub strength: f32,
    pub location: Vec3,
    pub last_location: Vec3,
    pub view_normal: Vec3,
    /// Number of completed dabs
    pub step: u32,
    passes: Vec<SymmetryPass>,
}

impl PaintStrokeCache {
    pub fn new(settings: &PaintSettings, tool: &ToolSettings, sample: &StrokeSample) -> Self {
        let location = sample.location();
        Self {
            settings: settings.clone(),
            radius: settings.radius,
            strength: settings.effective_strength(sample.pressure),
            location,
            last_location: location,
            view_normal: sample.view_normal(),
            step: 0,
            passes: symmetry_passes(tool),
        }
    }

    /// Move to the next dab.
    pub fn update(&mut self, sample: &StrokeSample) {
        self.last_location = self.location;
        self.location = sample.location();
        self.view_normal = sample.view_normal();
        self.strength = self.settings.effective_strength(sample.pressure);
    }

    pub fn passes(&self) -> &[SymmetryPass] {
        &self.passes
    }

    /// Brush frame of `pass`.
    pub fn frame(&self, pass: &SymmetryPass) -> SymmetryFrame {
        pass.apply(&SymmetryFrame {
            location: self.location,
            last_location: self.last_location,
            grab_delta: Vec3::ZERO,
            view_normal: self.view_normal,
        })
    }

    pub fn test(&self, frame: &SymmetryFrame) -> BrushTest {
        BrushTest::new(self.settings.falloff_shape, frame.location, self.radius, frame.view_normal)
    }

    /// Unit stroke direction in the view plane, `None` before the second
    /// dab or when the brush did not move.
    pub fn motion(&self, frame: &SymmetryFrame) -> Option<Vec3> {
        if self.step == 0 {
            return None;
        }
        let direction = project_on_plane(frame.location - frame.last_location, frame.view_normal);
        let direction = direction.normalize_or_zero();
        (direction != Vec3::ZERO).then_some(direction)
    }
}

#[inline]
pub(crate) fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let n = normal.normalize_or(Vec3::Z);
    v - n * v.dot(n)
}

/// Paint works on static meshes only. Reports and fails otherwise.
pub(crate) fn require_faces(session: &SculptSession, host: &dyn Host) -> PaintResult<()> {
    if let Err(err) = session.require(BackingKind::Faces) {
        report(host, ReportLevel::Error, &err.to_string());
        return Err(err.into());
    }
    Ok(())
}

pub(crate) fn faces_topology(session: &SculptSession) -> PaintResult<FacesTopology<'_>> {
    match session.backing() {
        Backing::Faces(faces) => Ok(faces.topology()),
        other => Err(SculptError::UnsupportedBacking {
            expected: BackingKind::Faces,
            actual: other.kind(),
        }
        .into()),
    }
}

/// Neighbor of `vert` (through its faces) lying furthest back along
/// `motion`, judged in the view plane. Only neighbors with a positive
/// alignment qualify.
pub(crate) fn smear_source(
    topology: &FacesTopology<'_>,
    positions: &[Vec3],
    vert: u32,
    motion: Vec3,
    view_normal: Vec3,
) -> Option<u32> {
    let co = positions[vert as usize];
    let mut best = None;
    let mut best_dot = 0.0;
    for &face in topology.vert_faces(vert) {
        for &other in topology.face_verts(face) {
            if other == vert {
                continue;
            }
            let direction = project_on_plane(co - positions[other as usize], view_normal).normalize_or_zero();
            let dot = direction.dot(motion);
            if dot > best_dot {
                best_dot = dot;
                best = Some(other);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpting::host::{ObjectId, RecordingHost};
    use sculpting::mesh::{Mesh, MultiresGrids};

    fn sample(x: f32) -> StrokeSample {
        StrokeSample::new(Vec3::new(x, 0.0, 0.0), Vec3::Z, 0.5)
    }

    #[test]
    fn test_motion_needs_previous_dab() {
        let settings = PaintSettings::default();
        let mut cache = PaintStrokeCache::new(&settings, &ToolSettings::default(), &sample(0.0));
        let pass = cache.passes()[0];
        assert!(cache.motion(&cache.frame(&pass)).is_none());
        assert!((cache.strength - 0.5).abs() < 1e-6);

        cache.update(&sample(0.5));
        cache.step = 1;
        let motion = cache.motion(&cache.frame(&pass)).unwrap();
        assert!((motion - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_smear_source_is_behind_motion() {
        let mesh = Mesh::grid(2, 2, 2.0);
        let session = SculptSession::from_mesh(ObjectId(1), mesh, ToolSettings::default()).unwrap();
        let topology = faces_topology(&session).unwrap();
        // Center vertex 4, moving +X: vertex 3 at (-1, 0) is straight behind
        let source = smear_source(&topology, &session.attrs().positions, 4, Vec3::X, Vec3::Z);
        assert_eq!(source, Some(3));
    }

    #[test]
    fn test_grids_rejected() {
        let grids = MultiresGrids::from_mesh(&Mesh::grid(1, 1, 1.0), 1);
        let session = SculptSession::new(ObjectId(1), Backing::Grids(grids), ToolSettings::default());
        let host = RecordingHost::new();
        assert!(require_faces(&session, &host).is_err());
        assert_eq!(host.reports().len(), 1);
    }
}
