/*!
Provides the [`Camera`] sensor addon, which renders rgb, optional depth
and optional segmentation observations through the backend.

The camera is mounted on a named link of its body (or on the body base)
with a fixed xyz/rpy offset. Rendering itself is delegated to the
backend; this addon only composes the view matrix and recovers metric
depth from the normalized depth buffer by inverting the projection.
*/

use log::debug;
use serde_derive::{Deserialize, Serialize};

extern crate nalgebra as na;
use na::{Isometry3, Matrix4, Perspective3};

use crate::backend::{BodyId, JointId, SharedBackend};
use crate::errors::{RobokitError, RobokitErrorTypes, RobokitResult};
use crate::utils::determinist_random_variable::{
    DeterministRandomVariable, DeterministRandomVariableFactory, RandomVariableTypeConfig,
};
use crate::utils::geometry::{isometry_from_pose, isometry_from_xyz_rpy};

use super::{Addon, AddonObservation};

/// Configuration of the [`Camera`].
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
#[serde(deny_unknown_fields)]
pub struct CameraConfig {
    /// Image width and height in pixels.
    pub resolution: [u32; 2],
    /// Vertical field of view, in degrees.
    pub field_of_view: f32,
    /// Near and far clipping planes.
    pub clipping_boundaries: [f32; 2],
    /// Link the camera is attached to; the body base when absent.
    pub frame: Option<String>,
    /// Mounting offset relative to the frame.
    pub xyz: [f32; 3],
    /// Mounting orientation relative to the frame, roll/pitch/yaw.
    pub rpy: [f32; 3],
    /// Also produce a metric depth image.
    pub depth: bool,
    /// Also produce a per-pixel segmentation mask.
    pub segmentation_mask: bool,
    /// Additive noise on the recovered depth.
    pub depth_noise: RandomVariableTypeConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: [640, 480],
            field_of_view: 70.0,
            clipping_boundaries: [0.01, 100.],
            frame: None,
            xyz: [0., 0., 0.],
            rpy: [0., 0., 0.],
            depth: false,
            segmentation_mask: false,
            depth_noise: RandomVariableTypeConfig::None,
        }
    }
}

/// One rendered observation.
#[derive(Debug, Clone)]
pub struct CameraObservation {
    pub width: u32,
    pub height: u32,
    /// Row-major rgb, normalized to [0, 1], three values per pixel.
    pub rgb: Vec<f32>,
    /// Row-major eye-space depth in world units, if requested.
    pub depth: Option<Vec<f32>>,
    /// Row-major per-pixel object ids, if requested.
    pub segmentation_mask: Option<Vec<i32>>,
}

/// Bounds of the observation channels.
#[derive(Debug, Clone)]
pub struct CameraObservationSpace {
    pub resolution: [u32; 2],
    /// rgb bounds, always [0, 1].
    pub rgb: (f32, f32),
    /// depth bounds [near, far], if depth is produced.
    pub depth: Option<(f32, f32)>,
    pub segmentation_mask: bool,
}

/// Camera sensor addon.
#[derive(Debug)]
pub struct Camera {
    backend: SharedBackend,
    body: BodyId,
    frame_id: Option<JointId>,
    width: u32,
    height: u32,
    near: f32,
    far: f32,
    use_depth: bool,
    use_segmentation: bool,
    t_parent_cam: Isometry3<f32>,
    projection: Matrix4<f32>,
    depth_noise: Box<dyn DeterministRandomVariable>,
}

impl Camera {
    /// Makes a new [`Camera`] from the given config. Fails if the
    /// configured frame is not a link of the body.
    pub fn from_config(
        config: &CameraConfig,
        backend: SharedBackend,
        body: BodyId,
        va_factory: &DeterministRandomVariableFactory,
    ) -> RobokitResult<Self> {
        let frame_id = match &config.frame {
            Some(name) => {
                let backend = backend.read().unwrap();
                let found = (0..backend.num_joints(body))
                    .map(|i| backend.joint_info(body, i))
                    .find(|info| &info.name == name);
                match found {
                    Some(info) => Some(info.joint_id),
                    None => {
                        return Err(RobokitError::new(
                            RobokitErrorTypes::ConfigError,
                            format!("camera frame `{}` not found on body {}", name, body),
                        ))
                    }
                }
            }
            None => None,
        };

        let [width, height] = config.resolution;
        let [near, far] = config.clipping_boundaries;
        if near <= 0. || far <= near {
            return Err(RobokitError::new(
                RobokitErrorTypes::ConfigError,
                format!("invalid clipping boundaries [{}, {}]", near, far),
            ));
        }
        let aspect = width as f32 / height as f32;
        let projection =
            Perspective3::new(aspect, config.field_of_view.to_radians(), near, far)
                .to_homogeneous();
        debug!(
            "Camera on body {}: {}x{}, fov {}°, frame {:?}",
            body, width, height, config.field_of_view, config.frame
        );

        Ok(Self {
            backend,
            body,
            frame_id,
            width,
            height,
            near,
            far,
            use_depth: config.depth,
            use_segmentation: config.segmentation_mask,
            t_parent_cam: isometry_from_xyz_rpy(config.xyz, config.rpy),
            projection,
            depth_noise: va_factory.make_variable(config.depth_noise.clone()),
        })
    }

    pub fn observation_space(&self) -> CameraObservationSpace {
        CameraObservationSpace {
            resolution: [self.width, self.height],
            rgb: (0., 1.),
            depth: self.use_depth.then_some((self.near, self.far)),
            segmentation_mask: self.use_segmentation,
        }
    }

    /// Recover eye-space depth from one normalized depth buffer value.
    ///
    /// The buffer is in [0, 1] whereas NDC coordinates need [-1, 1];
    /// the metric value then comes from the projection matrix entries.
    fn recover_depth(&self, buffer_value: f32) -> f32 {
        let ndc = buffer_value * 2. - 1.;
        let p = &self.projection;
        -(p[(2, 3)] / (p[(3, 2)] * ndc - p[(2, 2)]))
    }
}

impl Addon for Camera {
    fn observe(&mut self) -> RobokitResult<Option<AddonObservation>> {
        let t_world_parent = {
            let backend = self.backend.read().unwrap();
            match self.frame_id {
                Some(link) => isometry_from_pose(&backend.link_pose(self.body, link)),
                None => isometry_from_pose(&backend.base_pose(self.body)),
            }
        };
        let view = (t_world_parent * self.t_parent_cam).inverse().to_homogeneous();

        let image = self.backend.write().unwrap().render_camera(
            self.width,
            self.height,
            &view,
            &self.projection,
            self.use_segmentation,
        );

        // discard the alpha channel and normalize to [0, 1]
        let rgb: Vec<f32> = image
            .rgba
            .chunks_exact(4)
            .flat_map(|pixel| {
                [
                    pixel[0] as f32 / 255.,
                    pixel[1] as f32 / 255.,
                    pixel[2] as f32 / 255.,
                ]
            })
            .collect();

        let depth = self.use_depth.then(|| {
            image
                .depth_buffer
                .iter()
                .map(|&z| self.recover_depth(z) + self.depth_noise.gen())
                .collect()
        });

        let segmentation_mask = if self.use_segmentation {
            image.segmentation.clone()
        } else {
            None
        };

        Ok(Some(AddonObservation::Camera(CameraObservation {
            width: image.width,
            height: image.height,
            rgb,
            depth,
            segmentation_mask,
        })))
    }
}
