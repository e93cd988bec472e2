//! Camera source with synthetic and V4L2 backends.
//!
//! `stub://` devices select the synthetic backend, which renders a
//! deterministic scene that changes occasionally - enough to exercise the
//! motion signal without hardware. Anything else is treated as a V4L2
//! device node and requires the `capture-v4l2` feature.

use log::info;

use super::{FrameSource, SourceError};
use crate::config::CaptureSettings;
use crate::frame::Frame;

/// Frames between synthetic scene changes.
const SYNTHETIC_SCENE_PERIOD: u64 = 50;

/// Capture counters for health logging.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Camera frame source.
#[derive(Debug)]
pub struct CameraSource {
    backend: Backend,
}

#[derive(Debug)]
enum Backend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "capture-v4l2")]
    Device(v4l2::DeviceCamera),
}

impl CameraSource {
    /// Open the configured device.
    ///
    /// The target resolution and frame rate are applied best-effort;
    /// refusals are logged and the device's active format is used instead.
    /// A device that cannot be opened at all is `DeviceUnavailable`.
    pub fn open(settings: &CaptureSettings) -> Result<Self, SourceError> {
        if settings.device.starts_with("stub://") {
            info!("camera source: {} (synthetic)", settings.device);
            return Ok(Self {
                backend: Backend::Synthetic(SyntheticCamera::new(settings.clone())),
            });
        }
        Self::open_device(settings)
    }

    #[cfg(feature = "capture-v4l2")]
    fn open_device(settings: &CaptureSettings) -> Result<Self, SourceError> {
        let device = v4l2::DeviceCamera::open(settings)?;
        Ok(Self {
            backend: Backend::Device(device),
        })
    }

    #[cfg(not(feature = "capture-v4l2"))]
    fn open_device(settings: &CaptureSettings) -> Result<Self, SourceError> {
        Err(SourceError::DeviceUnavailable(format!(
            "{}: built without capture-v4l2 support",
            settings.device
        )))
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Frame, SourceError> {
        match &mut self.backend {
            Backend::Synthetic(camera) => camera.read_frame(),
            #[cfg(feature = "capture-v4l2")]
            Backend::Device(camera) => camera.read_frame(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            Backend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "capture-v4l2")]
            Backend::Device(camera) => camera.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SyntheticCamera {
    settings: CaptureSettings,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
        }
    }

    /// Render the current scene: seeded noise so consecutive frames are
    /// identical within a scene period, plus a block that moves when the
    /// scene changes.
    fn read_frame(&mut self) -> Result<Frame, SourceError> {
        self.frame_count += 1;
        let scene = self.frame_count / SYNTHETIC_SCENE_PERIOD;

        let width = self.settings.width;
        let height = self.settings.height;
        let mut frame = Frame::noise(width, height, [128, 128, 128], 6, scene);

        let block_w = width / 8;
        let block_h = height / 8;
        let x = ((scene as u32).wrapping_mul(37)) % width.saturating_sub(block_w).max(1);
        let y = ((scene as u32).wrapping_mul(53)) % height.saturating_sub(block_h).max(1);
        frame.fill_rect(x, y, block_w, block_h, [235, 235, 235]);

        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.settings.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 device camera
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-v4l2")]
mod v4l2 {
    use log::{info, warn};
    use ouroboros::self_referencing;

    use super::SourceStats;
    use crate::config::CaptureSettings;
    use crate::frame::Frame;
    use crate::source::SourceError;

    pub(super) struct DeviceCamera {
        settings: CaptureSettings,
        state: DeviceState,
        frame_count: u64,
        active_width: u32,
        active_height: u32,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn open(settings: &CaptureSettings) -> Result<Self, SourceError> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&settings.device).map_err(|err| {
                SourceError::DeviceUnavailable(format!("{}: {}", settings.device, err))
            })?;

            let mut format = device.format().map_err(|err| {
                SourceError::DeviceUnavailable(format!(
                    "{}: read format: {}",
                    settings.device, err
                ))
            })?;
            format.width = settings.width;
            format.height = settings.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            // Resolution and frame rate are best-effort.
            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    warn!("failed to set format on {}: {}", settings.device, err);
                    device.format().map_err(|err| {
                        SourceError::DeviceUnavailable(format!(
                            "{}: read format after set failure: {}",
                            settings.device, err
                        ))
                    })?
                }
            };
            if settings.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
                if let Err(err) = device.set_params(&params) {
                    warn!("failed to set fps on {}: {}", settings.device, err);
                }
            }

            let active_width = format.width;
            let active_height = format.height;

            let state = DeviceStateTryBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4).map_err(
                        |err| {
                            SourceError::DeviceUnavailable(format!(
                                "create buffer stream: {}",
                                err
                            ))
                        },
                    )
                },
            }
            .try_build()?;

            info!(
                "camera source: {} ({}x{})",
                settings.device, active_width, active_height
            );

            Ok(Self {
                settings: settings.clone(),
                state,
                frame_count: 0,
                active_width,
                active_height,
            })
        }

        pub(super) fn read_frame(&mut self) -> Result<Frame, SourceError> {
            use v4l::io::traits::CaptureStream;

            let (buf, _meta) = self
                .state
                .with_mut(|fields| fields.stream.next())
                .map_err(|err| SourceError::Capture(err.to_string()))?;

            self.frame_count += 1;
            Ok(Frame::new(
                self.active_width,
                self.active_height,
                buf.to_vec(),
            ))
        }

        pub(super) fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.frame_count,
                device: self.settings.device.clone(),
            }
        }
    }

    // Dropping DeviceState tears down the mmap stream before the device
    // handle, releasing /dev/videoN on every exit path.
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureSettings;

    fn stub_settings() -> CaptureSettings {
        CaptureSettings {
            device: "stub://test".to_string(),
            width: 64,
            height: 48,
            target_fps: 30,
        }
    }

    #[test]
    fn stub_source_produces_configured_dimensions() {
        let mut source = CameraSource::open(&stub_settings()).unwrap();
        let frame = source.read_frame().unwrap();
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn stub_source_counts_frames() {
        let mut source = CameraSource::open(&stub_settings()).unwrap();
        for _ in 0..3 {
            source.read_frame().unwrap();
        }
        let stats = source.stats();
        assert_eq!(stats.frames_captured, 3);
        assert_eq!(stats.device, "stub://test");
    }

    #[test]
    fn stub_scene_is_static_within_a_period() {
        let mut source = CameraSource::open(&stub_settings()).unwrap();
        let a = source.read_frame().unwrap();
        let b = source.read_frame().unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn device_path_requires_v4l2_feature() {
        let settings = CaptureSettings {
            device: "/dev/video0".to_string(),
            ..stub_settings()
        };
        let err = CameraSource::open(&settings).unwrap_err();
        assert!(matches!(err, SourceError::DeviceUnavailable(_)));
    }
}
