// SPDX-License-Identifier: GPL-3.0-only

//! Camera capability discovery
//!
//! [`V4l2Probe`] asks the kernel for sources and modes. Probing opens the
//! device and walks every format, so [`CapabilityCache`] keeps the results
//! per source id until the session moves to a different source.

use super::types::{CameraMode, CameraSource, SourceInfo};
use crate::constants::camera;
use crate::errors::{CameraError, CameraResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use v4l::Device;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::video::Capture;

/// Sizes offered for devices that report a stepwise range
const STEPWISE_SIZES: &[(u32, u32)] = &[(1920, 1080), (1280, 720), (640, 480), (320, 240)];

/// Source of camera capabilities
pub trait CapabilityProbe: Send + Sync {
    /// Cameras present on the system
    fn list_sources(&self) -> Vec<SourceInfo>;

    /// Supported modes of `source`, largest resolution first
    fn probe_modes(&self, source: &str) -> CameraResult<Vec<CameraMode>>;
}

/// Probe backed by `/dev/video*` and V4L2 enumeration ioctls
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Probe;

impl V4l2Probe {
    fn device_name(node: &str, path: &str) -> String {
        std::fs::read_to_string(format!("{}/{}/name", camera::SYSFS_VIDEO4LINUX, node))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                Device::with_path(path)
                    .ok()
                    .and_then(|dev| dev.query_caps().ok())
                    .map(|caps| caps.card)
            })
            .unwrap_or_else(|| node.to_string())
    }
}

impl CapabilityProbe for V4l2Probe {
    fn list_sources(&self) -> Vec<SourceInfo> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            warn!("Cannot read /dev");
            return Vec::new();
        };

        let mut nodes: Vec<(u32, String)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let index = name.strip_prefix("video")?.parse::<u32>().ok()?;
                Some((index, name))
            })
            .collect();
        nodes.sort();

        nodes
            .into_iter()
            .map(|(_, node)| {
                let path = format!("/dev/{}", node);
                let name = Self::device_name(&node, &path);
                SourceInfo {
                    label: format!("{} ({})", name, path),
                    id: path,
                }
            })
            .collect()
    }

    fn probe_modes(&self, source: &str) -> CameraResult<Vec<CameraMode>> {
        let path = CameraSource::new(source).device_path();
        let dev = Device::with_path(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CameraError::NotFound(path.clone()),
            _ => CameraError::Probe(format!("{}: {}", path, e)),
        })?;
        let formats = dev
            .enum_formats()
            .map_err(|e| CameraError::Probe(format!("{}: {}", path, e)))?;

        let mut rates: BTreeMap<(u32, u32), Vec<u32>> = BTreeMap::new();
        for format in formats {
            let Ok(sizes) = dev.enum_framesizes(format.fourcc) else {
                continue;
            };
            for size in sizes {
                let dims: Vec<(u32, u32)> = match size.size {
                    FrameSizeEnum::Discrete(d) => vec![(d.width, d.height)],
                    FrameSizeEnum::Stepwise(s) => STEPWISE_SIZES
                        .iter()
                        .copied()
                        .filter(|&(w, h)| {
                            (s.min_width..=s.max_width).contains(&w)
                                && (s.min_height..=s.max_height).contains(&h)
                        })
                        .collect(),
                };
                for (w, h) in dims {
                    let fps = rates.entry((w, h)).or_default();
                    match dev.enum_frameintervals(format.fourcc, w, h) {
                        Ok(intervals) => {
                            for interval in intervals {
                                if let FrameIntervalEnum::Discrete(frac) = interval.interval
                                    && frac.numerator > 0
                                {
                                    fps.push(frac.denominator / frac.numerator);
                                }
                            }
                        }
                        Err(e) => debug!(path, width = w, height = h, error = %e, "No frame intervals"),
                    }
                }
            }
        }

        let modes = collect_modes(rates);
        info!(path, count = modes.len(), "Probed camera modes");
        Ok(modes)
    }
}

/// Turn raw (size → rates) data into sorted, deduplicated modes
///
/// Sizes without any reported rate get [`camera::COMMON_FRAMERATES`]. An empty
/// result becomes the single fallback mode.
pub fn collect_modes(rates: BTreeMap<(u32, u32), Vec<u32>>) -> Vec<CameraMode> {
    let mut modes: Vec<CameraMode> = rates
        .into_iter()
        .map(|((width, height), mut fps)| {
            fps.retain(|&r| r > 0);
            if fps.is_empty() {
                fps = camera::COMMON_FRAMERATES.to_vec();
            }
            fps.sort_unstable_by(|a, b| b.cmp(a));
            fps.dedup();
            CameraMode { width, height, fps }
        })
        .collect();
    modes.sort_by(|a, b| (b.width, b.height).cmp(&(a.width, a.height)));

    if modes.is_empty() {
        let (width, height, fps) = camera::FALLBACK_MODE;
        modes.push(CameraMode {
            width,
            height,
            fps: vec![fps],
        });
    }
    modes
}

/// Per-source cache in front of a [`CapabilityProbe`]
pub struct CapabilityCache {
    probe: Arc<dyn CapabilityProbe>,
    modes: Mutex<HashMap<String, Vec<CameraMode>>>,
}

impl CapabilityCache {
    pub fn new(probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            probe,
            modes: Mutex::new(HashMap::new()),
        }
    }

    /// Not cached; devices come and go
    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.probe.list_sources()
    }

    /// Modes of `source`; an index and its device path share one entry
    pub fn get_modes(&self, source: &str) -> CameraResult<Vec<CameraMode>> {
        let key = CameraSource::new(source).device_path();
        if let Some(modes) = self.modes.lock().get(&key) {
            return Ok(modes.clone());
        }
        // Probe without holding the lock
        let modes = self.probe.probe_modes(&key)?;
        self.modes.lock().insert(key, modes.clone());
        Ok(modes)
    }

    pub fn invalidate(&self, source: &str) {
        let key = CameraSource::new(source).device_path();
        if self.modes.lock().remove(&key).is_some() {
            debug!(source = %key, "Dropped cached camera modes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl CapabilityProbe for Counting {
        fn list_sources(&self) -> Vec<SourceInfo> {
            Vec::new()
        }

        fn probe_modes(&self, _source: &str) -> CameraResult<Vec<CameraMode>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(collect_modes(BTreeMap::new()))
        }
    }

    #[test]
    fn test_collect_modes_sorts_and_dedups() {
        let mut rates = BTreeMap::new();
        rates.insert((640, 480), vec![15, 30, 30]);
        rates.insert((1280, 720), vec![]);
        let modes = collect_modes(rates);
        assert_eq!(modes[0].width, 1280);
        assert_eq!(modes[0].fps, vec![60, 30, 24, 15]);
        assert_eq!(modes[1].fps, vec![30, 15]);
    }

    #[test]
    fn test_collect_modes_fallback() {
        let modes = collect_modes(BTreeMap::new());
        assert_eq!(
            modes,
            vec![CameraMode {
                width: 640,
                height: 480,
                fps: vec![30]
            }]
        );
    }

    #[test]
    fn test_cache_probes_once_until_invalidated() {
        let probe = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = CapabilityCache::new(probe.clone());
        cache.get_modes("0").unwrap();
        cache.get_modes("0").unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);
        cache.invalidate("0");
        cache.get_modes("0").unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_index_and_path_share_entry() {
        let probe = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = CapabilityCache::new(probe.clone());
        cache.get_modes("0").unwrap();
        cache.get_modes("/dev/video0").unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);

        cache.invalidate("/dev/video0");
        cache.get_modes("0").unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 2);
    }
}
