use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use verba_foundation::error::AudioError;
use verba_foundation::resolve::resolve_name;
use verba_vad::frame_duration_for_chunk;

/// Chunk sizes (in frames) the capture stream may be opened with.
pub const VALID_CHUNK_SIZES: [usize; 8] = [160, 320, 480, 640, 800, 960, 1024, 1280];

/// Target rate every downstream consumer sees.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Input,
    Output,
}

/// A probed device, detached from any live cpal handle so it can be listed,
/// persisted, and compared.
#[derive(Debug, Clone)]
pub struct AudioDeviceSpec {
    pub host_api: String,
    pub name: String,
    pub index: usize,
    pub kind: DeviceKind,
    pub default_sample_rate: u32,
    pub max_channels: u16,
    /// Output devices are captured through their loopback/monitor source.
    pub loopback: bool,
    pub is_default: bool,
}

/// Requested capture parameters before negotiation. `None` means "auto".
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub chunk_size: Option<usize>,
}

/// Negotiated capture parameters for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
    /// Largest of {10,20,30} ms fitting into one chunk; the VAD sub-frame.
    pub frame_duration_ms: u32,
}

pub struct DeviceProbe {
    host: Host,
}

impl DeviceProbe {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            host: cpal::default_host(),
        })
    }

    pub fn with_host_api(name: &str) -> Result<Self, AudioError> {
        let ids = cpal::available_hosts();
        let names: Vec<&str> = ids.iter().map(|id| id.name()).collect();
        let resolution =
            resolve_name(name, &names).ok_or_else(|| AudioError::DeviceNotFound {
                name: Some(format!("host api '{}'", name)),
            })?;
        let host = cpal::host_from_id(ids[resolution.index]).map_err(|e| {
            AudioError::DeviceOpenFailed {
                name: Some(name.to_string()),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { host })
    }

    pub fn list_host_apis() -> Vec<String> {
        cpal::available_hosts()
            .iter()
            .map(|id| id.name().to_string())
            .collect()
    }

    pub fn default_host_api() -> String {
        cpal::default_host().id().name().to_string()
    }

    pub fn host_api_name(&self) -> String {
        self.host.id().name().to_string()
    }

    pub fn list_inputs(&self) -> Vec<AudioDeviceSpec> {
        let default_name = self.default_input_name();
        let mut specs = Vec::new();
        if let Ok(devices) = self.host.input_devices() {
            for (index, device) in devices.enumerate() {
                if let Some(mut spec) = self.describe(&device, index, DeviceKind::Input) {
                    spec.is_default = Some(&spec.name) == default_name.as_ref();
                    specs.push(spec);
                }
            }
        }
        specs
    }

    /// Output devices, flagged for loopback capture. Opening one captures
    /// the device's monitor source where the platform provides it.
    pub fn list_outputs(&self) -> Vec<AudioDeviceSpec> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());
        let mut specs = Vec::new();
        if let Ok(devices) = self.host.output_devices() {
            for (index, device) in devices.enumerate() {
                if let Some(mut spec) = self.describe(&device, index, DeviceKind::Output) {
                    spec.loopback = true;
                    spec.is_default = Some(&spec.name) == default_name.as_ref();
                    specs.push(spec);
                }
            }
        }
        specs
    }

    pub fn default_input(&self) -> Result<AudioDeviceSpec, AudioError> {
        let device = self
            .host
            .default_input_device()
            .ok_or(AudioError::DeviceNotFound { name: None })?;
        self.describe(&device, 0, DeviceKind::Input)
            .map(|mut spec| {
                spec.is_default = true;
                spec
            })
            .ok_or(AudioError::DeviceNotFound { name: None })
    }

    pub fn default_output(&self) -> Result<AudioDeviceSpec, AudioError> {
        let device = self
            .host
            .default_output_device()
            .ok_or(AudioError::DeviceNotFound { name: None })?;
        self.describe(&device, 0, DeviceKind::Output)
            .map(|mut spec| {
                spec.loopback = true;
                spec.is_default = true;
                spec
            })
            .ok_or(AudioError::DeviceNotFound { name: None })
    }

    /// Resolve a user-provided device name against the probed list.
    /// Exact match wins, then substring, then Jaro-Winkler at 0.6+.
    pub fn resolve(&self, name: &str, kind: DeviceKind) -> Result<AudioDeviceSpec, AudioError> {
        let specs = match kind {
            DeviceKind::Input => self.list_inputs(),
            DeviceKind::Output => self.list_outputs(),
        };
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        let resolution = resolve_name(name, &names).ok_or_else(|| AudioError::DeviceNotFound {
            name: Some(name.to_string()),
        })?;
        if resolution.score < 1.0 {
            tracing::warn!(
                "Device '{}' not found exactly; using closest match '{}' (score {:.2})",
                name,
                specs[resolution.index].name,
                resolution.score
            );
        }
        Ok(specs[resolution.index].clone())
    }

    /// Open a cpal handle for a previously probed spec. For loopback
    /// specs this looks for the platform's monitor source of the output;
    /// hosts without one yield `DeviceUnsupported`.
    pub fn open(&self, spec: &AudioDeviceSpec) -> Result<Device, AudioError> {
        if spec.loopback {
            return self.open_loopback(spec);
        }
        self.find_input_by_name(&spec.name)
            .ok_or_else(|| AudioError::DeviceNotFound {
                name: Some(spec.name.clone()),
            })
    }

    fn open_loopback(&self, spec: &AudioDeviceSpec) -> Result<Device, AudioError> {
        // PipeWire/Pulse expose "<sink>.monitor" or "Monitor of <sink>"
        // capture sources for every output.
        let lowered = spec.name.to_lowercase();
        if let Ok(devices) = self.host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    let ln = name.to_lowercase();
                    let is_monitor = ln.contains("monitor");
                    let matches_sink = ln.contains(&lowered)
                        || lowered.contains(ln.trim_end_matches(".monitor"));
                    if is_monitor && matches_sink {
                        return Ok(device);
                    }
                }
            }
        }
        Err(AudioError::DeviceUnsupported {
            reason: format!(
                "no loopback/monitor source available for output '{}' on host {}",
                spec.name,
                self.host_api_name()
            ),
        })
    }

    /// Negotiate stream parameters against device capabilities.
    pub fn negotiate(
        &self,
        spec: &AudioDeviceSpec,
        request: &StreamRequest,
    ) -> Result<StreamParams, AudioError> {
        let sample_rate = match request.sample_rate {
            None => spec.default_sample_rate,
            // User value clipped to device capability range
            Some(requested) => {
                let device = self.open(spec)?;
                clip_sample_rate(&device, requested)
            }
        };

        let channels = match request.channels {
            None => spec.max_channels.min(2).max(1),
            Some(c) => c.clamp(1, spec.max_channels.max(1)).min(2),
        };

        let chunk_size = match request.chunk_size {
            None => 1024,
            Some(requested) => {
                if !VALID_CHUNK_SIZES.contains(&requested) {
                    return Err(AudioError::FormatNotSupported {
                        format: format!(
                            "chunk size {} not in {:?}",
                            requested, VALID_CHUNK_SIZES
                        ),
                    });
                }
                requested
            }
        };

        Ok(StreamParams {
            sample_rate,
            channels,
            chunk_size,
            frame_duration_ms: frame_duration_for_chunk(chunk_size, sample_rate),
        })
    }

    fn describe(
        &self,
        device: &Device,
        index: usize,
        kind: DeviceKind,
    ) -> Option<AudioDeviceSpec> {
        let name = device.name().ok()?;
        let (default_sample_rate, max_channels) = match kind {
            DeviceKind::Input => {
                let cfg = device.default_input_config().ok()?;
                let max_ch = device
                    .supported_input_configs()
                    .map(|cfgs| cfgs.map(|c| c.channels()).max().unwrap_or(1))
                    .unwrap_or(cfg.channels());
                (cfg.sample_rate().0, max_ch)
            }
            DeviceKind::Output => {
                let cfg = device.default_output_config().ok()?;
                (cfg.sample_rate().0, cfg.channels())
            }
        };
        Some(AudioDeviceSpec {
            host_api: self.host_api_name(),
            name,
            index,
            kind,
            default_sample_rate,
            max_channels,
            loopback: false,
            is_default: false,
        })
    }

    fn default_input_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    fn find_input_by_name(&self, name: &str) -> Option<Device> {
        if let Ok(devices) = self.host.input_devices() {
            for device in devices {
                if device.name().map(|n| n == name).unwrap_or(false) {
                    return Some(device);
                }
            }
        }
        None
    }
}

fn clip_sample_rate(device: &Device, requested: u32) -> u32 {
    let mut lo = u32::MAX;
    let mut hi = 0u32;
    if let Ok(configs) = device.supported_input_configs() {
        for cfg in configs {
            lo = lo.min(cfg.min_sample_rate().0);
            hi = hi.max(cfg.max_sample_rate().0);
        }
    }
    if hi == 0 {
        return requested;
    }
    requested.clamp(lo, hi)
}
