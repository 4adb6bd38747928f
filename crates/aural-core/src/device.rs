//! Device and host-API enumeration
//!
//! Enumerates devices from ALL available audio hosts (ALSA, PulseAudio,
//! JACK, WASAPI, ...) so callers get full control over device selection.
//! Device indices are global across hosts and stable for one enumeration
//! pass: hosts in `cpal::available_hosts()` order, devices in each host's
//! own order.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId, SupportedBufferSize};

use crate::error::{AudioError, AudioResult};
use crate::types::{DeviceId, DEFAULT_FRAMES_PER_BUFFER};

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    // Use the debug representation which gives us the variant name
    let name = format!("{:?}", host_id);
    // Capitalize common names for better display
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name || format!("{:?}", host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// Information about one audio device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name as reported by the system
    pub name: String,
    /// Index into [`host_apis`] for the host this device belongs to
    pub host_api: usize,
    /// Maximum input (capture) channels
    pub max_input_channels: u16,
    /// Maximum output (playback) channels
    pub max_output_channels: u16,
    /// Lowest achievable input latency in seconds
    pub default_low_input_latency: f64,
    /// Lowest achievable output latency in seconds
    pub default_low_output_latency: f64,
    /// Highest configurable input latency in seconds
    pub default_high_input_latency: f64,
    /// Highest configurable output latency in seconds
    pub default_high_output_latency: f64,
    /// Default sample rate in Hz
    pub default_sample_rate: f64,
    /// Whether this is the default input device for its host
    pub is_default_input: bool,
    /// Whether this is the default output device for its host
    pub is_default_output: bool,
}

impl DeviceInfo {
    /// Identifier usable for stream device selection
    pub fn id(&self, hosts: &[HostApiInfo]) -> DeviceId {
        match hosts.get(self.host_api) {
            Some(host) => DeviceId::with_host(&self.name, &host.id),
            None => DeviceId::new(self.name.clone()),
        }
    }
}

/// Information about one host API
#[derive(Debug, Clone)]
pub struct HostApiInfo {
    /// Well-known host identifier (cpal's variant name, e.g. "Alsa")
    pub id: String,
    /// Display name, e.g. "ALSA"
    pub name: String,
    /// Number of devices belonging to this host
    pub device_count: usize,
    /// Global device index of this host's default input device
    pub default_input_device: Option<usize>,
    /// Global device index of this host's default output device
    pub default_output_device: Option<usize>,
}

pub(crate) struct Enumeration {
    pub hosts: Vec<HostApiInfo>,
    pub devices: Vec<DeviceInfo>,
}

/// Latency bounds in seconds derived from a config's buffer-size range
fn latency_bounds(buffer_size: &SupportedBufferSize, sample_rate: f64) -> (f64, f64) {
    match buffer_size {
        SupportedBufferSize::Range { min, max } => {
            (*min as f64 / sample_rate, *max as f64 / sample_rate)
        }
        SupportedBufferSize::Unknown => {
            let default = DEFAULT_FRAMES_PER_BUFFER as f64 / sample_rate;
            (default, default)
        }
    }
}

/// One full enumeration pass over every host
pub(crate) fn enumerate() -> AudioResult<Enumeration> {
    let mut hosts: Vec<HostApiInfo> = Vec::new();
    let mut devices: Vec<DeviceInfo> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_index = hosts.len();
        let default_input_name = host
            .default_input_device()
            .and_then(|d: cpal::Device| d.name().ok());
        let default_output_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices_iter = match host.devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        let mut host_default_input = None;
        let mut host_default_output = None;
        let mut device_count = 0usize;

        for device in devices_iter {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };

            let mut max_input_channels: u16 = 0;
            let mut input_low = 0.0;
            let mut input_high = 0.0;
            let default_input_rate = device
                .default_input_config()
                .map(|c| c.sample_rate().0 as f64)
                .unwrap_or(0.0);
            if let Ok(configs) = device.supported_input_configs() {
                for config in configs {
                    max_input_channels = max_input_channels.max(config.channels());
                    if input_low == 0.0 && default_input_rate > 0.0 {
                        let (low, high) =
                            latency_bounds(config.buffer_size(), default_input_rate);
                        input_low = low;
                        input_high = high;
                    }
                }
            }

            let mut max_output_channels: u16 = 0;
            let mut output_low = 0.0;
            let mut output_high = 0.0;
            let default_output_rate = device
                .default_output_config()
                .map(|c| c.sample_rate().0 as f64)
                .unwrap_or(0.0);
            if let Ok(configs) = device.supported_output_configs() {
                for config in configs {
                    max_output_channels = max_output_channels.max(config.channels());
                    if output_low == 0.0 && default_output_rate > 0.0 {
                        let (low, high) =
                            latency_bounds(config.buffer_size(), default_output_rate);
                        output_low = low;
                        output_high = high;
                    }
                }
            }

            if max_input_channels == 0 && max_output_channels == 0 {
                continue;
            }

            let is_default_input = default_input_name.as_ref() == Some(&name);
            let is_default_output = default_output_name.as_ref() == Some(&name);
            let global_index = devices.len();
            if is_default_input {
                host_default_input.get_or_insert(global_index);
            }
            if is_default_output {
                host_default_output.get_or_insert(global_index);
            }

            devices.push(DeviceInfo {
                name,
                host_api: host_index,
                max_input_channels,
                max_output_channels,
                default_low_input_latency: input_low,
                default_low_output_latency: output_low,
                default_high_input_latency: input_high,
                default_high_output_latency: output_high,
                default_sample_rate: if default_output_rate > 0.0 {
                    default_output_rate
                } else {
                    default_input_rate
                },
                is_default_input,
                is_default_output,
            });
            device_count += 1;
        }

        hosts.push(HostApiInfo {
            id: format!("{:?}", host_id),
            name: host_name(host_id),
            device_count,
            default_input_device: host_default_input,
            default_output_device: host_default_output,
        });
    }

    log::info!(
        "Enumerated {} audio devices from {} hosts",
        devices.len(),
        hosts.len()
    );

    Ok(Enumeration { hosts, devices })
}

/// Get all available audio devices from ALL hosts
pub fn get_devices() -> AudioResult<Vec<DeviceInfo>> {
    let enumeration = enumerate()?;
    if enumeration.devices.is_empty() {
        return Err(AudioError::NoDevices);
    }
    Ok(enumeration.devices)
}

/// Get all available host APIs
pub fn get_host_apis() -> AudioResult<Vec<HostApiInfo>> {
    Ok(enumerate()?.hosts)
}

/// Global index of the default input device of the default host
pub fn default_input_device() -> AudioResult<Option<usize>> {
    Ok(enumerate()?
        .devices
        .iter()
        .position(|d| d.is_default_input))
}

/// Global index of the default output device of the default host
pub fn default_output_device() -> AudioResult<Option<usize>> {
    Ok(enumerate()?
        .devices
        .iter()
        .position(|d| d.is_default_output))
}

/// Direction of a device lookup
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Input,
    Output,
}

/// Find a cpal device by its ID
///
/// Uses the host specified in the DeviceId if available, otherwise
/// searches all available hosts.
pub(crate) fn find_device(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches_direction = |d: &cpal::Device| {
        let has_configs = match direction {
            Direction::Input => d.supported_input_configs().map(|mut c| c.next().is_some()),
            Direction::Output => d.supported_output_configs().map(|mut c| c.next().is_some()),
        };
        has_configs.unwrap_or(false)
    };

    if let Some(ref host_name) = id.host {
        if let Some(host) = get_host_by_name(host_name) {
            return host
                .devices()
                .map_err(|e| AudioError::Engine(e.to_string()))?
                .find(|d: &cpal::Device| {
                    d.name().ok().as_ref() == Some(&id.name) && matches_direction(d)
                })
                .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
        }
    }

    for host_id in cpal::available_hosts() {
        if let Ok(host) = cpal::host_from_id(host_id) {
            if let Ok(mut devices) = host.devices() {
                if let Some(device) = devices.find(|d: &cpal::Device| {
                    d.name().ok().as_ref() == Some(&id.name) && matches_direction(d)
                }) {
                    return Ok(device);
                }
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// The default cpal input device of the default host
pub(crate) fn default_cpal_input_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default input device".to_string()))
}

/// The default cpal output device of the default host
pub(crate) fn default_cpal_output_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // This test may find nothing if no audio devices are available
        match enumerate() {
            Ok(enumeration) => {
                println!(
                    "Found {} devices across {} hosts:",
                    enumeration.devices.len(),
                    enumeration.hosts.len()
                );
                for host in &enumeration.hosts {
                    println!(
                        "  host {} ({} devices, default out: {:?})",
                        host.name, host.device_count, host.default_output_device
                    );
                }
                for device in &enumeration.devices {
                    println!(
                        "  - {} (in: {}, out: {}, rate: {}, out latency: {:.4}..{:.4})",
                        device.name,
                        device.max_input_channels,
                        device.max_output_channels,
                        device.default_sample_rate,
                        device.default_low_output_latency,
                        device.default_high_output_latency,
                    );
                }
                let count: usize = enumeration.hosts.iter().map(|h| h.device_count).sum();
                assert_eq!(count, enumeration.devices.len());
            }
            Err(e) => {
                println!("Error enumerating devices: {}", e);
            }
        }
    }
}
