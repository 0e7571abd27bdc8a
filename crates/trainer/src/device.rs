use tch::{Cuda, Device};

use crate::error::{Result, TrainError};

/// Parses a compute target name: `auto`, `cpu`, `cuda`, `cuda:N` or `mps`.
pub fn parse_device(name: &str) -> Result<Device> {
    let name = name.trim().to_ascii_lowercase();
    match name.as_str() {
        "auto" => Ok(Device::cuda_if_available()),
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::Cuda(0)),
        "mps" => Ok(Device::Mps),
        other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
            Some(Ok(index)) => Ok(Device::Cuda(index)),
            _ => Err(TrainError::DeviceUnavailable(other.to_string())),
        },
    }
}

/// Fails with a placement error when tensors cannot be moved to `device`.
pub fn ensure_available(device: Device) -> Result<()> {
    let available = match device {
        Device::Cpu => true,
        Device::Cuda(index) => (index as i64) < Cuda::device_count(),
        Device::Mps => tch::utils::has_mps(),
        _ => false,
    };

    if available {
        Ok(())
    } else {
        Err(TrainError::DeviceUnavailable(format!("{:?}", device)))
    }
}

/// Parses `name` and checks the result is present on this machine.
pub fn resolve(name: &str) -> Result<Device> {
    let device = parse_device(name)?;
    ensure_available(device)?;
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!(parse_device("cpu").unwrap(), Device::Cpu);
        assert_eq!(parse_device(" CUDA:1 ").unwrap(), Device::Cuda(1));
        assert_eq!(parse_device("cuda").unwrap(), Device::Cuda(0));
        assert_eq!(parse_device("mps").unwrap(), Device::Mps);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(matches!(parse_device("tpu"), Err(TrainError::DeviceUnavailable(_))));
        assert!(matches!(parse_device("cuda:x"), Err(TrainError::DeviceUnavailable(_))));
    }

    #[test]
    fn cpu_is_always_available() {
        assert!(ensure_available(Device::Cpu).is_ok());
    }

    #[test]
    fn resolve_rejects_absent_targets() {
        assert_eq!(resolve("cpu").unwrap(), Device::Cpu);
        assert!(matches!(resolve("cuda:4096"), Err(TrainError::DeviceUnavailable(_))));
    }

    #[test]
    fn missing_gpu_is_a_placement_error() {
        let err = ensure_available(Device::Cuda(4096)).unwrap_err();
        assert!(matches!(err, TrainError::DeviceUnavailable(_)));
    }
}
