use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::MmapOptions;
use safetensors::{Dtype, SafeTensors};
use tch::{nn, Device, Kind, Tensor};

use crate::error::{CoreError, Result};

fn kind_of(name: &str, dtype: Dtype) -> Result<Kind> {
    match dtype {
        Dtype::F32 => Ok(Kind::Float),
        Dtype::F64 => Ok(Kind::Double),
        Dtype::F16 => Ok(Kind::Half),
        Dtype::BF16 => Ok(Kind::BFloat16),
        Dtype::I64 => Ok(Kind::Int64),
        Dtype::I32 => Ok(Kind::Int),
        Dtype::U8 => Ok(Kind::Uint8),
        other => Err(CoreError::UnsupportedDtype(format!("{:?}", other), name.to_string())),
    }
}

/// Reads every tensor of a safetensors file into memory on `device`.
pub fn read_tensors<P: AsRef<Path>>(path: P, device: Device) -> Result<HashMap<String, Tensor>> {
    let file = File::open(path)?;
    let buffer = unsafe { MmapOptions::new().map(&file)? };
    let tensors = SafeTensors::deserialize(&buffer)?;

    let mut out = HashMap::new();
    for (name, view) in tensors.tensors() {
        let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
        let kind = kind_of(&name, view.dtype())?;
        let tensor = Tensor::f_from_data_size(view.data(), &shape, kind)?.to_device(device);
        out.insert(name, tensor);
    }

    Ok(out)
}

/// Copies the tensors of a safetensors file into the matching variables of `vs`.
///
/// Returns the names found in the file that the store does not know about.
pub fn load_safetensors<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P) -> Result<Vec<String>> {
    let tensors = read_tensors(path, vs.device())?;
    let mut variables = vs.variables();
    let mut unknown = Vec::new();

    for (name, tensor) in tensors {
        let Some(var) = variables.get_mut(&name) else {
            unknown.push(name);
            continue;
        };
        if var.size() != tensor.size() {
            return Err(CoreError::ShapeMismatch {
                name,
                expected: var.size(),
                found: tensor.size(),
            });
        }
        tch::no_grad(|| var.f_copy_(&tensor.to_kind(var.kind())))?;
    }

    unknown.sort();
    Ok(unknown)
}
