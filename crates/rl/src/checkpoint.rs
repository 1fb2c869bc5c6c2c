//! Binary checkpoints of a policy/value pair.
//!
//! Layout: the 8-byte magic, a little-endian `u64` header length, a JSON
//! [`CheckpointHeader`], then every tensor's `f32` data little-endian in the
//! order the header lists them.

use crate::config::TrainConfig;
use crate::error::CheckpointError;
use crate::policy::{PolicyArch, PolicyNet};
use crate::value::{NetArch, ValueNet};
use ml::{Module, Tensor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_VERSION: u32 = 1;
const MAGIC: &[u8; 8] = b"PPOCKPT\0";
const PREFIX_LEN: usize = MAGIC.len() + 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorEntry {
    pub name: String,
    pub shape: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub version: u32,
    pub env: String,
    pub policy: PolicyArch,
    pub value: NetArch,
    pub hyperparameters: TrainConfig,
    pub tensors: Vec<TensorEntry>,
}

/// A loaded checkpoint.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub header: CheckpointHeader,
    pub policy: PolicyNet,
    pub value: ValueNet,
}

/// `{assets_dir}/learned_models/{env}_ppo.ckpt`
pub fn model_path(assets_dir: &Path, env: &str) -> PathBuf {
    assets_dir.join("learned_models").join(format!("{env}_ppo.ckpt"))
}

fn entries(prefix: &str, params: &[&Tensor]) -> Vec<TensorEntry> {
    params
        .iter()
        .enumerate()
        .map(|(i, t)| TensorEntry { name: format!("{prefix}.{i}"), shape: t.shape.clone() })
        .collect()
}

/// Writes both networks to `path` through a sibling temp file and a rename.
pub fn save(path: &Path, config: &TrainConfig, policy: &PolicyNet, value: &ValueNet) -> Result<(), CheckpointError> {
    let policy_params = policy.params();
    let value_params = value.params();
    let mut tensors = entries("policy", &policy_params);
    tensors.extend(entries("value", &value_params));

    let header = CheckpointHeader {
        version: CHECKPOINT_VERSION,
        env: config.env.clone(),
        policy: policy.arch(),
        value: value.arch(),
        hyperparameters: config.clone(),
        tensors,
    };
    let header_bytes = serde_json::to_vec(&header)?;

    let words: Vec<u32> = policy_params
        .iter()
        .chain(&value_params)
        .flat_map(|t| t.data.iter().map(|v| v.to_bits().to_le()))
        .collect();

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("ckpt.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(MAGIC)?;
        file.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
        file.write_all(&header_bytes)?;
        file.write_all(bytemuck::cast_slice(&words))?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    tracing::info!(path = %path.display(), tensors = header.tensors.len(), "checkpoint saved");
    Ok(())
}

fn malformed(msg: impl Into<String>) -> CheckpointError {
    CheckpointError::Malformed(msg.into())
}

/// Reads a checkpoint written by [`save`] and rebuilds both networks.
pub fn load(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let bytes = fs::read(path)?;
    if bytes.len() < PREFIX_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(malformed("missing checkpoint magic"));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[MAGIC.len()..PREFIX_LEN]);
    let header_len = usize::try_from(u64::from_le_bytes(len_bytes)).map_err(|_| malformed("header length overflows"))?;
    let header_end = PREFIX_LEN
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| malformed("header runs past end of file"))?;

    let header: CheckpointHeader = serde_json::from_slice(&bytes[PREFIX_LEN..header_end])?;
    if header.version != CHECKPOINT_VERSION {
        return Err(malformed(format!(
            "version {} is not supported (expected {CHECKPOINT_VERSION})",
            header.version
        )));
    }

    // weights are overwritten below, the seed only fills the layers
    let mut rng = fastrand::Rng::with_seed(0);
    let mut policy = PolicyNet::from_arch(&header.policy, &mut rng).map_err(|e| malformed(e.to_string()))?;
    let mut value = ValueNet::from_arch(&header.value, &mut rng).map_err(|e| malformed(e.to_string()))?;

    let payload = &bytes[header_end..];
    if payload.len() % 4 != 0 {
        return Err(malformed("payload is not a whole number of f32 values"));
    }
    let words: Vec<u32> = bytemuck::pod_collect_to_vec(payload);
    let mut values = words.into_iter().map(|w| f32::from_bits(u32::from_le(w)));

    {
        let mut params = policy.params_mut();
        params.extend(value.params_mut());
        if params.len() != header.tensors.len() {
            return Err(malformed(format!(
                "header lists {} tensors, architecture has {}",
                header.tensors.len(),
                params.len()
            )));
        }
        for (param, entry) in params.into_iter().zip(&header.tensors) {
            if param.shape != entry.shape {
                return Err(malformed(format!(
                    "tensor {} has shape {:?}, architecture expects {:?}",
                    entry.name, entry.shape, param.shape
                )));
            }
            for slot in &mut param.data {
                *slot = values.next().ok_or_else(|| malformed("payload is truncated"))?;
            }
        }
    }
    if values.next().is_some() {
        return Err(malformed("payload has trailing data"));
    }

    tracing::info!(path = %path.display(), env = %header.env, "checkpoint loaded");
    Ok(Checkpoint { header, policy, value })
}
