use ndarray::{Array, Ix4};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

/// Configured normalization policy.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Inspect the model at load time; normalize unless it rescales itself.
    #[default]
    Auto,
    /// Always scale to [0, 1].
    Unit,
    /// Always pass raw 0-255 values.
    Raw,
}

/// Value range a loaded model expects, fixed once at load time.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputScale {
    Unit,
    Raw,
}

impl InputScale {
    pub fn apply(&self, raw: &Array<f32, Ix4>) -> Array<f32, Ix4> {
        match self {
            InputScale::Unit => raw / 255.0,
            InputScale::Raw => raw.clone(),
        }
    }

    pub fn alternate(&self) -> InputScale {
        match self {
            InputScale::Unit => InputScale::Raw,
            InputScale::Raw => InputScale::Unit,
        }
    }
}

// Keras exports keep the layer name in node names (`sequential/rescaling/mul`).
const RESCALING_MARKERS: [&[u8]; 2] = [b"rescaling", b"Rescaling"];

const SCAN_CHUNK_BYTES: usize = 64 * 1024;

/// Scans `reader` chunk by chunk, carrying the tail of each chunk over so a
/// marker split across two reads is still found.
fn contains_marker<R: Read>(mut reader: R, chunk_size: usize) -> std::io::Result<bool> {
    let overlap = RESCALING_MARKERS
        .iter()
        .map(|marker| marker.len())
        .max()
        .unwrap_or(0)
        .saturating_sub(1);
    let mut buffer = vec![0u8; chunk_size.max(1) + overlap];
    let mut carried = 0;

    loop {
        let read = reader.read(&mut buffer[carried..])?;
        if read == 0 {
            return Ok(false);
        }
        let filled = carried + read;
        let window = &buffer[..filled];
        if RESCALING_MARKERS
            .iter()
            .any(|marker| window.windows(marker.len()).any(|w| w == *marker))
        {
            return Ok(true);
        }

        carried = overlap.min(filled);
        buffer.copy_within(filled - carried..filled, 0);
    }
}

/// Looks for an in-graph rescaling step in a model file. `None` when the
/// file cannot be read.
pub fn detect_rescaling(model_path: &Path) -> Option<bool> {
    let scan = File::open(model_path)
        .and_then(|file| contains_marker(BufReader::new(file), SCAN_CHUNK_BYTES));
    match scan {
        Ok(found) => Some(found),
        Err(e) => {
            tracing::warn!("Could not inspect {:?} for a rescaling step: {}", model_path, e);
            None
        }
    }
}

impl Normalization {
    /// Resolves the policy for an in-process model.
    pub fn resolve_local(&self, model_path: &Path) -> InputScale {
        match self {
            Normalization::Unit => InputScale::Unit,
            Normalization::Raw => InputScale::Raw,
            Normalization::Auto => match detect_rescaling(model_path) {
                Some(true) => {
                    tracing::info!("Model rescales its input, passing raw pixel values");
                    InputScale::Raw
                }
                Some(false) => InputScale::Unit,
                None => InputScale::Unit,
            },
        }
    }

    /// Resolves the policy for a remote model, which cannot be inspected.
    pub fn resolve_remote(&self) -> InputScale {
        match self {
            Normalization::Raw => InputScale::Raw,
            Normalization::Unit => InputScale::Unit,
            Normalization::Auto => {
                tracing::warn!(
                    "Cannot inspect a remote model, defaulting to [0, 1] input. \
                     Set model.normalization to `raw` if it rescales internally"
                );
                InputScale::Unit
            }
        }
    }
}
