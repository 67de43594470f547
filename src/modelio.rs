//! Saving and loading of layer parameters.
//!
//! # `.xmlp` Parameter Format
//!
//! A compact binary format for the parameters of any
//! [`Parameterized`](crate::layers::Parameterized) layer.
//!
//! ```text
//! ┌────────────┬────────────┬─────────────────────┐
//! │ Header     │ Tensor N   │ Tensor N+1 …        │
//! ├────────────┼────────────┼─────────────────────┤
//! │ "xmlp"[4]  │ u64: ndim  │ u64: ndim           │
//! │ u32: count │ [u64; ndim] shape                │
//! │            │ [f32; prod(shape)] data          │
//! └────────────┴──────────────────────────────────┘
//! ```
//!
//! All integers and floats are little-endian. Tensors are stored in the
//! layer's parameter order, so a file only loads back into a layer built with
//! the same configuration; counts and shapes are checked on load.
//!
//! Only parameter values are stored. Hyperparameters belong in the JSON
//! config (see [`crate::config`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use rand::SeedableRng;
//! use x_mlps::layers::NFeedforwards;
//! use x_mlps::modelio::{load_module, save_module};
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let net = NFeedforwards::new(32, 2, &mut rng)?;
//! save_module("net.xmlp", &net)?;
//!
//! let mut restored = NFeedforwards::new(32, 2, &mut rng)?;
//! load_module("net.xmlp", &mut restored)?;
//! # Ok::<(), x_mlps::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::layers::Parameterized;
use crate::tensors::{Ten32, TensorFloat};
use briny::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

const XMLP_MAGIC: &[u8; 4] = b"xmlp";

/// Upper bound on the rank of a stored tensor.
const MAX_NDIM: usize = 8;

/// Tensor as read from disk, before validation.
struct PackedTensor {
    shape: Vec<u64>,
    data: Vec<TensorFloat>,
}

impl Validate for PackedTensor {
    fn validate(&self) -> Result<(), ValidationError> {
        let expected = self
            .shape
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .ok_or(ValidationError)?;
        if self.data.len() as u64 != expected || self.data.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Writes tensors in the `.xmlp` layout to any writer.
///
/// # Errors
/// I/O failures, or more than `u32::MAX` tensors.
pub fn write_tensors<W: Write>(mut out: W, tensors: &[Ten32]) -> Result<()> {
    let count = u32::try_from(tensors.len()).map_err(|_| Error::Corrupt("too many tensors"))?;
    out.write_all(XMLP_MAGIC)?;
    out.write_all(&count.to_le_bytes())?;

    for tensor in tensors {
        out.write_all(&(tensor.shape.len() as u64).to_le_bytes())?;
        for &dim in &tensor.shape {
            out.write_all(&(dim as u64).to_le_bytes())?;
        }
        for &val in &tensor.data {
            out.write_all(&val.to_le_bytes())?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Reads tensors in the `.xmlp` layout from any reader.
///
/// # Errors
/// - [`Error::BadMagic`] if the header is wrong.
/// - [`Error::Corrupt`] for oversized ranks, inconsistent shapes or non-finite values.
/// - I/O errors, including truncated input.
pub fn read_tensors<R: Read>(mut input: R) -> Result<Vec<Ten32>> {
    let mut buf8 = [0u8; 8];
    let mut buf4 = [0u8; 4];

    input.read_exact(&mut buf4)?;
    if &buf4 != XMLP_MAGIC {
        return Err(Error::BadMagic);
    }

    input.read_exact(&mut buf4)?;
    let count = u32::from_le_bytes(buf4) as usize;

    let mut tensors = Vec::with_capacity(count.min(1024));

    for _ in 0..count {
        input.read_exact(&mut buf8)?;
        let ndim = usize::try_from(u64::from_le_bytes(buf8))
            .ok()
            .filter(|&n| n <= MAX_NDIM)
            .ok_or(Error::Corrupt("tensor rank out of range"))?;

        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            input.read_exact(&mut buf8)?;
            shape.push(u64::from_le_bytes(buf8));
        }

        let size = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(usize::try_from(d).ok()?))
            .ok_or(Error::Corrupt("tensor size overflows"))?;

        let mut data = Vec::with_capacity(size.min(1 << 20));
        for _ in 0..size {
            input.read_exact(&mut buf4)?;
            data.push(TensorFloat::from_le_bytes(buf4));
        }

        let trusted = TrustedData::new(PackedTensor { shape, data })
            .map_err(|_| Error::Corrupt("tensor failed validation"))?;
        let inner = trusted.into_inner();
        let shape: Vec<usize> = inner.shape.iter().map(|&d| d as usize).collect();
        tensors.push(Ten32::new(shape, inner.data));
    }

    Ok(tensors)
}

/// Saves tensors to a `.xmlp` file.
///
/// # Errors
/// See [`write_tensors`].
pub fn save_tensors(path: impl AsRef<Path>, tensors: &[Ten32]) -> Result<()> {
    let path = path.as_ref();
    write_tensors(BufWriter::new(File::create(path)?), tensors)?;
    debug!(path = %path.display(), count = tensors.len(), "saved tensors");
    Ok(())
}

/// Loads every tensor from a `.xmlp` file.
///
/// # Errors
/// See [`read_tensors`].
pub fn load_tensors(path: impl AsRef<Path>) -> Result<Vec<Ten32>> {
    let path = path.as_ref();
    let tensors = read_tensors(BufReader::new(File::open(path)?))?;
    debug!(path = %path.display(), count = tensors.len(), "loaded tensors");
    Ok(tensors)
}

/// Saves a layer's parameter values.
///
/// # Errors
/// See [`write_tensors`].
pub fn save_module<M: Parameterized + ?Sized>(path: impl AsRef<Path>, module: &M) -> Result<()> {
    save_tensors(path, &module.state())
}

/// Replaces a layer's parameter values with the ones in `tensors`.
///
/// Nothing is written unless every count and shape matches. Gradients are reset.
///
/// # Errors
/// [`Error::ParamCount`] or [`Error::ShapeMismatch`].
pub fn load_state<M: Parameterized + ?Sized>(module: &mut M, tensors: Vec<Ten32>) -> Result<()> {
    let mut params = module.parameters_mut();
    if params.len() != tensors.len() {
        return Err(Error::ParamCount {
            expected: params.len(),
            found: tensors.len(),
        });
    }
    for (p, t) in params.iter().zip(&tensors) {
        if p.value.shape != t.shape {
            return Err(Error::ShapeMismatch {
                expected: p.value.shape.clone(),
                found: t.shape.clone(),
            });
        }
    }
    for (p, t) in params.iter_mut().zip(tensors) {
        p.value.update(t);
        p.zero_grad();
    }
    Ok(())
}

/// Loads a file written by [`save_module`] into a layer of the same configuration.
///
/// # Errors
/// See [`load_tensors`] and [`load_state`].
pub fn load_module<M: Parameterized + ?Sized>(path: impl AsRef<Path>, module: &mut M) -> Result<()> {
    load_state(module, load_tensors(path)?)
}
