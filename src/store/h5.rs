use std::path::Path;

use anyhow::{Context, Result, bail};
use hdf5::types::TypeDescriptor;
use hdf5::{Dataset, File, Group};

use crate::store::{Tensor, TensorBundle, TensorData};

/// Reads every dataset in the file, naming nested ones by their full path
/// without the leading slash (`data/conv1_1/0`).
pub fn read_bundle(path: &Path) -> Result<TensorBundle> {
    let file = File::open(path).context("failed to open HDF5 file")?;
    let mut bundle = TensorBundle::new();
    collect(&file, "", &mut bundle)?;
    Ok(bundle)
}

fn collect(group: &Group, prefix: &str, bundle: &mut TensorBundle) -> Result<()> {
    let members = group
        .member_names()
        .with_context(|| format!("failed to list members of `{}`", prefix))?;
    for member in members {
        let name = if prefix.is_empty() {
            member.clone()
        } else {
            format!("{}/{}", prefix, member)
        };
        if let Ok(ds) = group.dataset(&member) {
            let tensor = read_dataset(&ds).with_context(|| format!("dataset `{}`", name))?;
            bundle.insert(name, tensor);
        } else if let Ok(child) = group.group(&member) {
            collect(&child, &name, bundle)?;
        }
    }
    Ok(())
}

fn read_dataset(ds: &Dataset) -> Result<Tensor> {
    let shape = ds.shape();
    let descriptor = ds
        .dtype()
        .and_then(|t| t.to_descriptor())
        .context("failed to read dataset type")?;
    let data = match descriptor {
        TypeDescriptor::Float(_) => TensorData::F64(
            ds.read_raw::<f64>()
                .context("failed to read float dataset")?,
        ),
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) | TypeDescriptor::Boolean => {
            TensorData::I64(
                ds.read_raw::<i64>()
                    .context("failed to read integer dataset")?,
            )
        }
        other => bail!("unsupported dataset type {:?}", other),
    };
    Tensor::new(shape, data)
}

pub fn write_bundle(path: &Path, bundle: &TensorBundle) -> Result<()> {
    let file = File::create(path).context("failed to create HDF5 file")?;
    for (name, tensor) in bundle.iter() {
        let (parent, leaf) = match name.rsplit_once('/') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, name),
        };
        let group = match parent {
            Some(parent) => ensure_group(&file, parent)?,
            None => file.as_group().context("failed to open root group")?,
        };
        write_dataset(&group, leaf, tensor).with_context(|| format!("dataset `{}`", name))?;
    }
    Ok(())
}

fn ensure_group(file: &File, path: &str) -> Result<Group> {
    let mut group = file.as_group().context("failed to open root group")?;
    for part in path.split('/') {
        group = match group.group(part) {
            Ok(g) => g,
            Err(_) => group
                .create_group(part)
                .with_context(|| format!("failed to create group `{}`", part))?,
        };
    }
    Ok(group)
}

fn write_dataset(group: &Group, name: &str, tensor: &Tensor) -> Result<()> {
    let shape = tensor.shape.clone();
    match &tensor.data {
        TensorData::F64(v) => group
            .new_dataset::<f64>()
            .shape(shape)
            .create(name)?
            .write_raw(v)?,
        TensorData::F32(v) => group
            .new_dataset::<f32>()
            .shape(shape)
            .create(name)?
            .write_raw(v)?,
        TensorData::I32(v) => group
            .new_dataset::<i32>()
            .shape(shape)
            .create(name)?
            .write_raw(v)?,
        TensorData::I64(v) => group
            .new_dataset::<i64>()
            .shape(shape)
            .create(name)?
            .write_raw(v)?,
    }
    Ok(())
}
