//! Explicit parameter store and hierarchical name scopes
//!
//! Replaces graph-global variable scopes with an explicit store passed to
//! every graph builder. Reuse is an explicit lookup-or-create operation
//! against the store, keyed by hierarchical name
//! (e.g. `inpaint_net/conv1/kernel`), with a [`BindMode`] disambiguating
//! create vs bind-existing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::rc::Rc;

use ndarray::{Array1, Array4, ArrayD, Ix1, Ix4, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{InpaintError, Result};

/// Whether a scope creates fresh parameters or binds existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Register new parameters; an existing name is an error.
    Create,
    /// Bind already-registered parameters; a missing name or a shape
    /// mismatch is an error.
    Reuse,
}

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Glorot/Xavier normal, std = sqrt(2 / (fan_in + fan_out)).
    Glorot,
    /// All zeros (biases).
    Zeros,
    /// Random unit-norm vector (spectral-norm singular vector estimates).
    RandomUnit,
}

/// Named learned tensor shared between graph builders and the optimizer.
///
/// Cloning a `Parameter` clones the handle, not the data: every binding of
/// the same name observes the same values, and a single write (the external
/// optimizer's step) is visible to all of them.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    data: Rc<RefCell<ArrayD<f32>>>,
    trainable: bool,
}

impl Parameter {
    fn new(name: String, data: ArrayD<f32>, trainable: bool) -> Self {
        Self {
            name,
            data: Rc::new(RefCell::new(data)),
            trainable,
        }
    }

    /// Hierarchical name, e.g. `discriminator/sn_conv1/kernel`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current shape.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.data.borrow().shape().to_vec()
    }

    /// Whether the optimizer may update this parameter.
    #[must_use]
    pub fn trainable(&self) -> bool {
        self.trainable
    }

    /// Number of scalar values held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// True when the parameter holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the values with dynamic rank.
    #[must_use]
    pub fn to_dyn(&self) -> ArrayD<f32> {
        self.data.borrow().clone()
    }

    /// Copy of the values as a rank-4 tensor (conv kernels).
    pub fn to_array4(&self) -> Result<Array4<f32>> {
        let data = self.data.borrow();
        data.view()
            .into_dimensionality::<Ix4>()
            .map(|v| v.to_owned())
            .map_err(|_| InpaintError::ParameterShape {
                name: self.name.clone(),
                expected: vec![0, 0, 0, 0],
                found: data.shape().to_vec(),
            })
    }

    /// Copy of the values as a rank-1 tensor (biases, singular vectors).
    pub fn to_array1(&self) -> Result<Array1<f32>> {
        let data = self.data.borrow();
        data.view()
            .into_dimensionality::<Ix1>()
            .map(|v| v.to_owned())
            .map_err(|_| InpaintError::ParameterShape {
                name: self.name.clone(),
                expected: vec![0],
                found: data.shape().to_vec(),
            })
    }

    /// Overwrite the values. The replacement must have the stored shape;
    /// this is the single mutation point used by the external optimizer and
    /// the spectral-estimate refresh.
    pub fn set(&self, values: ArrayD<f32>) -> Result<()> {
        let mut data = self.data.borrow_mut();
        if data.shape() != values.shape() {
            return Err(InpaintError::ParameterShape {
                name: self.name.clone(),
                expected: data.shape().to_vec(),
                found: values.shape().to_vec(),
            });
        }
        *data = values;
        Ok(())
    }
}

/// Box–Muller normal sample scaled by `std`.
fn sample_normal(rng: &mut StdRng, std: f64) -> f32 {
    let u1: f64 = rng.random::<f64>().max(1e-10);
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (z * std) as f32
}

fn glorot_std(shape: &[usize]) -> f64 {
    let (fan_in, fan_out) = match shape.len() {
        // conv kernels [kh, kw, in, out]
        4 => {
            let receptive = shape[0] * shape[1];
            (receptive * shape[2], receptive * shape[3])
        }
        2 => (shape[0], shape[1]),
        _ => {
            let n = shape.iter().product::<usize>().max(1);
            (n, n)
        }
    };
    (2.0 / (fan_in + fan_out).max(1) as f64).sqrt()
}

fn init_values(rng: &mut StdRng, shape: &[usize], init: Init) -> ArrayD<f32> {
    let n: usize = shape.iter().product();
    let values: Vec<f32> = match init {
        Init::Zeros => vec![0.0; n],
        Init::Glorot => {
            let std = glorot_std(shape);
            (0..n).map(|_| sample_normal(rng, std)).collect()
        }
        Init::RandomUnit => {
            let raw: Vec<f32> = (0..n).map(|_| sample_normal(rng, 1.0)).collect();
            let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-12);
            raw.into_iter().map(|v| v / norm).collect()
        }
    };
    ArrayD::from_shape_vec(IxDyn(shape), values).expect("shape/product agreement")
}

#[derive(Serialize, Deserialize)]
struct CheckpointEntry {
    shape: Vec<usize>,
    values: Vec<f32>,
    trainable: bool,
}

/// Registry of named parameters for one model instance.
///
/// Owns the RNG used for weight initialization so that a seeded store builds
/// a bit-reproducible model.
pub struct ParameterStore {
    params: BTreeMap<String, Parameter>,
    rng: StdRng,
}

impl ParameterStore {
    /// Store seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: BTreeMap::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Store with a fixed seed for reproducible initialization.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            params: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Open a top-level scope, e.g. `inpaint_net` or `discriminator`.
    pub fn scope(&mut self, name: &str, mode: BindMode) -> Scope<'_> {
        Scope {
            store: self,
            path: name.to_string(),
            mode,
        }
    }

    fn get_or_create(
        &mut self,
        name: &str,
        shape: &[usize],
        init: Init,
        trainable: bool,
        mode: BindMode,
    ) -> Result<Parameter> {
        if let Some(existing) = self.params.get(name) {
            if mode == BindMode::Create {
                return Err(InpaintError::ParameterExists {
                    name: name.to_string(),
                });
            }
            if existing.shape() != shape {
                return Err(InpaintError::ParameterShape {
                    name: name.to_string(),
                    expected: shape.to_vec(),
                    found: existing.shape(),
                });
            }
            return Ok(existing.clone());
        }
        if mode == BindMode::Reuse {
            return Err(InpaintError::ParameterMissing {
                name: name.to_string(),
            });
        }
        let values = init_values(&mut self.rng, shape, init);
        let param = Parameter::new(name.to_string(), values, trainable);
        self.params.insert(name.to_string(), param.clone());
        Ok(param)
    }

    /// Parameter by exact name, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Parameter> {
        self.params.get(name).cloned()
    }

    /// All registered parameters in name order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    /// Trainable parameters under a scope prefix, in name order.
    ///
    /// This is the explicit replacement for a graph-global trainable-variable
    /// collection: the training driver unions the `inpaint_net` and
    /// `discriminator` sets itself.
    #[must_use]
    pub fn scope_parameters(&self, prefix: &str) -> Vec<Parameter> {
        let nested = format!("{prefix}/");
        self.params
            .values()
            .filter(|p| p.trainable() && (p.name() == prefix || p.name().starts_with(&nested)))
            .cloned()
            .collect()
    }

    /// Number of registered parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when no parameters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar values across all parameters.
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.params.values().map(Parameter::len).sum()
    }

    /// Write every parameter (name, shape, values) to a JSON checkpoint.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let entries: BTreeMap<&str, CheckpointEntry> = self
            .params
            .values()
            .map(|p| {
                let data = p.to_dyn();
                (
                    p.name(),
                    CheckpointEntry {
                        shape: data.shape().to_vec(),
                        values: data.iter().copied().collect(),
                        trainable: p.trainable(),
                    },
                )
            })
            .collect();
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &entries)?;
        Ok(())
    }

    /// Load a JSON checkpoint, overwriting existing parameters in place and
    /// registering any that are missing. Re-binding an existing name with a
    /// different shape is a [`InpaintError::ParameterShape`] error.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::open(path)?;
        let entries: BTreeMap<String, CheckpointEntry> =
            serde_json::from_reader(BufReader::new(file))?;
        for (name, entry) in entries {
            let values = ArrayD::from_shape_vec(IxDyn(&entry.shape), entry.values)
                .map_err(|_| InpaintError::ParameterShape {
                    name: name.clone(),
                    expected: entry.shape.clone(),
                    found: vec![],
                })?;
            match self.params.get(&name).cloned() {
                Some(existing) => existing.set(values)?,
                None => {
                    let param = Parameter::new(name.clone(), values, entry.trainable);
                    self.params.insert(name, param);
                }
            }
        }
        Ok(())
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hierarchical name scope bound to a store.
///
/// Every graph builder receives a scope and registers its parameters under
/// `scope_path/layer_name/parameter_name`.
pub struct Scope<'a> {
    store: &'a mut ParameterStore,
    path: String,
    mode: BindMode,
}

impl Scope<'_> {
    /// Child scope `self/name`.
    pub fn sub(&mut self, name: &str) -> Scope<'_> {
        let path = self.join(name);
        Scope {
            store: &mut *self.store,
            path,
            mode: self.mode,
        }
    }

    fn join(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    /// Scope path so far.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Binding mode of this scope.
    #[must_use]
    pub fn mode(&self) -> BindMode {
        self.mode
    }

    /// Trainable parameter under this scope.
    pub fn var(&mut self, name: &str, shape: &[usize], init: Init) -> Result<Parameter> {
        let full = self.join(name);
        self.store.get_or_create(&full, shape, init, true, self.mode)
    }

    /// Non-trainable state under this scope (spectral-norm estimates).
    pub fn state(&mut self, name: &str, shape: &[usize], init: Init) -> Result<Parameter> {
        let full = self.join(name);
        self.store
            .get_or_create(&full, shape, init, false, self.mode)
    }
}
