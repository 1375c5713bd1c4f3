//! Python bindings via PyO3
//!
//! ```python
//! from acttok import BinCodec, DctCodec, codec_from_spec
//!
//! bins = codec_from_spec("action_tokenizer.bin(min_action_value=-1, max_action_value=1)")
//! tokens = bins.tokenize(actions)            # [batch][time][dim] -> [batch][n]
//! actions = bins.detokenize(tokens)
//!
//! dct = DctCodec(vocab_size=1024, time_horizon=10, action_dim=2)
//! dct.fit(corpus)
//! dct.save("/tmp/fast")
//! ```

#![cfg(feature = "python")]

use std::path::PathBuf;

use pyo3::{
    exceptions::{PyIOError, PyRuntimeError, PyValueError},
    prelude::*,
};

use crate::{
    array::{ActionArray, ActionChunk},
    bin_codec::{BinCodec, BinCodecConfig, Bounds},
    codec::ActionCodec,
    dct_codec::{DctCodec, DctCodecConfig},
    error::{CodecError, PersistError, RegistryError},
    persist,
    registry,
    types::{DecodeShape, TokenSequence},
};

impl From<CodecError> for PyErr {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Persist(PersistError::Io { .. }) => PyIOError::new_err(e.to_string()),
            CodecError::NotFitted | CodecError::MissingShape => PyRuntimeError::new_err(e.to_string()),
            _ => PyValueError::new_err(e.to_string()),
        }
    }
}

impl From<RegistryError> for PyErr {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Codec(inner) => (*inner).into(),
            other => PyValueError::new_err(other.to_string()),
        }
    }
}

/// Either one `[time][dim]` chunk or a `[batch][time][dim]` batch.
#[derive(FromPyObject)]
enum PyActions {
    Batch(Vec<Vec<Vec<f64>>>),
    Single(Vec<Vec<f64>>),
}

impl PyActions {
    fn into_array(self) -> Result<ActionArray, CodecError> {
        Ok(match self {
            Self::Batch(batch) => ActionArray::from_nested(&batch)?,
            Self::Single(rows) => ActionChunk::from_rows(&rows)?.into(),
        })
    }
}

#[derive(FromPyObject)]
enum PyBounds {
    Scalar(f64),
    PerDim(Vec<f64>),
}

impl From<PyBounds> for Bounds {
    fn from(b: PyBounds) -> Self {
        match b {
            PyBounds::Scalar(v) => Bounds::Scalar(v),
            PyBounds::PerDim(v) => Bounds::PerDim(v),
        }
    }
}

fn to_nested(chunks: Vec<ActionChunk>) -> Vec<Vec<Vec<f64>>> {
    chunks.iter().map(ActionChunk::to_rows).collect()
}

fn tokenize_with(codec: &dyn ActionCodec, actions: PyActions) -> PyResult<Vec<TokenSequence>> {
    Ok(codec.tokenize(&actions.into_array()?)?)
}

fn detokenize_with(
    codec: &dyn ActionCodec,
    tokens: Vec<TokenSequence>,
    time_horizon: Option<usize>,
    action_dim: Option<usize>,
) -> PyResult<Vec<Vec<Vec<f64>>>> {
    let shape = DecodeShape {
        time_horizon,
        action_dim,
    };
    Ok(to_nested(codec.detokenize(&tokens, shape)?))
}

/// Any codec, as built by `codec_from_spec` or `load_codec`.
#[pyclass(name = "ActionTokenizer")]
pub struct PyActionTokenizer {
    inner: Box<dyn ActionCodec>,
}

#[pymethods]
impl PyActionTokenizer {
    #[getter]
    fn kind(&self) -> &'static str {
        self.inner.kind().name()
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    #[getter]
    fn num_tokens(&self) -> Option<usize> {
        self.inner.num_tokens()
    }

    fn tokenize(&self, actions: PyActions) -> PyResult<Vec<TokenSequence>> {
        tokenize_with(self.inner.as_ref(), actions)
    }

    #[pyo3(signature = (tokens, time_horizon=None, action_dim=None))]
    fn detokenize(
        &self,
        tokens: Vec<TokenSequence>,
        time_horizon: Option<usize>,
        action_dim: Option<usize>,
    ) -> PyResult<Vec<Vec<Vec<f64>>>> {
        detokenize_with(self.inner.as_ref(), tokens, time_horizon, action_dim)
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        Ok(self.inner.save(&path)?)
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }
}

#[pyclass(name = "BinCodec")]
pub struct PyBinCodec {
    inner: BinCodec,
}

#[pymethods]
impl PyBinCodec {
    #[new]
    #[pyo3(signature = (min_action_value, max_action_value, action_vocab_size=1000, action_horizon=10, action_dim=2))]
    fn new(
        min_action_value: PyBounds,
        max_action_value: PyBounds,
        action_vocab_size: usize,
        action_horizon: usize,
        action_dim: usize,
    ) -> PyResult<Self> {
        let inner = BinCodec::new(BinCodecConfig {
            min_action_value: min_action_value.into(),
            max_action_value: max_action_value.into(),
            vocab_size: action_vocab_size,
            action_horizon,
            action_dim,
        })?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn load(path: PathBuf) -> PyResult<Self> {
        Ok(Self {
            inner: BinCodec::load(&path)?,
        })
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    #[getter]
    fn num_tokens(&self) -> Option<usize> {
        self.inner.num_tokens()
    }

    fn tokenize(&self, actions: PyActions) -> PyResult<Vec<TokenSequence>> {
        tokenize_with(&self.inner, actions)
    }

    #[pyo3(signature = (tokens, time_horizon=None, action_dim=None))]
    fn detokenize(
        &self,
        tokens: Vec<TokenSequence>,
        time_horizon: Option<usize>,
        action_dim: Option<usize>,
    ) -> PyResult<Vec<Vec<Vec<f64>>>> {
        detokenize_with(&self.inner, tokens, time_horizon, action_dim)
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        Ok(self.inner.save(&path)?)
    }
}

#[pyclass(name = "DctCodec")]
pub struct PyDctCodec {
    inner: DctCodec,
}

#[pymethods]
impl PyDctCodec {
    #[new]
    #[pyo3(signature = (
        scale=10.0,
        vocab_size=4096,
        min_token=0,
        *,
        action_dim=None,
        time_horizon=None,
        save_path=None,
        pretrained_path=None,
        do_fit=false,
        show_progress=true,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        scale: f64,
        vocab_size: usize,
        min_token: i64,
        action_dim: Option<usize>,
        time_horizon: Option<usize>,
        save_path: Option<PathBuf>,
        pretrained_path: Option<PathBuf>,
        do_fit: bool,
        show_progress: bool,
    ) -> PyResult<Self> {
        let inner = DctCodec::new(DctCodecConfig {
            scale,
            vocab_size,
            min_token,
            action_dim,
            time_horizon,
            save_path,
            pretrained_path,
            do_fit,
            show_progress,
        })?;
        Ok(Self { inner })
    }

    #[staticmethod]
    fn load(path: PathBuf) -> PyResult<Self> {
        Ok(Self {
            inner: DctCodec::load(&path)?,
        })
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    #[getter]
    fn num_tokens(&self) -> Option<usize> {
        self.inner.num_tokens()
    }

    #[getter]
    fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }

    #[getter]
    fn needs_fit(&self) -> bool {
        self.inner.needs_fit()
    }

    /// Fits on a list of `[time][dim]` chunks; lengths may differ.
    fn fit(&mut self, py: Python<'_>, corpus: Vec<Vec<Vec<f64>>>) -> PyResult<()> {
        let chunks = corpus
            .iter()
            .map(|rows| ActionChunk::from_rows(rows))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CodecError::from)?;
        let inner = &mut self.inner;
        py.allow_threads(|| inner.fit(&chunks))?;
        Ok(())
    }

    fn tokenize(&self, actions: PyActions) -> PyResult<Vec<TokenSequence>> {
        tokenize_with(&self.inner, actions)
    }

    #[pyo3(signature = (tokens, time_horizon=None, action_dim=None))]
    fn detokenize(
        &self,
        tokens: Vec<TokenSequence>,
        time_horizon: Option<usize>,
        action_dim: Option<usize>,
    ) -> PyResult<Vec<Vec<Vec<f64>>>> {
        detokenize_with(&self.inner, tokens, time_horizon, action_dim)
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        Ok(self.inner.save(&path)?)
    }
}

/// Builds a codec from a configuration string such as
/// `action_tokenizer.bin(min_action_value=-1, max_action_value=1)`.
#[pyfunction]
fn codec_from_spec(spec: &str) -> PyResult<PyActionTokenizer> {
    Ok(PyActionTokenizer {
        inner: registry::lookup(spec)?,
    })
}

/// Loads whichever codec was saved in `path`.
#[pyfunction]
fn load_codec(path: PathBuf) -> PyResult<PyActionTokenizer> {
    Ok(PyActionTokenizer {
        inner: persist::load_codec(&path)?,
    })
}

#[pymodule]
fn _acttok(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyActionTokenizer>()?;
    m.add_class::<PyBinCodec>()?;
    m.add_class::<PyDctCodec>()?;
    m.add_function(wrap_pyfunction!(codec_from_spec, m)?)?;
    m.add_function(wrap_pyfunction!(load_codec, m)?)?;
    m.add("REGISTERED", registry::registered().collect::<Vec<_>>())?;
    Ok(())
}
