//! Row-major containers for continuous action data.
//!
//! An [`ActionChunk`] is one `[time_horizon, action_dim]` window. An
//! [`ActionArray`] carries an arbitrary shape so that codecs can validate the
//! number of axes they are handed before doing any work.

use crate::error::ShapeError;

/// One rectangular window of actions, stored time-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionChunk {
    time_horizon: usize,
    action_dim: usize,
    data: Vec<f64>,
}

impl ActionChunk {
    /// Wraps flat time-major data.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::LengthMismatch`] if `data.len()` is not
    /// `time_horizon * action_dim`.
    pub fn new(time_horizon: usize, action_dim: usize, data: Vec<f64>) -> Result<Self, ShapeError> {
        let expected = time_horizon * action_dim;
        if data.len() != expected {
            return Err(ShapeError::LengthMismatch {
                shape: vec![time_horizon, action_dim],
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            time_horizon,
            action_dim,
            data,
        })
    }

    /// Builds a chunk from one row per time step.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Ragged`] if the rows differ in width.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ShapeError> {
        let action_dim = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * action_dim);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != action_dim {
                return Err(ShapeError::Ragged {
                    row,
                    expected: action_dim,
                    actual: values.len(),
                });
            }
            data.extend_from_slice(values);
        }
        Ok(Self {
            time_horizon: rows.len(),
            action_dim,
            data,
        })
    }

    pub fn zeros(time_horizon: usize, action_dim: usize) -> Self {
        Self {
            time_horizon,
            action_dim,
            data: vec![0.0; time_horizon * action_dim],
        }
    }

    pub fn time_horizon(&self) -> usize {
        self.time_horizon
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.time_horizon, self.action_dim)
    }

    /// Flat time-major values.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Value at time step `t`, action dimension `d`.
    pub fn get(&self, t: usize, d: usize) -> Option<f64> {
        if t >= self.time_horizon || d >= self.action_dim {
            return None;
        }
        self.data.get(t * self.action_dim + d).copied()
    }

    /// Iterates over the action vectors in time order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero; an empty-width chunk has no rows anyway.
        self.data.chunks_exact(self.action_dim.max(1))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    /// Largest absolute element-wise difference; NaN if any position is NaN.
    pub fn max_abs_diff(&self, other: &ActionChunk) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, |acc, d| if d.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(d) })
    }
}

/// Dense action data of arbitrary rank, as handed to `tokenize`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl ActionArray {
    /// # Errors
    ///
    /// Returns [`ShapeError::LengthMismatch`] if `data.len()` disagrees with `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ShapeError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ShapeError::LengthMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Stacks equally shaped chunks into a `[batch, time, dim]` array.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Unstackable`] if the chunks differ in shape.
    pub fn stack(chunks: &[ActionChunk]) -> Result<Self, ShapeError> {
        let (time_horizon, action_dim) = chunks.first().map_or((0, 0), ActionChunk::shape);
        let mut data = Vec::with_capacity(chunks.len() * time_horizon * action_dim);
        for chunk in chunks {
            if chunk.shape() != (time_horizon, action_dim) {
                return Err(ShapeError::Unstackable {
                    expected: (time_horizon, action_dim),
                    found: chunk.shape(),
                });
            }
            data.extend_from_slice(chunk.as_slice());
        }
        Ok(Self {
            shape: vec![chunks.len(), time_horizon, action_dim],
            data,
        })
    }

    /// Builds a `[batch, time, dim]` array from nested rows.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`] for ragged rows or chunks of differing shape.
    pub fn from_nested(batch: &[Vec<Vec<f64>>]) -> Result<Self, ShapeError> {
        let chunks = batch
            .iter()
            .map(|rows| ActionChunk::from_rows(rows))
            .collect::<Result<Vec<_>, _>>()?;
        Self::stack(&chunks)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Splits into chunks, promoting a single `[time, dim]` array to a batch of one.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::TooManyAxes`] above 3 axes and
    /// [`ShapeError::TooFewAxes`] below 2.
    pub fn chunks(&self) -> Result<Vec<ActionChunk>, ShapeError> {
        let (batch, time_horizon, action_dim) = match *self.shape.as_slice() {
            [t, d] => (1, t, d),
            [b, t, d] => (b, t, d),
            _ if self.ndim() > 3 => return Err(ShapeError::TooManyAxes { ndim: self.ndim() }),
            _ => return Err(ShapeError::TooFewAxes { ndim: self.ndim() }),
        };
        let per_chunk = time_horizon * action_dim;
        Ok((0..batch)
            .map(|b| ActionChunk {
                time_horizon,
                action_dim,
                data: self.data[b * per_chunk..(b + 1) * per_chunk].to_vec(),
            })
            .collect())
    }
}

impl From<ActionChunk> for ActionArray {
    fn from(chunk: ActionChunk) -> Self {
        Self {
            shape: vec![chunk.time_horizon, chunk.action_dim],
            data: chunk.data,
        }
    }
}
