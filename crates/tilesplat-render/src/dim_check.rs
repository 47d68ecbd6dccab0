use std::collections::HashMap;

use crate::error::RenderError;

pub(crate) enum DimBound {
    Exact(usize),
    Matching(&'static str),
}

impl From<usize> for DimBound {
    fn from(value: usize) -> Self {
        Self::Exact(value)
    }
}

impl From<&'static str> for DimBound {
    fn from(value: &'static str) -> Self {
        Self::Matching(value)
    }
}

/// Checks flat buffers against symbolic shapes, eg. `["C", "N", 3]`.
///
/// Named dimensions are bound by the first buffer that mentions them and have to
/// agree for every later buffer. The first error is kept and reported by
/// [`DimCheck::finish`].
pub(crate) struct DimCheck {
    dim_map: HashMap<&'static str, usize>,
    error: Option<RenderError>,
}

impl DimCheck {
    pub fn new() -> Self {
        Self {
            dim_map: HashMap::new(),
            error: None,
        }
    }

    /// Bind a named dimension up front.
    pub fn bind(mut self, name: &'static str, value: usize) -> Self {
        self.dim_map.insert(name, value);
        self
    }

    pub fn check_dims(mut self, name: &str, len: usize, bounds: &[DimBound]) -> Self {
        if self.error.is_some() {
            return self;
        }

        let mut known = 1usize;
        let mut unbound = None;

        for bound in bounds {
            match bound {
                DimBound::Exact(value) => known *= value,
                DimBound::Matching(dim) => {
                    if let Some(value) = self.dim_map.get(dim) {
                        known *= value;
                    } else if unbound.is_none() {
                        unbound = Some(*dim);
                    } else {
                        self.error = Some(RenderError::ShapeMismatch {
                            name: name.to_owned(),
                            reason: "more than one unbound dimension".to_owned(),
                        });
                        return self;
                    }
                }
            }
        }

        match unbound {
            Some(dim) => {
                if known == 0 || len % known != 0 {
                    self.error = Some(RenderError::ShapeMismatch {
                        name: name.to_owned(),
                        reason: format!("length {len} is not a multiple of {known}"),
                    });
                } else {
                    self.dim_map.insert(dim, len / known);
                }
            }
            None => {
                if len != known {
                    self.error = Some(RenderError::ShapeMismatch {
                        name: name.to_owned(),
                        reason: format!("expected {known} elements, got {len}"),
                    });
                }
            }
        }
        self
    }

    pub fn finish(self) -> Result<(), RenderError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
