use faer::{Mat, MatRef};
use rustc_hash::FxHashSet;

use crate::errors::{ArchetypeError, ArchetypeResult};

////////////////
// Structures //
////////////////

/// Immutable observation matrix for archetypal analysis
///
/// Rows are observations (e.g. cells), columns are continuous features (e.g.
/// principal component scores). Validated once on construction; never mutated
/// afterwards, which keeps parallel resampling free of locking.
///
/// ### Fields
///
/// * `data` - The n x d matrix of observations
/// * `keys` - Optional per-observation identifiers used for joins with
///   external feature data
#[derive(Clone, Debug)]
pub struct ObservationMatrix {
    data: Mat<f64>,
    keys: Option<Vec<String>>,
}

impl ObservationMatrix {
    /// Create a new observation matrix
    ///
    /// ### Params
    ///
    /// * `data` - The n x d matrix, rows = observations
    /// * `keys` - Optional observation identifiers; must be unique and match
    ///   the number of rows
    ///
    /// ### Returns
    ///
    /// The validated `ObservationMatrix`.
    pub fn new(data: Mat<f64>, keys: Option<Vec<String>>) -> ArchetypeResult<Self> {
        let (n, d) = data.shape();
        if n == 0 || d == 0 {
            return Err(ArchetypeError::degenerate(n, d, 0, "empty matrix"));
        }
        for j in 0..d {
            for i in 0..n {
                if !data[(i, j)].is_finite() {
                    return Err(ArchetypeError::degenerate(
                        n,
                        d,
                        0,
                        "non-finite value in observation matrix",
                    ));
                }
            }
        }
        if let Some(keys) = &keys {
            if keys.len() != n {
                return Err(ArchetypeError::KeyMismatch {
                    message: format!("{} keys for {} observations", keys.len(), n),
                });
            }
            let unique: FxHashSet<&str> = keys.iter().map(|k| k.as_str()).collect();
            if unique.len() != n {
                return Err(ArchetypeError::KeyMismatch {
                    message: "duplicated observation keys".to_string(),
                });
            }
        }
        Ok(ObservationMatrix { data, keys })
    }

    /// Build from row-major nested vectors
    ///
    /// ### Params
    ///
    /// * `rows` - One inner vector per observation, all of equal length
    ///
    /// ### Returns
    ///
    /// The validated `ObservationMatrix`.
    pub fn from_rows(rows: &[Vec<f64>]) -> ArchetypeResult<Self> {
        if rows.is_empty() || rows[0].is_empty() {
            return Err(ArchetypeError::degenerate(rows.len(), 0, 0, "empty input"));
        }
        let d = rows[0].len();
        if rows.iter().any(|r| r.len() != d) {
            return Err(ArchetypeError::degenerate(
                rows.len(),
                d,
                0,
                "ragged rows in observation input",
            ));
        }
        let mat = Mat::from_fn(rows.len(), d, |i, j| rows[i][j]);
        ObservationMatrix::new(mat, None)
    }

    /// Attach observation keys after construction
    pub fn with_keys(mut self, keys: Vec<String>) -> ArchetypeResult<Self> {
        if keys.len() != self.nrows() {
            return Err(ArchetypeError::KeyMismatch {
                message: format!("{} keys for {} observations", keys.len(), self.nrows()),
            });
        }
        self.keys = Some(keys);
        Ok(self)
    }

    pub fn data(&self) -> MatRef<f64> {
        self.data.as_ref()
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn keys(&self) -> Option<&[String]> {
        self.keys.as_deref()
    }

    /// Number of distinct observation rows
    ///
    /// Distinctness is exact on the float bit patterns; used to refuse fits
    /// that request more archetypes than there are distinct points.
    pub fn n_distinct_rows(&self) -> usize {
        let mut seen: FxHashSet<Vec<u64>> = FxHashSet::default();
        for i in 0..self.nrows() {
            let row: Vec<u64> = (0..self.ncols())
                .map(|j| self.data[(i, j)].to_bits())
                .collect();
            seen.insert(row);
        }
        seen.len()
    }

    /// Subset of the observations by row indices
    ///
    /// Keys (when present) travel with their rows.
    pub fn subset_rows(&self, indices: &[usize]) -> Self {
        let sub = Mat::from_fn(indices.len(), self.ncols(), |i, j| {
            self.data[(indices[i], j)]
        });
        let keys = self
            .keys
            .as_ref()
            .map(|keys| indices.iter().map(|&i| keys[i].clone()).collect());
        ObservationMatrix { data: sub, keys }
    }
}

/// External per-observation feature data (e.g. gene expression or gene-set
/// activity scores), keyed for the join with an `ObservationMatrix`
///
/// ### Fields
///
/// * `keys` - Observation identifiers, one per row of `values`
/// * `names` - Feature names, one per column of `values`
/// * `values` - Observation x feature matrix
#[derive(Clone, Debug)]
pub struct ExternalFeatures {
    pub keys: Vec<String>,
    pub names: Vec<String>,
    pub values: Mat<f64>,
}

impl ExternalFeatures {
    /// Create from an observation x feature matrix
    pub fn new(keys: Vec<String>, names: Vec<String>, values: Mat<f64>) -> ArchetypeResult<Self> {
        if keys.len() != values.nrows() {
            return Err(ArchetypeError::KeyMismatch {
                message: format!(
                    "{} keys for {} feature rows",
                    keys.len(),
                    values.nrows()
                ),
            });
        }
        if names.len() != values.ncols() {
            return Err(ArchetypeError::invalid_param(
                "names",
                "one feature name per column required",
            ));
        }
        Ok(ExternalFeatures {
            keys,
            names,
            values,
        })
    }

    /// Create from a feature x observation matrix (the common orientation of
    /// expression data), transposing into observation-major storage
    pub fn from_feature_major(
        keys: Vec<String>,
        names: Vec<String>,
        values: MatRef<f64>,
    ) -> ArchetypeResult<Self> {
        let transposed = Mat::from_fn(values.ncols(), values.nrows(), |i, j| values[(j, i)]);
        ExternalFeatures::new(keys, names, transposed)
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_rejects_non_finite() {
        let mat = mat![[1.0, 2.0], [f64::NAN, 0.5]];
        assert!(ObservationMatrix::new(mat, None).is_err());
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let mat = mat![[1.0, 2.0], [3.0, 4.0]];
        let res = ObservationMatrix::new(mat, Some(vec!["a".into(), "a".into()]));
        assert!(res.is_err());
    }

    #[test]
    fn test_distinct_rows() {
        let obs = ObservationMatrix::from_rows(&[
            vec![1.0, 2.0],
            vec![1.0, 2.0],
            vec![3.0, 4.0],
        ])
        .unwrap();
        assert_eq!(obs.n_distinct_rows(), 2);
    }

    #[test]
    fn test_subset_carries_keys() {
        let mat = mat![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let obs = ObservationMatrix::new(
            mat,
            Some(vec!["a".into(), "b".into(), "c".into()]),
        )
        .unwrap();
        let sub = obs.subset_rows(&[2, 0]);
        assert_eq!(sub.keys().unwrap(), &["c".to_string(), "a".to_string()]);
        assert_eq!(sub.data()[(0, 0)], 5.0);
    }

    #[test]
    fn test_feature_major_transpose() {
        let values = mat![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let ext = ExternalFeatures::from_feature_major(
            vec!["a".into(), "b".into(), "c".into()],
            vec!["f1".into(), "f2".into()],
            values.as_ref(),
        )
        .unwrap();
        assert_eq!(ext.values.shape(), (3, 2));
        assert_eq!(ext.values[(2, 0)], 3.0);
    }
}
