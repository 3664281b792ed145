use faer::{Mat, MatRef};

////////////////////
// Util functions //
////////////////////

/// Generate the rank of a vector with tie correction.
///
/// ### Params
///
/// * `vec` - The slice of numericals to rank.
///
/// ### Returns
///
/// The ranked vector (also f64)
pub fn rank_vector<T>(vec: &[T]) -> Vec<f64>
where
    T: Copy + PartialOrd + PartialEq,
{
    let n = vec.len();
    if n == 0 {
        return Vec::new();
    }

    let mut indexed_values: Vec<(T, usize)> = vec
        .iter()
        .copied()
        .enumerate()
        .map(|(i, v)| (v, i))
        .collect();

    indexed_values
        .sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let current_value = indexed_values[i].0;
        let start = i;
        while i < n && indexed_values[i].0 == current_value {
            i += 1;
        }
        let avg_rank = (start + i + 1) as f64 / 2.0;
        for j in start..i {
            ranks[indexed_values[j].1] = avg_rank;
        }
    }
    ranks
}

/// Calculates the column means of a matrix
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the column-wise means
///
/// ### Returns
///
/// Vector of the column means.
pub fn col_means(mat: MatRef<f64>) -> Vec<f64> {
    let n_rows = mat.nrows();
    let ones = Mat::from_fn(n_rows, 1, |_, _| 1.0);
    let means = (ones.transpose() * mat) / n_rows as f64;

    means.row(0).iter().cloned().collect()
}

/// Total sum of squares of a matrix about its column means
///
/// ### Params
///
/// * `mat` - The matrix for which to calculate the total sum of squares
///
/// ### Returns
///
/// The sum over all entries of the squared deviation from the column mean.
pub fn total_sum_of_squares(mat: MatRef<f64>) -> f64 {
    let means = col_means(mat);
    let mut tss = 0.0;
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            let dev = mat[(i, j)] - means[j];
            tss += dev * dev;
        }
    }
    tss
}

/// Squared Frobenius norm of the difference of two equally sized matrices
///
/// ### Params
///
/// * `a` - First matrix
/// * `b` - Second matrix
///
/// ### Returns
///
/// `sum((a - b)^2)` over all entries.
pub fn squared_difference(a: MatRef<f64>, b: MatRef<f64>) -> f64 {
    crate::assert_same_dims!(a, b);
    let mut acc = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            let diff = a[(i, j)] - b[(i, j)];
            acc += diff * diff;
        }
    }
    acc
}

/// Squared Euclidean distance between two matrix rows
///
/// ### Params
///
/// * `a` - First matrix
/// * `row_a` - Row index into `a`
/// * `b` - Second matrix
/// * `row_b` - Row index into `b`
///
/// ### Returns
///
/// The squared distance between the two rows.
pub fn row_sq_distance(a: MatRef<f64>, row_a: usize, b: MatRef<f64>, row_b: usize) -> f64 {
    let mut acc = 0.0;
    for j in 0..a.ncols() {
        let diff = a[(row_a, j)] - b[(row_b, j)];
        acc += diff * diff;
    }
    acc
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_rank_vector_ties() {
        let ranks = rank_vector(&[2.0, 1.0, 2.0, 5.0]);
        assert_eq!(ranks, vec![2.5, 1.0, 2.5, 4.0]);
    }

    #[test]
    fn test_col_means() {
        let m = mat![[1.0, 10.0], [3.0, 30.0]];
        assert_eq!(col_means(m.as_ref()), vec![2.0, 20.0]);
    }

    #[test]
    fn test_total_sum_of_squares() {
        let m = mat![[1.0, 0.0], [3.0, 0.0]];
        // Deviations of column one are -1 and +1, column two is constant
        assert!((total_sum_of_squares(m.as_ref()) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_row_sq_distance() {
        let a = mat![[0.0, 0.0], [3.0, 4.0]];
        assert!((row_sq_distance(a.as_ref(), 0, a.as_ref(), 1) - 25.0).abs() < 1e-12);
    }
}
