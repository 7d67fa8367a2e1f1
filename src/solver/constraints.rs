//! Linear equality constraints `A·μ = b` describing consistent price vectors.

use nalgebra::{DMatrix, DVector};

use crate::error::SolverError;

/// Equality system over an `n`-outcome price vector.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    matrix: DMatrix<f64>,
    rhs: DVector<f64>,
}

impl LinearConstraints {
    /// Wrap a matrix and right-hand side.
    pub fn new(matrix: DMatrix<f64>, rhs: DVector<f64>) -> Result<Self, SolverError> {
        if matrix.nrows() != rhs.len() {
            return Err(SolverError::DimensionMismatch {
                what: "right-hand side",
                expected: matrix.nrows(),
                actual: rhs.len(),
            });
        }

        Ok(Self { matrix, rhs })
    }

    /// Build from dense rows, all of length `n`.
    pub fn from_rows(n: usize, rows: &[Vec<f64>], rhs: &[f64]) -> Result<Self, SolverError> {
        if let Some(row) = rows.iter().find(|row| row.len() != n) {
            return Err(SolverError::DimensionMismatch {
                what: "constraint row",
                expected: n,
                actual: row.len(),
            });
        }

        let data: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(
            DMatrix::from_row_slice(rows.len(), n, &data),
            DVector::from_column_slice(rhs),
        )
    }

    /// No constraints beyond the box.
    pub fn unconstrained(n: usize) -> Self {
        Self {
            matrix: DMatrix::zeros(0, n),
            rhs: DVector::zeros(0),
        }
    }

    /// Each consecutive (yes, no) pair sums to one.
    ///
    /// Layout is `[yes_0, no_0, yes_1, no_1, ...]`.
    pub fn complementary_pairs(n_pairs: usize) -> Self {
        let n = n_pairs * 2;
        let mut matrix = DMatrix::zeros(n_pairs, n);
        for pair in 0..n_pairs {
            matrix[(pair, 2 * pair)] = 1.0;
            matrix[(pair, 2 * pair + 1)] = 1.0;
        }

        Self {
            matrix,
            rhs: DVector::from_element(n_pairs, 1.0),
        }
    }

    /// All `n` outcomes are mutually exclusive and exhaustive.
    pub fn exhaustive_group(n: usize) -> Self {
        Self {
            matrix: DMatrix::from_element(1, n, 1.0),
            rhs: DVector::from_element(1, 1.0),
        }
    }

    /// Number of outcomes the system constrains.
    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    /// Number of equality rows.
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    /// Whether there are no equality rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constraint matrix `A`.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Right-hand side `b`.
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// `A·μ - b`.
    pub fn residual_vector(&self, mu: &DVector<f64>) -> DVector<f64> {
        &self.matrix * mu - &self.rhs
    }

    /// Largest absolute violation `‖A·μ - b‖∞`.
    pub fn residual(&self, mu: &[f64]) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.residual_vector(&DVector::from_column_slice(mu)).amax()
    }

    /// Rows as disjoint unit-sum groups, when the system has that shape.
    ///
    /// Every row must have 0/1 coefficients, right-hand side 1, and share no
    /// column with another row. The feasible set is then a product of simplices.
    pub fn unit_sum_groups(&self) -> Option<Vec<Vec<usize>>> {
        let mut seen = vec![false; self.dimension()];
        let mut groups = Vec::with_capacity(self.len());

        for (row, rhs) in self.matrix.row_iter().zip(self.rhs.iter()) {
            if *rhs != 1.0 {
                return None;
            }

            let mut group = Vec::new();
            for (col, &coeff) in row.iter().enumerate() {
                if coeff == 0.0 {
                    continue;
                }
                if coeff != 1.0 || seen[col] {
                    return None;
                }
                seen[col] = true;
                group.push(col);
            }

            if group.is_empty() {
                return None;
            }
            groups.push(group);
        }

        Some(groups)
    }
}
