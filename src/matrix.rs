//! 3x3 matrix multiplication over unsigned 256-bit integers

use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::U256;

pub const DIM: usize = 3;

/// Row-major 3x3 matrix
pub type Matrix = [[U256; DIM]; DIM];

/// Multiply `a * b`, failing instead of wrapping on overflow.
pub fn multiply(a: &Matrix, b: &Matrix) -> SubmitterResult<Matrix> {
    let mut result = [[U256::zero(); DIM]; DIM];

    for i in 0..DIM {
        for j in 0..DIM {
            let mut acc = U256::zero();
            for k in 0..DIM {
                let product = a[i][k]
                    .checked_mul(b[k][j])
                    .ok_or(SubmitterError::ArithmeticOverflow("matrix multiply"))?;
                acc = acc
                    .checked_add(product)
                    .ok_or(SubmitterError::ArithmeticOverflow("matrix multiply"))?;
            }
            result[i][j] = acc;
        }
    }

    Ok(result)
}

/// Cells in row-major order, the Merkle leaf sequence.
pub fn row_major(matrix: &Matrix) -> Vec<U256> {
    matrix.iter().flat_map(|row| row.iter().copied()).collect()
}

/// Build a matrix from small integers
pub fn from_u64(rows: [[u64; DIM]; DIM]) -> Matrix {
    rows.map(|row| row.map(U256::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let identity = from_u64([[1, 0, 0], [0, 1, 0], [0, 0, 1]]);
        let m = from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        assert_eq!(multiply(&m, &identity).unwrap(), m);
        assert_eq!(multiply(&identity, &m).unwrap(), m);
    }

    #[test]
    fn test_product() {
        let a = from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        let b = from_u64([[9, 8, 7], [6, 5, 4], [3, 2, 1]]);
        let expected = from_u64([[30, 24, 18], [84, 69, 54], [138, 114, 90]]);
        assert_eq!(multiply(&a, &b).unwrap(), expected);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut a = from_u64([[0; DIM]; DIM]);
        a[0][0] = U256::MAX;
        let b = from_u64([[2, 0, 0], [0, 0, 0], [0, 0, 0]]);
        assert!(matches!(
            multiply(&a, &b),
            Err(SubmitterError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn test_row_major_order() {
        let m = from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        let cells: Vec<u64> = row_major(&m).iter().map(|v| v.as_u64()).collect();
        assert_eq!(cells, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }
}
