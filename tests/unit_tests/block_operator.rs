use fenris_nonlinear::block_operator::BlockOperator;
use fenris_nonlinear::nalgebra::{DMatrix, DVector, DVectorView};
use fenris_nonlinear::nalgebra_sparse::CsrMatrix;
use fenris_nonlinear::operator::LinearOperator;
use fenris_nonlinear::partition::BlockPartition;
use fenris_nonlinear::proptest::block_partition;
use matrixcompare::assert_matrix_eq;
use proptest::prelude::*;
use util::assert_panics;

fn sample_block(nrows: usize, ncols: usize, seed: usize) -> CsrMatrix<f64> {
    let dense = DMatrix::from_fn(nrows, ncols, |i, j| {
        if (i + j + seed) % 2 == 0 {
            (1 + i + 2 * j + seed) as f64
        } else {
            0.0
        }
    });
    CsrMatrix::from(&dense)
}

#[test]
fn new_block_operator_has_no_blocks() {
    let operator = BlockOperator::<f64>::new(BlockPartition::from_block_sizes([2, 1]));
    assert_eq!(operator.num_blocks(), 2);
    assert_eq!(operator.nonzero_blocks().count(), 0);
    assert!(operator.block(1, 0).is_none());
    assert_eq!(operator.to_dense(), DMatrix::zeros(3, 3));

    let x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    assert_eq!(operator.apply(DVectorView::from(&x)), DVector::zeros(3));
}

#[test]
fn blocks_are_placed_at_partition_offsets() {
    let mut operator = BlockOperator::new(BlockPartition::from_block_sizes([2, 1]));
    operator.set_block(0, 1, Some(CsrMatrix::from(&DMatrix::from_row_slice(2, 1, &[1.0, 2.0]))));
    operator.set_block(1, 1, Some(CsrMatrix::from(&DMatrix::from_row_slice(1, 1, &[3.0]))));

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        0.0, 0.0, 1.0,
        0.0, 0.0, 2.0,
        0.0, 0.0, 3.0,
    ]);
    assert_eq!(operator.to_dense(), expected);
    assert_eq!(
        operator
            .nonzero_blocks()
            .map(|(i, j, _)| (i, j))
            .collect::<Vec<_>>(),
        vec![(0, 1), (1, 1)]
    );

    if let Some(block) = operator.block_mut(1, 1) {
        block.values_mut()[0] = 4.0;
    }
    assert_eq!(operator.to_dense()[(2, 2)], 4.0);

    operator.set_block(0, 1, None);
    assert!(operator.block(0, 1).is_none());
}

#[test]
fn block_with_wrong_dimensions_panics() {
    let operator = BlockOperator::<f64>::new(BlockPartition::from_block_sizes([2, 1]));
    assert_panics!({
        let mut operator = operator.clone();
        operator.set_block(0, 1, Some(sample_block(2, 2, 0)))
    });
    assert_panics!(operator.block(2, 0));
}

proptest! {
    #[test]
    fn apply_agrees_with_dense_operator(
        partition in block_partition(4, 3),
        mask in proptest::collection::vec(any::<bool>(), 16),
    ) {
        let n = partition.num_blocks();
        let mut operator = BlockOperator::new(partition.clone());
        for i in 0..n {
            for j in 0..n {
                if mask[n * i + j] {
                    let block = sample_block(partition.block_size(i), partition.block_size(j), n * i + j);
                    operator.set_block(i, j, Some(block));
                }
            }
        }

        let x = DVector::from_fn(partition.total_size(), |i, _| (i as f64).cos());
        let y = operator.apply(DVectorView::from(&x));
        let expected = operator.to_dense() * &x;
        assert_matrix_eq!(y, expected, comp = abs, tol = 1e-12);
    }
}
