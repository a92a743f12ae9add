use crate::unit_tests::contributions::{
    BlockResidualOnly, CoupledDiffusionReaction, FieldwiseFailOnNegative, FieldwiseReaction,
};
use fenris_nonlinear::block_form::BlockNonlinearForm;
use fenris_nonlinear::constraints::BoundaryMarker;
use fenris_nonlinear::error::{AssemblyError, Capability, SizeOf};
use fenris_nonlinear::nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use fenris_nonlinear::operator::{LinearOperator, Operator};
use fenris_nonlinear::space::procedural::{line_p0_space, line_p1_space, RIGHT_ATTRIBUTE};
use fenris_nonlinear::space::{ExplicitSpace, FieldSpace, IntegrationDomain};
use fenris_optimize::calculus::approximate_jacobian_fd;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;

fn p1_p0_spaces(num_cells: usize) -> Vec<Arc<dyn FieldSpace>> {
    vec![Arc::new(line_p1_space(num_cells)), Arc::new(line_p0_space(num_cells))]
}

fn coupled_form(num_cells: usize) -> BlockNonlinearForm<f64> {
    let h = 1.0 / num_cells as f64;
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(num_cells)).unwrap();
    form.add_domain_contribution(CoupledDiffusionReaction { h, c: 0.7 });
    form
}

fn residual(form: &mut BlockNonlinearForm<f64>, x: &DVector<f64>) -> DVector<f64> {
    form.apply(DVectorView::from(x)).unwrap()
}

fn dense_jacobian(form: &mut BlockNonlinearForm<f64>, x: &DVector<f64>) -> DMatrix<f64> {
    form.linearization(DVectorView::from(x))
        .unwrap()
        .to_dense()
}

fn sample_vector(n: usize) -> DVector<f64> {
    DVector::from_fn(n, |i, _| 0.2 + 0.9 * (i as f64 * 0.7).cos())
}

#[test]
fn partitions_cover_the_block_vector() {
    let form = coupled_form(4);
    assert_eq!(form.num_fields(), 2);
    assert_eq!(form.partition().offsets(), &[0, 5, 9]);
    assert_eq!(form.true_partition(), form.partition());
    assert_eq!(form.size(), (9, 9));
    assert_eq!(form.spaces().len(), 2);
}

#[test]
fn spaces_on_different_meshes_are_rejected() {
    let spaces: Vec<Arc<dyn FieldSpace>> = vec![Arc::new(line_p1_space(4)), Arc::new(line_p0_space(3))];
    let result = BlockNonlinearForm::<f64>::new(spaces);
    assert!(matches!(
        result,
        Err(AssemblyError::DimensionMismatch {
            what: SizeOf::MeshEntities(IntegrationDomain::Domain),
            expected: 4,
            actual: 3
        })
    ));
}

#[test]
fn set_spaces_resets_essential_dofs_and_partitions() {
    let mut form = coupled_form(3);
    form.set_essential_dofs(&[vec![0], vec![1]]).unwrap();
    form.set_spaces(p1_p0_spaces(5)).unwrap();

    assert_eq!(form.partition().offsets(), &[0, 6, 11]);
    assert!(form.essential_dofs(0).is_empty());
    assert!(form.essential_dofs(1).is_empty());
    assert_eq!(form.num_contributions(), 1);
}

#[test]
fn residual_matches_hand_computed_values() {
    // One cell of length 1: u = (u0, u1), p = (p0)
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(1)).unwrap();
    form.add_domain_contribution(CoupledDiffusionReaction { h: 1.0, c: 2.0 });
    let x = DVector::from_column_slice(&[1.0, 3.0, 0.5]);

    let y = residual(&mut form, &x);
    let expected = DVector::from_column_slice(&[-2.0 + 1.0, 2.0 + 1.0, 0.5 - 4.0]);
    assert_eq!(y, expected);
}

#[test]
fn coupled_jacobian_matches_finite_differences() {
    let mut form = coupled_form(3);
    let x = sample_vector(7);
    let jacobian = dense_jacobian(&mut form, &x);
    let mut x_perturbed = x.clone();
    let fd = approximate_jacobian_fd(7, |x, y| form.apply_into(x, y).unwrap(), &mut x_perturbed, 1e-6);
    assert_matrix_eq!(jacobian, fd, comp = abs, tol = 1e-6);
}

#[test]
fn uncoupled_field_pairs_have_no_blocks() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(3)).unwrap();
    form.add_domain_contribution(FieldwiseReaction { weight: 1.0 });
    let x = sample_vector(7);
    let operator = form.linearization(DVectorView::from(&x)).unwrap();

    assert!(operator.block(0, 0).is_some());
    assert!(operator.block(1, 1).is_some());
    assert!(operator.block(0, 1).is_none());
    assert!(operator.block(1, 0).is_none());
}

#[test]
fn essential_dofs_are_eliminated_per_field() {
    let mut form = coupled_form(3);
    // Right end point of u, first cell of p
    form.set_essential_dofs(&[vec![3], vec![0]]).unwrap();
    let x = sample_vector(7);

    let y = residual(&mut form, &x);
    assert_eq!(y[3], x[3]);
    assert_eq!(y[4], x[4]);

    let operator = form.linearization(DVectorView::from(&x)).unwrap();
    let partition = operator.partition().clone();
    let dense = operator.to_dense();
    for global in [3, 4] {
        for k in 0..7 {
            let expected = if k == global { 1.0 } else { 0.0 };
            assert_eq!(dense[(global, k)], expected);
            assert_eq!(dense[(k, global)], expected);
        }
    }

    // Off-diagonal block (0, 1) has row 3 (essential in field 0) and column 0 (essential in
    // field 1) zeroed
    let j_up = DMatrix::from(operator.block(0, 1).unwrap());
    assert_eq!(j_up.row(3).iter().copied().collect::<Vec<_>>(), vec![0.0; 3]);
    assert_eq!(j_up.column(0).iter().copied().collect::<Vec<_>>(), vec![0.0; 4]);
    assert_eq!(j_up[(1, 1)], 0.7);
    assert_eq!(partition.block_range(1), 4..7);
}

#[test]
fn essential_bc_resolves_markers_per_field() {
    let mut form = coupled_form(3);
    let mut rhs_u = DVector::repeat(4, 1.0);
    let markers = [BoundaryMarker::all(2), BoundaryMarker::all(2)];
    {
        let mut rhs = [Some(DVectorViewMut::from(&mut rhs_u)), None];
        form.set_essential_bc(&markers, &mut rhs).unwrap();
    }

    assert_eq!(form.essential_dofs(0).as_slice(), &[0, 3]);
    // Boundary elements of the P0 space carry no dofs
    assert!(form.essential_dofs(1).is_empty());
    assert_eq!(rhs_u, DVector::from_column_slice(&[0.0, 1.0, 1.0, 0.0]));
}

#[test]
fn essential_bc_with_rhs_copies_prescribed_values_per_field() {
    let mut form = coupled_form(2);
    let mut rhs_u = DVector::zeros(3);
    let mut rhs_p = DVector::zeros(2);
    let target_u = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    let target_p = DVector::from_column_slice(&[4.0, 5.0]);
    let markers = [BoundaryMarker::from_attributes(2, &[RIGHT_ATTRIBUTE]), BoundaryMarker::none(2)];
    form.set_essential_bc_with_rhs(
        &markers,
        &mut [DVectorViewMut::from(&mut rhs_u), DVectorViewMut::from(&mut rhs_p)],
        &[DVectorView::from(&target_u), DVectorView::from(&target_p)],
    )
    .unwrap();

    assert_eq!(form.essential_dofs(0).as_slice(), &[2]);
    assert_eq!(rhs_u, DVector::from_column_slice(&[0.0, 0.0, 3.0]));
    assert_eq!(rhs_p, DVector::zeros(2));
}

#[test]
fn essential_bc_rejects_wrong_number_of_markers_or_rhs() {
    let mut form = coupled_form(2);
    let result = form.set_essential_bc(&[BoundaryMarker::all(2)], &mut [None, None]);
    assert!(matches!(
        result,
        Err(AssemblyError::DimensionMismatch {
            what: SizeOf::FieldList,
            expected: 2,
            actual: 1
        })
    ));

    let markers = [BoundaryMarker::all(2), BoundaryMarker::all(2)];
    let result = form.set_essential_bc(&markers, &mut [None]);
    assert!(matches!(
        result,
        Err(AssemblyError::DimensionMismatch {
            what: SizeOf::FieldList,
            ..
        })
    ));
    assert!(form.essential_dofs(0).is_empty());
}

#[test]
fn boundary_face_contributions_are_filtered_by_marker() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(3)).unwrap();
    let marker = BoundaryMarker::from_attributes(2, &[RIGHT_ATTRIBUTE]);
    form.add_boundary_face_contribution(FieldwiseReaction { weight: 1.0 }, &marker)
        .unwrap();
    let x = DVector::from_element(7, 2.0);

    // Right boundary face: u dofs [2, 3] and the last p dof
    let y = residual(&mut form, &x);
    let expected = DVector::from_column_slice(&[0.0, 0.0, 8.0, 8.0, 0.0, 0.0, 8.0]);
    assert_eq!(y, expected);

    let result = form.add_boundary_face_contribution(FieldwiseReaction { weight: 1.0 }, &BoundaryMarker::all(3));
    assert!(matches!(result, Err(AssemblyError::DimensionMismatch { what: SizeOf::Marker, .. })));
}

#[test]
fn block_energy_sums_local_energies() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(2)).unwrap();
    form.add_domain_contribution(FieldwiseReaction { weight: 4.0 });
    let x = DVector::from_column_slice(&[1.0, 2.0, 1.0, 1.0, 2.0]);

    // u: vertex 1 is shared by both cells, p: one dof per cell
    let expected = (1.0 + 2.0 * 16.0 + 1.0) + (1.0 + 16.0);
    let energy = form.energy(DVectorView::from(&x)).unwrap();
    assert_scalar_eq!(energy, expected, comp = abs, tol = 1e-12);

    form.add_domain_contribution(CoupledDiffusionReaction { h: 0.5, c: 1.0 });
    let result = form.energy(DVectorView::from(&x));
    assert!(matches!(
        result,
        Err(AssemblyError::UnsupportedOperation {
            operation: Capability::Energy,
            contribution: 1,
            ..
        })
    ));
}

#[test]
fn residual_evaluation_invalidates_cached_operator() {
    let mut form = coupled_form(2);
    let x = sample_vector(5);
    form.linearization(DVectorView::from(&x)).unwrap();
    assert!(form.jacobian().is_some());
    residual(&mut form, &x);
    assert!(form.jacobian().is_none());
}

#[test]
fn apply_with_wrong_size_fails_without_touching_output() {
    let mut form = coupled_form(2);
    let x = DVector::zeros(5);
    let mut y = DVector::repeat(4, 3.0);
    let result = form.apply_into(DVectorView::from(&x), DVectorViewMut::from(&mut y));
    assert!(matches!(
        result,
        Err(AssemblyError::DimensionMismatch {
            what: SizeOf::Output,
            expected: 5,
            actual: 4
        })
    ));
    assert_eq!(y, DVector::repeat(4, 3.0));
}

#[test]
fn block_contribution_failure_propagates_and_leaves_output_untouched() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(3)).unwrap();
    form.add_domain_contribution(FieldwiseFailOnNegative);
    // The p dof of cell 1 is negative
    let mut x = DVector::repeat(7, 1.0);
    x[5] = -1.0;
    let mut y = DVector::repeat(7, 5.0);

    let result = form.apply_into(DVectorView::from(&x), DVectorViewMut::from(&mut y));
    match result {
        Err(AssemblyError::Contribution { domain, entity, source }) => {
            assert_eq!(domain, IntegrationDomain::Domain);
            assert_eq!(entity, 1);
            assert_eq!(source.to_string(), "Negative input on domain entity 1");
        }
        other => panic!("Unexpected result {:?}", other),
    }
    assert_eq!(y, DVector::repeat(7, 5.0));
}

#[test]
fn failed_block_linearization_keeps_previous_operator() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(2)).unwrap();
    form.add_domain_contribution(FieldwiseFailOnNegative);
    let x_good = DVector::repeat(5, 1.0);
    let mut x_bad = x_good.clone();
    x_bad[1] = -1.0;

    let expected = dense_jacobian(&mut form, &x_good);
    // The shared vertex 1 receives the identity from both cells
    let diagonal = DVector::from_column_slice(&[1.0, 2.0, 1.0, 1.0, 1.0]);
    assert_eq!(expected, DMatrix::from_diagonal(&diagonal));

    let result = form.linearization(DVectorView::from(&x_bad));
    assert!(matches!(result, Err(AssemblyError::Contribution { entity: 0, .. })));
    let kept = form
        .jacobian()
        .expect("Previous linearization must be kept");
    assert_eq!(kept.to_dense(), expected);
}

#[test]
fn residual_only_block_contribution_has_no_linearization() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(2)).unwrap();
    form.add_domain_contribution(FieldwiseReaction { weight: 1.0 });
    form.add_domain_contribution(BlockResidualOnly);
    let x = sample_vector(5);

    let mut reaction_only = BlockNonlinearForm::new(p1_p0_spaces(2)).unwrap();
    reaction_only.add_domain_contribution(FieldwiseReaction { weight: 1.0 });
    let y = residual(&mut form, &x);
    let y_reaction = residual(&mut reaction_only, &x);
    // Both cells copy the shared vertex 1
    let copies = DVector::from_column_slice(&[1.0, 2.0, 1.0, 1.0, 1.0]);
    assert_matrix_eq!(y, y_reaction + copies.component_mul(&x), comp = abs, tol = 1e-12);

    let result = form.linearization(DVectorView::from(&x));
    assert!(matches!(
        result,
        Err(AssemblyError::UnsupportedOperation {
            operation: Capability::Jacobian,
            domain: IntegrationDomain::Domain,
            contribution: 1,
        })
    ));
    assert!(form.jacobian().is_none());
}

#[test]
fn boundary_contributions_only_touch_fields_with_boundary_dofs() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(3)).unwrap();
    form.add_boundary_contribution(FieldwiseReaction { weight: 1.0 });
    let x = DVector::from_element(7, 2.0);

    // P1 boundary elements are the end points, P0 boundary elements carry no dofs
    let y = residual(&mut form, &x);
    assert_eq!(y, DVector::from_column_slice(&[8.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0]));

    let jacobian = dense_jacobian(&mut form, &x);
    let expected = DMatrix::from_diagonal(&DVector::from_column_slice(&[12.0, 0.0, 0.0, 12.0, 0.0, 0.0, 0.0]));
    assert_eq!(jacobian, expected);
}

#[test]
fn interior_face_contributions_sum_over_repeated_dofs() {
    let mut form = BlockNonlinearForm::new(p1_p0_spaces(3)).unwrap();
    form.add_interior_face_contribution(FieldwiseReaction { weight: 1.0 });
    let x = DVector::from_element(7, 1.0);

    // Face k has u dofs [k - 1, k, k, k + 1] and p dofs [k - 1, k]
    let y = residual(&mut form, &x);
    let counts = DVector::from_column_slice(&[1.0, 3.0, 3.0, 1.0, 1.0, 2.0, 1.0]);
    assert_eq!(y, counts);

    let jacobian = dense_jacobian(&mut form, &x);
    assert_eq!(jacobian, DMatrix::from_diagonal(&(counts * 3.0)));
}

#[test]
fn single_field_block_form_matches_explicit_space() {
    let space = ExplicitSpace::from_elements(3, &[vec![0, 1], vec![1, 2]]);
    let mut form = BlockNonlinearForm::new(vec![Arc::new(space) as Arc<dyn FieldSpace>]).unwrap();
    form.add_domain_contribution(FieldwiseReaction { weight: 1.0 });
    let x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    assert_eq!(residual(&mut form, &x), DVector::from_column_slice(&[1.0, 16.0, 27.0]));
}

proptest! {
    #[test]
    fn relinearization_matches_linearization_from_scratch(
        x1 in vec(-2.0..2.0f64, 9),
        x2 in vec(-2.0..2.0f64, 9)
    ) {
        let (x1, x2) = (DVector::from_vec(x1), DVector::from_vec(x2));
        let mut reused = coupled_form(4);
        reused.set_essential_dofs(&[vec![0], vec![]]).unwrap();
        dense_jacobian(&mut reused, &x1);
        let relinearized = dense_jacobian(&mut reused, &x2);

        let mut fresh = coupled_form(4);
        fresh.set_essential_dofs(&[vec![0], vec![]]).unwrap();
        prop_assert_eq!(relinearized, dense_jacobian(&mut fresh, &x2));
    }

    #[test]
    fn missing_blocks_act_as_zero(x in vec(-2.0..2.0f64, 9), v in vec(-1.0..1.0f64, 9)) {
        let (x, v) = (DVector::from_vec(x), DVector::from_vec(v));
        let mut form = BlockNonlinearForm::new(p1_p0_spaces(4)).unwrap();
        form.add_domain_contribution(FieldwiseReaction { weight: 1.0 });
        let operator = form.linearization(DVectorView::from(&x)).unwrap();

        // Only the p-part of v: the off-diagonal blocks are missing, so the u-part of the
        // result must vanish exactly
        let mut v_p = v.clone();
        v_p.rows_mut(0, 5).fill(0.0);
        let y = operator.apply(DVectorView::from(&v_p));
        prop_assert!(y.rows(0, 5).iter().all(|&y_i| y_i == 0.0));
        assert_matrix_eq!(y, operator.to_dense() * &v_p, comp = abs, tol = 1e-12);
    }
}
