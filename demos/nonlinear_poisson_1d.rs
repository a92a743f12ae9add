//! Solves the nonlinear Poisson problem
//!
//! $$ -((1 + u^2) u')' = f \quad \text{on } (0, 1), \qquad u(0) = 0, \quad u(1) = 1 $$
//!
//! with piecewise linear elements and Newton's method on top of [`NonlinearForm`].
//!
//! Usage: `cargo run --example nonlinear_poisson_1d [problem] [num_cells]`, where `problem`
//! selects the source term `f` (see [`problems`]).
use eyre::eyre;
use fenris_nonlinear::constraints::BoundaryMarker;
use fenris_nonlinear::contribution::{LocalContext, LocalContribution, LocalJacobian};
use fenris_nonlinear::form::NonlinearForm;
use fenris_nonlinear::nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use fenris_nonlinear::operator::Operator;
use fenris_nonlinear::space::procedural::line_p1_space;
use fenris_nonlinear::Real;
use numeric_literals::replace_float_literals;
use std::sync::Arc;

/// The diffusion term $-((1 + u^2) u')'$ on a segment of length `h`, with the coefficient
/// evaluated at the segment midpoint.
struct QuadraticDiffusion<T> {
    h: T,
}

impl<T: Real> QuadraticDiffusion<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn coefficient(&self, u: &DVectorView<T>) -> (T, T) {
        let m = 0.5 * (u[0] + u[1]);
        (1.0 + m * m, m)
    }
}

impl<T: Real> LocalContribution<T> for QuadraticDiffusion<T> {
    fn assemble_local_residual_into(
        &self,
        _context: &LocalContext,
        u_local: DVectorView<T>,
        mut output: DVectorViewMut<T>,
    ) -> eyre::Result<()> {
        let (k, _) = self.coefficient(&u_local);
        let flux = k * (u_local[1] - u_local[0]) / self.h;
        output[0] = -flux;
        output[1] = flux;
        Ok(())
    }

    fn as_jacobian(&self) -> Option<&dyn LocalJacobian<T>> {
        Some(self)
    }
}

impl<T: Real> LocalJacobian<T> for QuadraticDiffusion<T> {
    fn assemble_local_jacobian_into(
        &self,
        _context: &LocalContext,
        u_local: DVectorView<T>,
        mut output: DMatrixViewMut<T>,
    ) -> eyre::Result<()> {
        let (k, dk_du) = self.coefficient(&u_local);
        let g = (u_local[1] - u_local[0]) / self.h;
        // dk/du_j is m for both local dofs
        let d_flux = [dk_du * g - k / self.h, dk_du * g + k / self.h];
        for j in 0..2 {
            output[(0, j)] = -d_flux[j];
            output[(1, j)] = d_flux[j];
        }
        Ok(())
    }
}

type Source = Box<dyn Fn(f64) -> f64>;

/// The selectable source terms, by name.
fn problems() -> Vec<(&'static str, Source)> {
    use std::f64::consts::PI;
    vec![
        ("constant", Box::new(|_: f64| 4.0) as Source),
        ("sine", Box::new(|x: f64| 10.0 * f64::sin(PI * x)) as Source),
        ("point", Box::new(|x: f64| if (x - 0.5).abs() < 0.1 { 20.0 } else { 0.0 }) as Source),
    ]
}

/// The lumped load $-\int f \phi_i$, with `f` evaluated at the cell midpoint.
struct Load {
    h: f64,
    source: Source,
}

impl LocalContribution<f64> for Load {
    fn assemble_local_residual_into(
        &self,
        context: &LocalContext,
        _u_local: DVectorView<f64>,
        mut output: DVectorViewMut<f64>,
    ) -> eyre::Result<()> {
        let midpoint = (context.index as f64 + 0.5) * self.h;
        output.fill(-0.5 * self.h * (self.source)(midpoint));
        Ok(())
    }

    fn as_jacobian(&self) -> Option<&dyn LocalJacobian<f64>> {
        Some(self)
    }
}

impl LocalJacobian<f64> for Load {
    fn assemble_local_jacobian_into(
        &self,
        _context: &LocalContext,
        _u_local: DVectorView<f64>,
        _output: DMatrixViewMut<f64>,
    ) -> eyre::Result<()> {
        Ok(())
    }
}

/// Builds the form `F(u) = K(u) u - f_h`.
fn build_form(num_cells: usize, source: Source) -> NonlinearForm<f64> {
    let h = 1.0 / num_cells as f64;
    let mut form = NonlinearForm::new(Arc::new(line_p1_space(num_cells)));
    form.add_domain_contribution(QuadraticDiffusion { h });
    form.add_domain_contribution(Load { h, source });
    form
}

fn solve(num_cells: usize, source: Source) -> eyre::Result<DVector<f64>> {
    let mut form = build_form(num_cells, source);
    let n = form.num_dofs();

    // Linear initial guess, which already satisfies the boundary conditions
    let mut u = DVector::from_fn(n, |i, _| i as f64 / num_cells as f64);
    let mut rhs = DVector::zeros(n);
    form.set_essential_bc_with_rhs(&BoundaryMarker::all(2), &mut rhs, &u)?;

    let max_iterations = 20;
    let tolerance = 1e-12;
    for iteration in 0..max_iterations {
        let residual = form.apply(DVectorView::from(&u))? - &rhs;
        let residual_norm = residual.norm();
        println!("Newton iteration {:>2}: |F(u) - b| = {:.3e}", iteration, residual_norm);
        if residual_norm <= tolerance {
            return Ok(u);
        }

        let jacobian = DMatrix::from(form.linearization(DVectorView::from(&u))?);
        let step = jacobian
            .lu()
            .solve(&residual)
            .ok_or_else(|| eyre!("Jacobian is singular in iteration {}", iteration))?;
        u -= step;
    }

    Err(eyre!("Newton's method did not converge in {} iterations", max_iterations))
}

fn main() -> eyre::Result<()> {
    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "constant".to_string());
    let num_cells = args.next().map(|arg| arg.parse()).transpose()?.unwrap_or(16);

    let source = problems()
        .into_iter()
        .find_map(|(problem, source)| (problem == name).then_some(source))
        .ok_or_else(|| {
            let names: Vec<_> = problems().into_iter().map(|(problem, _)| problem).collect();
            eyre!("Unknown problem {:?}, expected one of {:?}", name, names)
        })?;

    println!("Solving problem {:?} on {} cells", name, num_cells);
    let u = solve(num_cells, source)?;
    for (i, u_i) in u.iter().enumerate() {
        println!("{:8.4} {:12.6}", i as f64 / num_cells as f64, u_i);
    }
    Ok(())
}
