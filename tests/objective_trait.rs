//! Integration tests for the Objective trait.

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1};
use newuoa_rs::{ExitStatus, Newuoa, Objective};

/// Least-squares misfit of the line y = a * x + b to exact data y = 2x + 3,
/// counting its evaluations.
struct LineFit {
    x_data: Array1<f64>,
    y_data: Array1<f64>,
    evaluations: usize,
}

impl LineFit {
    fn new() -> Self {
        let x_data = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_data = x_data.mapv(|x| 2.0 * x + 3.0);
        Self {
            x_data,
            y_data,
            evaluations: 0,
        }
    }
}

impl Objective for LineFit {
    fn eval(&mut self, params: &Array1<f64>) -> f64 {
        self.evaluations += 1;
        self.x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(x, y)| (params[0] * x + params[1] - y).powi(2))
            .sum()
    }
}

#[test]
fn test_struct_objective() {
    let mut problem = LineFit::new();
    let result = Newuoa::new()
        .with_rhoend(1e-8)
        .minimize(&mut problem, &array![0.0, 0.0])
        .unwrap();

    assert_eq!(result.status, ExitStatus::SmallTrRadius);
    assert_abs_diff_eq!(result.x[0], 2.0, epsilon = 1e-5);
    assert_abs_diff_eq!(result.x[1], 3.0, epsilon = 1e-5);
    assert_eq!(problem.evaluations, result.nf);
}

#[test]
fn test_trait_object() {
    let mut problem = LineFit::new();
    let objective: &mut dyn Objective = &mut problem;
    let result = Newuoa::new()
        .with_maxfun(10)
        .minimize(objective, &array![1.0, 1.0])
        .unwrap();
    assert_eq!(result.status, ExitStatus::MaxfunReached);
    assert_eq!(problem.evaluations, 10);
}

#[test]
fn test_closure_with_state() {
    let mut points = Vec::new();
    let mut f = |x: &Array1<f64>| {
        points.push(x.clone());
        (x[0] - 0.5).powi(2) + (x[1] + 0.25).powi(2)
    };
    let result = Newuoa::new()
        .with_rhobeg(0.1)
        .minimize(&mut f, &array![0.0, 0.0])
        .unwrap();
    assert!(result.success);
    assert_eq!(points.len(), result.nf);
    assert_eq!(points[0], array![0.0, 0.0]);
    assert_eq!(points[1], array![0.1, 0.0]);
}
