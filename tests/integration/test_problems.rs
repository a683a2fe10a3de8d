//! Classic unconstrained test problems.

use crate::test_helpers::distance;
use ndarray::{array, Array1};
use newuoa_rs::{ExitStatus, Newuoa};

fn booth(x: &Array1<f64>) -> f64 {
    (x[0] + 2.0 * x[1] - 7.0).powi(2) + (2.0 * x[0] + x[1] - 5.0).powi(2)
}

fn beale(x: &Array1<f64>) -> f64 {
    let (a, b) = (x[0], x[1]);
    (1.5 - a + a * b).powi(2)
        + (2.25 - a + a * b * b).powi(2)
        + (2.625 - a + a * b * b * b).powi(2)
}

fn scaled_quadratic(x: &Array1<f64>) -> f64 {
    x.iter()
        .enumerate()
        .map(|(i, xi)| 10f64.powi(i as i32) * (xi - 1.0).powi(2))
        .sum()
}

fn extended_rosenbrock(x: &Array1<f64>) -> f64 {
    x.windows(2)
        .into_iter()
        .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
        .sum()
}

#[test]
fn test_booth() {
    let result = Newuoa::new()
        .with_rhoend(1e-8)
        .minimize(&mut booth, &array![0.0, 0.0])
        .unwrap();
    assert_eq!(result.status, ExitStatus::SmallTrRadius);
    assert!(distance(&result.x, &array![1.0, 3.0]) < 1e-5);
    assert!(result.f < 1e-10);
}

#[test]
fn test_beale() {
    let result = Newuoa::new()
        .with_rhobeg(0.5)
        .with_rhoend(1e-8)
        .with_maxfun(5000)
        .minimize(&mut beale, &array![1.0, 1.0])
        .unwrap();
    assert!(result.success);
    assert!(result.f < 1e-8);
    assert!(distance(&result.x, &array![3.0, 0.5]) < 1e-3);
}

#[test]
fn test_scaled_quadratic() {
    let x0 = Array1::zeros(4);
    let result = Newuoa::new()
        .with_rhoend(1e-8)
        .with_maxfun(5000)
        .minimize(&mut scaled_quadratic, &x0)
        .unwrap();
    assert!(result.success);
    assert!(result.f < 1e-8);
}

#[test]
fn test_extended_rosenbrock() {
    let x0 = array![-1.2, 1.0, -1.2, 1.0];
    let result = Newuoa::new()
        .with_rhobeg(0.5)
        .with_rhoend(1e-8)
        .with_maxfun(20000)
        .minimize(&mut extended_rosenbrock, &x0)
        .unwrap();
    assert!(result.success);
    assert!(result.f < 1e-6);
    assert!(result.f <= extended_rosenbrock(&x0));
}
