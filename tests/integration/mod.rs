//! Integration tests on classic unconstrained test problems.

mod test_problems;
