//! Validation of static parameters at initialization

use crate::imports::*;

/// Collection of validation failures for one object
#[derive(Debug, Default)]
pub struct ValidationErrors(Vec<anyhow::Error>);

pub type ValidationResults = Result<(), ValidationErrors>;

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn make_err(self) -> ValidationResults {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "{err:#}")?;
        }
        Ok(())
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::InitError(errors.to_string())
    }
}

/// Objects whose static parameters can be checked for physical sense
pub trait ObjState {
    fn validate(&self) -> ValidationResults {
        Ok(())
    }
}

/// Provides a known good instance for tests and documentation
pub trait Valid: Sized + Default {
    fn valid() -> Self {
        Self::default()
    }
}

pub fn chk_num_gtz_fin(errors: &mut ValidationErrors, val: f64, name: &str) {
    if !(val.is_finite() && val > 0.0) {
        errors.push(anyhow!("{name} = {val:?} must be a positive finite number!"));
    }
}

pub fn chk_num_gez_fin(errors: &mut ValidationErrors, val: f64, name: &str) {
    if !(val.is_finite() && val >= 0.0) {
        errors.push(anyhow!(
            "{name} = {val:?} must be a non-negative finite number!"
        ));
    }
}

pub fn chk_pct(errors: &mut ValidationErrors, val: f64, name: &str) {
    if !(0.0..=100.0).contains(&val) {
        errors.push(anyhow!("{name} = {val:?} must be within [0, 100]!"));
    }
}

pub fn si_chk_num_gtz_fin<D, U>(
    errors: &mut ValidationErrors,
    val: &uom::si::Quantity<D, U, f64>,
    name: &str,
) where
    D: uom::si::Dimension + ?Sized,
    U: uom::si::Units<f64> + ?Sized,
{
    chk_num_gtz_fin(errors, val.value, name);
}

pub fn si_chk_num_gez_fin<D, U>(
    errors: &mut ValidationErrors,
    val: &uom::si::Quantity<D, U, f64>,
    name: &str,
) where
    D: uom::si::Dimension + ?Sized,
    U: uom::si::Units<f64> + ?Sized,
{
    chk_num_gez_fin(errors, val.value, name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_collect_errors() {
        let mut errors = ValidationErrors::new();
        chk_num_gtz_fin(&mut errors, 1.0, "ok");
        chk_num_gtz_fin(&mut errors, 0.0, "zero");
        chk_num_gez_fin(&mut errors, f64::NAN, "nan");
        si_chk_num_gtz_fin(&mut errors, &(-1.0 * uc::N), "force");
        chk_pct(&mut errors, 101.0, "pct");
        assert_eq!(errors.len(), 4);
        assert!(errors.make_err().is_err());
    }

    #[test]
    fn test_no_errors_is_ok() {
        let mut errors = ValidationErrors::new();
        si_chk_num_gez_fin(&mut errors, &si::Volume::ZERO, "volume");
        assert!(errors.make_err().is_ok());
    }
}
