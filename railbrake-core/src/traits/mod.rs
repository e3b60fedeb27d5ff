use crate::imports::*;

mod serde_api;
pub use serde_api::*;

pub trait Init {
    /// Specialized code to execute upon initialization.  For any struct with fields
    /// that implement `Init`, this should propagate down the hierarchy.
    fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: Init> Init for Vec<T> {
    fn init(&mut self) -> Result<(), Error> {
        for val in self {
            val.init()?
        }
        Ok(())
    }
}

impl<T: Init> Init for Option<T> {
    fn init(&mut self) -> Result<(), Error> {
        if let Some(val) = self {
            val.init()?
        }
        Ok(())
    }
}

/// Unified access to time steps given as dimensioned quantities
pub trait TimeStep {
    /// Returns time step in seconds, rejecting negative and non-finite values
    fn as_seconds(&self) -> anyhow::Result<f64>;
}

impl TimeStep for si::Time {
    fn as_seconds(&self) -> anyhow::Result<f64> {
        let dt_s = self.get::<si::second>();
        ensure!(
            dt_s.is_finite() && dt_s >= 0.0,
            "{}\ntime step must be finite and non-negative",
            format_dbg!(dt_s)
        );
        Ok(dt_s)
    }
}
