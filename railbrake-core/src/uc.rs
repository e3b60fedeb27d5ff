//! Unit constants, stored in base SI units

use crate::si;

unit_const!(S, Time, 1.0);

unit_const!(M, Length, 1.0);

unit_const!(N, Force, 1.0);
unit_const!(KN, Force, 1.0e3);

unit_const!(M3, Volume, 1.0);
unit_const!(IN3, Volume, 1.638_706_4e-5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::*;

    #[test]
    fn test_unit_consts_match_uom() {
        // uom rounds some of its conversion factors
        let tol = Some(1e-9);
        assert!(almost_eq(KN.get::<si::kilonewton>(), 1.0, tol));
        assert!(almost_eq(M3.get::<si::cubic_meter>(), 1.0, tol));
        assert!(almost_eq(IN3.get::<si::cubic_inch>(), 1.0, tol));
        assert!(almost_eq(S.get::<si::second>(), 1.0, tol));
    }
}
