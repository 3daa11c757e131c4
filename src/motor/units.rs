// Engineering unit conversions used by the motor session
//
// The motor speaks radians and rad/s on the wire; callers often think in
// rpm and degrees. Factors are fixed so that a converted value always
// encodes to the same frame.

pub const RPM_TO_RADIANPERSEC: f64 = 0.10471975511965977;
pub const RADIANPERSEC_TO_RPM: f64 = 9.54929658551;
pub const DEGREE_TO_RADIAN: f64 = 0.017453292519943295;
pub const RADIAN_TO_DEGREE: f64 = 57.2957795131;

/// Convert revolutions per minute to radians per second
pub fn rpm_to_rad_per_sec(rpm: f64) -> f64 {
    rpm * RPM_TO_RADIANPERSEC
}

/// Convert radians per second to revolutions per minute
pub fn rad_per_sec_to_rpm(rad_per_sec: f64) -> f64 {
    rad_per_sec * RADIANPERSEC_TO_RPM
}

pub fn degrees_to_radians(deg: f64) -> f64 {
    deg * DEGREE_TO_RADIAN
}

pub fn radians_to_degrees(rad: f64) -> f64 {
    rad * RADIAN_TO_DEGREE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_err(a: f64, b: f64) -> f64 {
        if b == 0.0 { a.abs() } else { ((a - b) / b).abs() }
    }

    #[test]
    fn test_rpm_round_trip() {
        for rpm in [-3000.0, -1.0, 0.5, 60.0, 1234.5] {
            let back = rad_per_sec_to_rpm(rpm_to_rad_per_sec(rpm));
            assert!(rel_err(back, rpm) < 1e-9, "rpm {} came back as {}", rpm, back);
        }
    }

    #[test]
    fn test_degree_round_trip() {
        for deg in [-720.0, -90.0, 1.0, 45.0, 360.0] {
            let back = radians_to_degrees(degrees_to_radians(deg));
            assert!(rel_err(back, deg) < 1e-9, "deg {} came back as {}", deg, back);
        }
    }

    #[test]
    fn test_known_values() {
        assert!((rpm_to_rad_per_sec(60.0) - 2.0 * std::f64::consts::PI).abs() < 1e-12);
        assert!((degrees_to_radians(180.0) - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(rpm_to_rad_per_sec(0.0), 0.0);
    }
}
