use serde::Serialize;

/// Serialize a serde-backed enum into its string name (e.g. snake_case).
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plants::Sunlight;

    #[test]
    fn enum_names_are_snake_case() {
        assert_eq!(serde_enum_name(&Sunlight::PartialSun).as_deref(), Some("partial_sun"));
        assert_eq!(serde_enum_name(&Sunlight::FullShade).as_deref(), Some("full_shade"));
    }

    #[test]
    fn rounds_to_three_places() {
        assert_eq!(round_to(31.7569211455, 3), 31.757);
        assert_eq!(round_to(9.6784, 3), 9.678);
        assert_eq!(round_to(-2.0, 3), -2.0);
    }
}
