//! Cooking unit table used when merging duplicate grocery lines.
//!
//! Each known unit belongs to one dimension and has a factor to that
//! dimension's base (millilitres, grams, or pieces). Amounts only convert
//! within a dimension.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Volume,
    Weight,
    Count,
}

const UNITS: &[(&str, Dimension, f64)] = &[
    ("cup", Dimension::Volume, 240.0),
    ("cups", Dimension::Volume, 240.0),
    ("c", Dimension::Volume, 240.0),
    ("tablespoon", Dimension::Volume, 15.0),
    ("tablespoons", Dimension::Volume, 15.0),
    ("tbsp", Dimension::Volume, 15.0),
    ("teaspoon", Dimension::Volume, 5.0),
    ("teaspoons", Dimension::Volume, 5.0),
    ("tsp", Dimension::Volume, 5.0),
    ("milliliter", Dimension::Volume, 1.0),
    ("milliliters", Dimension::Volume, 1.0),
    ("ml", Dimension::Volume, 1.0),
    ("liter", Dimension::Volume, 1000.0),
    ("liters", Dimension::Volume, 1000.0),
    ("l", Dimension::Volume, 1000.0),
    ("fluid ounce", Dimension::Volume, 30.0),
    ("fluid ounces", Dimension::Volume, 30.0),
    ("fl oz", Dimension::Volume, 30.0),
    ("pint", Dimension::Volume, 480.0),
    ("pints", Dimension::Volume, 480.0),
    ("pt", Dimension::Volume, 480.0),
    ("quart", Dimension::Volume, 960.0),
    ("quarts", Dimension::Volume, 960.0),
    ("qt", Dimension::Volume, 960.0),
    ("gallon", Dimension::Volume, 3840.0),
    ("gallons", Dimension::Volume, 3840.0),
    ("gal", Dimension::Volume, 3840.0),
    ("gram", Dimension::Weight, 1.0),
    ("grams", Dimension::Weight, 1.0),
    ("g", Dimension::Weight, 1.0),
    ("kilogram", Dimension::Weight, 1000.0),
    ("kilograms", Dimension::Weight, 1000.0),
    ("kg", Dimension::Weight, 1000.0),
    ("ounce", Dimension::Weight, 28.35),
    ("ounces", Dimension::Weight, 28.35),
    ("oz", Dimension::Weight, 28.35),
    ("pound", Dimension::Weight, 453.59),
    ("pounds", Dimension::Weight, 453.59),
    ("lb", Dimension::Weight, 453.59),
    ("lbs", Dimension::Weight, 453.59),
    ("milligram", Dimension::Weight, 0.001),
    ("milligrams", Dimension::Weight, 0.001),
    ("mg", Dimension::Weight, 0.001),
    ("piece", Dimension::Count, 1.0),
    ("pieces", Dimension::Count, 1.0),
    ("whole", Dimension::Count, 1.0),
    ("item", Dimension::Count, 1.0),
    ("items", Dimension::Count, 1.0),
    ("clove", Dimension::Count, 1.0),
    ("cloves", Dimension::Count, 1.0),
    ("slice", Dimension::Count, 1.0),
    ("slices", Dimension::Count, 1.0),
    ("", Dimension::Count, 1.0),
];

pub fn normalize_unit(unit: &str) -> String {
    unit.trim().to_lowercase()
}

fn lookup(unit: &str) -> Option<(Dimension, f64)> {
    let unit = normalize_unit(unit);
    UNITS
        .iter()
        .find(|(name, _, _)| *name == unit)
        .map(|(_, dim, factor)| (*dim, *factor))
}

pub fn dimension(unit: &str) -> Option<Dimension> {
    lookup(unit).map(|(dim, _)| dim)
}

/// Convert `quantity` from one unit to another.
///
/// Identical units (after normalization) always convert, even when the unit
/// is not in the table. Otherwise both units must be known and share a
/// dimension.
pub fn convert(quantity: f64, from: &str, to: &str) -> Option<f64> {
    if normalize_unit(from) == normalize_unit(to) {
        return Some(quantity);
    }
    let (from_dim, from_factor) = lookup(from)?;
    let (to_dim, to_factor) = lookup(to)?;
    if from_dim != to_dim {
        return None;
    }
    Some(quantity * from_factor / to_factor)
}

/// Round to three decimal places so merged sums print cleanly.
pub fn round_amount(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_unit_always_converts() {
        assert_eq!(convert(2.0, "bunch", " Bunch "), Some(2.0));
    }

    #[test]
    fn test_volume_conversion() {
        let tbsp = convert(3.0, "tbsp", "cup").unwrap();
        assert!((tbsp - 0.1875).abs() < 1e-9);
        assert_eq!(convert(1.0, "cups", "cup"), Some(1.0));
    }

    #[test]
    fn test_weight_conversion() {
        let grams = convert(1.0, "lb", "g").unwrap();
        assert!((grams - 453.59).abs() < 1e-9);
    }

    #[test]
    fn test_cross_dimension_refused() {
        assert_eq!(convert(2.0, "cup", "g"), None);
        assert_eq!(convert(2.0, "clove", "tbsp"), None);
    }

    #[test]
    fn test_unknown_unit_refused() {
        assert_eq!(convert(2.0, "bunch", "cup"), None);
        assert_eq!(dimension("handful"), None);
    }

    #[test]
    fn test_empty_unit_is_count() {
        assert_eq!(dimension(""), Some(Dimension::Count));
        assert_eq!(convert(2.0, "", "pieces"), Some(2.0));
    }

    #[test]
    fn test_round_amount() {
        assert_eq!(round_amount(0.1 + 0.2), 0.3);
        assert_eq!(round_amount(2.18749), 2.187);
    }
}
