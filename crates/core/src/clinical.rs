//! Derived clinical measures.

use fhir::VitalSigns;

/// Body-mass index in kg/m², rounded to one decimal place.
///
/// `None` unless both weight and a non-zero height were recorded.
pub fn calculate_bmi(vitals: &VitalSigns) -> Option<f64> {
    let weight = vitals.weight_kg?;
    let height_cm = vitals.height_cm.filter(|h| *h > 0.0)?;
    if weight <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    let bmi = weight / (height_m * height_m);
    Some((bmi * 10.0).round() / 10.0)
}

pub fn bmi_category(bmi: f64) -> &'static str {
    if bmi < 18.5 {
        "Underweight"
    } else if bmi < 25.0 {
        "Normal"
    } else if bmi < 30.0 {
        "Overweight"
    } else {
        "Obese"
    }
}
