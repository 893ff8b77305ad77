//! Patient input for delivery-mode prediction.
//!
//! Requests arrive as loosely typed JSON objects: numbers, free-form yes/no
//! strings and categorical strings. Nothing is validated up front. Fields are
//! read through typed accessors so every stage of the pipeline applies the
//! same defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request payload could not be turned into a `PatientInput`.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Invalid JSON input: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid JSON input: expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A field consumed as a number held some other JSON type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("field `{field}` must be numeric, got {found}")]
pub struct FieldTypeError {
    pub field: &'static str,
    pub found: &'static str,
}

/// Recognized request fields.
pub mod fields {
    pub const AGE: &str = "age";
    pub const WEIGHT: &str = "weight";
    pub const HEIGHT: &str = "height";
    pub const BMI: &str = "bmi";
    pub const BP_SYSTOLIC: &str = "bp_systolic";
    pub const BP_DIASTOLIC: &str = "bp_diastolic";
    pub const GLUCOSE_LEVEL: &str = "glucoseLevel";
    pub const GESTATIONAL_AGE: &str = "gestational_age";
    pub const AMNIOTIC_FLUID_INDEX: &str = "amniotic_fluid_index";
    pub const ESTIMATED_FETAL_WEIGHT: &str = "estimated_fetal_weight";
    pub const PREVIOUS_CESAREAN: &str = "previous_cesarean";
    pub const PREVIOUS_VAGINAL_BIRTH: &str = "previous_vaginal_birth";
    pub const PREVIOUS_ASSISTED: &str = "previous_assisted";
    pub const GESTATIONAL_DIABETES: &str = "gestational_diabetes";
    pub const HYPERTENSION: &str = "hypertension";
    pub const FETAL_PRESENTATION: &str = "fetal_presentation";
    pub const BISHOP_SCORE: &str = "bishop_score";
    pub const INDUCTION_OF_LABOR: &str = "induction_of_labor";
    pub const OXYTOCIN_AUGMENTATION: &str = "oxytocin_augmentation";
    pub const PRIOR_SHOULDER_DYSTOCIA: &str = "prior_shoulder_dystocia";
    pub const PLACENTA_LOCATION: &str = "placenta_location";
    pub const FETAL_HEART_RATE_CATEGORY: &str = "fetal_heart_rate_category";
    pub const CERVICAL_DILATION: &str = "cervical_dilation";
    pub const FETAL_STATION: &str = "fetal_station";
}

/// Plausible ranges enforced at data entry. Outside these a value is
/// suspicious but still used.
const PLAUSIBLE_RANGES: [(&str, f64, f64); 11] = [
    (fields::HEIGHT, 100.0, 250.0),
    (fields::WEIGHT, 30.0, 200.0),
    (fields::BMI, 15.0, 40.0),
    (fields::GESTATIONAL_AGE, 1.0, 42.0),
    (fields::ESTIMATED_FETAL_WEIGHT, 500.0, 6000.0),
    (fields::AMNIOTIC_FLUID_INDEX, 5.0, 25.0),
    (fields::BISHOP_SCORE, 0.0, 13.0),
    (fields::BP_SYSTOLIC, 80.0, 200.0),
    (fields::BP_DIASTOLIC, 40.0, 120.0),
    (fields::CERVICAL_DILATION, 0.0, 10.0),
    (fields::FETAL_STATION, -5.0, 5.0),
];

/// Parse a free-form yes/no answer. Only a case-insensitive "yes" is true.
#[must_use]
pub fn parse_yes_no(value: &str) -> bool {
    value.to_lowercase() == "yes"
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Raw clinical attributes for a single prediction request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientInput {
    fields: Map<String, Value>,
}

impl PatientInput {
    /// Parse a JSON request payload. The payload must be an object.
    ///
    /// # Errors
    /// Returns `InputError` if the text is not JSON or not an object.
    pub fn from_json(raw: &str) -> Result<Self, InputError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(InputError::NotAnObject(json_kind(&other))),
        }
    }

    /// Wrap an already-decoded JSON object.
    #[must_use]
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Set a field, replacing any previous value.
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Built-in request used when the CLI is run without a payload.
    #[must_use]
    pub fn example() -> Self {
        Self::default()
            .with(fields::AGE, 26)
            .with(fields::WEIGHT, 90)
            .with(fields::HEIGHT, 165)
            .with(fields::BMI, 23.88)
            .with(fields::BP_SYSTOLIC, 110)
            .with(fields::BP_DIASTOLIC, 70)
            .with(fields::GLUCOSE_LEVEL, 100)
            .with(fields::GESTATIONAL_AGE, 39)
            .with(fields::AMNIOTIC_FLUID_INDEX, 10)
            .with(fields::ESTIMATED_FETAL_WEIGHT, 3400)
            .with(fields::PREVIOUS_CESAREAN, "Yes")
            .with(fields::PREVIOUS_VAGINAL_BIRTH, "No")
            .with(fields::PREVIOUS_ASSISTED, "No")
            .with(fields::GESTATIONAL_DIABETES, "No")
            .with(fields::HYPERTENSION, "No")
            .with(fields::FETAL_PRESENTATION, "Cephalic")
            .with(fields::BISHOP_SCORE, 8)
            .with(fields::INDUCTION_OF_LABOR, "No")
            .with(fields::OXYTOCIN_AUGMENTATION, "No")
            .with(fields::PRIOR_SHOULDER_DYSTOCIA, "No")
            .with(fields::PLACENTA_LOCATION, "Normal")
            .with(fields::FETAL_HEART_RATE_CATEGORY, "I")
            .with(fields::CERVICAL_DILATION, 4)
            .with(fields::FETAL_STATION, -1)
    }

    /// Numeric field; missing fields read as 0.
    ///
    /// # Errors
    /// Returns `FieldTypeError` if the field is present but not a JSON number.
    pub fn number(&self, field: &'static str) -> Result<f64, FieldTypeError> {
        match self.fields.get(field) {
            None => Ok(0.0),
            Some(Value::Number(n)) => n.as_f64().ok_or(FieldTypeError {
                field,
                found: "number out of range",
            }),
            Some(other) => Err(FieldTypeError {
                field,
                found: json_kind(other),
            }),
        }
    }

    /// Yes/no field. Missing or non-string values read as "no".
    #[must_use]
    pub fn flag(&self, field: &str) -> bool {
        self.text(field).is_some_and(parse_yes_no)
    }

    /// String field, if present and a string.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Lowercased string field.
    #[must_use]
    pub fn text_lower(&self, field: &str) -> Option<String> {
        self.text(field).map(str::to_lowercase)
    }

    /// Number of fields supplied in the request.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Report numeric fields that fall outside plausible clinical ranges.
    ///
    /// Absent and non-numeric fields are skipped. These are advisory only.
    #[must_use]
    pub fn range_warnings(&self) -> Vec<String> {
        PLAUSIBLE_RANGES
            .iter()
            .filter_map(|&(field, min, max)| {
                let value = self.fields.get(field)?.as_f64()?;
                if (min..=max).contains(&value) {
                    None
                } else {
                    Some(format!("{field} {value} out of range [{min}, {max}]"))
                }
            })
            .collect()
    }
}
