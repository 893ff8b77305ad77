//! Engineered feature vector for delivery-mode classifiers.
//!
//! Maps raw patient input onto the canonical feature names the exported
//! models were trained on, then adds the derived ratios and risk indices.
//! The names are part of the model exchange format and must not change,
//! including the historical `prev_ceaserean` spelling.

use super::patient::{fields, FieldTypeError, PatientInput};

/// Canonical feature names (model exchange format).
pub mod names {
    pub const MATERNAL_AGE: &str = "maternal_age";
    pub const WEIGHT_KG: &str = "weight_kg";
    pub const HEIGHT_CM: &str = "height_cm";
    pub const BMI: &str = "bmi";
    pub const PREV_CESAREAN: &str = "prev_ceaserean";
    pub const PREV_VAGINAL_BIRTH: &str = "prev_vaginal_birth";
    pub const PREV_ASSISTED: &str = "prev_assisted";
    pub const BISHOP_SCORE: &str = "bishop_score";
    pub const GEST_AGE_WEEKS: &str = "gest_age_weeks";
    pub const AMNIOTIC_FLUID_INDEX: &str = "amniotic_fluid_index_afi";
    pub const ESTIMATED_FETAL_WEIGHT: &str = "estimated_fetal_weight_g";
    pub const GESTATIONAL_DIABETES: &str = "gestational_diabetes";
    pub const HYPERTENSION: &str = "hypertension_preeclampsia";
    pub const INDUCTION_OF_LABOR: &str = "induction_of_labor";
    pub const OXYTOCIN_AUGMENTATION: &str = "oxytocin_augmentation";
    pub const PRESENTATION_CEPHALIC: &str = "fetal_presentation_cephalic";
    pub const PRESENTATION_BREECH: &str = "fetal_presentation_breech";
    pub const PRESENTATION_TRANSVERSE: &str = "fetal_presentation_transverse";
    pub const GLUCOSE_LEVEL: &str = "glucose_level";
    pub const BP_SYSTOLIC: &str = "bp_systolic";
    pub const BP_DIASTOLIC: &str = "bp_diastolic";
    pub const PULSE_PRESSURE: &str = "pulse_pressure";
    pub const BP_RATIO: &str = "bp_ratio";
    pub const BMI_BP_RATIO: &str = "bmi_bp_ratio";
    pub const GLUCOSE_WEIGHT_RATIO: &str = "glucose_weight_ratio";
    pub const GESTATION_RISK: &str = "gestation_risk";
    pub const AGE_BMI: &str = "age_bmi";
    pub const BISHOP_DELIVERY_CERTAINTY: &str = "bishops_delivery_certainty";
    pub const COMPOSITE_RISK: &str = "composite_risk";
}

/// Features the first-time variant is never trained on.
pub const PARITY_FEATURES: [&str; 4] = [
    names::PREV_CESAREAN,
    names::PREV_VAGINAL_BIRTH,
    names::PREV_ASSISTED,
    names::COMPOSITE_RISK,
];

/// Obstetric history flags that decide which model variant applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParityHistory {
    pub previous_cesarean: bool,
    pub previous_vaginal_birth: bool,
    pub previous_assisted: bool,
}

impl ParityHistory {
    #[must_use]
    pub fn from_input(input: &PatientInput) -> Self {
        Self {
            previous_cesarean: input.flag(fields::PREVIOUS_CESAREAN),
            previous_vaginal_birth: input.flag(fields::PREVIOUS_VAGINAL_BIRTH),
            previous_assisted: input.flag(fields::PREVIOUS_ASSISTED),
        }
    }

    /// No recorded prior delivery of any kind.
    #[must_use]
    pub fn is_first_time(&self) -> bool {
        !(self.previous_cesarean || self.previous_vaginal_birth || self.previous_assisted)
    }
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

/// Ordered named numeric features derived from one request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(&'static str, f64)>,
}

impl FeatureVector {
    /// Derive the full engineered feature set.
    ///
    /// Arithmetic follows IEEE-754: a zero denominator yields an infinite or
    /// NaN feature instead of an error. Non-finite values are rejected only if
    /// the active model consumes them.
    ///
    /// # Errors
    /// Returns `FieldTypeError` if a numeric field holds a non-numeric value.
    pub fn derive(input: &PatientInput) -> Result<Self, FieldTypeError> {
        let age = input.number(fields::AGE)?;
        let weight = input.number(fields::WEIGHT)?;
        let height = input.number(fields::HEIGHT)?;
        let bmi = input.number(fields::BMI)?;
        let bishop = input.number(fields::BISHOP_SCORE)?;
        let gest_age = input.number(fields::GESTATIONAL_AGE)?;
        let afi = input.number(fields::AMNIOTIC_FLUID_INDEX)?;
        let fetal_weight = input.number(fields::ESTIMATED_FETAL_WEIGHT)?;
        let glucose = input.number(fields::GLUCOSE_LEVEL)?;
        let systolic = input.number(fields::BP_SYSTOLIC)?;
        let diastolic = input.number(fields::BP_DIASTOLIC)?;

        let parity = ParityHistory::from_input(input);
        let prev_cesarean = indicator(parity.previous_cesarean);
        let prev_vaginal = indicator(parity.previous_vaginal_birth);
        let prev_assisted = indicator(parity.previous_assisted);

        let presentation = input.text_lower(fields::FETAL_PRESENTATION);
        let presentation = presentation.as_deref();

        let pulse_pressure = systolic - diastolic;
        let bp_ratio = systolic / (diastolic + 1.0);
        let bmi_bp_ratio = bmi / (pulse_pressure + 1.0);
        let glucose_weight_ratio = glucose / (weight + 1.0);
        let gestation_risk = (gest_age / 40.0) * bmi;
        let age_bmi = age * bmi;
        let certainty = (bishop / 13.0) * 100.0;
        let bishop_certainty = if certainty > 100.0 { 100.0 } else { certainty };
        let composite_risk = prev_cesarean * 0.35
            + prev_assisted * 0.35
            + prev_vaginal * 0.2
            + glucose_weight_ratio * 0.05
            + bp_ratio * 0.05;

        Ok(Self {
            entries: vec![
                (names::MATERNAL_AGE, age),
                (names::WEIGHT_KG, weight),
                (names::HEIGHT_CM, height),
                (names::BMI, bmi),
                (names::PREV_CESAREAN, prev_cesarean),
                (names::PREV_VAGINAL_BIRTH, prev_vaginal),
                (names::PREV_ASSISTED, prev_assisted),
                (names::BISHOP_SCORE, bishop),
                (names::GEST_AGE_WEEKS, gest_age),
                (names::AMNIOTIC_FLUID_INDEX, afi),
                (names::ESTIMATED_FETAL_WEIGHT, fetal_weight),
                (
                    names::GESTATIONAL_DIABETES,
                    indicator(input.flag(fields::GESTATIONAL_DIABETES)),
                ),
                (names::HYPERTENSION, indicator(input.flag(fields::HYPERTENSION))),
                (
                    names::INDUCTION_OF_LABOR,
                    indicator(input.flag(fields::INDUCTION_OF_LABOR)),
                ),
                (
                    names::OXYTOCIN_AUGMENTATION,
                    indicator(input.flag(fields::OXYTOCIN_AUGMENTATION)),
                ),
                (
                    names::PRESENTATION_CEPHALIC,
                    indicator(presentation == Some("cephalic")),
                ),
                (
                    names::PRESENTATION_BREECH,
                    indicator(presentation == Some("breech")),
                ),
                (
                    names::PRESENTATION_TRANSVERSE,
                    indicator(presentation == Some("transverse")),
                ),
                (names::GLUCOSE_LEVEL, glucose),
                (names::BP_SYSTOLIC, systolic),
                (names::BP_DIASTOLIC, diastolic),
                (names::PULSE_PRESSURE, pulse_pressure),
                (names::BP_RATIO, bp_ratio),
                (names::BMI_BP_RATIO, bmi_bp_ratio),
                (names::GLUCOSE_WEIGHT_RATIO, glucose_weight_ratio),
                (names::GESTATION_RISK, gestation_risk),
                (names::AGE_BMI, age_bmi),
                (names::BISHOP_DELIVERY_CERTAINTY, bishop_certainty),
                (names::COMPOSITE_RISK, composite_risk),
            ],
        })
    }

    /// Look up a feature by canonical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, v)| v)
    }

    /// Feature names in derivation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|&(n, _)| n)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Project onto a model's expected feature order.
    ///
    /// Expected features that were not derived are filled with 0; derived
    /// features the model does not expect are dropped.
    #[must_use]
    pub fn align<S: AsRef<str>>(&self, expected: &[S]) -> Vec<f64> {
        expected
            .iter()
            .map(|name| self.get(name.as_ref()).unwrap_or(0.0))
            .collect()
    }
}
