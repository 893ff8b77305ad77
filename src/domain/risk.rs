//! Rule-based clinical risk scoring.
//!
//! Independent of the model: every satisfied condition adds its points and
//! the total maps onto a three-tier category used to temper model confidence.

use super::patient::{fields, FieldTypeError, PatientInput};

/// Clinical risk tier for an operative delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    /// Map a point total onto a tier: 4+ is High, 2-3 is Medium.
    #[must_use]
    pub fn from_points(points: u32) -> Self {
        if points >= 4 {
            Self::High
        } else if points >= 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Score a request.
    ///
    /// # Errors
    /// Returns `FieldTypeError` if a threshold field holds a non-numeric value.
    pub fn evaluate(input: &PatientInput) -> Result<Self, FieldTypeError> {
        Ok(RiskFactors::from_input(input)?.category())
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Conditions contributing to the clinical risk score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskFactors {
    /// Bishop score below 6
    pub unfavorable_cervix: bool,
    /// Cervical dilation below 3 cm
    pub limited_dilation: bool,
    /// Fetal station above -2 (head not engaged)
    pub high_station: bool,
    pub previous_cesarean: bool,
    /// Breech presentation; normally caught by the override rules first
    pub breech: bool,
    pub gestational_diabetes: bool,
    pub hypertension: bool,
    /// Maternal age over 35
    pub advanced_maternal_age: bool,
    /// BMI over 30
    pub obesity: bool,
}

impl RiskFactors {
    /// Read the risk conditions. Missing numeric fields count as 0.
    ///
    /// # Errors
    /// Returns `FieldTypeError` if a threshold field holds a non-numeric value.
    pub fn from_input(input: &PatientInput) -> Result<Self, FieldTypeError> {
        Ok(Self {
            unfavorable_cervix: input.number(fields::BISHOP_SCORE)? < 6.0,
            limited_dilation: input.number(fields::CERVICAL_DILATION)? < 3.0,
            high_station: input.number(fields::FETAL_STATION)? < -2.0,
            previous_cesarean: input.flag(fields::PREVIOUS_CESAREAN),
            breech: input.text_lower(fields::FETAL_PRESENTATION).as_deref() == Some("breech"),
            gestational_diabetes: input.flag(fields::GESTATIONAL_DIABETES),
            hypertension: input.flag(fields::HYPERTENSION),
            advanced_maternal_age: input.number(fields::AGE)? > 35.0,
            obesity: input.number(fields::BMI)? > 30.0,
        })
    }

    /// Additive point total.
    #[must_use]
    pub fn points(&self) -> u32 {
        [
            (self.unfavorable_cervix, 1),
            (self.limited_dilation, 1),
            (self.high_station, 1),
            (self.previous_cesarean, 2),
            (self.breech, 3),
            (self.gestational_diabetes, 1),
            (self.hypertension, 1),
            (self.advanced_maternal_age, 1),
            (self.obesity, 1),
        ]
        .into_iter()
        .filter(|&(present, _)| present)
        .map(|(_, points)| points)
        .sum()
    }

    #[must_use]
    pub fn category(&self) -> RiskCategory {
        RiskCategory::from_points(self.points())
    }
}
