//! The 24 coefficients of the fleet model.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};

pub const PARAMETER_COUNT: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterGroup {
    Icev,
    Bev,
    Phev,
    Travel,
    Emissions,
    Infrastructure,
}

/// Static description of one coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub group: ParameterGroup,
    pub baseline: f64,
    /// Documented adjustable range; `None` for coefficients held fixed.
    pub range: Option<(f64, f64)>,
}

const fn fixed(
    name: &'static str,
    label: &'static str,
    group: ParameterGroup,
    baseline: f64,
) -> ParameterDescriptor {
    ParameterDescriptor {
        name,
        label,
        group,
        baseline,
        range: None,
    }
}

const fn ranged(
    name: &'static str,
    label: &'static str,
    group: ParameterGroup,
    baseline: f64,
    min: f64,
    max: f64,
) -> ParameterDescriptor {
    ParameterDescriptor {
        name,
        label,
        group,
        baseline,
        range: Some((min, max)),
    }
}

/// Coefficients in model order, with the fitted New York baseline.
pub const DESCRIPTORS: [ParameterDescriptor; PARAMETER_COUNT] = [
    ranged("r1", "ICEV growth rate", ParameterGroup::Icev, 0.032700, 0.0, 0.1),
    fixed("K1", "Fleet carrying capacity", ParameterGroup::Icev, 5.000000),
    fixed("alpha1", "Conversion share to BEV", ParameterGroup::Bev, 1.000000),
    fixed("alpha2", "Conversion share to PHEV", ParameterGroup::Phev, 0.001000),
    ranged("r2", "BEV growth rate", ParameterGroup::Bev, 0.610068, 0.0, 2.0),
    ranged("beta1", "BEV incentive sensitivity", ParameterGroup::Bev, 0.001000, 0.0, 0.01),
    ranged("gamma1", "BEV retirement rate", ParameterGroup::Bev, 0.226969, 0.0, 1.0),
    ranged("r3", "PHEV growth rate", ParameterGroup::Phev, 0.739612, 0.0, 2.0),
    ranged("beta2", "PHEV incentive sensitivity", ParameterGroup::Phev, 1.602318, 0.0, 3.0),
    ranged("gamma2", "PHEV retirement rate", ParameterGroup::Phev, 0.472536, 0.0, 1.0),
    fixed("phi1", "ICEV travel accrual", ParameterGroup::Travel, 1.064947),
    fixed("phi2", "BEV travel accrual", ParameterGroup::Travel, 0.010000),
    fixed("phi3", "PHEV travel accrual", ParameterGroup::Travel, 0.010000),
    fixed("eta", "Travel decay", ParameterGroup::Travel, 1.092616),
    ranged("psi1", "ICEV emission factor", ParameterGroup::Emissions, 0.013436, 0.0, 0.05),
    ranged("psi2", "BEV emission reduction", ParameterGroup::Emissions, 0.233819, 0.0, 1.0),
    fixed("psi3", "PHEV emission factor", ParameterGroup::Emissions, 0.515323),
    ranged("delta", "Emission decay", ParameterGroup::Emissions, 0.111435, 0.0, 0.5),
    ranged("epsilon", "ICEV natural decline", ParameterGroup::Icev, 0.001000, 0.0, 0.01),
    fixed("zeta", "ICEV share emission penalty", ParameterGroup::Emissions, 0.002782),
    ranged("kappa", "Station deployment rate", ParameterGroup::Infrastructure, 0.622263, 0.0, 2.0),
    ranged("lambda_S", "Station depreciation", ParameterGroup::Infrastructure, 0.143516, 0.0, 0.5),
    ranged("omega", "EV market pressure", ParameterGroup::Icev, 0.001000, 0.0, 0.01),
    ranged("tau", "ICEV to EV conversion rate", ParameterGroup::Icev, 0.034564, 0.0, 0.1),
];

/// Ordered coefficient vector. Always holds exactly 24 finite values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct ParameterVector {
    values: [f64; PARAMETER_COUNT],
}

impl ParameterVector {
    /// Fails with `InvalidParameterVector` on wrong arity or a non-finite entry.
    pub fn new(values: &[f64]) -> Result<Self> {
        let values: [f64; PARAMETER_COUNT] = values.try_into().map_err(|_| {
            FleetError::InvalidParameterVector(format!(
                "expected {PARAMETER_COUNT} coefficients, got {}",
                values.len()
            ))
        })?;

        if let Some((idx, value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(FleetError::InvalidParameterVector(format!(
                "coefficient {} is not finite ({value})",
                DESCRIPTORS[idx].name
            )));
        }

        Ok(Self { values })
    }

    /// The fitted reference parameterization used for baseline runs.
    pub fn baseline() -> Self {
        Self {
            values: DESCRIPTORS.map(|d| d.baseline),
        }
    }

    pub fn values(&self) -> &[f64; PARAMETER_COUNT] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        index_of(name).map(|idx| self.values[idx])
    }

    /// Copy with one coefficient replaced by symbol name.
    pub fn with(mut self, name: &str, value: f64) -> Result<Self> {
        let idx = index_of(name).ok_or_else(|| {
            FleetError::InvalidParameterVector(format!("unknown coefficient {name:?}"))
        })?;
        if !value.is_finite() {
            return Err(FleetError::InvalidParameterVector(format!(
                "coefficient {name} is not finite ({value})"
            )));
        }
        self.values[idx] = value;
        Ok(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static ParameterDescriptor, f64)> + '_ {
        DESCRIPTORS.iter().zip(self.values.iter().copied())
    }

    /// Coefficients lying outside their documented adjustable range.
    pub fn out_of_range(&self) -> Vec<&'static str> {
        self.iter()
            .filter_map(|(descriptor, value)| match descriptor.range {
                Some((min, max)) if value < min || value > max => Some(descriptor.name),
                _ => None,
            })
            .collect()
    }
}

impl Default for ParameterVector {
    fn default() -> Self {
        Self::baseline()
    }
}

impl TryFrom<Vec<f64>> for ParameterVector {
    type Error = FleetError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(&values)
    }
}

impl From<ParameterVector> for Vec<f64> {
    fn from(params: ParameterVector) -> Self {
        params.values.to_vec()
    }
}

fn index_of(name: &str) -> Option<usize> {
    DESCRIPTORS.iter().position(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_matches_fitted_values() {
        let params = ParameterVector::baseline();
        assert_eq!(params.get("r1"), Some(0.032700));
        assert_eq!(params.get("K1"), Some(5.0));
        assert_eq!(params.get("beta2"), Some(1.602318));
        assert_eq!(params.get("tau"), Some(0.034564));
        assert_eq!(params.values()[13], 1.092616);
        assert!(params.out_of_range().is_empty());
    }

    #[test]
    fn descriptor_names_are_unique() {
        for (i, a) in DESCRIPTORS.iter().enumerate() {
            for b in &DESCRIPTORS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
        let adjustable = DESCRIPTORS.iter().filter(|d| d.range.is_some()).count();
        assert_eq!(adjustable, 15);
    }

    #[test]
    fn new_rejects_wrong_arity() {
        let err = ParameterVector::new(&[0.1; 23]).unwrap_err();
        assert!(matches!(err, FleetError::InvalidParameterVector(_)));
        assert!(err.to_string().contains("got 23"), "got \"{err}\"");
        assert!(ParameterVector::new(&[0.1; 25]).is_err());
    }

    #[test]
    fn new_rejects_non_finite_and_names_it() {
        let mut values = *ParameterVector::baseline().values();
        values[21] = f64::INFINITY;
        let err = ParameterVector::new(&values).unwrap_err();
        assert!(err.to_string().contains("lambda_S"), "got \"{err}\"");
    }

    #[test]
    fn with_overrides_by_name() {
        let params = ParameterVector::baseline().with("tau", 0.05).unwrap();
        assert_eq!(params.get("tau"), Some(0.05));
        assert_eq!(params.get("r1"), Some(0.032700));

        assert!(ParameterVector::baseline().with("nope", 1.0).is_err());
        assert!(ParameterVector::baseline().with("tau", f64::NAN).is_err());
    }

    #[test]
    fn out_of_range_is_advisory() {
        let params = ParameterVector::baseline()
            .with("r2", 2.5)
            .unwrap()
            .with("K1", 50.0)
            .unwrap();
        assert_eq!(params.out_of_range(), vec!["r2"]);
    }

    #[test]
    fn serde_round_trip_validates() {
        let params = ParameterVector::baseline();
        let json = serde_json::to_string(&params).unwrap();
        let back: ParameterVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);

        let short: std::result::Result<ParameterVector, _> = serde_json::from_str("[1.0, 2.0]");
        assert!(short.is_err());
    }
}
