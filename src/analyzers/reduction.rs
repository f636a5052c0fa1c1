//! Reduction functions applied to the values of one field within one bucket.

use std::fmt;
use std::str::FromStr;

use crate::analyzers::utility::{mean, median, stddev};
use crate::error::FitError;
use crate::record::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    /// Number of records with the field present.
    Count,
    Mean,
    Sum,
    Median,
    Min,
    Max,
    /// Population standard deviation.
    Std,
    /// First present value in input order.
    First,
}

impl Reduction {
    /// Reduces the values present for one field in one bucket.
    ///
    /// Numeric reductions ignore text values and yield `None` when nothing
    /// numeric is left. `Count` always yields a number.
    pub fn apply(&self, values: &[&Value]) -> Option<Value> {
        match self {
            Reduction::Count => Some(Value::Number(values.len() as f64)),
            Reduction::First => values.first().map(|v| (*v).clone()),
            Reduction::Mean => numeric(values, mean),
            Reduction::Sum => numeric(values, |n| n.iter().sum()),
            Reduction::Median => numeric(values, median),
            Reduction::Min => numeric(values, |n| n.iter().copied().fold(f64::INFINITY, f64::min)),
            Reduction::Max => {
                numeric(values, |n| n.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
            Reduction::Std => numeric(values, |n| stddev(n, mean(n))),
        }
    }
}

fn numeric(values: &[&Value], reduce: impl Fn(&[f64]) -> f64) -> Option<Value> {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
    if numbers.is_empty() {
        return None;
    }
    Some(Value::Number(reduce(&numbers)))
}

impl FromStr for Reduction {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(Reduction::Count),
            "mean" | "avg" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            "median" => Ok(Reduction::Median),
            "min" => Ok(Reduction::Min),
            "max" => Ok(Reduction::Max),
            "std" => Ok(Reduction::Std),
            "first" => Ok(Reduction::First),
            _ => Err(FitError::UnsupportedReduction(s.to_string())),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reduction::Count => "count",
            Reduction::Mean => "mean",
            Reduction::Sum => "sum",
            Reduction::Median => "median",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::Std => "std",
            Reduction::First => "first",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|v| Value::Number(*v)).collect()
    }

    #[test]
    fn test_numeric_reductions() {
        let owned = nums(&[30.0, 20.0, 40.0]);
        let values: Vec<&Value> = owned.iter().collect();

        assert_eq!(Reduction::Mean.apply(&values), Some(Value::Number(30.0)));
        assert_eq!(Reduction::Sum.apply(&values), Some(Value::Number(90.0)));
        assert_eq!(Reduction::Median.apply(&values), Some(Value::Number(30.0)));
        assert_eq!(Reduction::Min.apply(&values), Some(Value::Number(20.0)));
        assert_eq!(Reduction::Max.apply(&values), Some(Value::Number(40.0)));
        assert_eq!(Reduction::Count.apply(&values), Some(Value::Number(3.0)));
        assert_eq!(Reduction::First.apply(&values), Some(Value::Number(30.0)));
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(Reduction::Mean.apply(&[]), None);
        assert_eq!(Reduction::Sum.apply(&[]), None);
        assert_eq!(Reduction::First.apply(&[]), None);
        assert_eq!(Reduction::Count.apply(&[]), Some(Value::Number(0.0)));
    }

    #[test]
    fn test_text_values_are_ignored_by_numeric_reductions() {
        let text = Value::Text("walking".to_string());
        assert_eq!(Reduction::Mean.apply(&[&text]), None);
        assert_eq!(Reduction::Count.apply(&[&text]), Some(Value::Number(1.0)));
        assert_eq!(Reduction::First.apply(&[&text]), Some(text.clone()));
    }

    #[test]
    fn test_parse_reduction() {
        assert_eq!("Mean".parse::<Reduction>().unwrap(), Reduction::Mean);
        assert!(matches!(
            "mode".parse::<Reduction>(),
            Err(FitError::UnsupportedReduction(_))
        ));
    }
}
