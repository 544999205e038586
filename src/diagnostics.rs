//! Diagnostics sinks: a header, then rows of numbers.

use crate::error::KError;

/// Receives convergence records. Formatting is the sink's business.
pub trait DiagnosticsSink {
    fn write_header(&mut self, columns: &[String]) -> Result<(), KError>;
    fn write_row(&mut self, values: &[f64]) -> Result<(), KError>;
}

/// In-memory sink, handy for tests and for post-processing a solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceLog {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ConvergenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }
}

impl DiagnosticsSink for ConvergenceLog {
    fn write_header(&mut self, columns: &[String]) -> Result<(), KError> {
        self.columns = columns.to_vec();
        self.rows.clear();
        Ok(())
    }

    fn write_row(&mut self, values: &[f64]) -> Result<(), KError> {
        if self.columns.is_empty() {
            return Err(KError::DimensionMismatch("row written before header".into()));
        }
        if values.len() != self.columns.len() {
            return Err(KError::DimensionMismatch(format!(
                "row of {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(values.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_rows() {
        let mut log = ConvergenceLog::new();
        assert!(log.write_row(&[1.0]).is_err());
        log.write_header(&["it".into(), "res".into()]).unwrap();
        log.write_row(&[0.0, 1.0]).unwrap();
        log.write_row(&[1.0, 0.5]).unwrap();
        assert!(log.write_row(&[2.0]).is_err());
        assert_eq!(log.column("res"), Some(vec![1.0, 0.5]));
        assert_eq!(log.column("missing"), None);
    }
}
