use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid patient id: {0:?}")]
    InvalidPatientId(String),
    #[error("invalid hospitalization id: {0:?}")]
    InvalidHospitalizationId(String),
    #[error(
        "cohort cardinality violated: {rows} rows but {patients} distinct patients after finalization"
    )]
    CardinalityViolation { rows: usize, patients: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;
